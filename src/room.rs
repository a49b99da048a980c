//! Room struct definition
//!
//! A named group with a member set and a pending-invite set. A username is in
//! at most one of the two sets; the room exists only while it has members.

use std::collections::BTreeSet;
use std::time::Instant;

use crate::error::RegistryError;

/// Invite-gated chat room
#[derive(Debug)]
pub struct Room {
    /// Room name, unique among live rooms
    pub name: String,
    /// Joined usernames
    members: BTreeSet<String>,
    /// Invited but not yet joined
    invited: BTreeSet<String>,
    /// Room creation time
    pub created_at: Instant,
}

impl Room {
    /// Create a new room whose only member is the creator
    pub fn new(name: String, creator: String) -> Self {
        Self {
            name,
            members: BTreeSet::from([creator]),
            invited: BTreeSet::new(),
            created_at: Instant::now(),
        }
    }

    pub fn is_member(&self, username: &str) -> bool {
        self.members.contains(username)
    }

    pub fn is_invited(&self, username: &str) -> bool {
        self.invited.contains(username)
    }

    /// Check if the room has no members left and should be destroyed
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Members in name order
    pub fn members(&self) -> impl Iterator<Item = &str> {
        self.members.iter().map(String::as_str)
    }

    /// Members other than `username`
    pub fn members_except<'a>(&'a self, username: &'a str) -> impl Iterator<Item = &'a str> {
        self.members().filter(move |m| *m != username)
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    /// Record an invitation
    ///
    /// Returns false when the user is already a member or already invited.
    pub fn invite(&mut self, username: &str) -> bool {
        if self.is_member(username) || self.is_invited(username) {
            return false;
        }
        self.invited.insert(username.to_string())
    }

    /// Move an invited user into the member set
    pub fn join(&mut self, username: &str) -> Result<(), RegistryError> {
        if self.is_member(username) {
            return Err(RegistryError::AlreadyMember(self.name.clone()));
        }
        if !self.invited.remove(username) {
            return Err(RegistryError::NotInvited(self.name.clone()));
        }
        self.members.insert(username.to_string());
        Ok(())
    }

    /// Remove a member
    pub fn leave(&mut self, username: &str) -> Result<(), RegistryError> {
        if self.members.remove(username) {
            Ok(())
        } else {
            Err(RegistryError::NotAMember(self.name.clone()))
        }
    }

    /// Drop every trace of a user
    ///
    /// Returns true if the user was a member (as opposed to only invited).
    pub fn forget(&mut self, username: &str) -> bool {
        self.invited.remove(username);
        self.members.remove(username)
    }
}
