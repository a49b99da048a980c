//! Shared directory of connected users and live rooms
//!
//! All state sits behind one `std::sync::Mutex`. Every public method takes the
//! lock, does its checks and mutation, and releases it before returning, so
//! each call is atomic with respect to the others and no lock is ever held
//! across an `.await`. Methods return `SessionHandle` clones; callers send to
//! them after the lock is gone.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, info};

use crate::error::RegistryError;
use crate::room::Room;
use crate::session::SessionHandle;

/// Registered user
#[derive(Debug)]
struct UserEntry {
    session: SessionHandle,
    /// Registration sequence number, for stable listing order
    seq: u64,
}

#[derive(Debug, Default)]
struct RegistryState {
    users: HashMap<String, UserEntry>,
    rooms: HashMap<String, Room>,
    next_seq: u64,
}

impl RegistryState {
    fn handles<'a>(&self, names: impl Iterator<Item = &'a str>) -> Vec<SessionHandle> {
        names
            .filter_map(|name| self.users.get(name))
            .map(|entry| entry.session.clone())
            .collect()
    }

    fn room_of(&self, roomname: &str, username: &str) -> Result<&Room, RegistryError> {
        let room = self
            .rooms
            .get(roomname)
            .ok_or_else(|| RegistryError::RoomNotFound(roomname.to_string()))?;
        if !room.is_member(username) {
            return Err(RegistryError::NotAMember(roomname.to_string()));
        }
        Ok(room)
    }
}

/// What an unregistered user left behind
#[derive(Debug, Default)]
pub struct Departure {
    /// Surviving rooms the user was a member of, with their remaining members
    pub rooms: Vec<(String, Vec<SessionHandle>)>,
    /// Every other registered session
    pub remaining: Vec<SessionHandle>,
}

/// Thread-safe registry, cheap to clone
#[derive(Debug, Clone, Default)]
pub struct Registry {
    state: Arc<Mutex<RegistryState>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        // A panic while holding the lock cannot leave the maps half-updated
        // (every mutation is a single insert/remove), so poisoning is ignored.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Bind a username to a session
    pub fn register(&self, username: &str, session: SessionHandle) -> Result<(), RegistryError> {
        if username.is_empty() {
            return Err(RegistryError::EmptyUsername);
        }
        let mut state = self.lock();
        if state.users.contains_key(username) {
            return Err(RegistryError::UserExists(username.to_string()));
        }
        let seq = state.next_seq;
        state.next_seq += 1;
        state
            .users
            .insert(username.to_string(), UserEntry { session, seq });
        info!("User '{}' registered ({} online)", username, state.users.len());
        Ok(())
    }

    /// Remove a user from the user map and from every room
    ///
    /// Rooms left empty are destroyed. Returns `None` if the user was not
    /// registered, which makes repeated calls harmless.
    pub fn unregister(&self, username: &str) -> Option<Departure> {
        let mut state = self.lock();
        state.users.remove(username)?;

        let mut departure = Departure::default();
        let mut emptied = Vec::new();
        for room in state.rooms.values_mut() {
            if room.forget(username) {
                if room.is_empty() {
                    emptied.push(room.name.clone());
                } else {
                    departure.rooms.push((room.name.clone(), Vec::new()));
                }
            }
        }
        for name in emptied {
            if let Some(room) = state.rooms.remove(&name) {
                debug!("Room '{}' destroyed after {:?}", name, room.created_at.elapsed());
            }
        }
        for (name, handles) in departure.rooms.iter_mut() {
            if let Some(room) = state.rooms.get(name.as_str()) {
                *handles = state.handles(room.members());
            }
        }
        departure.remaining = state.users.values().map(|e| e.session.clone()).collect();

        info!("User '{}' unregistered ({} online)", username, state.users.len());
        Some(departure)
    }

    /// Session registered under `username`
    pub fn session(&self, username: &str) -> Option<SessionHandle> {
        self.lock().users.get(username).map(|e| e.session.clone())
    }

    /// Every registered session except `username`'s
    pub fn others(&self, username: &str) -> Vec<SessionHandle> {
        self.lock()
            .users
            .iter()
            .filter(|(name, _)| name.as_str() != username)
            .map(|(_, entry)| entry.session.clone())
            .collect()
    }

    /// Registered usernames in registration order
    pub fn list_users(&self) -> Vec<String> {
        let state = self.lock();
        let mut users: Vec<(&String, u64)> =
            state.users.iter().map(|(name, e)| (name, e.seq)).collect();
        users.sort_by_key(|(_, seq)| *seq);
        users.into_iter().map(|(name, _)| name.clone()).collect()
    }

    pub fn create_room(&self, roomname: &str, creator: &str) -> Result<(), RegistryError> {
        if roomname.is_empty() {
            return Err(RegistryError::EmptyRoomName);
        }
        let mut state = self.lock();
        if state.rooms.contains_key(roomname) {
            return Err(RegistryError::RoomExists(roomname.to_string()));
        }
        state.rooms.insert(
            roomname.to_string(),
            Room::new(roomname.to_string(), creator.to_string()),
        );
        info!("Room '{}' created by '{}'", roomname, creator);
        Ok(())
    }

    /// Invite users into a room
    ///
    /// Every check runs before any mutation: on error nobody is invited.
    /// Returns the sessions of the users newly invited by this call.
    pub fn invite(
        &self,
        roomname: &str,
        inviter: &str,
        usernames: &[String],
    ) -> Result<Vec<(String, SessionHandle)>, RegistryError> {
        let mut state = self.lock();
        state.room_of(roomname, inviter)?;
        if let Some(unknown) = usernames.iter().find(|u| !state.users.contains_key(u.as_str())) {
            return Err(RegistryError::UnknownUser(unknown.clone()));
        }

        let RegistryState { users, rooms, .. } = &mut *state;
        let Some(room) = rooms.get_mut(roomname) else {
            return Err(RegistryError::RoomNotFound(roomname.to_string()));
        };
        let mut invited = Vec::new();
        for username in usernames {
            if room.invite(username) {
                if let Some(entry) = users.get(username) {
                    invited.push((username.clone(), entry.session.clone()));
                }
            }
        }
        debug!(
            "'{}' invited {} user(s) to '{}'",
            inviter,
            invited.len(),
            roomname
        );
        Ok(invited)
    }

    /// Accept an invitation
    ///
    /// Returns the sessions of the members already in the room.
    pub fn join(&self, roomname: &str, username: &str) -> Result<Vec<SessionHandle>, RegistryError> {
        let mut state = self.lock();
        let room = state
            .rooms
            .get_mut(roomname)
            .ok_or_else(|| RegistryError::RoomNotFound(roomname.to_string()))?;
        room.join(username)?;
        info!(
            "'{}' joined room '{}' ({} members)",
            username,
            roomname,
            room.member_count()
        );

        let room = &state.rooms[roomname];
        Ok(state.handles(room.members_except(username)))
    }

    /// Leave a room, destroying it if it is now empty
    ///
    /// Returns the sessions of the remaining members (empty if destroyed).
    pub fn leave(&self, roomname: &str, username: &str) -> Result<Vec<SessionHandle>, RegistryError> {
        let mut state = self.lock();
        let room = state
            .rooms
            .get_mut(roomname)
            .ok_or_else(|| RegistryError::RoomNotFound(roomname.to_string()))?;
        room.leave(username)?;
        info!("'{}' left room '{}'", username, roomname);

        if room.is_empty() {
            if let Some(room) = state.rooms.remove(roomname) {
                debug!("Room '{}' destroyed after {:?}", roomname, room.created_at.elapsed());
            }
            return Ok(Vec::new());
        }
        let room = &state.rooms[roomname];
        Ok(state.handles(room.members()))
    }

    /// Member names of a room the requester belongs to
    pub fn room_members(&self, roomname: &str, requester: &str) -> Result<Vec<String>, RegistryError> {
        let state = self.lock();
        let room = state.room_of(roomname, requester)?;
        Ok(room.members().map(str::to_string).collect())
    }

    /// Sessions a room message from `sender` fans out to
    pub fn room_recipients(
        &self,
        roomname: &str,
        sender: &str,
    ) -> Result<Vec<SessionHandle>, RegistryError> {
        let state = self.lock();
        let room = state.room_of(roomname, sender)?;
        Ok(state.handles(room.members_except(sender)))
    }

    pub fn room_exists(&self, roomname: &str) -> bool {
        self.lock().rooms.contains_key(roomname)
    }

    pub fn user_count(&self) -> usize {
        self.lock().users.len()
    }

    /// Check the room invariants over the whole registry
    #[cfg(test)]
    fn assert_consistent(&self) {
        let state = self.lock();
        for (name, room) in &state.rooms {
            assert_eq!(&room.name, name);
            assert!(!room.is_empty(), "room '{}' exists with no members", name);
            for member in room.members() {
                assert!(!room.is_invited(member), "'{}' both member and invited", member);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Response;
    use crate::types::SessionId;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    fn handle() -> (SessionHandle, mpsc::Receiver<Response>) {
        let (tx, rx) = mpsc::channel(16);
        (SessionHandle::new(SessionId::new(), tx, CancellationToken::new()), rx)
    }

    fn registry_with(names: &[&str]) -> (Registry, Vec<mpsc::Receiver<Response>>) {
        let registry = Registry::new();
        let mut receivers = Vec::new();
        for name in names {
            let (h, rx) = handle();
            registry.register(name, h).unwrap();
            receivers.push(rx);
        }
        (registry, receivers)
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_register_rejects_duplicates_and_empty() {
        let (registry, _rx) = registry_with(&["jane"]);
        let (h, _rx2) = handle();
        assert_eq!(
            registry.register("jane", h.clone()),
            Err(RegistryError::UserExists("jane".to_string()))
        );
        assert_eq!(registry.register("", h), Err(RegistryError::EmptyUsername));
        assert_eq!(registry.user_count(), 1);
    }

    #[test]
    fn test_list_users_in_registration_order() {
        let (registry, _rx) = registry_with(&["zoe", "adam", "mia"]);
        assert_eq!(registry.list_users(), names(&["zoe", "adam", "mia"]));
    }

    #[test]
    fn test_others_excludes_self() {
        let (registry, _rx) = registry_with(&["jane", "bob", "ana"]);
        assert_eq!(registry.others("jane").len(), 2);
    }

    #[test]
    fn test_unregister_is_idempotent() {
        let (registry, _rx) = registry_with(&["jane"]);
        assert!(registry.unregister("jane").is_some());
        assert!(registry.unregister("jane").is_none());
        assert_eq!(registry.user_count(), 0);
    }

    #[test]
    fn test_create_room_name_collision() {
        let (registry, _rx) = registry_with(&["jane", "bob"]);
        registry.create_room("r1", "jane").unwrap();
        assert_eq!(
            registry.create_room("r1", "bob"),
            Err(RegistryError::RoomExists("r1".to_string()))
        );
        assert_eq!(registry.create_room("", "bob"), Err(RegistryError::EmptyRoomName));
    }

    #[test]
    fn test_invite_checks_before_mutating() {
        let (registry, _rx) = registry_with(&["jane", "bob", "ana"]);
        registry.create_room("r1", "jane").unwrap();

        assert_eq!(
            registry.invite("r1", "jane", &names(&["bob", "ghost", "nobody"])).unwrap_err(),
            RegistryError::UnknownUser("ghost".to_string())
        );
        // bob was listed before the unknown user but must not be invited
        assert_eq!(
            registry.join("r1", "bob").unwrap_err(),
            RegistryError::NotInvited("r1".to_string())
        );
    }

    #[test]
    fn test_invite_failures() {
        let (registry, _rx) = registry_with(&["jane", "bob"]);
        assert_eq!(
            registry.invite("r1", "jane", &names(&["bob"])).unwrap_err(),
            RegistryError::RoomNotFound("r1".to_string())
        );
        registry.create_room("r1", "jane").unwrap();
        assert_eq!(
            registry.invite("r1", "bob", &names(&["jane"])).unwrap_err(),
            RegistryError::NotAMember("r1".to_string())
        );
    }

    #[test]
    fn test_invite_skips_members_and_repeats() {
        let (registry, _rx) = registry_with(&["jane", "bob"]);
        registry.create_room("r1", "jane").unwrap();

        let first = registry.invite("r1", "jane", &names(&["bob", "jane"])).unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].0, "bob");

        let second = registry.invite("r1", "jane", &names(&["bob"])).unwrap();
        assert!(second.is_empty());
        registry.assert_consistent();
    }

    #[test]
    fn test_join_returns_existing_members() {
        let (registry, _rx) = registry_with(&["jane", "bob"]);
        registry.create_room("r1", "jane").unwrap();
        registry.invite("r1", "jane", &names(&["bob"])).unwrap();

        let existing = registry.join("r1", "bob").unwrap();
        assert_eq!(existing.len(), 1);
        assert_eq!(registry.room_members("r1", "bob").unwrap(), names(&["bob", "jane"]));
        assert_eq!(
            registry.join("r1", "bob").unwrap_err(),
            RegistryError::AlreadyMember("r1".to_string())
        );
        registry.assert_consistent();
    }

    #[test]
    fn test_last_leave_destroys_room_and_frees_name() {
        let (registry, _rx) = registry_with(&["jane", "bob"]);
        registry.create_room("r1", "jane").unwrap();

        assert!(registry.leave("r1", "jane").unwrap().is_empty());
        assert!(!registry.room_exists("r1"));
        registry.create_room("r1", "bob").unwrap();
        assert!(registry.room_members("r1", "bob").is_ok());
    }

    #[test]
    fn test_leave_failures() {
        let (registry, _rx) = registry_with(&["jane", "bob"]);
        assert_eq!(
            registry.leave("r1", "jane").unwrap_err(),
            RegistryError::RoomNotFound("r1".to_string())
        );
        registry.create_room("r1", "jane").unwrap();
        assert_eq!(
            registry.leave("r1", "bob").unwrap_err(),
            RegistryError::NotAMember("r1".to_string())
        );
    }

    #[test]
    fn test_room_views_require_membership() {
        let (registry, _rx) = registry_with(&["jane", "bob"]);
        registry.create_room("r1", "jane").unwrap();
        assert_eq!(
            registry.room_members("r1", "bob"),
            Err(RegistryError::NotAMember("r1".to_string()))
        );
        assert_eq!(
            registry.room_recipients("r2", "jane").unwrap_err(),
            RegistryError::RoomNotFound("r2".to_string())
        );
        assert!(registry.room_recipients("r1", "jane").unwrap().is_empty());
    }

    #[test]
    fn test_unregister_cleans_rooms() {
        let (registry, _rx) = registry_with(&["jane", "bob", "ana"]);
        registry.create_room("shared", "jane").unwrap();
        registry.create_room("solo", "jane").unwrap();
        registry.create_room("pending", "ana").unwrap();
        registry.invite("shared", "jane", &names(&["bob"])).unwrap();
        registry.join("shared", "bob").unwrap();
        registry.invite("pending", "ana", &names(&["jane"])).unwrap();

        let departure = registry.unregister("jane").unwrap();

        assert!(!registry.room_exists("solo"));
        assert_eq!(departure.rooms.len(), 1);
        assert_eq!(departure.rooms[0].0, "shared");
        assert_eq!(departure.rooms[0].1.len(), 1);
        assert_eq!(departure.remaining.len(), 2);
        assert_eq!(registry.room_members("shared", "bob").unwrap(), names(&["bob"]));
        assert_eq!(
            registry.join("pending", "jane").unwrap_err(),
            RegistryError::NotInvited("pending".to_string())
        );
        registry.assert_consistent();
    }

    #[test]
    fn test_concurrent_registration_single_winner() {
        let registry = Registry::new();
        let mut threads = Vec::new();
        for _ in 0..16 {
            let registry = registry.clone();
            threads.push(std::thread::spawn(move || {
                let (h, rx) = handle();
                let won = registry.register("jane", h).is_ok();
                (won, rx)
            }));
        }
        let winners = threads
            .into_iter()
            .map(|t| t.join().unwrap())
            .filter(|(won, _)| *won)
            .count();
        assert_eq!(winners, 1);
        assert_eq!(registry.list_users(), names(&["jane"]));
    }

    #[test]
    fn test_concurrent_join_leave_stays_consistent() {
        let (registry, _rx) = registry_with(&["host", "u0", "u1", "u2", "u3"]);
        registry.create_room("r", "host").unwrap();
        registry
            .invite("r", "host", &names(&["u0", "u1", "u2", "u3"]))
            .unwrap();

        let threads: Vec<_> = (0..4)
            .map(|i| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    let name = format!("u{}", i);
                    registry.join("r", &name).unwrap();
                    registry.leave("r", &name).unwrap();
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        registry.assert_consistent();
        assert_eq!(registry.room_members("r", "host").unwrap(), names(&["host"]));
    }
}
