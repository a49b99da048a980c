//! Session state
//!
//! `Session` is the connection-local state: identity, presence status and the
//! handle to its own outbound queue. `SessionHandle` is the cheap, cloneable
//! send side that the registry hands out to other sessions.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::SendError;
use crate::message::Response;
use crate::types::{SessionId, Status};

/// Send side of one session's outbound queue
#[derive(Debug, Clone)]
pub struct SessionHandle {
    id: SessionId,
    sender: mpsc::Sender<Response>,
    shutdown: CancellationToken,
}

impl SessionHandle {
    pub fn new(id: SessionId, sender: mpsc::Sender<Response>, shutdown: CancellationToken) -> Self {
        Self {
            id,
            sender,
            shutdown,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Queue a message for this session
    ///
    /// Never waits. A full queue means the peer is not reading; the session is
    /// shut down rather than buffering without bound.
    pub fn send(&self, msg: Response) -> Result<(), SendError> {
        match self.sender.try_send(msg) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("Session {} outbound queue full, disconnecting", self.id);
                self.shutdown.cancel();
                Err(SendError::Lagging)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(SendError::ChannelClosed),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled() || self.sender.is_closed()
    }
}

/// Lifecycle of a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// Connected, no username yet
    Unidentified,
    /// Registered under a username
    Identified(String),
    /// Ended; nothing more is dispatched
    Closed,
}

/// Connection-local session state
#[derive(Debug)]
pub struct Session {
    handle: SessionHandle,
    state: SessionState,
    status: Status,
}

impl Session {
    pub fn new(handle: SessionHandle) -> Self {
        Self {
            handle,
            state: SessionState::Unidentified,
            status: Status::default(),
        }
    }

    pub fn id(&self) -> SessionId {
        self.handle.id()
    }

    pub fn handle(&self) -> &SessionHandle {
        &self.handle
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Username, once identified
    pub fn username(&self) -> Option<&str> {
        match &self.state {
            SessionState::Identified(name) => Some(name),
            _ => None,
        }
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn set_status(&mut self, status: Status) {
        self.status = status;
    }

    /// Bind the username; only the first call on an unidentified session counts
    pub fn identify(&mut self, username: String) -> bool {
        if self.state != SessionState::Unidentified {
            return false;
        }
        self.state = SessionState::Identified(username);
        true
    }

    /// Move to `Closed`, returning the username that must be unregistered
    ///
    /// Returns it at most once, however many times it is called.
    pub fn close(&mut self) -> Option<String> {
        let previous = std::mem::replace(&mut self.state, SessionState::Closed);
        match previous {
            SessionState::Identified(name) => Some(name),
            _ => None,
        }
    }

    /// Queue a reply to this session's own peer
    pub fn send(&self, msg: Response) -> Result<(), SendError> {
        self.handle.send(msg)
    }
}
