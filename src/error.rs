//! Error types for the chat server
//!
//! Four families, matching how each one is answered:
//! - `DecodeError`: malformed wire payload, fatal to the connection
//! - `ProtocolViolation`: well-formed message that is invalid for the session
//! - `RegistryError`: name collisions and membership violations, always recoverable
//! - `AppError` / `SendError`: transport and queue failures
//!
//! Display texts of the first three are sent to clients verbatim.

use thiserror::Error;

/// Malformed wire payload
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Not valid JSON (or not valid UTF-8)
    #[error("JSON inválido")]
    Json(#[from] serde_json::Error),

    /// Valid JSON whose top-level value is not an object
    #[error("JSON inválido: se esperaba un objeto")]
    NotAnObject,

    /// Object without a `type` field
    #[error("Mensaje inválido: falta el campo type")]
    MissingType,

    /// `type` field present but not a string
    #[error("Mensaje inválido: el campo type no es una cadena")]
    TypeNotString,

    /// Length prefix larger than the configured maximum
    #[error("Mensaje demasiado grande: el máximo es {0} bytes")]
    FrameTooLarge(usize),
}

/// Well-formed message that cannot be accepted in the current state
#[derive(Debug, Error)]
pub enum ProtocolViolation {
    /// Unknown `type`, missing fields, or fields of the wrong kind
    #[error("Mensaje inválido: {0}")]
    Malformed(String),

    /// Any request other than IDENTIFY before identification
    #[error("El usuario no se ha identificado")]
    NotIdentified,

    /// A second IDENTIFY on an identified session
    #[error("El usuario ya se identificó como {0}")]
    AlreadyIdentified(String),
}

/// Registry conflicts, answered with a WARNING
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("El nombre de usuario no puede ser vacío")]
    EmptyUsername,

    #[error("El usuario {0} ya existe")]
    UserExists(String),

    #[error("El usuario {0} no existe")]
    UnknownUser(String),

    #[error("El nombre del cuarto no puede ser vacío")]
    EmptyRoomName,

    #[error("El cuarto '{0}' ya existe")]
    RoomExists(String),

    #[error("El cuarto '{0}' no existe")]
    RoomNotFound(String),

    #[error("El usuario no se ha unido al cuarto '{0}'")]
    NotAMember(String),

    #[error("El usuario ya se unió al cuarto '{0}'")]
    AlreadyMember(String),

    #[error("El usuario no ha sido invitado al cuarto '{0}'")]
    NotInvited(String),
}

/// Fatal per-connection errors
///
/// Any of these ends the connection; none of them ends the server.
#[derive(Debug, Error)]
pub enum AppError {
    /// IO error on the socket
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Frame payload could not be decoded
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// JSON serialization error on the way out
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// Peer closed the connection
    #[error("Connection closed")]
    ConnectionClosed,
}

/// Outbound queue errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SendError {
    /// The session's writer is gone
    #[error("Channel closed")]
    ChannelClosed,

    /// The session's queue is full; the peer is being disconnected
    #[error("Peer is lagging")]
    Lagging,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_error_text() {
        let err = RegistryError::UserExists("jane".to_string());
        assert_eq!(err.to_string(), "El usuario jane ya existe");
    }

    #[test]
    fn test_decode_error_from_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("{foo").unwrap_err();
        let err: DecodeError = json_err.into();
        assert_eq!(err.to_string(), "JSON inválido");
    }
}
