//! Message protocol definitions
//!
//! On the wire every message is a JSON object with a mandatory string `type`.
//! `Message` is that object, validated but untyped; `Request` and `Response`
//! are the closed sets of shapes, converted to and from `Message` with
//! Serde's tagged enums.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{DecodeError, ProtocolViolation};
use crate::types::Status;

/// Discriminator field present in every message
pub const TYPE_FIELD: &str = "type";

/// Text carried by every INFO reply
pub const SUCCESS: &str = "success";

/// A decoded wire message: a JSON object whose `type` is a string
#[derive(Debug, Clone, PartialEq)]
pub struct Message(Map<String, Value>);

impl Message {
    /// Start assembling a message of the given type
    pub fn new(kind: &str) -> Self {
        let mut map = Map::new();
        map.insert(TYPE_FIELD.to_string(), Value::String(kind.to_string()));
        Self(map)
    }

    /// Add or replace a field
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    /// The message type
    pub fn kind(&self) -> &str {
        // Validated on construction
        self.0
            .get(TYPE_FIELD)
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    /// Serialize to UTF-8 JSON
    ///
    /// Non-ASCII text is emitted as-is and keys come out sorted, so equal
    /// messages always encode to equal bytes.
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(&self.0)
    }

    /// Parse one complete frame payload
    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let value: Value = serde_json::from_slice(bytes)?;
        Self::try_from(value)
    }

    /// Build a message from any record serializing to an object with `type`
    pub fn from_record<T: Serialize>(record: &T) -> Result<Self, DecodeError> {
        Self::try_from(serde_json::to_value(record)?)
    }

    /// Interpret this message as a typed record
    pub fn into_record<T: DeserializeOwned>(self) -> Result<T, serde_json::Error> {
        serde_json::from_value(Value::Object(self.0))
    }
}

impl TryFrom<Value> for Message {
    type Error = DecodeError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        let Value::Object(map) = value else {
            return Err(DecodeError::NotAnObject);
        };
        match map.get(TYPE_FIELD) {
            None => Err(DecodeError::MissingType),
            Some(Value::String(_)) => Ok(Self(map)),
            Some(_) => Err(DecodeError::TypeNotString),
        }
    }
}

/// The request kind an INFO or WARNING answers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operation {
    Identify,
    Status,
    Users,
    Message,
    PublicMessage,
    NewRoom,
    Invite,
    JoinRoom,
    RoomUsers,
    RoomMessage,
    LeaveRoom,
    Disconnect,
}

/// Client → Server message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Request {
    /// Claim a username (must be the first request)
    Identify { username: String },
    /// Change presence status
    Status { status: Status },
    /// List connected users
    Users,
    /// Direct message to one user
    Message { username: String, message: String },
    /// Message to every connected user
    PublicMessage { message: String },
    /// Create a room, joining it
    NewRoom { roomname: String },
    /// Invite users to a room the sender belongs to
    Invite {
        roomname: String,
        usernames: Vec<String>,
    },
    /// Accept an invitation
    JoinRoom { roomname: String },
    /// List members of a room the sender belongs to
    RoomUsers { roomname: String },
    /// Message to the other members of a room
    RoomMessage { roomname: String, message: String },
    /// Leave a room
    LeaveRoom { roomname: String },
    /// End the session
    Disconnect,
}

impl Request {
    pub fn operation(&self) -> Operation {
        match self {
            Request::Identify { .. } => Operation::Identify,
            Request::Status { .. } => Operation::Status,
            Request::Users => Operation::Users,
            Request::Message { .. } => Operation::Message,
            Request::PublicMessage { .. } => Operation::PublicMessage,
            Request::NewRoom { .. } => Operation::NewRoom,
            Request::Invite { .. } => Operation::Invite,
            Request::JoinRoom { .. } => Operation::JoinRoom,
            Request::RoomUsers { .. } => Operation::RoomUsers,
            Request::RoomMessage { .. } => Operation::RoomMessage,
            Request::LeaveRoom { .. } => Operation::LeaveRoom,
            Request::Disconnect => Operation::Disconnect,
        }
    }
}

impl TryFrom<Message> for Request {
    type Error = ProtocolViolation;

    fn try_from(msg: Message) -> Result<Self, Self::Error> {
        msg.into_record()
            .map_err(|e| ProtocolViolation::Malformed(e.to_string()))
    }
}

/// Server → Client message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Response {
    /// Request succeeded
    Info {
        operation: Operation,
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        username: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        roomname: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        status: Option<Status>,
    },
    /// Request refused, session continues
    Warning {
        operation: Operation,
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        username: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        roomname: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        status: Option<Status>,
    },
    /// Protocol error, session ends
    Error { message: String },
    NewUser { username: String },
    NewStatus { username: String, status: Status },
    UserList { usernames: Vec<String> },
    MessageFrom { username: String, message: String },
    PublicMessageFrom { username: String, message: String },
    JoinedRoom { roomname: String, username: String },
    RoomUserList {
        roomname: String,
        usernames: Vec<String>,
    },
    RoomMessageFrom {
        roomname: String,
        username: String,
        message: String,
    },
    Invitation {
        username: String,
        roomname: String,
        message: String,
    },
    LeftRoom { roomname: String, username: String },
    Disconnected { username: String },
}

impl Response {
    /// Bare success reply
    pub fn success(operation: Operation) -> Self {
        Response::Info {
            operation,
            message: SUCCESS.to_string(),
            username: None,
            roomname: None,
            status: None,
        }
    }

    /// Success reply about a room
    pub fn room_success(operation: Operation, roomname: &str) -> Self {
        Response::Info {
            operation,
            message: SUCCESS.to_string(),
            username: None,
            roomname: Some(roomname.to_string()),
            status: None,
        }
    }

    /// Refusal with no extra context
    pub fn warning(operation: Operation, message: impl Into<String>) -> Self {
        Response::Warning {
            operation,
            message: message.into(),
            username: None,
            roomname: None,
            status: None,
        }
    }

    /// Attach context to an INFO or WARNING; other variants are returned unchanged
    pub fn about_user(mut self, name: &str) -> Self {
        if let Response::Info { username, .. } | Response::Warning { username, .. } = &mut self {
            *username = Some(name.to_string());
        }
        self
    }

    pub fn about_room(mut self, name: &str) -> Self {
        if let Response::Info { roomname, .. } | Response::Warning { roomname, .. } = &mut self {
            *roomname = Some(name.to_string());
        }
        self
    }

    pub fn about_status(mut self, value: Status) -> Self {
        if let Response::Info { status, .. } | Response::Warning { status, .. } = &mut self {
            *status = Some(value);
        }
        self
    }

    pub fn error(message: impl Into<String>) -> Self {
        Response::Error {
            message: message.into(),
        }
    }
}

impl From<ProtocolViolation> for Response {
    fn from(err: ProtocolViolation) -> Self {
        Response::error(err.to_string())
    }
}

impl From<DecodeError> for Response {
    fn from(err: DecodeError) -> Self {
        Response::error(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_identify() {
        let msg = Message::decode(br#"{"type": "IDENTIFY", "username": "Alice"}"#).unwrap();
        assert_eq!(msg.kind(), "IDENTIFY");
        match Request::try_from(msg).unwrap() {
            Request::Identify { username } => assert_eq!(username, "Alice"),
            _ => panic!("Wrong variant"),
        }
    }

    #[test]
    fn test_multibyte_text_survives_encoding() {
        let msg = Message::new("IDENTIFY").with("username", "José Arcadio Buendía");
        let bytes = msg.encode().unwrap();
        assert_eq!(
            bytes,
            r#"{"type":"IDENTIFY","username":"José Arcadio Buendía"}"#.as_bytes()
        );
        assert_eq!(Message::decode(&bytes).unwrap(), msg);
    }

    #[test]
    fn test_nested_values_survive_encoding() {
        let msg = Message::new("INVITE")
            .with("roomname", "a } b")
            .with("usernames", vec!["x", "y"])
            .with("extra", serde_json::json!({"nested": {"deep": ["}"]}}));
        let bytes = msg.encode().unwrap();
        assert_eq!(Message::decode(&bytes).unwrap(), msg);
    }

    #[test]
    fn test_decode_rejects_invalid_json() {
        assert!(matches!(
            Message::decode(b"{foo: bar"),
            Err(DecodeError::Json(_))
        ));
    }

    #[test]
    fn test_decode_rejects_non_object() {
        assert!(matches!(
            Message::decode(br#"["foo", {"bar": ["baz", null, 1.0, 2]}]"#),
            Err(DecodeError::NotAnObject)
        ));
    }

    #[test]
    fn test_decode_requires_string_type() {
        assert!(matches!(
            Message::decode(br#"{"username": "jane"}"#),
            Err(DecodeError::MissingType)
        ));
        assert!(matches!(
            Message::decode(br#"{"type": 3}"#),
            Err(DecodeError::TypeNotString)
        ));
    }

    #[test]
    fn test_unknown_type_is_protocol_violation() {
        let msg = Message::new("DANCE");
        assert!(matches!(
            Request::try_from(msg),
            Err(ProtocolViolation::Malformed(_))
        ));
    }

    #[test]
    fn test_missing_field_is_protocol_violation() {
        let msg = Message::new("MESSAGE").with("username", "bob");
        assert!(Request::try_from(msg).is_err());
    }

    #[test]
    fn test_unit_request_parses() {
        let msg = Message::decode(br#"{"type": "USERS"}"#).unwrap();
        assert_eq!(Request::try_from(msg).unwrap(), Request::Users);
    }

    #[test]
    fn test_info_serialize() {
        let msg = Message::from_record(&Response::success(Operation::Identify)).unwrap();
        assert_eq!(msg.kind(), "INFO");
        assert_eq!(msg.get_str("operation"), Some("IDENTIFY"));
        assert_eq!(msg.get_str("message"), Some("success"));
        assert!(msg.get("roomname").is_none());
    }

    #[test]
    fn test_warning_context() {
        let resp = Response::warning(Operation::Status, "El estado ya es AWAY")
            .about_user("jane")
            .about_status(Status::Away);
        let msg = Message::from_record(&resp).unwrap();
        assert_eq!(msg.kind(), "WARNING");
        assert_eq!(msg.get_str("status"), Some("AWAY"));
        assert_eq!(msg.get_str("username"), Some("jane"));
    }

    #[test]
    fn test_response_through_message() {
        let resp = Response::RoomMessageFrom {
            roomname: "r1".to_string(),
            username: "jane".to_string(),
            message: "¿qué tal?".to_string(),
        };
        let msg = Message::from_record(&resp).unwrap();
        assert_eq!(msg.kind(), "ROOM_MESSAGE_FROM");
        assert_eq!(msg.into_record::<Response>().unwrap(), resp);
    }
}
