//! Multi-user TCP Chat Server Library
//!
//! Clients connect over TCP, identify with a unique username, and exchange
//! direct messages, public broadcasts, and messages scoped to invite-gated
//! rooms.
//!
//! # Wire format
//! Every frame is a 4-byte big-endian length followed by a UTF-8 JSON object
//! with a string `type` field, e.g. `{"type": "IDENTIFY", "username": "jane"}`.
//!
//! # Architecture
//! - One task per connection (`handler`), with a separate writer task draining
//!   a bounded outbound queue
//! - `Registry` is the single source of truth for users and rooms, behind one
//!   mutex that is never held across an `.await`
//! - `Dispatcher` is a synchronous state machine: request in, registry
//!   mutation and queued replies out
//!
//! # Example
//! ```ignore
//! use chat_relay::{ChatServer, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let server = ChatServer::bind(ServerConfig::default()).await.unwrap();
//!     server.run().await;
//! }
//! ```

pub mod client;
pub mod codec;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod handler;
pub mod message;
pub mod registry;
pub mod room;
pub mod server;
pub mod session;
pub mod types;

// Re-export main types for convenience
pub use client::ChatClient;
pub use codec::MessageCodec;
pub use config::ServerConfig;
pub use dispatcher::{Dispatcher, Flow};
pub use error::{AppError, DecodeError, ProtocolViolation, RegistryError, SendError};
pub use handler::handle_connection;
pub use message::{Message, Operation, Request, Response};
pub use registry::Registry;
pub use room::Room;
pub use server::ChatServer;
pub use session::{Session, SessionHandle, SessionState};
pub use types::{SessionId, Status};
