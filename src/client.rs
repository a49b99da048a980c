//! Minimal async client
//!
//! Speaks the same framing as the server: connect, send requests, receive
//! responses. Command-line parsing and rendering are left to the caller.

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio_util::codec::Framed;

use crate::codec::MessageCodec;
use crate::error::AppError;
use crate::message::{Message, Request, Response};

pub struct ChatClient {
    framed: Framed<TcpStream, MessageCodec>,
}

impl ChatClient {
    pub async fn connect(addr: impl ToSocketAddrs) -> Result<Self, AppError> {
        let stream = TcpStream::connect(addr).await?;
        Ok(Self::from_stream(stream))
    }

    /// Wrap an already connected stream
    pub fn from_stream(stream: TcpStream) -> Self {
        Self {
            framed: Framed::new(stream, MessageCodec::default()),
        }
    }

    pub async fn send(&mut self, request: &Request) -> Result<(), AppError> {
        self.send_raw(Message::from_record(request)?).await
    }

    /// Send an arbitrary message, bypassing the typed request set
    pub async fn send_raw(&mut self, msg: Message) -> Result<(), AppError> {
        self.framed.send(msg).await
    }

    /// Wait for the next response
    ///
    /// Fails with `ConnectionClosed` once the server has closed the stream.
    pub async fn recv(&mut self) -> Result<Response, AppError> {
        match self.framed.next().await {
            Some(Ok(msg)) => Ok(msg.into_record()?),
            Some(Err(e)) => Err(e),
            None => Err(AppError::ConnectionClosed),
        }
    }

    /// Identify and wait for the server's verdict
    pub async fn identify(&mut self, username: &str) -> Result<Response, AppError> {
        self.send(&Request::Identify {
            username: username.to_string(),
        })
        .await?;
        self.recv().await
    }
}
