//! Listener and accept loop
//!
//! Each accepted connection runs in its own task; tasks share nothing but the
//! registry. A failing connection is logged and never stops the accept loop.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{debug, error, info};

use crate::config::ServerConfig;
use crate::dispatcher::Dispatcher;
use crate::error::AppError;
use crate::handler::handle_connection;
use crate::registry::Registry;

pub struct ChatServer {
    listener: TcpListener,
    dispatcher: Dispatcher,
    config: Arc<ServerConfig>,
}

impl ChatServer {
    /// Bind the listener with a fresh registry
    pub async fn bind(config: ServerConfig) -> Result<Self, AppError> {
        let listener = TcpListener::bind(&config.addr).await?;
        Ok(Self {
            listener,
            dispatcher: Dispatcher::new(Registry::new()),
            config: Arc::new(config),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, AppError> {
        Ok(self.listener.local_addr()?)
    }

    pub fn registry(&self) -> &Registry {
        self.dispatcher.registry()
    }

    /// Accept connections forever
    pub async fn run(self) {
        info!(
            "Chat server listening on {}",
            self.local_addr()
                .map(|a| a.to_string())
                .unwrap_or_else(|_| self.config.addr.clone())
        );

        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    debug!("New connection from {}", addr);
                    let dispatcher = self.dispatcher.clone();
                    let config = Arc::clone(&self.config);

                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, dispatcher, config).await {
                            error!("Connection handler error: {}", e);
                        }
                    });
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                }
            }
        }
    }
}
