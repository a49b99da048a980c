//! TCP connection handler
//!
//! Runs one accepted connection: frames the socket, reads requests into the
//! dispatcher, and drains the session's outbound queue on a separate writer
//! task. Every exit path goes through `Dispatcher::disconnect`.

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::codec::MessageCodec;
use crate::config::ServerConfig;
use crate::dispatcher::{Dispatcher, Flow};
use crate::error::AppError;
use crate::message::{Message, Response};
use crate::session::{Session, SessionHandle};
use crate::types::SessionId;

/// Handle a new TCP connection
///
/// Returns once the session is closed and its writer has finished (or been
/// cut off after the grace period).
pub async fn handle_connection(
    stream: TcpStream,
    dispatcher: Dispatcher,
    config: Arc<ServerConfig>,
) -> Result<(), AppError> {
    let peer_addr = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_string());
    stream.set_nodelay(true)?;

    let (read_half, write_half) = stream.into_split();
    let mut reader = FramedRead::new(read_half, MessageCodec::new(config.max_frame_length));
    let mut writer = FramedWrite::new(write_half, MessageCodec::new(config.max_frame_length));

    let id = SessionId::new();
    let shutdown = CancellationToken::new();
    let (msg_tx, mut msg_rx) = mpsc::channel::<Response>(config.outbound_capacity);
    let mut session = Session::new(SessionHandle::new(id, msg_tx, shutdown.clone()));
    info!("Session {} connected from {}", id, peer_addr);

    // Spawn write task (Response -> socket)
    let writer_shutdown = shutdown.clone();
    let mut write_task = tokio::spawn(async move {
        loop {
            let msg = tokio::select! {
                biased;
                _ = writer_shutdown.cancelled() => break,
                msg = msg_rx.recv() => match msg {
                    Some(msg) => msg,
                    None => break,
                },
            };
            let frame = match Message::from_record(&msg) {
                Ok(frame) => frame,
                Err(e) => {
                    error!("Failed to encode {:?}: {}", msg, e);
                    continue;
                }
            };
            if let Err(e) = writer.send(frame).await {
                debug!("Write failed for session {}: {}", id, e);
                writer_shutdown.cancel();
                break;
            }
        }
        let _ = writer.close().await;
        debug!("Write task ended for session {}", id);
    });

    // Read loop (socket -> dispatcher)
    loop {
        let next = tokio::select! {
            _ = shutdown.cancelled() => {
                debug!("Session {} shut down", id);
                break;
            }
            next = reader.next() => next,
        };
        let flow = match next {
            Some(Ok(msg)) => {
                debug!("Session {} sent {}", id, msg.kind());
                dispatcher.handle_message(&mut session, msg)
            }
            Some(Err(AppError::Decode(e))) => dispatcher.handle_decode_error(&mut session, e),
            Some(Err(e)) => {
                warn!("Transport error for session {}: {}", id, e);
                break;
            }
            None => {
                debug!("Session {} closed by peer", id);
                break;
            }
        };
        if flow == Flow::Close {
            break;
        }
    }

    dispatcher.disconnect(&mut session);

    // The writer stops once every handle is gone and the queue is drained
    drop(session);
    if tokio::time::timeout(config.shutdown_grace, &mut write_task)
        .await
        .is_err()
    {
        debug!("Session {} writer did not drain in time", id);
        shutdown.cancel();
        write_task.abort();
    }

    info!("Session {} from {} disconnected", id, peer_addr);
    Ok(())
}
