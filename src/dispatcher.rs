//! Request dispatch
//!
//! `Dispatcher::dispatch` is the per-session state machine: it checks a
//! request against the session state and the registry, applies the registry
//! mutation, and queues replies and notifications. It never waits; every send
//! goes through a bounded queue with `try_send`, so one slow peer cannot stall
//! the sender. The returned `Flow` tells the connection loop whether to keep
//! reading.

use tracing::{debug, info, warn};

use crate::error::{DecodeError, ProtocolViolation, RegistryError};
use crate::message::{Message, Operation, Request, Response};
use crate::registry::Registry;
use crate::session::{Session, SessionHandle, SessionState};
use crate::types::Status;

/// What the connection loop does after a dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Close,
}

/// Stateless dispatcher over a shared registry
#[derive(Debug, Clone)]
pub struct Dispatcher {
    registry: Registry,
}

impl Dispatcher {
    pub fn new(registry: Registry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Handle one decoded frame
    pub fn handle_message(&self, session: &mut Session, msg: Message) -> Flow {
        match Request::try_from(msg) {
            Ok(request) => self.dispatch(session, request),
            Err(violation) => self.reject(session, violation),
        }
    }

    /// Handle a frame whose payload could not be decoded
    pub fn handle_decode_error(&self, session: &mut Session, err: DecodeError) -> Flow {
        warn!("Session {} sent an undecodable frame: {:?}", session.id(), err);
        let _ = session.send(err.into());
        Flow::Close
    }

    /// Apply one request to the session
    pub fn dispatch(&self, session: &mut Session, request: Request) -> Flow {
        if request == Request::Disconnect {
            debug!("Session {} requested disconnect", session.id());
            return Flow::Close;
        }

        if *session.state() == SessionState::Closed {
            return Flow::Close;
        }
        let Some(username) = session.username().map(str::to_string) else {
            return match request {
                Request::Identify { username } => self.identify(session, username),
                _ => self.reject(session, ProtocolViolation::NotIdentified),
            };
        };

        match request {
            Request::Identify { .. } => {
                self.reject(session, ProtocolViolation::AlreadyIdentified(username))
            }
            Request::Status { status } => self.change_status(session, &username, status),
            Request::Users => {
                let _ = session.send(Response::UserList {
                    usernames: self.registry.list_users(),
                });
                Flow::Continue
            }
            Request::Message { username: to, message } => {
                self.direct_message(session, &username, to, message)
            }
            Request::PublicMessage { message } => {
                fan_out(
                    &self.registry.others(&username),
                    Response::PublicMessageFrom { username, message },
                );
                Flow::Continue
            }
            Request::NewRoom { roomname } => {
                let reply = match self.registry.create_room(&roomname, &username) {
                    Ok(()) => Response::room_success(Operation::NewRoom, &roomname),
                    Err(err) => refusal(Operation::NewRoom, &err),
                };
                let _ = session.send(reply);
                Flow::Continue
            }
            Request::Invite {
                roomname,
                usernames,
            } => self.invite(session, &username, roomname, usernames),
            Request::JoinRoom { roomname } => self.join_room(session, username, roomname),
            Request::RoomUsers { roomname } => {
                let reply = match self.registry.room_members(&roomname, &username) {
                    Ok(usernames) => Response::RoomUserList {
                        roomname,
                        usernames,
                    },
                    Err(err) => refusal(Operation::RoomUsers, &err),
                };
                let _ = session.send(reply);
                Flow::Continue
            }
            Request::RoomMessage { roomname, message } => {
                match self.registry.room_recipients(&roomname, &username) {
                    Ok(recipients) => fan_out(
                        &recipients,
                        Response::RoomMessageFrom {
                            roomname,
                            username,
                            message,
                        },
                    ),
                    Err(err) => {
                        let _ = session.send(refusal(Operation::RoomMessage, &err));
                    }
                }
                Flow::Continue
            }
            Request::LeaveRoom { roomname } => self.leave_room(session, username, roomname),
            Request::Disconnect => Flow::Close,
        }
    }

    /// End the session: unregister it and notify whoever is left
    ///
    /// Safe to call more than once; only the first call on an identified
    /// session has any effect.
    pub fn disconnect(&self, session: &mut Session) {
        let Some(username) = session.close() else {
            return;
        };
        let Some(departure) = self.registry.unregister(&username) else {
            return;
        };
        for (roomname, members) in departure.rooms {
            fan_out(
                &members,
                Response::LeftRoom {
                    roomname,
                    username: username.clone(),
                },
            );
        }
        fan_out(&departure.remaining, Response::Disconnected { username });
    }

    fn reject(&self, session: &mut Session, violation: ProtocolViolation) -> Flow {
        warn!("Session {} protocol violation: {}", session.id(), violation);
        let _ = session.send(violation.into());
        Flow::Close
    }

    fn identify(&self, session: &mut Session, username: String) -> Flow {
        if let Err(err) = self.registry.register(&username, session.handle().clone()) {
            info!("Session {} failed to identify: {}", session.id(), err);
            let _ = session.send(refusal(Operation::Identify, &err));
            return Flow::Close;
        }
        session.identify(username.clone());
        info!("Session {} identified as '{}'", session.id(), username);

        let _ = session.send(Response::success(Operation::Identify));
        fan_out(
            &self.registry.others(&username),
            Response::NewUser { username },
        );
        Flow::Continue
    }

    fn change_status(&self, session: &mut Session, username: &str, status: Status) -> Flow {
        if session.status() == status {
            let _ = session.send(
                Response::warning(Operation::Status, format!("El estado ya es {}", status))
                    .about_status(status),
            );
            return Flow::Continue;
        }
        session.set_status(status);
        let _ = session.send(Response::success(Operation::Status).about_status(status));
        fan_out(
            &self.registry.others(username),
            Response::NewStatus {
                username: username.to_string(),
                status,
            },
        );
        Flow::Continue
    }

    fn direct_message(&self, session: &mut Session, from: &str, to: String, message: String) -> Flow {
        if to == from {
            let _ = session.send(
                Response::warning(Operation::Message, "No puedes enviarte mensajes a ti mismo")
                    .about_user(&to),
            );
            return Flow::Continue;
        }
        match self.registry.session(&to) {
            Some(peer) => {
                let _ = peer.send(Response::MessageFrom {
                    username: from.to_string(),
                    message,
                });
            }
            None => {
                let _ = session.send(refusal(
                    Operation::Message,
                    &RegistryError::UnknownUser(to),
                ));
            }
        }
        Flow::Continue
    }

    fn invite(
        &self,
        session: &mut Session,
        inviter: &str,
        roomname: String,
        usernames: Vec<String>,
    ) -> Flow {
        match self.registry.invite(&roomname, inviter, &usernames) {
            Ok(invited) => {
                let text = format!("{} te invita al cuarto '{}'", inviter, roomname);
                for (_, peer) in &invited {
                    let _ = peer.send(Response::Invitation {
                        username: inviter.to_string(),
                        roomname: roomname.clone(),
                        message: text.clone(),
                    });
                }
                let _ = session.send(Response::room_success(Operation::Invite, &roomname));
            }
            Err(err) => {
                let _ = session.send(refusal(Operation::Invite, &err).about_room(&roomname));
            }
        }
        Flow::Continue
    }

    fn join_room(&self, session: &mut Session, username: String, roomname: String) -> Flow {
        match self.registry.join(&roomname, &username) {
            Ok(members) => {
                let _ = session.send(Response::room_success(Operation::JoinRoom, &roomname));
                fan_out(&members, Response::JoinedRoom { roomname, username });
            }
            Err(err) => {
                let _ = session.send(refusal(Operation::JoinRoom, &err));
            }
        }
        Flow::Continue
    }

    fn leave_room(&self, session: &mut Session, username: String, roomname: String) -> Flow {
        match self.registry.leave(&roomname, &username) {
            Ok(remaining) => {
                let _ = session.send(Response::room_success(Operation::LeaveRoom, &roomname));
                fan_out(&remaining, Response::LeftRoom { roomname, username });
            }
            Err(err) => {
                let _ = session.send(refusal(Operation::LeaveRoom, &err));
            }
        }
        Flow::Continue
    }
}

/// WARNING for a registry conflict, carrying the name it is about
fn refusal(operation: Operation, err: &RegistryError) -> Response {
    let warning = Response::warning(operation, err.to_string());
    match err {
        RegistryError::UserExists(name) | RegistryError::UnknownUser(name) => {
            warning.about_user(name)
        }
        RegistryError::RoomExists(name)
        | RegistryError::RoomNotFound(name)
        | RegistryError::NotAMember(name)
        | RegistryError::AlreadyMember(name)
        | RegistryError::NotInvited(name) => warning.about_room(name),
        RegistryError::EmptyUsername | RegistryError::EmptyRoomName => warning,
    }
}

/// Deliver one event to many sessions
fn fan_out(recipients: &[SessionHandle], msg: Response) {
    for peer in recipients {
        if let Err(e) = peer.send(msg.clone()) {
            debug!("Dropped notification for session {}: {}", peer.id(), e);
        }
    }
}
