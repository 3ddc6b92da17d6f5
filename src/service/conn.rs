//! Connection driver shared by servers and clients.
//!
//! One driver task owns each live connection end to end: it multiplexes
//! inbound frames, the outbound queue, heartbeat ticks, and close requests
//! over a single `select` loop, so consumers and hooks for a connection
//! always run sequentially.

use crate::core::codec::{Coder, Inbound};
use crate::error::WireError;
use crate::protocol::dispatcher::DispatchOutcome;
use crate::protocol::message::{Ping, Pong, PING_TYPE_ID, PONG_TYPE_ID};
use crate::protocol::Protocol;
use crate::service::session::{ConnId, LinkState, Session};
use crate::service::Shared;
use crate::utils::metrics::global_metrics;
use bytes::BytesMut;
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::MissedTickBehavior;
use tokio_util::codec::Framed;
use tracing::{debug, warn};

/// Which end of the connection this driver serves. Clients originate
/// heartbeats and watch for expiry on their own tick; server-side expiry is
/// handled by the server's scan task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Role {
    Server,
    Client,
}

/// Build the frame codec for one connection from shared state.
pub(crate) fn coder_for(shared: &Shared, conn: ConnId) -> Coder {
    Coder::new(
        Arc::clone(&shared.registry),
        Arc::clone(&shared.hooks),
        conn,
        shared.config.in_security.build(),
        shared.config.out_security.build(),
        shared.config.max_msg_size as usize,
    )
}

/// Run the establishment ceremony for a session that just connected.
///
/// Returns `false` when `on_connect` rejected the session; the rejection
/// teardown (no `on_add_session`, no `on_del_session`) has then already
/// run and the connection must be dropped. On `true` the caller registers
/// the session and fires `on_add_session`.
pub(crate) fn screen(shared: &Shared, session: &Arc<Session>, role: Role) -> bool {
    global_metrics().connection_established();
    shared.hooks.on_connect(session);
    if session.is_closed() {
        debug!(conn = %session.id(), peer = %session.peer_addr(), "connection rejected");
        shared.hooks.on_close(session);
        session.advance_state(LinkState::Closed);
        global_metrics().connection_closed();
        return false;
    }
    if role == Role::Client {
        session.advance_state(LinkState::Connected);
    }
    true
}

/// Pump one connection until it closes.
///
/// Returns the fault that ended it, or `None` for a clean close (local
/// close request or orderly EOF from the peer).
pub(crate) async fn drive<S>(
    stream: S,
    coder: Coder,
    session: &Arc<Session>,
    mut outbound_rx: UnboundedReceiver<Box<dyn Protocol>>,
    shared: &Shared,
    role: Role,
) -> Option<WireError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut framed = Framed::new(stream, coder);
    let mut heartbeat = tokio::time::interval(shared.config.send_interval);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let fault = loop {
        tokio::select! {
            _ = session.wait_close() => break session.take_fault(),

            frame = framed.next() => match frame {
                Some(Ok(Inbound::Message(msg))) => {
                    if let Some(err) = accept_message(shared, session, role, msg) {
                        break Some(err);
                    }
                }
                Some(Ok(Inbound::Unknown { type_id, payload })) => {
                    global_metrics().unknown_message();
                    if !shared.hooks.on_unknown_message(session, type_id, &payload) {
                        break Some(WireError::UnknownMessage(type_id));
                    }
                }
                Some(Err(err)) => break Some(err),
                None => break None,
            },

            queued = outbound_rx.recv() => match queued {
                Some(msg) => {
                    if let Err(err) = framed.send(msg).await {
                        break Some(err);
                    }
                }
                None => break None,
            },

            _ = heartbeat.tick() => {
                if role == Role::Client {
                    let idle = session.heartbeat_idle();
                    if idle >= shared.config.expire_time {
                        global_metrics().heartbeat_expired();
                        break Some(WireError::HeartbeatExpired {
                            idle_ms: idle.as_millis() as u64,
                        });
                    }
                    let _ = session.send(Ping::now());
                }
            }
        }
    };

    fault
}

/// Handle one decoded message: heartbeats inline, everything else through
/// the dispatcher. Returns the fault that should end the connection, if
/// any.
fn accept_message(
    shared: &Shared,
    session: &Arc<Session>,
    role: Role,
    msg: Box<dyn Protocol>,
) -> Option<WireError> {
    match msg.type_id() {
        PING_TYPE_ID => {
            session.touch_heartbeat();
            if role == Role::Server {
                if let Ok(ping) = msg.into_any().downcast::<Ping>() {
                    let _ = session.send(Pong::answering(&ping));
                }
            }
            None
        }
        PONG_TYPE_ID => {
            session.touch_heartbeat();
            None
        }
        _ => {
            match shared.dispatcher.dispatch(session, msg) {
                DispatchOutcome::Consumed | DispatchOutcome::Mismatched(_) => None,
                DispatchOutcome::Unconsumed(msg) => {
                    global_metrics().unknown_message();
                    let type_id = msg.type_id();
                    let mut payload = BytesMut::new();
                    let handled = match msg.marshal(&mut payload) {
                        Ok(()) => shared.hooks.on_unknown_message(session, type_id, &payload),
                        Err(_) => false,
                    };
                    if handled {
                        None
                    } else {
                        Some(WireError::UnknownMessage(type_id))
                    }
                }
            }
        }
    }
}

/// Run the teardown ceremony after the driver loop exits.
///
/// Only called for sessions that passed [`screen`] and were registered;
/// fires `on_except` for abnormal closes, then `on_del_session` and
/// `on_close` exactly once.
pub(crate) fn teardown(shared: &Shared, session: &Arc<Session>, fault: Option<WireError>) {
    session.close();
    let fault = fault.or_else(|| session.take_fault());

    if let Some(err) = &fault {
        global_metrics().connection_error();
        warn!(conn = %session.id(), peer = %session.peer_addr(), error = %err, "connection failed");
        shared.hooks.on_except(session, err);
    }

    shared.hooks.on_del_session(session);
    shared.hooks.on_close(session);
    session.advance_state(LinkState::Closed);
    global_metrics().connection_closed();
    debug!(conn = %session.id(), peer = %session.peer_addr(), "connection closed");
}
