//! TCP client manager with automatic reconnect.

use crate::config::Config;
use crate::error::{Result, WireError};
use crate::protocol::{Dispatcher, Protocol, Registry};
use crate::service::conn::{self, Role};
use crate::service::session::{ConnId, LinkState, Session};
use crate::service::{Hooks, Shared};
use crate::transport::{self, Conn};
use crate::utils::metrics::global_metrics;
use crate::utils::timeout::{with_timeout, SHUTDOWN_TIMEOUT};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

type CurrentSession = Arc<RwLock<Option<Arc<Session>>>>;

struct Link {
    stream: Conn,
    session: Arc<Session>,
    outbound_rx: UnboundedReceiver<Box<dyn Protocol>>,
}

/// Connecting endpoint maintaining one session at a time.
///
/// `start` makes the first connect attempt inline. With reconnect enabled
/// (the default) a failed attempt is not fatal: a supervisor task keeps
/// retrying at the configured fixed interval, and every dropped link is
/// re-established the same way until [`Client::stop`]. With reconnect
/// disabled, `start` fails on a failed first attempt and a dropped link
/// stays down.
///
/// Client connections begin in [`LinkState::Connecting`] and reach
/// [`LinkState::Connected`] once `on_connect` admits them.
pub struct Client {
    shared: Arc<Shared>,
    current: CurrentSession,
    next_id: Arc<AtomicU64>,
    shutdown: Option<watch::Sender<bool>>,
    supervisor: Option<JoinHandle<()>>,
}

impl Client {
    pub fn new(
        config: Config,
        registry: Registry,
        dispatcher: Dispatcher,
        hooks: impl Hooks,
    ) -> Self {
        Self {
            shared: Shared::new(config, registry, dispatcher, hooks),
            current: Arc::new(RwLock::new(None)),
            next_id: Arc::new(AtomicU64::new(1)),
            shutdown: None,
            supervisor: None,
        }
    }

    /// Connect and start the supervisor.
    ///
    /// Returns once the first attempt resolved: on success the session is
    /// already established and registered, on failure either the error
    /// (reconnect disabled) or `Ok` with retries running in the background.
    pub async fn start(&mut self) -> Result<()> {
        if self.shutdown.is_some() {
            return Err(WireError::ConfigError("client already started".to_string()));
        }
        self.shared.config.validate_strict()?;

        let config = &self.shared.config;
        if !config.msg_namespace.is_empty() || !config.action_namespace.is_empty() {
            debug!(
                msg_namespace = %config.msg_namespace,
                action_namespace = %config.action_namespace,
                "configured namespaces"
            );
        }

        let first = match transport::connect(&self.shared.config).await {
            Ok((stream, peer)) => {
                info!(peer = %peer, "connected");
                prepare_link(&self.shared, &self.current, &self.next_id, peer)
                    .await
                    .map(|(session, outbound_rx)| Link {
                        stream,
                        session,
                        outbound_rx,
                    })
            }
            Err(err) => {
                if !self.shared.config.reconnect {
                    return Err(err);
                }
                global_metrics().connection_error();
                warn!(error = %err, "initial connect failed, retrying");
                None
            }
        };

        let (tx, rx) = watch::channel(false);
        self.shutdown = Some(tx);
        self.supervisor = Some(tokio::spawn(supervise(
            Arc::clone(&self.shared),
            Arc::clone(&self.current),
            Arc::clone(&self.next_id),
            rx,
            first,
        )));
        Ok(())
    }

    /// Close the current session, stop reconnecting, and wait for the
    /// supervisor to finish. Idempotent.
    pub async fn stop(&mut self) {
        let Some(shutdown) = self.shutdown.take() else {
            return;
        };
        let _ = shutdown.send(true);

        if let Some(session) = self.current.read().await.clone() {
            session.close();
        }
        if let Some(handle) = self.supervisor.take() {
            let joined = with_timeout(SHUTDOWN_TIMEOUT, async move {
                let _ = handle.await;
                Ok(())
            })
            .await;
            if joined.is_err() {
                warn!("supervisor still running at stop timeout");
            }
        }
        info!("client stopped");
    }

    pub fn is_running(&self) -> bool {
        self.shutdown.is_some()
    }

    /// The live session, if one is currently established.
    pub async fn session(&self) -> Option<Arc<Session>> {
        self.current.read().await.clone()
    }

    pub async fn is_connected(&self) -> bool {
        self.current
            .read()
            .await
            .as_ref()
            .map(|s| !s.is_closed() && s.state() == LinkState::Connected)
            .unwrap_or(false)
    }

    /// Queue `msg` on the current session.
    pub async fn send(&self, msg: impl Protocol) -> Result<()> {
        let session = self.session().await.ok_or(WireError::NotConnected)?;
        session.send(msg)
    }
}

async fn prepare_link(
    shared: &Arc<Shared>,
    current: &CurrentSession,
    next_id: &AtomicU64,
    peer: SocketAddr,
) -> Option<(Arc<Session>, UnboundedReceiver<Box<dyn Protocol>>)> {
    let conn_id = ConnId(next_id.fetch_add(1, Ordering::SeqCst));
    let (session, outbound_rx) = Session::new(conn_id, peer, LinkState::Connecting);
    if !conn::screen(shared, &session, Role::Client) {
        return None;
    }
    *current.write().await = Some(Arc::clone(&session));
    shared.hooks.on_add_session(&session);
    Some((session, outbound_rx))
}

async fn run_link(shared: &Arc<Shared>, current: &CurrentSession, link: Link) {
    let Link {
        stream,
        session,
        outbound_rx,
    } = link;
    let coder = conn::coder_for(shared, session.id());
    let fault = conn::drive(stream, coder, &session, outbound_rx, shared, Role::Client).await;
    *current.write().await = None;
    conn::teardown(shared, &session, fault);
}

/// Whether the supervisor should stop, waiting out the reconnect interval
/// otherwise.
async fn done_or_wait(shared: &Shared, shutdown: &mut watch::Receiver<bool>) -> bool {
    if *shutdown.borrow() || !shared.config.reconnect {
        return true;
    }
    tokio::select! {
        res = shutdown.changed() => {
            let _ = res;
            true
        }
        _ = tokio::time::sleep(shared.config.reconnect_interval) => false,
    }
}

async fn supervise(
    shared: Arc<Shared>,
    current: CurrentSession,
    next_id: Arc<AtomicU64>,
    mut shutdown: watch::Receiver<bool>,
    mut pending: Option<Link>,
) {
    // No first link means start's attempt just failed; pace the retry.
    if pending.is_none() && done_or_wait(&shared, &mut shutdown).await {
        return;
    }

    loop {
        let link = match pending.take() {
            Some(link) => link,
            None => {
                global_metrics().reconnect_attempt();
                let attempt = tokio::select! {
                    res = shutdown.changed() => {
                        let _ = res;
                        break;
                    }
                    attempt = transport::connect(&shared.config) => attempt,
                };
                match attempt {
                    Ok((stream, peer)) => {
                        info!(peer = %peer, "reconnected");
                        match prepare_link(&shared, &current, &next_id, peer).await {
                            Some((session, outbound_rx)) => Link {
                                stream,
                                session,
                                outbound_rx,
                            },
                            None => {
                                if done_or_wait(&shared, &mut shutdown).await {
                                    break;
                                }
                                continue;
                            }
                        }
                    }
                    Err(err) => {
                        global_metrics().connection_error();
                        warn!(error = %err, "reconnect failed");
                        if done_or_wait(&shared, &mut shutdown).await {
                            break;
                        }
                        continue;
                    }
                }
            }
        };

        // A stop that lands mid-admission still wins: close before driving.
        if *shutdown.borrow() {
            link.session.close();
        }

        run_link(&shared, &current, link).await;

        if done_or_wait(&shared, &mut shutdown).await {
            break;
        }
    }
}
