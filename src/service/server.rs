//! TCP server manager.

use crate::config::Config;
use crate::error::{Result, WireError};
use crate::protocol::{Dispatcher, Protocol, Registry};
use crate::service::conn::{self, Role};
use crate::service::session::{ConnId, LinkState, Session};
use crate::service::{Hooks, Shared};
use crate::transport::{Conn, Listener};
use crate::utils::metrics::global_metrics;
use crate::utils::timeout::{with_timeout, DEFAULT_TIMEOUT, SHUTDOWN_TIMEOUT};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{watch, RwLock};
use tokio::time::MissedTickBehavior;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, info, warn};

type SessionMap = Arc<RwLock<HashMap<ConnId, Arc<Session>>>>;

/// Accepting endpoint managing one session per inbound connection.
///
/// `start` binds the listener and returns; accepted connections then run on
/// their own tasks until the peer disconnects, a fault ends them, or
/// [`Server::stop`] closes everything. Connections established by a server
/// begin life in [`LinkState::Connected`].
pub struct Server {
    shared: Arc<Shared>,
    sessions: SessionMap,
    next_id: Arc<AtomicU64>,
    shutdown: Option<watch::Sender<bool>>,
    local_addr: Option<SocketAddr>,
}

impl Server {
    pub fn new(
        config: Config,
        registry: Registry,
        dispatcher: Dispatcher,
        hooks: impl Hooks,
    ) -> Self {
        Self {
            shared: Shared::new(config, registry, dispatcher, hooks),
            sessions: Arc::new(RwLock::new(HashMap::new())),
            next_id: Arc::new(AtomicU64::new(1)),
            shutdown: None,
            local_addr: None,
        }
    }

    /// Bind the listener and start accepting connections.
    ///
    /// Fails when the configuration is invalid, the address cannot be
    /// bound, or the server is already running.
    pub async fn start(&mut self) -> Result<()> {
        if self.shutdown.is_some() {
            return Err(WireError::ConfigError("server already started".to_string()));
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

        let listener = Listener::bind(config).await?;
        let local_addr = listener.local_addr()?;
        self.local_addr = Some(local_addr);

        let (tx, rx) = watch::channel(false);
        self.shutdown = Some(tx);

        tokio::spawn(accept_loop(
            Arc::clone(&self.shared),
            Arc::clone(&self.sessions),
            Arc::clone(&self.next_id),
            listener,
            rx.clone(),
        ));
        tokio::spawn(scan_expired(
            Arc::clone(&self.shared),
            Arc::clone(&self.sessions),
            rx,
        ));

        info!(addr = %local_addr, tls = config.ssl_enabled, "server listening");
        Ok(())
    }

    /// Stop accepting, close every session, and wait for teardown.
    ///
    /// Idempotent. Must be called before dropping the server, otherwise
    /// live connections keep running until their peers disconnect.
    pub async fn stop(&mut self) {
        let Some(shutdown) = self.shutdown.take() else {
            return;
        };
        let _ = shutdown.send(true);

        // Connections mid-admission can register after any single close
        // pass, so every drain round closes whatever sits in the map.
        let sessions = Arc::clone(&self.sessions);
        let drained = with_timeout(SHUTDOWN_TIMEOUT, async move {
            loop {
                let snapshot: Vec<Arc<Session>> =
                    sessions.read().await.values().cloned().collect();
                if snapshot.is_empty() {
                    return Ok(());
                }
                for session in snapshot {
                    session.close();
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;
        if drained.is_err() {
            warn!("sessions still draining at stop timeout");
        }

        self.local_addr = None;
        info!("server stopped");
    }

    /// The bound address while running. With port `0` in the configuration
    /// this is where the ephemeral port shows up.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn is_running(&self) -> bool {
        self.shutdown.is_some()
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn session(&self, id: ConnId) -> Option<Arc<Session>> {
        self.sessions.read().await.get(&id).cloned()
    }

    /// Queue `msg` to every live session. Returns how many sessions
    /// accepted it.
    pub async fn broadcast(&self, msg: &dyn Protocol) -> usize {
        let snapshot: Vec<Arc<Session>> = self.sessions.read().await.values().cloned().collect();
        let mut delivered = 0;
        for session in snapshot {
            if session.send_boxed(msg.boxed_clone()).is_ok() {
                delivered += 1;
            }
        }
        delivered
    }
}

async fn accept_loop(
    shared: Arc<Shared>,
    sessions: SessionMap,
    next_id: Arc<AtomicU64>,
    listener: Listener,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            res = shutdown.changed() => {
                let _ = res;
                break;
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    let conn_id = ConnId(next_id.fetch_add(1, Ordering::SeqCst));
                    debug!(conn = %conn_id, peer = %peer, "accepted");
                    tokio::spawn(serve_conn(
                        Arc::clone(&shared),
                        Arc::clone(&sessions),
                        listener.tls(),
                        stream,
                        peer,
                        conn_id,
                        shutdown.clone(),
                    ));
                }
                Err(err) => {
                    warn!(error = %err, "accept failed");
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            },
        }
    }
    debug!("accept loop stopped");
}

async fn serve_conn(
    shared: Arc<Shared>,
    sessions: SessionMap,
    tls: Option<TlsAcceptor>,
    stream: TcpStream,
    peer: SocketAddr,
    conn_id: ConnId,
    shutdown: watch::Receiver<bool>,
) {
    if let Err(err) = stream.set_nodelay(shared.config.tcp_no_delay) {
        debug!(conn = %conn_id, error = %err, "set_nodelay failed");
    }

    let stream = match tls {
        Some(acceptor) => {
            match tokio::time::timeout(DEFAULT_TIMEOUT, acceptor.accept(stream)).await {
                Ok(Ok(tls_stream)) => Conn::Tls(Box::new(tls_stream.into())),
                Ok(Err(err)) => {
                    global_metrics().connection_error();
                    warn!(conn = %conn_id, peer = %peer, error = %err, "tls handshake failed");
                    return;
                }
                Err(_) => {
                    global_metrics().connection_error();
                    warn!(conn = %conn_id, peer = %peer, "tls handshake timed out");
                    return;
                }
            }
        }
        None => Conn::Plain(stream),
    };

    let (session, outbound_rx) = Session::new(conn_id, peer, LinkState::Connected);
    if !conn::screen(&shared, &session, Role::Server) {
        return;
    }
    sessions.write().await.insert(conn_id, Arc::clone(&session));
    // Read after the insert: either this close runs or stop's drain
    // pass sees the entry.
    if *shutdown.borrow() {
        session.close();
    }
    shared.hooks.on_add_session(&session);

    let coder = conn::coder_for(&shared, conn_id);
    let fault = conn::drive(stream, coder, &session, outbound_rx, &shared, Role::Server).await;

    sessions.write().await.remove(&conn_id);
    conn::teardown(&shared, &session, fault);
}

async fn scan_expired(shared: Arc<Shared>, sessions: SessionMap, mut shutdown: watch::Receiver<bool>) {
    let mut tick = tokio::time::interval(shared.config.send_interval);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            res = shutdown.changed() => {
                let _ = res;
                break;
            }
            _ = tick.tick() => {
                let snapshot: Vec<Arc<Session>> = sessions.read().await.values().cloned().collect();
                for session in snapshot {
                    let idle = session.heartbeat_idle();
                    if idle >= shared.config.expire_time {
                        let idle_ms = idle.as_millis() as u64;
                        global_metrics().heartbeat_expired();
                        warn!(conn = %session.id(), peer = %session.peer_addr(), idle_ms, "heartbeat expired");
                        session.abort(WireError::HeartbeatExpired { idle_ms });
                    }
                }
            }
        }
    }
}
