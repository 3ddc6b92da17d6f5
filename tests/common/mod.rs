//! Shared fixtures for the integration suite: application message types,
//! hook instrumentation, and short-interval configurations.

#![allow(dead_code)]
#![allow(clippy::unwrap_used, clippy::expect_used)]

use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use sockwire::marshal::{marshal_serde, unmarshal_serde};
use sockwire::protocol::{Dispatcher, RegistryBuilder};
use sockwire::service::{Hooks, Session};
use sockwire::{Config, Marshal, Protocol, Registry, WireError};
use std::any::Any;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

pub const CHAT_TYPE_ID: u32 = 5;
pub const BLOB_TYPE_ID: u32 = 77;

/// Application message used across the suite.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chat {
    pub seq: u32,
    pub body: String,
}

impl Chat {
    pub fn new(seq: u32, body: impl Into<String>) -> Self {
        Self {
            seq,
            body: body.into(),
        }
    }
}

impl Marshal for Chat {
    fn marshal(&self, buf: &mut BytesMut) -> sockwire::Result<()> {
        marshal_serde(self, buf)
    }

    fn unmarshal(&mut self, buf: &mut Bytes) -> sockwire::Result<()> {
        *self = unmarshal_serde(buf)?;
        Ok(())
    }
}

impl Protocol for Chat {
    fn type_id(&self) -> u32 {
        CHAT_TYPE_ID
    }

    fn boxed_clone(&self) -> Box<dyn Protocol> {
        Box::new(self.clone())
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any + Send> {
        self
    }
}

/// Message type deliberately left out of server registries to exercise the
/// unknown-message path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Blob {
    pub data: Vec<u8>,
}

impl Marshal for Blob {
    fn marshal(&self, buf: &mut BytesMut) -> sockwire::Result<()> {
        marshal_serde(self, buf)
    }

    fn unmarshal(&mut self, buf: &mut Bytes) -> sockwire::Result<()> {
        *self = unmarshal_serde(buf)?;
        Ok(())
    }
}

impl Protocol for Blob {
    fn type_id(&self) -> u32 {
        BLOB_TYPE_ID
    }

    fn boxed_clone(&self) -> Box<dyn Protocol> {
        Box::new(self.clone())
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any + Send> {
        self
    }
}

/// Registry with [`Chat`] available alongside the built-in heartbeats.
pub fn chat_registry() -> Registry {
    RegistryBuilder::new()
        .register(Chat::default())
        .unwrap()
        .build()
}

/// Dispatcher that forwards every [`Chat`] into a channel.
pub fn capturing_dispatcher() -> (Dispatcher, mpsc::UnboundedReceiver<Chat>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let mut dispatcher = Dispatcher::new();
    dispatcher
        .register(move |_session: &Arc<Session>, msg: Chat| {
            let _ = tx.send(msg);
        })
        .unwrap();
    (dispatcher, rx)
}

/// Record of every lifecycle hook firing, shared between a running
/// service and the test body.
#[derive(Debug, Default)]
pub struct HookLog {
    connects: AtomicUsize,
    adds: AtomicUsize,
    dels: AtomicUsize,
    closes: AtomicUsize,
    excepts: AtomicUsize,
    unknowns: AtomicUsize,
    reject: AtomicBool,
    keep_unknown: AtomicBool,
    events: Mutex<Vec<&'static str>>,
    last_error: Mutex<Option<String>>,
    last_unknown: Mutex<Option<(u32, Vec<u8>)>>,
}

impl HookLog {
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn adds(&self) -> usize {
        self.adds.load(Ordering::SeqCst)
    }

    pub fn dels(&self) -> usize {
        self.dels.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn excepts(&self) -> usize {
        self.excepts.load(Ordering::SeqCst)
    }

    pub fn unknowns(&self) -> usize {
        self.unknowns.load(Ordering::SeqCst)
    }

    /// Make `on_connect` close every new session.
    pub fn reject_connections(&self) {
        self.reject.store(true, Ordering::SeqCst);
    }

    /// Make `on_unknown_message` claim messages instead of failing them.
    pub fn keep_unknown_messages(&self) {
        self.keep_unknown.store(true, Ordering::SeqCst);
    }

    pub fn events(&self) -> Vec<&'static str> {
        self.events.lock().unwrap().clone()
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().unwrap().clone()
    }

    pub fn last_unknown(&self) -> Option<(u32, Vec<u8>)> {
        self.last_unknown.lock().unwrap().clone()
    }

    fn record(&self, event: &'static str) {
        self.events.lock().unwrap().push(event);
    }
}

/// [`Hooks`] implementation that records into a shared [`HookLog`].
#[derive(Debug, Default, Clone)]
pub struct CountingHooks {
    log: Arc<HookLog>,
}

impl CountingHooks {
    pub fn log(&self) -> Arc<HookLog> {
        Arc::clone(&self.log)
    }
}

impl Hooks for CountingHooks {
    fn on_connect(&self, session: &Arc<Session>) {
        self.log.connects.fetch_add(1, Ordering::SeqCst);
        self.log.record("connect");
        if self.log.reject.load(Ordering::SeqCst) {
            session.close();
        }
    }

    fn on_add_session(&self, _session: &Arc<Session>) {
        self.log.adds.fetch_add(1, Ordering::SeqCst);
        self.log.record("add");
    }

    fn on_del_session(&self, _session: &Arc<Session>) {
        self.log.dels.fetch_add(1, Ordering::SeqCst);
        self.log.record("del");
    }

    fn on_close(&self, _session: &Arc<Session>) {
        self.log.closes.fetch_add(1, Ordering::SeqCst);
        self.log.record("close");
    }

    fn on_except(&self, _session: &Arc<Session>, error: &WireError) {
        self.log.excepts.fetch_add(1, Ordering::SeqCst);
        self.log.record("except");
        *self.log.last_error.lock().unwrap() = Some(error.to_string());
    }

    fn on_unknown_message(&self, _session: &Arc<Session>, type_id: u32, payload: &[u8]) -> bool {
        self.log.unknowns.fetch_add(1, Ordering::SeqCst);
        self.log.record("unknown");
        *self.log.last_unknown.lock().unwrap() = Some((type_id, payload.to_vec()));
        self.log.keep_unknown.load(Ordering::SeqCst)
    }
}

/// [`CountingHooks`] whose `on_connect` blocks while the gate is held,
/// pinning a connection mid-admission. Needs a multi-threaded runtime.
#[derive(Debug, Clone)]
pub struct GatedHooks {
    inner: CountingHooks,
    open: Arc<AtomicBool>,
    entered: Arc<AtomicUsize>,
}

impl GatedHooks {
    pub fn holding() -> Self {
        Self {
            inner: CountingHooks::default(),
            open: Arc::new(AtomicBool::new(false)),
            entered: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn released() -> Self {
        let hooks = Self::holding();
        hooks.release();
        hooks
    }

    pub fn hold(&self) {
        self.open.store(false, Ordering::SeqCst);
    }

    pub fn release(&self) {
        self.open.store(true, Ordering::SeqCst);
    }

    /// Connections that reached `on_connect`, parked or not.
    pub fn entered(&self) -> usize {
        self.entered.load(Ordering::SeqCst)
    }

    pub fn log(&self) -> Arc<HookLog> {
        self.inner.log()
    }
}

impl Hooks for GatedHooks {
    fn on_connect(&self, session: &Arc<Session>) {
        self.entered.fetch_add(1, Ordering::SeqCst);
        // Capped so a regression hangs the assertion, not the suite.
        let deadline = Instant::now() + Duration::from_secs(5);
        while !self.open.load(Ordering::SeqCst) && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(2));
        }
        self.inner.on_connect(session);
    }

    fn on_add_session(&self, session: &Arc<Session>) {
        self.inner.on_add_session(session);
    }

    fn on_del_session(&self, session: &Arc<Session>) {
        self.inner.on_del_session(session);
    }

    fn on_close(&self, session: &Arc<Session>) {
        self.inner.on_close(session);
    }

    fn on_except(&self, session: &Arc<Session>, error: &WireError) {
        self.inner.on_except(session, error);
    }

    fn on_unknown_message(&self, session: &Arc<Session>, type_id: u32, payload: &[u8]) -> bool {
        self.inner.on_unknown_message(session, type_id, payload)
    }
}

/// Server configuration on an ephemeral localhost port with intervals
/// short enough for tests.
pub fn test_config() -> Config {
    let mut config = Config::with_ip("127.0.0.1", 0);
    config.send_interval = Duration::from_millis(100);
    config.expire_time = Duration::from_secs(30);
    config
}

/// Client configuration for a server already listening on `port`.
/// Reconnect is off so a dropped link ends the test instead of looping.
pub fn client_config(port: u16) -> Config {
    let mut config = Config::with_ip("127.0.0.1", port);
    config.send_interval = Duration::from_millis(100);
    config.expire_time = Duration::from_secs(30);
    config.reconnect = false;
    config
}

/// Poll `probe` every 10ms until it reports true or `deadline` passes.
pub async fn wait_for<F, Fut>(deadline: Duration, mut probe: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let start = tokio::time::Instant::now();
    while start.elapsed() < deadline {
        if probe().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
