//! # Configuration
//!
//! One structure covering servers and clients: address, socket options,
//! heartbeat timing, security transforms, TLS, and reconnect behavior.
//!
//! ## Configuration Sources
//! - TOML files via `from_file()`
//! - Direct instantiation with defaults, fields adjusted as needed
//!
//! Durations are expressed in whole seconds in TOML. Defaults suit a
//! long-lived service link: heartbeats every 10 seconds, expiry after 300,
//! reconnect retried every second.

use crate::error::{Result, WireError};
use crate::security::SecurityKind;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Duration;

/// Settings for one endpoint, server or client.
///
/// The same structure drives both roles; fields that only apply to one
/// (backlog to servers, reconnect to clients) are ignored by the other.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Address to bind (server) or connect to (client). Hostnames are
    /// resolved; the first address wins.
    pub ip: String,

    /// Port to bind or connect to. Servers may use `0` for an ephemeral
    /// port.
    pub port: u16,

    /// Namespace tag for message types, recorded in logs.
    pub msg_namespace: String,

    /// Namespace tag for action handlers, recorded in logs.
    pub action_namespace: String,

    /// Transform applied to inbound frame bodies.
    pub in_security: SecurityKind,

    /// Transform applied to outbound frame bodies.
    pub out_security: SecurityKind,

    /// Wrap the byte stream in TLS.
    pub ssl_enabled: bool,

    /// PEM bundle path: certificate chain plus PKCS#8 key for servers,
    /// trusted roots for clients. Empty on a client accepts any server
    /// certificate.
    pub ks_path: String,

    /// Accepted for compatibility with keystore-style deployments; the
    /// PEM loader does not use it.
    pub ks_password: String,

    /// Accepted for compatibility with keystore-style deployments; the
    /// PEM loader does not use it.
    pub cert_password: String,

    /// Disable Nagle's algorithm on each stream.
    pub tcp_no_delay: bool,

    /// Listen backlog for servers.
    pub backlog: u32,

    /// Enable TCP keepalive on each socket.
    pub keep_alive: bool,

    /// Heartbeat cadence: clients ping and check expiry at this interval,
    /// servers sweep for expired sessions at it.
    #[serde(with = "duration_secs")]
    pub send_interval: Duration,

    /// A session whose last heartbeat is older than this is expired and
    /// closed abnormally.
    #[serde(with = "duration_secs")]
    pub expire_time: Duration,

    /// Socket send buffer size in bytes.
    pub socket_send_buff: u32,

    /// Socket receive buffer size in bytes.
    pub socket_recv_buff: u32,

    /// Largest allowed frame body in bytes, enforced in both directions.
    pub max_msg_size: u32,

    /// Whether a client re-establishes dropped links.
    pub reconnect: bool,

    /// Fixed delay between client reconnect attempts.
    #[serde(with = "duration_secs")]
    pub reconnect_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ip: String::from("0.0.0.0"),
            port: 0,
            msg_namespace: String::new(),
            action_namespace: String::new(),
            in_security: SecurityKind::None,
            out_security: SecurityKind::None,
            ssl_enabled: false,
            ks_path: String::new(),
            ks_password: String::new(),
            cert_password: String::new(),
            tcp_no_delay: false,
            backlog: 1000,
            keep_alive: true,
            send_interval: Duration::from_secs(10),
            expire_time: Duration::from_secs(300),
            socket_send_buff: 16 * 1024,
            socket_recv_buff: 16 * 1024,
            max_msg_size: 64 * 1024,
            reconnect: true,
            reconnect_interval: Duration::from_secs(1),
        }
    }
}

impl Config {
    /// Defaults with the given port, listening on all interfaces.
    pub fn new(port: u16) -> Self {
        Self {
            port,
            ..Self::default()
        }
    }

    /// Defaults with an explicit address.
    pub fn with_ip(ip: impl Into<String>, port: u16) -> Self {
        Self {
            ip: ip.into(),
            port,
            ..Self::default()
        }
    }

    /// Tag this endpoint's message and action namespaces.
    pub fn namespaces(mut self, msg: impl Into<String>, action: impl Into<String>) -> Self {
        self.msg_namespace = msg.into();
        self.action_namespace = action.into();
        self
    }

    /// Enable TLS with the given PEM bundle. The passwords are accepted
    /// for compatibility and recorded but not used by the PEM loader.
    pub fn support_ssl(
        mut self,
        ks_path: impl Into<String>,
        ks_password: impl Into<String>,
        cert_password: impl Into<String>,
    ) -> Self {
        self.ssl_enabled = true;
        self.ks_path = ks_path.into();
        self.ks_password = ks_password.into();
        self.cert_password = cert_password.into();
        self
    }

    /// `ip:port` as a display string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }

    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path)
            .map_err(|e| WireError::ConfigError(format!("failed to open config file: {e}")))?;

        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .map_err(|e| WireError::ConfigError(format!("failed to read config file: {e}")))?;

        Self::from_toml(&contents)
    }

    /// Load configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str::<Self>(content)
            .map_err(|e| WireError::ConfigError(format!("failed to parse TOML: {e}")))
    }

    /// Generate example configuration file content.
    pub fn example_config() -> String {
        toml::to_string_pretty(&Self::default())
            .unwrap_or_else(|_| String::from("# failed to generate example config"))
    }

    /// Save configuration to a file.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| WireError::ConfigError(format!("failed to serialize config: {e}")))?;

        std::fs::write(path, content)
            .map_err(|e| WireError::ConfigError(format!("failed to write config file: {e}")))?;

        Ok(())
    }

    /// Validate the configuration for common mistakes.
    ///
    /// Returns a list of validation errors; empty means valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.ip.is_empty() {
            errors.push("ip cannot be empty".to_string());
        }

        if self.send_interval.is_zero() {
            errors.push("send_interval must be positive".to_string());
        }
        if self.expire_time <= self.send_interval {
            errors.push(format!(
                "expire_time ({:?}) must exceed send_interval ({:?})",
                self.expire_time, self.send_interval
            ));
        }
        if self.reconnect && self.reconnect_interval.is_zero() {
            errors.push("reconnect_interval must be positive when reconnect is enabled".to_string());
        }

        if self.max_msg_size == 0 {
            errors.push("max_msg_size must be greater than 0".to_string());
        }
        if self.backlog == 0 {
            errors.push("backlog must be greater than 0".to_string());
        }
        if self.socket_send_buff == 0 {
            errors.push("socket_send_buff must be greater than 0".to_string());
        }
        if self.socket_recv_buff == 0 {
            errors.push("socket_recv_buff must be greater than 0".to_string());
        }

        errors
    }

    /// Validate and return `Result`.
    pub fn validate_strict(&self) -> Result<()> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(WireError::ConfigError(format!(
                "configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )))
        }
    }
}

/// Serialize durations as whole seconds.
mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
