//! Server configuration
//!
//! Defaults, overridden by the first positional argument (bind address) and
//! a few `CHAT_*` environment variables.

use std::env;
use std::time::Duration;

use tracing::warn;

use crate::codec::DEFAULT_MAX_FRAME_LENGTH;

/// Default server address
pub const DEFAULT_ADDR: &str = "127.0.0.1:8080";

/// Default per-session outbound queue size
pub const DEFAULT_OUTBOUND_CAPACITY: usize = 64;

/// How long a closing session may spend flushing queued replies
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

const ADDR_VAR: &str = "CHAT_ADDR";
const OUTBOUND_CAPACITY_VAR: &str = "CHAT_OUTBOUND_CAPACITY";
const MAX_FRAME_VAR: &str = "CHAT_MAX_FRAME";
const SHUTDOWN_GRACE_VAR: &str = "CHAT_SHUTDOWN_GRACE_MS";

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// host:port to listen on
    pub addr: String,
    /// Messages buffered per session before the peer counts as lagging
    pub outbound_capacity: usize,
    /// Largest accepted frame payload in bytes
    pub max_frame_length: usize,
    /// Time a closing session's writer gets to flush its queue before it is aborted
    pub shutdown_grace: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: DEFAULT_ADDR.to_string(),
            outbound_capacity: DEFAULT_OUTBOUND_CAPACITY,
            max_frame_length: DEFAULT_MAX_FRAME_LENGTH,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
        }
    }
}

impl ServerConfig {
    /// Build from the process arguments and environment
    pub fn from_env() -> Self {
        Self::from_sources(env::args().nth(1), |key| env::var(key).ok())
    }

    fn from_sources(arg: Option<String>, var: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            addr: arg.or_else(|| var(ADDR_VAR)).unwrap_or(defaults.addr),
            outbound_capacity: parse_positive(OUTBOUND_CAPACITY_VAR, var(OUTBOUND_CAPACITY_VAR))
                .unwrap_or(defaults.outbound_capacity),
            max_frame_length: parse_positive(MAX_FRAME_VAR, var(MAX_FRAME_VAR))
                .unwrap_or(defaults.max_frame_length),
            shutdown_grace: parse_positive(SHUTDOWN_GRACE_VAR, var(SHUTDOWN_GRACE_VAR))
                .map(|ms| Duration::from_millis(ms as u64))
                .unwrap_or(defaults.shutdown_grace),
        }
    }
}

fn parse_positive(key: &str, value: Option<String>) -> Option<usize> {
    let value = value?;
    match value.parse::<usize>() {
        Ok(n) if n > 0 => Some(n),
        _ => {
            warn!("Ignoring {}={:?}: expected a positive integer", key, value);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ServerConfig::from_sources(None, lookup(&[]));
        assert_eq!(config.addr, DEFAULT_ADDR);
        assert_eq!(config.outbound_capacity, DEFAULT_OUTBOUND_CAPACITY);
        assert_eq!(config.max_frame_length, DEFAULT_MAX_FRAME_LENGTH);
        assert_eq!(config.shutdown_grace, DEFAULT_SHUTDOWN_GRACE);
    }

    #[test]
    fn test_argument_beats_environment() {
        let vars = lookup(&[(ADDR_VAR, "0.0.0.0:9000")]);
        let config = ServerConfig::from_sources(Some("127.0.0.1:7000".to_string()), vars);
        assert_eq!(config.addr, "127.0.0.1:7000");

        let vars = lookup(&[(ADDR_VAR, "0.0.0.0:9000")]);
        assert_eq!(ServerConfig::from_sources(None, vars).addr, "0.0.0.0:9000");
    }

    #[test]
    fn test_numeric_overrides() {
        let vars = lookup(&[(OUTBOUND_CAPACITY_VAR, "8"), (MAX_FRAME_VAR, "zero")]);
        let config = ServerConfig::from_sources(None, vars);
        assert_eq!(config.outbound_capacity, 8);
        assert_eq!(config.max_frame_length, DEFAULT_MAX_FRAME_LENGTH);
    }

    #[test]
    fn test_shutdown_grace_in_millis() {
        let config = ServerConfig::from_sources(None, lookup(&[(SHUTDOWN_GRACE_VAR, "250")]));
        assert_eq!(config.shutdown_grace, Duration::from_millis(250));

        let config = ServerConfig::from_sources(None, lookup(&[(SHUTDOWN_GRACE_VAR, "-1")]));
        assert_eq!(config.shutdown_grace, DEFAULT_SHUTDOWN_GRACE);
    }
}
