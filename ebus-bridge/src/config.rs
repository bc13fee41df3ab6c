//! Bridge configuration: adapter/broker endpoints and the TX engine's
//! timeouts, overridable from the environment.

use std::time::Duration;

use ebus_link::TxTimeouts;

/// All externally tunable bridge settings.
///
/// `Config::default()` reproduces the original's hardcoded constants;
/// [`Config::from_env`] lets any field be overridden by an `EBUS_`-prefixed
/// environment variable, the same "env var overrides a default" shape
/// `layer-bot` uses for `RUST_LOG`.
///
/// `broker_url`, `client_id`, `rx_topic`, and `tx_topic` are forward-looking
/// placeholders: `ebus-bridge` ships only the [`crate::BrokerClient`] trait
/// and an in-process loopback double, not a real broker connection, so
/// these four fields are parsed and logged at startup but don't yet
/// configure anything — they're here for the real `BrokerClient` a
/// deployment wires in. `arbitration_timeout`, `ack_timeout`,
/// `response_timeout`, and `broadcast_settle` *are* load-bearing: see
/// [`Config::tx_timeouts`].
#[derive(Debug, Clone)]
pub struct Config {
    /// Hostname or address of the TCP serial adapter.
    pub adapter_host: String,
    /// TCP port of the serial adapter.
    pub adapter_port: u16,
    /// Broker connection URL. Not yet consumed; see the struct-level docs.
    pub broker_url: String,
    /// Client identifier announced to the broker. Not yet consumed; see
    /// the struct-level docs.
    pub client_id: String,
    /// Topic the bridge subscribes to for outgoing telegram requests. Not
    /// yet consumed; see the struct-level docs.
    pub rx_topic: String,
    /// Topic the bridge publishes observed/answered telegrams to. Not yet
    /// consumed; see the struct-level docs.
    pub tx_topic: String,
    /// How long to wait for an arbitration result before giving up.
    pub arbitration_timeout: Duration,
    /// How long to wait for a slave ACK/NAK before giving up.
    pub ack_timeout: Duration,
    /// How long to wait for a slave response frame before giving up.
    pub response_timeout: Duration,
    /// How long to wait after a broadcast before releasing the bus.
    pub broadcast_settle: Duration,
    /// How long to pause before retrying after a fatal adapter error.
    pub retry_pause: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            adapter_host: "localhost".to_string(),
            adapter_port: 9999,
            broker_url: "mqtt://localhost:1883".to_string(),
            client_id: "ebus-bridge".to_string(),
            rx_topic: "ebus/tx".to_string(),
            tx_topic: "ebus/rx".to_string(),
            arbitration_timeout: Duration::from_secs(1),
            ack_timeout: Duration::from_secs(1),
            response_timeout: Duration::from_secs(1),
            broadcast_settle: Duration::from_millis(10),
            retry_pause: Duration::from_secs(10),
        }
    }
}

impl Config {
    /// Build a config starting from [`Config::default`] and overriding any
    /// field whose `EBUS_<FIELD>` environment variable is set and parses.
    ///
    /// A present-but-unparsable variable is logged and ignored, falling
    /// back to the default for that field rather than failing startup.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_str("EBUS_ADAPTER_HOST", |c, v| c.adapter_host = v);
        config.apply_parsed("EBUS_ADAPTER_PORT", |c, v| c.adapter_port = v);
        config.apply_str("EBUS_BROKER_URL", |c, v| c.broker_url = v);
        config.apply_str("EBUS_CLIENT_ID", |c, v| c.client_id = v);
        config.apply_str("EBUS_RX_TOPIC", |c, v| c.rx_topic = v);
        config.apply_str("EBUS_TX_TOPIC", |c, v| c.tx_topic = v);
        config.apply_millis("EBUS_ARBITRATION_TIMEOUT_MS", |c, v| c.arbitration_timeout = v);
        config.apply_millis("EBUS_ACK_TIMEOUT_MS", |c, v| c.ack_timeout = v);
        config.apply_millis("EBUS_RESPONSE_TIMEOUT_MS", |c, v| c.response_timeout = v);
        config.apply_millis("EBUS_BROADCAST_SETTLE_MS", |c, v| c.broadcast_settle = v);
        config.apply_millis("EBUS_RETRY_PAUSE_MS", |c, v| c.retry_pause = v);
        config
    }

    /// The subset of this config that governs [`ebus_link::TxEngine`]'s
    /// `tick()` timing, ready to hand to `TxEngine::with_timeouts`.
    pub fn tx_timeouts(&self) -> TxTimeouts {
        TxTimeouts {
            arbitration: self.arbitration_timeout,
            ack: self.ack_timeout,
            response: self.response_timeout,
            broadcast_settle: self.broadcast_settle,
        }
    }

    fn apply_str(&mut self, var: &str, set: impl FnOnce(&mut Self, String)) {
        if let Ok(v) = std::env::var(var) {
            set(self, v);
        }
    }

    fn apply_parsed<T: std::str::FromStr>(&mut self, var: &str, set: impl FnOnce(&mut Self, T)) {
        if let Ok(v) = std::env::var(var) {
            match v.parse() {
                Ok(parsed) => set(self, parsed),
                Err(_) => log::warn!("ignoring unparsable {var}={v}"),
            }
        }
    }

    fn apply_millis(&mut self, var: &str, set: impl FnOnce(&mut Self, Duration)) {
        if let Ok(v) = std::env::var(var) {
            match v.parse::<u64>() {
                Ok(ms) => set(self, Duration::from_millis(ms)),
                Err(_) => log::warn!("ignoring unparsable {var}={v}"),
            }
        }
    }
}
