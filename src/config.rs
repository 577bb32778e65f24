// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Topology Configuration
//!
//! Declarative description of connections, exchanges, queues, consumers and
//! producers. Every section is a map keyed by the entity's unique name; an
//! entity without a `connection` lives on `default_connection`.
//!
//! ```json
//! {
//!   "default_connection": "default",
//!   "connections": { "default": { "host": "localhost" } },
//!   "exchanges": { "orders": { "type": "topic", "durable": true } },
//!   "queues": { "orders.created": { "exchange": "orders", "routing_key": "created" } },
//!   "consumers": { "orders": { "queues": ["orders.created"], "callback": "handle_order" } }
//! }
//! ```

use crate::{errors::ConfigurationError, events::AggregateListener, exchange::ExchangeKind};
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use serde::{Deserialize, Deserializer};
use std::{collections::HashMap, fmt, path::Path, sync::Arc};

/// Name of the connection used when nothing else is configured
pub const DEFAULT_CONNECTION_NAME: &str = "default";
/// Default consumer idle timeout in seconds
pub const DEFAULT_IDLE_TIMEOUT: f64 = 5.0;
/// Default consumer wait timeout in microseconds
pub const DEFAULT_WAIT_TIMEOUT: u64 = 100_000;

const VHOST_ENCODE_SET: &AsciiSet = &CONTROLS.add(b'/').add(b'?').add(b'#').add(b'%');

fn default_connection_name() -> String {
    DEFAULT_CONNECTION_NAME.to_owned()
}

/// The whole topology: every named entity plus the default connection name.
#[derive(Debug, Clone, Deserialize)]
pub struct TopologyConfig {
    #[serde(default = "default_connection_name")]
    pub default_connection: String,
    #[serde(default)]
    pub connections: HashMap<String, ConnectionSpec>,
    #[serde(default)]
    pub exchanges: HashMap<String, ExchangeSpec>,
    #[serde(default)]
    pub queues: HashMap<String, QueueSpec>,
    #[serde(default)]
    pub consumers: HashMap<String, ConsumerSpec>,
    #[serde(default)]
    pub producers: HashMap<String, ProducerSpec>,
}

impl Default for TopologyConfig {
    fn default() -> Self {
        TopologyConfig {
            default_connection: default_connection_name(),
            connections: HashMap::default(),
            exchanges: HashMap::default(),
            queues: HashMap::default(),
            consumers: HashMap::default(),
            producers: HashMap::default(),
        }
    }
}

impl TopologyConfig {
    /// Parses a JSON document into a topology configuration.
    pub fn from_json_str(input: &str) -> Result<TopologyConfig, ConfigurationError> {
        serde_json::from_str(input).map_err(|err| ConfigurationError::Parse(err.to_string()))
    }

    /// Reads and parses a JSON configuration file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<TopologyConfig, ConfigurationError> {
        let raw = std::fs::read_to_string(path.as_ref())
            .map_err(|err| ConfigurationError::Io(format!("{}: {}", path.as_ref().display(), err)))?;

        Self::from_json_str(&raw)
    }

    /// Returns the entity's own connection, or the default connection name.
    pub fn effective_connection<'a>(&'a self, connection: &'a Option<String>) -> &'a str {
        connection.as_deref().unwrap_or(&self.default_connection)
    }

    /// Sets the connection used by entities that name none.
    pub fn with_default_connection(mut self, name: &str) -> Self {
        self.default_connection = name.to_owned();
        self
    }

    /// Adds or replaces the connection `name`.
    ///
    /// # Parameters
    /// * `name` - Name consumers, producers, queues and exchanges refer to
    /// * `spec` - Broker address and credentials
    ///
    /// # Returns
    /// Self for method chaining
    pub fn with_connection(mut self, name: &str, spec: ConnectionSpec) -> Self {
        self.connections.insert(name.to_owned(), spec);
        self
    }

    /// Adds or replaces the exchange `name`.
    pub fn with_exchange(mut self, name: &str, spec: ExchangeSpec) -> Self {
        self.exchanges.insert(name.to_owned(), spec);
        self
    }

    /// Adds or replaces the queue `name`.
    pub fn with_queue(mut self, name: &str, spec: QueueSpec) -> Self {
        self.queues.insert(name.to_owned(), spec);
        self
    }

    /// Adds or replaces the consumer `name`.
    pub fn with_consumer(mut self, name: &str, spec: ConsumerSpec) -> Self {
        self.consumers.insert(name.to_owned(), spec);
        self
    }

    /// Adds or replaces the producer `name`.
    pub fn with_producer(mut self, name: &str, spec: ProducerSpec) -> Self {
        self.producers.insert(name.to_owned(), spec);
        self
    }
}

/// Transport parameters of a broker connection.
#[derive(Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ConnectionSpec {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub vhost: String,
}

impl Default for ConnectionSpec {
    fn default() -> Self {
        ConnectionSpec {
            host: "localhost".to_owned(),
            port: 5672,
            user: "guest".to_owned(),
            password: "guest".to_owned(),
            vhost: "/".to_owned(),
        }
    }
}

impl ConnectionSpec {
    /// Composes the `amqp://` URI, percent-encoding the vhost.
    pub fn uri(&self) -> String {
        format!(
            "amqp://{}:{}@{}:{}/{}",
            self.user,
            self.password,
            self.host,
            self.port,
            utf8_percent_encode(&self.vhost, VHOST_ENCODE_SET)
        )
    }
}

impl fmt::Debug for ConnectionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionSpec")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"***")
            .field("vhost", &self.vhost)
            .finish()
    }
}

/// Declaration parameters of an exchange.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ExchangeSpec {
    #[serde(rename = "type")]
    pub kind: ExchangeKind,
    pub durable: bool,
    pub auto_delete: bool,
    pub internal: bool,
    pub passive: bool,
    /// Underlying routing type of an `x-delayed-message` exchange
    pub delayed_type: Option<String>,
    pub connection: Option<String>,
}

impl ExchangeSpec {
    /// Creates a transient exchange of the given kind on the default connection.
    pub fn new(kind: ExchangeKind) -> Self {
        ExchangeSpec {
            kind,
            ..Default::default()
        }
    }

    /// Makes the exchange survive broker restarts.
    pub fn durable(mut self) -> Self {
        self.durable = true;
        self
    }

    /// Places the exchange on a named connection instead of the default one.
    pub fn on_connection(mut self, connection: &str) -> Self {
        self.connection = Some(connection.to_owned());
        self
    }
}

/// Declaration and binding parameters of a queue.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct QueueSpec {
    pub exchange: String,
    #[serde(default)]
    pub routing_key: String,
    #[serde(default)]
    pub durable: bool,
    #[serde(default)]
    pub auto_delete: bool,
    #[serde(default)]
    pub exclusive: bool,
    #[serde(default)]
    pub passive: bool,
    /// Message TTL in milliseconds
    pub ttl: Option<i32>,
    pub max_length: Option<i32>,
    pub max_length_bytes: Option<i32>,
    pub dead_letter_exchange: Option<String>,
    pub dead_letter_routing_key: Option<String>,
    pub connection: Option<String>,
}

impl QueueSpec {
    /// Creates a queue bound to `exchange` with an empty routing key.
    pub fn new(exchange: &str) -> Self {
        QueueSpec {
            exchange: exchange.to_owned(),
            ..Default::default()
        }
    }

    /// Sets the key the queue is bound with.
    pub fn routing_key(mut self, key: &str) -> Self {
        self.routing_key = key.to_owned();
        self
    }

    /// Places the queue on a named connection instead of the default one.
    pub fn on_connection(mut self, connection: &str) -> Self {
        self.connection = Some(connection.to_owned());
        self
    }
}

/// Channel-level flow control applied when a channel is opened.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
pub struct QosSpec {
    pub prefetch_count: u16,
    #[serde(default)]
    pub global: bool,
}

/// A listener entry of a consumer: either the name of a registered service or
/// an already constructed listener.
#[derive(Clone)]
pub enum ListenerRef {
    Named(String),
    Instance(Arc<dyn AggregateListener>),
}

impl fmt::Debug for ListenerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListenerRef::Named(name) => f.debug_tuple("Named").field(name).finish(),
            ListenerRef::Instance(_) => f.write_str("Instance(..)"),
        }
    }
}

impl<'de> Deserialize<'de> for ListenerRef {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        String::deserialize(deserializer).map(ListenerRef::Named)
    }
}

/// Describes how a consumer is assembled.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConsumerSpec {
    #[serde(default)]
    pub queues: Vec<String>,
    pub connection: Option<String>,
    /// Seconds without deliveries before a flush
    pub idle_timeout: Option<f64>,
    /// Microseconds to wait between empty polls
    pub wait_timeout: Option<u64>,
    pub logger: Option<String>,
    pub callback: Option<String>,
    pub flush_callback: Option<String>,
    pub error_callback: Option<String>,
    #[serde(default)]
    pub listeners: Vec<ListenerRef>,
    #[serde(default)]
    pub auto_setup_fabric: bool,
    pub qos: Option<QosSpec>,
}

impl ConsumerSpec {
    /// Creates a consumer of `queues`, consumed in the given order.
    ///
    /// # Parameters
    /// * `queues` - Names of configured queues
    ///
    /// # Returns
    /// A spec with default timeouts, no pipeline and no fabric auto-setup
    pub fn new(queues: &[&str]) -> Self {
        ConsumerSpec {
            queues: queues.iter().map(|q| (*q).to_owned()).collect(),
            ..Default::default()
        }
    }

    /// Runs the consumer on a named connection instead of the default one.
    pub fn on_connection(mut self, connection: &str) -> Self {
        self.connection = Some(connection.to_owned());
        self
    }

    /// Declares and binds the consumed queues and their exchanges on assembly.
    pub fn auto_setup_fabric(mut self) -> Self {
        self.auto_setup_fabric = true;
        self
    }

    /// Names the logger service whose listener is attached first.
    pub fn logger(mut self, name: &str) -> Self {
        self.logger = Some(name.to_owned());
        self
    }

    /// Names the callback attached to `delivery`.
    pub fn callback(mut self, name: &str) -> Self {
        self.callback = Some(name.to_owned());
        self
    }

    /// Names the callback attached to `flush`.
    pub fn flush_callback(mut self, name: &str) -> Self {
        self.flush_callback = Some(name.to_owned());
        self
    }

    /// Names the callback attached to both `deliveryException` and
    /// `flushDeferredException`.
    pub fn error_callback(mut self, name: &str) -> Self {
        self.error_callback = Some(name.to_owned());
        self
    }

    /// Appends an aggregate listener; listeners attach in the order added.
    pub fn listener(mut self, listener: ListenerRef) -> Self {
        self.listeners.push(listener);
        self
    }

    /// Sets the prefetch applied to the consumer's channel.
    pub fn qos(mut self, qos: QosSpec) -> Self {
        self.qos = Some(qos);
        self
    }
}

/// Describes how a producer is assembled.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct ProducerSpec {
    #[serde(default)]
    pub exchange: String,
    pub connection: Option<String>,
    #[serde(default)]
    pub auto_setup_fabric: bool,
    pub qos: Option<QosSpec>,
}

impl ProducerSpec {
    /// Creates a producer publishing to `exchange`.
    pub fn new(exchange: &str) -> Self {
        ProducerSpec {
            exchange: exchange.to_owned(),
            ..Default::default()
        }
    }

    /// Declares the exchange on assembly.
    pub fn auto_setup_fabric(mut self) -> Self {
        self.auto_setup_fabric = true;
        self
    }
}
