// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Connection Resolution
//!
//! Connections are created lazily on first use and then shared for the lifetime
//! of the [`ConnectionCache`]: one live connection per configured name and
//! broker URI.
//!
//! The cache is the only shared mutable state of topology resolution. Population
//! is single-flight: concurrent resolutions of the same name wait for the first
//! caller's connect and then reuse its result.

use crate::{
    broker::{AmqpClient, AmqpConnection},
    config::TopologyConfig,
    errors::{ConfigurationError, ResolveError},
};
use parking_lot::Mutex;
use std::{collections::HashMap, sync::Arc};
use tokio::sync::OnceCell;
use tracing::{debug, error};

type ConnectionSlot = Arc<OnceCell<Arc<dyn AmqpConnection>>>;

/// Connection cache shared by every resolver of a process.
///
/// Slots are keyed by connection name and URI, so resolvers built from
/// different configurations never hand out each other's connections even when
/// they reuse a name.
#[derive(Default)]
pub struct ConnectionCache {
    slots: Mutex<HashMap<(String, String), ConnectionSlot>>,
}

impl ConnectionCache {
    /// Creates an empty cache ready to be shared.
    pub fn new() -> Arc<ConnectionCache> {
        Arc::new(ConnectionCache::default())
    }

    /// Reports whether a live connection is cached under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.slots
            .lock()
            .iter()
            .any(|((slot_name, _), slot)| slot_name == name && slot.initialized())
    }

    fn slot(&self, name: &str, uri: String) -> ConnectionSlot {
        self.slots
            .lock()
            .entry((name.to_owned(), uri))
            .or_default()
            .clone()
    }
}

/// Looks up or lazily creates named connections.
pub struct ConnectionResolver {
    client: Arc<dyn AmqpClient>,
    config: Arc<TopologyConfig>,
    cache: Arc<ConnectionCache>,
}

impl ConnectionResolver {
    /// Creates a resolver over `config` that stores connections in `cache`.
    pub fn new(
        client: Arc<dyn AmqpClient>,
        config: Arc<TopologyConfig>,
        cache: Arc<ConnectionCache>,
    ) -> Self {
        ConnectionResolver {
            client,
            config,
            cache,
        }
    }

    /// Returns the connection configured under `name`, connecting on first use.
    ///
    /// Repeated calls return the same handle. A failed connect is not cached.
    pub async fn resolve(&self, name: &str) -> Result<Arc<dyn AmqpConnection>, ResolveError> {
        let Some(spec) = self.config.connections.get(name) else {
            return Err(ConfigurationError::UnknownConnection {
                connection: name.to_owned(),
            }
            .into());
        };

        let slot = self.cache.slot(name, spec.uri());
        let connection = slot
            .get_or_try_init(|| async {
                debug!(connection = name, "creating amqp connection...");

                match self.client.connect(name, spec).await {
                    Ok(conn) => {
                        debug!(connection = name, "amqp connected");
                        Ok(conn)
                    }
                    Err(err) => {
                        error!(error = err.to_string(), connection = name, "failure to connect");
                        Err(err)
                    }
                }
            })
            .await?;

        Ok(connection.clone())
    }
}
