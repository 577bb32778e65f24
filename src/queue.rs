// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Queue Resolution
//!
//! The runtime queue handle and the resolver that turns a configured queue name
//! into a handle on a channel. With fabric auto-setup the queue is declared and
//! bound to its exchange using the configured routing key.

use crate::{
    broker::{AmqpChannel, Delivery},
    config::{QueueSpec, TopologyConfig},
    errors::{AmqpError, ConfigurationError, ResolveError},
};
use std::sync::Arc;
use tracing::{debug, error};

/// Constant for the argument used to specify a dead letter exchange
pub const AMQP_HEADERS_DEAD_LETTER_EXCHANGE: &str = "x-dead-letter-exchange";
/// Constant for the argument used to specify a dead letter routing key
pub const AMQP_HEADERS_DEAD_LETTER_ROUTING_KEY: &str = "x-dead-letter-routing-key";
/// Constant for the argument used to specify message TTL
pub const AMQP_HEADERS_MESSAGE_TTL: &str = "x-message-ttl";
/// Constant for the argument used to specify maximum queue length
pub const AMQP_HEADERS_MAX_LENGTH: &str = "x-max-length";
/// Constant for the argument used to specify maximum queue size in bytes
pub const AMQP_HEADERS_MAX_LENGTH_BYTES: &str = "x-max-length-bytes";

/// A resolved queue bound to the channel it was resolved on.
#[derive(Clone)]
pub struct Queue {
    name: String,
    spec: QueueSpec,
    channel: Arc<dyn AmqpChannel>,
}

impl Queue {
    pub(crate) fn new(name: &str, spec: QueueSpec, channel: Arc<dyn AmqpChannel>) -> Self {
        Queue {
            name: name.to_owned(),
            spec,
            channel,
        }
    }

    /// The configured queue name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The declaration and binding parameters of the queue.
    pub fn spec(&self) -> &QueueSpec {
        &self.spec
    }

    /// Fetches the next message, if any.
    pub async fn get(&self) -> Result<Option<Delivery>, AmqpError> {
        self.channel.basic_get(&self.name).await
    }

    /// Acknowledges a single delivery.
    pub async fn ack(&self, delivery_tag: u64) -> Result<(), AmqpError> {
        self.channel.basic_ack(delivery_tag).await
    }

    /// Rejects a single delivery, requeueing it when `requeue` is set.
    pub async fn nack(&self, delivery_tag: u64, requeue: bool) -> Result<(), AmqpError> {
        self.channel.basic_nack(delivery_tag, requeue).await
    }
}

impl std::fmt::Debug for Queue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Queue")
            .field("name", &self.name)
            .field("spec", &self.spec)
            .finish_non_exhaustive()
    }
}

/// Resolves configured queues into [`Queue`] handles.
pub struct QueueResolver<'cfg> {
    config: &'cfg TopologyConfig,
}

impl<'cfg> QueueResolver<'cfg> {
    pub fn new(config: &'cfg TopologyConfig) -> Self {
        QueueResolver { config }
    }

    /// Resolves the queue `name` on `channel`.
    ///
    /// With `auto_setup` the queue is declared and bound to its exchange;
    /// otherwise it is assumed to exist already.
    pub async fn resolve(
        &self,
        channel: &Arc<dyn AmqpChannel>,
        name: &str,
        auto_setup: bool,
    ) -> Result<Queue, ResolveError> {
        let Some(spec) = self.config.queues.get(name) else {
            return Err(ConfigurationError::UnknownQueue {
                queue: name.to_owned(),
            }
            .into());
        };

        if auto_setup {
            self.declare(channel, name, spec).await?;
        }

        Ok(Queue::new(name, spec.clone(), channel.clone()))
    }

    async fn declare(
        &self,
        channel: &Arc<dyn AmqpChannel>,
        name: &str,
        spec: &QueueSpec,
    ) -> Result<(), AmqpError> {
        debug!(queue = name, "declaring queue");

        if let Err(err) = channel.queue_declare(name, spec).await {
            error!(error = err.to_string(), queue = name, "failure to declare queue");
            return Err(err);
        }

        debug!(
            "binding queue: {} to the exchange: {} with the key: {}",
            name, spec.exchange, spec.routing_key
        );

        if let Err(err) = channel
            .queue_bind(name, &spec.exchange, &spec.routing_key)
            .await
        {
            error!(error = err.to_string(), queue = name, "error to bind queue to exchange");
            return Err(err);
        }

        Ok(())
    }
}
