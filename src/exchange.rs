// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Exchange Resolution
//!
//! Exchange types, the runtime exchange handle, and the resolver that turns a
//! configured exchange name into a handle on a channel, declaring it on the
//! broker when fabric auto-setup is requested.

use crate::{
    broker::{AmqpChannel, MessageProperties},
    config::{ExchangeSpec, TopologyConfig},
    errors::{AmqpError, ConfigurationError, ResolveError},
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, error};

/// Constant for the argument used to specify the delayed exchange type
pub const AMQP_HEADERS_DELAYED_EXCHANGE_TYPE: &str = "x-delayed-type";

/// Represents the types of exchanges available in RabbitMQ.
///
/// Each exchange type has specific routing behavior:
/// - Direct: Routes messages to queues based on an exact match of routing keys
/// - Fanout: Broadcasts messages to all bound queues regardless of routing keys
/// - Topic: Routes messages based on wildcard pattern matching of routing keys
/// - Headers: Routes based on message header values instead of routing keys
/// - XMessageDelayed: Extension for delayed message delivery (plugin required)
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExchangeKind {
    #[default]
    Direct,
    Fanout,
    Topic,
    Headers,
    #[serde(rename = "x-delayed-message")]
    XMessageDelayed,
}

impl From<&ExchangeKind> for lapin::ExchangeKind {
    fn from(kind: &ExchangeKind) -> lapin::ExchangeKind {
        match kind {
            ExchangeKind::Direct => lapin::ExchangeKind::Direct,
            ExchangeKind::Fanout => lapin::ExchangeKind::Fanout,
            ExchangeKind::Headers => lapin::ExchangeKind::Headers,
            ExchangeKind::Topic => lapin::ExchangeKind::Topic,
            ExchangeKind::XMessageDelayed => {
                lapin::ExchangeKind::Custom("x-delayed-message".to_owned())
            }
        }
    }
}

/// A resolved exchange bound to the channel it was resolved on.
#[derive(Clone)]
pub struct Exchange {
    name: String,
    spec: ExchangeSpec,
    channel: Arc<dyn AmqpChannel>,
}

impl Exchange {
    /// The configured exchange name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The declaration parameters the exchange was resolved with.
    pub fn spec(&self) -> &ExchangeSpec {
        &self.spec
    }

    /// The channel the exchange was resolved on.
    pub fn channel(&self) -> &Arc<dyn AmqpChannel> {
        &self.channel
    }

    /// Publishes raw bytes to this exchange.
    pub async fn publish(
        &self,
        routing_key: &str,
        data: &[u8],
        properties: MessageProperties,
    ) -> Result<(), AmqpError> {
        self.channel
            .basic_publish(&self.name, routing_key, data, properties)
            .await
    }
}

/// Resolves configured exchanges into [`Exchange`] handles.
pub struct ExchangeResolver<'cfg> {
    config: &'cfg TopologyConfig,
}

impl<'cfg> ExchangeResolver<'cfg> {
    pub fn new(config: &'cfg TopologyConfig) -> Self {
        ExchangeResolver { config }
    }

    /// Resolves the exchange `name` on `channel`.
    ///
    /// With `auto_setup` the exchange is declared on the broker using its full
    /// configuration; otherwise it is assumed to exist already.
    pub async fn resolve(
        &self,
        channel: &Arc<dyn AmqpChannel>,
        name: &str,
        auto_setup: bool,
    ) -> Result<Exchange, ResolveError> {
        let Some(spec) = self.config.exchanges.get(name) else {
            return Err(ConfigurationError::UnknownExchange {
                exchange: name.to_owned(),
            }
            .into());
        };

        if auto_setup {
            debug!(exchange = name, "declaring exchange");

            if let Err(err) = channel.exchange_declare(name, spec).await {
                error!(error = err.to_string(), exchange = name, "error to declare the exchange");
                return Err(err.into());
            }
        }

        Ok(Exchange {
            name: name.to_owned(),
            spec: spec.clone(),
            channel: channel.clone(),
        })
    }
}
