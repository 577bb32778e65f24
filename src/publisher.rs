// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Message Producer
//!
//! The runtime producer produced by topology resolution: one exchange on its own
//! channel. Published messages carry OpenTelemetry context in their headers.

use crate::{broker::MessageProperties, errors::AmqpError, exchange::Exchange, otel};
use opentelemetry::Context;
use std::collections::BTreeMap;
use tracing::error;
use uuid::Uuid;

/// Default content type for JSON messages
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// A fully assembled producer.
pub struct Producer {
    exchange: Exchange,
}

impl Producer {
    /// Creates a producer publishing to `exchange`.
    pub fn new(exchange: Exchange) -> Self {
        Producer { exchange }
    }

    pub fn exchange(&self) -> &Exchange {
        &self.exchange
    }

    /// Publishes `data` with `routing_key`, tagging it with `msg_type`.
    pub async fn publish(
        &self,
        ctx: &Context,
        data: &[u8],
        routing_key: &str,
        msg_type: Option<&str>,
    ) -> Result<(), AmqpError> {
        let mut headers = BTreeMap::default();
        otel::inject(ctx, &mut headers);

        let properties = MessageProperties {
            content_type: JSON_CONTENT_TYPE.to_owned(),
            message_type: msg_type.map(str::to_owned),
            message_id: Uuid::new_v4().to_string(),
            headers,
        };

        if let Err(err) = self.exchange.publish(routing_key, data, properties).await {
            error!(
                error = err.to_string(),
                exchange = self.exchange.name(),
                "error publishing message"
            );
            return Err(err);
        }

        Ok(())
    }
}
