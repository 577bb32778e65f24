// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Lapin Broker Client
//!
//! Implements the broker interfaces of [`crate::broker`] on top of `lapin`.

use crate::{
    broker::{AmqpChannel, AmqpClient, AmqpConnection, Delivery, MessageProperties},
    config::{ConnectionSpec, ExchangeSpec, QueueSpec},
    errors::AmqpError,
    exchange::AMQP_HEADERS_DELAYED_EXCHANGE_TYPE,
    queue::{
        AMQP_HEADERS_DEAD_LETTER_EXCHANGE, AMQP_HEADERS_DEAD_LETTER_ROUTING_KEY,
        AMQP_HEADERS_MAX_LENGTH, AMQP_HEADERS_MAX_LENGTH_BYTES, AMQP_HEADERS_MESSAGE_TTL,
    },
};
use async_trait::async_trait;
use lapin::{
    options::{
        BasicAckOptions, BasicGetOptions, BasicNackOptions, BasicPublishOptions, BasicQosOptions,
        ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions,
    },
    protocol::basic::AMQPProperties,
    types::{AMQPValue, FieldTable, LongInt, LongString, ShortString},
    BasicProperties, Channel, Connection, ConnectionProperties,
};
use std::{collections::BTreeMap, sync::Arc};
use tracing::{debug, error};

/// Opens `lapin` connections.
#[derive(Debug, Clone, Default)]
pub struct LapinClient;

#[async_trait]
impl AmqpClient for LapinClient {
    async fn connect(
        &self,
        name: &str,
        spec: &ConnectionSpec,
    ) -> Result<Arc<dyn AmqpConnection>, AmqpError> {
        debug!(connection = name, host = spec.host, "creating amqp connection...");
        let options =
            ConnectionProperties::default().with_connection_name(LongString::from(name.to_owned()));

        match Connection::connect(&spec.uri(), options).await {
            Ok(conn) => {
                debug!(connection = name, "amqp connected");
                Ok(Arc::new(LapinConnection {
                    name: name.to_owned(),
                    inner: conn,
                }))
            }
            Err(err) => {
                error!(error = err.to_string(), connection = name, "failure to connect");
                Err(AmqpError::ConnectionError(name.to_owned(), err.to_string()))
            }
        }
    }
}

/// A `lapin` connection.
pub struct LapinConnection {
    name: String,
    inner: Connection,
}

impl LapinConnection {
    pub fn inner(&self) -> &Connection {
        &self.inner
    }
}

#[async_trait]
impl AmqpConnection for LapinConnection {
    async fn create_channel(&self) -> Result<Arc<dyn AmqpChannel>, AmqpError> {
        debug!(connection = self.name, "creating amqp channel...");

        match self.inner.create_channel().await {
            Ok(channel) => {
                debug!("channel created");
                Ok(Arc::new(LapinChannel { inner: channel }))
            }
            Err(err) => {
                error!(error = err.to_string(), "error to create the channel");
                Err(AmqpError::ChannelError(err.to_string()))
            }
        }
    }
}

/// A `lapin` channel.
pub struct LapinChannel {
    inner: Channel,
}

impl LapinChannel {
    pub fn inner(&self) -> &Channel {
        &self.inner
    }
}

#[async_trait]
impl AmqpChannel for LapinChannel {
    async fn basic_qos(&self, prefetch_count: u16, global: bool) -> Result<(), AmqpError> {
        self.inner
            .basic_qos(prefetch_count, BasicQosOptions { global })
            .await
            .map_err(|err| {
                error!(error = err.to_string(), "failure to configure qos");
                AmqpError::QoSDeclarationError(err.to_string())
            })
    }

    async fn exchange_declare(&self, name: &str, spec: &ExchangeSpec) -> Result<(), AmqpError> {
        let mut args = BTreeMap::<ShortString, AMQPValue>::default();
        if let Some(delayed_type) = &spec.delayed_type {
            args.insert(
                ShortString::from(AMQP_HEADERS_DELAYED_EXCHANGE_TYPE),
                AMQPValue::LongString(LongString::from(delayed_type.clone())),
            );
        }

        self.inner
            .exchange_declare(
                name,
                (&spec.kind).into(),
                ExchangeDeclareOptions {
                    passive: spec.passive,
                    durable: spec.durable,
                    auto_delete: spec.auto_delete,
                    internal: spec.internal,
                    nowait: false,
                },
                FieldTable::from(args),
            )
            .await
            .map_err(|err| AmqpError::DeclareExchangeError(name.to_owned(), err.to_string()))
    }

    async fn queue_declare(&self, name: &str, spec: &QueueSpec) -> Result<(), AmqpError> {
        self.inner
            .queue_declare(
                name,
                QueueDeclareOptions {
                    passive: spec.passive,
                    durable: spec.durable,
                    exclusive: spec.exclusive,
                    auto_delete: spec.auto_delete,
                    nowait: false,
                },
                FieldTable::from(queue_arguments(spec)),
            )
            .await
            .map(|_| ())
            .map_err(|err| AmqpError::DeclareQueueError(name.to_owned(), err.to_string()))
    }

    async fn queue_bind(
        &self,
        queue: &str,
        exchange: &str,
        routing_key: &str,
    ) -> Result<(), AmqpError> {
        self.inner
            .queue_bind(
                queue,
                exchange,
                routing_key,
                QueueBindOptions { nowait: false },
                FieldTable::default(),
            )
            .await
            .map_err(|err| {
                AmqpError::BindingExchangeToQueueError(
                    queue.to_owned(),
                    exchange.to_owned(),
                    err.to_string(),
                )
            })
    }

    async fn basic_get(&self, queue: &str) -> Result<Option<Delivery>, AmqpError> {
        let message = self
            .inner
            .basic_get(queue, BasicGetOptions { no_ack: false })
            .await
            .map_err(|err| AmqpError::ConsumerError(queue.to_owned(), err.to_string()))?;

        Ok(message.map(|message| {
            let delivery = message.delivery;
            Delivery {
                delivery_tag: delivery.delivery_tag,
                exchange: delivery.exchange.as_str().to_owned(),
                routing_key: delivery.routing_key.as_str().to_owned(),
                redelivered: delivery.redelivered,
                message_type: delivery.properties.kind().as_ref().map(|t| t.as_str().to_owned()),
                headers: string_headers(&delivery.properties),
                data: delivery.data,
            }
        }))
    }

    async fn basic_ack(&self, delivery_tag: u64) -> Result<(), AmqpError> {
        self.inner
            .basic_ack(delivery_tag, BasicAckOptions { multiple: false })
            .await
            .map_err(|err| AmqpError::AckMessageError(err.to_string()))
    }

    async fn basic_nack(&self, delivery_tag: u64, requeue: bool) -> Result<(), AmqpError> {
        self.inner
            .basic_nack(
                delivery_tag,
                BasicNackOptions {
                    multiple: false,
                    requeue,
                },
            )
            .await
            .map_err(|err| AmqpError::NackMessageError(err.to_string()))
    }

    async fn basic_publish(
        &self,
        exchange: &str,
        routing_key: &str,
        data: &[u8],
        properties: MessageProperties,
    ) -> Result<(), AmqpError> {
        let headers: BTreeMap<ShortString, AMQPValue> = properties
            .headers
            .into_iter()
            .map(|(key, value)| {
                (
                    ShortString::from(key),
                    AMQPValue::LongString(LongString::from(value)),
                )
            })
            .collect();

        let mut props = BasicProperties::default()
            .with_content_type(ShortString::from(properties.content_type))
            .with_message_id(ShortString::from(properties.message_id))
            .with_headers(FieldTable::from(headers));
        if let Some(kind) = properties.message_type {
            props = props.with_type(ShortString::from(kind));
        }

        let publishing_error =
            |err: lapin::Error| AmqpError::PublishingError(exchange.to_owned(), err.to_string());

        self.inner
            .basic_publish(
                exchange,
                routing_key,
                BasicPublishOptions {
                    immediate: false,
                    mandatory: false,
                },
                data,
                props,
            )
            .await
            .map_err(publishing_error)?
            .await
            .map_err(publishing_error)?;

        Ok(())
    }
}

fn queue_arguments(spec: &QueueSpec) -> BTreeMap<ShortString, AMQPValue> {
    let mut args = BTreeMap::default();

    if let Some(ttl) = spec.ttl {
        args.insert(
            ShortString::from(AMQP_HEADERS_MESSAGE_TTL),
            AMQPValue::LongInt(LongInt::from(ttl)),
        );
    }

    if let Some(max) = spec.max_length {
        args.insert(
            ShortString::from(AMQP_HEADERS_MAX_LENGTH),
            AMQPValue::LongInt(LongInt::from(max)),
        );
    }

    if let Some(max_bytes) = spec.max_length_bytes {
        args.insert(
            ShortString::from(AMQP_HEADERS_MAX_LENGTH_BYTES),
            AMQPValue::LongInt(LongInt::from(max_bytes)),
        );
    }

    if let Some(exchange) = &spec.dead_letter_exchange {
        args.insert(
            ShortString::from(AMQP_HEADERS_DEAD_LETTER_EXCHANGE),
            AMQPValue::LongString(LongString::from(exchange.clone())),
        );
    }

    if let Some(key) = &spec.dead_letter_routing_key {
        args.insert(
            ShortString::from(AMQP_HEADERS_DEAD_LETTER_ROUTING_KEY),
            AMQPValue::LongString(LongString::from(key.clone())),
        );
    }

    args
}

/// Keeps the string-valued headers; other header types are skipped.
fn string_headers(properties: &AMQPProperties) -> BTreeMap<String, String> {
    let Some(headers) = properties.headers() else {
        return BTreeMap::default();
    };

    headers
        .inner()
        .iter()
        .filter_map(|(key, value)| {
            let value = match value {
                AMQPValue::LongString(v) => std::str::from_utf8(v.as_bytes()).ok()?.to_owned(),
                AMQPValue::ShortString(v) => v.as_str().to_owned(),
                _ => return None,
            };
            Some((key.as_str().to_owned(), value))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_queue_arguments() {
        let spec = QueueSpec {
            ttl: Some(60_000),
            max_length: Some(10),
            dead_letter_exchange: Some("dlx".to_owned()),
            ..QueueSpec::new("ex1")
        };

        let args = queue_arguments(&spec);

        assert_eq!(args.len(), 3);
        assert_eq!(
            args.get(&ShortString::from(AMQP_HEADERS_MESSAGE_TTL)),
            Some(&AMQPValue::LongInt(60_000))
        );
        assert_eq!(
            args.get(&ShortString::from(AMQP_HEADERS_DEAD_LETTER_EXCHANGE)),
            Some(&AMQPValue::LongString(LongString::from("dlx")))
        );
        assert!(!args.contains_key(&ShortString::from(AMQP_HEADERS_MAX_LENGTH_BYTES)));
    }

    #[test]
    fn plain_queue_has_no_arguments() {
        assert!(queue_arguments(&QueueSpec::new("ex1")).is_empty());
    }

    #[test]
    fn extracts_string_headers() {
        let mut headers = BTreeMap::<ShortString, AMQPValue>::default();
        headers.insert(
            ShortString::from("traceparent"),
            AMQPValue::LongString(LongString::from("00-abc-def-01")),
        );
        headers.insert(ShortString::from("x-count"), AMQPValue::LongInt(3));
        let properties = AMQPProperties::default().with_headers(FieldTable::from(headers));

        let extracted = string_headers(&properties);

        assert_eq!(extracted.len(), 1);
        assert_eq!(
            extracted.get("traceparent").map(String::as_str),
            Some("00-abc-def-01")
        );
    }
}
