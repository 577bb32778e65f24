// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Broker Client Interfaces
//!
//! Narrow interfaces through which topology resolution talks to the AMQP client.
//! The production implementation lives in [`crate::amqp`]; tests use the
//! generated mocks.

use crate::{
    config::{ConnectionSpec, ExchangeSpec, QueueSpec},
    errors::AmqpError,
};
use async_trait::async_trait;
use std::{collections::BTreeMap, sync::Arc};

#[cfg(test)]
use mockall::automock;

/// A message fetched from a queue.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Delivery {
    pub delivery_tag: u64,
    pub exchange: String,
    pub routing_key: String,
    pub redelivered: bool,
    pub message_type: Option<String>,
    pub headers: BTreeMap<String, String>,
    pub data: Vec<u8>,
}

/// Properties attached to a published message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageProperties {
    pub content_type: String,
    pub message_type: Option<String>,
    pub message_id: String,
    pub headers: BTreeMap<String, String>,
}

/// Opens connections to the broker.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait AmqpClient: Send + Sync {
    async fn connect(
        &self,
        name: &str,
        spec: &ConnectionSpec,
    ) -> Result<Arc<dyn AmqpConnection>, AmqpError>;
}

/// A live broker connection.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait AmqpConnection: Send + Sync {
    async fn create_channel(&self) -> Result<Arc<dyn AmqpChannel>, AmqpError>;
}

/// A channel opened on a connection.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait AmqpChannel: Send + Sync {
    async fn basic_qos(&self, prefetch_count: u16, global: bool) -> Result<(), AmqpError>;

    async fn exchange_declare(&self, name: &str, spec: &ExchangeSpec) -> Result<(), AmqpError>;

    async fn queue_declare(&self, name: &str, spec: &QueueSpec) -> Result<(), AmqpError>;

    async fn queue_bind(
        &self,
        queue: &str,
        exchange: &str,
        routing_key: &str,
    ) -> Result<(), AmqpError>;

    async fn basic_get(&self, queue: &str) -> Result<Option<Delivery>, AmqpError>;

    async fn basic_ack(&self, delivery_tag: u64) -> Result<(), AmqpError>;

    async fn basic_nack(&self, delivery_tag: u64, requeue: bool) -> Result<(), AmqpError>;

    async fn basic_publish(
        &self,
        exchange: &str,
        routing_key: &str,
        data: &[u8],
        properties: MessageProperties,
    ) -> Result<(), AmqpError>;
}
