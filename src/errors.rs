// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Error Types for Topology Resolution
//!
//! This module provides the error taxonomy used while resolving configured
//! topology into runtime objects:
//!
//! - `ConfigurationError`: the configuration graph is inconsistent or incomplete.
//! - `UnresolvedDependencyError`: a named logger, callback or listener is not registered.
//! - `AmqpError`: the broker client failed; carried to the caller unchanged.
//!
//! `ResolveError` unifies the three for the assembler entry points.

use std::fmt;
use thiserror::Error;

/// The kind of configured entity an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Queue,
    Exchange,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Queue => f.write_str("queue"),
            EntityKind::Exchange => f.write_str("exchange"),
        }
    }
}

/// Represents a local validation failure of the topology configuration.
///
/// These errors are never retried; they name the offending entities so the
/// configuration can be fixed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    /// The consumer declares no queues
    #[error("queues are missing for consumer `{consumer}`")]
    MissingQueues { consumer: String },

    /// The producer declares no exchange
    #[error("exchange is missing for producer `{producer}`")]
    MissingExchange { producer: String },

    #[error("consumer `{0}` is missing in the consumers configuration")]
    UnknownConsumer(String),

    #[error("producer `{0}` is missing in the producers configuration")]
    UnknownProducer(String),

    /// A referenced queue is not configured
    #[error("queue `{queue}` is missing in the queues configuration")]
    UnknownQueue { queue: String },

    /// A referenced exchange is not configured
    #[error("exchange `{exchange}` is missing in the exchanges configuration")]
    UnknownExchange { exchange: String },

    /// A referenced connection is not configured
    #[error("connection `{connection}` is missing in the connections configuration")]
    UnknownConnection { connection: String },

    /// A queue or exchange lives on a different connection than its user
    #[error("the {entity} connection for {entity} `{name}` ({got}) does not match the expected connection ({want})")]
    ConnectionMismatch {
        entity: EntityKind,
        name: String,
        got: String,
        want: String,
    },

    /// The idle timeout cannot be represented as a duration
    #[error("invalid idle timeout `{value}` for consumer `{consumer}`")]
    InvalidTimeout { consumer: String, value: String },

    #[error("failure to parse configuration: {0}")]
    Parse(String),

    #[error("failure to read configuration: {0}")]
    Io(String),
}

/// The registry a missing dependency was looked up in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependencyKind {
    Logger,
    Callback,
    Listener,
}

impl fmt::Display for DependencyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DependencyKind::Logger => f.write_str("logger"),
            DependencyKind::Callback => f.write_str("callback"),
            DependencyKind::Listener => f.write_str("listener"),
        }
    }
}

/// A named logger, callback or listener could not be found in its registry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("the {kind} `{name}` can not be found")]
pub struct UnresolvedDependencyError {
    pub kind: DependencyKind,
    pub name: String,
}

/// Represents errors that can occur during AMQP/RabbitMQ operations.
///
/// Each variant carries the broker client's own message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AmqpError {
    /// Error establishing a connection to the RabbitMQ server
    #[error("failure to connect `{0}`: {1}")]
    ConnectionError(String, String),

    /// Error creating a channel from an established connection
    #[error("failure to create a channel: {0}")]
    ChannelError(String),

    /// Error configuring Quality of Service parameters
    #[error("failure to configure qos: {0}")]
    QoSDeclarationError(String),

    /// Error declaring an exchange with the given name
    #[error("failure to declare an exchange `{0}`: {1}")]
    DeclareExchangeError(String, String),

    /// Error declaring a queue with the given name
    #[error("failure to declare a queue `{0}`: {1}")]
    DeclareQueueError(String, String),

    /// Error binding a queue to an exchange
    #[error("failure to bind queue `{0}` to exchange `{1}`: {2}")]
    BindingExchangeToQueueError(String, String, String),

    /// Error fetching a message from a queue
    #[error("failure to get message from queue `{0}`: {1}")]
    ConsumerError(String, String),

    /// Error acknowledging a message
    #[error("failure to ack message: {0}")]
    AckMessageError(String),

    /// Error negative-acknowledging a message
    #[error("failure to nack message: {0}")]
    NackMessageError(String),

    /// Error publishing a message
    #[error("failure to publish to exchange `{0}`: {1}")]
    PublishingError(String, String),
}

/// Error returned by pipeline callbacks and listeners.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct ListenerError(pub String);

impl ListenerError {
    pub fn new(msg: impl Into<String>) -> Self {
        ListenerError(msg.into())
    }
}

/// Any failure of resolving a consumer or producer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    UnresolvedDependency(#[from] UnresolvedDependencyError),

    #[error(transparent)]
    Broker(#[from] AmqpError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mismatch_message_names_both_connections() {
        let err = ConfigurationError::ConnectionMismatch {
            entity: EntityKind::Queue,
            name: "q1".to_owned(),
            got: "other".to_owned(),
            want: "default".to_owned(),
        };

        assert_eq!(
            err.to_string(),
            "the queue connection for queue `q1` (other) does not match the expected connection (default)"
        );
    }

    #[test]
    fn broker_errors_pass_through_unchanged() {
        let broker = AmqpError::ChannelError("closed".to_owned());
        let err = ResolveError::from(broker.clone());

        assert_eq!(err, ResolveError::Broker(broker.clone()));
        assert_eq!(err.to_string(), broker.to_string());
    }

    #[test]
    fn unresolved_dependency_names_kind() {
        let err = UnresolvedDependencyError {
            kind: DependencyKind::Callback,
            name: "on_message".to_owned(),
        };

        assert_eq!(err.to_string(), "the callback `on_message` can not be found");
    }
}
