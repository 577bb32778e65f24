// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! Resolves a declarative AMQP topology (connections, exchanges, queues,
//! consumers and producers) into live, fully wired consumers and producers.

mod otel;

pub mod amqp;
pub mod assembler;
pub mod broker;
pub mod channel;
pub mod config;
pub mod connection;
pub mod consumer;
pub mod errors;
pub mod events;
pub mod exchange;
pub mod publisher;
pub mod queue;
pub mod registry;
pub mod topology;

pub use assembler::TopologyResolver;
pub use config::TopologyConfig;
pub use errors::ResolveError;
