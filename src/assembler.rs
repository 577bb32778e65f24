// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Consumer and Producer Assembly
//!
//! Turns a named consumer or producer from the configuration into a ready
//! runtime object. A consumer goes through:
//!
//! `Validating → ConnectionResolved → ChannelOpened → QueuesResolved →
//! PipelineAttached → Ready`
//!
//! and any step may end in `Failed`. Assembly either returns a fully wired
//! object or an error; nothing partially wired is handed out.

use crate::{
    broker::AmqpClient,
    channel::ChannelFactory,
    config::{ConsumerSpec, ListenerRef, TopologyConfig, DEFAULT_IDLE_TIMEOUT, DEFAULT_WAIT_TIMEOUT},
    connection::{ConnectionCache, ConnectionResolver},
    consumer::Consumer,
    errors::{ConfigurationError, DependencyKind, ResolveError, UnresolvedDependencyError},
    events::{Callback, EventKind, LoggerListener},
    exchange::ExchangeResolver,
    publisher::Producer,
    queue::QueueResolver,
    registry::{CallbackRegistry, ServiceRegistry},
    topology::TopologyValidator,
};
use std::{fmt, sync::Arc, time::Duration};
use tracing::{debug, error};

/// Progress of a single assembly call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssemblyState {
    Validating,
    ConnectionResolved,
    ChannelOpened,
    QueuesResolved,
    PipelineAttached,
    Ready,
    Failed,
}

impl fmt::Display for AssemblyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Resolves configured consumers and producers.
pub struct TopologyResolver {
    config: Arc<TopologyConfig>,
    connections: ConnectionResolver,
    callbacks: Arc<CallbackRegistry>,
    services: Arc<ServiceRegistry>,
}

impl TopologyResolver {
    /// Creates a resolver with empty callback and service registries.
    ///
    /// `cache` may be shared with other resolvers so that they reuse the same
    /// connections.
    pub fn new(
        config: Arc<TopologyConfig>,
        client: Arc<dyn AmqpClient>,
        cache: Arc<ConnectionCache>,
    ) -> Self {
        TopologyResolver {
            connections: ConnectionResolver::new(client, config.clone(), cache),
            config,
            callbacks: Arc::new(CallbackRegistry::new()),
            services: Arc::new(ServiceRegistry::new()),
        }
    }

    /// Replaces the registry consulted for named callbacks.
    pub fn with_callbacks(mut self, callbacks: Arc<CallbackRegistry>) -> Self {
        self.callbacks = callbacks;
        self
    }

    /// Replaces the registry consulted for named loggers and listeners.
    pub fn with_services(mut self, services: Arc<ServiceRegistry>) -> Self {
        self.services = services;
        self
    }

    /// The configuration resolved against.
    pub fn config(&self) -> &TopologyConfig {
        &self.config
    }

    /// Assembles the consumer configured under `name`.
    pub async fn resolve_consumer(&self, name: &str) -> Result<Consumer, ResolveError> {
        let Some(spec) = self.config.consumers.get(name) else {
            let err = ConfigurationError::UnknownConsumer(name.to_owned());
            error!(error = err.to_string(), consumer = name, state = %AssemblyState::Failed, "consumer assembly failed");
            return Err(err.into());
        };

        self.resolve_consumer_with(name, spec).await
    }

    /// Assembles a consumer from `spec`, validated against the configuration
    /// graph under the given `name`.
    pub async fn resolve_consumer_with(
        &self,
        name: &str,
        spec: &ConsumerSpec,
    ) -> Result<Consumer, ResolveError> {
        match self.assemble_consumer(name, spec).await {
            Ok(consumer) => Ok(consumer),
            Err(err) => {
                error!(error = err.to_string(), consumer = name, state = %AssemblyState::Failed, "consumer assembly failed");
                Err(err)
            }
        }
    }

    /// Assembles the producer configured under `name`.
    pub async fn resolve_producer(&self, name: &str) -> Result<Producer, ResolveError> {
        match self.assemble_producer(name).await {
            Ok(producer) => Ok(producer),
            Err(err) => {
                error!(error = err.to_string(), producer = name, state = %AssemblyState::Failed, "producer assembly failed");
                Err(err)
            }
        }
    }

    async fn assemble_consumer(
        &self,
        name: &str,
        spec: &ConsumerSpec,
    ) -> Result<Consumer, ResolveError> {
        transition(name, AssemblyState::Validating);
        TopologyValidator::new(&self.config).validate_consumer(name, spec)?;
        let (idle_timeout, wait_timeout) = timeouts(name, spec)?;

        let connection = self
            .connections
            .resolve(self.config.effective_connection(&spec.connection))
            .await?;
        transition(name, AssemblyState::ConnectionResolved);

        let channel = ChannelFactory::open(&connection, spec.qos.as_ref()).await?;
        transition(name, AssemblyState::ChannelOpened);

        let exchanges = ExchangeResolver::new(&self.config);
        let resolver = QueueResolver::new(&self.config);
        let mut queues = Vec::with_capacity(spec.queues.len());

        for queue_name in &spec.queues {
            if spec.auto_setup_fabric {
                let Some(queue) = self.config.queues.get(queue_name) else {
                    return Err(ConfigurationError::UnknownQueue {
                        queue: queue_name.clone(),
                    }
                    .into());
                };

                // declared only so that the queue can be bound, the handle is not kept
                exchanges.resolve(&channel, &queue.exchange, true).await?;
            }

            queues.push(
                resolver
                    .resolve(&channel, queue_name, spec.auto_setup_fabric)
                    .await?,
            );
        }
        transition(name, AssemblyState::QueuesResolved);

        let mut consumer = Consumer::new(queues, idle_timeout, wait_timeout);
        self.attach_pipeline(&mut consumer, spec)?;
        transition(name, AssemblyState::PipelineAttached);

        transition(name, AssemblyState::Ready);
        Ok(consumer)
    }

    fn attach_pipeline(
        &self,
        consumer: &mut Consumer,
        spec: &ConsumerSpec,
    ) -> Result<(), UnresolvedDependencyError> {
        if let Some(name) = &spec.logger {
            let logger = self
                .services
                .logger(name)
                .ok_or_else(|| unresolved(DependencyKind::Logger, name))?;
            consumer.attach_aggregate(Arc::new(LoggerListener::new(logger)));
        }

        if let Some(name) = &spec.callback {
            consumer.on(EventKind::Delivery, self.callback(name)?);
        }

        if let Some(name) = &spec.flush_callback {
            consumer.on(EventKind::Flush, self.callback(name)?);
        }

        if let Some(name) = &spec.error_callback {
            let callback = self.callback(name)?;
            consumer.on(EventKind::DeliveryException, callback.clone());
            consumer.on(EventKind::FlushDeferredException, callback);
        }

        for listener in &spec.listeners {
            let listener = match listener {
                ListenerRef::Named(name) => self
                    .services
                    .listener(name)
                    .ok_or_else(|| unresolved(DependencyKind::Listener, name))?,
                ListenerRef::Instance(listener) => listener.clone(),
            };
            consumer.attach_aggregate(listener);
        }

        Ok(())
    }

    fn callback(&self, name: &str) -> Result<Arc<Callback>, UnresolvedDependencyError> {
        self.callbacks
            .get(name)
            .ok_or_else(|| unresolved(DependencyKind::Callback, name))
    }

    async fn assemble_producer(&self, name: &str) -> Result<Producer, ResolveError> {
        let Some(spec) = self.config.producers.get(name) else {
            return Err(ConfigurationError::UnknownProducer(name.to_owned()).into());
        };

        TopologyValidator::new(&self.config).validate_producer(name, spec)?;

        let connection = self
            .connections
            .resolve(self.config.effective_connection(&spec.connection))
            .await?;
        let channel = ChannelFactory::open(&connection, spec.qos.as_ref()).await?;
        let exchange = ExchangeResolver::new(&self.config)
            .resolve(&channel, &spec.exchange, spec.auto_setup_fabric)
            .await?;

        debug!(producer = name, exchange = exchange.name(), "producer ready");
        Ok(Producer::new(exchange))
    }
}

fn transition(consumer: &str, state: AssemblyState) {
    debug!(consumer, state = %state, "consumer assembly");
}

fn unresolved(kind: DependencyKind, name: &str) -> UnresolvedDependencyError {
    UnresolvedDependencyError {
        kind,
        name: name.to_owned(),
    }
}

fn timeouts(name: &str, spec: &ConsumerSpec) -> Result<(Duration, Duration), ConfigurationError> {
    let idle = spec.idle_timeout.unwrap_or(DEFAULT_IDLE_TIMEOUT);
    let idle_timeout =
        Duration::try_from_secs_f64(idle).map_err(|_| ConfigurationError::InvalidTimeout {
            consumer: name.to_owned(),
            value: idle.to_string(),
        })?;
    let wait_timeout = Duration::from_micros(spec.wait_timeout.unwrap_or(DEFAULT_WAIT_TIMEOUT));

    Ok((idle_timeout, wait_timeout))
}
