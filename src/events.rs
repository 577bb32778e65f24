// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Consumer Event Pipeline
//!
//! A consumer reports what happens to it through four events: `delivery`,
//! `flush`, `deliveryException` and `flushDeferredException`. Plain callbacks are
//! attached to a single event; an [`AggregateListener`] declares the events it
//! supports and is attached to all of them at once.

use crate::{broker::Delivery, errors::ListenerError};
use std::{fmt, sync::Arc};
use tracing::{debug, error, info, warn, Level};

/// The events emitted by a consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Delivery,
    Flush,
    DeliveryException,
    FlushDeferredException,
}

impl EventKind {
    pub const ALL: [EventKind; 4] = [
        EventKind::Delivery,
        EventKind::Flush,
        EventKind::DeliveryException,
        EventKind::FlushDeferredException,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Delivery => "delivery",
            EventKind::Flush => "flush",
            EventKind::DeliveryException => "deliveryException",
            EventKind::FlushDeferredException => "flushDeferredException",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An event together with its payload.
#[derive(Debug)]
pub enum ConsumerEvent<'a> {
    Delivery {
        queue: &'a str,
        delivery: &'a Delivery,
    },
    Flush {
        /// Deliveries handled since the previous flush
        handled: usize,
    },
    DeliveryException {
        queue: &'a str,
        delivery: &'a Delivery,
        error: &'a ListenerError,
    },
    FlushDeferredException {
        error: &'a ListenerError,
    },
}

impl ConsumerEvent<'_> {
    pub fn kind(&self) -> EventKind {
        match self {
            ConsumerEvent::Delivery { .. } => EventKind::Delivery,
            ConsumerEvent::Flush { .. } => EventKind::Flush,
            ConsumerEvent::DeliveryException { .. } => EventKind::DeliveryException,
            ConsumerEvent::FlushDeferredException { .. } => EventKind::FlushDeferredException,
        }
    }
}

/// A callable attached to one event.
pub type Callback = dyn Fn(&ConsumerEvent<'_>) -> Result<(), ListenerError> + Send + Sync;

/// Wraps a closure into a [`Callback`].
pub fn callback<F>(f: F) -> Arc<Callback>
where
    F: Fn(&ConsumerEvent<'_>) -> Result<(), ListenerError> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// A listener that subscribes itself to several events.
pub trait AggregateListener: Send + Sync {
    /// The events this listener wants to be attached to.
    fn subscriptions(&self) -> Vec<EventKind>;

    fn handle(&self, event: &ConsumerEvent<'_>) -> Result<(), ListenerError>;
}

/// Ordered event → handler table of a consumer.
#[derive(Default)]
pub struct EventPipeline {
    handlers: Vec<(EventKind, Arc<Callback>)>,
}

impl EventPipeline {
    pub fn new() -> Self {
        EventPipeline::default()
    }

    /// Attaches `callback` to `kind`.
    pub fn on(&mut self, kind: EventKind, callback: Arc<Callback>) {
        self.handlers.push((kind, callback));
    }

    /// Attaches `listener` to every event it subscribes to.
    pub fn attach_aggregate(&mut self, listener: Arc<dyn AggregateListener>) {
        for kind in listener.subscriptions() {
            let listener = listener.clone();
            self.handlers
                .push((kind, callback(move |event| listener.handle(event))));
        }
    }

    /// Number of handlers attached to `kind`.
    pub fn listeners(&self, kind: EventKind) -> usize {
        self.handlers.iter().filter(|(k, _)| *k == kind).count()
    }

    /// Runs every handler of the event's kind in attachment order.
    ///
    /// All handlers run even if one fails; the first failure is returned.
    pub fn emit(&self, event: &ConsumerEvent<'_>) -> Result<(), ListenerError> {
        let kind = event.kind();
        let mut result = Ok(());

        for (_, handler) in self.handlers.iter().filter(|(k, _)| *k == kind) {
            if let Err(err) = handler(event) {
                if result.is_ok() {
                    result = Err(err);
                }
            }
        }

        result
    }
}

impl fmt::Debug for EventPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.handlers.iter().map(|(kind, _)| kind))
            .finish()
    }
}

/// A sink for consumer log lines, registered as a service.
pub trait EventLogger: Send + Sync {
    fn log(&self, level: Level, message: &str);
}

/// [`EventLogger`] that forwards to `tracing`.
#[derive(Debug, Clone, Default)]
pub struct TracingLogger;

impl EventLogger for TracingLogger {
    fn log(&self, level: Level, message: &str) {
        match level {
            Level::ERROR => error!(target: "amqp_fabric::consumer", "{}", message),
            Level::WARN => warn!(target: "amqp_fabric::consumer", "{}", message),
            Level::INFO => info!(target: "amqp_fabric::consumer", "{}", message),
            _ => debug!(target: "amqp_fabric::consumer", "{}", message),
        }
    }
}

/// Aggregate listener that writes every consumer event to a logger.
pub struct LoggerListener {
    logger: Arc<dyn EventLogger>,
}

impl LoggerListener {
    pub fn new(logger: Arc<dyn EventLogger>) -> Self {
        LoggerListener { logger }
    }
}

impl AggregateListener for LoggerListener {
    fn subscriptions(&self) -> Vec<EventKind> {
        EventKind::ALL.to_vec()
    }

    fn handle(&self, event: &ConsumerEvent<'_>) -> Result<(), ListenerError> {
        match event {
            ConsumerEvent::Delivery { queue, delivery } => self.logger.log(
                Level::DEBUG,
                &format!(
                    "received delivery {} on queue {}",
                    delivery.delivery_tag, queue
                ),
            ),
            ConsumerEvent::Flush { handled } => self
                .logger
                .log(Level::DEBUG, &format!("flushed after {} deliveries", handled)),
            ConsumerEvent::DeliveryException {
                queue,
                delivery,
                error,
            } => self.logger.log(
                Level::ERROR,
                &format!(
                    "delivery {} on queue {} failed: {}",
                    delivery.delivery_tag, queue, error
                ),
            ),
            ConsumerEvent::FlushDeferredException { error } => self
                .logger
                .log(Level::ERROR, &format!("flush failed: {}", error)),
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn recorder(log: &Arc<Mutex<Vec<String>>>, tag: &'static str) -> Arc<Callback> {
        let log = log.clone();
        callback(move |event| {
            log.lock().push(format!("{}:{}", tag, event.kind()));
            Ok(())
        })
    }

    struct Recording {
        log: Arc<Mutex<Vec<(Level, String)>>>,
    }

    impl EventLogger for Recording {
        fn log(&self, level: Level, message: &str) {
            self.log.lock().push((level, message.to_owned()));
        }
    }

    #[test]
    fn emits_only_to_matching_kind_in_order() {
        let log = Arc::new(Mutex::new(vec![]));
        let mut pipeline = EventPipeline::new();
        pipeline.on(EventKind::Delivery, recorder(&log, "a"));
        pipeline.on(EventKind::Flush, recorder(&log, "f"));
        pipeline.on(EventKind::Delivery, recorder(&log, "b"));

        pipeline.emit(&ConsumerEvent::Flush { handled: 1 }).unwrap();
        pipeline
            .emit(&ConsumerEvent::Delivery {
                queue: "q1",
                delivery: &Delivery::default(),
            })
            .unwrap();

        assert_eq!(
            *log.lock(),
            vec!["f:flush", "a:delivery", "b:delivery"]
        );
    }

    #[test]
    fn first_error_wins_but_all_handlers_run() {
        let log = Arc::new(Mutex::new(vec![]));
        let mut pipeline = EventPipeline::new();
        pipeline.on(
            EventKind::Flush,
            callback(|_| Err(ListenerError::new("first"))),
        );
        pipeline.on(
            EventKind::Flush,
            callback(|_| Err(ListenerError::new("second"))),
        );
        pipeline.on(EventKind::Flush, recorder(&log, "last"));

        let result = pipeline.emit(&ConsumerEvent::Flush { handled: 0 });

        assert_eq!(result, Err(ListenerError::new("first")));
        assert_eq!(*log.lock(), vec!["last:flush"]);
    }

    #[test]
    fn logger_listener_subscribes_to_everything() {
        let log = Arc::new(Mutex::new(vec![]));
        let mut pipeline = EventPipeline::new();
        pipeline.attach_aggregate(Arc::new(LoggerListener::new(Arc::new(Recording {
            log: log.clone(),
        }))));

        for kind in EventKind::ALL {
            assert_eq!(pipeline.listeners(kind), 1);
        }

        let error = ListenerError::new("boom");
        pipeline
            .emit(&ConsumerEvent::FlushDeferredException { error: &error })
            .unwrap();

        assert_eq!(
            *log.lock(),
            vec![(Level::ERROR, "flush failed: boom".to_owned())]
        );
    }

    #[test]
    fn event_names() {
        assert_eq!(EventKind::DeliveryException.to_string(), "deliveryException");
        assert_eq!(
            EventKind::FlushDeferredException.as_str(),
            "flushDeferredException"
        );
    }
}
