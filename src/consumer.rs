// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Message Consumer
//!
//! The runtime consumer produced by topology resolution. It owns its resolved
//! queues, its timeouts and its event pipeline, and runs a polling receive loop:
//!
//! 1. Polls every queue in declaration order
//! 2. Emits `delivery` for each message; acks on success
//! 3. On a listener failure nacks without requeue and emits `deliveryException`
//! 4. Sleeps `wait_timeout` when a round yields nothing
//! 5. Emits `flush` once idle for `idle_timeout` with unflushed deliveries; a
//!    failing flush emits `flushDeferredException`
//! 6. Flushes pending deliveries before returning a broker error

use crate::{
    broker::Delivery,
    errors::AmqpError,
    events::{AggregateListener, Callback, ConsumerEvent, EventKind, EventPipeline},
    otel,
    queue::Queue,
};
use opentelemetry::{
    global::{self, BoxedTracer},
    trace::{Span, Status},
};
use std::{
    borrow::Cow,
    sync::Arc,
    time::{Duration, Instant},
};
use tracing::{debug, error, warn};

/// A fully assembled consumer.
pub struct Consumer {
    queues: Vec<Queue>,
    idle_timeout: Duration,
    wait_timeout: Duration,
    pipeline: EventPipeline,
}

impl Consumer {
    /// Creates a consumer with an empty event pipeline.
    ///
    /// # Parameters
    /// * `queues` - Queues polled in order
    /// * `idle_timeout` - Time without deliveries before pending deliveries are flushed
    /// * `wait_timeout` - Pause after a poll round that yielded nothing
    pub fn new(queues: Vec<Queue>, idle_timeout: Duration, wait_timeout: Duration) -> Self {
        Consumer {
            queues,
            idle_timeout,
            wait_timeout,
            pipeline: EventPipeline::new(),
        }
    }

    /// The consumed queues, in consumption order.
    pub fn queues(&self) -> &[Queue] {
        &self.queues
    }

    /// Time without deliveries before pending deliveries are flushed.
    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    pub fn wait_timeout(&self) -> Duration {
        self.wait_timeout
    }

    /// The attached callbacks and listeners.
    pub fn pipeline(&self) -> &EventPipeline {
        &self.pipeline
    }

    /// Attaches `callback` to a single event.
    pub fn on(&mut self, kind: EventKind, callback: Arc<Callback>) {
        self.pipeline.on(kind, callback);
    }

    /// Attaches `listener` to every event it subscribes to.
    pub fn attach_aggregate(&mut self, listener: Arc<dyn AggregateListener>) {
        self.pipeline.attach_aggregate(listener);
    }

    /// Runs the receive loop.
    ///
    /// Returns after `limit` deliveries when a limit is given, otherwise only
    /// on a broker error. Deliveries not yet flushed are flushed before a
    /// broker error is returned.
    ///
    /// # Returns
    /// The number of deliveries handled, or the broker error that stopped the loop
    pub async fn consume(&self, limit: Option<usize>) -> Result<usize, AmqpError> {
        if limit == Some(0) {
            return Ok(0);
        }

        let tracer = global::tracer("amqp consumer");
        let mut handled = 0;
        let mut unflushed = 0;
        let mut last_activity = Instant::now();

        loop {
            let mut received = false;

            for queue in &self.queues {
                let delivery = match queue.get().await {
                    Ok(Some(delivery)) => delivery,
                    Ok(None) => continue,
                    Err(err) => {
                        error!(error = err.to_string(), queue = queue.name(), "errors consume msg");
                        if unflushed > 0 {
                            self.flush(unflushed);
                        }
                        return Err(err);
                    }
                };

                received = true;
                let result = self.handle_delivery(&tracer, queue, &delivery).await;

                handled += 1;
                unflushed += 1;
                last_activity = Instant::now();

                if let Err(err) = result {
                    self.flush(unflushed);
                    return Err(err);
                }

                if limit.is_some_and(|limit| handled >= limit) {
                    self.flush(unflushed);
                    return Ok(handled);
                }
            }

            if !received {
                if unflushed > 0 && last_activity.elapsed() >= self.idle_timeout {
                    self.flush(unflushed);
                    unflushed = 0;
                }

                tokio::time::sleep(self.wait_timeout).await;
            }
        }
    }

    async fn handle_delivery(
        &self,
        tracer: &BoxedTracer,
        queue: &Queue,
        delivery: &Delivery,
    ) -> Result<(), AmqpError> {
        let (_ctx, mut span) = otel::new_span(delivery, tracer, queue.name());

        debug!(
            "received: {} - queue: {}",
            delivery.delivery_tag,
            queue.name()
        );

        let result = self.pipeline.emit(&ConsumerEvent::Delivery {
            queue: queue.name(),
            delivery,
        });

        let Err(err) = result else {
            debug!("message successfully processed");
            if let Err(e) = queue.ack(delivery.delivery_tag).await {
                error!("error whiling ack msg");
                span.record_error(&e);
                span.set_status(Status::Error {
                    description: Cow::from("error to ack msg"),
                });
                return Err(e);
            }

            span.set_status(Status::Ok);
            return Ok(());
        };

        warn!(error = err.to_string(), queue = queue.name(), "error whiling handling msg, rejecting");
        span.record_error(&err);
        span.set_status(Status::Error {
            description: Cow::from(err.to_string()),
        });

        if let Err(e) = self.pipeline.emit(&ConsumerEvent::DeliveryException {
            queue: queue.name(),
            delivery,
            error: &err,
        }) {
            error!(error = e.to_string(), "delivery exception listener failed");
        }

        if let Err(e) = queue.nack(delivery.delivery_tag, false).await {
            error!("error whiling nack msg");
            span.record_error(&e);
            return Err(e);
        }

        Ok(())
    }

    fn flush(&self, handled: usize) {
        debug!(handled, "flushing consumer");

        let Err(err) = self.pipeline.emit(&ConsumerEvent::Flush { handled }) else {
            return;
        };

        error!(error = err.to_string(), "flush failed");
        if let Err(e) = self
            .pipeline
            .emit(&ConsumerEvent::FlushDeferredException { error: &err })
        {
            error!(error = e.to_string(), "flush exception listener failed");
        }
    }
}

impl std::fmt::Debug for Consumer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Consumer")
            .field("queues", &self.queues)
            .field("idle_timeout", &self.idle_timeout)
            .field("wait_timeout", &self.wait_timeout)
            .field("pipeline", &self.pipeline)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        broker::{AmqpChannel, MockAmqpChannel},
        config::QueueSpec,
        errors::ListenerError,
        events::callback,
    };
    use mockall::{predicate::eq, Sequence};
    use parking_lot::Mutex;

    fn delivery(tag: u64) -> Delivery {
        Delivery {
            delivery_tag: tag,
            data: b"{}".to_vec(),
            ..Default::default()
        }
    }

    fn consumer(channel: MockAmqpChannel, queues: &[&str]) -> Consumer {
        timed_consumer(
            channel,
            queues,
            Duration::from_secs(5),
            Duration::from_micros(100),
        )
    }

    fn timed_consumer(
        channel: MockAmqpChannel,
        queues: &[&str],
        idle_timeout: Duration,
        wait_timeout: Duration,
    ) -> Consumer {
        let channel: Arc<dyn AmqpChannel> = Arc::new(channel);
        let queues = queues
            .iter()
            .map(|name| Queue::new(name, QueueSpec::new("ex1"), channel.clone()))
            .collect();

        Consumer::new(queues, idle_timeout, wait_timeout)
    }

    /// Delivers tag 1, stays empty for three polls, then delivers tag 2.
    fn idle_gap_channel() -> MockAmqpChannel {
        let mut seq = Sequence::new();
        let mut channel = MockAmqpChannel::new();
        channel
            .expect_basic_get()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(Some(delivery(1))));
        channel
            .expect_basic_get()
            .times(3)
            .in_sequence(&mut seq)
            .returning(|_| Ok(None));
        channel
            .expect_basic_get()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(Some(delivery(2))));
        channel.expect_basic_ack().times(2).returning(|_| Ok(()));
        channel
    }

    fn recorder(log: &Arc<Mutex<Vec<String>>>) -> Arc<Callback> {
        let log = log.clone();
        callback(move |event| {
            let entry = match event {
                ConsumerEvent::Delivery { queue, delivery } => {
                    format!("delivery:{}:{}", queue, delivery.delivery_tag)
                }
                ConsumerEvent::Flush { handled } => format!("flush:{}", handled),
                ConsumerEvent::DeliveryException { error, .. } => {
                    format!("deliveryException:{}", error)
                }
                ConsumerEvent::FlushDeferredException { error } => {
                    format!("flushDeferredException:{}", error)
                }
            };
            log.lock().push(entry);
            Ok(())
        })
    }

    #[tokio::test]
    async fn acks_handled_delivery_and_flushes_at_limit() {
        let mut channel = MockAmqpChannel::new();
        channel
            .expect_basic_get()
            .withf(|queue| queue == "q1")
            .times(1)
            .returning(|_| Ok(Some(delivery(7))));
        channel
            .expect_basic_ack()
            .with(eq(7))
            .times(1)
            .returning(|_| Ok(()));
        channel.expect_basic_nack().never();

        let log = Arc::new(Mutex::new(vec![]));
        let mut consumer = consumer(channel, &["q1"]);
        consumer.on(EventKind::Delivery, recorder(&log));
        consumer.on(EventKind::Flush, recorder(&log));

        assert_eq!(consumer.consume(Some(1)).await, Ok(1));
        assert_eq!(*log.lock(), vec!["delivery:q1:7", "flush:1"]);
    }

    #[tokio::test]
    async fn polls_queues_in_declaration_order() {
        let mut seq = Sequence::new();
        let mut channel = MockAmqpChannel::new();
        channel
            .expect_basic_get()
            .withf(|queue| queue == "first")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(None));
        channel
            .expect_basic_get()
            .withf(|queue| queue == "second")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(Some(delivery(1))));
        channel.expect_basic_ack().returning(|_| Ok(()));

        let log = Arc::new(Mutex::new(vec![]));
        let mut consumer = consumer(channel, &["first", "second"]);
        consumer.on(EventKind::Delivery, recorder(&log));

        assert_eq!(consumer.consume(Some(1)).await, Ok(1));
        assert_eq!(*log.lock(), vec!["delivery:second:1"]);
    }

    #[tokio::test]
    async fn failed_delivery_is_rejected_and_reported() {
        let mut channel = MockAmqpChannel::new();
        channel
            .expect_basic_get()
            .returning(|_| Ok(Some(delivery(3))));
        channel.expect_basic_ack().never();
        channel
            .expect_basic_nack()
            .with(eq(3), eq(false))
            .times(1)
            .returning(|_, _| Ok(()));

        let log = Arc::new(Mutex::new(vec![]));
        let mut consumer = consumer(channel, &["q1"]);
        consumer.on(
            EventKind::Delivery,
            callback(|_| Err(ListenerError::new("bad payload"))),
        );
        consumer.on(EventKind::DeliveryException, recorder(&log));

        assert_eq!(consumer.consume(Some(1)).await, Ok(1));
        assert_eq!(*log.lock(), vec!["deliveryException:bad payload"]);
    }

    #[tokio::test]
    async fn failed_flush_is_reported() {
        let mut channel = MockAmqpChannel::new();
        channel
            .expect_basic_get()
            .returning(|_| Ok(Some(delivery(1))));
        channel.expect_basic_ack().returning(|_| Ok(()));

        let log = Arc::new(Mutex::new(vec![]));
        let mut consumer = consumer(channel, &["q1"]);
        consumer.on(
            EventKind::Flush,
            callback(|_| Err(ListenerError::new("db down"))),
        );
        consumer.on(EventKind::FlushDeferredException, recorder(&log));

        assert_eq!(consumer.consume(Some(1)).await, Ok(1));
        assert_eq!(*log.lock(), vec!["flushDeferredException:db down"]);
    }

    #[tokio::test]
    async fn flushes_after_idle_timeout() {
        let log = Arc::new(Mutex::new(vec![]));
        let mut consumer = timed_consumer(
            idle_gap_channel(),
            &["q1"],
            Duration::from_millis(1),
            Duration::from_millis(5),
        );
        consumer.on(EventKind::Delivery, recorder(&log));
        consumer.on(EventKind::Flush, recorder(&log));

        assert_eq!(consumer.consume(Some(2)).await, Ok(2));
        assert_eq!(
            *log.lock(),
            vec!["delivery:q1:1", "flush:1", "delivery:q1:2", "flush:1"]
        );
    }

    #[tokio::test]
    async fn failed_idle_flush_is_reported() {
        let log = Arc::new(Mutex::new(vec![]));
        let mut consumer = timed_consumer(
            idle_gap_channel(),
            &["q1"],
            Duration::from_millis(1),
            Duration::from_millis(5),
        );
        consumer.on(EventKind::Delivery, recorder(&log));
        consumer.on(
            EventKind::Flush,
            callback(|_| Err(ListenerError::new("db down"))),
        );
        consumer.on(EventKind::FlushDeferredException, recorder(&log));

        assert_eq!(consumer.consume(Some(2)).await, Ok(2));
        assert_eq!(
            *log.lock(),
            vec![
                "delivery:q1:1",
                "flushDeferredException:db down",
                "delivery:q1:2",
                "flushDeferredException:db down",
            ]
        );
    }

    #[tokio::test]
    async fn failed_ack_flushes_pending_deliveries() {
        let mut seq = Sequence::new();
        let mut channel = MockAmqpChannel::new();
        channel
            .expect_basic_get()
            .times(2)
            .returning(|_| Ok(Some(delivery(4))));
        channel
            .expect_basic_ack()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        channel
            .expect_basic_ack()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(AmqpError::AckMessageError("channel closed".to_owned())));

        let log = Arc::new(Mutex::new(vec![]));
        let mut consumer = consumer(channel, &["q1"]);
        consumer.on(EventKind::Delivery, recorder(&log));
        consumer.on(EventKind::Flush, recorder(&log));

        assert_eq!(
            consumer.consume(None).await,
            Err(AmqpError::AckMessageError("channel closed".to_owned()))
        );
        assert_eq!(
            *log.lock(),
            vec!["delivery:q1:4", "delivery:q1:4", "flush:2"]
        );
    }

    #[tokio::test]
    async fn broker_errors_stop_the_loop() {
        let mut channel = MockAmqpChannel::new();
        channel.expect_basic_get().returning(|queue| {
            Err(AmqpError::ConsumerError(
                queue.to_owned(),
                "channel closed".to_owned(),
            ))
        });

        let consumer = consumer(channel, &["q1"]);

        assert_eq!(
            consumer.consume(None).await,
            Err(AmqpError::ConsumerError(
                "q1".to_owned(),
                "channel closed".to_owned()
            ))
        );
    }

    #[tokio::test]
    async fn zero_limit_does_not_poll() {
        let mut channel = MockAmqpChannel::new();
        channel.expect_basic_get().never();

        let consumer = consumer(channel, &["q1"]);

        assert_eq!(consumer.consume(Some(0)).await, Ok(0));
    }
}
