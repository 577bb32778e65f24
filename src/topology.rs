// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Topology Validation
//!
//! Read-only cross-check of consumer and producer specs against the configured
//! graph, run before any broker resource is touched. Checks run in a fixed
//! order and the first failure is returned.

use crate::{
    config::{ConsumerSpec, ProducerSpec, TopologyConfig},
    errors::{ConfigurationError, EntityKind},
};

/// Validates specs against a [`TopologyConfig`].
pub struct TopologyValidator<'cfg> {
    config: &'cfg TopologyConfig,
}

impl<'cfg> TopologyValidator<'cfg> {
    pub fn new(config: &'cfg TopologyConfig) -> Self {
        TopologyValidator { config }
    }

    /// Validates the consumer `name`.
    ///
    /// Every queue must exist and, together with its exchange, live on the
    /// consumer's effective connection.
    pub fn validate_consumer(
        &self,
        name: &str,
        spec: &ConsumerSpec,
    ) -> Result<(), ConfigurationError> {
        if spec.queues.is_empty() {
            return Err(ConfigurationError::MissingQueues {
                consumer: name.to_owned(),
            });
        }

        let connection = self.config.effective_connection(&spec.connection);

        for queue_name in &spec.queues {
            let Some(queue) = self.config.queues.get(queue_name) else {
                return Err(ConfigurationError::UnknownQueue {
                    queue: queue_name.clone(),
                });
            };

            self.ensure_connection(
                EntityKind::Queue,
                queue_name,
                self.config.effective_connection(&queue.connection),
                connection,
            )?;

            self.validate_exchange(&queue.exchange, connection)?;
        }

        Ok(())
    }

    /// Validates the producer `name`: its exchange must exist on the
    /// producer's effective connection.
    pub fn validate_producer(
        &self,
        name: &str,
        spec: &ProducerSpec,
    ) -> Result<(), ConfigurationError> {
        if spec.exchange.is_empty() {
            return Err(ConfigurationError::MissingExchange {
                producer: name.to_owned(),
            });
        }

        let connection = self.config.effective_connection(&spec.connection);
        self.validate_exchange(&spec.exchange, connection)
    }

    fn validate_exchange(&self, name: &str, want: &str) -> Result<(), ConfigurationError> {
        let Some(exchange) = self.config.exchanges.get(name) else {
            return Err(ConfigurationError::UnknownExchange {
                exchange: name.to_owned(),
            });
        };

        self.ensure_connection(
            EntityKind::Exchange,
            name,
            self.config.effective_connection(&exchange.connection),
            want,
        )
    }

    fn ensure_connection(
        &self,
        entity: EntityKind,
        name: &str,
        got: &str,
        want: &str,
    ) -> Result<(), ConfigurationError> {
        if got == want {
            return Ok(());
        }

        Err(ConfigurationError::ConnectionMismatch {
            entity,
            name: name.to_owned(),
            got: got.to_owned(),
            want: want.to_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{ExchangeSpec, QueueSpec},
        exchange::ExchangeKind,
    };

    fn config() -> TopologyConfig {
        TopologyConfig::default()
            .with_exchange("ex1", ExchangeSpec::new(ExchangeKind::Direct))
            .with_exchange(
                "ex_other",
                ExchangeSpec::new(ExchangeKind::Direct).on_connection("other"),
            )
            .with_queue("q1", QueueSpec::new("ex1"))
            .with_queue("q_other", QueueSpec::new("ex1").on_connection("other"))
            .with_queue("q_cross", QueueSpec::new("ex_other"))
            .with_queue("q_dangling", QueueSpec::new("missing"))
    }

    #[test]
    fn accepts_consistent_consumer() {
        let config = config();

        assert_eq!(
            TopologyValidator::new(&config).validate_consumer("c1", &ConsumerSpec::new(&["q1"])),
            Ok(())
        );
    }

    #[test]
    fn rejects_missing_queues() {
        let config = config();

        assert_eq!(
            TopologyValidator::new(&config).validate_consumer("c0", &ConsumerSpec::default()),
            Err(ConfigurationError::MissingQueues {
                consumer: "c0".to_owned()
            })
        );
    }

    #[test]
    fn rejects_unknown_queue() {
        let config = config();

        assert_eq!(
            TopologyValidator::new(&config).validate_consumer("c2", &ConsumerSpec::new(&["qx"])),
            Err(ConfigurationError::UnknownQueue {
                queue: "qx".to_owned()
            })
        );
    }

    #[test]
    fn rejects_queue_on_other_connection() {
        let config = config();

        assert_eq!(
            TopologyValidator::new(&config)
                .validate_consumer("c1", &ConsumerSpec::new(&["q_other"])),
            Err(ConfigurationError::ConnectionMismatch {
                entity: EntityKind::Queue,
                name: "q_other".to_owned(),
                got: "other".to_owned(),
                want: "default".to_owned(),
            })
        );
    }

    #[test]
    fn rejects_exchange_on_other_connection() {
        let config = config();

        assert_eq!(
            TopologyValidator::new(&config)
                .validate_consumer("c1", &ConsumerSpec::new(&["q_cross"])),
            Err(ConfigurationError::ConnectionMismatch {
                entity: EntityKind::Exchange,
                name: "ex_other".to_owned(),
                got: "other".to_owned(),
                want: "default".to_owned(),
            })
        );
    }

    #[test]
    fn rejects_unknown_exchange() {
        let config = config();

        assert_eq!(
            TopologyValidator::new(&config)
                .validate_consumer("c1", &ConsumerSpec::new(&["q_dangling"])),
            Err(ConfigurationError::UnknownExchange {
                exchange: "missing".to_owned()
            })
        );
    }

    #[test]
    fn first_failing_queue_wins() {
        let config = config();

        assert_eq!(
            TopologyValidator::new(&config)
                .validate_consumer("c1", &ConsumerSpec::new(&["q1", "qx", "q_other"])),
            Err(ConfigurationError::UnknownQueue {
                queue: "qx".to_owned()
            })
        );
    }

    #[test]
    fn consumer_connection_overrides_default() {
        let config = config();
        let spec = ConsumerSpec::new(&["q1"]).on_connection("other");

        assert_eq!(
            TopologyValidator::new(&config).validate_consumer("c1", &spec),
            Err(ConfigurationError::ConnectionMismatch {
                entity: EntityKind::Queue,
                name: "q1".to_owned(),
                got: "default".to_owned(),
                want: "other".to_owned(),
            })
        );
    }

    #[test]
    fn validates_producer_exchange() {
        let config = config();
        let validator = TopologyValidator::new(&config);

        assert_eq!(
            validator.validate_producer("p1", &ProducerSpec::new("ex1")),
            Ok(())
        );
        assert_eq!(
            validator.validate_producer("p1", &ProducerSpec::default()),
            Err(ConfigurationError::MissingExchange {
                producer: "p1".to_owned()
            })
        );
        assert_eq!(
            validator.validate_producer("p1", &ProducerSpec::new("nope")),
            Err(ConfigurationError::UnknownExchange {
                exchange: "nope".to_owned()
            })
        );
        assert!(matches!(
            validator.validate_producer("p1", &ProducerSpec::new("ex_other")),
            Err(ConfigurationError::ConnectionMismatch {
                entity: EntityKind::Exchange,
                ..
            })
        ));
    }
}
