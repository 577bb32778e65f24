// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # AMQP Channel Management
//!
//! Every consumer and producer gets its own channel so that flow-control state
//! is never shared between them. Channel-level tuning (prefetch) is applied
//! right after the channel is opened.

use crate::{
    broker::{AmqpChannel, AmqpConnection},
    config::QosSpec,
    errors::AmqpError,
};
use std::sync::Arc;
use tracing::{debug, error};

/// Opens channels on resolved connections.
pub struct ChannelFactory;

impl ChannelFactory {
    /// Opens a new channel on `connection` and applies `qos` when present.
    pub async fn open(
        connection: &Arc<dyn AmqpConnection>,
        qos: Option<&QosSpec>,
    ) -> Result<Arc<dyn AmqpChannel>, AmqpError> {
        debug!("creating amqp channel...");
        let channel = match connection.create_channel().await {
            Ok(c) => c,
            Err(err) => {
                error!(error = err.to_string(), "error to create the channel");
                return Err(err);
            }
        };
        debug!("channel created");

        if let Some(qos) = qos {
            debug!(prefetch_count = qos.prefetch_count, global = qos.global, "configuring qos");

            if let Err(err) = channel.basic_qos(qos.prefetch_count, qos.global).await {
                error!(error = err.to_string(), "failure to configure qos");
                return Err(err);
            }
        }

        Ok(channel)
    }
}
