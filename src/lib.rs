// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # AMQP Fabric
//!
//! Topology-aware messaging substrate over AMQP 0-9-1. A [`connection`]
//! owns the broker session and a registry of declared [`exchange`]s,
//! [`queue`]s, and [`binding`]s; the whole graph is rebuilt in place after a
//! connection loss, so application handles stay valid across outages.
//! Exchanges publish and make rpc calls over RabbitMQ's direct reply-to;
//! queues consume through [`queue::ConsumerHandler`] implementations and
//! reply automatically when a request carries reply metadata.
//!
//! ```no_run
//! use amqp_fabric::{
//!     connection::{Connection, ConnectionOptions},
//!     exchange::{ExchangeKind, ExchangeOptions},
//!     message::Message,
//!     queue::QueueOptions,
//! };
//! use lapin::types::FieldTable;
//!
//! # async fn run() -> Result<(), amqp_fabric::errors::AmqpError> {
//! let connection = Connection::new("amqp://localhost", ConnectionOptions::default());
//! let exchange = connection.declare_exchange(
//!     "api",
//!     ExchangeKind::Topic,
//!     ExchangeOptions::default(),
//! );
//! let queue = connection.declare_queue("articles", QueueOptions::default());
//! queue.bind(&exchange, "db.req.#", FieldTable::default()).await?;
//! connection.complete_configuration().await?;
//!
//! exchange.send(&Message::new("hello"), "db.req.articles").await?;
//! # Ok(())
//! # }
//! ```

pub mod binding;
pub mod connection;
pub mod errors;
pub mod exchange;
pub mod message;
pub mod queue;
pub mod topology;

mod consumer;
mod otel;
