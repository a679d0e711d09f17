// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Declarative Topology
//!
//! A topology definition describes a whole messaging graph up front:
//! exchanges, queues, and the bindings between them. Declaring one resolves
//! only after every constituent is provisioned, which gives applications a
//! single readiness barrier at startup.

use crate::{exchange::ExchangeDefinition, queue::QueueDefinition};

/// Destination half of a declared binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindingDestination {
    Exchange(String),
    Queue(String),
}

/// A binding between a source exchange and a destination node. Sources are
/// exchanges by construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingDefinition {
    pub source: String,
    pub destination: BindingDestination,
    pub pattern: String,
}

impl BindingDefinition {
    pub fn to_queue(source: &str, queue: &str, pattern: &str) -> BindingDefinition {
        BindingDefinition {
            source: source.to_owned(),
            destination: BindingDestination::Queue(queue.to_owned()),
            pattern: pattern.to_owned(),
        }
    }

    pub fn to_exchange(source: &str, exchange: &str, pattern: &str) -> BindingDefinition {
        BindingDefinition {
            source: source.to_owned(),
            destination: BindingDestination::Exchange(exchange.to_owned()),
            pattern: pattern.to_owned(),
        }
    }
}

/// The full messaging graph of an application.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopologyDefinition {
    pub exchanges: Vec<ExchangeDefinition>,
    pub queues: Vec<QueueDefinition>,
    pub bindings: Vec<BindingDefinition>,
}

impl TopologyDefinition {
    pub fn new() -> TopologyDefinition {
        TopologyDefinition::default()
    }

    pub fn exchange(mut self, definition: ExchangeDefinition) -> Self {
        self.exchanges.push(definition);
        self
    }

    pub fn queue(mut self, definition: QueueDefinition) -> Self {
        self.queues.push(definition);
        self
    }

    pub fn binding(mut self, definition: BindingDefinition) -> Self {
        self.bindings.push(definition);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::ExchangeKind;

    #[test]
    fn builder_accumulates_the_whole_graph() {
        let topology = TopologyDefinition::new()
            .exchange(ExchangeDefinition::new("api").kind(ExchangeKind::Topic))
            .queue(QueueDefinition::new("articles").prefetch(10))
            .binding(BindingDefinition::to_queue("api", "articles", "db.req.#"))
            .binding(BindingDefinition::to_exchange("api", "audit", "#"));

        assert_eq!(topology.exchanges.len(), 1);
        assert_eq!(topology.queues.len(), 1);
        assert_eq!(topology.bindings.len(), 2);
        assert_eq!(
            topology.bindings[0].destination,
            BindingDestination::Queue("articles".to_owned())
        );
        assert_eq!(
            topology.bindings[1].destination,
            BindingDestination::Exchange("audit".to_owned())
        );
    }
}
