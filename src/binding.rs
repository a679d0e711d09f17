// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Binding Registry Entries
//!
//! A binding routes messages from a source exchange to a destination node
//! (queue or exchange) under a routing pattern. Bindings are registered on
//! the connection under a deterministic identity derived from the triple, so
//! re-declaring the same route is idempotent and unbinding needs no handle.
//! Sources are always exchanges; queues cannot route onward.

use crate::{
    connection::{await_ready, lock, ConnectionInner, InitState},
    errors::AmqpError,
};
use lapin::{
    options::{ExchangeBindOptions, ExchangeUnbindOptions, QueueBindOptions},
    types::FieldTable,
};
use std::{fmt, sync::Weak};
use tokio::sync::watch;
use tracing::{debug, error};

/// The two node kinds a binding can point at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Exchange,
    Queue,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKind::Exchange => write!(f, "Exchange"),
            NodeKind::Queue => write!(f, "Queue"),
        }
    }
}

/// Destination half of a binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingTarget {
    pub kind: NodeKind,
    pub name: String,
}

impl BindingTarget {
    pub fn exchange(name: &str) -> BindingTarget {
        BindingTarget {
            kind: NodeKind::Exchange,
            name: name.to_owned(),
        }
    }

    pub fn queue(name: &str) -> BindingTarget {
        BindingTarget {
            kind: NodeKind::Queue,
            name: name.to_owned(),
        }
    }
}

/// A registered binding. Like exchanges and queues it holds only a weak
/// back-reference to the connection and is replayed on every rebuild.
pub struct Binding {
    connection: Weak<ConnectionInner>,
    source: String,
    destination: BindingTarget,
    pattern: String,
    args: FieldTable,
    init: watch::Sender<InitState>,
}

impl Binding {
    pub(crate) fn new(
        connection: Weak<ConnectionInner>,
        destination: BindingTarget,
        source: &str,
        pattern: &str,
        args: FieldTable,
    ) -> Binding {
        let (init, _) = watch::channel(InitState::Pending);
        Binding {
            connection,
            source: source.to_owned(),
            destination,
            pattern: pattern.to_owned(),
            args,
            init,
        }
    }

    /// Deterministic identity of a binding: the same triple always maps to
    /// the same registry key.
    pub fn binding_id(source: &str, destination: &BindingTarget, pattern: &str) -> String {
        format!(
            "[{}]to{}[{}]{}",
            source, destination.kind, destination.name, pattern
        )
    }

    pub fn id(&self) -> String {
        Binding::binding_id(&self.source, &self.destination, &self.pattern)
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn destination(&self) -> &BindingTarget {
        &self.destination
    }

    /// True when the target is this binding's source exchange or its
    /// destination node. Used by cascade deletes on node teardown.
    pub(crate) fn references(&self, target: &BindingTarget) -> bool {
        (target.kind == NodeKind::Exchange && target.name == self.source)
            || *target == self.destination
    }

    pub(crate) async fn ready(&self) -> Result<(), AmqpError> {
        await_ready(&self.init, &self.id()).await
    }

    /// Provisions the binding on the broker once both endpoints are ready.
    /// A failure prunes the binding from the connection registry.
    pub(crate) async fn initialize(&self) {
        self.init.send_replace(InitState::Pending);
        match self.try_initialize().await {
            Ok(()) => {
                self.init.send_replace(InitState::Ready);
            }
            Err(err) => {
                error!(
                    error = err.to_string(),
                    binding = self.id(),
                    "failure to initialize binding"
                );
                if let Some(connection) = self.connection.upgrade() {
                    lock(&connection.bindings).remove(&self.id());
                }
                self.init.send_replace(InitState::Failed(err.to_string()));
            }
        }
    }

    async fn try_initialize(&self) -> Result<(), AmqpError> {
        let connection = self.connection.upgrade().ok_or(AmqpError::ConnectionClosed)?;

        let source = lock(&connection.exchanges).get(&self.source).cloned();
        if let Some(source) = source {
            source.ready().await?;
        }

        match self.destination.kind {
            NodeKind::Queue => {
                let queue = lock(&connection.queues)
                    .get(&self.destination.name)
                    .cloned()
                    .ok_or_else(|| AmqpError::UnknownNode(self.destination.name.clone()))?;
                queue.ready().await?;
                let Some(channel) = queue.current_channel() else {
                    return Err(AmqpError::ChannelError);
                };
                if let Err(err) = channel
                    .queue_bind(
                        &self.destination.name,
                        &self.source,
                        &self.pattern,
                        QueueBindOptions::default(),
                        self.args.clone(),
                    )
                    .await
                {
                    error!(
                        error = err.to_string(),
                        binding = self.id(),
                        "error to bind the queue"
                    );
                    return Err(AmqpError::BindError(
                        self.destination.name.clone(),
                        self.source.clone(),
                    ));
                }
            }
            NodeKind::Exchange => {
                let exchange = lock(&connection.exchanges)
                    .get(&self.destination.name)
                    .cloned()
                    .ok_or_else(|| AmqpError::UnknownNode(self.destination.name.clone()))?;
                exchange.ready().await?;
                let Some(channel) = exchange.current_channel() else {
                    return Err(AmqpError::ChannelError);
                };
                if let Err(err) = channel
                    .exchange_bind(
                        &self.destination.name,
                        &self.source,
                        &self.pattern,
                        ExchangeBindOptions::default(),
                        self.args.clone(),
                    )
                    .await
                {
                    error!(
                        error = err.to_string(),
                        binding = self.id(),
                        "error to bind the exchange"
                    );
                    return Err(AmqpError::BindError(
                        self.destination.name.clone(),
                        self.source.clone(),
                    ));
                }
            }
        }

        debug!(binding = self.id(), "binding established");
        Ok(())
    }

    /// Removes the binding from the broker and deregisters it. The registry
    /// entry is pruned even when the broker-side unbind fails.
    pub(crate) async fn delete(&self) -> Result<(), AmqpError> {
        let result = self.unbind_from_broker().await;
        if let Some(connection) = self.connection.upgrade() {
            lock(&connection.bindings).remove(&self.id());
        }
        self.init
            .send_replace(InitState::Failed("binding was removed".to_owned()));
        result
    }

    async fn unbind_from_broker(&self) -> Result<(), AmqpError> {
        let connection = self.connection.upgrade().ok_or(AmqpError::ConnectionClosed)?;

        match self.destination.kind {
            NodeKind::Queue => {
                let queue = lock(&connection.queues)
                    .get(&self.destination.name)
                    .cloned()
                    .ok_or_else(|| AmqpError::UnknownNode(self.destination.name.clone()))?;
                let Some(channel) = queue.current_channel() else {
                    return Err(AmqpError::ChannelError);
                };
                if let Err(err) = channel
                    .queue_unbind(
                        &self.destination.name,
                        &self.source,
                        &self.pattern,
                        self.args.clone(),
                    )
                    .await
                {
                    error!(
                        error = err.to_string(),
                        binding = self.id(),
                        "error to unbind the queue"
                    );
                    return Err(AmqpError::UnbindError(
                        self.destination.name.clone(),
                        self.source.clone(),
                    ));
                }
            }
            NodeKind::Exchange => {
                let exchange = lock(&connection.exchanges)
                    .get(&self.destination.name)
                    .cloned()
                    .ok_or_else(|| AmqpError::UnknownNode(self.destination.name.clone()))?;
                let Some(channel) = exchange.current_channel() else {
                    return Err(AmqpError::ChannelError);
                };
                if let Err(err) = channel
                    .exchange_unbind(
                        &self.destination.name,
                        &self.source,
                        &self.pattern,
                        ExchangeUnbindOptions::default(),
                        self.args.clone(),
                    )
                    .await
                {
                    error!(
                        error = err.to_string(),
                        binding = self.id(),
                        "error to unbind the exchange"
                    );
                    return Err(AmqpError::UnbindError(
                        self.destination.name.clone(),
                        self.source.clone(),
                    ));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_is_deterministic_for_queue_destinations() {
        let target = BindingTarget::queue("articles");

        assert_eq!(
            Binding::binding_id("api", &target, "db.req.#"),
            "[api]toQueue[articles]db.req.#"
        );
        assert_eq!(
            Binding::binding_id("api", &target, "db.req.#"),
            Binding::binding_id("api", &target, "db.req.#")
        );
    }

    #[test]
    fn identity_is_deterministic_for_exchange_destinations() {
        let target = BindingTarget::exchange("audit");

        assert_eq!(
            Binding::binding_id("api", &target, "#"),
            "[api]toExchange[audit]#"
        );
    }

    #[test]
    fn identity_distinguishes_kind_pattern_and_endpoints() {
        let queue = BindingTarget::queue("articles");
        let exchange = BindingTarget::exchange("articles");

        assert_ne!(
            Binding::binding_id("api", &queue, "#"),
            Binding::binding_id("api", &exchange, "#")
        );
        assert_ne!(
            Binding::binding_id("api", &queue, "a.#"),
            Binding::binding_id("api", &queue, "b.#")
        );
        assert_ne!(
            Binding::binding_id("api", &queue, "#"),
            Binding::binding_id("audit", &queue, "#")
        );
    }

    #[test]
    fn cascade_matching_covers_source_and_destination() {
        let binding = Binding::new(
            Weak::new(),
            BindingTarget::queue("articles"),
            "api",
            "db.req.#",
            FieldTable::default(),
        );

        assert!(binding.references(&BindingTarget::exchange("api")));
        assert!(binding.references(&BindingTarget::queue("articles")));
        assert!(!binding.references(&BindingTarget::queue("api")));
        assert!(!binding.references(&BindingTarget::exchange("articles")));
    }
}
