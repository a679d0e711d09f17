// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Error Types for the AMQP Fabric
//!
//! This module provides the error taxonomy for the messaging substrate.
//! Connection- and channel-level failures are recovered internally through the
//! rebuild state machine and usually reach callers only as latency; the
//! variants here are what survives that recovery: terminal connection
//! failures, declaration failures, protocol misuse, and application-level
//! reply errors.

use std::time::Duration;
use thiserror::Error;

/// Represents errors that can occur during AMQP operations.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum AmqpError {
    /// Internal errors that don't fit into other categories
    #[error("internal error")]
    InternalError,

    /// The reconnect policy was exhausted without establishing a session
    #[error("connection failed")]
    ConnectionError,

    /// The connection was closed intentionally and will not reconnect
    #[error("connection closed")]
    ConnectionClosed,

    /// Error creating a channel from an established session
    #[error("failure to create a channel")]
    ChannelError,

    /// Error declaring an exchange with the given name
    #[error("failure to declare exchange `{0}`")]
    DeclareExchangeError(String),

    /// Error declaring a queue with the given name
    #[error("failure to declare queue `{0}`")]
    DeclareQueueError(String),

    /// A node failed its (re)initialization sequence
    #[error("failure to initialize `{name}`: {reason}")]
    InitializationError { name: String, reason: String },

    /// Error binding a destination node to a source exchange
    #[error("failure to bind `{0}` to `{1}`")]
    BindError(String, String),

    /// Error unbinding a destination node from a source exchange
    #[error("failure to unbind `{0}` from `{1}`")]
    UnbindError(String, String),

    /// Unbind was requested for a binding that was never declared
    #[error("unknown binding `{0}`")]
    UnknownBinding(String),

    /// A binding references a node that is not in the registry
    #[error("unknown node `{0}`")]
    UnknownNode(String),

    /// Error publishing a message
    #[error("failure to publish")]
    PublishingError,

    /// Error parsing a message payload
    #[error("failure to parse payload")]
    ParsePayloadError,

    /// Error acknowledging a message
    #[error("failure to ack message")]
    AckMessageError,

    /// Error negative-acknowledging a message
    #[error("failure to nack message")]
    NackMessageError,

    /// Error requeuing unacknowledged messages
    #[error("failure to recover unacked messages")]
    RecoverError,

    /// Error configuring the prefetch count
    #[error("failure to configure qos `{0}`")]
    QoSDeclarationError(String),

    /// Error starting a consumer on the given queue
    #[error("failure to start consumer on `{0}`")]
    ConsumerDeclarationError(String),

    /// Error cancelling the consumer with the given tag
    #[error("failure to cancel consumer `{0}`")]
    ConsumerCancelError(String),

    /// Ack/nack was called on a message that is not an inbound delivery
    #[error("message is not an inbound delivery")]
    NotADelivery,

    /// No reply arrived for an rpc call within the allotted time
    #[error("rpc timed out after {0:?}")]
    RpcTimeout(Duration),

    /// The reply slot was dropped before a reply arrived, usually because
    /// the owning channel was torn down during a rebuild
    #[error("rpc reply channel dropped")]
    RpcReplyDropped,

    /// The reply envelope carried an application-level error
    #[error("reply error: {0}")]
    ReplyError(String),
}
