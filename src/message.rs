// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Message Envelope
//!
//! This module provides the envelope type that translates between application
//! payloads and wire bytes. Outbound messages carry correlation metadata and
//! the current trace context in their headers; inbound messages additionally
//! carry routing fields and an acker for the underlying delivery.
//!
//! The module also defines the reply body contract shared by all collaborators
//! of the fabric: a JSON object with optional `error`, `doc` and `docs`
//! fields, where a populated `error` must be turned into a typed error before
//! the payload is consumed.

use crate::{
    connection::ConnectionInner, errors::AmqpError, exchange::Exchange, otel::AmqpTracePropagator,
    queue::Queue,
};
use lapin::{
    acker::Acker,
    message::Delivery,
    options::{BasicAckOptions, BasicNackOptions, BasicPublishOptions},
    protocol::basic::AMQPProperties,
    types::{AMQPValue, FieldTable, ShortString},
    BasicProperties, Channel,
};
use opentelemetry::{global, Context};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, sync::Arc};
use tracing::{debug, error, warn};

/// Content type stamped on JSON-serialized payloads
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Typed view over a message payload.
///
/// Text is stored as raw UTF-8 bytes without a content type, structured values
/// are serialized to JSON and stamped with `application/json`, and raw bytes
/// pass through untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageContent {
    Text(String),
    Json(serde_json::Value),
    Bytes(Vec<u8>),
}

impl MessageContent {
    /// Serializes any `Serialize` value into JSON content.
    pub fn json<T: Serialize>(value: &T) -> Result<MessageContent, AmqpError> {
        match serde_json::to_value(value) {
            Ok(v) => Ok(MessageContent::Json(v)),
            Err(err) => {
                debug!(error = err.to_string(), "failure to serialize payload");
                Err(AmqpError::ParsePayloadError)
            }
        }
    }
}

impl From<&str> for MessageContent {
    fn from(value: &str) -> Self {
        MessageContent::Text(value.to_owned())
    }
}

impl From<String> for MessageContent {
    fn from(value: String) -> Self {
        MessageContent::Text(value)
    }
}

impl From<Vec<u8>> for MessageContent {
    fn from(value: Vec<u8>) -> Self {
        MessageContent::Bytes(value)
    }
}

impl From<serde_json::Value> for MessageContent {
    fn from(value: serde_json::Value) -> Self {
        MessageContent::Json(value)
    }
}

/// Application-visible message metadata.
#[derive(Debug, Clone, Default)]
pub struct MessageProperties {
    pub correlation_id: Option<String>,
    pub reply_to: Option<String>,
    pub content_type: Option<String>,
    pub headers: BTreeMap<ShortString, AMQPValue>,
}

impl MessageProperties {
    fn from_amqp(props: &AMQPProperties) -> MessageProperties {
        MessageProperties {
            correlation_id: props.correlation_id().as_ref().map(|v| v.to_string()),
            reply_to: props.reply_to().as_ref().map(|v| v.to_string()),
            content_type: props.content_type().as_ref().map(|v| v.to_string()),
            headers: props
                .headers()
                .as_ref()
                .map(|table| table.inner().clone())
                .unwrap_or_default(),
        }
    }
}

/// Routing metadata attached to a message on receipt.
#[derive(Debug, Clone)]
pub struct DeliveryFields {
    pub exchange: String,
    pub routing_key: String,
    pub redelivered: bool,
    pub delivery_tag: u64,
}

/// Where a message is published to: an exchange with a caller-supplied
/// routing key, or straight to a queue through the default exchange.
pub enum Destination<'d> {
    Exchange(&'d Exchange),
    Queue(&'d Queue),
}

impl Destination<'_> {
    async fn ready(&self) -> Result<(), AmqpError> {
        match self {
            Destination::Exchange(exchange) => exchange.ready().await,
            Destination::Queue(queue) => queue.ready().await,
        }
    }

    fn current_channel(&self) -> Option<Channel> {
        match self {
            Destination::Exchange(exchange) => exchange.current_channel(),
            Destination::Queue(queue) => queue.current_channel(),
        }
    }

    fn connection(&self) -> Result<Arc<ConnectionInner>, AmqpError> {
        match self {
            Destination::Exchange(exchange) => exchange.connection(),
            Destination::Queue(queue) => queue.connection(),
        }
    }
}

/// Envelope wrapping an arbitrary payload plus its metadata.
///
/// Messages are ephemeral: one is created per publish and per inbound
/// delivery, and nothing is persisted by this layer.
#[derive(Debug)]
pub struct Message {
    content: Vec<u8>,
    pub properties: MessageProperties,
    fields: Option<DeliveryFields>,
    acker: Option<Acker>,
}

impl Message {
    /// Creates an outbound message from the given content.
    pub fn new(content: impl Into<MessageContent>) -> Message {
        let mut message = Message {
            content: Vec::new(),
            properties: MessageProperties::default(),
            fields: None,
            acker: None,
        };
        message.set_content(content);
        message
    }

    /// Wraps an inbound delivery, keeping its acker for later ack/nack.
    pub(crate) fn from_delivery(delivery: Delivery) -> Message {
        let properties = MessageProperties::from_amqp(&delivery.properties);
        Message {
            content: delivery.data,
            properties,
            fields: Some(DeliveryFields {
                exchange: delivery.exchange.to_string(),
                routing_key: delivery.routing_key.to_string(),
                redelivered: delivery.redelivered,
                delivery_tag: delivery.delivery_tag,
            }),
            acker: Some(delivery.acker),
        }
    }

    /// Replaces the payload. Structured values are JSON-serialized and stamp
    /// the content type; strings and bytes are stored raw.
    pub fn set_content(&mut self, content: impl Into<MessageContent>) {
        match content.into() {
            MessageContent::Text(text) => self.content = text.into_bytes(),
            MessageContent::Bytes(bytes) => self.content = bytes,
            MessageContent::Json(value) => {
                self.content = value.to_string().into_bytes();
                self.properties.content_type = Some(JSON_CONTENT_TYPE.to_owned());
            }
        }
    }

    /// Recovers the typed payload, deserializing JSON when the content type
    /// says so and falling back to raw bytes for non-UTF-8 payloads.
    pub fn get_content(&self) -> Result<MessageContent, AmqpError> {
        if self.properties.content_type.as_deref() == Some(JSON_CONTENT_TYPE) {
            return match serde_json::from_slice(&self.content) {
                Ok(value) => Ok(MessageContent::Json(value)),
                Err(err) => {
                    debug!(error = err.to_string(), "failure to parse json payload");
                    Err(AmqpError::ParsePayloadError)
                }
            };
        }

        match String::from_utf8(self.content.clone()) {
            Ok(text) => Ok(MessageContent::Text(text)),
            Err(_) => Ok(MessageContent::Bytes(self.content.clone())),
        }
    }

    /// Raw payload bytes.
    pub fn content(&self) -> &[u8] {
        &self.content
    }

    /// Routing metadata, present only on inbound deliveries.
    pub fn fields(&self) -> Option<&DeliveryFields> {
        self.fields.as_ref()
    }

    /// Parses the payload as a reply envelope.
    pub fn envelope(&self) -> Result<ReplyEnvelope, AmqpError> {
        match serde_json::from_slice(&self.content) {
            Ok(envelope) => Ok(envelope),
            Err(err) => {
                debug!(error = err.to_string(), "malformed reply envelope");
                Err(AmqpError::ParsePayloadError)
            }
        }
    }

    /// Publishes this message to the destination when its initialization
    /// settles. A failed publish forces a connection rebuild and the message
    /// is retransmitted once per successful rebuild cycle; a failed rebuild
    /// is terminal for the send.
    pub async fn send_to(
        &self,
        destination: Destination<'_>,
        routing_key: &str,
    ) -> Result<(), AmqpError> {
        let (exchange_name, key) = match &destination {
            Destination::Exchange(exchange) => {
                (exchange.name().to_owned(), routing_key.to_owned())
            }
            Destination::Queue(queue) => (String::new(), queue.name().to_owned()),
        };
        let connection = destination.connection()?;
        let properties = self.amqp_properties();

        loop {
            destination.ready().await?;
            let Some(channel) = destination.current_channel() else {
                return Err(AmqpError::ChannelError);
            };

            match channel
                .basic_publish(
                    &exchange_name,
                    &key,
                    BasicPublishOptions::default(),
                    &self.content,
                    properties.clone(),
                )
                .await
            {
                Ok(_confirm) => return Ok(()),
                Err(err) => {
                    warn!(
                        error = err.to_string(),
                        exchange = exchange_name,
                        routing_key = key,
                        "publish failed, rebuilding connection before retransmit"
                    );
                    connection.rebuild_all().await?;
                    debug!("retransmitting message");
                }
            }
        }
    }

    /// Acknowledges the underlying delivery.
    pub async fn ack(&self, all_up_to: bool) -> Result<(), AmqpError> {
        let Some(acker) = &self.acker else {
            return Err(AmqpError::NotADelivery);
        };
        match acker.ack(BasicAckOptions { multiple: all_up_to }).await {
            Ok(_) => Ok(()),
            Err(err) => {
                error!(error = err.to_string(), "failure to ack message");
                Err(AmqpError::AckMessageError)
            }
        }
    }

    /// Rejects the underlying delivery, optionally requeueing it.
    pub async fn nack(&self, all_up_to: bool, requeue: bool) -> Result<(), AmqpError> {
        let Some(acker) = &self.acker else {
            return Err(AmqpError::NotADelivery);
        };
        match acker
            .nack(BasicNackOptions {
                multiple: all_up_to,
                requeue,
            })
            .await
        {
            Ok(_) => Ok(()),
            Err(err) => {
                error!(error = err.to_string(), "failure to nack message");
                Err(AmqpError::NackMessageError)
            }
        }
    }

    /// Builds the wire properties, injecting the current trace context into
    /// the message headers.
    pub(crate) fn amqp_properties(&self) -> BasicProperties {
        let mut headers = self.properties.headers.clone();
        global::get_text_map_propagator(|propagator| {
            propagator.inject_context(
                &Context::current(),
                &mut AmqpTracePropagator::new(&mut headers),
            )
        });

        let mut props = BasicProperties::default().with_headers(FieldTable::from(headers));
        if let Some(content_type) = &self.properties.content_type {
            props = props.with_content_type(ShortString::from(content_type.as_str()));
        }
        if let Some(correlation_id) = &self.properties.correlation_id {
            props = props.with_correlation_id(ShortString::from(correlation_id.as_str()));
        }
        if let Some(reply_to) = &self.properties.reply_to {
            props = props.with_reply_to(ShortString::from(reply_to.as_str()));
        }
        props
    }
}

impl From<MessageContent> for Message {
    fn from(content: MessageContent) -> Self {
        Message::new(content)
    }
}

impl From<&str> for Message {
    fn from(content: &str) -> Self {
        Message::new(content)
    }
}

impl From<String> for Message {
    fn from(content: String) -> Self {
        Message::new(content)
    }
}

impl From<Vec<u8>> for Message {
    fn from(content: Vec<u8>) -> Self {
        Message::new(content)
    }
}

impl From<serde_json::Value> for Message {
    fn from(content: serde_json::Value) -> Self {
        Message::new(content)
    }
}

/// Reply body contract used by all collaborators of the fabric.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ReplyEnvelope {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ReplyError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docs: Option<Vec<serde_json::Value>>,
}

/// Application-level error carried inside a reply envelope.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReplyError {
    pub message: String,
}

impl ReplyEnvelope {
    /// Converts a populated `error` field into a typed error, returning the
    /// envelope untouched otherwise.
    pub fn check_error(self) -> Result<ReplyEnvelope, AmqpError> {
        match self.error {
            Some(err) => Err(AmqpError::ReplyError(err.message)),
            None => Ok(self),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn text_content_keeps_raw_bytes_and_no_content_type() {
        let message = Message::new("plain text");

        assert_eq!(message.content(), b"plain text");
        assert_eq!(message.properties.content_type, None);
        assert_eq!(
            message.get_content().unwrap(),
            MessageContent::Text("plain text".to_owned())
        );
    }

    #[test]
    fn json_content_is_serialized_and_stamps_content_type() {
        let message = Message::new(json!({ "doc": { "id": 7 } }));

        assert_eq!(
            message.properties.content_type.as_deref(),
            Some(JSON_CONTENT_TYPE)
        );
        assert_eq!(
            message.get_content().unwrap(),
            MessageContent::Json(json!({ "doc": { "id": 7 } }))
        );
    }

    #[test]
    fn byte_content_passes_through_untouched() {
        let message = Message::new(vec![0u8, 159, 146, 150]);

        assert_eq!(message.properties.content_type, None);
        assert_eq!(
            message.get_content().unwrap(),
            MessageContent::Bytes(vec![0u8, 159, 146, 150])
        );
    }

    #[test]
    fn json_content_type_with_invalid_payload_is_a_parse_error() {
        let mut message = Message::new(vec![1u8, 2, 3]);
        message.properties.content_type = Some(JSON_CONTENT_TYPE.to_owned());

        assert_eq!(
            message.get_content().unwrap_err(),
            AmqpError::ParsePayloadError
        );
    }

    #[test]
    fn envelope_error_is_rejected_by_check_error() {
        let message = Message::new(json!({ "error": { "message": "boom" } }));

        let err = message.envelope().unwrap().check_error().unwrap_err();
        assert_eq!(err, AmqpError::ReplyError("boom".to_owned()));
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn envelope_without_error_passes_check_error() {
        let message = Message::new(json!({ "doc": { "title": "hello" } }));

        let envelope = message.envelope().unwrap().check_error().unwrap();
        assert_eq!(envelope.doc, Some(json!({ "title": "hello" })));
        assert_eq!(envelope.docs, None);
    }

    #[test]
    fn malformed_envelope_is_a_parse_error() {
        let message = Message::new("not json at all");

        assert_eq!(message.envelope().unwrap_err(), AmqpError::ParsePayloadError);
    }

    #[tokio::test]
    async fn ack_on_outbound_message_is_rejected() {
        let message = Message::new("outbound");

        assert_eq!(message.ack(false).await.unwrap_err(), AmqpError::NotADelivery);
        assert_eq!(
            message.nack(false, true).await.unwrap_err(),
            AmqpError::NotADelivery
        );
    }
}
