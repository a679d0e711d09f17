// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

use crate::{
    message::Message,
    otel,
    queue::{ConsumerHandler, Queue},
};
use lapin::message::Delivery;
use opentelemetry::{
    global,
    trace::{Span, Status},
};
use std::{borrow::Cow, sync::Arc};
use tracing::{debug, error};

/// Runs the handler for one delivery under a consumer span and, when the
/// handler produced a payload and the request carries reply metadata, sends
/// the reply back through the default exchange.
pub(crate) async fn dispatch(queue: &Arc<Queue>, handler: &dyn ConsumerHandler, delivery: Delivery) {
    let tracer = global::tracer("amqp-fabric");
    let (ctx, mut span) = otel::consumer_span(&delivery.properties, &tracer, queue.name());

    let reply_to = delivery.properties.reply_to().as_ref().map(|v| v.to_string());
    let correlation_id = delivery
        .properties
        .correlation_id()
        .as_ref()
        .map(|v| v.to_string());
    let message = Message::from_delivery(delivery);

    match handler.handle(&ctx, message).await {
        Ok(Some(content)) => {
            match (reply_to, correlation_id) {
                (Some(reply_to), Some(correlation_id)) => {
                    if let Err(err) = queue
                        .reply_to(Message::new(content), &reply_to, &correlation_id)
                        .await
                    {
                        error!(
                            error = err.to_string(),
                            name = queue.name(),
                            "failure to publish the reply"
                        );
                        span.set_status(Status::Error {
                            description: Cow::from(err.to_string()),
                        });
                        span.end();
                        return;
                    }
                    span.set_status(Status::Ok);
                }
                _ => {
                    debug!(
                        name = queue.name(),
                        "handler produced a reply but the request has no reply address"
                    );
                    span.set_status(Status::Ok);
                }
            }
        }
        Ok(None) => span.set_status(Status::Ok),
        Err(err) => {
            error!(
                error = err.to_string(),
                name = queue.name(),
                "error to process the message"
            );
            span.set_status(Status::Error {
                description: Cow::from(err.to_string()),
            });
        }
    }
    span.end();
}
