//! Sending to transports.
//!
//! An envelope whose message type has senders in the routing table, and that
//! was not itself received from a transport, is sent to every sender instead
//! of being handled locally. Each send carries a [`SentStamp`] naming the
//! sender, and bumps the `backlog:{sender}:{message}` counter when one is
//! configured. The returned envelope carries one [`SentStamp`] and one
//! [`TransportMessageIdStamp`] per sender, and the chain stops here.

use crate::context::DispatchContext;
use crate::middleware::{DispatchResult, Middleware, Next};
use courier_core::stamp::{ReceivedStamp, SentStamp, TransportMessageIdStamp};
use courier_core::{backlog_key, BoxFuture, Counter, Envelope, RoutingTable};
use courier_telemetry::metrics::record_sent;
use courier_transport::TransportRegistry;
use std::sync::Arc;
use tracing::{debug, warn};

/// Sends routed envelopes to their transports.
#[derive(Clone)]
pub struct SendMessageMiddleware {
    routing: Arc<RoutingTable>,
    transports: Arc<TransportRegistry>,
    counter: Option<Arc<dyn Counter>>,
}

impl SendMessageMiddleware {
    /// Creates the stage without backlog accounting.
    #[must_use]
    pub fn new(routing: Arc<RoutingTable>, transports: Arc<TransportRegistry>) -> Self {
        Self {
            routing,
            transports,
            counter: None,
        }
    }

    /// Counts every enqueued envelope in `counter`.
    #[must_use]
    pub fn backlog_counter(mut self, counter: Arc<dyn Counter>) -> Self {
        self.counter = Some(counter);
        self
    }

    async fn send(&self, envelope: Envelope, senders: &[String]) -> DispatchResult {
        let message = envelope.message_name().to_string();
        let mut result = envelope.clone();

        for alias in senders {
            let transport = self.transports.require(alias)?;
            let sent = transport.send(envelope.with(SentStamp::new(alias.clone()))).await?;

            if let Some(counter) = &self.counter {
                let key = backlog_key(alias, &message);
                if let Err(error) = counter.delta(&key, 1).await {
                    warn!(key = %key, error = %error, "could not update backlog counter");
                }
            }
            record_sent(alias, &message);

            result = result.with(SentStamp::new(alias.clone()));
            if let Some(id) = sent.last::<TransportMessageIdStamp>() {
                debug!(transport = %alias, transport_message_id = %id.id, "message sent");
                result = result.with(id.clone());
            }
        }
        Ok(result)
    }
}

impl std::fmt::Debug for SendMessageMiddleware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SendMessageMiddleware")
            .field("transports", &self.transports.names().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl Middleware for SendMessageMiddleware {
    fn name(&self) -> &'static str {
        "send"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut DispatchContext,
        envelope: Envelope,
        next: Next<'a>,
    ) -> BoxFuture<'a, DispatchResult> {
        Box::pin(async move {
            let senders = self.routing.senders_for(envelope.message_name());
            if senders.is_empty() || envelope.has::<ReceivedStamp>() {
                return next.run(ctx, envelope).await;
            }
            self.send(envelope, senders).await
        })
    }
}
