//! In-process broker with RabbitMQ-like direct routing.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dispatch_contracts::Envelope;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::{BrokerError, Delivery, DeliveryHandler, EventPublisher};
use crate::config::BrokerConfig;

type SharedReceiver = Arc<AsyncMutex<mpsc::UnboundedReceiver<Delivery>>>;

#[derive(Debug)]
struct Queue {
    sender: mpsc::UnboundedSender<Delivery>,
    receiver: SharedReceiver,
}

#[derive(Debug)]
struct BrokerInner {
    queues: HashMap<String, Queue>,
    /// routing key → bound queue names
    bindings: HashMap<String, Vec<String>>,
    next_tag: AtomicU64,
    shutdown: CancellationToken,
}

/// Broker living inside the process.
///
/// Queues are unbounded and keep messages until a consumer takes them, so a
/// message published before anyone subscribes is still delivered. Several
/// subscriptions on one queue compete for its messages. Clones share state.
#[derive(Debug, Clone)]
pub struct InMemoryBroker {
    inner: Arc<BrokerInner>,
}

impl InMemoryBroker {
    /// Declare the topology in `config`. Fails on an empty or duplicate queue
    /// name, or an empty routing key.
    pub fn connect(config: &BrokerConfig) -> Result<Self, BrokerError> {
        let mut queues = HashMap::new();
        let mut bindings: HashMap<String, Vec<String>> = HashMap::new();
        for queue in &config.queues {
            if queue.name.trim().is_empty() {
                return Err(BrokerError::Topology("queue name is empty".to_string()));
            }
            let (sender, receiver) = mpsc::unbounded_channel();
            let declared = Queue {
                sender,
                receiver: Arc::new(AsyncMutex::new(receiver)),
            };
            if queues.insert(queue.name.clone(), declared).is_some() {
                return Err(BrokerError::Topology(format!(
                    "queue `{}` declared twice",
                    queue.name
                )));
            }
            let mut seen = HashSet::new();
            for key in &queue.routing_keys {
                if key.trim().is_empty() {
                    return Err(BrokerError::Topology(format!(
                        "queue `{}` has an empty routing key",
                        queue.name
                    )));
                }
                if seen.insert(key.as_str()) {
                    bindings
                        .entry(key.clone())
                        .or_default()
                        .push(queue.name.clone());
                }
            }
        }
        tracing::info!(
            queues = queues.len(),
            routing_keys = bindings.len(),
            "broker topology declared"
        );
        Ok(Self {
            inner: Arc::new(BrokerInner {
                queues,
                bindings,
                next_tag: AtomicU64::new(1),
                shutdown: CancellationToken::new(),
            }),
        })
    }

    /// Start a consumer task on `queue`. Must be called inside a tokio runtime.
    pub fn subscribe<H: DeliveryHandler>(
        &self,
        queue: &str,
        handler: H,
    ) -> Result<Subscription, BrokerError> {
        if self.is_closed() {
            return Err(BrokerError::Closed);
        }
        let receiver = self
            .inner
            .queues
            .get(queue)
            .map(|declared| Arc::clone(&declared.receiver))
            .ok_or_else(|| BrokerError::UnknownQueue(queue.to_string()))?;
        let token = self.inner.shutdown.child_token();
        let handle = tokio::spawn(consume(
            queue.to_string(),
            receiver,
            handler,
            token.clone(),
        ));
        tracing::debug!(queue, "subscribed");
        Ok(Subscription {
            queue: queue.to_string(),
            token,
            handle: Some(handle),
        })
    }

    /// Stop every consumer and reject further publishes.
    pub fn close(&self) {
        self.inner.shutdown.cancel();
        tracing::info!("broker closed");
    }

    pub fn is_closed(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    pub fn has_queue(&self, queue: &str) -> bool {
        self.inner.queues.contains_key(queue)
    }
}

impl EventPublisher for InMemoryBroker {
    fn publish(&self, envelope: Envelope) -> Result<(), BrokerError> {
        if self.is_closed() {
            return Err(BrokerError::Closed);
        }
        let queue_names = self
            .inner
            .bindings
            .get(&envelope.routing_key)
            .ok_or_else(|| BrokerError::Unroutable(envelope.routing_key.clone()))?;
        for queue_name in queue_names {
            let Some(queue) = self.inner.queues.get(queue_name) else {
                continue;
            };
            let delivery = Delivery {
                queue: queue_name.clone(),
                delivery_tag: self.inner.next_tag.fetch_add(1, Ordering::Relaxed),
                envelope: envelope.clone(),
            };
            queue.sender.send(delivery).map_err(|_| BrokerError::Closed)?;
        }
        tracing::trace!(
            routing_key = %envelope.routing_key,
            owner_id = %envelope.owner_id,
            "published"
        );
        Ok(())
    }
}

async fn consume<H: DeliveryHandler>(
    queue: String,
    receiver: SharedReceiver,
    handler: H,
    token: CancellationToken,
) {
    loop {
        let next = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            next = async { receiver.lock().await.recv().await } => next,
        };
        let Some(delivery) = next else {
            break;
        };
        // Acknowledged either way: errors are logged, never requeued.
        match handler.handle(&delivery) {
            Ok(()) => tracing::trace!(
                queue = %queue,
                delivery_tag = delivery.delivery_tag,
                "acknowledged"
            ),
            Err(error) => tracing::warn!(
                queue = %queue,
                delivery_tag = delivery.delivery_tag,
                routing_key = %delivery.envelope.routing_key,
                %error,
                "handler failed, message dropped"
            ),
        }
    }
    tracing::debug!(queue = %queue, "consumer stopped");
}

/// A running consumer. Dropping it cancels the consumer task.
#[derive(Debug)]
pub struct Subscription {
    queue: String,
    token: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl Subscription {
    pub fn queue(&self) -> &str {
        &self.queue
    }

    pub fn is_active(&self) -> bool {
        !self.token.is_cancelled()
            && self
                .handle
                .as_ref()
                .is_some_and(|handle| !handle.is_finished())
    }

    /// Cancel the consumer and wait until it has stopped. A delivery being
    /// handled at that moment finishes first.
    pub async fn unsubscribe(mut self) {
        self.token.cancel();
        if let Some(handle) = self.handle.take() {
            if let Err(error) = handle.await {
                tracing::warn!(queue = %self.queue, %error, "consumer task failed");
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
