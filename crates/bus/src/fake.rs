//! An in-process stand-in for [`crate::Bus`], so dispatch-loop and entrypoint-bridge tests don't
//! need a running NATS server.
//!
//! Subjects are matched by exact string equality only; the distilled runtime never relies on
//! wildcard subjects, so this is sufficient to exercise every code path that programs against
//! [`crate::Bus`].

use crate::{Bus, DeliverPolicy, Delivery, Error, PullSubscription};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};

type Callback = Box<dyn Fn(Box<dyn Delivery>) + Send + Sync>;

#[derive(Default)]
struct State {
    streams: HashMap<String, HashSet<String>>,
    subscribers: HashMap<String, Vec<Callback>>,
    pull_queues: HashMap<String, mpsc::UnboundedSender<FakeDelivery>>,
}

/// An in-memory bus. Cheaply cloneable; every clone shares the same subject registry, so a single
/// instance can stand in for the whole message fabric in a test.
#[derive(Clone, Default)]
pub struct FakeBus {
    state: Arc<Mutex<State>>,
}

impl FakeBus {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Bus for FakeBus {
    async fn ensure_stream(&self, stream: &str, subjects: &[String]) -> Result<(), Error> {
        let mut state = self.state.lock().await;
        state
            .streams
            .entry(stream.to_string())
            .or_default()
            .extend(subjects.iter().cloned());
        Ok(())
    }

    async fn subscribe_durable(
        &self,
        _stream: &str,
        subject: &str,
        _queue_group: &str,
        _durable_name: &str,
        _deliver_policy: DeliverPolicy,
        _ack_wait: Duration,
        callback: Box<dyn Fn(Box<dyn Delivery>) + Send + Sync>,
    ) -> Result<(), Error> {
        let mut state = self.state.lock().await;
        state
            .subscribers
            .entry(subject.to_string())
            .or_default()
            .push(callback);
        Ok(())
    }

    async fn subscribe_pull(
        &self,
        _stream: &str,
        subject: &str,
        _durable_name: &str,
        _deliver_policy: DeliverPolicy,
    ) -> Result<Box<dyn PullSubscription>, Error> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.state.lock().await;
        state.pull_queues.insert(subject.to_string(), tx);
        Ok(Box::new(FakePullSubscription {
            receiver: Mutex::new(rx),
        }))
    }

    async fn publish(&self, _stream: &str, subject: &str, payload: Vec<u8>) -> Result<(), Error> {
        let delivery = FakeDelivery {
            subject: subject.to_string(),
            payload,
        };

        let state = self.state.lock().await;
        if let Some(callbacks) = state.subscribers.get(subject) {
            for callback in callbacks {
                callback(Box::new(delivery.clone()));
            }
        }
        if let Some(tx) = state.pull_queues.get(subject) {
            // A slow/absent receiver just means the message is dropped, mirroring a pull
            // consumer that never fetches; nothing downstream depends on unbounded buffering.
            let _ = tx.send(delivery.clone());
        }
        Ok(())
    }

    async fn max_payload_size(&self, _stream: &str) -> Result<Option<usize>, Error> {
        Ok(None)
    }

    async fn close(&self) -> Result<(), Error> {
        let mut state = self.state.lock().await;
        state.subscribers.clear();
        state.pull_queues.clear();
        Ok(())
    }
}

#[derive(Clone)]
struct FakeDelivery {
    subject: String,
    payload: Vec<u8>,
}

#[async_trait]
impl Delivery for FakeDelivery {
    fn subject(&self) -> &str {
        &self.subject
    }

    fn payload(&self) -> &[u8] {
        &self.payload
    }

    async fn ack(&self) -> Result<(), Error> {
        Ok(())
    }
}

struct FakePullSubscription {
    receiver: Mutex<mpsc::UnboundedReceiver<FakeDelivery>>,
}

#[async_trait]
impl PullSubscription for FakePullSubscription {
    async fn next_msg(&self, timeout: Duration) -> Result<Option<Box<dyn Delivery>>, Error> {
        let mut receiver = self.receiver.lock().await;
        match tokio::time::timeout(timeout, receiver.recv()).await {
            Ok(Some(delivery)) => Ok(Some(Box::new(delivery))),
            Ok(None) => Ok(None),
            Err(_) => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_reaches_a_durable_subscriber() {
        let bus = FakeBus::new();
        let (tx, mut rx) = mpsc::unbounded_channel();

        bus.subscribe_durable(
            "stream",
            "wf.node-a",
            "group",
            "durable",
            DeliverPolicy::New,
            Duration::from_secs(1),
            Box::new(move |delivery| {
                let _ = tx.send(delivery.payload().to_vec());
            }),
        )
        .await
        .unwrap();

        bus.publish("stream", "wf.node-a", b"hello".to_vec())
            .await
            .unwrap();

        let received = rx.recv().await.unwrap();
        assert_eq!(received, b"hello");
    }

    #[tokio::test]
    async fn pull_subscription_returns_none_on_timeout() {
        let bus = FakeBus::new();
        let sub = bus
            .subscribe_pull("stream", "wf.reply.call-1", "durable", DeliverPolicy::All)
            .await
            .unwrap();

        let result = sub.next_msg(Duration::from_millis(20)).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn pull_subscription_receives_a_published_message() {
        let bus = FakeBus::new();
        let sub = bus
            .subscribe_pull("stream", "wf.reply.call-1", "durable", DeliverPolicy::All)
            .await
            .unwrap();

        bus.publish("stream", "wf.reply.call-1", b"reply".to_vec())
            .await
            .unwrap();

        let delivery = sub
            .next_msg(Duration::from_secs(1))
            .await
            .unwrap()
            .expect("expected a delivery");
        assert_eq!(delivery.payload(), b"reply");
        delivery.ack().await.unwrap();
    }
}
