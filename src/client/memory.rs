// Copyright 2025 jonefeewang@gmail.com
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! In-process broker implementing every collaborator contract.
//!
//! Topics are single partition logs of entries addressed by `(ledger, entry)`;
//! a batched publish writes one entry holding several batch indexes. Faults can
//! be injected per operation, and lifecycle counters let callers check that
//! sessions and admin connections are released.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::{debug, trace};

use super::{
    AdminClient, AdminConnector, ClientBuilder, ConsumerSession, PulsarClient, SubscribeOptions,
    SubscriptionType,
};
use crate::message::{EntryPosition, Message, MessageId};
use crate::{AppError, AppResult, ClientConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultPoint {
    Subscribe,
    Seek,
    Receive,
    Unsubscribe,
    Close,
    AdminConnect,
    LastMessageId,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BrokerStats {
    pub clients_built: usize,
    pub subscribes: usize,
    pub seeks: usize,
    pub unsubscribes: usize,
    pub closes: usize,
    pub admin_connects: usize,
    pub admin_closes: usize,
}

#[derive(Debug)]
struct TopicLog {
    partition_index: i32,
    ledger_id: i64,
    next_entry_id: i64,
    messages: Vec<Message>,
}

impl TopicLog {
    fn new(partition_index: i32, ledger_id: i64, first_entry_id: i64) -> Self {
        Self {
            partition_index,
            ledger_id,
            next_entry_id: first_entry_id,
            messages: Vec::new(),
        }
    }

    fn next_position(&mut self) -> (i64, i64) {
        let position = (self.ledger_id, self.next_entry_id);
        self.next_entry_id += 1;
        position
    }
}

#[derive(Debug, Default)]
struct BrokerState {
    topics: HashMap<String, TopicLog>,
    /// connected consumers per (topic, subscription)
    subscriptions: HashMap<(String, String), (SubscriptionType, usize)>,
    faults: HashMap<FaultPoint, usize>,
    seek_history: Vec<(String, MessageId)>,
    stats: BrokerStats,
}

impl BrokerState {
    fn take_fault(&mut self, point: FaultPoint) -> AppResult<()> {
        match self.faults.get_mut(&point) {
            Some(pending) if *pending > 0 => {
                *pending -= 1;
                let reason = format!("injected {:?} failure", point);
                match point {
                    FaultPoint::AdminConnect | FaultPoint::LastMessageId => {
                        Err(AppError::AdminError(reason))
                    }
                    _ => Err(AppError::ClientError(reason)),
                }
            }
            _ => Ok(()),
        }
    }

    fn disconnect(&mut self, topic: &str, subscription: &str) {
        let key = (topic.to_string(), subscription.to_string());
        if let Some((_, connected)) = self.subscriptions.get_mut(&key) {
            *connected = connected.saturating_sub(1);
            if *connected == 0 {
                self.subscriptions.remove(&key);
            }
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    state: Mutex<BrokerState>,
    published: Notify,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryBroker {
    inner: Arc<Inner>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates (or resets) a topic whose first entry will be written at
    /// `(ledger_id, first_entry_id)`.
    pub fn create_topic(
        &self,
        topic: impl Into<String>,
        partition_index: i32,
        ledger_id: i64,
        first_entry_id: i64,
    ) {
        let topic = topic.into();
        debug!("create topic {} at {}:{}", topic, ledger_id, first_entry_id);
        self.inner.state.lock().topics.insert(
            topic,
            TopicLog::new(partition_index, ledger_id, first_entry_id),
        );
    }

    /// Continues writing `topic` on the next ledger, starting at entry 0.
    pub fn roll_ledger(&self, topic: &str) -> AppResult<()> {
        let mut state = self.inner.state.lock();
        let log = state
            .topics
            .get_mut(topic)
            .ok_or_else(|| AppError::TopicNotFound(topic.to_string()))?;
        log.ledger_id += 1;
        log.next_entry_id = 0;
        Ok(())
    }

    pub fn publish(&self, topic: &str, payload: impl Into<Bytes>) -> AppResult<MessageId> {
        let id = {
            let mut state = self.inner.state.lock();
            let log = state
                .topics
                .get_mut(topic)
                .ok_or_else(|| AppError::TopicNotFound(topic.to_string()))?;
            let (ledger_id, entry_id) = log.next_position();
            let id = MessageId::new(ledger_id, entry_id, log.partition_index);
            log.messages
                .push(Message::new(id, payload).with_publish_time(now_millis()));
            id
        };
        trace!("published {} to {}", id, topic);
        self.inner.published.notify_waiters();
        Ok(id)
    }

    /// Writes all payloads into a single batched entry.
    pub fn publish_batch<P: Into<Bytes>>(
        &self,
        topic: &str,
        payloads: Vec<P>,
    ) -> AppResult<Vec<MessageId>> {
        if payloads.is_empty() {
            return Err(AppError::InvalidValue("empty batch".to_string()));
        }
        let ids = {
            let mut state = self.inner.state.lock();
            let log = state
                .topics
                .get_mut(topic)
                .ok_or_else(|| AppError::TopicNotFound(topic.to_string()))?;
            let (ledger_id, entry_id) = log.next_position();
            let batch_size = payloads.len() as i32;
            let publish_time = now_millis();
            let mut ids = Vec::with_capacity(payloads.len());
            for (batch_index, payload) in payloads.into_iter().enumerate() {
                let id = MessageId::batch(
                    ledger_id,
                    entry_id,
                    log.partition_index,
                    batch_index as i32,
                    batch_size,
                );
                log.messages
                    .push(Message::new(id, payload).with_publish_time(publish_time));
                ids.push(id);
            }
            ids
        };
        trace!("published batch of {} to {}", ids.len(), topic);
        self.inner.published.notify_waiters();
        Ok(ids)
    }

    /// Retention: drops every entry before `position`, returns the number of
    /// messages removed.
    pub fn trim_before(&self, topic: &str, position: EntryPosition) -> AppResult<usize> {
        let mut state = self.inner.state.lock();
        let log = state
            .topics
            .get_mut(topic)
            .ok_or_else(|| AppError::TopicNotFound(topic.to_string()))?;
        let before = log.messages.len();
        log.messages.retain(|m| m.id.entry_position() >= position);
        Ok(before - log.messages.len())
    }

    /// The next call at `point` fails once.
    pub fn fail_next(&self, point: FaultPoint) {
        *self.inner.state.lock().faults.entry(point).or_insert(0) += 1;
    }

    pub fn stats(&self) -> BrokerStats {
        self.inner.state.lock().stats
    }

    /// `(subscription, target)` of every seek, oldest first.
    pub fn seek_history(&self) -> Vec<(String, MessageId)> {
        self.inner.state.lock().seek_history.clone()
    }

    pub fn connected_consumers(&self) -> usize {
        self.inner
            .state
            .lock()
            .subscriptions
            .values()
            .map(|(_, connected)| connected)
            .sum()
    }
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

impl ClientBuilder for MemoryBroker {
    type Client = MemoryBroker;

    fn build(&self, config: &ClientConfig) -> AppResult<MemoryBroker> {
        debug!("memory client for {}", config.service_url);
        self.inner.state.lock().stats.clients_built += 1;
        Ok(self.clone())
    }
}

impl PulsarClient for MemoryBroker {
    type Session = MemoryConsumer;

    async fn subscribe(&self, options: SubscribeOptions) -> AppResult<MemoryConsumer> {
        let mut state = self.inner.state.lock();
        state.take_fault(FaultPoint::Subscribe)?;
        if !state.topics.contains_key(&options.topic) {
            return Err(AppError::TopicNotFound(options.topic));
        }
        let key = (options.topic.clone(), options.subscription_name.clone());
        match state.subscriptions.get_mut(&key) {
            Some((SubscriptionType::Exclusive, _)) => {
                return Err(AppError::ConsumerBusy(format!(
                    "exclusive subscription {} on {} already has a consumer",
                    options.subscription_name, options.topic
                )));
            }
            Some((_, connected)) if options.subscription_type == SubscriptionType::Shared => {
                *connected += 1;
            }
            Some(_) => {
                return Err(AppError::ConsumerBusy(format!(
                    "subscription {} on {} is shared",
                    options.subscription_name, options.topic
                )));
            }
            None => {
                state
                    .subscriptions
                    .insert(key, (options.subscription_type, 1));
            }
        }
        state.stats.subscribes += 1;
        debug!(
            "subscribed {} to {} ({:?})",
            options.subscription_name, options.topic, options.subscription_type
        );

        Ok(MemoryConsumer {
            broker: self.clone(),
            topic: options.topic,
            subscription: options.subscription_name,
            position: MessageId::EARLIEST,
            last_delivered: None,
            closed: false,
        })
    }
}

#[derive(Debug)]
pub struct MemoryConsumer {
    broker: MemoryBroker,
    topic: String,
    subscription: String,
    position: MessageId,
    last_delivered: Option<MessageId>,
    closed: bool,
}

impl MemoryConsumer {
    fn ensure_open(&self) -> AppResult<()> {
        if self.closed {
            return Err(AppError::ClientError(format!(
                "consumer {} already closed",
                self.subscription
            )));
        }
        Ok(())
    }

    fn poll_message(&mut self) -> AppResult<Option<Message>> {
        let mut state = self.broker.inner.state.lock();
        state.take_fault(FaultPoint::Receive)?;
        self.ensure_open()?;
        let log = state
            .topics
            .get(&self.topic)
            .ok_or_else(|| AppError::TopicNotFound(self.topic.clone()))?;
        let next = log
            .messages
            .iter()
            .find(|m| m.id >= self.position && self.last_delivered.map_or(true, |l| m.id > l))
            .cloned();
        if let Some(message) = &next {
            self.last_delivered = Some(message.id);
        }
        Ok(next)
    }
}

impl ConsumerSession for MemoryConsumer {
    async fn seek(&mut self, id: MessageId) -> AppResult<()> {
        let mut state = self.broker.inner.state.lock();
        state.take_fault(FaultPoint::Seek)?;
        self.ensure_open()?;
        state.stats.seeks += 1;
        state.seek_history.push((self.subscription.clone(), id));
        self.position = id;
        self.last_delivered = None;
        trace!("{} seek to {}", self.subscription, id);
        Ok(())
    }

    async fn receive(&mut self) -> AppResult<Message> {
        let inner = self.broker.inner.clone();
        loop {
            let published = inner.published.notified();
            if let Some(message) = self.poll_message()? {
                return Ok(message);
            }
            published.await;
        }
    }

    async fn unsubscribe(&mut self) -> AppResult<()> {
        let mut state = self.broker.inner.state.lock();
        state.take_fault(FaultPoint::Unsubscribe)?;
        self.ensure_open()?;
        state
            .subscriptions
            .remove(&(self.topic.clone(), self.subscription.clone()));
        state.stats.unsubscribes += 1;
        Ok(())
    }

    async fn close(&mut self) -> AppResult<()> {
        let mut state = self.broker.inner.state.lock();
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        state.disconnect(&self.topic, &self.subscription);
        state.stats.closes += 1;
        state.take_fault(FaultPoint::Close)
    }
}

impl AdminConnector for MemoryBroker {
    type Admin = MemoryAdmin;

    async fn connect(&self) -> AppResult<MemoryAdmin> {
        let mut state = self.inner.state.lock();
        state.take_fault(FaultPoint::AdminConnect)?;
        state.stats.admin_connects += 1;
        Ok(MemoryAdmin {
            broker: self.clone(),
        })
    }
}

#[derive(Debug)]
pub struct MemoryAdmin {
    broker: MemoryBroker,
}

impl AdminClient for MemoryAdmin {
    async fn last_message_id(&self, topic: &str) -> AppResult<MessageId> {
        let mut state = self.broker.inner.state.lock();
        state.take_fault(FaultPoint::LastMessageId)?;
        let log = state
            .topics
            .get(topic)
            .ok_or_else(|| AppError::TopicNotFound(topic.to_string()))?;
        Ok(log
            .messages
            .last()
            .map(|m| m.id)
            .unwrap_or(MessageId::new(-1, -1, log.partition_index)))
    }

    async fn close(self) -> AppResult<()> {
        self.broker.inner.state.lock().stats.admin_closes += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn options(name: &str, subscription_type: SubscriptionType) -> SubscribeOptions {
        SubscribeOptions {
            topic: "t".to_string(),
            subscription_name: name.to_string(),
            subscription_type,
            receiver_queue_size: 10,
            properties: Default::default(),
        }
    }

    #[tokio::test]
    async fn test_seek_then_receive_in_order() -> AppResult<()> {
        let broker = MemoryBroker::new();
        broker.create_topic("t", 0, 5, 10);
        broker.publish("t", "a")?;
        broker.publish_batch("t", vec!["b0", "b1"])?;
        broker.publish("t", "c")?;

        let mut consumer = broker
            .subscribe(options("s", SubscriptionType::Exclusive))
            .await?;
        consumer.seek(MessageId::new(5, 11, 0)).await?;
        assert_eq!(consumer.receive().await?.id, MessageId::batch(5, 11, 0, 0, 2));
        assert_eq!(consumer.receive().await?.id, MessageId::batch(5, 11, 0, 1, 2));
        assert_eq!(consumer.receive().await?.id, MessageId::new(5, 12, 0));

        consumer.seek(MessageId::batch(5, 11, 0, 1, 2)).await?;
        assert_eq!(consumer.receive().await?.payload, Bytes::from_static(b"b1"));
        Ok(())
    }

    #[tokio::test]
    async fn test_receive_waits_for_publish() -> AppResult<()> {
        let broker = MemoryBroker::new();
        broker.create_topic("t", 0, 1, 0);
        let mut consumer = broker
            .subscribe(options("s", SubscriptionType::Exclusive))
            .await?;

        let publisher = broker.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            publisher.publish("t", "late").unwrap();
        });

        let message = consumer.receive().await?;
        assert_eq!(message.id, MessageId::new(1, 0, 0));
        Ok(())
    }

    #[tokio::test]
    async fn test_exclusive_subscription_rejects_second_consumer() -> AppResult<()> {
        let broker = MemoryBroker::new();
        broker.create_topic("t", 0, 1, 0);
        let mut first = broker
            .subscribe(options("s", SubscriptionType::Exclusive))
            .await?;
        let second = broker
            .subscribe(options("s", SubscriptionType::Exclusive))
            .await;
        assert!(matches!(second, Err(AppError::ConsumerBusy(_))));

        first.unsubscribe().await?;
        first.close().await?;
        assert_eq!(broker.connected_consumers(), 0);
        assert!(broker
            .subscribe(options("s", SubscriptionType::Exclusive))
            .await
            .is_ok());
        Ok(())
    }

    #[tokio::test]
    async fn test_shared_subscription_counts_consumers() -> AppResult<()> {
        let broker = MemoryBroker::new();
        broker.create_topic("t", 0, 1, 0);
        let mut a = broker.subscribe(options("s", SubscriptionType::Shared)).await?;
        let _b = broker.subscribe(options("s", SubscriptionType::Shared)).await?;
        assert_eq!(broker.connected_consumers(), 2);
        a.close().await?;
        assert_eq!(broker.connected_consumers(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_closed_consumer_rejects_calls() -> AppResult<()> {
        let broker = MemoryBroker::new();
        broker.create_topic("t", 0, 1, 0);
        let mut consumer = broker
            .subscribe(options("s", SubscriptionType::Exclusive))
            .await?;
        consumer.close().await?;
        consumer.close().await?;
        assert_eq!(broker.stats().closes, 1);
        assert!(consumer.seek(MessageId::EARLIEST).await.is_err());
        assert!(consumer.receive().await.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn test_trim_and_last_message_id() -> AppResult<()> {
        let broker = MemoryBroker::new();
        broker.create_topic("t", 2, 7, 0);

        let admin = broker.connect().await?;
        assert_eq!(admin.last_message_id("t").await?, MessageId::new(-1, -1, 2));

        broker.publish("t", "a")?;
        broker.publish_batch("t", vec!["b0", "b1", "b2"])?;
        let last = admin.last_message_id("t").await?;
        assert_eq!(last, MessageId::batch(7, 1, 2, 2, 3));

        assert_eq!(broker.trim_before("t", EntryPosition::new(7, 1))?, 1);
        assert!(matches!(
            admin.last_message_id("missing").await,
            Err(AppError::TopicNotFound(_))
        ));
        admin.close().await?;
        assert_eq!(broker.stats().admin_closes, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_injected_faults_fire_once() -> AppResult<()> {
        let broker = MemoryBroker::new();
        broker.create_topic("t", 0, 1, 0);
        broker.fail_next(FaultPoint::Subscribe);
        assert!(matches!(
            broker.subscribe(options("s", SubscriptionType::Exclusive)).await,
            Err(AppError::ClientError(_))
        ));
        assert!(broker
            .subscribe(options("s", SubscriptionType::Exclusive))
            .await
            .is_ok());

        broker.fail_next(FaultPoint::AdminConnect);
        assert!(matches!(broker.connect().await, Err(AppError::AdminError(_))));
        Ok(())
    }
}
