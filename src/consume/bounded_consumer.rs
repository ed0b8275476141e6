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

use std::sync::Arc;

use tracing::{debug, trace, warn};
use uuid::Uuid;

use super::{message_exists, rough_eq, DataLossReporter, EndBound};
use crate::client::{
    ConsumerSession, Deserializer, PulsarClient, SubscribeOptions, SubscriptionType,
};
use crate::message::MessageId;
use crate::{AppError, AppResult, ConsumerConfig};

/// Lower bound of a range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartBound {
    /// the message at the bound was handed out by a previous pass
    Exclusive(MessageId),
    Inclusive(MessageId),
}

impl StartBound {
    pub fn id(&self) -> MessageId {
        match *self {
            StartBound::Exclusive(id) | StartBound::Inclusive(id) => id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// no session yet; opened on the first pull
    Init,
    Reading { first_pull: bool },
    /// the terminal record was handed out, the session is still open
    Finishing,
    Terminated,
}

/// Reads one partition between two bounds, exactly once.
///
/// The consumer subscribes lazily with a fresh exclusive subscription, seeks to
/// the start and hands out deserialized records until the end bound is reached.
/// It is not restartable; a new pass needs a new instance. The session is
/// unsubscribed and closed exactly once: when the range is exhausted, when a
/// pull fails, or on [`BoundedConsumer::close`].
pub struct BoundedConsumer<C: PulsarClient, D: Deserializer> {
    client: Arc<C>,
    topic: String,
    start: StartBound,
    end: EndBound,
    consumer_config: ConsumerConfig,
    deserializer: D,
    reporter: Arc<dyn DataLossReporter>,
    phase: Phase,
    session: Option<C::Session>,
    /// unsubscribe of the current session already ran
    unsubscribed: bool,
    subscription_name: Option<String>,
    current_id: Option<MessageId>,
    delivered: u64,
}

impl<C: PulsarClient, D: Deserializer> BoundedConsumer<C, D> {
    /// An empty range (`start == end`, or an end the broker can no longer
    /// resolve) yields nothing and never subscribes.
    pub fn new(
        client: Arc<C>,
        topic: impl Into<String>,
        start: StartBound,
        end: EndBound,
        consumer_config: ConsumerConfig,
        deserializer: D,
        reporter: Arc<dyn DataLossReporter>,
    ) -> Self {
        let topic = topic.into();
        let phase = if start.id() == end.id() || !message_exists(&end.id()) {
            debug!(
                "range {} -> {} of {} is empty, skip subscribing",
                start.id(),
                end.id(),
                topic
            );
            Phase::Terminated
        } else {
            Phase::Init
        };

        Self {
            client,
            topic,
            start,
            end,
            consumer_config,
            deserializer,
            reporter,
            phase,
            session: None,
            unsubscribed: false,
            subscription_name: None,
            current_id: None,
            delivered: 0,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn subscription_name(&self) -> Option<&str> {
        self.subscription_name.as_deref()
    }

    /// Id of the last message received from the session.
    pub fn current_id(&self) -> Option<MessageId> {
        self.current_id
    }

    pub fn delivered(&self) -> u64 {
        self.delivered
    }

    pub fn is_terminated(&self) -> bool {
        self.phase == Phase::Terminated
    }

    /// Next record of the range, `None` once the range is exhausted.
    ///
    /// Any error terminates the consumer; the session is released before the
    /// error is returned.
    pub async fn next(&mut self) -> AppResult<Option<D::Record>> {
        loop {
            match self.phase {
                // a teardown that was interrupted is finished here
                Phase::Terminated if self.session.is_some() => {
                    self.close().await?;
                    return Ok(None);
                }
                Phase::Terminated => return Ok(None),
                Phase::Finishing => {
                    self.close().await?;
                    return Ok(None);
                }
                Phase::Init => {
                    if let Err(e) = self.open().await {
                        self.release_after_error().await;
                        return Err(e);
                    }
                }
                Phase::Reading { first_pull } => {
                    return match self.pull(first_pull).await {
                        Ok(record) => Ok(record),
                        Err(e) => {
                            self.release_after_error().await;
                            Err(e)
                        }
                    };
                }
            }
        }
    }

    /// Unsubscribes and closes the session if one is open. Idempotent.
    ///
    /// The session stays owned by the consumer until both steps have
    /// completed, so a close that is dropped half way is resumed by the next
    /// call to `close` or `next`.
    pub async fn close(&mut self) -> AppResult<()> {
        self.phase = Phase::Terminated;
        let Some(session) = self.session.as_mut() else {
            return Ok(());
        };
        let unsubscribed = if self.unsubscribed {
            Ok(())
        } else {
            let unsubscribed = session.unsubscribe().await;
            self.unsubscribed = true;
            unsubscribed
        };
        let closed = session.close().await;
        self.session = None;
        self.unsubscribed = false;
        debug!(
            "released subscription {} on {} after {} records",
            self.subscription_name.as_deref().unwrap_or_default(),
            self.topic,
            self.delivered
        );
        unsubscribed?;
        closed
    }

    async fn release_after_error(&mut self) {
        if let Err(e) = self.close().await {
            warn!(
                "releasing subscription on {} after a failed pull also failed: {}",
                self.topic, e
            );
        }
    }

    async fn open(&mut self) -> AppResult<()> {
        let subscription_name = format!(
            "{}-{}-{}",
            self.consumer_config.subscription_prefix,
            Uuid::new_v4(),
            self.topic
        );
        let options = SubscribeOptions {
            topic: self.topic.clone(),
            subscription_name: subscription_name.clone(),
            subscription_type: SubscriptionType::Exclusive,
            receiver_queue_size: self.consumer_config.receiver_queue_size,
            properties: self.consumer_config.properties.clone(),
        };
        let session = self.client.subscribe(options).await?;
        debug!("subscribed {} to {}", subscription_name, self.topic);
        // owned by self from here on, so every later failure releases it
        self.session = Some(session);
        self.subscription_name = Some(subscription_name);

        let from = self.start.id();
        self.session_mut()?.seek(from).await?;

        match self.start {
            StartBound::Exclusive(from) if !from.is_earliest() => {
                self.skip_ahead(from).await?;
                self.phase = Phase::Reading { first_pull: false };
            }
            StartBound::Exclusive(_) => self.phase = Phase::Reading { first_pull: false },
            StartBound::Inclusive(_) => self.phase = Phase::Reading { first_pull: true },
        }
        Ok(())
    }

    /// Consumes the message at the exclusive start position.
    async fn skip_ahead(&mut self, from: MessageId) -> AppResult<()> {
        let observed = self.session_mut()?.receive().await?.id;
        self.current_id = Some(observed);
        if !rough_eq(&observed, &from) {
            self.reporter.report(&format!(
                "Potential data loss on {}: intended to start after {}, but the broker returned {}",
                self.topic, from, observed
            ))?;
        }

        match (from, observed) {
            (MessageId::NonBatch { .. }, MessageId::NonBatch { .. }) => {}
            (MessageId::Batch { .. }, MessageId::Batch { .. }) => {}
            (MessageId::Batch { .. }, MessageId::NonBatch { .. }) => {}
            // a previous pass read through the end of this batch entry
            (MessageId::NonBatch { .. }, MessageId::Batch { .. }) => {
                let resume = observed.next_entry();
                debug!(
                    "{} starts inside batch entry {}, resume at {}",
                    self.topic,
                    observed.entry_position(),
                    resume
                );
                self.session_mut()?.seek(resume).await?;
            }
        }
        Ok(())
    }

    async fn pull(&mut self, first_pull: bool) -> AppResult<Option<D::Record>> {
        let message = self.session_mut()?.receive().await?;
        let current = message.id;
        self.current_id = Some(current);

        if first_pull {
            self.phase = Phase::Reading { first_pull: false };
            if let StartBound::Inclusive(from) = self.start {
                if !from.is_earliest() && !rough_eq(&current, &from) {
                    self.reporter.report(&format!(
                        "Potential data loss on {}: intended to start at {}, but the broker returned {}",
                        self.topic, from, current
                    ))?;
                }
            }
        }

        if self.end.passed(&current) {
            trace!("{} is past {}, stop reading {}", current, self.end.id(), self.topic);
            self.close().await?;
            return Ok(None);
        }

        let terminal = self.end.is_terminal(&current);
        let record = self.deserializer.deserialize(&message)?;
        self.delivered += 1;
        if terminal {
            trace!("{} is the last message before {} on {}", current, self.end.id(), self.topic);
            self.phase = Phase::Finishing;
        }
        Ok(Some(record))
    }

    fn session_mut(&mut self) -> AppResult<&mut C::Session> {
        self.session.as_mut().ok_or_else(|| {
            AppError::IllegalStateError(format!("no open session on {}", self.topic))
        })
    }
}

impl<C: PulsarClient, D: Deserializer> Drop for BoundedConsumer<C, D> {
    fn drop(&mut self) {
        if self.session.is_some() {
            warn!(
                "consumer on {} dropped without close, subscription {} is left open",
                self.topic,
                self.subscription_name.as_deref().unwrap_or_default()
            );
        }
    }
}
