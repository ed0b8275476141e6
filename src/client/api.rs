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

//! Contracts of the broker-facing collaborators.
//!
//! Every async operation returns a `Send` future so a partition can be read
//! on its own tokio task.

use std::collections::BTreeMap;
use std::future::Future;

use crate::message::{Message, MessageId};
use crate::{AppResult, ClientConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubscriptionType {
    /// only one consumer may be attached at a time
    Exclusive,
    Shared,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribeOptions {
    pub topic: String,
    pub subscription_name: String,
    pub subscription_type: SubscriptionType,
    pub receiver_queue_size: u32,
    pub properties: BTreeMap<String, String>,
}

/// Creates clients for the client cache.
pub trait ClientBuilder: Send + Sync {
    type Client: PulsarClient;

    fn build(&self, config: &ClientConfig) -> AppResult<Self::Client>;
}

pub trait PulsarClient: Send + Sync + 'static {
    type Session: ConsumerSession;

    fn subscribe(
        &self,
        options: SubscribeOptions,
    ) -> impl Future<Output = AppResult<Self::Session>> + Send;
}

/// One subscribed consumer.
///
/// `receive` waits until a message is available or the client fails; there
/// is no timeout at this level.
pub trait ConsumerSession: Send + 'static {
    fn seek(&mut self, id: MessageId) -> impl Future<Output = AppResult<()>> + Send;

    fn receive(&mut self) -> impl Future<Output = AppResult<Message>> + Send;

    fn unsubscribe(&mut self) -> impl Future<Output = AppResult<()>> + Send;

    fn close(&mut self) -> impl Future<Output = AppResult<()>> + Send;
}

/// Opens short lived administrative connections.
pub trait AdminConnector: Send + Sync + 'static {
    type Admin: AdminClient;

    fn connect(&self) -> impl Future<Output = AppResult<Self::Admin>> + Send;
}

pub trait AdminClient: Send {
    /// Id of the last message written to `topic`, `(-1, -1)` when empty.
    fn last_message_id(&self, topic: &str) -> impl Future<Output = AppResult<MessageId>> + Send;

    fn close(self) -> impl Future<Output = AppResult<()>> + Send;
}

/// Schema bound, stateless per message.
pub trait Deserializer: Send + Sync {
    type Record: Send + 'static;

    fn deserialize(&self, message: &Message) -> AppResult<Self::Record>;
}
