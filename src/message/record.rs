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

use std::collections::BTreeMap;

use bytes::Bytes;

use super::MessageId;

/// A message as handed out by a consumer session, before deserialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub key: Option<String>,
    pub payload: Bytes,
    /// millis since epoch, set by the broker
    pub publish_time: i64,
    /// millis since epoch, set by the producer; 0 when absent
    pub event_time: i64,
    pub properties: BTreeMap<String, String>,
}

impl Message {
    pub fn new(id: MessageId, payload: impl Into<Bytes>) -> Self {
        Self {
            id,
            key: None,
            payload: payload.into(),
            publish_time: 0,
            event_time: 0,
            properties: BTreeMap::new(),
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_publish_time(mut self, publish_time: i64) -> Self {
        self.publish_time = publish_time;
        self
    }

    pub fn with_event_time(mut self, event_time: i64) -> Self {
        self.event_time = event_time;
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }
}
