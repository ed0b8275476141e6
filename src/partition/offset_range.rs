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

use std::fmt::{Display, Formatter};

use crate::message::MessageId;

/// The span of one topic handed to one partition for one pass.
///
/// `until_id` may be [`MessageId::LATEST`], which only batch reads accept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OffsetRange {
    pub topic: String,
    pub from_id: MessageId,
    pub until_id: MessageId,
    pub preferred_location: Option<String>,
}

impl OffsetRange {
    pub fn new(topic: impl Into<String>, from_id: MessageId, until_id: MessageId) -> Self {
        Self {
            topic: topic.into(),
            from_id,
            until_id,
            preferred_location: None,
        }
    }

    pub fn with_preferred_location(mut self, location: impl Into<String>) -> Self {
        self.preferred_location = Some(location.into());
        self
    }

    pub fn until_latest(&self) -> bool {
        self.until_id.is_latest()
    }
}

impl Display for OffsetRange {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}[{} -> {}]", self.topic, self.from_id, self.until_id)
    }
}
