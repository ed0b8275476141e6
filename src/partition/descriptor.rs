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

use super::OffsetRange;

/// One parallel unit of work: an index plus the range it reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionDescriptor {
    pub index: usize,
    pub offset_range: OffsetRange,
}

impl PartitionDescriptor {
    pub fn new(index: usize, offset_range: OffsetRange) -> Self {
        Self {
            index,
            offset_range,
        }
    }

    pub fn topic(&self) -> &str {
        &self.offset_range.topic
    }

    /// Advisory placement hints for the scheduler.
    pub fn preferred_locations(&self) -> Vec<String> {
        self.offset_range
            .preferred_location
            .iter()
            .cloned()
            .collect()
    }
}

impl Display for PartitionDescriptor {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "partition-{} {}", self.index, self.offset_range)
    }
}
