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

use std::cmp::Ordering;
use std::fmt::{Display, Formatter};
use std::hash::{Hash, Hasher};

/// Physical position of one broker log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntryPosition {
    pub ledger_id: i64,
    pub entry_id: i64,
}

impl EntryPosition {
    pub fn new(ledger_id: i64, entry_id: i64) -> Self {
        Self {
            ledger_id,
            entry_id,
        }
    }
}

impl Display for EntryPosition {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.ledger_id, self.entry_id)
    }
}

/// Position of a message in a partition's log.
///
/// A `NonBatch` id addresses a whole entry, a `Batch` id addresses one logical
/// message inside a batched entry. Ordering is `(ledger, entry, batch index)`
/// with the non-batch id of an entry ranked before every batch index of the
/// same entry. `partition_index` and `batch_size` are tags: they take part in
/// neither ordering nor equality.
#[derive(Debug, Clone, Copy)]
pub enum MessageId {
    NonBatch {
        ledger_id: i64,
        entry_id: i64,
        partition_index: i32,
    },
    Batch {
        ledger_id: i64,
        entry_id: i64,
        partition_index: i32,
        batch_index: i32,
        batch_size: i32,
    },
}

impl MessageId {
    pub const EARLIEST: MessageId = MessageId::NonBatch {
        ledger_id: -1,
        entry_id: -1,
        partition_index: -1,
    };
    pub const LATEST: MessageId = MessageId::NonBatch {
        ledger_id: i64::MAX,
        entry_id: i64::MAX,
        partition_index: -1,
    };

    pub fn new(ledger_id: i64, entry_id: i64, partition_index: i32) -> Self {
        MessageId::NonBatch {
            ledger_id,
            entry_id,
            partition_index,
        }
    }

    pub fn batch(
        ledger_id: i64,
        entry_id: i64,
        partition_index: i32,
        batch_index: i32,
        batch_size: i32,
    ) -> Self {
        MessageId::Batch {
            ledger_id,
            entry_id,
            partition_index,
            batch_index,
            batch_size,
        }
    }

    pub fn ledger_id(&self) -> i64 {
        match *self {
            MessageId::NonBatch { ledger_id, .. } | MessageId::Batch { ledger_id, .. } => {
                ledger_id
            }
        }
    }

    pub fn entry_id(&self) -> i64 {
        match *self {
            MessageId::NonBatch { entry_id, .. } | MessageId::Batch { entry_id, .. } => entry_id,
        }
    }

    pub fn partition_index(&self) -> i32 {
        match *self {
            MessageId::NonBatch {
                partition_index, ..
            }
            | MessageId::Batch {
                partition_index, ..
            } => partition_index,
        }
    }

    pub fn batch_index(&self) -> Option<i32> {
        match *self {
            MessageId::NonBatch { .. } => None,
            MessageId::Batch { batch_index, .. } => Some(batch_index),
        }
    }

    pub fn is_batch(&self) -> bool {
        matches!(self, MessageId::Batch { .. })
    }

    pub fn entry_position(&self) -> EntryPosition {
        EntryPosition::new(self.ledger_id(), self.entry_id())
    }

    /// The non-batch id of the entry right after this one.
    pub fn next_entry(&self) -> MessageId {
        MessageId::new(
            self.ledger_id(),
            self.entry_id().saturating_add(1),
            self.partition_index(),
        )
    }

    /// Same physical entry, regardless of batch granularity.
    pub fn same_entry(&self, other: &MessageId) -> bool {
        self.entry_position() == other.entry_position()
    }

    pub fn is_earliest(&self) -> bool {
        !self.is_batch() && self.entry_position() == MessageId::EARLIEST.entry_position()
    }

    pub fn is_latest(&self) -> bool {
        !self.is_batch() && self.entry_position() == MessageId::LATEST.entry_position()
    }

    fn order_key(&self) -> (i64, i64, i32) {
        match *self {
            MessageId::NonBatch {
                ledger_id,
                entry_id,
                ..
            } => (ledger_id, entry_id, -1),
            MessageId::Batch {
                ledger_id,
                entry_id,
                batch_index,
                ..
            } => (ledger_id, entry_id, batch_index),
        }
    }
}

impl PartialEq for MessageId {
    fn eq(&self, other: &Self) -> bool {
        self.order_key() == other.order_key()
    }
}

impl Eq for MessageId {}

impl Hash for MessageId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.order_key().hash(state);
    }
}

impl PartialOrd for MessageId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MessageId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.order_key().cmp(&other.order_key())
    }
}

impl Display for MessageId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match *self {
            MessageId::NonBatch {
                ledger_id,
                entry_id,
                partition_index,
            } => write!(f, "{}:{}:{}", ledger_id, entry_id, partition_index),
            MessageId::Batch {
                ledger_id,
                entry_id,
                partition_index,
                batch_index,
                ..
            } => write!(
                f,
                "{}:{}:{}:{}",
                ledger_id, entry_id, partition_index, batch_index
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(MessageId::new(5, 10, 0), MessageId::new(5, 11, 0), Ordering::Less)]
    #[case(MessageId::new(6, 0, 0), MessageId::new(5, 99, 0), Ordering::Greater)]
    #[case(MessageId::new(5, 10, 0), MessageId::batch(5, 10, 0, 0, 3), Ordering::Less)]
    #[case(MessageId::batch(5, 10, 0, 2, 3), MessageId::new(5, 11, 0), Ordering::Less)]
    #[case(MessageId::batch(5, 10, 0, 2, 3), MessageId::batch(5, 10, 0, 1, 3), Ordering::Greater)]
    #[case(MessageId::new(5, 10, 0), MessageId::new(5, 10, 3), Ordering::Equal)]
    fn test_total_order(#[case] a: MessageId, #[case] b: MessageId, #[case] expected: Ordering) {
        assert_eq!(a.cmp(&b), expected);
        assert_eq!(b.cmp(&a), expected.reverse());
    }

    #[test]
    fn test_batch_and_non_batch_share_entry_but_differ() {
        let non_batch = MessageId::new(7, 3, 0);
        let batch = MessageId::batch(7, 3, 0, 1, 4);
        assert!(non_batch.same_entry(&batch));
        assert_ne!(non_batch, batch);
        assert!(!batch.same_entry(&MessageId::batch(7, 4, 0, 1, 4)));
    }

    #[test]
    fn test_batch_size_is_not_identity() {
        assert_eq!(MessageId::batch(1, 1, 0, 0, 2), MessageId::batch(1, 1, 0, 0, 5));
    }

    #[test]
    fn test_sentinels() {
        assert!(MessageId::EARLIEST.is_earliest());
        assert!(MessageId::LATEST.is_latest());
        assert!(!MessageId::new(0, 0, 0).is_earliest());
        assert!(!MessageId::batch(-1, -1, -1, 0, 1).is_earliest());
        assert!(MessageId::EARLIEST < MessageId::new(0, 0, 0));
        assert!(MessageId::new(i64::MAX - 1, 0, 0) < MessageId::LATEST);
    }

    #[test]
    fn test_next_entry_drops_batch_shape() {
        let next = MessageId::batch(7, 3, 2, 1, 4).next_entry();
        assert!(!next.is_batch());
        assert_eq!(next.entry_position(), EntryPosition::new(7, 4));
        assert_eq!(next.partition_index(), 2);
    }

    #[test]
    fn test_display() {
        assert_eq!(MessageId::new(5, 10, 0).to_string(), "5:10:0");
        assert_eq!(MessageId::batch(5, 10, 0, 2, 3).to_string(), "5:10:0:2");
    }
}
