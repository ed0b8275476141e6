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

use crate::message::MessageId;

/// Whether `id` can still be resolved in the broker's log. Trimmed or never
/// written positions are reported by the broker as `-1`.
pub fn message_exists(id: &MessageId) -> bool {
    id.ledger_id() >= 0 && id.entry_id() >= 0
}

/// "Rough" equality: ids of the same shape must match exactly, a batch id and
/// a non-batch id match when they address the same entry.
pub fn rough_eq(a: &MessageId, b: &MessageId) -> bool {
    match (a.is_batch(), b.is_batch()) {
        (true, true) | (false, false) => a == b,
        (true, false) | (false, true) => a.same_entry(b),
    }
}

/// Last logical message of its entry.
pub fn is_last_message(id: &MessageId) -> bool {
    match *id {
        MessageId::NonBatch { .. } => true,
        MessageId::Batch {
            batch_index,
            batch_size,
            ..
        } => batch_index >= batch_size - 1,
    }
}

/// Smallest id that may follow `id` in the log.
fn next_possible(id: &MessageId) -> MessageId {
    match *id {
        MessageId::Batch {
            ledger_id,
            entry_id,
            partition_index,
            batch_index,
            batch_size,
        } if batch_index < batch_size - 1 => MessageId::batch(
            ledger_id,
            entry_id,
            partition_index,
            batch_index + 1,
            batch_size,
        ),
        _ => id.next_entry(),
    }
}

/// Upper bound of a range.
///
/// `Inclusive` covers the whole entry of the bound, down to its last batch
/// index. `Exclusive` stops right before the bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndBound {
    Inclusive(MessageId),
    Exclusive(MessageId),
}

impl EndBound {
    pub fn id(&self) -> MessageId {
        match *self {
            EndBound::Inclusive(id) | EndBound::Exclusive(id) => id,
        }
    }

    /// `current` lies beyond the range and must not be handed out.
    pub fn passed(&self, current: &MessageId) -> bool {
        match self {
            EndBound::Inclusive(_) => false,
            EndBound::Exclusive(end) => current >= end,
        }
    }

    /// `current` reached (or went past) the entry holding the bound.
    pub fn entered_end(&self, current: &MessageId) -> bool {
        match self {
            EndBound::Inclusive(end) => current.entry_position() >= end.entry_position(),
            EndBound::Exclusive(end) => next_possible(current) >= *end,
        }
    }

    /// Nothing after `current` can still belong to the range, so reading stops
    /// once `current` has been handed out.
    pub fn is_terminal(&self, current: &MessageId) -> bool {
        self.entered_end(current) && is_last_message(current)
    }
}

/// Curried form of [`EndBound::entered_end`].
pub fn entered_end(end: EndBound) -> impl Fn(&MessageId) -> bool {
    move |current| end.entered_end(current)
}
