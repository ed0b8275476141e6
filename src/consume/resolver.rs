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

use tracing::{info, warn};

use super::message_exists;
use crate::client::{AdminClient, AdminConnector};
use crate::message::MessageId;
use crate::AppResult;

/// Turns the broker's raw last id into an exclusive upper bound that covers it.
///
/// Seeking into a batch is not possible, so any existing id moves to the start
/// of the following entry. An unresolvable id (empty topic) is kept as is.
pub fn seekable_latest(raw: MessageId) -> MessageId {
    if message_exists(&raw) {
        raw.next_entry()
    } else {
        raw
    }
}

/// Resolves the `LATEST` bound of `topic` to a concrete id.
///
/// The admin connection only lives for this call and is closed whether the
/// lookup succeeded or not.
pub async fn resolve_latest<A: AdminConnector>(connector: &A, topic: &str) -> AppResult<MessageId> {
    let admin = connector.connect().await?;
    let looked_up = admin.last_message_id(topic).await;
    let released = admin.close().await;

    let raw = match (looked_up, released) {
        (Ok(raw), Ok(())) => raw,
        (Ok(_), Err(e)) => return Err(e),
        (Err(e), released) => {
            if let Err(close_error) = released {
                warn!("closing admin connection for {} failed: {}", topic, close_error);
            }
            return Err(e);
        }
    };

    let resolved = seekable_latest(raw);
    info!("resolved latest of {}: raw {} -> {}", topic, raw, resolved);
    Ok(resolved)
}
