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
use chrono::{DateTime, Utc};

use super::Deserializer;
use crate::message::{Message, MessageId};
use crate::{AppError, AppResult};

/// Payload schema a topic is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadSchema {
    Bytes,
    Utf8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordValue {
    Bytes(Bytes),
    Utf8(String),
}

/// A deserialized message plus its metadata columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PulsarRecord {
    pub topic: String,
    pub key: Option<String>,
    pub value: RecordValue,
    pub message_id: MessageId,
    pub publish_time: DateTime<Utc>,
    pub event_time: Option<DateTime<Utc>>,
    pub properties: BTreeMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct RecordDeserializer {
    topic: String,
    schema: PayloadSchema,
}

impl RecordDeserializer {
    pub fn new(topic: impl Into<String>, schema: PayloadSchema) -> Self {
        Self {
            topic: topic.into(),
            schema,
        }
    }

    pub fn schema(&self) -> PayloadSchema {
        self.schema
    }

    fn decode_value(&self, message: &Message) -> AppResult<RecordValue> {
        match self.schema {
            PayloadSchema::Bytes => Ok(RecordValue::Bytes(message.payload.clone())),
            PayloadSchema::Utf8 => std::str::from_utf8(&message.payload)
                .map(|s| RecordValue::Utf8(s.to_string()))
                .map_err(|e| {
                    AppError::Deserialization(format!(
                        "message {} on {} is not valid utf-8: {}",
                        message.id, self.topic, e
                    ))
                }),
        }
    }
}

fn timestamp(millis: i64, message: &Message) -> AppResult<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis).ok_or_else(|| {
        AppError::Deserialization(format!(
            "message {} carries an out of range timestamp {}",
            message.id, millis
        ))
    })
}

impl Deserializer for RecordDeserializer {
    type Record = PulsarRecord;

    fn deserialize(&self, message: &Message) -> AppResult<PulsarRecord> {
        let value = self.decode_value(message)?;
        let publish_time = timestamp(message.publish_time, message)?;
        let event_time = if message.event_time > 0 {
            Some(timestamp(message.event_time, message)?)
        } else {
            None
        };

        Ok(PulsarRecord {
            topic: self.topic.clone(),
            key: message.key.clone(),
            value,
            message_id: message.id,
            publish_time,
            event_time,
            properties: message.properties.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(payload: &'static [u8]) -> Message {
        Message::new(MessageId::new(3, 4, 0), Bytes::from_static(payload))
            .with_key("k1")
            .with_publish_time(1_700_000_000_000)
            .with_property("origin", "test")
    }

    #[test]
    fn test_utf8_record_carries_metadata() -> AppResult<()> {
        let deserializer = RecordDeserializer::new("t", PayloadSchema::Utf8);
        let record = deserializer.deserialize(&message(b"hello"))?;

        assert_eq!(record.topic, "t");
        assert_eq!(record.key.as_deref(), Some("k1"));
        assert_eq!(record.value, RecordValue::Utf8("hello".to_string()));
        assert_eq!(record.message_id, MessageId::new(3, 4, 0));
        assert_eq!(record.publish_time.timestamp_millis(), 1_700_000_000_000);
        assert_eq!(record.event_time, None);
        assert_eq!(record.properties.get("origin").map(String::as_str), Some("test"));
        Ok(())
    }

    #[test]
    fn test_event_time_present() -> AppResult<()> {
        let deserializer = RecordDeserializer::new("t", PayloadSchema::Bytes);
        let record = deserializer.deserialize(&message(b"\x00\x01").with_event_time(42))?;
        assert_eq!(record.value, RecordValue::Bytes(Bytes::from_static(b"\x00\x01")));
        assert_eq!(record.event_time.map(|t| t.timestamp_millis()), Some(42));
        Ok(())
    }

    #[test]
    fn test_invalid_utf8_fails() {
        let deserializer = RecordDeserializer::new("t", PayloadSchema::Utf8);
        let result = deserializer.deserialize(&message(b"\xff\xfe"));
        assert!(matches!(result, Err(AppError::Deserialization(_))));
    }
}
