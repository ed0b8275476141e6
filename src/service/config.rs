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
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::consume::DataLossPolicy;

use super::{AppError, AppResult};

pub const ENV_PREFIX: &str = "RANGE_READER";

/// Client connection settings.
///
/// The whole struct is the key of the client cache, so two partitions that
/// carry equal client settings share one client.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub service_url: String,
    pub operation_timeout_ms: u64,
    pub properties: BTreeMap<String, String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            service_url: "pulsar://localhost:6650".to_string(),
            operation_timeout_ms: 30_000,
            properties: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminConfig {
    pub admin_url: String,
    pub properties: BTreeMap<String, String>,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            admin_url: "http://localhost:8080".to_string(),
            properties: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsumerConfig {
    /// Every partition read subscribes as `{prefix}-{uuid}-{topic}`.
    pub subscription_prefix: String,
    pub receiver_queue_size: u32,
    pub properties: BTreeMap<String, String>,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            subscription_prefix: "pulsar-range-reader".to_string(),
            receiver_queue_size: 1000,
            properties: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadConfig {
    pub fail_on_data_loss: bool,
    /// 0 means one slot per cpu
    pub max_concurrent_partitions: usize,
    pub channel_capacity: usize,
}

impl Default for ReadConfig {
    fn default() -> Self {
        Self {
            fail_on_data_loss: true,
            max_concurrent_partitions: 0,
            channel_capacity: 128,
        }
    }
}

impl ReadConfig {
    pub fn data_loss_policy(&self) -> DataLossPolicy {
        if self.fail_on_data_loss {
            DataLossPolicy::Fail
        } else {
            DataLossPolicy::Warn
        }
    }

    pub fn concurrency(&self) -> usize {
        if self.max_concurrent_partitions == 0 {
            num_cpus::get()
        } else {
            self.max_concurrent_partitions
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    pub client: ClientConfig,
    pub admin: AdminConfig,
    pub consumer: ConsumerConfig,
    pub reader: ReadConfig,
}

impl ReaderConfig {
    /// Loads the config file at `path`, then applies environment overrides such
    /// as `RANGE_READER__READER__FAIL_ON_DATA_LOSS=false`.
    pub fn set_up_config<P: AsRef<Path>>(path: P) -> AppResult<ReaderConfig> {
        let path_str = path
            .as_ref()
            .to_str()
            .ok_or(AppError::InvalidValue(format!(
                "config file path: {}",
                path.as_ref().to_string_lossy()
            )))?;
        let config = config::Config::builder()
            .add_source(config::File::with_name(path_str))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let reader_config: ReaderConfig = config.try_deserialize()?;
        reader_config.validate()?;

        Ok(reader_config)
    }

    fn validate(&self) -> AppResult<()> {
        if self.consumer.subscription_prefix.is_empty() {
            return Err(AppError::InvalidValue(
                "consumer.subscription_prefix must not be empty".to_string(),
            ));
        }
        if self.reader.channel_capacity == 0 {
            return Err(AppError::InvalidValue(
                "reader.channel_capacity must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
