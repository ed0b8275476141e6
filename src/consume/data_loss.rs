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

use tracing::warn;

use crate::{AppError, AppResult};

/// Called whenever the id the broker returned differs from the planned one.
pub trait DataLossReporter: Send + Sync {
    fn report(&self, message: &str) -> AppResult<()>;
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum DataLossPolicy {
    /// abort the partition
    #[default]
    Fail,
    /// log and keep reading from wherever the broker is
    Warn,
}

impl DataLossReporter for DataLossPolicy {
    fn report(&self, message: &str) -> AppResult<()> {
        match self {
            DataLossPolicy::Fail => Err(AppError::DataLoss(format!(
                "{}. Some data may have been lost because they are not available in the broker \
                 any more, e.g. retention or compaction removed them. Set \
                 reader.fail_on_data_loss = false to read on instead.",
                message
            ))),
            DataLossPolicy::Warn => {
                warn!(
                    "{}. Some data may have been lost because they are not available in the \
                     broker any more, e.g. retention or compaction removed them.",
                    message
                );
                Ok(())
            }
        }
    }
}
