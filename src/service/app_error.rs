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

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// general errors
    #[error("illegal state: {0}")]
    IllegalStateError(String),

    #[error("invalid value: {0}")]
    InvalidValue(String),

    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("config file error: {0}")]
    ConfigFileError(#[from] config::ConfigError),

    /// raised by the fail-fast data loss policy
    #[error("data loss: {0}")]
    DataLoss(String),

    /// broker / client errors, never retried at this layer
    #[error("client error: {0}")]
    ClientError(String),

    #[error("admin error: {0}")]
    AdminError(String),

    #[error("consumer busy: {0}")]
    ConsumerBusy(String),

    #[error("topic not found: {0}")]
    TopicNotFound(String),

    #[error("deserialization error: {0}")]
    Deserialization(String),

    #[error("partition {0} cancelled")]
    Cancelled(usize),
}
