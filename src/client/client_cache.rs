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

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::debug;

use super::ClientBuilder;
use crate::{AppResult, ClientConfig};

/// Process wide client cache keyed by the full client configuration.
///
/// Partitions with equal settings share one client; consumer sessions are never
/// shared, only the client they are created from.
pub struct ClientCache<B: ClientBuilder> {
    builder: B,
    clients: DashMap<ClientConfig, Arc<B::Client>>,
}

impl<B: ClientBuilder> ClientCache<B> {
    pub fn new(builder: B) -> Self {
        Self {
            builder,
            clients: DashMap::new(),
        }
    }

    pub fn get_or_create(&self, config: &ClientConfig) -> AppResult<Arc<B::Client>> {
        if let Some(client) = self.clients.get(config) {
            return Ok(client.clone());
        }
        match self.clients.entry(config.clone()) {
            Entry::Occupied(entry) => Ok(entry.get().clone()),
            Entry::Vacant(entry) => {
                debug!("create client for {}", config.service_url);
                let client = Arc::new(self.builder.build(config)?);
                entry.insert(client.clone());
                Ok(client)
            }
        }
    }

    /// Drops the cached client; sessions already created keep their own handle.
    pub fn invalidate(&self, config: &ClientConfig) -> bool {
        self.clients.remove(config).is_some()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::client::MemoryBroker;
    use crate::AppError;

    struct CountingBuilder {
        broker: MemoryBroker,
        built: AtomicUsize,
    }

    impl ClientBuilder for CountingBuilder {
        type Client = MemoryBroker;

        fn build(&self, config: &ClientConfig) -> AppResult<MemoryBroker> {
            if config.service_url.is_empty() {
                return Err(AppError::InvalidValue("empty service url".to_string()));
            }
            self.built.fetch_add(1, Ordering::SeqCst);
            Ok(self.broker.clone())
        }
    }

    fn cache() -> ClientCache<CountingBuilder> {
        ClientCache::new(CountingBuilder {
            broker: MemoryBroker::new(),
            built: AtomicUsize::new(0),
        })
    }

    #[test]
    fn test_same_config_reuses_client() -> AppResult<()> {
        let cache = cache();
        let config = ClientConfig::default();

        let first = cache.get_or_create(&config)?;
        let second = cache.get_or_create(&config.clone())?;
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.builder.built.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 1);
        Ok(())
    }

    #[test]
    fn test_different_config_builds_new_client() -> AppResult<()> {
        let cache = cache();
        let config = ClientConfig::default();
        let mut other = config.clone();
        other
            .properties
            .insert("auth".to_string(), "token".to_string());

        let first = cache.get_or_create(&config)?;
        let second = cache.get_or_create(&other)?;
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 2);

        assert!(cache.invalidate(&other));
        assert!(!cache.invalidate(&other));
        assert_eq!(cache.len(), 1);
        Ok(())
    }

    #[test]
    fn test_build_failure_is_not_cached() {
        let cache = cache();
        let config = ClientConfig {
            service_url: String::new(),
            ..ClientConfig::default()
        };
        assert!(cache.get_or_create(&config).is_err());
        assert!(cache.is_empty());
    }
}
