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

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, Semaphore};
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tracing::{debug, info, warn};

use super::{resolve_latest, BoundedConsumer, DataLossReporter, EndBound, StartBound};
use crate::client::{AdminConnector, ClientBuilder, ClientCache, Deserializer, PulsarClient};
use crate::partition::PartitionDescriptor;
use crate::{AppError, AppResult, ConsumerConfig, ReadConfig, ReaderConfig, Shutdown};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadMode {
    /// `(from, until]`, resuming a stream that was read up to `from`
    Continuous,
    /// `[from, until)`, `until` may be `LATEST`
    Batch,
}

/// Opens and drives bounded consumers for partition descriptors.
pub struct PartitionReader<C: PulsarClient, A: AdminConnector> {
    mode: ReadMode,
    client: Arc<C>,
    admin: Arc<A>,
    consumer_config: ConsumerConfig,
    read_config: ReadConfig,
    reporter: Arc<dyn DataLossReporter>,
}

impl<C: PulsarClient, A: AdminConnector> PartitionReader<C, A> {
    pub fn new(mode: ReadMode, client: Arc<C>, admin: Arc<A>, config: &ReaderConfig) -> Self {
        Self {
            mode,
            client,
            admin,
            consumer_config: config.consumer.clone(),
            read_config: config.reader.clone(),
            reporter: Arc::new(config.reader.data_loss_policy()),
        }
    }

    /// Takes the client from the process wide cache.
    pub fn from_cache<B>(
        mode: ReadMode,
        cache: &ClientCache<B>,
        admin: Arc<A>,
        config: &ReaderConfig,
    ) -> AppResult<Self>
    where
        B: ClientBuilder<Client = C>,
    {
        let client = cache.get_or_create(&config.client)?;
        Ok(Self::new(mode, client, admin, config))
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn DataLossReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn mode(&self) -> ReadMode {
        self.mode
    }

    /// Builds the consumer for one partition. In batch mode a `LATEST` upper
    /// bound is resolved here, before any subscription exists.
    pub async fn open<D: Deserializer>(
        &self,
        descriptor: &PartitionDescriptor,
        deserializer: D,
    ) -> AppResult<BoundedConsumer<C, D>> {
        let range = &descriptor.offset_range;
        let (start, end) = match self.mode {
            ReadMode::Continuous => {
                if range.until_latest() {
                    return Err(AppError::InvalidValue(format!(
                        "{}: continuous reads need a concrete upper bound",
                        descriptor
                    )));
                }
                (
                    StartBound::Exclusive(range.from_id),
                    EndBound::Inclusive(range.until_id),
                )
            }
            ReadMode::Batch => {
                let until = if range.until_latest() {
                    resolve_latest(self.admin.as_ref(), &range.topic).await?
                } else {
                    range.until_id
                };
                (StartBound::Inclusive(range.from_id), EndBound::Exclusive(until))
            }
        };
        debug!("open {} as {:?} -> {:?}", descriptor, start, end);

        Ok(BoundedConsumer::new(
            self.client.clone(),
            range.topic.clone(),
            start,
            end,
            self.consumer_config.clone(),
            deserializer,
            self.reporter.clone(),
        ))
    }

    /// Runs `consumer` on its own task and streams its records.
    ///
    /// The task closes the consumer before it ends. On shutdown the stream ends
    /// with [`AppError::Cancelled`] after the session has been released, so a
    /// cancelled partition never looks completely read.
    pub fn spawn<D>(
        &self,
        index: usize,
        consumer: BoundedConsumer<C, D>,
        shutdown: Shutdown,
    ) -> ReceiverStream<AppResult<D::Record>>
    where
        D: Deserializer + 'static,
    {
        let (tx, rx) = mpsc::channel(self.read_config.channel_capacity.max(1));
        tokio::spawn(drive(index, consumer, tx, shutdown));
        ReceiverStream::new(rx)
    }

    /// Reads every descriptor to completion, at most
    /// `reader.max_concurrent_partitions` at a time. Records come back in
    /// descriptor order. The first failure cancels the partitions still running
    /// and is returned once all of them have released their sessions.
    pub async fn read_all<D, F>(
        &self,
        descriptors: &[PartitionDescriptor],
        make_deserializer: F,
    ) -> AppResult<Vec<Vec<D::Record>>>
    where
        D: Deserializer + 'static,
        F: Fn(&PartitionDescriptor) -> D,
    {
        let semaphore = Arc::new(Semaphore::new(self.read_config.concurrency()));
        let (notify_shutdown, _) = broadcast::channel::<()>(1);
        let failed = Arc::new(AtomicBool::new(false));
        let mut handles = Vec::with_capacity(descriptors.len());
        let mut first_error = None;

        for descriptor in descriptors {
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| AppError::IllegalStateError(format!("partition slots: {}", e)))?;
            // subscribed first, so a failure after the check still reaches this partition
            let shutdown = Shutdown::new(notify_shutdown.subscribe());
            if failed.load(Ordering::Acquire) {
                debug!("skip {} after an earlier partition failed", descriptor);
                break;
            }
            let consumer = match self.open(descriptor, make_deserializer(descriptor)).await {
                Ok(consumer) => consumer,
                Err(e) => {
                    first_error = Some(e);
                    break;
                }
            };
            let stream = self.spawn(descriptor.index, consumer, shutdown);
            let notify = notify_shutdown.clone();
            let failed = failed.clone();
            handles.push(tokio::spawn(async move {
                let _permit = permit;
                let records: AppResult<Vec<D::Record>> =
                    stream.collect::<Vec<_>>().await.into_iter().collect();
                if records.is_err() {
                    failed.store(true, Ordering::Release);
                    let _ = notify.send(());
                }
                records
            }));
        }

        if first_error.is_some() {
            let _ = notify_shutdown.send(());
        }

        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok(Ok(records)) => results.push(records),
                Ok(Err(e)) => {
                    if first_error.is_none() || matches!(first_error, Some(AppError::Cancelled(_)))
                    {
                        first_error = Some(e);
                    }
                }
                Err(e) => {
                    if first_error.is_none() {
                        first_error = Some(AppError::IllegalStateError(format!(
                            "partition task failed: {}",
                            e
                        )));
                    }
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => {
                info!(
                    "read {} partitions, {} records",
                    results.len(),
                    results.iter().map(Vec::len).sum::<usize>()
                );
                Ok(results)
            }
        }
    }
}

async fn drive<C, D>(
    index: usize,
    mut consumer: BoundedConsumer<C, D>,
    tx: mpsc::Sender<AppResult<D::Record>>,
    mut shutdown: Shutdown,
) where
    C: PulsarClient,
    D: Deserializer,
{
    debug!("partition {} started on {}", index, consumer.topic());
    let mut cancelled = false;
    loop {
        let pulled = tokio::select! {
            _ = shutdown.recv() => {
                cancelled = true;
                break;
            }
            pulled = consumer.next() => pulled,
        };
        match pulled {
            Ok(Some(record)) => {
                let sent = tokio::select! {
                    _ = shutdown.recv() => {
                        cancelled = true;
                        break;
                    }
                    sent = tx.send(Ok(record)) => sent,
                };
                if sent.is_err() {
                    debug!("partition {} stream dropped, stop reading", index);
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                let _ = tx.send(Err(e)).await;
                break;
            }
        }
    }
    if let Err(e) = consumer.close().await {
        warn!("partition {} failed to release its subscription: {}", index, e);
    }
    if cancelled {
        debug!("partition {} received shutdown signal", index);
        if tx.send(Err(AppError::Cancelled(index))).await.is_err() {
            debug!("partition {} stream dropped before the cancellation", index);
        }
    }
    debug!(
        "partition {} finished after {} records",
        index,
        consumer.delivered()
    );
}
