use std::sync::Arc;

use pulsar_range_reader::client::{
    FaultPoint, MemoryBroker, PayloadSchema, PulsarRecord, RecordDeserializer, RecordValue,
};
use pulsar_range_reader::consume::seekable_latest;
use pulsar_range_reader::{
    AppError, AppResult, EntryPosition, MessageId, OffsetRange, PartitionDescriptor,
    PartitionReader, ReadMode, ReaderConfig,
};

fn reader(
    mode: ReadMode,
    broker: &MemoryBroker,
    fail_on_data_loss: bool,
) -> PartitionReader<MemoryBroker, MemoryBroker> {
    let mut config = ReaderConfig::default();
    config.reader.fail_on_data_loss = fail_on_data_loss;
    PartitionReader::new(mode, Arc::new(broker.clone()), Arc::new(broker.clone()), &config)
}

fn deserializer(descriptor: &PartitionDescriptor) -> RecordDeserializer {
    RecordDeserializer::new(descriptor.topic(), PayloadSchema::Utf8)
}

fn texts(records: &[PulsarRecord]) -> Vec<&str> {
    records
        .iter()
        .map(|r| match &r.value {
            RecordValue::Utf8(s) => s.as_str(),
            RecordValue::Bytes(_) => "<bytes>",
        })
        .collect()
}

async fn read_one(
    reader: &PartitionReader<MemoryBroker, MemoryBroker>,
    descriptor: &PartitionDescriptor,
) -> AppResult<Vec<PulsarRecord>> {
    let mut consumer = reader.open(descriptor, deserializer(descriptor)).await?;
    let mut records = Vec::new();
    while let Some(record) = consumer.next().await? {
        records.push(record);
    }
    Ok(records)
}

#[tokio::test]
async fn test_resume_after_previous_pass() -> AppResult<()> {
    let broker = MemoryBroker::new();
    broker.create_topic("events", 0, 5, 10);
    for payload in ["e10", "e11", "e12", "e13"] {
        broker.publish("events", payload)?;
    }

    let reader = reader(ReadMode::Continuous, &broker, true);
    let descriptor = PartitionDescriptor::new(
        0,
        OffsetRange::new("events", MessageId::new(5, 10, 0), MessageId::new(5, 12, 0)),
    );
    let records = read_one(&reader, &descriptor).await?;

    assert_eq!(texts(&records), vec!["e11", "e12"]);
    assert_eq!(records[1].message_id, MessageId::new(5, 12, 0));
    assert_eq!(broker.connected_consumers(), 0);
    Ok(())
}

#[tokio::test]
async fn test_consecutive_passes_do_not_duplicate_batches() -> AppResult<()> {
    let broker = MemoryBroker::new();
    broker.create_topic("events", 0, 9, 0);
    broker.publish("events", "a")?;
    broker.publish_batch("events", vec!["b0", "b1", "b2"])?;
    broker.publish("events", "c")?;
    broker.publish_batch("events", vec!["d0", "d1"])?;

    let reader = reader(ReadMode::Continuous, &broker, true);
    let first = PartitionDescriptor::new(
        0,
        OffsetRange::new("events", MessageId::new(9, 0, 0), MessageId::new(9, 1, 0)),
    );
    let second = PartitionDescriptor::new(
        1,
        OffsetRange::new("events", MessageId::new(9, 1, 0), MessageId::new(9, 3, 0)),
    );

    let mut all = read_one(&reader, &first).await?;
    all.extend(read_one(&reader, &second).await?);
    assert_eq!(texts(&all), vec!["b0", "b1", "b2", "c", "d0", "d1"]);
    Ok(())
}

#[tokio::test]
async fn test_batch_read_up_to_latest() -> AppResult<()> {
    let broker = MemoryBroker::new();
    broker.create_topic("events", 0, 7, 1);
    broker.publish("events", "x")?;
    broker.publish("events", "y")?;
    broker.publish_batch("events", vec!["z0", "z1"])?;

    let raw_last = MessageId::batch(7, 3, 0, 1, 2);
    assert_eq!(seekable_latest(raw_last), MessageId::new(7, 4, 0));

    let reader = reader(ReadMode::Batch, &broker, true);
    let descriptor = PartitionDescriptor::new(
        0,
        OffsetRange::new("events", MessageId::new(7, 2, 0), MessageId::LATEST),
    );
    let records = read_one(&reader, &descriptor).await?;
    assert_eq!(texts(&records), vec!["y", "z0", "z1"]);
    assert_eq!(broker.stats().admin_closes, 1);
    Ok(())
}

#[tokio::test]
async fn test_trimmed_end_is_an_empty_partition() -> AppResult<()> {
    let broker = MemoryBroker::new();
    broker.create_topic("events", 0, 3, 0);
    broker.publish("events", "a")?;

    let reader = reader(ReadMode::Continuous, &broker, true);
    let descriptor = PartitionDescriptor::new(
        0,
        OffsetRange::new("events", MessageId::new(3, 0, 0), MessageId::new(-1, -1, 0)),
    );
    assert!(read_one(&reader, &descriptor).await?.is_empty());
    assert_eq!(broker.stats().subscribes, 0);
    Ok(())
}

#[tokio::test]
async fn test_data_loss_policy_is_configurable() -> AppResult<()> {
    let broker = MemoryBroker::new();
    broker.create_topic("events", 0, 4, 0);
    for payload in ["a", "b", "c", "d"] {
        broker.publish("events", payload)?;
    }
    broker.trim_before("events", EntryPosition::new(4, 2))?;
    let descriptor = PartitionDescriptor::new(
        0,
        OffsetRange::new("events", MessageId::new(4, 0, 0), MessageId::new(4, 3, 0)),
    );

    let strict = reader(ReadMode::Continuous, &broker, true);
    assert!(matches!(
        read_one(&strict, &descriptor).await,
        Err(AppError::DataLoss(_))
    ));

    let lenient = reader(ReadMode::Continuous, &broker, false);
    // the first surviving entry stands in for the start
    let records = read_one(&lenient, &descriptor).await?;
    assert_eq!(texts(&records), vec!["d"]);
    assert_eq!(broker.connected_consumers(), 0);
    Ok(())
}

#[tokio::test]
async fn test_client_failure_is_not_retried() -> AppResult<()> {
    let broker = MemoryBroker::new();
    broker.create_topic("events", 0, 1, 0);
    broker.publish("events", "a")?;
    broker.publish("events", "b")?;
    broker.fail_next(FaultPoint::Subscribe);

    let reader = reader(ReadMode::Batch, &broker, true);
    let descriptor = PartitionDescriptor::new(
        0,
        OffsetRange::new("events", MessageId::EARLIEST, MessageId::new(1, 1, 0)),
    );
    assert!(matches!(
        read_one(&reader, &descriptor).await,
        Err(AppError::ClientError(_))
    ));
    assert_eq!(broker.stats().subscribes, 0);

    // a fresh consumer is a fresh pass
    let records = read_one(&reader, &descriptor).await?;
    assert_eq!(texts(&records), vec!["a"]);
    Ok(())
}

#[tokio::test]
async fn test_range_across_ledgers() -> AppResult<()> {
    let broker = MemoryBroker::new();
    broker.create_topic("events", 0, 2, 0);
    broker.publish("events", "l2e0")?;
    broker.publish("events", "l2e1")?;
    broker.roll_ledger("events")?;
    broker.publish("events", "l3e0")?;
    broker.publish("events", "l3e1")?;

    let reader = reader(ReadMode::Continuous, &broker, true);
    let descriptor = PartitionDescriptor::new(
        0,
        OffsetRange::new("events", MessageId::new(2, 0, 0), MessageId::new(3, 0, 0)),
    );
    let records = read_one(&reader, &descriptor).await?;
    assert_eq!(texts(&records), vec!["l2e1", "l3e0"]);
    Ok(())
}
