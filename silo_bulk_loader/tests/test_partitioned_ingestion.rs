use common::{CallbackRecorder, MockClient, batch_rows, handle, partitioned_schema};
use silo_bulk_loader::{BulkLoaderError, BulkLoaderOptions, IngestManager};
use silo_client_core::{
    ProcParam, ResponseStatus, Value, partition_for_value, schema::LOAD_PARTITIONED_TABLE_PROC,
    value_to_bytes,
};

mod common;

#[tokio::test]
async fn test_partitioned_invocation_carries_routing_parameter() {
    let client = MockClient::new(4);
    let manager = IngestManager::new(client.clone());
    let recorder = CallbackRecorder::new();

    let loader = manager
        .bulk_loader(
            partitioned_schema("t"),
            BulkLoaderOptions::new(10),
            recorder.failure_callback(),
            Some(recorder.success_callback()),
        )
        .await
        .expect("create loader");

    loader
        .insert(handle(1), vec![Value::i64(42), Value::utf8("p")])
        .await
        .expect("insert");
    loader.drain().await.expect("drain");

    let calls = client.recorded_calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].procedure, LOAD_PARTITIONED_TABLE_PROC);

    let expected_routing = value_to_bytes(&Value::i64(42)).expect("routing bytes");
    assert!(matches!(&calls[0].params[0], ProcParam::Bytes(bytes) if *bytes == expected_routing));
    assert!(matches!(&calls[0].params[1], ProcParam::Utf8(table) if table == "t"));
    assert!(matches!(calls[0].params[2], ProcParam::Byte(0)));
    assert_eq!(batch_rows(&calls[0]).len(), 1);

    assert_eq!(recorder.successes(), vec![1]);
    loader.close().await.expect("close");
}

#[tokio::test]
async fn test_rows_batch_by_partition() {
    let client = MockClient::new(4);
    let manager = IngestManager::new(client.clone());
    let recorder = CallbackRecorder::new();

    let loader = manager
        .bulk_loader(
            partitioned_schema("t"),
            BulkLoaderOptions::new(100),
            recorder.failure_callback(),
            None,
        )
        .await
        .expect("create loader");

    for key in 0..16i64 {
        loader
            .insert(handle(key), vec![Value::i64(key), Value::utf8("p")])
            .await
            .expect("insert");
    }
    loader.drain().await.expect("drain");

    let calls = client.recorded_calls();
    let total_rows: usize = calls.iter().map(|call| batch_rows(call).len()).sum();
    assert_eq!(total_rows, 16);

    // Every batch holds rows of a single partition, and its routing
    // parameter is the serialized key of its first row.
    for call in &calls {
        let rows = batch_rows(call);
        let partitions: Vec<u32> = rows
            .iter()
            .map(|row| partition_for_value(&row[0], 4).expect("partition"))
            .collect();
        assert!(partitions.windows(2).all(|pair| pair[0] == pair[1]));

        let expected_routing = value_to_bytes(&rows[0][0]).expect("routing bytes");
        assert!(matches!(&call.params[0], ProcParam::Bytes(bytes) if *bytes == expected_routing));
    }

    assert_eq!(loader.completed(), 16);
    assert_eq!(loader.outstanding(), 0);
    loader.close().await.expect("close");
}

#[tokio::test]
async fn test_same_key_rows_stay_in_insert_order() {
    let client = MockClient::new(4);
    let manager = IngestManager::new(client.clone());
    let recorder = CallbackRecorder::new();

    let loader = manager
        .bulk_loader(
            partitioned_schema("t"),
            BulkLoaderOptions::new(2),
            recorder.failure_callback(),
            None,
        )
        .await
        .expect("create loader");

    for seq in 0..5i64 {
        loader
            .insert(handle(seq), vec![Value::i64(7), Value::utf8(seq.to_string())])
            .await
            .expect("insert");
    }
    loader.drain().await.expect("drain");

    let calls = client.recorded_calls();
    assert_eq!(calls.len(), 3);
    let sequences: Vec<Vec<Value>> = calls
        .iter()
        .map(|call| batch_rows(call).iter().map(|row| row[1].clone()).collect())
        .collect();
    assert_eq!(
        sequences,
        vec![
            vec![Value::Utf8("0".to_string()), Value::Utf8("1".to_string())],
            vec![Value::Utf8("2".to_string()), Value::Utf8("3".to_string())],
            vec![Value::Utf8("4".to_string())],
        ]
    );

    loader.close().await.expect("close");
}

#[tokio::test]
async fn test_unroutable_key_is_rejected_before_enqueue() {
    let client = MockClient::new(4);
    let manager = IngestManager::new(client.clone());
    let recorder = CallbackRecorder::new();

    let loader = manager
        .bulk_loader(
            partitioned_schema("t"),
            BulkLoaderOptions::new(2),
            recorder.failure_callback(),
            None,
        )
        .await
        .expect("create loader");

    let err = loader
        .insert(handle(1), vec![Value::utf8("not-a-key"), Value::utf8("p")])
        .await
        .expect_err("uncoercible key");
    assert!(matches!(err, BulkLoaderError::InvalidPartitionKey { .. }));

    let err = loader
        .insert(handle(2), vec![Value::Null, Value::utf8("p")])
        .await
        .expect_err("null key");
    assert!(matches!(err, BulkLoaderError::InvalidPartitionKey { .. }));

    assert_eq!(
        recorder.failures(),
        vec![
            (1, ResponseStatus::GracefulFailure),
            (2, ResponseStatus::GracefulFailure),
        ]
    );
    assert_eq!(loader.outstanding(), 0);
    assert_eq!(loader.failed(), 2);
    assert_eq!(client.call_count(), 0);

    loader.close().await.expect("close");
}
