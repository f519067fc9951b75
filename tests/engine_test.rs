mod common;

use std::sync::Arc;

use common::{contents, record, RecordingSink};
use syslog_batch_sink::engine::{BatchEngine, EngineReport};
use syslog_batch_sink::record::LogRecord;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration, Instant};

fn start_engine(
    batch_size: usize,
    flush_interval: Duration,
) -> (
    mpsc::UnboundedSender<LogRecord>,
    Arc<RecordingSink>,
    JoinHandle<EngineReport>,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    let sink = Arc::new(RecordingSink::default());
    let engine = BatchEngine::new(batch_size, flush_interval, rx, sink.clone()).unwrap();
    (tx, sink, engine.spawn())
}

#[tokio::test(start_paused = true)]
async fn test_size_flush_then_shutdown_flush() {
    // batch_size = 3, flush_interval = 2s
    let (tx, sink, handle) = start_engine(3, Duration::from_secs(2));
    let start = Instant::now();

    tx.send(record("A")).unwrap();
    sleep(Duration::from_millis(100)).await;
    tx.send(record("B")).unwrap();
    sleep(Duration::from_millis(100)).await;
    tx.send(record("C")).unwrap();
    sleep(Duration::from_millis(800)).await;

    let writes = sink.writes();
    assert_eq!(writes.len(), 1);
    assert_eq!(contents(&writes[0].1), ["A", "B", "C"]);
    assert_eq!(writes[0].0 - start, Duration::from_millis(200));

    tx.send(record("D")).unwrap();
    sleep(Duration::from_millis(500)).await;
    drop(tx);

    let report = handle.await.unwrap();
    let writes = sink.writes();
    assert_eq!(writes.len(), 2);
    assert_eq!(contents(&writes[1].1), ["D"]);
    assert_eq!(writes[1].0 - start, Duration::from_millis(1500));
    assert_eq!(sink.closes(), 1);
    assert_eq!(
        report,
        EngineReport {
            received_records: 4,
            flushed_batches: 2,
            flushed_records: 4,
            failed_batches: 0,
            failed_records: 0,
        }
    );
}

#[tokio::test(start_paused = true)]
async fn test_timer_flush_measured_from_first_record() {
    // batch_size = 100, flush_interval = 2s
    let (tx, sink, handle) = start_engine(100, Duration::from_secs(2));
    let start = Instant::now();

    // Idle time before the first record must not count.
    sleep(Duration::from_secs(1)).await;
    for i in 0..5 {
        tx.send(record(&format!("r{i}"))).unwrap();
        sleep(Duration::from_millis(125)).await;
    }
    sleep(Duration::from_secs(5)).await;

    let writes = sink.writes();
    assert_eq!(writes.len(), 1);
    assert_eq!(contents(&writes[0].1), ["r0", "r1", "r2", "r3", "r4"]);
    assert_eq!(writes[0].0 - start, Duration::from_secs(3));

    drop(tx);
    handle.await.unwrap();
    assert_eq!(sink.writes().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_size_flush_disarms_timer() {
    let (tx, sink, handle) = start_engine(3, Duration::from_secs(2));

    for name in ["A", "B", "C"] {
        tx.send(record(name)).unwrap();
    }
    sleep(Duration::from_secs(10)).await;

    // The timer armed by "A" must not fire an extra (empty) write.
    assert_eq!(sink.batches(), vec![vec!["A", "B", "C"]]);

    drop(tx);
    handle.await.unwrap();
    assert_eq!(sink.batches().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_new_timer_armed_after_timer_flush() {
    let (tx, sink, handle) = start_engine(10, Duration::from_secs(1));
    let start = Instant::now();

    tx.send(record("A")).unwrap();
    sleep(Duration::from_millis(1500)).await;
    tx.send(record("B")).unwrap();
    sleep(Duration::from_secs(3)).await;

    let writes = sink.writes();
    assert_eq!(writes.len(), 2);
    assert_eq!(writes[0].0 - start, Duration::from_secs(1));
    assert_eq!(writes[1].0 - start, Duration::from_millis(2500));

    drop(tx);
    handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_batches_partition_input_in_order() {
    let (tx, sink, handle) = start_engine(7, Duration::from_secs(2));

    let input: Vec<String> = (0..1000).map(|i| format!("m{i}")).collect();
    for content in &input {
        tx.send(record(content)).unwrap();
    }
    drop(tx);

    let report = handle.await.unwrap();
    let batches = sink.batches();

    assert_eq!(batches.len(), 143);
    assert!(batches.iter().all(|b| !b.is_empty() && b.len() <= 7));
    assert_eq!(batches.last().unwrap().len(), 1000 % 7);
    assert_eq!(batches.concat(), input);
    assert_eq!(report.flushed_records, 1000);
    assert_eq!(report.flushed_batches, 143);
}

#[tokio::test(start_paused = true)]
async fn test_close_with_empty_buffer_makes_no_write() {
    let (tx, sink, handle) = start_engine(3, Duration::from_secs(2));

    for name in ["A", "B", "C"] {
        tx.send(record(name)).unwrap();
    }
    drop(tx);

    handle.await.unwrap();
    assert_eq!(sink.batches(), vec![vec!["A", "B", "C"]]);
    assert_eq!(sink.closes(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_write_failure_does_not_stop_batching() {
    let (tx, sink, handle) = start_engine(2, Duration::from_secs(2));
    sink.fail_next(true);

    for name in ["A", "B", "C", "D", "E"] {
        tx.send(record(name)).unwrap();
    }
    sleep(Duration::from_millis(10)).await;
    drop(tx);

    let report = handle.await.unwrap();
    assert_eq!(sink.batches(), vec![vec!["A", "B"], vec!["C", "D"], vec!["E"]]);
    assert_eq!(
        report,
        EngineReport {
            received_records: 5,
            flushed_batches: 2,
            flushed_records: 3,
            failed_batches: 1,
            failed_records: 2,
        }
    );
}

#[tokio::test(start_paused = true)]
async fn test_final_flush_failure_still_closes_sink() {
    let (tx, sink, handle) = start_engine(10, Duration::from_secs(2));
    sink.fail_next(true);

    tx.send(record("A")).unwrap();
    drop(tx);

    let report = handle.await.unwrap();
    assert_eq!(sink.batches(), vec![vec!["A"]]);
    assert_eq!(report.failed_records, 1);
    assert_eq!(sink.closes(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_stats_are_live() {
    let (tx, rx) = mpsc::unbounded_channel();
    let sink = Arc::new(RecordingSink::default());
    let engine = BatchEngine::new(2, Duration::from_secs(1), rx, sink).unwrap();
    let stats = engine.stats();
    let handle = engine.spawn();

    tx.send(record("A")).unwrap();
    tx.send(record("B")).unwrap();
    tx.send(record("C")).unwrap();
    sleep(Duration::from_millis(10)).await;

    let snapshot = stats.snapshot();
    assert_eq!(snapshot.received_records, 3);
    assert_eq!(snapshot.flushed_records, 2);

    drop(tx);
    handle.await.unwrap();
    assert_eq!(stats.snapshot().flushed_records, 3);
}
