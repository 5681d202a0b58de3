//! Push/pull protocol across independent handles

mod support;

use shmio::{
    DataType, Keyword, PullMode, PullOutcome, ShmConfig, ShmError, ShmResult, SharedMemory,
};
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};
use support::{Unlink, unique_name};

const LONG_WAIT: Option<Duration> = Some(Duration::from_secs(5));

#[test]
fn test_s3_frame_rate_keyword() -> ShmResult<()> {
    let name = unique_name("s3");
    let _cleanup = Unlink::new(&name);

    let keywords = [Keyword::double("FRMRATE", 0.0, "Frame rate (fps)")?];
    let mut producer = SharedMemory::create(&name, 16, DataType::Uint8, &keywords)?;
    let mut consumer = SharedMemory::open(&name)?;

    producer.keywords().set_value("FRMRATE", 30.5)?;
    producer.push_data_to_storage();

    let outcome = consumer.pull_data_from_storage(LONG_WAIT)?;
    assert_eq!(outcome, PullOutcome::Updated { version: 1 });
    assert_eq!(consumer.keywords().get_double("FRMRATE")?, 30.5);
    Ok(())
}

#[test]
fn test_pull_times_out_without_push() -> ShmResult<()> {
    let name = unique_name("timeout");
    let _cleanup = Unlink::new(&name);

    let _producer = SharedMemory::create(&name, 16, DataType::Uint8, &[])?;
    let mut consumer = SharedMemory::open(&name)?;

    let start = Instant::now();
    let err = consumer
        .pull_data_from_storage(Some(Duration::from_millis(50)))
        .unwrap_err();
    let elapsed = start.elapsed();

    match err {
        ShmError::Timeout { waited, .. } => assert!(waited >= Duration::from_millis(50)),
        other => panic!("expected Timeout, got {other}"),
    }
    assert!(elapsed >= Duration::from_millis(50));
    assert!(elapsed < Duration::from_secs(2));
    assert_eq!(consumer.last_seen_version(), 0);
    Ok(())
}

#[test]
fn test_pull_sees_every_byte_of_each_frame() -> ShmResult<()> {
    const FRAMES: u8 = 20;
    let name = unique_name("frames");
    let _cleanup = Unlink::new(&name);
    let keywords = [Keyword::long("WIDTH", 256, "")?, Keyword::long("HEIGHT", 64, "")?];

    let mut producer = SharedMemory::create(&name, 256 * 64, DataType::Uint8, &keywords)?;
    let mut consumer = SharedMemory::open(&name)?;
    let (ack_tx, ack_rx) = mpsc::channel::<u64>();

    thread::scope(|scope| {
        let reader = scope.spawn(move || -> ShmResult<()> {
            for frame in 1..=FRAMES {
                let outcome = consumer.pull_data_from_storage(LONG_WAIT)?;
                assert_eq!(outcome.version(), Some(u64::from(frame)));
                let view = consumer.ndarray::<u8>()?;
                assert!(view.iter().all(|&b| b == frame), "torn frame {frame}");
                ack_tx.send(u64::from(frame)).unwrap();
            }
            Ok(())
        });

        for frame in 1..=FRAMES {
            producer.as_bytes_mut().fill(frame);
            assert_eq!(producer.push_data_to_storage(), u64::from(frame));
            assert_eq!(ack_rx.recv_timeout(Duration::from_secs(5)).unwrap(), u64::from(frame));
        }

        reader.join().unwrap()
    })
}

#[test]
fn test_blocked_pull_wakes_on_push() -> ShmResult<()> {
    let name = unique_name("wake");
    let _cleanup = Unlink::new(&name);

    let mut producer = SharedMemory::create(&name, 8, DataType::Uint64, &[])?;
    let mut consumer = SharedMemory::open(&name)?;

    let waiter = thread::spawn(move || {
        let start = Instant::now();
        let outcome = consumer.pull_data_from_storage(LONG_WAIT);
        (outcome, start.elapsed(), consumer)
    });

    thread::sleep(Duration::from_millis(30));
    producer.ndarray_mut::<u64>()?.fill(u64::MAX);
    producer.push_data_to_storage();

    let (outcome, elapsed, consumer) = waiter.join().unwrap();
    assert_eq!(outcome?, PullOutcome::Updated { version: 1 });
    assert!(elapsed < Duration::from_secs(5));
    assert!(consumer.ndarray::<u64>()?.iter().all(|&v| v == u64::MAX));
    Ok(())
}

#[test]
fn test_concurrent_consumers_agree_on_latest_version() -> ShmResult<()> {
    const PUSHES: u64 = 50;
    let name = unique_name("consumers");
    let _cleanup = Unlink::new(&name);

    let mut producer = SharedMemory::create(&name, 64, DataType::Uint8, &[])?;

    let consumers: Vec<_> = (0..2)
        .map(|_| -> ShmResult<_> {
            let mut consumer = SharedMemory::open(&name)?;
            Ok(thread::spawn(move || -> ShmResult<u64> {
                let mut seen = 0;
                while seen < PUSHES {
                    match consumer.pull_data_from_storage(LONG_WAIT)? {
                        PullOutcome::Updated { version } => {
                            assert!(version > seen);
                            seen = version;
                        }
                        PullOutcome::NoNewFrame => unreachable!("blocking mode"),
                    }
                }
                Ok(consumer.last_seen_version())
            }))
        })
        .collect::<ShmResult<_>>()?;

    for _ in 0..PUSHES {
        producer.push_data_to_storage();
        thread::sleep(Duration::from_micros(200));
    }

    let versions: Vec<u64> = consumers
        .into_iter()
        .map(|c| c.join().unwrap())
        .collect::<ShmResult<_>>()?;
    assert_eq!(versions, vec![PUSHES, PUSHES]);
    Ok(())
}

#[test]
fn test_non_blocking_mode() -> ShmResult<()> {
    let name = unique_name("nonblock");
    let _cleanup = Unlink::new(&name);

    let mut producer = SharedMemory::create(&name, 8, DataType::Uint8, &[])?;
    let mut consumer = SharedMemory::open(&name)?;
    consumer.set_pull_mode(PullMode::NonBlocking);

    let start = Instant::now();
    assert_eq!(
        consumer.pull_data_from_storage(LONG_WAIT)?,
        PullOutcome::NoNewFrame
    );
    assert!(start.elapsed() < Duration::from_secs(1));

    producer.push_data_to_storage();
    assert!(consumer.has_new_frame());
    assert_eq!(
        consumer.pull_data_from_storage(None)?,
        PullOutcome::Updated { version: 1 }
    );
    assert_eq!(
        consumer.pull_data_from_storage(None)?,
        PullOutcome::NoNewFrame
    );
    Ok(())
}

#[test]
fn test_polling_mode() -> ShmResult<()> {
    let name = unique_name("polling");
    let _cleanup = Unlink::new(&name);

    let mut producer = SharedMemory::create(&name, 8, DataType::Uint8, &[])?;
    let mut consumer = SharedMemory::open(&name)?;
    consumer.set_pull_mode(PullMode::Polling {
        interval: Duration::from_millis(1),
    });

    assert!(matches!(
        consumer.pull_data_from_storage(Some(Duration::from_millis(20))),
        Err(ShmError::Timeout { .. })
    ));

    let pusher = thread::spawn(move || {
        thread::sleep(Duration::from_millis(20));
        producer.push_data_to_storage()
    });
    let outcome = consumer.pull_data_from_storage(LONG_WAIT)?;
    assert_eq!(outcome.version(), Some(pusher.join().unwrap()));
    Ok(())
}

#[test]
fn test_cancel_blocked_pull() -> ShmResult<()> {
    let name = unique_name("cancel");
    let _cleanup = Unlink::new(&name);

    let _producer = SharedMemory::create(&name, 8, DataType::Uint8, &[])?;
    let mut consumer = SharedMemory::open(&name)?;
    let cancel = AtomicBool::new(false);

    thread::scope(|scope| {
        let waiter = scope.spawn(|| {
            let start = Instant::now();
            let result = consumer.pull_data_from_storage_cancellable(None, &cancel);
            (result, start.elapsed())
        });

        thread::sleep(Duration::from_millis(30));
        cancel.store(true, Ordering::Release);

        let (result, elapsed) = waiter.join().unwrap();
        assert!(matches!(result, Err(ShmError::Cancelled)));
        assert!(elapsed < Duration::from_secs(2));
    });

    // Cancellation left the segment untouched.
    assert_eq!(consumer.version(), 0);
    assert_eq!(consumer.last_seen_version(), 0);
    Ok(())
}

#[test]
fn test_last_access_time_never_decreases() -> ShmResult<()> {
    let name = unique_name("access");
    let _cleanup = Unlink::new(&name);

    let mut producer = SharedMemory::create(&name, 8, DataType::Uint8, &[])?;
    let mut consumer = SharedMemory::open(&name)?;
    assert!(producer.last_access_time() >= producer.creation_time());

    let mut previous = [producer.last_access_time(), consumer.last_access_time()];
    for _ in 0..10 {
        producer.push_data_to_storage();
        consumer.pull_data_from_storage(LONG_WAIT)?;

        let current = [producer.last_access_time(), consumer.last_access_time()];
        assert!(current[0] >= previous[0]);
        assert!(current[1] >= previous[1]);
        previous = current;
    }
    Ok(())
}

#[test]
fn test_configured_pull_behaviour() -> ShmResult<()> {
    use common::config::ConfigLoader;

    let name = unique_name("configured");
    let _cleanup = Unlink::new(&name);
    let _producer = SharedMemory::create(&name, 8, DataType::Uint8, &[])?;

    let timed = ShmConfig::from_toml_str("[pull]\ntimeout_ms = 20")?;
    let mut consumer = SharedMemory::open_with_config(&name, &timed)?;
    assert!(matches!(
        consumer.pull_data_from_storage(None),
        Err(ShmError::Timeout { .. })
    ));

    let non_blocking = ShmConfig::from_toml_str("[pull]\nmode = \"non_blocking\"")?;
    let mut consumer = SharedMemory::open_with_config(&name, &non_blocking)?;
    assert_eq!(consumer.pull_mode(), PullMode::NonBlocking);
    assert_eq!(
        consumer.pull_data_from_storage(None)?,
        PullOutcome::NoNewFrame
    );
    Ok(())
}

#[test]
fn test_frames_served_on_request() -> ShmResult<()> {
    const REQUESTS: u32 = 10;
    let name = unique_name("ondemand");
    let _cleanup = Unlink::new(&name);

    let mut producer = SharedMemory::create(&name, 32, DataType::Uint8, &[])?;
    let mut consumer = SharedMemory::open(&name)?;

    thread::scope(|scope| {
        let server = scope.spawn(move || -> ShmResult<u32> {
            let mut served = 0;
            while served < REQUESTS {
                let request = producer.producer_wait_for_request(LONG_WAIT)?;
                producer.as_bytes_mut().fill(request as u8);
                producer.push_data_to_storage();
                served = producer.producer_request_done();
            }
            Ok(served)
        });

        for _ in 0..REQUESTS {
            let ticket = consumer.consumer_request_start();
            let ready = consumer.consumer_wait_for_ready(LONG_WAIT)?;
            assert!(ready >= ticket);
            assert!(consumer.as_bytes().iter().all(|&b| b == ready as u8));
        }

        assert_eq!(server.join().unwrap()?, REQUESTS);
        Ok(())
    })
}

#[test]
fn test_one_frame_serves_concurrent_requests() -> ShmResult<()> {
    let name = unique_name("shared_request");
    let _cleanup = Unlink::new(&name);

    let mut producer = SharedMemory::create(&name, 8, DataType::Uint8, &[])?;
    let mut first = SharedMemory::open(&name)?;
    let mut second = SharedMemory::open(&name)?;

    first.consumer_request_start();
    second.consumer_request_start();

    let waiters: Vec<_> = [first, second]
        .into_iter()
        .map(|mut consumer| thread::spawn(move || consumer.consumer_wait_for_ready(LONG_WAIT)))
        .collect();

    assert_eq!(producer.producer_wait_for_request(LONG_WAIT)?, 2);
    producer.push_data_to_storage();
    assert_eq!(producer.producer_request_done(), 2);

    for waiter in waiters {
        assert_eq!(waiter.join().unwrap()?, 2);
    }
    assert!(!producer.has_pending_request());
    Ok(())
}

#[test]
fn test_request_wait_times_out_without_consumer() -> ShmResult<()> {
    let name = unique_name("no_request");
    let _cleanup = Unlink::new(&name);
    let mut producer = SharedMemory::create(&name, 8, DataType::Uint8, &[])?;

    let start = Instant::now();
    let err = producer
        .producer_wait_for_request(Some(Duration::from_millis(30)))
        .unwrap_err();
    assert!(matches!(err, ShmError::Timeout { .. }));
    assert!(start.elapsed() >= Duration::from_millis(30));
    Ok(())
}
