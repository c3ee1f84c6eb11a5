use hambbs_core::config::{Config, SchedulerConfig, StorageConfig};
use hambbs_core::scheduler::{LinkScheduler, RunOutcome, SendFn};
use hambbs_core::transport::TransportError;
use hambbs_core::trust::KeyCache;
use parking_lot::Mutex;
use std::sync::Arc;

fn failing_send() -> SendFn {
    Box::new(|_| Err(TransportError::Io("modem offline".to_string())))
}

fn recording_send(log: Arc<Mutex<Vec<Vec<u8>>>>) -> SendFn {
    Box::new(move |payload| {
        log.lock().push(payload.to_vec());
        Ok(())
    })
}

#[test]
fn test_queue_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("queue.json");
    let config = SchedulerConfig::default();

    // First run: two items queued, one failed attempt recorded
    {
        let mut scheduler = LinkScheduler::durable(&path, config.clone(), failing_send(), None).unwrap();
        scheduler.queue(b"urgent".to_vec(), 1).unwrap();
        scheduler.queue(b"routine".to_vec(), 10).unwrap();
        assert_eq!(
            scheduler.run_once_at(0).unwrap(),
            RunOutcome::Failed {
                attempts: 1,
                retry_at_ms: 120_000
            }
        );
    }
    // scheduler dropped here; the queue file is all that remains

    // Second run: same order, backoff state intact
    {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let mut scheduler =
            LinkScheduler::durable(&path, config, recording_send(Arc::clone(&sent)), None).unwrap();
        let pending = scheduler.pending();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].payload, b"urgent");
        assert_eq!(pending[0].attempts, 1);
        assert_eq!(pending[0].next_attempt_ms, 120_000);

        // The backed-off item waits; the other one goes out
        assert!(matches!(scheduler.run_once_at(1_000).unwrap(), RunOutcome::Sent { .. }));
        assert_eq!(*sent.lock(), vec![b"routine".to_vec()]);

        assert!(matches!(scheduler.run_once_at(120_000).unwrap(), RunOutcome::Sent { .. }));
        assert!(scheduler.is_empty());
    }

    // Third run: nothing left
    let scheduler = LinkScheduler::durable(&path, SchedulerConfig::default(), failing_send(), None).unwrap();
    assert!(scheduler.is_empty());
}

#[test]
fn test_duty_cycle_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("queue.json");
    let config = SchedulerConfig {
        duty_cycle_secs: 60,
        ..SchedulerConfig::default()
    };
    let t = 1_700_000_000_000u64;

    {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let mut scheduler =
            LinkScheduler::durable(&path, config.clone(), recording_send(Arc::clone(&sent)), None).unwrap();
        scheduler.queue(b"bulletin".to_vec(), 5).unwrap();
        assert!(matches!(scheduler.run_once_at(t).unwrap(), RunOutcome::Sent { .. }));
        assert_eq!(sent.lock().len(), 1);
    }

    // A restart a second later must not reopen the transmit window
    let sent = Arc::new(Mutex::new(Vec::new()));
    let mut scheduler =
        LinkScheduler::durable(&path, config, recording_send(Arc::clone(&sent)), None).unwrap();
    assert_eq!(scheduler.last_transmission_ms(), Some(t));
    scheduler.queue(b"beacon".to_vec(), 1).unwrap();
    assert_eq!(
        scheduler.run_once_at(t + 1_000).unwrap(),
        RunOutcome::Paced {
            retry_at_ms: t + 1_000 + 60_000
        }
    );
    assert!(sent.lock().is_empty());
    assert!(matches!(
        scheduler.run_once_at(t + 61_000).unwrap(),
        RunOutcome::Sent { .. }
    ));
}

#[test]
fn test_keycache_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("keys").join("keycache.json");

    {
        let cache = KeyCache::open(&path).unwrap();
        assert!(cache.update("K1ABC", 1, b"first").unwrap());
        assert!(cache.update("K1ABC", 2, b"second").unwrap());
        assert!(cache.update("W1AW", 7, b"club").unwrap());
    }

    {
        let cache = KeyCache::open(&path).unwrap();
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("K1ABC"), Some(b"second".to_vec()));
        // A replayed older version is still refused after restart
        assert!(!cache.update("K1ABC", 1, b"first").unwrap());
        assert!(cache.update("W1AW", 8, b"club-rotated").unwrap());
    }

    let cache = KeyCache::open(&path).unwrap();
    assert_eq!(cache.entry("W1AW").unwrap().version, 8);
}

#[test]
fn test_config_points_at_durable_state() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("hambbs.json");

    let mut config = Config::default();
    config.storage = StorageConfig {
        queue_path: Some(dir.path().join("queue.json")),
        keycache_path: Some(dir.path().join("keycache.json")),
    };
    config.scheduler.duty_cycle_secs = 30;
    config.save(&config_path).unwrap();

    let loaded = Config::load(&config_path).unwrap();
    assert_eq!(loaded, config);

    let queue_path = loaded.storage.queue_path.clone().unwrap();
    {
        let mut scheduler =
            LinkScheduler::durable(&queue_path, loaded.scheduler.clone(), failing_send(), None).unwrap();
        scheduler.queue(b"held".to_vec(), 3).unwrap();
    }
    let scheduler = LinkScheduler::durable(&queue_path, loaded.scheduler, failing_send(), None).unwrap();
    assert_eq!(scheduler.len(), 1);

    let keys = KeyCache::open(loaded.storage.keycache_path.unwrap()).unwrap();
    assert!(keys.is_empty());
}
