/*!
 * Deadline Tests
 */

use safe_return::*;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

fn recording_config() -> (GuardConfig, Arc<RecordingObserver>) {
    let observer = Arc::new(RecordingObserver::new());
    (GuardConfig::new().with_observer(observer.clone()), observer)
}

#[tokio::test(start_paused = true)]
async fn test_timeout_fires_once_then_late_completion_reported() {
    let (config, observer) = recording_config();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let guard = config
        .guard(
            move |r: io::Result<u32>| {
                let _ = tx.send(r.map_err(|e| e.kind()));
            },
            Deadline::after_millis(200),
        )
        .unwrap();

    tokio::time::sleep(Duration::from_millis(199)).await;
    assert!(!guard.is_fired());

    tokio::time::sleep(Duration::from_millis(2)).await;
    assert_eq!(rx.recv().await, Some(Err(io::ErrorKind::TimedOut)));
    assert_eq!(observer.timeouts(), 1);

    assert_eq!(guard.call(Ok(5)), None);
    assert_eq!(observer.late_completions(), 1);
    assert_eq!(observer.duplicates(), 0);
    assert_eq!(rx.recv().await, None);
}

#[tokio::test(start_paused = true)]
async fn test_default_deadline_is_one_second() {
    let (config, _) = recording_config();
    let (tx, rx) = tokio::sync::oneshot::channel();
    let start = tokio::time::Instant::now();
    let guard = config
        .guard(
            move |r: Result<(), TimeoutError>| {
                let _ = tx.send(r);
            },
            Deadline::Default,
        )
        .unwrap();
    assert_eq!(guard.deadline(), Some(DEFAULT_TIMEOUT));

    let err = rx.await.unwrap().unwrap_err();
    assert_eq!(err.kind(), TimeoutError::KIND);
    assert!(start.elapsed() >= Duration::from_millis(1000));
    assert!(start.elapsed() < Duration::from_millis(1100));
}

#[tokio::test(start_paused = true)]
async fn test_disabled_deadline_never_times_out() {
    let (config, observer) = recording_config();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let guard = config
        .guard(
            move |r: Result<u8, TimeoutError>| {
                let _ = tx.send(r.is_ok());
            },
            Deadline::Disabled,
        )
        .unwrap();
    assert_eq!(guard.deadline(), None);

    tokio::time::sleep(Duration::from_secs(3600)).await;
    assert!(!guard.is_fired());
    assert!(rx.try_recv().is_err());

    guard.call(Ok(1));
    assert_eq!(rx.recv().await, Some(true));
    assert_eq!(observer.timeouts(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_zero_deadline_disables_timer() {
    let (config, _) = recording_config();
    let guard = config
        .guard(|_: Option<()>| (), Deadline::After(Duration::ZERO))
        .unwrap();

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert!(!guard.is_fired());
    guard.call(Some(()));
}

#[tokio::test(start_paused = true)]
async fn test_completion_cancels_timer() {
    let (config, observer) = recording_config();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let guard = config
        .guard(
            move |r: Result<u8, TimeoutError>| {
                let _ = tx.send(r.is_ok());
            },
            Deadline::after_millis(50),
        )
        .unwrap();

    guard.call(Ok(9));
    tokio::time::sleep(Duration::from_millis(500)).await;

    assert_eq!(rx.recv().await, Some(true));
    assert_eq!(rx.recv().await, None);
    assert_eq!(observer.timeouts(), 0);
    assert_eq!(guard.firing().map(|f| f.source()), Some(FireSource::Completion));
}

#[tokio::test(start_paused = true)]
async fn test_dropped_callback_still_times_out() {
    let (config, observer) = recording_config();
    let (tx, rx) = tokio::sync::oneshot::channel();
    let guard = config
        .guard(
            move |r: io::Result<()>| {
                let _ = tx.send(r);
            },
            Deadline::after_millis(10),
        )
        .unwrap();

    // The operation loses its callback without calling it
    drop(guard);

    let err = rx.await.unwrap().unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::TimedOut);
    assert_eq!(observer.abandoned(), 0);
}

#[test]
fn test_no_timer_created_without_runtime() {
    let (config, observer) = recording_config();
    let result = config.guard(|_: Option<()>| (), Deadline::after_millis(10));
    assert!(matches!(result, Err(GuardError::RuntimeUnavailable)));
    // The rejected handler never became a guard, so nothing is abandoned
    assert_eq!(observer.abandoned(), 0);
}

#[test]
fn test_explicit_runtime_handle() {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .start_paused(true)
        .build()
        .unwrap();
    let (config, observer) = recording_config();
    let config = config.with_runtime(runtime.handle().clone());

    let (tx, rx) = tokio::sync::oneshot::channel();
    let guard = config
        .guard(
            move |r: Result<(), TimeoutError>| {
                let _ = tx.send(r.is_err());
            },
            Deadline::after_millis(20),
        )
        .unwrap();

    assert!(runtime.block_on(rx).unwrap());
    assert!(guard.is_fired());
    assert_eq!(observer.timeouts(), 1);
}
