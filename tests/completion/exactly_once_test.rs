/*!
 * Exactly-Once Delivery Tests
 */

use pretty_assertions::assert_eq;
use proptest::prelude::*;
use safe_return::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use parking_lot::Mutex;

fn recording_config() -> (GuardConfig, Arc<RecordingObserver>) {
    let observer = Arc::new(RecordingObserver::new());
    (GuardConfig::new().with_observer(observer.clone()), observer)
}

#[test]
fn test_handler_receives_first_arguments() {
    let (config, observer) = recording_config();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let guard = config
        .guard(move |r: Result<u32, String>| sink.lock().push(r), Deadline::Disabled)
        .unwrap();

    guard.call(Ok(1));
    guard.call(Err("second".to_string()));
    guard.call(Ok(3));

    assert_eq!(*seen.lock(), vec![Ok(1)]);
    assert_eq!(observer.duplicates(), 2);
    assert_eq!(guard.attempts(), 3);
}

#[test]
fn test_return_value_only_on_first_call() {
    let (config, _) = recording_config();
    let guard = CompletionGuard::untimed(|x: u8| x + 1, &config);

    assert_eq!(guard.call(1), Some(2));
    assert_eq!(guard.call(5), None);
}

#[test]
fn test_duplicate_report_carries_both_contexts() {
    let (config, observer) = recording_config();
    let guard = CompletionGuard::untimed(|_: ()| (), &config);
    guard.call(());
    guard.call(());

    let reports = observer.reports();
    assert_eq!(reports.len(), 1);
    match reports[0] {
        GuardReport::Duplicate(report) => {
            assert_eq!(report.attempt, 2);
            assert_eq!(report.origin.id(), guard.origin().id());
            assert_eq!(report.first.source(), FireSource::Completion);
            assert_eq!(report.location.file(), file!());
            assert_eq!(report.origin.location().file(), file!());
        }
        other => panic!("Expected duplicate report, got {:?}", other),
    }
}

#[test]
fn test_custom_duplicate_hook() {
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    let config = GuardConfig::new().with_observer(Arc::new(move |_: &DuplicateCompletion| {
        counter.fetch_add(1, Ordering::SeqCst);
    }));

    let guard = CompletionGuard::untimed(|_: ()| (), &config);
    for _ in 0..4 {
        guard.call(());
    }
    assert_eq!(hits.load(Ordering::SeqCst), 3);
}

#[test]
fn test_into_fn_keeps_guarantee() {
    let (config, observer) = recording_config();
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    let callback = CompletionGuard::untimed(
        move |_: u32| {
            counter.fetch_add(1, Ordering::SeqCst);
        },
        &config,
    )
    .into_fn();

    let copy = callback.clone();
    callback(1);
    copy(2);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert_eq!(observer.duplicates(), 1);
}

proptest! {
    #[test]
    fn prop_handler_runs_once(calls in 1usize..50, first in any::<u32>()) {
        let config = GuardConfig::new().with_observer(Arc::new(RecordingObserver::new()));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let guard = config
            .guard(move |r: Option<u32>| sink.lock().push(r), Deadline::Disabled)
            .unwrap();

        guard.call(Some(first));
        for i in 1..calls {
            guard.call(Some(i as u32));
        }

        prop_assert_eq!(seen.lock().clone(), vec![Some(first)]);
        prop_assert_eq!(guard.attempts(), calls as u64);
    }
}
