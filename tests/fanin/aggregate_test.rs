/*!
 * Keyed Aggregator Tests
 */

use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use safe_return::*;
use std::sync::Arc;

type Outcome = Result<Collected<String, Vec<i32>>, AggregateError<String>>;

fn recorder() -> (Arc<Mutex<Vec<Outcome>>>, impl FnOnce(Outcome) + Send + 'static) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    (seen, move |outcome: Outcome| sink.lock().push(outcome))
}

#[test]
fn test_two_keys_out_of_order() {
    let (seen, done) = recorder();
    let on_item = aggregate(done, 2);
    let a = on_item.handler_for("a".to_string()).unwrap();
    let b = on_item.handler_for("b".to_string()).unwrap();

    b.call(vec![42]);
    assert!(seen.lock().is_empty());
    a.call(vec![7]);

    let seen = seen.lock();
    assert_eq!(seen.len(), 1);
    let results = seen[0].as_ref().unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results["a"], vec![7]);
    assert_eq!(results["b"], vec![42]);
}

#[test]
fn test_three_keys_any_order_fire_after_third() {
    for order in [[0, 1, 2], [2, 0, 1], [1, 2, 0]] {
        let (seen, done) = recorder();
        let on_item = aggregate(done, 3);
        let subs: Vec<_> = ["x", "y", "z"]
            .iter()
            .map(|k| on_item.handler_for(k.to_string()).unwrap())
            .collect();

        for (n, &i) in order.iter().enumerate() {
            assert!(seen.lock().is_empty(), "fired early after {} results", n);
            subs[i].call(vec![i as i32]);
        }

        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        let results = seen[0].as_ref().unwrap();
        assert_eq!(results["x"], vec![0]);
        assert_eq!(results["y"], vec![1]);
        assert_eq!(results["z"], vec![2]);
    }
}

#[test]
fn test_zero_expected_fires_with_empty_collection() {
    let (seen, done) = recorder();
    let on_item = aggregate(done, 0);

    assert!(on_item.is_completed());
    let seen = seen.lock();
    assert_eq!(seen.len(), 1);
    assert!(seen[0].as_ref().unwrap().is_empty());
}

#[test]
fn test_duplicate_key_is_terminal() {
    let (seen, done) = recorder();
    let on_item = aggregate(done, 2);
    let a = on_item.handler_for("a".to_string()).unwrap();

    let err = on_item.handler_for("a".to_string()).err().unwrap();
    assert_eq!(err, AggregateError::DuplicateKey("a".to_string()));
    assert_eq!(err.key(), "a");

    // Neither later registrations nor results may complete the aggregation
    assert!(matches!(
        on_item.handler_for("b".to_string()),
        Err(AggregateError::AlreadyCompleted(_))
    ));
    a.call(vec![1]);

    let seen = seen.lock();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0], Err(AggregateError::DuplicateKey("a".to_string())));
}

#[test]
fn test_duplicate_key_does_not_touch_remaining() {
    let (_seen, done) = recorder();
    let on_item = aggregate(done, 3);
    let _a = on_item.handler_for("a".to_string()).unwrap();
    assert_eq!(on_item.remaining(), 3);

    let _ = on_item.handler_for("a".to_string());
    assert_eq!(on_item.remaining(), 3);
    assert_eq!(on_item.expected(), 3);
}

#[test]
fn test_sub_handlers_from_threads() {
    let (seen, done) = recorder();
    let on_item = aggregate(done, 8);
    let threads: Vec<_> = (0..8)
        .map(|i| {
            let sub = on_item.handler_for(format!("k{}", i)).unwrap();
            std::thread::spawn(move || sub.call(vec![i]))
        })
        .collect();
    for t in threads {
        t.join().unwrap();
    }

    let seen = seen.lock();
    assert_eq!(seen.len(), 1);
    let results = seen[0].as_ref().unwrap();
    assert_eq!(results.len(), 8);
    assert_eq!(results["k5"], vec![5]);
}
