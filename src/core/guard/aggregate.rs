/*!
 * Keyed Fan-In
 *
 * Collects the results of N keyed sub-operations and fires one final
 * completion exactly once
 */

use super::completion::CompletionGuard;
use super::timeout::{Deadline, GuardConfig};
use super::traits::TimeoutOutcome;
use super::GuardResult;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use tracing::{debug, warn};

/// Key -> result collection handed to the final handler
pub type Collected<K, V> = HashMap<K, V, ahash::RandomState>;

type FinalHandler<K, V> = Box<dyn FnOnce(Result<Collected<K, V>, AggregateError<K>>) + Send>;

/// Errors raised while registering sub-operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AggregateError<K> {
    /// The key was already registered; terminal for the aggregation
    #[error("Duplicate aggregation key: {0:?}")]
    DuplicateKey(K),

    /// More distinct keys than the aggregation expects
    #[error("Too many aggregation keys: expected {expected}, rejected {key:?}")]
    TooManyKeys { key: K, expected: usize },

    /// The final handler has already fired
    #[error("Aggregation already completed, rejected key {0:?}")]
    AlreadyCompleted(K),
}

impl<K> AggregateError<K> {
    /// Key that triggered the error
    pub fn key(&self) -> &K {
        match self {
            Self::DuplicateKey(key) | Self::AlreadyCompleted(key) => key,
            Self::TooManyKeys { key, .. } => key,
        }
    }
}

struct FanIn<K, V> {
    /// `None` marks a registered key whose result has not arrived yet
    results: HashMap<K, Option<V>, ahash::RandomState>,
    expected: usize,
    remaining: usize,
    /// Taken exactly once, by completion or by a duplicate key
    final_handler: Option<FinalHandler<K, V>>,
}

/// Fan-in coordinator over a fixed number of keyed sub-operations
///
/// # Example
///
/// ```ignore
/// let on_item = KeyedAggregator::new(|outcome| println!("{outcome:?}"), 2);
/// let a = on_item.handler_for("a")?;
/// let b = on_item.handler_for("b")?;
/// b.call(42);
/// a.call(7); // final handler fires with Ok({a: 7, b: 42})
/// ```
pub struct KeyedAggregator<K, V> {
    state: Arc<Mutex<FanIn<K, V>>>,
}

impl<K, V> Clone for KeyedAggregator<K, V> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<K, V> KeyedAggregator<K, V>
where
    K: Eq + Hash + Clone + fmt::Debug + Send + 'static,
    V: Send + 'static,
{
    /// Create an aggregator expecting `expected` distinct keys
    ///
    /// With `expected == 0` the final handler fires immediately with an
    /// empty collection.
    pub fn new<F>(final_handler: F, expected: usize) -> Self
    where
        F: FnOnce(Result<Collected<K, V>, AggregateError<K>>) + Send + 'static,
    {
        let mut final_handler: Option<FinalHandler<K, V>> = Some(Box::new(final_handler));
        if expected == 0 {
            debug!("empty aggregation completed immediately");
            if let Some(handler) = final_handler.take() {
                handler(Ok(Collected::default()));
            }
        }

        Self {
            state: Arc::new(Mutex::new(FanIn {
                results: HashMap::with_capacity_and_hasher(expected, ahash::RandomState::new()),
                expected,
                remaining: expected,
                final_handler,
            })),
        }
    }

    /// Register `key` and return the sub-handler bound to it
    ///
    /// # Errors
    ///
    /// - `DuplicateKey`: the key was already registered. The final handler
    ///   receives the same error and the aggregation never completes normally.
    /// - `AlreadyCompleted`: the final handler has already fired.
    /// - `TooManyKeys`: more keys than expected; only this registration is
    ///   rejected.
    pub fn handler_for(&self, key: K) -> Result<SubHandler<K, V>, AggregateError<K>> {
        let mut fanin = self.state.lock();
        if fanin.final_handler.is_none() {
            return Err(AggregateError::AlreadyCompleted(key));
        }

        if fanin.results.contains_key(&key) {
            let handler = fanin.final_handler.take();
            drop(fanin);

            warn!(key = ?key, "duplicate aggregation key, aborting aggregation");
            if let Some(handler) = handler {
                handler(Err(AggregateError::DuplicateKey(key.clone())));
            }
            return Err(AggregateError::DuplicateKey(key));
        }

        if fanin.results.len() >= fanin.expected {
            warn!(key = ?key, expected = fanin.expected, "aggregation key over expected count rejected");
            return Err(AggregateError::TooManyKeys {
                key,
                expected: fanin.expected,
            });
        }

        fanin.results.insert(key.clone(), None);
        Ok(SubHandler {
            key,
            state: Arc::clone(&self.state),
        })
    }

    pub fn expected(&self) -> usize {
        self.state.lock().expected
    }

    /// Sub-results still outstanding
    pub fn remaining(&self) -> usize {
        self.state.lock().remaining
    }

    pub fn is_completed(&self) -> bool {
        self.state.lock().final_handler.is_none()
    }
}

/// Create a keyed aggregator; see [`KeyedAggregator::new`]
pub fn aggregate<K, V, F>(final_handler: F, expected: usize) -> KeyedAggregator<K, V>
where
    K: Eq + Hash + Clone + fmt::Debug + Send + 'static,
    V: Send + 'static,
    F: FnOnce(Result<Collected<K, V>, AggregateError<K>>) + Send + 'static,
{
    KeyedAggregator::new(final_handler, expected)
}

/// Completion handler for one keyed sub-operation
///
/// Not exactly-once by itself: a second call overwrites the recorded result
/// and counts again. Guard it with [`SubHandler::guarded`] when the
/// sub-operation is untrusted.
pub struct SubHandler<K, V> {
    key: K,
    state: Arc<Mutex<FanIn<K, V>>>,
}

impl<K: Clone, V> Clone for SubHandler<K, V> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            state: Arc::clone(&self.state),
        }
    }
}

impl<K, V> SubHandler<K, V>
where
    K: Eq + Hash + Clone + fmt::Debug + Send + 'static,
    V: Send + 'static,
{
    pub fn key(&self) -> &K {
        &self.key
    }

    /// Record this key's result
    pub fn call(&self, value: V) {
        let completed = {
            let mut fanin = self.state.lock();
            if fanin.final_handler.is_none() {
                debug!(key = ?self.key, "sub-result after aggregation completed dropped");
                return;
            }

            if let Some(Some(_)) = fanin.results.insert(self.key.clone(), Some(value)) {
                warn!(key = ?self.key, "sub-handler invoked more than once, result overwritten");
            }
            fanin.remaining = fanin.remaining.saturating_sub(1);
            if fanin.remaining > 0 {
                return;
            }

            let collected: Collected<K, V> = fanin
                .results
                .drain()
                .filter_map(|(key, value)| value.map(|value| (key, value)))
                .collect();
            fanin.final_handler.take().map(|handler| (handler, collected))
        };

        if let Some((handler, collected)) = completed {
            debug!(results = collected.len(), "aggregation completed");
            handler(Ok(collected));
        }
    }

    /// Convert into a plain closure, e.g. for [`super::guard`]
    pub fn into_fn(self) -> impl Fn(V) + Clone + Send + 'static {
        move |value| self.call(value)
    }

    /// Wrap this sub-handler in a completion guard
    #[track_caller]
    pub fn guarded(self, deadline: Deadline, config: &GuardConfig) -> GuardResult<CompletionGuard<V>>
    where
        V: TimeoutOutcome,
    {
        CompletionGuard::new(move |value| self.call(value), deadline, config)
    }
}
