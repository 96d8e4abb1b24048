use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::models::Turn;

/// Decides which turns survive once a history grows.
pub trait EvictionPolicy: Send + Sync {
    /// Trim `turns` in place. Implementations must keep the relative order of
    /// whatever they retain.
    fn enforce(&self, turns: &mut Vec<Turn>);
}

/// Keep the newest `n` turns, dropping from the front.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeepLast(pub usize);

impl Default for KeepLast {
    fn default() -> Self {
        KeepLast(20)
    }
}

impl EvictionPolicy for KeepLast {
    fn enforce(&self, turns: &mut Vec<Turn>) {
        if turns.len() > self.0 {
            let excess = turns.len() - self.0;
            turns.drain(..excess);
        }
    }
}

type Entry = Arc<Mutex<Vec<Turn>>>;

fn guard<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    // A panic while holding a history lock cannot leave a Vec<Turn>
    // half-written, so the data is still usable.
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Recent context per user, kept in process memory only.
///
/// Every mutation locks just the one user's entry, and no lock is held
/// across an `.await`, so concurrent turns for the same user interleave at
/// whole-append granularity and never lose or reorder each other's turns.
pub struct WorkingHistoryStore {
    entries: Mutex<HashMap<String, Entry>>,
    policy: Arc<dyn EvictionPolicy>,
}

impl Default for WorkingHistoryStore {
    fn default() -> Self {
        Self::new(Arc::new(KeepLast::default()))
    }
}

impl WorkingHistoryStore {
    pub fn new(policy: Arc<dyn EvictionPolicy>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            policy,
        }
    }

    pub fn with_limit(max_turns: usize) -> Self {
        Self::new(Arc::new(KeepLast(max_turns)))
    }

    fn entry(&self, user_id: &str) -> Entry {
        let mut entries = guard(&self.entries);
        entries
            .entry(user_id.to_string())
            .or_insert_with(|| {
                tracing::debug!("Starting working history for user {}", user_id);
                Arc::new(Mutex::new(Vec::new()))
            })
            .clone()
    }

    fn existing(&self, user_id: &str) -> Option<Entry> {
        guard(&self.entries).get(user_id).cloned()
    }

    /// Append a turn, apply the eviction policy, and return a snapshot of the
    /// resulting history.
    pub fn append(&self, user_id: &str, turn: Turn) -> Vec<Turn> {
        let entry = self.entry(user_id);
        let mut turns = guard(&entry);
        turns.push(turn);
        let before = turns.len();
        self.policy.enforce(&mut turns);
        if turns.len() < before {
            tracing::debug!(
                "Trimmed working history for user {} to {} turns",
                user_id,
                turns.len()
            );
        }
        turns.clone()
    }

    pub fn snapshot(&self, user_id: &str) -> Vec<Turn> {
        self.existing(user_id)
            .map(|entry| guard(&entry).clone())
            .unwrap_or_default()
    }

    pub fn len(&self, user_id: &str) -> usize {
        self.existing(user_id)
            .map(|entry| guard(&entry).len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self, user_id: &str) -> bool {
        self.len(user_id) == 0
    }

    /// Drop a user's history entry. A turn still in flight for that user
    /// appends to a fresh entry, so only turns that already landed are gone.
    pub fn clear(&self, user_id: &str) {
        let removed = guard(&self.entries).remove(user_id);
        if let Some(entry) = removed {
            guard(&entry).clear();
            tracing::info!("Working history cleared for user {}", user_id);
        }
    }

    /// Number of users with a history entry.
    pub fn user_count(&self) -> usize {
        guard(&self.entries).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Emotion, Role};

    fn exchange(store: &WorkingHistoryStore, user: &str, n: usize) {
        store.append(user, Turn::user(format!("question {}", n)));
        store.append(user, Turn::assistant(format!("answer {}", n), Emotion::Neutral));
    }

    #[test]
    fn test_created_lazily() {
        let store = WorkingHistoryStore::default();
        assert_eq!(store.user_count(), 0);
        assert!(store.snapshot("u1").is_empty());
        assert_eq!(store.user_count(), 0);

        let snapshot = store.append("u1", Turn::user("hello"));
        assert_eq!(snapshot.len(), 1);
        assert_eq!(store.user_count(), 1);
    }

    #[test]
    fn test_bound_holds_after_every_append() {
        let store = WorkingHistoryStore::default();
        for n in 1..=15 {
            exchange(&store, "u1", n);
            assert!(store.len("u1") <= 20);
        }
        assert_eq!(store.len("u1"), 20);
    }

    #[test]
    fn test_eviction_keeps_most_recent_in_order() {
        let store = WorkingHistoryStore::default();
        for n in 1..=11 {
            exchange(&store, "u1", n);
        }

        let turns = store.snapshot("u1");
        assert_eq!(turns.len(), 20);
        for (i, pair) in turns.chunks(2).enumerate() {
            let n = i + 2;
            assert_eq!(pair[0].role, Role::User);
            assert_eq!(pair[0].content, format!("question {}", n));
            assert_eq!(pair[1].role, Role::Assistant);
            assert_eq!(pair[1].content, format!("answer {}", n));
        }
    }

    #[test]
    fn test_users_are_isolated() {
        let store = WorkingHistoryStore::default();
        exchange(&store, "u1", 1);
        exchange(&store, "u2", 1);
        store.clear("u1");
        assert!(store.is_empty("u1"));
        assert_eq!(store.len("u2"), 2);
    }

    #[test]
    fn test_clear_releases_entry() {
        let store = WorkingHistoryStore::default();
        for n in 0..100 {
            let guest = format!("guest-{}", n);
            exchange(&store, &guest, 1);
            store.clear(&guest);
        }
        assert_eq!(store.user_count(), 0);

        store.append("guest-0", Turn::user("back again"));
        assert_eq!(store.len("guest-0"), 1);
        assert_eq!(store.user_count(), 1);
    }

    #[test]
    fn test_clear_unknown_user_is_noop() {
        let store = WorkingHistoryStore::default();
        store.clear("nobody");
        assert_eq!(store.user_count(), 0);
    }

    #[test]
    fn test_custom_policy() {
        struct KeepUserTurns;
        impl EvictionPolicy for KeepUserTurns {
            fn enforce(&self, turns: &mut Vec<Turn>) {
                turns.retain(|t| t.role == Role::User);
            }
        }

        let store = WorkingHistoryStore::new(Arc::new(KeepUserTurns));
        exchange(&store, "u1", 1);
        exchange(&store, "u1", 2);
        let contents: Vec<String> = store.snapshot("u1").into_iter().map(|t| t.content).collect();
        assert_eq!(contents, vec!["question 1", "question 2"]);
    }

    #[test]
    fn test_concurrent_appends_are_not_lost() {
        let store = Arc::new(WorkingHistoryStore::with_limit(1000));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for n in 0..50 {
                        store.append("shared", Turn::user(format!("{}-{}", t, n)));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let turns = store.snapshot("shared");
        assert_eq!(turns.len(), 400);
        for t in 0..8 {
            let mine: Vec<usize> = turns
                .iter()
                .filter_map(|turn| {
                    let (owner, n) = turn.content.split_once('-')?;
                    (owner == t.to_string()).then(|| n.parse().ok())?
                })
                .collect();
            assert_eq!(mine, (0..50).collect::<Vec<_>>());
        }
    }
}
