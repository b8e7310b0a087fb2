use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// Debounce window applied to rapid settings edits.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(150);

/// Coalesces bursts of edits keyed by settings namespace.
///
/// Each staged edit replaces any pending edit under the same key and
/// pushes the key's deadline out by the window. Flushing commits the
/// edits whose deadline has passed, so a burst of edits to one key
/// yields exactly one commit.
pub struct CommitGate<T> {
    window: Duration,
    next_token: u64,
    pending: BTreeMap<String, Pending<T>>,
}

struct Pending<T> {
    token: u64,
    deadline: Instant,
    edit: T,
}

/// Outcome of staging an edit.
pub struct Staged {
    /// Token identifying this edit attempt.
    pub token: u64,
    /// Token of the pending edit this one replaced, if any.
    pub superseded: Option<u64>,
}

impl<T> CommitGate<T> {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            next_token: 0,
            pending: BTreeMap::new(),
        }
    }

    /// Stages an edit under `key`, replacing any pending edit there.
    pub fn stage(&mut self, key: &str, edit: T, now: Instant) -> Staged {
        self.next_token += 1;
        let token = self.next_token;
        let prior = self.pending.insert(
            key.to_string(),
            Pending {
                token,
                deadline: now + self.window,
                edit,
            },
        );
        Staged {
            token,
            superseded: prior.map(|pending| pending.token),
        }
    }

    /// True when `token` is still the pending edit for `key`.
    pub fn is_current(&self, key: &str, token: u64) -> bool {
        self.pending
            .get(key)
            .map_or(false, |pending| pending.token == token)
    }

    /// Removes and returns the edits whose deadline has passed, in the
    /// order they were staged.
    pub fn flush(&mut self, now: Instant) -> Vec<(String, u64, T)> {
        let mut due: Vec<(String, u64)> = self
            .pending
            .iter()
            .filter(|(_, pending)| pending.deadline <= now)
            .map(|(key, pending)| (key.clone(), pending.token))
            .collect();
        due.sort_by_key(|&(_, token)| token);
        due.into_iter()
            .filter_map(|(key, _)| {
                self.pending
                    .remove(&key)
                    .map(|pending| (key, pending.token, pending.edit))
            })
            .collect()
    }

    /// Drains every pending edit regardless of deadline, in the order
    /// they were staged.
    pub fn flush_all(&mut self) -> Vec<(String, u64, T)> {
        let mut drained: Vec<(String, u64, T)> = std::mem::take(&mut self.pending)
            .into_iter()
            .map(|(key, pending)| (key, pending.token, pending.edit))
            .collect();
        drained.sort_by_key(|entry| entry.1);
        drained
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}
