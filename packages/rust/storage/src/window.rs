//! In-memory recency window.

use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::DedupStore;

/// Remembers the last `capacity` admitted ids. Lost on restart.
#[derive(Debug)]
pub struct RecentWindow {
    capacity: usize,
    inner: Mutex<WindowState>,
}

#[derive(Debug, Default)]
struct WindowState {
    order: VecDeque<String>,
    seen: HashSet<String>,
}

impl RecentWindow {
    /// Create a window holding at most `capacity` ids (minimum 1).
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(WindowState::default()),
        }
    }

    /// Number of ids currently remembered.
    pub fn len(&self) -> usize {
        self.lock().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, WindowState> {
        // poisoned state is still a valid window
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl DedupStore for RecentWindow {
    async fn admit(&self, article_id: &str) -> bool {
        let mut state = self.lock();
        if state.seen.contains(article_id) {
            return false;
        }

        state.order.push_back(article_id.to_string());
        state.seen.insert(article_id.to_string());

        while state.order.len() > self.capacity {
            if let Some(evicted) = state.order.pop_front() {
                state.seen.remove(&evicted);
            }
        }
        true
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
