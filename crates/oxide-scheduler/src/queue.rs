//! In-process schedule work queue.

use async_trait::async_trait;
use oxide_core::Result;
use oxide_core::ports::WorkQueue;
use oxide_core::schedule::ScheduleQueueItem;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use tokio::sync::Mutex;

/// A queued schedule with its due-time score.
#[derive(Debug, Clone, PartialEq, Eq)]
struct QueueEntry {
    score: i64,
    item: ScheduleQueueItem,
}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Lowest score first, then item name for a stable order
        other
            .score
            .cmp(&self.score)
            .then_with(|| other.item.cmp(&self.item))
    }
}

#[derive(Default)]
struct QueueState {
    heap: BinaryHeap<QueueEntry>,
    scores: HashMap<ScheduleQueueItem, i64>,
}

impl QueueState {
    fn is_live(&self, entry: &QueueEntry) -> bool {
        self.scores.get(&entry.item) == Some(&entry.score)
    }
}

/// Work queue for a single scheduler process.
///
/// Replaced and removed entries stay in the heap and are discarded when they
/// reach the top.
#[derive(Default)]
pub struct ScheduleQueue {
    state: Mutex<QueueState>,
}

impl ScheduleQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Score of a queued item.
    pub async fn score(&self, item: &ScheduleQueueItem) -> Option<i64> {
        self.state.lock().await.scores.get(item).copied()
    }
}

#[async_trait]
impl WorkQueue for ScheduleQueue {
    async fn push(&self, item: &ScheduleQueueItem, score: i64) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.scores.insert(item.clone(), score) == Some(score) {
            return Ok(());
        }
        state.heap.push(QueueEntry {
            score,
            item: item.clone(),
        });
        Ok(())
    }

    async fn pop_lowest(&self, max_score: i64) -> Result<Option<ScheduleQueueItem>> {
        let mut state = self.state.lock().await;
        loop {
            let (live, score) = match state.heap.peek() {
                Some(top) => (state.is_live(top), top.score),
                None => return Ok(None),
            };
            if !live {
                state.heap.pop();
                continue;
            }
            if score > max_score {
                return Ok(None);
            }
            let Some(entry) = state.heap.pop() else {
                return Ok(None);
            };
            state.scores.remove(&entry.item);
            return Ok(Some(entry.item));
        }
    }

    async fn remove(&self, item: &ScheduleQueueItem) -> Result<()> {
        self.state.lock().await.scores.remove(item);
        Ok(())
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.state.lock().await.scores.len())
    }
}
