use std::time::Duration;
use tokio::time::Instant;

/// Bounded in-memory buffer of bid orders awaiting one bulk submission.
///
/// Not persisted: a crash loses whatever has not been flushed yet. The feed
/// redelivers those events or a chain watcher recreates the same triggers.
#[derive(Debug)]
pub struct BidEventsBatch<T> {
    entries: Vec<T>,
    max_size: usize,
    max_age: Duration,
    oldest: Option<Instant>,
}

impl<T> BidEventsBatch<T> {
    pub fn new(max_size: usize, max_age: Duration) -> Self {
        let max_size = max_size.max(1);
        Self {
            entries: Vec::with_capacity(max_size),
            max_size,
            max_age,
            oldest: None,
        }
    }

    /// Buffer one entry. Returns the whole batch once it reaches the size threshold.
    pub fn push(&mut self, entry: T) -> Option<Vec<T>> {
        if self.entries.is_empty() {
            self.oldest = Some(Instant::now());
        }
        self.entries.push(entry);

        if self.entries.len() >= self.max_size {
            return Some(self.drain());
        }
        None
    }

    /// The batch, if its oldest entry has waited longer than the age threshold
    pub fn take_if_stale(&mut self) -> Option<Vec<T>> {
        match self.oldest {
            Some(oldest) if oldest.elapsed() >= self.max_age => Some(self.drain()),
            _ => None,
        }
    }

    pub fn drain(&mut self) -> Vec<T> {
        self.oldest = None;
        std::mem::replace(&mut self.entries, Vec::with_capacity(self.max_size))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flushes_exactly_at_threshold() {
        let mut batch = BidEventsBatch::new(3, Duration::from_secs(60));

        assert!(batch.push(1).is_none());
        assert!(batch.push(2).is_none());
        assert_eq!(batch.len(), 2);

        assert_eq!(batch.push(3), Some(vec![1, 2, 3]));
        assert!(batch.is_empty());
        assert!(batch.push(4).is_none());
    }

    #[test]
    fn test_threshold_one_is_unbatched() {
        let mut batch = BidEventsBatch::new(1, Duration::from_secs(60));
        assert_eq!(batch.push("a"), Some(vec!["a"]));
        assert_eq!(batch.push("b"), Some(vec!["b"]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_batch_is_taken() {
        let mut batch = BidEventsBatch::new(10, Duration::from_millis(500));
        assert!(batch.take_if_stale().is_none());

        batch.push(1);
        tokio::time::advance(Duration::from_millis(200)).await;
        batch.push(2);
        assert!(batch.take_if_stale().is_none());

        tokio::time::advance(Duration::from_millis(300)).await;
        assert_eq!(batch.take_if_stale(), Some(vec![1, 2]));
        assert!(batch.take_if_stale().is_none());
    }
}
