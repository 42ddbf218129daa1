use std::collections::VecDeque;

/// Bounded FIFO used for amplitude, Doppler, RSSI, and distance history.
///
/// Capacity is enforced before growth: once full, the oldest sample is
/// evicted so the queue never exceeds its limit even transiently.
#[derive(Debug, Clone)]
pub struct SampleQueue<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T> SampleQueue<T> {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            items: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    pub fn push(&mut self, item: T) {
        while self.items.len() >= self.capacity.max(1) {
            self.items.pop_front();
        }
        self.items.push_back(item);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn latest(&self) -> Option<&T> {
        self.items.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    /// Last `n` items in arrival order (fewer if the queue is shorter).
    pub fn window(&self, n: usize) -> Vec<&T> {
        let skip = self.items.len().saturating_sub(n);
        self.items.iter().skip(skip).collect()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Shrinks from the front if the new capacity is smaller.
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity;
        while self.items.len() > self.capacity.max(1) {
            self.items.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overflow_evicts_oldest_first() {
        let mut queue = SampleQueue::with_capacity(3);
        for i in 0..4 {
            queue.push(i);
        }
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.iter().copied().collect::<Vec<_>>(), vec![1, 2, 3]);
    }

    #[test]
    fn clear_is_idempotent() {
        let mut queue = SampleQueue::with_capacity(4);
        queue.push(1);
        queue.push(2);
        queue.clear();
        assert!(queue.is_empty());
        queue.clear();
        assert!(queue.is_empty());
    }

    #[test]
    fn window_returns_most_recent_in_order() {
        let mut queue = SampleQueue::with_capacity(10);
        for i in 0..5 {
            queue.push(i);
        }
        let window: Vec<i32> = queue.window(3).into_iter().copied().collect();
        assert_eq!(window, vec![2, 3, 4]);
        assert_eq!(queue.window(99).len(), 5);
    }

    #[test]
    fn shrinking_capacity_drops_oldest() {
        let mut queue = SampleQueue::with_capacity(5);
        for i in 0..5 {
            queue.push(i);
        }
        queue.set_capacity(2);
        assert_eq!(queue.iter().copied().collect::<Vec<_>>(), vec![3, 4]);
    }
}
