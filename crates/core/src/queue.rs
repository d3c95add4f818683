use crossbeam_queue::ArrayQueue;
use parking_lot::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// Fixed-capacity FIFO of finished work with a blocking consumer side.
///
/// Producers never block: a full queue hands the value back. Consumers can
/// poll or wait with a deadline.
///
/// # Example
/// ```rust
/// use std::time::Duration;
/// use vdec_core::prelude::CompletionQueue;
///
/// let done = CompletionQueue::new(1);
/// assert!(done.push(1u8).is_ok());
/// assert_eq!(done.push(2), Err(2));
/// assert_eq!(done.pop_timeout(Duration::from_millis(10)), Some(1));
/// assert_eq!(done.pop(), None);
/// ```
pub struct CompletionQueue<T> {
    slots: ArrayQueue<T>,
    waiters: Mutex<()>,
    ready: Condvar,
}

impl<T> CompletionQueue<T> {
    /// A queue holding at most `capacity` values (at least one).
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: ArrayQueue::new(capacity.max(1)),
            waiters: Mutex::new(()),
            ready: Condvar::new(),
        }
    }

    /// Append `value`, or return it when the queue is full.
    pub fn push(&self, value: T) -> Result<(), T> {
        self.slots.push(value)?;
        // Taking the lock orders this wake-up after a waiter's empty check.
        let _guard = self.waiters.lock();
        self.ready.notify_all();
        Ok(())
    }

    pub fn pop(&self) -> Option<T> {
        self.slots.pop()
    }

    /// Wait up to `timeout` for a value.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<T> {
        let deadline = Instant::now() + timeout;
        let mut guard = self.waiters.lock();
        loop {
            if let Some(value) = self.slots.pop() {
                return Some(value);
            }
            if self.ready.wait_until(&mut guard, deadline).timed_out() {
                return self.slots.pop();
            }
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.slots.capacity()
    }
}

impl<T> std::fmt::Debug for CompletionQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionQueue")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{sync::Arc, thread};

    #[test]
    fn pop_timeout_wakes_on_push() {
        let queue = Arc::new(CompletionQueue::new(4));
        let producer = {
            let queue = queue.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                queue.push(7u32)
            })
        };
        assert_eq!(queue.pop_timeout(Duration::from_secs(5)), Some(7));
        assert_eq!(producer.join().expect("producer"), Ok(()));
    }

    #[test]
    fn full_queue_returns_the_value_and_keeps_order() {
        let queue = CompletionQueue::new(2);
        queue.push(1u32).expect("first");
        queue.push(2).expect("second");
        assert_eq!(queue.push(3), Err(3));
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.pop(), Some(1));
        assert_eq!(queue.pop(), Some(2));
        assert!(queue.is_empty());
        assert_eq!(queue.pop_timeout(Duration::from_millis(5)), None);
    }
}
