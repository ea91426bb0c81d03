//! Bounded word queue shared between tasks and interrupt handlers.
//!
//! Storage is a fixed-capacity [`heapless::Deque`] behind a critical
//! section, so both ends may be used from interrupt context. Nothing blocks:
//! a full queue rejects the send, an empty queue yields `None`.

use core::cell::RefCell;

use critical_section::Mutex;
use heapless::Deque;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    #[error("queue is full")]
    Full,
}

/// FIFO of `u32` words with capacity `N`.
pub struct MessageQueue<const N: usize> {
    items: Mutex<RefCell<Deque<u32, N>>>,
}

impl<const N: usize> MessageQueue<N> {
    pub const fn new() -> Self {
        Self {
            items: Mutex::new(RefCell::new(Deque::new())),
        }
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    /// Append `word`, failing if the queue is full.
    pub fn send(&self, word: u32) -> Result<(), QueueError> {
        critical_section::with(|cs| {
            self.items
                .borrow_ref_mut(cs)
                .push_back(word)
                .map_err(|_| QueueError::Full)
        })
    }

    /// Take the oldest word.
    pub fn receive(&self) -> Option<u32> {
        critical_section::with(|cs| self.items.borrow_ref_mut(cs).pop_front())
    }

    pub fn len(&self) -> usize {
        critical_section::with(|cs| self.items.borrow_ref(cs).len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() == N
    }
}

impl<const N: usize> Default for MessageQueue<N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_slot_queue_rejects_second_send() {
        let queue = MessageQueue::<1>::new();
        assert!(queue.is_empty());
        queue.send(7).unwrap();
        assert!(queue.is_full());
        assert_eq!(queue.send(8), Err(QueueError::Full));
        assert_eq!(queue.receive(), Some(7));
        assert_eq!(queue.receive(), None);
    }

    #[test]
    fn preserves_fifo_order() {
        let queue = MessageQueue::<4>::new();
        for word in [1, 2, 3] {
            queue.send(word).unwrap();
        }
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.receive(), Some(1));
        assert_eq!(queue.receive(), Some(2));
        assert_eq!(queue.capacity(), 4);
    }
}
