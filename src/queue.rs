use super::{
    errors::PoolError,
    result::PoolResult,
};
use crossbeam::channel::{
    self,
    Receiver,
    RecvTimeoutError,
    SendTimeoutError,
    Sender,
    TryRecvError,
};
use std::time::Duration;


/// Thread-safe FIFO queue shared between the pool, its workers and callers.
///
/// Both channel ends live in the same value, so the channel can never be
/// disconnected while a `WorkQueue` exists. Capacity `0` means unbounded.
#[derive(Debug)]
pub struct WorkQueue<T> {
    sender: Sender<T>,
    receiver: Receiver<T>,
    capacity: usize,
}

impl<T> Clone for WorkQueue<T> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            receiver: self.receiver.clone(),
            capacity: self.capacity,
        }
    }
}

impl<T> WorkQueue<T> {
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = if capacity == 0 {
            channel::unbounded()
        } else {
            channel::bounded(capacity)
        };
        Self { sender, receiver, capacity }
    }

    /// Blocks while a bounded queue is full
    pub fn put(&self, item: T) -> PoolResult<()> {
        self.sender.send(item).map_err(|_| PoolError::QueueClosed)
    }

    pub fn put_timeout(&self, item: T, timeout: Duration) -> PoolResult<()> {
        self.sender.send_timeout(item, timeout).map_err(|e| match e {
            SendTimeoutError::Timeout(_) => PoolError::Timeout,
            SendTimeoutError::Disconnected(_) => PoolError::QueueClosed,
        })
    }

    /// Blocks until an item is available
    pub fn get(&self) -> PoolResult<T> {
        self.receiver.recv().map_err(|_| PoolError::QueueClosed)
    }

    /// `Ok(None)` on timeout
    pub fn get_timeout(&self, timeout: Duration) -> PoolResult<Option<T>> {
        match self.receiver.recv_timeout(timeout) {
            Ok(item) => Ok(Some(item)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(PoolError::QueueClosed),
        }
    }

    pub fn try_get(&self) -> Option<T> {
        match self.receiver.try_recv() {
            Ok(item) => Some(item),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Everything currently queued, without blocking
    pub fn drain(&self) -> Vec<T> {
        self.receiver.try_iter().collect()
    }

    /// Advisory: may be stale as soon as it returns
    #[inline]
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> Option<usize> {
        if self.capacity == 0 {
            None
        } else {
            Some(self.capacity)
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_order() {
        let q = WorkQueue::new(0);
        for i in 0..5 {
            q.put(i).unwrap();
        }
        assert_eq!(q.len(), 5);
        assert_eq!(q.drain(), vec![0, 1, 2, 3, 4]);
        assert!(q.is_empty());
    }

    #[test]
    fn get_timeout_returns_none_when_empty() {
        let q: WorkQueue<u8> = WorkQueue::new(0);
        assert_eq!(q.get_timeout(Duration::from_millis(10)).unwrap(), None);
        assert_eq!(q.try_get(), None);
    }

    #[test]
    fn bounded_queue_times_out_when_full() {
        let q = WorkQueue::new(1);
        assert_eq!(q.capacity(), Some(1));
        q.put(1).unwrap();
        assert_eq!(q.put_timeout(2, Duration::from_millis(10)), Err(PoolError::Timeout));
        assert_eq!(q.get().unwrap(), 1);
    }

    #[test]
    fn clones_share_the_channel() {
        let q = WorkQueue::new(0);
        let other = q.clone();
        q.put("a").unwrap();
        assert_eq!(other.try_get(), Some("a"));
        assert_eq!(q.capacity(), None);
    }
}
