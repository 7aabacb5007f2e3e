//! SDU queue between the upper layer and a TX entity

use super::pdu::{PduError, MAX_SDU_SIZE};
use crate::LayerError;
use bytes::Bytes;
use interfaces::pool::{PoolLease, SharedPool};
use std::collections::VecDeque;

/// SDU waiting for its first transmission
#[derive(Debug)]
pub struct QueuedSdu {
    pub sdu: Bytes,
    pub lease: PoolLease,
}

/// Bounded FIFO of SDUs, each backed by a pool lease
#[derive(Debug)]
pub struct SduQueue {
    queue: VecDeque<QueuedSdu>,
    capacity: usize,
    pool: SharedPool,
    bytes: usize,
}

impl SduQueue {
    pub fn new(capacity: usize, pool: SharedPool) -> Self {
        Self {
            queue: VecDeque::new(),
            capacity,
            pool,
            bytes: 0,
        }
    }

    /// Append an SDU. Fails when the queue is full or the pool cannot hold
    /// the SDU; the caller keeps ownership of the decision to retry.
    pub fn push(&mut self, sdu: Bytes) -> Result<(), LayerError> {
        if sdu.is_empty() {
            return Err(PduError::EmptyPayload.into());
        }
        if sdu.len() > MAX_SDU_SIZE {
            return Err(PduError::SduTooLarge(sdu.len()).into());
        }
        if self.queue.len() >= self.capacity {
            return Err(LayerError::ResourceUnavailable(format!(
                "SDU queue full ({} SDUs)", self.capacity
            )));
        }
        let lease = PoolLease::acquire(&self.pool, sdu.len())
            .map_err(|e| LayerError::ResourceUnavailable(e.to_string()))?;

        self.bytes += sdu.len();
        self.queue.push_back(QueuedSdu { sdu, lease });
        Ok(())
    }

    pub fn pop(&mut self) -> Option<QueuedSdu> {
        let sdu = self.queue.pop_front()?;
        self.bytes -= sdu.sdu.len();
        Some(sdu)
    }

    /// Length of the SDU at the head
    pub fn front_len(&self) -> Option<usize> {
        self.queue.front().map(|q| q.sdu.len())
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Total payload bytes queued
    pub fn bytes(&self) -> usize {
        self.bytes
    }

    /// Drop every SDU, returning their leases
    pub fn clear(&mut self) {
        self.queue.clear();
        self.bytes = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use interfaces::pool::{BufferPool, SegmentPool, UnboundedPool};
    use std::sync::Arc;

    #[test]
    fn test_fifo_and_byte_count() {
        let mut queue = SduQueue::new(4, Arc::new(UnboundedPool::new()));
        queue.push(Bytes::from_static(b"one")).unwrap();
        queue.push(Bytes::from_static(b"three")).unwrap();
        assert_eq!(queue.bytes(), 8);
        assert_eq!(queue.front_len(), Some(3));
        assert_eq!(&queue.pop().unwrap().sdu[..], b"one");
        assert_eq!(queue.bytes(), 5);
    }

    #[test]
    fn test_capacity_and_size_limits() {
        let mut queue = SduQueue::new(1, Arc::new(UnboundedPool::new()));
        queue.push(Bytes::from_static(b"a")).unwrap();
        assert!(matches!(queue.push(Bytes::from_static(b"b")), Err(LayerError::ResourceUnavailable(_))));
        assert!(matches!(queue.push(Bytes::new()), Err(LayerError::InvalidPdu(PduError::EmptyPayload))));
        let jumbo = Bytes::from(vec![0u8; MAX_SDU_SIZE + 1]);
        assert!(matches!(queue.push(jumbo), Err(LayerError::InvalidPdu(PduError::SduTooLarge(_)))));
    }

    #[test]
    fn test_pool_exhaustion_and_release() {
        let pool: SharedPool = Arc::new(SegmentPool::new(2, 100).unwrap());
        let mut queue = SduQueue::new(16, Arc::clone(&pool));
        queue.push(Bytes::from(vec![1u8; 150])).unwrap();
        assert!(matches!(queue.push(Bytes::from(vec![1u8; 10])), Err(LayerError::ResourceUnavailable(_))));
        queue.clear();
        assert_eq!(pool.bytes_in_use(), 0);
    }
}
