//! Byte Buffer Pool
//! 
//! The pool is handed to each bearer at construction. Every SDU queued for
//! transmission and every segment buffered for reassembly holds a
//! [`PoolLease`] for its bytes; dropping the lease gives the memory back, so
//! releasing a bearer returns everything it held.

use crate::InterfaceError;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};

/// Default number of segments in a [`SegmentPool`]
pub const DEFAULT_SEGMENT_POOL_SIZE: usize = 16384;

/// Default size of one pool segment in bytes
pub const DEFAULT_SEGMENT_SIZE: usize = 1024;

/// Accounting interface of a byte storage pool
pub trait BufferPool: Send + Sync + fmt::Debug {
    /// Try to reserve room for `bytes` bytes. Returns false when the pool is exhausted.
    fn try_acquire(&self, bytes: usize) -> bool;
    
    /// Give back a reservation previously obtained with `try_acquire`
    fn release(&self, bytes: usize);
    
    /// Bytes of capacity currently reserved
    fn bytes_in_use(&self) -> usize;
    
    /// Bytes of capacity still available
    fn bytes_available(&self) -> usize;
}

/// Pool of fixed-size memory segments.
///
/// A reservation of `n` bytes consumes `ceil(n / segment_size)` segments.
pub struct SegmentPool {
    nof_segments: usize,
    segment_size: usize,
    used_segments: AtomicUsize,
}

impl SegmentPool {
    /// Create a pool of `nof_segments` segments of `segment_size` bytes each
    pub fn new(nof_segments: usize, segment_size: usize) -> Result<Self, InterfaceError> {
        if segment_size == 0 {
            return Err(InterfaceError::InvalidConfig(
                "segment size must be non-zero".to_string()
            ));
        }
        
        debug!("Creating segment pool: {} segments of {} bytes", nof_segments, segment_size);
        
        Ok(Self {
            nof_segments,
            segment_size,
            used_segments: AtomicUsize::new(0),
        })
    }
    
    /// Number of segments needed to hold `bytes` bytes
    fn segments_for(&self, bytes: usize) -> usize {
        bytes.div_ceil(self.segment_size)
    }
    
    /// Number of segments currently reserved
    pub fn used_segments(&self) -> usize {
        self.used_segments.load(Ordering::Acquire)
    }
}

impl Default for SegmentPool {
    fn default() -> Self {
        Self {
            nof_segments: DEFAULT_SEGMENT_POOL_SIZE,
            segment_size: DEFAULT_SEGMENT_SIZE,
            used_segments: AtomicUsize::new(0),
        }
    }
}

impl BufferPool for SegmentPool {
    fn try_acquire(&self, bytes: usize) -> bool {
        let needed = self.segments_for(bytes);
        let result = self.used_segments.fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
            let total = used.checked_add(needed)?;
            (total <= self.nof_segments).then_some(total)
        });
        
        match result {
            Ok(used) => {
                trace!("Pool acquire: {} bytes -> {} segments ({} in use)", bytes, needed, used + needed);
                true
            }
            Err(used) => {
                debug!("Pool exhausted: {} segments requested, {} of {} in use",
                       needed, used, self.nof_segments);
                false
            }
        }
    }
    
    fn release(&self, bytes: usize) {
        let freed = self.segments_for(bytes);
        let _ = self.used_segments.fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
            Some(used.saturating_sub(freed))
        });
    }
    
    fn bytes_in_use(&self) -> usize {
        self.used_segments() * self.segment_size
    }
    
    fn bytes_available(&self) -> usize {
        self.nof_segments.saturating_sub(self.used_segments()) * self.segment_size
    }
}

impl fmt::Debug for SegmentPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SegmentPool")
            .field("nof_segments", &self.nof_segments)
            .field("segment_size", &self.segment_size)
            .field("used_segments", &self.used_segments())
            .finish()
    }
}

/// Pool without a capacity limit; only counts what is in use
#[derive(Debug, Default)]
pub struct UnboundedPool {
    in_use: AtomicUsize,
}

impl UnboundedPool {
    /// Create a new unbounded pool
    pub fn new() -> Self {
        Self::default()
    }
}

impl BufferPool for UnboundedPool {
    fn try_acquire(&self, bytes: usize) -> bool {
        self.in_use.fetch_add(bytes, Ordering::AcqRel);
        true
    }
    
    fn release(&self, bytes: usize) {
        let _ = self.in_use.fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
            Some(used.saturating_sub(bytes))
        });
    }
    
    fn bytes_in_use(&self) -> usize {
        self.in_use.load(Ordering::Acquire)
    }
    
    fn bytes_available(&self) -> usize {
        usize::MAX
    }
}

/// Shared handle to a pool, as injected into bearers
pub type SharedPool = Arc<dyn BufferPool>;

/// Reservation of pool capacity, returned to the pool on drop
pub struct PoolLease {
    pool: SharedPool,
    bytes: usize,
}

impl PoolLease {
    /// Reserve `bytes` bytes from `pool`
    pub fn acquire(pool: &SharedPool, bytes: usize) -> Result<Self, InterfaceError> {
        if pool.try_acquire(bytes) {
            Ok(Self {
                pool: Arc::clone(pool),
                bytes,
            })
        } else {
            Err(InterfaceError::PoolExhausted {
                requested: bytes,
                available: pool.bytes_available(),
            })
        }
    }
    
    /// Number of bytes held by this lease
    pub fn bytes(&self) -> usize {
        self.bytes
    }
}

impl Drop for PoolLease {
    fn drop(&mut self) {
        self.pool.release(self.bytes);
    }
}

impl fmt::Debug for PoolLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolLease").field("bytes", &self.bytes).finish()
    }
}
