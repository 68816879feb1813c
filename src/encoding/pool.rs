//! Checkout/return pools for reusable buffers and compressor state.
//!
//! A [`Pool`] hands out exclusive [`Pooled`] guards. The guard derefs to the
//! pooled value and puts it back when dropped, so every exit path (including
//! `?` returns) releases the unit. Values are reset before they re-enter the
//! idle list, which means a checkout never observes state from a previous
//! caller.
//!
//! Pools are plain objects owned by whoever constructs them; there is no
//! process-wide pool.
//!
//! # Examples
//!
//! ```
//! use docsearch_http::encoding::BufferPool;
//!
//! let pool = BufferPool::new();
//! {
//!     let mut buf = pool.get();
//!     buf.extend_from_slice(b"scratch");
//! }
//! // returned and truncated
//! assert_eq!(pool.idle(), 1);
//! assert!(pool.get().is_empty());
//! ```

use parking_lot::Mutex;
use std::fmt;
use std::ops::{Deref, DerefMut};

/// Idle items kept by default.
pub const DEFAULT_MAX_IDLE: usize = 64;

/// Buffers whose capacity grew beyond this are dropped instead of cached.
pub const MAX_POOLED_BUFFER_CAPACITY: usize = 1024 * 1024;

/// Initial capacity of freshly created pooled buffers.
const BUFFER_INITIAL_CAPACITY: usize = 8 * 1024;

type Factory<T> = Box<dyn Fn() -> T + Send + Sync>;
type Recycle<T> = Box<dyn Fn(&mut T) -> bool + Send + Sync>;

/// Thread-safe pool of reusable values.
pub struct Pool<T> {
    idle: Mutex<Vec<T>>,
    create: Factory<T>,
    recycle: Recycle<T>,
    max_idle: usize,
}

impl<T> Pool<T> {
    /// Create a pool.
    ///
    /// `create` builds a new value when the pool is empty. `recycle` resets a
    /// returned value and reports whether it may be kept; returning `false`
    /// drops the value instead.
    pub fn with_factory<C, R>(create: C, recycle: R) -> Self
    where
        C: Fn() -> T + Send + Sync + 'static,
        R: Fn(&mut T) -> bool + Send + Sync + 'static,
    {
        Pool {
            idle: Mutex::new(Vec::new()),
            create: Box::new(create),
            recycle: Box::new(recycle),
            max_idle: DEFAULT_MAX_IDLE,
        }
    }

    /// Limit the number of idle values kept.
    #[must_use]
    pub fn with_max_idle(mut self, max_idle: usize) -> Self {
        self.max_idle = max_idle;
        self
    }

    /// Check out a value, creating one if none is idle.
    pub fn get(&self) -> Pooled<'_, T> {
        // release the lock before running the factory
        let idle = self.idle.lock().pop();
        let value = idle.unwrap_or_else(|| (self.create)());
        Pooled {
            value: Some(value),
            pool: self,
        }
    }

    /// Number of idle values.
    pub fn idle(&self) -> usize {
        self.idle.lock().len()
    }

    fn put(&self, mut value: T) {
        if !(self.recycle)(&mut value) {
            return;
        }
        let mut idle = self.idle.lock();
        if idle.len() < self.max_idle {
            idle.push(value);
        }
    }
}

impl<T> fmt::Debug for Pool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("idle", &self.idle())
            .field("max_idle", &self.max_idle)
            .finish()
    }
}

/// Exclusive guard over a pooled value; returns it on drop.
pub struct Pooled<'a, T> {
    value: Option<T>,
    pool: &'a Pool<T>,
}

impl<T> Pooled<'_, T> {
    /// Take the value out of the pool for good.
    pub fn detach(mut self) -> T {
        // Only `Drop` clears the slot, and it cannot have run yet.
        match self.value.take() {
            Some(value) => value,
            None => unreachable!("pooled value taken twice"),
        }
    }
}

impl<T> Deref for Pooled<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        match &self.value {
            Some(value) => value,
            None => unreachable!("pooled value used after release"),
        }
    }
}

impl<T> DerefMut for Pooled<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        match &mut self.value {
            Some(value) => value,
            None => unreachable!("pooled value used after release"),
        }
    }
}

impl<T> Drop for Pooled<'_, T> {
    fn drop(&mut self) {
        if let Some(value) = self.value.take() {
            self.pool.put(value);
        }
    }
}

/// Pool of byte buffers shared by the encoder and request/response handling.
pub type BufferPool = Pool<Vec<u8>>;

impl BufferPool {
    /// Create a byte buffer pool, see [`Pool::buffers`].
    pub fn new() -> Self {
        Self::buffers()
    }

    /// Create a byte buffer pool.
    ///
    /// Returned buffers are truncated; buffers that grew past
    /// [`MAX_POOLED_BUFFER_CAPACITY`] are released to the allocator.
    pub fn buffers() -> Self {
        Pool::with_factory(
            || Vec::with_capacity(BUFFER_INITIAL_CAPACITY),
            |buf: &mut Vec<u8>| {
                buf.clear();
                buf.capacity() <= MAX_POOLED_BUFFER_CAPACITY
            },
        )
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::buffers()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_buffer_is_reset_on_return() {
        let pool = BufferPool::new();
        {
            let mut buf = pool.get();
            buf.extend_from_slice(b"hello");
        }
        assert_eq!(pool.idle(), 1);
        let buf = pool.get();
        assert!(buf.is_empty());
        assert!(buf.capacity() >= 5);
    }

    #[test]
    fn test_oversized_buffer_is_dropped() {
        let pool = BufferPool::new();
        {
            let mut buf = pool.get();
            buf.reserve(MAX_POOLED_BUFFER_CAPACITY * 2);
        }
        assert_eq!(pool.idle(), 0);
    }

    #[test]
    fn test_returned_on_error_path() {
        fn fails(pool: &BufferPool) -> std::result::Result<(), &'static str> {
            let mut buf = pool.get();
            buf.push(1);
            let failed: std::result::Result<(), &'static str> = Err("boom");
            failed?;
            Ok(())
        }

        let pool = BufferPool::new();
        assert!(fails(&pool).is_err());
        assert_eq!(pool.idle(), 1);
    }

    #[test]
    fn test_concurrent_checkouts_are_distinct() {
        let created = Arc::new(AtomicUsize::new(0));
        let counter = created.clone();
        let pool = Pool::with_factory(
            move || counter.fetch_add(1, Ordering::SeqCst),
            |_: &mut usize| true,
        );

        let a = pool.get();
        let b = pool.get();
        assert_ne!(*a, *b);
        drop(a);
        drop(b);
        assert_eq!(pool.idle(), 2);
        assert_eq!(created.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_factory_runs_without_holding_the_lock() {
        use std::sync::mpsc;
        use std::time::Duration;

        let (entered_tx, entered_rx) = mpsc::channel::<()>();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let entered_tx = Mutex::new(entered_tx);
        let release_rx = Mutex::new(release_rx);
        let pool = Arc::new(Pool::with_factory(
            move || {
                let _ = entered_tx.lock().send(());
                let _ = release_rx.lock().recv_timeout(Duration::from_secs(5));
                7u32
            },
            |_: &mut u32| true,
        ));

        let checkout = {
            let pool = pool.clone();
            std::thread::spawn(move || pool.get().detach())
        };
        entered_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(pool.idle.try_lock().is_some());
        release_tx.send(()).unwrap();
        assert_eq!(checkout.join().unwrap(), 7);
    }

    #[test]
    fn test_max_idle_is_respected() {
        let pool = BufferPool::new().with_max_idle(1);
        let a = pool.get();
        let b = pool.get();
        drop(a);
        drop(b);
        assert_eq!(pool.idle(), 1);
    }

    #[test]
    fn test_detach_keeps_value_out_of_pool() {
        let pool = BufferPool::new();
        let mut buf = pool.get();
        buf.extend_from_slice(b"owned");
        let owned = buf.detach();
        assert_eq!(owned, b"owned");
        assert_eq!(pool.idle(), 0);
    }
}
