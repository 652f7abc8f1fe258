use std::fmt;
use std::marker::PhantomData;
use std::ptr::NonNull;

use crate::{BlockPool, SharedBlock, SlotTicket};

/// Exclusive handle to an issued block whose contents are untyped, uninitialized memory.
///
/// Returned by [`BlockPool::acquire()`]. The handle cannot be copied or cloned, and every
/// operation that gives the block back to the pool consumes it:
///
/// * [`BlockPool::release()`] returns the block to the free set.
/// * [`BlockPool::cast()`] turns it into a [`TypedBlock`][crate::TypedBlock], moving the right
///   to refer to the block over to the new handle.
/// * [`into_shared()`](Self::into_shared) turns it into a copyable [`SharedBlock`].
///
/// Using a handle after it has been released is therefore a compile error rather than a
/// runtime check.
///
/// Dropping the handle without releasing it does not release the block. The block stays issued
/// until the pool itself is dropped.
///
/// # Example
///
/// ```rust
/// use block_pool::BlockPool;
/// use new_zealand::nz;
///
/// let pool = BlockPool::new(nz!(16), nz!(4));
///
/// let block = pool.acquire().unwrap();
///
/// // SAFETY: The block is 16 bytes, we own it exclusively and u64 is suitably aligned.
/// unsafe {
///     block.ptr().cast::<u64>().write(0xfeed);
///     assert_eq!(block.ptr().cast::<u64>().read(), 0xfeed);
/// }
///
/// pool.release(block).unwrap();
/// // `block` has been moved and cannot be used again.
/// ```
///
/// Releasing the same handle twice does not compile:
///
/// ```compile_fail,E0382
/// use block_pool::BlockPool;
/// use new_zealand::nz;
///
/// let pool = BlockPool::new(nz!(16), nz!(4));
///
/// let block = pool.acquire().unwrap();
///
/// pool.release(block).unwrap();
/// pool.release(block).unwrap();
/// ```
///
/// Neither does using the untyped handle after casting it:
///
/// ```compile_fail,E0382
/// use block_pool::BlockPool;
/// use new_zealand::nz;
///
/// let pool = BlockPool::new(nz!(16), nz!(4));
///
/// let block = pool.acquire().unwrap();
/// let number = pool.cast::<u64>(block).write(5);
///
/// pool.release(block).unwrap();
/// # pool.release_typed(number).unwrap();
/// ```
#[must_use = "a block that is not released stays issued until the pool is dropped"]
pub struct RawBlock<'pool> {
    /// Ensures this handle can only be returned to the pool it came from.
    pub(crate) pool_id: u64,

    pub(crate) ticket: SlotTicket,

    pub(crate) ptr: NonNull<u8>,

    pub(crate) _pool: PhantomData<&'pool BlockPool>,
}

impl<'pool> RawBlock<'pool> {
    #[must_use]
    pub(crate) fn new(pool_id: u64, ticket: SlotTicket, ptr: NonNull<u8>) -> Self {
        Self {
            pool_id,
            ticket,
            ptr,
            _pool: PhantomData,
        }
    }

    /// Returns a pointer to the start of the block.
    ///
    /// The memory is uninitialized when the block is first acquired. The owner of the handle
    /// has exclusive access to the block's bytes for as long as it holds the handle.
    #[must_use]
    #[inline]
    pub fn ptr(&self) -> NonNull<u8> {
        self.ptr
    }

    /// Index of the block within the pool.
    #[must_use]
    #[inline]
    pub fn index(&self) -> usize {
        self.ticket.index()
    }

    /// Converts this exclusive handle into a copyable [`SharedBlock`].
    ///
    /// Copies of a shared handle can outlive a release of the block, so the pool validates
    /// every release made through one. See [`BlockPool::release_shared()`].
    ///
    /// # Example
    ///
    /// ```rust
    /// use block_pool::BlockPool;
    /// use new_zealand::nz;
    ///
    /// let pool = BlockPool::new(nz!(8), nz!(2));
    ///
    /// let shared = pool.acquire().unwrap().into_shared();
    /// let copy = shared;
    ///
    /// assert!(pool.release_shared(shared).is_ok());
    /// assert!(pool.release_shared(copy).is_err());
    /// ```
    #[inline]
    pub fn into_shared(self) -> SharedBlock<'pool> {
        SharedBlock::new(self.pool_id, self.ticket, self.ptr)
    }
}

impl fmt::Debug for RawBlock<'_> {
    #[cfg_attr(test, mutants::skip)] // We have no API contract to test here.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawBlock")
            .field("pool_id", &self.pool_id)
            .field("index", &self.ticket.index())
            .field("ptr", &self.ptr)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use new_zealand::nz;
    use static_assertions::assert_not_impl_any;

    use super::*;

    assert_not_impl_any!(RawBlock<'static>: Send, Sync, Clone, Copy);

    #[test]
    fn exposes_index_and_pointer() {
        let pool = BlockPool::new(nz!(8), nz!(3));

        let first = pool.acquire().unwrap();
        let second = pool.acquire().unwrap();

        assert_eq!(first.index(), 0);
        assert_eq!(second.index(), 1);
        assert_eq!(
            second.ptr().as_ptr() as usize - first.ptr().as_ptr() as usize,
            8
        );

        pool.release(first).unwrap();
        pool.release(second).unwrap();
    }

    #[test]
    fn into_shared_keeps_identity() {
        let pool = BlockPool::new(nz!(8), nz!(3));

        let block = pool.acquire().unwrap();
        let index = block.index();
        let ptr = block.ptr();

        let shared = block.into_shared();

        assert_eq!(shared.index(), index);
        assert_eq!(shared.ptr(), ptr);
        assert!(pool.is_issued(shared));

        pool.release_shared(shared).unwrap();
    }

    #[test]
    fn debug_output_names_type() {
        let pool = BlockPool::new(nz!(8), nz!(1));
        let block = pool.acquire().unwrap();

        let debug_output = format!("{block:?}");
        assert!(debug_output.contains("RawBlock"));
        assert!(debug_output.contains("index: 0"));

        pool.release(block).unwrap();
    }
}
