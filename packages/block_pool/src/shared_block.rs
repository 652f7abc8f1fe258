use std::marker::PhantomData;
use std::ptr::NonNull;

use crate::{BlockPool, SlotTicket};

/// Copyable handle to an untyped block, created from a [`RawBlock`][crate::RawBlock] via
/// [`into_shared()`](crate::RawBlock::into_shared).
///
/// Any number of copies may refer to the same block. This is the handle to use when the
/// ownership of a block cannot be expressed with a single binding, at the cost of the pool
/// checking every release at runtime: releasing through a copy after the block was already
/// released (a double release), or after it was released and issued again, is rejected with
/// [`Error::InvalidRelease`][crate::Error::InvalidRelease] and leaves the pool untouched.
///
/// Shared blocks only ever expose a raw pointer. Coordinating access to the bytes behind it
/// between copies is up to the caller.
///
/// # Example
///
/// ```rust
/// use block_pool::{BlockPool, Error, ReleaseProblem};
/// use new_zealand::nz;
///
/// let pool = BlockPool::new(nz!(4), nz!(10));
///
/// let block = pool.acquire().unwrap().into_shared();
/// let alias = block;
///
/// pool.release_shared(block).unwrap();
///
/// assert_eq!(
///     pool.release_shared(alias),
///     Err(Error::InvalidRelease {
///         index: alias.index(),
///         problem: ReleaseProblem::NotIssued,
///     })
/// );
/// ```
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SharedBlock<'pool> {
    /// Ensures this handle can only be returned to the pool it came from.
    pub(crate) pool_id: u64,

    pub(crate) ticket: SlotTicket,

    pub(crate) ptr: NonNull<u8>,

    pub(crate) _pool: PhantomData<&'pool BlockPool>,
}

impl SharedBlock<'_> {
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
    /// The pointer stays within the pool's memory for as long as the handle exists, but the
    /// block may have been released and reissued to someone else in the meantime. Check
    /// [`BlockPool::is_issued()`] if in doubt.
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
}

#[cfg(test)]
mod tests {
    use new_zealand::nz;
    use static_assertions::{assert_impl_all, assert_not_impl_any};

    use super::*;
    use crate::{Error, ReleaseProblem};

    assert_impl_all!(SharedBlock<'static>: Copy, Clone, std::fmt::Debug);
    assert_not_impl_any!(SharedBlock<'static>: Send, Sync);

    #[test]
    fn copies_compare_equal() {
        let pool = BlockPool::new(nz!(8), nz!(2));

        let shared = pool.acquire().unwrap().into_shared();
        let copy = shared;

        assert_eq!(shared, copy);

        pool.release_shared(copy).unwrap();
    }

    #[test]
    fn reissued_block_gets_distinct_handle() {
        let pool = BlockPool::new(nz!(8), nz!(1));

        let old = pool.acquire().unwrap().into_shared();
        pool.release_shared(old).unwrap();

        let new = pool.acquire().unwrap().into_shared();

        assert_eq!(old.index(), new.index());
        assert_eq!(old.ptr(), new.ptr());
        assert_ne!(old, new);

        assert!(!pool.is_issued(old));
        assert!(pool.is_issued(new));

        assert_eq!(
            pool.release_shared(old),
            Err(Error::InvalidRelease {
                index: 0,
                problem: ReleaseProblem::StaleHandle,
            })
        );
        assert_eq!(pool.issued_count(), 1);

        pool.release_shared(new).unwrap();
    }
}
