use std::fmt;

use thiserror::Error;

/// Errors returned by [`BlockPool`][crate::BlockPool] operations.
///
/// Neither error is fatal: the pool remains fully usable after reporting one.
#[derive(Clone, Copy, Debug, Eq, Error, PartialEq)]
#[non_exhaustive]
pub enum Error {
    /// Every block in the pool is currently issued.
    ///
    /// The pool never grows, so the request can only succeed after some block is released.
    #[error("out of memory: all {block_count} blocks in the pool are issued")]
    OutOfMemory {
        /// Total number of blocks in the pool.
        block_count: usize,
    },

    /// The handle does not refer to a block that this pool currently has issued to it.
    ///
    /// Releases through exclusive handles report a foreign pool as [`ForeignBlock`] instead,
    /// which hands the handle back. It converts into this variant.
    ///
    /// The pool state is left unchanged.
    #[error("cannot release block {index}: {problem}")]
    InvalidRelease {
        /// Index of the block the handle referred to.
        index: usize,

        /// Why the release was rejected.
        problem: ReleaseProblem,
    },
}

/// The reason a release was rejected with [`Error::InvalidRelease`].
#[derive(Clone, Copy, Debug, Eq, Error, PartialEq)]
#[non_exhaustive]
pub enum ReleaseProblem {
    /// The handle was issued by a different pool.
    #[error("the handle was issued by a different pool")]
    ForeignPool,

    /// The block is not issued, typically because it was already released.
    #[error("the block is not issued")]
    NotIssued,

    /// The block was released and issued again since this handle was created.
    #[error("the handle is stale, the block has been reissued since")]
    StaleHandle,
}

/// An exclusive handle was released into a pool that did not issue it.
///
/// The block is still issued by its own pool. The handle is returned unchanged, so the caller
/// can release it into the right pool with [`into_block()`](Self::into_block).
///
/// Converts into [`Error::InvalidRelease`] with [`ReleaseProblem::ForeignPool`], which drops
/// the handle and leaves its block issued.
///
/// # Example
///
/// ```rust
/// use block_pool::BlockPool;
/// use new_zealand::nz;
///
/// let home = BlockPool::new(nz!(8), nz!(1));
/// let other = BlockPool::new(nz!(8), nz!(1));
///
/// let block = home.acquire().unwrap();
///
/// let rejected = other.release(block).unwrap_err();
/// home.release(rejected.into_block()).unwrap();
///
/// assert!(home.is_empty());
/// ```
#[derive(Error)]
#[error("cannot release block {index}: the handle was issued by a different pool")]
pub struct ForeignBlock<B> {
    block: B,
    index: usize,
}

impl<B> ForeignBlock<B> {
    #[must_use]
    pub(crate) fn new(block: B, index: usize) -> Self {
        Self { block, index }
    }

    /// Index of the block within the pool that issued it.
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Returns the rejected handle.
    #[must_use]
    pub fn into_block(self) -> B {
        self.block
    }
}

// The handle may wrap a value that is not `Debug`.
impl<B> fmt::Debug for ForeignBlock<B> {
    #[cfg_attr(test, mutants::skip)] // We have no API contract to test here.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForeignBlock")
            .field("index", &self.index)
            .finish_non_exhaustive()
    }
}

impl<B> From<ForeignBlock<B>> for Error {
    fn from(value: ForeignBlock<B>) -> Self {
        Self::InvalidRelease {
            index: value.index,
            problem: ReleaseProblem::ForeignPool,
        }
    }
}

/// A specialized `Result` type for block pool operations, returning the crate's
/// [`Error`] type as the error value.
pub(crate) type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use std::fmt::Debug;

    use static_assertions::assert_impl_all;

    use super::*;

    assert_impl_all!(Error: Send, Sync, Debug, Copy);
    assert_impl_all!(ReleaseProblem: Send, Sync, Debug, Copy);

    #[test]
    fn out_of_memory_mentions_block_count() {
        let error = Error::OutOfMemory { block_count: 10 };

        assert_eq!(
            error.to_string(),
            "out of memory: all 10 blocks in the pool are issued"
        );
    }

    #[test]
    fn invalid_release_includes_problem() {
        let error = Error::InvalidRelease {
            index: 3,
            problem: ReleaseProblem::NotIssued,
        };

        assert_eq!(
            error.to_string(),
            "cannot release block 3: the block is not issued"
        );

        let result: Result<()> = Err(error);
        assert!(result.is_err());
    }

    #[test]
    fn foreign_block_converts_to_invalid_release() {
        let foreign = ForeignBlock::new("handle", 5);

        assert_eq!(
            foreign.to_string(),
            "cannot release block 5: the handle was issued by a different pool"
        );
        assert_eq!(
            Error::from(foreign),
            Error::InvalidRelease {
                index: 5,
                problem: ReleaseProblem::ForeignPool,
            }
        );
    }

    #[test]
    fn foreign_block_returns_handle() {
        let foreign = ForeignBlock::new(vec![1, 2, 3], 0);

        assert_eq!(foreign.index(), 0);
        assert_eq!(foreign.into_block(), vec![1, 2, 3]);
    }
}
