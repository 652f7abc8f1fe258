/// Determines what happens to blocks that are still issued when the pool is dropped.
///
/// The pool never runs destructors of values left in issued blocks. Dropping the pool releases
/// the backing memory as a whole, so anything those values own (heap allocations, file handles)
/// is leaked unless the caller released every block beforehand.
///
/// # Examples
///
/// ```
/// use block_pool::{BlockPool, DropPolicy};
/// use new_zealand::nz;
///
/// let pool = BlockPool::builder()
///     .block_size(nz!(16))
///     .block_count(nz!(8))
///     .drop_policy(DropPolicy::MustNotLeakItems)
///     .build();
///
/// let block = pool.acquire().unwrap();
/// pool.release(block).unwrap();
///
/// // Dropping is fine - nothing is issued anymore.
/// drop(pool);
/// ```
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[non_exhaustive]
pub enum DropPolicy {
    /// Issued blocks are silently abandoned when the pool is dropped. This is the default.
    #[default]
    MayLeakItems,

    /// The pool will panic if any block is still issued when it is dropped.
    ///
    /// Useful for catching missing releases in code that owns values with meaningful
    /// destructors, since those destructors would otherwise never run.
    MustNotLeakItems,
}
