use std::num::NonZero;

use crate::{BlockPool, DropPolicy};

/// Builder for creating an instance of [`BlockPool`].
///
/// The block size and the block count are mandatory. Set the size either directly with
/// [`block_size()`](Self::block_size) or from a type with [`block_size_of()`](Self::block_size_of).
/// The [drop policy][DropPolicy] is optional.
///
/// If you do not need to customize the drop policy, [`BlockPool::new()`] is a shorter way to
/// create a pool.
///
/// # Examples
///
/// ```
/// use block_pool::BlockPool;
/// use new_zealand::nz;
///
/// let pool = BlockPool::builder()
///     .block_size(nz!(64))
///     .block_count(nz!(32))
///     .build();
///
/// assert_eq!(pool.block_size(), 64);
/// assert_eq!(pool.block_count(), 32);
/// ```
///
/// Sizing blocks after a type:
///
/// ```
/// use block_pool::BlockPool;
/// use new_zealand::nz;
///
/// let pool = BlockPool::builder()
///     .block_size_of::<u64>()
///     .block_count(nz!(100))
///     .build();
///
/// assert_eq!(pool.block_size(), 8);
/// ```
#[derive(Debug)]
#[must_use]
pub struct BlockPoolBuilder {
    block_size: Option<NonZero<usize>>,
    block_count: Option<NonZero<usize>>,
    drop_policy: DropPolicy,
}

impl BlockPoolBuilder {
    #[inline]
    pub(crate) fn new() -> Self {
        Self {
            block_size: None,
            block_count: None,
            drop_policy: DropPolicy::default(),
        }
    }

    /// Sets the size of each block in bytes.
    #[inline]
    pub fn block_size(mut self, block_size: NonZero<usize>) -> Self {
        self.block_size = Some(block_size);
        self
    }

    /// Sets the size of each block to the size of `T`.
    ///
    /// The resulting blocks are always suitably aligned for `T`, because the size of a type is
    /// a multiple of its alignment.
    ///
    /// # Panics
    ///
    /// Panics if `T` is a zero-sized type.
    #[inline]
    pub fn block_size_of<T>(mut self) -> Self {
        let block_size =
            NonZero::new(size_of::<T>()).expect("BlockPool must have non-zero block size");
        self.block_size = Some(block_size);
        self
    }

    /// Sets the number of blocks in the pool. The pool never grows beyond this.
    #[inline]
    pub fn block_count(mut self, block_count: NonZero<usize>) -> Self {
        self.block_count = Some(block_count);
        self
    }

    /// Sets the [drop policy][DropPolicy] for the pool. This governs how
    /// to treat blocks that are still issued when the pool is dropped.
    ///
    /// # Examples
    ///
    /// ```
    /// use block_pool::{BlockPool, DropPolicy};
    /// use new_zealand::nz;
    ///
    /// let pool = BlockPool::builder()
    ///     .block_size(nz!(8))
    ///     .block_count(nz!(4))
    ///     .drop_policy(DropPolicy::MustNotLeakItems)
    ///     .build();
    /// ```
    #[inline]
    pub fn drop_policy(mut self, policy: DropPolicy) -> Self {
        self.drop_policy = policy;
        self
    }

    /// Builds the block pool, allocating its backing memory.
    ///
    /// # Panics
    ///
    /// Panics if the block size or the block count has not been set, or if the total size of
    /// the pool does not fit in the address space.
    #[must_use]
    #[inline]
    pub fn build(self) -> BlockPool {
        let block_size = self.block_size.expect(
            "block size must be set using .block_size() or .block_size_of::<T>() before calling .build()",
        );
        let block_count = self
            .block_count
            .expect("block count must be set using .block_count() before calling .build()");

        BlockPool::new_inner(block_size, block_count, self.drop_policy)
    }
}

#[cfg(test)]
mod tests {
    use new_zealand::nz;
    use static_assertions::assert_impl_all;

    use super::*;

    assert_impl_all!(BlockPoolBuilder: Send, Sync, std::fmt::Debug);

    #[test]
    fn builder_new_creates_default_state() {
        let builder = BlockPoolBuilder::new();

        assert!(builder.block_size.is_none());
        assert!(builder.block_count.is_none());
        assert_eq!(builder.drop_policy, DropPolicy::default());
    }

    #[test]
    fn block_size_of_uses_type_size() {
        let builder = BlockPoolBuilder::new().block_size_of::<[u16; 5]>();

        assert_eq!(builder.block_size, Some(nz!(10)));
    }

    #[test]
    #[should_panic]
    fn block_size_of_zero_sized_type_panics() {
        _ = BlockPoolBuilder::new().block_size_of::<()>();
    }

    #[test]
    fn later_settings_override_earlier_ones() {
        let builder = BlockPoolBuilder::new()
            .block_size(nz!(4))
            .block_size_of::<u64>()
            .block_count(nz!(3))
            .block_count(nz!(7))
            .drop_policy(DropPolicy::MustNotLeakItems)
            .drop_policy(DropPolicy::MayLeakItems);

        assert_eq!(builder.block_size, Some(nz!(8)));
        assert_eq!(builder.block_count, Some(nz!(7)));
        assert_eq!(builder.drop_policy, DropPolicy::MayLeakItems);
    }

    #[test]
    fn build_applies_configuration() {
        let pool = BlockPoolBuilder::new()
            .block_size(nz!(24))
            .block_count(nz!(5))
            .build();

        assert_eq!(pool.block_size(), 24);
        assert_eq!(pool.block_align(), 8);
        assert_eq!(pool.block_count(), 5);
        assert_eq!(pool.free_count(), 5);
    }

    #[test]
    #[should_panic]
    fn build_without_block_size_panics() {
        _ = BlockPoolBuilder::new().block_count(nz!(3)).build();
    }

    #[test]
    #[should_panic]
    fn build_without_block_count_panics() {
        _ = BlockPoolBuilder::new().block_size(nz!(3)).build();
    }

    #[test]
    fn builder_can_move_between_threads() {
        let builder = BlockPoolBuilder::new()
            .block_size_of::<u64>()
            .block_count(nz!(2));

        let block_size = std::thread::spawn(move || builder.build().block_size())
            .join()
            .expect("thread completed successfully");

        assert_eq!(block_size, 8);
    }
}
