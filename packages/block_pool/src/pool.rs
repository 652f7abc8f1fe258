use std::any::type_name;
use std::cell::RefCell;
use std::mem::MaybeUninit;
use std::num::NonZero;
use std::ptr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

use scopeguard::ScopeGuard;
use tracing::{debug, trace};

use crate::error::Result;
use crate::{
    BlockPoolBuilder, BlockRegion, DropPolicy, Error, ForeignBlock, RawBlock, ReleaseProblem,
    SharedBlock, SlotTable, SlotTicket, TypedBlock,
};

/// Global counter for generating unique pool IDs.
static POOL_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Generates a unique pool ID.
fn generate_pool_id() -> u64 {
    POOL_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// A fixed-capacity pool of equal-sized memory blocks carved out of a single allocation.
///
/// The pool allocates `block_size * block_count` bytes once, when it is created, and never
/// allocates block memory again. Acquiring a block takes one from the free set, releasing
/// puts it back. The pool never grows: when every block is issued, acquiring fails with
/// [`Error::OutOfMemory`] until something is released.
///
/// # Block selection
///
/// The most recently released block is always the next one to be issued. Blocks that have never
/// been issued come after all released ones, in ascending index order, so a fresh pool hands out
/// block 0 first, then block 1 and so on. The order is fully deterministic.
///
/// # Handles
///
/// - [`RawBlock`]: exclusive handle to untyped, uninitialized memory.
/// - [`TypedBlock<T>`]: exclusive handle to a `T` constructed in the block, with direct access
///   to the value via [`std::ops::Deref`] and [`std::ops::DerefMut`].
/// - [`SharedBlock`]: copyable handle to untyped memory, validated on release.
///
/// Exclusive handles are consumed by the operations that end their block's issue, so releasing
/// twice or touching a value after releasing it does not compile. Every handle borrows the pool,
/// so the pool cannot be dropped while a handle is still around.
///
/// ```compile_fail,E0505
/// use block_pool::BlockPool;
/// use new_zealand::nz;
///
/// let pool = BlockPool::new(nz!(8), nz!(2));
///
/// let block = pool.acquire().unwrap();
///
/// // The handle still borrows the pool.
/// drop(pool);
///
/// let _ptr = block.ptr();
/// ```
///
/// # Alignment
///
/// Every block is aligned to the natural alignment of the block size: the largest power of two
/// that divides it. Typed operations panic if the type does not fit into a block, either
/// because it is too large or because it requires stricter alignment.
///
/// # Examples
///
/// ```rust
/// use block_pool::BlockPool;
/// use new_zealand::nz;
///
/// let pool = BlockPool::new(nz!(4), nz!(10));
///
/// let number = pool.acquire_typed(32_i32).unwrap();
/// assert_eq!(*number, 32);
/// assert_eq!(pool.issued_count(), 1);
///
/// pool.release_typed(number).unwrap();
/// assert!(pool.is_empty());
/// ```
///
/// # Thread safety
///
/// The pool is single-threaded. It is neither [`Send`] nor [`Sync`], and neither are its
/// handles.
#[derive(Debug)]
pub struct BlockPool {
    /// We need to uniquely identify each pool to ensure that handles are not returned to the
    /// wrong pool. A handle with a different pool ID is rejected on release.
    pool_id: u64,

    region: BlockRegion,

    /// Free/issued bookkeeping. Operations take `&self` because handles borrow the pool, so
    /// the table needs interior mutability. No borrow is held while user code runs.
    slots: RefCell<SlotTable>,

    drop_policy: DropPolicy,
}

impl BlockPool {
    /// Creates a pool of `block_count` blocks of `block_size` bytes each, with the default
    /// [drop policy][DropPolicy].
    ///
    /// Use [`builder()`](Self::builder) to customize the drop policy.
    ///
    /// # Panics
    ///
    /// Panics if the total size of the pool does not fit in the address space. Failure to
    /// allocate the memory is reported through [`std::alloc::handle_alloc_error`].
    ///
    /// # Example
    ///
    /// ```rust
    /// use block_pool::BlockPool;
    /// use new_zealand::nz;
    ///
    /// let pool = BlockPool::new(nz!(4), nz!(10));
    ///
    /// assert_eq!(pool.block_size(), 4);
    /// assert_eq!(pool.block_count(), 10);
    /// assert_eq!(pool.free_count(), 10);
    /// ```
    #[must_use]
    pub fn new(block_size: NonZero<usize>, block_count: NonZero<usize>) -> Self {
        Self::new_inner(block_size, block_count, DropPolicy::default())
    }

    /// Creates a builder for configuring and constructing a [`BlockPool`].
    #[inline]
    pub fn builder() -> BlockPoolBuilder {
        BlockPoolBuilder::new()
    }

    #[must_use]
    pub(crate) fn new_inner(
        block_size: NonZero<usize>,
        block_count: NonZero<usize>,
        drop_policy: DropPolicy,
    ) -> Self {
        let region = BlockRegion::new(block_size, block_count);
        let pool_id = generate_pool_id();

        debug!(
            pool_id,
            block_size = block_size.get(),
            block_count = block_count.get(),
            block_align = region.block_align(),
            "created block pool"
        );

        Self {
            pool_id,
            region,
            slots: RefCell::new(SlotTable::new(block_count)),
            drop_policy,
        }
    }

    /// Size of each block in bytes.
    #[must_use]
    #[inline]
    pub fn block_size(&self) -> usize {
        self.region.block_size().get()
    }

    /// Alignment guaranteed for the start of every block.
    #[must_use]
    #[inline]
    pub fn block_align(&self) -> usize {
        self.region.block_align()
    }

    /// Total number of blocks in the pool, issued or not.
    #[must_use]
    #[inline]
    pub fn block_count(&self) -> usize {
        self.region.block_count().get()
    }

    /// Number of blocks currently issued.
    #[must_use]
    #[inline]
    pub fn issued_count(&self) -> usize {
        self.slots.borrow().issued_count()
    }

    /// Number of blocks currently available. Always `block_count() - issued_count()`.
    #[must_use]
    #[inline]
    pub fn free_count(&self) -> usize {
        self.slots.borrow().free_count()
    }

    /// Whether no block is issued.
    #[must_use]
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.issued_count() == 0
    }

    /// Whether every block is issued, meaning the next acquire will fail.
    #[must_use]
    #[inline]
    pub fn is_exhausted(&self) -> bool {
        self.slots.borrow().is_exhausted()
    }

    /// Acquires a block of uninitialized memory.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfMemory`] if every block is already issued.
    ///
    /// # Example
    ///
    /// ```rust
    /// use block_pool::{BlockPool, Error};
    /// use new_zealand::nz;
    ///
    /// let pool = BlockPool::new(nz!(32), nz!(1));
    ///
    /// let block = pool.acquire().unwrap();
    /// assert_eq!(pool.acquire().unwrap_err(), Error::OutOfMemory { block_count: 1 });
    ///
    /// pool.release(block).unwrap();
    /// assert!(pool.acquire().is_ok());
    /// ```
    pub fn acquire(&self) -> Result<RawBlock<'_>> {
        let ticket = self.issue_slot()?;

        Ok(RawBlock::new(
            self.pool_id,
            ticket,
            self.region.block_ptr(ticket.index()),
        ))
    }

    /// Acquires a block and moves `value` into it.
    ///
    /// If the pool is exhausted, `value` is dropped and the error returned.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfMemory`] if every block is already issued.
    ///
    /// # Panics
    ///
    /// Panics if `T` is larger than a block or requires stricter alignment than
    /// [`block_align()`](Self::block_align).
    ///
    /// # Example
    ///
    /// ```rust
    /// use block_pool::BlockPool;
    /// use new_zealand::nz;
    ///
    /// let pool = BlockPool::new(nz!(4), nz!(10));
    ///
    /// let age = pool.acquire_typed(32_i32).unwrap();
    /// assert_eq!(*age, 32);
    ///
    /// pool.release_typed(age).unwrap();
    /// ```
    pub fn acquire_typed<T>(&self, value: T) -> Result<TypedBlock<'_, T>> {
        // SAFETY: The closure initializes the value.
        unsafe {
            self.acquire_with(|uninit: &mut MaybeUninit<T>| {
                uninit.write(value);
            })
        }
    }

    /// Acquires a block and initializes a `T` in place using the provided closure.
    ///
    /// This avoids constructing the value elsewhere and moving it in, which matters for large
    /// types or types that are only partially initialized by design.
    ///
    /// If the closure panics, the block is returned to the free set before the panic continues.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfMemory`] if every block is already issued. The closure is not
    /// called in that case.
    ///
    /// # Panics
    ///
    /// Panics if `T` is larger than a block or requires stricter alignment than
    /// [`block_align()`](Self::block_align).
    ///
    /// # Safety
    ///
    /// The closure must fully initialize the `MaybeUninit<T>` before returning.
    ///
    /// # Example
    ///
    /// ```rust
    /// use std::mem::MaybeUninit;
    ///
    /// use block_pool::BlockPool;
    /// use new_zealand::nz;
    ///
    /// let pool = BlockPool::builder()
    ///     .block_size_of::<[u64; 64]>()
    ///     .block_count(nz!(2))
    ///     .build();
    ///
    /// // SAFETY: The closure initializes the whole array.
    /// let table = unsafe {
    ///     pool.acquire_with(|uninit: &mut MaybeUninit<[u64; 64]>| {
    ///         uninit.write([7; 64]);
    ///     })
    /// }
    /// .unwrap();
    ///
    /// assert!(table.iter().all(|value| *value == 7));
    ///
    /// pool.release_typed(table).unwrap();
    /// ```
    pub unsafe fn acquire_with<T>(
        &self,
        f: impl FnOnce(&mut MaybeUninit<T>),
    ) -> Result<TypedBlock<'_, T>> {
        self.assert_fits::<T>();

        let ticket = self.issue_slot()?;
        let mut ptr = self.region.block_ptr(ticket.index()).cast::<MaybeUninit<T>>();

        // The closure is user code. If it panics, nobody will ever hold a handle to this slot,
        // so we take it back. We hold no borrow of the slot table while the closure runs.
        let guard = scopeguard::guard(ticket, |ticket| {
            _ = self.slots.borrow_mut().release(ticket);
        });

        // SAFETY: The pointer is inside our region, suitably aligned and sized for T (checked
        // above) and nobody else refers to a freshly issued slot.
        f(unsafe { ptr.as_mut() });

        let ticket = ScopeGuard::into_inner(guard);

        Ok(TypedBlock::new(self.pool_id, ticket, ptr.cast::<T>()))
    }

    /// Converts an untyped block into a typed one, transferring the right to refer to the
    /// block from the old handle to the new one.
    ///
    /// The block's memory is whatever was left in it, so the new handle exposes it as
    /// [`MaybeUninit<T>`]. Use [`TypedBlock::write()`] to store a value and get a
    /// `TypedBlock<T>`.
    ///
    /// # Panics
    ///
    /// Panics if the block belongs to a different pool, or if `T` is larger than a block or
    /// requires stricter alignment than [`block_align()`](Self::block_align).
    ///
    /// # Example
    ///
    /// ```rust
    /// use block_pool::BlockPool;
    /// use new_zealand::nz;
    ///
    /// let pool = BlockPool::new(nz!(4), nz!(10));
    ///
    /// let block = pool.acquire().unwrap();
    /// let number = pool.cast::<i32>(block).write(100);
    ///
    /// assert_eq!(*number, 100);
    ///
    /// pool.release_typed(number).unwrap();
    /// ```
    pub fn cast<'pool, T>(
        &'pool self,
        block: RawBlock<'pool>,
    ) -> TypedBlock<'pool, MaybeUninit<T>> {
        assert!(
            block.pool_id == self.pool_id,
            "attempted to cast a block from a different pool (block pool ID: {}, current pool ID: {})",
            block.pool_id,
            self.pool_id
        );

        self.assert_fits::<T>();

        TypedBlock::new(block.pool_id, block.ticket, block.ptr.cast::<MaybeUninit<T>>())
    }

    /// Returns an untyped block to the pool.
    ///
    /// Whatever bytes were written into the block are left as they are. Nothing is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`ForeignBlock`] if the block belongs to a different pool. The handle is inside
    /// the error, so it can still be released into the pool that issued it. The state of both
    /// pools is unchanged.
    pub fn release<'pool>(
        &self,
        block: RawBlock<'pool>,
    ) -> Result<(), ForeignBlock<RawBlock<'pool>>> {
        if block.pool_id != self.pool_id {
            let index = self.foreign_release(block.ticket);
            return Err(ForeignBlock::new(block, index));
        }

        self.release_issued(block.ticket);

        Ok(())
    }

    /// Returns a block to the pool through a shared handle.
    ///
    /// Unlike the exclusive handles, copies of a [`SharedBlock`] can outlive a release, so
    /// the pool checks that the block is still issued under this very handle.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRelease`] if the block belongs to a different pool, has already
    /// been released, or has been released and issued again since the handle was created.
    /// The state of the pool is unchanged.
    ///
    /// # Example
    ///
    /// ```rust
    /// use block_pool::BlockPool;
    /// use new_zealand::nz;
    ///
    /// let pool = BlockPool::new(nz!(8), nz!(4));
    ///
    /// let block = pool.acquire().unwrap().into_shared();
    ///
    /// assert!(pool.release_shared(block).is_ok());
    /// assert!(pool.release_shared(block).is_err());
    /// assert_eq!(pool.free_count(), 4);
    /// ```
    pub fn release_shared(&self, block: SharedBlock<'_>) -> Result<()> {
        self.release_slot(block.pool_id, block.ticket)
    }

    /// Whether the block behind a shared handle is still issued under that handle.
    #[must_use]
    pub fn is_issued(&self, block: SharedBlock<'_>) -> bool {
        block.pool_id == self.pool_id && self.slots.borrow().is_issued(block.ticket)
    }

    /// Drops the value stored in a typed block, then returns the block to the pool.
    ///
    /// The value is dropped before the block becomes available again, so a later acquire can
    /// never observe a value that is still being destroyed.
    ///
    /// # Errors
    ///
    /// Returns [`ForeignBlock`] if the block belongs to a different pool. The value is not
    /// dropped in that case, the handle is inside the error and the state of both pools is
    /// unchanged.
    pub fn release_typed<'pool, T>(
        &self,
        block: TypedBlock<'pool, T>,
    ) -> Result<(), ForeignBlock<TypedBlock<'pool, T>>> {
        if block.pool_id != self.pool_id {
            let index = self.foreign_release(block.ticket);
            return Err(ForeignBlock::new(block, index));
        }

        // SAFETY: The handle is exclusive and proves the block holds an initialized T. It is
        // consumed here, so the value cannot be reached again after being dropped.
        unsafe {
            ptr::drop_in_place(block.ptr.as_ptr());
        }

        self.release_issued(block.ticket);

        Ok(())
    }

    /// Moves the value out of a typed block, then returns the block to the pool.
    ///
    /// # Errors
    ///
    /// Returns [`ForeignBlock`] if the block belongs to a different pool. The value stays in
    /// the block in that case, the handle is inside the error and the state of both pools is
    /// unchanged.
    ///
    /// # Example
    ///
    /// ```rust
    /// use block_pool::BlockPool;
    /// use new_zealand::nz;
    ///
    /// let pool = BlockPool::builder()
    ///     .block_size_of::<String>()
    ///     .block_count(nz!(1))
    ///     .build();
    ///
    /// let name = pool.acquire_typed("Edwin".to_string()).unwrap();
    /// let name = pool.release_take(name).unwrap();
    ///
    /// assert_eq!(name, "Edwin");
    /// assert!(pool.is_empty());
    /// ```
    pub fn release_take<'pool, T>(
        &self,
        block: TypedBlock<'pool, T>,
    ) -> Result<T, ForeignBlock<TypedBlock<'pool, T>>> {
        if block.pool_id != self.pool_id {
            let index = self.foreign_release(block.ticket);
            return Err(ForeignBlock::new(block, index));
        }

        // SAFETY: The handle is exclusive and proves the block holds an initialized T. It is
        // consumed here and the block is freed below, so the value is moved out exactly once.
        let value = unsafe { block.ptr.read() };

        self.release_issued(block.ticket);

        Ok(value)
    }

    fn assert_fits<T>(&self) {
        assert!(
            self.region.fits::<T>(),
            "type {} (size {}, align {}) does not fit a block of size {} and align {}",
            type_name::<T>(),
            size_of::<T>(),
            align_of::<T>(),
            self.block_size(),
            self.block_align()
        );
    }

    fn issue_slot(&self) -> Result<SlotTicket> {
        let ticket = self.slots.borrow_mut().acquire();

        let Some(ticket) = ticket else {
            debug!(
                pool_id = self.pool_id,
                block_count = self.block_count(),
                "block pool is out of memory"
            );

            return Err(Error::OutOfMemory {
                block_count: self.block_count(),
            });
        };

        trace!(pool_id = self.pool_id, index = ticket.index(), "issued block");

        Ok(ticket)
    }

    fn release_slot(&self, pool_id: u64, ticket: SlotTicket) -> Result<()> {
        if pool_id != self.pool_id {
            return Err(self.invalid_release(ticket, ReleaseProblem::ForeignPool));
        }

        let released = self.slots.borrow_mut().release(ticket);

        released.map_err(|problem| self.invalid_release(ticket, problem))?;

        trace!(pool_id = self.pool_id, index = ticket.index(), "released block");

        Ok(())
    }

    /// Releases the slot behind an exclusive handle issued by this pool.
    fn release_issued(&self, ticket: SlotTicket) {
        self.slots
            .borrow_mut()
            .release(ticket)
            .expect("exclusive handles always refer to a block issued under the same ticket");

        trace!(pool_id = self.pool_id, index = ticket.index(), "released block");
    }

    /// Logs a rejected release of an exclusive handle and returns the block index.
    fn foreign_release(&self, ticket: SlotTicket) -> usize {
        debug!(
            pool_id = self.pool_id,
            index = ticket.index(),
            problem = %ReleaseProblem::ForeignPool,
            "rejected block release"
        );

        ticket.index()
    }

    fn invalid_release(&self, ticket: SlotTicket, problem: ReleaseProblem) -> Error {
        debug!(
            pool_id = self.pool_id,
            index = ticket.index(),
            %problem,
            "rejected block release"
        );

        Error::InvalidRelease {
            index: ticket.index(),
            problem,
        }
    }
}

impl Drop for BlockPool {
    fn drop(&mut self) {
        let issued_count = self.slots.get_mut().issued_count();

        if issued_count > 0 {
            debug!(
                pool_id = self.pool_id,
                issued_count, "dropping block pool with issued blocks, their contents are abandoned"
            );
        }

        // If we are already panicking, we do not want to panic again because that will
        // simply obscure whatever the original panic was, leading to debug difficulties.
        if !thread::panicking() && matches!(self.drop_policy, DropPolicy::MustNotLeakItems) {
            assert!(
                issued_count == 0,
                "dropped a BlockPool with {issued_count} issued blocks - this is forbidden by DropPolicy::MustNotLeakItems"
            );
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::undocumented_unsafe_blocks,
    clippy::multiple_unsafe_ops_per_block,
    clippy::items_after_statements,
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects,
    clippy::drop_non_drop,
    reason = "tests focus on succinct code and do not need to tick all the boxes"
)]
mod tests {
    use std::cell::Cell;
    use std::panic::{AssertUnwindSafe, catch_unwind};
    use std::rc::Rc;

    use new_zealand::nz;
    use static_assertions::{assert_impl_all, assert_not_impl_any};

    use super::*;

    assert_impl_all!(BlockPool: std::fmt::Debug);
    assert_not_impl_any!(BlockPool: Send, Sync);

    /// Counts how many times values carrying it have been dropped.
    struct DropCounter {
        drops: Rc<Cell<usize>>,
    }

    impl DropCounter {
        fn new() -> (Self, Rc<Cell<usize>>) {
            let drops = Rc::new(Cell::new(0));
            (
                Self {
                    drops: Rc::clone(&drops),
                },
                drops,
            )
        }
    }

    impl Drop for DropCounter {
        fn drop(&mut self) {
            self.drops.set(self.drops.get() + 1);
        }
    }

    #[test]
    fn smoke_test() {
        let pool = BlockPool::new(nz!(8), nz!(3));

        assert_eq!(pool.block_count(), 3);
        assert!(pool.is_empty());

        let a = pool.acquire_typed(1_u64).unwrap();
        let b = pool.acquire_typed(2_u64).unwrap();
        let c = pool.acquire().unwrap();

        assert_eq!(pool.issued_count(), 3);
        assert_eq!(pool.free_count(), 0);
        assert!(pool.is_exhausted());
        assert_eq!(*a, 1);
        assert_eq!(*b, 2);

        pool.release_typed(a).unwrap();
        pool.release_typed(b).unwrap();
        pool.release(c).unwrap();

        assert!(pool.is_empty());
        assert_eq!(pool.free_count(), 3);
    }

    #[test]
    fn out_of_memory_is_recoverable() {
        let pool = BlockPool::new(nz!(4), nz!(2));

        let first = pool.acquire().unwrap();
        let second = pool.acquire().unwrap();

        assert_eq!(
            pool.acquire().unwrap_err(),
            Error::OutOfMemory { block_count: 2 }
        );
        assert_eq!(
            pool.acquire_typed(5_u32).unwrap_err(),
            Error::OutOfMemory { block_count: 2 }
        );
        assert_eq!(pool.issued_count(), 2);

        pool.release(second).unwrap();

        let third = pool.acquire().unwrap();
        assert_eq!(pool.issued_count(), 2);

        pool.release(first).unwrap();
        pool.release(third).unwrap();
    }

    #[test]
    fn value_is_dropped_when_pool_is_exhausted() {
        let pool = BlockPool::builder()
            .block_size_of::<DropCounter>()
            .block_count(nz!(1))
            .build();

        let holder = pool.acquire().unwrap();

        let (counter, drops) = DropCounter::new();
        assert!(pool.acquire_typed(counter).is_err());
        assert_eq!(drops.get(), 1);

        pool.release(holder).unwrap();
    }

    #[test]
    fn most_recently_released_block_is_reused_first() {
        let pool = BlockPool::new(nz!(4), nz!(5));

        let a = pool.acquire().unwrap();
        let b = pool.acquire().unwrap();
        let c = pool.acquire().unwrap();

        let b_ptr = b.ptr();
        let c_ptr = c.ptr();

        pool.release(b).unwrap();
        pool.release(c).unwrap();

        let next = pool.acquire().unwrap();
        let after = pool.acquire().unwrap();

        assert_eq!(next.ptr(), c_ptr);
        assert_eq!(after.ptr(), b_ptr);

        pool.release(a).unwrap();
        pool.release(next).unwrap();
        pool.release(after).unwrap();
    }

    #[test]
    fn release_typed_drops_exactly_once() {
        let pool = BlockPool::builder()
            .block_size_of::<DropCounter>()
            .block_count(nz!(2))
            .build();

        let (counter, drops) = DropCounter::new();
        let block = pool.acquire_typed(counter).unwrap();

        assert_eq!(drops.get(), 0);

        pool.release_typed(block).unwrap();

        assert_eq!(drops.get(), 1);
        assert!(pool.is_empty());

        // Reusing the block for a new value does not touch the old one.
        let (counter, second_drops) = DropCounter::new();
        let block = pool.acquire_typed(counter).unwrap();
        pool.release_typed(block).unwrap();

        assert_eq!(drops.get(), 1);
        assert_eq!(second_drops.get(), 1);
    }

    #[test]
    fn release_take_does_not_drop() {
        let pool = BlockPool::builder()
            .block_size_of::<DropCounter>()
            .block_count(nz!(1))
            .build();

        let (counter, drops) = DropCounter::new();
        let block = pool.acquire_typed(counter).unwrap();

        let counter = pool.release_take(block).unwrap();

        assert_eq!(drops.get(), 0);
        assert!(pool.is_empty());

        drop(counter);
        assert_eq!(drops.get(), 1);
    }

    #[test]
    fn pool_drop_abandons_issued_values() {
        let (counter, drops) = DropCounter::new();

        {
            let pool = BlockPool::builder()
                .block_size_of::<DropCounter>()
                .block_count(nz!(1))
                .build();

            let block = pool.acquire_typed(counter).unwrap();
            drop(block);
        }

        assert_eq!(drops.get(), 0);
    }

    #[test]
    #[should_panic]
    fn must_not_leak_items_panics_on_issued_blocks() {
        let pool = BlockPool::builder()
            .block_size(nz!(8))
            .block_count(nz!(2))
            .drop_policy(DropPolicy::MustNotLeakItems)
            .build();

        let block = pool.acquire().unwrap();
        drop(block);

        drop(pool);
    }

    #[test]
    fn must_not_leak_items_accepts_empty_pool() {
        let pool = BlockPool::builder()
            .block_size(nz!(8))
            .block_count(nz!(2))
            .drop_policy(DropPolicy::MustNotLeakItems)
            .build();

        let block = pool.acquire_typed(5_u64).unwrap();
        pool.release_typed(block).unwrap();

        drop(pool);
    }

    #[test]
    fn release_into_foreign_pool_returns_handle() {
        let pool_a = BlockPool::new(nz!(8), nz!(2));
        let pool_b = BlockPool::new(nz!(8), nz!(2));

        let raw = pool_a.acquire().unwrap();
        let typed = pool_a.acquire_typed(9_u64).unwrap();

        let rejected_raw = pool_b.release(raw).unwrap_err();
        assert_eq!(rejected_raw.index(), 0);

        let rejected_typed = pool_b.release_typed(typed).unwrap_err();
        assert_eq!(rejected_typed.index(), 1);
        assert_eq!(
            Error::from(pool_b.release_take(rejected_typed.into_block()).unwrap_err()),
            Error::InvalidRelease {
                index: 1,
                problem: ReleaseProblem::ForeignPool,
            }
        );

        assert_eq!(pool_a.issued_count(), 2);
        assert_eq!(pool_b.issued_count(), 0);

        pool_a.release(rejected_raw.into_block()).unwrap();
        assert_eq!(pool_a.issued_count(), 1);
    }

    #[test]
    fn rejected_typed_block_can_be_released_into_own_pool() {
        let home = BlockPool::builder()
            .block_size_of::<DropCounter>()
            .block_count(nz!(1))
            .drop_policy(DropPolicy::MustNotLeakItems)
            .build();
        let other = BlockPool::builder()
            .block_size_of::<DropCounter>()
            .block_count(nz!(1))
            .build();

        let (counter, drops) = DropCounter::new();
        let block = home.acquire_typed(counter).unwrap();

        let rejected = other.release_typed(block).unwrap_err();

        assert_eq!(drops.get(), 0);
        assert_eq!(home.issued_count(), 1);
        assert!(other.is_empty());

        let block = rejected.into_block();
        home.release_typed(block).unwrap();

        assert_eq!(drops.get(), 1);
        assert!(home.is_empty());

        // The block is available again and the strict pool can be dropped.
        let block = home.acquire().unwrap();
        home.release(block).unwrap();

        drop(home);
    }

    #[test]
    fn shared_handle_from_foreign_pool_is_not_issued() {
        let pool_a = BlockPool::new(nz!(8), nz!(2));
        let pool_b = BlockPool::new(nz!(8), nz!(2));

        let shared = pool_a.acquire().unwrap().into_shared();
        let _b_block = pool_b.acquire().unwrap();

        assert!(pool_a.is_issued(shared));
        assert!(!pool_b.is_issued(shared));
        assert!(pool_b.release_shared(shared).is_err());
        assert_eq!(pool_b.issued_count(), 1);

        pool_a.release_shared(shared).unwrap();
    }

    #[test]
    #[should_panic]
    fn cast_from_foreign_pool_panics() {
        let pool_a = BlockPool::new(nz!(8), nz!(2));
        let pool_b = BlockPool::new(nz!(8), nz!(2));

        let raw = pool_a.acquire().unwrap();
        _ = pool_b.cast::<u64>(raw);
    }

    #[test]
    #[should_panic]
    fn acquire_typed_too_large_panics() {
        let pool = BlockPool::new(nz!(4), nz!(2));

        _ = pool.acquire_typed(1_u64);
    }

    #[test]
    #[should_panic]
    fn acquire_typed_overaligned_panics() {
        // Eight bytes, but blocks of size 12 are only 4-aligned.
        let pool = BlockPool::new(nz!(12), nz!(2));

        _ = pool.acquire_typed(1_u64);
    }

    #[test]
    #[should_panic]
    fn cast_too_large_panics() {
        let pool = BlockPool::new(nz!(4), nz!(2));

        let raw = pool.acquire().unwrap();
        _ = pool.cast::<[u32; 2]>(raw);
    }

    #[test]
    fn zero_sized_values_are_supported() {
        let pool = BlockPool::new(nz!(1), nz!(2));

        let unit = pool.acquire_typed(()).unwrap();
        assert_eq!(pool.issued_count(), 1);

        pool.release_typed(unit).unwrap();
        assert!(pool.is_empty());
    }

    #[test]
    fn panicking_initializer_returns_block() {
        let pool = BlockPool::new(nz!(8), nz!(2));

        let result = catch_unwind(AssertUnwindSafe(|| {
            // SAFETY: The closure never returns, so it never hands out an uninitialized value.
            let _block = unsafe {
                pool.acquire_with(|_: &mut MaybeUninit<u64>| {
                    panic!("initializer failed");
                })
            };
        }));

        assert!(result.is_err());
        assert!(pool.is_empty());
        assert_eq!(pool.free_count(), 2);

        // The block that was taken back is the next one handed out.
        let block = pool.acquire().unwrap();
        assert_eq!(block.index(), 0);
        pool.release(block).unwrap();
    }

    #[test]
    fn initializer_may_use_the_pool() {
        let pool = BlockPool::new(nz!(8), nz!(3));

        // SAFETY: The closure initializes the value.
        let outer = unsafe {
            pool.acquire_with(|uninit: &mut MaybeUninit<u64>| {
                let inner = pool.acquire_typed(10_u64).unwrap();
                uninit.write(*inner + 1);
                pool.release_typed(inner).unwrap();
            })
        }
        .unwrap();

        assert_eq!(*outer, 11);
        assert_eq!(pool.issued_count(), 1);

        pool.release_typed(outer).unwrap();
    }

    #[test]
    fn destructor_may_use_the_pool() {
        struct ReleasesOnDrop<'pool> {
            pool: &'pool BlockPool,
            other: Option<RawBlock<'pool>>,
        }

        impl Drop for ReleasesOnDrop<'_> {
            fn drop(&mut self) {
                if let Some(other) = self.other.take() {
                    self.pool.release(other).unwrap();
                }
            }
        }

        let pool = BlockPool::builder()
            .block_size_of::<ReleasesOnDrop<'_>>()
            .block_count(nz!(2))
            .build();

        let other = pool.acquire().unwrap();
        let block = pool
            .acquire_typed(ReleasesOnDrop {
                pool: &pool,
                other: Some(other),
            })
            .unwrap();

        assert_eq!(pool.issued_count(), 2);

        pool.release_typed(block).unwrap();

        assert!(pool.is_empty());
    }

    #[test]
    fn pool_ids_are_unique() {
        let pool_a = BlockPool::new(nz!(8), nz!(1));
        let pool_b = BlockPool::new(nz!(8), nz!(1));

        assert_ne!(pool_a.pool_id, pool_b.pool_id);
    }
}
