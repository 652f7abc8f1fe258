use std::fmt;
use std::marker::PhantomData;
use std::mem::MaybeUninit;
use std::ops::{Deref, DerefMut};
use std::ptr::NonNull;

use crate::{BlockPool, SlotTicket};

/// Exclusive handle to an issued block that holds a value of type `T`.
///
/// Returned by [`BlockPool::acquire_typed()`] and [`BlockPool::acquire_with()`], or obtained
/// from a [`RawBlock`][crate::RawBlock] via [`BlockPool::cast()`], in which case `T` is
/// [`MaybeUninit<U>`] until the value is written with [`write()`](Self::write).
///
/// The handle gives direct access to the value through [`Deref`] and [`DerefMut`]. It cannot be
/// copied or cloned; [`BlockPool::release_typed()`] and [`BlockPool::release_take()`] consume it,
/// so the value can only be destroyed once and never accessed afterwards.
///
/// Dropping the handle does not drop the value nor release the block. Both stay in place until
/// the pool is dropped, at which point the value is abandoned without running its destructor.
///
/// # Example
///
/// ```rust
/// use block_pool::BlockPool;
/// use new_zealand::nz;
///
/// let pool = BlockPool::builder()
///     .block_size_of::<String>()
///     .block_count(nz!(4))
///     .build();
///
/// let mut greeting = pool.acquire_typed("Hello".to_string()).unwrap();
///
/// greeting.push_str(", World!");
/// assert_eq!(&*greeting, "Hello, World!");
///
/// // Drops the String and frees the block.
/// pool.release_typed(greeting).unwrap();
/// ```
///
/// The value cannot be reached once it has been released:
///
/// ```compile_fail,E0382
/// use block_pool::BlockPool;
/// use new_zealand::nz;
///
/// let pool = BlockPool::builder()
///     .block_size_of::<String>()
///     .block_count(nz!(4))
///     .build();
///
/// let greeting = pool.acquire_typed("Hello".to_string()).unwrap();
///
/// pool.release_typed(greeting).unwrap();
///
/// println!("{}", *greeting);
/// ```
#[must_use = "a block that is not released stays issued and its value is never dropped"]
pub struct TypedBlock<'pool, T> {
    /// Ensures this handle can only be returned to the pool it came from.
    pub(crate) pool_id: u64,

    pub(crate) ticket: SlotTicket,

    pub(crate) ptr: NonNull<T>,

    pub(crate) _pool: PhantomData<&'pool BlockPool>,

    // The handle logically owns the T stored in the block.
    pub(crate) _value: PhantomData<T>,
}

impl<'pool, T> TypedBlock<'pool, T> {
    #[must_use]
    pub(crate) fn new(pool_id: u64, ticket: SlotTicket, ptr: NonNull<T>) -> Self {
        Self {
            pool_id,
            ticket,
            ptr,
            _pool: PhantomData,
            _value: PhantomData,
        }
    }

    /// Returns a pointer to the value stored in the block.
    ///
    /// The owner of the handle has exclusive access to the value and may create both `&` shared
    /// and `&mut` exclusive references to it, although [`Deref`] and [`DerefMut`] are usually
    /// more convenient.
    #[must_use]
    #[inline]
    pub fn ptr(&self) -> NonNull<T> {
        self.ptr
    }

    /// Index of the block within the pool.
    #[must_use]
    #[inline]
    pub fn index(&self) -> usize {
        self.ticket.index()
    }

    /// Swaps the type parameter without touching the block.
    fn retype<U>(self) -> TypedBlock<'pool, U> {
        TypedBlock::new(self.pool_id, self.ticket, self.ptr.cast::<U>())
    }
}

impl<'pool, T> TypedBlock<'pool, MaybeUninit<T>> {
    /// Initializes the block with `value` and returns a handle to the initialized value.
    ///
    /// Any previous contents of the block are overwritten without being dropped.
    ///
    /// # Example
    ///
    /// ```rust
    /// use block_pool::BlockPool;
    /// use new_zealand::nz;
    ///
    /// let pool = BlockPool::new(nz!(4), nz!(10));
    ///
    /// let raw = pool.acquire().unwrap();
    /// let number = pool.cast::<i32>(raw).write(100);
    ///
    /// assert_eq!(*number, 100);
    ///
    /// pool.release_typed(number).unwrap();
    /// ```
    #[inline]
    pub fn write(mut self, value: T) -> TypedBlock<'pool, T> {
        (*self).write(value);

        // SAFETY: We just initialized the value.
        unsafe { self.assume_init() }
    }

    /// Converts to a handle to the initialized value.
    ///
    /// # Safety
    ///
    /// The caller must guarantee that the block holds a fully initialized `T`, for example
    /// because it was written through [`ptr()`](Self::ptr).
    #[inline]
    pub unsafe fn assume_init(self) -> TypedBlock<'pool, T> {
        self.retype::<T>()
    }
}

impl<T> Deref for TypedBlock<'_, T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        // SAFETY: The block holds an initialized T (or T is MaybeUninit) for as long as this
        // handle exists, because every path that ends the value's life consumes the handle.
        // The handle is exclusive, so no `&mut` to the value exists elsewhere.
        unsafe { self.ptr.as_ref() }
    }
}

impl<T> DerefMut for TypedBlock<'_, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        // SAFETY: As in deref(), plus we hold the exclusive handle mutably.
        unsafe { self.ptr.as_mut() }
    }
}

impl<T: fmt::Debug> fmt::Debug for TypedBlock<'_, T> {
    #[cfg_attr(test, mutants::skip)] // We have no API contract to test here.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypedBlock")
            .field("pool_id", &self.pool_id)
            .field("index", &self.ticket.index())
            .field("value", &**self)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(
    clippy::undocumented_unsafe_blocks,
    clippy::drop_non_drop,
    reason = "tests focus on succinct code and do not need to tick all the boxes"
)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use new_zealand::nz;
    use static_assertions::assert_not_impl_any;

    use super::*;

    assert_not_impl_any!(TypedBlock<'static, u32>: Send, Sync, Clone, Copy);

    #[test]
    fn deref_reads_and_writes_value() {
        let pool = BlockPool::new(nz!(8), nz!(2));

        let mut block = pool.acquire_typed(41_u64).unwrap();
        *block += 1;

        assert_eq!(*block, 42);
        assert_eq!(unsafe { block.ptr().read() }, 42);

        pool.release_typed(block).unwrap();
    }

    #[test]
    fn write_initializes_cast_block() {
        let pool = BlockPool::new(nz!(8), nz!(2));

        let raw = pool.acquire().unwrap();
        let index = raw.index();

        let block = pool.cast::<u64>(raw).write(7);

        assert_eq!(block.index(), index);
        assert_eq!(*block, 7);

        pool.release_typed(block).unwrap();
    }

    #[test]
    fn assume_init_after_manual_write() {
        let pool = BlockPool::new(nz!(4), nz!(1));

        let uninit = pool.cast::<u32>(pool.acquire().unwrap());
        unsafe { uninit.ptr().cast::<u32>().write(0xabcd) };
        let block = unsafe { uninit.assume_init() };

        assert_eq!(*block, 0xabcd);

        pool.release_typed(block).unwrap();
    }

    #[test]
    fn dropping_handle_does_not_drop_value() {
        struct Tracker(Rc<Cell<bool>>);

        impl Drop for Tracker {
            fn drop(&mut self) {
                self.0.set(true);
            }
        }

        let dropped = Rc::new(Cell::new(false));

        let pool = BlockPool::builder()
            .block_size_of::<Tracker>()
            .block_count(nz!(1))
            .build();

        let block = pool.acquire_typed(Tracker(Rc::clone(&dropped))).unwrap();
        drop(block);

        assert!(!dropped.get());
        assert_eq!(pool.issued_count(), 1);
    }

    #[test]
    fn debug_output_shows_value() {
        let pool = BlockPool::new(nz!(4), nz!(1));
        let block = pool.acquire_typed(1234_u32).unwrap();

        let debug_output = format!("{block:?}");
        assert!(debug_output.contains("TypedBlock"));
        assert!(debug_output.contains("1234"));

        pool.release_typed(block).unwrap();
    }
}
