//! A fixed-capacity pool of equal-sized memory blocks carved out of a single allocation.
//!
//! This crate provides [`BlockPool`], which allocates `block_size * block_count` bytes once,
//! when it is created, and hands out fixed-size blocks from that region in constant time.
//! Releasing a block makes it available again. The pool never grows and never allocates block
//! memory after construction, so the cost of an acquire or a release is the same no matter how
//! long the pool has been in use.
//!
//! # Key Features
//!
//! - **Single allocation**: All blocks live in one contiguous region owned by the pool
//! - **Constant-time acquire and release**: The free set is an intrusive stack over the blocks
//! - **Bounded capacity**: Exhaustion is reported as [`Error::OutOfMemory`] and is recoverable
//! - **Typed and untyped access**: Work with raw bytes or construct values in place
//! - **Safe handles**: Exclusive handles are consumed by release, making double release and
//!   use-after-release compile errors
//! - **Checked shared handles**: Copyable handles are validated on release, rejecting double
//!   release with [`Error::InvalidRelease`]
//! - **Flexible drop policies**: Decide whether dropping a pool with issued blocks is allowed
//!
//! # Handle Types
//!
//! ## [`RawBlock`] - Exclusive Untyped Access
//!
//! Returned by [`BlockPool::acquire()`]. Exposes a pointer to the block's uninitialized bytes.
//! Can be released, cast to a [`TypedBlock`] or turned into a [`SharedBlock`].
//!
//! ## [`TypedBlock<T>`] - Exclusive Typed Access
//!
//! Returned by [`BlockPool::acquire_typed()`] and [`BlockPool::acquire_with()`], or obtained via
//! [`BlockPool::cast()`]. Implements [`std::ops::Deref`] and [`std::ops::DerefMut`] for direct
//! access to the value. Releasing it either drops the value
//! ([`release_typed()`](BlockPool::release_typed)) or moves it out
//! ([`release_take()`](BlockPool::release_take)).
//!
//! ## [`SharedBlock`] - Copyable Untyped Access
//!
//! Created from a [`RawBlock`]. Can be copied freely, at the cost of every release being checked
//! at runtime.
//!
//! # Examples
//!
//! ## Untyped Blocks
//!
//! ```rust
//! use block_pool::BlockPool;
//! use new_zealand::nz;
//!
//! let pool = BlockPool::new(nz!(4), nz!(10));
//!
//! let block = pool.acquire().unwrap();
//!
//! // SAFETY: The block is 4 bytes, 4-aligned and exclusively ours.
//! unsafe {
//!     block.ptr().cast::<i32>().write(100);
//!     assert_eq!(block.ptr().cast::<i32>().read(), 100);
//! }
//!
//! pool.release(block).unwrap();
//! ```
//!
//! ## Typed Blocks
//!
//! ```rust
//! use block_pool::BlockPool;
//! use new_zealand::nz;
//!
//! let pool = BlockPool::new(nz!(4), nz!(10));
//!
//! // Reinterpret an untyped block and store a value in it.
//! let number = pool.cast::<i32>(pool.acquire().unwrap()).write(100);
//! assert_eq!(*number, 100);
//! pool.release_typed(number).unwrap();
//!
//! // Or acquire and construct in one step.
//! let age = pool.acquire_typed(32_i32).unwrap();
//! assert_eq!(*age, 32);
//! pool.release_typed(age).unwrap();
//!
//! assert!(pool.is_empty());
//! ```
//!
//! ## Exhaustion
//!
//! ```rust
//! use block_pool::{BlockPool, Error};
//! use new_zealand::nz;
//!
//! let pool = BlockPool::new(nz!(16), nz!(2));
//!
//! let first = pool.acquire().unwrap();
//! let second = pool.acquire().unwrap();
//!
//! assert!(matches!(pool.acquire(), Err(Error::OutOfMemory { .. })));
//!
//! pool.release(first).unwrap();
//! let third = pool.acquire().unwrap();
//!
//! pool.release(second).unwrap();
//! pool.release(third).unwrap();
//! ```
//!
//! # Logging
//!
//! The pool emits [`tracing`](https://docs.rs/tracing) events: `debug` for pool creation,
//! exhaustion and rejected releases, `trace` for every acquire and release. Install a
//! subscriber in your application to see them.

mod builder;
mod drop_policy;
mod error;
mod pool;
mod raw_block;
mod region;
mod shared_block;
mod slot_table;
mod typed_block;

pub use builder::*;
pub use drop_policy::*;
pub use error::{Error, ForeignBlock, ReleaseProblem};
pub use pool::BlockPool;
pub use raw_block::RawBlock;
pub(crate) use region::*;
pub use shared_block::SharedBlock;
pub(crate) use slot_table::*;
pub use typed_block::TypedBlock;
