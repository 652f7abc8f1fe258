use std::alloc::{Layout, alloc, dealloc, handle_alloc_error};
use std::num::NonZero;
use std::ptr::NonNull;

/// The single allocation that backs every block of a pool.
///
/// Blocks are laid out back to back: block `i` starts `i * block_size` bytes into the region.
/// The region is aligned to the natural alignment of the block size (the largest power of two
/// that divides it), which makes every block start equally aligned.
///
/// The region never creates references to its memory. Contents are only ever reached through
/// the pointers handed out by [`block_ptr()`](Self::block_ptr).
#[derive(Debug)]
pub(crate) struct BlockRegion {
    first_block_ptr: NonNull<u8>,

    block_size: NonZero<usize>,
    block_count: NonZero<usize>,

    /// Layout of the whole region, needed again for deallocation.
    layout: Layout,
}

impl BlockRegion {
    /// Allocates an uninitialized region for `block_count` blocks of `block_size` bytes.
    ///
    /// # Panics
    ///
    /// Panics if the total size does not fit in the address space. Allocation failure is
    /// reported through [`handle_alloc_error`].
    #[must_use]
    pub(crate) fn new(block_size: NonZero<usize>, block_count: NonZero<usize>) -> Self {
        let layout = region_layout(block_size, block_count);

        // SAFETY: Both factors of the region size are non-zero, so the layout is not zero-sized.
        let ptr = unsafe { alloc(layout) };

        let Some(first_block_ptr) = NonNull::new(ptr) else {
            handle_alloc_error(layout);
        };

        Self {
            first_block_ptr,
            block_size,
            block_count,
            layout,
        }
    }

    #[must_use]
    pub(crate) fn block_size(&self) -> NonZero<usize> {
        self.block_size
    }

    #[must_use]
    pub(crate) fn block_count(&self) -> NonZero<usize> {
        self.block_count
    }

    /// Alignment shared by the start of every block.
    #[must_use]
    pub(crate) fn block_align(&self) -> usize {
        self.layout.align()
    }

    /// Whether a `T` can be stored in a block: it must fit in the block and must not require
    /// stricter alignment than blocks have.
    #[must_use]
    pub(crate) fn fits<T>(&self) -> bool {
        size_of::<T>() <= self.block_size.get() && align_of::<T>() <= self.block_align()
    }

    /// Returns a pointer to the start of the block with the given index.
    ///
    /// # Panics
    ///
    /// Panics if the index is out of bounds.
    #[must_use]
    pub(crate) fn block_ptr(&self, index: usize) -> NonNull<u8> {
        assert!(
            index < self.block_count.get(),
            "block {index} index out of bounds in region of {} blocks",
            self.block_count
        );

        // Cannot overflow, the offset is inside the region we allocated.
        let offset = index.wrapping_mul(self.block_size.get());

        // SAFETY: The offset is within the allocation thanks to the bounds check above.
        unsafe { self.first_block_ptr.add(offset) }
    }
}

impl Drop for BlockRegion {
    fn drop(&mut self) {
        // SAFETY: We allocated this memory in new() with the same layout and nobody else
        // deallocates it. Whatever is still stored in the blocks is abandoned, not dropped.
        unsafe {
            dealloc(self.first_block_ptr.as_ptr(), self.layout);
        }
    }
}

/// Largest power of two that divides `block_size`.
#[must_use]
fn natural_alignment(block_size: NonZero<usize>) -> usize {
    let size = block_size.get();

    // Two's complement trick: isolates the lowest set bit.
    size & size.wrapping_neg()
}

#[must_use]
fn region_layout(block_size: NonZero<usize>, block_count: NonZero<usize>) -> Layout {
    let total_size = block_size
        .get()
        .checked_mul(block_count.get())
        .expect("block pool size exceeds the size of virtual memory");

    Layout::from_size_align(total_size, natural_alignment(block_size))
        .expect("block pool size exceeds the size of virtual memory")
}

#[cfg(test)]
#[allow(
    clippy::undocumented_unsafe_blocks,
    clippy::multiple_unsafe_ops_per_block,
    clippy::cast_ptr_alignment,
    clippy::arithmetic_side_effects,
    clippy::modulo_arithmetic,
    reason = "tests focus on succinct code and do not need to tick all the boxes"
)]
mod tests {
    use new_zealand::nz;

    use super::*;

    #[test]
    fn natural_alignment_is_largest_dividing_power_of_two() {
        assert_eq!(natural_alignment(nz!(1)), 1);
        assert_eq!(natural_alignment(nz!(3)), 1);
        assert_eq!(natural_alignment(nz!(4)), 4);
        assert_eq!(natural_alignment(nz!(12)), 4);
        assert_eq!(natural_alignment(nz!(24)), 8);
        assert_eq!(natural_alignment(nz!(64)), 64);
    }

    #[test]
    fn blocks_are_laid_out_back_to_back() {
        let region = BlockRegion::new(nz!(12), nz!(5));

        let first = region.block_ptr(0).as_ptr() as usize;

        for index in 0..5 {
            let address = region.block_ptr(index).as_ptr() as usize;
            assert_eq!(address - first, index * 12);
            assert_eq!(address % region.block_align(), 0);
        }
    }

    #[test]
    fn blocks_are_writable_independently() {
        let region = BlockRegion::new(nz!(4), nz!(3));

        unsafe {
            region.block_ptr(0).cast::<u32>().write(10);
            region.block_ptr(1).cast::<u32>().write(20);
            region.block_ptr(2).cast::<u32>().write(30);

            assert_eq!(region.block_ptr(0).cast::<u32>().read(), 10);
            assert_eq!(region.block_ptr(1).cast::<u32>().read(), 20);
            assert_eq!(region.block_ptr(2).cast::<u32>().read(), 30);
        }
    }

    #[test]
    #[should_panic]
    fn block_ptr_out_of_bounds_panics() {
        let region = BlockRegion::new(nz!(4), nz!(3));

        _ = region.block_ptr(3);
    }

    #[test]
    fn fits_checks_size_and_alignment() {
        let region = BlockRegion::new(nz!(4), nz!(1));

        assert!(region.fits::<u32>());
        assert!(region.fits::<[u8; 4]>());
        assert!(region.fits::<u16>());
        assert!(region.fits::<()>());
        assert!(!region.fits::<u64>());
        assert!(!region.fits::<[u8; 5]>());

        // Large enough but only byte-aligned.
        let region = BlockRegion::new(nz!(9), nz!(1));

        assert!(region.fits::<[u8; 9]>());
        assert!(!region.fits::<u32>());
    }

    #[test]
    #[should_panic]
    fn overflowing_region_size_panics() {
        _ = BlockRegion::new(NonZero::new(usize::MAX).unwrap(), nz!(2));
    }
}
