//! Integration tests for `block_pool` through its public API only.

#![allow(
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects,
    clippy::modulo_arithmetic,
    clippy::undocumented_unsafe_blocks,
    reason = "panic is fine in tests"
)]

use std::collections::HashSet;
use std::mem::MaybeUninit;

use block_pool::{BlockPool, DropPolicy, Error, RawBlock, ReleaseProblem};
use new_zealand::nz;

#[test]
fn demo_scenario_round_trips() {
    let pool = BlockPool::new(nz!(4), nz!(10));

    let raw = pool.acquire().unwrap();
    let number = pool.cast::<i32>(raw).write(100);
    assert_eq!(*number, 100);
    pool.release_typed(number).unwrap();

    let age = pool.acquire_typed(32_i32).unwrap();
    assert_eq!(*age, 32);
    pool.release_typed(age).unwrap();

    for i in 0..10 {
        let block = pool.acquire_typed(i).unwrap();
        assert_eq!(*block, i);
        pool.release_typed(block).unwrap();
    }

    assert!(pool.is_empty());
    assert_eq!(pool.free_count(), 10);
}

#[test]
fn released_typed_block_is_reused_next() {
    let pool = BlockPool::new(nz!(4), nz!(10));

    let _keep = pool.acquire().unwrap();

    let number = pool.acquire_typed(100_i32).unwrap();
    assert_eq!(*number, 100);
    let index = number.index();
    pool.release_typed(number).unwrap();

    let next = pool.acquire().unwrap();
    assert_eq!(next.index(), index);

    pool.release(next).unwrap();
}

#[test]
fn every_block_is_distinct_and_spaced() {
    let pool = BlockPool::new(nz!(24), nz!(16));

    let blocks = (0..16).map(|_| pool.acquire().unwrap()).collect::<Vec<_>>();

    let mut addresses = blocks
        .iter()
        .map(|block| block.ptr().as_ptr() as usize)
        .collect::<Vec<_>>();

    let unique = addresses.iter().copied().collect::<HashSet<_>>();
    assert_eq!(unique.len(), 16);

    addresses.sort_unstable();
    for pair in addresses.windows(2) {
        assert!(pair[1] - pair[0] >= 24);
    }

    for address in &addresses {
        assert_eq!(address % pool.block_align(), 0);
    }

    for block in blocks {
        pool.release(block).unwrap();
    }
}

#[test]
fn exhaustion_then_recovery() {
    let pool = BlockPool::new(nz!(8), nz!(3));

    let mut blocks = (0..3).map(|_| pool.acquire().unwrap()).collect::<Vec<_>>();

    for _ in 0..5 {
        assert_eq!(
            pool.acquire().unwrap_err(),
            Error::OutOfMemory { block_count: 3 }
        );
    }

    assert!(pool.is_exhausted());
    assert_eq!(pool.issued_count(), 3);

    let released = blocks.pop().unwrap();
    let released_index = released.index();
    pool.release(released).unwrap();

    let reacquired = pool.acquire().unwrap();
    assert_eq!(reacquired.index(), released_index);
    blocks.push(reacquired);

    for block in blocks {
        pool.release(block).unwrap();
    }

    assert!(pool.is_empty());
}

#[test]
fn release_order_determines_reuse_order() {
    let pool = BlockPool::new(nz!(8), nz!(4));

    let blocks = (0..4).map(|_| pool.acquire().unwrap()).collect::<Vec<_>>();
    let indexes = blocks.iter().map(RawBlock::index).collect::<Vec<_>>();
    assert_eq!(indexes, vec![0, 1, 2, 3]);

    for block in blocks {
        pool.release(block).unwrap();
    }

    // Released 0, 1, 2, 3 so they come back in reverse.
    let reissued = (0..4).map(|_| pool.acquire().unwrap()).collect::<Vec<_>>();
    let indexes = reissued.iter().map(RawBlock::index).collect::<Vec<_>>();
    assert_eq!(indexes, vec![3, 2, 1, 0]);

    for block in reissued {
        pool.release(block).unwrap();
    }
}

#[test]
fn double_release_through_shared_handles_is_rejected() {
    let pool = BlockPool::new(nz!(4), nz!(10));

    let block = pool.acquire().unwrap().into_shared();
    let other = pool.acquire().unwrap();

    pool.release_shared(block).unwrap();

    assert_eq!(
        pool.release_shared(block),
        Err(Error::InvalidRelease {
            index: block.index(),
            problem: ReleaseProblem::NotIssued,
        })
    );

    assert_eq!(pool.issued_count(), 1);
    assert_eq!(pool.free_count(), 9);

    // The free set was not corrupted: the next two acquires yield distinct blocks.
    let a = pool.acquire().unwrap();
    let b = pool.acquire().unwrap();
    assert_ne!(a.index(), b.index());
    assert_ne!(a.index(), other.index());
    assert_ne!(b.index(), other.index());

    pool.release(a).unwrap();
    pool.release(b).unwrap();
    pool.release(other).unwrap();
}

#[test]
fn counts_stay_consistent_under_churn() {
    let pool = BlockPool::new(nz!(16), nz!(8));
    let mut held = Vec::new();

    for step in 0_usize..200 {
        if step % 3 == 2 || pool.is_exhausted() {
            if let Some(block) = held.pop() {
                pool.release_typed(block).unwrap();
            }
        } else {
            held.push(pool.acquire_typed(step).unwrap());
        }

        assert_eq!(pool.issued_count(), held.len());
        assert_eq!(pool.issued_count() + pool.free_count(), pool.block_count());
    }

    for (position, block) in held.iter().enumerate() {
        assert!(held.iter().skip(position + 1).all(|other| other.index() != block.index()));
    }

    for block in held {
        pool.release_typed(block).unwrap();
    }

    assert!(pool.is_empty());
}

#[test]
fn values_survive_neighbor_writes() {
    let pool = BlockPool::builder()
        .block_size_of::<[u8; 32]>()
        .block_count(nz!(4))
        .build();

    let mut blocks = (0_u8..4)
        .map(|i| pool.acquire_typed([i; 32]).unwrap())
        .collect::<Vec<_>>();

    for block in &mut blocks {
        block[31] = block[0].wrapping_add(100);
    }

    for (i, block) in (0_u8..).zip(&blocks) {
        assert!(block[..31].iter().all(|byte| *byte == i));
        assert_eq!(block[31], i + 100);
    }

    for block in blocks {
        pool.release_typed(block).unwrap();
    }
}

#[test]
fn in_place_initialization_with_heap_values() {
    let pool = BlockPool::builder()
        .block_size_of::<Vec<String>>()
        .block_count(nz!(2))
        .build();

    // SAFETY: The closure initializes the value.
    let mut names = unsafe {
        pool.acquire_with(|uninit: &mut MaybeUninit<Vec<String>>| {
            uninit.write(vec!["Alice".to_string()]);
        })
    }
    .unwrap();

    names.push("Bob".to_string());

    let names = pool.release_take(names).unwrap();
    assert_eq!(names, vec!["Alice".to_string(), "Bob".to_string()]);
    assert!(pool.is_empty());
}

#[test]
fn strict_pool_can_be_dropped_after_cleanup() {
    let pool = BlockPool::builder()
        .block_size(nz!(32))
        .block_count(nz!(4))
        .drop_policy(DropPolicy::MustNotLeakItems)
        .build();

    let raw = pool.acquire().unwrap();
    let shared = pool.acquire().unwrap().into_shared();
    let typed = pool.acquire_typed("text".to_string()).unwrap();

    pool.release(raw).unwrap();
    pool.release_shared(shared).unwrap();
    pool.release_typed(typed).unwrap();

    drop(pool);
}

#[test]
fn pools_are_independent() {
    let small = BlockPool::new(nz!(4), nz!(1));
    let large = BlockPool::new(nz!(64), nz!(1));

    let small_block = small.acquire().unwrap();
    let large_block = large.acquire().unwrap();

    assert!(small.acquire().is_err());
    assert!(large.acquire().is_err());

    let rejected = large.release(small_block).unwrap_err();

    assert_eq!(small.issued_count(), 1);
    assert_eq!(large.issued_count(), 1);

    small.release(rejected.into_block()).unwrap();
    large.release(large_block).unwrap();

    assert!(small.is_empty());
    assert!(large.is_empty());
}

#[test]
fn strict_pool_survives_release_into_wrong_pool() {
    let home = BlockPool::builder()
        .block_size_of::<String>()
        .block_count(nz!(1))
        .drop_policy(DropPolicy::MustNotLeakItems)
        .build();
    let other = BlockPool::builder()
        .block_size_of::<String>()
        .block_count(nz!(1))
        .build();

    let name = home.acquire_typed("Edwin".to_string()).unwrap();

    let rejected = other.release_take(name).unwrap_err();
    assert_eq!(
        rejected.to_string(),
        "cannot release block 0: the handle was issued by a different pool"
    );

    let name = rejected.into_block();
    assert_eq!(*name, "Edwin");

    assert_eq!(home.release_take(name).unwrap(), "Edwin");
    assert!(home.is_empty());

    drop(home);
}
