//! Basic usage example for `BlockPool`.
//!
//! Acquires an untyped block, reinterprets it as an `i32`, then stores typed values in a loop.
//! Every acquire and release is logged at trace level.

use std::error::Error;

use block_pool::{BlockPool, Error as PoolError};
use new_zealand::nz;

fn main() -> Result<(), Box<dyn Error + Send + Sync + 'static>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .init();

    let pool = BlockPool::new(nz!(4), nz!(10));

    println!(
        "Created BlockPool with {} blocks of {} bytes (aligned to {})",
        pool.block_count(),
        pool.block_size(),
        pool.block_align()
    );

    // Untyped block, reinterpreted as an i32.
    let raw = pool.acquire()?;
    let number = pool.cast::<i32>(raw).write(100);
    println!("Block {} holds {}", number.index(), *number);
    // A rejected release hands the handle back inside the error. Here we only keep the reason.
    pool.release_typed(number).map_err(PoolError::from)?;

    // Typed block, constructed in place.
    let age = pool.acquire_typed(32_i32)?;
    println!("Block {} holds {}", age.index(), *age);
    pool.release_typed(age).map_err(PoolError::from)?;

    for i in 0..10_i32 {
        let value = pool.acquire_typed(i)?;
        println!("Block {} holds {}", value.index(), *value);
        pool.release_typed(value).map_err(PoolError::from)?;
    }

    // Exhaust the pool to show the out-of-memory error.
    let mut held = Vec::new();
    loop {
        match pool.acquire() {
            Ok(block) => held.push(block),
            Err(e) => {
                println!("Stopped after {} blocks: {e}", held.len());
                break;
            }
        }
    }

    for block in held {
        pool.release(block).map_err(PoolError::from)?;
    }

    println!(
        "Pool is back to {} free blocks out of {}",
        pool.free_count(),
        pool.block_count()
    );

    Ok(())
}
