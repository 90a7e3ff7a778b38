//! End-to-end scenarios for pool initialization, population, and teardown
//!
//! Everything here is single-threaded; the concurrency suite lives in
//! `pool_concurrency.rs`. Core counts are pinned through the configuration
//! so distributions are deterministic regardless of the host machine.

use corepool::{ObjectPool, PoolConfig, PoolError, ReleaseEvent};
use std::collections::HashSet;
use std::ptr::NonNull;

fn config(cores: usize, capacity: u32, object_size: usize) -> PoolConfig {
    PoolConfig {
        capacity,
        object_size,
        cores: Some(cores),
        ..PoolConfig::default()
    }
}

/// A word-aligned byte buffer for populate tests
fn aligned_buffer(len: usize) -> Vec<u64> {
    vec![0u64; len / 8]
}

/// Scatter-and-drain: embedded objects spread evenly, every reference is
/// popped exactly once, and the pool reports empty afterwards
#[test]
fn test_scatter_and_drain() {
    let pool = ObjectPool::new(config(4, 16, 32)).unwrap();
    assert_eq!(pool.slot_occupancy(), vec![4, 4, 4, 4]);

    let mut seen = HashSet::new();
    for _ in 0..16 {
        let obj = pool.pop().expect("pool holds 16 objects");
        assert!(seen.insert(obj.as_ptr() as usize), "duplicate reference");
    }
    assert!(pool.pop().is_none(), "17th pop must observe an empty pool");
}

/// Bulk populate: carve a contiguous buffer at stride boundaries, spread
/// the references evenly, and account for all of them plus the buffer at
/// teardown
#[test]
fn test_bulk_populate() {
    let mut backing = aligned_buffer(1024);
    let buf = NonNull::new(backing.as_mut_ptr() as *mut u8).unwrap();

    let mut pool = ObjectPool::new(config(2, 16, 0)).unwrap();
    let carved = unsafe { pool.populate(buf, 1024, 64) }.unwrap();
    assert_eq!(carved, 16);
    assert_eq!(pool.object_size(), 64);
    assert_eq!(pool.slot_occupancy(), vec![8, 8]);

    let mut element_calls = 0;
    let mut buffer_calls = 0;
    pool.drain(|event| match event {
        ReleaseEvent::Object { external, .. } => {
            assert!(!external, "buffer-carved objects are pool-accounted");
            element_calls += 1;
        }
        ReleaseEvent::Buffer { buf: reported, len } => {
            assert_eq!(reported, buf);
            assert_eq!(len, 1024);
            buffer_calls += 1;
        }
    });
    assert_eq!(element_calls, 16);
    assert_eq!(buffer_calls, 1);
}

/// Add-scattered: externally-owned references round-robin across slots and
/// come back flagged external at teardown
#[test]
fn test_add_scattered() {
    let mut pool = ObjectPool::new(config(2, 5, 0)).unwrap();

    let objects: Vec<*mut u8> = (0..5)
        .map(|_| Box::into_raw(Box::new([0u8; 64])) as *mut u8)
        .collect();
    for &obj in &objects {
        unsafe { pool.add_scattered(NonNull::new(obj).unwrap()) }.unwrap();
    }
    assert_eq!(pool.slot_occupancy(), vec![3, 2]);

    let mut seen = HashSet::new();
    for _ in 0..5 {
        let obj = pool.pop().expect("all scattered objects are poppable");
        assert!(seen.insert(obj.as_ptr() as usize));
    }
    assert!(pool.pop().is_none());
    for &obj in &objects {
        unsafe { pool.push(NonNull::new(obj).unwrap()) }.unwrap();
    }

    let mut released = Vec::new();
    pool.drain(|event| match event {
        ReleaseEvent::Object { obj, external } => {
            assert!(external, "scattered objects are externally owned");
            released.push(obj.as_ptr());
        }
        ReleaseEvent::Buffer { .. } => panic!("no bulk buffer was recorded"),
    });
    assert_eq!(released.len(), 5);

    for obj in released {
        drop(unsafe { Box::from_raw(obj as *mut [u8; 64]) });
    }
}

/// Oversubscribed slots: when the working set exceeds one slot's ring, the
/// bounded push keeps every slot within its capacity and the pool loses
/// nothing
#[test]
fn test_full_slot_push() {
    let pool = ObjectPool::new(PoolConfig {
        cores: Some(2),
        ..PoolConfig::sharded(16, 32, 4)
    })
    .unwrap();
    // 16 objects over rings of 8: both slots start full
    assert_eq!(pool.per_slot_capacity(), 8);
    assert_eq!(pool.slot_occupancy(), vec![8, 8]);

    let mut held = Vec::new();
    while let Some(obj) = pool.pop() {
        held.push(obj);
    }
    assert_eq!(held.len(), 16);

    for obj in held {
        unsafe { pool.push(obj).unwrap() };
    }
    let occupancy = pool.slot_occupancy();
    assert_eq!(occupancy.iter().sum::<u32>(), 16);
    assert!(
        occupancy.iter().all(|&n| n <= 8),
        "bounded push must respect each ring's capacity"
    );
}

/// Capacity below the per-slot minimum still initializes, with every ring
/// at the cache-line floor
#[test]
fn test_init_below_minimum_capacity() {
    let pool = ObjectPool::new(config(4, 2, 16)).unwrap();
    assert_eq!(pool.per_slot_capacity(), 4);
    assert_eq!(pool.live_objects(), 2);
    assert!(pool.pop().is_some());
    assert!(pool.pop().is_some());
    assert!(pool.pop().is_none());
}

/// Performance mode sizes every ring for the whole working set
#[test]
fn test_performance_mode_slot_capacity() {
    let pool = ObjectPool::new(PoolConfig {
        cores: Some(8),
        ..PoolConfig::performance(32, 0)
    })
    .unwrap();
    assert!(pool.per_slot_capacity() >= 32);
}

/// A pool initialized without objects reports empty in one pass
#[test]
fn test_pop_on_empty_pool() {
    let pool = ObjectPool::new(config(2, 16, 0)).unwrap();
    assert!(pool.pop().is_none());
}

/// Populate argument validation: misalignment, bad strides, double
/// registration, and stride mismatches are all refused
#[test]
fn test_populate_rejects_bad_arguments() {
    let mut backing = aligned_buffer(1024);
    let buf = NonNull::new(backing.as_mut_ptr() as *mut u8).unwrap();

    let mut pool = ObjectPool::new(config(2, 16, 0)).unwrap();

    // Misaligned buffer start
    let skewed = NonNull::new(unsafe { buf.as_ptr().add(1) }).unwrap();
    assert!(matches!(
        unsafe { pool.populate(skewed, 512, 64) },
        Err(PoolError::InvalidArgument { .. })
    ));

    // Stride not a word multiple
    assert!(matches!(
        unsafe { pool.populate(buf, 1024, 60) },
        Err(PoolError::InvalidArgument { .. })
    ));

    // Zero stride, buffer smaller than one object
    assert!(unsafe { pool.populate(buf, 1024, 0) }.is_err());
    assert!(unsafe { pool.populate(buf, 32, 64) }.is_err());

    // Second buffer after a successful registration
    assert_eq!(unsafe { pool.populate(buf, 1024, 64) }.unwrap(), 16);
    assert!(matches!(
        unsafe { pool.populate(buf, 1024, 64) },
        Err(PoolError::InvalidArgument { .. })
    ));
}

/// Populate refuses a stride that contradicts the embedded object size
#[test]
fn test_populate_rejects_stride_mismatch() {
    let mut backing = aligned_buffer(512);
    let buf = NonNull::new(backing.as_mut_ptr() as *mut u8).unwrap();

    let mut pool = ObjectPool::new(config(2, 4, 32)).unwrap();
    assert!(matches!(
        unsafe { pool.populate(buf, 512, 64) },
        Err(PoolError::InvalidArgument { .. })
    ));
}

/// Populate against a full pool carves nothing and says so
#[test]
fn test_populate_when_full() {
    let mut backing = aligned_buffer(512);
    let buf = NonNull::new(backing.as_mut_ptr() as *mut u8).unwrap();

    // 8 embedded objects fill the entire 2 x 4 ring capacity
    let mut pool = ObjectPool::new(config(2, 8, 32)).unwrap();
    assert!(matches!(
        unsafe { pool.populate(buf, 512, 32) },
        Err(PoolError::CapacityExhausted { .. })
    ));
}

/// add_scattered refuses references beyond the pool's total capacity
#[test]
fn test_add_scattered_at_capacity() {
    let mut pool = ObjectPool::new(config(2, 8, 32)).unwrap();
    let mut extra = [0u64; 8];
    let obj = NonNull::new(extra.as_mut_ptr() as *mut u8).unwrap();
    assert!(matches!(
        unsafe { pool.add_scattered(obj) },
        Err(PoolError::InvalidArgument { .. })
    ));
}

/// Release accounting: N element calls plus one buffer call with a bulk
/// buffer, N calls without one
#[test]
fn test_release_callback_counts() {
    // Without a bulk buffer
    let mut pool = ObjectPool::new(config(2, 6, 16)).unwrap();
    let mut calls = 0;
    pool.drain(|_event| calls += 1);
    assert_eq!(calls, 6);

    // With a bulk buffer: 8 elements + 1 buffer event
    let mut backing = aligned_buffer(256);
    let buf = NonNull::new(backing.as_mut_ptr() as *mut u8).unwrap();
    let mut pool = ObjectPool::new(config(2, 8, 0)).unwrap();
    assert_eq!(unsafe { pool.populate(buf, 256, 32) }.unwrap(), 8);
    let mut calls = 0;
    pool.drain(|_event| calls += 1);
    assert_eq!(calls, 9);
}

/// Mixed population: embedded, bulk, and scattered objects coexist and are
/// classified correctly at teardown
#[test]
fn test_mixed_population_classification() {
    let mut backing = aligned_buffer(128);
    let buf = NonNull::new(backing.as_mut_ptr() as *mut u8).unwrap();

    // 12 embedded objects leave room for 4 more across the 2 x 8 rings
    let mut pool = ObjectPool::new(config(2, 12, 32)).unwrap();
    assert_eq!(pool.live_objects(), 12);
    assert_eq!(unsafe { pool.populate(buf, 96, 32) }.unwrap(), 3);

    let external = Box::into_raw(Box::new([0u8; 32])) as *mut u8;
    unsafe { pool.add_scattered(NonNull::new(external).unwrap()) }.unwrap();

    let mut embedded_count = 0;
    let mut external_count = 0;
    let mut buffer_count = 0;
    pool.drain(|event| match event {
        ReleaseEvent::Object { external: true, .. } => external_count += 1,
        ReleaseEvent::Object { external: false, .. } => embedded_count += 1,
        ReleaseEvent::Buffer { .. } => buffer_count += 1,
    });
    assert_eq!(external_count, 1);
    assert_eq!(embedded_count, 15, "12 embedded + 3 buffer-carved");
    assert_eq!(buffer_count, 1);

    drop(unsafe { Box::from_raw(external as *mut [u8; 32]) });
}

/// Allocator selection: page-sized slots use the paged allocator only when
/// the caller may sleep
#[test]
fn test_slot_allocator_selection() {
    // 8 embedded page-sized objects per slot push the footprint well past
    // one page on any host
    let big = ObjectPool::new(config(2, 16, 4096)).unwrap();
    assert!(big.paged_slots());

    let atomic = ObjectPool::new(PoolConfig {
        alloc: corepool::AllocPolicy::Atomic,
        ..config(2, 16, 4096)
    })
    .unwrap();
    assert!(!atomic.paged_slots());

    // Small slots stay on the global allocator either way
    let small = ObjectPool::new(config(2, 4, 16)).unwrap();
    assert!(!small.paged_slots());
}

/// Popped objects are writable across their full embedded size
#[test]
fn test_embedded_objects_are_usable_storage() {
    let pool = ObjectPool::new(config(2, 4, 48)).unwrap();
    let mut held = Vec::new();
    while let Some(obj) = pool.pop() {
        unsafe { std::ptr::write_bytes(obj.as_ptr(), 0xC7, 48) };
        held.push(obj);
    }
    assert_eq!(held.len(), 4);
    for obj in &held {
        let bytes = unsafe { std::slice::from_raw_parts(obj.as_ptr(), 48) };
        assert!(bytes.iter().all(|&b| b == 0xC7));
    }
    for obj in held {
        unsafe { pool.push(obj).unwrap() };
    }
}
