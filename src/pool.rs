//! Scalable object pool over per-core ring-array slots
//!
//! The pool pre-allocates a fixed set of opaque objects and spreads them
//! round-robin across one ring per core. `pop` and `push` start at the
//! caller's current core and walk outward, so at steady state each core
//! works out of its own cache-warm slot and contention stays local to the
//! cores actually sharing one.
//!
//! Both hot operations are lock-free, never allocate, and never wait: a
//! pusher stalled between reserving a ring position and publishing it
//! blocks only that position, and pops route around it. That makes both
//! safe to nest from interrupt-like contexts that preempted another pool
//! operation on the same core.
//!
//! Objects enter the pool three ways, all before it goes live: embedded in
//! the slot allocations at init, carved from one caller-provided bulk
//! buffer by [`ObjectPool::populate`], or handed in one at a time by
//! [`ObjectPool::add_scattered`]. Teardown drains every reference exactly
//! once and classifies it for the caller's release callback.

use crate::config::{AllocPolicy, BalanceMode, PoolConfig};
use crate::error::{PoolError, Result};
use crate::placement;
use crate::slot::{self, Slot, SlotLayout, SlotPop};
use crate::stats::PoolStats;
use std::mem;
use std::ptr::NonNull;
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// One drained reference surfaced to the release callback during
/// [`ObjectPool::drain`]
#[derive(Debug, Clone, Copy)]
pub enum ReleaseEvent {
    /// An object leaving the pool
    Object {
        /// The drained reference
        obj: NonNull<u8>,
        /// True when the object's storage is neither embedded in a slot
        /// allocation nor inside the recorded bulk buffer, i.e. it arrived
        /// through `add_scattered` and is the caller's to reclaim
        external: bool,
    },
    /// The bulk buffer recorded by `populate`, reported exactly once after
    /// every object
    Buffer {
        /// Start of the caller-provided buffer
        buf: NonNull<u8>,
        /// Length the buffer was registered with
        len: usize,
    },
}

/// A scalable lock-free MPMC object pool
///
/// The pool hands out and takes back raw object references. It does not
/// preserve FIFO or LIFO order across slots, does not guarantee fairness,
/// and never grows after initialization. See the crate documentation for
/// the population modes and the safety contract on the raw-pointer entry
/// points.
pub struct ObjectPool {
    /// Requested object capacity
    capacity: u32,
    /// Caller-facing object size in bytes; 0 until embedding or populate
    object_size: usize,
    /// Ring capacity of every slot, a power of two
    slot_entries: u32,
    /// Number of per-core slots at init; survives drain for reporting
    cores: u16,
    /// Objects added so far across all population paths
    live: u32,
    /// Slot storage came from the paged allocator
    paged: bool,
    /// Bulk buffer recorded by populate
    bulk: Option<(NonNull<u8>, usize)>,
    /// One ring per core; emptied by drain
    slots: Vec<Slot>,
    /// Optional operation counters
    stats: Option<Arc<PoolStats>>,
}

// The bulk-buffer pointer is an address-range bookkeeping entry, not data
// the pool dereferences; slots are Send + Sync on their own.
unsafe impl Send for ObjectPool {}
unsafe impl Sync for ObjectPool {}

/// Round `n` up to a multiple of `align` (a power of two)
fn align_up(n: usize, align: usize) -> usize {
    (n + align - 1) & !(align - 1)
}

/// Per-slot ring capacity for the requested geometry
fn slot_entries_for(capacity: u32, cores: u32, balance: BalanceMode) -> Result<u32> {
    let mut entries = match balance {
        BalanceMode::Balanced => capacity / cores,
        BalanceMode::Performance => capacity,
        BalanceMode::Sharded(shards) => capacity / shards,
    };

    let min = slot::min_entries();
    if entries < min {
        entries = min;
    }
    let mut entries = entries
        .checked_next_power_of_two()
        .ok_or_else(|| PoolError::out_of_memory(capacity as usize))?;

    // Rounding down in the division above must not cost capacity
    while (entries as u64) * (cores as u64) < capacity as u64 {
        entries = entries
            .checked_mul(2)
            .ok_or_else(|| PoolError::out_of_memory(capacity as usize))?;
    }

    Ok(entries)
}

impl ObjectPool {
    /// Create a pool, pre-allocating `config.capacity` embedded objects
    /// when `config.object_size` is non-zero
    ///
    /// Embedded objects are zero-filled. On failure, any slots already
    /// allocated are released before returning.
    pub fn new(config: PoolConfig) -> Result<Self> {
        Self::with_object_init(config, |_obj| Ok(()))
    }

    /// Create a pool, running `object_init` once on every embedded object
    /// before it is inserted
    pub fn with_object_init<F>(config: PoolConfig, mut object_init: F) -> Result<Self>
    where
        F: FnMut(NonNull<u8>) -> Result<()>,
    {
        config.validate()?;

        let cores = config.cores.unwrap_or_else(num_cpus::get);
        if cores >= 1 << 16 {
            return Err(PoolError::unsupported(format!(
                "{} cores exceed the 16-bit slot index",
                cores
            )));
        }

        let slot_entries = slot_entries_for(config.capacity, cores as u32, config.balance)?;
        let aligned_size = align_up(config.object_size, mem::size_of::<*mut u8>());
        let embed = aligned_size > 0;

        // Per-core embedded counts: the remainder spreads over the first
        // slots so initial occupancy stays balanced
        let base = config.capacity / cores as u32;
        let extra = config.capacity % cores as u32;
        let objects_for = |core: usize| {
            if !embed {
                0
            } else {
                base + ((core as u32) < extra) as u32
            }
        };

        // The first slot's footprint decides the allocator for all slots,
        // and the choice is reused at teardown
        let first_bytes = SlotLayout::new(slot_entries, aligned_size, objects_for(0))?.bytes();
        let paged =
            config.alloc == AllocPolicy::MaySleep && first_bytes >= placement::page_size();

        let mut slots = Vec::with_capacity(cores);
        let mut live = 0u32;
        for core in 0..cores {
            let objects = objects_for(core);
            let node = placement::node_of_core(core, cores);
            // An allocation failure here drops `slots`, releasing every
            // slot built so far
            let slot = Slot::new(slot_entries, aligned_size, objects, paged, node)?;
            for index in 0..objects {
                let obj = slot.object_at(index, aligned_size);
                object_init(obj)?;
                slot.push(obj);
                live += 1;
            }
            slots.push(slot);
        }

        log::debug!(
            "pool initialized: {} cores, {} entries/slot, {} embedded objects, paged={}",
            cores,
            slot_entries,
            live,
            paged
        );

        Ok(Self {
            capacity: config.capacity,
            object_size: config.object_size,
            slot_entries,
            cores: cores as u16,
            live,
            paged,
            bulk: None,
            slots,
            stats: config.enable_stats.then(|| Arc::new(PoolStats::default())),
        })
    }

    /// Carve objects out of a caller-provided buffer at `stride` intervals
    /// and scatter them across the slots
    ///
    /// Returns the number of objects inserted. The buffer is recorded and
    /// reported once through the release callback at drain.
    ///
    /// # Safety
    ///
    /// `buf` must point to `len` readable and writable bytes that outlive
    /// every use of the pool, and must not overlap storage already managed
    /// by it. Must not run concurrently with `push`/`pop`; population is an
    /// initialization step.
    pub unsafe fn populate(&mut self, buf: NonNull<u8>, len: usize, stride: usize) -> Result<usize> {
        unsafe { self.populate_with(buf, len, stride, |_obj| Ok(())) }
    }

    /// [`populate`](Self::populate) with an object-init callback run on
    /// each carved reference before insertion
    ///
    /// # Safety
    ///
    /// Same contract as [`populate`](Self::populate).
    pub unsafe fn populate_with<F>(
        &mut self,
        buf: NonNull<u8>,
        len: usize,
        stride: usize,
        mut object_init: F,
    ) -> Result<usize>
    where
        F: FnMut(NonNull<u8>) -> Result<()>,
    {
        if self.slots.is_empty() {
            return Err(PoolError::invalid_argument("pool has been drained"));
        }
        if self.bulk.is_some() {
            return Err(PoolError::invalid_argument("bulk buffer already recorded"));
        }
        if stride == 0 || len < stride {
            return Err(PoolError::invalid_argument(
                "stride must be non-zero and no larger than the buffer",
            ));
        }
        if self.object_size != 0 && stride != self.object_size {
            return Err(PoolError::invalid_argument(
                "stride differs from the configured object size",
            ));
        }
        let word = mem::size_of::<*mut u8>();
        if (buf.as_ptr() as usize) % word != 0 || stride % word != 0 {
            return Err(PoolError::invalid_argument(
                "buffer and stride must be word aligned",
            ));
        }

        let total = self.total_capacity();
        let mut used = 0usize;
        let mut count = 0usize;
        while used + stride <= len {
            if u64::from(self.live) >= total {
                break;
            }
            let obj = unsafe { NonNull::new_unchecked(buf.as_ptr().add(used)) };
            object_init(obj)?;
            self.scatter(obj);
            used += stride;
            count += 1;
        }

        if count == 0 {
            return Err(PoolError::capacity_exhausted(self.capacity));
        }

        self.bulk = Some((buf, len));
        if self.object_size == 0 {
            self.object_size = stride;
        }
        log::debug!("populated {} objects from a {} byte buffer", count, len);
        Ok(count)
    }

    /// Insert one externally-owned object reference
    ///
    /// # Safety
    ///
    /// `obj` must stay valid for the pool's lifetime; its storage is the
    /// caller's to reclaim after drain reports it. Must not run
    /// concurrently with `push`/`pop`; population is an initialization
    /// step.
    pub unsafe fn add_scattered(&mut self, obj: NonNull<u8>) -> Result<()> {
        if self.slots.is_empty() {
            return Err(PoolError::invalid_argument("pool has been drained"));
        }
        if u64::from(self.live) >= self.total_capacity() {
            return Err(PoolError::invalid_argument("pool is at capacity"));
        }
        self.scatter(obj);
        Ok(())
    }

    /// Round-robin insertion during quiescent population; every target has
    /// room by the capacity check, so the unconditional primitive applies
    fn scatter(&mut self, obj: NonNull<u8>) {
        let core = self.live as usize % self.slots.len();
        self.slots[core].push(obj);
        self.live += 1;
    }

    /// Return an object to the pool
    ///
    /// Starts at the caller's current core. When every slot is sized for
    /// the full working set this takes the unconditional single-ticket
    /// path; an oversubscribed pool uses the bounded primitive and walks
    /// past full slots. Never blocks and never allocates.
    ///
    /// # Safety
    ///
    /// `obj` must have been obtained from this pool (via [`pop`](Self::pop))
    /// or inserted through one of its population paths, and must not be
    /// pushed again before it is popped again.
    pub unsafe fn push(&self, obj: NonNull<u8>) -> Result<()> {
        if self.slots.is_empty() {
            return Err(PoolError::invalid_argument("pool has been drained"));
        }

        let cores = self.slots.len();
        let mut core = placement::current_core() % cores;

        if self.live > self.slot_entries {
            let mut walked = false;
            loop {
                if self.slots[core].try_push(obj) {
                    break;
                }
                walked = true;
                core += 1;
                if core >= cores {
                    core = 0;
                }
            }
            if let Some(stats) = &self.stats {
                if walked {
                    stats.push_walks.fetch_add(1, Ordering::Relaxed);
                }
            }
        } else {
            self.slots[core].push(obj);
        }

        if let Some(stats) = &self.stats {
            stats.pushes.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }

    /// Take an object from the pool, or `None` if every slot is observed
    /// empty in one full pass
    ///
    /// Starts at the caller's current core and walks every slot once. A
    /// slot whose head position is reserved by an in-flight push is
    /// abandoned rather than spun on, so an empty result is possible while
    /// a preempted pusher holds the only object. Never blocks and never
    /// allocates.
    pub fn pop(&self) -> Option<NonNull<u8>> {
        let cores = self.slots.len();
        if cores == 0 {
            return None;
        }

        let start = placement::current_core() % cores;
        for visited in 0..cores {
            let mut index = start + visited;
            if index >= cores {
                index -= cores;
            }
            match self.slots[index].try_pop() {
                SlotPop::Taken(obj) => {
                    if let Some(stats) = &self.stats {
                        stats.pops.fetch_add(1, Ordering::Relaxed);
                        if visited > 0 {
                            stats.remote_pops.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                    return Some(obj);
                }
                SlotPop::Empty => {}
                SlotPop::Stalled => {
                    if let Some(stats) = &self.stats {
                        stats.slot_abandons.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }
        }

        if let Some(stats) = &self.stats {
            stats.empty_pops.fetch_add(1, Ordering::Relaxed);
        }
        None
    }

    /// Drain every slot, surface each reference to `release` exactly once,
    /// then release all slot storage
    ///
    /// Objects embedded in slot allocations and the carved contents of the
    /// bulk buffer report `external == false`; their storage is freed with
    /// the slots (or reported as the one [`ReleaseEvent::Buffer`] event).
    /// Everything else is the caller's to reclaim. Must be externally
    /// serialized against live `push`/`pop`. A second drain is a no-op.
    pub fn drain<F>(&mut self, mut release: F)
    where
        F: FnMut(ReleaseEvent),
    {
        if self.slots.is_empty() {
            return;
        }

        for index in 0..self.slots.len() {
            while let SlotPop::Taken(obj) = self.slots[index].try_pop() {
                let external = !self.is_slot_embedded(obj) && !self.is_in_bulk_buffer(obj);
                release(ReleaseEvent::Object { obj, external });
            }
        }

        if let Some((buf, len)) = self.bulk.take() {
            release(ReleaseEvent::Buffer { buf, len });
        }

        self.live = 0;
        self.slots.clear();
        log::debug!("pool drained");
    }

    /// Whether `obj` lives inside one of the slot allocations
    fn is_slot_embedded(&self, obj: NonNull<u8>) -> bool {
        self.slots.iter().any(|slot| slot.contains(obj))
    }

    /// Whether `obj` lives inside the recorded bulk buffer
    fn is_in_bulk_buffer(&self, obj: NonNull<u8>) -> bool {
        match self.bulk {
            Some((buf, len)) => {
                let base = buf.as_ptr() as usize;
                let addr = obj.as_ptr() as usize;
                addr >= base && addr < base + len
            }
            None => false,
        }
    }

    fn total_capacity(&self) -> u64 {
        u64::from(self.slot_entries) * self.slots.len() as u64
    }

    /// Requested object capacity
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Object size in bytes; zero when nothing fixed it yet
    pub fn object_size(&self) -> usize {
        self.object_size
    }

    /// Ring capacity of each per-core slot
    pub fn per_slot_capacity(&self) -> u32 {
        self.slot_entries
    }

    /// Number of per-core slots the pool was built with
    pub fn cores(&self) -> usize {
        self.cores as usize
    }

    /// Objects added across all population paths
    pub fn live_objects(&self) -> u32 {
        self.live
    }

    /// Whether teardown already ran
    pub fn is_drained(&self) -> bool {
        self.slots.is_empty()
    }

    /// Whether slot storage came from the paged allocator
    ///
    /// Decided by the first slot's footprint at init and reused when the
    /// storage is released.
    pub fn paged_slots(&self) -> bool {
        self.paged
    }

    /// Operation counters, when enabled at init
    pub fn stats(&self) -> Option<Arc<PoolStats>> {
        self.stats.clone()
    }

    /// Relaxed per-slot occupancy snapshot; exact only while quiescent
    pub fn slot_occupancy(&self) -> Vec<u32> {
        self.slots.iter().map(Slot::occupancy).collect()
    }
}
