//! Slot placement: cache, core, and NUMA awareness
//!
//! Each per-core slot is one contiguous allocation, zero-filled and placed
//! on the memory node of its owning core. Two allocators back the slots:
//! the global allocator for small or atomic-context allocations, and an
//! anonymous-mapping path for page-sized slots when the caller may sleep.
//! Which one a pool used is recorded at init and reused at teardown.

use crate::error::{PoolError, Result};
use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::LazyLock;

/// Cache line size on most modern processors (64 bytes)
pub const CACHE_LINE_SIZE: usize = 64;

/// NUMA node identifier
pub type NumaNode = usize;

/// System page size in bytes
pub(crate) fn page_size() -> usize {
    #[cfg(unix)]
    {
        let sz = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        if sz > 0 {
            return sz as usize;
        }
    }
    4096
}

static NODE_COUNT: LazyLock<usize> = LazyLock::new(detect_numa_nodes);

/// Detect the number of NUMA nodes on the system
fn detect_numa_nodes() -> usize {
    #[cfg(target_os = "linux")]
    {
        if let Ok(contents) = std::fs::read_to_string("/sys/devices/system/node/online") {
            // Parse format like "0-3" or "0,2,4"
            if let Some(hyphen_pos) = contents.find('-') {
                if let Ok(max_node) = contents[hyphen_pos + 1..].trim().parse::<usize>() {
                    return max_node + 1;
                }
            }
            return contents.split(',').count().max(1);
        }
    }

    // Fallback: assume single NUMA node
    1
}

/// Number of NUMA nodes on this system
pub fn node_count() -> usize {
    *NODE_COUNT
}

/// Memory node owning the given core
///
/// Assumes the common contiguous-block topology: cores split evenly across
/// nodes in core-id order.
pub(crate) fn node_of_core(core: usize, cores: usize) -> NumaNode {
    let nodes = node_count();
    if nodes <= 1 || cores == 0 {
        return 0;
    }
    let per_node = cores.div_ceil(nodes);
    (core / per_node).min(nodes - 1)
}

/// Bind memory to a specific NUMA node (platform-specific)
fn bind_to_numa_node(ptr: *mut u8, size: usize, node: NumaNode) {
    // No-op without libnuma; placement still tracks the owning node so the
    // first-touch policy and per-core access keep slot pages local.
    let _ = (ptr, size, node);
}

static NEXT_FALLBACK_CORE: AtomicUsize = AtomicUsize::new(0);

thread_local! {
    static FALLBACK_CORE: usize = NEXT_FALLBACK_CORE.fetch_add(1, Ordering::Relaxed);
}

/// Index of the core the calling thread is currently running on
///
/// The caller may migrate at any point after this returns; the value is a
/// search-start hint, never a correctness requirement. Platforms without a
/// cheap query fall back to a stable per-thread assignment.
pub(crate) fn current_core() -> usize {
    #[cfg(target_os = "linux")]
    {
        let cpu = unsafe { libc::sched_getcpu() };
        if cpu >= 0 {
            return cpu as usize;
        }
    }

    FALLBACK_CORE.with(|&core| core)
}

/// Allocate zeroed slot storage of `bytes` bytes on `node`
///
/// `paged` selects the anonymous-mapping allocator; the same flag must be
/// passed to [`dealloc_slot_storage`]. Alignment is at least a cache line
/// on both paths.
pub(crate) fn alloc_slot_storage(bytes: usize, paged: bool, node: NumaNode) -> Result<NonNull<u8>> {
    if paged {
        return alloc_paged(bytes, node);
    }

    let layout = Layout::from_size_align(bytes, CACHE_LINE_SIZE)
        .map_err(|_| PoolError::invalid_argument("slot layout exceeds address space"))?;
    let ptr = unsafe { alloc_zeroed(layout) };
    let ptr = NonNull::new(ptr).ok_or_else(|| PoolError::out_of_memory(bytes))?;
    bind_to_numa_node(ptr.as_ptr(), bytes, node);
    Ok(ptr)
}

/// Release slot storage obtained from [`alloc_slot_storage`]
pub(crate) fn dealloc_slot_storage(ptr: NonNull<u8>, bytes: usize, paged: bool) {
    if paged {
        dealloc_paged(ptr, bytes);
        return;
    }

    let layout = Layout::from_size_align(bytes, CACHE_LINE_SIZE)
        .expect("layout validated at allocation time");
    unsafe { dealloc(ptr.as_ptr(), layout) };
}

#[cfg(unix)]
fn alloc_paged(bytes: usize, node: NumaNode) -> Result<NonNull<u8>> {
    let len = bytes.max(1);
    let ptr = unsafe {
        libc::mmap(
            std::ptr::null_mut(),
            len,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
            -1,
            0,
        )
    };
    if ptr == libc::MAP_FAILED {
        return Err(PoolError::out_of_memory(bytes));
    }
    bind_to_numa_node(ptr as *mut u8, bytes, node);
    // mmap returns page-aligned, zero-filled memory
    Ok(unsafe { NonNull::new_unchecked(ptr as *mut u8) })
}

#[cfg(unix)]
fn dealloc_paged(ptr: NonNull<u8>, bytes: usize) {
    let rc = unsafe { libc::munmap(ptr.as_ptr() as *mut libc::c_void, bytes.max(1)) };
    if rc != 0 {
        log::warn!("munmap of {} byte slot failed", bytes);
    }
}

#[cfg(not(unix))]
fn alloc_paged(bytes: usize, node: NumaNode) -> Result<NonNull<u8>> {
    // No mapping primitive here; the global allocator serves paged requests
    let _ = node;
    alloc_slot_storage(bytes, false, 0)
}

#[cfg(not(unix))]
fn dealloc_paged(ptr: NonNull<u8>, bytes: usize) {
    dealloc_slot_storage(ptr, bytes, false);
}
