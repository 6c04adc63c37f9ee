use std::alloc::{self, Layout};
use std::ptr::NonNull;
use thiserror::Error;

/// Why a region reservation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub(crate) enum RegionError {
    #[error("allocation of {size} bytes failed")]
    AllocFailed { size: usize },

    #[cfg(all(feature = "numa", target_os = "linux"))]
    #[error("binding region to NUMA node {node} failed")]
    BindFailed { node: u32 },
}

enum Backing {
    Heap { layout: Layout },
    #[cfg(all(feature = "numa", target_os = "linux"))]
    Mapped { len: usize },
}

/// Zeroed, cache-aligned backing memory for an instance's slot array.
///
/// With the `numa` feature on Linux, a reservation that names a node is
/// `mmap`ed and bound to that node with `mbind`; everywhere else it comes
/// from the global allocator and placement is left to the OS.
pub(crate) struct Region {
    ptr: NonNull<u8>,
    size: usize,
    backing: Backing,
}

// SAFETY: a Region is inert memory; all synchronization happens through the
// atomic cells constructed inside it.
unsafe impl Send for Region {}
unsafe impl Sync for Region {}

impl Region {
    /// Reserves `size` bytes at `align`, zeroed, optionally on `numa_node`.
    pub(crate) fn reserve(
        name: &str,
        size: usize,
        align: usize,
        numa_node: Option<u32>,
    ) -> Result<Self, RegionError> {
        debug_assert!(size > 0 && align.is_power_of_two());
        let region = match numa_node {
            #[cfg(all(feature = "numa", target_os = "linux"))]
            Some(node) => Self::reserve_mapped(size, node)?,
            _ => Self::reserve_heap(size, align)?,
        };
        tracing::debug!(name, size, ?numa_node, "reserved slot region");
        Ok(region)
    }

    #[inline]
    pub(crate) fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    #[inline]
    pub(crate) fn size(&self) -> usize {
        self.size
    }

    fn reserve_heap(size: usize, align: usize) -> Result<Self, RegionError> {
        let layout = Layout::from_size_align(size, align)
            .map_err(|_| RegionError::AllocFailed { size })?;
        // SAFETY: layout has nonzero size (asserted by the caller).
        let raw = unsafe { alloc::alloc_zeroed(layout) };
        let ptr = NonNull::new(raw).ok_or(RegionError::AllocFailed { size })?;
        Ok(Self {
            ptr,
            size,
            backing: Backing::Heap { layout },
        })
    }

    #[cfg(all(feature = "numa", target_os = "linux"))]
    fn reserve_mapped(size: usize, node: u32) -> Result<Self, RegionError> {
        use std::ptr;

        // Callers validate the node id at construction time; the nodemask
        // below is a single 64-bit word.
        debug_assert!((node as usize) < crate::config::MAX_NUMA_NODES);

        // From linux/mempolicy.h; the libc crate does not export these.
        const MPOL_BIND: libc::c_long = 2;

        // SAFETY: anonymous private mapping, no file descriptor involved.
        let raw = unsafe {
            libc::mmap(
                ptr::null_mut(),
                size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if raw == libc::MAP_FAILED {
            return Err(RegionError::AllocFailed { size });
        }

        let nodemask: libc::c_ulong = 1 << node;
        // SAFETY: raw is a live mapping of `size` bytes; the nodemask covers
        // 64 nodes, which is what the maxnode argument states.
        let rc = unsafe {
            libc::syscall(
                libc::SYS_mbind,
                raw,
                size,
                MPOL_BIND,
                std::ptr::addr_of!(nodemask),
                65_usize, // maxnode counts one past the highest usable bit
                0_u32,
            )
        };
        if rc != 0 {
            // SAFETY: raw was returned by the mmap above.
            unsafe { libc::munmap(raw, size) };
            return Err(RegionError::BindFailed { node });
        }

        // mmap pages are zeroed and page-aligned, which exceeds any cache
        // line alignment the slot array needs.
        let ptr = NonNull::new(raw.cast::<u8>()).ok_or(RegionError::AllocFailed { size })?;
        Ok(Self {
            ptr,
            size,
            backing: Backing::Mapped { len: size },
        })
    }
}

impl Drop for Region {
    fn drop(&mut self) {
        match self.backing {
            Backing::Heap { layout } => {
                // SAFETY: ptr was returned by alloc_zeroed with this layout.
                unsafe { alloc::dealloc(self.ptr.as_ptr(), layout) };
            }
            #[cfg(all(feature = "numa", target_os = "linux"))]
            Backing::Mapped { len } => {
                // SAFETY: ptr/len describe the mapping created in reserve_mapped.
                unsafe { libc::munmap(self.ptr.as_ptr().cast(), len) };
            }
        }
    }
}

impl std::fmt::Debug for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Region")
            .field("ptr", &self.ptr)
            .field("size", &self.size)
            .finish()
    }
}
