//! Region Allocator Module
//!
//! Free-list allocator for variable-size byte ranges inside fixed-size
//! pages. Independent of the heap file store.
//!
//! ## Policy
//! - First fit, lowest linear address first
//! - Requests below `min_region_size` are rounded up
//! - Split on allocation; the remainder stays free
//! - No coalescing on free: adjacent free regions stay separate, so
//!   repeated alloc/free cycles fragment the free list

mod region;

use std::collections::BTreeMap;

use parking_lot::Mutex;

pub use region::Region;

/// Allocator over `initial_regions` pages of `page_size` bytes
pub struct RegionAllocator {
    page_size: usize,
    min_region_size: usize,

    /// Free regions keyed by linear address
    free_list: Mutex<BTreeMap<u64, Region>>,
}

impl RegionAllocator {
    /// Create an allocator with one full free region per page in
    /// `[0, initial_regions)`
    pub fn new(initial_regions: u32, page_size: usize, min_region_size: usize) -> Self {
        let free_list = (0..initial_regions)
            .map(|page_nr| Region::new(page_nr, 0, page_size))
            .map(|region| (region.address(page_size), region))
            .collect();

        Self {
            page_size,
            min_region_size,
            free_list: Mutex::new(free_list),
        }
    }

    /// Allocate `size` bytes (at least `min_region_size`)
    ///
    /// Returns `None` when no free region is large enough; the allocator
    /// never adds pages on its own.
    pub fn alloc(&self, size: usize) -> Option<Region> {
        let size = size.max(self.min_region_size);
        let mut free_list = self.free_list.lock();

        let (&address, &found) = free_list.iter().find(|(_, region)| region.size() >= size)?;
        free_list.remove(&address);

        let allocated = Region::new(found.page_nr(), found.offset(), size);
        if found.size() > size {
            let rest = Region::new(found.page_nr(), found.offset() + size, found.size() - size);
            free_list.insert(rest.address(self.page_size), rest);
        }

        tracing::trace!(%allocated, "allocated region");
        Some(allocated)
    }

    /// Return a region to the free list
    ///
    /// Returns `false` and keeps the existing entry if a free region already
    /// starts at the same address.
    pub fn free(&self, region: Region) -> bool {
        let mut free_list = self.free_list.lock();
        let address = region.address(self.page_size);
        if free_list.contains_key(&address) {
            tracing::warn!(%region, "region already free at this address");
            return false;
        }
        free_list.insert(address, region);
        true
    }

    /// Snapshot of the free regions in address order
    pub fn free_regions(&self) -> Vec<Region> {
        self.free_list.lock().values().copied().collect()
    }

    /// Total free bytes
    pub fn free_bytes(&self) -> usize {
        self.free_list.lock().values().map(Region::size).sum()
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn min_region_size(&self) -> usize {
        self.min_region_size
    }
}
