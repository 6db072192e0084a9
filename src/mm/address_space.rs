// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Guest Address Space
//!
//! A software model of one guest process's virtual memory, implementing
//! [`GuestMemory`] and [`MemorySubsystem`].
//!
//! - Ranges are tracked as VMAs keyed by base address
//! - Backing pages are allocated lazily on first write
//! - Mirrored ranges share frames with their source
//!
//! ```text
//! 0x08000000 ┌──────────────┐
//!            │     heap     │
//! 0x10000000 └──────────────┘
//! 0x14000000 ┌──────────────┐
//!            │ linear heap  │
//! 0x1C000000 └──────────────┘
//! ```

use std::collections::BTreeMap;

use log::{trace, warn};

use super::{
    align_page_down, is_page_aligned, GuestMemory, MemoryInfo, MemoryPermission, MemoryState,
    MemorySubsystem, SharedMemoryRegion, PAGE_SIZE,
};
use crate::result::AccessFault;

/// Start of the regular heap
pub const HEAP_BASE: u32 = 0x0800_0000;

/// End of the regular heap
pub const HEAP_END: u32 = 0x1000_0000;

/// Start of the linear heap
pub const LINEAR_HEAP_BASE: u32 = 0x1400_0000;

/// End of the linear heap
pub const LINEAR_HEAP_END: u32 = 0x1C00_0000;

/// End of the 32-bit address space
const ADDRESS_SPACE_END: u64 = 1 << 32;

/// Mapped range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Vma {
    size: u32,
    perms: MemoryPermission,
    state: MemoryState,
}

impl Vma {
    fn end(&self, base: u32) -> u64 {
        base as u64 + self.size as u64
    }
}

/// Guest address space
#[derive(Default)]
pub struct AddressSpace {
    /// Mapped ranges: base address -> range info
    vmas: BTreeMap<u32, Vma>,

    /// Materialized pages: virtual page number -> frame index
    pages: BTreeMap<u32, usize>,

    /// Backing frames
    frames: Vec<Box<[u8; PAGE_SIZE as usize]>>,
}

impl AddressSpace {
    /// Create an empty address space
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct mapped ranges
    pub fn mapping_count(&self) -> usize {
        self.vmas.len()
    }

    /// Number of materialized frames
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// Find the range containing `addr`
    fn vma_at(&self, addr: u32) -> Option<(u32, &Vma)> {
        self.vmas
            .range(..=addr)
            .next_back()
            .filter(|(&base, vma)| (addr as u64) < vma.end(base))
            .map(|(&base, vma)| (base, vma))
    }

    /// Check that `base..base+size` overlaps no mapping
    fn is_free(&self, base: u32, size: u32) -> bool {
        let end = base as u64 + size as u64;
        if size == 0 || end > ADDRESS_SPACE_END {
            return false;
        }
        // Last range starting before our end must finish at or before our base
        match self.vmas.range(..=((end - 1) as u32)).next_back() {
            Some((&other, vma)) => vma.end(other) <= base as u64,
            None => true,
        }
    }

    /// First free, aligned range of `size` bytes inside `[start, end)`
    fn find_free(&self, start: u32, end: u32, size: u32, align: u32) -> Option<u32> {
        let align = align.max(PAGE_SIZE) as u64;
        let mut candidate = (start as u64).next_multiple_of(align);

        // A range starting before `start` may still cover it
        if let Some((&base, vma)) = self.vmas.range(..start).next_back() {
            candidate = candidate.max(vma.end(base)).next_multiple_of(align);
        }

        for (&base, vma) in self.vmas.range(start..end) {
            if candidate + size as u64 <= base as u64 {
                break;
            }
            candidate = candidate.max(vma.end(base)).next_multiple_of(align);
        }

        (candidate + size as u64 <= end as u64).then_some(candidate as u32)
    }

    /// Split the range covering `addr` so that a range starts exactly there
    fn split_at(&mut self, addr: u32) {
        let Some((base, vma)) = self.vma_at(addr).map(|(b, v)| (b, *v)) else {
            return;
        };
        if base == addr {
            return;
        }
        let head = addr - base;
        self.vmas.insert(base, Vma { size: head, ..vma });
        self.vmas.insert(addr, Vma { size: vma.size - head, ..vma });
    }

    /// Change the state of every mapped range within `base..base+size`
    fn set_state(&mut self, base: u32, size: u32, state: MemoryState) {
        self.split_at(base);
        if let Some(end) = base.checked_add(size) {
            self.split_at(end);
            for (_, vma) in self.vmas.range_mut(base..end) {
                vma.state = state;
            }
        }
    }

    /// Frame backing virtual page `vpn`, allocated on demand
    fn frame_for(&mut self, vpn: u32) -> usize {
        if let Some(&frame) = self.pages.get(&vpn) {
            return frame;
        }
        let frame = self.frames.len();
        self.frames.push(Box::new([0; PAGE_SIZE as usize]));
        self.pages.insert(vpn, frame);
        frame
    }

    fn check_mapped(&self, addr: u32) -> Result<(), AccessFault> {
        match self.vma_at(addr) {
            Some((_, vma)) if vma.state != MemoryState::Free => Ok(()),
            _ => Err(AccessFault(addr)),
        }
    }
}

impl GuestMemory for AddressSpace {
    fn read_u8(&self, addr: u32) -> Result<u8, AccessFault> {
        self.check_mapped(addr)?;
        let offset = (addr & (PAGE_SIZE - 1)) as usize;
        Ok(self
            .pages
            .get(&(addr / PAGE_SIZE))
            .map_or(0, |&frame| self.frames[frame][offset]))
    }

    fn write_u8(&mut self, addr: u32, value: u8) -> Result<(), AccessFault> {
        self.check_mapped(addr)?;
        let offset = (addr & (PAGE_SIZE - 1)) as usize;
        let frame = self.frame_for(addr / PAGE_SIZE);
        self.frames[frame][offset] = value;
        Ok(())
    }
}

impl MemorySubsystem for AddressSpace {
    fn allocate_memory(
        &mut self,
        addr: u32,
        align: u32,
        size: u32,
        linear: bool,
        perms: MemoryPermission,
        commit: bool,
    ) -> Option<u32> {
        if size == 0 || !is_page_aligned(size) {
            return None;
        }

        let in_linear = |a: u32| (LINEAR_HEAP_BASE..LINEAR_HEAP_END).contains(&a);
        let base = if linear {
            if addr != 0 && in_linear(addr) && self.is_free(addr, size) {
                addr
            } else {
                self.find_free(LINEAR_HEAP_BASE, LINEAR_HEAP_END, size, align)?
            }
        } else if addr != 0 {
            self.is_free(addr, size).then_some(addr)?
        } else {
            self.find_free(HEAP_BASE, HEAP_END, size, align)?
        };

        let state = match (commit, linear) {
            (false, _) => MemoryState::Reserved,
            (true, true) => MemoryState::Continuous,
            (true, false) => MemoryState::Private,
        };
        self.vmas.insert(base, Vma { size, perms, state });
        trace!(
            "AddressSpace: allocated {:#010X}..{:#010X} ({:?})",
            base,
            base as u64 + size as u64,
            state
        );
        Some(base)
    }

    fn mirror_mapping(&mut self, dst: u32, src: u32, size: u32) -> Option<()> {
        let Some((_, src_vma)) = self.vma_at(src).map(|(b, v)| (b, *v)) else {
            warn!("AddressSpace: mirror source {:#010X} is unmapped", src);
            return None;
        };
        if !self.is_free(dst, size) {
            warn!("AddressSpace: mirror destination {:#010X} is occupied", dst);
            return None;
        }

        for page in 0..size / PAGE_SIZE {
            let frame = self.frame_for(src / PAGE_SIZE + page);
            self.pages.insert(dst / PAGE_SIZE + page, frame);
        }
        self.set_state(src, size, MemoryState::Aliased);
        self.vmas.insert(
            dst,
            Vma {
                size,
                perms: src_vma.perms,
                state: MemoryState::Alias,
            },
        );
        Some(())
    }

    fn query_memory(&self, addr: u32) -> MemoryInfo {
        if let Some((base, vma)) = self.vma_at(addr) {
            return MemoryInfo {
                base_addr: base,
                size: vma.size,
                perms: vma.perms,
                state: vma.state,
            };
        }

        // Hole between the neighbouring ranges
        let addr = align_page_down(addr);
        let start = self
            .vmas
            .range(..addr)
            .next_back()
            .map_or(0, |(&base, vma)| vma.end(base));
        let end = self
            .vmas
            .range(addr..)
            .next()
            .map_or(ADDRESS_SPACE_END, |(&base, _)| base as u64);
        let size = u32::try_from(end - start).unwrap_or(u32::MAX - (PAGE_SIZE - 1));

        MemoryInfo {
            base_addr: start as u32,
            size,
            perms: MemoryPermission::NONE,
            state: MemoryState::Free,
        }
    }

    fn map_shared_memory(
        &mut self,
        region: SharedMemoryRegion,
        addr: u32,
        my_perms: MemoryPermission,
        _other_perms: MemoryPermission,
    ) -> Option<u32> {
        let size = region.size();
        if !self.is_free(addr, size) {
            return None;
        }
        self.vmas.insert(
            addr,
            Vma {
                size,
                perms: my_perms,
                state: MemoryState::Shared,
            },
        );
        Some(addr)
    }
}

// ============================================================================
// Tests
// ============================================================================
