// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Memory Management
//!
//! The kernel does not own guest memory. It validates SVC arguments and
//! hands the actual work to a memory subsystem through two traits:
//!
//! - [`GuestMemory`]: byte-level access to the guest address space
//! - [`MemorySubsystem`]: allocation, mirroring, queries and shared memory
//!
//! [`AddressSpace`] is a self-contained implementation of both.

pub mod address_space;

use bitflags::bitflags;

use crate::object::{well_known, Handle};
use crate::result::AccessFault;

pub use address_space::{AddressSpace, HEAP_BASE, HEAP_END, LINEAR_HEAP_BASE, LINEAR_HEAP_END};

/// ============================================================================
/// Page Utilities
/// ============================================================================

/// Guest page size
pub const PAGE_SIZE: u32 = 0x1000;

/// Check if a value is aligned to a page boundary
#[inline]
pub const fn is_page_aligned(value: u32) -> bool {
    value & (PAGE_SIZE - 1) == 0
}

/// Round down to a page boundary
#[inline]
pub const fn align_page_down(value: u32) -> u32 {
    value & !(PAGE_SIZE - 1)
}

/// ============================================================================
/// Memory Permissions
/// ============================================================================

bitflags! {
    /// Memory permission bits as encoded in SVC arguments
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MemoryPermission: u32 {
        const READ = 1 << 0;
        const WRITE = 1 << 1;
        const EXECUTE = 1 << 2;
        const READ_WRITE = Self::READ.bits() | Self::WRITE.bits();
        const DONT_CARE = 0x1000_0000;
    }
}

impl MemoryPermission {
    /// No access
    pub const NONE: Self = Self::empty();

    /// Parse the caller-side permission of a memory block
    ///
    /// Only Read, Write and ReadWrite are accepted.
    pub fn parse_my(raw: u32) -> Option<Self> {
        match raw {
            1..=3 => Some(Self::from_bits_retain(raw)),
            _ => None,
        }
    }

    /// Parse the other-side permission of a memory block
    ///
    /// None, Read, Write and ReadWrite are accepted; DontCare only when
    /// `allow_dont_care` is set.
    pub fn parse_other(raw: u32, allow_dont_care: bool) -> Option<Self> {
        match raw {
            0..=3 => Some(Self::from_bits_retain(raw)),
            r if r == Self::DONT_CARE.bits() && allow_dont_care => Some(Self::DONT_CARE),
            _ => None,
        }
    }

    /// Render as `rwx`
    pub fn to_rwx(self) -> [char; 3] {
        [
            if self.contains(Self::READ) { 'r' } else { '-' },
            if self.contains(Self::WRITE) { 'w' } else { '-' },
            if self.contains(Self::EXECUTE) { 'x' } else { '-' },
        ]
    }
}

/// ============================================================================
/// Memory State
/// ============================================================================

/// State of a guest memory range, as reported by QueryMemory
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryState {
    Free = 0,
    Reserved = 1,
    Io = 2,
    Static = 3,
    Code = 4,
    Private = 5,
    Shared = 6,
    Continuous = 7,
    Aliased = 8,
    Alias = 9,
    AliasCode = 10,
    Locked = 11,
}

impl MemoryState {
    /// Get raw value
    pub const fn into_raw(self) -> u32 {
        self as u32
    }
}

/// Result of a memory query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryInfo {
    /// Base of the covering range
    pub base_addr: u32,

    /// Size of the covering range
    pub size: u32,

    /// Access permissions
    pub perms: MemoryPermission,

    /// Range state
    pub state: MemoryState,
}

/// ============================================================================
/// Shared Memory Regions
/// ============================================================================

/// Kernel shared memory regions addressable by well-known handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SharedMemoryRegion {
    /// GPU command/interrupt region
    Gsp,

    /// System font region
    Font,

    /// Input device region
    Hid,
}

impl SharedMemoryRegion {
    /// Resolve a well-known handle
    pub fn from_handle(handle: Handle) -> Option<Self> {
        match handle {
            h if h == well_known::GSP_SHARED_MEM => Some(Self::Gsp),
            h if h == well_known::FONT_SHARED_MEM => Some(Self::Font),
            h if h == well_known::HID_SHARED_MEM => Some(Self::Hid),
            _ => None,
        }
    }

    /// Well-known handle of this region
    pub const fn handle(self) -> Handle {
        match self {
            Self::Gsp => well_known::GSP_SHARED_MEM,
            Self::Font => well_known::FONT_SHARED_MEM,
            Self::Hid => well_known::HID_SHARED_MEM,
        }
    }

    /// Region size in bytes
    pub const fn size(self) -> u32 {
        match self {
            Self::Gsp => 0x1000,
            Self::Font => 0x0033_2000,
            Self::Hid => 0x1000,
        }
    }
}

/// ============================================================================
/// Collaborator Traits
/// ============================================================================

/// Byte-level access to guest memory
///
/// Multi-byte values are little-endian. Only `read_u8` and `write_u8` are
/// required; implementations may override the rest for speed.
pub trait GuestMemory {
    /// Read one byte
    fn read_u8(&self, addr: u32) -> Result<u8, AccessFault>;

    /// Write one byte
    fn write_u8(&mut self, addr: u32, value: u8) -> Result<(), AccessFault>;

    /// Read a 32-bit word
    fn read_u32(&self, addr: u32) -> Result<u32, AccessFault> {
        let mut bytes = [0u8; 4];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = self.read_u8(addr.wrapping_add(i as u32))?;
        }
        Ok(u32::from_le_bytes(bytes))
    }

    /// Write a 32-bit word
    fn write_u32(&mut self, addr: u32, value: u32) -> Result<(), AccessFault> {
        self.write_bytes(addr, &value.to_le_bytes())
    }

    /// Write a byte slice
    fn write_bytes(&mut self, addr: u32, data: &[u8]) -> Result<(), AccessFault> {
        for (i, &byte) in data.iter().enumerate() {
            self.write_u8(addr.wrapping_add(i as u32), byte)?;
        }
        Ok(())
    }

    /// Copy a NUL-terminated string into `buf`
    ///
    /// Copies until a NUL has been copied or `buf` is full. Returns the
    /// number of bytes copied, terminator included. A fault before either
    /// condition is reported as an error (short read).
    fn copy_string(&self, addr: u32, buf: &mut [u8]) -> Result<usize, AccessFault> {
        for i in 0..buf.len() {
            let byte = self.read_u8(addr.wrapping_add(i as u32))?;
            buf[i] = byte;
            if byte == 0 {
                return Ok(i + 1);
            }
        }
        Ok(buf.len())
    }
}

/// Guest memory manager
///
/// Each method is called at most once per SVC, synchronously.
pub trait MemorySubsystem: GuestMemory {
    /// Allocate `size` bytes at or near `addr`
    ///
    /// `linear` requests the linear heap; `commit` backs the range
    /// immediately. Returns the base address, or `None` if the request
    /// cannot be satisfied.
    fn allocate_memory(
        &mut self,
        addr: u32,
        align: u32,
        size: u32,
        linear: bool,
        perms: MemoryPermission,
        commit: bool,
    ) -> Option<u32>;

    /// Make `dst..dst+size` an alias of `src..src+size`
    ///
    /// Returns `None`, leaving memory untouched, if the source is unmapped
    /// or the destination is occupied.
    fn mirror_mapping(&mut self, dst: u32, src: u32, size: u32) -> Option<()>;

    /// Describe the range covering `addr`
    ///
    /// Unmapped addresses report [`MemoryState::Free`].
    fn query_memory(&self, addr: u32) -> MemoryInfo;

    /// Map a kernel shared memory region at `addr`
    ///
    /// Returns the guest address of the mapping.
    fn map_shared_memory(
        &mut self,
        region: SharedMemoryRegion,
        addr: u32,
        my_perms: MemoryPermission,
        other_perms: MemoryPermission,
    ) -> Option<u32>;
}

// ============================================================================
// Tests
// ============================================================================
