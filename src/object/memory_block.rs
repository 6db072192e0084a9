// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Memory Blocks
//!
//! A memory block nominates a range of the creator's memory for sharing.
//! It is created by CreateMemoryBlock and consumed by MapMemoryBlock.

use crate::mm::MemoryPermission;

/// Shared memory block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryBlock {
    /// Base address in the creator's address space
    pub addr: u32,

    /// Size in bytes (page multiple)
    pub size: u32,

    /// Creator's permission
    pub my_permission: MemoryPermission,

    /// Permission granted to other mappers
    pub other_permission: MemoryPermission,
}

impl MemoryBlock {
    /// Describe a new block
    pub const fn new(
        addr: u32,
        size: u32,
        my_permission: MemoryPermission,
        other_permission: MemoryPermission,
    ) -> Self {
        Self {
            addr,
            size,
            my_permission,
            other_permission,
        }
    }

    /// Check whether a mapper may obtain `requested` access
    pub fn permits(&self, requested: MemoryPermission) -> bool {
        self.other_permission.contains(MemoryPermission::DONT_CARE)
            || self.other_permission.contains(requested)
    }
}
