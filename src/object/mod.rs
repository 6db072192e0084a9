// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Kernel Objects & Handles
//!
//! This module implements the kernel object model exposed to guest code.
//! All kernel resources are reached through handles resolved by a
//! per-kernel handle table.
//!
//! # Design
//!
//! - **Reference counting**: objects are destroyed when the last reference drops
//! - **Handle encoding**: bit-exact 32-bit handles with stale-slot detection
//! - **Object kinds**: Port, Session, MemoryBlock, File, Directory
//!
//! # Modules
//!
//! - [`kobject`] - Kernel object base and scoped references
//! - [`handle`] - Handle encoding and handle table
//! - [`port`] - Ports, sessions and the port registry
//! - [`memory_block`] - Shared memory blocks
//! - [`fs`] - File and directory objects

pub mod fs;
pub mod handle;
pub mod kobject;
pub mod memory_block;
pub mod port;

#[cfg(test)]
mod tests_prop;

// Re-exports
pub use fs::{DirectoryObject, FileObject};
pub use handle::{well_known, Handle, HandleTable, MAX_HANDLES, MAX_TABLE_SIZE};
pub use kobject::{FinalizeHook, KernelObject, ObjectKind, ObjectRef, ObjectType, TypeObj};
pub use memory_block::MemoryBlock;
pub use port::{Port, PortRegistry, Session, MAX_PORT_NAME_LEN};
