// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! File & Directory Objects
//!
//! Handles opened through the filesystem service. The kernel only stores
//! them; every operation on them is forwarded to the filesystem handler.

/// Open file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileObject {
    /// Owning archive, as assigned by the filesystem service
    pub archive_id: u64,

    /// Path within the archive
    pub path: String,

    /// Open flags
    pub flags: u32,
}

/// Open directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryObject {
    /// Owning archive, as assigned by the filesystem service
    pub archive_id: u64,

    /// Path within the archive
    pub path: String,
}
