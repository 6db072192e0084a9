// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Service Collaborators
//!
//! The kernel routes IPC messages but implements no service commands
//! itself. Service and filesystem layers plug in through these traits.
//!
//! Message arguments are guest addresses of the IPC command buffer of the
//! calling thread. Handlers read the command from it and write the response
//! back in place.

use crate::mm::SharedMemoryRegion;
use crate::object::Handle;

/// Service command layer
pub trait ServiceManager {
    /// Execute a command sent directly to a built-in service handle
    fn send_command_to_service(&mut self, message: u32, service: Handle);

    /// Execute a command sent to the service manager port (`srv:`)
    fn handle_sync_request(&mut self, message: u32);

    /// Register the guest address of a kernel shared memory region
    fn set_shared_memory(&mut self, region: SharedMemoryRegion, addr: u32);
}

/// File and directory operation handlers
pub trait FsHandler {
    /// Execute a command sent to an open file
    fn handle_file_operation(&mut self, message: u32, file: Handle);

    /// Execute a command sent to an open directory
    fn handle_directory_operation(&mut self, message: u32, dir: Handle);
}
