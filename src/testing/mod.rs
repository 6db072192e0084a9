// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Testing infrastructure for SVC verification
//!
//! Recording collaborator doubles and a harness bundling them with a
//! kernel and a reference address space.
//!
//! # Usage
//! ```ignore
//! use crate::testing::SvcTestHarness;
//!
//! let mut harness = SvcTestHarness::new();
//! let frame = harness.svc(number::QUERY_MEMORY, regs).unwrap();
//! assert_eq!(frame.result(), ResultCode::SUCCESS);
//! ```

use crate::kernel::{Kernel, KernelConfig, KernelEnv};
use crate::mm::{AddressSpace, MemoryPermission, MemorySubsystem, SharedMemoryRegion};
use crate::object::Handle;
use crate::result::KernelFault;
use crate::services::{FsHandler, ServiceManager};
use crate::syscall::SvcFrame;

/// Calls observed by [`RecordingServices`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceCall {
    Command { message: u32, service: Handle },
    SyncRequest { message: u32 },
    SharedMemory { region: SharedMemoryRegion, addr: u32 },
}

/// Service manager that records every call
#[derive(Debug, Default)]
pub struct RecordingServices {
    pub calls: Vec<ServiceCall>,
}

impl ServiceManager for RecordingServices {
    fn send_command_to_service(&mut self, message: u32, service: Handle) {
        self.calls.push(ServiceCall::Command { message, service });
    }

    fn handle_sync_request(&mut self, message: u32) {
        self.calls.push(ServiceCall::SyncRequest { message });
    }

    fn set_shared_memory(&mut self, region: SharedMemoryRegion, addr: u32) {
        self.calls.push(ServiceCall::SharedMemory { region, addr });
    }
}

/// Calls observed by [`RecordingFs`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsCall {
    File { message: u32, file: Handle },
    Directory { message: u32, dir: Handle },
}

/// Filesystem handler that records every call
#[derive(Debug, Default)]
pub struct RecordingFs {
    pub calls: Vec<FsCall>,
}

impl FsHandler for RecordingFs {
    fn handle_file_operation(&mut self, message: u32, file: Handle) {
        self.calls.push(FsCall::File { message, file });
    }

    fn handle_directory_operation(&mut self, message: u32, dir: Handle) {
        self.calls.push(FsCall::Directory { message, dir });
    }
}

/// Guest stack used by the harness
pub const STACK_BASE: u32 = 0x0FF0_0000;

/// Stack pointer handed to SVCs
pub const STACK_TOP: u32 = STACK_BASE + 0x800;

/// Thread-local storage of the calling thread
pub const TLS_BASE: u32 = 0x1FF8_2000;

/// Kernel plus collaborators for end-to-end SVC tests
pub struct SvcTestHarness {
    pub kernel: Kernel,
    pub memory: AddressSpace,
    pub services: RecordingServices,
    pub fs: RecordingFs,
}

impl SvcTestHarness {
    /// Harness with the default configuration
    pub fn new() -> Self {
        Self::with_config(KernelConfig::default())
    }

    /// Harness with a custom configuration
    ///
    /// Maps one stack page and one TLS page.
    pub fn with_config(config: KernelConfig) -> Self {
        let mut memory = AddressSpace::new();
        for base in [STACK_BASE, TLS_BASE] {
            memory
                .allocate_memory(base, 0, 0x1000, false, MemoryPermission::READ_WRITE, true)
                .expect("harness page");
        }

        Self {
            kernel: Kernel::new(config).expect("kernel reset"),
            memory,
            services: RecordingServices::default(),
            fs: RecordingFs::default(),
        }
    }

    /// Run one SVC with r0-r5 set from `args`
    pub fn svc(&mut self, svc: u32, args: [u32; 6]) -> Result<SvcFrame, KernelFault> {
        let mut regs = [0u32; 16];
        regs[..6].copy_from_slice(&args);
        regs[SvcFrame::SP] = STACK_TOP;
        let mut frame = SvcFrame::new(regs, TLS_BASE);

        let mut env = KernelEnv {
            memory: &mut self.memory,
            services: &mut self.services,
            fs: &mut self.fs,
        };
        self.kernel.service_svc(svc, &mut frame, &mut env)?;
        Ok(frame)
    }
}

impl Default for SvcTestHarness {
    fn default() -> Self {
        Self::new()
    }
}
