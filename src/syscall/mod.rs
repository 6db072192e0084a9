// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Supervisor Call Interface
//!
//! Guest code enters the kernel with `svc #n`. The emulator loop hands the
//! SVC number and the guest register file to [`Kernel::service_svc`], which
//! decodes arguments, runs the handler and writes results back.
//!
//! # Register Convention
//!
//! | Register | On entry | On return |
//! |----------|----------|-----------|
//! | r0-r3 | arguments | result code, outputs |
//! | r4-r5 | extra arguments | extra outputs |
//! | r13 (sp) | spilled arguments at sp+4.. | unchanged |
//!
//! The IPC command buffer of the calling thread lives at TLS + 0x80.
//!
//! # Error Convention
//!
//! A handler returning `Ok(())` has written a [`ResultCode`] to r0: either
//! success or a guest-recoverable failure. `Err(KernelFault)` stops
//! emulation.

// SVC entry traces: info! with `svc_trace`, debug! otherwise
#[cfg(feature = "svc_trace")]
macro_rules! log_svc {
    ($($arg:tt)*) => { log::info!($($arg)*) };
}

#[cfg(not(feature = "svc_trace"))]
macro_rules! log_svc {
    ($($arg:tt)*) => { log::debug!($($arg)*) };
}

pub mod ipc;
pub mod memory;

use log::error;

use crate::kernel::{Kernel, KernelEnv};
use crate::object::Handle;
use crate::result::{KernelFault, ResultCode};

/// ============================================================================
/// SVC Frame
/// ============================================================================

/// Guest register state at SVC entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SvcFrame {
    /// General purpose registers r0-r15
    pub regs: [u32; 16],

    /// Thread-local storage base of the calling thread
    pub tls: u32,
}

impl SvcFrame {
    /// Stack pointer register index
    pub const SP: usize = 13;

    /// Offset of the IPC command buffer from TLS
    pub const IPC_BUFFER_OFFSET: u32 = 0x80;

    /// Create a frame with the given registers
    pub const fn new(regs: [u32; 16], tls: u32) -> Self {
        Self { regs, tls }
    }

    /// Get register at index
    pub const fn reg(&self, index: usize) -> u32 {
        if index < 16 {
            self.regs[index]
        } else {
            0
        }
    }

    /// Set register at index
    pub fn set_reg(&mut self, index: usize, value: u32) {
        if let Some(reg) = self.regs.get_mut(index) {
            *reg = value;
        }
    }

    /// Get register as a handle
    pub const fn handle(&self, index: usize) -> Handle {
        Handle::from_raw(self.reg(index))
    }

    /// Result code in r0
    pub const fn result(&self) -> ResultCode {
        ResultCode(self.regs[0])
    }

    /// Write a result code to r0
    pub fn set_result(&mut self, code: ResultCode) {
        self.regs[0] = code.raw();
    }

    /// Stack pointer
    pub const fn sp(&self) -> u32 {
        self.regs[Self::SP]
    }

    /// Guest address of the IPC command buffer
    pub const fn ipc_buffer(&self) -> u32 {
        self.tls.wrapping_add(Self::IPC_BUFFER_OFFSET)
    }
}

/// ============================================================================
/// SVC Dispatcher
/// ============================================================================

impl Kernel {
    /// Service one supervisor call
    ///
    /// # Arguments
    ///
    /// * `svc` - SVC number from the trapping instruction
    /// * `frame` - Guest registers; updated in place
    /// * `env` - Collaborators for this call
    pub fn service_svc(
        &self,
        svc: u32,
        frame: &mut SvcFrame,
        env: &mut KernelEnv<'_>,
    ) -> Result<(), KernelFault> {
        match svc {
            number::CONTROL_MEMORY => self.control_memory(frame, env.memory),
            number::QUERY_MEMORY => self.query_memory(frame, env.memory),
            number::CREATE_MEMORY_BLOCK => self.create_memory_block(frame, env.memory),
            number::MAP_MEMORY_BLOCK => self.map_memory_block(frame, env),
            number::CLOSE_HANDLE => self.svc_close_handle(frame),
            number::CONNECT_TO_PORT => self.connect_to_port(frame, env.memory),
            number::SEND_SYNC_REQUEST => self.send_sync_request(frame, env),
            _ => {
                error!("Unimplemented SVC {:#04X} (r0 = {:08X})", svc, frame.reg(0));
                Err(KernelFault::UnimplementedSvc(svc))
            }
        }
    }

    /// CloseHandle(Handle handle)
    pub fn svc_close_handle(&self, frame: &mut SvcFrame) -> Result<(), KernelFault> {
        let handle = frame.handle(0);
        log_svc!("CloseHandle(handle = {:#X})", handle.raw());

        let code = match self.close_handle(handle) {
            Ok(()) => ResultCode::SUCCESS,
            Err(code) => code,
        };
        frame.set_result(code);
        Ok(())
    }
}

/// ============================================================================
/// SVC Numbers
/// ============================================================================

pub mod number {
    /// Allocate, map or reprotect memory
    pub const CONTROL_MEMORY: u32 = 0x01;
    /// Describe the range covering an address
    pub const QUERY_MEMORY: u32 = 0x02;
    /// Nominate memory for sharing
    pub const CREATE_MEMORY_BLOCK: u32 = 0x1E;
    /// Map a memory block or kernel shared region
    pub const MAP_MEMORY_BLOCK: u32 = 0x1F;
    /// Close a handle
    pub const CLOSE_HANDLE: u32 = 0x23;
    /// Connect to a named port
    pub const CONNECT_TO_PORT: u32 = 0x2D;
    /// Send an IPC request
    pub const SEND_SYNC_REQUEST: u32 = 0x32;
}

// ============================================================================
// Tests
// ============================================================================
