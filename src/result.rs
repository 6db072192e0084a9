// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Result Codes & Kernel Faults
//!
//! Two tiers of failure exist at the kernel boundary:
//!
//! - **Guest-visible**: a [`ResultCode`] written to the return register.
//!   Guest software checks it and carries on.
//! - **Host-fatal**: a [`KernelFault`] returned to the emulator loop, which
//!   stops emulation. These mark unimplemented paths or broken invariants.
//!
//! # Result Code Layout
//!
//! ```text
//! 31      27 26    21 20          10 9            0
//! +---------+--------+--------------+--------------+
//! |  level  | summary|    module    | description  |
//! +---------+--------+--------------+--------------+
//! ```
//!
//! Module occupies bits 10-17; bits 18-20 are reserved.

use core::fmt;

use thiserror::Error;

use crate::object::Handle;

/// ============================================================================
/// Result Code
/// ============================================================================

/// Guest-visible result code
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResultCode(pub u32);

impl ResultCode {
    /// Operation succeeded
    pub const SUCCESS: Self = Self(0);

    /// Address not aligned to a page boundary
    pub const MISALIGNED_ADDRESS: Self = Self(0xE0E0_1BF1);

    /// Size not a multiple of the page size
    pub const MISALIGNED_SIZE: Self = Self(0xE0E0_1BF2);

    /// Invalid operation or permission combination
    pub const INVALID_COMBINATION: Self = Self(0xE0E0_1BEE);

    /// Address outside any valid range
    pub const INVALID_ADDRESS: Self = Self(0xE0E0_1BF5);

    /// Port name exceeds the maximum length
    pub const PORT_NAME_TOO_LONG: Self = Self(0xE0E0_181E);

    /// Handle does not reference a live object of the expected type
    pub const INVALID_HANDLE: Self = Self(0xD8E0_07F7);

    /// Guest pointer could not be read
    pub const INVALID_POINTER: Self = Self(0xD8E0_07F6);

    /// Named object does not exist
    pub const NOT_FOUND: Self = Self(0xD880_07FA);

    /// Handle table has no free slot
    pub const OUT_OF_HANDLES: Self = Self(0xD860_0413);

    /// Memory subsystem could not satisfy an allocation
    pub const OUT_OF_MEMORY: Self = Self(0xD860_07F3);

    /// Caller lacks permission for the target object
    pub const NOT_AUTHORIZED: Self = Self(0xD900_1BEA);

    /// Request targets functionality the kernel does not provide
    pub const NOT_IMPLEMENTED: Self = Self(0xE0E0_1BF4);

    /// Get raw value
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Check for success
    pub const fn is_success(self) -> bool {
        self.0 == 0
    }

    /// Check for failure
    pub const fn is_failure(self) -> bool {
        self.0 != 0
    }

    /// Description field (bits 0-9)
    pub const fn description(self) -> u32 {
        self.0 & 0x3FF
    }

    /// Module field (bits 10-17)
    pub const fn module(self) -> u32 {
        (self.0 >> 10) & 0xFF
    }

    /// Summary field (bits 21-26)
    pub const fn summary(self) -> u32 {
        (self.0 >> 21) & 0x3F
    }

    /// Level field (bits 27-31)
    pub const fn level(self) -> u32 {
        self.0 >> 27
    }
}

impl From<ResultCode> for u32 {
    fn from(code: ResultCode) -> u32 {
        code.0
    }
}

impl fmt::Debug for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ResultCode({:#010X})", self.0)
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:#010X} (level {}, summary {}, module {}, description {})",
            self.0,
            self.level(),
            self.summary(),
            self.module(),
            self.description()
        )
    }
}

/// ============================================================================
/// Kernel Fault
/// ============================================================================

/// Host-fatal kernel fault
///
/// Returned from SVC handlers when emulation cannot continue.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KernelFault {
    #[error("unimplemented SVC {0:#04X}")]
    UnimplementedSvc(u32),

    #[error("ControlMemory: executable mapping requested (perms {perms:#X})")]
    ExecutableMapping { perms: u32 },

    #[error("ControlMemory: unimplemented permission DONTCARE")]
    DontCarePermission,

    #[error("ControlMemory: failed to allocate {size:#010X} bytes at {addr:#010X}")]
    AllocationFailed { addr: u32, size: u32 },

    #[error("handle table exhausted while creating {0}")]
    HandleTableFull(&'static str),

    #[error("ConnectToPort: attempted to connect to private port \"{0}\"")]
    PrivatePort(String),

    #[error("SendSyncRequest targeting unrouted port \"{0}\"")]
    UnroutedPort(String),

    #[error("CreateMemoryBlock: tried to use addr = 0")]
    NullMemoryBlock,

    #[error("MapMemoryBlock: memory subsystem refused mapping of {handle:?} at {addr:#010X}")]
    SharedMemoryMapFailed { handle: Handle, addr: u32 },

    #[error("memory subsystem refused mirror of {src:#010X} at {dst:#010X} ({size:#X} bytes)")]
    MirrorFailed { dst: u32, src: u32, size: u32 },

    #[error("err:f: unknown command {0:#010X}")]
    UnknownErrorCommand(u32),

    #[error("port \"{0}\" is already registered")]
    DuplicatePort(String),

    #[error("invalid port name \"{0}\"")]
    InvalidPortName(String),

    #[error("guest memory access fault: {0}")]
    Access(#[from] AccessFault),
}

/// Guest memory access fault
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("unmapped guest address {0:#010X}")]
pub struct AccessFault(pub u32);

// ============================================================================
// Tests
// ============================================================================
