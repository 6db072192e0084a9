// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! # ctrkernel - High-Level Kernel Emulation
//!
//! ctrkernel re-implements the kernel ABI of a handheld console's
//! microkernel so that unmodified guest binaries can run inside an
//! emulator. It provides:
//!
//! - **Kernel objects**: reference-counted, type-tagged, reachable only via handles
//! - **Handle table**: bit-exact handle encoding with stale-handle detection
//! - **IPC**: named ports, sessions and the sync-request dispatcher
//! - **Memory SVCs**: ControlMemory, QueryMemory, CreateMemoryBlock, MapMemoryBlock
//!
//! ## Architecture
//!
//! ```text
//! src/
//! ├── object/        # Kernel objects, handles, ports, sessions, memory blocks
//! ├── syscall/       # SVC frame, dispatcher, memory and IPC handlers
//! ├── mm/            # Permission/state model, memory collaborator traits
//! ├── services/      # Service manager and filesystem collaborator traits
//! ├── kernel.rs      # Kernel context and configuration
//! ├── result.rs      # Result codes and kernel faults
//! └── lib.rs         # This file
//! ```
//!
//! CPU emulation, service command catalogs and filesystem archives live
//! outside this crate and plug in through the collaborator traits.
//!
//! ## Servicing an SVC
//!
//! ```ignore
//! use ctrkernel::{Kernel, KernelConfig, KernelEnv, SvcFrame};
//!
//! let kernel = Kernel::new(KernelConfig::default())?;
//! let mut env = KernelEnv { memory: &mut mem, services: &mut services, fs: &mut fs };
//! let mut frame = SvcFrame::new(cpu.regs(), thread.tls());
//! kernel.service_svc(svc, &mut frame, &mut env)?;
//! cpu.set_regs(frame.regs);
//! ```

// Result codes and faults
pub mod result;

// Kernel objects (capability-based security)
pub mod object;

// Memory management
pub mod mm;

// Service collaborators
pub mod services;

// Kernel context
pub mod kernel;

// Supervisor call interface
pub mod syscall;

// Testing infrastructure
#[cfg(test)]
pub mod testing;

// Crate-internal integration tests
#[cfg(test)]
mod tests;

// Re-export kernel types
pub use kernel::{FaultPolicy, Kernel, KernelConfig, KernelEnv};

// Re-export result types
pub use result::{AccessFault, KernelFault, ResultCode};

// Re-export object types
pub use object::{
    well_known,
    Handle,
    HandleTable,
    KernelObject,
    MemoryBlock,
    ObjectKind,
    ObjectRef,
    ObjectType,
    Port,
    PortRegistry,
    Session,
};

// Re-export memory management types
pub use mm::{
    AddressSpace,
    GuestMemory,
    MemoryInfo,
    MemoryPermission,
    MemoryState,
    MemorySubsystem,
    SharedMemoryRegion,
    PAGE_SIZE,
};

// Re-export service collaborators
pub use services::{FsHandler, ServiceManager};

// Re-export syscall types
pub use syscall::{number, SvcFrame};
