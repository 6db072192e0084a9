// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Kernel Context
//!
//! All kernel-wide state (handle table, port registry, well-known port
//! handles) is owned by one [`Kernel`] instance. Independent emulator
//! instances each own their own kernel.
//!
//! # Usage
//!
//! ```ignore
//! let kernel = Kernel::new(KernelConfig::default())?;
//! let mut env = KernelEnv { memory: &mut mem, services: &mut sm, fs: &mut fs };
//! kernel.service_svc(svc, &mut frame, &mut env)?;
//! ```

use log::{error, info, warn};

use crate::mm::MemorySubsystem;
use crate::object::{
    Handle, HandleTable, KernelObject, ObjectKind, ObjectRef, ObjectType, Port, PortRegistry,
    MAX_HANDLES,
};
use crate::result::{KernelFault, ResultCode};
use crate::services::{FsHandler, ServiceManager};

/// Name of the service manager port
pub const SRV_PORT_NAME: &str = "srv:";

/// Name of the error-report port
pub const ERR_PORT_NAME: &str = "err:f";

/// Default guest address of the font region when the caller passes 0
pub const DEFAULT_FONT_ADDRESS: u32 = 0x1800_0000;

/// ============================================================================
/// Configuration
/// ============================================================================

/// Handling of call sites that the target kernel supports but this layer
/// does not implement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FaultPolicy {
    /// Stop emulation with a [`KernelFault`]
    #[default]
    Strict,

    /// Return a guest-visible [`ResultCode`] and keep going
    Lenient,
}

/// Kernel configuration
#[derive(Debug, Clone)]
pub struct KernelConfig {
    /// Number of handle table slots
    pub handle_table_capacity: usize,

    /// Policy for unimplemented call sites
    pub fault_policy: FaultPolicy,

    /// Guest address used when the font region is mapped at address 0
    pub font_map_address: u32,

    /// Font blob copied into the font region when it is mapped
    pub shared_font: Option<Vec<u8>>,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            handle_table_capacity: MAX_HANDLES,
            fault_policy: FaultPolicy::Strict,
            font_map_address: DEFAULT_FONT_ADDRESS,
            shared_font: None,
        }
    }
}

/// Collaborators borrowed for the duration of one SVC
pub struct KernelEnv<'a> {
    pub memory: &'a mut dyn MemorySubsystem,
    pub services: &'a mut dyn ServiceManager,
    pub fs: &'a mut dyn FsHandler,
}

/// ============================================================================
/// Kernel
/// ============================================================================

/// Kernel instance
pub struct Kernel {
    config: KernelConfig,
    handles: HandleTable,
    ports: PortRegistry,
    srv_port: Handle,
    err_port: Handle,
}

impl Kernel {
    /// Create and reset a kernel
    pub fn new(config: KernelConfig) -> Result<Self, KernelFault> {
        let handles = HandleTable::new(config.handle_table_capacity);
        let mut kernel = Self {
            config,
            handles,
            ports: PortRegistry::new(),
            srv_port: Handle::NULL,
            err_port: Handle::NULL,
        };
        kernel.reset()?;
        Ok(kernel)
    }

    /// Release every object and recreate the in-kernel ports
    pub fn reset(&mut self) -> Result<(), KernelFault> {
        self.ports.clear();
        self.handles.initialize();

        self.srv_port = self.create_port(SRV_PORT_NAME, true)?;
        self.err_port = self.create_port(ERR_PORT_NAME, true)?;
        info!(
            "Kernel: reset ({} handle slots, {:?} fault policy)",
            self.handles.capacity(),
            self.config.fault_policy
        );
        Ok(())
    }

    /// Create and register a named port
    pub fn create_port(&self, name: &str, public: bool) -> Result<Handle, KernelFault> {
        let port = KernelObject::create(ObjectKind::Port(Port::new(name, public)?));
        let handle = self
            .handles
            .add(port.acquire())
            .map_err(|_| KernelFault::HandleTableFull(ObjectType::Port.name()))?;

        if let Err(fault) = self.ports.register(handle, port) {
            // Undo the table entry; the handle was never published
            let _ = self.handles.remove(handle);
            return Err(fault);
        }
        Ok(handle)
    }

    /// Create an object and store it in the handle table
    pub fn create_object(&self, kind: ObjectKind) -> Result<Handle, ResultCode> {
        self.handles.add(KernelObject::create(kind))
    }

    /// Resolve a handle to an object of the given type
    pub fn get_object(&self, handle: Handle, object_type: ObjectType) -> Option<ObjectRef> {
        self.handles
            .get(handle)
            .filter(|object| object.object_type() == object_type)
    }

    /// Remove a handle from the table
    pub fn close_handle(&self, handle: Handle) -> Result<(), ResultCode> {
        self.handles.remove(handle)
    }

    /// Turn a fault at an unimplemented call site into a result per policy
    pub(crate) fn soft_fault(
        &self,
        fault: KernelFault,
        code: ResultCode,
    ) -> Result<ResultCode, KernelFault> {
        match self.config.fault_policy {
            FaultPolicy::Strict => {
                error!("{}", fault);
                Err(fault)
            }
            FaultPolicy::Lenient => {
                warn!("{} (returning {:?})", fault, code);
                Ok(code)
            }
        }
    }

    /// Configuration
    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    /// Handle table
    pub fn handles(&self) -> &HandleTable {
        &self.handles
    }

    /// Port registry
    pub fn ports(&self) -> &PortRegistry {
        &self.ports
    }

    /// Handle of the `srv:` port
    pub fn srv_port(&self) -> Handle {
        self.srv_port
    }

    /// Handle of the `err:f` port
    pub fn err_port(&self) -> Handle {
        self.err_port
    }
}

// ============================================================================
// Tests
// ============================================================================
