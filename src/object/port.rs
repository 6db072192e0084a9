// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Ports & Sessions
//!
//! A port is a named rendezvous point registered by a server; clients
//! connect to it by name and receive a session bound to it.
//!
//! ```text
//! Port:     unregistered ──(create)──► registered ──► teardown
//! Session:  none ──(connect)──► bound to port ──(close)──► destroyed
//! ```

use log::debug;
use spin::Mutex;

use super::handle::Handle;
use super::kobject::ObjectRef;
use crate::result::KernelFault;

/// Maximum port name length, excluding the terminator
pub const MAX_PORT_NAME_LEN: usize = 11;

/// ============================================================================
/// Port
/// ============================================================================

/// Named IPC port
#[derive(Debug)]
pub struct Port {
    name: String,
    public: bool,
}

impl Port {
    /// Create a port description
    ///
    /// Names must be non-empty, at most [`MAX_PORT_NAME_LEN`] bytes and
    /// contain no NUL.
    pub fn new(name: &str, public: bool) -> Result<Self, KernelFault> {
        if name.is_empty() || name.len() > MAX_PORT_NAME_LEN || name.contains('\0') {
            return Err(KernelFault::InvalidPortName(name.into()));
        }
        Ok(Self {
            name: name.into(),
            public,
        })
    }

    /// Port name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether any process may connect
    pub fn is_public(&self) -> bool {
        self.public
    }
}

/// ============================================================================
/// Session
/// ============================================================================

/// Connected channel to a port
///
/// Keeps its port alive for as long as the session exists.
#[derive(Debug)]
pub struct Session {
    port_handle: Handle,
    port: ObjectRef,
}

impl Session {
    /// Bind a new session to a port
    pub fn new(port_handle: Handle, port: ObjectRef) -> Self {
        Self { port_handle, port }
    }

    /// Handle of the owning port
    pub fn port_handle(&self) -> Handle {
        self.port_handle
    }

    /// The owning port object
    pub fn port(&self) -> &ObjectRef {
        &self.port
    }

    /// Name of the owning port
    pub fn port_name(&self) -> &str {
        self.port.as_port().map_or("<not a port>", Port::name)
    }
}

/// ============================================================================
/// Port Registry
/// ============================================================================

/// Registered port entry
struct RegisteredPort {
    handle: Handle,
    object: ObjectRef,
}

/// Registry of named ports
///
/// Holds its own reference to each registered port, so a port outlives the
/// closing of its creation handle.
#[derive(Default)]
pub struct PortRegistry {
    ports: Mutex<Vec<RegisteredPort>>,
}

impl PortRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a port under its handle
    pub fn register(&self, handle: Handle, object: ObjectRef) -> Result<(), KernelFault> {
        let name = match object.as_port() {
            Some(port) => port.name().to_string(),
            None => return Err(KernelFault::InvalidPortName(object.name().into())),
        };

        let mut ports = self.ports.lock();
        if ports
            .iter()
            .any(|p| p.object.as_port().is_some_and(|port| port.name() == name))
        {
            return Err(KernelFault::DuplicatePort(name));
        }

        debug!("PortRegistry: registered \"{}\" as {:?}", name, handle);
        ports.push(RegisteredPort { handle, object });
        Ok(())
    }

    /// Exact-match lookup by name
    pub fn lookup(&self, name: &str) -> Option<(Handle, ObjectRef)> {
        self.ports
            .lock()
            .iter()
            .find(|p| p.object.as_port().is_some_and(|port| port.name() == name))
            .map(|p| (p.handle, p.object.acquire()))
    }

    /// Number of registered ports
    pub fn len(&self) -> usize {
        self.ports.lock().len()
    }

    /// Check if no port is registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every registration
    pub fn clear(&self) {
        let old = core::mem::take(&mut *self.ports.lock());
        drop(old);
    }
}

// ============================================================================
// Tests
// ============================================================================
