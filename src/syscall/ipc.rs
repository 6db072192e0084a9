// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! IPC SVCs
//!
//! ConnectToPort and SendSyncRequest, plus the in-kernel `err:f` handler.
//!
//! # Sync Request Routing
//!
//! ```text
//! handle ─┬─ service handle ──► ServiceManager::send_command_to_service
//!         ├─ File ────────────► FsHandler::handle_file_operation
//!         ├─ Directory ───────► FsHandler::handle_directory_operation
//!         └─ Session ─┬─ srv: ─► ServiceManager::handle_sync_request
//!                     ├─ err:f ► in-kernel error report
//!                     └─ other ► unrouted
//! ```
//!
//! r0 is written before any downstream handler runs: the handler may
//! reschedule, and the caller's result must already be in place.

use log::{error, warn};

use super::SvcFrame;
use crate::kernel::{Kernel, KernelEnv};
use crate::mm::{GuestMemory, MemorySubsystem};
use crate::object::{well_known, ObjectKind, ObjectType, Session, MAX_PORT_NAME_LEN};
use crate::result::{KernelFault, ResultCode};

/// `err:f` command headers
pub mod err_f {
    /// ThrowFatalError: command 1, 32 normal words
    pub const THROW_FATAL_ERROR: u32 = 0x0001_0800;

    /// Response header for ThrowFatalError: command 1, 1 normal word
    pub const THROW_FATAL_ERROR_RESPONSE: u32 = 0x0001_0040;
}

impl Kernel {
    /// ConnectToPort(Handle* out, const char* port_name)
    ///
    /// In: r1 = guest pointer to the port name.
    /// Out: r0 = result, r1 = session handle.
    pub fn connect_to_port(
        &self,
        frame: &mut SvcFrame,
        memory: &mut dyn MemorySubsystem,
    ) -> Result<(), KernelFault> {
        let name_ptr = frame.reg(1);

        let mut buf = [0u8; MAX_PORT_NAME_LEN + 1];
        let read = match memory.copy_string(name_ptr, &mut buf) {
            Ok(read) => read,
            Err(fault) => {
                warn!("ConnectToPort: port name pointer {:08X} is invalid ({})", name_ptr, fault);
                frame.set_result(ResultCode::INVALID_POINTER);
                return Ok(());
            }
        };
        if read == buf.len() && buf[MAX_PORT_NAME_LEN] != 0 {
            warn!("ConnectToPort: port name at {:08X} is too long", name_ptr);
            frame.set_result(ResultCode::PORT_NAME_TOO_LONG);
            return Ok(());
        }

        let name = String::from_utf8_lossy(&buf[..read.saturating_sub(1)]);
        log_svc!(
            "ConnectToPort(handle pointer = {:X}, port = \"{}\")",
            frame.reg(0),
            name
        );

        let Some((port_handle, port)) = self.ports().lookup(&name) else {
            warn!("ConnectToPort: port \"{}\" does not exist", name);
            frame.set_result(ResultCode::NOT_FOUND);
            return Ok(());
        };

        if !port.as_port().is_some_and(|p| p.is_public()) {
            let code = self.soft_fault(
                KernelFault::PrivatePort(name.into_owned()),
                ResultCode::NOT_AUTHORIZED,
            )?;
            frame.set_result(code);
            return Ok(());
        }

        let session = Session::new(port_handle, port);
        match self.create_object(ObjectKind::Session(session)) {
            Ok(handle) => {
                frame.set_result(ResultCode::SUCCESS);
                frame.set_reg(1, handle.raw());
            }
            Err(code) => {
                let code = self.soft_fault(
                    KernelFault::HandleTableFull(ObjectType::Session.name()),
                    code,
                )?;
                frame.set_result(code);
            }
        }
        Ok(())
    }

    /// SendSyncRequest(Handle session)
    ///
    /// In: r0 = target handle; the command is in the IPC buffer at TLS + 0x80.
    /// Out: r0 = result; the response replaces the command in place.
    pub fn send_sync_request(
        &self,
        frame: &mut SvcFrame,
        env: &mut KernelEnv<'_>,
    ) -> Result<(), KernelFault> {
        let handle = frame.handle(0);
        let message = frame.ipc_buffer();
        log_svc!("SendSyncRequest(session handle = {:X})", handle.raw());

        if well_known::is_service_handle(handle) {
            frame.set_result(ResultCode::SUCCESS);
            env.services.send_command_to_service(message, handle);
            return Ok(());
        }

        if self.get_object(handle, ObjectType::File).is_some() {
            frame.set_result(ResultCode::SUCCESS);
            env.fs.handle_file_operation(message, handle);
            return Ok(());
        }

        if self.get_object(handle, ObjectType::Directory).is_some() {
            frame.set_result(ResultCode::SUCCESS);
            env.fs.handle_directory_operation(message, handle);
            return Ok(());
        }

        let Some(object) = self.get_object(handle, ObjectType::Session) else {
            warn!("SendSyncRequest: invalid handle {:X}", handle.raw());
            frame.set_result(ResultCode::INVALID_HANDLE);
            return Ok(());
        };
        let Some(session) = object.as_session() else {
            frame.set_result(ResultCode::INVALID_HANDLE);
            return Ok(());
        };

        let port_handle = session.port_handle();
        if port_handle == self.srv_port() {
            frame.set_result(ResultCode::SUCCESS);
            env.services.handle_sync_request(message);
        } else if port_handle == self.err_port() {
            frame.set_result(ResultCode::SUCCESS);
            self.handle_error_request(message, env.memory)?;
        } else {
            let code = self.soft_fault(
                KernelFault::UnroutedPort(session.port_name().into()),
                ResultCode::NOT_IMPLEMENTED,
            )?;
            frame.set_result(code);
        }
        Ok(())
    }

    /// Handle a request sent over an `err:f` session
    fn handle_error_request(
        &self,
        message: u32,
        memory: &mut dyn MemorySubsystem,
    ) -> Result<(), KernelFault> {
        let command = memory.read_u32(message)?;
        match command {
            err_f::THROW_FATAL_ERROR => {
                let kind = memory.read_u8(message.wrapping_add(4))?;
                let result = memory.read_u32(message.wrapping_add(8))?;
                let pc = memory.read_u32(message.wrapping_add(12))?;
                error!(
                    "err:f: guest reported fatal error (type {}, result {:?}, pc {:08X})",
                    kind,
                    ResultCode(result),
                    pc
                );
                memory.write_u32(message, err_f::THROW_FATAL_ERROR_RESPONSE)?;
                memory.write_u32(message.wrapping_add(4), ResultCode::SUCCESS.raw())?;
                Ok(())
            }
            _ => {
                error!("err:f: unknown command {:08X}", command);
                Err(KernelFault::UnknownErrorCommand(command))
            }
        }
    }
}
