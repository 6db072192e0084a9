// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Memory Management SVCs
//!
//! ControlMemory, QueryMemory, CreateMemoryBlock and MapMemoryBlock.
//! Handlers validate arguments and delegate the actual work to the
//! [`MemorySubsystem`]; a failed validation never reaches the subsystem.

use log::{error, info, warn};

use super::SvcFrame;
use crate::kernel::{Kernel, KernelEnv};
use crate::mm::{
    is_page_aligned, GuestMemory, MemoryPermission, MemorySubsystem, SharedMemoryRegion,
};
use crate::object::{MemoryBlock, ObjectKind, ObjectType};
use crate::result::{KernelFault, ResultCode};

/// ControlMemory operation codes
///
/// The low byte selects the operation; higher bits are modifiers.
pub mod operation {
    pub const FREE: u32 = 1;
    pub const RESERVE: u32 = 2;
    pub const COMMIT: u32 = 3;
    pub const MAP: u32 = 4;
    pub const UNMAP: u32 = 5;
    pub const PROTECT: u32 = 6;

    pub const APP_REGION: u32 = 0x100;
    pub const SYS_REGION: u32 = 0x200;
    pub const BASE_REGION: u32 = 0x300;

    /// Allocate from the linear heap
    pub const LINEAR: u32 = 0x1_0000;

    /// Mask selecting the operation
    pub const MASK: u32 = 0xFF;
}

impl Kernel {
    /// ControlMemory(u32* out_addr, u32 addr0, u32 addr1, u32 size, u32 op, u32 perms)
    ///
    /// In: r0 = operation, r1 = addr0, r2 = addr1, r3 = size, r4 = permissions.
    /// Out: r0 = result, r1 = allocated address (Commit).
    pub fn control_memory(
        &self,
        frame: &mut SvcFrame,
        memory: &mut dyn MemorySubsystem,
    ) -> Result<(), KernelFault> {
        let op = frame.reg(0);
        let addr0 = frame.reg(1);
        let addr1 = frame.reg(2);
        let size = frame.reg(3);
        let raw_perms = frame.reg(4);

        let mut perms = MemoryPermission::from_bits_truncate(raw_perms);
        if raw_perms == MemoryPermission::DONT_CARE.bits() {
            self.soft_fault(KernelFault::DontCarePermission, ResultCode::SUCCESS)?;
            perms = MemoryPermission::READ_WRITE;
        }

        if perms.contains(MemoryPermission::EXECUTE) {
            error!(
                "ControlMemory: attempted to allocate executable memory (addr0 = {:08X}, size = {:08X}, perms = {:X})",
                addr0, size, raw_perms
            );
            return Err(KernelFault::ExecutableMapping { perms: raw_perms });
        }

        if !is_page_aligned(addr0) || !is_page_aligned(addr1) {
            warn!(
                "ControlMemory: unaligned addresses (addr0 = {:08X}, addr1 = {:08X})",
                addr0, addr1
            );
            frame.set_result(ResultCode::MISALIGNED_ADDRESS);
            return Ok(());
        }

        if !is_page_aligned(size) {
            warn!("ControlMemory: unaligned size {:08X}", size);
            frame.set_result(ResultCode::MISALIGNED_SIZE);
            return Ok(());
        }

        let linear = op & operation::LINEAR != 0;
        let [r, w, x] = perms.to_rwx();
        log_svc!(
            "ControlMemory(addr0 = {:08X}, addr1 = {:08X}, size = {:08X}, operation = {:X} ({}{}{}){})",
            addr0,
            addr1,
            size,
            op,
            r,
            w,
            x,
            if linear { ", linear" } else { "" }
        );

        let perms = perms & MemoryPermission::READ_WRITE;
        match op & operation::MASK {
            operation::COMMIT => match memory.allocate_memory(addr0, 0, size, linear, perms, true) {
                Some(addr) => frame.set_reg(1, addr),
                None => {
                    let code = self.soft_fault(
                        KernelFault::AllocationFailed { addr: addr0, size },
                        ResultCode::OUT_OF_MEMORY,
                    )?;
                    frame.set_result(code);
                    return Ok(());
                }
            },

            operation::MAP => {
                if memory.mirror_mapping(addr0, addr1, size).is_none() {
                    let code = self.soft_fault(
                        KernelFault::MirrorFailed { dst: addr0, src: addr1, size },
                        ResultCode::INVALID_ADDRESS,
                    )?;
                    frame.set_result(code);
                    return Ok(());
                }
            }

            operation::PROTECT => {
                warn!(
                    "ControlMemory: ignoring Protect of {:08X}..{:08X}",
                    addr0,
                    addr0 as u64 + size as u64
                );
            }

            _ => {
                warn!("ControlMemory: unknown operation {:X}", op);
                frame.set_result(ResultCode::INVALID_COMBINATION);
                return Ok(());
            }
        }

        frame.set_result(ResultCode::SUCCESS);
        Ok(())
    }

    /// QueryMemory(MemoryInfo* mem_info, PageInfo* page_info, u32 addr)
    ///
    /// In: r2 = address.
    /// Out: r0 = result, r1 = base, r2 = size, r3 = permissions, r4 = state,
    /// r5 = page flags.
    pub fn query_memory(
        &self,
        frame: &mut SvcFrame,
        memory: &mut dyn MemorySubsystem,
    ) -> Result<(), KernelFault> {
        let addr = frame.reg(2);
        log_svc!(
            "QueryMemory(mem info pointer = {:08X}, page info pointer = {:08X}, addr = {:08X})",
            frame.reg(0),
            frame.reg(1),
            addr
        );

        let info = memory.query_memory(addr);
        frame.set_result(ResultCode::SUCCESS);
        frame.set_reg(1, info.base_addr);
        frame.set_reg(2, info.size);
        frame.set_reg(3, info.perms.bits());
        frame.set_reg(4, info.state.into_raw());
        frame.set_reg(5, 0);
        Ok(())
    }

    /// MapMemoryBlock(Handle block, u32 addr, u32 my_perms, u32 other_perms)
    ///
    /// In: r0 = block handle, r1 = address, r2 = my permission,
    /// r3 = other permission.
    /// Out: r0 = result.
    pub fn map_memory_block(
        &self,
        frame: &mut SvcFrame,
        env: &mut KernelEnv<'_>,
    ) -> Result<(), KernelFault> {
        let block = frame.handle(0);
        let mut addr = frame.reg(1);
        let raw_my = frame.reg(2);
        let raw_other = frame.reg(3);
        log_svc!(
            "MapMemoryBlock(block = {:X}, addr = {:08X}, myPermission = {:X}, otherPermission = {:X})",
            block.raw(),
            addr,
            raw_my,
            raw_other
        );

        if !is_page_aligned(addr) {
            warn!("MapMemoryBlock: unaligned address {:08X}", addr);
            frame.set_result(ResultCode::MISALIGNED_ADDRESS);
            return Ok(());
        }

        let Some(my) = MemoryPermission::parse_my(raw_my) else {
            warn!("MapMemoryBlock: invalid myPermission {:X}", raw_my);
            frame.set_result(ResultCode::INVALID_COMBINATION);
            return Ok(());
        };

        let Some(other) = MemoryPermission::parse_other(raw_other, true) else {
            warn!("MapMemoryBlock: invalid otherPermission {:X}", raw_other);
            frame.set_result(ResultCode::INVALID_COMBINATION);
            return Ok(());
        };

        if let Some(region) = SharedMemoryRegion::from_handle(block) {
            if region == SharedMemoryRegion::Font && addr == 0 {
                addr = self.config().font_map_address;
            }

            let Some(mapped) = env.memory.map_shared_memory(region, addr, my, other) else {
                let code = self.soft_fault(
                    KernelFault::SharedMemoryMapFailed { handle: block, addr },
                    ResultCode::OUT_OF_MEMORY,
                )?;
                frame.set_result(code);
                return Ok(());
            };

            // Result goes out before the service sees the mapping
            frame.set_result(ResultCode::SUCCESS);
            match region {
                SharedMemoryRegion::Gsp | SharedMemoryRegion::Hid => {
                    env.services.set_shared_memory(region, mapped);
                }
                SharedMemoryRegion::Font => {
                    if let Some(font) = &self.config().shared_font {
                        let len = font.len().min(region.size() as usize);
                        env.memory.write_bytes(mapped, &font[..len])?;
                        info!("MapMemoryBlock: copied {:#X} bytes of font data to {:08X}", len, mapped);
                    }
                }
            }
            return Ok(());
        }

        let Some(object) = self.get_object(block, ObjectType::SharedMemory) else {
            warn!(
                "MapMemoryBlock: handle {:X} is neither kernel shared memory nor a memory block",
                block.raw()
            );
            frame.set_result(ResultCode::INVALID_HANDLE);
            return Ok(());
        };
        let Some(memory_block) = object.as_memory_block() else {
            frame.set_result(ResultCode::INVALID_HANDLE);
            return Ok(());
        };

        if addr == 0 {
            warn!("MapMemoryBlock: memory block {:X} mapped at address 0", block.raw());
            frame.set_result(ResultCode::INVALID_ADDRESS);
            return Ok(());
        }

        if !memory_block.permits(my) {
            warn!(
                "MapMemoryBlock: block {:X} grants {:?}, {:?} requested",
                block.raw(),
                memory_block.other_permission,
                my
            );
            frame.set_result(ResultCode::INVALID_COMBINATION);
            return Ok(());
        }

        let (src, size) = (memory_block.addr, memory_block.size);
        if env.memory.mirror_mapping(addr, src, size).is_none() {
            let code = self.soft_fault(
                KernelFault::MirrorFailed { dst: addr, src, size },
                ResultCode::INVALID_ADDRESS,
            )?;
            frame.set_result(code);
            return Ok(());
        }
        frame.set_result(ResultCode::SUCCESS);
        Ok(())
    }

    /// CreateMemoryBlock(Handle* out, u32 addr, u32 size, u32 my_perms, u32 other_perms)
    ///
    /// In: r1 = address, r2 = size, r3 = my permission; other permission is
    /// spilled to the stack at sp + 4.
    /// Out: r0 = result, r1 = block handle.
    pub fn create_memory_block(
        &self,
        frame: &mut SvcFrame,
        memory: &mut dyn MemorySubsystem,
    ) -> Result<(), KernelFault> {
        let addr = frame.reg(1);
        let size = frame.reg(2);
        let raw_my = frame.reg(3);
        let raw_other = memory.read_u32(frame.sp().wrapping_add(4))?;
        log_svc!(
            "CreateMemoryBlock(addr = {:08X}, size = {:08X}, myPermission = {}, otherPermission = {})",
            addr,
            size,
            raw_my,
            raw_other
        );

        if !is_page_aligned(size) {
            frame.set_result(ResultCode::MISALIGNED_SIZE);
            return Ok(());
        }

        let Some(my) = MemoryPermission::parse_my(raw_my) else {
            warn!("CreateMemoryBlock: invalid myPermission {:X}", raw_my);
            frame.set_result(ResultCode::INVALID_COMBINATION);
            return Ok(());
        };

        let Some(other) = MemoryPermission::parse_other(raw_other, false) else {
            warn!("CreateMemoryBlock: invalid otherPermission {:X}", raw_other);
            frame.set_result(ResultCode::INVALID_COMBINATION);
            return Ok(());
        };

        if addr == 0 {
            let code = self.soft_fault(KernelFault::NullMemoryBlock, ResultCode::INVALID_ADDRESS)?;
            frame.set_result(code);
            return Ok(());
        }

        let block = MemoryBlock::new(addr, size, my, other);
        match self.create_object(ObjectKind::MemoryBlock(block)) {
            Ok(handle) => {
                frame.set_result(ResultCode::SUCCESS);
                frame.set_reg(1, handle.raw());
            }
            Err(code) => {
                let code = self.soft_fault(
                    KernelFault::HandleTableFull(ObjectType::SharedMemory.name()),
                    code,
                )?;
                frame.set_result(code);
            }
        }
        Ok(())
    }
}
