// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! System Call Integration Tests
//!
//! Dispatcher, memory management SVCs and CloseHandle.

use crate::kernel::{FaultPolicy, KernelConfig};
use crate::mm::{
    GuestMemory, MemoryPermission, MemoryState, SharedMemoryRegion, LINEAR_HEAP_BASE,
    LINEAR_HEAP_END,
};
use crate::object::{well_known, Handle, ObjectType};
use crate::result::{KernelFault, ResultCode};
use crate::syscall::memory::operation;
use crate::syscall::number;
use crate::testing::{ServiceCall, SvcTestHarness, STACK_TOP};

const R: u32 = 1;
const RW: u32 = 3;
const DONT_CARE: u32 = 0x1000_0000;

fn lenient() -> SvcTestHarness {
    SvcTestHarness::with_config(KernelConfig {
        fault_policy: FaultPolicy::Lenient,
        ..KernelConfig::default()
    })
}

fn commit(h: &mut SvcTestHarness, addr: u32, size: u32) -> u32 {
    let frame = h
        .svc(number::CONTROL_MEMORY, [operation::COMMIT, addr, 0, size, RW, 0])
        .unwrap();
    assert_eq!(frame.result(), ResultCode::SUCCESS);
    frame.reg(1)
}

/// Write the stack-passed other-permission argument of CreateMemoryBlock
fn set_other_permission(h: &mut SvcTestHarness, perms: u32) {
    h.memory.write_u32(STACK_TOP + 4, perms).unwrap();
}

// ============================================================================
// Dispatcher
// ============================================================================

/// Test unknown SVC numbers stop emulation
#[test]
fn test_svc_unknown() {
    let mut h = SvcTestHarness::new();
    assert_eq!(
        h.svc(0xFF, [0; 6]).unwrap_err(),
        KernelFault::UnimplementedSvc(0xFF)
    );
}

/// Test unknown SVC numbers stop emulation regardless of policy
#[test]
fn test_svc_unknown_lenient() {
    let mut h = lenient();
    assert!(h.svc(0x7F, [0; 6]).is_err());
}

// ============================================================================
// ControlMemory
// ============================================================================

/// Test Commit at a fixed address
#[test]
fn test_control_memory_commit() {
    let mut h = SvcTestHarness::new();
    let base = commit(&mut h, 0x0010_0000, 0x1000);
    assert!((0x0010_0000..0x0010_1000).contains(&base));

    let frame = h.svc(number::QUERY_MEMORY, [0, 0, base, 0, 0, 0]).unwrap();
    assert_eq!(frame.result(), ResultCode::SUCCESS);
    assert_eq!(frame.reg(1), 0x0010_0000);
    assert_eq!(frame.reg(2), 0x1000);
    assert_eq!(frame.reg(3), RW);
    assert_eq!(frame.reg(4), MemoryState::Private.into_raw());
}

/// Test Commit from the linear heap
#[test]
fn test_control_memory_commit_linear() {
    let mut h = SvcTestHarness::new();
    let frame = h
        .svc(
            number::CONTROL_MEMORY,
            [operation::COMMIT | operation::LINEAR, 0, 0, 0x4000, RW, 0],
        )
        .unwrap();
    assert_eq!(frame.result(), ResultCode::SUCCESS);
    let base = frame.reg(1);
    assert!((LINEAR_HEAP_BASE..LINEAR_HEAP_END).contains(&base));

    let frame = h.svc(number::QUERY_MEMORY, [0, 0, base, 0, 0, 0]).unwrap();
    assert_eq!(frame.reg(4), MemoryState::Continuous.into_raw());
}

/// Test misaligned size fails without touching memory
#[test]
fn test_control_memory_misaligned_size() {
    let mut h = SvcTestHarness::new();
    let mappings = h.memory.mapping_count();

    let frame = h
        .svc(number::CONTROL_MEMORY, [operation::COMMIT, 0x0010_0000, 0, 0x1001, RW, 0])
        .unwrap();
    assert_eq!(frame.result(), ResultCode::MISALIGNED_SIZE);
    assert_eq!(h.memory.mapping_count(), mappings);
}

/// Test misaligned addresses fail without touching memory
#[test]
fn test_control_memory_misaligned_address() {
    let mut h = SvcTestHarness::new();
    let mappings = h.memory.mapping_count();

    for (addr0, addr1) in [(0x0010_0800, 0), (0x0010_0000, 0x10)] {
        let frame = h
            .svc(number::CONTROL_MEMORY, [operation::MAP, addr0, addr1, 0x1000, RW, 0])
            .unwrap();
        assert_eq!(frame.result(), ResultCode::MISALIGNED_ADDRESS);
    }
    assert_eq!(h.memory.mapping_count(), mappings);
}

/// Test executable permission is always fatal
#[test]
fn test_control_memory_execute_fatal() {
    let mut h = lenient();
    assert_eq!(
        h.svc(number::CONTROL_MEMORY, [operation::COMMIT, 0x0010_0000, 0, 0x1000, 7, 0])
            .unwrap_err(),
        KernelFault::ExecutableMapping { perms: 7 }
    );
}

/// Test DontCare permission per fault policy
#[test]
fn test_control_memory_dont_care() {
    let mut h = SvcTestHarness::new();
    assert_eq!(
        h.svc(
            number::CONTROL_MEMORY,
            [operation::COMMIT, 0x0010_0000, 0, 0x1000, DONT_CARE, 0]
        )
        .unwrap_err(),
        KernelFault::DontCarePermission
    );

    let mut h = lenient();
    let frame = h
        .svc(
            number::CONTROL_MEMORY,
            [operation::COMMIT, 0x0010_0000, 0, 0x1000, DONT_CARE, 0],
        )
        .unwrap();
    assert_eq!(frame.result(), ResultCode::SUCCESS);
    let info = h.svc(number::QUERY_MEMORY, [0, 0, 0x0010_0000, 0, 0, 0]).unwrap();
    assert_eq!(info.reg(3), RW);
}

/// Test Commit failure per fault policy
#[test]
fn test_control_memory_commit_failure() {
    let mut h = SvcTestHarness::new();
    commit(&mut h, 0x0010_0000, 0x1000);
    assert_eq!(
        h.svc(number::CONTROL_MEMORY, [operation::COMMIT, 0x0010_0000, 0, 0x1000, RW, 0])
            .unwrap_err(),
        KernelFault::AllocationFailed {
            addr: 0x0010_0000,
            size: 0x1000
        }
    );

    let mut h = lenient();
    commit(&mut h, 0x0010_0000, 0x1000);
    let frame = h
        .svc(number::CONTROL_MEMORY, [operation::COMMIT, 0x0010_0000, 0, 0x1000, RW, 0])
        .unwrap();
    assert_eq!(frame.result(), ResultCode::OUT_OF_MEMORY);
}

/// Test Map mirrors an existing range
#[test]
fn test_control_memory_map() {
    let mut h = SvcTestHarness::new();
    let src = commit(&mut h, 0x0800_0000, 0x2000);
    h.memory.write_u32(src + 0x1004, 0xCAFE_F00D).unwrap();

    let frame = h
        .svc(number::CONTROL_MEMORY, [operation::MAP, 0x0A00_0000, src, 0x2000, RW, 0])
        .unwrap();
    assert_eq!(frame.result(), ResultCode::SUCCESS);
    assert_eq!(h.memory.read_u32(0x0A00_1004).unwrap(), 0xCAFE_F00D);

    let alias = h.svc(number::QUERY_MEMORY, [0, 0, 0x0A00_0000, 0, 0, 0]).unwrap();
    assert_eq!(alias.reg(4), MemoryState::Alias.into_raw());
    let aliased = h.svc(number::QUERY_MEMORY, [0, 0, src, 0, 0, 0]).unwrap();
    assert_eq!(aliased.reg(4), MemoryState::Aliased.into_raw());
}

/// Test Map refuses an occupied destination or an unmapped source
#[test]
fn test_control_memory_map_failure() {
    let mut h = SvcTestHarness::new();
    let src = commit(&mut h, 0x0800_0000, 0x1000);
    commit(&mut h, 0x0A00_0000, 0x1000);
    assert_eq!(
        h.svc(number::CONTROL_MEMORY, [operation::MAP, 0x0A00_0000, src, 0x1000, RW, 0])
            .unwrap_err(),
        KernelFault::MirrorFailed {
            dst: 0x0A00_0000,
            src,
            size: 0x1000
        }
    );

    let mut h = lenient();
    let src = commit(&mut h, 0x0800_0000, 0x1000);
    commit(&mut h, 0x0A00_0000, 0x1000);
    let frame = h
        .svc(number::CONTROL_MEMORY, [operation::MAP, 0x0A00_0000, src, 0x1000, RW, 0])
        .unwrap();
    assert_eq!(frame.result(), ResultCode::INVALID_ADDRESS);
    let info = h.svc(number::QUERY_MEMORY, [0, 0, 0x0A00_0000, 0, 0, 0]).unwrap();
    assert_eq!(info.reg(4), MemoryState::Private.into_raw());

    // Nothing to mirror
    let frame = h
        .svc(number::CONTROL_MEMORY, [operation::MAP, 0x0C00_0000, 0x3000_0000, 0x1000, RW, 0])
        .unwrap();
    assert_eq!(frame.result(), ResultCode::INVALID_ADDRESS);
    let info = h.svc(number::QUERY_MEMORY, [0, 0, 0x0C00_0000, 0, 0, 0]).unwrap();
    assert_eq!(info.reg(4), MemoryState::Free.into_raw());
}

/// Test Protect is accepted and changes nothing
#[test]
fn test_control_memory_protect() {
    let mut h = SvcTestHarness::new();
    let base = commit(&mut h, 0x0010_0000, 0x1000);
    let mappings = h.memory.mapping_count();

    let frame = h
        .svc(number::CONTROL_MEMORY, [operation::PROTECT, base, 0, 0x1000, R, 0])
        .unwrap();
    assert_eq!(frame.result(), ResultCode::SUCCESS);
    assert_eq!(h.memory.mapping_count(), mappings);
    let info = h.svc(number::QUERY_MEMORY, [0, 0, base, 0, 0, 0]).unwrap();
    assert_eq!(info.reg(3), RW);
}

/// Test unknown operations
#[test]
fn test_control_memory_unknown_operation() {
    let mut h = SvcTestHarness::new();
    for op in [operation::FREE, operation::UNMAP, 0x42] {
        let frame = h
            .svc(number::CONTROL_MEMORY, [op, 0x0010_0000, 0, 0x1000, RW, 0])
            .unwrap();
        assert_eq!(frame.result(), ResultCode::INVALID_COMBINATION);
    }
}

// ============================================================================
// QueryMemory
// ============================================================================

/// Test querying an unmapped address reports a free range
#[test]
fn test_query_memory_free() {
    let mut h = SvcTestHarness::new();
    let frame = h
        .svc(number::QUERY_MEMORY, [0, 0, 0x3000_0123, 0xAA, 0xBB, 0xCC])
        .unwrap();
    assert_eq!(frame.result(), ResultCode::SUCCESS);
    assert!(frame.reg(1) <= 0x3000_0000);
    assert!(frame.reg(1) as u64 + frame.reg(2) as u64 > 0x3000_0000);
    assert_eq!(frame.reg(3), 0);
    assert_eq!(frame.reg(4), MemoryState::Free.into_raw());
    assert_eq!(frame.reg(5), 0);
}

// ============================================================================
// MapMemoryBlock
// ============================================================================

/// Test an unrecognized handle never maps anything
#[test]
fn test_map_memory_block_invalid_handle() {
    let mut h = SvcTestHarness::new();
    let mappings = h.memory.mapping_count();

    let srv = h.kernel.srv_port();
    for handle in [Handle::from_raw(0x1234), srv, Handle::NULL] {
        let frame = h
            .svc(number::MAP_MEMORY_BLOCK, [handle.raw(), 0x1000_0000, RW, 0, 0, 0])
            .unwrap();
        assert_eq!(frame.result(), ResultCode::INVALID_HANDLE);
    }
    assert_eq!(h.memory.mapping_count(), mappings);
    assert!(h.services.calls.is_empty());
}

/// Test argument validation order
#[test]
fn test_map_memory_block_validation() {
    let mut h = SvcTestHarness::new();
    let gsp = well_known::GSP_SHARED_MEM.raw();

    let cases = [
        ([gsp, 0x1000_0800, RW, 0, 0, 0], ResultCode::MISALIGNED_ADDRESS),
        ([gsp, 0x1000_0000, 0, 0, 0, 0], ResultCode::INVALID_COMBINATION),
        ([gsp, 0x1000_0000, 4, 0, 0, 0], ResultCode::INVALID_COMBINATION),
        ([gsp, 0x1000_0000, RW, 5, 0, 0], ResultCode::INVALID_COMBINATION),
        // Alignment is checked before the handle
        ([0x1234, 0x1000_0800, RW, 0, 0, 0], ResultCode::MISALIGNED_ADDRESS),
    ];
    for (args, expected) in cases {
        let frame = h.svc(number::MAP_MEMORY_BLOCK, args).unwrap();
        assert_eq!(frame.result(), expected, "args {:X?}", args);
    }
    assert!(h.services.calls.is_empty());
}

/// Test mapping the GPU region registers it with the service layer
#[test]
fn test_map_memory_block_gsp() {
    let mut h = SvcTestHarness::new();
    let frame = h
        .svc(
            number::MAP_MEMORY_BLOCK,
            [well_known::GSP_SHARED_MEM.raw(), 0x1000_0000, RW, DONT_CARE, 0, 0],
        )
        .unwrap();
    assert_eq!(frame.result(), ResultCode::SUCCESS);
    assert_eq!(
        h.services.calls,
        vec![ServiceCall::SharedMemory {
            region: SharedMemoryRegion::Gsp,
            addr: 0x1000_0000
        }]
    );

    let info = h.svc(number::QUERY_MEMORY, [0, 0, 0x1000_0000, 0, 0, 0]).unwrap();
    assert_eq!(info.reg(2), SharedMemoryRegion::Gsp.size());
    assert_eq!(info.reg(4), MemoryState::Shared.into_raw());
}

/// Test mapping the input region registers it with the service layer
#[test]
fn test_map_memory_block_hid() {
    let mut h = SvcTestHarness::new();
    let frame = h
        .svc(
            number::MAP_MEMORY_BLOCK,
            [well_known::HID_SHARED_MEM.raw(), 0x1001_0000, R, 0, 0, 0],
        )
        .unwrap();
    assert_eq!(frame.result(), ResultCode::SUCCESS);
    assert_eq!(
        h.services.calls,
        vec![ServiceCall::SharedMemory {
            region: SharedMemoryRegion::Hid,
            addr: 0x1001_0000
        }]
    );
}

/// Test the font region defaults its address and receives the font blob
#[test]
fn test_map_memory_block_font() {
    let font = vec![0x46, 0x4F, 0x4E, 0x54, 0x01, 0x02];
    let mut h = SvcTestHarness::with_config(KernelConfig {
        shared_font: Some(font.clone()),
        ..KernelConfig::default()
    });

    let frame = h
        .svc(
            number::MAP_MEMORY_BLOCK,
            [well_known::FONT_SHARED_MEM.raw(), 0, R, 0, 0, 0],
        )
        .unwrap();
    assert_eq!(frame.result(), ResultCode::SUCCESS);

    let base = h.kernel.config().font_map_address;
    assert_eq!(base, 0x1800_0000);
    for (i, &byte) in font.iter().enumerate() {
        assert_eq!(h.memory.read_u8(base + i as u32).unwrap(), byte);
    }
    assert!(h.services.calls.is_empty());
}

/// Test shared memory mapping failure per fault policy
#[test]
fn test_map_memory_block_region_occupied() {
    let mut h = SvcTestHarness::new();
    commit(&mut h, 0x1000_0000, 0x1000);
    let args = [well_known::GSP_SHARED_MEM.raw(), 0x1000_0000, RW, 0, 0, 0];
    assert!(matches!(
        h.svc(number::MAP_MEMORY_BLOCK, args),
        Err(KernelFault::SharedMemoryMapFailed { addr: 0x1000_0000, .. })
    ));

    let mut h = lenient();
    commit(&mut h, 0x1000_0000, 0x1000);
    let frame = h.svc(number::MAP_MEMORY_BLOCK, args).unwrap();
    assert_eq!(frame.result(), ResultCode::OUT_OF_MEMORY);
    assert!(h.services.calls.is_empty());
}

// ============================================================================
// CreateMemoryBlock
// ============================================================================

/// Test creating a block and mapping it elsewhere
#[test]
fn test_create_and_map_memory_block() {
    let mut h = SvcTestHarness::new();
    let src = commit(&mut h, 0x0800_0000, 0x1000);
    h.memory.write_u32(src, 0x1234_5678).unwrap();
    set_other_permission(&mut h, R);

    let frame = h
        .svc(number::CREATE_MEMORY_BLOCK, [0, src, 0x1000, RW, 0, 0])
        .unwrap();
    assert_eq!(frame.result(), ResultCode::SUCCESS);
    let block = Handle::from_raw(frame.reg(1));

    let object = h.kernel.get_object(block, ObjectType::SharedMemory).unwrap();
    let mb = object.as_memory_block().unwrap();
    assert_eq!(mb.addr, src);
    assert_eq!(mb.size, 0x1000);
    assert_eq!(mb.my_permission, MemoryPermission::READ_WRITE);
    assert_eq!(mb.other_permission, MemoryPermission::READ);
    drop(object);

    // Read-write exceeds what the block grants
    let frame = h
        .svc(number::MAP_MEMORY_BLOCK, [block.raw(), 0x0A00_0000, RW, 0, 0, 0])
        .unwrap();
    assert_eq!(frame.result(), ResultCode::INVALID_COMBINATION);

    let frame = h
        .svc(number::MAP_MEMORY_BLOCK, [block.raw(), 0x0A00_0000, R, 0, 0, 0])
        .unwrap();
    assert_eq!(frame.result(), ResultCode::SUCCESS);
    assert_eq!(h.memory.read_u32(0x0A00_0000).unwrap(), 0x1234_5678);
}

/// Test mapping a block onto committed memory is refused
#[test]
fn test_map_memory_block_onto_committed() {
    let mut h = SvcTestHarness::new();
    let src = commit(&mut h, 0x0800_0000, 0x1000);
    commit(&mut h, 0x0A00_0000, 0x1000);
    set_other_permission(&mut h, R);
    let frame = h
        .svc(number::CREATE_MEMORY_BLOCK, [0, src, 0x1000, RW, 0, 0])
        .unwrap();
    let block = frame.reg(1);
    assert_eq!(
        h.svc(number::MAP_MEMORY_BLOCK, [block, 0x0A00_0000, R, 0, 0, 0])
            .unwrap_err(),
        KernelFault::MirrorFailed {
            dst: 0x0A00_0000,
            src,
            size: 0x1000
        }
    );

    let mut h = lenient();
    let src = commit(&mut h, 0x0800_0000, 0x1000);
    h.memory.write_u32(src, 0x1234_5678).unwrap();
    commit(&mut h, 0x0A00_0000, 0x1000);
    set_other_permission(&mut h, R);
    let frame = h
        .svc(number::CREATE_MEMORY_BLOCK, [0, src, 0x1000, RW, 0, 0])
        .unwrap();
    let block = frame.reg(1);

    let frame = h
        .svc(number::MAP_MEMORY_BLOCK, [block, 0x0A00_0000, R, 0, 0, 0])
        .unwrap();
    assert_eq!(frame.result(), ResultCode::INVALID_ADDRESS);
    assert_eq!(h.memory.read_u32(0x0A00_0000).unwrap(), 0);
    let info = h.svc(number::QUERY_MEMORY, [0, 0, 0x0A00_0000, 0, 0, 0]).unwrap();
    assert_eq!(info.reg(4), MemoryState::Private.into_raw());
}

/// Test CreateMemoryBlock argument validation
#[test]
fn test_create_memory_block_validation() {
    let mut h = SvcTestHarness::new();
    let handles = h.kernel.handles().count();

    let frame = h
        .svc(number::CREATE_MEMORY_BLOCK, [0, 0x0800_0000, 0x1800, RW, 0, 0])
        .unwrap();
    assert_eq!(frame.result(), ResultCode::MISALIGNED_SIZE);

    let frame = h
        .svc(number::CREATE_MEMORY_BLOCK, [0, 0x0800_0000, 0x1000, 0, 0, 0])
        .unwrap();
    assert_eq!(frame.result(), ResultCode::INVALID_COMBINATION);

    // DontCare is only valid when mapping
    set_other_permission(&mut h, DONT_CARE);
    let frame = h
        .svc(number::CREATE_MEMORY_BLOCK, [0, 0x0800_0000, 0x1000, RW, 0, 0])
        .unwrap();
    assert_eq!(frame.result(), ResultCode::INVALID_COMBINATION);

    assert_eq!(h.kernel.handles().count(), handles);
}

/// Test address 0 per fault policy
#[test]
fn test_create_memory_block_null_address() {
    let mut h = SvcTestHarness::new();
    assert_eq!(
        h.svc(number::CREATE_MEMORY_BLOCK, [0, 0, 0x1000, RW, 0, 0])
            .unwrap_err(),
        KernelFault::NullMemoryBlock
    );

    let mut h = lenient();
    let frame = h
        .svc(number::CREATE_MEMORY_BLOCK, [0, 0, 0x1000, RW, 0, 0])
        .unwrap();
    assert_eq!(frame.result(), ResultCode::INVALID_ADDRESS);
}

// ============================================================================
// CloseHandle
// ============================================================================

/// Test closing a handle twice
#[test]
fn test_close_handle() {
    let mut h = SvcTestHarness::new();
    let frame = h
        .svc(number::CREATE_MEMORY_BLOCK, [0, 0x0800_0000, 0x1000, RW, 0, 0])
        .unwrap();
    let block = frame.reg(1);
    let count = h.kernel.handles().count();

    let frame = h.svc(number::CLOSE_HANDLE, [block, 0, 0, 0, 0, 0]).unwrap();
    assert_eq!(frame.result(), ResultCode::SUCCESS);
    assert_eq!(h.kernel.handles().count(), count - 1);

    let frame = h.svc(number::CLOSE_HANDLE, [block, 0, 0, 0, 0, 0]).unwrap();
    assert_eq!(frame.result(), ResultCode::INVALID_HANDLE);
}
