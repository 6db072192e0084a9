// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Handle Encoding & Handle Table
//!
//! Guest code never sees object pointers, only 32-bit handles.
//!
//! # Handle Layout
//!
//! ```text
//!  31  30                 15 14             0
//! +---+---------------------+----------------+
//! | R |      linear id      |  table index   |
//! +---+---------------------+----------------+
//! ```
//!
//! - **R**: reserved, must be zero
//! - **linear id**: per-allocation generation counter, never zero
//! - **table index**: slot in the owning [`HandleTable`]
//!
//! The linear id makes a handle to a recycled slot detectably stale.
//!
//! Some handle values above the table range are recognized by value
//! instead of lookup; see [`well_known`].

use core::fmt;

use log::{debug, warn};
use spin::Mutex;

use super::kobject::ObjectRef;
use crate::result::ResultCode;

/// ============================================================================
/// Handle
/// ============================================================================

/// Opaque 32-bit handle
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle(u32);

impl Handle {
    /// Number of table index bits
    pub const INDEX_BITS: u32 = 15;

    /// Number of linear id bits
    pub const LINEAR_ID_BITS: u32 = 16;

    /// Number of reserved bits
    pub const RESERVED_BITS: u32 = 1;

    /// Mask for the table index field
    pub const INDEX_MASK: u32 = (1 << Self::INDEX_BITS) - 1;

    /// The null handle
    pub const NULL: Self = Self(0);

    /// Create from raw value
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Compose a handle from its fields
    pub const fn new(index: u16, linear_id: u16) -> Self {
        Self(((linear_id as u32) << Self::INDEX_BITS) | (index as u32 & Self::INDEX_MASK))
    }

    /// Get raw value
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Table index field
    pub const fn index(self) -> u16 {
        (self.0 & Self::INDEX_MASK) as u16
    }

    /// Linear id field
    pub const fn linear_id(self) -> u16 {
        (self.0 >> Self::INDEX_BITS) as u16
    }

    /// Reserved field
    pub const fn reserved(self) -> u8 {
        (self.0 >> (Self::INDEX_BITS + Self::LINEAR_ID_BITS)) as u8
    }
}

const _: () = assert!(
    Handle::INDEX_BITS + Handle::LINEAR_ID_BITS + Handle::RESERVED_BITS == u32::BITS,
    "invalid handle layout"
);

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({:#010X})", self.0)
    }
}

impl From<Handle> for u32 {
    fn from(handle: Handle) -> u32 {
        handle.0
    }
}

/// ============================================================================
/// Well-Known Handles
/// ============================================================================

/// Handle values recognized by value rather than table lookup
///
/// All of them have the reserved bit set, so they can never collide with a
/// handle issued by a [`HandleTable`].
pub mod well_known {
    use super::Handle;

    /// First service handle
    pub const SERVICE_BASE: u32 = 0xFFFF_7000;

    /// Services, in handle order
    pub const SERVICE_NAMES: [&str; 19] = [
        "ac:u", "am:net", "APT:S", "boss:U", "cam:u", "cecd:u", "cfg:u", "dsp::DSP", "hid:USER",
        "frd:u", "fs:USER", "gsp::Gpu", "gsp::Lcd", "ldr:ro", "mic:u", "ndm:u", "nim:aoc",
        "ptm:u", "y2r:u",
    ];

    /// Last service handle
    pub const SERVICE_MAX: u32 = SERVICE_BASE + SERVICE_NAMES.len() as u32 - 1;

    /// GPU shared memory region
    pub const GSP_SHARED_MEM: Handle = Handle::from_raw(SERVICE_MAX + 1);

    /// System font shared memory region
    pub const FONT_SHARED_MEM: Handle = Handle::from_raw(SERVICE_MAX + 2);

    /// Input device shared memory region
    pub const HID_SHARED_MEM: Handle = Handle::from_raw(SERVICE_MAX + 3);

    /// Check whether a handle addresses a built-in service
    pub const fn is_service_handle(handle: Handle) -> bool {
        handle.raw() >= SERVICE_BASE && handle.raw() <= SERVICE_MAX
    }

    /// Check whether a handle addresses a kernel shared memory region
    pub const fn is_shared_mem_handle(handle: Handle) -> bool {
        handle.raw() >= GSP_SHARED_MEM.raw() && handle.raw() <= HID_SHARED_MEM.raw()
    }

    /// Service handle for a service name
    pub fn service_handle(name: &str) -> Option<Handle> {
        SERVICE_NAMES
            .iter()
            .position(|&n| n == name)
            .map(|i| Handle::from_raw(SERVICE_BASE + i as u32))
    }

    /// Service name for a service handle
    pub fn service_name(handle: Handle) -> Option<&'static str> {
        if !is_service_handle(handle) {
            return None;
        }
        SERVICE_NAMES.get((handle.raw() - SERVICE_BASE) as usize).copied()
    }
}

/// ============================================================================
/// Handle Table
/// ============================================================================

/// Default handle table capacity
pub const MAX_HANDLES: usize = 0x1000;

/// Largest capacity the index field can address
pub const MAX_TABLE_SIZE: usize = 1 << Handle::INDEX_BITS;

/// Table state guarded by the table lock
///
/// Slot metadata lives in parallel arrays: `linear_ids` is meaningful for
/// occupied slots, `next_free` for free ones.
struct TableInner {
    /// Stored linear id per occupied slot
    linear_ids: Vec<u16>,

    /// Free-list link per free slot
    next_free: Vec<Option<u16>>,

    /// Object reference per occupied slot
    objects: Vec<Option<ObjectRef>>,

    /// Head of the free list
    free_head: Option<u16>,

    /// Next linear id to hand out
    next_linear_id: u16,

    /// Number of occupied slots
    count: usize,
}

impl TableInner {
    fn new(capacity: usize) -> Self {
        let mut next_free = Vec::with_capacity(capacity);
        let mut objects = Vec::with_capacity(capacity);
        let mut free_head = None;

        // Slot i links to slot i - 1; the head ends at the highest slot
        for i in 0..capacity {
            next_free.push(free_head);
            objects.push(None);
            free_head = Some(i as u16);
        }

        Self {
            linear_ids: vec![0; capacity],
            next_free,
            objects,
            free_head,
            next_linear_id: 1,
            count: 0,
        }
    }

    /// Hand out a linear id, wrapping past the top and skipping zero
    fn allocate_linear_id(&mut self) -> u16 {
        let id = self.next_linear_id;
        self.next_linear_id = match self.next_linear_id.wrapping_add(1) {
            0 => 1,
            next => next,
        };
        id
    }

    /// Validate a handle against the slot it names
    fn slot_of(&self, handle: Handle) -> Option<usize> {
        if handle.reserved() != 0 {
            return None;
        }
        let index = handle.index() as usize;
        if index >= self.objects.len() || self.objects[index].is_none() {
            return None;
        }
        if self.linear_ids[index] != handle.linear_id() {
            return None;
        }
        Some(index)
    }
}

/// Handle table
///
/// Maps handles to kernel objects. Each occupied slot owns one reference to
/// its object. All mutation is serialized by a single lock.
pub struct HandleTable {
    inner: Mutex<TableInner>,
    capacity: usize,
}

impl HandleTable {
    /// Create a table with `capacity` slots
    ///
    /// Capacities beyond what the index field can address are clamped.
    pub fn new(capacity: usize) -> Self {
        let capacity = if capacity > MAX_TABLE_SIZE {
            warn!(
                "HandleTable: capacity {:#X} exceeds index range, clamping to {:#X}",
                capacity, MAX_TABLE_SIZE
            );
            MAX_TABLE_SIZE
        } else {
            capacity
        };

        Self {
            inner: Mutex::new(TableInner::new(capacity)),
            capacity,
        }
    }

    /// Reset the table, releasing every stored reference
    pub fn initialize(&self) {
        let old = {
            let mut inner = self.inner.lock();
            core::mem::replace(&mut *inner, TableInner::new(self.capacity))
        };
        // Objects are released outside the lock
        drop(old);
    }

    /// Add an object, taking ownership of the given reference
    ///
    /// # Returns
    ///
    /// - `Ok(handle)` on success
    /// - `Err(ResultCode::OUT_OF_HANDLES)` if every slot is occupied
    pub fn add(&self, object: ObjectRef) -> Result<Handle, ResultCode> {
        let mut inner = self.inner.lock();

        let Some(index) = inner.free_head else {
            return Err(ResultCode::OUT_OF_HANDLES);
        };
        let slot = index as usize;

        inner.free_head = inner.next_free[slot].take();
        let linear_id = inner.allocate_linear_id();
        inner.linear_ids[slot] = linear_id;
        inner.objects[slot] = Some(object);
        inner.count += 1;

        let handle = Handle::new(index, linear_id);
        debug!("HandleTable: add {:?} (slot {:#X})", handle, index);
        Ok(handle)
    }

    /// Remove a handle, releasing the table's reference
    ///
    /// # Returns
    ///
    /// - `Ok(())` on success
    /// - `Err(ResultCode::INVALID_HANDLE)` if the handle is out of range,
    ///   unoccupied or stale
    pub fn remove(&self, handle: Handle) -> Result<(), ResultCode> {
        let released = {
            let mut inner = self.inner.lock();
            let slot = inner.slot_of(handle).ok_or(ResultCode::INVALID_HANDLE)?;

            let object = inner.objects[slot].take();
            inner.linear_ids[slot] = 0;
            inner.next_free[slot] = inner.free_head;
            inner.free_head = Some(slot as u16);
            inner.count -= 1;
            object
        };

        debug!("HandleTable: remove {:?}", handle);
        // Last reference may finalize here, outside the lock
        drop(released);
        Ok(())
    }

    /// Look up a handle, returning a new reference to its object
    pub fn get(&self, handle: Handle) -> Option<ObjectRef> {
        let inner = self.inner.lock();
        let slot = inner.slot_of(handle)?;
        inner.objects[slot].as_ref().map(ObjectRef::acquire)
    }

    /// Number of occupied slots
    pub fn count(&self) -> usize {
        self.inner.lock().count
    }

    /// Total number of slots
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for HandleTable {
    fn default() -> Self {
        Self::new(MAX_HANDLES)
    }
}

// ============================================================================
// Tests
// ============================================================================
