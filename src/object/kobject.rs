// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Kernel Object Base
//!
//! Every kernel entity reachable from guest code is a [`KernelObject`]:
//! a reference count, a type tag and a kind-specific payload.
//!
//! # Design
//!
//! - **Flat representation**: one struct, payload selected by [`ObjectKind`]
//! - **Lock-free refcount**: compare-exchange retry loops, never blocking
//! - **Fail-fast**: refcount underflow or overflow aborts emulation
//! - **Scoped references**: [`ObjectRef`] acquires on creation and releases on drop
//!
//! # Lifecycle
//!
//! ```text
//! create() ──► refcount = 1 ──► initialize()
//!                   │
//!        acquire()/drop() churn
//!                   │
//!          refcount reaches 0 ──► finalize() ──► storage freed
//! ```
//!
//! # Usage
//!
//! ```ignore
//! let port = KernelObject::create(ObjectKind::Port(Port::new("srv:", true)?));
//! let extra = port.acquire();
//! drop(extra);
//! ```

use core::fmt;
use core::ops::Deref;
use core::ptr::NonNull;
use core::sync::atomic::{AtomicU32, Ordering};

use log::{error, trace};
use spin::Mutex;

use super::fs::{DirectoryObject, FileObject};
use super::memory_block::MemoryBlock;
use super::port::{Port, Session};

/// ============================================================================
/// Kernel Object Types
/// ============================================================================

/// Kernel object type
///
/// The ABI assigns each type a one-byte tag; see [`ObjectType::abi_tag`].
/// `ClientPort` and `CodeSet` share tag 0x65 in the ABI, so type checks
/// inside the kernel always compare variants, never tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectType {
    AutoObject,
    SynchronizationObject,
    Event,
    Semaphore,
    Timer,
    Mutex,
    Debug,
    ServerPort,
    Dma,
    ClientPort,
    Session,
    CodeSet,
    Thread,
    AddressArbiter,
    ServerSession,
    ClientSession,
    SharedMemory,
    Port,
    Process,
    ResourceLimit,

    /// Open file (emulator-side, no ABI tag)
    File,

    /// Open directory (emulator-side, no ABI tag)
    Directory,
}

impl ObjectType {
    /// ABI type tag, if the type exists in the target ABI
    pub const fn abi_tag(self) -> Option<u8> {
        let tag = match self {
            Self::AutoObject => 0x00,
            Self::SynchronizationObject => 0x01,
            Self::Event => 0x1F,
            Self::Semaphore => 0x2F,
            Self::Timer => 0x35,
            Self::Mutex => 0x39,
            Self::Debug => 0x4D,
            Self::ServerPort => 0x55,
            Self::Dma => 0x59,
            Self::ClientPort => 0x65,
            Self::Session => 0x70,
            Self::CodeSet => 0x65,
            Self::Thread => 0x8D,
            Self::AddressArbiter => 0x98,
            Self::ServerSession => 0x95,
            Self::ClientSession => 0xA5,
            Self::SharedMemory => 0xB0,
            Self::Port => 0xA8,
            Self::Process => 0xC5,
            Self::ResourceLimit => 0xC8,
            Self::File | Self::Directory => return None,
        };
        Some(tag)
    }

    /// Kernel class name
    pub const fn name(self) -> &'static str {
        match self {
            Self::AutoObject => "KAutoObject",
            Self::SynchronizationObject => "KSynchronizationObject",
            Self::Event => "KEvent",
            Self::Semaphore => "KSemaphore",
            Self::Timer => "KTimer",
            Self::Mutex => "KMutex",
            Self::Debug => "KDebug",
            Self::ServerPort => "KServerPort",
            Self::Dma => "KDmaObject",
            Self::ClientPort => "KClientPort",
            Self::Session => "KSession",
            Self::CodeSet => "KCodeSet",
            Self::Thread => "KThread",
            Self::AddressArbiter => "KAddressArbiter",
            Self::ServerSession => "KServerSession",
            Self::ClientSession => "KClientSession",
            Self::SharedMemory => "KSharedMemory",
            Self::Port => "KPort",
            Self::Process => "KProcess",
            Self::ResourceLimit => "KResourceLimit",
            Self::File => "File",
            Self::Directory => "Directory",
        }
    }
}

/// Fixed (name, type) pair of a concrete object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeObj {
    pub name: &'static str,
    pub object_type: ObjectType,
}

/// ============================================================================
/// Object Payload
/// ============================================================================

/// Kind-specific payload of a kernel object
#[derive(Debug)]
pub enum ObjectKind {
    Port(Port),
    Session(Session),
    MemoryBlock(MemoryBlock),
    File(FileObject),
    Directory(DirectoryObject),
}

impl ObjectKind {
    /// Type tag of this payload
    pub const fn object_type(&self) -> ObjectType {
        match self {
            Self::Port(_) => ObjectType::Port,
            Self::Session(_) => ObjectType::Session,
            Self::MemoryBlock(_) => ObjectType::SharedMemory,
            Self::File(_) => ObjectType::File,
            Self::Directory(_) => ObjectType::Directory,
        }
    }
}

/// Callback invoked once from `finalize()`
pub type FinalizeHook = Box<dyn FnOnce(&ObjectKind) + Send>;

/// ============================================================================
/// Kernel Object
/// ============================================================================

/// Kernel object
///
/// Identity-bound: never cloned or moved once created. Storage is owned by
/// the reference count and reachable only through [`ObjectRef`].
pub struct KernelObject {
    /// Reference count; zero only before creation completes or after destruction starts
    refcount: AtomicU32,

    /// Kind-specific payload
    kind: ObjectKind,

    /// Optional finalize observer
    finalize_hook: Mutex<Option<FinalizeHook>>,
}

impl KernelObject {
    /// Create a new kernel object
    ///
    /// The object starts with a refcount of one, owned by the returned reference,
    /// and its initialize hook has already run.
    pub fn create(kind: ObjectKind) -> ObjectRef {
        let object = Box::new(Self {
            refcount: AtomicU32::new(1),
            kind,
            finalize_hook: Mutex::new(None),
        });
        object.initialize();

        ObjectRef {
            ptr: NonNull::from(Box::leak(object)),
        }
    }

    /// Type verification pair
    pub fn type_obj(&self) -> TypeObj {
        let object_type = self.object_type();
        TypeObj {
            name: object_type.name(),
            object_type,
        }
    }

    /// Type tag
    pub fn object_type(&self) -> ObjectType {
        self.kind.object_type()
    }

    /// Display name
    pub fn name(&self) -> &'static str {
        self.object_type().name()
    }

    /// Payload
    pub fn kind(&self) -> &ObjectKind {
        &self.kind
    }

    /// Current reference count
    pub fn refcount(&self) -> u32 {
        self.refcount.load(Ordering::Acquire)
    }

    /// Register a callback to run when the object is finalized
    pub fn set_finalize_hook(&self, hook: FinalizeHook) {
        *self.finalize_hook.lock() = Some(hook);
    }

    /// Port payload, if this is a port
    pub fn as_port(&self) -> Option<&Port> {
        match &self.kind {
            ObjectKind::Port(port) => Some(port),
            _ => None,
        }
    }

    /// Session payload, if this is a session
    pub fn as_session(&self) -> Option<&Session> {
        match &self.kind {
            ObjectKind::Session(session) => Some(session),
            _ => None,
        }
    }

    /// Memory block payload, if this is a memory block
    pub fn as_memory_block(&self) -> Option<&MemoryBlock> {
        match &self.kind {
            ObjectKind::MemoryBlock(block) => Some(block),
            _ => None,
        }
    }

    /// File payload, if this is a file
    pub fn as_file(&self) -> Option<&FileObject> {
        match &self.kind {
            ObjectKind::File(file) => Some(file),
            _ => None,
        }
    }

    /// Directory payload, if this is a directory
    pub fn as_directory(&self) -> Option<&DirectoryObject> {
        match &self.kind {
            ObjectKind::Directory(dir) => Some(dir),
            _ => None,
        }
    }

    /// Acquire an additional scoped reference
    pub fn acquire(&self) -> ObjectRef {
        self.increment_refcount();
        ObjectRef {
            ptr: NonNull::from(self),
        }
    }

    fn initialize(&self) {
        trace!("{}: initialize", self.name());
    }

    fn finalize(&self) {
        trace!("{}: finalize", self.name());
        if let Some(hook) = self.finalize_hook.lock().take() {
            hook(&self.kind);
        }
    }

    /// Increment the reference count
    ///
    /// Fatal if the count is zero (use after free) or would overflow.
    pub(crate) fn increment_refcount(&self) {
        let mut current = self.refcount.load(Ordering::Relaxed);
        loop {
            if current == 0 {
                fatal(self.name(), "increment_refcount: current is zero");
            }
            let Some(next) = current.checked_add(1) else {
                fatal(self.name(), "increment_refcount: current overflowed");
            };

            match self.refcount.compare_exchange_weak(
                current,
                next,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return,
                Err(actual) => current = actual,
            }
        }
    }

    /// Decrement the reference count
    ///
    /// Returns true if this released the last reference. Fatal if the count
    /// is already zero.
    pub(crate) fn decrement_refcount(&self) -> bool {
        let mut current = self.refcount.load(Ordering::Relaxed);
        loop {
            if current == 0 {
                fatal(self.name(), "decrement_refcount: current is zero");
            }

            match self.refcount.compare_exchange_weak(
                current,
                current - 1,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return current == 1,
                Err(actual) => current = actual,
            }
        }
    }
}

impl fmt::Debug for KernelObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KernelObject")
            .field("type", &self.object_type())
            .field("refcount", &self.refcount())
            .field("kind", &self.kind)
            .finish()
    }
}

/// Broken refcount invariant: log and abort
#[cold]
fn fatal(name: &str, msg: &str) -> ! {
    error!("{}: {}", name, msg);
    panic!("{}: {}", name, msg);
}

/// ============================================================================
/// Scoped Object Reference
/// ============================================================================

/// Counted reference to a kernel object
///
/// Holds exactly one reference for its lifetime and releases it on drop.
/// Not `Clone`: moving transfers the reference, [`ObjectRef::acquire`] takes
/// a new one explicitly.
pub struct ObjectRef {
    ptr: NonNull<KernelObject>,
}

// SAFETY: KernelObject is Sync (atomics, spin lock, Send + Sync payloads) and
// the pointee outlives every ObjectRef by construction of the refcount.
unsafe impl Send for ObjectRef {}
unsafe impl Sync for ObjectRef {}

impl ObjectRef {
    /// Take another reference to the same object
    pub fn acquire(&self) -> ObjectRef {
        self.deref().acquire()
    }

    /// Check whether two references point at the same object
    pub fn ptr_eq(a: &ObjectRef, b: &ObjectRef) -> bool {
        a.ptr == b.ptr
    }
}

impl Deref for ObjectRef {
    type Target = KernelObject;

    fn deref(&self) -> &KernelObject {
        // SAFETY: this reference keeps the refcount above zero
        unsafe { self.ptr.as_ref() }
    }
}

impl Drop for ObjectRef {
    fn drop(&mut self) {
        if self.deref().decrement_refcount() {
            // SAFETY: last reference; nothing else can observe the object
            unsafe {
                self.ptr.as_ref().finalize();
                drop(Box::from_raw(self.ptr.as_ptr()));
            }
        }
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.deref().fmt(f)
    }
}

// ============================================================================
// Tests
// ============================================================================
