//! Object headers and the reference counting engine.
//!
//! Every heap object starts with a [`Header`] holding its [`Kind`], a small
//! metadata field, and (in [`RcMode::Inline`]) its strong and weak counts.
//! Counts saturate at [`RC_MAX`]: once an object is pinned there, it is never
//! released again and simply leaks.

pub mod alloc;

use std::cell::Cell;
use std::ptr::NonNull;

use enum_ordinalize::Ordinalize;
use modular_bitfield::prelude::*;

use crate::file::FileBody;
use crate::host::HostFuncBody;
use crate::value::{Val, TAG_WIDTH};

pub use alloc::{AllocStats, HeapError, RcMode};

/// The largest value a strong or weak count can hold. Counts reaching this
/// value are pinned.
pub const RC_MAX: u32 = (1 << 28) - 1;

/// The concrete kind of a heap object, stored in its header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, BitfieldSpecifier, Ordinalize)]
pub enum Kind {
    /// A byte string too long to fit in a data word.
    Data,
    /// A plain vector.
    Vec,
    /// A chain link: `[payload, next]`.
    Chain,
    /// A parameter record: `[name, type, default]`.
    Par,
    /// An environment node.
    Env,
    /// A closure: `[name, pars, body, env]`.
    Func,
    HostFunc,
    File,
    I32,
    I64,
    U32,
    U64,
    F32,
    F64,
    Reserved,
    /// Marks objects that were torn down.
    Deallocated,
}

impl Kind {
    /// Returns `true` if objects of this kind are laid out as value slots.
    pub fn has_slots(self) -> bool {
        matches!(
            self,
            Kind::Vec | Kind::Chain | Kind::Par | Kind::Env | Kind::Func
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            Kind::Data => "Data",
            Kind::Vec => "Vec",
            Kind::Chain => "Chain",
            Kind::Par => "Par",
            Kind::Env => "Env",
            Kind::Func => "Func",
            Kind::HostFunc => "Func-host",
            Kind::File => "File",
            Kind::I32 => "I32",
            Kind::I64 => "I64",
            Kind::U32 => "U32",
            Kind::U64 => "U64",
            Kind::F32 => "F32",
            Kind::F64 => "F64",
            Kind::Reserved => "Reserved",
            Kind::Deallocated => "Deallocated",
        }
    }
}

/// The packed first word of every header.
#[bitfield]
#[derive(Clone, Copy)]
pub(crate) struct RcBits {
    kind: Kind,
    meta: B4,
    weak: B28,
    strong: B28,
}

/// Strong and weak counts of one object, wherever they are stored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Counts {
    pub strong: u32,
    pub weak: u32,
}

#[repr(C)]
#[repr(align(16))]
pub(crate) struct Header {
    bits: Cell<RcBits>,
    /// Body length: bytes for byte strings, slots for compound kinds.
    len: Cell<usize>,
}

// Assert layout
static_assertions::assert_eq_size!(RcBits, u64);
static_assertions::const_assert!(std::mem::align_of::<Header>() >= 1 << TAG_WIDTH);
static_assertions::const_assert_eq!(std::mem::size_of::<Header>() % 16, 0);

impl Header {
    pub(crate) fn new(kind: Kind) -> Header {
        Header {
            bits: Cell::new(RcBits::new().with_kind(kind)),
            len: Cell::new(0),
        }
    }

    pub fn kind(&self) -> Kind {
        self.bits.get().kind()
    }

    fn set_kind(&self, kind: Kind) {
        let mut bits = self.bits.get();
        bits.set_kind(kind);
        self.bits.set(bits);
    }

    pub fn meta(&self) -> u8 {
        self.bits.get().meta()
    }

    pub fn set_meta(&self, meta: u8) {
        let mut bits = self.bits.get();
        bits.set_meta(meta);
        self.bits.set(bits);
    }

    pub fn len(&self) -> usize {
        self.len.get()
    }

    pub fn set_len(&self, len: usize) {
        self.len.set(len)
    }

    fn inline_counts(&self) -> Counts {
        let bits = self.bits.get();
        Counts {
            strong: bits.strong(),
            weak: bits.weak(),
        }
    }

    fn set_inline_counts(&self, counts: Counts) {
        let mut bits = self.bits.get();
        bits.set_strong(counts.strong);
        bits.set_weak(counts.weak);
        self.bits.set(bits);
    }

    /// Pointer to the first byte after the header.
    pub fn body(ptr: NonNull<Header>) -> *mut u8 {
        unsafe { (ptr.as_ptr() as *mut u8).add(std::mem::size_of::<Header>()) }
    }

    /// The value slots of a compound object.
    ///
    /// # Safety
    ///
    /// `ptr` must point to a live object whose kind has slots.
    pub unsafe fn slots<'a>(ptr: NonNull<Header>) -> &'a [Val] {
        let len = ptr.as_ref().len();
        std::slice::from_raw_parts(Header::body(ptr) as *const Val, len)
    }

    /// # Safety
    ///
    /// `ptr` must point to a live byte string.
    pub unsafe fn bytes<'a>(ptr: NonNull<Header>) -> &'a [u8] {
        let len = ptr.as_ref().len();
        std::slice::from_raw_parts(Header::body(ptr) as *const u8, len)
    }
}

/// Increase the strong count.
///
/// # Safety
///
/// `ptr` must point to a live object.
pub(crate) unsafe fn retain_strong(ptr: NonNull<Header>) {
    debug_assert_ne!(ptr.as_ref().kind(), Kind::Deallocated, "retained a dead object");
    let pinned = alloc::update_counts(ptr, |c| saturating_inc(&mut c.strong));
    if pinned {
        alloc::report_pin(ptr, "strong");
    }
}

/// Increase the weak count.
///
/// # Safety
///
/// `ptr` must point to a live object.
pub(crate) unsafe fn retain_weak(ptr: NonNull<Header>) {
    let pinned = alloc::update_counts(ptr, |c| saturating_inc(&mut c.weak));
    if pinned {
        alloc::report_pin(ptr, "weak");
    }
}

/// Increments `count` unless it is pinned. Returns `true` if this increment
/// pinned it.
fn saturating_inc(count: &mut u32) -> bool {
    if *count == RC_MAX {
        return false;
    }
    *count += 1;
    *count == RC_MAX
}

/// Decrease the strong count, tearing the object down when it reaches zero.
///
/// The last slot of a compound object is released by this loop rather than
/// recursively, so long chains are freed in constant native stack.
///
/// # Safety
///
/// The caller must own one strong count of `ptr`.
pub(crate) unsafe fn release_strong(ptr: NonNull<Header>) {
    let mut next = Some(ptr);
    while let Some(ptr) = next.take() {
        let dead = alloc::update_counts(ptr, |c| {
            debug_assert!(c.strong > 0, "strong count released below zero");
            if c.strong == RC_MAX {
                return false;
            }
            c.strong -= 1;
            c.strong == 0
        });
        if dead {
            next = teardown(ptr);
        }
    }
}

/// Decrease the weak count, freeing the storage of an already torn-down
/// object once no weak references remain.
///
/// # Safety
///
/// The caller must own one weak count of `ptr`.
pub(crate) unsafe fn release_weak(ptr: NonNull<Header>) {
    let counts = alloc::update_counts(ptr, |c| {
        debug_assert!(c.weak > 0, "weak count released below zero");
        if c.weak != RC_MAX {
            c.weak -= 1;
        }
        *c
    });
    if counts.weak == 0 && counts.strong == 0 {
        debug_assert_eq!(ptr.as_ref().kind(), Kind::Deallocated);
        alloc::deallocate(ptr);
    }
}

/// Drop the body of a dead object. Returns the last slot's object if it still
/// needs releasing.
unsafe fn teardown(ptr: NonNull<Header>) -> Option<NonNull<Header>> {
    let header = ptr.as_ref();
    let kind = header.kind();
    assert_ne!(kind, Kind::Deallocated, "object was torn down twice");
    tracing::trace!(target: "knot_vm::rc", addr = ?ptr, ?kind, "teardown");
    alloc::record_teardown(kind);

    let mut tail = None;
    match kind {
        k if k.has_slots() => {
            let len = header.len();
            let slots = Header::body(ptr) as *mut Val;
            if len > 0 {
                for i in 0..len - 1 {
                    std::ptr::drop_in_place(slots.add(i));
                }
                tail = Some(slots.add(len - 1).read());
            }
        }
        Kind::HostFunc => std::ptr::drop_in_place(Header::body(ptr) as *mut HostFuncBody),
        Kind::File => std::ptr::drop_in_place(Header::body(ptr) as *mut FileBody),
        _ => {}
    }
    header.set_kind(Kind::Deallocated);

    let counts = alloc::update_counts(ptr, |c| *c);
    if counts.weak == 0 {
        alloc::deallocate(ptr);
    }

    tail.and_then(Val::into_header_ptr)
}

/// Read both counts of a live object.
///
/// # Safety
///
/// `ptr` must point to an object whose storage has not been freed.
pub(crate) unsafe fn counts(ptr: NonNull<Header>) -> Counts {
    alloc::update_counts(ptr, |c| *c)
}

/// A non-owning reference to a heap value.
///
/// Holding a `WeakVal` keeps the object's storage around but not its
/// contents: once the last strong reference is gone, [`WeakVal::upgrade`]
/// returns `None`.
pub struct WeakVal(NonNull<Header>);

impl WeakVal {
    pub fn upgrade(&self) -> Option<Val> {
        unsafe {
            if counts(self.0).strong == 0 {
                return None;
            }
            retain_strong(self.0);
            Some(Val::from_header(self.0))
        }
    }
}

impl Clone for WeakVal {
    fn clone(&self) -> Self {
        unsafe { retain_weak(self.0) };
        WeakVal(self.0)
    }
}

impl Drop for WeakVal {
    fn drop(&mut self) {
        unsafe { release_weak(self.0) }
    }
}

impl std::fmt::Debug for WeakVal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("WeakVal").field(&self.0).finish()
    }
}

impl Val {
    /// Create a weak reference. Returns `None` for values that are not heap
    /// references.
    pub fn downgrade(&self) -> Option<WeakVal> {
        let ptr = self.header_ptr()?;
        unsafe { retain_weak(ptr) };
        Some(WeakVal(ptr))
    }

    /// Current strong count, or `None` if this is not a heap reference.
    pub fn strong_count(&self) -> Option<u32> {
        self.header_ptr().map(|ptr| unsafe { counts(ptr).strong })
    }

    /// Current weak count, or `None` if this is not a heap reference.
    pub fn weak_count(&self) -> Option<u32> {
        self.header_ptr().map(|ptr| unsafe { counts(ptr).weak })
    }

    /// Returns `true` if this is the only reference of any kind to its object.
    pub(crate) fn is_unique(&self) -> bool {
        self.header_ptr().map_or(false, |ptr| {
            let c = unsafe { counts(ptr) };
            c.strong == 1 && c.weak == 0
        })
    }

    #[cfg(test)]
    pub(crate) fn force_strong_count(&self, strong: u32) {
        if let Some(ptr) = self.header_ptr() {
            unsafe { alloc::update_counts(ptr, |c| c.strong = strong) };
        }
    }
}
