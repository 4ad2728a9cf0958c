//! The tagged machine word.
//!
//! A [`Val`] is exactly one `usize`. The low [`TAG_WIDTH`] bits select what
//! the rest of the word means:
//!
//! ```plaintext
//! ...pointer bits... 000   reference to a 16-byte aligned heap object
//! ...signed integer. 001   small integer
//! ...symbol index... 010   symbol
//! .payload. LLL      011   up to 7 bytes of data, LLL is the length
//! ```
//!
//! Tag `100` is reserved for a future collected reference kind.

mod compound;
mod data;
mod numeric;

use std::fmt;
use std::marker::PhantomData;
use std::num::NonZeroUsize;
use std::ptr::NonNull;

use enum_ordinalize::Ordinalize;

use crate::gc::{self, Header, Kind};
use crate::sym::{Special, Sym};

pub(crate) use compound::alloc_slots;
pub use compound::{ChainIter, FuncKind, FuncRef, ParKind, ParRef};
pub use data::DataBytes;
pub use numeric::Numeric;

pub const TAG_WIDTH: u32 = 3;
const TAG_MASK: usize = (1 << TAG_WIDTH) - 1;

/// Largest integer that fits in a tagged word.
pub const INT_MAX: i64 = (isize::MAX >> TAG_WIDTH) as i64;
/// Smallest integer that fits in a tagged word.
pub const INT_MIN: i64 = (isize::MIN >> TAG_WIDTH) as i64;

/// Number of payload bytes a data word can hold.
pub const DATA_WORD_CAP: usize = std::mem::size_of::<usize>() - 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Ordinalize)]
#[repr(u8)]
pub enum Tag {
    Ref = 0,
    Int = 1,
    Sym = 2,
    DataWord = 3,
    /// Never produced; kept so the tag space has room for a collected
    /// reference kind.
    Managed = 4,
}

/// A value of the language.
///
/// Cloning a reference retains it, dropping releases it. Functions taking
/// `&Val` borrow the value; functions taking `Val` take over one count.
/// Values belong to the thread whose heap allocated them.
#[repr(transparent)]
pub struct Val(NonZeroUsize, PhantomData<*const Header>);

static_assertions::assert_eq_size!(Val, usize);
static_assertions::assert_eq_size!(Option<Val>, usize);
static_assertions::const_assert!(DATA_WORD_CAP < 1 << TAG_WIDTH);

impl Val {
    /// Build a value from a raw word.
    ///
    /// # Safety
    ///
    /// `word` must be nonzero, and if it is a reference the caller must hand
    /// over one strong count.
    unsafe fn from_word(word: usize) -> Val {
        Val(NonZeroUsize::new_unchecked(word), PhantomData)
    }

    /// Take over one strong count of a heap object.
    ///
    /// # Safety
    ///
    /// The caller must own a strong count of `ptr`.
    pub(crate) unsafe fn from_header(ptr: NonNull<Header>) -> Val {
        Val::from_word(ptr.as_ptr() as usize)
    }

    /// Give up ownership without releasing, returning the object pointer if
    /// this is a heap reference. Non-references are simply dropped.
    pub(crate) fn into_header_ptr(self) -> Option<NonNull<Header>> {
        let ptr = self.header_ptr();
        std::mem::forget(self);
        ptr
    }

    /// The raw machine word.
    pub fn word(&self) -> usize {
        self.0.get()
    }

    pub fn tag(&self) -> Tag {
        match Tag::from_ordinal((self.word() & TAG_MASK) as u8) {
            Some(tag) => tag,
            None => unreachable!("invalid tag in word {:#x}", self.word()),
        }
    }

    /// Returns `true` if both values are the same word (the same object for
    /// references).
    pub fn same(&self, other: &Val) -> bool {
        self.word() == other.word()
    }

    /// Address of the referenced object, if this is a reference.
    pub fn addr(&self) -> Option<usize> {
        self.is_ref().then(|| self.word())
    }

    /// Returns `true` if the val is a heap reference.
    pub fn is_ref(&self) -> bool {
        self.word() & TAG_MASK == Tag::Ref as usize
    }

    pub(crate) fn header_ptr(&self) -> Option<NonNull<Header>> {
        if self.is_ref() {
            NonNull::new(self.word() as *mut Header)
        } else {
            None
        }
    }

    pub(crate) fn header(&self) -> Option<&Header> {
        self.header_ptr().map(|ptr| unsafe { &*ptr.as_ptr() })
    }

    /// The heap kind of a reference.
    pub fn kind(&self) -> Option<Kind> {
        self.header().map(Header::kind)
    }

    /// Returns `true` if the val is a reference of the given kind.
    pub fn is_kind(&self, kind: Kind) -> bool {
        self.kind() == Some(kind)
    }

    // === Integers ===

    /// Make a small integer.
    ///
    /// # Panics
    ///
    /// Panics if `i` is outside `INT_MIN..=INT_MAX`. Use [`Val::try_int`] for
    /// values from untrusted arithmetic.
    pub fn int(i: i64) -> Val {
        match Val::try_int(i) {
            Some(v) => v,
            None => panic!("integer {} does not fit in a tagged word", i),
        }
    }

    pub fn try_int(i: i64) -> Option<Val> {
        if !(INT_MIN..=INT_MAX).contains(&i) {
            return None;
        }
        let word = ((i as isize) << TAG_WIDTH) as usize | Tag::Int as usize;
        Some(unsafe { Val::from_word(word) })
    }

    /// Returns `true` if the val is a small integer.
    pub fn is_int(&self) -> bool {
        self.tag() == Tag::Int
    }

    pub fn as_int(&self) -> Option<i64> {
        if self.is_int() {
            Some((self.word() as isize >> TAG_WIDTH) as i64)
        } else {
            None
        }
    }

    // === Symbols ===

    pub fn sym(sym: Sym) -> Val {
        let word = (sym.index() as usize) << TAG_WIDTH | Tag::Sym as usize;
        unsafe { Val::from_word(word) }
    }

    pub fn special(special: Special) -> Val {
        Val::sym(special.sym())
    }

    /// Returns `true` if the val is a symbol.
    pub fn is_sym(&self) -> bool {
        self.tag() == Tag::Sym
    }

    pub fn as_sym(&self) -> Option<Sym> {
        if self.is_sym() {
            Some(Sym::from_index((self.word() >> TAG_WIDTH) as u32))
        } else {
            None
        }
    }

    /// Returns `true` if the val is the given special symbol.
    pub fn is_special(&self, special: Special) -> bool {
        self.as_sym() == Some(special.sym())
    }

    pub fn void() -> Val {
        Val::special(Special::Void)
    }

    pub fn bool(b: bool) -> Val {
        Val::special(if b { Special::True } else { Special::False })
    }

    /// Convert this value to boolean.
    ///
    /// The only falsy values are:
    ///
    /// - `''` (the blank data value)
    /// - `0` (integer zero)
    /// - `void`, `nil` and `false`
    pub fn is_truthy(&self) -> bool {
        !(self.is_blank()
            || self.as_int() == Some(0)
            || self.as_sym().map_or(false, |s| {
                s == Special::Void.sym() || s == Special::Nil.sym() || s == Special::False.sym()
            }))
    }
}

impl Clone for Val {
    fn clone(&self) -> Self {
        if let Some(ptr) = self.header_ptr() {
            unsafe { gc::retain_strong(ptr) };
        }
        Val(self.0, PhantomData)
    }
}

impl Drop for Val {
    fn drop(&mut self) {
        if let Some(ptr) = self.header_ptr() {
            unsafe { gc::release_strong(ptr) };
        }
    }
}

/// Structural equality: equal words, or heap objects of the same kind with
/// equal contents. Environments, closures, host functions and files compare
/// by identity.
impl PartialEq for Val {
    fn eq(&self, other: &Val) -> bool {
        let (mut a, mut b) = (self, other);
        loop {
            if a.same(b) {
                return true;
            }
            let (ka, kb) = match (a.kind(), b.kind()) {
                (Some(ka), Some(kb)) => (ka, kb),
                _ => return false,
            };
            if ka != kb {
                return false;
            }
            match ka {
                Kind::Data => return a.data_bytes().as_deref() == b.data_bytes().as_deref(),
                Kind::I32 | Kind::I64 | Kind::U32 | Kind::U64 | Kind::F32 | Kind::F64 => {
                    return a.as_numeric() == b.as_numeric()
                }
                Kind::Vec | Kind::Chain | Kind::Par => {
                    if a.header().map(Header::meta) != b.header().map(Header::meta) {
                        return false;
                    }
                    let (sa, sb) = match (a.slots(), b.slots()) {
                        (Some(sa), Some(sb)) if sa.len() == sb.len() => (sa, sb),
                        _ => return false,
                    };
                    let last = match sa.len().checked_sub(1) {
                        Some(last) => last,
                        None => return true,
                    };
                    if sa[..last] != sb[..last] {
                        return false;
                    }
                    // compare the tail without recursing
                    a = &sa[last];
                    b = &sb[last];
                }
                _ => return false,
            }
        }
    }
}

impl Eq for Val {}

/// A symbol-table-free rendering, for debugging. Use
/// [`crate::Runtime::repr`] for the real printed form.
impl fmt::Debug for Val {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.tag() {
            Tag::Int => write!(f, "{}", self.as_int().unwrap_or_default()),
            Tag::Sym => match self.as_sym().and_then(Sym::special) {
                Some(special) => write!(f, "{}", special.name()),
                None => write!(f, "#{}", self.as_sym().map_or(0, Sym::index)),
            },
            Tag::DataWord => write!(f, "{:?}", DebugBytes(&self.data_bytes().unwrap_or_default())),
            Tag::Managed => write!(f, "<managed {:#x}>", self.word()),
            Tag::Ref => match self.kind() {
                Some(Kind::Data) => write!(f, "{:?}", DebugBytes(&self.data_bytes().unwrap_or_default())),
                Some(Kind::Vec) => f.debug_set().entries(self.slots().unwrap_or_default()).finish(),
                Some(Kind::Chain) => f.debug_list().entries(self.chain_iter()).finish(),
                Some(kind) => write!(f, "<{} {:#x}>", kind.name(), self.word()),
                None => write!(f, "<null>"),
            },
        }
    }
}

struct DebugBytes<'a>(&'a [u8]);

impl fmt::Debug for DebugBytes<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}'", self.0.escape_ascii())
    }
}
