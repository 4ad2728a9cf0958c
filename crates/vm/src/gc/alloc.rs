use std::alloc::Layout;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::ptr::NonNull;

use enum_ordinalize::Ordinalize;
use fnv::FnvHashMap;
use libmimalloc_sys::{mi_free, mi_heap_malloc_aligned, mi_heap_new, mi_heap_realloc_aligned, mi_heap_t};

use super::{Counts, Header, Kind};

/// Alignment of every heap object. References keep their low tag bits free
/// because of this.
pub const HEAP_ALIGN: usize = 16;

const KIND_COUNT: usize = 16;

/// Where strong and weak counts are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RcMode {
    /// Counts live in the object header.
    Inline,
    /// Counts live in a side table keyed by object address.
    Table,
}

impl Default for RcMode {
    fn default() -> Self {
        RcMode::Inline
    }
}

#[derive(Debug, thiserror::Error)]
pub enum HeapError {
    #[error("cannot switch reference count strategy with {0} live objects")]
    LiveObjects(usize),
}

/// The per-thread heap.
///
/// All values created on a thread are allocated here, which is also why
/// values never cross threads.
struct Heap {
    mi_heap: *mut mi_heap_t,
    mode: Cell<RcMode>,
    table: RefCell<FnvHashMap<usize, Counts>>,
    allocs: [Cell<u64>; KIND_COUNT],
    frees: [Cell<u64>; KIND_COUNT],
    live: Cell<usize>,
    pins: Cell<u64>,
}

thread_local! {
    static HEAP: Heap = Heap::new();
}

impl Heap {
    fn new() -> Heap {
        let heap = Heap {
            mi_heap: unsafe { mi_heap_new() },
            mode: Cell::new(RcMode::Inline),
            table: RefCell::new(FnvHashMap::default()),
            allocs: Default::default(),
            frees: Default::default(),
            live: Cell::new(0),
            pins: Cell::new(0),
        };
        heap.check_alignment();
        heap
    }

    /// Make sure the platform allocator honors our alignment before any
    /// value is built on top of it.
    fn check_alignment(&self) {
        unsafe {
            let sample = mi_heap_malloc_aligned(self.mi_heap, HEAP_ALIGN, HEAP_ALIGN);
            if sample.is_null() {
                std::alloc::handle_alloc_error(sample_layout());
            }
            assert_eq!(
                sample as usize % HEAP_ALIGN,
                0,
                "allocator does not honor {}-byte alignment",
                HEAP_ALIGN
            );
            mi_free(sample);
        }
    }
}

fn sample_layout() -> Layout {
    Layout::from_size_align(HEAP_ALIGN, HEAP_ALIGN).unwrap_or_else(|_| Layout::new::<Header>())
}

fn with_heap<R>(f: impl FnOnce(&Heap) -> R) -> R {
    HEAP.with(f)
}

/// Key of an object in the side table: its address with the alignment bits
/// stripped.
fn table_key(ptr: NonNull<Header>) -> usize {
    ptr.as_ptr() as usize >> HEAP_ALIGN.trailing_zeros()
}

fn layout_for(size: usize) -> Layout {
    let total = std::mem::size_of::<Header>() + size;
    match Layout::from_size_align(total, HEAP_ALIGN) {
        Ok(layout) => layout.pad_to_align(),
        Err(_) => panic!("object of {} bytes is too large", size),
    }
}

/// Allocate an object of `kind` with a body of `size` bytes.
///
/// The new object has a strong count of 1, a weak count of 0, and a
/// zero-filled body. Running out of memory is fatal.
pub(crate) fn allocate(size: usize, kind: Kind) -> NonNull<Header> {
    let layout = layout_for(size);
    with_heap(|heap| unsafe {
        let raw = mi_heap_malloc_aligned(heap.mi_heap, layout.size(), HEAP_ALIGN);
        let ptr = match NonNull::new(raw as *mut Header) {
            Some(ptr) => ptr,
            None => std::alloc::handle_alloc_error(layout),
        };
        assert_eq!(
            ptr.as_ptr() as usize % HEAP_ALIGN,
            0,
            "allocator returned a misaligned object"
        );

        ptr.as_ptr().write(Header::new(kind));
        Header::body(ptr).write_bytes(0, layout.size() - std::mem::size_of::<Header>());

        let initial = Counts { strong: 1, weak: 0 };
        match heap.mode.get() {
            RcMode::Inline => ptr.as_ref().set_inline_counts(initial),
            RcMode::Table => {
                heap.table.borrow_mut().insert(table_key(ptr), initial);
            }
        }

        heap.allocs[kind as usize].set(heap.allocs[kind as usize].get() + 1);
        heap.live.set(heap.live.get() + 1);
        tracing::trace!(target: "knot_vm::rc", addr = ?ptr, ?kind, size, "alloc");
        ptr
    })
}

/// Release the storage of a torn-down object.
///
/// # Safety
///
/// `ptr` must come from [`allocate`] and have no remaining references.
pub(crate) unsafe fn deallocate(ptr: NonNull<Header>) {
    with_heap(|heap| {
        if heap.mode.get() == RcMode::Table {
            heap.table.borrow_mut().remove(&table_key(ptr));
        }
        heap.live.set(heap.live.get() - 1);
    });
    tracing::trace!(target: "knot_vm::rc", addr = ?ptr, "free");
    mi_free(ptr.as_ptr() as *mut _);
}

/// Resize the body of an object from `old_size` to `new_size` bytes. Newly
/// added bytes are zero-filled. The object may move.
///
/// # Safety
///
/// `ptr` must be live, uniquely owned, and have a body of `old_size` bytes.
pub(crate) unsafe fn reallocate(ptr: NonNull<Header>, old_size: usize, new_size: usize) -> NonNull<Header> {
    let old_layout = layout_for(old_size);
    let layout = layout_for(new_size);
    with_heap(|heap| {
        let raw = mi_heap_realloc_aligned(heap.mi_heap, ptr.as_ptr() as *mut _, layout.size(), HEAP_ALIGN);
        let new_ptr = match NonNull::new(raw as *mut Header) {
            Some(new_ptr) => new_ptr,
            None => std::alloc::handle_alloc_error(layout),
        };
        assert_eq!(new_ptr.as_ptr() as usize % HEAP_ALIGN, 0, "allocator returned a misaligned object");

        if layout.size() > old_layout.size() {
            (new_ptr.as_ptr() as *mut u8)
                .add(old_layout.size())
                .write_bytes(0, layout.size() - old_layout.size());
        }
        if new_ptr != ptr && heap.mode.get() == RcMode::Table {
            let mut table = heap.table.borrow_mut();
            if let Some(counts) = table.remove(&table_key(ptr)) {
                table.insert(table_key(new_ptr), counts);
            }
        }
        tracing::trace!(target: "knot_vm::rc", from = ?ptr, to = ?new_ptr, new_size, "realloc");
        new_ptr
    })
}

/// Read-modify-write the counts of `ptr` under the current strategy.
///
/// # Safety
///
/// `ptr` must point to an allocated object.
pub(crate) unsafe fn update_counts<R>(ptr: NonNull<Header>, f: impl FnOnce(&mut Counts) -> R) -> R {
    with_heap(|heap| match heap.mode.get() {
        RcMode::Inline => {
            let header = ptr.as_ref();
            let mut counts = header.inline_counts();
            let res = f(&mut counts);
            header.set_inline_counts(counts);
            res
        }
        RcMode::Table => {
            let mut table = heap.table.borrow_mut();
            let counts = table
                .get_mut(&table_key(ptr))
                .expect("object missing from the reference count table");
            f(counts)
        }
    })
}

pub(crate) fn report_pin(ptr: NonNull<Header>, which: &'static str) {
    with_heap(|heap| heap.pins.set(heap.pins.get() + 1));
    tracing::warn!(target: "knot_vm::rc", addr = ?ptr, "object {} count pinned", which);
}

pub(crate) fn record_teardown(kind: Kind) {
    with_heap(|heap| heap.frees[kind as usize].set(heap.frees[kind as usize].get() + 1));
}

/// The strategy currently in use on this thread.
pub fn rc_mode() -> RcMode {
    with_heap(|heap| heap.mode.get())
}

/// Switch the reference count strategy of this thread. Only possible while no
/// heap object is alive.
pub fn set_rc_mode(mode: RcMode) -> Result<(), HeapError> {
    with_heap(|heap| {
        let live = heap.live.get();
        if live != 0 {
            return Err(HeapError::LiveObjects(live));
        }
        heap.table.borrow_mut().clear();
        heap.mode.set(mode);
        tracing::debug!(target: "knot_vm::rc", ?mode, "reference count strategy set");
        Ok(())
    })
}

/// A snapshot of this thread's allocation counters.
pub fn stats() -> AllocStats {
    with_heap(|heap| {
        let mut stats = AllocStats {
            allocs: [0; KIND_COUNT],
            frees: [0; KIND_COUNT],
            live: heap.live.get(),
            pins: heap.pins.get(),
        };
        for i in 0..KIND_COUNT {
            stats.allocs[i] = heap.allocs[i].get();
            stats.frees[i] = heap.frees[i].get();
        }
        stats
    })
}

/// Cumulative allocation counters, per object kind.
///
/// `frees` counts objects that were torn down; `live` counts objects whose
/// storage has not been returned yet (torn-down objects still referenced
/// weakly are included).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocStats {
    pub allocs: [u64; KIND_COUNT],
    pub frees: [u64; KIND_COUNT],
    pub live: usize,
    pub pins: u64,
}

impl AllocStats {
    pub fn allocated(&self, kind: Kind) -> u64 {
        self.allocs[kind as usize]
    }

    pub fn freed(&self, kind: Kind) -> u64 {
        self.frees[kind as usize]
    }

    /// Kinds whose allocation and teardown counts differ, with the difference.
    pub fn leaks(&self) -> impl Iterator<Item = (Kind, i64)> + '_ {
        Kind::variants().into_iter().filter_map(move |kind| {
            let diff = self.allocated(kind) as i64 - self.freed(kind) as i64;
            (diff != 0).then(|| (kind, diff))
        })
    }

    /// Counters accumulated since `earlier`.
    pub fn since(&self, earlier: &AllocStats) -> AllocStats {
        let mut diff = self.clone();
        for i in 0..KIND_COUNT {
            diff.allocs[i] -= earlier.allocs[i];
            diff.frees[i] -= earlier.frees[i];
        }
        diff.pins -= earlier.pins;
        diff
    }
}

impl fmt::Display for AllocStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "allocation report:")?;
        for kind in Kind::variants() {
            let (allocated, freed) = (self.allocated(kind), self.freed(kind));
            if allocated == 0 && freed == 0 {
                continue;
            }
            write!(f, "  {:<10} {:>8} allocated {:>8} freed", kind.name(), allocated, freed)?;
            if allocated != freed {
                write!(f, "  LEAK {:+}", allocated as i64 - freed as i64)?;
            }
            writeln!(f)?;
        }
        if self.pins > 0 {
            writeln!(f, "  {} pinned counts", self.pins)?;
        }
        write!(f, "  {} objects live", self.live)
    }
}
