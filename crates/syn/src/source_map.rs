use fnv::FnvHashMap;
use knot_vm::Val;
use rowan::TextRange;

/// Source locations of parsed heap forms, keyed by object address.
///
/// The map is only meaningful while the parsed code is alive: once a form is
/// freed its address may be reused.
#[derive(Debug, Default, Clone)]
pub struct SourceMap {
    spans: FnvHashMap<usize, TextRange>,
    /// Spans of the top-level forms, in order. Atoms have no address, so
    /// this is the only location they get.
    top_level: Vec<TextRange>,
}

impl SourceMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record where `val` came from. Values that are not heap references
    /// have no identity and are ignored.
    pub fn insert(&mut self, val: &Val, span: TextRange) {
        if let Some(addr) = val.addr() {
            self.spans.insert(addr, span);
        }
    }

    pub fn get(&self, val: &Val) -> Option<TextRange> {
        self.spans.get(&val.addr()?).copied()
    }

    pub fn push_top_level(&mut self, span: TextRange) {
        self.top_level.push(span);
    }

    /// The span of top-level form `index`.
    pub fn top_level(&self, index: usize) -> Option<TextRange> {
        self.top_level.get(index).copied()
    }

    pub fn len(&self) -> usize {
        self.spans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }
}
