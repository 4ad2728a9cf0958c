use std::ops::Deref;
use std::path::Path;

use crate::gc::{alloc, Header, Kind};

use super::{Tag, Val, DATA_WORD_CAP, TAG_WIDTH};

/// Bytes of a data value: copied out of a data word, or borrowed from a heap
/// byte string.
#[derive(Debug, Clone, Copy)]
pub enum DataBytes<'a> {
    Word([u8; DATA_WORD_CAP], u8),
    Heap(&'a [u8]),
}

impl Default for DataBytes<'_> {
    fn default() -> Self {
        DataBytes::Word([0; DATA_WORD_CAP], 0)
    }
}

impl Deref for DataBytes<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            DataBytes::Word(bytes, len) => &bytes[..*len as usize],
            DataBytes::Heap(bytes) => bytes,
        }
    }
}

impl Val {
    /// Copy `bytes` into a new data value. Short payloads are packed into the
    /// word itself; the empty payload is the blank value `''`.
    pub fn data(bytes: &[u8]) -> Val {
        if let Some(word) = Val::data_word(bytes) {
            return word;
        }
        let ptr = alloc::allocate(bytes.len(), Kind::Data);
        unsafe {
            ptr.as_ref().set_len(bytes.len());
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), Header::body(ptr), bytes.len());
            Val::from_header(ptr)
        }
    }

    pub fn data_str(s: &str) -> Val {
        Val::data(s.as_bytes())
    }

    /// Read a whole file into a data value.
    pub fn data_from_path(path: impl AsRef<Path>) -> std::io::Result<Val> {
        let bytes = std::fs::read(path)?;
        Ok(Val::data(&bytes))
    }

    /// Pack `bytes` into a data word if they fit.
    pub fn data_word(bytes: &[u8]) -> Option<Val> {
        if bytes.len() > DATA_WORD_CAP {
            return None;
        }
        let mut word = (bytes.len() << TAG_WIDTH) | Tag::DataWord as usize;
        for (i, b) in bytes.iter().enumerate() {
            word |= (*b as usize) << (8 * (i + 1));
        }
        Some(unsafe { Val::from_word(word) })
    }

    /// The blank data value `''`.
    pub fn blank() -> Val {
        unsafe { Val::from_word(Tag::DataWord as usize) }
    }

    /// Returns `true` if the val is the blank data value.
    pub fn is_blank(&self) -> bool {
        self.word() == Tag::DataWord as usize
    }

    /// Returns `true` if the val is a data word or a byte string.
    pub fn is_data(&self) -> bool {
        self.tag() == Tag::DataWord || self.is_kind(Kind::Data)
    }

    pub fn data_bytes(&self) -> Option<DataBytes<'_>> {
        if self.tag() == Tag::DataWord {
            let word = self.word();
            let len = ((word >> TAG_WIDTH) & ((1 << TAG_WIDTH) - 1)) as u8;
            let mut bytes = [0; DATA_WORD_CAP];
            for (i, b) in bytes.iter_mut().enumerate() {
                *b = (word >> (8 * (i + 1))) as u8;
            }
            Some(DataBytes::Word(bytes, len))
        } else if self.is_kind(Kind::Data) {
            let ptr = self.header_ptr()?;
            Some(DataBytes::Heap(unsafe { Header::bytes(ptr) }))
        } else {
            None
        }
    }
}
