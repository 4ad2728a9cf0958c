use crate::gc::{alloc, Header, Kind};

use super::Val;

/// A boxed numeric value. These are opaque to the evaluator: they evaluate to
/// themselves and print, nothing more.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Numeric {
    I32(i32),
    I64(i64),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
}

impl Numeric {
    fn kind(self) -> Kind {
        match self {
            Numeric::I32(_) => Kind::I32,
            Numeric::I64(_) => Kind::I64,
            Numeric::U32(_) => Kind::U32,
            Numeric::U64(_) => Kind::U64,
            Numeric::F32(_) => Kind::F32,
            Numeric::F64(_) => Kind::F64,
        }
    }

    fn to_bits(self) -> u64 {
        match self {
            Numeric::I32(v) => v as u32 as u64,
            Numeric::I64(v) => v as u64,
            Numeric::U32(v) => v as u64,
            Numeric::U64(v) => v,
            Numeric::F32(v) => v.to_bits() as u64,
            Numeric::F64(v) => v.to_bits(),
        }
    }

    fn from_bits(kind: Kind, bits: u64) -> Option<Numeric> {
        Some(match kind {
            Kind::I32 => Numeric::I32(bits as u32 as i32),
            Kind::I64 => Numeric::I64(bits as i64),
            Kind::U32 => Numeric::U32(bits as u32),
            Kind::U64 => Numeric::U64(bits),
            Kind::F32 => Numeric::F32(f32::from_bits(bits as u32)),
            Kind::F64 => Numeric::F64(f64::from_bits(bits)),
            _ => return None,
        })
    }
}

impl std::fmt::Display for Numeric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Numeric::I32(v) => write!(f, "{}", v),
            Numeric::I64(v) => write!(f, "{}", v),
            Numeric::U32(v) => write!(f, "{}", v),
            Numeric::U64(v) => write!(f, "{}", v),
            Numeric::F32(v) => write!(f, "{}", v),
            Numeric::F64(v) => write!(f, "{}", v),
        }
    }
}

impl Val {
    pub fn numeric(n: Numeric) -> Val {
        let ptr = alloc::allocate(std::mem::size_of::<u64>(), n.kind());
        unsafe {
            ptr.as_ref().set_len(std::mem::size_of::<u64>());
            (Header::body(ptr) as *mut u64).write(n.to_bits());
            Val::from_header(ptr)
        }
    }

    pub fn as_numeric(&self) -> Option<Numeric> {
        let ptr = self.header_ptr()?;
        let kind = self.kind()?;
        let bits = match kind {
            Kind::I32 | Kind::I64 | Kind::U32 | Kind::U64 | Kind::F32 | Kind::F64 => unsafe {
                (Header::body(ptr) as *const u64).read()
            },
            _ => return None,
        };
        Numeric::from_bits(kind, bits)
    }
}
