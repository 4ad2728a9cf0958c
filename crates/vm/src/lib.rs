pub mod env;
pub mod error;
pub mod file;
pub mod gc;
pub mod host;
pub mod print;
pub mod sym;
pub mod value;
pub mod vm;

pub use error::{DataError, ErrorKind, EvalError};
pub use gc::{alloc::rc_mode, alloc::set_rc_mode, alloc::stats, AllocStats, HeapError, Kind, RcMode, WeakVal};
pub use print::Repr;
pub use sym::{Special, Sym, SymbolTable};
pub use value::Val;
pub use vm::Runtime;
