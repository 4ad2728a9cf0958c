//! The `knot` driver: running sources and reporting failures.

pub mod diag;
pub mod session;

pub use diag::Diagnostic;
pub use session::{Failure, Session};
