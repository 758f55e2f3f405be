//! Database module for PostgreSQL persistence.

mod pool;
mod records;
mod tokens;

pub use pool::*;
pub use records::*;
pub use tokens::*;
