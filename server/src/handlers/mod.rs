//! Request handlers for sync operations.

mod download;
mod upload;

pub use download::*;
pub use upload::*;
