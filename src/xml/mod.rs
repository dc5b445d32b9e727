//! Device configuration documents: parsing, inactive-subtree lookup and
//! canonical path reconstruction.

pub mod doc;
pub mod inactive;
pub mod path;

pub use doc::{ParseError, parse_document};
pub use inactive::find_inactive;
