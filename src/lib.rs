#![forbid(unsafe_code)]

//! `tree-sanitize` filters untrusted HTML syntax trees against an
//! explicit allow-list schema.
//!
//! - `node`: the tree data model plus a lenient JSON ingestion boundary
//! - `schema`: the allow-list policy, with GitHub-style defaults
//! - `sanitize`: the sanitizer itself (traversal, tag/attribute policy,
//!   URL protocol checks, clobber renaming)

mod error;
mod rules;

pub mod node;
pub mod sanitize;
pub mod schema;

pub use error::{Error, Result};
pub use node::Node;
pub use sanitize::{Sanitizer, sanitize, sanitize_with};
pub use schema::Schema;
