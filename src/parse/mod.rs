//! Reading and writing graphs.
//!
//! Two formats are supported: the compact one-line text format used by older
//! graph databases, and JSON, which also carries the graphs nested in templates.

mod legacy;
pub use legacy::*;

mod json;
pub use json::*;
