//! Graphs of building blocks.
//!
//! A [`DGraph`] is a spanning tree of [`Vertex`] nodes connected through
//! attachment points, plus ring-closing chords and sets of symmetric vertices.
//! Template vertices embed whole graphs. The crate covers construction, edits
//! such as subgraph replacement, queries, isomorphism checks and the two
//! serialization formats.

mod error;
pub use error::*;

mod ids;
pub use ids::*;

mod intern;
pub use intern::*;

pub mod graph;
pub use graph::*;

mod canon;
pub use canon::*;

mod parse;
pub use parse::*;

pub mod library;

mod random;
pub use random::*;

mod visualize;

use tracing_subscriber::filter::LevelFilter;

/// Install a formatting subscriber printing events up to `level`
/// ("error", "warn", "info", "debug" or "trace"). Unknown levels fall back to
/// "info". Calling it again once a subscriber is set has no effect.
pub fn init_logging(level: &str) {
    let filter = level.parse::<LevelFilter>().unwrap_or(LevelFilter::INFO);
    let _ = tracing_subscriber::fmt()
        .with_max_level(filter)
        .with_target(false)
        .try_init();
}
