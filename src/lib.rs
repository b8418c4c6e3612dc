//! `localtagfs`: a media-library source adapter. Translates a generic
//! media-framework browse/metadata ABI into SPARQL queries against a
//! semantic triple-store indexer, the way the teacher's `mpd_protocol`
//! translated a line-based client protocol into calls against `System`.
//!
//! The indexer connection, thumbnail/album-art prober and playlist parser
//! are all collaborators this crate only sees through the traits in
//! [`collaborators`] — see [`source::TrackerSource`] for the façade that
//! wires them together.

pub mod browse;
pub mod cache;
pub mod collaborators;
pub mod error;
pub mod filter;
pub mod metadata;
pub mod objectid;
pub mod planner;
pub mod registry;
pub mod signals;
pub mod source;
pub mod sparql;
pub mod util;

pub use error::{Result, SourceError};
pub use objectid::ObjectId;
pub use source::TrackerSource;

/// Install the `tracing` subscriber hosts should run this crate under,
/// honoring `RUST_LOG` the way the teacher's `cli.rs` does.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .try_init();
}
