#![forbid(unsafe_code)]

//! # Cadenza
//!
//! Facade crate for the adaptive streaming client core.
//!
//! ## Quick start
//!
//! ```ignore
//! use cadenza::prelude::*;
//!
//! let session = PlaybackSession::new(SessionConfig::default())?;
//! let mut events = session.subscribe();
//! let mut pipeline = session.create_pipeline(manifest, 0)?;
//!
//! pipeline.fill_buffer(Duration::ZERO).await?;
//! while let Some(chunk) = pipeline.take_next_chunk() {
//!     // hand the chunk to the renderer, then release it
//!     chunk.release(session.allocator().as_ref())?;
//! }
//! ```

// ── Re-export sub-crates ────────────────────────────────────────────────

pub mod abr {
    pub use cadenza_abr::*;
}

pub mod alloc {
    pub use cadenza_alloc::*;
}

pub mod bandwidth {
    pub use cadenza_bandwidth::*;
}

pub mod chunk {
    pub use cadenza_chunk::*;
}

pub mod events {
    pub use cadenza_events::*;
}

pub mod loader {
    pub use cadenza_loader::*;
}

pub mod net {
    pub use cadenza_net::*;
}

pub mod policy {
    pub use cadenza_policy::*;
}

// ── Session ─────────────────────────────────────────────────────────────

mod config;
mod error;
mod session;

pub use config::SessionConfig;
pub use error::{SessionError, SessionResult};
pub use session::PlaybackSession;

// ── Prelude ─────────────────────────────────────────────────────────────

pub mod prelude {
    pub use cadenza_abr::{AbrOptions, TrackSelection};
    pub use cadenza_alloc::{Allocator, AllocatorOptions};
    pub use cadenza_bandwidth::{BandwidthMeter, BandwidthOptions};
    pub use cadenza_chunk::{BaseLocation, MediaChunk, SegmentTimeline, TrackGroup, TrackManifest};
    pub use cadenza_events::{Event, EventBus};
    pub use cadenza_loader::{ChunkPipeline, LoadControlOptions, LoaderError};
    pub use cadenza_net::{Net, NetOptions};
    pub use cadenza_policy::LoadErrorOptions;

    pub use crate::{PlaybackSession, SessionConfig, SessionError};
}
