//! Adaptive track selection.
//!
//! A [`TrackSelection`] picks which track of a group the next chunk is loaded
//! from. [`AdaptiveTrackSelection`] follows the bandwidth estimate with
//! buffer-based hysteresis and can ask for buffered chunks to be discarded
//! and re-fetched; [`FixedTrackSelection`] pins one track.

#![forbid(unsafe_code)]

mod adaptive;
mod base;
mod definition;
mod error;
mod fixed;
mod options;
mod selection;

pub use crate::{
    adaptive::AdaptiveTrackSelection,
    base::BaseTrackSelection,
    definition::{
        AdaptiveTrackSelectionFactory, FixedTrackSelectionFactory, SelectionType,
        TrackSelectionDefinition, TrackSelectionFactory,
    },
    error::{AbrError, AbrResult},
    fixed::FixedTrackSelection,
    options::AbrOptions,
    selection::{SelectionInput, TrackSelection},
};
