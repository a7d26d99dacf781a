//! Media data model and chunk iteration.
//!
//! A [`TrackManifest`] pairs a [`TrackGroup`] of alternative [`Format`]s with
//! one [`SegmentTimeline`] per format and a list of [`BaseLocation`]s the
//! segments can be fetched from. [`ChunkIterator`]s walk the upcoming chunks
//! of one track; track selection reads them to price each candidate.

#![forbid(unsafe_code)]

mod chunk;
mod error;
mod extractor;
mod format;
mod group;
mod iterator;
mod load;
mod manifest;
mod timeline;

pub use crate::{
    chunk::{ChunkDescriptor, MediaChunk},
    error::{ChunkError, ChunkResult, ExtractorError},
    extractor::{ChunkExtractor, ChunkIndex, ExtractorFactory, TrackOutput, TrackOutputProvider},
    format::{DataType, Format, SelectionReason, TrackType},
    group::TrackGroup,
    iterator::{ChunkIterator, ChunkListIterator, EmptyChunkIterator, SegmentChunkIterator},
    load::{LoadEventInfo, LoadTaskId, LoadTaskIds, MediaLoadData},
    manifest::{BaseLocation, TrackManifest},
    timeline::{Segment, SegmentTimeline},
};
