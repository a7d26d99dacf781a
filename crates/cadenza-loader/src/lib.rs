//! Chunk loading orchestration.
//!
//! A [`ChunkPipeline`] is the control context of one stream. It asks its
//! [`ChunkSource`] for the next chunk, runs one load at a time through a
//! [`Loader`], consults the [`LoadErrorHandlingPolicy`] on failure and keeps
//! loaded chunks in a [`ChunkQueue`] until they are consumed or evicted.
//!
//! Load workers never touch pipeline state: they report through messages
//! that the pipeline drains ([`ChunkPipeline::drain`],
//! [`ChunkPipeline::wait_for_message`]).
//!
//! [`LoadErrorHandlingPolicy`]: cadenza_policy::LoadErrorHandlingPolicy

#![forbid(unsafe_code)]

mod control;
mod error;
mod exclusion;
mod fetcher;
mod loader;
mod pipeline;
mod queue;
mod source;

pub use crate::{
    control::{DefaultLoadControl, LoadControl, LoadControlOptions},
    error::{LoaderError, LoaderResult},
    exclusion::LocationExclusionList,
    fetcher::{ChunkFetcher, FetchError},
    loader::{Loader, LoaderMessage},
    pipeline::ChunkPipeline,
    queue::ChunkQueue,
    source::{AdaptiveChunkSource, AppliedFallback, ChunkSource, NextChunk},
};
