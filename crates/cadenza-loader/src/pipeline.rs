use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use cadenza_abr::SelectionInput;
use cadenza_alloc::Allocator;
use cadenza_chunk::{Format, LoadEventInfo, LoadTaskId, LoadTaskIds, MediaChunk, MediaLoadData};
use cadenza_events::MediaEventDispatcher;
use cadenza_policy::{FallbackType, LoadError, LoadErrorHandlingPolicy, LoadErrorInfo};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{
    control::LoadControl,
    error::{LoaderError, LoaderResult},
    fetcher::ChunkFetcher,
    loader::{Loader, LoaderMessage},
    queue::ChunkQueue,
    source::{ChunkSource, NextChunk},
};

/// Control context of one stream.
///
/// Owns the chunk source, the loader and the buffered queue. Nothing here is
/// shared with load workers: their results arrive as messages and are applied
/// by [`handle_message`](Self::handle_message).
pub struct ChunkPipeline {
    source: Box<dyn ChunkSource>,
    loader: Loader,
    queue: ChunkQueue,
    allocator: Arc<dyn Allocator>,
    policy: Arc<dyn LoadErrorHandlingPolicy>,
    control: Box<dyn LoadControl>,
    dispatcher: MediaEventDispatcher,
    playback_speed: f32,
    end_of_stream: bool,
    selected: Option<Arc<Format>>,
    downstream: Option<Arc<Format>>,
}

impl ChunkPipeline {
    pub fn new(
        source: Box<dyn ChunkSource>,
        fetcher: Arc<ChunkFetcher>,
        policy: Arc<dyn LoadErrorHandlingPolicy>,
        control: Box<dyn LoadControl>,
        dispatcher: MediaEventDispatcher,
        shutdown: CancellationToken,
    ) -> Self {
        let allocator = Arc::clone(fetcher.allocator());
        Self {
            source,
            loader: Loader::new(fetcher, shutdown),
            queue: ChunkQueue::new(Arc::clone(&allocator)),
            allocator,
            policy,
            control,
            dispatcher,
            playback_speed: 1.0,
            end_of_stream: false,
            selected: None,
            downstream: None,
        }
    }

    /// Number load tasks from `ids`. Pipelines sharing a load-error policy
    /// must share their ids source.
    #[must_use]
    pub fn with_task_ids(mut self, ids: LoadTaskIds) -> Self {
        self.loader.set_task_ids(ids);
        self
    }

    /// Start the next load if the load control wants more data. Returns
    /// whether a load was started.
    ///
    /// # Errors
    ///
    /// The latched [`LoaderError::Fatal`], or source and selection errors.
    pub fn continue_loading(
        &mut self,
        playback_position: Duration,
        now: Instant,
    ) -> LoaderResult<bool> {
        self.loader.maybe_throw_error()?;
        if self.loader.is_loading() || self.end_of_stream || self.loader.is_shut_down() {
            return Ok(false);
        }
        let buffered = self.queue.buffered_duration(playback_position);
        let allocated = self.allocator.total_bytes_allocated();
        if !self
            .control
            .should_continue_loading(buffered, self.playback_speed, allocated)
        {
            return Ok(false);
        }

        let input = SelectionInput {
            playback_position,
            buffered_duration: buffered,
            available_duration: self.source.available_duration(playback_position),
            now,
        };
        let next = self.source.next_chunk(&input, self.queue.chunks())?;
        self.note_selection();

        match next {
            NextChunk::Load(descriptor) => {
                self.loader.start(*descriptor)?;
                Ok(true)
            }
            NextChunk::EndOfStream => {
                debug!(track = self.source.track_id(), "all chunks queued");
                self.end_of_stream = true;
                Ok(false)
            }
            NextChunk::Unavailable => Ok(false),
        }
    }

    /// Let the selection discard queued chunks it wants re-fetched. Only acts
    /// while nothing loads. Returns how many chunks were discarded.
    ///
    /// # Errors
    ///
    /// Selection and allocator errors.
    pub fn reevaluate_buffer(
        &mut self,
        playback_position: Duration,
        now: Instant,
    ) -> LoaderResult<usize> {
        if self.loader.is_loading() || self.queue.is_empty() {
            return Ok(0);
        }
        let retain = self
            .source
            .preferred_queue_size(playback_position, self.queue.chunks(), now)?;
        let discarded = self.queue.discard_upstream(retain)?;
        if discarded.is_empty() {
            return Ok(0);
        }
        debug!(
            retain,
            discarded = discarded.len(),
            from = ?discarded.first().map(|d| d.start),
            "upstream chunks discarded"
        );
        self.source.on_queue_discarded(&discarded);
        for descriptor in &discarded {
            self.dispatcher
                .upstream_discarded(MediaLoadData::from(descriptor));
        }
        self.end_of_stream = false;
        Ok(discarded.len())
    }

    /// Cancel the current load if the source asks for it.
    ///
    /// # Errors
    ///
    /// Selection errors.
    pub fn maybe_cancel_load(&mut self, playback_position: Duration) -> LoaderResult<bool> {
        let Some(loading) = self.loader.current() else {
            return Ok(false);
        };
        if !self
            .source
            .should_cancel_load(playback_position, loading, self.queue.chunks())?
        {
            return Ok(false);
        }
        Ok(self.loader.cancel())
    }

    /// Apply one worker message.
    ///
    /// # Errors
    ///
    /// [`LoaderError::Fatal`] when a failed task cannot be retried or
    /// recovered by a fallback, and queue errors.
    pub fn handle_message(&mut self, message: LoaderMessage, now: Instant) -> LoaderResult<()> {
        match message {
            LoaderMessage::Started { info, media, .. } => {
                self.dispatcher.load_started(info, media);
                Ok(())
            }
            LoaderMessage::Completed {
                task_id,
                chunk,
                info,
                media,
                ..
            } => {
                if self.loader.finish(task_id).is_none() {
                    chunk.release(self.allocator.as_ref())?;
                    self.conclude_canceled(task_id, info, media);
                    return Ok(());
                }
                self.source.on_chunk_load_completed(chunk.descriptor());
                self.dispatcher.load_completed(info, media);
                self.policy.on_load_task_concluded(task_id);
                self.queue.push(chunk)
            }
            LoaderMessage::Cancelled {
                task_id,
                started,
                info,
                media,
                ..
            } => {
                self.loader.finish(task_id);
                if started {
                    self.dispatcher.load_canceled(info, media);
                }
                self.policy.on_load_task_concluded(task_id);
                Ok(())
            }
            LoaderMessage::Failed {
                task_id,
                error,
                info,
                media,
                ..
            } => self.on_load_error(task_id, error, info, media, now),
        }
    }

    fn conclude_canceled(
        &mut self,
        task_id: LoadTaskId,
        info: LoadEventInfo,
        media: MediaLoadData,
    ) {
        self.dispatcher.load_canceled(info, media);
        self.policy.on_load_task_concluded(task_id);
    }

    fn on_load_error(
        &mut self,
        task_id: LoadTaskId,
        error: LoadError,
        info: LoadEventInfo,
        media: MediaLoadData,
        now: Instant,
    ) -> LoaderResult<()> {
        if !self.loader.is_current(task_id) {
            self.conclude_canceled(task_id, info, media);
            return Ok(());
        }
        let error_count = self.loader.record_error()?;
        let descriptor = self
            .loader
            .current()
            .cloned()
            .ok_or(LoaderError::NoActiveLoad)?;
        let error_info =
            LoadErrorInfo::new(info.clone(), media.clone(), error.clone(), error_count);

        if let Some(applied) =
            self.source
                .on_chunk_load_error(&descriptor, &error_info, self.policy.as_ref(), now)?
        {
            match applied.fallback_type {
                FallbackType::Location => self
                    .dispatcher
                    .location_excluded(applied.excluded, applied.exclusion_duration),
                FallbackType::Track => self
                    .dispatcher
                    .track_excluded(applied.excluded, applied.exclusion_duration),
            }
            self.dispatcher
                .load_error(info, media, error, None, Some(applied.fallback_type), false);
            self.loader.finish(task_id);
            self.policy.on_load_task_concluded(task_id);
            return Ok(());
        }

        let retry_delay = self.policy.retry_delay_for(&error_info);
        let min_retries = self
            .policy
            .minimum_loadable_retry_count(descriptor.data_type);
        match retry_delay {
            Some(delay) if error_count <= min_retries => {
                debug!(
                    task = task_id.get(),
                    error_count,
                    min_retries,
                    ?delay,
                    "retrying load"
                );
                self.dispatcher
                    .load_error(info, media, error, Some(delay), None, false);
                self.loader.retry_after(delay)
            }
            _ => {
                warn!(
                    task = task_id.get(),
                    error_count,
                    error = %error,
                    url = %descriptor.data_spec.url,
                    "load failed"
                );
                self.dispatcher.load_error(info, media, error, None, None, true);
                self.loader.finish(task_id);
                self.policy.on_load_task_concluded(task_id);
                self.loader.set_fatal(error_info.clone());
                Err(LoaderError::Fatal(Box::new(error_info)))
            }
        }
    }

    /// Apply every message already delivered. Returns how many.
    ///
    /// # Errors
    ///
    /// See [`handle_message`](Self::handle_message).
    pub fn drain(&mut self, now: Instant) -> LoaderResult<usize> {
        let mut handled = 0;
        while let Some(message) = self.loader.try_next_message() {
            self.handle_message(message, now)?;
            handled += 1;
        }
        Ok(handled)
    }

    /// Wait for and apply the next message. Returns `false` when no worker is
    /// running.
    ///
    /// # Errors
    ///
    /// See [`handle_message`](Self::handle_message).
    pub async fn wait_for_message(&mut self) -> LoaderResult<bool> {
        match self.loader.next_message().await {
            Some(message) => {
                self.handle_message(message, Instant::now())?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Apply messages until every worker has finished.
    ///
    /// # Errors
    ///
    /// See [`handle_message`](Self::handle_message).
    pub async fn await_idle(&mut self) -> LoaderResult<()> {
        while self.wait_for_message().await? {}
        Ok(())
    }

    /// Load until the load control stops asking for data, the stream ends or
    /// a load fails for good.
    ///
    /// # Errors
    ///
    /// See [`continue_loading`](Self::continue_loading) and
    /// [`handle_message`](Self::handle_message).
    pub async fn fill_buffer(&mut self, playback_position: Duration) -> LoaderResult<()> {
        loop {
            self.continue_loading(playback_position, Instant::now())?;
            if !self.loader.has_pending() {
                return Ok(());
            }
            self.wait_for_message().await?;
        }
    }

    /// Hand the oldest queued chunk to the consumer, who becomes responsible
    /// for releasing it.
    pub fn take_next_chunk(&mut self) -> Option<MediaChunk> {
        let chunk = self.queue.pop_front()?;
        let changed = self
            .downstream
            .as_ref()
            .is_none_or(|f| !Arc::ptr_eq(f, chunk.format()));
        if changed {
            self.downstream = Some(Arc::clone(chunk.format()));
            self.dispatcher
                .downstream_format_changed(MediaLoadData::from(chunk.descriptor()));
        }
        Some(chunk)
    }

    /// Release queued chunks that end at or before `playback_position`.
    ///
    /// # Errors
    ///
    /// Allocator errors.
    pub fn discard_played(&mut self, playback_position: Duration) -> LoaderResult<usize> {
        self.queue.discard_played(playback_position)
    }

    /// Drop everything buffered and loading; loading resumes at the new
    /// position on the next [`continue_loading`](Self::continue_loading).
    ///
    /// # Errors
    ///
    /// Allocator errors.
    pub fn seek_to(&mut self, position: Duration) -> LoaderResult<()> {
        debug!(?position, "seek");
        self.loader.cancel();
        self.queue.clear()?;
        self.end_of_stream = false;
        self.downstream = None;
        self.control.reset();
        self.source.on_discontinuity();
        Ok(())
    }

    /// End of buffered media, or `playback_position` with nothing buffered.
    pub fn buffered_position(&self, playback_position: Duration) -> Duration {
        self.queue.buffered_end().unwrap_or(playback_position)
    }

    pub fn set_playback_speed(&mut self, speed: f32) {
        if speed > 0.0 {
            self.playback_speed = speed;
            self.source.on_playback_speed(speed);
        }
    }

    pub fn is_loading(&self) -> bool {
        self.loader.is_loading()
    }

    /// Every chunk up to the end of the content has been loaded.
    pub fn is_loading_finished(&self) -> bool {
        self.end_of_stream && !self.loader.is_loading()
    }

    /// Loading finished and every chunk was consumed.
    pub fn is_ended(&self) -> bool {
        self.is_loading_finished() && self.queue.is_empty()
    }

    pub fn queue(&self) -> &ChunkQueue {
        &self.queue
    }

    pub fn source(&self) -> &dyn ChunkSource {
        self.source.as_ref()
    }

    pub fn dispatcher(&self) -> &MediaEventDispatcher {
        &self.dispatcher
    }

    /// # Errors
    ///
    /// The latched [`LoaderError::Fatal`], if any.
    pub fn maybe_throw_error(&self) -> LoaderResult<()> {
        self.loader.maybe_throw_error()
    }

    /// Cancel loading and return every queued chunk to the pool.
    ///
    /// # Errors
    ///
    /// Allocator errors.
    pub fn release(mut self) -> LoaderResult<()> {
        self.loader.cancel();
        self.queue.clear()?;
        self.source.release();
        Ok(())
    }

    fn note_selection(&mut self) {
        let format = self.source.selected_format();
        if self
            .selected
            .as_ref()
            .is_some_and(|f| Arc::ptr_eq(f, &format))
        {
            return;
        }
        let from = self.selected.replace(Arc::clone(&format)).map(|f| f.id.clone());
        self.dispatcher
            .track_selected(from, format.id.clone(), self.source.selection_reason());
    }
}
