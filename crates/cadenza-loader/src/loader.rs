use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use cadenza_chunk::{
    ChunkDescriptor, LoadEventInfo, LoadTaskId, LoadTaskIds, MediaChunk, MediaLoadData,
};
use cadenza_policy::{LoadError, LoadErrorInfo};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::{
    error::{LoaderError, LoaderResult},
    fetcher::{ChunkFetcher, FetchError},
};

/// Report from a load worker to the control context.
///
/// Every attempt sends exactly one terminal message. An attempt that was not
/// cancelled during its retry delay sends `Started` first, before its
/// transfer is opened.
#[derive(Debug)]
pub enum LoaderMessage {
    Started {
        task_id: LoadTaskId,
        attempt: u32,
        info: LoadEventInfo,
        media: MediaLoadData,
    },
    Completed {
        task_id: LoadTaskId,
        attempt: u32,
        chunk: MediaChunk,
        info: LoadEventInfo,
        media: MediaLoadData,
    },
    Cancelled {
        task_id: LoadTaskId,
        attempt: u32,
        /// Whether `Started` was sent for this attempt.
        started: bool,
        info: LoadEventInfo,
        media: MediaLoadData,
    },
    Failed {
        task_id: LoadTaskId,
        attempt: u32,
        error: LoadError,
        info: LoadEventInfo,
        media: MediaLoadData,
    },
}

impl LoaderMessage {
    pub fn task_id(&self) -> LoadTaskId {
        match self {
            Self::Started { task_id, .. }
            | Self::Completed { task_id, .. }
            | Self::Cancelled { task_id, .. }
            | Self::Failed { task_id, .. } => *task_id,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Started { .. })
    }
}

struct ActiveLoad {
    task_id: LoadTaskId,
    descriptor: ChunkDescriptor,
    token: CancellationToken,
    attempt: u32,
    error_count: u32,
}

/// Runs at most one load task at a time on background workers.
///
/// A task is one chunk; it may take several attempts. Workers report
/// through [`LoaderMessage`]s which the owner drains with
/// [`next_message`](Self::next_message) or
/// [`try_next_message`](Self::try_next_message).
pub struct Loader {
    fetcher: Arc<ChunkFetcher>,
    tx: mpsc::UnboundedSender<LoaderMessage>,
    rx: mpsc::UnboundedReceiver<LoaderMessage>,
    active: Option<ActiveLoad>,
    task_ids: LoadTaskIds,
    in_flight: usize,
    fatal: Option<Box<LoadErrorInfo>>,
    shutdown: CancellationToken,
}

impl Loader {
    /// Workers stop when `shutdown` is cancelled.
    pub fn new(fetcher: Arc<ChunkFetcher>, shutdown: CancellationToken) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            fetcher,
            tx,
            rx,
            active: None,
            task_ids: LoadTaskIds::new(),
            in_flight: 0,
            fatal: None,
            shutdown,
        }
    }

    /// Draw task ids from `ids`. Loaders that report to one load-error
    /// policy must share their ids source.
    pub fn set_task_ids(&mut self, ids: LoadTaskIds) {
        self.task_ids = ids;
    }

    pub fn fetcher(&self) -> &Arc<ChunkFetcher> {
        &self.fetcher
    }

    /// Start loading `descriptor` as a new task.
    ///
    /// # Errors
    ///
    /// [`LoaderError::Busy`] while another task is active and the latched
    /// [`LoaderError::Fatal`] once a task has failed for good.
    pub fn start(&mut self, descriptor: ChunkDescriptor) -> LoaderResult<LoadTaskId> {
        self.maybe_throw_error()?;
        if self.active.is_some() {
            return Err(LoaderError::Busy);
        }
        let task_id = self.task_ids.next_id();
        let token = self.shutdown.child_token();
        debug!(
            task = task_id.get(),
            chunk = descriptor.chunk_index,
            format = %descriptor.format.id,
            "load task started"
        );
        self.spawn_attempt(&descriptor, task_id, 1, None, token.clone());
        self.active = Some(ActiveLoad {
            task_id,
            descriptor,
            token,
            attempt: 1,
            error_count: 0,
        });
        Ok(task_id)
    }

    /// Re-issue the active task after `delay`, without blocking the caller.
    ///
    /// # Errors
    ///
    /// [`LoaderError::NoActiveLoad`] without an active task.
    pub fn retry_after(&mut self, delay: Duration) -> LoaderResult<()> {
        let active = self.active.as_mut().ok_or(LoaderError::NoActiveLoad)?;
        active.attempt += 1;
        let (task_id, attempt, token) = (active.task_id, active.attempt, active.token.clone());
        let descriptor = active.descriptor.clone();
        debug!(task = task_id.get(), attempt, ?delay, "load retry scheduled");
        self.spawn_attempt(&descriptor, task_id, attempt, Some(delay), token);
        Ok(())
    }

    /// Count a failure of the active task. Returns the task's failures so far.
    ///
    /// # Errors
    ///
    /// [`LoaderError::NoActiveLoad`] without an active task.
    pub fn record_error(&mut self) -> LoaderResult<u32> {
        let active = self.active.as_mut().ok_or(LoaderError::NoActiveLoad)?;
        active.error_count += 1;
        Ok(active.error_count)
    }

    /// Forget the active task if it is `task_id`.
    pub fn finish(&mut self, task_id: LoadTaskId) -> Option<ChunkDescriptor> {
        if !self.is_current(task_id) {
            return None;
        }
        self.active.take().map(|active| active.descriptor)
    }

    /// Cancel the active task. Returns whether there was one; calling again
    /// is a no-op.
    pub fn cancel(&mut self) -> bool {
        let Some(active) = self.active.take() else {
            return false;
        };
        debug!(task = active.task_id.get(), "load task cancelled");
        active.token.cancel();
        true
    }

    pub fn is_loading(&self) -> bool {
        self.active.is_some()
    }

    pub fn current(&self) -> Option<&ChunkDescriptor> {
        self.active.as_ref().map(|a| &a.descriptor)
    }

    pub fn current_task(&self) -> Option<LoadTaskId> {
        self.active.as_ref().map(|a| a.task_id)
    }

    pub fn is_current(&self, task_id: LoadTaskId) -> bool {
        self.current_task() == Some(task_id)
    }

    /// Whether some worker still owes a terminal message.
    pub fn has_pending(&self) -> bool {
        self.in_flight > 0
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Wait for the next worker message. `None` once no worker is running.
    pub async fn next_message(&mut self) -> Option<LoaderMessage> {
        if self.in_flight == 0 {
            return None;
        }
        let message = self.rx.recv().await?;
        self.account(&message);
        Some(message)
    }

    pub fn try_next_message(&mut self) -> Option<LoaderMessage> {
        let message = self.rx.try_recv().ok()?;
        self.account(&message);
        Some(message)
    }

    /// Latch a fatal failure. Later [`start`](Self::start) and
    /// [`maybe_throw_error`](Self::maybe_throw_error) calls report it.
    pub fn set_fatal(&mut self, info: LoadErrorInfo) {
        self.fatal = Some(Box::new(info));
    }

    /// # Errors
    ///
    /// The latched [`LoaderError::Fatal`], if any.
    pub fn maybe_throw_error(&self) -> LoaderResult<()> {
        match &self.fatal {
            Some(info) => Err(LoaderError::Fatal(info.clone())),
            None => Ok(()),
        }
    }

    fn account(&mut self, message: &LoaderMessage) {
        if message.is_terminal() {
            self.in_flight = self.in_flight.saturating_sub(1);
        }
    }

    fn spawn_attempt(
        &mut self,
        descriptor: &ChunkDescriptor,
        task_id: LoadTaskId,
        attempt: u32,
        delay: Option<Duration>,
        token: CancellationToken,
    ) {
        self.in_flight += 1;
        let worker = Attempt {
            fetcher: Arc::clone(&self.fetcher),
            descriptor: descriptor.clone(),
            task_id,
            attempt,
            token,
            tx: self.tx.clone(),
        };
        tokio::spawn(worker.run(delay));
    }
}

impl Drop for Loader {
    fn drop(&mut self) {
        self.cancel();
    }
}

struct Attempt {
    fetcher: Arc<ChunkFetcher>,
    descriptor: ChunkDescriptor,
    task_id: LoadTaskId,
    attempt: u32,
    token: CancellationToken,
    tx: mpsc::UnboundedSender<LoaderMessage>,
}

impl Attempt {
    async fn run(self, delay: Option<Duration>) {
        let media = MediaLoadData::from(&self.descriptor);
        if let Some(delay) = delay.filter(|d| !d.is_zero()) {
            tokio::select! {
                biased;
                () = self.token.cancelled() => {}
                () = tokio::time::sleep(delay) => {}
            }
        }
        if self.token.is_cancelled() {
            let info =
                LoadEventInfo::new(self.task_id, self.descriptor.data_spec.clone(), Instant::now());
            self.send(LoaderMessage::Cancelled {
                task_id: self.task_id,
                attempt: self.attempt,
                started: false,
                info,
                media,
            });
            return;
        }

        let started_at = Instant::now();
        let info = LoadEventInfo::new(self.task_id, self.descriptor.data_spec.clone(), started_at);
        self.send(LoaderMessage::Started {
            task_id: self.task_id,
            attempt: self.attempt,
            info: info.clone(),
            media: media.clone(),
        });

        let result = self.fetcher.fetch(&self.descriptor, &self.token).await;
        let elapsed = started_at.elapsed();
        let (task_id, attempt) = (self.task_id, self.attempt);
        let message = match result {
            Ok(chunk) if self.token.is_cancelled() => {
                let bytes_loaded = chunk.bytes_loaded();
                if let Err(error) = chunk.release(self.fetcher.allocator().as_ref()) {
                    warn!(%error, task = task_id.get(), "failed to release cancelled chunk");
                }
                LoaderMessage::Cancelled {
                    task_id,
                    attempt,
                    started: true,
                    info: info.with_progress(elapsed, bytes_loaded),
                    media,
                }
            }
            Ok(chunk) => LoaderMessage::Completed {
                task_id,
                attempt,
                info: info.with_progress(elapsed, chunk.bytes_loaded()),
                chunk,
                media,
            },
            Err(FetchError::Cancelled { bytes_loaded }) => LoaderMessage::Cancelled {
                task_id,
                attempt,
                started: true,
                info: info.with_progress(elapsed, bytes_loaded),
                media,
            },
            Err(FetchError::Failed { error, bytes_loaded }) => LoaderMessage::Failed {
                task_id,
                attempt,
                error,
                info: info.with_progress(elapsed, bytes_loaded),
                media,
            },
        };
        self.send(message);
    }

    fn send(&self, message: LoaderMessage) {
        trace!(
            task = message.task_id().get(),
            attempt = self.attempt,
            terminal = message.is_terminal(),
            "load worker message"
        );
        // The owner may be gone; a dropped chunk still returns its blocks.
        let _ = self.tx.send(message);
    }
}
