//! Shared collaborators of one playback session.

use std::sync::Arc;

use cadenza_abr::{AdaptiveTrackSelectionFactory, TrackSelectionDefinition, TrackSelectionFactory};
use cadenza_alloc::{Allocator, DefaultAllocator};
use cadenza_bandwidth::{BandwidthMeter, BandwidthSample, DefaultBandwidthMeter, ListenerId};
use cadenza_chunk::{ExtractorFactory, LoadTaskIds, TrackManifest};
use cadenza_events::{BandwidthEvent, Event, EventBus, MediaEventDispatcher};
use cadenza_loader::{AdaptiveChunkSource, ChunkFetcher, ChunkPipeline, DefaultLoadControl};
use cadenza_net::{HttpClient, Net, NetExt, TransferListener};
use cadenza_policy::{DefaultLoadErrorHandlingPolicy, LoadErrorHandlingPolicy};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::{
    config::SessionConfig,
    error::{SessionError, SessionResult},
};

/// Owns what every stream of a session shares: the allocation pool, the
/// bandwidth meter, the network, the load-error policy, load task ids and the
/// event bus.
///
/// Pipelines created by [`create_pipeline`](Self::create_pipeline) borrow
/// nothing from the session; they hold handles to the shared parts and stop
/// loading once [`shutdown`](Self::shutdown) is called.
///
/// Bandwidth samples are forwarded to the bus as [`BandwidthEvent::Sample`]
/// when the session is created inside a tokio runtime.
pub struct PlaybackSession {
    config: SessionConfig,
    allocator: Arc<DefaultAllocator>,
    meter: Arc<DefaultBandwidthMeter>,
    net: Arc<dyn Net>,
    policy: Arc<dyn LoadErrorHandlingPolicy>,
    selections: AdaptiveTrackSelectionFactory,
    extractors: Option<Arc<dyn ExtractorFactory>>,
    task_ids: LoadTaskIds,
    bus: EventBus,
    cancel: CancellationToken,
    sample_listener: Option<ListenerId>,
}

impl PlaybackSession {
    /// Create a session loading over HTTP.
    ///
    /// # Errors
    ///
    /// [`SessionError::Alloc`] for an invalid pool configuration,
    /// [`SessionError::Net`] if the HTTP client cannot be built.
    pub fn new(config: SessionConfig) -> SessionResult<Self> {
        let allocator = Arc::new(DefaultAllocator::new(config.allocator.clone())?);
        let meter = Arc::new(DefaultBandwidthMeter::new(config.bandwidth.clone()));
        let net: Arc<dyn Net> = Arc::new(
            HttpClient::new(config.net.clone())?.with_timeout(config.net.request_timeout),
        );
        let policy: Arc<dyn LoadErrorHandlingPolicy> =
            Arc::new(DefaultLoadErrorHandlingPolicy::new(config.load_error.clone()));
        let selections = AdaptiveTrackSelectionFactory::new(
            Arc::clone(&meter) as Arc<dyn BandwidthMeter>,
            config.abr.clone(),
        );
        let bus = EventBus::new(config.event_capacity);
        let cancel = CancellationToken::new();
        let sample_listener = forward_samples(&meter, &bus, &cancel);

        info!(
            block_len = config.allocator.individual_allocation_length,
            forwarding_bandwidth = sample_listener.is_some(),
            "playback session created"
        );

        Ok(Self {
            config,
            allocator,
            meter,
            net,
            policy,
            selections,
            extractors: None,
            task_ids: LoadTaskIds::new(),
            bus,
            cancel,
            sample_listener,
        })
    }

    /// Load through `net` instead of the HTTP client.
    #[must_use]
    pub fn with_net(mut self, net: Arc<dyn Net>) -> Self {
        self.net = net;
        self
    }

    #[must_use]
    pub fn with_policy(mut self, policy: Arc<dyn LoadErrorHandlingPolicy>) -> Self {
        self.policy = policy;
        self
    }

    /// Feed every loaded chunk through extractors built by `factory`.
    #[must_use]
    pub fn with_extractors(mut self, factory: Arc<dyn ExtractorFactory>) -> Self {
        self.extractors = Some(factory);
        self
    }

    /// Build the loading pipeline for one stream of `manifest`. Every track
    /// of the manifest's group is a candidate for adaptive selection.
    ///
    /// # Errors
    ///
    /// [`SessionError::ShutDown`] after [`shutdown`](Self::shutdown), or the
    /// selection and source errors of an unusable manifest.
    pub fn create_pipeline(
        &self,
        manifest: Arc<TrackManifest>,
        window_index: usize,
    ) -> SessionResult<ChunkPipeline> {
        if self.cancel.is_cancelled() {
            return Err(SessionError::ShutDown);
        }

        let group = manifest.group().clone();
        let track_id = group.id().to_string();
        let selection = self
            .selections
            .create(&TrackSelectionDefinition::all_tracks(group))?;
        let source = AdaptiveChunkSource::new(manifest, selection)?;

        let mut fetcher = ChunkFetcher::new(
            Arc::clone(&self.net),
            Arc::clone(&self.allocator) as Arc<dyn Allocator>,
        )
        .with_listener(Arc::clone(&self.meter) as Arc<dyn TransferListener>);
        if let Some(factory) = &self.extractors {
            fetcher = fetcher.with_extractors(Arc::clone(factory));
        }

        debug!(track = %track_id, window_index, "creating chunk pipeline");
        Ok(ChunkPipeline::new(
            Box::new(source),
            Arc::new(fetcher),
            Arc::clone(&self.policy),
            Box::new(DefaultLoadControl::new(self.config.load_control.clone())),
            MediaEventDispatcher::new(self.bus.clone(), window_index, track_id),
            self.cancel.child_token(),
        )
        .with_task_ids(self.task_ids.clone()))
    }

    /// Subscribe to every event of the session.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.bus.subscribe()
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn allocator(&self) -> &Arc<DefaultAllocator> {
        &self.allocator
    }

    pub fn bandwidth_meter(&self) -> &Arc<DefaultBandwidthMeter> {
        &self.meter
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Cancel every load of every pipeline and stop forwarding samples.
    /// Idempotent.
    pub fn shutdown(&self) {
        if self.cancel.is_cancelled() {
            return;
        }
        info!("playback session shutting down");
        self.cancel.cancel();
        if let Some(id) = self.sample_listener {
            self.meter.remove_event_listener(id);
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for PlaybackSession {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Spawn the task relaying meter samples to the bus. `None` outside a
/// runtime.
fn forward_samples(
    meter: &DefaultBandwidthMeter,
    bus: &EventBus,
    cancel: &CancellationToken,
) -> Option<ListenerId> {
    let Ok(handle) = tokio::runtime::Handle::try_current() else {
        debug!("no tokio runtime, bandwidth samples are not forwarded");
        return None;
    };

    let (tx, rx) = kanal::unbounded::<BandwidthSample>();
    let id = meter.add_event_listener(tx);
    let bus = bus.clone();
    let cancel = cancel.clone();
    handle.spawn(async move {
        let rx = rx.to_async();
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                sample = rx.recv() => match sample {
                    Ok(sample) => bus.publish(BandwidthEvent::Sample(sample)),
                    Err(_) => break,
                },
            }
        }
        debug!("bandwidth forwarding stopped");
    });
    Some(id)
}
