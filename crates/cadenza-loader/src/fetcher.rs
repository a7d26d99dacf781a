use std::sync::Arc;

use cadenza_alloc::{Allocation, AllocationWriter, Allocator};
use cadenza_chunk::{ChunkDescriptor, ChunkExtractor, ExtractorFactory, MediaChunk};
use cadenza_net::{ByteStream, Net, TransferListener, TransferListeners};
use cadenza_policy::LoadError;
use futures::StreamExt;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Why a fetch produced no chunk.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FetchError {
    #[error("fetch cancelled after {bytes_loaded} bytes")]
    Cancelled { bytes_loaded: u64 },
    #[error("fetch failed after {bytes_loaded} bytes: {error}")]
    Failed { error: LoadError, bytes_loaded: u64 },
}

impl FetchError {
    fn failed(error: impl Into<LoadError>, bytes_loaded: u64) -> Self {
        Self::Failed {
            error: error.into(),
            bytes_loaded,
        }
    }

    pub fn bytes_loaded(&self) -> u64 {
        match self {
            Self::Cancelled { bytes_loaded } | Self::Failed { bytes_loaded, .. } => *bytes_loaded,
        }
    }
}

/// Loads one chunk into pooled memory.
///
/// Shared by every load worker of a stream. Blocks are taken from the
/// allocator as bytes arrive; on failure or cancellation the partial chain
/// goes back to the pool before the error is returned.
pub struct ChunkFetcher {
    net: Arc<dyn Net>,
    allocator: Arc<dyn Allocator>,
    listeners: TransferListeners,
    extractors: Option<Arc<dyn ExtractorFactory>>,
}

impl ChunkFetcher {
    pub fn new(net: Arc<dyn Net>, allocator: Arc<dyn Allocator>) -> Self {
        Self {
            net,
            allocator,
            listeners: TransferListeners::new(),
            extractors: None,
        }
    }

    pub fn with_listener(mut self, listener: Arc<dyn TransferListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    pub fn with_extractors(mut self, factory: Arc<dyn ExtractorFactory>) -> Self {
        self.extractors = Some(factory);
        self
    }

    pub fn allocator(&self) -> &Arc<dyn Allocator> {
        &self.allocator
    }

    pub fn net(&self) -> &Arc<dyn Net> {
        &self.net
    }

    /// Fetch `chunk`, stopping promptly once `cancel` fires.
    ///
    /// # Errors
    ///
    /// [`FetchError::Cancelled`] after cancellation, [`FetchError::Failed`]
    /// for network, extractor and length failures.
    pub async fn fetch(
        &self,
        chunk: &ChunkDescriptor,
        cancel: &CancellationToken,
    ) -> Result<MediaChunk, FetchError> {
        let spec = &chunk.data_spec;
        let is_network = self.net.is_network();
        self.listeners.on_transfer_initializing(spec, is_network);

        let opened = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(FetchError::Cancelled { bytes_loaded: 0 }),
            opened = self.net.open(spec) => opened,
        };
        let mut stream = opened.map_err(|e| FetchError::failed(e, 0))?;

        self.listeners.on_transfer_start(spec, is_network);
        let result = self.read_body(chunk, &mut stream, is_network, cancel).await;
        self.listeners.on_transfer_end(spec, is_network);

        match &result {
            Ok(loaded) => trace!(
                url = %spec.url,
                bytes = loaded.bytes_loaded(),
                "chunk fetched"
            ),
            Err(e) => debug!(url = %spec.url, error = %e, "chunk fetch ended early"),
        }
        result
    }

    async fn read_body(
        &self,
        chunk: &ChunkDescriptor,
        stream: &mut ByteStream,
        is_network: bool,
        cancel: &CancellationToken,
    ) -> Result<MediaChunk, FetchError> {
        let spec = &chunk.data_spec;
        let mut writer = AllocationWriter::new(self.allocator.individual_allocation_length());
        if let Some(declared) = chunk.byte_length() {
            for _ in 0..writer.blocks_for(declared) {
                let block = self.next_block(cancel, 0).await?;
                writer.push_block(block);
            }
        }

        let mut extractor = self.start_extractor(chunk)?;
        loop {
            let item = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    return Err(FetchError::Cancelled { bytes_loaded: writer.bytes_written() });
                }
                item = stream.next() => item,
            };
            let Some(item) = item else {
                break;
            };
            let bytes = item.map_err(|e| FetchError::failed(e, writer.bytes_written()))?;

            let mut rest: &[u8] = &bytes;
            while !rest.is_empty() {
                if writer.remaining() == 0 {
                    let block = self.next_block(cancel, writer.bytes_written()).await?;
                    writer.push_block(block);
                }
                let taken = writer.write(rest);
                rest = &rest[taken..];
            }
            self.listeners
                .on_bytes_transferred(spec, is_network, bytes.len());

            if let Some(extractor) = extractor.as_mut() {
                extractor
                    .read(&bytes)
                    .map_err(|e| FetchError::failed(e, writer.bytes_written()))?;
            }
        }

        let loaded = writer.bytes_written();
        if let Some(expected) = chunk.byte_length()
            && expected != loaded
        {
            return Err(FetchError::failed(
                LoadError::LengthMismatch {
                    expected,
                    actual: loaded,
                },
                loaded,
            ));
        }
        if extractor.is_some()
            && let Some(factory) = &self.extractors
        {
            factory.output().end_tracks();
        }
        Ok(MediaChunk::new(chunk.clone(), writer.into_node(), loaded))
    }

    async fn next_block(
        &self,
        cancel: &CancellationToken,
        bytes_loaded: u64,
    ) -> Result<Allocation, FetchError> {
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(FetchError::Cancelled { bytes_loaded }),
            block = self.allocator.allocate_async() => Ok(block),
        }
    }

    fn start_extractor(
        &self,
        chunk: &ChunkDescriptor,
    ) -> Result<Option<Box<dyn ChunkExtractor>>, FetchError> {
        let Some(factory) = &self.extractors else {
            return Ok(None);
        };
        let Some(mut extractor) = factory.create(&chunk.format) else {
            return Ok(None);
        };
        extractor
            .init(factory.output(), Some(chunk.start), Some(chunk.end))
            .map_err(|e| FetchError::failed(e, 0))?;
        Ok(Some(extractor))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use cadenza_alloc::{AllocatorOptions, DefaultAllocator};
    use cadenza_chunk::{DataType, ExtractorError, Format, SelectionReason};
    use cadenza_net::{DataSpec, NetError, NetExt, RangeSpec};
    use cadenza_test_utils::{
        FailingExtractorFactory, MemoryNet, RecordingExtractorFactory, segment_payload,
    };
    use parking_lot::Mutex;
    use url::Url;

    use super::*;

    const KIB: usize = 1024;

    fn url() -> Url {
        Url::parse("https://cdn.test/media/480p/seg-0.m4s").unwrap()
    }

    fn pool(block: usize) -> Arc<DefaultAllocator> {
        Arc::new(
            DefaultAllocator::new(
                AllocatorOptions::default().with_individual_allocation_length(block),
            )
                .unwrap(),
        )
    }

    fn descriptor(len: Option<u64>) -> ChunkDescriptor {
        let spec = DataSpec::new(url());
        let data_spec = match len {
            Some(len) => spec.with_range(RangeSpec::new(0, Some(len - 1))),
            None => spec,
        };
        ChunkDescriptor {
            format: Arc::new(Format::new("480p", 1_000_000)),
            track_index: 0,
            chunk_index: 0,
            start: Duration::ZERO,
            end: Duration::from_secs(4),
            data_spec,
            data_type: DataType::Media,
            selection_reason: SelectionReason::Initial,
            location_index: 0,
        }
    }

    fn fetcher(net: MemoryNet, pool: &Arc<DefaultAllocator>) -> ChunkFetcher {
        ChunkFetcher::new(Arc::new(net), pool.clone())
    }

    #[tokio::test]
    async fn chunk_of_200_kib_uses_four_blocks() {
        let pool = pool(64 * KIB);
        let body = segment_payload("480p", 0, 200 * KIB);
        let net = MemoryNet::new().with_resource(url(), body.clone());
        let chunk = fetcher(net, &pool)
            .fetch(&descriptor(Some(200 * KIB as u64)), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(chunk.bytes_loaded(), 200 * KIB as u64);
        assert_eq!(chunk.data().map(|n| n.len()), Some(4));
        assert_eq!(pool.total_bytes_allocated(), 256 * KIB);
        assert_eq!(chunk.read_to_vec(), body.to_vec());

        chunk.release(pool.as_ref()).unwrap();
        assert_eq!(pool.total_bytes_allocated(), 0);
    }

    #[tokio::test]
    async fn undeclared_length_grows_the_chain() {
        let pool = pool(KIB);
        let body = segment_payload("480p", 0, 5 * KIB + 3);
        let net = MemoryNet::new().with_chunk_size(700).with_resource(url(), body.clone());
        let chunk = fetcher(net, &pool)
            .fetch(&descriptor(None), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(chunk.data().map(|n| n.len()), Some(6));
        assert_eq!(chunk.read_to_vec(), body.to_vec());
    }

    #[tokio::test]
    async fn short_body_is_a_length_mismatch() {
        let pool = pool(KIB);
        let net = MemoryNet::new().with_resource(url(), segment_payload("480p", 0, KIB));
        let result = fetcher(net, &pool)
            .fetch(&descriptor(Some(2 * KIB as u64)), &CancellationToken::new())
            .await;
        assert_eq!(
            result.unwrap_err(),
            FetchError::Failed {
                error: LoadError::LengthMismatch {
                    expected: 2 * KIB as u64,
                    actual: KIB as u64,
                },
                bytes_loaded: KIB as u64,
            }
        );
        assert_eq!(pool.total_bytes_allocated(), 0);
    }

    #[tokio::test]
    async fn mid_body_failure_releases_partial_blocks() {
        let pool = pool(KIB);
        let net = MemoryNet::new()
            .with_chunk_size(512)
            .with_resource(url(), segment_payload("480p", 0, 4 * KIB));
        net.fail_after(&url(), 1024, NetError::http("connection reset"));
        let error = fetcher(net, &pool)
            .fetch(&descriptor(Some(4 * KIB as u64)), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(error, FetchError::Failed { error: LoadError::Net(_), .. }));
        assert_eq!(error.bytes_loaded(), 1024);
        assert_eq!(pool.total_bytes_allocated(), 0);
    }

    #[tokio::test]
    async fn cancellation_unblocks_a_stalled_open() {
        let pool = pool(KIB);
        let net = MemoryNet::new().with_resource(url(), segment_payload("480p", 0, KIB));
        net.stall_next(&url());
        let fetcher = Arc::new(fetcher(net, &pool));
        let cancel = CancellationToken::new();

        let task = {
            let fetcher = Arc::clone(&fetcher);
            let cancel = cancel.clone();
            tokio::spawn(async move { fetcher.fetch(&descriptor(Some(KIB as u64)), &cancel).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();
        let result = tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(result.unwrap_err(), FetchError::Cancelled { bytes_loaded: 0 });
        assert_eq!(pool.total_bytes_allocated(), 0);
    }

    #[tokio::test]
    async fn stalled_body_times_out_instead_of_hanging() {
        let pool = pool(KIB);
        let net = MemoryNet::new()
            .with_chunk_size(KIB)
            .with_resource(url(), segment_payload("480p", 0, 4 * KIB));
        net.stall_body_after(&url(), KIB);
        let fetcher = ChunkFetcher::new(
            Arc::new(net.with_timeout(Duration::from_millis(50))),
            pool.clone(),
        );

        let result = tokio::time::timeout(
            Duration::from_secs(2),
            fetcher.fetch(&descriptor(Some(4 * KIB as u64)), &CancellationToken::new()),
        )
        .await
        .expect("fetch must resolve once the body stalls");
        assert_eq!(
            result.unwrap_err(),
            FetchError::Failed {
                error: LoadError::Net(NetError::Timeout),
                bytes_loaded: KIB as u64,
            }
        );
        assert_eq!(pool.total_bytes_allocated(), 0);
    }

    #[derive(Default)]
    struct Calls(Mutex<Vec<&'static str>>);

    impl TransferListener for Calls {
        fn on_transfer_initializing(&self, _spec: &DataSpec, _is_network: bool) {
            self.0.lock().push("init");
        }

        fn on_transfer_start(&self, _spec: &DataSpec, _is_network: bool) {
            self.0.lock().push("start");
        }

        fn on_bytes_transferred(&self, _spec: &DataSpec, _is_network: bool, _bytes: usize) {
            self.0.lock().push("bytes");
        }

        fn on_transfer_end(&self, _spec: &DataSpec, _is_network: bool) {
            self.0.lock().push("end");
        }
    }

    #[tokio::test]
    async fn listeners_see_the_whole_transfer() {
        let pool = pool(KIB);
        let calls = Arc::new(Calls::default());
        let net = MemoryNet::new()
            .with_chunk_size(KIB)
            .with_resource(url(), segment_payload("480p", 0, 2 * KIB));
        fetcher(net, &pool)
            .with_listener(calls.clone())
            .fetch(&descriptor(Some(2 * KIB as u64)), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(*calls.0.lock(), ["init", "start", "bytes", "bytes", "end"]);
    }

    #[tokio::test]
    async fn extractor_receives_every_byte() {
        let pool = pool(KIB);
        let body = segment_payload("480p", 0, 3 * KIB);
        let factory = Arc::new(RecordingExtractorFactory::default());
        let net = MemoryNet::new().with_chunk_size(KIB).with_resource(url(), body.clone());
        fetcher(net, &pool)
            .with_extractors(factory.clone())
            .fetch(&descriptor(Some(3 * KIB as u64)), &CancellationToken::new())
            .await
            .unwrap();
        let recorded = factory.recorded();
        assert_eq!(recorded.bytes(), body.to_vec());
        assert!(recorded.tracks_ended());
    }

    #[tokio::test]
    async fn extractor_failure_fails_the_fetch() {
        let pool = pool(KIB);
        let net = MemoryNet::new()
            .with_chunk_size(KIB)
            .with_resource(url(), segment_payload("480p", 0, 3 * KIB));
        let error = fetcher(net, &pool)
            .with_extractors(Arc::new(FailingExtractorFactory::new(KIB)))
            .fetch(&descriptor(Some(3 * KIB as u64)), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(
            error,
            FetchError::Failed {
                error: LoadError::Extractor(ExtractorError::Malformed(_)),
                ..
            }
        ));
        assert_eq!(pool.total_bytes_allocated(), 0);
    }
}
