//! Track groups, timelines and manifests shared by tests.

use std::{sync::Arc, time::Duration};

use bytes::Bytes;
use cadenza_chunk::{BaseLocation, Format, SegmentTimeline, TrackGroup, TrackManifest};
use cadenza_net::RangeSpec;
use url::Url;

use crate::MemoryNet;

/// Segment duration used by the fixture manifests.
pub const SEGMENT_DURATION: Duration = Duration::from_secs(4);

/// Two-rung video ladder: 480p at 1 Mbps, 720p at 2.5 Mbps.
#[must_use]
pub fn video_group() -> TrackGroup {
    TrackGroup::new(
        "video",
        vec![
            Arc::new(
                Format::new("480p", 1_000_000)
                    .with_codecs("avc1.4d401e")
                    .with_resolution(854, 480),
            ),
            Arc::new(
                Format::new("720p", 2_500_000)
                    .with_codecs("avc1.4d401f")
                    .with_resolution(1280, 720),
            ),
        ],
    )
    .expect("fixture group is not empty")
}

/// Deterministic segment payload, distinct per track and segment.
#[must_use]
pub fn segment_payload(track: &str, index: usize, len: usize) -> Bytes {
    let seed = track.bytes().fold(index as u8, u8::wrapping_add);
    (0..len)
        .map(|i| seed.wrapping_add((i % 251) as u8))
        .collect::<Vec<_>>()
        .into()
}

/// Timeline of `count` uniform segments named `{track}/seg-{n}.m4s`, each
/// declaring `segment_len` bytes.
#[must_use]
pub fn uniform_timeline(track: &str, count: usize, segment_len: u64) -> SegmentTimeline {
    let template = format!("{track}/seg-$Number$.m4s");
    let segments = SegmentTimeline::uniform(&template, count, SEGMENT_DURATION)
        .segments()
        .iter()
        .map(|s| {
            s.clone()
                .with_range(RangeSpec::new(0, Some(segment_len.saturating_sub(1))))
        })
        .collect();
    SegmentTimeline::new(segments).expect("uniform segments are contiguous")
}

/// Manifest over [`video_group`] with `count` segments per track, served
/// from each of `locations` in priority order.
#[must_use]
pub fn video_manifest(locations: &[Url], count: usize, segment_len: u64) -> TrackManifest {
    let group = video_group();
    let timelines = group
        .formats()
        .iter()
        .map(|f| uniform_timeline(&f.id, count, segment_len))
        .collect();
    let locations = locations
        .iter()
        .enumerate()
        .map(|(i, url)| BaseLocation::new(url.clone(), i as u32))
        .collect();
    TrackManifest::new(group, timelines, locations).expect("fixture manifest is valid")
}

/// Register every segment of `manifest` under `base` in `net`.
pub fn serve_manifest(net: &MemoryNet, manifest: &TrackManifest, base: &Url, segment_len: usize) {
    for (track, format) in manifest.group().formats().iter().enumerate() {
        let Ok(timeline) = manifest.timeline(track) else {
            continue;
        };
        for (index, segment) in timeline.segments().iter().enumerate() {
            let url = base.join(&segment.uri).expect("segment URI joins base");
            net.insert(url, segment_payload(&format.id, index, segment_len));
        }
    }
}

#[must_use]
pub fn base_url(host: &str) -> Url {
    Url::parse(&format!("https://{host}/media/")).expect("valid fixture host")
}
