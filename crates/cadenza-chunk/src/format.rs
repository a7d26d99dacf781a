/// Kind of elementary stream a track carries.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum TrackType {
    #[default]
    Unknown,
    Audio,
    Video,
    Text,
}

/// What a load fetches.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum DataType {
    #[default]
    Unknown,
    Media,
    MediaInitialization,
    Manifest,
    Drm,
}

/// Why the current track was selected.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum SelectionReason {
    #[default]
    Unknown,
    Initial,
    Manual,
    Adaptive,
    TrickPlay,
    UserRequest,
}

/// Immutable description of one encoding.
///
/// Formats are shared as `Arc<Format>` and located by identity: two formats
/// with equal fields are still different tracks.
#[derive(Clone, Debug, PartialEq)]
pub struct Format {
    pub id: String,
    /// Peak or average bitrate in bits per second.
    pub bitrate: u64,
    pub track_type: TrackType,
    pub codecs: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub frame_rate: Option<f32>,
    pub language: Option<String>,
}

impl Format {
    pub fn new<S: Into<String>>(id: S, bitrate: u64) -> Self {
        Self {
            id: id.into(),
            bitrate,
            track_type: TrackType::Unknown,
            codecs: None,
            width: None,
            height: None,
            frame_rate: None,
            language: None,
        }
    }

    pub fn with_track_type(mut self, track_type: TrackType) -> Self {
        self.track_type = track_type;
        self
    }

    pub fn with_codecs<S: Into<String>>(mut self, codecs: S) -> Self {
        self.codecs = Some(codecs.into());
        self
    }

    pub fn with_resolution(mut self, width: u32, height: u32) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self.track_type = TrackType::Video;
        self
    }

    pub fn with_frame_rate(mut self, fps: f32) -> Self {
        self.frame_rate = Some(fps);
        self
    }

    pub fn with_language<S: Into<String>>(mut self, language: S) -> Self {
        self.language = Some(language.into());
        self
    }
}
