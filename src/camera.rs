use crate::error::ConfigError;
use crate::redact::redact_uri;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;
use tracing::debug;
use url::Url;

const PLACEHOLDER_KEY: &str = "your-stream-key-here";
const PLACEHOLDER_CREDENTIALS: &str = "username:password";

/// x264 presets accepted by `-preset`.
const PRESETS: [&str; 10] = [
    "ultrafast",
    "superfast",
    "veryfast",
    "faster",
    "fast",
    "medium",
    "slow",
    "slower",
    "veryslow",
    "placebo",
];

pub const DEFAULT_RESOLUTION: Resolution = Resolution::new(1280, 720);
pub const DEFAULT_BITRATE: &str = "2000k";
pub const DEFAULT_FRAMERATE: &str = "25";
pub const DEFAULT_AUDIO_BITRATE: &str = "128k";
pub const DEFAULT_PRESET: &str = "ultrafast";

/// One `[[cameras]]` table as written in the configuration file.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct CameraEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_uri: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<QualityEntry>,

    #[serde(default)]
    pub relay: Relay,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct QualityEntry {
    pub resolution: Option<String>,
    pub bitrate: Option<String>,
    pub framerate: Option<String>,
    pub audio_bitrate: Option<String>,
    pub preset: Option<String>,
}

/// How the camera feed reaches FFmpeg.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Relay {
    /// FFmpeg pulls the RTSP feed itself.
    #[default]
    Ffmpeg,
    /// Streamlink resolves the source and feeds FFmpeg as its player.
    Streamlink {
        #[serde(default = "default_stream")]
        stream: String,
        #[serde(default)]
        http_headers: BTreeMap<String, String>,
    },
}

impl Relay {
    pub fn is_streamlink(&self) -> bool {
        matches!(self, Relay::Streamlink { .. })
    }
}

fn default_stream() -> String {
    "best".to_string()
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct Resolution {
    #[serde(rename = "w")]
    width: u32,
    #[serde(rename = "h")]
    height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for Resolution {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (w, h) = s
            .split_once(['x', 'X'])
            .ok_or_else(|| format!("expected WxH, got '{s}'"))?;
        let width = w
            .trim()
            .parse::<u32>()
            .map_err(|error| format!("bad width '{w}': {error}"))?;
        let height = h
            .trim()
            .parse::<u32>()
            .map_err(|error| format!("bad height '{h}': {error}"))?;
        if width == 0 || height == 0 {
            return Err(format!("resolution must be non-zero, got '{s}'"));
        }
        Ok(Self { width, height })
    }
}

/// Validated per-camera overrides. Unset fields fall back to the defaults.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Quality {
    pub resolution: Option<Resolution>,
    pub bitrate: Option<String>,
    pub framerate: Option<String>,
    pub audio_bitrate: Option<String>,
    pub preset: Option<String>,
}

impl Quality {
    pub fn from_entry(camera: &str, entry: &QualityEntry) -> Result<Self, ConfigError> {
        let invalid = |field: &'static str, value: &str| ConfigError::InvalidQuality {
            camera: camera.to_string(),
            field,
            value: value.to_string(),
        };

        let resolution = entry
            .resolution
            .as_deref()
            .map(|value| value.parse::<Resolution>().map_err(|_| invalid("resolution", value)))
            .transpose()?;

        for (field, value) in [
            ("bitrate", &entry.bitrate),
            ("audio_bitrate", &entry.audio_bitrate),
        ] {
            if let Some(value) = value
                && !is_bitrate(value)
            {
                return Err(invalid(field, value.as_str()));
            }
        }

        if let Some(framerate) = &entry.framerate
            && !framerate.parse::<f64>().is_ok_and(|fps| fps > 0.0)
        {
            return Err(invalid("framerate", framerate.as_str()));
        }

        if let Some(preset) = &entry.preset
            && !PRESETS.contains(&preset.as_str())
        {
            return Err(invalid("preset", preset.as_str()));
        }

        Ok(Self {
            resolution,
            bitrate: entry.bitrate.clone(),
            framerate: entry.framerate.clone(),
            audio_bitrate: entry.audio_bitrate.clone(),
            preset: entry.preset.clone(),
        })
    }

    /// Merge these overrides over the default profile.
    pub fn profile(&self) -> QualityProfile {
        let defaults = QualityProfile::default();
        QualityProfile {
            resolution: self.resolution.unwrap_or(defaults.resolution),
            bitrate: self.bitrate.clone().unwrap_or(defaults.bitrate),
            framerate: self.framerate.clone().unwrap_or(defaults.framerate),
            audio_bitrate: self.audio_bitrate.clone().unwrap_or(defaults.audio_bitrate),
            preset: self.preset.clone().unwrap_or(defaults.preset),
        }
    }
}

/// `<digits>` optionally followed by a `k`/`M` suffix, as accepted by `-b:v`.
fn is_bitrate(value: &str) -> bool {
    let digits = value
        .strip_suffix(['k', 'K', 'm', 'M'])
        .unwrap_or(value);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

/// The effective encoding settings for one relay process.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct QualityProfile {
    pub resolution: Resolution,
    pub bitrate: String,
    pub framerate: String,
    pub audio_bitrate: String,
    pub preset: String,
}

impl Default for QualityProfile {
    fn default() -> Self {
        Self {
            resolution: DEFAULT_RESOLUTION,
            bitrate: DEFAULT_BITRATE.to_string(),
            framerate: DEFAULT_FRAMERATE.to_string(),
            audio_bitrate: DEFAULT_AUDIO_BITRATE.to_string(),
            preset: DEFAULT_PRESET.to_string(),
        }
    }
}

/// A validated camera. Immutable once loaded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CameraSource {
    pub name: String,
    pub source_uri: String,
    pub destination_key: String,
    pub quality: Option<Quality>,
    pub relay: Relay,
}

impl CameraSource {
    pub fn new(
        name: impl Into<String>,
        source_uri: impl Into<String>,
        destination_key: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            source_uri: source_uri.into(),
            destination_key: destination_key.into(),
            quality: None,
            relay: Relay::Ffmpeg,
        }
    }

    pub fn with_quality(mut self, quality: Quality) -> Self {
        self.quality = Some(quality);
        self
    }

    pub fn with_relay(mut self, relay: Relay) -> Self {
        self.relay = relay;
        self
    }

    pub fn profile(&self) -> QualityProfile {
        self.quality
            .as_ref()
            .map(Quality::profile)
            .unwrap_or_default()
    }

    /// Validate one configuration entry.
    ///
    /// `index` is the entry's position and names unnamed cameras.
    /// `fallback_key` is used when the entry has no destination key of its own.
    pub fn from_entry(
        index: usize,
        entry: &CameraEntry,
        fallback_key: Option<&str>,
    ) -> Result<Self, ConfigError> {
        let name = entry
            .name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("Camera {}", index + 1));

        let missing = |field| ConfigError::MissingField {
            camera: name.clone(),
            field,
        };

        let source_uri = non_empty(entry.source_uri.as_deref()).ok_or_else(|| missing("source_uri"))?;
        let destination_key = non_empty(entry.destination_key.as_deref())
            .or_else(|| non_empty(fallback_key))
            .ok_or_else(|| missing("destination_key"))?;

        if destination_key == PLACEHOLDER_KEY {
            return Err(ConfigError::Placeholder {
                camera: name,
                field: "destination_key",
            });
        }
        if source_uri.contains(PLACEHOLDER_CREDENTIALS) {
            return Err(ConfigError::Placeholder {
                camera: name,
                field: "source_uri",
            });
        }

        let parsed = Url::parse(source_uri).ok();
        let valid_uri = match (&entry.relay, &parsed) {
            (Relay::Ffmpeg, Some(url)) => {
                matches!(url.scheme(), "rtsp" | "rtsps") && url.host_str().is_some()
            }
            (Relay::Streamlink { .. }, Some(_)) => true,
            (_, None) => false,
        };
        if !valid_uri {
            return Err(ConfigError::InvalidSourceUri {
                camera: name,
                uri: redact_uri(source_uri),
            });
        }

        let quality = entry
            .quality
            .as_ref()
            .map(|quality| Quality::from_entry(&name, quality))
            .transpose()?;

        Ok(Self {
            name,
            source_uri: source_uri.to_string(),
            destination_key: destination_key.to_string(),
            quality,
            relay: entry.relay.clone(),
        })
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

/// Result of validating every configured camera.
#[derive(Debug, Default)]
pub struct LoadedCameras {
    pub sources: Vec<CameraSource>,
    pub rejected: Vec<ConfigError>,
}

impl LoadedCameras {
    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty()
    }
}

/// Validate every entry independently. A bad entry never hides the good ones.
pub fn load_sources(entries: &[CameraEntry], fallback_key: Option<&str>) -> LoadedCameras {
    let mut loaded = LoadedCameras::default();
    let mut names = HashSet::new();

    for (index, entry) in entries.iter().enumerate() {
        match CameraSource::from_entry(index, entry, fallback_key) {
            Ok(source) if !names.insert(source.name.clone()) => {
                loaded.rejected.push(ConfigError::DuplicateName(source.name));
            }
            Ok(source) => {
                debug!(camera = %source.name, uri = %redact_uri(&source.source_uri), "Camera loaded");
                loaded.sources.push(source);
            }
            Err(error) => loaded.rejected.push(error),
        }
    }

    loaded
}
