use thiserror::Error;

/// Problems found while turning configuration entries into camera sources.
///
/// URIs carried by these variants are already redacted.
#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum ConfigError {
    #[error("No cameras configured")]
    NoCameras,

    #[error("Combined streaming needs at least two cameras, got {0}")]
    NotEnoughCameras(usize),

    #[error("Camera '{camera}' is missing required field '{field}'")]
    MissingField { camera: String, field: &'static str },

    #[error("Camera '{camera}' still has the placeholder value in '{field}'")]
    Placeholder { camera: String, field: &'static str },

    #[error("Camera '{camera}' has an invalid RTSP URL: {uri}")]
    InvalidSourceUri { camera: String, uri: String },

    #[error("Camera '{camera}' has invalid quality setting '{field}': {value}")]
    InvalidQuality {
        camera: String,
        field: &'static str,
        value: String,
    },

    #[error("Camera name '{0}' is used more than once")]
    DuplicateName(String),

    #[error("Combined streaming requires a global destination key")]
    MissingDestination,

    #[error("Camera '{0}' uses a Streamlink relay, combined streaming only reads RTSP sources")]
    UnsupportedRelay(String),
}

impl ConfigError {
    /// Name of the camera entry this error belongs to, if any.
    pub fn camera(&self) -> Option<&str> {
        match self {
            ConfigError::MissingField { camera, .. }
            | ConfigError::Placeholder { camera, .. }
            | ConfigError::InvalidSourceUri { camera, .. }
            | ConfigError::InvalidQuality { camera, .. } => Some(camera),
            ConfigError::DuplicateName(name) | ConfigError::UnsupportedRelay(name) => Some(name),
            ConfigError::NoCameras
            | ConfigError::NotEnoughCameras(_)
            | ConfigError::MissingDestination => None,
        }
    }
}

/// The relay process for a camera could not be started.
#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("Empty command line for camera '{0}'")]
    EmptyCommand(String),

    #[error("Failed to start '{program}' for camera '{camera}': {source}")]
    Spawn {
        camera: String,
        program: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum DependencyError {
    #[error("'{0}' is not installed or not in PATH")]
    Missing(String),

    #[error("'{program}' exited with {status} when probed")]
    Broken { program: String, status: String },
}
