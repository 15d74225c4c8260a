use std::env;
use std::fmt;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use speaker_sync_types::{FrameError, FrameResult};

use crate::core::DynFrameProvider;

const STILL_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Mock,
    Still,
    FfmpegCli,
    Ffmpeg,
}

impl FromStr for Backend {
    type Err = FrameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mock" => Ok(Backend::Mock),
            "still" | "image" => Ok(Backend::Still),
            "ffmpeg-cli" => Ok(Backend::FfmpegCli),
            "ffmpeg" => Ok(Backend::Ffmpeg),
            other => Err(FrameError::configuration(format!(
                "unknown backend '{other}'"
            ))),
        }
    }
}

impl Backend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Mock => "mock",
            Backend::Still => "still",
            Backend::FfmpegCli => "ffmpeg-cli",
            Backend::Ffmpeg => "ffmpeg",
        }
    }

    /// Picks the backend matching the input file: still images go through the
    /// image decoder, everything else through ffmpeg.
    pub fn for_input(path: &Path) -> Backend {
        if is_still_image(path) {
            Backend::Still
        } else if cfg!(feature = "backend-ffmpeg") {
            Backend::Ffmpeg
        } else {
            Backend::FfmpegCli
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn is_still_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            STILL_EXTENSIONS
                .iter()
                .any(|candidate| ext.eq_ignore_ascii_case(candidate))
        })
        .unwrap_or(false)
}

#[derive(Debug, Clone)]
pub struct Configuration {
    pub backend: Backend,
    pub input: Option<PathBuf>,
    pub channel_capacity: Option<NonZeroUsize>,
    /// Frame rate reported for still images, which carry none of their own.
    pub still_fps: f64,
    pub ffmpeg_binary: PathBuf,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            backend: Backend::FfmpegCli,
            input: None,
            channel_capacity: None,
            still_fps: 25.0,
            ffmpeg_binary: PathBuf::from("ffmpeg"),
        }
    }
}

impl Configuration {
    pub fn for_input(input: impl Into<PathBuf>) -> Self {
        let input = input.into();
        Self {
            backend: Backend::for_input(&input),
            input: Some(input),
            ..Self::default()
        }
    }

    pub fn from_env() -> FrameResult<Self> {
        let mut config = Configuration::default();
        if let Ok(path) = env::var("SPEAKSYNC_INPUT") {
            config = Configuration::for_input(path);
        }
        if let Ok(backend) = env::var("SPEAKSYNC_BACKEND") {
            config.backend = Backend::from_str(&backend)?;
        }
        if let Ok(capacity) = env::var("SPEAKSYNC_CHANNEL_CAPACITY") {
            let parsed: usize = capacity.parse().map_err(|_| {
                FrameError::configuration(format!(
                    "failed to parse SPEAKSYNC_CHANNEL_CAPACITY='{capacity}' as a positive integer"
                ))
            })?;
            let Some(value) = NonZeroUsize::new(parsed) else {
                return Err(FrameError::configuration(
                    "SPEAKSYNC_CHANNEL_CAPACITY must be greater than zero",
                ));
            };
            config.channel_capacity = Some(value);
        }
        Ok(config)
    }

    pub fn available_backends() -> Vec<Backend> {
        let mut backends = vec![Backend::Still, Backend::FfmpegCli];
        if cfg!(feature = "backend-ffmpeg") {
            backends.push(Backend::Ffmpeg);
        }
        backends.push(Backend::Mock);
        backends
    }

    pub fn create_provider(&self) -> FrameResult<DynFrameProvider> {
        let channel_capacity = self.channel_capacity.map(NonZeroUsize::get);

        match self.backend {
            Backend::Mock => Ok(crate::backends::mock::boxed_mock(channel_capacity)),
            Backend::Still => {
                let path = self.require_input()?;
                crate::backends::still::boxed_still(path, self.still_fps)
            }
            Backend::FfmpegCli => {
                let path = self.require_input()?;
                crate::backends::ffmpeg_cli::boxed_ffmpeg_cli(
                    path,
                    self.ffmpeg_binary.clone(),
                    channel_capacity,
                )
            }
            Backend::Ffmpeg => {
                #[cfg(feature = "backend-ffmpeg")]
                {
                    let path = self.require_input()?;
                    crate::backends::ffmpeg::boxed_ffmpeg(path, channel_capacity)
                }
                #[cfg(not(feature = "backend-ffmpeg"))]
                {
                    Err(FrameError::unsupported("ffmpeg"))
                }
            }
        }
    }

    fn require_input(&self) -> FrameResult<PathBuf> {
        self.input.clone().ok_or_else(|| {
            FrameError::configuration(format!(
                "{} backend requires an input path",
                self.backend.as_str()
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn still_extensions_select_image_backend() {
        assert_eq!(Backend::for_input(Path::new("face.JPG")), Backend::Still);
        assert_eq!(Backend::for_input(Path::new("a/b/face.png")), Backend::Still);
        assert_ne!(Backend::for_input(Path::new("clip.mp4")), Backend::Still);
        assert_ne!(Backend::for_input(Path::new("noext")), Backend::Still);
    }

    #[test]
    fn backend_names_round_trip() {
        for backend in Configuration::available_backends() {
            assert_eq!(Backend::from_str(backend.as_str()).unwrap(), backend);
        }
        assert!(Backend::from_str("videotoolbox").is_err());
    }

    #[test]
    fn missing_input_is_configuration_error() {
        let config = Configuration {
            backend: Backend::Still,
            ..Configuration::default()
        };
        let err = config.create_provider().err().unwrap();
        assert!(matches!(err, FrameError::Configuration { .. }));
    }
}
