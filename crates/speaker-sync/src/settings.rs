use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use clap::ValueEnum;
use directories::{BaseDirs, ProjectDirs};
use serde::Deserialize;
use thiserror::Error;

use speaker_sync_audio::MAX_FPS;
use speaker_sync_decoder::FrameCrop;
use speaker_sync_decoder::config::is_still_image;
use speaker_sync_types::{CropRect, Pads};

use crate::cli::{CliArgs, CliSources, DetectorMode, GeneratorKind};

const CONFIG_FILE_NAME: &str = "speaker-sync.toml";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    checkpoint_path: Option<String>,
    generator: Option<String>,
    detector_model: Option<String>,
    encoder_model: Option<String>,
    detector_mode: Option<String>,
    speaker: Option<String>,
    outfile: Option<String>,
    #[serde(rename = "static")]
    static_mode: Option<bool>,
    fps: Option<f64>,
    pads: Option<Vec<u32>>,
    batch_size: Option<usize>,
    resize_factor: Option<u32>,
    out_height: Option<u32>,
    crop: Option<Vec<i32>>,
    #[serde(rename = "box")]
    face_box: Option<Vec<i32>>,
    rotate: Option<bool>,
    smooth: Option<bool>,
    smooth_window: Option<usize>,
    tolerance: Option<f32>,
    image_paths: Option<Vec<String>>,
    temp_dir: Option<String>,
    ffmpeg: Option<String>,
    backend: Option<String>,
}

#[derive(Debug, Clone)]
pub struct EffectiveSettings {
    pub face: PathBuf,
    pub audio: PathBuf,
    pub outfile: PathBuf,
    pub checkpoint_path: Option<PathBuf>,
    pub generator: GeneratorKind,
    pub detector_model: Option<PathBuf>,
    pub encoder_model: Option<PathBuf>,
    pub detector_mode: DetectorMode,
    pub speaker: Option<String>,
    pub image_paths: Vec<PathBuf>,
    pub static_mode: bool,
    pub fps: f64,
    pub pads: Pads,
    pub batch_size: usize,
    pub resize_factor: u32,
    pub out_height: u32,
    pub crop: FrameCrop,
    pub override_box: Option<CropRect>,
    pub rotate: bool,
    pub smooth: bool,
    pub smooth_window: usize,
    pub tolerance: f32,
    pub temp_dir: PathBuf,
    pub ffmpeg: PathBuf,
    pub backend: Option<String>,
    pub config_path: Option<PathBuf>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid value '{value}' for '{field}'{}", display_origin(.path))]
    InvalidValue {
        path: Option<PathBuf>,
        field: &'static str,
        value: String,
    },

    #[error("missing required setting '{field}': {reason}")]
    Missing {
        field: &'static str,
        reason: &'static str,
    },

    #[error("config file {} does not exist", .path.display())]
    NotFound { path: PathBuf },

    #[error("input file {} does not exist", .path.display())]
    InputNotFound { path: PathBuf },

    #[error("{0}")]
    Unsupported(String),
}

fn display_origin(path: &Option<PathBuf>) -> String {
    match path {
        Some(path) => format!(" in {}", path.display()),
        None => String::new(),
    }
}

pub fn resolve_settings(
    cli: &CliArgs,
    sources: &CliSources,
) -> Result<EffectiveSettings, ConfigError> {
    let (file, config_path) = load_config(cli.config.as_deref())?;
    let settings = merge(cli, sources, file, config_path)?;
    validate(&settings)?;
    Ok(settings)
}

fn load_config(path_override: Option<&Path>) -> Result<(FileConfig, Option<PathBuf>), ConfigError> {
    if let Some(path) = path_override {
        if !path.exists() {
            return Err(ConfigError::NotFound {
                path: path.to_path_buf(),
            });
        }
        return read_config(path).map(|config| (config, Some(path.to_path_buf())));
    }

    let candidates = [project_config_path(), default_config_path()];
    for path in candidates.into_iter().flatten() {
        if path.exists() {
            return read_config(&path).map(|config| (config, Some(path)));
        }
    }
    Ok((FileConfig::default(), None))
}

fn read_config(path: &Path) -> Result<FileConfig, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn merge(
    cli: &CliArgs,
    sources: &CliSources,
    file: FileConfig,
    config_path: Option<PathBuf>,
) -> Result<EffectiveSettings, ConfigError> {
    let config_dir = config_path
        .as_ref()
        .and_then(|path| path.parent().map(|dir| dir.to_path_buf()));
    let base = config_dir.as_deref();
    let origin = config_path.as_ref();

    let FileConfig {
        checkpoint_path: file_checkpoint,
        generator: file_generator,
        detector_model: file_detector_model,
        encoder_model: file_encoder_model,
        detector_mode: file_detector_mode,
        speaker: file_speaker,
        outfile: file_outfile,
        static_mode: file_static,
        fps: file_fps,
        pads: file_pads,
        batch_size: file_batch_size,
        resize_factor: file_resize_factor,
        out_height: file_out_height,
        crop: file_crop,
        face_box: file_face_box,
        rotate: file_rotate,
        smooth: file_smooth,
        smooth_window: file_smooth_window,
        tolerance: file_tolerance,
        image_paths: file_image_paths,
        temp_dir: file_temp_dir,
        ffmpeg: file_ffmpeg,
        backend: file_backend,
    } = file;

    let face = cli.face.clone().map(expand_pathbuf).ok_or(ConfigError::Missing {
        field: "face",
        reason: "pass --face with a video or image file",
    })?;
    let audio = cli.audio.clone().map(expand_pathbuf).ok_or(ConfigError::Missing {
        field: "audio",
        reason: "pass --audio with an audio file",
    })?;

    let checkpoint_path = path_setting(cli.checkpoint_path.clone(), file_checkpoint, base);
    let detector_model = path_setting(cli.detector_model.clone(), file_detector_model, base);
    let encoder_model = path_setting(cli.encoder_model.clone(), file_encoder_model, base);

    let mut generator = cli.generator;
    if !sources.generator_from_cli {
        if let Some(value) = normalize_string(file_generator) {
            generator = GeneratorKind::from_str(&value, true)
                .map_err(|_| invalid(origin, "generator", value))?;
        }
    }

    let mut detector_mode = cli.detector_mode;
    if !sources.detector_mode_from_cli {
        if let Some(value) = normalize_string(file_detector_mode) {
            detector_mode = DetectorMode::from_str(&value, true)
                .map_err(|_| invalid(origin, "detector_mode", value))?;
        }
    }

    let speaker = normalize_string(cli.speaker.clone()).or_else(|| normalize_string(file_speaker));

    let outfile = pick_path(
        sources.outfile_from_cli,
        cli.outfile.clone(),
        file_outfile,
        base,
    );
    let temp_dir = pick_path(
        sources.temp_dir_from_cli,
        cli.temp_dir.clone(),
        file_temp_dir,
        base,
    );
    let ffmpeg = if sources.ffmpeg_from_cli {
        expand_pathbuf(cli.ffmpeg.clone())
    } else {
        match normalize_string(file_ffmpeg) {
            // Bare program names are looked up on PATH, not next to the config file.
            Some(value) if !value.contains(std::path::MAIN_SEPARATOR) => PathBuf::from(value),
            Some(value) => {
                resolve_path_from_config(value, base).unwrap_or_else(|| cli.ffmpeg.clone())
            }
            None => cli.ffmpeg.clone(),
        }
    };

    let static_mode = cli.static_mode || file_static.unwrap_or(false) || is_still_image(&face);
    let rotate = cli.rotate || file_rotate.unwrap_or(false);
    let smooth = !cli.nosmooth && file_smooth.unwrap_or(true);

    let fps = pick(sources.fps_from_cli, cli.fps, file_fps);
    let batch_size = pick(sources.batch_size_from_cli, cli.batch_size, file_batch_size);
    let resize_factor = pick(sources.resize_factor_from_cli, cli.resize_factor, file_resize_factor);
    let out_height = pick(sources.out_height_from_cli, cli.out_height, file_out_height);
    let smooth_window = pick(sources.smooth_window_from_cli, cli.smooth_window, file_smooth_window);
    let tolerance = pick(sources.tolerance_from_cli, cli.tolerance, file_tolerance);

    let (pads_values, pads_origin) =
        pick_with_origin(sources.pads_from_cli, cli.pads.clone(), file_pads, origin);
    let [top, bottom, left, right] = four(pads_values, pads_origin, "pads")?;
    let pads = Pads::new(top, bottom, left, right);

    let (crop_values, crop_origin) =
        pick_with_origin(sources.crop_from_cli, cli.crop.clone(), file_crop, origin);
    let [top, bottom, left, right] = four(crop_values, crop_origin, "crop")?;
    let crop = FrameCrop {
        top,
        bottom,
        left,
        right,
    };

    let (box_values, box_origin) =
        pick_with_origin(sources.box_from_cli, cli.face_box.clone(), file_face_box, origin);
    let override_box =
        parse_override_box(four(box_values, box_origin.clone(), "box")?, box_origin)?;

    let image_paths = if !cli.image_paths.is_empty() {
        cli.image_paths.iter().cloned().map(expand_pathbuf).collect()
    } else {
        file_image_paths
            .unwrap_or_default()
            .into_iter()
            .filter_map(|value| resolve_path_from_config(value, base))
            .collect()
    };

    let backend = normalize_string(cli.backend.clone()).or_else(|| normalize_string(file_backend));

    Ok(EffectiveSettings {
        face,
        audio,
        outfile,
        checkpoint_path,
        generator,
        detector_model,
        encoder_model,
        detector_mode,
        speaker,
        image_paths,
        static_mode,
        fps,
        pads,
        batch_size,
        resize_factor,
        out_height,
        crop,
        override_box,
        rotate,
        smooth,
        smooth_window,
        tolerance,
        temp_dir,
        ffmpeg,
        backend,
        config_path,
    })
}

fn validate(settings: &EffectiveSettings) -> Result<(), ConfigError> {
    let origin = settings.config_path.as_ref();
    for path in [&settings.face, &settings.audio] {
        if !path.exists() {
            return Err(ConfigError::InputNotFound { path: path.clone() });
        }
    }
    if !settings.fps.is_finite() || settings.fps <= 0.0 || settings.fps > MAX_FPS {
        return Err(invalid(origin, "fps", settings.fps.to_string()));
    }
    if settings.batch_size == 0 {
        return Err(invalid(origin, "batch_size", "0".to_string()));
    }
    if settings.resize_factor == 0 {
        return Err(invalid(origin, "resize_factor", "0".to_string()));
    }
    if settings.out_height == 0 {
        return Err(invalid(origin, "out_height", "0".to_string()));
    }
    if settings.smooth_window == 0 {
        return Err(invalid(origin, "smooth_window", "0".to_string()));
    }
    if !settings.tolerance.is_finite() || settings.tolerance < 0.0 {
        return Err(invalid(origin, "tolerance", settings.tolerance.to_string()));
    }
    if settings.generator == GeneratorKind::Onnx && settings.checkpoint_path.is_none() {
        return Err(ConfigError::Missing {
            field: "checkpoint_path",
            reason: "the onnx generator needs --checkpoint-path (or use --generator noop)",
        });
    }

    if settings.override_box.is_some() {
        return Ok(());
    }
    if settings.detector_model.is_none() {
        return Err(ConfigError::Missing {
            field: "detector_model",
            reason: "face detection needs --detector-model unless --box is given",
        });
    }
    if settings.detector_mode == DetectorMode::Identity {
        if settings.encoder_model.is_none() {
            return Err(ConfigError::Missing {
                field: "encoder_model",
                reason: "identity matching needs --encoder-model",
            });
        }
        if settings.speaker.is_none() {
            return Err(ConfigError::Missing {
                field: "speaker",
                reason: "identity matching needs --speaker",
            });
        }
        if settings.image_paths.is_empty() {
            return Err(ConfigError::Missing {
                field: "image_paths",
                reason: "identity matching needs at least one reference image",
            });
        }
    }
    Ok(())
}

fn parse_override_box(
    [top, bottom, left, right]: [i32; 4],
    origin: Option<PathBuf>,
) -> Result<Option<CropRect>, ConfigError> {
    let values = [top, bottom, left, right];
    if values == [-1; 4] {
        return Ok(None);
    }
    if values.iter().any(|value| *value < 0) || bottom <= top || right <= left {
        return Err(ConfigError::InvalidValue {
            path: origin,
            field: "box",
            value: format!("{values:?}"),
        });
    }
    Ok(Some(CropRect::new(
        top as u32,
        bottom as u32,
        left as u32,
        right as u32,
    )))
}

fn four<T: Copy + std::fmt::Debug>(
    values: Vec<T>,
    origin: Option<PathBuf>,
    field: &'static str,
) -> Result<[T; 4], ConfigError> {
    <[T; 4]>::try_from(values.as_slice()).map_err(|_| ConfigError::InvalidValue {
        path: origin,
        field,
        value: format!("{values:?}"),
    })
}

fn pick<T>(from_cli: bool, cli_value: T, file_value: Option<T>) -> T {
    match file_value {
        Some(value) if !from_cli => value,
        _ => cli_value,
    }
}

fn pick_with_origin<T>(
    from_cli: bool,
    cli_value: T,
    file_value: Option<T>,
    origin: Option<&PathBuf>,
) -> (T, Option<PathBuf>) {
    match file_value {
        Some(value) if !from_cli => (value, origin.cloned()),
        _ => (cli_value, None),
    }
}

fn pick_path(
    from_cli: bool,
    cli_value: PathBuf,
    file_value: Option<String>,
    base: Option<&Path>,
) -> PathBuf {
    if from_cli {
        return expand_pathbuf(cli_value);
    }
    normalize_string(file_value)
        .and_then(|value| resolve_path_from_config(value, base))
        .unwrap_or(cli_value)
}

fn path_setting(
    cli_value: Option<PathBuf>,
    file_value: Option<String>,
    base: Option<&Path>,
) -> Option<PathBuf> {
    match cli_value {
        Some(path) => Some(expand_pathbuf(path)),
        None => {
            normalize_string(file_value).and_then(|value| resolve_path_from_config(value, base))
        }
    }
}

fn invalid(origin: Option<&PathBuf>, field: &'static str, value: String) -> ConfigError {
    ConfigError::InvalidValue {
        path: origin.cloned(),
        field,
        value,
    }
}

fn default_config_path() -> Option<PathBuf> {
    ProjectDirs::from("rs", "speaker-sync", "speaker-sync")
        .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
}

fn project_config_path() -> Option<PathBuf> {
    env::current_dir().ok().map(|dir| dir.join(CONFIG_FILE_NAME))
}

fn normalize_string(value: Option<String>) -> Option<String> {
    value.and_then(|v| {
        let trimmed = v.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn expand_pathbuf(path: PathBuf) -> PathBuf {
    match path.to_str() {
        Some(s) => expand_home_path(s),
        None => path,
    }
}

fn resolve_path_from_config(value: String, base: Option<&Path>) -> Option<PathBuf> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    let expanded = expand_home_path(trimmed);
    match base {
        Some(base) if !expanded.is_absolute() => Some(base.join(expanded)),
        _ => Some(expanded),
    }
}

fn expand_home_path(value: &str) -> PathBuf {
    if value == "~" {
        if let Some(base) = BaseDirs::new() {
            return base.home_dir().to_path_buf();
        }
    } else if let Some(stripped) = value.strip_prefix("~/") {
        if let Some(base) = BaseDirs::new() {
            return base.home_dir().join(stripped);
        }
    }
    PathBuf::from(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::parse_cli_from;

    struct Fixture {
        dir: tempfile::TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            fs::write(dir.path().join("clip.mp4"), b"").unwrap();
            fs::write(dir.path().join("still.png"), b"").unwrap();
            fs::write(dir.path().join("voice.wav"), b"").unwrap();
            Self { dir }
        }

        fn path(&self, name: &str) -> String {
            self.dir.path().join(name).to_string_lossy().into_owned()
        }

        fn write_config(&self, contents: &str) -> String {
            let path = self.dir.path().join("speaker-sync.toml");
            fs::write(&path, contents).unwrap();
            path.to_string_lossy().into_owned()
        }

        fn resolve(&self, extra: &[&str]) -> Result<EffectiveSettings, ConfigError> {
            let mut args = vec![
                "speaker-sync".to_string(),
                "--face".to_string(),
                self.path("clip.mp4"),
                "--audio".to_string(),
                self.path("voice.wav"),
            ];
            args.extend(extra.iter().map(|s| s.to_string()));
            let (cli, sources) = parse_cli_from(args).unwrap();
            resolve_settings(&cli, &sources)
        }
    }

    #[test]
    fn file_values_fill_unset_flags() {
        let fixture = Fixture::new();
        let config = fixture.write_config(
            r#"
            generator = "noop"
            detector_mode = "prominent"
            detector_model = "models/detector.onnx"
            batch_size = 16
            pads = [1, 2, 3, 4]
            smooth = false
            temp_dir = "scratch"
            "#,
        );
        let settings = fixture.resolve(&["--config", config.as_str()]).unwrap();
        assert_eq!(settings.generator, GeneratorKind::Noop);
        assert_eq!(settings.detector_mode, DetectorMode::Prominent);
        assert_eq!(settings.batch_size, 16);
        assert_eq!(settings.pads, Pads::new(1, 2, 3, 4));
        assert!(!settings.smooth);
        assert_eq!(settings.temp_dir, fixture.dir.path().join("scratch"));
        assert_eq!(
            settings.detector_model,
            Some(fixture.dir.path().join("models/detector.onnx"))
        );
        assert!(!settings.static_mode);
        assert_eq!(settings.override_box, None);
    }

    #[test]
    fn cli_values_win_over_file() {
        let fixture = Fixture::new();
        let config = fixture.write_config("generator = \"noop\"\nbatch_size = 16\nfps = 12.0\n");
        let settings = fixture
            .resolve(&[
                "--config",
                config.as_str(),
                "--batch-size",
                "4",
                "--box",
                "0",
                "50",
                "10",
                "60",
            ])
            .unwrap();
        assert_eq!(settings.batch_size, 4);
        assert_eq!(settings.fps, 12.0);
        assert_eq!(settings.override_box, Some(CropRect::new(0, 50, 10, 60)));
    }

    #[test]
    fn still_images_imply_static_mode() {
        let fixture = Fixture::new();
        let (cli, sources) = parse_cli_from([
            "speaker-sync".to_string(),
            "--face".to_string(),
            fixture.path("still.png"),
            "--audio".to_string(),
            fixture.path("voice.wav"),
            "--generator".to_string(),
            "noop".to_string(),
            "--box".to_string(),
            "0".to_string(),
            "4".to_string(),
            "0".to_string(),
            "4".to_string(),
        ])
        .unwrap();
        let settings = resolve_settings(&cli, &sources).unwrap();
        assert!(settings.static_mode);
    }

    #[test]
    fn identity_mode_requires_speaker_and_references() {
        let fixture = Fixture::new();
        let err = fixture
            .resolve(&[
                "--generator",
                "noop",
                "--detector-model",
                "d.onnx",
                "--encoder-model",
                "e.onnx",
            ])
            .unwrap_err();
        assert!(matches!(err, ConfigError::Missing { field: "speaker", .. }));

        let err = fixture
            .resolve(&[
                "--generator",
                "noop",
                "--detector-model",
                "d.onnx",
                "--encoder-model",
                "e.onnx",
                "--speaker",
                "alice",
            ])
            .unwrap_err();
        assert!(matches!(err, ConfigError::Missing { field: "image_paths", .. }));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let fixture = Fixture::new();
        let err = fixture
            .resolve(&["--generator", "noop", "--box", "10", "5", "0", "4"])
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { field: "box", .. }));

        let err = fixture
            .resolve(&["--generator", "noop", "--batch-size", "0", "--box", "0", "4", "0", "4"])
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { field: "batch_size", .. }));

        let config = fixture.write_config("pads = [1, 2]\n");
        let err = fixture.resolve(&["--config", config.as_str()]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { field: "pads", .. }));
    }

    #[test]
    fn out_of_range_fps_is_rejected() {
        let fixture = Fixture::new();
        for fps in ["1e-20", "0", "5000", "inf"] {
            let err = fixture
                .resolve(&["--generator", "noop", "--fps", fps, "--box", "0", "4", "0", "4"])
                .unwrap_err();
            assert!(matches!(err, ConfigError::InvalidValue { field: "fps", .. }), "{fps}");
        }
        let config = fixture.write_config("fps = 1e-20\n");
        let err = fixture
            .resolve(&[
                "--config",
                config.as_str(),
                "--generator",
                "noop",
                "--box",
                "0",
                "4",
                "0",
                "4",
            ])
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { field: "fps", .. }));
    }

    #[test]
    fn onnx_generator_needs_checkpoint() {
        let fixture = Fixture::new();
        let err = fixture.resolve(&["--box", "0", "4", "0", "4"]).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Missing {
                field: "checkpoint_path",
                ..
            }
        ));
    }

    #[test]
    fn missing_inputs_are_reported() {
        let fixture = Fixture::new();
        let (cli, sources) = parse_cli_from([
            "speaker-sync".to_string(),
            "--face".to_string(),
            fixture.path("absent.mp4"),
            "--audio".to_string(),
            fixture.path("voice.wav"),
        ])
        .unwrap();
        assert!(matches!(
            resolve_settings(&cli, &sources),
            Err(ConfigError::InputNotFound { .. })
        ));
    }
}
