use std::path::PathBuf;

use clap::parser::ValueSource;
use clap::{ArgAction, ArgMatches, CommandFactory, FromArgMatches, Parser, ValueEnum};

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum GeneratorKind {
    Onnx,
    Noop,
}

/// How the speaker's face is found in each frame.
#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum DetectorMode {
    /// Match every detected face against the enrolled reference faces.
    Identity,
    /// Follow the highest-scoring face, ignoring identity.
    Prominent,
}

#[derive(Debug, Default)]
pub struct CliSources {
    pub generator_from_cli: bool,
    pub detector_mode_from_cli: bool,
    pub outfile_from_cli: bool,
    pub fps_from_cli: bool,
    pub pads_from_cli: bool,
    pub batch_size_from_cli: bool,
    pub resize_factor_from_cli: bool,
    pub out_height_from_cli: bool,
    pub crop_from_cli: bool,
    pub box_from_cli: bool,
    pub smooth_window_from_cli: bool,
    pub tolerance_from_cli: bool,
    pub temp_dir_from_cli: bool,
    pub ffmpeg_from_cli: bool,
}

impl CliSources {
    fn from_matches(matches: &ArgMatches) -> Self {
        Self {
            generator_from_cli: value_from_cli(matches, "generator"),
            detector_mode_from_cli: value_from_cli(matches, "detector_mode"),
            outfile_from_cli: value_from_cli(matches, "outfile"),
            fps_from_cli: value_from_cli(matches, "fps"),
            pads_from_cli: value_from_cli(matches, "pads"),
            batch_size_from_cli: value_from_cli(matches, "batch_size"),
            resize_factor_from_cli: value_from_cli(matches, "resize_factor"),
            out_height_from_cli: value_from_cli(matches, "out_height"),
            crop_from_cli: value_from_cli(matches, "crop"),
            box_from_cli: value_from_cli(matches, "face_box"),
            smooth_window_from_cli: value_from_cli(matches, "smooth_window"),
            tolerance_from_cli: value_from_cli(matches, "tolerance"),
            temp_dir_from_cli: value_from_cli(matches, "temp_dir"),
            ffmpeg_from_cli: value_from_cli(matches, "ffmpeg"),
        }
    }
}

fn value_from_cli(matches: &ArgMatches, id: &str) -> bool {
    matches
        .value_source(id)
        .is_some_and(|source| matches!(source, ValueSource::CommandLine))
}

pub fn parse_cli() -> (CliArgs, CliSources) {
    let command = CliArgs::command();
    let matches = command.get_matches();
    split_matches(&matches)
}

pub fn parse_cli_from<I, T>(args: I) -> Result<(CliArgs, CliSources), clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    let matches = CliArgs::command().try_get_matches_from(args)?;
    let args = CliArgs::from_arg_matches(&matches)?;
    Ok((args, CliSources::from_matches(&matches)))
}

fn split_matches(matches: &ArgMatches) -> (CliArgs, CliSources) {
    let args = match CliArgs::from_arg_matches(matches) {
        Ok(args) => args,
        Err(err) => err.exit(),
    };
    let sources = CliSources::from_matches(matches);
    (args, sources)
}

#[derive(Debug, Parser)]
#[command(
    name = "speaker-sync",
    about = "Lip-sync one chosen speaker in a video to a new audio track",
    disable_help_subcommand = true
)]
pub struct CliArgs {
    /// Override the configuration file path
    #[arg(long = "config")]
    pub config: Option<PathBuf>,

    /// Print the list of available decoding backends
    #[arg(long = "list-backends")]
    pub list_backends: bool,

    /// Increase log verbosity (repeatable)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    pub verbose: u8,

    /// Lip-sync generator model (ONNX)
    #[arg(long = "checkpoint-path", value_name = "FILE")]
    pub checkpoint_path: Option<PathBuf>,

    /// Generator engine
    #[arg(long = "generator", value_enum, default_value_t = GeneratorKind::Onnx)]
    pub generator: GeneratorKind,

    /// Face detector model (ONNX)
    #[arg(long = "detector-model", value_name = "FILE")]
    pub detector_model: Option<PathBuf>,

    /// Face embedding model (ONNX)
    #[arg(long = "encoder-model", value_name = "FILE")]
    pub encoder_model: Option<PathBuf>,

    /// How the target face is chosen in each frame
    #[arg(long = "detector-mode", value_enum, default_value_t = DetectorMode::Identity)]
    pub detector_mode: DetectorMode,

    /// Video or image containing faces
    #[arg(long = "face", value_name = "FILE")]
    pub face: Option<PathBuf>,

    /// Audio source (any format ffmpeg understands)
    #[arg(long = "audio", value_name = "FILE")]
    pub audio: Option<PathBuf>,

    /// Name of the enrolled speaker to lip-sync
    #[arg(long = "speaker")]
    pub speaker: Option<String>,

    /// Output video path
    #[arg(long = "outfile", value_name = "FILE", default_value = "results/result_voice.mp4")]
    pub outfile: PathBuf,

    /// Use only the first frame of the input
    #[arg(long = "static")]
    pub static_mode: bool,

    /// Frame rate for still-image input
    #[arg(long = "fps", default_value_t = 25.0)]
    pub fps: f64,

    /// Padding around the face: top bottom left right
    #[arg(
        long = "pads",
        num_args = 4,
        value_names = ["TOP", "BOTTOM", "LEFT", "RIGHT"],
        default_values_t = [0u32, 10, 0, 0]
    )]
    pub pads: Vec<u32>,

    /// Faces processed per generator call
    #[arg(long = "batch-size", default_value_t = 128)]
    pub batch_size: usize,

    /// Accepted for compatibility; frames are not rescaled by it
    #[arg(long = "resize-factor", default_value_t = 1)]
    pub resize_factor: u32,

    /// Height video frames are resized to before processing
    #[arg(long = "out-height", default_value_t = 480)]
    pub out_height: u32,

    /// Crop applied to video frames: top bottom left right (-1 = frame edge)
    #[arg(
        long = "crop",
        num_args = 4,
        value_names = ["TOP", "BOTTOM", "LEFT", "RIGHT"],
        allow_negative_numbers = true,
        default_values_t = [0i32, -1, 0, -1]
    )]
    pub crop: Vec<i32>,

    /// Fixed face region: top bottom left right (-1 everywhere = detect)
    #[arg(
        long = "box",
        id = "face_box",
        num_args = 4,
        value_names = ["TOP", "BOTTOM", "LEFT", "RIGHT"],
        allow_negative_numbers = true,
        default_values_t = [-1i32, -1, -1, -1]
    )]
    pub face_box: Vec<i32>,

    /// Rotate video frames 90 degrees clockwise
    #[arg(long = "rotate")]
    pub rotate: bool,

    /// Disable temporal smoothing of face boxes
    #[arg(long = "nosmooth")]
    pub nosmooth: bool,

    /// Frames averaged by the face box smoother
    #[arg(long = "smooth-window", default_value_t = 5)]
    pub smooth_window: usize,

    /// Maximum embedding distance accepted as the speaker
    #[arg(long = "tolerance", default_value_t = 0.4)]
    pub tolerance: f32,

    /// Reference images, one identity per file name (`name--N.jpg`)
    #[arg(long = "image-paths", num_args = 1.., value_name = "FILE")]
    pub image_paths: Vec<PathBuf>,

    /// Directory for intermediate files
    #[arg(long = "temp-dir", default_value = "temp")]
    pub temp_dir: PathBuf,

    /// ffmpeg binary used for audio transcode, encoding, and muxing
    #[arg(long = "ffmpeg", default_value = "ffmpeg")]
    pub ffmpeg: PathBuf,

    /// Lock frame decoding to a specific backend implementation
    #[arg(short = 'b', long = "backend")]
    pub backend: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let (args, sources) = parse_cli_from(["speaker-sync"]).unwrap();
        assert_eq!(args.pads, vec![0, 10, 0, 0]);
        assert_eq!(args.crop, vec![0, -1, 0, -1]);
        assert_eq!(args.face_box, vec![-1, -1, -1, -1]);
        assert_eq!(args.batch_size, 128);
        assert_eq!(args.out_height, 480);
        assert_eq!(args.generator, GeneratorKind::Onnx);
        assert_eq!(args.detector_mode, DetectorMode::Identity);
        assert!(!sources.pads_from_cli);
        assert!(!sources.fps_from_cli);
    }

    #[test]
    fn explicit_values_are_tracked() {
        let (args, sources) = parse_cli_from([
            "speaker-sync",
            "--face",
            "clip.mp4",
            "--box",
            "10",
            "90",
            "-1",
            "80",
            "--crop",
            "0",
            "-1",
            "5",
            "-1",
            "--image-paths",
            "alice.jpg",
            "bob--2.jpg",
            "--fps",
            "30",
            "-vv",
        ])
        .unwrap();
        assert_eq!(args.face_box, vec![10, 90, -1, 80]);
        assert_eq!(args.crop, vec![0, -1, 5, -1]);
        assert_eq!(args.image_paths.len(), 2);
        assert_eq!(args.verbose, 2);
        assert!(sources.box_from_cli);
        assert!(sources.crop_from_cli);
        assert!(sources.fps_from_cli);
        assert!(!sources.batch_size_from_cli);
    }
}
