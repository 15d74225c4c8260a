use std::ffi::OsString;
use std::io::{BufReader, ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::Duration;

use tokio::sync::mpsc::Sender;
use tracing::debug;

use speaker_sync_types::{FrameError, FrameResult, RgbFrame};

use crate::core::{
    DynFrameProvider, FrameStream, FrameStreamProvider, VideoMetadata, spawn_stream_from_channel,
};

const BACKEND_NAME: &str = "ffmpeg-cli";
const DEFAULT_CHANNEL_CAPACITY: usize = 8;

/// Decodes video by piping raw RGB24 frames out of the `ffmpeg` binary.
///
/// Stream geometry and frame rate are read up front with `ffprobe`, which is
/// expected next to the configured `ffmpeg` binary.
pub struct FfmpegCliProvider {
    input: PathBuf,
    ffmpeg: PathBuf,
    probe: ProbeInfo,
    channel_capacity: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct ProbeInfo {
    width: u32,
    height: u32,
    fps: Option<f64>,
    total_frames: Option<u64>,
}

impl FfmpegCliProvider {
    pub fn open<P: AsRef<Path>>(
        path: P,
        ffmpeg: PathBuf,
        channel_capacity: Option<usize>,
    ) -> FrameResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(FrameError::Io(std::io::Error::new(
                ErrorKind::NotFound,
                format!("input file {} does not exist", path.display()),
            )));
        }
        let probe = run_probe(&ffprobe_for(&ffmpeg), path)?;
        debug!(
            width = probe.width,
            height = probe.height,
            fps = ?probe.fps,
            "probed video stream"
        );
        Ok(Self {
            input: path.to_path_buf(),
            ffmpeg,
            probe,
            channel_capacity: channel_capacity.unwrap_or(DEFAULT_CHANNEL_CAPACITY),
        })
    }

    /// Arguments for the decode process. The first video stream is mapped
    /// explicitly so the pipe carries the stream `ffprobe` measured.
    fn decode_args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = ["-v", "error", "-noautorotate", "-i"]
            .into_iter()
            .map(OsString::from)
            .collect();
        args.push(self.input.clone().into_os_string());
        args.extend(
            ["-map", "0:v:0", "-f", "rawvideo", "-pix_fmt", "rgb24", "-"]
                .into_iter()
                .map(OsString::from),
        );
        args
    }

    fn decode_loop(&self, tx: &Sender<FrameResult<RgbFrame>>) -> FrameResult<()> {
        let mut child = Command::new(&self.ffmpeg)
            .args(self.decode_args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| {
                FrameError::backend_failure(BACKEND_NAME, format!("failed to spawn ffmpeg: {err}"))
            })?;

        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| FrameError::backend_failure(BACKEND_NAME, "ffmpeg stdout missing"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| FrameError::backend_failure(BACKEND_NAME, "ffmpeg stderr missing"))?;
        // Drained concurrently so a chatty ffmpeg never blocks on a full pipe.
        let stderr_reader = thread::spawn(move || {
            let mut text = String::new();
            let _ = BufReader::new(stderr).read_to_string(&mut text);
            text
        });

        let frame_bytes = self.probe.width as usize * self.probe.height as usize * 3;
        let mut index = 0u64;
        loop {
            let mut buffer = vec![0u8; frame_bytes];
            match stdout.read_exact(&mut buffer) {
                Ok(()) => {}
                Err(err) if err.kind() == ErrorKind::UnexpectedEof => break,
                Err(err) => {
                    let _ = child.kill();
                    return Err(FrameError::Io(err));
                }
            }
            let timestamp = self
                .probe
                .fps
                .map(|fps| Duration::from_secs_f64(index as f64 / fps));
            let frame =
                RgbFrame::from_owned(self.probe.width, self.probe.height, timestamp, buffer)?
                    .with_frame_index(Some(index));
            if tx.blocking_send(Ok(frame)).is_err() {
                let _ = child.kill();
                return Ok(());
            }
            index += 1;
        }

        let status = child.wait()?;
        let stderr = stderr_reader.join().unwrap_or_default();
        if !status.success() {
            return Err(FrameError::backend_failure(
                BACKEND_NAME,
                stderr.trim().to_string(),
            ));
        }
        Ok(())
    }
}

impl FrameStreamProvider for FfmpegCliProvider {
    fn metadata(&self) -> VideoMetadata {
        VideoMetadata {
            duration: None,
            fps: self.probe.fps,
            width: Some(self.probe.width),
            height: Some(self.probe.height),
            total_frames: self.probe.total_frames,
        }
    }

    fn into_stream(self: Box<Self>) -> FrameStream {
        let provider = *self;
        let capacity = provider.channel_capacity;
        spawn_stream_from_channel(capacity, move |tx| {
            if let Err(err) = provider.decode_loop(&tx) {
                let _ = tx.blocking_send(Err(err));
            }
        })
    }
}

fn ffprobe_for(ffmpeg: &Path) -> PathBuf {
    match ffmpeg.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.join("ffprobe"),
        _ => PathBuf::from("ffprobe"),
    }
}

fn run_probe(ffprobe: &Path, input: &Path) -> FrameResult<ProbeInfo> {
    let output = Command::new(ffprobe)
        .arg("-v")
        .arg("error")
        .arg("-select_streams")
        .arg("v:0")
        .arg("-show_entries")
        .arg("stream=width,height,avg_frame_rate,nb_frames")
        .arg("-of")
        .arg("default=noprint_wrappers=1")
        .arg(input)
        .output()
        .map_err(|err| {
            FrameError::backend_failure(BACKEND_NAME, format!("failed to run ffprobe: {err}"))
        })?;
    if !output.status.success() {
        return Err(FrameError::backend_failure(
            BACKEND_NAME,
            String::from_utf8_lossy(&output.stderr).trim().to_string(),
        ));
    }
    parse_probe(&String::from_utf8_lossy(&output.stdout))
}

fn parse_probe(text: &str) -> FrameResult<ProbeInfo> {
    let mut width = None;
    let mut height = None;
    let mut fps = None;
    let mut total_frames = None;
    for line in text.lines() {
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let value = value.trim();
        match key.trim() {
            "width" => width = value.parse::<u32>().ok(),
            "height" => height = value.parse::<u32>().ok(),
            "avg_frame_rate" => fps = parse_rational(value),
            "nb_frames" => total_frames = value.parse::<u64>().ok(),
            _ => {}
        }
    }
    match (width, height) {
        (Some(width), Some(height)) if width > 0 && height > 0 => Ok(ProbeInfo {
            width,
            height,
            fps,
            total_frames,
        }),
        _ => Err(FrameError::backend_failure(
            BACKEND_NAME,
            "no video stream found",
        )),
    }
}

fn parse_rational(value: &str) -> Option<f64> {
    let (num, den) = match value.split_once('/') {
        Some((num, den)) => (num.parse::<f64>().ok()?, den.parse::<f64>().ok()?),
        None => (value.parse::<f64>().ok()?, 1.0),
    };
    if den == 0.0 {
        return None;
    }
    let fps = num / den;
    (fps.is_finite() && fps > 0.0).then_some(fps)
}

pub fn boxed_ffmpeg_cli<P: AsRef<Path>>(
    path: P,
    ffmpeg: PathBuf,
    channel_capacity: Option<usize>,
) -> FrameResult<DynFrameProvider> {
    Ok(Box::new(FfmpegCliProvider::open(
        path,
        ffmpeg,
        channel_capacity,
    )?))
}
