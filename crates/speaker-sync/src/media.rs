use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};

use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin, Command};
use tracing::{debug, info};

use speaker_sync_decoder::RgbFrame;

const TRANSCODED_AUDIO: &str = "temp.wav";
const INTERMEDIATE_VIDEO: &str = "result.avi";

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("failed to spawn ffmpeg for {stage}: {source}")]
    Spawn {
        stage: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("ffmpeg {stage} exited with {status}: {stderr}")]
    Failed {
        stage: &'static str,
        status: ExitStatus,
        stderr: String,
    },

    #[error("frame is {got_width}x{got_height}, encoder expects {width}x{height}")]
    FrameSize {
        width: u32,
        height: u32,
        got_width: u32,
        got_height: u32,
    },

    #[error("media io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Returns a WAV path for `audio`, transcoding through ffmpeg into
/// `temp_dir` when the input is not already WAV.
pub async fn prepare_audio(
    ffmpeg: &Path,
    audio: &Path,
    temp_dir: &Path,
) -> Result<PathBuf, MediaError> {
    let is_wav = audio
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("wav"));
    if is_wav {
        return Ok(audio.to_path_buf());
    }

    tokio::fs::create_dir_all(temp_dir).await?;
    let target = temp_dir.join(TRANSCODED_AUDIO);
    info!(input = %audio.display(), output = %target.display(), "extracting raw audio");
    let mut command = Command::new(ffmpeg);
    command
        .arg("-y")
        .arg("-v")
        .arg("error")
        .arg("-i")
        .arg(audio)
        .arg("-ac")
        .arg("1")
        .arg("-ar")
        .arg("16000")
        .arg("-strict")
        .arg("-2")
        .arg(&target);
    run_to_completion(command, "audio transcode").await?;
    Ok(target)
}

/// Combines the encoded frames with the audio track into the output file.
pub async fn mux(
    ffmpeg: &Path,
    audio: &Path,
    video: &Path,
    outfile: &Path,
) -> Result<(), MediaError> {
    if let Some(parent) = outfile.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut command = Command::new(ffmpeg);
    command
        .arg("-y")
        .arg("-v")
        .arg("error")
        .arg("-i")
        .arg(audio)
        .arg("-i")
        .arg(video)
        .arg("-strict")
        .arg("-2")
        .arg("-q:v")
        .arg("1")
        .arg(outfile);
    run_to_completion(command, "mux").await
}

async fn run_to_completion(mut command: Command, stage: &'static str) -> Result<(), MediaError> {
    debug!(?command, stage, "running ffmpeg");
    let output = command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|source| MediaError::Spawn { stage, source })?;
    if !output.status.success() {
        return Err(MediaError::Failed {
            stage,
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(())
}

/// Streams raw RGB frames into an ffmpeg encoder writing the intermediate
/// video.
pub struct FrameWriter {
    child: Child,
    stdin: Option<ChildStdin>,
    path: PathBuf,
    width: u32,
    height: u32,
    written: u64,
}

impl FrameWriter {
    pub async fn spawn(
        ffmpeg: &Path,
        temp_dir: &Path,
        width: u32,
        height: u32,
        fps: f64,
    ) -> Result<Self, MediaError> {
        tokio::fs::create_dir_all(temp_dir).await?;
        let path = temp_dir.join(INTERMEDIATE_VIDEO);
        let mut child = Command::new(ffmpeg)
            .arg("-y")
            .arg("-v")
            .arg("error")
            .arg("-f")
            .arg("rawvideo")
            .arg("-pix_fmt")
            .arg("rgb24")
            .arg("-s")
            .arg(format!("{width}x{height}"))
            .arg("-r")
            .arg(format!("{fps}"))
            .arg("-i")
            .arg("-")
            .arg("-c:v")
            .arg("mpeg4")
            .arg("-vtag")
            .arg("DIVX")
            .arg("-q:v")
            .arg("2")
            .arg(&path)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| MediaError::Spawn {
                stage: "encode",
                source,
            })?;
        let stdin = child.stdin.take();
        debug!(path = %path.display(), width, height, fps, "started frame encoder");
        Ok(Self {
            child,
            stdin,
            path,
            width,
            height,
            written: 0,
        })
    }

    pub async fn write(&mut self, frame: &RgbFrame) -> Result<(), MediaError> {
        if frame.width() != self.width || frame.height() != self.height {
            return Err(MediaError::FrameSize {
                width: self.width,
                height: self.height,
                got_width: frame.width(),
                got_height: frame.height(),
            });
        }
        let Some(stdin) = self.stdin.as_mut() else {
            return Err(MediaError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "frame encoder input already closed",
            )));
        };
        stdin.write_all(frame.data()).await?;
        self.written += 1;
        Ok(())
    }

    /// Closes the encoder input and waits for the file to be finalised.
    pub async fn finish(mut self) -> Result<PathBuf, MediaError> {
        if let Some(mut stdin) = self.stdin.take() {
            stdin.shutdown().await?;
        }
        let output = self.child.wait_with_output().await?;
        if !output.status.success() {
            return Err(MediaError::Failed {
                stage: "encode",
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        info!(frames = self.written, path = %self.path.display(), "encoded intermediate video");
        Ok(self.path)
    }
}
