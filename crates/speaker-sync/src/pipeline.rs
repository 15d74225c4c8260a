use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use ndarray::Array2;
use tokio::task::block_in_place;
use tokio_stream::StreamExt;
use tracing::{debug, info, warn};

use speaker_sync_audio::{MelChunker, MelConfig, MelExtractor, align_frames, load_wav};
use speaker_sync_decoder::{Backend, Configuration, FramePreparer, RgbFrame};
use speaker_sync_face::{EnrollmentStore, SpeakerMatcher};
use speaker_sync_generator::{BatchAssembler, BatchConfig, DEFAULT_IMG_SIZE};

use crate::error::PipelineError;
use crate::media::{self, FrameWriter};
use crate::progress::{batch_bar_style, stage_bar};
use crate::runtime::{FaceModels, Runtime};
use crate::settings::EffectiveSettings;
use crate::stage::{FaceSource, Synthesizer, TrackingConfig, track_faces};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    LoadModels,
    Enroll,
    IngestFrames,
    ExtractAudio,
    AlignChunks,
    Batch,
    Mux,
    Done,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::LoadModels => "load-models",
            Stage::Enroll => "enroll",
            Stage::IngestFrames => "ingest-frames",
            Stage::ExtractAudio => "extract-audio",
            Stage::AlignChunks => "align-chunks",
            Stage::Batch => "batch",
            Stage::Mux => "mux",
            Stage::Done => "done",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn enter(stage: Stage) {
    info!(stage = %stage, "entering stage");
}

/// Decoded input frames together with the rate they play at.
struct Footage {
    frames: Vec<RgbFrame>,
    fps: f64,
}

/// Runs the full lip-sync pass for one face input and one audio track.
pub async fn run(settings: &EffectiveSettings) -> Result<(), PipelineError> {
    let started = Instant::now();
    if settings.resize_factor != 1 {
        warn!(
            resize_factor = settings.resize_factor,
            "resize factor has no effect; use --out-height to rescale frames"
        );
    } else {
        debug!(resize_factor = settings.resize_factor, "resize factor is inert");
    }

    enter(Stage::LoadModels);
    let runtime = block_in_place(|| {
        let runtime = Runtime::load(settings)?;
        runtime.warm_up()?;
        Ok::<_, PipelineError>(runtime)
    })?;

    let source = face_source(&runtime, settings)?;

    enter(Stage::IngestFrames);
    let Footage { mut frames, fps } = ingest_frames(settings).await?;
    if settings.static_mode {
        frames.truncate(1);
    }
    info!(frames = frames.len(), fps, static_mode = settings.static_mode, "frames ready");

    enter(Stage::ExtractAudio);
    let wav = media::prepare_audio(&settings.ffmpeg, &settings.audio, &settings.temp_dir).await?;
    let mel = block_in_place(|| {
        let samples = load_wav(&wav)?;
        MelExtractor::new(MelConfig::default())?.extract(&samples)
    })?;
    info!(shape = ?mel.shape(), "mel spectrogram extracted");

    enter(Stage::AlignChunks);
    let chunks = chunk_mel(&mel, fps)?;
    let available = frames.len();
    if !settings.static_mode {
        frames = align_frames(frames, chunks.len());
        if frames.len() < available {
            info!(
                kept = frames.len(),
                dropped = available - frames.len(),
                "audio is shorter than the video; trailing frames dropped"
            );
        }
    }
    info!(chunks = chunks.len(), frames = frames.len(), "audio aligned to frames");

    enter(Stage::Batch);
    let tracking = TrackingConfig {
        pads: settings.pads,
        smooth: settings.smooth,
        smooth_window: settings.smooth_window,
        temp_dir: settings.temp_dir.clone(),
        show_progress: true,
    };
    let rects = block_in_place(|| track_faces(&frames, &source, &tracking))?;
    let (width, height) = frames
        .first()
        .map(|frame| (frame.width(), frame.height()))
        .ok_or_else(|| PipelineError::NoFrames(settings.face.clone()))?;

    let assembler = BatchAssembler::new(
        frames,
        rects,
        chunks,
        BatchConfig {
            batch_size: settings.batch_size,
            img_size: DEFAULT_IMG_SIZE,
            static_mode: settings.static_mode,
        },
    )?;
    let mut synthesizer = Synthesizer::new(assembler, Arc::clone(&runtime.generator));
    let bar = stage_bar(
        "lip-sync",
        Some(synthesizer.len() as u64),
        batch_bar_style(),
        false,
    );
    let mut writer =
        FrameWriter::spawn(&settings.ffmpeg, &settings.temp_dir, width, height, fps).await?;
    while let Some(batch) = block_in_place(|| synthesizer.next()) {
        let frames = match batch {
            Ok(frames) => frames,
            Err(err) => {
                bar.abandon_with_message("failed");
                return Err(err);
            }
        };
        for frame in &frames {
            writer.write(frame).await?;
        }
        bar.inc(1);
    }
    bar.finish_and_clear();
    info!(frames = synthesizer.frames_produced(), "lip-sync frames generated");
    let video = writer.finish().await?;

    enter(Stage::Mux);
    media::mux(&settings.ffmpeg, &wav, &video, &settings.outfile).await?;

    enter(Stage::Done);
    info!(
        outfile = %settings.outfile.display(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "lip-sync complete"
    );
    Ok(())
}

fn face_source(
    runtime: &Runtime,
    settings: &EffectiveSettings,
) -> Result<FaceSource, PipelineError> {
    if let Some(rect) = settings.override_box {
        return Ok(FaceSource::Fixed(rect));
    }
    match &runtime.faces {
        FaceModels::Identity { locator } => {
            enter(Stage::Enroll);
            let store =
                block_in_place(|| EnrollmentStore::build(&settings.image_paths, &**locator))?;
            let speaker = settings.speaker.clone().unwrap_or_default();
            info!(
                references = store.len(),
                names = ?store.names(),
                "enrolled reference faces"
            );
            if !store.contains(&speaker) {
                warn!(
                    speaker = %speaker,
                    "speaker has no enrolled reference face; every frame will be rejected"
                );
            }
            Ok(FaceSource::Identity {
                locator: Arc::clone(locator),
                matcher: SpeakerMatcher::new(Arc::new(store), speaker, settings.tolerance),
            })
        }
        FaceModels::Prominent { detector } => Ok(FaceSource::Prominent {
            detector: Arc::clone(detector),
        }),
        FaceModels::Fixed => Err(crate::settings::ConfigError::Missing {
            field: "box",
            reason: "no face model loaded and no fixed box configured",
        }
        .into()),
    }
}

fn decoder_configuration(settings: &EffectiveSettings) -> Result<Configuration, PipelineError> {
    let mut config = Configuration::from_env()?;
    config.input = Some(settings.face.clone());
    if std::env::var_os("SPEAKSYNC_BACKEND").is_none() {
        config.backend = match settings.backend.as_deref() {
            Some(name) => Backend::from_str(name)?,
            None => Backend::for_input(&settings.face),
        };
    }
    config.ffmpeg_binary = settings.ffmpeg.clone();
    config.still_fps = settings.fps;
    Ok(config)
}

async fn ingest_frames(settings: &EffectiveSettings) -> Result<Footage, PipelineError> {
    let config = decoder_configuration(settings)?;
    info!(backend = %config.backend, input = %settings.face.display(), "opening face input");
    let provider = config.create_provider()?;
    let still = provider.is_still();
    let metadata = provider.metadata();
    let fps = match metadata.fps {
        Some(fps) if !still => fps,
        Some(_) | None => {
            if !still {
                warn!(fps = settings.fps, "input reports no frame rate; using configured fps");
            }
            settings.fps
        }
    };

    let preparer = if still {
        FramePreparer::default()
    } else {
        FramePreparer {
            out_height: Some(settings.out_height),
            rotate: settings.rotate,
            crop: settings.crop,
        }
    };

    let mut stream = provider.into_stream();
    let mut frames = Vec::with_capacity(metadata.calculate_total_frames().unwrap_or(0) as usize);
    while let Some(frame) = stream.next().await {
        frames.push(preparer.apply(frame?)?);
    }
    if frames.is_empty() {
        return Err(PipelineError::NoFrames(settings.face.clone()));
    }
    debug!(
        frames = frames.len(),
        width = frames[0].width(),
        height = frames[0].height(),
        "frames decoded"
    );
    Ok(Footage { frames, fps })
}

fn chunk_mel(mel: &Array2<f32>, fps: f64) -> Result<Vec<Array2<f32>>, PipelineError> {
    let chunker = MelChunker::new(mel, fps)?;
    Ok(chunker.collect())
}
