use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    composition::{
        capture::CapturePipeline,
        timeline::{sort_clips, Segment, TimelinePlan},
    },
    config::Config,
    error::{Result, StitchError},
    progress::{percent, FrameProgress, ProcessingStage, ProgressCallback, ProgressReporter},
    transitions::{TransitionEffect, TransitionRegistry},
    video::{
        Clip, DecodeTarget, EncodeParams, EncodedVideo, EncoderFactory, FfmpegEncoderFactory,
        FfmpegLoader, MediaHandle, SourceLoader, Surface,
    },
};

type Handles = Vec<Option<Box<dyn MediaHandle>>>;

/// Main engine that turns an ordered clip list into one encoded reel
///
/// A run follows a fixed pipeline:
/// 1. Loading - Open every clip and read its metadata
/// 2. Planning - Lay out main and transition segments frame by frame
/// 3. Compositing - Draw each frame onto the shared surface
/// 4. Capture - Hand every frame to the encoder task, in order
/// 5. Finalization - Flush the encoder into an [`EncodedVideo`]
pub struct StitchEngine {
    config: Config,
    loader: Arc<dyn SourceLoader>,
    encoders: Arc<dyn EncoderFactory>,
    transitions: TransitionRegistry,
}

impl StitchEngine {
    pub fn new(config: Config, loader: Arc<dyn SourceLoader>, encoders: Arc<dyn EncoderFactory>) -> Self {
        Self {
            config,
            loader,
            encoders,
            transitions: TransitionRegistry::new(),
        }
    }

    /// Engine decoding and encoding through the ffmpeg executables
    pub fn with_ffmpeg(config: Config) -> Self {
        let loader = Arc::new(FfmpegLoader::new(&config.loader));
        let encoders = Arc::new(FfmpegEncoderFactory::from_config(&config));
        Self::new(config, loader, encoders)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Replace the blend used for one transition type
    pub fn register_transition(&mut self, effect: Box<dyn TransitionEffect>) {
        self.transitions.register(effect);
    }

    /// Stitch clips into a single video
    ///
    /// # Arguments
    ///
    /// * `clips` - Clips in any order; they are stable-sorted by `order`
    /// * `on_progress` - Optional callback receiving every progress event
    pub async fn process(&self, clips: &[Clip], on_progress: Option<ProgressCallback>) -> Result<EncodedVideo> {
        self.process_with_cancel(clips, on_progress, CancellationToken::new()).await
    }

    /// Same as [`process`](Self::process), stopping with `Cancelled` once `cancel` fires
    pub async fn process_with_cancel(
        &self,
        clips: &[Clip],
        on_progress: Option<ProgressCallback>,
        cancel: CancellationToken,
    ) -> Result<EncodedVideo> {
        let reporter = ProgressReporter::new(on_progress);

        match self.run(clips, &reporter, &cancel).await {
            Ok(video) => Ok(video),
            Err(err) => {
                error!("Processing failed: {}", err);
                reporter.emit(ProcessingStage::Error, 0, err.user_message());
                Err(err)
            }
        }
    }

    /// Load the clips and compute the timeline without rendering anything
    pub async fn plan(&self, clips: &[Clip]) -> Result<TimelinePlan> {
        self.config.validate()?;
        if clips.is_empty() {
            return Err(StitchError::EmptyInput);
        }

        let clips = sort_clips(clips);
        let (mut handles, _) = self
            .load_clips(&clips, &ProgressReporter::silent(), &CancellationToken::new())
            .await?;
        let durations = durations(&handles);
        release_all(&mut handles).await;

        Ok(TimelinePlan::build(&clips, &durations, self.config.output.fps))
    }

    async fn run(&self, clips: &[Clip], reporter: &ProgressReporter, cancel: &CancellationToken) -> Result<EncodedVideo> {
        self.config.validate()?;
        if clips.is_empty() {
            return Err(StitchError::EmptyInput);
        }

        let clips = sort_clips(clips);
        info!("🎬 Stitching {} clips at {} fps", clips.len(), self.config.output.fps);
        reporter.emit(ProcessingStage::Loading, 0, "Loading video clips...");

        let (mut handles, size) = self.load_clips(&clips, reporter, cancel).await?;
        let result = self.render(&clips, &mut handles, size, reporter, cancel).await;
        release_all(&mut handles).await;
        result
    }

    // ==========================================
    // LOADING
    // ==========================================

    /// Open every clip in playback order and settle the output size
    ///
    /// The first clip decodes at its native size unless a resolution is
    /// configured; every later clip is decoded straight to the output size.
    async fn load_clips(
        &self,
        clips: &[Clip],
        reporter: &ProgressReporter,
        cancel: &CancellationToken,
    ) -> Result<(Handles, (u32, u32))> {
        let total = clips.len() as u64;
        let mut handles: Handles = Vec::with_capacity(clips.len());
        let mut size = self.config.output.resolution;

        for (index, clip) in clips.iter().enumerate() {
            reporter.emit(
                ProcessingStage::Downloading,
                percent(index as u64, total),
                format!("Loading clip {} of {}: {}", index + 1, total, clip.name),
            );

            let target = DecodeTarget {
                fps: self.config.output.fps,
                size,
            };
            let loaded = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(StitchError::Cancelled),
                loaded = self.loader.load(clip, target) => loaded,
            };

            match loaded {
                Ok(handle) => {
                    let meta = handle.metadata();
                    debug!(
                        "   {:02} - {} ({}x{}, {:.2}s)",
                        index + 1, clip.name, meta.width, meta.height, meta.duration
                    );
                    if size.is_none() {
                        size = Some((meta.width, meta.height));
                    }
                    handles.push(Some(handle));
                }
                Err(err) => {
                    release_all(&mut handles).await;
                    return Err(err);
                }
            }
        }

        let size = size.ok_or(StitchError::EmptyInput)?;
        info!("   ✅ {} clips loaded, output {}x{}", handles.len(), size.0, size.1);
        Ok((handles, size))
    }

    // ==========================================
    // COMPOSITING & CAPTURE
    // ==========================================

    async fn render(
        &self,
        clips: &[Clip],
        handles: &mut Handles,
        size: (u32, u32),
        reporter: &ProgressReporter,
        cancel: &CancellationToken,
    ) -> Result<EncodedVideo> {
        let fps = self.config.output.fps;
        let plan = TimelinePlan::build(clips, &durations(handles), fps);
        for warning in &plan.warnings {
            warn!("{}", warning);
            reporter.emit(ProcessingStage::Processing, 0, warning.to_string());
        }
        info!(
            "⏱️  Timeline: {} segments ({} transitions), {} frames, {:.2}s",
            plan.segments.len(),
            plan.transition_segments(),
            plan.total_frames,
            plan.duration()
        );

        let mut surface = Surface::new(size.0, size.1)?;
        let params = EncodeParams {
            width: size.0,
            height: size.1,
            fps,
            bitrate: self.config.output.bitrate,
        };
        let encoder = self.encoders.open(&params).await?;
        info!("   Encoding as {}", encoder.mime_type());

        let mut capture = CapturePipeline::start(encoder, self.config.pipeline.queue_depth, cancel);
        reporter.emit(ProcessingStage::Processing, 0, "Compositing frames...");

        let composited = self
            .composite(&plan, handles, &mut surface, &mut capture, reporter, cancel)
            .await;
        if let Err(err) = composited {
            capture.abort().await;
            return Err(err);
        }

        reporter.emit(ProcessingStage::Finalizing, 100, "Finalizing video...");
        let video = capture.finish().await?;

        info!(
            "🎉 Reel complete: {} frames, {:.2}s, {} bytes ({})",
            video.frame_count,
            video.duration,
            video.size(),
            video.mime_type
        );
        reporter.emit(ProcessingStage::Complete, 100, "Video ready");
        Ok(video)
    }

    async fn composite(
        &self,
        plan: &TimelinePlan,
        handles: &mut Handles,
        surface: &mut Surface,
        capture: &mut CapturePipeline,
        reporter: &ProgressReporter,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let fps = plan.fps;
        let (width, height) = (surface.width(), surface.height());
        let last_use = plan.last_use(handles.len());
        let mut progress = FrameProgress::new(plan.total_frames, self.config.timing.progress_interval_frames);

        if plan.total_frames == 0 {
            reporter.emit(ProcessingStage::Processing, 100, "Nothing to composite");
        }

        for (index, segment) in plan.segments.iter().enumerate() {
            match *segment {
                Segment::Main { clip, start, frames } => {
                    debug!("Main segment: clip {} from {:.3}s, {} frames", clip + 1, start, frames);
                    let handle = live_handle(handles, clip)?;
                    let duration = handle.metadata().duration;

                    for f in 0..frames {
                        ensure_running(cancel)?;
                        let time = (start + f as f64 / fps).min(duration);
                        self.settle(handle, time, cancel).await?;

                        surface.draw_fitted(handle.current_frame())?;
                        capture.submit(surface.snapshot()).await?;
                        report_frame(&mut progress, reporter);
                    }
                }
                Segment::Transition { from, to, kind, outgoing_start, frames, .. } => {
                    debug!(
                        "Transition segment: {} from clip {} to {}, {} frames",
                        kind, from + 1, to + 1, frames
                    );
                    let effect = self.transitions.get(kind).ok_or_else(|| {
                        StitchError::surface(format!("no renderer registered for transition '{}'", kind))
                    })?;

                    let (before, after) = handles.split_at_mut(to);
                    let outgoing = before
                        .get_mut(from)
                        .and_then(|h| h.as_deref_mut())
                        .ok_or_else(|| released(from))?;
                    let incoming = after
                        .first_mut()
                        .and_then(|h| h.as_deref_mut())
                        .ok_or_else(|| released(to))?;
                    let outgoing_duration = outgoing.metadata().duration;
                    let incoming_duration = incoming.metadata().duration;

                    for f in 0..frames {
                        ensure_running(cancel)?;
                        let offset = f as f64 / fps;
                        self.settle(&mut *outgoing, (outgoing_start + offset).min(outgoing_duration), cancel)
                            .await?;
                        self.settle(&mut *incoming, offset.min(incoming_duration), cancel).await?;

                        let out_frame = outgoing.current_frame().fitted(width, height);
                        let in_frame = incoming.current_frame().fitted(width, height);
                        effect.render(surface, &out_frame, &in_frame, f as f32 / frames as f32)?;

                        capture.submit(surface.snapshot()).await?;
                        report_frame(&mut progress, reporter);
                    }
                }
            }

            for (clip, last) in last_use.iter().enumerate() {
                if *last == Some(index) {
                    if let Some(mut handle) = handles[clip].take() {
                        handle.release().await;
                        debug!("Released clip {}", clip + 1);
                    }
                }
            }
        }

        Ok(())
    }

    /// Seek and wait a bounded time for the frame to be ready
    ///
    /// A seek that does not settle in time leaves the previous frame in place.
    async fn settle(&self, handle: &mut dyn MediaHandle, time: f64, cancel: &CancellationToken) -> Result<()> {
        let limit = Duration::from_millis(self.config.timing.seek_timeout_ms);

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(StitchError::Cancelled),
            settled = tokio::time::timeout(limit, handle.seek(time)) => match settled {
                Ok(result) => result,
                Err(_) => {
                    warn!("Seek to {:.3}s did not settle within {:?}, reusing previous frame", time, limit);
                    Ok(())
                }
            },
        }
    }
}

fn durations(handles: &Handles) -> Vec<f64> {
    handles
        .iter()
        .map(|h| h.as_ref().map(|h| h.metadata().duration).unwrap_or(0.0))
        .collect()
}

fn live_handle(handles: &mut Handles, clip: usize) -> Result<&mut (dyn MediaHandle + 'static)> {
    handles
        .get_mut(clip)
        .and_then(|h| h.as_deref_mut())
        .ok_or_else(|| released(clip))
}

fn released(clip: usize) -> StitchError {
    StitchError::surface(format!("clip {} was released before it was drawn", clip + 1))
}

fn ensure_running(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(StitchError::Cancelled);
    }
    Ok(())
}

fn report_frame(progress: &mut FrameProgress, reporter: &ProgressReporter) {
    if let Some(pct) = progress.advance() {
        reporter.emit(
            ProcessingStage::Processing,
            pct,
            format!("Processing frame {} of {}", progress.processed(), progress.total()),
        );
    }
}

async fn release_all(handles: &mut Handles) {
    for handle in handles.iter_mut() {
        if let Some(mut handle) = handle.take() {
            handle.release().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::ProcessingProgress;
    use crate::video::synthetic::SyntheticSpec;
    use crate::video::{MemoryEncoderFactory, SyntheticLoader, TransitionType};
    use std::sync::Mutex;

    const RED: [u8; 3] = [255, 0, 0];
    const GREEN: [u8; 3] = [0, 255, 0];
    const BLUE: [u8; 3] = [0, 0, 255];

    fn clip(color: [u8; 3], duration: f64, order: u32) -> Clip {
        let url = SyntheticSpec::solid(color, duration, (8, 4)).to_url();
        Clip::new(url, format!("clip {}", order), order)
    }

    fn engine_with(config: Config, loader: SyntheticLoader) -> (StitchEngine, MemoryEncoderFactory) {
        let encoders = MemoryEncoderFactory::new();
        let engine = StitchEngine::new(config, Arc::new(loader), Arc::new(encoders.clone()));
        (engine, encoders)
    }

    fn recorder() -> (ProgressCallback, Arc<Mutex<Vec<ProcessingProgress>>>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let callback: ProgressCallback = Arc::new(move |p: ProcessingProgress| sink.lock().unwrap().push(p));
        (callback, events)
    }

    fn processing(events: &[ProcessingProgress]) -> Vec<u8> {
        events
            .iter()
            .filter(|e| e.stage == ProcessingStage::Processing && e.message.starts_with("Processing frame"))
            .map(|e| e.progress)
            .collect()
    }

    #[tokio::test]
    async fn test_three_clips_with_fades() {
        let (engine, encoders) = engine_with(Config::default(), SyntheticLoader::new());
        let clips = vec![
            clip(RED, 5.0, 0).with_transition(TransitionType::Fade, 1.0),
            clip(GREEN, 4.0, 1).with_transition(TransitionType::Fade, 1.0),
            clip(BLUE, 6.0, 2),
        ];
        let (callback, events) = recorder();

        let video = engine.process(&clips, Some(callback)).await.unwrap();
        assert_eq!(video.frame_count, 420);

        let frames = encoders.captured_frames();
        assert_eq!(frames.len(), 420);
        assert!(frames[0].is_uniform(RED));
        // First transition frame is the outgoing clip untouched
        assert!(frames[120].is_uniform(RED));
        assert!(frames[150].is_uniform(GREEN));
        assert!(frames[419].is_uniform(BLUE));

        let events = events.lock().unwrap();
        let reported = processing(&events);
        assert!(reported.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(reported.iter().filter(|p| **p == 100).count(), 1);
        assert_eq!(reported.last(), Some(&100));

        assert_eq!(events.first().map(|e| e.stage), Some(ProcessingStage::Loading));
        assert_eq!(
            events.iter().filter(|e| e.stage == ProcessingStage::Downloading).count(),
            3
        );
        assert_eq!(events.last().map(|e| e.stage), Some(ProcessingStage::Complete));
    }

    #[tokio::test]
    async fn test_clips_are_sorted_by_order() {
        let (engine, encoders) = engine_with(Config::default(), SyntheticLoader::new());
        let clips = vec![clip(BLUE, 0.1, 2), clip(RED, 0.1, 0), clip(GREEN, 0.1, 1)];

        let video = engine.process(&clips, None).await.unwrap();
        assert_eq!(video.frame_count, 9);

        let frames = encoders.captured_frames();
        assert!(frames[0].is_uniform(RED));
        assert!(frames[3].is_uniform(GREEN));
        assert!(frames[6].is_uniform(BLUE));
    }

    #[tokio::test]
    async fn test_dip_to_black_midpoint() {
        let (engine, encoders) = engine_with(Config::default(), SyntheticLoader::new());
        let clips = vec![
            clip(RED, 1.0, 0).with_transition(TransitionType::FadeBlack, 1.0),
            clip(BLUE, 1.0, 1),
        ];

        engine.process(&clips, None).await.unwrap();

        let frames = encoders.captured_frames();
        // main 0 frames, transition 30 frames, last clip 30 frames
        assert_eq!(frames.len(), 60);
        assert!(frames[15].is_uniform([0, 0, 0]));
    }

    #[tokio::test]
    async fn test_empty_input() {
        let (engine, _) = engine_with(Config::default(), SyntheticLoader::new());
        let (callback, events) = recorder();

        let result = engine.process(&[], Some(callback)).await;
        assert!(matches!(result, Err(StitchError::EmptyInput)));
        assert_eq!(
            events.lock().unwrap().last().map(|e| e.stage),
            Some(ProcessingStage::Error)
        );
    }

    #[tokio::test]
    async fn test_unreachable_clip_fails_the_run() {
        let (engine, encoders) = engine_with(Config::default(), SyntheticLoader::new());
        let clips = vec![
            clip(RED, 1.0, 0),
            Clip::new("https://unreachable.invalid/clip.mp4", "missing", 1),
        ];
        let (callback, events) = recorder();

        let result = engine.process(&clips, Some(callback)).await;
        assert!(matches!(result, Err(StitchError::ClipLoad { .. })));
        assert!(encoders.captured_frames().is_empty());

        let events = events.lock().unwrap();
        let last = events.last().unwrap();
        assert_eq!(last.stage, ProcessingStage::Error);
        assert!(last.message.contains("unreachable.invalid"));
    }

    #[tokio::test]
    async fn test_cancel_mid_run() {
        let (engine, _) = engine_with(Config::default(), SyntheticLoader::new());
        let clips = vec![clip(RED, 2.0, 0), clip(GREEN, 2.0, 1)];

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let callback: ProgressCallback = Arc::new(move |p: ProcessingProgress| {
            if p.stage == ProcessingStage::Processing && p.progress >= 10 {
                trigger.cancel();
            }
        });

        let result = engine.process_with_cancel(&clips, Some(callback), cancel).await;
        assert!(matches!(result, Err(StitchError::Cancelled)));
    }

    #[tokio::test]
    async fn test_cancel_before_start() {
        let (engine, _) = engine_with(Config::default(), SyntheticLoader::new());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = engine
            .process_with_cancel(&[clip(RED, 1.0, 0)], None, cancel)
            .await;
        assert!(matches!(result, Err(StitchError::Cancelled)));
    }

    #[tokio::test]
    async fn test_slow_seeks_still_complete() {
        let mut config = Config::default();
        config.timing.seek_timeout_ms = 1;
        let (engine, encoders) = engine_with(
            config,
            SyntheticLoader::with_seek_delay(Duration::from_millis(50)),
        );

        let video = engine.process(&[clip(GREEN, 0.1, 0)], None).await.unwrap();
        assert_eq!(video.frame_count, 3);
        assert!(encoders.captured_frames().iter().all(|f| f.is_uniform(GREEN)));
    }

    #[tokio::test]
    async fn test_clamped_transition_is_reported() {
        let (engine, _) = engine_with(Config::default(), SyntheticLoader::new());
        let clips = vec![
            clip(RED, 0.5, 0).with_transition(TransitionType::WipeLeft, 2.0),
            clip(BLUE, 1.0, 1),
        ];
        let (callback, events) = recorder();

        let video = engine.process(&clips, Some(callback)).await.unwrap();
        assert_eq!(video.frame_count, 45);
        assert!(events
            .lock()
            .unwrap()
            .iter()
            .any(|e| e.message.contains("shortened")));
    }

    #[tokio::test]
    async fn test_configured_resolution_is_used() {
        let mut config = Config::default();
        config.output.resolution = Some((4, 2));
        let (engine, encoders) = engine_with(config, SyntheticLoader::new());

        engine.process(&[clip(RED, 0.1, 0)], None).await.unwrap();
        assert_eq!(encoders.captured_frames()[0].dimensions(), (4, 2));
    }

    #[tokio::test]
    async fn test_registered_transition_replaces_builtin() {
        struct CutAtHalf;

        impl TransitionEffect for CutAtHalf {
            fn kind(&self) -> TransitionType {
                TransitionType::Fade
            }

            fn description(&self) -> &str {
                "cut"
            }

            fn render(
                &self,
                surface: &mut Surface,
                outgoing: &crate::video::Frame,
                incoming: &crate::video::Frame,
                progress: f32,
            ) -> Result<()> {
                surface.draw(if progress < 0.5 { outgoing } else { incoming }, 0, 1.0)
            }
        }

        let (mut engine, encoders) = engine_with(Config::default(), SyntheticLoader::new());
        engine.register_transition(Box::new(CutAtHalf));
        let clips = vec![
            clip(RED, 1.0, 0).with_transition(TransitionType::Fade, 1.0),
            clip(BLUE, 1.0, 1),
        ];

        engine.process(&clips, None).await.unwrap();
        let frames = encoders.captured_frames();
        assert!(frames[14].is_uniform(RED));
        assert!(frames[15].is_uniform(BLUE));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_decoder_dying_midway_fails_the_run() {
        use crate::video::loader::fake_tools::{self, FakeDecoder};

        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.output.fps = fake_tools::FPS;
        config.loader = fake_tools::install(
            dir.path(),
            FakeDecoder { duration: 5.0, frames: 2, exit_code: 1, delay: 0.0 },
        );

        let loader = Arc::new(FfmpegLoader::new(&config.loader));
        let encoders = MemoryEncoderFactory::new();
        let engine = StitchEngine::new(config, loader, Arc::new(encoders.clone()));
        let (callback, events) = recorder();

        let result = engine
            .process(&[Clip::new("fake://clip.mp4", "flaky", 0)], Some(callback))
            .await;
        assert!(matches!(result, Err(StitchError::ClipLoad { .. })));
        assert!(encoders.captured_frames().is_empty());
        assert_eq!(
            events.lock().unwrap().last().map(|e| e.stage),
            Some(ProcessingStage::Error)
        );
    }

    #[tokio::test]
    async fn test_plan_only() {
        let (engine, encoders) = engine_with(Config::default(), SyntheticLoader::new());
        let clips = vec![
            clip(RED, 5.0, 0).with_transition(TransitionType::SlideLeft, 1.0),
            clip(GREEN, 4.0, 1).with_transition(TransitionType::SlideRight, 1.0),
            clip(BLUE, 6.0, 2),
        ];

        let plan = engine.plan(&clips).await.unwrap();
        assert_eq!(plan.total_frames, 420);
        assert_eq!(plan.transition_segments(), 2);
        assert!(encoders.captured_frames().is_empty());
    }
}
