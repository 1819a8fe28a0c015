use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{Result, StitchError};
use crate::video::{EncodedVideo, Frame, FrameEncoder};

struct SequencedFrame {
    sequence: u64,
    frame: Frame,
}

/// Ordered hand-off of composited frames to a single encoder task
///
/// Frames travel through a bounded queue, so compositing blocks instead of
/// buffering without limit when the encoder falls behind. The encoder task
/// accepts frames strictly in sequence.
pub struct CapturePipeline {
    sender: Option<mpsc::Sender<SequencedFrame>>,
    task: Option<JoinHandle<Result<EncodedVideo>>>,
    stop: CancellationToken,
    submitted: u64,
}

impl CapturePipeline {
    /// Spawn the encoder task; cancelling `cancel` aborts it
    pub fn start(encoder: Box<dyn FrameEncoder>, queue_depth: usize, cancel: &CancellationToken) -> Self {
        let (sender, receiver) = mpsc::channel(queue_depth.max(1));
        let stop = cancel.child_token();
        let task = tokio::spawn(encode_frames(encoder, receiver, stop.clone()));

        Self {
            sender: Some(sender),
            task: Some(task),
            stop,
            submitted: 0,
        }
    }

    pub fn submitted(&self) -> u64 {
        self.submitted
    }

    /// Queue the next frame, waiting for room when the queue is full
    pub async fn submit(&mut self, frame: Frame) -> Result<()> {
        let sender = self
            .sender
            .as_ref()
            .ok_or_else(|| StitchError::finalization("capture pipeline is closed"))?;

        let item = SequencedFrame {
            sequence: self.submitted,
            frame,
        };
        let sent = tokio::select! {
            biased;
            _ = self.stop.cancelled() => return Err(StitchError::Cancelled),
            sent = sender.send(item) => sent,
        };

        if sent.is_err() {
            // The encoder task has already stopped; report why
            return Err(self.stopped_early().await);
        }

        self.submitted += 1;
        Ok(())
    }

    /// Close the queue and wait for the encoded result
    pub async fn finish(mut self) -> Result<EncodedVideo> {
        self.sender = None;
        let task = self
            .task
            .take()
            .ok_or_else(|| StitchError::finalization("capture pipeline is closed"))?;

        task.await
            .map_err(|e| StitchError::finalization(format!("encoder task failed: {}", e)))?
    }

    /// Stop the encoder and discard its output
    pub async fn abort(mut self) {
        self.stop.cancel();
        self.sender = None;
        if let Some(task) = self.task.take() {
            if let Ok(Err(err)) = task.await {
                debug!("Encoder stopped: {}", err);
            }
        }
    }

    async fn stopped_early(&mut self) -> StitchError {
        self.sender = None;
        match self.task.take() {
            Some(task) => match task.await {
                Ok(Err(err)) => err,
                Ok(Ok(_)) => StitchError::finalization("encoder finished before all frames were captured"),
                Err(e) => StitchError::finalization(format!("encoder task failed: {}", e)),
            },
            None => StitchError::finalization("capture pipeline is closed"),
        }
    }
}

impl Drop for CapturePipeline {
    fn drop(&mut self) {
        if self.task.is_some() {
            self.stop.cancel();
        }
    }
}

async fn encode_frames(
    mut encoder: Box<dyn FrameEncoder>,
    mut receiver: mpsc::Receiver<SequencedFrame>,
    stop: CancellationToken,
) -> Result<EncodedVideo> {
    let mut expected = 0u64;

    loop {
        let next = tokio::select! {
            biased;
            _ = stop.cancelled() => {
                encoder.abort().await;
                return Err(StitchError::Cancelled);
            }
            next = receiver.recv() => next,
        };

        let Some(item) = next else { break };

        if item.sequence != expected {
            encoder.abort().await;
            return Err(StitchError::finalization(format!(
                "frame {} arrived out of order (expected {})",
                item.sequence, expected
            )));
        }

        if let Err(err) = encoder.push_frame(&item.frame).await {
            encoder.abort().await;
            return Err(err);
        }
        expected += 1;
    }

    debug!("Capture queue drained after {} frames", expected);
    encoder.finish().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::video::{EncodeParams, EncoderFactory, MemoryEncoderFactory};

    fn params() -> EncodeParams {
        EncodeParams {
            width: 2,
            height: 2,
            fps: 30.0,
            bitrate: 1_000_000,
        }
    }

    #[tokio::test]
    async fn test_frames_arrive_in_order() {
        let factory = MemoryEncoderFactory::new();
        let encoder = factory.open(&params()).await.unwrap();
        let cancel = CancellationToken::new();

        let mut pipeline = CapturePipeline::start(encoder, 2, &cancel);
        for shade in 0..10u8 {
            pipeline.submit(Frame::new_filled(2, 2, [shade, 0, 0])).await.unwrap();
        }
        assert_eq!(pipeline.submitted(), 10);

        let video = pipeline.finish().await.unwrap();
        assert_eq!(video.frame_count, 10);

        let frames = factory.captured_frames();
        for (shade, frame) in frames.iter().enumerate() {
            assert!(frame.is_uniform([shade as u8, 0, 0]));
        }
    }

    #[tokio::test]
    async fn test_encoder_error_surfaces_on_submit() {
        let factory = MemoryEncoderFactory::new();
        let encoder = factory.open(&params()).await.unwrap();
        let cancel = CancellationToken::new();

        let mut pipeline = CapturePipeline::start(encoder, 1, &cancel);
        let mut result = Ok(());
        // Wrong dimensions make the encoder task stop; a later submit reports it
        for _ in 0..4 {
            result = pipeline.submit(Frame::new_black(3, 3)).await;
            if result.is_err() {
                break;
            }
        }
        if result.is_ok() {
            result = pipeline.finish().await.map(|_| ());
        }
        assert!(matches!(result, Err(StitchError::EncodeFinalization { .. })));
    }

    #[tokio::test]
    async fn test_cancelled_pipeline_rejects_frames() {
        let factory = MemoryEncoderFactory::new();
        let encoder = factory.open(&params()).await.unwrap();
        let cancel = CancellationToken::new();

        let mut pipeline = CapturePipeline::start(encoder, 4, &cancel);
        cancel.cancel();

        assert!(matches!(
            pipeline.submit(Frame::new_black(2, 2)).await,
            Err(StitchError::Cancelled)
        ));
        pipeline.abort().await;
        assert!(factory.captured_frames().is_empty());
    }
}
