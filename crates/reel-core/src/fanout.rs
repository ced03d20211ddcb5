//! Per-scene fan-out
//!
//! Calls the frame producer once per scene and reports one overall progress
//! stream. Two policies:
//!
//! - **Serial**: index order, one scene at a time; scene `i` maps its
//!   sub-progress into slice `i` of the asset window.
//! - **Concurrent**: every scene is submitted at once behind a semaphore
//!   admission gate. A scene's slice is picked by how many scenes had
//!   completed when it was admitted, so the bar fills in completion order.
//!   Results are sorted back into index order before they touch the
//!   storyboard.
//!
//! Any scene failure fails the whole fan-out; under the concurrent policy the
//! remaining scene tasks are aborted rather than awaited.

use crate::error::PipelineError;
use crate::progress::{ProgressEvent, ProgressPhase, ProgressReporter, ProgressWindow, WindowedSink};
use crate::services::FrameProducer;
use crate::storyboard::{StoryboardConfig, StoryboardFrame};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Scheduling policy for scene production
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetPolicy {
    /// One scene at a time, in index order
    Serial,
    /// Up to `limit` scenes in flight
    Concurrent {
        /// Admission gate size
        limit: usize,
    },
}

impl AssetPolicy {
    /// Concurrent only when the backend supports it and the limit exceeds one
    #[must_use]
    pub fn select(backend_supports_concurrency: bool, limit: usize) -> Self {
        if backend_supports_concurrency && limit > 1 {
            Self::Concurrent { limit }
        } else {
            Self::Serial
        }
    }
}

/// Number of scenes finished so far, shared by concurrent scene tasks
///
/// Reads and increments are each one locked step.
#[derive(Debug, Default)]
struct CompletionCounter {
    completed: Mutex<usize>,
}

impl CompletionCounter {
    fn snapshot(&self) -> usize {
        *self.completed.lock()
    }

    fn finish_one(&self) -> usize {
        let mut completed = self.completed.lock();
        *completed += 1;
        *completed
    }
}

/// Scene fan-out over a frame producer
#[derive(Clone)]
pub struct FanOut {
    producer: Arc<dyn FrameProducer>,
    reporter: ProgressReporter,
    window: ProgressWindow,
}

impl std::fmt::Debug for FanOut {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FanOut")
            .field("reporter", &self.reporter)
            .field("window", &self.window)
            .finish_non_exhaustive()
    }
}

impl FanOut {
    /// Fan-out reporting into `window` of overall progress
    #[must_use]
    pub fn new(
        producer: Arc<dyn FrameProducer>,
        reporter: ProgressReporter,
        window: ProgressWindow,
    ) -> Self {
        Self {
            producer,
            reporter,
            window,
        }
    }

    /// Produce every frame under `policy`
    ///
    /// Returns produced frames sorted by index, one per input frame.
    ///
    /// # Errors
    /// The first scene failure (`SceneFailed` / `InvalidFrame`), or
    /// `SceneTask` if a scene task panicked
    pub async fn run(
        &self,
        policy: AssetPolicy,
        frames: Vec<StoryboardFrame>,
        config: Arc<StoryboardConfig>,
    ) -> Result<Vec<StoryboardFrame>, PipelineError> {
        match policy {
            AssetPolicy::Serial => self.run_serial(frames, &config).await,
            AssetPolicy::Concurrent { limit } => self.run_concurrent(frames, config, limit).await,
        }
    }

    async fn run_serial(
        &self,
        frames: Vec<StoryboardFrame>,
        config: &StoryboardConfig,
    ) -> Result<Vec<StoryboardFrame>, PipelineError> {
        let total = frames.len();
        tracing::info!(scenes = total, "Producing scenes serially");

        let mut produced = Vec::with_capacity(total);
        for (position, frame) in frames.into_iter().enumerate() {
            let index = frame.index;
            let window = self.window.slice(position, total);
            let sink = WindowedSink::new(self.reporter.clone(), window, index + 1, total);

            self.reporter.emit(
                ProgressEvent::new(ProgressPhase::ProcessingFrame, window.start)
                    .with_frame(index + 1, total),
            );

            let frame = self
                .producer
                .produce_frame(frame, config, total, &sink)
                .await
                .map_err(|source| PipelineError::SceneFailed { index, source })?;
            check_frame(index, &frame)?;

            tracing::info!(scene = index + 1, duration = frame.duration, "Scene completed");
            produced.push(frame);
        }
        Ok(produced)
    }

    async fn run_concurrent(
        &self,
        frames: Vec<StoryboardFrame>,
        config: Arc<StoryboardConfig>,
        limit: usize,
    ) -> Result<Vec<StoryboardFrame>, PipelineError> {
        let total = frames.len();
        tracing::info!(scenes = total, limit, "Producing scenes concurrently");

        // More permits than scenes admit nothing extra
        let permits = limit.clamp(1, total.max(1));
        let gate = Arc::new(Semaphore::new(permits));
        let counter = Arc::new(CompletionCounter::default());
        let slice_span = self.window.slice_span(total);
        let mut tasks: JoinSet<Result<StoryboardFrame, PipelineError>> = JoinSet::new();

        for frame in frames {
            let gate = Arc::clone(&gate);
            let counter = Arc::clone(&counter);
            let producer = Arc::clone(&self.producer);
            let reporter = self.reporter.clone();
            let config = Arc::clone(&config);
            let base = self.window.start;

            tasks.spawn(async move {
                let index = frame.index;
                let _permit = gate.acquire_owned().await.map_err(|e| {
                    PipelineError::SceneTask(format!("admission gate closed: {e}"))
                })?;

                // The count at admission fixes this scene's window until it
                // finishes.
                let completed_at_start = counter.snapshot();
                #[allow(clippy::cast_precision_loss)]
                let start = base + slice_span * completed_at_start as f64;
                let window = ProgressWindow::new(start, slice_span);
                let sink = WindowedSink::new(reporter.clone(), window, index + 1, total);

                reporter.emit(
                    ProgressEvent::new(ProgressPhase::ProcessingFrame, window.start)
                        .with_frame(index + 1, total),
                );

                let frame = producer
                    .produce_frame(frame, &config, total, &sink)
                    .await
                    .map_err(|source| PipelineError::SceneFailed { index, source })?;
                check_frame(index, &frame)?;

                let done = counter.finish_one();
                tracing::info!(
                    scene = index + 1,
                    duration = frame.duration,
                    completed = done,
                    total,
                    "Scene completed"
                );
                Ok(frame)
            });
        }

        let mut produced = Vec::with_capacity(total);
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(frame)) => produced.push(frame),
                Ok(Err(error)) => {
                    tracing::error!("Scene failed, abandoning remaining scenes: {}", error);
                    tasks.abort_all();
                    return Err(error);
                }
                Err(join_err) => {
                    tasks.abort_all();
                    return Err(PipelineError::SceneTask(join_err.to_string()));
                }
            }
        }

        produced.sort_by_key(|frame| frame.index);
        Ok(produced)
    }
}

/// Reject frames the storyboard cannot take
fn check_frame(expected_index: usize, frame: &StoryboardFrame) -> Result<(), PipelineError> {
    if frame.index != expected_index {
        return Err(PipelineError::InvalidFrame {
            index: expected_index,
            message: format!("producer returned index {}", frame.index),
        });
    }
    if frame.video_segment_path.is_none() {
        return Err(PipelineError::InvalidFrame {
            index: expected_index,
            message: "no video segment path".to_string(),
        });
    }
    if !(frame.duration.is_finite() && frame.duration >= 0.0) {
        return Err(PipelineError::InvalidFrame {
            index: expected_index,
            message: format!("invalid duration {}", frame.duration),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BoxError;
    use crate::params::{JobParams, TtsInferenceMode};
    use crate::progress::ProgressSink;
    use crate::storyboard::TaskId;
    use crate::template::FrameTemplate;
    use crate::tts::TtsSelection;
    use async_trait::async_trait;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct SleepyProducer {
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        fail_index: Option<usize>,
    }

    impl SleepyProducer {
        fn new(fail_index: Option<usize>) -> Self {
            Self {
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
                fail_index,
            }
        }
    }

    #[async_trait]
    impl FrameProducer for SleepyProducer {
        async fn produce_frame(
            &self,
            mut frame: StoryboardFrame,
            _config: &StoryboardConfig,
            _total_frames: usize,
            progress: &dyn ProgressSink,
        ) -> Result<StoryboardFrame, BoxError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            progress.report(ProgressEvent::new(ProgressPhase::ProcessingFrame, 0.5));
            // Later scenes finish first
            let delay = 40u64.saturating_sub(frame.index as u64 * 8);
            tokio::time::sleep(Duration::from_millis(delay)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.fail_index == Some(frame.index) {
                return Err("render backend rejected scene".into());
            }
            frame.video_segment_path = Some(PathBuf::from(format!("seg_{}.mp4", frame.index)));
            frame.duration = 1.0 + frame.index as f64;
            Ok(frame)
        }
    }

    fn frames(n: usize) -> Vec<StoryboardFrame> {
        (0..n)
            .map(|i| StoryboardFrame::new(i, format!("narration {i}"), None))
            .collect()
    }

    fn config(n: usize) -> Arc<StoryboardConfig> {
        let template = FrameTemplate::parse(JobParams::DEFAULT_TEMPLATE).unwrap();
        let tts = TtsSelection {
            mode: TtsInferenceMode::Local,
            voice_id: Some("v".into()),
            workflow: None,
        };
        Arc::new(StoryboardConfig::from_params(TaskId::new(), n, &JobParams::new(), tts, &template))
    }

    #[test]
    fn policy_selection() {
        assert_eq!(AssetPolicy::select(false, 4), AssetPolicy::Serial);
        assert_eq!(AssetPolicy::select(true, 1), AssetPolicy::Serial);
        assert_eq!(AssetPolicy::select(true, 3), AssetPolicy::Concurrent { limit: 3 });
    }

    #[test]
    fn check_frame_rejects_bad_output() {
        let mut frame = StoryboardFrame::new(2, "n", None);
        assert!(check_frame(2, &frame).is_err());
        frame.video_segment_path = Some(PathBuf::from("x.mp4"));
        frame.duration = f64::NAN;
        assert!(check_frame(2, &frame).is_err());
        frame.duration = 1.0;
        assert!(check_frame(1, &frame).is_err());
        assert!(check_frame(2, &frame).is_ok());
    }

    #[tokio::test]
    async fn concurrent_respects_limit_and_restores_order() {
        let producer = Arc::new(SleepyProducer::new(None));
        let fanout = FanOut::new(
            producer.clone(),
            ProgressReporter::disabled(),
            ProgressWindow::new(0.2, 0.6),
        );

        let out = fanout
            .run(AssetPolicy::Concurrent { limit: 2 }, frames(5), config(5))
            .await
            .unwrap();

        let indices: Vec<usize> = out.iter().map(|f| f.index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3, 4]);
        assert!(producer.max_in_flight.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn serial_runs_one_at_a_time() {
        let producer = Arc::new(SleepyProducer::new(None));
        let fanout = FanOut::new(
            producer.clone(),
            ProgressReporter::disabled(),
            ProgressWindow::new(0.2, 0.6),
        );

        let out = fanout.run(AssetPolicy::Serial, frames(3), config(3)).await.unwrap();

        assert_eq!(out.len(), 3);
        assert_eq!(producer.max_in_flight.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn concurrent_failure_propagates_scene_error() {
        let fanout = FanOut::new(
            Arc::new(SleepyProducer::new(Some(3))),
            ProgressReporter::disabled(),
            ProgressWindow::new(0.2, 0.6),
        );

        let err = fanout
            .run(AssetPolicy::Concurrent { limit: 3 }, frames(5), config(5))
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::SceneFailed { index: 3, .. }));
    }

    #[tokio::test]
    async fn oversized_limit_is_capped_to_scene_count() {
        let producer = Arc::new(SleepyProducer::new(None));
        let fanout = FanOut::new(
            producer.clone(),
            ProgressReporter::disabled(),
            ProgressWindow::new(0.2, 0.6),
        );

        let out = fanout
            .run(AssetPolicy::Concurrent { limit: usize::MAX }, frames(3), config(3))
            .await
            .unwrap();

        assert_eq!(out.len(), 3);
        assert!(producer.max_in_flight.load(Ordering::SeqCst) <= 3);
    }
}
