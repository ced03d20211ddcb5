//! Progress signal and aggregation
//!
//! Stages and collaborators report progress as [`ProgressEvent`]s. Every event
//! of a job flows through one [`ProgressReporter`], which clamps values into
//! `[0, 1]` and keeps the emitted sequence non-decreasing even when several
//! scenes report concurrently.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Phase label carried by a progress event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressPhase {
    /// Narrations are being generated from a topic
    GeneratingNarrations,
    /// A fixed script is being split
    SplittingScript,
    /// Title is being generated
    GeneratingTitle,
    /// Image prompts are being generated
    GeneratingImagePrompts,
    /// A scene is being produced
    ProcessingFrame,
    /// Segments are being concatenated
    Concatenating,
    /// Job finished
    Completed,
}

impl ProgressPhase {
    /// Stable label
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::GeneratingNarrations => "generating_narrations",
            Self::SplittingScript => "splitting_script",
            Self::GeneratingTitle => "generating_title",
            Self::GeneratingImagePrompts => "generating_image_prompts",
            Self::ProcessingFrame => "processing_frame",
            Self::Concatenating => "concatenating",
            Self::Completed => "completed",
        }
    }
}

impl fmt::Display for ProgressPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One progress signal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Phase label
    pub phase: ProgressPhase,
    /// Fraction complete
    pub progress: f64,
    /// 1-based scene being worked on
    pub frame_current: Option<usize>,
    /// Total scenes
    pub frame_total: Option<usize>,
    /// Collaborator step (e.g. `audio`, `image`, `compose`)
    pub step: Option<String>,
    /// Collaborator action detail
    pub action: Option<String>,
    /// Free-form context
    pub extra_info: Option<String>,
}

impl ProgressEvent {
    /// Create event with phase and progress
    #[must_use]
    pub fn new(phase: ProgressPhase, progress: f64) -> Self {
        Self {
            phase,
            progress,
            frame_current: None,
            frame_total: None,
            step: None,
            action: None,
            extra_info: None,
        }
    }

    /// With scene counters
    #[must_use]
    pub fn with_frame(mut self, current: usize, total: usize) -> Self {
        self.frame_current = Some(current);
        self.frame_total = Some(total);
        self
    }

    /// With collaborator step
    #[must_use]
    pub fn with_step(mut self, step: impl Into<String>) -> Self {
        self.step = Some(step.into());
        self
    }

    /// With collaborator action
    #[must_use]
    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    /// With free-form context
    #[must_use]
    pub fn with_extra(mut self, extra: impl Into<String>) -> Self {
        self.extra_info = Some(extra.into());
        self
    }
}

/// Receiver of progress events
///
/// Implementations must return quickly; they are called inline by the
/// producing stage.
pub trait ProgressSink: Send + Sync {
    /// Receive one event
    fn report(&self, event: ProgressEvent);
}

impl<F> ProgressSink for F
where
    F: Fn(ProgressEvent) + Send + Sync,
{
    fn report(&self, event: ProgressEvent) {
        self(event);
    }
}

/// Job-wide progress channel
///
/// Cheap to clone; clones share the sink and the high-water mark.
#[derive(Clone, Default)]
pub struct ProgressReporter {
    sink: Option<Arc<dyn ProgressSink>>,
    high_water: Arc<Mutex<f64>>,
}

impl ProgressReporter {
    /// Reporter forwarding to sink
    #[must_use]
    pub fn new(sink: Arc<dyn ProgressSink>) -> Self {
        Self {
            sink: Some(sink),
            high_water: Arc::new(Mutex::new(0.0)),
        }
    }

    /// Reporter that drops every event
    #[must_use]
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Whether a sink is attached
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.sink.is_some()
    }

    /// Highest progress emitted so far
    #[must_use]
    pub fn current(&self) -> f64 {
        *self.high_water.lock()
    }

    /// Emit an event
    ///
    /// The value is clamped into `[0, 1]` and raised to the highest value
    /// already emitted, so the sink only ever observes a non-decreasing
    /// sequence.
    pub fn emit(&self, mut event: ProgressEvent) {
        let Some(sink) = &self.sink else {
            return;
        };

        // Held across the sink call so concurrent scenes cannot interleave
        // an older, lower value after a newer one.
        let mut high_water = self.high_water.lock();
        let value = if event.progress.is_finite() {
            event.progress.clamp(0.0, 1.0)
        } else {
            *high_water
        };
        *high_water = high_water.max(value);
        event.progress = *high_water;
        sink.report(event);
    }

    /// Emit a bare phase/progress event
    pub fn phase(&self, phase: ProgressPhase, progress: f64) {
        self.emit(ProgressEvent::new(phase, progress));
    }
}

impl fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressReporter")
            .field("enabled", &self.is_enabled())
            .field("current", &self.current())
            .finish()
    }
}

/// Sub-range of overall progress reserved for one unit of work
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressWindow {
    /// Overall progress at sub-progress 0
    pub start: f64,
    /// Width of the window
    pub span: f64,
}

impl ProgressWindow {
    /// Window covering `[start, start + span]`
    #[must_use]
    pub fn new(start: f64, span: f64) -> Self {
        Self { start, span }
    }

    /// Upper bound
    #[must_use]
    pub fn end(&self) -> f64 {
        self.start + self.span
    }

    /// Remap sub-progress in `[0, 1]` into this window
    #[must_use]
    pub fn map(&self, fraction: f64) -> f64 {
        let fraction = if fraction.is_finite() {
            fraction.clamp(0.0, 1.0)
        } else {
            0.0
        };
        self.start + self.span * fraction
    }

    /// Width of each of `count` equal slices
    #[must_use]
    pub fn slice_span(&self, count: usize) -> f64 {
        if count == 0 {
            0.0
        } else {
            #[allow(clippy::cast_precision_loss)]
            let count = count as f64;
            self.span / count
        }
    }

    /// Slice `position` of `count` equal slices
    #[must_use]
    pub fn slice(&self, position: usize, count: usize) -> Self {
        let span = self.slice_span(count);
        #[allow(clippy::cast_precision_loss)]
        let offset = span * position as f64;
        Self::new(self.start + offset, span)
    }
}

/// Sink that remaps a collaborator's `[0, 1]` sub-progress into a window
///
/// Handed to per-scene producers; events come back out through the job's
/// reporter with scene counters attached.
#[derive(Debug, Clone)]
pub struct WindowedSink {
    reporter: ProgressReporter,
    window: ProgressWindow,
    frame_current: usize,
    frame_total: usize,
}

impl WindowedSink {
    /// Create windowed sink for scene `frame_current` (1-based)
    #[must_use]
    pub fn new(
        reporter: ProgressReporter,
        window: ProgressWindow,
        frame_current: usize,
        frame_total: usize,
    ) -> Self {
        Self {
            reporter,
            window,
            frame_current,
            frame_total,
        }
    }

    /// Window this sink maps into
    #[must_use]
    pub fn window(&self) -> ProgressWindow {
        self.window
    }
}

impl ProgressSink for WindowedSink {
    fn report(&self, event: ProgressEvent) {
        let mut adjusted = event;
        adjusted.progress = self.window.map(adjusted.progress);
        adjusted.frame_current = Some(self.frame_current);
        adjusted.frame_total = Some(self.frame_total);
        self.reporter.emit(adjusted);
    }
}
