//! Progressive accumulation: frame counter, clocks and the two drive loops.
//!
//! Interactive mode runs one cycle per display refresh:
//!
//! ```text
//! camera.tick() ─► frame_number = reset ? 1 : n + 1 ─► bind ─► launch ─► present
//! ```
//!
//! Batch mode repeats `advance ─► launch` for a fixed sample count or until the
//! time budget predictor says the next launch would not fit, then writes the
//! image once.

use std::cell::Cell;
use std::path::Path;
use std::rc::Rc;
use std::time::{Duration, Instant};

use crate::backend::{Backend, OutputBuffer};
use crate::output::ImageSink;
use crate::session::RenderSession;
use crate::util::Result;

/// Default wall-clock guard for batch renders, in seconds.
pub const DEFAULT_TIME_GUARD: f64 = 3600.0;

/// Safety margin applied to the previous iteration's duration.
const PREDICTION_MARGIN: f64 = 1.1;

/// Monotonic frame counter. Never yields 0 and never skips a value.
#[derive(Debug, Clone, Copy)]
pub struct FrameCounter {
    current: u32,
    pending_reset: bool,
}

impl Default for FrameCounter {
    fn default() -> Self {
        Self {
            current: 0,
            pending_reset: true,
        }
    }
}

impl FrameCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restart at 1 on the next [`advance`](Self::advance).
    pub fn request_reset(&mut self) {
        self.pending_reset = true;
    }

    /// Next frame number: 1 after a reset, otherwise the previous plus one.
    pub fn advance(&mut self) -> u32 {
        self.current = if self.pending_reset || self.current == 0 {
            1
        } else {
            self.current.saturating_add(1)
        };
        self.pending_reset = false;
        self.current
    }

    /// Last value returned by `advance`, 0 before the first frame.
    pub fn current(&self) -> u32 {
        self.current
    }
}

/// Time source measured from a fixed origin.
pub trait Clock {
    /// Time elapsed since the origin.
    fn now(&self) -> Duration;
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> Duration {
        (**self).now()
    }
}

impl<C: Clock + ?Sized> Clock for Rc<C> {
    fn now(&self) -> Duration {
        (**self).now()
    }
}

/// Wall clock. Create it at process start so the batch budget covers setup.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self { origin: Instant::now() }
    }

    pub fn starting_at(origin: Instant) -> Self {
        Self { origin }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Hand-driven clock for deterministic tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Cell<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: Duration) {
        self.now.set(self.now.get() + by);
    }

    pub fn set(&self, to: Duration) {
        self.now.set(to);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        self.now.get()
    }
}

/// Batch render budget.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatchPlan {
    /// Sample count, used when no time limit is set
    pub samples: u32,
    /// Time budget in seconds; overrides `samples`
    pub time_limit: Option<f64>,
    /// Budget applied when `time_limit` is unset
    pub guard: f64,
}

impl Default for BatchPlan {
    fn default() -> Self {
        Self {
            samples: 20,
            time_limit: None,
            guard: DEFAULT_TIME_GUARD,
        }
    }
}

impl BatchPlan {
    pub fn samples(samples: u32) -> Self {
        Self {
            samples,
            ..Default::default()
        }
    }

    pub fn timed(seconds: f64) -> Self {
        Self {
            time_limit: Some(seconds),
            ..Default::default()
        }
    }

    /// Effective budget in seconds.
    pub fn budget(&self) -> f64 {
        self.time_limit.unwrap_or(self.guard)
    }

    fn wants_more(&self, done: u32) -> bool {
        self.time_limit.is_some() || done < self.samples
    }
}

/// Outcome of a batch render.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatchReport {
    /// Launches actually issued
    pub samples: u32,
    /// The time predictor ended the loop
    pub stopped_early: bool,
    /// Clock reading when the loop ended
    pub elapsed: Duration,
}

/// Whether a launch of about `delta` seconds, plus margin, would overrun
/// `budget` given `used` seconds already spent.
#[inline]
pub fn should_stop(used: f64, delta: f64, budget: f64) -> bool {
    used + delta * PREDICTION_MARGIN > budget
}

/// Live display of the output buffer.
pub trait DisplaySink {
    fn present(&mut self, output: &OutputBuffer, frame_number: u32) -> Result<()>;
}

/// One interactive cycle: camera tick, frame advance, launch, present.
/// Returns the frame number that was rendered.
pub fn run_interactive_frame<B: Backend>(
    session: &mut RenderSession<B>,
    sink: &mut dyn DisplaySink,
) -> Result<u32> {
    let frame_number = session.render_frame()?;
    sink.present(session.output(), frame_number)?;
    Ok(frame_number)
}

/// Offline render under `plan`, then write the image to `path` exactly once.
#[tracing::instrument(skip_all, fields(path = %path.display()))]
pub fn run_batch<B: Backend>(
    session: &mut RenderSession<B>,
    plan: &BatchPlan,
    clock: &dyn Clock,
    sink: &mut dyn ImageSink,
    path: &Path,
) -> Result<BatchReport> {
    session.sync_camera()?;

    let budget = plan.budget();
    let mut last = clock.now();
    let mut samples = 0u32;
    let mut stopped_early = false;

    while plan.wants_more(samples) {
        let now = clock.now();
        let used = now.as_secs_f64();
        let delta = now.saturating_sub(last).as_secs_f64();
        last = now;
        if should_stop(used, delta, budget) {
            log::info!(
                "time budget {budget:.1}s reached after {samples} sample(s) ({used:.2}s used, last {delta:.3}s)"
            );
            stopped_early = true;
            break;
        }
        session.advance_frame()?;
        session.launch()?;
        samples += 1;
    }

    let elapsed = clock.now();
    log::info!("rendered {samples} sample(s) in {:.2}s", elapsed.as_secs_f64());
    sink.write_image(path, session.output())?;
    log::info!("wrote {}", path.display());

    Ok(BatchReport {
        samples,
        stopped_early,
        elapsed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_counter_starts_at_one() {
        let mut fc = FrameCounter::new();
        assert_eq!(fc.current(), 0);
        assert_eq!(fc.advance(), 1);
        assert_eq!(fc.advance(), 2);
        assert_eq!(fc.advance(), 3);
    }

    #[test]
    fn test_frame_counter_reset() {
        let mut fc = FrameCounter::new();
        for _ in 0..5 {
            fc.advance();
        }
        fc.request_reset();
        assert_eq!(fc.advance(), 1);
        assert_eq!(fc.advance(), 2);
    }

    #[test]
    fn test_frame_counter_never_zero() {
        let mut fc = FrameCounter::new();
        for expected in 1..=100 {
            assert_eq!(fc.advance(), expected);
        }
    }

    #[test]
    fn test_should_stop() {
        assert!(!should_stop(0.0, 0.0, 1.0));
        assert!(!should_stop(0.5, 0.4, 1.0));
        // 0.5 + 0.5 * 1.1 = 1.05
        assert!(should_stop(0.5, 0.5, 1.0));
        assert!(should_stop(2.0, 0.0, 1.0));
    }

    #[test]
    fn test_batch_plan_budget() {
        assert_eq!(BatchPlan::samples(7).budget(), DEFAULT_TIME_GUARD);
        assert_eq!(BatchPlan::timed(2.5).budget(), 2.5);
        assert!(BatchPlan::timed(1.0).wants_more(u32::MAX - 1));
        assert!(!BatchPlan::samples(3).wants_more(3));
    }

    #[test]
    fn test_manual_clock() {
        let clock = Rc::new(ManualClock::new());
        clock.advance(Duration::from_millis(250));
        clock.advance(Duration::from_millis(250));
        assert_eq!(clock.now(), Duration::from_millis(500));
        clock.set(Duration::from_secs(3));
        assert_eq!((&*clock).now(), Duration::from_secs(3));
    }
}
