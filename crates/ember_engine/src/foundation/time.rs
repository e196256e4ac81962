//! Frame timing and interval measurement

use std::time::{Duration, Instant};

/// Per-frame clock driven once per main-loop iteration
///
/// Tracks the delta between the two most recent updates alongside
/// accumulated running time and a frame counter.
pub struct Clock {
    last_frame: Instant,
    delta_time: f32,
    total_time: f32,
    frame_count: u64,
}

impl Clock {
    /// Create a clock anchored at the current instant.
    pub fn new() -> Self {
        Self {
            last_frame: Instant::now(),
            delta_time: 0.0,
            total_time: 0.0,
            frame_count: 0,
        }
    }

    /// Advance the clock by one frame and recompute the delta.
    pub fn update(&mut self) {
        let now = Instant::now();
        self.delta_time = now.duration_since(self.last_frame).as_secs_f32();
        self.total_time += self.delta_time;
        self.frame_count += 1;
        self.last_frame = now;
    }

    /// Seconds elapsed between the two most recent updates.
    pub fn delta_time(&self) -> f32 {
        self.delta_time
    }

    /// Seconds accumulated across all updates.
    pub fn total_time(&self) -> f32 {
        self.total_time
    }

    /// Number of updates so far.
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Instantaneous frame rate derived from the latest delta.
    pub fn current_fps(&self) -> f32 {
        if self.delta_time > 0.0 {
            1.0 / self.delta_time
        } else {
            0.0
        }
    }

    /// Average frame rate over the clock's whole lifetime.
    pub fn average_fps(&self) -> f32 {
        if self.total_time > 0.0 {
            self.frame_count as f32 / self.total_time
        } else {
            0.0
        }
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

/// Start/stop interval timer for measuring spans of work.
pub struct Stopwatch {
    start_time: Option<Instant>,
    elapsed: Duration,
}

impl Stopwatch {
    /// Create a stopped stopwatch with no elapsed time.
    pub fn new() -> Self {
        Self {
            start_time: None,
            elapsed: Duration::ZERO,
        }
    }

    /// Begin measuring. Has no effect if already running.
    pub fn start(&mut self) {
        if self.start_time.is_none() {
            self.start_time = Some(Instant::now());
        }
    }

    /// Stop measuring and fold the current span into the elapsed total.
    pub fn stop(&mut self) {
        if let Some(start) = self.start_time.take() {
            self.elapsed += start.elapsed();
        }
    }

    /// Clear the elapsed total and stop.
    pub fn reset(&mut self) {
        self.start_time = None;
        self.elapsed = Duration::ZERO;
    }

    /// Reset and immediately begin a fresh measurement.
    pub fn restart(&mut self) {
        self.elapsed = Duration::ZERO;
        self.start_time = Some(Instant::now());
    }

    /// Total measured time, including the in-progress span if running.
    pub fn elapsed(&self) -> Duration {
        match self.start_time {
            Some(start) => self.elapsed + start.elapsed(),
            None => self.elapsed,
        }
    }

    /// Total measured time in seconds.
    pub fn elapsed_secs(&self) -> f32 {
        self.elapsed().as_secs_f32()
    }

    /// Total measured time in milliseconds.
    pub fn elapsed_millis(&self) -> u128 {
        self.elapsed().as_millis()
    }

    /// Whether a measurement is currently in progress.
    pub fn is_running(&self) -> bool {
        self.start_time.is_some()
    }
}

impl Default for Stopwatch {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn clock_accumulates_updates() {
        let mut clock = Clock::new();
        assert_eq!(clock.frame_count(), 0);
        assert_eq!(clock.delta_time(), 0.0);

        thread::sleep(Duration::from_millis(5));
        clock.update();
        assert_eq!(clock.frame_count(), 1);
        assert!(clock.delta_time() > 0.0);
        assert!(clock.total_time() >= clock.delta_time());
    }

    #[test]
    fn stopwatch_tracks_spans() {
        let mut watch = Stopwatch::new();
        assert!(!watch.is_running());
        assert_eq!(watch.elapsed(), Duration::ZERO);

        watch.start();
        assert!(watch.is_running());
        thread::sleep(Duration::from_millis(5));
        watch.stop();

        let measured = watch.elapsed();
        assert!(measured >= Duration::from_millis(5));
        thread::sleep(Duration::from_millis(2));
        assert_eq!(watch.elapsed(), measured);

        watch.reset();
        assert_eq!(watch.elapsed(), Duration::ZERO);
        assert!(!watch.is_running());
    }

    #[test]
    fn restart_discards_previous_measurement() {
        let mut watch = Stopwatch::new();
        watch.start();
        thread::sleep(Duration::from_millis(5));
        watch.restart();
        assert!(watch.is_running());
        assert!(watch.elapsed() < Duration::from_millis(5));
    }
}
