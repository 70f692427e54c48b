//! Frame timing and rate limiting

use std::time::{Duration, Instant};

/// Frame timer measuring the interval between updates
pub struct Timer {
    last_frame: Instant,
    delta_time: f32,
    total_time: f32,
    frame_count: u64,
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

impl Timer {
    /// Create a new timer
    pub fn new() -> Self {
        Self {
            last_frame: Instant::now(),
            delta_time: 0.0,
            total_time: 0.0,
            frame_count: 0,
        }
    }

    /// Update the timer (should be called once per frame)
    pub fn update(&mut self) {
        let now = Instant::now();
        self.delta_time = now.duration_since(self.last_frame).as_secs_f32();
        self.total_time += self.delta_time;
        self.last_frame = now;
        self.frame_count += 1;
    }

    /// Time since the last frame in seconds
    pub fn delta_time(&self) -> f32 {
        self.delta_time
    }

    /// Total elapsed time since timer creation
    pub fn total_time(&self) -> f32 {
        self.total_time
    }

    /// Number of updates so far
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Average FPS since timer creation
    pub fn average_fps(&self) -> f32 {
        if self.total_time > 0.0 {
            self.frame_count as f32 / self.total_time
        } else {
            0.0
        }
    }
}

/// Sleeps away the rest of a frame when it finished faster than the target rate
pub struct FrameLimiter {
    min_frame_time: Option<Duration>,
    frame_start: Instant,
}

impl FrameLimiter {
    /// Limit to `target_fps` frames per second; zero disables limiting
    pub fn new(target_fps: u32) -> Self {
        Self {
            min_frame_time: (target_fps > 0).then(|| Duration::from_secs(1) / target_fps),
            frame_start: Instant::now(),
        }
    }

    /// Minimum frame duration, if limiting
    pub fn min_frame_time(&self) -> Option<Duration> {
        self.min_frame_time
    }

    /// How long to sleep after a frame that took `elapsed`
    pub fn remaining(&self, elapsed: Duration) -> Duration {
        self.min_frame_time
            .map_or(Duration::ZERO, |min| min.saturating_sub(elapsed))
    }

    /// Sleep out the remainder of the current frame and start the next one
    ///
    /// Returns the full frame duration including any sleep.
    pub fn wait(&mut self) -> Duration {
        let pause = self.remaining(self.frame_start.elapsed());
        if !pause.is_zero() {
            std::thread::sleep(pause);
        }

        let now = Instant::now();
        let frame_time = now.duration_since(self.frame_start);
        self.frame_start = now;
        frame_time
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uncapped_never_sleeps() {
        let limiter = FrameLimiter::new(0);
        assert_eq!(limiter.min_frame_time(), None);
        assert_eq!(limiter.remaining(Duration::ZERO), Duration::ZERO);
    }

    #[test]
    fn test_remaining_frame_time() {
        let limiter = FrameLimiter::new(50);
        assert_eq!(limiter.min_frame_time(), Some(Duration::from_millis(20)));
        assert_eq!(limiter.remaining(Duration::from_millis(5)), Duration::from_millis(15));
        assert_eq!(limiter.remaining(Duration::from_millis(30)), Duration::ZERO);
    }

    #[test]
    fn test_wait_enforces_minimum_frame_time() {
        let mut limiter = FrameLimiter::new(100);
        let frame = limiter.wait();
        assert!(frame >= Duration::from_millis(10));
    }

    #[test]
    fn test_timer_counts_frames() {
        let mut timer = Timer::new();
        timer.update();
        timer.update();
        assert_eq!(timer.frame_count(), 2);
        assert!(timer.total_time() >= timer.delta_time());
    }
}
