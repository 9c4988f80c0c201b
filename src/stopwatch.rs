use std::time::{Duration, Instant};

/// Wall-clock timer for benchmark runs.
///
/// [`Stopwatch::elapsed`] can be read at any time: while running it reports the
/// time so far, after [`Stopwatch::stop`] it reports the finished interval, and
/// before the first [`Stopwatch::start`] it reports zero.
#[derive(Debug, Clone, Copy, Default)]
pub struct Stopwatch {
    started_at: Option<Instant>,
    stopped_at: Option<Instant>,
}

impl Stopwatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a stopwatch that is already running.
    pub fn started() -> Self {
        let mut watch = Self::new();
        watch.start();
        watch
    }

    /// Begins a new interval. Does nothing if already running.
    pub fn start(&mut self) {
        if !self.is_running() {
            self.started_at = Some(Instant::now());
            self.stopped_at = None;
        }
    }

    /// Ends the current interval. Does nothing if not running.
    pub fn stop(&mut self) {
        if self.is_running() {
            self.stopped_at = Some(Instant::now());
        }
    }

    pub fn reset(&mut self) {
        self.started_at = None;
        self.stopped_at = None;
    }

    pub fn is_running(&self) -> bool {
        self.started_at.is_some() && self.stopped_at.is_none()
    }

    pub fn elapsed_duration(&self) -> Duration {
        match (self.started_at, self.stopped_at) {
            (Some(start), Some(stop)) => stop.duration_since(start),
            (Some(start), None) => start.elapsed(),
            (None, _) => Duration::ZERO,
        }
    }

    /// Elapsed time in seconds.
    pub fn elapsed(&self) -> f64 {
        self.elapsed_duration().as_secs_f64()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    const NAP: Duration = Duration::from_millis(5);

    #[test]
    fn idle_stopwatch_reads_zero() {
        let mut watch = Stopwatch::new();
        assert!(!watch.is_running());
        assert_eq!(watch.elapsed(), 0.0);

        watch.stop();
        assert_eq!(watch.elapsed(), 0.0);
    }

    #[test]
    fn elapsed_grows_while_running() {
        let watch = Stopwatch::started();
        assert!(watch.is_running());
        let first = watch.elapsed();
        sleep(NAP);
        let second = watch.elapsed();
        assert!(second >= first);
        assert!(second >= NAP.as_secs_f64());
    }

    #[test]
    fn stop_freezes_the_interval() {
        let mut watch = Stopwatch::started();
        sleep(NAP);
        watch.stop();
        let frozen = watch.elapsed();
        sleep(NAP);
        assert_eq!(watch.elapsed(), frozen);
        assert!(frozen >= NAP.as_secs_f64());
    }

    #[test]
    fn start_while_running_keeps_the_original_start() {
        let mut watch = Stopwatch::started();
        sleep(NAP);
        watch.start();
        assert!(watch.elapsed() >= NAP.as_secs_f64());
    }

    #[test]
    fn restart_after_stop_begins_a_new_interval() {
        let mut watch = Stopwatch::started();
        sleep(2 * NAP);
        watch.stop();
        let long = watch.elapsed();

        watch.start();
        watch.stop();
        assert!(watch.elapsed() < long);
    }

    #[test]
    fn reset_returns_to_idle() {
        let mut watch = Stopwatch::started();
        sleep(NAP);
        watch.reset();
        assert!(!watch.is_running());
        assert_eq!(watch.elapsed(), 0.0);
    }
}
