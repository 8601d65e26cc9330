use std::time::{Duration, Instant};

use crate::run::ToolRun;

/// How often the console output is re-parsed while the tool is running
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Rate-limits console output parsing.
///
/// A process launcher typically invokes its monitoring callback every second or so,
/// far more often than a full re-parse of the console output is worth.
#[derive(Debug, Clone)]
pub struct PollSchedule {
    interval: Duration,
    last_poll: Option<Instant>,
}

impl Default for PollSchedule {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL)
    }
}

impl PollSchedule {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_poll: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Whether a poll at `now` is due. The first poll is always due.
    pub fn is_due(&self, now: Instant) -> bool {
        match self.last_poll {
            Some(last) => now.saturating_duration_since(last) >= self.interval,
            None => true,
        }
    }

    pub fn mark(&mut self, now: Instant) {
        self.last_poll = Some(now);
    }

    /// Poll `run` if enough time has passed, returning whether it was polled
    pub fn poll_if_due(&mut self, run: &mut ToolRun, now: Instant) -> bool {
        if !self.is_due(now) {
            return false;
        }
        run.poll();
        self.mark(now);
        true
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::format::ConsoleFormat;

    #[test]
    fn test_schedule() {
        let mut schedule = PollSchedule::default();
        assert_eq!(schedule.interval(), Duration::from_secs(30));
        let start = Instant::now();
        assert!(schedule.is_due(start));
        schedule.mark(start);
        assert!(!schedule.is_due(start + Duration::from_secs(29)));
        assert!(schedule.is_due(start + Duration::from_secs(30)));
    }

    #[test]
    fn test_poll_if_due() {
        let tmpdir = tempfile::tempdir().unwrap();
        let format = ConsoleFormat::dia_nn_library();
        let mut run = ToolRun::in_directory(tmpdir.path(), format).unwrap();
        let mut schedule = PollSchedule::new(Duration::from_secs(5));
        let start = Instant::now();
        assert!(schedule.poll_if_due(&mut run, start));
        assert!(!schedule.poll_if_due(&mut run, start + Duration::from_secs(1)));
        assert!(schedule.poll_if_due(&mut run, start + Duration::from_secs(6)));
        assert_eq!(run.poll_count(), 2);
    }
}
