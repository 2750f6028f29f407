//! Human readable status lines and grain debug snapshots for monitoring the engine.

use std::{
    collections::VecDeque,
    path::PathBuf,
    sync::Mutex,
    time::{Duration, Instant},
};

use crate::grain::GrainParameters;

// -------------------------------------------------------------------------------------------------

/// Append-only, bounded buffer of status lines. Once the line cap is exceeded, the oldest
/// lines are dropped. Every line also gets forwarded to the `log` facade.
pub struct EventLog {
    lines: Mutex<VecDeque<String>>,
    capacity: usize,
}

impl EventLog {
    pub const DEFAULT_CAPACITY: usize = 2000;

    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            lines: Mutex::new(VecDeque::with_capacity(capacity.min(Self::DEFAULT_CAPACITY))),
            capacity,
        }
    }

    /// Max number of lines the buffer keeps.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn info(&self, line: impl Into<String>) {
        self.push(log::Level::Info, line.into());
    }

    pub fn warn(&self, line: impl Into<String>) {
        self.push(log::Level::Warn, line.into());
    }

    pub fn error(&self, line: impl Into<String>) {
        self.push(log::Level::Error, line.into());
    }

    fn push(&self, level: log::Level, line: String) {
        log::log!(level, "{line}");
        let Ok(mut lines) = self.lines.lock() else {
            return;
        };
        while lines.len() >= self.capacity {
            lines.pop_front();
        }
        lines.push_back(line);
    }

    /// Copy of all currently buffered lines, oldest first.
    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .map(|lines| lines.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.lines.lock().map(|lines| lines.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.clear();
        }
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}

// -------------------------------------------------------------------------------------------------

/// Debug info of a scheduled grain: its parameters and the estimated wall-clock time it
/// reaches the output device.
#[derive(Debug, Clone)]
pub struct GrainDebugInfo {
    pub params: GrainParameters,
    /// Display path of the grain's source file.
    pub file_path: PathBuf,
    /// Native sample rate of the grain's source file.
    pub file_sample_rate: u32,
    pub expected_start: Option<Instant>,
    pub expected_end: Option<Instant>,
}

impl GrainDebugInfo {
    pub fn new(params: GrainParameters, file_path: PathBuf, file_sample_rate: u32) -> Self {
        Self {
            params,
            file_path,
            file_sample_rate,
            expected_start: None,
            expected_end: None,
        }
    }

    /// Estimated time the grain starts playing, relative to now.
    pub fn eta(&self, now: Instant) -> Option<Duration> {
        self.expected_start
            .map(|start| start.saturating_duration_since(now))
    }
}

// -------------------------------------------------------------------------------------------------

/// Tracks the last scheduled grain and the grain that presumably is audible right now.
///
/// The scheduler is the only writer. Readers may observe slightly stale, but never torn data.
#[derive(Default)]
pub struct GrainMonitor {
    last: Mutex<Option<GrainDebugInfo>>,
    current: Mutex<Option<GrainDebugInfo>>,
}

impl GrainMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the last scheduled grain info.
    pub fn set_last(&self, info: GrainDebugInfo) {
        if let Ok(mut last) = self.last.lock() {
            *last = Some(info);
        }
    }

    /// Set the estimated start and end time of the last scheduled grain.
    pub fn set_last_schedule(&self, start: Instant, end: Instant) {
        if let Ok(mut last) = self.last.lock() {
            if let Some(info) = last.as_mut() {
                info.expected_start = Some(start);
                info.expected_end = Some(end);
            }
        }
    }

    /// Most recently scheduled grain.
    pub fn last(&self) -> Option<GrainDebugInfo> {
        self.last.lock().ok().and_then(|last| last.clone())
    }

    /// Grain which presumably is playing at `now`. The last scheduled grain gets promoted to
    /// the current one once its estimated start time has elapsed.
    pub fn current(&self, now: Instant) -> Option<GrainDebugInfo> {
        let promoted = self.last.lock().ok().and_then(|last| {
            last.as_ref()
                .filter(|info| info.expected_start.is_some_and(|start| start <= now))
                .cloned()
        });
        let Ok(mut current) = self.current.lock() else {
            return None;
        };
        if promoted.is_some() {
            *current = promoted;
        }
        current.clone()
    }

    pub fn clear(&self) {
        if let Ok(mut last) = self.last.lock() {
            *last = None;
        }
        if let Ok(mut current) = self.current.lock() {
            *current = None;
        }
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_log_drops_oldest_lines() {
        let log = EventLog::new(3);
        for index in 0..5 {
            log.info(format!("line {index}"));
        }
        assert_eq!(log.len(), 3);
        assert_eq!(log.lines(), vec!["line 2", "line 3", "line 4"]);
        log.clear();
        assert!(log.is_empty());
    }

    #[test]
    fn monitor_promotes_started_grains() {
        let monitor = GrainMonitor::new();
        let now = Instant::now();
        assert!(monitor.current(now).is_none());

        let params = GrainParameters {
            file_index: 1,
            start_frame: 100,
            duration_frames: 4800,
            amplitude: 0.5,
            ..Default::default()
        };
        monitor.set_last(GrainDebugInfo::new(params, PathBuf::from("a.mp3"), 44100));
        // not scheduled yet
        assert!(monitor.current(now).is_none());

        monitor.set_last_schedule(
            now + Duration::from_millis(500),
            now + Duration::from_millis(600),
        );
        assert!(monitor.current(now).is_none());
        assert_eq!(
            monitor.last().unwrap().eta(now),
            Some(Duration::from_millis(500))
        );

        let later = now + Duration::from_secs(1);
        let current = monitor.current(later).unwrap();
        assert_eq!(current.params.file_index, 1);

        // current sticks until the next grain starts
        monitor.set_last(GrainDebugInfo::new(
            GrainParameters {
                file_index: 2,
                ..params
            },
            PathBuf::from("b.mp3"),
            48000,
        ));
        assert_eq!(monitor.current(later).unwrap().params.file_index, 1);
    }
}
