use std::io::{self, Write};
use std::time::Instant;

/// Progress display on stderr, in the style of C git's progress.c.
///
/// Displays updates like:
/// - `Building reversed graph: 1234` (no total)
/// - `Pushing bitmaps:  50% (42/84)` (with total)
pub struct Progress {
    title: String,
    total: Option<u64>,
    current: u64,
    start_time: Instant,
    last_update: Instant,
    /// Minimum delay between display updates in milliseconds.
    delay_ms: u64,
    started: bool,
    /// Last percentage displayed (to avoid redundant updates).
    last_percent: Option<u32>,
}

impl Progress {
    /// Create a new progress display with a title and optional total count.
    pub fn new(title: &str, total: Option<u64>) -> Self {
        let now = Instant::now();
        Self {
            title: title.to_string(),
            total,
            current: 0,
            start_time: now,
            last_update: now,
            delay_ms: 100,
            started: false,
            last_percent: None,
        }
    }

    /// Update the progress count.
    pub fn update(&mut self, count: u64) {
        self.current = count;

        let now = Instant::now();
        let since_last = now.duration_since(self.last_update).as_millis() as u64;

        // Rate-limit updates, but always display the final count.
        if self.started && since_last < self.delay_ms {
            match self.total {
                Some(total) if count >= total => {}
                _ => return,
            }
        }

        if let Some(total) = self.total {
            if total > 0 {
                let percent = ((count as f64 / total as f64) * 100.0) as u32;
                if self.started && self.last_percent == Some(percent) && count < total {
                    return;
                }
                self.last_percent = Some(percent);
            }
        }

        self.started = true;
        self.last_update = now;
        self.display();
    }

    /// Increment the count by one.
    pub fn tick(&mut self) {
        self.update(self.current + 1);
    }

    fn display(&self) {
        let mut stderr = io::stderr();
        let line = match self.total {
            Some(total) if total > 0 => {
                let percent = (self.current as f64 / total as f64) * 100.0;
                format!("\r{}: {:3.0}% ({}/{})", self.title, percent, self.current, total)
            }
            _ => format!("\r{}: {}", self.title, self.current),
        };
        let _ = write!(stderr, "{line}");
        let _ = stderr.flush();
    }

    /// Finish and terminate the progress line with ", done." on stderr.
    pub fn finish(self) {
        let mut stderr = io::stderr();
        if self.started {
            let elapsed = self.start_time.elapsed();
            let elapsed_str = if elapsed.as_secs() > 0 {
                format!(", {:.2}s", elapsed.as_secs_f64())
            } else {
                String::new()
            };
            match self.total {
                Some(total) if total > 0 => {
                    let _ = writeln!(
                        stderr,
                        "\r{}: 100% ({}/{}){}, done.",
                        self.title, total, total, elapsed_str
                    );
                }
                _ => {
                    let _ = writeln!(
                        stderr,
                        "\r{}: {}{}, done.",
                        self.title, self.current, elapsed_str
                    );
                }
            }
            let _ = stderr.flush();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_with_total() {
        let mut p = Progress::new("Counting objects", Some(100));
        p.delay_ms = 0;
        p.update(50);
        assert_eq!(p.current, 50);
        assert!(p.started);
    }

    #[test]
    fn progress_without_total() {
        let mut p = Progress::new("Scanning", None);
        p.delay_ms = 0;
        p.update(42);
        assert_eq!(p.current, 42);
        assert!(p.started);
    }

    #[test]
    fn progress_tick() {
        let mut p = Progress::new("Processing", Some(10));
        p.delay_ms = 0;
        p.tick();
        p.tick();
        assert_eq!(p.current, 2);
    }

    #[test]
    fn finish_does_not_panic() {
        let mut p = Progress::new("Counting", Some(100));
        p.delay_ms = 0;
        p.update(100);
        p.finish();
    }
}
