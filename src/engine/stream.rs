//! Multiplexed output streaming.
//!
//! Concurrent tasks send tagged line events into one channel; a single
//! consumer owns the render target and the per-profile color map, so
//! interleaved producers can never corrupt a line. Events from one profile
//! arrive in emission order; across profiles the interleaving is whatever
//! the scheduler produced.

use chrono::{DateTime, Local};
use colored::{Color, Colorize};
use std::collections::HashMap;
use std::io::Write;
use std::sync::mpsc::Receiver;
use std::thread::{self, JoinHandle};

/// One line of output from a running task.
#[derive(Debug, Clone)]
pub struct StreamEvent {
    pub profile: String,
    pub line: String,
    pub is_error: bool,
    pub timestamp: DateTime<Local>,
}

impl StreamEvent {
    pub fn stdout(profile: impl Into<String>, line: impl Into<String>) -> Self {
        Self {
            profile: profile.into(),
            line: line.into(),
            is_error: false,
            timestamp: Local::now(),
        }
    }

    pub fn stderr(profile: impl Into<String>, line: impl Into<String>) -> Self {
        Self {
            profile: profile.into(),
            line: line.into(),
            is_error: true,
            timestamp: Local::now(),
        }
    }
}

const PALETTE: [Color; 7] = [
    Color::Cyan,
    Color::Yellow,
    Color::Green,
    Color::Magenta,
    Color::Blue,
    Color::Red,
    Color::White,
];

/// Single-consumer renderer for stream events.
///
/// Owns its color assignments outright; there is no shared color state to
/// lock because only this consumer ever touches it.
pub struct OutputAggregator<W: Write> {
    writer: W,
    colors: HashMap<String, Color>,
}

impl<W: Write> OutputAggregator<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            colors: HashMap::new(),
        }
    }

    /// Render events until every sender has hung up, then hand the writer
    /// back for inspection.
    pub fn consume(mut self, events: &Receiver<StreamEvent>) -> W {
        for event in events {
            self.render(&event);
        }
        self.writer
    }

    fn render(&mut self, event: &StreamEvent) {
        let timestamp = event.timestamp.format("%H:%M:%S%.3f");
        let color = self.color_for(&event.profile);
        let label = event.profile.color(color);

        for line in event.line.lines() {
            let line = line.trim_end();
            if line.trim().is_empty() {
                continue;
            }
            let rendered = if event.is_error {
                format!("[{timestamp}] {label} {}: {line}", "ERROR".red())
            } else if is_step_message(line) {
                format!("[{timestamp}] {label}: {}", line.color(color))
            } else {
                format!("[{timestamp}] {label}: {line}")
            };
            let _ = writeln!(self.writer, "{rendered}");
        }
    }

    fn color_for(&mut self, profile: &str) -> Color {
        if let Some(color) = self.colors.get(profile) {
            return *color;
        }
        let color = PALETTE[self.colors.len() % PALETTE.len()];
        self.colors.insert(profile.to_string(), color);
        color
    }
}

/// Orchestrator status lines get the profile's color; raw tool output is
/// left uncolored.
fn is_step_message(line: &str) -> bool {
    line.starts_with("Starting execution")
        || line.starts_with("INIT:")
        || line.starts_with("Executing")
        || line.contains("Execution completed")
}

/// Spawn the display consumer on its own thread. Joining the handle is the
/// done signal: it resolves once the event source is exhausted.
pub fn spawn(events: Receiver<StreamEvent>) -> JoinHandle<()> {
    thread::spawn(move || {
        OutputAggregator::new(std::io::stdout()).consume(&events);
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    fn rendered(events: Vec<StreamEvent>) -> String {
        colored::control::set_override(false);
        let (tx, rx) = mpsc::channel();
        for event in events {
            tx.send(event).unwrap();
        }
        drop(tx);
        let buffer = OutputAggregator::new(Vec::new()).consume(&rx);
        String::from_utf8(buffer).unwrap()
    }

    #[test]
    fn lines_are_prefixed_with_timestamp_and_profile() {
        let output = rendered(vec![StreamEvent::stdout("dev", "Plan: 1 to add")]);
        assert_eq!(output.lines().count(), 1);
        let line = output.lines().next().unwrap();
        assert!(line.starts_with('['), "missing timestamp prefix: {line}");
        assert!(line.contains("] dev: Plan: 1 to add"));
    }

    #[test]
    fn error_events_get_an_error_marker() {
        let output = rendered(vec![StreamEvent::stderr("prod", "access denied")]);
        assert!(output.contains("prod ERROR: access denied"));
    }

    #[test]
    fn embedded_newlines_split_and_blanks_are_suppressed() {
        let output = rendered(vec![StreamEvent::stdout("dev", "one\n\n   \ntwo\n")]);
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("one"));
        assert!(lines[1].ends_with("two"));
    }

    #[test]
    fn per_profile_event_order_is_preserved() {
        let output = rendered(vec![
            StreamEvent::stdout("dev", "first"),
            StreamEvent::stderr("prod", "interleaved"),
            StreamEvent::stdout("dev", "second"),
        ]);
        let first = output.find("first").unwrap();
        let second = output.find("second").unwrap();
        assert!(first < second);
    }

    #[test]
    fn colors_are_stable_per_profile() {
        let mut aggregator = OutputAggregator::new(Vec::new());
        let a = aggregator.color_for("dev");
        let b = aggregator.color_for("prod");
        assert_ne!(a, b);
        assert_eq!(aggregator.color_for("dev"), a);
    }
}
