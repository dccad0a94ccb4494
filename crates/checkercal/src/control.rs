//! Abstract user signals and where they come from.

use std::collections::VecDeque;
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// What the user asked for during one loop iteration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Signal {
    #[default]
    None,
    /// Commit the current detection.
    Confirm,
    /// Calibrate now.
    Calibrate,
    Quit,
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Signal::None => "none",
            Signal::Confirm => "confirm",
            Signal::Calibrate => "calibrate",
            Signal::Quit => "quit",
        };
        f.write_str(s)
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown signal '{0}' (expected none|confirm|calibrate|quit)")]
pub struct ParseSignalError(pub String);

impl FromStr for Signal {
    type Err = ParseSignalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "none" | "-" => Ok(Signal::None),
            "confirm" | "commit" | "space" => Ok(Signal::Confirm),
            "calibrate" | "c" => Ok(Signal::Calibrate),
            "quit" | "q" | "esc" => Ok(Signal::Quit),
            other => Err(ParseSignalError(other.to_string())),
        }
    }
}

/// Polled once per frame, after the frame was shown.
pub trait SignalSource {
    fn poll_signal(&mut self) -> Signal;
}

/// Commits every frame; used for batch replays.
#[derive(Clone, Copy, Debug, Default)]
pub struct AutoConfirm;

impl SignalSource for AutoConfirm {
    fn poll_signal(&mut self) -> Signal {
        Signal::Confirm
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ScriptError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("line {line}: {source}")]
    Parse {
        line: usize,
        #[source]
        source: ParseSignalError,
    },
}

/// Pre-recorded signals, one per frame; `None` once exhausted.
#[derive(Clone, Debug, Default)]
pub struct ScriptedSignals {
    queue: VecDeque<Signal>,
}

impl ScriptedSignals {
    pub fn new(signals: impl IntoIterator<Item = Signal>) -> Self {
        Self {
            queue: signals.into_iter().collect(),
        }
    }

    /// One signal per line; `#` starts a comment. Blank lines are `none`,
    /// comment-only lines are skipped.
    pub fn parse(text: &str) -> Result<Self, ScriptError> {
        let mut queue = VecDeque::new();
        for (i, raw) in text.lines().enumerate() {
            let line = raw.split('#').next().unwrap_or_default();
            if line.trim().is_empty() && raw.trim_start().starts_with('#') {
                continue;
            }
            let signal = line
                .parse()
                .map_err(|source| ScriptError::Parse { line: i + 1, source })?;
            queue.push_back(signal);
        }
        Ok(Self { queue })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ScriptError> {
        let raw = fs::read_to_string(path)?;
        Self::parse(&raw)
    }

    pub fn remaining(&self) -> usize {
        self.queue.len()
    }
}

impl SignalSource for ScriptedSignals {
    fn poll_signal(&mut self) -> Signal {
        self.queue.pop_front().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn script_parses_one_signal_per_line() {
        let mut s =
            ScriptedSignals::parse("none\nconfirm\n# skipped\n\ncalibrate # go\nquit\n").unwrap();
        assert_eq!(s.remaining(), 5);
        let got: Vec<Signal> = (0..6).map(|_| s.poll_signal()).collect();
        assert_eq!(
            got,
            vec![
                Signal::None,
                Signal::Confirm,
                Signal::None,
                Signal::Calibrate,
                Signal::Quit,
                Signal::None,
            ]
        );
    }

    #[test]
    fn bad_line_reports_its_number() {
        let err = ScriptedSignals::parse("confirm\njump\n").unwrap_err();
        assert!(matches!(err, ScriptError::Parse { line: 2, .. }));
    }

    #[test]
    fn signal_round_trips_through_display() {
        for s in [Signal::None, Signal::Confirm, Signal::Calibrate, Signal::Quit] {
            assert_eq!(s.to_string().parse::<Signal>(), Ok(s));
        }
    }
}
