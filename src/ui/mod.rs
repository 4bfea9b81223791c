//! Progress reporting for the acquisition pipeline
//!
//! Provides a small API for displaying pipeline state:
//! - Current phase (Checking, Downloading, Decompressing, Extracting, Copying)
//! - Progress (current/total with a label)
//! - Activity log lines

use indicatif::{ProgressBar, ProgressStyle};

/// Pipeline phases
#[derive(Debug, Clone, PartialEq)]
pub enum Phase {
    Checking,
    Downloading,
    Decompressing,
    Extracting,
    Copying,
    Complete,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Checking => write!(f, "Checking for existing binaries"),
            Phase::Downloading => write!(f, "Downloading binaries"),
            Phase::Decompressing => write!(f, "Decompressing archive"),
            Phase::Extracting => write!(f, "Extracting files"),
            Phase::Copying => write!(f, "Copying binaries"),
            Phase::Complete => write!(f, "Complete"),
        }
    }
}

/// Trait for UI implementations - allows both console and silent/test modes
pub trait Ui {
    fn set_phase(&mut self, phase: Phase);
    fn set_info(&mut self, info: impl Into<String>);
    fn set_progress(&mut self, current: u64, total: u64, label: impl Into<String>);
    fn clear_progress(&mut self);
    fn log(&mut self, message: impl Into<String>);
}

/// Line-oriented console output with an indicatif progress bar
#[derive(Default)]
pub struct ConsoleUi {
    bar: Option<ProgressBar>,
}

impl ConsoleUi {
    pub fn new() -> Self {
        Self { bar: None }
    }

    fn bar(&mut self, total: u64) -> &ProgressBar {
        self.bar.get_or_insert_with(|| {
            if total > 0 {
                let bar = ProgressBar::new(total);
                bar.set_style(
                    ProgressStyle::default_bar()
                        .template("{msg} [{bar:40.cyan/blue}] {percent}%")
                        .unwrap_or_else(|_| ProgressStyle::default_bar())
                        .progress_chars("=>-"),
                );
                bar
            } else {
                ProgressBar::new_spinner()
            }
        })
    }

    fn println(&self, line: &str) {
        match &self.bar {
            Some(bar) => bar.println(line),
            None => println!("{}", line),
        }
    }
}

impl Ui for ConsoleUi {
    fn set_phase(&mut self, phase: Phase) {
        self.println(&format!("{}...", phase));
    }

    fn set_info(&mut self, info: impl Into<String>) {
        self.println(&info.into());
    }

    fn set_progress(&mut self, current: u64, total: u64, label: impl Into<String>) {
        let bar = self.bar(total);
        if total > 0 {
            bar.set_length(total);
        }
        bar.set_position(current);
        bar.set_message(label.into());
    }

    fn clear_progress(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
    }

    fn log(&mut self, message: impl Into<String>) {
        self.println(&format!("  {}", message.into()));
    }
}

/// Silent UI implementation for testing and non-interactive use
#[derive(Default)]
pub struct SilentUi;

impl SilentUi {
    pub fn new() -> Self {
        Self
    }
}

impl Ui for SilentUi {
    fn set_phase(&mut self, _phase: Phase) {}
    fn set_info(&mut self, _info: impl Into<String>) {}
    fn set_progress(&mut self, _current: u64, _total: u64, _label: impl Into<String>) {}
    fn clear_progress(&mut self) {}
    fn log(&mut self, _message: impl Into<String>) {}
}

/// Records phases for assertions in tests
#[cfg(test)]
#[derive(Default, Debug)]
pub(crate) struct RecordingUi {
    pub phases: Vec<Phase>,
    pub messages: Vec<String>,
}

#[cfg(test)]
impl Ui for RecordingUi {
    fn set_phase(&mut self, phase: Phase) {
        self.phases.push(phase);
    }

    fn set_info(&mut self, info: impl Into<String>) {
        self.messages.push(info.into());
    }

    fn set_progress(&mut self, _current: u64, _total: u64, _label: impl Into<String>) {}

    fn clear_progress(&mut self) {}

    fn log(&mut self, message: impl Into<String>) {
        self.messages.push(message.into());
    }
}
