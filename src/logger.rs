//! Verbosity-gated training output.
//!
//! Learners carry a [`Verbosity`] in their params and create a [`TrainingLogger`]
//! at the start of `fit`. Everything goes to stderr so that the demo binary can
//! keep stdout for results.

use std::fmt::Arguments;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum Verbosity {
    #[default]
    Silent,
    Warning,
    Info,
    Debug,
}

#[derive(Debug, Clone, Copy)]
pub struct TrainingLogger {
    verbosity: Verbosity,
}

impl TrainingLogger {
    pub const fn new(verbosity: Verbosity) -> Self {
        Self { verbosity }
    }

    pub fn enabled(&self, level: Verbosity) -> bool {
        level != Verbosity::Silent && self.verbosity >= level
    }

    pub fn warn(&self, args: Arguments<'_>) {
        self.emit(Verbosity::Warning, "warn", args);
    }

    pub fn info(&self, args: Arguments<'_>) {
        self.emit(Verbosity::Info, "info", args);
    }

    pub fn debug(&self, args: Arguments<'_>) {
        self.emit(Verbosity::Debug, "debug", args);
    }

    /// Reports the training error after an ensemble round.
    pub fn log_round(&self, round: usize, err: f64) {
        self.emit(
            Verbosity::Info,
            "info",
            format_args!("round {round:>4}: train mse {err:.6}"),
        );
    }

    fn emit(&self, level: Verbosity, tag: &str, args: Arguments<'_>) {
        if self.enabled(level) {
            eprintln!("[tabletree] {tag}: {args}");
        }
    }
}
