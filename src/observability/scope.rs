//! Begin/complete logging around a unit of work
//!
//! - `{name}_BEGIN` on creation
//! - `{name}_COMPLETE` with elapsed time on `complete`
//! - `{name}_FAILED` on `fail`
//! - `{name}_INCOMPLETE` when dropped without either

use std::cell::Cell;
use std::time::Instant;

use super::logger::{Logger, Severity};

pub struct ObservationScope<'a> {
    logger: &'a Logger,
    name: &'a str,
    completed: Cell<bool>,
    timer: Timer,
}

impl<'a> ObservationScope<'a> {
    pub fn new(logger: &'a Logger, name: &'a str, fields: &[(&str, &str)]) -> Self {
        logger.trace(&format!("{}_BEGIN", name), fields);
        Self {
            logger,
            name,
            completed: Cell::new(false),
            timer: Timer::new(),
        }
    }

    pub fn complete(self, fields: &[(&str, &str)]) {
        self.completed.set(true);
        let elapsed = self.timer.elapsed_ms();
        let mut all: Vec<(&str, &str)> = fields.to_vec();
        all.push(("elapsed_ms", elapsed.as_str()));
        self.logger.info(&format!("{}_COMPLETE", self.name), &all);
    }

    pub fn fail(self, reason: &str) {
        self.completed.set(true);
        self.logger
            .error(&format!("{}_FAILED", self.name), &[("reason", reason)]);
    }

    pub fn is_completed(&self) -> bool {
        self.completed.get()
    }
}

impl Drop for ObservationScope<'_> {
    fn drop(&mut self) {
        if !self.completed.get() {
            self.logger.log(
                Severity::Warn,
                &format!("{}_INCOMPLETE", self.name),
                &[("reason", "scope dropped without completion")],
            );
        }
    }
}

/// Elapsed-time helper for log fields
#[derive(Debug, Clone, Copy)]
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed_ms(&self) -> String {
        self.start.elapsed().as_millis().to_string()
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_complete_marks_completed() {
        let logger = Logger::new(Severity::Fatal);
        let scope = ObservationScope::new(&logger, "CREATING_SETS", &[]);
        assert!(!scope.is_completed());
        scope.complete(&[("sets", "1")]);
    }

    #[test]
    fn test_timer_elapsed_is_numeric() {
        let timer = Timer::new();
        assert!(timer.elapsed_ms().parse::<u128>().is_ok());
    }
}
