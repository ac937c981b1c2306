//! Rate limiting for per-event warnings.

use std::fmt;

/// Emits at most `budget` warnings, then counts the rest silently.
///
/// Long event streams can produce the same anomaly for every event; the
/// limiter keeps the log readable while still reporting the total.
#[derive(Debug, Clone)]
pub struct WarningLimiter {
    budget: usize,
    emitted: usize,
    suppressed: usize,
}

impl Default for WarningLimiter {
    fn default() -> Self {
        Self::new(10)
    }
}

impl WarningLimiter {
    /// Creates a limiter allowing `budget` warnings.
    #[must_use]
    pub fn new(budget: usize) -> Self {
        Self {
            budget,
            emitted: 0,
            suppressed: 0,
        }
    }

    /// Logs a warning if budget remains.
    pub fn warn(&mut self, args: fmt::Arguments<'_>) {
        if self.emitted < self.budget {
            log::warn!("{args}");
            self.emitted += 1;
            if self.emitted == self.budget {
                log::warn!(
                    "warning budget of {} reached, suppressing further event warnings",
                    self.budget
                );
            }
        } else {
            self.suppressed += 1;
        }
    }

    /// Warnings actually logged.
    #[must_use]
    pub fn emitted(&self) -> usize {
        self.emitted
    }

    /// Warnings swallowed after the budget ran out.
    #[must_use]
    pub fn suppressed(&self) -> usize {
        self.suppressed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_budget_is_enforced() {
        let mut limiter = WarningLimiter::new(3);
        for i in 0..10 {
            limiter.warn(format_args!("event {i} skipped"));
        }
        assert_eq!(limiter.emitted(), 3);
        assert_eq!(limiter.suppressed(), 7);
    }

    #[test]
    fn test_zero_budget_suppresses_everything() {
        let mut limiter = WarningLimiter::new(0);
        limiter.warn(format_args!("hidden"));
        assert_eq!(limiter.emitted(), 0);
        assert_eq!(limiter.suppressed(), 1);
    }
}
