//! Accumulated, non-fatal error reports
//!
//! Startup checks (device suitability, instance requirements) collect their
//! problems here instead of failing immediately, so every issue is reported
//! at once and the caller decides what is fatal.

/// Ordered list of human-readable problems found by a check
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SuccessStatus {
    errors: Vec<String>,
}

impl SuccessStatus {
    /// Create an empty (successful) status
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a problem
    pub fn add_error(&mut self, error: impl Into<String>) {
        self.errors.push(error.into());
    }

    /// Append every problem recorded by another check
    pub fn merge(&mut self, other: SuccessStatus) {
        self.errors.extend(other.errors);
    }

    /// True when no problem was recorded
    pub fn is_successful(&self) -> bool {
        self.errors.is_empty()
    }

    /// Recorded problems, in insertion order
    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    /// Write the report to the log
    pub fn log_errors(&self) {
        if self.errors.is_empty() {
            log::info!("No errors.");
            return;
        }
        log::warn!("Errors ({}):", self.errors.len());
        for error in &self.errors {
            log::warn!("* {}", error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_status_is_successful() {
        let status = SuccessStatus::new();
        assert!(status.is_successful());
        assert!(status.errors().is_empty());
    }

    #[test]
    fn test_merge_keeps_order() {
        let mut first = SuccessStatus::new();
        first.add_error("a");
        let mut second = SuccessStatus::new();
        second.add_error("b");
        second.add_error("c");

        first.merge(second);

        assert!(!first.is_successful());
        assert_eq!(first.errors(), &["a", "b", "c"]);
    }
}
