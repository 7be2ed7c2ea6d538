//! Connection check results

use std::fmt;

/// Outcome of [`PineconeDestination::check`](crate::PineconeDestination::check).
#[derive(Debug, Clone)]
pub struct CheckResult {
    pub success: bool,
    pub message: Option<String>,
    pub checks: Vec<CheckDetail>,
}

/// A single named check step.
#[derive(Debug, Clone)]
pub struct CheckDetail {
    pub name: String,
    pub passed: bool,
    pub message: Option<String>,
    pub duration_ms: Option<u64>,
}

impl CheckDetail {
    pub fn passed(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: true,
            message: None,
            duration_ms: None,
        }
    }

    pub fn failed(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: false,
            message: Some(message.into()),
            duration_ms: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }
}

impl CheckResult {
    pub fn builder() -> CheckResultBuilder {
        CheckResultBuilder::default()
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    pub fn failed_checks(&self) -> impl Iterator<Item = &CheckDetail> {
        self.checks.iter().filter(|c| !c.passed)
    }

    /// Look up a step by name.
    pub fn check(&self, name: &str) -> Option<&CheckDetail> {
        self.checks.iter().find(|c| c.name == name)
    }
}

impl fmt::Display for CheckResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.success, &self.message) {
            (true, _) => f.write_str("pinecone check: ok")?,
            (false, Some(msg)) => write!(f, "pinecone check: FAILED ({})", msg)?,
            (false, None) => f.write_str("pinecone check: FAILED")?,
        }
        for step in &self.checks {
            let mark = if step.passed { "ok" } else { "FAILED" };
            write!(f, "\n  [{}] {}", mark, step.name)?;
            match (&step.message, step.duration_ms) {
                (Some(msg), Some(ms)) => write!(f, ": {} ({}ms)", msg, ms)?,
                (Some(msg), None) => write!(f, ": {}", msg)?,
                (None, Some(ms)) => write!(f, " ({}ms)", ms)?,
                (None, None) => {}
            }
        }
        Ok(())
    }
}

/// Accumulates check steps; the result fails if any step failed.
#[derive(Debug, Default)]
pub struct CheckResultBuilder {
    checks: Vec<CheckDetail>,
}

impl CheckResultBuilder {
    pub fn check(mut self, detail: CheckDetail) -> Self {
        self.checks.push(detail);
        self
    }

    pub fn build(self) -> CheckResult {
        let failed: Vec<&str> = self
            .checks
            .iter()
            .filter(|c| !c.passed)
            .map(|c| c.name.as_str())
            .collect();
        let message = (!failed.is_empty()).then(|| format!("failed checks: {}", failed.join(", ")));
        CheckResult {
            success: failed.is_empty(),
            message,
            checks: self.checks,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_aggregates() {
        let result = CheckResult::builder()
            .check(CheckDetail::passed("config").with_duration_ms(1))
            .check(CheckDetail::failed("connectivity", "refused"))
            .build();
        assert!(!result.is_success());
        assert_eq!(result.message.as_deref(), Some("failed checks: connectivity"));
        assert_eq!(result.failed_checks().count(), 1);
        assert_eq!(result.check("config").and_then(|c| c.duration_ms), Some(1));

        let rendered = result.to_string();
        assert!(rendered.starts_with("pinecone check: FAILED (failed checks: connectivity)"));
        assert!(rendered.contains("[FAILED] connectivity: refused"));
        assert!(rendered.contains("[ok] config (1ms)"));
    }

    #[test]
    fn test_empty_builder_succeeds() {
        let result = CheckResult::builder().build();
        assert!(result.is_success());
        assert!(result.message.is_none());
        assert_eq!(
            CheckDetail::passed("x").with_message("ok").message.as_deref(),
            Some("ok")
        );
    }
}
