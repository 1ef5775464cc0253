//! Error reporting for the Lyra compiler and reader.
//!
//! The compiler reports problems through a [`Reporter`] sink rather than
//! failing on the first error: a malformed form is reported once, replaced
//! with a placeholder, and compilation continues with its siblings. The
//! sink enforces a maximum error count; when the bound is reached it
//! signals [`TooManyErrors`], which aborts the compilation unit. Every
//! reporting call site must tolerate that abort.

use std::cell::RefCell;
use std::fmt;

use lyra_ir::Coords;
use thiserror::Error;

/// Abort signal raised by a reporter whose error budget is exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("too many errors")]
pub struct TooManyErrors;

/// One recorded error.
#[derive(Debug, Clone)]
pub struct ErrorInfo {
    /// Where the error was detected, when known.
    pub coords: Option<Coords>,
    pub message: String,
    /// An underlying fault this error wraps, when there is one.
    pub cause: Option<String>,
}

impl ErrorInfo {
    pub fn new(coords: Option<Coords>, message: String, cause: Option<String>) -> ErrorInfo {
        ErrorInfo {
            coords,
            message,
            cause,
        }
    }
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(coords) = &self.coords {
            write!(f, "{coords}:")?;
        }
        f.write_str(&self.message)?;
        if let Some(cause) = &self.cause {
            write!(f, " caused by {cause}")?;
        }
        Ok(())
    }
}

/// A sink for compile-time errors.
pub trait Reporter {
    /// Record an error. Returns [`TooManyErrors`] when the sink's budget is
    /// exhausted; the caller must abandon the compilation unit.
    fn error(
        &self,
        coords: Option<&Coords>,
        cause: Option<&str>,
        message: &str,
    ) -> Result<(), TooManyErrors>;

    fn error_count(&self) -> usize;
}

/// A reporter that collects errors up to a fixed bound.
pub struct CollectingReporter {
    max_errors: usize,
    errors: RefCell<Vec<ErrorInfo>>,
}

impl CollectingReporter {
    /// `max_errors` must be positive.
    pub fn new(max_errors: usize) -> CollectingReporter {
        assert!(max_errors > 0, "max_errors must be positive");
        CollectingReporter {
            max_errors,
            errors: RefCell::new(Vec::new()),
        }
    }

    pub fn errors(&self) -> Vec<ErrorInfo> {
        self.errors.borrow().clone()
    }
}

impl Reporter for CollectingReporter {
    fn error(
        &self,
        coords: Option<&Coords>,
        cause: Option<&str>,
        message: &str,
    ) -> Result<(), TooManyErrors> {
        let mut errors = self.errors.borrow_mut();
        errors.push(ErrorInfo::new(
            coords.cloned(),
            message.to_owned(),
            cause.map(str::to_owned),
        ));
        if errors.len() >= self.max_errors {
            return Err(TooManyErrors);
        }
        Ok(())
    }

    fn error_count(&self) -> usize {
        self.errors.borrow().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_collects_until_bound() {
        let reporter = CollectingReporter::new(3);
        assert_eq!(reporter.error(None, None, "one"), Ok(()));
        assert_eq!(reporter.error(None, None, "two"), Ok(()));
        assert_eq!(reporter.error(None, None, "three"), Err(TooManyErrors));
        assert_eq!(reporter.error_count(), 3);
    }

    #[test]
    fn test_first_error_aborts_with_budget_one() {
        let reporter = CollectingReporter::new(1);
        assert_eq!(reporter.error(None, None, "boom"), Err(TooManyErrors));
    }

    #[test]
    fn test_formatting() {
        let coords = Coords::new(Some("f.scm".into()), 2, 5);
        let info = ErrorInfo::new(Some(coords), "bad form".into(), None);
        assert_eq!(info.to_string(), "f.scm(2).5:bad form");

        let info = ErrorInfo::new(None, "bad form".into(), Some("cause".into()));
        assert_eq!(info.to_string(), "bad form caused by cause");
    }
}
