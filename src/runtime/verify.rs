//! Verification mode: run the original next to the specialization and keep
//! a bounded record of disagreements.

use std::collections::VecDeque;

use fastpath_ast::Value;
use parking_lot::Mutex;

use crate::errors::{ExecError, VerificationMismatchError};

const DEFAULT_CAPACITY: usize = 64;

/// Both routines must return the same value, or fail with the same error.
/// Floats compare bitwise.
pub fn outcomes_agree(specialized: &Result<Value, ExecError>, original: &Result<Value, ExecError>) -> bool {
    specialized == original
}

/// Most recent mismatches of one runner, oldest dropped first.
#[derive(Debug)]
pub struct MismatchLog {
    capacity: usize,
    inner: Mutex<LogInner>,
}

#[derive(Debug, Default)]
struct LogInner {
    recent: VecDeque<VerificationMismatchError>,
    total: u64,
}

impl Default for MismatchLog {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl MismatchLog {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(LogInner::default()),
        }
    }

    pub fn record(&self, mismatch: VerificationMismatchError) {
        let mut inner = self.inner.lock();
        inner.total += 1;
        if inner.recent.len() == self.capacity {
            inner.recent.pop_front();
        }
        inner.recent.push_back(mismatch);
    }

    /// Drain the retained mismatches, oldest first.
    pub fn take(&self) -> Vec<VerificationMismatchError> {
        self.inner.lock().recent.drain(..).collect()
    }

    pub fn recent(&self) -> Vec<VerificationMismatchError> {
        self.inner.lock().recent.iter().cloned().collect()
    }

    /// Mismatches seen since creation, including dropped and drained ones.
    pub fn total(&self) -> u64 {
        self.inner.lock().total
    }
}

#[cfg(test)]
mod tests {
    use crate::cache::Fingerprint;
    use crate::generation::GenerationId;

    use super::*;

    fn mismatch(arg: i64) -> VerificationMismatchError {
        VerificationMismatchError {
            routine: "f".into(),
            generation: GenerationId(1),
            fingerprint: Fingerprint::constant(),
            args: vec![Value::Int(arg)],
            specialized: Ok(Value::Int(arg)),
            original: Ok(Value::Int(arg + 1)),
        }
    }

    #[test]
    fn errors_must_match_too() {
        assert!(outcomes_agree(&Ok(Value::Int(1)), &Ok(Value::Int(1))));
        assert!(outcomes_agree(&Err(ExecError::DivisionByZero), &Err(ExecError::DivisionByZero)));
        assert!(!outcomes_agree(&Ok(Value::Int(1)), &Err(ExecError::DivisionByZero)));
        assert!(!outcomes_agree(&Ok(Value::Float(0.0)), &Ok(Value::Float(-0.0))));
    }

    #[test]
    fn log_keeps_the_newest_entries() {
        let log = MismatchLog::with_capacity(2);
        for arg in 0..5 {
            log.record(mismatch(arg));
        }
        assert_eq!(log.total(), 5);
        let kept: Vec<_> = log.take().into_iter().map(|m| m.args[0].clone()).collect();
        assert_eq!(kept, vec![Value::Int(3), Value::Int(4)]);
        assert!(log.recent().is_empty());
        assert_eq!(log.total(), 5);
    }
}
