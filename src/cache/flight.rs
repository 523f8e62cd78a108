use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::errors::CacheError;
use crate::generation::Generation;

pub(crate) type FlightResult = Result<Arc<Generation>, CacheError>;

/// Rendezvous between the caller building a fingerprint and the callers
/// waiting for it.
#[derive(Debug)]
pub(crate) struct Flight {
    outcome: Mutex<Option<FlightResult>>,
    resolved: Condvar,
}

impl Flight {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            outcome: Mutex::new(None),
            resolved: Condvar::new(),
        })
    }

    /// First resolution wins.
    pub(crate) fn resolve(&self, result: FlightResult) {
        let mut outcome = self.outcome.lock();
        if outcome.is_some() {
            return;
        }
        *outcome = Some(result);
        self.resolved.notify_all();
    }

    /// Block until resolved; `None` when `timeout` elapses first.
    pub(crate) fn wait(&self, timeout: Option<Duration>) -> Option<FlightResult> {
        let mut outcome = self.outcome.lock();
        match timeout {
            None => {
                while outcome.is_none() {
                    self.resolved.wait(&mut outcome);
                }
            }
            Some(limit) => {
                let deadline = Instant::now() + limit;
                while outcome.is_none() {
                    if self.resolved.wait_until(&mut outcome, deadline).timed_out() {
                        break;
                    }
                }
            }
        }
        outcome.clone()
    }
}
