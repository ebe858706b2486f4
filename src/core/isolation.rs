//! Running one unit of work on its own thread with a hard deadline.
//!
//! The caller stops waiting when the deadline passes and the worker thread is
//! detached. A thread cannot be force-stopped, so a geist stuck in a tight
//! loop keeps its thread busy until the process exits; only process-level
//! isolation would reclaim it. Its eventual result is dropped.

use crossbeam_channel::{bounded, RecvTimeoutError};
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::thread;
use std::time::{Duration, Instant};

/// How an isolated run ended.
#[derive(Debug)]
pub enum Isolated<T> {
    Returned(T),
    /// The work panicked; holds the panic message.
    Panicked(String),
    TimedOut,
}

/// Result of an isolated run plus how long the caller waited.
#[derive(Debug)]
pub struct IsolatedRun<T> {
    pub result: Isolated<T>,
    pub elapsed: Duration,
}

/// Run `work` on a fresh thread and wait at most `timeout` for it.
pub fn run_isolated<T, F>(name: &str, timeout: Duration, work: F) -> IsolatedRun<T>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let started = Instant::now();
    let (tx, rx) = bounded(1);

    let spawned = thread::Builder::new()
        .name(format!("geist-{}", name))
        .spawn(move || {
            let outcome = catch_unwind(AssertUnwindSafe(work));
            // The receiver is gone if the caller already timed out.
            let _ = tx.send(outcome);
        });

    let result = match spawned {
        Err(e) => Isolated::Panicked(format!("failed to spawn worker thread: {}", e)),
        Ok(_handle) => match rx.recv_timeout(timeout) {
            Ok(Ok(value)) => Isolated::Returned(value),
            Ok(Err(payload)) => Isolated::Panicked(panic_message(payload.as_ref())),
            Err(RecvTimeoutError::Timeout) => Isolated::TimedOut,
            Err(RecvTimeoutError::Disconnected) => {
                Isolated::Panicked("worker exited without a result".to_string())
            }
        },
    };

    IsolatedRun {
        result,
        elapsed: started.elapsed(),
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn returns_value() {
        let run = run_isolated("ok", Duration::from_secs(5), || 41 + 1);
        assert!(matches!(run.result, Isolated::Returned(42)));
    }

    #[test]
    fn catches_panics() {
        let run = run_isolated("panics", Duration::from_secs(5), || -> u32 {
            panic!("geist blew up")
        });
        match run.result {
            Isolated::Panicked(message) => assert!(message.contains("geist blew up")),
            other => panic!("expected panic, got {:?}", other),
        }
    }

    #[test]
    fn stops_waiting_at_the_deadline() {
        let run = run_isolated("sleeps", Duration::from_millis(50), || {
            thread::sleep(Duration::from_secs(2));
        });
        assert!(matches!(run.result, Isolated::TimedOut));
        assert!(run.elapsed < Duration::from_secs(1));
    }
}
