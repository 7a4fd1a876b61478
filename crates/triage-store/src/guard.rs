//! Hand-off between a blocking store operation and the caller awaiting it.
//!
//! The caller gives up on an operation once its timeout fires. From then on
//! the operation must not commit, and any statement still running on its
//! connection is interrupted. A commit that wins the race is reported back
//! so the caller can collect the result instead of reporting a failure.

use parking_lot::Mutex;
use rusqlite::{Connection, InterruptHandle};

use triage_core::{Error, Result};

#[derive(Default)]
struct GuardState {
    abandoned: bool,
    committed: bool,
    interrupt: Option<InterruptHandle>,
}

#[derive(Default)]
pub struct OperationGuard {
    state: Mutex<GuardState>,
}

impl OperationGuard {
    /// Bind the connection now running this operation.
    ///
    /// Fails when the caller already gave up while the operation was queued.
    pub fn attach(&self, conn: &Connection) -> Result<()> {
        let mut state = self.state.lock();
        if state.abandoned {
            return Err(Error::store_unavailable(
                "operation abandoned before it started",
            ));
        }
        state.interrupt = Some(conn.get_interrupt_handle());
        Ok(())
    }

    /// Release the connection. Must run before the connection is handed on.
    pub fn detach(&self) {
        self.state.lock().interrupt = None;
    }

    /// Run `commit` unless the operation was abandoned.
    ///
    /// Abandonment and commit exclude each other: the caller either sees the
    /// commit or the commit never happens.
    pub fn commit_with<F>(&self, commit: F) -> Result<()>
    where
        F: FnOnce() -> Result<()>,
    {
        let mut state = self.state.lock();
        if state.abandoned {
            return Err(Error::store_unavailable(
                "operation abandoned before commit",
            ));
        }
        commit()?;
        state.committed = true;
        Ok(())
    }

    /// Give up on the operation and interrupt its connection.
    ///
    /// Returns `false` when the operation already committed.
    pub fn abandon(&self) -> bool {
        let mut state = self.state.lock();
        if state.committed {
            return false;
        }
        state.abandoned = true;
        if let Some(handle) = state.interrupt.take() {
            handle.interrupt();
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_abandoned_guard_refuses_attach() {
        let conn = Connection::open_in_memory().unwrap();
        let guard = OperationGuard::default();
        assert!(guard.abandon());

        let err = guard.attach(&conn).unwrap_err();
        assert_eq!(err.code(), "store_unavailable");
    }

    #[test]
    fn test_abandoned_guard_skips_commit() {
        let conn = Connection::open_in_memory().unwrap();
        let guard = OperationGuard::default();
        guard.attach(&conn).unwrap();
        assert!(guard.abandon());

        let mut ran = false;
        let err = guard
            .commit_with(|| {
                ran = true;
                Ok(())
            })
            .unwrap_err();
        assert_eq!(err.code(), "store_unavailable");
        assert!(!ran);
    }

    #[test]
    fn test_committed_guard_cannot_be_abandoned() {
        let guard = OperationGuard::default();
        guard.commit_with(|| Ok(())).unwrap();
        assert!(!guard.abandon());
    }

    #[test]
    fn test_failed_commit_stays_abandonable() {
        let guard = OperationGuard::default();
        let err = guard
            .commit_with(|| Err(Error::store_unavailable("disk full")))
            .unwrap_err();
        assert_eq!(err.code(), "store_unavailable");
        assert!(guard.abandon());
    }
}
