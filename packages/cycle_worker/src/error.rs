use std::io;

use thiserror::Error;

/// Errors reported by worker operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The worker has been destroyed or is being destroyed and no longer accepts requests.
    #[error("worker '{worker}' has terminated")]
    Terminated {
        /// Name of the worker.
        worker: String,
    },

    /// The operating system refused to start the worker thread.
    #[error("failed to spawn the thread of worker '{worker}'")]
    Spawn {
        /// Name of the worker.
        worker: String,

        /// The underlying error reported by the operating system.
        #[source]
        source: io::Error,
    },

    /// The task queue of the worker could not be created or extended.
    #[error("task queue operation failed")]
    TaskQueue(#[from] slot_pool::Error),

    /// The cycle lock was requested from the worker's own thread, which already holds it.
    #[error("worker '{worker}' cannot lock itself from its own thread")]
    ReentrantLock {
        /// Name of the worker.
        worker: String,
    },
}

/// A specialized `Result` type for worker operations, returning the crate's
/// [`Error`] type as the error value.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::error::Error as _;
    use std::fmt::Debug;

    use static_assertions::assert_impl_all;

    use super::*;

    assert_impl_all!(Error: Send, Sync, Debug);

    #[test]
    fn spawn_error_exposes_source() {
        let error = Error::Spawn {
            worker: "ticker".to_string(),
            source: io::Error::other("no threads left"),
        };

        assert!(error.to_string().contains("ticker"));
        assert!(error.source().is_some());
    }

    #[test]
    fn task_queue_error_wraps_pool_error() {
        let error = Error::from(slot_pool::Error::Destroyed {
            pool: "ticker tasks".to_string(),
        });

        assert!(matches!(error, Error::TaskQueue(_)));
        assert!(error.source().unwrap().to_string().contains("ticker tasks"));
    }
}
