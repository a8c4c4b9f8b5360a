use std::{process, thread};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::Error;

/// Determines what happens when a pool or registry runs out of a bounded resource.
///
/// By default, exhaustion is reported to the caller as an [`Error`], leaving the choice of
/// retry, backpressure or expansion to the caller.
///
/// # Examples
///
/// ```
/// use slot_pool::{ExhaustionPolicy, PoolRegistry};
///
/// // The policy is set at registry creation time and inherited by every pool it creates.
/// let registry = PoolRegistry::<u64>::builder()
///     .exhaustion_policy(ExhaustionPolicy::Abort)
///     .build();
/// ```
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[non_exhaustive]
pub enum ExhaustionPolicy {
    /// Exhaustion is returned to the caller as an error. This is the default.
    #[default]
    ReturnError,

    /// Exhaustion is treated as unrecoverable: a diagnostic is logged and the process
    /// is aborted.
    ///
    /// This reproduces the strict behavior where running out of pool slots, table entries or
    /// memory terminates the process, and exists for compatibility testing.
    Abort,
}

impl ExhaustionPolicy {
    /// Applies the policy to the outcome of an operation that may have exhausted a resource.
    ///
    /// Under [`Abort`][Self::Abort], an exhaustion error never reaches the caller.
    pub(crate) fn enforce<T>(self, origin: &str, result: crate::Result<T>) -> crate::Result<T> {
        match result {
            Err(error) if self == Self::Abort && error.is_exhaustion() => {
                report_fatal(origin, &error.to_string())
            }
            other => other,
        }
    }
}

/// Logs a fatal diagnostic and terminates the process.
///
/// The diagnostic carries the calling thread, a millisecond wall-clock timestamp, the failing
/// operation and a free-form remark. The process is aborted rather than unwound because the
/// caller has declared the condition unrecoverable.
#[cfg_attr(test, mutants::skip)] // Terminates the test process.
pub fn report_fatal(origin: &str, remark: &str) -> ! {
    let timestamp_ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_millis());

    let current = thread::current();

    tracing::error!(
        thread = ?current.id(),
        thread_name = current.name().unwrap_or("<unnamed>"),
        timestamp_ms,
        origin,
        remark,
        "fatal error, terminating process"
    );

    process::abort()
}

/// Shorthand for producing the error for a full fixed-capacity pool.
pub(crate) fn full(pool: &str, capacity: usize) -> Error {
    Error::Full {
        pool: pool.to_string(),
        capacity,
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn default_returns_errors() {
        assert_eq!(ExhaustionPolicy::default(), ExhaustionPolicy::ReturnError);
    }

    #[test]
    fn return_error_passes_exhaustion_through() {
        let result: crate::Result<()> = Err(full("items", 4));

        let result = ExhaustionPolicy::ReturnError.enforce("add", result);
        assert!(matches!(result, Err(Error::Full { capacity: 4, .. })));
    }

    #[test]
    fn abort_passes_warnings_through() {
        let result: crate::Result<()> = Err(Error::Destroyed {
            pool: "items".to_string(),
        });

        // Only exhaustion is fatal; misuse is still reported to the caller.
        let result = ExhaustionPolicy::Abort.enforce("operate", result);
        assert!(matches!(result, Err(Error::Destroyed { .. })));
    }

    #[test]
    fn abort_passes_success_through() {
        let result = ExhaustionPolicy::Abort.enforce("add", Ok(7_usize));
        assert_eq!(result.unwrap(), 7);
    }
}
