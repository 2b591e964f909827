//! Pluggable reactions to failed requests.
//!
//! A [`RetryPolicy`] looks at one failed invocation and decides whether
//! the sender should sleep and try again or hand the error to the
//! caller. Policies never see `303` redirects; those are handled inside
//! the sender before the policy runs.

use std::num::NonZeroU32;
use std::ops::ControlFlow;
use std::time::Duration;

use crate::errors::InvocationError;

/// What the policy gets to look at.
#[derive(Debug)]
pub struct RetryContext {
    /// How many times this request has failed so far, counting this one.
    pub fail_count: NonZeroU32,
    /// Total time already spent sleeping between attempts.
    pub slept_so_far: Duration,
    /// The failure under consideration.
    pub error: InvocationError,
}

/// Decides whether a failed request is worth another attempt.
pub trait RetryPolicy: Send + Sync + 'static {
    /// `Continue(delay)` sleeps and retries; `Break(())` surfaces the
    /// error to the caller.
    fn should_retry(&self, ctx: &RetryContext) -> ControlFlow<(), Duration>;
}

// ─── NoRetries ───────────────────────────────────────────────────────────────

/// Every failure goes straight to the caller.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoRetries;

impl RetryPolicy for NoRetries {
    fn should_retry(&self, _ctx: &RetryContext) -> ControlFlow<(), Duration> {
        ControlFlow::Break(())
    }
}

// ─── AutoSleep ───────────────────────────────────────────────────────────────

/// Sleeps through short flood waits and optionally rides out one
/// transient I/O failure.
#[derive(Clone, Copy, Debug)]
pub struct AutoSleep {
    /// Longest flood wait worth sleeping through. Anything above this
    /// surfaces to the caller.
    pub threshold: Duration,
    /// When set, the first I/O failure of a request is retried after
    /// this delay instead of surfacing.
    pub io_errors_as_flood_of: Option<Duration>,
}

impl Default for AutoSleep {
    fn default() -> Self {
        Self {
            threshold: Duration::from_secs(60),
            io_errors_as_flood_of: Some(Duration::from_secs(1)),
        }
    }
}

impl AutoSleep {
    /// Surfaces every flood wait but still absorbs one I/O failure.
    pub fn io_only() -> Self {
        Self {
            threshold: Duration::ZERO,
            io_errors_as_flood_of: Some(Duration::from_secs(1)),
        }
    }
}

impl RetryPolicy for AutoSleep {
    fn should_retry(&self, ctx: &RetryContext) -> ControlFlow<(), Duration> {
        if let Some(seconds) = ctx.error.flood_wait_seconds() {
            let wait = Duration::from_secs(u64::from(seconds));
            if wait <= self.threshold && ctx.fail_count.get() == 1 {
                tracing::info!("sleeping {seconds}s on server request");
                return ControlFlow::Continue(wait);
            }
        }
        if let (InvocationError::Io(_), Some(delay)) = (&ctx.error, self.io_errors_as_flood_of) {
            if ctx.fail_count.get() == 1 {
                tracing::info!("retrying once after I/O failure: {}", ctx.error);
                return ControlFlow::Continue(delay);
            }
        }
        ControlFlow::Break(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::RpcError;

    fn flood(seconds: u32) -> RetryContext {
        RetryContext {
            fail_count: NonZeroU32::MIN,
            slept_so_far: Duration::ZERO,
            error: InvocationError::Rpc(RpcError::from_telegram(
                420,
                &format!("FLOOD_WAIT_{seconds}"),
            )),
        }
    }

    fn io_failure(fail_count: u32) -> RetryContext {
        RetryContext {
            fail_count: NonZeroU32::new(fail_count).unwrap(),
            slept_so_far: Duration::ZERO,
            error: InvocationError::Io(std::io::Error::other("broken pipe")),
        }
    }

    #[test]
    fn no_retries_always_breaks() {
        assert_eq!(
            NoRetries.should_retry(&flood(1)),
            ControlFlow::Break(())
        );
    }

    #[test]
    fn auto_sleep_rides_out_short_floods() {
        let policy = AutoSleep::default();
        assert_eq!(
            policy.should_retry(&flood(30)),
            ControlFlow::Continue(Duration::from_secs(30))
        );
        assert_eq!(policy.should_retry(&flood(120)), ControlFlow::Break(()));
    }

    #[test]
    fn auto_sleep_only_sleeps_on_the_first_failure() {
        let policy = AutoSleep::default();
        let mut ctx = flood(5);
        ctx.fail_count = NonZeroU32::new(2).unwrap();
        assert_eq!(policy.should_retry(&ctx), ControlFlow::Break(()));
    }

    #[test]
    fn io_failures_retry_once() {
        let policy = AutoSleep::default();
        assert_eq!(
            policy.should_retry(&io_failure(1)),
            ControlFlow::Continue(Duration::from_secs(1))
        );
        assert_eq!(policy.should_retry(&io_failure(2)), ControlFlow::Break(()));
    }

    #[test]
    fn io_only_surfaces_floods() {
        let policy = AutoSleep::io_only();
        assert_eq!(policy.should_retry(&flood(1)), ControlFlow::Break(()));
        assert_eq!(
            policy.should_retry(&io_failure(1)),
            ControlFlow::Continue(Duration::from_secs(1))
        );
    }
}
