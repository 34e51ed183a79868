//! Cancellation shared by every network call of one dispatch.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{FetchError, Result};

/// Cancellation state for one logical dispatch.
///
/// Combines an optional caller token with an optional deadline. The deadline
/// is fixed when the value is created, so the probe and the fallback of one
/// dispatch share a single time budget.
#[derive(Clone, Debug, Default)]
pub struct Cancellation {
    token: Option<CancellationToken>,
    deadline: Option<(Instant, Duration)>,
}

impl Cancellation {
    /// No token and no deadline.
    pub fn none() -> Self {
        Self::default()
    }

    /// Cancel when `token` fires.
    pub fn token(token: CancellationToken) -> Self {
        Self {
            token: Some(token),
            deadline: None,
        }
    }

    /// Time out `timeout` from now.
    pub fn timeout(timeout: Duration) -> Self {
        Self {
            token: None,
            deadline: Some((Instant::now() + timeout, timeout)),
        }
    }

    /// Caller token and timeout, either optional.
    pub fn new(token: Option<CancellationToken>, timeout: Option<Duration>) -> Self {
        Self {
            token,
            deadline: timeout.map(|t| (Instant::now() + t, t)),
        }
    }

    /// Whether the token has already fired or the deadline has passed.
    pub fn is_cancelled(&self) -> bool {
        self.token.as_ref().is_some_and(CancellationToken::is_cancelled)
            || self.deadline.is_some_and(|(at, _)| Instant::now() >= at)
    }

    /// Run `fut`, failing with [`FetchError::Cancelled`] or
    /// [`FetchError::Timeout`] if cancellation wins.
    ///
    /// A token that already fired wins even if `fut` would complete
    /// immediately.
    pub async fn run<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let cancelled = async {
            match &self.token {
                Some(token) => token.cancelled().await,
                None => std::future::pending().await,
            }
        };
        let timed_out = async {
            match self.deadline {
                Some((at, _)) => tokio::time::sleep_until(at).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            biased;
            _ = cancelled => Err(FetchError::Cancelled),
            _ = timed_out => Err(FetchError::Timeout(
                self.deadline.map(|(_, after)| after).unwrap_or_default(),
            )),
            result = fut => result,
        }
    }
}

impl From<CancellationToken> for Cancellation {
    fn from(token: CancellationToken) -> Self {
        Self::token(token)
    }
}
