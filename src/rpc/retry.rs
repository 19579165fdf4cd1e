// Copyright 2025 RisingWave Labs
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::cmp;
use std::iter;
use std::time::Duration;

use tokio_retry::strategy::jitter;
use tokio_retry::{Action, Retry};

/// Back-off schedule for an outbound call: doubling delays from
/// `initial_backoff` capped at `max_backoff`.
///
/// With a `budget` the schedule allows that many retries after the first
/// attempt. Without one it keeps doubling until the cap and makes one final
/// attempt there, so the overall retry window stays bounded either way.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    initial_backoff: Duration,
    max_backoff: Duration,
    budget: Option<usize>,
}

impl RetryPolicy {
    pub fn with_budget(initial_backoff: Duration, max_backoff: Duration, budget: usize) -> Self {
        Self {
            initial_backoff,
            max_backoff,
            budget: Some(budget),
        }
    }

    pub fn until_backoff_cap(initial_backoff: Duration, max_backoff: Duration) -> Self {
        Self {
            initial_backoff,
            max_backoff,
            budget: None,
        }
    }

    fn delays(self) -> Box<dyn Iterator<Item = Duration> + Send> {
        let max = self.max_backoff;
        let base = iter::successors(Some(self.initial_backoff), move |prev| {
            Some(cmp::min(prev.saturating_mul(2), max))
        });
        let bounded: Box<dyn Iterator<Item = Duration> + Send> = match self.budget {
            Some(budget) => Box::new(base.take(budget)),
            None => Box::new(base.take_while(move |d| *d < max).chain(iter::once(max))),
        };
        Box::new(bounded.map(jitter))
    }
}

/// Run `action` until it succeeds or the policy's schedule is exhausted,
/// returning the last error in the latter case.
pub async fn retry_rpc<A: Action>(policy: RetryPolicy, action: A) -> Result<A::Item, A::Error> {
    Retry::spawn(policy.delays(), action).await
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[tokio::test]
    async fn test_budget_bounds_attempts() {
        let attempts = AtomicUsize::new(0);
        let policy =
            RetryPolicy::with_budget(Duration::from_millis(1), Duration::from_millis(4), 3);
        let result: Result<(), &str> = retry_rpc(policy, || {
            attempts.fetch_add(1, Ordering::Relaxed);
            async { Err("unreachable") }
        })
        .await;
        assert!(result.is_err());
        // The first attempt plus one per budgeted delay.
        assert_eq!(attempts.load(Ordering::Relaxed), 4);
    }

    #[tokio::test]
    async fn test_unbudgeted_stops_at_backoff_cap() {
        let attempts = AtomicUsize::new(0);
        let policy =
            RetryPolicy::until_backoff_cap(Duration::from_millis(1), Duration::from_millis(4));
        let result: Result<(), &str> = retry_rpc(policy, || {
            attempts.fetch_add(1, Ordering::Relaxed);
            async { Err("unreachable") }
        })
        .await;
        assert!(result.is_err());
        // Delays 1ms, 2ms, then the final attempt at the 4ms cap.
        assert_eq!(attempts.load(Ordering::Relaxed), 4);
    }

    #[tokio::test]
    async fn test_recovers_after_transient_failures() {
        let attempts = AtomicUsize::new(0);
        let policy =
            RetryPolicy::with_budget(Duration::from_millis(1), Duration::from_millis(4), 10);
        let result: Result<usize, &str> = retry_rpc(policy, || {
            let n = attempts.fetch_add(1, Ordering::Relaxed);
            async move {
                if n < 2 {
                    Err("unreachable")
                } else {
                    Ok(n)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 2);
        assert_eq!(attempts.load(Ordering::Relaxed), 3);
    }
}
