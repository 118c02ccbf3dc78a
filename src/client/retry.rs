use anyhow::Result;
use std::future::Future;
use std::time::Duration;

use super::ApiResponse;

pub const DEFAULT_MAX_RETRIES: u32 = 10;
pub const DEFAULT_BACKOFF_STEP: Duration = Duration::from_millis(500);

const BASE_NON_TRANSIENT: &[u16] = &[400, 401, 403, 505, 511];

/// Retries non-success responses with linearly increasing backoff. Status codes in
/// `non_transient` fail immediately. Transport errors are not retried.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_step: Duration,
    pub non_transient: Vec<u16>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::for_deletes()
    }
}

impl RetryPolicy {
    /// GET and HEAD: also gives up on 404 and 423.
    pub fn for_reads() -> Self {
        Self::with_extra(&[404, 423])
    }

    /// POST and PUT: also gives up on 409.
    pub fn for_writes() -> Self {
        Self::with_extra(&[409])
    }

    pub fn for_deletes() -> Self {
        Self::with_extra(&[])
    }

    pub fn no_retries() -> Self {
        Self {
            max_retries: 0,
            ..Self::for_deletes()
        }
    }

    fn with_extra(extra: &[u16]) -> Self {
        let mut non_transient = BASE_NON_TRANSIENT.to_vec();
        non_transient.extend_from_slice(extra);
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_step: DEFAULT_BACKOFF_STEP,
            non_transient,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_backoff_step(mut self, step: Duration) -> Self {
        self.backoff_step = step;
        self
    }

    pub fn should_retry(&self, status: u16) -> bool {
        !(200..300).contains(&status) && !self.non_transient.contains(&status)
    }

    pub fn backoff(&self, retry: u32) -> Duration {
        self.backoff_step * retry
    }

    pub async fn execute<F, Fut>(&self, mut send: F) -> Result<ApiResponse>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<ApiResponse>>,
    {
        let mut retries = 0;
        loop {
            let response = send().await?;
            if !self.should_retry(response.status) || retries >= self.max_retries {
                return Ok(response);
            }

            retries += 1;
            log::debug!(
                "Request returned {}; retry {} of {}",
                response.status,
                retries,
                self.max_retries
            );
            tokio::time::sleep(self.backoff(retries)).await;
        }
    }
}

/// Default policy per HTTP verb.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicies {
    pub get: RetryPolicy,
    pub head: RetryPolicy,
    pub post: RetryPolicy,
    pub put: RetryPolicy,
    pub delete: RetryPolicy,
}

impl Default for RetryPolicies {
    fn default() -> Self {
        Self {
            get: RetryPolicy::for_reads(),
            head: RetryPolicy::for_reads(),
            post: RetryPolicy::for_writes(),
            put: RetryPolicy::for_writes(),
            delete: RetryPolicy::for_deletes(),
        }
    }
}

impl RetryPolicies {
    /// Applies `adjust` to every verb's policy.
    pub fn map(self, adjust: impl Fn(RetryPolicy) -> RetryPolicy) -> Self {
        Self {
            get: adjust(self.get),
            head: adjust(self.head),
            post: adjust(self.post),
            put: adjust(self.put),
            delete: adjust(self.delete),
        }
    }
}
