//! Running the same function concurrently across every discovered tenant
//! account, bounded by a shared rate budget.
//!
//! Result ordering matches the discovered account order regardless of
//! completion order. A canceled scope makes every slot error with the
//! cancellation cause; `fn` is not invoked for slots after cancellation.
//! Partial per-account failure is normal and does not fail the overall call.

use std::future::Future;
use std::num::NonZeroU32;
use std::sync::Arc;

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::client::AccountClient;
use crate::error::Error;
use crate::multistore::{AccountInfo, MultiStore};

/// `MaxConcurrent=5` bounds parallelism; `requests_per_second` is the shared
/// token-bucket budget every slot draws from before calling `f` — callers
/// targeting a different budget should override either.
#[derive(Debug, Clone, Copy)]
pub struct FanOutConfig {
    pub max_concurrent: usize,
    pub requests_per_second: u32,
}

impl Default for FanOutConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 5,
            requests_per_second: 50,
        }
    }
}

fn rate_limiter(requests_per_second: u32) -> DefaultDirectRateLimiter {
    let per_second = NonZeroU32::new(requests_per_second.max(1)).expect("max(1) is nonzero");
    RateLimiter::direct(Quota::per_second(per_second))
}

#[derive(Debug, Clone)]
pub struct AccountResult<T> {
    pub account: AccountInfo,
    pub outcome: Result<T, Error>,
}

pub struct FanOut {
    multistore: Arc<MultiStore>,
    config: FanOutConfig,
    limiter: Arc<DefaultDirectRateLimiter>,
}

impl FanOut {
    pub fn new(multistore: Arc<MultiStore>) -> Self {
        let config = FanOutConfig::default();
        let limiter = Arc::new(rate_limiter(config.requests_per_second));
        Self {
            multistore,
            config,
            limiter,
        }
    }

    pub fn with_config(mut self, config: FanOutConfig) -> Self {
        self.limiter = Arc::new(rate_limiter(config.requests_per_second));
        self.config = config;
        self
    }

    /// Runs `f(account, client)` for every discovered account concurrently
    /// with parallelism capped at `config.max_concurrent`. A slot whose
    /// account has no client registered (see
    /// [`MultiStore::client_for`]) errors with `not_found` rather than
    /// invoking `f`. The call itself only fails if no accounts were
    /// discovered at all — per-account failure is carried in each slot.
    pub async fn run<T, F, Fut>(
        &self,
        scope: CancellationToken,
        f: F,
    ) -> Result<Vec<AccountResult<T>>, Error>
    where
        T: Send + 'static,
        F: Fn(AccountInfo, Arc<dyn AccountClient>, CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, Error>> + Send + 'static,
    {
        let accounts = self.multistore.accounts();
        if accounts.is_empty() {
            return Err(Error::auth_required(
                "no accounts discovered — run the login command",
            ));
        }
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent.max(1)));
        let f = Arc::new(f);

        let mut handles = Vec::with_capacity(accounts.len());
        for account in accounts {
            if scope.is_cancelled() {
                handles.push(tokio::spawn(async move {
                    AccountResult {
                        account,
                        outcome: Err(Error::cancelled()),
                    }
                }));
                continue;
            }
            let semaphore = Arc::clone(&semaphore);
            let multistore = Arc::clone(&self.multistore);
            let limiter = Arc::clone(&self.limiter);
            let f = Arc::clone(&f);
            let scope = scope.clone();
            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire().await;
                limiter.until_ready().await;
                if scope.is_cancelled() {
                    return AccountResult {
                        account,
                        outcome: Err(Error::cancelled()),
                    };
                }
                let Some(client) = multistore.client_for(&account.id) else {
                    return AccountResult {
                        account: account.clone(),
                        outcome: Err(Error::not_found(format!(
                            "no client for account {}",
                            account.id
                        ))),
                    };
                };
                let outcome = f(account.clone(), client, scope).await;
                AccountResult { account, outcome }
            }));
        }

        let results = futures::future::join_all(handles)
            .await
            .into_iter()
            .map(|joined| joined.expect("fan-out task panicked"))
            .collect();
        Ok(results)
    }
}
