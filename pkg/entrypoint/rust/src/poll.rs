// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use crate::error::{Error, Result};
use log::{debug, info};
use std::future::Future;
use tokio::time::{Duration, Instant, sleep};

pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            timeout: DEFAULT_POLL_TIMEOUT,
        }
    }
}

/// Outcome of a failed attempt: either worth another try, or final.
#[derive(Debug)]
pub enum Attempt {
    Transient(String),
    Fatal(Error),
}

impl From<Error> for Attempt {
    fn from(e: Error) -> Self {
        Attempt::Fatal(e)
    }
}

/// Run `op` until it succeeds, fails fatally, or `policy.timeout` elapses.
/// The first attempt happens immediately; later ones are spaced by
/// `policy.interval`.
pub async fn poll<T, F, Fut>(operation: &str, policy: PollPolicy, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, Attempt>>,
{
    let started = Instant::now();
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        match op().await {
            Ok(value) => {
                if attempts > 1 {
                    info!("{operation} succeeded after {attempts} attempts");
                }
                return Ok(value);
            }
            Err(Attempt::Fatal(e)) => return Err(e),
            Err(Attempt::Transient(last_error)) => {
                let waited = started.elapsed();
                if waited + policy.interval > policy.timeout {
                    return Err(Error::TimeoutExceeded {
                        operation: operation.to_string(),
                        waited,
                        last_error,
                    });
                }
                debug!(
                    "{operation} attempt {attempts} not ready ({last_error}), retrying in {}ms",
                    policy.interval.as_millis()
                );
                sleep(policy.interval).await;
            }
        }
    }
}
