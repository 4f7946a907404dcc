// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use crate::error::{Error, Result};
use crate::poll::{Attempt, PollPolicy, poll};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::Client;
use aws_sdk_s3::config::timeout::TimeoutConfig;
use aws_sdk_s3::config::{Credentials, Region, RequestChecksumCalculation};
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{BucketLocationConstraint, CreateBucketConfiguration, ServerSideEncryption};
use log::{debug, info};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use tokio::sync::Mutex;

const S3_SCHEME: &str = "s3://";

pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Where the object store lives. Shared by every locator built during a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreSettings {
    pub endpoint_url: Option<String>,
    pub region: Option<String>,
}

/// Address of a single object. Not a cache: every operation goes back to the
/// store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectLocator {
    pub endpoint_url: Option<String>,
    pub region: Option<String>,
    pub bucket: String,
    pub key: String,
}

impl ObjectLocator {
    /// Parse an `s3://<bucket>/<key>` object path.
    pub fn parse(path: &str, settings: &StoreSettings) -> Result<Self> {
        let invalid = |reason: &str| Error::parse(format!("object path {path:?}"), reason);

        let rest = path
            .strip_prefix(S3_SCHEME)
            .ok_or_else(|| invalid("expected s3://<bucket>/<key>"))?;
        let (bucket, key) = rest
            .split_once('/')
            .ok_or_else(|| invalid("missing object key"))?;
        if bucket.is_empty() {
            return Err(invalid("missing bucket name"));
        }
        if key.is_empty() {
            return Err(invalid("missing object key"));
        }

        Ok(Self {
            endpoint_url: settings.endpoint_url.clone(),
            region: settings.region.clone(),
            bucket: bucket.to_string(),
            key: key.to_string(),
        })
    }

    /// Last path segment of the key, `None` for keys ending in `/`.
    pub fn basename(&self) -> Option<&str> {
        self.key.rsplit('/').next().filter(|name| !name.is_empty())
    }
}

impl fmt::Display for ObjectLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{S3_SCHEME}{}/{}", self.bucket, self.key)
    }
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch the object's full content.
    async fn fetch(&self, locator: &ObjectLocator) -> Result<Vec<u8>>;

    /// Create the locator's bucket unless it already exists.
    async fn ensure_bucket(&self, locator: &ObjectLocator) -> Result<()>;

    /// Upload `content`, creating the bucket first if needed.
    async fn put(&self, locator: &ObjectLocator, content: Vec<u8>) -> Result<()>;
}

/// Upper bounds for a single S3 request. `attempt` covers one HTTP round
/// trip, `operation` the whole call including the SDK's own retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestTimeouts {
    pub attempt: Duration,
    pub operation: Duration,
}

impl Default for RequestTimeouts {
    fn default() -> Self {
        Self {
            attempt: DEFAULT_ATTEMPT_TIMEOUT,
            operation: DEFAULT_OPERATION_TIMEOUT,
        }
    }
}

type ClientKey = (Option<String>, Option<String>);

pub struct S3ObjectStore {
    policy: PollPolicy,
    timeouts: RequestTimeouts,
    credentials: Option<Credentials>,
    clients: Mutex<HashMap<ClientKey, Client>>,
}

impl S3ObjectStore {
    pub fn new(policy: PollPolicy) -> Self {
        Self {
            policy,
            timeouts: RequestTimeouts::default(),
            credentials: None,
            clients: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_timeouts(mut self, timeouts: RequestTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Use fixed credentials instead of the default provider chain.
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    async fn client(&self, locator: &ObjectLocator) -> Client {
        let key = (locator.endpoint_url.clone(), locator.region.clone());
        let mut clients = self.clients.lock().await;
        if let Some(client) = clients.get(&key) {
            return client.clone();
        }
        let client = self.build_client(locator).await;
        clients.insert(key, client.clone());
        client
    }

    async fn build_client(&self, locator: &ObjectLocator) -> Client {
        let mut loader = aws_config::defaults(BehaviorVersion::latest()).timeout_config(
            TimeoutConfig::builder()
                .operation_attempt_timeout(self.timeouts.attempt)
                .operation_timeout(self.timeouts.operation)
                .build(),
        );
        if let Some(region) = &locator.region {
            loader = loader.region(Region::new(region.clone()));
        }
        if let Some(credentials) = &self.credentials {
            loader = loader.credentials_provider(credentials.clone());
        }
        let sdk_config = loader.load().await;

        let mut builder = aws_sdk_s3::config::Builder::from(&sdk_config);
        if let Some(endpoint) = &locator.endpoint_url {
            // Custom endpoints: path-style buckets, no checksum trailers.
            debug!("using S3 endpoint {endpoint} with path-style addressing");
            builder = builder
                .endpoint_url(endpoint)
                .force_path_style(true)
                .request_checksum_calculation(RequestChecksumCalculation::WhenRequired);
        }
        Client::from_conf(builder.build())
    }
}

/// Map an SDK failure onto the retry contract: a bucket that is not visible
/// yet is the only transient answer.
fn classify<E, R>(locator: &ObjectLocator, err: SdkError<E, R>) -> Attempt
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: fmt::Debug,
{
    match err.code() {
        Some("NoSuchBucket") => Attempt::Transient(format!("bucket {} does not exist", locator.bucket)),
        Some("NoSuchKey") | Some("NotFound") => Attempt::Fatal(Error::ObjectNotFound {
            path: locator.to_string(),
        }),
        _ => Attempt::Fatal(unavailable(locator, err)),
    }
}

fn unavailable<E, R>(locator: &ObjectLocator, err: SdkError<E, R>) -> Error
where
    E: std::error::Error + 'static,
    R: fmt::Debug,
{
    Error::ObjectStoreUnavailable {
        path: locator.to_string(),
        reason: DisplayErrorContext(err).to_string(),
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn fetch(&self, locator: &ObjectLocator) -> Result<Vec<u8>> {
        let client = self.client(locator).await;
        let content = poll(&format!("fetch {locator}"), self.policy, || {
            let client = client.clone();
            async move {
                let output = client
                    .get_object()
                    .bucket(&locator.bucket)
                    .key(&locator.key)
                    .send()
                    .await
                    .map_err(|e| classify(locator, e))?;
                let body = output.body.collect().await.map_err(|e| {
                    Attempt::Fatal(Error::ObjectStoreUnavailable {
                        path: locator.to_string(),
                        reason: format!("reading body: {e}"),
                    })
                })?;
                Ok::<_, Attempt>(body.into_bytes().to_vec())
            }
        })
        .await?;

        debug!("fetched {locator} ({} bytes)", content.len());
        Ok(content)
    }

    async fn ensure_bucket(&self, locator: &ObjectLocator) -> Result<()> {
        let client = self.client(locator).await;

        match client.head_bucket().bucket(&locator.bucket).send().await {
            Ok(_) => {
                debug!("bucket {} already exists", locator.bucket);
                return Ok(());
            }
            Err(e) if e.as_service_error().is_some_and(|se| se.is_not_found()) => {}
            Err(e) => return Err(unavailable(locator, e)),
        }

        info!("creating bucket {}", locator.bucket);
        let mut request = client.create_bucket().bucket(&locator.bucket);
        if let Some(region) = locator.region.as_deref().filter(|r| *r != "us-east-1") {
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(region))
                    .build(),
            );
        }

        match request.send().await {
            Ok(_) => Ok(()),
            Err(e)
                if e
                    .as_service_error()
                    .is_some_and(|se| se.is_bucket_already_owned_by_you()) =>
            {
                debug!("bucket {} was created concurrently", locator.bucket);
                Ok(())
            }
            Err(e) => Err(unavailable(locator, e)),
        }
    }

    async fn put(&self, locator: &ObjectLocator, content: Vec<u8>) -> Result<()> {
        self.ensure_bucket(locator).await?;

        let client = self.client(locator).await;
        let size = content.len();
        poll(&format!("put {locator}"), self.policy, || {
            let client = client.clone();
            let body = ByteStream::from(content.clone());
            async move {
                client
                    .put_object()
                    .bucket(&locator.bucket)
                    .key(&locator.key)
                    .server_side_encryption(ServerSideEncryption::Aes256)
                    .body(body)
                    .send()
                    .await
                    .map_err(|e| classify(locator, e))?;
                Ok::<_, Attempt>(())
            }
        })
        .await?;

        info!("uploaded {locator} ({size} bytes)");
        Ok(())
    }
}

#[cfg(any(test, feature = "test-helpers"))]
pub use memory::MemoryObjectStore;

#[cfg(any(test, feature = "test-helpers"))]
mod memory {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Mutex as SyncMutex;

    /// In-process store. Buckets can be configured to answer "no such
    /// bucket" a number of times before becoming visible, the way a freshly
    /// created S3 bucket can.
    #[derive(Default)]
    pub struct MemoryObjectStore {
        policy: PollPolicy,
        buckets: SyncMutex<BTreeMap<String, BTreeMap<String, Vec<u8>>>>,
        lag: SyncMutex<HashMap<String, u32>>,
        fetched: SyncMutex<Vec<String>>,
    }

    impl MemoryObjectStore {
        pub fn new(policy: PollPolicy) -> Self {
            Self {
                policy,
                ..Default::default()
            }
        }

        /// Seed an object, creating its bucket.
        pub fn insert(&self, path: &str, content: impl Into<Vec<u8>>) {
            let Ok(locator) = ObjectLocator::parse(path, &StoreSettings::default()) else {
                panic!("invalid object path in test fixture: {path}");
            };
            lock(&self.buckets)
                .entry(locator.bucket)
                .or_default()
                .insert(locator.key, content.into());
        }

        /// Make `bucket` invisible for the next `answers` lookups.
        pub fn lag_bucket(&self, bucket: &str, answers: u32) {
            lock(&self.lag).insert(bucket.to_string(), answers);
        }

        /// Object paths fetched so far, in call order.
        pub fn fetched(&self) -> Vec<String> {
            lock(&self.fetched).clone()
        }

        fn lookup(&self, locator: &ObjectLocator) -> std::result::Result<Vec<u8>, Attempt> {
            if let Some(remaining) = lock(&self.lag).get_mut(&locator.bucket)
                && *remaining > 0
            {
                *remaining -= 1;
                return Err(Attempt::Transient(format!(
                    "bucket {} does not exist",
                    locator.bucket
                )));
            }

            let buckets = lock(&self.buckets);
            let Some(objects) = buckets.get(&locator.bucket) else {
                return Err(Attempt::Transient(format!(
                    "bucket {} does not exist",
                    locator.bucket
                )));
            };
            objects.get(&locator.key).cloned().ok_or_else(|| {
                Attempt::Fatal(Error::ObjectNotFound {
                    path: locator.to_string(),
                })
            })
        }
    }

    fn lock<T>(mutex: &SyncMutex<T>) -> std::sync::MutexGuard<'_, T> {
        mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    #[async_trait]
    impl ObjectStore for MemoryObjectStore {
        async fn fetch(&self, locator: &ObjectLocator) -> Result<Vec<u8>> {
            lock(&self.fetched).push(locator.to_string());
            poll(&format!("fetch {locator}"), self.policy, || async move {
                self.lookup(locator)
            })
            .await
        }

        async fn ensure_bucket(&self, locator: &ObjectLocator) -> Result<()> {
            lock(&self.buckets)
                .entry(locator.bucket.clone())
                .or_default();
            Ok(())
        }

        async fn put(&self, locator: &ObjectLocator, content: Vec<u8>) -> Result<()> {
            self.ensure_bucket(locator).await?;
            lock(&self.buckets)
                .entry(locator.bucket.clone())
                .or_default()
                .insert(locator.key.clone(), content);
            Ok(())
        }
    }
}
