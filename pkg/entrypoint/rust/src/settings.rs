// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use crate::env::MergedEnvironment;
use crate::error::Result;
use crate::identity::DEFAULT_METADATA_URL;
use crate::store::{ObjectLocator, StoreSettings};

pub const METADATA_SERVICE_URL: &str = "AWS_METADATA_SERVICE_URL";
pub const S3_ENDPOINT_URL: &str = "AWS_S3_ENDPOINT_URL";
pub const S3_BUCKET_REGION: &str = "AWS_S3_BUCKET_REGION";
pub const S3_ENV_FILE_OBJECT_PATH: &str = "AWS_S3_ENV_FILE_OBJECT_PATH";

/// Entrypoint settings read from the process environment, before the env
/// file is applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub metadata_url: String,
    pub store: StoreSettings,
    pub env_file: Option<ObjectLocator>,
}

impl Settings {
    pub fn from_env(env: &MergedEnvironment) -> Result<Self> {
        let non_empty = |key: &str| env.get(key).filter(|v| !v.is_empty()).map(str::to_string);

        let store = StoreSettings {
            endpoint_url: non_empty(S3_ENDPOINT_URL),
            region: non_empty(S3_BUCKET_REGION),
        };
        let env_file = non_empty(S3_ENV_FILE_OBJECT_PATH)
            .map(|path| ObjectLocator::parse(&path, &store))
            .transpose()?;

        Ok(Self {
            metadata_url: non_empty(METADATA_SERVICE_URL)
                .unwrap_or_else(|| DEFAULT_METADATA_URL.to_string()),
            store,
            env_file,
        })
    }
}
