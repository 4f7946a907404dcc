// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use crate::error::{Error, Result};
use async_trait::async_trait;
use log::debug;
use serde::Serialize;
use std::time::Duration;

pub const DEFAULT_METADATA_URL: &str = "http://169.254.169.254";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);
const TOKEN_TTL_HEADER: &str = "X-aws-ec2-metadata-token-ttl-seconds";
const TOKEN_HEADER: &str = "X-aws-ec2-metadata-token";
const TOKEN_TTL_SECONDS: &str = "21600";

pub const SELF_IP: &str = "SELF_IP";
pub const SELF_ID: &str = "SELF_ID";
pub const SELF_HOSTNAME: &str = "SELF_HOSTNAME";
pub const SELF_AVAILABILITY_ZONE: &str = "SELF_AVAILABILITY_ZONE";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstanceIdentity {
    pub ip: String,
    pub id: String,
    pub hostname: String,
    pub availability_zone: String,
}

impl InstanceIdentity {
    /// The `SELF_*` variables exported to the launched process.
    pub fn env_vars(&self) -> [(&'static str, &str); 4] {
        [
            (SELF_IP, self.ip.as_str()),
            (SELF_ID, self.id.as_str()),
            (SELF_HOSTNAME, self.hostname.as_str()),
            (SELF_AVAILABILITY_ZONE, self.availability_zone.as_str()),
        ]
    }
}

#[async_trait]
pub trait IdentitySource: Send + Sync {
    async fn resolve(&self) -> Result<InstanceIdentity>;
}

/// An already known identity resolves to itself.
#[async_trait]
impl IdentitySource for InstanceIdentity {
    async fn resolve(&self) -> Result<InstanceIdentity> {
        Ok(self.clone())
    }
}

/// Reads identity facts from an EC2-compatible instance metadata service.
pub struct MetadataResolver {
    base_url: String,
    client: reqwest::Client,
}

impl MetadataResolver {
    pub fn new(base_url: &str) -> Result<Self> {
        // The metadata service is link-local; never route it through a proxy.
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .no_proxy()
            .build()
            .map_err(|e| Error::MetadataUnavailable {
                field: "client",
                reason: e.to_string(),
            })?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    /// IMDSv2 session token. `None` means the service only speaks IMDSv1.
    async fn session_token(&self) -> Option<String> {
        let url = format!("{}/latest/api/token", self.base_url);
        match self
            .client
            .put(&url)
            .header(TOKEN_TTL_HEADER, TOKEN_TTL_SECONDS)
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => {
                response.text().await.ok().filter(|t| !t.trim().is_empty())
            }
            Ok(response) => {
                debug!("{url} returned {}, falling back to IMDSv1", response.status());
                None
            }
            Err(e) => {
                debug!("{url} failed ({e}), falling back to IMDSv1");
                None
            }
        }
    }

    async fn field(&self, token: Option<&str>, path: &'static str) -> Result<String> {
        let url = format!("{}/latest/meta-data/{path}", self.base_url);
        let unavailable = |reason: String| Error::MetadataUnavailable {
            field: path,
            reason,
        };

        let mut request = self.client.get(&url);
        if let Some(token) = token {
            request = request.header(TOKEN_HEADER, token);
        }
        let response = request
            .send()
            .await
            .map_err(|e| unavailable(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(unavailable(format!("{url} returned {status}")));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| unavailable(format!("{url}: {e}")))?;
        let value = String::from_utf8(body.to_vec())
            .map_err(|_| unavailable(format!("{url} returned non UTF-8 data")))?;
        let value = value.trim();
        if value.is_empty() {
            return Err(unavailable(format!("{url} returned an empty value")));
        }
        Ok(value.to_string())
    }
}

#[async_trait]
impl IdentitySource for MetadataResolver {
    async fn resolve(&self) -> Result<InstanceIdentity> {
        let token = self.session_token().await;
        let token = token.as_deref();

        Ok(InstanceIdentity {
            ip: self.field(token, "local-ipv4").await?,
            id: self.field(token, "instance-id").await?,
            hostname: self.field(token, "local-hostname").await?,
            availability_zone: self.field(token, "placement/availability-zone").await?,
        })
    }
}
