//! Package registry lookups (npm and NuGet).
//!
//! `check_compatibility` consults the registry for the latest published
//! version of a library; the lookup is best-effort and every failure path is
//! survivable. Successful lookups are cached for the life of the process;
//! failures and not-found results are not.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::config::Config;
use crate::error::{AdvisorError, Result};

/// Which registry a package name belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ecosystem {
    Npm,
    NuGet,
}

impl Ecosystem {
    pub fn as_str(&self) -> &'static str {
        match self {
            Ecosystem::Npm => "npm",
            Ecosystem::NuGet => "nuget",
        }
    }
}

/// Metadata for one published package.
#[derive(Debug, Clone, Serialize)]
pub struct PackageInfo {
    pub name: String,
    pub ecosystem: &'static str,
    pub latest_version: String,
    pub versions_count: usize,
    pub description: Option<String>,
    pub license: Option<String>,
    pub weekly_downloads: Option<u64>,
}

/// Registry collaborator injected into analysis functions.
///
/// `Ok(None)` means the package does not exist; `Err` means the lookup
/// itself failed and the caller should degrade, not abort.
#[async_trait]
pub trait PackageRegistry: Send + Sync {
    async fn lookup(&self, ecosystem: Ecosystem, name: &str) -> Result<Option<PackageInfo>>;
}

pub fn create_registry(config: &Config) -> anyhow::Result<Box<dyn PackageRegistry>> {
    if config.registry.enabled {
        Ok(Box::new(HttpRegistry::new(config)?))
    } else {
        Ok(Box::new(DisabledRegistry))
    }
}

/// No-op registry used when lookups are turned off in config.
pub struct DisabledRegistry;

#[async_trait]
impl PackageRegistry for DisabledRegistry {
    async fn lookup(&self, _ecosystem: Ecosystem, _name: &str) -> Result<Option<PackageInfo>> {
        Ok(None)
    }
}

pub struct HttpRegistry {
    client: reqwest::Client,
    npm_api_base: String,
    npm_downloads_api_base: String,
    nuget_api_base: String,
    cache: Mutex<HashMap<String, PackageInfo>>,
}

impl HttpRegistry {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.registry.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            npm_api_base: config.registry.npm_api_base.trim_end_matches('/').to_string(),
            npm_downloads_api_base: config
                .registry
                .npm_downloads_api_base
                .trim_end_matches('/')
                .to_string(),
            nuget_api_base: config.registry.nuget_api_base.trim_end_matches('/').to_string(),
            cache: Mutex::new(HashMap::new()),
        })
    }

    async fn fetch_npm(&self, name: &str) -> Result<Option<PackageInfo>> {
        let url = format!("{}/{}", self.npm_api_base, name);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| AdvisorError::Registry(format!("npm request failed: {}", e)))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(AdvisorError::Registry(format!(
                "npm returned {} for {}",
                response.status(),
                name
            )));
        }

        let doc: Value = response
            .json()
            .await
            .map_err(|e| AdvisorError::Registry(format!("npm payload unreadable: {}", e)))?;
        let downloads = self.fetch_npm_weekly_downloads(name).await;
        parse_npm_document(name, &doc, downloads).map(Some)
    }

    /// Download counts are decoration; any failure just yields `None`.
    async fn fetch_npm_weekly_downloads(&self, name: &str) -> Option<u64> {
        let url = format!(
            "{}/downloads/point/last-week/{}",
            self.npm_downloads_api_base, name
        );
        let response = self.client.get(&url).send().await.ok()?;
        if !response.status().is_success() {
            return None;
        }
        let doc: Value = response.json().await.ok()?;
        doc.get("downloads").and_then(Value::as_u64)
    }

    async fn fetch_nuget(&self, name: &str) -> Result<Option<PackageInfo>> {
        let lower = name.to_lowercase();
        let url = format!(
            "{}/v3-flatcontainer/{}/index.json",
            self.nuget_api_base, lower
        );
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| AdvisorError::Registry(format!("nuget request failed: {}", e)))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(AdvisorError::Registry(format!(
                "nuget returned {} for {}",
                response.status(),
                name
            )));
        }

        let doc: Value = response
            .json()
            .await
            .map_err(|e| AdvisorError::Registry(format!("nuget payload unreadable: {}", e)))?;
        let (latest_version, versions_count) = parse_nuget_versions(name, &doc)?;
        let (description, license) = self.fetch_nuget_catalog(&lower).await;

        Ok(Some(PackageInfo {
            name: name.to_string(),
            ecosystem: Ecosystem::NuGet.as_str(),
            latest_version,
            versions_count,
            description,
            license,
            weekly_downloads: None,
        }))
    }

    /// Catalog metadata is decoration; failures yield empty fields.
    async fn fetch_nuget_catalog(&self, lower: &str) -> (Option<String>, Option<String>) {
        let url = format!(
            "{}/v3/registration5-semver1/{}/index.json",
            self.nuget_api_base, lower
        );
        let Ok(response) = self.client.get(&url).send().await else {
            return (None, None);
        };
        if !response.status().is_success() {
            return (None, None);
        }
        let Ok(doc) = response.json::<Value>().await else {
            return (None, None);
        };
        parse_nuget_catalog(&doc)
    }
}

#[async_trait]
impl PackageRegistry for HttpRegistry {
    async fn lookup(&self, ecosystem: Ecosystem, name: &str) -> Result<Option<PackageInfo>> {
        let cache_key = format!("{}:{}", ecosystem.as_str(), name.to_lowercase());
        {
            let cache = self.cache.lock().await;
            if let Some(hit) = cache.get(&cache_key) {
                return Ok(Some(hit.clone()));
            }
        }

        let info = match ecosystem {
            Ecosystem::Npm => self.fetch_npm(name).await?,
            Ecosystem::NuGet => self.fetch_nuget(name).await?,
        };

        if let Some(info) = &info {
            tracing::debug!(package = %name, ecosystem = ecosystem.as_str(), latest = %info.latest_version, "registry hit");
            let mut cache = self.cache.lock().await;
            cache.insert(cache_key, info.clone());
        }
        Ok(info)
    }
}

fn parse_npm_document(name: &str, doc: &Value, weekly_downloads: Option<u64>) -> Result<PackageInfo> {
    let latest_version = doc
        .pointer("/dist-tags/latest")
        .and_then(Value::as_str)
        .ok_or_else(|| {
            AdvisorError::Registry(format!("npm document for {} has no dist-tags.latest", name))
        })?
        .to_string();
    let versions_count = doc
        .get("versions")
        .and_then(Value::as_object)
        .map(|v| v.len())
        .unwrap_or(0);

    Ok(PackageInfo {
        name: name.to_string(),
        ecosystem: Ecosystem::Npm.as_str(),
        latest_version,
        versions_count,
        description: doc
            .get("description")
            .and_then(Value::as_str)
            .map(String::from),
        license: doc.get("license").and_then(Value::as_str).map(String::from),
        weekly_downloads,
    })
}

fn parse_nuget_versions(name: &str, doc: &Value) -> Result<(String, usize)> {
    let versions = doc
        .get("versions")
        .and_then(Value::as_array)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| {
            AdvisorError::Registry(format!("nuget document for {} has no versions", name))
        })?;
    let latest = versions
        .last()
        .and_then(Value::as_str)
        .ok_or_else(|| {
            AdvisorError::Registry(format!("nuget versions for {} are not strings", name))
        })?
        .to_string();
    Ok((latest, versions.len()))
}

fn parse_nuget_catalog(doc: &Value) -> (Option<String>, Option<String>) {
    let catalog = doc
        .get("items")
        .and_then(Value::as_array)
        .and_then(|pages| pages.last())
        .and_then(|page| page.get("items"))
        .and_then(Value::as_array)
        .and_then(|entries| entries.last())
        .and_then(|entry| entry.get("catalogEntry"));

    let Some(catalog) = catalog else {
        return (None, None);
    };
    (
        catalog
            .get("description")
            .and_then(Value::as_str)
            .map(String::from),
        catalog
            .get("licenseExpression")
            .and_then(Value::as_str)
            .map(String::from),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_npm_document() {
        let doc = json!({
            "dist-tags": {"latest": "4.18.2"},
            "versions": {"4.18.1": {}, "4.18.2": {}},
            "description": "Fast, unopinionated web framework",
            "license": "MIT"
        });
        let info = parse_npm_document("express", &doc, Some(25_000_000)).unwrap();
        assert_eq!(info.latest_version, "4.18.2");
        assert_eq!(info.versions_count, 2);
        assert_eq!(info.license.as_deref(), Some("MIT"));
        assert_eq!(info.weekly_downloads, Some(25_000_000));
        assert_eq!(info.ecosystem, "npm");
    }

    #[test]
    fn test_parse_npm_document_without_dist_tags() {
        let doc = json!({"versions": {}});
        let err = parse_npm_document("ghost", &doc, None).unwrap_err();
        assert!(matches!(err, AdvisorError::Registry(_)));
    }

    #[test]
    fn test_parse_nuget_versions_takes_last() {
        let doc = json!({"versions": ["12.0.1", "12.0.3", "13.0.1"]});
        let (latest, count) = parse_nuget_versions("Newtonsoft.Json", &doc).unwrap();
        assert_eq!(latest, "13.0.1");
        assert_eq!(count, 3);
    }

    #[test]
    fn test_parse_nuget_catalog_walks_last_entries() {
        let doc = json!({
            "items": [{
                "items": [
                    {"catalogEntry": {"description": "old", "licenseExpression": "MIT"}},
                    {"catalogEntry": {"description": "JSON framework for .NET", "licenseExpression": "MIT"}}
                ]
            }]
        });
        let (description, license) = parse_nuget_catalog(&doc);
        assert_eq!(description.as_deref(), Some("JSON framework for .NET"));
        assert_eq!(license.as_deref(), Some("MIT"));
    }

    #[tokio::test]
    async fn test_disabled_registry_finds_nothing() {
        let registry = DisabledRegistry;
        let info = registry.lookup(Ecosystem::Npm, "express").await.unwrap();
        assert!(info.is_none());
    }
}
