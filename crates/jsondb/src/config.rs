// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Database configuration
//!
//! ```yaml
//! data_dir: /var/lib/people
//! replication:
//!   policy: strict
//!   remote:
//!     url: s3://backups/people
//!     region: us-west-2
//!     access_key: AKIA...
//!     secret_key: ...
//! ```

use crate::error::{Error, Result};
use crate::storage::ReplicationPolicy;
use diagnostics::*;
use object_store::path::Path as ObjectPath;
use object_store::ObjectStore;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Environment variable naming the data directory when none is given
pub const DATA_DIR_ENV: &str = "JSONDB_DIR";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Directory holding the `db` root
    pub data_dir: PathBuf,

    /// Mirror every write to a remote store
    #[serde(default)]
    pub replication: Option<ReplicationConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicationConfig {
    pub remote: RemoteConfig,

    #[serde(default)]
    pub policy: ReplicationPolicy,
}

/// Remote replica location
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// "s3://bucket/prefix", "file:///path" or "memory://prefix"
    pub url: String,

    /// AWS region (for S3)
    #[serde(default)]
    pub region: String,

    #[serde(default)]
    pub access_key: String,

    #[serde(default)]
    pub secret_key: String,

    /// Custom S3 endpoint (for MinIO, R2, etc.)
    #[serde(default)]
    pub endpoint: String,
}

impl DatabaseConfig {
    pub fn from_yaml(text: &str) -> Result<Self> {
        let config: DatabaseConfig = serde_yaml_ng::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| Error::io(path, e))?;
        Self::from_yaml(&text)
    }

    fn validate(&self) -> Result<()> {
        if self.data_dir.as_os_str().is_empty() {
            return Err(Error::Configuration("data_dir field is required".to_string()));
        }
        if let Some(replication) = &self.replication {
            if replication.remote.url.is_empty() {
                return Err(Error::Configuration("url field is required".to_string()));
            }
        }
        Ok(())
    }
}

/// Get the data directory with an optional override, falling back to the
/// `JSONDB_DIR` environment variable
pub fn data_dir_with_override(override_path: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(path) = override_path {
        return Ok(path);
    }
    env::var(DATA_DIR_ENV)
        .map(PathBuf::from)
        .map_err(|_| Error::Configuration(format!("{DATA_DIR_ENV} environment variable not set")))
}

/// Build the object store a remote config names, with the key prefix
/// records are placed under.
pub async fn build_object_store(config: &RemoteConfig) -> Result<(Arc<dyn ObjectStore>, ObjectPath)> {
    if config.url.is_empty() {
        return Err(Error::Configuration("url field is required".to_string()));
    }
    let url = config.url.as_str();
    debug!("Building replica store for {url}", url: url);

    if let Some(rest) = url.strip_prefix("s3://") {
        let (bucket, prefix) = rest.split_once('/').unwrap_or((rest, ""));
        if bucket.is_empty() {
            return Err(Error::Configuration(format!("missing bucket in {url}")));
        }
        return Ok((Arc::new(build_s3(config, bucket)?), ObjectPath::from(prefix)));
    }

    if let Some(dir) = url.strip_prefix("file://") {
        if dir.is_empty() {
            return Err(Error::Configuration(format!("missing path in {url}")));
        }
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| Error::io(dir, e))?;
        let store = object_store::local::LocalFileSystem::new_with_prefix(dir)?;
        return Ok((Arc::new(store), ObjectPath::default()));
    }

    if let Some(prefix) = url.strip_prefix("memory://") {
        let store = object_store::memory::InMemory::new();
        return Ok((Arc::new(store), ObjectPath::from(prefix)));
    }

    Err(Error::Configuration(format!("unsupported replica url: {url}")))
}

fn build_s3(config: &RemoteConfig, bucket: &str) -> Result<object_store::aws::AmazonS3> {
    use object_store::{aws::AmazonS3Builder, ClientOptions};

    let client_options = ClientOptions::new().with_timeout(std::time::Duration::from_secs(30));

    let mut builder = AmazonS3Builder::new()
        .with_bucket_name(bucket)
        .with_client_options(client_options);
    if !config.region.is_empty() {
        builder = builder.with_region(&config.region);
    }
    if !config.access_key.is_empty() {
        builder = builder
            .with_access_key_id(&config.access_key)
            .with_secret_access_key(&config.secret_key);
    }
    if !config.endpoint.is_empty() {
        builder = builder.with_endpoint(&config.endpoint);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_yaml_minimal() {
        let config = DatabaseConfig::from_yaml("data_dir: /tmp/people\n").unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/tmp/people"));
        assert!(config.replication.is_none());
    }

    #[test]
    fn test_from_yaml_replication() {
        let yaml = r#"
data_dir: /tmp/people
replication:
  policy: strict
  remote:
    url: s3://backups/people
    region: us-west-2
"#;
        let config = DatabaseConfig::from_yaml(yaml).unwrap();
        let replication = config.replication.unwrap();
        assert_eq!(replication.policy, ReplicationPolicy::Strict);
        assert_eq!(replication.remote.url, "s3://backups/people");
        assert_eq!(replication.remote.region, "us-west-2");
        assert!(replication.remote.endpoint.is_empty());
    }

    #[test]
    fn test_policy_defaults_to_best_effort() {
        let yaml = "data_dir: d\nreplication:\n  remote:\n    url: memory://\n";
        let config = DatabaseConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.replication.unwrap().policy, ReplicationPolicy::BestEffort);
    }

    #[test]
    fn test_rejects_invalid() {
        assert!(matches!(
            DatabaseConfig::from_yaml("data_dir: ''\n"),
            Err(Error::Configuration(_))
        ));
        assert!(matches!(
            DatabaseConfig::from_yaml("data_dir: d\nreplication:\n  remote:\n    url: ''\n"),
            Err(Error::Configuration(_))
        ));
        assert!(matches!(
            DatabaseConfig::from_yaml("data_dir: [1, 2]\n"),
            Err(Error::Yaml(_))
        ));
    }

    #[tokio::test]
    async fn test_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jsondb.yaml");
        tokio::fs::write(&path, "data_dir: /tmp/people\n").await.unwrap();
        let config = DatabaseConfig::load(&path).await.unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/tmp/people"));

        let missing = DatabaseConfig::load(dir.path().join("nope.yaml")).await;
        assert!(matches!(missing, Err(Error::Io { .. })));
    }

    #[test]
    fn test_data_dir_override_wins() {
        let dir = data_dir_with_override(Some(PathBuf::from("/srv/data"))).unwrap();
        assert_eq!(dir, PathBuf::from("/srv/data"));
    }

    fn remote(url: &str) -> RemoteConfig {
        RemoteConfig {
            url: url.to_string(),
            region: String::new(),
            access_key: String::new(),
            secret_key: String::new(),
            endpoint: String::new(),
        }
    }

    #[tokio::test]
    async fn test_build_memory_store() {
        let (store, prefix) = build_object_store(&remote("memory://replica")).await.unwrap();
        assert_eq!(prefix.as_ref(), "replica");
        let location = prefix.child("a.json");
        let _ = store.put(&location, b"{}".to_vec().into()).await.unwrap();
        assert!(store.head(&location).await.is_ok());
    }

    #[tokio::test]
    async fn test_build_file_store_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("replica");
        let url = format!("file://{}", root.display());
        let (_store, prefix) = build_object_store(&remote(&url)).await.unwrap();
        assert!(root.is_dir());
        assert_eq!(prefix.as_ref(), "");
    }

    #[tokio::test]
    async fn test_build_rejects_bad_urls() {
        for url in ["", "ftp://host/x", "s3://", "file://"] {
            assert!(
                matches!(build_object_store(&remote(url)).await, Err(Error::Configuration(_))),
                "{url}"
            );
        }
    }
}
