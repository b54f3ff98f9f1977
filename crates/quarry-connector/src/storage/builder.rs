use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use log::debug;
use object_store::aws::AmazonS3Builder;
use object_store::azure::MicrosoftAzureBuilder;
use object_store::gcp::GoogleCloudStorageBuilder;
use object_store::local::LocalFileSystem;
use object_store::{ClientOptions, ObjectStore, RetryConfig};
use quarry_common::config::{AzureConfig, DiskConfig, GcsConfig, S3Config};
use url::Url;

use crate::error::{ConnectorError, ConnectorResult};

/// The settings needed to open a store for any bucket of one backend.
#[derive(Debug, Clone)]
pub(crate) enum StoreOptions {
    Disk(DiskConfig),
    S3(S3Config),
    Gcs(GcsConfig),
    Azure(AzureConfig),
}

impl StoreOptions {
    pub fn build(&self, bucket: &str, timeout: Duration) -> ConnectorResult<Arc<dyn ObjectStore>> {
        match self {
            StoreOptions::Disk(config) => get_local_object_store(config, bucket),
            StoreOptions::S3(config) => get_s3_object_store(config, bucket, timeout),
            StoreOptions::Gcs(config) => get_gcs_object_store(config, bucket, timeout),
            StoreOptions::Azure(config) => get_azure_object_store(config, bucket, timeout),
        }
    }
}

fn client_options(timeout: Duration, allow_http: bool) -> ClientOptions {
    ClientOptions::new()
        .with_timeout(timeout)
        .with_connect_timeout(timeout)
        .with_allow_http(allow_http)
}

fn retry_config(timeout: Duration) -> RetryConfig {
    RetryConfig {
        max_retries: 0,
        retry_timeout: timeout,
        ..Default::default()
    }
}

fn get_local_object_store(config: &DiskConfig, bucket: &str) -> ConnectorResult<Arc<dyn ObjectStore>> {
    let root = config
        .root
        .as_deref()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    let directory = root.join(bucket);
    debug!("Creating local object store for {}", directory.display());
    if !directory.is_dir() {
        return Err(ConnectorError::unresolved(format!(
            "directory {} does not exist",
            directory.display()
        )));
    }
    let store = LocalFileSystem::new_with_prefix(&directory)?;
    Ok(Arc::new(store))
}

fn get_s3_object_store(
    config: &S3Config,
    bucket: &str,
    timeout: Duration,
) -> ConnectorResult<Arc<dyn ObjectStore>> {
    let mut builder = AmazonS3Builder::new()
        .with_bucket_name(bucket)
        .with_region(&config.region);
    let mut allow_http = false;
    if let Some(endpoint) = config.endpoint_url()? {
        debug!("Creating S3 object store for bucket {bucket} at {endpoint}");
        allow_http = endpoint.scheme() == "http";
        builder = builder.with_endpoint(endpoint.as_str().trim_end_matches('/'));
    }
    match (&config.access_key, &config.secret_key) {
        (Some(access_key), Some(secret_key)) => {
            builder = builder
                .with_access_key_id(access_key)
                .with_secret_access_key(secret_key);
        }
        _ => {
            builder = builder.with_skip_signature(true);
        }
    }
    let store = builder
        .with_client_options(client_options(timeout, allow_http))
        .with_retry(retry_config(timeout))
        .build()?;
    Ok(Arc::new(store))
}

fn get_gcs_object_store(
    config: &GcsConfig,
    bucket: &str,
    timeout: Duration,
) -> ConnectorResult<Arc<dyn ObjectStore>> {
    let mut builder = GoogleCloudStorageBuilder::new().with_bucket_name(bucket);
    let endpoint = config.endpoint_url()?;
    let allow_http = endpoint.as_ref().is_some_and(|x| x.scheme() == "http");
    match (&config.service_account_key, &endpoint) {
        (Some(key), _) => {
            builder = builder.with_service_account_key(key);
        }
        (None, Some(endpoint)) => {
            debug!("Creating GCS object store for bucket {bucket} at emulator {endpoint}");
            builder = builder.with_service_account_key(emulator_service_account_key(endpoint));
        }
        (None, None) => {
            builder = GoogleCloudStorageBuilder::from_env().with_bucket_name(bucket);
        }
    }
    let store = builder
        .with_client_options(client_options(timeout, allow_http))
        .with_retry(retry_config(timeout))
        .build()?;
    Ok(Arc::new(store))
}

/// A service account key that points the client at a storage emulator without authentication.
fn emulator_service_account_key(endpoint: &Url) -> String {
    serde_json::json!({
        "gcs_base_url": endpoint.as_str().trim_end_matches('/'),
        "disable_oauth": true,
        "client_email": "",
        "private_key": "",
        "private_key_id": "",
    })
    .to_string()
}

fn get_azure_object_store(
    config: &AzureConfig,
    container: &str,
    timeout: Duration,
) -> ConnectorResult<Arc<dyn ObjectStore>> {
    let connection = config.parse_connection_string()?;
    let mut builder = MicrosoftAzureBuilder::new().with_container_name(container);
    let mut allow_http = false;
    if connection.use_emulator {
        builder = builder.with_use_emulator(true);
        allow_http = true;
    }
    if let Some(account) = &connection.account_name {
        builder = builder.with_account(account);
    }
    if let Some(key) = &connection.account_key {
        builder = builder.with_access_key(key);
    }
    if let Some(endpoint) = &connection.blob_endpoint {
        debug!("Creating Azure object store for container {container} at {endpoint}");
        allow_http = allow_http || endpoint.starts_with("http://");
        builder = builder.with_endpoint(endpoint.clone());
    }
    let store = builder
        .with_client_options(client_options(timeout, allow_http))
        .with_retry(retry_config(timeout))
        .build()?;
    Ok(Arc::new(store))
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emulator_service_account_key() {
        let url = Url::parse("http://localhost:4443/").unwrap();
        let key: serde_json::Value =
            serde_json::from_str(&emulator_service_account_key(&url)).unwrap();
        assert_eq!(key["gcs_base_url"], "http://localhost:4443");
        assert_eq!(key["disable_oauth"], true);
    }

    #[test]
    fn test_missing_local_directory() {
        let root = tempfile::tempdir().unwrap();
        let config = DiskConfig {
            root: Some(root.path().to_string_lossy().to_string()),
        };
        assert!(matches!(
            get_local_object_store(&config, "missing"),
            Err(ConnectorError::UnresolvedRelation(_))
        ));
        std::fs::create_dir(root.path().join("present")).unwrap();
        assert!(get_local_object_store(&config, "present").is_ok());
    }

    #[test]
    fn test_s3_store_builds_without_network() {
        let config = S3Config {
            endpoint: Some("localhost:9000".to_string()),
            secure: false,
            ..Default::default()
        };
        assert!(get_s3_object_store(&config, "bucket", Duration::from_secs(1)).is_ok());
    }
}
