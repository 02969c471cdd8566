use std::sync::Arc;

use anyhow::{Context, Result};
use aws_config::{meta::region::RegionProviderChain, BehaviorVersion};
use aws_credential_types::Credentials;
use aws_sdk_s3::{
    config::{Builder as S3ConfigBuilder, Region},
    Client as S3Client,
};

use crate::{
    config::{AppConfig, StorageBackend},
    storage::{BlobStore, LocalBlobStore, S3BlobStore},
};

pub async fn build_client(config: &AppConfig) -> Result<S3Client> {
    let region = Region::new(config.aws_region.clone());
    let region_provider = RegionProviderChain::first_try(Some(region))
        .or_default_provider()
        .or_else("us-east-1");

    let mut loader = aws_config::defaults(BehaviorVersion::latest()).region(region_provider);

    if let Some(endpoint) = &config.aws_endpoint_url {
        loader = loader.endpoint_url(endpoint);
    }

    if let (Some(access_key), Some(secret_key)) = (
        config.aws_access_key_id.clone(),
        config.aws_secret_access_key.clone(),
    ) {
        let credentials = Credentials::new(access_key, secret_key, None, None, "static");
        loader = loader.credentials_provider(credentials);
    }

    let base_config = loader.load().await;
    let s3_config = S3ConfigBuilder::from(&base_config)
        .force_path_style(true)
        .build();

    Ok(S3Client::from_conf(s3_config))
}

/// Blob backend selected by `STORAGE_BACKEND`.
pub async fn build_blob_store(config: &AppConfig) -> Result<Arc<dyn BlobStore>> {
    match config.storage_backend {
        StorageBackend::Local => Ok(Arc::new(LocalBlobStore::new(&config.upload_dir).await?)),
        StorageBackend::S3 => {
            let bucket = config
                .s3_bucket
                .clone()
                .context("S3_BUCKET must be set when STORAGE_BACKEND=s3")?;
            let client = build_client(config).await?;
            Ok(Arc::new(S3BlobStore::new(client, bucket)))
        }
    }
}
