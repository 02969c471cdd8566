use std::{path::PathBuf, pin::Pin};

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use bytes::Bytes;
use chrono::Utc;
use futures_util::Stream;
use rand::Rng;
use tokio::{fs, io::AsyncWriteExt};
use tokio_util::io::ReaderStream;
use tracing::info;

pub type BlobStream = Pin<Box<dyn Stream<Item = std::io::Result<Bytes>> + Send>>;

const MAX_ORIGINAL_NAME_CHARS: usize = 120;

/// Flat key/value store for uploaded document files. Keys are the generated
/// stored filenames; there is no directory hierarchy.
#[async_trait]
pub trait BlobStore: Send + Sync + 'static {
    async fn put_blob(&self, name: &str, bytes: Vec<u8>, content_type: Option<String>)
        -> Result<()>;

    async fn exists(&self, name: &str) -> Result<bool>;

    async fn open_blob(&self, name: &str) -> Result<BlobStream>;

    async fn delete_blob(&self, name: &str) -> Result<()>;
}

/// `{epoch-ms}-{random}-{original}` with the original name reduced to a safe
/// single path segment.
pub fn generate_stored_filename(original_name: &str) -> String {
    let suffix: u32 = rand::thread_rng().gen_range(0..1_000_000_000);
    format!(
        "{}-{}-{}",
        Utc::now().timestamp_millis(),
        suffix,
        sanitize_original_name(original_name)
    )
}

fn sanitize_original_name(original_name: &str) -> String {
    let base = original_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();

    let sanitized: String = base
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || matches!(ch, '.' | '-' | '_') {
                ch
            } else {
                '_'
            }
        })
        .take(MAX_ORIGINAL_NAME_CHARS)
        .collect();

    let sanitized = sanitized.trim_start_matches('.').to_string();
    if sanitized.is_empty() {
        "file".to_string()
    } else {
        sanitized
    }
}

fn validate_blob_name(name: &str) -> Result<()> {
    if name.is_empty()
        || name.contains('/')
        || name.contains('\\')
        || name.starts_with('.')
    {
        bail!("invalid blob name `{name}`");
    }
    Ok(())
}

pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    pub async fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .await
            .with_context(|| format!("failed to create upload directory {}", root.display()))?;
        Ok(Self { root })
    }

    fn path_for(&self, name: &str) -> Result<PathBuf> {
        validate_blob_name(name)?;
        Ok(self.root.join(name))
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn put_blob(
        &self,
        name: &str,
        bytes: Vec<u8>,
        _content_type: Option<String>,
    ) -> Result<()> {
        let path = self.path_for(name)?;
        let size = bytes.len();

        let mut file = fs::File::create(&path)
            .await
            .with_context(|| format!("failed to create {}", path.display()))?;
        file.write_all(&bytes)
            .await
            .with_context(|| format!("failed to write {}", path.display()))?;
        file.sync_all()
            .await
            .with_context(|| format!("failed to sync {}", path.display()))?;

        info!(blob = %name, size_bytes = size, "stored blob on local disk");
        Ok(())
    }

    async fn exists(&self, name: &str) -> Result<bool> {
        let path = self.path_for(name)?;
        fs::try_exists(&path)
            .await
            .with_context(|| format!("failed to stat {}", path.display()))
    }

    async fn open_blob(&self, name: &str) -> Result<BlobStream> {
        let path = self.path_for(name)?;
        let file = fs::File::open(&path)
            .await
            .with_context(|| format!("failed to open {}", path.display()))?;
        Ok(Box::pin(ReaderStream::new(file)))
    }

    async fn delete_blob(&self, name: &str) -> Result<()> {
        let path = self.path_for(name)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err).with_context(|| format!("failed to delete {}", path.display())),
        }
    }
}

pub struct S3BlobStore {
    client: S3Client,
    bucket: String,
}

impl S3BlobStore {
    pub fn new(client: S3Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn put_blob(
        &self,
        name: &str,
        bytes: Vec<u8>,
        content_type: Option<String>,
    ) -> Result<()> {
        validate_blob_name(name)?;
        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(name)
            .body(ByteStream::from(bytes));

        if let Some(content_type) = content_type {
            request = request.content_type(content_type);
        }

        request
            .send()
            .await
            .context("failed to upload object to S3")?;

        Ok(())
    }

    async fn exists(&self, name: &str) -> Result<bool> {
        validate_blob_name(name)?;
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(name)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(err) => {
                if err
                    .as_service_error()
                    .map(|service_err| service_err.is_not_found())
                    .unwrap_or(false)
                {
                    Ok(false)
                } else {
                    Err(err).context("failed to check object in S3")
                }
            }
        }
    }

    async fn open_blob(&self, name: &str) -> Result<BlobStream> {
        validate_blob_name(name)?;
        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(name)
            .send()
            .await
            .context("failed to download object from S3")?;

        Ok(Box::pin(ReaderStream::new(response.body.into_async_read())))
    }

    async fn delete_blob(&self, name: &str) -> Result<()> {
        validate_blob_name(name)?;
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(name)
            .send()
            .await
            .context("failed to delete object from S3")?;
        Ok(())
    }
}
