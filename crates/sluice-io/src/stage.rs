//! Stage uploaders: moving finalized spools where the warehouse can load them.

use std::path::Path as FsPath;

use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use object_store::aws::{AmazonS3, AmazonS3Builder};
use object_store::path::Path as ObjectPath;
use object_store::ObjectStore;
use sluice_core::config::RedshiftConfig;
use sluice_core::StageRef;
use tracing::warn;

use crate::spool::SpooledGzip;

/// Moves a finalized spool to a stageable location and cleans it up after the
/// load. The loader depends only on this trait.
#[async_trait]
pub trait Stager: Send + Sync {
    async fn stage(&self, gzip: &SpooledGzip) -> Result<StageRef>;
    async fn unstage(&self, stage: &StageRef) -> Result<()>;
}

/// Object-storage stage for the `COPY`-loading dialect. Uploads the gzip
/// under the configured bucket/prefix; the loader unlinks the local file once
/// the bytes are in the store.
pub struct S3Stager {
    store: AmazonS3,
    bucket: String,
    prefix: String,
    iam_role: String,
}

impl S3Stager {
    pub fn new(config: &RedshiftConfig) -> Result<Self> {
        let store = AmazonS3Builder::new()
            .with_bucket_name(&config.s3_bucket_name)
            .with_region(&config.s3_bucket_region)
            .with_access_key_id(&config.access_key_id)
            .with_secret_access_key(&config.secret_access_key)
            .build()
            .context("build object store client")?;

        Ok(Self {
            store,
            bucket: config.s3_bucket_name.clone(),
            prefix: config.s3_bucket_path.trim_matches('/').to_string(),
            iam_role: config.iam_role_arn.clone(),
        })
    }

    fn object_key(&self, gzip: &SpooledGzip) -> Result<String> {
        let file_name = gzip
            .path
            .file_name()
            .and_then(|name| name.to_str())
            .with_context(|| format!("unusable spool file name: {}", gzip.path.display()))?;
        Ok(format!("{}/{}", self.prefix, file_name))
    }
}

#[async_trait]
impl Stager for S3Stager {
    async fn stage(&self, gzip: &SpooledGzip) -> Result<StageRef> {
        let key = self.object_key(gzip)?;
        let location = ObjectPath::from(key.as_str());
        let payload = Bytes::from(tokio::fs::read(&gzip.path).await.context("read gzip stage file")?);

        if let Err(err) = self.store.put(&location, payload.clone()).await {
            warn!(error = %err, key, "stage upload failed, retrying once");
            self.store.put(&location, payload).await.context("stage upload retry")?;
            self.store.head(&location).await.context("verify staged object")?;
        }

        Ok(StageRef::S3 {
            url: format!("s3://{}/{}", self.bucket, key),
            key,
            iam_role: self.iam_role.clone(),
        })
    }

    async fn unstage(&self, stage: &StageRef) -> Result<()> {
        let StageRef::S3 { key, .. } = stage else {
            anyhow::bail!("object-storage stager cannot unstage {}", stage.location());
        };
        let location = ObjectPath::from(key.as_str());

        if let Err(err) = self.store.delete(&location).await {
            warn!(error = %err, key, "stage delete failed, retrying once");
            self.store.delete(&location).await.context("stage delete retry")?;
        }
        Ok(())
    }
}

/// Local-file stage for the `LOAD DATA LOCAL INFILE` dialect. The gzip stays
/// where the spool put it; the warehouse client streams it from disk during
/// the load, and `unstage` unlinks it afterwards.
pub struct LocalStager;

#[async_trait]
impl Stager for LocalStager {
    async fn stage(&self, gzip: &SpooledGzip) -> Result<StageRef> {
        Ok(StageRef::Local {
            path: gzip.path.clone(),
        })
    }

    async fn unstage(&self, stage: &StageRef) -> Result<()> {
        let StageRef::Local { path } = stage else {
            anyhow::bail!("local stager cannot unstage {}", stage.location());
        };
        remove_staged_file(path).await
    }
}

async fn remove_staged_file(path: &FsPath) -> Result<()> {
    tokio::fs::remove_file(path)
        .await
        .with_context(|| format!("remove staged file {}", path.display()))
}
