//! S3-compatible storage backend over `aws-sdk-s3`.
//!
//! The SDK is async; workers are plain threads, so every call is driven with
//! `Handle::block_on` on the runtime handle the backend was built with. SDK
//! retries are disabled because the engine retries per item.

use std::fs::File;
use std::future::Future;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::time::{Duration, SystemTime};

use aws_sdk_s3::config::retry::RetryConfig;
use aws_sdk_s3::config::timeout::TimeoutConfig;
use aws_sdk_s3::config::{BehaviorVersion, Builder as ConfigBuilder, Credentials, Region};
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use aws_sdk_s3::Client;
use futures::{StreamExt, TryStreamExt};
use tokio::runtime::Handle;

use super::{ChunkPlan, Liveness, ListError, ListPage, RemoteEntry, StorageBackend};
use crate::error::{ConnectionError, TransferError};
use crate::progress::ProgressSink;
use crate::retry::{classify_http_status, error_for, ErrorKind};

const LIST_PAGE_KEYS: i32 = 1000;

/// Endpoint, bucket and static credentials.
#[derive(Clone)]
pub struct S3Settings {
    pub endpoint: String,
    pub region: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    pub timeout: Duration,
}

impl std::fmt::Debug for S3Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Settings")
            .field("endpoint", &self.endpoint)
            .field("region", &self.region)
            .field("bucket", &self.bucket)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl S3Settings {
    pub fn validate(&self) -> Result<(), ConnectionError> {
        if !self.endpoint.starts_with("http://") && !self.endpoint.starts_with("https://") {
            return Err(ConnectionError::Config(format!(
                "endpoint must be an http(s) URL, got {:?}",
                self.endpoint
            )));
        }
        if self.bucket.trim().is_empty() {
            return Err(ConnectionError::Config("bucket is required".into()));
        }
        if self.access_key.is_empty() || self.secret_key.is_empty() {
            return Err(ConnectionError::Config("access key and secret key are required".into()));
        }
        Ok(())
    }
}

/// One configured SDK client. Cheap to clone; per-session for pool accounting.
pub struct S3Session {
    client: Client,
}

pub struct S3Backend {
    settings: S3Settings,
    runtime: Handle,
}

impl S3Backend {
    pub fn new(settings: S3Settings, runtime: Handle) -> Result<Self, ConnectionError> {
        settings.validate()?;
        Ok(Self { settings, runtime })
    }

    fn block_on<F: Future>(&self, fut: F) -> F::Output {
        self.runtime.block_on(fut)
    }

    fn build_client(&self) -> Client {
        let s = &self.settings;
        let credentials = Credentials::new(&s.access_key, &s.secret_key, None, None, "ferry");
        let config = ConfigBuilder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(s.region.clone()))
            .endpoint_url(&s.endpoint)
            .credentials_provider(credentials)
            .force_path_style(true)
            .retry_config(RetryConfig::disabled())
            .timeout_config(
                TimeoutConfig::builder()
                    .connect_timeout(s.timeout)
                    .read_timeout(s.timeout)
                    .build(),
            )
            .build();
        Client::from_conf(config)
    }

    async fn upload_parts(
        &self,
        client: &Client,
        key: &str,
        upload_id: &str,
        source: &Path,
        plan: &ChunkPlan,
        progress: &ProgressSink,
    ) -> Result<Vec<CompletedPart>, TransferError> {
        let len = std::fs::metadata(source)?.len();
        let chunk_size = plan.chunk_size_for(len);
        let count = plan.chunk_count(len);
        let bucket = self.settings.bucket.as_str();
        let mut parts: Vec<CompletedPart> = futures::stream::iter(1..=count)
            .map(|part| async move {
                let (offset, size) = part_range(part, chunk_size, len);
                let body = read_chunk(source, offset, size)?;
                let resp = client
                    .upload_part()
                    .bucket(bucket)
                    .key(key)
                    .upload_id(upload_id)
                    .part_number(part as i32)
                    .content_length(size as i64)
                    .body(ByteStream::from(body))
                    .send()
                    .await
                    .map_err(|e| map_sdk_error("UploadPart", e))?;
                progress.add(size);
                Ok::<_, TransferError>(
                    CompletedPart::builder()
                        .part_number(part as i32)
                        .set_e_tag(resp.e_tag().map(str::to_string))
                        .build(),
                )
            })
            .buffer_unordered(plan.concurrency.max(1))
            .try_collect()
            .await?;
        parts.sort_by_key(|p| p.part_number());
        Ok(parts)
    }
}

impl StorageBackend for S3Backend {
    type Session = S3Session;

    fn describe(&self) -> String {
        format!("s3://{}@{}", self.settings.bucket, self.settings.endpoint)
    }

    fn connect(&self) -> Result<S3Session, ConnectionError> {
        let client = self.build_client();
        self.block_on(client.head_bucket().bucket(&self.settings.bucket).send())
            .map_err(|e| connection_error(&self.settings.bucket, e))?;
        Ok(S3Session { client })
    }

    fn probe(&self, session: &mut S3Session) -> Liveness {
        let head = session.client.head_bucket().bucket(&self.settings.bucket).send();
        match self.block_on(head) {
            Ok(_) => Liveness::Alive,
            Err(_) => Liveness::Dead,
        }
    }

    fn close(&self, _session: S3Session) {}

    fn size(&self, session: &mut S3Session, key: &str) -> Option<u64> {
        let head = session
            .client
            .head_object()
            .bucket(&self.settings.bucket)
            .key(key)
            .send();
        let out = self.block_on(head).ok()?;
        out.content_length().and_then(|n| u64::try_from(n).ok())
    }

    fn read_stream(
        &self,
        session: &mut S3Session,
        key: &str,
        writer: &mut dyn Write,
    ) -> Result<u64, TransferError> {
        let get = session
            .client
            .get_object()
            .bucket(&self.settings.bucket)
            .key(key)
            .send();
        let out = self.block_on(get).map_err(|e| map_sdk_error("GetObject", e))?;
        let mut body = out.body;
        let mut total = 0u64;
        while let Some(chunk) = self
            .block_on(body.try_next())
            .map_err(|e| TransferError::Connection(format!("GetObject body: {e}")))?
        {
            writer.write_all(&chunk)?;
            total += chunk.len() as u64;
        }
        Ok(total)
    }

    fn write_stream(
        &self,
        session: &mut S3Session,
        key: &str,
        reader: &mut dyn Read,
        len: u64,
    ) -> Result<u64, TransferError> {
        let mut body = Vec::with_capacity(len as usize);
        reader.read_to_end(&mut body)?;
        let sent = body.len() as u64;
        let put = session
            .client
            .put_object()
            .bucket(&self.settings.bucket)
            .key(key)
            .content_length(sent as i64)
            .body(ByteStream::from(body))
            .send();
        self.block_on(put).map_err(|e| map_sdk_error("PutObject", e))?;
        Ok(sent)
    }

    fn write_chunked(
        &self,
        session: &mut S3Session,
        key: &str,
        source: &Path,
        plan: &ChunkPlan,
        progress: &ProgressSink,
    ) -> Result<u64, TransferError> {
        let client = session.client.clone();
        let bucket = self.settings.bucket.as_str();
        let created = self
            .block_on(client.create_multipart_upload().bucket(bucket).key(key).send())
            .map_err(|e| map_sdk_error("CreateMultipartUpload", e))?;
        let upload_id = created
            .upload_id()
            .ok_or_else(|| TransferError::Other("CreateMultipartUpload returned no upload id".into()))?
            .to_string();
        tracing::debug!(key, upload_id = %upload_id, chunk_size = plan.chunk_size, "multipart upload started");

        let parts = match self.block_on(self.upload_parts(&client, key, &upload_id, source, plan, progress)) {
            Ok(parts) => parts,
            Err(e) => {
                let abort = client
                    .abort_multipart_upload()
                    .bucket(bucket)
                    .key(key)
                    .upload_id(&upload_id)
                    .send();
                if let Err(abort_err) = self.block_on(abort) {
                    tracing::warn!(key, error = %DisplayErrorContext(&abort_err), "abort multipart upload failed");
                }
                return Err(e);
            }
        };

        let part_count = parts.len();
        let complete = client
            .complete_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(&upload_id)
            .multipart_upload(CompletedMultipartUpload::builder().set_parts(Some(parts)).build())
            .send();
        self.block_on(complete)
            .map_err(|e| map_sdk_error("CompleteMultipartUpload", e))?;
        tracing::debug!(key, parts = part_count, "multipart upload completed");
        Ok(std::fs::metadata(source)?.len())
    }

    fn ensure_remote_dir(&self, _session: &mut S3Session, _path: &str) -> Result<(), TransferError> {
        Ok(())
    }

    fn list(
        &self,
        session: &mut S3Session,
        prefix: &str,
        token: Option<&str>,
    ) -> Result<ListPage, ListError> {
        let request = session
            .client
            .list_objects_v2()
            .bucket(&self.settings.bucket)
            .prefix(prefix)
            .max_keys(LIST_PAGE_KEYS)
            .set_continuation_token(token.map(str::to_string))
            .send();
        let out = match self.block_on(request) {
            Ok(out) => out,
            Err(e) => {
                return Err(match map_sdk_error("ListObjectsV2", e) {
                    TransferError::NotFound(_) => ListError::NotFound,
                    other => ListError::Transfer(other),
                })
            }
        };
        let entries = out
            .contents()
            .iter()
            .filter_map(|obj| {
                let key = obj.key()?;
                Some(RemoteEntry {
                    key: key.to_string(),
                    size: obj.size().and_then(|n| u64::try_from(n).ok()).unwrap_or(0),
                    modified_at: obj
                        .last_modified()
                        .and_then(|t| SystemTime::try_from(t.clone()).ok()),
                    is_dir: key.ends_with('/'),
                })
            })
            .collect();
        let next_token = if out.is_truncated().unwrap_or(false) {
            out.next_continuation_token().map(str::to_string)
        } else {
            None
        };
        Ok(ListPage { entries, next_token })
    }
}

/// Byte range of 1-based `part` for a file of `len` bytes.
fn part_range(part: u64, chunk_size: u64, len: u64) -> (u64, u64) {
    let offset = (part - 1) * chunk_size;
    (offset, chunk_size.min(len.saturating_sub(offset)))
}

fn read_chunk(source: &Path, offset: u64, size: u64) -> io::Result<Vec<u8>> {
    let mut file = File::open(source)?;
    file.seek(SeekFrom::Start(offset))?;
    let mut buf = vec![0u8; size as usize];
    file.read_exact(&mut buf)?;
    Ok(buf)
}

/// Retry kind for an S3 error response. Error codes win over the status.
fn classify_s3(status: u16, code: Option<&str>) -> ErrorKind {
    match code {
        Some("SlowDown") | Some("RequestLimitExceeded") => ErrorKind::Throttled,
        Some("NoSuchKey") | Some("NoSuchBucket") => ErrorKind::NotFound,
        Some("AccessDenied") | Some("InvalidAccessKeyId") | Some("SignatureDoesNotMatch") => {
            ErrorKind::PermissionDenied
        }
        Some("RequestTimeout") => ErrorKind::Timeout,
        _ => classify_http_status(status),
    }
}

fn map_sdk_error<E>(op: &str, err: SdkError<E>) -> TransferError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    let detail = format!("{op}: {}", DisplayErrorContext(&err));
    match &err {
        SdkError::TimeoutError(_) => TransferError::Timeout(detail),
        SdkError::DispatchFailure(failure) if failure.is_timeout() => TransferError::Timeout(detail),
        SdkError::DispatchFailure(_) | SdkError::ResponseError(_) => TransferError::Connection(detail),
        SdkError::ServiceError(ctx) => {
            let status = ctx.raw().status().as_u16();
            error_for(classify_s3(status, err.code()), detail)
        }
        _ => TransferError::Other(detail),
    }
}

fn connection_error<E>(bucket: &str, err: SdkError<E>) -> ConnectionError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    match map_sdk_error("HeadBucket", err) {
        TransferError::Timeout(m) => ConnectionError::Timeout(m),
        TransferError::Connection(m) => ConnectionError::Unreachable(m),
        TransferError::PermissionDenied(m) => ConnectionError::Auth(m),
        TransferError::NotFound(_) => ConnectionError::Rejected(format!("bucket {bucket} not found")),
        other => ConnectionError::Rejected(other.to_string()),
    }
}
