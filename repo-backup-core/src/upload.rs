//! S3 upload of the finished archive.

use std::path::Path;

use async_trait::async_trait;
use aws_config::meta::region::RegionProviderChain;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::operation::put_object::PutObjectError;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use tracing::{error, info, instrument};

use crate::contract::{ArchiveStore, StorageTarget, UploadOutcome};

/// Region used when neither the target nor the environment names one.
pub const DEFAULT_REGION: &str = "us-east-1";

pub const PROVENANCE_TAG_KEY: &str = "Purpose";
pub const PROVENANCE_TAG_VALUE: &str = "Created from repo-backup tool";

/// [`ArchiveStore`] writing to Amazon S3.
pub struct S3Store {
    client: Client,
}

impl S3Store {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Builds a client from the ambient AWS configuration (env, profile, IMDS).
    ///
    /// `region` wins over the environment; [`DEFAULT_REGION`] is the last resort.
    pub async fn from_env(region: Option<String>) -> Self {
        let region = RegionProviderChain::first_try(region.map(Region::new))
            .or_default_provider()
            .or_else(Region::new(DEFAULT_REGION));
        let config = aws_config::defaults(BehaviorVersion::latest())
            .region(region)
            .load()
            .await;
        Self::new(Client::new(&config))
    }
}

#[async_trait]
impl ArchiveStore for S3Store {
    #[instrument(skip(self), fields(bucket = %target.bucket, file = %file.display()))]
    async fn upload(&self, target: &StorageTarget, file: &Path) -> UploadOutcome {
        let Some(key) = object_key(target.key_prefix.as_deref(), file) else {
            error!("Archive path has no file name");
            return UploadOutcome::FailedLocal(format!("{} has no file name", file.display()));
        };

        let body = match ByteStream::from_path(file).await {
            Ok(body) => body,
            Err(e) => {
                error!(error = ?e, "Failed to open archive for upload");
                return UploadOutcome::FailedLocal(format!("cannot read {}: {e}", file.display()));
            }
        };

        let result = self
            .client
            .put_object()
            .bucket(&target.bucket)
            .key(&key)
            .body(body)
            .tagging(provenance_tagging())
            .send()
            .await;

        match result {
            Ok(_) => {
                info!(%key, "Object {} uploaded", key);
                UploadOutcome::Succeeded { key }
            }
            Err(e) => {
                let outcome = classify_put_error(e);
                error!(%key, ?outcome, "S3 PutObject failed");
                outcome
            }
        }
    }
}

/// Object key for `file`: its base name, under `prefix` when one is given.
pub fn object_key(prefix: Option<&str>, file: &Path) -> Option<String> {
    let name = file.file_name()?.to_string_lossy().into_owned();
    match prefix.map(|p| p.trim_end_matches('/')) {
        Some(p) if !p.is_empty() => Some(format!("{p}/{name}")),
        _ => Some(name),
    }
}

/// URL-encoded `Tagging` header value marking the object as ours.
pub fn provenance_tagging() -> String {
    format!(
        "{}={}",
        PROVENANCE_TAG_KEY,
        urlencoding::encode(PROVENANCE_TAG_VALUE)
    )
}

/// Anything S3 answered is remote, even when the answer could not be parsed;
/// failures that never got a response are local.
pub fn classify_put_error(err: SdkError<PutObjectError>) -> UploadOutcome {
    match &err {
        SdkError::ServiceError(service) => {
            let e = service.err();
            UploadOutcome::FailedRemote {
                code: e
                    .code()
                    .map(str::to_string)
                    .unwrap_or_else(|| service.raw().status().as_u16().to_string()),
                message: e
                    .message()
                    .map(str::to_string)
                    .unwrap_or_else(|| DisplayErrorContext(e).to_string()),
            }
        }
        SdkError::ResponseError(response) => UploadOutcome::FailedRemote {
            code: response.raw().status().as_u16().to_string(),
            message: DisplayErrorContext(&err).to_string(),
        },
        _ => UploadOutcome::FailedLocal(DisplayErrorContext(&err).to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_s3::config::http::HttpResponse;
    use aws_sdk_s3::error::ErrorMetadata;
    use aws_smithy_runtime_api::http::StatusCode;
    use aws_smithy_types::body::SdkBody;
    use std::path::PathBuf;

    #[test]
    fn key_is_base_name_without_prefix() {
        let file = PathBuf::from("out/backup-1700000000.zip");
        assert_eq!(object_key(None, &file).as_deref(), Some("backup-1700000000.zip"));
        assert_eq!(object_key(Some(""), &file).as_deref(), Some("backup-1700000000.zip"));
    }

    #[test]
    fn key_joins_prefix_and_base_name() {
        let file = PathBuf::from("/var/tmp/backup-1.zip");
        assert_eq!(object_key(Some("github"), &file).as_deref(), Some("github/backup-1.zip"));
        assert_eq!(object_key(Some("a/b/"), &file).as_deref(), Some("a/b/backup-1.zip"));
    }

    #[test]
    fn tagging_is_url_encoded() {
        assert_eq!(provenance_tagging(), "Purpose=Created%20from%20repo-backup%20tool");
    }

    fn raw_response(status: u16, body: &'static str) -> HttpResponse {
        HttpResponse::new(StatusCode::try_from(status).unwrap(), SdkBody::from(body))
    }

    #[test]
    fn service_error_keeps_code_and_message() {
        let err = PutObjectError::generic(
            ErrorMetadata::builder()
                .code("AccessDenied")
                .message("Access Denied")
                .build(),
        );
        let outcome = classify_put_error(SdkError::service_error(err, raw_response(403, "")));
        assert_eq!(
            outcome,
            UploadOutcome::FailedRemote {
                code: "AccessDenied".to_string(),
                message: "Access Denied".to_string(),
            }
        );
    }

    #[test]
    fn service_error_without_code_uses_http_status() {
        let err = PutObjectError::generic(ErrorMetadata::builder().build());
        let outcome = classify_put_error(SdkError::service_error(err, raw_response(503, "")));
        assert!(matches!(outcome, UploadOutcome::FailedRemote { code, .. } if code == "503"));
    }

    #[test]
    fn unparseable_response_is_remote() {
        let outcome = classify_put_error(SdkError::response_error(
            "unparseable body",
            raw_response(500, "<html>oops</html>"),
        ));
        assert!(
            matches!(&outcome, UploadOutcome::FailedRemote { code, message } if code == "500" && message.contains("unparseable body")),
            "got {outcome:?}"
        );
    }

    #[test]
    fn construction_failure_is_local() {
        let outcome = classify_put_error(SdkError::construction_failure("bad request"));
        assert!(matches!(outcome, UploadOutcome::FailedLocal(_)));
    }

    fn offline_store() -> S3Store {
        let config = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(DEFAULT_REGION))
            .build();
        S3Store::new(Client::from_conf(config))
    }

    #[tokio::test]
    async fn missing_archive_fails_locally() {
        let dir = tempfile::tempdir().unwrap();
        let target = StorageTarget {
            bucket: "bucket".to_string(),
            key_prefix: None,
            region: None,
        };
        let outcome = offline_store()
            .upload(&target, &dir.path().join("missing.zip"))
            .await;
        assert!(matches!(outcome, UploadOutcome::FailedLocal(msg) if msg.contains("missing.zip")));
    }
}
