//! `ObjectClient` backed by the AWS SDK for Rust
//!
//! The adapter confines every `aws-sdk-s3` type to this module; the rest of
//! the engine only sees the capability trait. Request retries, signing, and
//! endpoint resolution stay the SDK's concern.

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types as s3types;

use super::{
    AbortMultipartUploadInput, ClientResult, CompleteMultipartUploadInput,
    CompleteMultipartUploadOutput, CreateMultipartUploadInput, CreateMultipartUploadOutput,
    GetObjectInput, GetObjectOutput, ListObjectsInput, ListObjectsPage, ObjectClient,
    ObjectSummary, PutObjectInput, PutObjectOutput, UploadPartInput, UploadPartOutput,
};
use crate::error::ClientError;
use crate::upload::{ChecksumAlgorithm, ChecksumType};

/// AWS S3 implementation of [`ObjectClient`]
#[derive(Debug, Clone)]
pub struct AwsObjectClient {
    client: aws_sdk_s3::Client,
}

impl AwsObjectClient {
    /// Wrap an already-configured SDK client
    pub fn new(client: aws_sdk_s3::Client) -> Self {
        Self { client }
    }

    /// Build a client from the default credential and region chain
    pub async fn from_env() -> Self {
        let config = aws_config::load_defaults(BehaviorVersion::latest()).await;
        Self::new(aws_sdk_s3::Client::new(&config))
    }

    /// The underlying SDK client
    pub fn inner(&self) -> &aws_sdk_s3::Client {
        &self.client
    }
}

fn sdk_err<E>(error: E) -> ClientError
where
    E: std::error::Error + Send + Sync + 'static,
{
    Box::new(error)
}

fn to_sdk_algorithm(algorithm: ChecksumAlgorithm) -> s3types::ChecksumAlgorithm {
    match algorithm {
        ChecksumAlgorithm::Crc32 => s3types::ChecksumAlgorithm::Crc32,
        ChecksumAlgorithm::Crc32C => s3types::ChecksumAlgorithm::Crc32C,
        ChecksumAlgorithm::Crc64Nvme => s3types::ChecksumAlgorithm::Crc64Nvme,
        ChecksumAlgorithm::Sha1 => s3types::ChecksumAlgorithm::Sha1,
        ChecksumAlgorithm::Sha256 => s3types::ChecksumAlgorithm::Sha256,
    }
}

fn to_sdk_checksum_type(checksum_type: ChecksumType) -> s3types::ChecksumType {
    match checksum_type {
        ChecksumType::FullObject => s3types::ChecksumType::FullObject,
        ChecksumType::Composite => s3types::ChecksumType::Composite,
    }
}

#[async_trait]
impl ObjectClient for AwsObjectClient {
    async fn put_object(&self, input: PutObjectInput) -> ClientResult<PutObjectOutput> {
        let mut request = self
            .client
            .put_object()
            .bucket(input.bucket)
            .key(input.key)
            .body(ByteStream::from(input.body))
            .set_content_type(input.content_type);
        if !input.metadata.is_empty() {
            request = request.set_metadata(Some(input.metadata));
        }
        match (input.checksum_algorithm, input.full_object_checksum) {
            // A precomputed value is sent as-is; the algorithm parameter is
            // only for requesting a client-side computation.
            (Some(algorithm), Some(value)) => {
                request = match algorithm {
                    ChecksumAlgorithm::Crc32 => request.checksum_crc32(value),
                    ChecksumAlgorithm::Crc32C => request.checksum_crc32_c(value),
                    ChecksumAlgorithm::Crc64Nvme => request.checksum_crc64_nvme(value),
                    ChecksumAlgorithm::Sha1 => request.checksum_sha1(value),
                    ChecksumAlgorithm::Sha256 => request.checksum_sha256(value),
                };
            }
            (Some(algorithm), None) => {
                request = request.checksum_algorithm(to_sdk_algorithm(algorithm));
            }
            _ => {}
        }

        let output = request.send().await.map_err(sdk_err)?;
        Ok(PutObjectOutput {
            e_tag: output.e_tag().map(str::to_string),
        })
    }

    async fn create_multipart_upload(
        &self,
        input: CreateMultipartUploadInput,
    ) -> ClientResult<CreateMultipartUploadOutput> {
        let mut request = self
            .client
            .create_multipart_upload()
            .bucket(input.bucket)
            .key(input.key)
            .set_content_type(input.content_type);
        if !input.metadata.is_empty() {
            request = request.set_metadata(Some(input.metadata));
        }
        if let Some(algorithm) = input.checksum_algorithm {
            request = request
                .checksum_algorithm(to_sdk_algorithm(algorithm))
                .checksum_type(to_sdk_checksum_type(input.checksum_type));
        }

        let output = request.send().await.map_err(sdk_err)?;
        let upload_id = output
            .upload_id()
            .ok_or_else(|| -> ClientError { "no upload id returned".into() })?
            .to_string();
        Ok(CreateMultipartUploadOutput { upload_id })
    }

    async fn upload_part(&self, input: UploadPartInput) -> ClientResult<UploadPartOutput> {
        let mut request = self
            .client
            .upload_part()
            .bucket(input.bucket)
            .key(input.key)
            .upload_id(input.upload_id)
            .part_number(input.part_number)
            .body(ByteStream::from(input.body));
        if let Some(algorithm) = input.checksum_algorithm {
            request = request.checksum_algorithm(to_sdk_algorithm(algorithm));
        }

        let output = request.send().await.map_err(sdk_err)?;
        let e_tag = output
            .e_tag()
            .ok_or_else(|| -> ClientError { "no etag returned for part".into() })?
            .to_string();

        let checksum = input.checksum_algorithm.and_then(|algorithm| {
            match algorithm {
                ChecksumAlgorithm::Crc32 => output.checksum_crc32(),
                ChecksumAlgorithm::Crc32C => output.checksum_crc32_c(),
                ChecksumAlgorithm::Crc64Nvme => output.checksum_crc64_nvme(),
                ChecksumAlgorithm::Sha1 => output.checksum_sha1(),
                ChecksumAlgorithm::Sha256 => output.checksum_sha256(),
            }
            .map(str::to_string)
        });

        Ok(UploadPartOutput { e_tag, checksum })
    }

    async fn complete_multipart_upload(
        &self,
        input: CompleteMultipartUploadInput,
    ) -> ClientResult<CompleteMultipartUploadOutput> {
        let parts: Vec<s3types::CompletedPart> = input
            .parts
            .iter()
            .map(|part| {
                let mut builder = s3types::CompletedPart::builder()
                    .part_number(part.part_number)
                    .e_tag(&part.e_tag);
                if let (Some(algorithm), Some(checksum)) =
                    (input.checksum_algorithm, part.checksum.as_deref())
                {
                    builder = match algorithm {
                        ChecksumAlgorithm::Crc32 => builder.checksum_crc32(checksum),
                        ChecksumAlgorithm::Crc32C => builder.checksum_crc32_c(checksum),
                        ChecksumAlgorithm::Crc64Nvme => builder.checksum_crc64_nvme(checksum),
                        ChecksumAlgorithm::Sha1 => builder.checksum_sha1(checksum),
                        ChecksumAlgorithm::Sha256 => builder.checksum_sha256(checksum),
                    };
                }
                builder.build()
            })
            .collect();

        let multipart_upload = s3types::CompletedMultipartUpload::builder()
            .set_parts(Some(parts))
            .build();

        let mut request = self
            .client
            .complete_multipart_upload()
            .bucket(input.bucket)
            .key(input.key)
            .upload_id(input.upload_id)
            .multipart_upload(multipart_upload);
        if let (Some(algorithm), Some(value)) =
            (input.checksum_algorithm, input.full_object_checksum)
        {
            request = request.checksum_type(s3types::ChecksumType::FullObject);
            request = match algorithm {
                ChecksumAlgorithm::Crc32 => request.checksum_crc32(value),
                ChecksumAlgorithm::Crc32C => request.checksum_crc32_c(value),
                ChecksumAlgorithm::Crc64Nvme => request.checksum_crc64_nvme(value),
                ChecksumAlgorithm::Sha1 => request.checksum_sha1(value),
                ChecksumAlgorithm::Sha256 => request.checksum_sha256(value),
            };
        }

        let output = request.send().await.map_err(sdk_err)?;

        Ok(CompleteMultipartUploadOutput {
            e_tag: output.e_tag().map(str::to_string),
        })
    }

    async fn abort_multipart_upload(&self, input: AbortMultipartUploadInput) -> ClientResult<()> {
        self.client
            .abort_multipart_upload()
            .bucket(input.bucket)
            .key(input.key)
            .upload_id(input.upload_id)
            .send()
            .await
            .map_err(sdk_err)?;
        Ok(())
    }

    async fn get_object(&self, input: GetObjectInput) -> ClientResult<GetObjectOutput> {
        let mut request = self
            .client
            .get_object()
            .bucket(input.bucket)
            .key(input.key)
            .set_part_number(input.part_number)
            .set_range(input.range)
            .set_if_match(input.if_match);
        // WhenSupported leaves the SDK's own validate-when-present default.
        if input.checksum_validation == crate::config::ChecksumMode::Required {
            request = request.checksum_mode(s3types::ChecksumMode::Enabled);
        }

        let output = request.send().await.map_err(sdk_err)?;

        let content_range = output.content_range().map(str::to_string);
        let e_tag = output.e_tag().map(str::to_string);
        let parts_count = output.parts_count();
        let content_length = output.content_length().unwrap_or_default().max(0) as u64;

        let body = output.body.collect().await.map_err(sdk_err)?.into_bytes();

        Ok(GetObjectOutput {
            body,
            content_length,
            content_range,
            e_tag,
            parts_count,
        })
    }

    async fn list_objects_v2(&self, input: ListObjectsInput) -> ClientResult<ListObjectsPage> {
        let output = self
            .client
            .list_objects_v2()
            .bucket(input.bucket)
            .set_prefix(input.prefix)
            .set_continuation_token(input.continuation_token)
            .set_max_keys(input.max_keys)
            .send()
            .await
            .map_err(sdk_err)?;

        let objects = output
            .contents()
            .iter()
            .filter_map(|object| {
                Some(ObjectSummary {
                    key: object.key()?.to_string(),
                    size: object.size().unwrap_or_default().max(0) as u64,
                    e_tag: object.e_tag().map(str::to_string),
                })
            })
            .collect();

        Ok(ListObjectsPage {
            objects,
            next_continuation_token: output.next_continuation_token().map(str::to_string),
            is_truncated: output.is_truncated().unwrap_or(false),
        })
    }
}
