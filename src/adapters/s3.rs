use std::time::Duration;

use aws_config::BehaviorVersion;
use aws_sdk_s3::{
    config::{Builder, Credentials, Region},
    presigning::PresigningConfig,
    primitives::ByteStream,
    types::{
        BucketCannedAcl, BucketLocationConstraint, CompletedMultipartUpload, CompletedPart,
        CreateBucketConfiguration, Delete, MetadataDirective, ObjectCannedAcl, ObjectIdentifier,
        StorageClass,
    },
};
use futures::{stream, StreamExt, TryStreamExt};
use serde_json::Value;
use tracing::{debug, warn};

use crate::{
    adapters::{
        fields::{Fields, Output},
        ObjectStore, StoreFuture,
    },
    model::{
        error::{Error, RemoteError, Result},
        options::Options,
        request::{SignedOperation, TransferOptions, DEFAULT_SIGNED_URL_EXPIRES, MIN_PART_SIZE},
    },
};

const CREDENTIALS_PROVIDER: &str = "scube";
const MAX_PARTS: usize = 10_000;

/// Builds the SDK client for validated `options`. Without an explicit key
/// pair the default provider chain (environment, profile, IMDS) is used.
pub async fn client_from_options(options: &Options) -> aws_sdk_s3::Client {
    let mut loader =
        aws_config::defaults(BehaviorVersion::latest()).region(Region::new(options.region.clone()));

    if let (Some(public_key), Some(secret_key)) = (&options.public_key, &options.secret_key) {
        loader = loader.credentials_provider(Credentials::new(
            public_key,
            secret_key,
            None,
            None,
            CREDENTIALS_PROVIDER,
        ));
    }

    if let Some(endpoint) = &options.endpoint {
        loader = loader.endpoint_url(endpoint);
    }

    let sdk_config = loader.load().await;
    let config = Builder::from(&sdk_config)
        .force_path_style(options.force_path_style)
        .build();

    aws_sdk_s3::Client::from_conf(config)
}

impl ObjectStore for aws_sdk_s3::Client {
    fn copy_object(&self, input: Value) -> StoreFuture<'_, Value> {
        Box::pin(async move {
            let fields = Fields::new(input)?;

            let co = self
                .copy_object()
                .bucket(fields.required_str("Bucket")?)
                .key(fields.required_str("Key")?)
                .copy_source(fields.required_str("CopySource")?)
                .set_cache_control(fields.str("CacheControl")?)
                .set_content_type(fields.str("ContentType")?)
                .set_content_disposition(fields.str("ContentDisposition")?)
                .set_content_encoding(fields.str("ContentEncoding")?)
                .set_metadata(fields.metadata("Metadata")?)
                .set_metadata_directive(
                    fields.str("MetadataDirective")?.map(|v| MetadataDirective::from(v.as_str())),
                )
                .set_storage_class(
                    fields.str("StorageClass")?.map(|v| StorageClass::from(v.as_str())),
                )
                .set_acl(fields.str("ACL")?.map(|v| ObjectCannedAcl::from(v.as_str())))
                .set_copy_source_if_match(fields.str("CopySourceIfMatch")?)
                .set_copy_source_if_none_match(fields.str("CopySourceIfNoneMatch")?)
                .send()
                .await?;

            let result = co.copy_object_result().map(|result| {
                Output::new()
                    .set("ETag", result.e_tag())
                    .time("LastModified", result.last_modified())
                    .build()
            });

            Ok(Output::new()
                .set("CopyObjectResult", result)
                .set("CopySourceVersionId", co.copy_source_version_id())
                .set("VersionId", co.version_id())
                .build())
        })
    }

    fn create_bucket(&self, input: Value) -> StoreFuture<'_, Value> {
        Box::pin(async move {
            let fields = Fields::new(input)?;

            let configuration = match fields.structure("CreateBucketConfiguration")? {
                Some(configuration) => Some(
                    CreateBucketConfiguration::builder()
                        .set_location_constraint(
                            configuration
                                .str("LocationConstraint")?
                                .map(|v| BucketLocationConstraint::from(v.as_str())),
                        )
                        .build(),
                ),
                None => None,
            };

            let cb = self
                .create_bucket()
                .bucket(fields.required_str("Bucket")?)
                .set_acl(fields.str("ACL")?.map(|v| BucketCannedAcl::from(v.as_str())))
                .set_create_bucket_configuration(configuration)
                .send()
                .await?;

            Ok(Output::new().set("Location", cb.location()).build())
        })
    }

    fn delete_bucket(&self, input: Value) -> StoreFuture<'_, Value> {
        Box::pin(async move {
            let fields = Fields::new(input)?;

            self.delete_bucket()
                .bucket(fields.required_str("Bucket")?)
                .send()
                .await?;

            Ok(Output::new().build())
        })
    }

    fn delete_object(&self, input: Value) -> StoreFuture<'_, Value> {
        Box::pin(async move {
            let fields = Fields::new(input)?;

            let d = self
                .delete_object()
                .bucket(fields.required_str("Bucket")?)
                .key(fields.required_str("Key")?)
                .set_version_id(fields.str("VersionId")?)
                .send()
                .await?;

            Ok(Output::new()
                .set("DeleteMarker", d.delete_marker())
                .set("VersionId", d.version_id())
                .build())
        })
    }

    fn delete_objects(&self, input: Value) -> StoreFuture<'_, Value> {
        Box::pin(async move {
            let fields = Fields::new(input)?;
            let delete = fields
                .structure("Delete")?
                .ok_or_else(|| Error::Param("Missing required key 'Delete' in params".to_string()))?;

            let objects = delete
                .list("Objects")?
                .iter()
                .map(|object| -> Result<ObjectIdentifier> {
                    Ok(ObjectIdentifier::builder()
                        .key(object.required_str("Key")?)
                        .set_version_id(object.str("VersionId")?)
                        .build()?)
                })
                .collect::<Result<Vec<_>>>()?;

            let request = Delete::builder()
                .set_objects(Some(objects))
                .set_quiet(delete.bool("Quiet")?)
                .build()?;

            let dos = self
                .delete_objects()
                .bucket(fields.required_str("Bucket")?)
                .delete(request)
                .send()
                .await?;

            let deleted = dos
                .deleted()
                .iter()
                .map(|d| {
                    Output::new()
                        .set("Key", d.key())
                        .set("VersionId", d.version_id())
                        .set("DeleteMarker", d.delete_marker())
                        .build()
                })
                .collect::<Vec<_>>();

            let errors = dos
                .errors()
                .iter()
                .map(|e| {
                    Output::new()
                        .set("Key", e.key())
                        .set("VersionId", e.version_id())
                        .set("Code", e.code())
                        .set("Message", e.message())
                        .build()
                })
                .collect::<Vec<_>>();

            Ok(Output::new()
                .set("Deleted", Some(deleted))
                .set("Errors", Some(errors))
                .build())
        })
    }

    fn get_object(&self, input: Value) -> StoreFuture<'_, Value> {
        Box::pin(async move {
            let fields = Fields::new(input)?;

            let o = self
                .get_object()
                .bucket(fields.required_str("Bucket")?)
                .key(fields.required_str("Key")?)
                .set_range(fields.str("Range")?)
                .set_version_id(fields.str("VersionId")?)
                .set_if_match(fields.str("IfMatch")?)
                .set_if_none_match(fields.str("IfNoneMatch")?)
                .send()
                .await?;

            let output = Output::new()
                .set("ContentLength", o.content_length())
                .set("ContentType", o.content_type())
                .set("ContentEncoding", o.content_encoding())
                .set("ContentDisposition", o.content_disposition())
                .set("CacheControl", o.cache_control())
                .set("ETag", o.e_tag())
                .time("LastModified", o.last_modified())
                .metadata("Metadata", o.metadata())
                .set("VersionId", o.version_id());

            let bytes = o.body.collect().await.map_err(RemoteError::transport)?;

            Ok(output.set("Body", Some(bytes.into_bytes().to_vec())).build())
        })
    }

    fn head_bucket(&self, input: Value) -> StoreFuture<'_, Value> {
        Box::pin(async move {
            let fields = Fields::new(input)?;

            let hb = self
                .head_bucket()
                .bucket(fields.required_str("Bucket")?)
                .send()
                .await?;

            Ok(Output::new().set("BucketRegion", hb.bucket_region()).build())
        })
    }

    fn head_object(&self, input: Value) -> StoreFuture<'_, Value> {
        Box::pin(async move {
            let fields = Fields::new(input)?;

            let ho = self
                .head_object()
                .bucket(fields.required_str("Bucket")?)
                .key(fields.required_str("Key")?)
                .set_range(fields.str("Range")?)
                .set_version_id(fields.str("VersionId")?)
                .set_if_match(fields.str("IfMatch")?)
                .set_if_none_match(fields.str("IfNoneMatch")?)
                .send()
                .await?;

            Ok(Output::new()
                .set("ContentLength", ho.content_length())
                .set("ContentType", ho.content_type())
                .set("ContentEncoding", ho.content_encoding())
                .set("ContentDisposition", ho.content_disposition())
                .set("CacheControl", ho.cache_control())
                .set("ETag", ho.e_tag())
                .time("LastModified", ho.last_modified())
                .metadata("Metadata", ho.metadata())
                .set("StorageClass", ho.storage_class().map(|v| v.as_str()))
                .set("DeleteMarker", ho.delete_marker())
                .set("VersionId", ho.version_id())
                .build())
        })
    }

    fn list_buckets(&self, input: Value) -> StoreFuture<'_, Value> {
        Box::pin(async move {
            // ListBuckets takes no declared fields; bound ones are ignored.
            Fields::new(input)?;

            let lb = self.list_buckets().send().await?;

            let buckets = lb
                .buckets()
                .iter()
                .map(|b| {
                    Output::new()
                        .set("Name", b.name())
                        .time("CreationDate", b.creation_date())
                        .build()
                })
                .collect::<Vec<_>>();

            let owner = lb.owner().map(|owner| {
                Output::new()
                    .set("DisplayName", owner.display_name())
                    .set("ID", owner.id())
                    .build()
            });

            Ok(Output::new()
                .set("Buckets", Some(buckets))
                .set("Owner", owner)
                .build())
        })
    }

    fn list_objects_v2(&self, input: Value) -> StoreFuture<'_, Value> {
        Box::pin(async move {
            let fields = Fields::new(input)?;

            let lo = self
                .list_objects_v2()
                .bucket(fields.required_str("Bucket")?)
                .set_prefix(fields.str("Prefix")?)
                .set_delimiter(fields.non_empty_str("Delimiter")?)
                .set_max_keys(fields.i32("MaxKeys")?)
                .set_continuation_token(fields.str("ContinuationToken")?)
                .set_start_after(fields.str("StartAfter")?)
                .set_fetch_owner(fields.bool("FetchOwner")?)
                .send()
                .await?;

            let contents = lo
                .contents()
                .iter()
                .map(|o| {
                    Output::new()
                        .set("Key", o.key())
                        .time("LastModified", o.last_modified())
                        .set("ETag", o.e_tag())
                        .set("Size", o.size())
                        .set("StorageClass", o.storage_class().map(|v| v.as_str()))
                        .build()
                })
                .collect::<Vec<_>>();

            let common_prefixes = lo
                .common_prefixes()
                .iter()
                .map(|cp| Output::new().set("Prefix", cp.prefix()).build())
                .collect::<Vec<_>>();

            Ok(Output::new()
                .set("IsTruncated", Some(lo.is_truncated().unwrap_or(false)))
                .set("Contents", Some(contents))
                .set("CommonPrefixes", Some(common_prefixes))
                .set("Name", lo.name())
                .set("Prefix", lo.prefix())
                .set("Delimiter", lo.delimiter())
                .set("MaxKeys", lo.max_keys())
                .set("KeyCount", lo.key_count())
                .set("ContinuationToken", lo.continuation_token())
                .set("NextContinuationToken", lo.next_continuation_token())
                .set("StartAfter", lo.start_after())
                .build())
        })
    }

    fn put_object(&self, input: Value) -> StoreFuture<'_, Value> {
        Box::pin(async move {
            let mut fields = Fields::new(input)?;
            let body = fields.take_body("Body")?;

            let po = self
                .put_object()
                .bucket(fields.required_str("Bucket")?)
                .key(fields.required_str("Key")?)
                .body(ByteStream::from(body))
                .set_content_type(fields.str("ContentType")?)
                .set_cache_control(fields.str("CacheControl")?)
                .set_content_disposition(fields.str("ContentDisposition")?)
                .set_content_encoding(fields.str("ContentEncoding")?)
                .set_metadata(fields.metadata("Metadata")?)
                .set_storage_class(
                    fields.str("StorageClass")?.map(|v| StorageClass::from(v.as_str())),
                )
                .set_acl(fields.str("ACL")?.map(|v| ObjectCannedAcl::from(v.as_str())))
                .send()
                .await?;

            Ok(Output::new()
                .set("ETag", po.e_tag())
                .set("VersionId", po.version_id())
                .build())
        })
    }

    fn upload(&self, input: Value, options: TransferOptions) -> StoreFuture<'_, Value> {
        Box::pin(async move {
            let mut fields = Fields::new(input)?;
            let body = fields.take_body("Body")?;
            let bucket = fields.required_str("Bucket")?;
            let key = fields.required_str("Key")?;

            let part_size = options.part_size.max(MIN_PART_SIZE);
            if body.len() <= part_size {
                let po = self
                    .put_object()
                    .bucket(&bucket)
                    .key(&key)
                    .body(ByteStream::from(body))
                    .set_content_type(fields.str("ContentType")?)
                    .set_cache_control(fields.str("CacheControl")?)
                    .set_content_disposition(fields.str("ContentDisposition")?)
                    .set_content_encoding(fields.str("ContentEncoding")?)
                    .set_metadata(fields.metadata("Metadata")?)
                    .set_storage_class(
                        fields.str("StorageClass")?.map(|v| StorageClass::from(v.as_str())),
                    )
                    .set_acl(fields.str("ACL")?.map(|v| ObjectCannedAcl::from(v.as_str())))
                    .send()
                    .await?;

                return Ok(Output::new()
                    .set("ETag", po.e_tag())
                    .set("VersionId", po.version_id())
                    .set("Bucket", Some(bucket))
                    .set("Key", Some(key))
                    .build());
            }

            let part_count = body.len().div_ceil(part_size);
            if part_count > MAX_PARTS {
                return Err(Error::Param(format!(
                    "body needs {} parts of {} bytes, the limit is {}; raise partSize",
                    part_count, part_size, MAX_PARTS
                )));
            }

            let cmu = self
                .create_multipart_upload()
                .bucket(&bucket)
                .key(&key)
                .set_content_type(fields.str("ContentType")?)
                .set_cache_control(fields.str("CacheControl")?)
                .set_content_disposition(fields.str("ContentDisposition")?)
                .set_content_encoding(fields.str("ContentEncoding")?)
                .set_metadata(fields.metadata("Metadata")?)
                .set_storage_class(
                    fields.str("StorageClass")?.map(|v| StorageClass::from(v.as_str())),
                )
                .set_acl(fields.str("ACL")?.map(|v| ObjectCannedAcl::from(v.as_str())))
                .send()
                .await?;

            let upload_id = cmu
                .upload_id()
                .map(str::to_owned)
                .ok_or_else(|| {
                    RemoteError::new("InvalidResponse", "CreateMultipartUpload returned no UploadId")
                })?;

            debug!(bucket = %bucket, key = %key, parts = part_count, "multipart upload started");

            let requests: Vec<_> = body
                .chunks(part_size)
                .enumerate()
                .map(|(index, chunk)| {
                    let part_number = (index + 1) as i32;
                    let req = self
                        .upload_part()
                        .bucket(&bucket)
                        .key(&key)
                        .upload_id(&upload_id)
                        .part_number(part_number)
                        .body(ByteStream::from(chunk.to_vec()));

                    async move {
                        let up = req.send().await?;
                        Ok::<_, Error>(
                            CompletedPart::builder()
                                .set_e_tag(up.e_tag().map(str::to_owned))
                                .part_number(part_number)
                                .build(),
                        )
                    }
                })
                .collect();

            let parts = stream::iter(requests)
                .buffered(options.queue_size.max(1))
                .try_collect::<Vec<_>>()
                .await;

            let parts = match parts {
                Ok(parts) => parts,
                Err(err) => {
                    let abort = self
                        .abort_multipart_upload()
                        .bucket(&bucket)
                        .key(&key)
                        .upload_id(&upload_id)
                        .send()
                        .await;
                    if let Err(abort_err) = abort {
                        warn!(upload_id = %upload_id, error_message = %Error::from(abort_err), "failed to abort multipart upload");
                    }
                    return Err(err);
                }
            };

            let cmu = self
                .complete_multipart_upload()
                .bucket(&bucket)
                .key(&key)
                .upload_id(&upload_id)
                .multipart_upload(
                    CompletedMultipartUpload::builder()
                        .set_parts(Some(parts))
                        .build(),
                )
                .send()
                .await?;

            Ok(Output::new()
                .set("Location", cmu.location())
                .set("ETag", cmu.e_tag())
                .set("VersionId", cmu.version_id())
                .set("Bucket", Some(cmu.bucket().unwrap_or(bucket.as_str())))
                .set("Key", Some(cmu.key().unwrap_or(key.as_str())))
                .build())
        })
    }

    fn signed_url(&self, operation: SignedOperation, input: Value) -> StoreFuture<'_, String> {
        Box::pin(async move {
            let fields = Fields::new(input)?;
            let bucket = fields.required_str("Bucket")?;
            let key = fields.required_str("Key")?;

            let expires = match fields.i64("Expires")? {
                Some(secs) => u64::try_from(secs)
                    .map_err(|_| Error::Param("Expected params.Expires to be positive".to_string()))?,
                None => DEFAULT_SIGNED_URL_EXPIRES,
            };
            let config = PresigningConfig::expires_in(Duration::from_secs(expires))
                .map_err(|err| Error::Param(err.to_string()))?;

            let request = match operation {
                SignedOperation::GetObject => {
                    self.get_object()
                        .bucket(bucket)
                        .key(key)
                        .set_version_id(fields.str("VersionId")?)
                        .set_response_content_type(fields.str("ResponseContentType")?)
                        .set_response_content_disposition(fields.str("ResponseContentDisposition")?)
                        .presigned(config)
                        .await?
                }
                SignedOperation::PutObject => {
                    self.put_object()
                        .bucket(bucket)
                        .key(key)
                        .set_content_type(fields.str("ContentType")?)
                        .presigned(config)
                        .await?
                }
                SignedOperation::HeadObject => {
                    self.head_object()
                        .bucket(bucket)
                        .key(key)
                        .set_version_id(fields.str("VersionId")?)
                        .presigned(config)
                        .await?
                }
                SignedOperation::DeleteObject => {
                    self.delete_object()
                        .bucket(bucket)
                        .key(key)
                        .set_version_id(fields.str("VersionId")?)
                        .presigned(config)
                        .await?
                }
            };

            Ok(request.uri().to_string())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::fields::format_time;

    fn assert_send<T: Send>(_: &T) {}

    #[tokio::test]
    async fn test_client_from_options_uses_region_and_path_style() {
        let options = Options {
            endpoint: Some("http://localhost:9000".to_string()),
            force_path_style: true,
            region: "eu-west-1".to_string(),
            ..Options::new("my-bucket").with_credentials(
                "anythingjustaslongasitworks",
                "c29vb29vb29vb29vb29vb29vb29vb29vb29sb25n",
            )
        };

        let client = client_from_options(&options).await;
        assert_eq!(
            client.config().region().map(|r| r.as_ref()),
            Some("eu-west-1")
        );

        let url = client
            .signed_url(
                SignedOperation::GetObject,
                serde_json::json!({ "Bucket": "my-bucket", "Key": "photos/cat.jpg" }),
            )
            .await
            .unwrap();

        assert!(
            url.starts_with("http://localhost:9000/my-bucket/photos/cat.jpg"),
            "unexpected url: {}",
            url
        );
        assert!(url.contains("anythingjustaslongasitworks"), "unexpected url: {}", url);
        assert!(url.contains("eu-west-1"), "unexpected url: {}", url);
    }

    #[tokio::test]
    async fn test_upload_future_is_send() {
        let options = Options::new("my-bucket").with_credentials(
            "anythingjustaslongasitworks",
            "c29vb29vb29vb29vb29vb29vb29vb29vb29sb25n",
        );
        let client = client_from_options(&options).await;

        let upload = ObjectStore::upload(
            &client,
            serde_json::json!({ "Bucket": "my-bucket", "Key": "big.bin", "Body": "abc" }),
            TransferOptions::default(),
        );
        assert_send(&upload);
    }

    #[tokio::test]
    async fn test_missing_key_rejected_before_send() {
        let options = Options::new("my-bucket").with_credentials(
            "anythingjustaslongasitworks",
            "c29vb29vb29vb29vb29vb29vb29vb29vb29sb25n",
        );
        let client = client_from_options(&options).await;

        let cases = vec![
            serde_json::json!({ "Bucket": "my-bucket" }),
            serde_json::json!({ "Bucket": "my-bucket", "Key": 7 }),
        ];

        for input in cases {
            let label = input.to_string();
            let result = ObjectStore::get_object(&client, input).await;
            assert!(
                matches!(result, Err(Error::Param(_))),
                "failed for case: {}",
                label
            );
        }
    }

    #[tokio::test]
    async fn test_signed_url_contains_key_and_expiry() {
        let options = Options::new("my-bucket").with_credentials(
            "anythingjustaslongasitworks",
            "c29vb29vb29vb29vb29vb29vb29vb29vb29sb25n",
        );
        let client = client_from_options(&options).await;

        let url = client
            .signed_url(
                SignedOperation::GetObject,
                serde_json::json!({ "Bucket": "my-bucket", "Key": "photos/cat.jpg", "Expires": 60 }),
            )
            .await
            .unwrap();

        assert!(url.contains("photos/cat.jpg"), "unexpected url: {}", url);
        assert!(url.contains("X-Amz-Expires=60"), "unexpected url: {}", url);
        assert!(url.contains("anythingjustaslongasitworks"), "unexpected url: {}", url);
    }

    #[test]
    fn test_format_time_is_rfc3339() {
        let time = aws_sdk_s3::primitives::DateTime::from_secs(1_700_000_000);
        assert_eq!(format_time(&time).as_deref(), Some("2023-11-14T22:13:20Z"));
    }
}
