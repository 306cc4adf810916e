//! In-memory [`ObjectStore`] for tests: S3-shaped payloads, key-ordered
//! paging with a configurable page size, a call log, and failure injection.

use std::{
    collections::{hash_map::DefaultHasher, BTreeMap, HashMap},
    future,
    hash::{Hash, Hasher},
    sync::{Arc, Mutex},
};

use serde_json::Value;

use crate::{
    adapters::{
        fields::{Fields, Output},
        ObjectStore, StoreFuture,
    },
    model::{
        error::{Error, RemoteError, Result},
        request::{SignedOperation, TransferOptions, DEFAULT_SIGNED_URL_EXPIRES},
    },
};

/// S3's `ListObjectsV2` default and maximum page size.
pub const DEFAULT_PAGE_SIZE: usize = 1000;

#[derive(Clone, Debug)]
struct MockObject {
    body: Vec<u8>,
    content_type: Option<String>,
    metadata: Option<HashMap<String, String>>,
    etag: String,
}

impl MockObject {
    fn new(body: Vec<u8>) -> Self {
        let mut hasher = DefaultHasher::new();
        body.hash(&mut hasher);

        Self {
            body,
            content_type: None,
            metadata: None,
            etag: format!("\"{:016x}\"", hasher.finish()),
        }
    }
}

/// Injected provider error. Without an operation every call fails,
/// otherwise only the `nth` (1-based) call to that operation.
#[derive(Clone)]
struct Failure {
    operation: Option<String>,
    nth: usize,
    code: String,
    message: String,
}

impl Failure {
    fn applies(&self, operation: &str, count: usize) -> bool {
        match &self.operation {
            Some(name) => name == operation && count == self.nth,
            None => true,
        }
    }
}

#[derive(Default)]
struct MockState {
    buckets: BTreeMap<String, BTreeMap<String, MockObject>>,
    calls: Vec<(&'static str, Value)>,
    transfers: Vec<TransferOptions>,
    protected: Vec<String>,
}

impl MockState {
    fn bucket(&mut self, name: &str) -> Result<&mut BTreeMap<String, MockObject>> {
        self.buckets
            .get_mut(name)
            .ok_or_else(|| RemoteError::new("NoSuchBucket", "The specified bucket does not exist").into())
    }

    fn object(&mut self, bucket: &str, key: &str) -> Result<&MockObject> {
        self.bucket(bucket)?
            .get(key)
            .ok_or_else(|| RemoteError::new("NoSuchKey", "The specified key does not exist.").into())
    }
}

/// Clones share one backing state, so a test can keep a handle for
/// assertions after boxing another into the facade.
#[derive(Clone)]
pub struct MockClient {
    page_size: usize,
    tokens: bool,
    failure: Option<Failure>,
    state: Arc<Mutex<MockState>>,
}

impl Default for MockClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MockClient {
    pub fn new() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            tokens: true,
            failure: None,
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    pub fn with_bucket(self, bucket: &str) -> Self {
        self.lock().buckets.entry(bucket.to_string()).or_default();
        self
    }

    pub fn with_object(self, bucket: &str, key: &str, body: impl Into<Vec<u8>>) -> Self {
        self.lock()
            .buckets
            .entry(bucket.to_string())
            .or_default()
            .insert(key.to_string(), MockObject::new(body.into()));
        self
    }

    /// Caps every listing page, standing in for the provider's limit.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Truncated pages come back without `NextContinuationToken`.
    pub fn without_tokens(mut self) -> Self {
        self.tokens = false;
        self
    }

    /// `DeleteObjects` reports `AccessDenied` for this key and keeps it.
    pub fn protecting(self, key: &str) -> Self {
        self.lock().protected.push(key.to_string());
        self
    }

    /// Every call fails with this provider error.
    pub fn failing(mut self, code: &str, message: &str) -> Self {
        self.failure = Some(Failure {
            operation: None,
            nth: 0,
            code: code.to_string(),
            message: message.to_string(),
        });
        self
    }

    /// Only the `nth` call to `operation` fails.
    pub fn failing_on(mut self, operation: &str, nth: usize, code: &str, message: &str) -> Self {
        self.failure = Some(Failure {
            operation: Some(operation.to_string()),
            nth,
            code: code.to_string(),
            message: message.to_string(),
        });
        self
    }

    /// Operation names and wire payloads, in call order.
    pub fn calls(&self) -> Vec<(String, Value)> {
        self.lock()
            .calls
            .iter()
            .map(|(operation, input)| (operation.to_string(), input.clone()))
            .collect()
    }

    pub fn calls_to(&self, operation: &str) -> Vec<Value> {
        self.lock()
            .calls
            .iter()
            .filter(|(name, _)| *name == operation)
            .map(|(_, input)| input.clone())
            .collect()
    }

    pub fn transfers(&self) -> Vec<TransferOptions> {
        self.lock().transfers.clone()
    }

    pub fn keys(&self, bucket: &str) -> Vec<String> {
        self.lock()
            .buckets
            .get(bucket)
            .map(|objects| objects.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state
            .lock()
            .expect("failed to acquire `state` guard")
    }

    fn respond<T, F>(&self, operation: &'static str, input: Value, handler: F) -> StoreFuture<'_, T>
    where
        T: Send + 'static,
        F: FnOnce(&mut MockState, Fields) -> Result<T>,
    {
        let mut state = self.lock();
        state.calls.push((operation, input.clone()));
        let count = state
            .calls
            .iter()
            .filter(|(name, _)| *name == operation)
            .count();

        let result = match &self.failure {
            Some(failure) if failure.applies(operation, count) => {
                Err(RemoteError::new(failure.code.as_str(), failure.message.as_str()).into())
            }
            _ => Fields::new(input).and_then(|fields| handler(&mut *state, fields)),
        };

        Box::pin(future::ready(result))
    }

    fn list_page(&self, state: &mut MockState, fields: Fields) -> Result<Value> {
        let bucket = fields.required_str("Bucket")?;
        let prefix = fields.str("Prefix")?.unwrap_or_default();
        let delimiter = fields.non_empty_str("Delimiter")?;
        let max_keys = match fields.i32("MaxKeys")? {
            Some(max_keys) => usize::try_from(max_keys).unwrap_or(0).min(self.page_size),
            None => self.page_size,
        };
        let token = fields.str("ContinuationToken")?;
        let cursor = token.clone().or(fields.str("StartAfter")?);

        let objects = state.bucket(&bucket)?;

        // (name, object) where `None` marks a common prefix.
        let mut entries: Vec<(String, Option<&MockObject>)> = Vec::new();
        for (key, object) in objects.iter().filter(|(key, _)| key.starts_with(&prefix)) {
            let grouped = delimiter.as_deref().and_then(|delimiter| {
                key[prefix.len()..]
                    .find(delimiter)
                    .map(|at| key[..prefix.len() + at + delimiter.len()].to_string())
            });

            match grouped {
                Some(common) => {
                    if entries.last().map(|(name, _)| name) != Some(&common) {
                        entries.push((common, None));
                    }
                }
                None => entries.push((key.clone(), Some(object))),
            }
        }

        let remaining = entries
            .into_iter()
            .filter(|(name, _)| cursor.as_ref().map_or(true, |cursor| name > cursor))
            .collect::<Vec<_>>();
        let is_truncated = remaining.len() > max_keys;
        let page = &remaining[..remaining.len().min(max_keys)];

        let contents = page
            .iter()
            .filter_map(|(key, object)| {
                object.map(|object| {
                    Output::new()
                        .set("Key", Some(key.as_str()))
                        .set("ETag", Some(object.etag.as_str()))
                        .set("Size", Some(object.body.len() as i64))
                        .set("StorageClass", Some("STANDARD"))
                        .build()
                })
            })
            .collect::<Vec<_>>();

        let common_prefixes = page
            .iter()
            .filter(|(_, object)| object.is_none())
            .map(|(common, _)| Output::new().set("Prefix", Some(common.as_str())).build())
            .collect::<Vec<_>>();

        let next_token = if is_truncated && self.tokens {
            page.last().map(|(name, _)| name.clone())
        } else {
            None
        };

        Ok(Output::new()
            .set("IsTruncated", Some(is_truncated))
            .set("Contents", Some(contents))
            .set("CommonPrefixes", Some(common_prefixes))
            .set("Name", Some(bucket))
            .set("Prefix", Some(prefix))
            .set("Delimiter", delimiter)
            .set("MaxKeys", Some(max_keys as i64))
            .set("KeyCount", Some(page.len() as i64))
            .set("ContinuationToken", token)
            .set("NextContinuationToken", next_token)
            .build())
    }
}

fn put(state: &mut MockState, mut fields: Fields) -> Result<(String, String, String)> {
    let body = fields.take_body("Body")?;
    let bucket = fields.required_str("Bucket")?;
    let key = fields.required_str("Key")?;

    let mut object = MockObject::new(body);
    object.content_type = fields.str("ContentType")?;
    object.metadata = fields.metadata("Metadata")?;
    let etag = object.etag.clone();

    state.bucket(&bucket)?.insert(key.clone(), object);

    Ok((bucket, key, etag))
}

impl ObjectStore for MockClient {
    fn copy_object(&self, input: Value) -> StoreFuture<'_, Value> {
        self.respond("copyObject", input, |state, fields| {
            let bucket = fields.required_str("Bucket")?;
            let key = fields.required_str("Key")?;
            let copy_source = fields.required_str("CopySource")?;

            let (source_bucket, source_key) = copy_source
                .trim_start_matches('/')
                .split_once('/')
                .ok_or_else(|| {
                    Error::Remote(RemoteError::new("InvalidArgument", "Invalid copy source object key"))
                })?;

            let mut object = state.object(source_bucket, source_key)?.clone();
            if fields.str("MetadataDirective")?.as_deref() == Some("REPLACE") {
                object.content_type = fields.str("ContentType")?;
                object.metadata = fields.metadata("Metadata")?;
            }
            let etag = object.etag.clone();

            state.bucket(&bucket)?.insert(key, object);

            Ok(Output::new()
                .set("CopyObjectResult", Some(Output::new().set("ETag", Some(etag)).build()))
                .build())
        })
    }

    fn create_bucket(&self, input: Value) -> StoreFuture<'_, Value> {
        self.respond("createBucket", input, |state, fields| {
            let bucket = fields.required_str("Bucket")?;
            if state.buckets.contains_key(&bucket) {
                return Err(RemoteError::new(
                    "BucketAlreadyOwnedByYou",
                    "Your previous request to create the named bucket succeeded and you already own it.",
                )
                .into());
            }

            state.buckets.insert(bucket.clone(), BTreeMap::new());

            Ok(Output::new().set("Location", Some(format!("/{}", bucket))).build())
        })
    }

    fn delete_bucket(&self, input: Value) -> StoreFuture<'_, Value> {
        self.respond("deleteBucket", input, |state, fields| {
            let bucket = fields.required_str("Bucket")?;
            if !state.bucket(&bucket)?.is_empty() {
                return Err(RemoteError::new(
                    "BucketNotEmpty",
                    "The bucket you tried to delete is not empty",
                )
                .into());
            }

            state.buckets.remove(&bucket);

            Ok(Output::new().build())
        })
    }

    fn delete_object(&self, input: Value) -> StoreFuture<'_, Value> {
        self.respond("deleteObject", input, |state, fields| {
            let bucket = fields.required_str("Bucket")?;
            let key = fields.required_str("Key")?;

            state.bucket(&bucket)?.remove(&key);

            Ok(Output::new().build())
        })
    }

    fn delete_objects(&self, input: Value) -> StoreFuture<'_, Value> {
        self.respond("deleteObjects", input, |state, fields| {
            let bucket = fields.required_str("Bucket")?;
            let delete = fields
                .structure("Delete")?
                .ok_or_else(|| Error::Param("Missing required key 'Delete' in params".to_string()))?;
            let quiet = delete.bool("Quiet")?.unwrap_or(false);

            let keys = delete
                .list("Objects")?
                .iter()
                .map(|object| object.required_str("Key"))
                .collect::<Result<Vec<_>>>()?;

            let protected = state.protected.clone();
            let objects = state.bucket(&bucket)?;
            let mut deleted = Vec::new();
            let mut errors = Vec::new();
            for key in keys {
                if protected.contains(&key) {
                    errors.push(
                        Output::new()
                            .set("Key", Some(key))
                            .set("Code", Some("AccessDenied"))
                            .set("Message", Some("Access Denied"))
                            .build(),
                    );
                    continue;
                }

                objects.remove(&key);
                if !quiet {
                    deleted.push(Output::new().set("Key", Some(key)).build());
                }
            }

            Ok(Output::new()
                .set("Deleted", Some(deleted))
                .set("Errors", Some(errors))
                .build())
        })
    }

    fn get_object(&self, input: Value) -> StoreFuture<'_, Value> {
        self.respond("getObject", input, |state, fields| {
            let object = state.object(&fields.required_str("Bucket")?, &fields.required_str("Key")?)?;

            Ok(Output::new()
                .set("ContentLength", Some(object.body.len() as i64))
                .set("ContentType", object.content_type.clone())
                .set("ETag", Some(object.etag.clone()))
                .metadata("Metadata", object.metadata.as_ref())
                .set("Body", Some(object.body.clone()))
                .build())
        })
    }

    fn head_bucket(&self, input: Value) -> StoreFuture<'_, Value> {
        self.respond("headBucket", input, |state, fields| {
            let bucket = fields.required_str("Bucket")?;
            if !state.buckets.contains_key(&bucket) {
                return Err(RemoteError::new("NotFound", "Not Found").into());
            }

            Ok(Output::new().build())
        })
    }

    fn head_object(&self, input: Value) -> StoreFuture<'_, Value> {
        self.respond("headObject", input, |state, fields| {
            let bucket = fields.required_str("Bucket")?;
            let key = fields.required_str("Key")?;
            let object = state
                .bucket(&bucket)?
                .get(&key)
                .ok_or_else(|| Error::from(RemoteError::new("NotFound", "Not Found")))?;

            Ok(Output::new()
                .set("ContentLength", Some(object.body.len() as i64))
                .set("ContentType", object.content_type.clone())
                .set("ETag", Some(object.etag.clone()))
                .metadata("Metadata", object.metadata.as_ref())
                .build())
        })
    }

    fn list_buckets(&self, input: Value) -> StoreFuture<'_, Value> {
        self.respond("listBuckets", input, |state, _fields| {
            let buckets = state
                .buckets
                .keys()
                .map(|name| Output::new().set("Name", Some(name.as_str())).build())
                .collect::<Vec<_>>();

            Ok(Output::new().set("Buckets", Some(buckets)).build())
        })
    }

    fn list_objects_v2(&self, input: Value) -> StoreFuture<'_, Value> {
        self.respond("listObjectsV2", input, |state, fields| self.list_page(state, fields))
    }

    fn put_object(&self, input: Value) -> StoreFuture<'_, Value> {
        self.respond("putObject", input, |state, fields| {
            let (_, _, etag) = put(state, fields)?;

            Ok(Output::new().set("ETag", Some(etag)).build())
        })
    }

    fn upload(&self, input: Value, options: TransferOptions) -> StoreFuture<'_, Value> {
        self.respond("upload", input, |state, fields| {
            state.transfers.push(options);
            let (bucket, key, etag) = put(state, fields)?;

            Ok(Output::new()
                .set("ETag", Some(etag))
                .set("Bucket", Some(bucket))
                .set("Key", Some(key))
                .build())
        })
    }

    fn signed_url(&self, operation: SignedOperation, input: Value) -> StoreFuture<'_, String> {
        self.respond("getSignedUrl", input, |_state, fields| {
            let bucket = fields.required_str("Bucket")?;
            let key = fields.required_str("Key")?;
            let expires = fields
                .i64("Expires")?
                .unwrap_or(DEFAULT_SIGNED_URL_EXPIRES as i64);

            Ok(format!(
                "https://{}.s3.mock.local/{}?X-Amz-Expires={}&x-id={}",
                bucket, key, expires, operation
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn client() -> MockClient {
        MockClient::new()
            .with_object("b", "a/1", "one")
            .with_object("b", "a/2", "two")
            .with_object("b", "a/sub/3", "three")
            .with_object("b", "a/sub/deep/4", "four")
            .with_object("b", "z", "zed")
    }

    #[tokio::test]
    async fn test_list_flat_pages() {
        let client = client().with_page_size(2);

        let first = client
            .list_objects_v2(json!({ "Bucket": "b", "Prefix": "a/" }))
            .await
            .unwrap();
        assert_eq!(first["IsTruncated"], json!(true));
        assert_eq!(first["KeyCount"], json!(2));
        assert_eq!(first["Contents"][0]["Key"], json!("a/1"));

        let second = client
            .list_objects_v2(json!({
                "Bucket": "b",
                "Prefix": "a/",
                "ContinuationToken": first["NextContinuationToken"]
            }))
            .await
            .unwrap();
        assert_eq!(second["IsTruncated"], json!(false));
        assert_eq!(second["Contents"][0]["Key"], json!("a/sub/3"));
        assert_eq!(second["Contents"][1]["Key"], json!("a/sub/deep/4"));
        assert!(second.get("NextContinuationToken").is_none());
    }

    #[tokio::test]
    async fn test_list_groups_by_delimiter() {
        let cases = vec![
            ("a/", vec!["a/1", "a/2"], vec!["a/sub/"]),
            ("a/sub/", vec!["a/sub/3"], vec!["a/sub/deep/"]),
            ("", vec!["z"], vec!["a/"]),
            ("nothing/", vec![], vec![]),
        ];

        for (prefix, keys, prefixes) in cases {
            let result = client()
                .list_objects_v2(json!({ "Bucket": "b", "Prefix": prefix, "Delimiter": "/" }))
                .await
                .unwrap();

            let contents = result["Contents"]
                .as_array()
                .unwrap()
                .iter()
                .map(|o| o["Key"].as_str().unwrap().to_string())
                .collect::<Vec<_>>();
            let common = result["CommonPrefixes"]
                .as_array()
                .unwrap()
                .iter()
                .map(|p| p["Prefix"].as_str().unwrap().to_string())
                .collect::<Vec<_>>();

            assert_eq!(contents, keys, "failed on `Contents` for case: {:?}", prefix);
            assert_eq!(common, prefixes, "failed on `CommonPrefixes` for case: {:?}", prefix);
        }
    }

    #[tokio::test]
    async fn test_continuation_survives_deletes() {
        let client = client().with_page_size(2);

        let first = client
            .list_objects_v2(json!({ "Bucket": "b", "Prefix": "a/" }))
            .await
            .unwrap();
        client
            .delete_objects(json!({
                "Bucket": "b",
                "Delete": { "Objects": [{ "Key": "a/1" }, { "Key": "a/2" }] }
            }))
            .await
            .unwrap();

        let second = client
            .list_objects_v2(json!({
                "Bucket": "b",
                "Prefix": "a/",
                "ContinuationToken": first["NextContinuationToken"]
            }))
            .await
            .unwrap();

        assert_eq!(second["KeyCount"], json!(2));
        assert_eq!(second["Contents"][0]["Key"], json!("a/sub/3"));
    }

    #[tokio::test]
    async fn test_object_round_trip() {
        let client = MockClient::new().with_bucket("b");

        client
            .put_object(json!({
                "Bucket": "b",
                "Key": "k",
                "Body": "hello",
                "ContentType": "text/plain",
                "Metadata": { "owner": "me" }
            }))
            .await
            .unwrap();
        client
            .copy_object(json!({ "Bucket": "b", "Key": "k2", "CopySource": "b/k" }))
            .await
            .unwrap();

        let got = client
            .get_object(json!({ "Bucket": "b", "Key": "k2" }))
            .await
            .unwrap();

        assert_eq!(got["Body"], json!(b"hello".to_vec()));
        assert_eq!(got["ContentType"], json!("text/plain"));
        assert_eq!(got["Metadata"], json!({ "owner": "me" }));
        assert_eq!(client.keys("b"), vec!["k", "k2"]);
    }

    #[tokio::test]
    async fn test_remote_errors() {
        let client = MockClient::new().with_object("full", "k", "v");

        let cases = vec![
            (client.get_object(json!({ "Bucket": "full", "Key": "nope" })).await, "NoSuchKey"),
            (client.get_object(json!({ "Bucket": "nope", "Key": "k" })).await, "NoSuchBucket"),
            (client.head_object(json!({ "Bucket": "full", "Key": "nope" })).await, "NotFound"),
            (client.delete_bucket(json!({ "Bucket": "full" })).await, "BucketNotEmpty"),
            (client.create_bucket(json!({ "Bucket": "full" })).await, "BucketAlreadyOwnedByYou"),
        ];

        for (result, code) in cases {
            let err = result.unwrap_err();
            assert_eq!(
                err.remote().and_then(RemoteError::code),
                Some(code),
                "failed for case: {}",
                code
            );
        }
    }

    #[tokio::test]
    async fn test_failing_on_nth_call() {
        let client = client().failing_on("getObject", 2, "SlowDown", "Please reduce your request rate.");

        let cases = vec![(1, true), (2, false), (3, true)];
        for (nth, ok) in cases {
            let result = client.get_object(json!({ "Bucket": "b", "Key": "z" })).await;
            assert_eq!(result.is_ok(), ok, "failed for call: {}", nth);
        }
        assert!(client.list_buckets(Value::Null).await.is_ok());
    }

    #[tokio::test]
    async fn test_without_tokens() {
        let client = client().with_page_size(2).without_tokens();

        let page = client
            .list_objects_v2(json!({ "Bucket": "b", "Prefix": "a/" }))
            .await
            .unwrap();

        assert_eq!(page["IsTruncated"], json!(true));
        assert!(page.get("NextContinuationToken").is_none());
    }

    #[tokio::test]
    async fn test_protected_keys_reported() {
        let client = client().protecting("a/2");

        let result = client
            .delete_objects(json!({
                "Bucket": "b",
                "Delete": { "Objects": [{ "Key": "a/1" }, { "Key": "a/2" }] }
            }))
            .await
            .unwrap();

        assert_eq!(result["Deleted"], json!([{ "Key": "a/1" }]));
        assert_eq!(result["Errors"][0]["Key"], json!("a/2"));
        assert_eq!(result["Errors"][0]["Code"], json!("AccessDenied"));
        assert_eq!(client.keys("b"), vec!["a/2", "a/sub/3", "a/sub/deep/4", "z"]);
    }

    #[tokio::test]
    async fn test_failing_records_call() {
        let client = MockClient::new().failing("AccessDenied", "Access Denied");

        let err = client.list_buckets(Value::Null).await.unwrap_err();

        assert_eq!(err.to_string(), "Access Denied");
        assert_eq!(client.calls().len(), 1);
        assert_eq!(client.calls()[0].0, "listBuckets");
    }
}
