use serde_json::{json, Map, Value};
use tracing::{debug, instrument, warn};

use crate::{
    adapters::{self, ObjectStore},
    model::{
        error::{Error, Result},
        options::Options,
        request::{SignedOperation, TransferOptions},
    },
    util::keys::{capitalize_keys, decapitalize_keys},
};

/// Object-storage facade speaking lower-camel-case payloads.
///
/// Requests go out with capitalized top-level keys plus the bound `Bucket`
/// and `Delimiter`; structured responses come back with decapitalized keys.
pub struct Scube {
    store: Box<dyn ObjectStore>,
    bucket: String,
    delimiter: String,
}

impl Scube {
    /// Validates `options`, then builds an S3 client from them.
    pub async fn new(options: Options) -> Result<Self> {
        options.validate()?;

        let client = adapters::s3::client_from_options(&options).await;

        Ok(Self::bind(options, Box::new(client)))
    }

    /// Validates `options` and binds them to an existing store.
    pub fn with_store(options: Options, store: Box<dyn ObjectStore>) -> Result<Self> {
        options.validate()?;

        Ok(Self::bind(options, store))
    }

    fn bind(options: Options, store: Box<dyn ObjectStore>) -> Self {
        Self {
            store,
            bucket: options.bucket,
            delimiter: options.delimiter,
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn delimiter(&self) -> &str {
        &self.delimiter
    }

    fn request(&self, params: Value) -> Value {
        let mut request = match capitalize_keys(params) {
            Value::Null => Value::Object(Map::new()),
            other => other,
        };

        if let Value::Object(map) = &mut request {
            map.entry("Bucket")
                .or_insert_with(|| Value::from(self.bucket.as_str()));
            map.entry("Delimiter")
                .or_insert_with(|| Value::from(self.delimiter.as_str()));
        }

        request
    }

    #[instrument(skip_all)]
    pub async fn copy_object(&self, params: Value) -> Result<Value> {
        debug!("called");
        let response = self.store.copy_object(self.request(params)).await?;
        Ok(decapitalize_keys(response))
    }

    #[instrument(skip_all)]
    pub async fn create_bucket(&self, params: Value) -> Result<Value> {
        debug!("called");
        let response = self.store.create_bucket(self.request(params)).await?;
        Ok(decapitalize_keys(response))
    }

    #[instrument(skip_all)]
    pub async fn delete_bucket(&self, params: Value) -> Result<Value> {
        debug!("called");
        let response = self.store.delete_bucket(self.request(params)).await?;
        Ok(decapitalize_keys(response))
    }

    #[instrument(skip_all)]
    pub async fn delete_object(&self, params: Value) -> Result<Value> {
        debug!("called");
        let response = self.store.delete_object(self.request(params)).await?;
        Ok(decapitalize_keys(response))
    }

    #[instrument(skip_all)]
    pub async fn delete_objects(&self, params: Value) -> Result<Value> {
        debug!("called");
        let response = self.store.delete_objects(self.request(params)).await?;
        Ok(decapitalize_keys(response))
    }

    #[instrument(skip_all)]
    pub async fn get_object(&self, params: Value) -> Result<Value> {
        debug!("called");
        let response = self.store.get_object(self.request(params)).await?;
        Ok(decapitalize_keys(response))
    }

    #[instrument(skip(self, params))]
    pub async fn get_signed_url(&self, operation: SignedOperation, params: Value) -> Result<String> {
        debug!("called");
        self.store.signed_url(operation, self.request(params)).await
    }

    #[instrument(skip_all)]
    pub async fn head_bucket(&self, params: Value) -> Result<Value> {
        debug!("called");
        let response = self.store.head_bucket(self.request(params)).await?;
        Ok(decapitalize_keys(response))
    }

    #[instrument(skip_all)]
    pub async fn head_object(&self, params: Value) -> Result<Value> {
        debug!("called");
        let response = self.store.head_object(self.request(params)).await?;
        Ok(decapitalize_keys(response))
    }

    #[instrument(skip_all)]
    pub async fn list_buckets(&self, params: Value) -> Result<Value> {
        debug!("called");
        let response = self.store.list_buckets(self.request(params)).await?;
        Ok(decapitalize_keys(response))
    }

    #[instrument(skip_all)]
    pub async fn list_objects(&self, params: Value) -> Result<Value> {
        debug!("called");
        let response = self.store.list_objects_v2(self.request(params)).await?;
        Ok(decapitalize_keys(response))
    }

    #[instrument(skip_all)]
    pub async fn put_object(&self, params: Value) -> Result<Value> {
        debug!("called");
        let response = self.store.put_object(self.request(params)).await?;
        Ok(decapitalize_keys(response))
    }

    #[instrument(skip(self, params))]
    pub async fn upload(&self, params: Value, options: TransferOptions) -> Result<Value> {
        debug!("called");
        let response = self.store.upload(self.request(params), options).await?;
        Ok(decapitalize_keys(response))
    }

    /// Deletes every object whose key starts with `params.prefix`, one page
    /// at a time: list, batch-delete that page, follow the continuation token
    /// while the listing is truncated. Any failure aborts the whole run.
    ///
    /// Per-key failures reported inside a successful `deleteObjects` response
    /// do not abort; they are logged and those objects stay in place.
    #[instrument(skip_all)]
    pub async fn delete_prefix(&self, params: Value) -> Result<()> {
        debug!("called");

        let mut option = match params {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                return Err(Error::Param(format!(
                    "Expected params to be a structure, got: {}",
                    other
                )))
            }
        };
        // Flat listing, so nested keys are visited and not grouped.
        option.insert("delimiter".to_string(), Value::from(""));

        let mut page = 0usize;
        loop {
            page += 1;

            let list = self.list_objects(Value::Object(option.clone())).await?;

            let keys = list
                .get("contents")
                .and_then(Value::as_array)
                .map(|contents| {
                    contents
                        .iter()
                        .filter_map(|object| object.get("Key").cloned())
                        .map(|key| json!({ "Key": key }))
                        .collect::<Vec<_>>()
                })
                .unwrap_or_default();

            let truncated = list
                .get("isTruncated")
                .and_then(Value::as_bool)
                .unwrap_or(false);

            debug!(page = page, keys = keys.len(), truncated = truncated, "listed page");

            if !keys.is_empty() {
                let deleted = self
                    .delete_objects(json!({ "delete": { "Objects": keys } }))
                    .await?;

                let errors = deleted
                    .get("errors")
                    .and_then(Value::as_array)
                    .filter(|errors| !errors.is_empty());
                if let Some(errors) = errors {
                    warn!(
                        page = page,
                        errors = errors.len(),
                        first_key = ?errors[0].get("Key"),
                        first_code = ?errors[0].get("Code"),
                        "batch delete left objects behind"
                    );
                }
            }

            if !truncated {
                return Ok(());
            }

            match list.get("nextContinuationToken") {
                Some(token) => {
                    option.insert("continuationToken".to_string(), token.clone());
                }
                None => {
                    option.remove("continuationToken");
                }
            }
        }
    }

    /// [`Scube::delete_prefix`] with the prefix forced to end in the delimiter.
    #[instrument(skip_all)]
    pub async fn delete_dir(&self, params: Value) -> Result<()> {
        debug!("called");

        let mut option = match params {
            Value::Object(map) => map,
            _ => Map::new(),
        };

        let prefix = match option.get("prefix") {
            Some(Value::String(prefix)) => prefix.clone(),
            _ => {
                return Err(Error::Param(
                    "deleteDir requires a string `prefix`".to_string(),
                ))
            }
        };
        option.insert(
            "prefix".to_string(),
            Value::from(with_trailing(&prefix, &self.delimiter)),
        );

        self.delete_prefix(Value::Object(option)).await
    }

    /// Lists the immediate entries under `params.prefix` (default: the
    /// delimiter itself), grouping deeper keys into `commonPrefixes`.
    #[instrument(skip_all)]
    pub async fn list_dir(&self, params: Value) -> Result<Value> {
        debug!("called");

        let mut option = match params {
            Value::Object(map) => map,
            _ => Map::new(),
        };

        let prefix = match option.get("prefix") {
            Some(Value::String(prefix)) => with_trailing(prefix, &self.delimiter),
            None | Some(Value::Null) => self.delimiter.clone(),
            Some(other) => {
                return Err(Error::Param(format!(
                    "Expected params.prefix to be a string, got: {}",
                    other
                )))
            }
        };
        option.insert("prefix".to_string(), Value::from(prefix));

        self.list_objects(Value::Object(option)).await
    }
}

fn with_trailing(prefix: &str, delimiter: &str) -> String {
    if prefix.ends_with(delimiter) {
        prefix.to_string()
    } else {
        format!("{}{}", prefix, delimiter)
    }
}
