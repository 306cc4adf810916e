use crate::model::error::{Error, Result};

const S3_SCHEME: &str = "s3://";

/// Bucket and optional key prefix named on the command line.
#[derive(Debug, PartialEq, Eq)]
pub struct BucketUri {
    pub bucket: String,
    pub prefix: Option<String>,
}

/// Accepts `s3://bucket`, `s3://bucket/some/prefix` or a bare bucket name.
pub fn parse_bucket_uri(bucket_uri: &str) -> Result<BucketUri> {
    let rest = if let Some(rest) = bucket_uri.strip_prefix(S3_SCHEME) {
        rest
    } else if bucket_uri.contains("://") {
        return Err(Error::Config(format!(
            "failed to parse provider of: {}",
            bucket_uri
        )));
    } else {
        bucket_uri
    };

    let (bucket, prefix) = match rest.split_once('/') {
        Some((bucket, prefix)) if !prefix.is_empty() => (bucket, Some(prefix.to_string())),
        Some((bucket, _)) => (bucket, None),
        None => (rest, None),
    };

    Ok(BucketUri {
        bucket: bucket.to_string(),
        prefix,
    })
}
