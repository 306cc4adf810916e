use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;

use crate::model::error::{Error, Result};

pub const DEFAULT_REGION: &str = "us-east-1";
pub const DEFAULT_DELIMITER: &str = "/";

const MIN_PUBLIC_KEY_LEN: usize = 20;
const MIN_SECRET_KEY_LEN: usize = 40;
const MAX_HOSTNAME_LEN: usize = 255;

static HOSTNAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?)*$",
    )
    .expect("hostname pattern compiles")
});

static TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_]+$").expect("token pattern compiles"));

static BASE64: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:[A-Za-z0-9+/]{4})*(?:[A-Za-z0-9+/]{2}==|[A-Za-z0-9+/]{3}=)?$")
        .expect("base64 pattern compiles")
});

/// Construction options for [`crate::Scube`].
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct Options {
    pub region: String,
    pub delimiter: String,
    pub bucket: String,
    pub public_key: Option<String>,
    pub secret_key: Option<String>,
    pub endpoint: Option<String>,
    pub force_path_style: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            region: DEFAULT_REGION.to_string(),
            delimiter: DEFAULT_DELIMITER.to_string(),
            bucket: String::new(),
            public_key: None,
            secret_key: None,
            endpoint: None,
            force_path_style: false,
        }
    }
}

impl Options {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            ..Default::default()
        }
    }

    pub fn with_credentials(
        mut self,
        public_key: impl Into<String>,
        secret_key: impl Into<String>,
    ) -> Self {
        self.public_key = Some(public_key.into());
        self.secret_key = Some(secret_key.into());
        self
    }

    /// Checks every field without touching the network.
    pub fn validate(&self) -> Result<()> {
        non_empty("region", &self.region)?;
        non_empty("delimiter", &self.delimiter)?;

        if self.bucket.is_empty() {
            return Err(Error::Config("\"bucket\" is required".to_string()));
        }
        if self.bucket.len() > MAX_HOSTNAME_LEN || !HOSTNAME.is_match(&self.bucket) {
            return Err(Error::Config(format!(
                "\"bucket\" must be a valid hostname, got: {}",
                self.bucket
            )));
        }

        if let Some(public_key) = &self.public_key {
            if public_key.len() < MIN_PUBLIC_KEY_LEN || !TOKEN.is_match(public_key) {
                return Err(Error::Config(format!(
                    "\"publicKey\" must be a token of at least {} characters",
                    MIN_PUBLIC_KEY_LEN
                )));
            }
        }

        if let Some(secret_key) = &self.secret_key {
            if secret_key.len() < MIN_SECRET_KEY_LEN || !BASE64.is_match(secret_key) {
                return Err(Error::Config(format!(
                    "\"secretKey\" must be base64 of at least {} characters",
                    MIN_SECRET_KEY_LEN
                )));
            }
        }

        if self.public_key.is_some() != self.secret_key.is_some() {
            return Err(Error::Config(
                "\"publicKey\" and \"secretKey\" must be provided together".to_string(),
            ));
        }

        if let Some(endpoint) = &self.endpoint {
            non_empty("endpoint", endpoint)?;
        }

        Ok(())
    }
}

fn non_empty(field: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(Error::Config(format!("\"{}\" is not allowed to be empty", field)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const PUBLIC_KEY: &str = "anythingjustaslongasitworks";
    const SECRET_KEY: &str = "c29vb29vb29vb29vb29vb29vb29vb29vb29sb25n";

    #[test]
    fn test_defaults() {
        let options = Options::new("my-bucket");

        assert_eq!(options.region, "us-east-1");
        assert_eq!(options.delimiter, "/");
        assert!(!options.force_path_style);
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_deserialize_camel_case() {
        let options: Options = serde_json::from_value(serde_json::json!({
            "bucket": "my-bucket",
            "publicKey": PUBLIC_KEY,
            "secretKey": SECRET_KEY,
            "forcePathStyle": true,
            "endpoint": "http://localhost:9000"
        }))
        .unwrap();

        assert_eq!(options.public_key.as_deref(), Some(PUBLIC_KEY));
        assert_eq!(options.region, "us-east-1");
        assert!(options.force_path_style);
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_validate_bucket() {
        let cases = vec![
            ("my-bucket", true),
            ("assets.example.com", true),
            ("a", true),
            ("", false),
            ("-bucket", false),
            ("bucket-", false),
            ("my_bucket", false),
            ("my bucket", false),
            ("bucket..name", false),
        ];

        for (bucket, expected) in cases {
            let result = Options::new(bucket).validate();
            assert_eq!(result.is_ok(), expected, "failed for case: {:?}", bucket);
        }
    }

    #[test]
    fn test_validate_credentials() {
        let cases = vec![
            (Some(PUBLIC_KEY), Some(SECRET_KEY), true),
            (None, None, true),
            (Some("short"), Some(SECRET_KEY), false),
            (Some("has-a-dash-in-the-key-id"), Some(SECRET_KEY), false),
            (Some(PUBLIC_KEY), Some("c29vb29v"), false),
            (Some(PUBLIC_KEY), Some("not base64 at all, not base64 at all, nope"), false),
            (Some(PUBLIC_KEY), None, false),
            (None, Some(SECRET_KEY), false),
        ];

        for (public_key, secret_key, expected) in cases {
            let options = Options {
                public_key: public_key.map(str::to_string),
                secret_key: secret_key.map(str::to_string),
                ..Options::new("my-bucket")
            };
            assert_eq!(
                options.validate().is_ok(),
                expected,
                "failed for case: {:?} / {:?}",
                public_key,
                secret_key
            );
        }
    }

    #[test]
    fn test_validate_empty_strings() {
        let cases = vec![
            Options {
                region: String::new(),
                ..Options::new("my-bucket")
            },
            Options {
                delimiter: String::new(),
                ..Options::new("my-bucket")
            },
            Options {
                endpoint: Some(String::new()),
                ..Options::new("my-bucket")
            },
        ];

        for options in cases {
            assert!(
                matches!(options.validate(), Err(Error::Config(_))),
                "failed for case: {:?}",
                options
            );
        }
    }
}
