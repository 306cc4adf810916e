use std::{fmt, str::FromStr};

use serde::Deserialize;

use crate::model::error::Error;

pub const MIN_PART_SIZE: usize = 5 * 1024 * 1024;
pub const DEFAULT_QUEUE_SIZE: usize = 4;
pub const DEFAULT_SIGNED_URL_EXPIRES: u64 = 900;

/// Secondary options for a managed upload, handed to the store untouched.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct TransferOptions {
    pub part_size: usize,
    pub queue_size: usize,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            part_size: MIN_PART_SIZE,
            queue_size: DEFAULT_QUEUE_SIZE,
        }
    }
}

/// Operations a signed URL can be generated for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SignedOperation {
    GetObject,
    PutObject,
    HeadObject,
    DeleteObject,
}

impl SignedOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignedOperation::GetObject => "getObject",
            SignedOperation::PutObject => "putObject",
            SignedOperation::HeadObject => "headObject",
            SignedOperation::DeleteObject => "deleteObject",
        }
    }
}

impl fmt::Display for SignedOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SignedOperation {
    type Err = Error;

    fn from_str(operation: &str) -> Result<Self, Self::Err> {
        match operation {
            "getObject" => Ok(SignedOperation::GetObject),
            "putObject" => Ok(SignedOperation::PutObject),
            "headObject" => Ok(SignedOperation::HeadObject),
            "deleteObject" => Ok(SignedOperation::DeleteObject),
            other => Err(Error::Param(format!(
                "unsupported operation for signed url: {}",
                other
            ))),
        }
    }
}
