//! Awaitable S3 facade with lower-camel-case payloads.
//!
//! ```no_run
//! # async fn run() -> scube::Result<()> {
//! use serde_json::json;
//!
//! let scube = scube::Scube::new(scube::Options::new("my-bucket")).await?;
//!
//! let listing = scube.list_dir(json!({ "prefix": "photos" })).await?;
//! println!("{}", listing["commonPrefixes"]);
//!
//! scube.delete_dir(json!({ "prefix": "photos/2019" })).await?;
//! # Ok(())
//! # }
//! ```

pub mod adapters;
pub mod client;
pub mod model;
pub mod util;

pub use adapters::ObjectStore;
pub use client::Scube;
pub use model::{
    error::{Error, RemoteError, Result},
    options::Options,
    request::{SignedOperation, TransferOptions},
};
