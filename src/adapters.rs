use std::{future::Future, pin::Pin};

use serde_json::Value;

use crate::model::{
    error::Result,
    request::{SignedOperation, TransferOptions},
};

pub mod fields;
pub mod mock;
pub mod s3;

pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// The remote object-storage API.
///
/// Every method takes and returns payloads keyed in the remote convention
/// (`Bucket`, `Key`, `ContinuationToken`, ...). Implementations validate the
/// fields they declare and ignore the rest.
pub trait ObjectStore: Send + Sync {
    fn copy_object(&self, input: Value) -> StoreFuture<'_, Value>;

    fn create_bucket(&self, input: Value) -> StoreFuture<'_, Value>;

    fn delete_bucket(&self, input: Value) -> StoreFuture<'_, Value>;

    fn delete_object(&self, input: Value) -> StoreFuture<'_, Value>;

    /// Batch delete of `Delete.Objects[].Key` in one request.
    fn delete_objects(&self, input: Value) -> StoreFuture<'_, Value>;

    fn get_object(&self, input: Value) -> StoreFuture<'_, Value>;

    fn head_bucket(&self, input: Value) -> StoreFuture<'_, Value>;

    fn head_object(&self, input: Value) -> StoreFuture<'_, Value>;

    fn list_buckets(&self, input: Value) -> StoreFuture<'_, Value>;

    /// One page of keys; `IsTruncated` and `NextContinuationToken` drive paging.
    fn list_objects_v2(&self, input: Value) -> StoreFuture<'_, Value>;

    fn put_object(&self, input: Value) -> StoreFuture<'_, Value>;

    fn upload(&self, input: Value, options: TransferOptions) -> StoreFuture<'_, Value>;

    fn signed_url(&self, operation: SignedOperation, input: Value) -> StoreFuture<'_, String>;
}
