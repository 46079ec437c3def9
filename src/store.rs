use std::sync::Arc;

use bytes::Bytes;
use futures::future::{BoxFuture, FutureExt};
use futures::stream::StreamExt;
use rusoto_core::RusotoError;
use rusoto_s3::{
    DeleteObjectRequest, GetObjectError, GetObjectRequest, PutObjectRequest, S3Client,
    StreamingBody, S3,
};
use url::{ParseError, Url};
use uuid::Uuid;

use crate::errors::TourisError;

pub mod memory;

/// Object storage for photos.
pub trait Store: Send + Sync {
    /// Deletes the given object.
    fn delete(&self, key: &Uuid) -> BoxFuture<Result<(), TourisError>>;

    /// Gets the URL for the given object.
    fn get_url(&self, key: &Uuid) -> Result<Url, ParseError>;

    /// Reads the given object, failing once more than `max_bytes` have
    /// been seen.
    fn load(&self, key: &Uuid, max_bytes: u64) -> BoxFuture<Result<Bytes, TourisError>>;

    /// Saves the given data under the given key.
    fn save(&self, key: &Uuid, content_type: String, raw: Vec<u8>) -> BoxFuture<Result<(), TourisError>>;
}

/// A store that saves its data to S3.
pub struct S3Store {
    client: Arc<S3Client>,
    acl: String,
    bucket: String,
    cache_control: String,
    base_url: Url,
}

impl S3Store {
    /// Creates a new instance.
    pub fn new(
        client: Arc<S3Client>,
        acl: String,
        bucket: String,
        cache_control: String,
        base_url: Url,
    ) -> Self {
        Self {
            client,
            acl,
            bucket,
            cache_control,
            base_url,
        }
    }

    pub fn from_env() -> Result<Self, rusoto_core::request::TlsError> {
        use rusoto_core::request::HttpClient;
        use rusoto_core::Region;
        use rusoto_credential::StaticProvider;

        use crate::config::get_variable;

        let access_key = get_variable("S3_ACCESS_KEY");
        let secret_access_key = get_variable("S3_SECRET_ACCESS_KEY");

        let region = Region::Custom {
            name: get_variable("S3_REGION_NAME"),
            endpoint: get_variable("S3_ENDPOINT"),
        };

        let bucket = get_variable("S3_BUCKET_NAME");
        let acl = get_variable("TOURIS_S3_ACL");
        let cache_control = get_variable("TOURIS_S3_CACHE_CONTROL");

        let client = Arc::new(S3Client::new_with(
            HttpClient::new()?,
            StaticProvider::new_minimal(access_key, secret_access_key),
            region,
        ));

        let base_url = Url::parse(&get_variable("S3_BASE_URL")).expect("parse S3_BASE_URL");

        Ok(S3Store::new(client, acl, bucket, cache_control, base_url))
    }
}

impl Store for S3Store {
    fn delete(&self, key: &Uuid) -> BoxFuture<Result<(), TourisError>> {
        delete(self, *key).boxed()
    }

    fn get_url(&self, key: &Uuid) -> Result<Url, ParseError> {
        self.base_url.join(&key.to_string())
    }

    fn load(&self, key: &Uuid, max_bytes: u64) -> BoxFuture<Result<Bytes, TourisError>> {
        download(self, *key, max_bytes).boxed()
    }

    fn save(&self, key: &Uuid, content_type: String, raw: Vec<u8>) -> BoxFuture<Result<(), TourisError>> {
        upload(self, *key, content_type, raw).boxed()
    }
}

async fn delete(store: &S3Store, key: Uuid) -> Result<(), TourisError> {
    let request = DeleteObjectRequest {
        bucket: store.bucket.clone(),
        key: key.to_string(),
        ..Default::default()
    };

    let result = store.client.delete_object(request).await;

    result
        .map(|_| ())
        .map_err(|source| TourisError::DeleteFailed { source })
}

async fn download(store: &S3Store, key: Uuid, max_bytes: u64) -> Result<Bytes, TourisError> {
    let request = GetObjectRequest {
        bucket: store.bucket.clone(),
        key: key.to_string(),
        ..Default::default()
    };

    let output = match store.client.get_object(request).await {
        Ok(output) => output,
        Err(RusotoError::Service(GetObjectError::NoSuchKey(_))) => {
            return Err(TourisError::PhotoNotFound(key))
        }
        Err(source) => return Err(TourisError::DownloadFailed { source }),
    };

    if let Some(length) = output.content_length {
        if length > 0 && length as u64 > max_bytes {
            return Err(TourisError::PhotoTooLarge { limit: max_bytes });
        }
    }

    let body = output.body.ok_or(TourisError::PhotoNotFound(key))?;

    read_bounded(body, max_bytes).await
}

/// Collects a body, stopping as soon as it grows past `max_bytes`.
async fn read_bounded(mut body: StreamingBody, max_bytes: u64) -> Result<Bytes, TourisError> {
    let mut raw: Vec<u8> = vec![];

    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(TourisError::ReadFailed)?;

        if (raw.len() + chunk.len()) as u64 > max_bytes {
            return Err(TourisError::PhotoTooLarge { limit: max_bytes });
        }

        raw.extend_from_slice(&chunk);
    }

    Ok(Bytes::from(raw))
}

async fn upload(store: &S3Store, key: Uuid, content_type: String, raw: Vec<u8>) -> Result<(), TourisError> {
    let len = raw.len() as i64;

    let request = PutObjectRequest {
        acl: Some(store.acl.clone()),
        body: Some(StreamingBody::from(raw)),
        bucket: store.bucket.clone(),
        cache_control: Some(store.cache_control.clone()),
        content_length: Some(len),
        content_type: Some(content_type),
        key: key.to_string(),
        ..Default::default()
    };

    let result = store.client.put_object(request).await;

    match result {
        Ok(_) => Ok(()),
        Err(e) => Err(TourisError::UploadFailed { source: e }),
    }
}
