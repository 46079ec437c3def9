use std::sync::Arc;

use bytes::Bytes;
use image::ImageFormat;
use log::{debug, o, Logger};
use mime::Mime;
use uuid::Uuid;

use crate::errors::{Result, TourisError};
use crate::itinerary::PhotoRef;
use crate::store::Store;

/// The default ceiling for a single photo download.
pub const DEFAULT_MAX_PHOTO_BYTES: u64 = 10 * 1024 * 1024;

/// Uploads and downloads photos, keyed by generated IDs.
pub struct PhotoStore {
    logger: Arc<Logger>,
    store: Arc<dyn Store>,
    max_bytes: u64,
}

impl PhotoStore {
    pub fn new(logger: Arc<Logger>, store: Arc<dyn Store>, max_bytes: u64) -> Self {
        PhotoStore {
            logger: Arc::new(logger.new(o!("component" => "photos"))),
            store,
            max_bytes,
        }
    }

    /// Checks that `raw` is an image and stores it under a new key.
    /// Nothing is sent to storage if the check fails.
    pub async fn upload(&self, raw: Vec<u8>) -> Result<PhotoRef> {
        let content_type = identify(&raw)?;
        let photo = self.reference(Uuid::new_v4())?;

        debug!(self.logger, "Uploading photo..."; "key" => %photo.key, "content_type" => %content_type, "bytes" => raw.len());
        self.store.save(&photo.key, content_type.to_string(), raw).await?;

        Ok(photo)
    }

    /// Reads a photo back, refusing anything over the size ceiling.
    pub async fn fetch(&self, photo: &PhotoRef) -> Result<Bytes> {
        debug!(self.logger, "Fetching photo..."; "key" => %photo.key);

        self.store.load(&photo.key, self.max_bytes).await
    }

    /// Rebuilds the reference for a stored key.
    pub fn reference(&self, key: Uuid) -> Result<PhotoRef> {
        let url = self
            .store
            .get_url(&key)
            .map_err(|source| TourisError::FailedToGenerateUrl { source })?;

        Ok(PhotoRef::new(key, url))
    }

    pub async fn delete(&self, photo: &PhotoRef) -> Result<()> {
        debug!(self.logger, "Deleting photo..."; "key" => %photo.key);

        self.store.delete(&photo.key).await
    }
}

/// Decodes `raw` and returns the content type to store it with.
pub fn identify(raw: &[u8]) -> Result<Mime> {
    if raw.is_empty() {
        return Err(TourisError::EmptyImage);
    }

    let format = image::guess_format(raw).map_err(TourisError::UndecodableImage)?;

    // the header alone can lie, so decode the whole thing
    image::load_from_memory_with_format(raw, format).map_err(TourisError::UndecodableImage)?;

    Ok(mime_for(format))
}

/// Guesses the content type of stored bytes from their header only.
pub fn sniff(raw: &[u8]) -> Mime {
    image::guess_format(raw)
        .map(mime_for)
        .unwrap_or(mime::APPLICATION_OCTET_STREAM)
}

fn mime_for(format: ImageFormat) -> Mime {
    match format {
        ImageFormat::Png => mime::IMAGE_PNG,
        ImageFormat::Jpeg => mime::IMAGE_JPEG,
        ImageFormat::Gif => mime::IMAGE_GIF,
        ImageFormat::Bmp => mime::IMAGE_BMP,
        other => other
            .extensions_str()
            .first()
            .and_then(|ext| format!("image/{}", ext).parse().ok())
            .unwrap_or(mime::APPLICATION_OCTET_STREAM),
    }
}
