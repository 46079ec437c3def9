use std::io;

use bytes::{Buf, Bytes};
use futures::stream::{StreamExt, TryStreamExt};
use warp::multipart::{FormData, Part};

use crate::errors::{Result, TourisError};
use crate::itinerary::PostMetadata;

const METADATA_PART: &str = "metadata";
const PHOTO_PART: &str = "photo";

/// A "create post" form, split into its parts.
#[derive(Debug)]
pub struct PostSubmission {
    pub metadata: PostMetadata,

    /// The raw photo parts, in form order. Not yet checked.
    pub photos: Vec<Vec<u8>>,
}

/// Reads a `metadata` JSON part and any number of `photo` parts. Other
/// parts are ignored.
pub async fn parse_post(mut form: FormData) -> Result<PostSubmission> {
    let mut metadata = None;
    let mut photos = vec![];

    // parts are streamed, so each body has to be read before the next part
    while let Some(part) = form
        .try_next()
        .await
        .map_err(|_| TourisError::MalformedFormSubmission)?
    {
        let name = part.name().to_owned();

        match name.as_str() {
            METADATA_PART => {
                let raw = part_as_vec(part)
                    .await
                    .map_err(|_| TourisError::MalformedFormSubmission)?;

                metadata = Some(
                    serde_json::from_slice::<PostMetadata>(&raw)
                        .map_err(TourisError::MalformedPostMetadata)?,
                );
            }
            PHOTO_PART => photos.push(
                part_as_vec(part)
                    .await
                    .map_err(|_| TourisError::MalformedFormSubmission)?,
            ),
            _ => {}
        }
    }

    let metadata = metadata.ok_or(TourisError::PartsMissing)?;

    Ok(PostSubmission { metadata, photos })
}

/// Collects chunks of [`Part`].
pub async fn part_as_vec(raw: Part) -> Result<Vec<u8>, ()> {
    let vec_of_results = part_as_stream(raw).collect::<Vec<_>>().await;

    let vec_of_vecs = vec_of_results
        .into_iter()
        .map(|r| r.map(|b| b.to_vec()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| ())?;

    Ok(vec_of_vecs.concat())
}

/// Collects raw data from [`Part`].
pub fn part_as_stream(raw: Part) -> impl futures::Stream<Item = Result<Bytes, io::Error>> {
    raw.stream().map(|r| {
        r.map(|mut x| x.copy_to_bytes(x.remaining()))
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "could not retrieve chunk"))
    })
}
