use rusoto_core::RusotoError;
use rusoto_s3::{DeleteObjectError, GetObjectError, PutObjectError};
use thiserror::Error;
use uuid::Uuid;

/// Enumerates errors returned by this library.
///
/// Every variant renders as a human-readable message; that message is
/// what ends up in front of the user.
#[derive(Debug, Error)]
pub enum TourisError {
    /// Represents an image submitted without any content.
    #[error("Please select at least one image.")]
    EmptyImage,

    /// Represents image content that could not be decoded.
    #[error("The selected image could not be read.")]
    UndecodableImage(#[source] image::ImageError),

    /// Represents a rating that is not a number between 0 and 5.
    #[error("Please enter a valid rating.")]
    InvalidRating(String),

    /// Represents a required field left empty.
    #[error("Please fill in the {0} field.")]
    MissingField(&'static str),

    /// Represents an error message returned by the identity service.
    #[error("{0}")]
    Authentication(String),

    /// Represents an operation that requires a signed-in identity.
    #[error("You must be signed in.")]
    NotSignedIn,

    /// Represents an error returned by the remote server when uploading.
    #[error("Failed to upload photo")]
    UploadFailed {
        #[source]
        source: RusotoError<PutObjectError>,
    },

    /// Represents an error returned by the remote server when downloading.
    #[error("Failed to download photo")]
    DownloadFailed {
        #[source]
        source: RusotoError<GetObjectError>,
    },

    /// Represents an error returned by the remote server when deleting.
    #[error("Failed to delete photo")]
    DeleteFailed {
        #[source]
        source: RusotoError<DeleteObjectError>,
    },

    /// Represents an error while reading a photo body.
    #[error("Failed to read photo")]
    ReadFailed(#[source] std::io::Error),

    /// Represents a photo larger than the configured ceiling.
    #[error("Photo exceeds {limit} bytes")]
    PhotoTooLarge { limit: u64 },

    /// Represents a photo that does not exist in storage.
    #[error("Photo {0} not found")]
    PhotoNotFound(Uuid),

    /// Represents a failure to build a URL for a stored object.
    #[error("Failed to generate URL")]
    FailedToGenerateUrl {
        #[source]
        source: url::ParseError,
    },

    /// Represents an SQL error.
    #[error("SQLx error")]
    Sqlx {
        #[source]
        source: sqlx::Error,
    },

    /// Represents an ID already taken by another owner's itinerary.
    #[error("ID already exists: {0}")]
    IdAlreadyExists(Uuid),

    /// Represents an itinerary that does not exist.
    #[error("No such itinerary: {0}")]
    NonExistentId(Uuid),

    /// Represents a malformed ID.
    #[error("Invalid ID: {0}")]
    InvalidId(String),

    /// Represents an HTTP error while talking to an external service.
    #[error("Request to {service} failed")]
    Http {
        service: &'static str,
        #[source]
        source: reqwest::Error,
    },

    /// Represents an error message returned by the routing service.
    #[error("{0}")]
    Routing(String),

    /// Represents an error message returned by the geocoding service.
    #[error("{0}")]
    Geocoding(String),

    /// Represents an attempt to add a stop beyond the limit.
    #[error("You can only add up to {0} stops.")]
    TooManyStops(usize),

    /// Represents an attempt to solve a route with too few stops.
    #[error("Please select at least {0} points.")]
    NotEnoughStops(usize),

    /// Represents a stop index outside the current list.
    #[error("No stop at position {0}")]
    NoSuchStop(usize),

    /// Represents a report save attempted before any route was solved.
    #[error("There are no route details to save.")]
    NoReport,

    /// Represents a solve whose stops were changed before it finished.
    #[error("The stops changed while the route was being calculated.")]
    StopsChanged,

    /// Represents a local file error.
    #[error("File error")]
    Io(#[from] std::io::Error),

    /// Represents a malformed multipart submission.
    #[error("Malformed form submission")]
    MalformedFormSubmission,

    /// Represents malformed post metadata.
    #[error("Malformed post metadata")]
    MalformedPostMetadata(#[source] serde_json::Error),

    /// Represents a form submission missing required parts.
    #[error("Missing parts")]
    PartsMissing,
}

/// Broad classes of failure, used to decide how an error is shown.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ErrorKind {
    /// Detected locally, shown inline next to the input.
    Validation,
    /// Reported by the identity service.
    Authentication,
    /// Reported by storage, the itinerary store, routing or geocoding.
    External,
    /// Something expected was absent.
    Missing,
}

impl TourisError {
    pub fn kind(&self) -> ErrorKind {
        use TourisError::*;

        match self {
            EmptyImage
            | UndecodableImage(_)
            | InvalidRating(_)
            | MissingField(_)
            | TooManyStops(_)
            | NotEnoughStops(_)
            | NoSuchStop(_)
            | NoReport
            | StopsChanged
            | InvalidId(_)
            | IdAlreadyExists(_)
            | MalformedFormSubmission
            | MalformedPostMetadata(_)
            | PartsMissing => ErrorKind::Validation,
            Authentication(_) | NotSignedIn => ErrorKind::Authentication,
            PhotoNotFound(_) | NonExistentId(_) => ErrorKind::Missing,
            _ => ErrorKind::External,
        }
    }
}

pub type Result<T, E = TourisError> = std::result::Result<T, E>;
