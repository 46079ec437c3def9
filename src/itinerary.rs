use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use url::Url;
use uuid::Uuid;

use crate::errors::{Result, TourisError};
use crate::normalization;
use crate::session::UserId;

/// The highest rating a location can be given.
pub const MAX_RATING: f64 = 5.0;

/// A point on the map, in WGS84 longitude (`x`) and latitude (`y`).
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
pub struct Coordinate {
    pub x: f64,
    pub y: f64,
}

impl Coordinate {
    pub fn new(x: f64, y: f64) -> Self {
        Coordinate { x, y }
    }
}

/// A reference to a photo held in object storage.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct PhotoRef {
    /// The key the photo was stored under.
    pub key: Uuid,

    /// Where the photo can be fetched from.
    pub url: Url,
}

impl PhotoRef {
    pub fn new(key: Uuid, url: Url) -> Self {
        PhotoRef { key, url }
    }
}

/// A single place posted to an itinerary.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Location {
    /// The ID of the location. Never changes once generated.
    id: Uuid,

    /// The name provided.
    #[serde(deserialize_with = "normalization::deserialize_name")]
    pub(crate) name: String,

    /// The description provided.
    #[serde(default)]
    #[serde(deserialize_with = "normalization::deserialize_text")]
    pub(crate) description: String,

    /// The rating provided, if any.
    #[serde(default)]
    pub(crate) rating: Option<f64>,

    /// The photos attached to the location.
    #[serde(default)]
    pub(crate) photos: Vec<PhotoRef>,

    /// Where the location is.
    pub(crate) coordinate: Coordinate,

    /// The date the author picked for the visit, if any.
    #[serde(default, with = "timestamp_option")]
    pub(crate) selected_date: Option<OffsetDateTime>,
}

impl Location {
    pub fn new(name: impl AsRef<str>, description: impl AsRef<str>, coordinate: Coordinate) -> Self {
        Location {
            id: Uuid::new_v4(),
            name: normalization::normalize_name(name),
            description: normalization::normalize_text(description),
            rating: None,
            photos: vec![],
            coordinate,
            selected_date: None,
        }
    }

    pub fn with_rating(mut self, rating: f64) -> Result<Self> {
        self.rating = Some(check_rating(rating)?);
        Ok(self)
    }

    pub fn with_photos(mut self, photos: Vec<PhotoRef>) -> Self {
        self.photos = photos;
        self
    }

    pub fn with_selected_date(mut self, date: OffsetDateTime) -> Self {
        self.selected_date = Some(date);
        self
    }

    pub fn id(&self) -> &Uuid {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn rating(&self) -> Option<f64> {
        self.rating
    }

    pub fn photos(&self) -> &[PhotoRef] {
        &self.photos
    }

    pub fn coordinate(&self) -> Coordinate {
        self.coordinate
    }

    pub fn selected_date(&self) -> Option<OffsetDateTime> {
        self.selected_date
    }

    /// Replaces the edited fields in place. The ID is kept.
    pub fn edit(&mut self, edit: LocationEdit) -> Result<()> {
        if let Some(name) = &edit.name {
            if normalization::normalize_name(name).is_empty() {
                return Err(TourisError::MissingField("name"));
            }
        }

        let rating = match edit.rating {
            Some(rating) => Some(check_rating(rating)?),
            None => None,
        };

        if let Some(name) = edit.name {
            self.name = normalization::normalize_name(name);
        }

        if let Some(description) = edit.description {
            self.description = normalization::normalize_text(description);
        }

        if rating.is_some() {
            self.rating = rating;
        }

        if let Some(photos) = edit.photos {
            self.photos = photos;
        }

        if let Some(coordinate) = edit.coordinate {
            self.coordinate = coordinate;
        }

        if let Some(date) = edit.selected_date {
            self.selected_date = Some(date);
        }

        Ok(())
    }
}

/// The fields changed by an edit. `None` leaves a field as it was.
#[derive(Clone, Debug, Default)]
pub struct LocationEdit {
    pub name: Option<String>,
    pub description: Option<String>,
    pub rating: Option<f64>,
    pub photos: Option<Vec<PhotoRef>>,
    pub coordinate: Option<Coordinate>,
    pub selected_date: Option<OffsetDateTime>,
}

/// Likes, comments and the author's picture, when the backend has them.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct Social {
    pub like_count: u32,
    pub comment_count: u32,
    pub author_photo: Option<PhotoRef>,
}

/// A named, described collection of locations authored by one identity.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Itinerary {
    /// The ID of the itinerary.
    id: Uuid,

    /// The identity that owns it. Stamped when saved.
    #[serde(default)]
    pub(crate) owner: Option<UserId>,

    /// The title provided.
    #[serde(deserialize_with = "normalization::deserialize_name")]
    pub(crate) title: String,

    /// The description provided.
    #[serde(default)]
    #[serde(deserialize_with = "normalization::deserialize_text")]
    pub(crate) description: String,

    /// The locations, in the order they were posted.
    #[serde(default)]
    pub(crate) locations: Vec<Location>,

    /// Social metadata, if any.
    #[serde(default)]
    pub(crate) social: Option<Social>,
}

impl Itinerary {
    pub fn new(title: impl AsRef<str>, description: impl AsRef<str>) -> Self {
        Itinerary {
            id: Uuid::new_v4(),
            owner: None,
            title: normalization::normalize_name(title),
            description: normalization::normalize_text(description),
            locations: vec![],
            social: None,
        }
    }

    pub fn with_location(mut self, location: Location) -> Self {
        self.locations.push(location);
        self
    }

    pub fn with_social(mut self, social: Social) -> Self {
        self.social = Some(social);
        self
    }

    pub fn id(&self) -> &Uuid {
        &self.id
    }

    pub fn owner(&self) -> Option<&UserId> {
        self.owner.as_ref()
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn locations(&self) -> &[Location] {
        &self.locations
    }

    pub fn locations_mut(&mut self) -> &mut Vec<Location> {
        &mut self.locations
    }

    pub fn social(&self) -> Option<&Social> {
        self.social.as_ref()
    }

    /// Every photo reference in location order.
    pub fn photos(&self) -> impl Iterator<Item = &PhotoRef> {
        self.locations.iter().flat_map(|l| l.photos.iter())
    }

    pub(crate) fn set_owner(&mut self, owner: UserId) {
        self.owner = Some(owner);
    }
}

/// What the "create post" screen submits alongside the photos.
#[derive(Clone, Debug, Deserialize)]
pub struct PostMetadata {
    #[serde(default = "default_title")]
    pub title: String,

    pub name: String,

    #[serde(default)]
    pub description: String,

    /// The rating as typed. Parsed and range-checked by [`PostMetadata::into_itinerary`].
    pub rating: String,

    pub coordinate: Option<Coordinate>,

    #[serde(default, with = "timestamp_option")]
    pub selected_date: Option<OffsetDateTime>,
}

fn default_title() -> String {
    "New Itinerary".to_owned()
}

impl PostMetadata {
    /// Checks the submission and builds a single-location itinerary from
    /// it. Photos must already have been uploaded.
    pub fn into_itinerary(self, photos: Vec<PhotoRef>) -> Result<Itinerary> {
        let rating = parse_rating(&self.rating)?;

        if normalization::normalize_name(&self.name).is_empty() {
            return Err(TourisError::MissingField("name"));
        }

        let mut location = Location::new(
            &self.name,
            &self.description,
            self.coordinate.unwrap_or(Coordinate::new(0.0, 0.0)),
        )
        .with_rating(rating)?
        .with_photos(photos);

        location.selected_date = self.selected_date;

        Ok(Itinerary::new(&self.title, "").with_location(location))
    }

    /// Checks everything that can be checked before photos are uploaded.
    pub fn validate(&self, photo_count: usize) -> Result<()> {
        if photo_count == 0 {
            return Err(TourisError::EmptyImage);
        }

        parse_rating(&self.rating)?;

        if normalization::normalize_name(&self.name).is_empty() {
            return Err(TourisError::MissingField("name"));
        }

        Ok(())
    }
}

/// Parses a rating as typed into the post form.
pub fn parse_rating(raw: &str) -> Result<f64> {
    let rating: f64 = raw
        .trim()
        .parse()
        .map_err(|_| TourisError::InvalidRating(raw.to_owned()))?;

    check_rating(rating)
}

fn check_rating(rating: f64) -> Result<f64> {
    if rating.is_finite() && (0.0..=MAX_RATING).contains(&rating) {
        Ok(rating)
    } else {
        Err(TourisError::InvalidRating(rating.to_string()))
    }
}

/// Serializes optional timestamps as Unix seconds.
mod timestamp_option {
    use serde::{Deserialize, Deserializer, Serializer};
    use time::OffsetDateTime;

    pub fn serialize<S>(value: &Option<OffsetDateTime>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(date) => serializer.serialize_some(&date.timestamp()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<OffsetDateTime>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let seconds: Option<i64> = Deserialize::deserialize(deserializer)?;
        Ok(seconds.map(OffsetDateTime::from_unix_timestamp))
    }
}
