//! Book search hits and personal-library records.
//!
//! [`BookItem`] mirrors a volume returned by the remote book-search API
//! (camelCase on the wire). [`LibraryBook`] is a record in the user's
//! personal library, stored as a document in a book collection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Image shown when a volume has no thumbnail
pub const PLACEHOLDER_IMAGE_URL: &str =
    "https://images.unsplash.com/photo-1541963463532-d68292c34b19?auto=format&fit=crop&w=80&q=80";

/// A volume returned by the book-search API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookItem {
    /// Volume id assigned by the search API
    pub id: String,
    /// Bibliographic details
    #[serde(default)]
    pub volume_info: VolumeInfo,
}

/// Bibliographic details of a volume
///
/// Every field is optional on the wire; missing fields fall back to defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VolumeInfo {
    /// Title, empty when the API omits it
    pub title: String,
    /// Author names in credit order
    pub authors: Vec<String>,
    /// Publisher name
    pub publisher: Option<String>,
    /// Publication date as the API reports it (`"1965"` or `"1965-08-01"`)
    pub published_date: Option<String>,
    /// Blurb, possibly containing HTML
    pub description: Option<String>,
    /// Number of printed pages
    pub page_count: Option<u32>,
    /// Subject categories
    pub categories: Vec<String>,
    /// Cover thumbnails
    pub image_links: Option<ImageLinks>,
}

/// Thumbnail URLs of a volume
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ImageLinks {
    /// Small cover image, used in lists
    pub small_thumbnail: String,
    /// Regular cover image
    pub thumbnail: String,
}

impl VolumeInfo {
    /// Authors joined for display, e.g. `"Ursula K. Le Guin, Jo Walton"`
    #[must_use]
    pub fn authors_line(&self) -> String {
        self.authors.join(", ")
    }

    /// Categories joined for display
    #[must_use]
    pub fn categories_line(&self) -> String {
        self.categories.join(", ")
    }

    /// HTTPS thumbnail URL, or the placeholder image when there is none
    #[must_use]
    pub fn thumbnail_url(&self) -> String {
        let raw = self
            .image_links
            .as_ref()
            .map_or("", |links| links.small_thumbnail.as_str());
        secure_image_url(raw)
    }
}

/// Rewrite an `http://` image URL to `https://`
///
/// The search API returns plain-http thumbnails, which mobile image loaders
/// refuse. An empty URL yields [`PLACEHOLDER_IMAGE_URL`].
///
/// # Example
///
/// ```
/// use reader_core::book::secure_image_url;
///
/// assert_eq!(
///     secure_image_url("http://books.google.com/x.jpg"),
///     "https://books.google.com/x.jpg"
/// );
/// ```
#[must_use]
pub fn secure_image_url(url: &str) -> String {
    let url = url.trim();
    if url.is_empty() {
        return PLACEHOLDER_IMAGE_URL.to_string();
    }
    url.strip_prefix("http://")
        .map_or_else(|| url.to_string(), |rest| format!("https://{rest}"))
}

/// Where a library book stands for its reader
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadingStatus {
    /// Saved but not started
    NotStarted,
    /// Started and not finished
    Reading,
    /// Finished
    Finished,
}

/// A record in the personal library collection
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LibraryBook {
    /// Document id within the collection
    pub id: String,
    /// Title copied from the search hit
    pub title: String,
    /// Authors joined for display
    pub authors: String,
    /// Reader's free-form notes
    pub notes: String,
    /// HTTPS cover URL or the placeholder image
    pub photo_url: String,
    /// Categories joined for display
    pub categories: String,
    /// Publication date as reported by the search API
    pub published_date: String,
    /// Blurb copied from the search hit
    pub description: String,
    /// Number of printed pages
    pub page_count: Option<u32>,
    /// Reader's rating, 0 when unrated
    pub rating: f64,
    /// Id of the search volume this record was saved from
    pub google_book_id: String,
    /// Owner of the record
    pub user_id: String,
    /// When the reader started the book
    pub started_reading: Option<DateTime<Utc>>,
    /// When the reader finished the book
    pub finished_reading: Option<DateTime<Utc>>,
}

impl LibraryBook {
    /// Build a library record from a search hit
    ///
    /// The document id is left empty; the store assigns one on insert.
    #[must_use]
    pub fn from_item(item: &BookItem, user_id: impl Into<String>) -> Self {
        let info = &item.volume_info;
        Self {
            id: String::new(),
            title: info.title.clone(),
            authors: info.authors_line(),
            notes: String::new(),
            photo_url: info.thumbnail_url(),
            categories: info.categories_line(),
            published_date: info.published_date.clone().unwrap_or_default(),
            description: info.description.clone().unwrap_or_default(),
            page_count: info.page_count,
            rating: 0.0,
            google_book_id: item.id.clone(),
            user_id: user_id.into(),
            started_reading: None,
            finished_reading: None,
        }
    }

    /// Reading progress derived from the start/finish timestamps
    #[must_use]
    pub fn reading_status(&self) -> ReadingStatus {
        match (self.started_reading, self.finished_reading) {
            (_, Some(_)) => ReadingStatus::Finished,
            (Some(_), None) => ReadingStatus::Reading,
            (None, None) => ReadingStatus::NotStarted,
        }
    }

    /// Apply a partial update; fields absent from `update` are left untouched
    pub fn apply(&mut self, update: &BookUpdate) {
        if let Some(notes) = &update.notes {
            self.notes.clone_from(notes);
        }
        if let Some(rating) = update.rating {
            self.rating = rating;
        }
        if let Some(started) = update.started_reading {
            self.started_reading = Some(started);
        }
        if let Some(finished) = update.finished_reading {
            self.finished_reading = Some(finished);
        }
    }
}

/// Partial update written by the update screen
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BookUpdate {
    /// Replacement notes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// New rating
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,
    /// Start-of-reading timestamp to record
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_reading: Option<DateTime<Utc>>,
    /// End-of-reading timestamp to record
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_reading: Option<DateTime<Utc>>,
}

impl BookUpdate {
    /// Set the notes
    #[must_use]
    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    /// Set the rating
    #[must_use]
    pub fn with_rating(mut self, rating: f64) -> Self {
        self.rating = Some(rating);
        self
    }

    /// Mark the book as started at `at`
    #[must_use]
    pub fn started_at(mut self, at: DateTime<Utc>) -> Self {
        self.started_reading = Some(at);
        self
    }

    /// Mark the book as finished at `at`
    #[must_use]
    pub fn finished_at(mut self, at: DateTime<Utc>) -> Self {
        self.finished_reading = Some(at);
        self
    }

    /// Check if the update changes nothing
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.notes.is_none()
            && self.rating.is_none()
            && self.started_reading.is_none()
            && self.finished_reading.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VOLUME_JSON: &str = r#"{
        "id": "zyTCAlFPjgYC",
        "volumeInfo": {
            "title": "The Google Story",
            "authors": ["David A. Vise", "Mark Malseed"],
            "publishedDate": "2005-11-15",
            "pageCount": 207,
            "categories": ["Browsers (Computer programs)"],
            "imageLinks": {
                "smallThumbnail": "http://books.google.com/books/content?id=zyTCAlFPjgYC&zoom=5"
            }
        }
    }"#;

    #[test]
    fn test_volume_deserializes_with_missing_fields() {
        let item: BookItem = serde_json::from_str(VOLUME_JSON).unwrap();
        assert_eq!(item.id, "zyTCAlFPjgYC");
        assert_eq!(item.volume_info.title, "The Google Story");
        assert_eq!(item.volume_info.page_count, Some(207));
        assert!(item.volume_info.description.is_none());
        assert_eq!(item.volume_info.authors_line(), "David A. Vise, Mark Malseed");

        let bare: BookItem = serde_json::from_str(r#"{"id": "x"}"#).unwrap();
        assert_eq!(bare.volume_info, VolumeInfo::default());
    }

    #[test]
    fn test_thumbnail_is_https() {
        let item: BookItem = serde_json::from_str(VOLUME_JSON).unwrap();
        assert!(item.volume_info.thumbnail_url().starts_with("https://books.google.com/"));
    }

    #[test]
    fn test_secure_image_url() {
        assert_eq!(secure_image_url(""), PLACEHOLDER_IMAGE_URL);
        assert_eq!(secure_image_url("  "), PLACEHOLDER_IMAGE_URL);
        assert_eq!(secure_image_url("https://a/b.png"), "https://a/b.png");
        assert_eq!(secure_image_url("http://a/b.png"), "https://a/b.png");
    }

    #[test]
    fn test_library_book_from_item() {
        let item: BookItem = serde_json::from_str(VOLUME_JSON).unwrap();
        let book = LibraryBook::from_item(&item, "user-1");
        assert_eq!(book.google_book_id, "zyTCAlFPjgYC");
        assert_eq!(book.user_id, "user-1");
        assert_eq!(book.authors, "David A. Vise, Mark Malseed");
        assert_eq!(book.published_date, "2005-11-15");
        assert_eq!(book.reading_status(), ReadingStatus::NotStarted);
    }

    #[test]
    fn test_apply_update_is_partial() {
        let now = Utc::now();
        let mut book = LibraryBook {
            notes: "old".into(),
            rating: 3.0,
            ..LibraryBook::default()
        };

        book.apply(&BookUpdate::default().started_at(now));
        assert_eq!(book.notes, "old");
        assert_eq!(book.reading_status(), ReadingStatus::Reading);

        book.apply(&BookUpdate::default().with_notes("great").finished_at(now));
        assert_eq!(book.notes, "great");
        assert!((book.rating - 3.0).abs() < f64::EPSILON);
        assert_eq!(book.reading_status(), ReadingStatus::Finished);
    }

    #[test]
    fn test_empty_update() {
        assert!(BookUpdate::default().is_empty());
        assert!(!BookUpdate::default().with_rating(4.5).is_empty());
    }
}
