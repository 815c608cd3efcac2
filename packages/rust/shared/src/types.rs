//! Core domain types for Marginalia: annotation records and catalog identities.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// ISBN sentinel written by extraction when the device has no ISBN for a book.
pub const NO_ISBN: &str = "No ISBN";

/// ISBN sentinel used when a catalog edition carries neither ISBN-13 nor ISBN-10.
pub const NO_ISBN_FOUND: &str = "No ISBN Found";

/// Chapter label used when the device has no section record for a bookmark.
pub const UNKNOWN_CHAPTER: &str = "Unknown Chapter";

/// Delimiter placed between a highlight and its attached note in a journal entry.
pub const NOTE_DELIMITER: &str = "\n\n============\n\n";

// ---------------------------------------------------------------------------
// RawAnnotation
// ---------------------------------------------------------------------------

/// One row as returned by the extraction source, before any local state exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawAnnotation {
    /// Stable bookmark identifier from the device.
    pub id: String,
    /// Book title (may be derived from the volume path).
    #[serde(default)]
    pub title: String,
    /// ISBN, or [`NO_ISBN`].
    #[serde(default)]
    pub isbn: Option<String>,
    /// Creation timestamp as stored on the device.
    pub time: String,
    /// Section label.
    #[serde(default)]
    pub chapter: Option<String>,
    /// Free-text note attached to the highlight.
    #[serde(default, rename = "annotation", alias = "annotationText")]
    pub annotation_text: Option<String>,
    /// The quoted passage.
    #[serde(default)]
    pub highlighted_text: Option<String>,
}

// ---------------------------------------------------------------------------
// AnnotationRecord
// ---------------------------------------------------------------------------

/// A highlight or note as persisted in the local store, with its sync state.
///
/// The JSON shape is a flat camelCase object; `annotation` holds the note so
/// files written by earlier versions of the tool load unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnotationRecord {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub isbn: Option<String>,
    pub time: String,
    #[serde(default)]
    pub chapter: Option<String>,
    #[serde(default)]
    pub highlighted_text: Option<String>,
    #[serde(default, rename = "annotation", alias = "annotationText")]
    pub annotation_text: Option<String>,
    /// Set once the record has been accepted by the catalog service.
    #[serde(default)]
    pub synced: bool,
    /// Tombstone: excluded from sync but kept for history.
    #[serde(default)]
    pub deleted: bool,
    /// Whether the latest extraction pass saw this record.
    #[serde(default)]
    pub exists_on_device: bool,
}

impl From<RawAnnotation> for AnnotationRecord {
    fn from(raw: RawAnnotation) -> Self {
        Self {
            id: raw.id,
            title: raw.title,
            isbn: raw.isbn,
            time: raw.time,
            chapter: raw.chapter,
            highlighted_text: raw.highlighted_text,
            annotation_text: raw.annotation_text,
            synced: false,
            deleted: false,
            exists_on_device: true,
        }
    }
}

impl AnnotationRecord {
    /// Neither synced nor tombstoned.
    pub fn is_pending(&self) -> bool {
        !self.synced && !self.deleted
    }

    /// Whether a non-blank note is attached.
    pub fn has_note(&self) -> bool {
        self.annotation_text
            .as_deref()
            .is_some_and(|note| !note.trim().is_empty())
    }

    /// The record's ISBN when it is a real identifier rather than a sentinel.
    pub fn usable_isbn(&self) -> Option<&str> {
        self.isbn.as_deref().map(str::trim).filter(|isbn| is_usable_isbn(isbn))
    }

    /// Parsed creation time, used for ordering only.
    ///
    /// Accepts RFC 3339, the device's `YYYY-MM-DDTHH:MM:SS[.fff]` form (with a
    /// `T` or a space), and bare dates. Unparseable values yield `None`.
    pub fn timestamp(&self) -> Option<NaiveDateTime> {
        parse_timestamp(&self.time)
    }
}

/// Whether an ISBN string identifies a book (not empty, not a sentinel).
pub fn is_usable_isbn(isbn: &str) -> bool {
    let isbn = isbn.trim();
    !isbn.is_empty() && isbn != NO_ISBN && isbn != NO_ISBN_FOUND
}

fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.naive_utc());
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

// ---------------------------------------------------------------------------
// Catalog types
// ---------------------------------------------------------------------------

/// A catalog entry resolved from a title or an ISBN.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookIdentity {
    pub book_id: i64,
    pub edition_id: i64,
    /// ISBN-13, else ISBN-10, else [`NO_ISBN_FOUND`].
    pub isbn: String,
}

/// A book in the user's catalog library listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryBook {
    pub id: i64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub editions: Vec<Edition>,
}

/// One edition of a [`LibraryBook`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edition {
    pub id: i64,
    #[serde(default)]
    pub isbn_10: Option<String>,
    #[serde(default)]
    pub isbn_13: Option<String>,
}

impl Edition {
    /// Preferred ISBN for this edition, falling back to [`NO_ISBN_FOUND`].
    pub fn preferred_isbn(&self) -> String {
        [&self.isbn_13, &self.isbn_10]
            .into_iter()
            .flatten()
            .map(|isbn| isbn.trim())
            .find(|isbn| !isbn.is_empty())
            .unwrap_or(NO_ISBN_FOUND)
            .to_string()
    }
}

// ---------------------------------------------------------------------------
// Journal entries
// ---------------------------------------------------------------------------

/// Classification of a reading journal entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JournalEvent {
    /// A bare highlight.
    Quote,
    /// A highlight with an attached note.
    Annotation,
}

impl JournalEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Quote => "quote",
            Self::Annotation => "annotation",
        }
    }
}

/// Submission payload for a new reading journal entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalEntry {
    pub book_id: i64,
    pub edition_id: i64,
    pub entry: String,
    pub event: JournalEvent,
}

impl JournalEntry {
    /// Compose the entry text and event for `record` against a resolved identity.
    pub fn for_record(record: &AnnotationRecord, identity: &BookIdentity) -> Self {
        let highlight = record.highlighted_text.as_deref().unwrap_or_default();
        let (entry, event) = match record.annotation_text.as_deref() {
            Some(note) if record.has_note() => (
                format!("{highlight}{NOTE_DELIMITER}{note}"),
                JournalEvent::Annotation,
            ),
            _ => (highlight.to_string(), JournalEvent::Quote),
        };
        Self {
            book_id: identity.book_id,
            edition_id: identity.edition_id,
            entry,
            event,
        }
    }
}
