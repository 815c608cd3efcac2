//! Kobo e-reader annotation source (libSQL, read-only).
//!
//! [`KoboDatabase`] opens a device's `KoboReader.sqlite` and returns every
//! highlight or note as a [`RawAnnotation`], including bookmarks from books
//! that have since been returned or deleted on the device.

mod detect;

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use libsql::{Connection, Database, OpenFlags, params};
use marginalia_shared::{MarginaliaError, RawAnnotation, Result};
use tracing::{info, instrument, warn};

pub use detect::{KOBO_DB_RELATIVE_PATH, detect_device, detect_device_in, default_mount_roots};

/// Bookmarks joined to their book title/ISBN, chapter title, and the library
/// loan table. When the book's content row is gone the title is recovered
/// from the volume path.
const ANNOTATIONS_SQL: &str = "
    SELECT
      b.BookmarkID AS id,
      COALESCE(
        c_book.Title,
        od.title,
        REPLACE(REPLACE(b.VolumeID, 'file:///mnt/onboard/', ''), '.epub', '')
      ) AS title,
      COALESCE(c_book.ISBN, 'No ISBN') AS isbn,
      b.DateCreated AS time,
      COALESCE(c_chapter.Title, 'Unknown Chapter') AS chapter,
      b.Annotation AS annotation,
      b.Text AS highlightedText
    FROM Bookmark b
    LEFT JOIN content c_book
      ON b.VolumeID = c_book.ContentID
      OR b.VolumeID LIKE '%' || c_book.ContentID
    LEFT JOIN content c_chapter
      ON b.ContentID = c_chapter.ContentID
    LEFT JOIN OverDriveCheckoutBook od
      ON b.VolumeID = od.id
    WHERE b.DateCreated >= ?1
      AND (COALESCE(b.Text, '') != '' OR COALESCE(b.Annotation, '') != '')
    ORDER BY b.DateCreated DESC
";

/// Read-only handle on a Kobo device database.
pub struct KoboDatabase {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    path: PathBuf,
}

impl KoboDatabase {
    /// Open the database at `path` without write access.
    pub async fn open(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(MarginaliaError::io(
                path,
                std::io::Error::new(std::io::ErrorKind::NotFound, "Kobo database not found"),
            ));
        }

        let db = libsql::Builder::new_local(path)
            .flags(OpenFlags::SQLITE_OPEN_READ_ONLY)
            .build()
            .await
            .map_err(|e| MarginaliaError::Source(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| MarginaliaError::Source(e.to_string()))?;

        Ok(Self {
            db,
            conn,
            path: path.to_path_buf(),
        })
    }

    /// Location of the opened database.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every highlight or note created at or after `since`, newest first.
    ///
    /// Rows duplicated by the fuzzy volume join collapse to their first
    /// occurrence.
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub async fn annotations(&self, since: &str) -> Result<Vec<RawAnnotation>> {
        let mut rows = self
            .conn
            .query(ANNOTATIONS_SQL, params![since])
            .await
            .map_err(|e| MarginaliaError::Source(format!("annotation query failed: {e}")))?;

        let mut seen = HashSet::new();
        let mut results = Vec::new();
        loop {
            let row = match rows.next().await {
                Ok(Some(row)) => row,
                Ok(None) => break,
                Err(e) => return Err(MarginaliaError::Source(e.to_string())),
            };
            let annotation = row_to_raw_annotation(&row)?;
            if seen.insert(annotation.id.clone()) {
                results.push(annotation);
            }
        }

        info!(count = results.len(), since, "read annotations from device");
        Ok(results)
    }

    /// Like [`annotations`](Self::annotations) but a failed query degrades to
    /// an empty list.
    pub async fn annotations_or_empty(&self, since: &str) -> Vec<RawAnnotation> {
        match self.annotations(since).await {
            Ok(found) => found,
            Err(e) => {
                warn!(error = %e, "could not read annotations, continuing with none");
                Vec::new()
            }
        }
    }
}

fn row_to_raw_annotation(row: &libsql::Row) -> Result<RawAnnotation> {
    Ok(RawAnnotation {
        id: row
            .get::<String>(0)
            .map_err(|e| MarginaliaError::Source(e.to_string()))?,
        title: row.get::<String>(1).unwrap_or_default(),
        isbn: row.get::<String>(2).ok(),
        time: row
            .get::<String>(3)
            .map_err(|e| MarginaliaError::Source(e.to_string()))?,
        chapter: row.get::<String>(4).ok(),
        annotation_text: row.get::<String>(5).ok(),
        highlighted_text: row.get::<String>(6).ok(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use marginalia_shared::{NO_ISBN, UNKNOWN_CHAPTER};
    use uuid::Uuid;

    const SCHEMA: &str = "
        CREATE TABLE content (ContentID TEXT PRIMARY KEY, Title TEXT, ISBN TEXT);
        CREATE TABLE OverDriveCheckoutBook (id TEXT PRIMARY KEY, title TEXT);
        CREATE TABLE Bookmark (
            BookmarkID TEXT PRIMARY KEY,
            VolumeID TEXT,
            ContentID TEXT,
            Text TEXT,
            Annotation TEXT,
            DateCreated TEXT,
            Type TEXT
        );
        INSERT INTO content VALUES ('file:///mnt/onboard/dune.epub', 'Dune', '9780441172719');
        INSERT INTO content VALUES ('dune-ch1', 'Book One: Dune', NULL);
        INSERT INTO OverDriveCheckoutBook VALUES ('loan-1', 'The Wild Iris');
        INSERT INTO Bookmark VALUES ('bm-1', 'file:///mnt/onboard/dune.epub', 'dune-ch1', 'Fear is the mind-killer.', NULL, '2024-01-10T08:00:00.000', 'highlight');
        INSERT INTO Bookmark VALUES ('bm-2', 'file:///mnt/onboard/dune.epub', 'missing', 'Walk without rhythm.', 'sandworms', '2024-02-10T08:00:00.000', 'note');
        INSERT INTO Bookmark VALUES ('bm-3', 'loan-1', 'loan-ch', NULL, 'a note only', '2023-06-01T08:00:00.000', 'note');
        INSERT INTO Bookmark VALUES ('bm-4', 'file:///mnt/onboard/Leviathan Wakes.epub', 'x', 'Doors and corners', NULL, '2022-03-01T08:00:00.000', 'highlight');
        INSERT INTO Bookmark VALUES ('bm-5', 'file:///mnt/onboard/dune.epub', 'dune-ch1', '', '', '2024-03-10T08:00:00.000', 'dogear');
    ";

    /// Create a temp Kobo-shaped database and return its path.
    async fn fixture_db() -> PathBuf {
        let tmp = std::env::temp_dir().join(format!("marginalia_kobo_{}.sqlite", Uuid::now_v7()));
        let db = libsql::Builder::new_local(&tmp)
            .build()
            .await
            .expect("create fixture db");
        let conn = db.connect().expect("connect fixture db");
        conn.execute_batch(SCHEMA).await.expect("seed fixture db");
        tmp
    }

    #[tokio::test]
    async fn reads_highlights_and_notes_newest_first() {
        let path = fixture_db().await;
        let kobo = KoboDatabase::open(&path).await.expect("open");
        let found = kobo.annotations("1970-01-01").await.expect("query");

        let ids: Vec<&str> = found.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["bm-2", "bm-1", "bm-3", "bm-4"]);
    }

    #[tokio::test]
    async fn applies_title_isbn_and_chapter_fallbacks() {
        let path = fixture_db().await;
        let kobo = KoboDatabase::open(&path).await.expect("open");
        let found = kobo.annotations("1970-01-01").await.expect("query");
        let by_id = |id: &str| found.iter().find(|a| a.id == id).expect("present").clone();

        let bm1 = by_id("bm-1");
        assert_eq!(bm1.title, "Dune");
        assert_eq!(bm1.isbn.as_deref(), Some("9780441172719"));
        assert_eq!(bm1.chapter.as_deref(), Some("Book One: Dune"));

        let bm2 = by_id("bm-2");
        assert_eq!(bm2.chapter.as_deref(), Some(UNKNOWN_CHAPTER));
        assert_eq!(bm2.annotation_text.as_deref(), Some("sandworms"));

        let bm3 = by_id("bm-3");
        assert_eq!(bm3.title, "The Wild Iris");
        assert_eq!(bm3.isbn.as_deref(), Some(NO_ISBN));
        assert_eq!(bm3.highlighted_text, None);

        let bm4 = by_id("bm-4");
        assert_eq!(bm4.title, "Leviathan Wakes");
    }

    #[tokio::test]
    async fn since_filters_older_bookmarks() {
        let path = fixture_db().await;
        let kobo = KoboDatabase::open(&path).await.expect("open");
        assert_eq!(kobo.path(), path.as_path());
        let found = kobo.annotations("2024-01-01").await.expect("query");
        assert_eq!(found.len(), 2);
    }

    #[tokio::test]
    async fn missing_database_is_an_error() {
        let path = std::env::temp_dir().join(format!("marginalia_missing_{}.sqlite", Uuid::now_v7()));
        assert!(KoboDatabase::open(&path).await.is_err());
    }

    #[tokio::test]
    async fn query_failure_degrades_to_empty() {
        let tmp = std::env::temp_dir().join(format!("marginalia_empty_{}.sqlite", Uuid::now_v7()));
        {
            let db = libsql::Builder::new_local(&tmp).build().await.expect("create");
            let conn = db.connect().expect("connect");
            conn.execute_batch("CREATE TABLE unrelated (x INTEGER);")
                .await
                .expect("seed");
        }
        let kobo = KoboDatabase::open(&tmp).await.expect("open");
        assert!(kobo.annotations("1970-01-01").await.is_err());
        assert!(kobo.annotations_or_empty("1970-01-01").await.is_empty());
    }
}
