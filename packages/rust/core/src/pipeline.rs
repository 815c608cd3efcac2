//! End-to-end workflows over the annotation store: read, send, status, ignore.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{info, instrument, warn};

use marginalia_kobo::KoboDatabase;
use marginalia_shared::{MarginaliaError, RawAnnotation, Result};

use crate::merge::{MergeSummary, merge};
use crate::store::{self, StoreState};
use crate::sync::{Catalog, SyncProgress, SyncReport, sync_all};

// ---------------------------------------------------------------------------
// read
// ---------------------------------------------------------------------------

/// Result of [`read_annotations`].
#[derive(Debug)]
pub struct ReadResult {
    pub summary: MergeSummary,
    /// How the store looked before the merge.
    pub store_state: StoreState,
    /// Where an unreadable store was copied before being replaced.
    pub backup: Option<PathBuf>,
    pub elapsed: Duration,
}

/// Extract annotations from the device database at `source`, merge them into
/// the store at `store_path`, and write the store back.
///
/// An unreadable device database and an unreadable store both degrade to an
/// empty list. Only a failure to write the store is returned as an error.
#[instrument(skip_all, fields(source = %source.display(), store = %store_path.display()))]
pub async fn read_annotations(source: &Path, store_path: &Path, since: &str) -> Result<ReadResult> {
    let start = Instant::now();

    let loaded = store::load_records_lenient(store_path);
    let backup = match loaded.state {
        StoreState::Corrupt => Some(store::backup_corrupt(store_path)?),
        StoreState::Loaded | StoreState::Missing => None,
    };

    let extracted = extract(source, since).await;
    let (records, summary) = merge(extracted, loaded.records);
    store::save_records(store_path, &records)?;

    let result = ReadResult {
        summary,
        store_state: loaded.state,
        backup,
        elapsed: start.elapsed(),
    };

    info!(
        extracted = summary.extracted,
        added = summary.added,
        missing = summary.missing,
        total = summary.total,
        elapsed_ms = result.elapsed.as_millis(),
        "read complete"
    );

    Ok(result)
}

async fn extract(source: &Path, since: &str) -> Vec<RawAnnotation> {
    match KoboDatabase::open(source).await {
        Ok(kobo) => {
            info!(path = %kobo.path().display(), since, "reading device database");
            kobo.annotations_or_empty(since).await
        }
        Err(e) => {
            warn!(error = %e, "could not open device database, continuing with none");
            Vec::new()
        }
    }
}

// ---------------------------------------------------------------------------
// send
// ---------------------------------------------------------------------------

/// Result of [`send_annotations`].
#[derive(Debug)]
pub struct SendResult {
    pub report: SyncReport,
    pub store_state: StoreState,
    pub elapsed: Duration,
}

/// Sync every pending record in the store through `catalog` and write the
/// store back once the full pass is done.
///
/// A missing or unreadable store has nothing to send and is left untouched.
#[instrument(skip_all, fields(store = %store_path.display()))]
pub async fn send_annotations<C: Catalog>(
    store_path: &Path,
    catalog: &C,
    progress: &dyn SyncProgress,
) -> Result<SendResult> {
    let start = Instant::now();

    let loaded = store::load_records_lenient(store_path);
    if loaded.state != StoreState::Loaded {
        warn!(state = ?loaded.state, "no readable annotation store, nothing to send");
        return Ok(SendResult {
            report: SyncReport::default(),
            store_state: loaded.state,
            elapsed: start.elapsed(),
        });
    }

    let mut records = loaded.records;
    let report = sync_all(&mut records, catalog, progress).await;
    store::save_records(store_path, &records)?;

    Ok(SendResult {
        report,
        store_state: loaded.state,
        elapsed: start.elapsed(),
    })
}

// ---------------------------------------------------------------------------
// status / ignore
// ---------------------------------------------------------------------------

/// Record counts for the `status` command.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreStatus {
    pub total: usize,
    pub pending: usize,
    pub synced: usize,
    pub deleted: usize,
    pub off_device: usize,
    pub with_notes: usize,
}

/// Count records by state. A missing store counts as empty.
pub fn store_status(store_path: &Path) -> Result<StoreStatus> {
    if !store_path.exists() {
        return Ok(StoreStatus::default());
    }

    let records = store::load_records(store_path)?;
    let mut status = StoreStatus {
        total: records.len(),
        ..StoreStatus::default()
    };
    for record in &records {
        status.pending += usize::from(record.is_pending());
        status.synced += usize::from(record.synced);
        status.deleted += usize::from(record.deleted);
        status.off_device += usize::from(!record.exists_on_device);
        status.with_notes += usize::from(record.has_note());
    }
    Ok(status)
}

/// Set or clear the tombstone on record `id`. Returns whether it changed.
///
/// The store must already parse; an unknown id is a validation error.
pub fn set_deleted(store_path: &Path, id: &str, deleted: bool) -> Result<bool> {
    let mut records = store::load_records(store_path)?;

    let record = records
        .iter_mut()
        .find(|r| r.id == id)
        .ok_or_else(|| MarginaliaError::validation(format!("no annotation with id '{id}'")))?;

    if record.deleted == deleted {
        return Ok(false);
    }
    record.deleted = deleted;
    info!(id, deleted, "updated tombstone");

    store::save_records(store_path, &records)?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    use marginalia_catalog::HardcoverClient;
    use marginalia_shared::{AnnotationRecord, CatalogSettings, NO_ISBN};
    use serde_json::json;
    use url::Url;
    use uuid::Uuid;
    use wiremock::matchers::{body_string_contains, header, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::sync::SilentSync;

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("marginalia-pipeline-{}", Uuid::now_v7()));
        std::fs::create_dir_all(&dir).expect("temp dir");
        dir
    }

    fn record(id: &str, title: &str, time: &str) -> AnnotationRecord {
        AnnotationRecord::from(RawAnnotation {
            id: id.into(),
            title: title.into(),
            isbn: Some(NO_ISBN.into()),
            time: time.into(),
            chapter: Some("Chapter 1".into()),
            annotation_text: None,
            highlighted_text: Some(format!("highlight {id}")),
        })
    }

    async fn client_for(server: &MockServer) -> HardcoverClient {
        let settings = CatalogSettings {
            api_url: Url::parse(&format!("{}/graphql", server.uri())).unwrap(),
            token: "test-token".into(),
            timeout: Duration::from_secs(5),
        };
        HardcoverClient::new(&settings).unwrap()
    }

    #[tokio::test]
    async fn send_syncs_and_persists_once() {
        let dir = temp_dir();
        let store_path = dir.join("annotations.json");
        let mut done = record("done", "Piranesi", "2024-03-01T00:00:00.000");
        done.synced = true;
        store::save_records(
            &store_path,
            &[
                record("a", "Piranesi", "2024-02-01T00:00:00.000"),
                done,
                record("b", "Piranesi: A Novel", "2024-01-01T00:00:00.000"),
                record("c", "Unknown Book", "2023-01-01T00:00:00.000"),
            ],
        )
        .unwrap();

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("authorization", "Bearer test-token"))
            .and(body_string_contains("getMyLibrary"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {"me": [{"user_books": [
                    {"book": {"id": 7, "title": "Piranesi", "editions": [
                        {"id": 70, "isbn_10": null, "isbn_13": "9781635575637"}
                    ]}}
                ]}]}
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_string_contains("postquote"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {"insert_reading_journal": {"id": 501}}
            })))
            .expect(2)
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let result = send_annotations(&store_path, &client, &SilentSync).await.unwrap();

        assert_eq!(result.report.synced, 2);
        assert_eq!(result.report.skipped, 1);
        assert_eq!(result.report.unresolved, 1);

        let saved = store::load_records(&store_path).unwrap();
        let get = |id: &str| saved.iter().find(|r| r.id == id).unwrap();
        assert!(get("a").synced);
        assert_eq!(get("a").isbn.as_deref(), Some("9781635575637"));
        assert!(get("b").synced);
        assert!(!get("c").synced);
        assert_eq!(get("c").isbn.as_deref(), Some(NO_ISBN));
    }

    #[tokio::test]
    async fn send_with_application_error_leaves_records_pending() {
        let dir = temp_dir();
        let store_path = dir.join("annotations.json");
        store::save_records(&store_path, &[record("a", "Piranesi", "2024-02-01")]).unwrap();

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "errors": [{"message": "invalid token"}]
            })))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let result = send_annotations(&store_path, &client, &SilentSync).await.unwrap();

        assert_eq!(result.report.failed, 1);
        assert!(!store::load_records(&store_path).unwrap()[0].synced);
    }

    #[tokio::test]
    async fn send_does_not_touch_missing_or_corrupt_store() {
        let dir = temp_dir();
        let server = MockServer::start().await;
        let client = client_for(&server).await;

        let missing = dir.join("missing.json");
        let result = send_annotations(&missing, &client, &SilentSync).await.unwrap();
        assert_eq!(result.store_state, StoreState::Missing);
        assert!(!missing.exists());

        let corrupt = dir.join("corrupt.json");
        std::fs::write(&corrupt, "[{").unwrap();
        let result = send_annotations(&corrupt, &client, &SilentSync).await.unwrap();
        assert_eq!(result.store_state, StoreState::Corrupt);
        assert_eq!(std::fs::read_to_string(&corrupt).unwrap(), "[{");
        assert!(server.received_requests().await.unwrap_or_default().is_empty());
    }

    #[tokio::test]
    async fn read_without_device_marks_records_off_device() {
        let dir = temp_dir();
        let store_path = dir.join("annotations.json");
        let mut synced = record("a", "Piranesi", "2024-02-01");
        synced.synced = true;
        store::save_records(&store_path, &[synced]).unwrap();

        let result = read_annotations(&dir.join("KoboReader.sqlite"), &store_path, "1970-01-01")
            .await
            .unwrap();

        assert_eq!(result.summary.missing, 1);
        assert_eq!(result.summary.extracted, 0);
        let saved = store::load_records(&store_path).unwrap();
        assert!(!saved[0].exists_on_device);
        assert!(saved[0].synced);
    }

    #[tokio::test]
    async fn read_backs_up_corrupt_store() {
        let dir = temp_dir();
        let store_path = dir.join("annotations.json");
        std::fs::write(&store_path, "not json").unwrap();

        let result = read_annotations(&dir.join("KoboReader.sqlite"), &store_path, "1970-01-01")
            .await
            .unwrap();

        assert_eq!(result.store_state, StoreState::Corrupt);
        let backup = result.backup.expect("backup path");
        assert_eq!(std::fs::read_to_string(backup).unwrap(), "not json");
        assert!(store::load_records(&store_path).unwrap().is_empty());
    }

    #[test]
    fn status_counts_each_state() {
        let dir = temp_dir();
        let store_path = dir.join("annotations.json");
        let mut synced = record("s", "A", "2024-01-01");
        synced.synced = true;
        let mut deleted = record("d", "B", "2024-01-01");
        deleted.deleted = true;
        deleted.exists_on_device = false;
        let mut noted = record("n", "C", "2024-01-01");
        noted.annotation_text = Some("a note".into());
        store::save_records(&store_path, &[synced, deleted, noted]).unwrap();

        let status = store_status(&store_path).unwrap();
        assert_eq!(
            status,
            StoreStatus { total: 3, pending: 1, synced: 1, deleted: 1, off_device: 1, with_notes: 1 }
        );
        assert_eq!(store_status(&dir.join("nope.json")).unwrap(), StoreStatus::default());
    }

    #[test]
    fn ignore_and_unignore() {
        let dir = temp_dir();
        let store_path = dir.join("annotations.json");
        store::save_records(&store_path, &[record("a", "A", "2024-01-01")]).unwrap();

        assert!(set_deleted(&store_path, "a", true).unwrap());
        assert!(!set_deleted(&store_path, "a", true).unwrap());
        assert!(store::load_records(&store_path).unwrap()[0].deleted);
        assert!(set_deleted(&store_path, "a", false).unwrap());
        assert!(store::load_records(&store_path).unwrap()[0].is_pending());

        let err = set_deleted(&store_path, "zzz", true).unwrap_err();
        assert!(matches!(err, MarginaliaError::Validation { .. }));
    }
}
