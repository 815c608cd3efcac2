//! Per-record sync executor.
//!
//! Records are processed strictly in list order, one at a time. Every
//! failure is caught at the record that caused it and turned into a
//! [`RecordOutcome`], so one bad record never stops the rest of the run.

use std::collections::HashMap;

use marginalia_catalog::HardcoverClient;
use marginalia_shared::{AnnotationRecord, BookIdentity, JournalEntry, LibraryBook, Result};
use serde::Serialize;
use tracing::{debug, error, info, instrument, warn};

use crate::normalize::normalize_title;
use crate::resolver;

// ---------------------------------------------------------------------------
// Catalog seam
// ---------------------------------------------------------------------------

/// The remote catalog as seen by the executor.
#[allow(async_fn_in_trait)]
pub trait Catalog {
    /// The user's full library listing.
    async fn fetch_library(&self) -> Result<Vec<LibraryBook>>;
    /// Catalog identity for an ISBN, `None` when unknown to the catalog.
    async fn find_by_isbn(&self, isbn: &str) -> Result<Option<BookIdentity>>;
    /// Create a journal entry; returns the new entry id when reported.
    async fn submit(&self, entry: &JournalEntry) -> Result<Option<i64>>;
}

impl Catalog for HardcoverClient {
    async fn fetch_library(&self) -> Result<Vec<LibraryBook>> {
        HardcoverClient::fetch_library(self).await
    }

    async fn find_by_isbn(&self, isbn: &str) -> Result<Option<BookIdentity>> {
        HardcoverClient::find_by_isbn(self, isbn).await
    }

    async fn submit(&self, entry: &JournalEntry) -> Result<Option<i64>> {
        HardcoverClient::insert_journal_entry(self, entry).await
    }
}

// ---------------------------------------------------------------------------
// Resolution cache
// ---------------------------------------------------------------------------

/// What is known about a title within one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Fully resolved catalog identity.
    Identity(BookIdentity),
    /// Only an ISBN is known; the identity still has to be looked up.
    Isbn(String),
}

/// Run-scoped memo of normalized title to resolution, including negative
/// results. Built fresh for every run and dropped at its end.
#[derive(Debug, Default)]
pub struct ResolutionCache {
    entries: HashMap<String, Option<Resolution>>,
}

impl ResolutionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// `Some(None)` means the title is known to have no identity.
    pub fn get(&self, key: &str) -> Option<&Option<Resolution>> {
        self.entries.get(key)
    }

    pub fn insert(&mut self, key: String, resolution: Option<Resolution>) {
        self.entries.insert(key, resolution);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Outcomes & report
// ---------------------------------------------------------------------------

/// Result of processing one record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RecordOutcome {
    /// Already synced or tombstoned; no calls made.
    Skipped,
    /// No confident catalog identity this run.
    Unresolved,
    /// Accepted by the catalog.
    Synced { entry_id: Option<i64> },
    /// Transport, status, or application error; state left unchanged.
    Failed { error: String },
}

/// Tally of a sync run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncReport {
    pub total: usize,
    pub skipped: usize,
    pub unresolved: usize,
    pub synced: usize,
    pub failed: usize,
    /// Library listing requests issued.
    pub library_fetches: usize,
    /// ISBN lookup requests issued.
    pub isbn_lookups: usize,
    /// Records answered from the resolution cache.
    pub cache_hits: usize,
    /// Per-record outcomes in processing order, keyed by record id.
    pub outcomes: Vec<(String, RecordOutcome)>,
}

impl SyncReport {
    fn tally(&mut self, id: &str, outcome: RecordOutcome) {
        match &outcome {
            RecordOutcome::Skipped => self.skipped += 1,
            RecordOutcome::Unresolved => self.unresolved += 1,
            RecordOutcome::Synced { .. } => self.synced += 1,
            RecordOutcome::Failed { .. } => self.failed += 1,
        }
        self.outcomes.push((id.to_string(), outcome));
    }
}

/// Progress callback for reporting sync status.
pub trait SyncProgress: Send + Sync {
    /// Called once before the first record.
    fn started(&self, pending: usize);
    /// Called after each record.
    fn record_done(&self, record: &AnnotationRecord, outcome: &RecordOutcome, current: usize, total: usize);
    /// Called when the run completes.
    fn finished(&self, report: &SyncReport);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentSync;

impl SyncProgress for SilentSync {
    fn started(&self, _pending: usize) {}
    fn record_done(&self, _record: &AnnotationRecord, _outcome: &RecordOutcome, _current: usize, _total: usize) {}
    fn finished(&self, _report: &SyncReport) {}
}

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

/// Sync every pending record against `catalog`, updating state in place.
///
/// A record is marked `synced` (and takes the resolved ISBN) only after the
/// catalog acknowledged its journal entry. The cache and the library listing
/// live only for this call.
#[instrument(skip_all, fields(records = records.len()))]
pub async fn sync_all<C: Catalog>(
    records: &mut [AnnotationRecord],
    catalog: &C,
    progress: &dyn SyncProgress,
) -> SyncReport {
    let total = records.len();
    let pending = records.iter().filter(|r| r.is_pending()).count();
    info!(total, pending, "starting sync");
    progress.started(pending);

    let mut run = SyncRun {
        catalog,
        cache: ResolutionCache::new(),
        library: None,
        report: SyncReport {
            total,
            ..SyncReport::default()
        },
    };

    for (i, record) in records.iter_mut().enumerate() {
        let outcome = run.process(record).await;
        progress.record_done(record, &outcome, i + 1, total);
        run.report.tally(&record.id, outcome);
    }

    let cached_titles = run.cache.len();
    let report = run.report;
    info!(
        cached_titles,
        synced = report.synced,
        unresolved = report.unresolved,
        failed = report.failed,
        skipped = report.skipped,
        library_fetches = report.library_fetches,
        isbn_lookups = report.isbn_lookups,
        "sync complete"
    );
    progress.finished(&report);
    report
}

/// State for a single sync run.
struct SyncRun<'a, C> {
    catalog: &'a C,
    cache: ResolutionCache,
    /// Library listing, fetched at most once per run.
    library: Option<Vec<LibraryBook>>,
    report: SyncReport,
}

impl<C: Catalog> SyncRun<'_, C> {
    async fn process(&mut self, record: &mut AnnotationRecord) -> RecordOutcome {
        if !record.is_pending() {
            return RecordOutcome::Skipped;
        }

        match self.sync_record(record).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(id = %record.id, title = %record.title, error = %e, "failed to sync annotation");
                RecordOutcome::Failed {
                    error: e.to_string(),
                }
            }
        }
    }

    async fn sync_record(&mut self, record: &mut AnnotationRecord) -> Result<RecordOutcome> {
        let Some(identity) = self.identity_for(record).await? else {
            warn!(id = %record.id, title = %record.title, "could not resolve book, skipping");
            return Ok(RecordOutcome::Unresolved);
        };

        let entry = JournalEntry::for_record(record, &identity);
        let entry_id = self.catalog.submit(&entry).await?;

        record.synced = true;
        record.isbn = Some(identity.isbn);
        info!(id = %record.id, title = %record.title, event = entry.event.as_str(), "synced annotation");
        Ok(RecordOutcome::Synced { entry_id })
    }

    /// Identity for `record`: cache, then the record's own ISBN, then the
    /// fuzzy resolver. Only definitive answers are cached.
    async fn identity_for(&mut self, record: &AnnotationRecord) -> Result<Option<BookIdentity>> {
        let key = normalize_title(&record.title);

        // Untitled records would all collide on one key.
        if key.is_empty() {
            return match record.usable_isbn() {
                Some(isbn) => self.lookup_isbn(isbn).await,
                None => Ok(None),
            };
        }

        let resolution = match self.cache.get(&key) {
            Some(cached) => {
                self.report.cache_hits += 1;
                debug!(key = %key, "resolution cache hit");
                cached.clone()
            }
            None => {
                let fresh = match record.usable_isbn() {
                    Some(isbn) => {
                        debug!(title = %record.title, isbn, "using existing ISBN");
                        Some(Resolution::Isbn(isbn.to_string()))
                    }
                    None => {
                        debug!(title = %record.title, "resolving title against library");
                        self.resolve_title(&record.title).await?.map(Resolution::Identity)
                    }
                };
                self.cache.insert(key.clone(), fresh.clone());
                fresh
            }
        };

        match resolution {
            None => Ok(None),
            Some(Resolution::Identity(identity)) => Ok(Some(identity)),
            Some(Resolution::Isbn(isbn)) => {
                let found = self.lookup_isbn(&isbn).await?;
                self.cache
                    .insert(key, found.clone().map(Resolution::Identity));
                Ok(found)
            }
        }
    }

    async fn resolve_title(&mut self, title: &str) -> Result<Option<BookIdentity>> {
        if self.library.is_none() {
            self.report.library_fetches += 1;
            self.library = Some(self.catalog.fetch_library().await?);
        }
        let library = self.library.as_deref().unwrap_or_default();
        Ok(resolver::resolve(title, library))
    }

    async fn lookup_isbn(&mut self, isbn: &str) -> Result<Option<BookIdentity>> {
        self.report.isbn_lookups += 1;
        let found = self.catalog.find_by_isbn(isbn).await?;
        if found.is_none() {
            warn!(isbn, "ISBN not found in catalog");
        }
        Ok(found)
    }
}
