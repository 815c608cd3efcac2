//! Domain logic for Marginalia.
//!
//! Ties the Kobo extraction source, the flat JSON store, and the Hardcover
//! catalog together: normalize and resolve titles, merge extractions into the
//! store, and sync pending records as journal entries.

pub mod merge;
pub mod normalize;
pub mod pipeline;
pub mod resolver;
pub mod store;
pub mod sync;

pub use merge::{MergeSummary, merge};
pub use normalize::normalize_title;
pub use pipeline::{
    ReadResult, SendResult, StoreStatus, read_annotations, send_annotations, set_deleted,
    store_status,
};
pub use store::{LoadedStore, StoreState};
pub use sync::{
    Catalog, RecordOutcome, Resolution, ResolutionCache, SilentSync, SyncProgress, SyncReport,
    sync_all,
};
