//! Merge freshly extracted annotations into the persisted record set.
//!
//! Persisted records keep every field they already have, including sync state
//! and any ISBN resolved by an earlier run. Only `exists_on_device` is
//! refreshed from the extraction. New ids are appended as pending records.

use std::collections::{HashMap, HashSet};

use marginalia_shared::{AnnotationRecord, RawAnnotation};
use serde::Serialize;
use tracing::warn;

/// Counts describing one merge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MergeSummary {
    /// Records read from the device.
    pub extracted: usize,
    /// Extracted ids not seen before.
    pub added: usize,
    /// Persisted records seen again on the device.
    pub retained: usize,
    /// Persisted records absent from this extraction.
    pub missing: usize,
    /// Total records after the merge.
    pub total: usize,
}

/// Merge `extracted` into `persisted`, returning the new canonical set.
///
/// The result is sorted newest first by creation time; ties keep insertion
/// order (persisted records, then new ones in extraction order). Duplicate
/// ids within `extracted` keep their first occurrence. Duplicate ids within
/// `persisted` keep the first synced copy, else the first one.
pub fn merge(
    extracted: Vec<RawAnnotation>,
    persisted: Vec<AnnotationRecord>,
) -> (Vec<AnnotationRecord>, MergeSummary) {
    let extracted_ids: HashSet<&str> = extracted.iter().map(|r| r.id.as_str()).collect();

    let mut summary = MergeSummary {
        extracted: extracted_ids.len(),
        ..MergeSummary::default()
    };

    let mut positions: HashMap<String, usize> = HashMap::with_capacity(persisted.len() + extracted.len());
    let mut merged: Vec<AnnotationRecord> = Vec::with_capacity(persisted.len() + extracted.len());

    for mut record in persisted {
        if let Some(&pos) = positions.get(&record.id) {
            let kept = &mut merged[pos];
            warn!(id = %record.id, kept_synced = kept.synced, dropped_synced = record.synced, "duplicate id in annotation store");
            if record.synced && !kept.synced {
                record.exists_on_device = kept.exists_on_device;
                *kept = record;
            }
            continue;
        }
        record.exists_on_device = extracted_ids.contains(record.id.as_str());
        if record.exists_on_device {
            summary.retained += 1;
        } else {
            summary.missing += 1;
        }
        positions.insert(record.id.clone(), merged.len());
        merged.push(record);
    }

    drop(extracted_ids);

    for raw in extracted {
        if !positions.contains_key(&raw.id) {
            summary.added += 1;
            positions.insert(raw.id.clone(), merged.len());
            merged.push(AnnotationRecord::from(raw));
        }
    }

    sort_newest_first(&mut merged);
    summary.total = merged.len();
    (merged, summary)
}

/// Stable sort by creation time, newest first. Unparseable times sort last.
pub fn sort_newest_first(records: &mut [AnnotationRecord]) {
    records.sort_by_cached_key(|r| std::cmp::Reverse(r.timestamp()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use marginalia_shared::NO_ISBN;

    fn raw(id: &str, time: &str) -> RawAnnotation {
        RawAnnotation {
            id: id.into(),
            title: format!("Book {id}"),
            isbn: Some(NO_ISBN.into()),
            time: time.into(),
            chapter: None,
            annotation_text: None,
            highlighted_text: Some(format!("text {id}")),
        }
    }

    fn persisted(id: &str, time: &str) -> AnnotationRecord {
        AnnotationRecord::from(raw(id, time))
    }

    fn assert_sorted(records: &[AnnotationRecord]) {
        for pair in records.windows(2) {
            assert!(pair[0].timestamp() >= pair[1].timestamp(), "{pair:?} out of order");
        }
    }

    #[test]
    fn exists_on_device_tracks_extraction() {
        let mut one = persisted("1", "2024-01-01T00:00:00.000");
        one.synced = true;
        let mut two = persisted("2", "2024-01-02T00:00:00.000");
        two.synced = true;
        two.deleted = true;
        two.isbn = Some("9780000000002".into());
        two.title = "Kept Title".into();

        let extracted = vec![raw("2", "2024-01-02T00:00:00.000"), raw("3", "2024-01-03T00:00:00.000")];
        let (merged, summary) = merge(extracted, vec![one, two]);

        assert_eq!(merged.len(), 3);
        let get = |id: &str| merged.iter().find(|r| r.id == id).expect("present");

        assert!(!get("1").exists_on_device);
        assert!(get("1").synced);

        let two = get("2");
        assert!(two.exists_on_device);
        assert!(two.synced);
        assert!(two.deleted);
        assert_eq!(two.isbn.as_deref(), Some("9780000000002"));
        assert_eq!(two.title, "Kept Title");

        let three = get("3");
        assert!(three.exists_on_device);
        assert!(!three.synced);
        assert!(!three.deleted);

        assert_eq!(
            summary,
            MergeSummary { extracted: 2, added: 1, retained: 1, missing: 1, total: 3 }
        );
        assert_eq!(merged.iter().map(|r| r.id.as_str()).collect::<Vec<_>>(), vec!["3", "2", "1"]);
    }

    #[test]
    fn merging_a_set_with_itself_is_idempotent() {
        let extracted = vec![
            raw("a", "2024-05-01T00:00:00.000"),
            raw("b", "2024-04-01T00:00:00.000"),
            raw("c", "2024-06-01T00:00:00.000"),
        ];
        let (first, _) = merge(extracted.clone(), Vec::new());
        let (second, summary) = merge(extracted, first.clone());

        assert_eq!(second.len(), first.len());
        let ids = |set: &[AnnotationRecord]| set.iter().map(|r| r.id.clone()).collect::<HashSet<_>>();
        assert_eq!(ids(&first), ids(&second));
        assert!(second.iter().all(|r| r.exists_on_device));
        assert_eq!(summary.added, 0);
    }

    #[test]
    fn result_is_newest_first_and_stable() {
        let persisted_set = vec![
            persisted("p1", "2024-01-01T00:00:00.000"),
            persisted("tie-a", "2024-03-01T00:00:00.000"),
        ];
        let extracted = vec![
            raw("tie-b", "2024-03-01T00:00:00.000"),
            raw("new", "2024-09-01T00:00:00.000"),
            raw("old", "2020-01-01 00:00:00"),
        ];
        let (merged, _) = merge(extracted, persisted_set);

        assert_sorted(&merged);
        let ids: Vec<&str> = merged.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["new", "tie-a", "tie-b", "p1", "old"]);
    }

    #[test]
    fn empty_extraction_marks_everything_off_device() {
        let (merged, summary) = merge(
            Vec::new(),
            vec![persisted("1", "2024-01-01"), persisted("2", "2024-01-02")],
        );
        assert_eq!(merged.len(), 2);
        assert!(merged.iter().all(|r| !r.exists_on_device));
        assert_eq!(summary.missing, 2);
    }

    #[test]
    fn empty_store_takes_all_extracted() {
        let (merged, summary) = merge(vec![raw("1", "2024-01-01")], Vec::new());
        assert_eq!(merged.len(), 1);
        assert!(merged[0].exists_on_device);
        assert!(!merged[0].synced);
        assert_eq!(summary.added, 1);
    }

    #[test]
    fn duplicate_ids_keep_first_occurrence() {
        let mut first = raw("dup", "2024-01-01");
        first.title = "First".into();
        let mut second = raw("dup", "2024-01-01");
        second.title = "Second".into();

        let (merged, summary) = merge(vec![first, second], Vec::new());
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].title, "First");
        assert_eq!(summary.extracted, 1);
    }

    #[test]
    fn duplicate_persisted_ids_keep_the_synced_copy() {
        let pending_copy = persisted("dup", "2024-01-01");
        let mut synced_copy = persisted("dup", "2024-01-01");
        synced_copy.synced = true;
        synced_copy.isbn = Some("9780000000001".into());

        let (merged, summary) = merge(vec![raw("dup", "2024-01-01")], vec![pending_copy, synced_copy]);

        assert_eq!(merged.len(), 1);
        assert!(merged[0].synced);
        assert!(merged[0].exists_on_device);
        assert_eq!(merged[0].isbn.as_deref(), Some("9780000000001"));
        assert_eq!(summary, MergeSummary { extracted: 1, added: 0, retained: 1, missing: 0, total: 1 });
    }

    #[test]
    fn unparseable_times_sort_last() {
        let (merged, _) = merge(
            vec![raw("bad", "not a date"), raw("good", "2021-01-01")],
            Vec::new(),
        );
        assert_eq!(merged[0].id, "good");
        assert_eq!(merged[1].id, "bad");
    }
}
