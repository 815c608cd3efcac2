//! Fuzzy title resolution against the user's catalog library.
//!
//! An exact normalized-title match wins outright. Otherwise every candidate is
//! scored by word coverage and the best candidate above [`MIN_COVERAGE`]
//! wins, which keeps a one-word title like "Iris" from matching
//! "The Wild Iris".

use marginalia_shared::{BookIdentity, LibraryBook};
use tracing::{debug, warn};

use crate::normalize::normalize_title;

/// A candidate must share strictly more than this fraction of words.
pub const MIN_COVERAGE: f64 = 0.75;

/// Fraction of the longer word list covered by query words found in the candidate.
///
/// Duplicates are kept on both sides; each query word counts once per
/// occurrence if it appears anywhere in the candidate.
pub fn coverage(query: &str, candidate: &str) -> f64 {
    let query_words: Vec<&str> = query.split_whitespace().collect();
    let candidate_words: Vec<&str> = candidate.split_whitespace().collect();

    let denominator = query_words.len().max(candidate_words.len());
    if denominator == 0 {
        return 0.0;
    }

    let matched = query_words
        .iter()
        .filter(|word| candidate_words.contains(word))
        .count();

    matched as f64 / denominator as f64
}

/// Best library entry for `title`, or `None` when nothing is confident enough.
pub fn find_best_match<'a>(title: &str, library: &'a [LibraryBook]) -> Option<&'a LibraryBook> {
    let query = normalize_title(title);
    if query.is_empty() {
        return None;
    }

    let normalized: Vec<String> = library.iter().map(|b| normalize_title(&b.title)).collect();

    if let Some(pos) = normalized.iter().position(|candidate| *candidate == query) {
        return Some(&library[pos]);
    }

    let mut best: Option<(&LibraryBook, f64)> = None;
    for (book, candidate) in library.iter().zip(&normalized) {
        let score = coverage(&query, candidate);
        if score <= MIN_COVERAGE {
            continue;
        }
        if best.is_none_or(|(_, top)| score > top) {
            best = Some((book, score));
        }
    }

    if let Some((book, score)) = best {
        debug!(title, matched = %book.title, score, "fuzzy title match");
    }
    best.map(|(book, _)| book)
}

/// Resolve `title` to a catalog identity using the book's first edition.
///
/// A matched book without any edition cannot be submitted against, so it
/// resolves to `None` as well.
pub fn resolve(title: &str, library: &[LibraryBook]) -> Option<BookIdentity> {
    let Some(book) = find_best_match(title, library) else {
        warn!(title, "no confident match in library");
        return None;
    };

    let Some(edition) = book.editions.first() else {
        warn!(title, book_id = book.id, "matched book has no editions");
        return None;
    };

    let identity = BookIdentity {
        book_id: book.id,
        edition_id: edition.id,
        isbn: edition.preferred_isbn(),
    };
    debug!(title, isbn = %identity.isbn, "resolved title");
    Some(identity)
}
