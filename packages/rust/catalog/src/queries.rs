//! GraphQL documents and response shapes for the Hardcover API.

use serde::Deserialize;

use marginalia_shared::{BookIdentity, LibraryBook};

/// The signed-in user's library: books with every edition's ISBNs.
pub(crate) const LIBRARY_QUERY: &str = r#"
query getMyLibrary {
  me {
    user_books {
      book {
        id
        title
        editions {
          id
          isbn_10
          isbn_13
        }
      }
    }
  }
}"#;

/// Books having an edition with the given ISBN-10 or ISBN-13.
pub(crate) const FIND_BY_ISBN_QUERY: &str = r#"
query findById($isbn: String!) {
  books(where: {editions: {_or: [{isbn_10: {_eq: $isbn}}, {isbn_13: {_eq: $isbn}}]}}) {
    id
    editions(where: {_or: [{isbn_10: {_eq: $isbn}}, {isbn_13: {_eq: $isbn}}]}) {
      id
    }
  }
}"#;

/// Create a public reading journal entry tagged as a quote.
pub(crate) const INSERT_JOURNAL_MUTATION: &str = r#"
mutation postquote($bookId: Int!, $editionId: Int!, $entry: String!, $event: String!) {
  insert_reading_journal(object: {
    privacy_setting_id: 1,
    book_id: $bookId,
    edition_id: $editionId,
    event: $event,
    tags: {spoiler: false, category: "quote", tag: ""},
    entry: $entry
  }) {
    id
  }
}"#;

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// Standard GraphQL response envelope.
#[derive(Debug, Deserialize)]
pub(crate) struct GraphQlResponse<T> {
    pub data: Option<T>,
    /// Absent and `null` both mean no errors.
    #[serde(default)]
    pub errors: Option<Vec<GraphQlError>>,
}

/// One entry of a GraphQL `errors` list.
#[derive(Debug, Deserialize)]
pub(crate) struct GraphQlError {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub extensions: Option<serde_json::Value>,
}

impl GraphQlError {
    /// Message plus extension detail, for logging.
    pub fn describe(&self) -> String {
        match &self.extensions {
            Some(ext) => format!("{} ({ext})", self.message),
            None => self.message.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Library listing
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub(crate) struct LibraryData {
    #[serde(default)]
    me: Vec<Me>,
}

#[derive(Debug, Deserialize)]
struct Me {
    #[serde(default)]
    user_books: Vec<UserBook>,
}

#[derive(Debug, Deserialize)]
struct UserBook {
    book: Option<LibraryBook>,
}

impl LibraryData {
    /// Flatten the first user's shelf into a book list.
    pub fn into_books(self) -> Vec<LibraryBook> {
        self.me
            .into_iter()
            .next()
            .map(|me| me.user_books.into_iter().filter_map(|ub| ub.book).collect())
            .unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// ISBN lookup
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub(crate) struct BooksByIsbnData {
    #[serde(default)]
    books: Vec<IdOnlyBook>,
}

#[derive(Debug, Deserialize)]
struct IdOnlyBook {
    id: i64,
    #[serde(default)]
    editions: Vec<IdOnly>,
}

#[derive(Debug, Deserialize)]
struct IdOnly {
    id: i64,
}

impl BooksByIsbnData {
    /// First matching book and its first matching edition.
    pub fn into_identity(self, isbn: &str) -> Option<BookIdentity> {
        let book = self.books.into_iter().next()?;
        let edition = book.editions.into_iter().next()?;
        Some(BookIdentity {
            book_id: book.id,
            edition_id: edition.id,
            isbn: isbn.to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// Journal insert
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub(crate) struct InsertJournalData {
    insert_reading_journal: Option<InsertedRow>,
}

#[derive(Debug, Deserialize)]
struct InsertedRow {
    id: Option<i64>,
}

impl InsertJournalData {
    pub fn entry_id(&self) -> Option<i64> {
        self.insert_reading_journal.as_ref().and_then(|row| row.id)
    }
}
