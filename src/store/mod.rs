//! Storage layer for persisting workflows, executions, step results, events,
//! logs and the records produced by actions.
//!
//! Provides an abstraction over different storage backends:
//! - `MemStore`: In-memory storage for testing
//! - `PostgresStore`: PostgreSQL for production persistence

pub mod data;
mod db;
pub mod query;
mod store;

use serde::{Deserialize, Serialize};
use strum::AsRefStr;

use crate::Result;

use query::*;

pub use db::{MemStore, PostgresStore};
pub use store::Store;

/// Identifiers for different storage collections.
#[derive(Debug, Clone, AsRefStr, PartialEq, Hash, Eq)]
pub enum StoreIden {
    /// Workflow definitions with status and counters.
    #[strum(serialize = "workflows")]
    Workflows,
    /// Workflow executions.
    #[strum(serialize = "executions")]
    Executions,
    /// Step results of executions.
    #[strum(serialize = "steps")]
    Steps,
    /// Execution events.
    #[strum(serialize = "events")]
    Events,
    /// Log entries.
    #[strum(serialize = "logs")]
    Logs,
    /// Documents written by actions (tasks, reports, ...).
    #[strum(serialize = "records")]
    Records,
}

/// Paginated query result.
#[derive(Debug, Deserialize, Serialize)]
pub struct PageData<T> {
    /// Total number of matching records.
    pub count: usize,
    /// Current page number (1-based).
    pub page_num: usize,
    /// Total number of pages.
    pub page_count: usize,
    /// Number of records per page.
    pub page_size: usize,
    /// Records in the current page.
    pub rows: Vec<T>,
}

impl<T> PageData<T> {
    pub(crate) fn new(
        q: &Query,
        count: usize,
        rows: Vec<T>,
    ) -> Self {
        Self {
            count,
            page_num: q.offset() / q.limit() + 1,
            page_count: count.div_ceil(q.limit()),
            page_size: q.limit(),
            rows,
        }
    }

    /// Converts every row, failing on the first row that does not convert.
    pub(crate) fn try_map<U>(
        self,
        f: impl FnMut(T) -> Result<U>,
    ) -> Result<PageData<U>> {
        Ok(PageData {
            count: self.count,
            page_num: self.page_num,
            page_count: self.page_count,
            page_size: self.page_size,
            rows: self.rows.into_iter().map(f).collect::<Result<Vec<_>>>()?,
        })
    }
}

/// Trait for types that can identify their storage collection.
pub trait DbCollectionIden {
    /// Returns the collection identifier for this type.
    fn iden() -> StoreIden;
}

/// Trait for database collection operations.
pub trait DbCollection: Send + Sync {
    /// The type of items stored in this collection.
    type Item;

    /// Checks if a record with the given ID exists.
    fn exists(
        &self,
        id: &str,
    ) -> Result<bool>;

    /// Finds a record by ID.
    fn find(
        &self,
        id: &str,
    ) -> Result<Self::Item>;

    /// Queries records with pagination and filtering.
    fn query(
        &self,
        query: &Query,
    ) -> Result<PageData<Self::Item>>;

    /// Creates a new record.
    fn create(
        &self,
        data: &Self::Item,
    ) -> Result<bool>;

    /// Updates an existing record.
    fn update(
        &self,
        data: &Self::Item,
    ) -> Result<bool>;

    /// Deletes a record by ID.
    fn delete(
        &self,
        id: &str,
    ) -> Result<bool>;
}

/// Trait for database store initialization.
pub trait DbStore {
    /// Initializes the database and registers collections with the store.
    fn init(
        &self,
        s: &Store,
    ) -> Result<()>;
}
