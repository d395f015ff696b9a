use std::sync::RwLock;

use tracing::trace;

use crate::{
    AutoflowError, Result,
    store::{DbCollection, PageData, db::mem::DbDocument, query::Query},
};

/// Insertion-ordered in-memory collection.
#[derive(Debug)]
pub struct Collect<T> {
    name: String,
    rows: RwLock<Vec<T>>,
}

impl<T> Collect<T>
where
    T: DbDocument + Clone,
{
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            rows: RwLock::new(Vec::new()),
        }
    }

    fn poisoned(&self) -> AutoflowError {
        AutoflowError::Store(format!("collection {} lock poisoned", self.name))
    }
}

impl<T> DbCollection for Collect<T>
where
    T: DbDocument + Clone + Send + Sync,
{
    type Item = T;

    fn exists(
        &self,
        id: &str,
    ) -> Result<bool> {
        let rows = self.rows.read().map_err(|_| self.poisoned())?;
        Ok(rows.iter().any(|r| r.id() == id))
    }

    fn find(
        &self,
        id: &str,
    ) -> Result<Self::Item> {
        let rows = self.rows.read().map_err(|_| self.poisoned())?;
        rows.iter().find(|r| r.id() == id).cloned().ok_or_else(|| AutoflowError::NotFound(format!("{}/{}", self.name, id)))
    }

    fn query(
        &self,
        q: &Query,
    ) -> Result<PageData<Self::Item>> {
        trace!("{}::query({:?})", self.name, q);
        let rows = self.rows.read().map_err(|_| self.poisoned())?;

        let mut matched = Vec::new();
        for row in rows.iter() {
            let doc = row.doc()?;
            if q.is_match(&doc) {
                matched.push((doc, row));
            }
        }
        if !q.order_by().is_empty() {
            matched.sort_by(|(a, _), (b, _)| q.compare(a, b));
        }

        let count = matched.len();
        let page = matched.into_iter().skip(q.offset()).take(q.limit()).map(|(_, row)| row.clone()).collect();
        Ok(PageData::new(q, count, page))
    }

    fn create(
        &self,
        data: &Self::Item,
    ) -> Result<bool> {
        let mut rows = self.rows.write().map_err(|_| self.poisoned())?;
        if rows.iter().any(|r| r.id() == data.id()) {
            return Err(AutoflowError::Store(format!("{}/{} already exists", self.name, data.id())));
        }
        rows.push(data.clone());
        Ok(true)
    }

    fn update(
        &self,
        data: &Self::Item,
    ) -> Result<bool> {
        let mut rows = self.rows.write().map_err(|_| self.poisoned())?;
        match rows.iter_mut().find(|r| r.id() == data.id()) {
            Some(row) => {
                *row = data.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn delete(
        &self,
        id: &str,
    ) -> Result<bool> {
        let mut rows = self.rows.write().map_err(|_| self.poisoned())?;
        let before = rows.len();
        rows.retain(|r| r.id() != id);
        Ok(rows.len() < before)
    }
}
