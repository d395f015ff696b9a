mod event;
mod execution;
mod log;
mod record;
mod step;
mod workflow;

use std::{error::Error, sync::Arc, time::Duration};

use sea_query::{Alias as SeaAlias, Condition, Expr as SeaExpr, Order as SeaOrder, PostgresQueryBuilder, SelectStatement, Value as SeaValue};
use sea_query_binder::SqlxBinder;
use serde_json::Value as JsonValue;
use sqlx::{Error as DbError, Row};
use tokio::{runtime::Runtime, time::MissedTickBehavior};
use tracing::error;

use crate::{
    AutoflowError, Result,
    store::{
        PageData,
        db::postgres::{DbRow, synclient::SynClient},
        query::Query,
    },
};

pub use event::EventCollection;
pub use execution::ExecutionCollection;
pub use log::LogCollection;
pub use record::RecordCollection;
pub use step::StepCollection;
pub use workflow::WorkflowCollection;

pub type DbConnection = Arc<SynClient>;

pub fn map_db_err(err: impl Error) -> AutoflowError {
    AutoflowError::Store(err.to_string())
}

/// Like [`map_db_err`], reporting a missing row as [`AutoflowError::NotFound`].
pub fn map_find_err(
    table: &str,
    id: &str,
) -> impl FnOnce(DbError) -> AutoflowError {
    let key = format!("{}/{}", table, id);
    move |err| match err {
        DbError::RowNotFound => AutoflowError::NotFound(key),
        err => map_db_err(err),
    }
}

fn into_value(value: &JsonValue) -> SeaValue {
    match value {
        JsonValue::String(s) => s.clone().into(),
        JsonValue::Bool(b) => (*b).into(),
        JsonValue::Number(n) => match n.as_i64() {
            Some(i) => i.into(),
            None => n.as_f64().unwrap_or_default().into(),
        },
        other => other.to_string().into(),
    }
}

/// Equality filters of `q` as one AND condition.
pub fn into_query(q: &Query) -> Condition {
    q.filters().iter().fold(Condition::all(), |cond, (key, value)| cond.add(SeaExpr::col(SeaAlias::new(key.as_str())).eq(into_value(value))))
}

/// Runs `select` and `count` under the filters, ordering and paging of `q`.
pub fn fetch_page<T: DbRow>(
    conn: &DbConnection,
    q: &Query,
    mut select: SelectStatement,
    mut count: SelectStatement,
) -> Result<PageData<T>> {
    let filter = into_query(q);
    if !filter.is_empty() {
        count.cond_where(filter.clone());
        select.cond_where(filter);
    }
    for (order, rev) in q.order_by().iter() {
        select.order_by(SeaAlias::new(order.as_str()), if *rev { SeaOrder::Desc } else { SeaOrder::Asc });
    }
    let (sql, values) = select.limit(q.limit() as u64).offset(q.offset() as u64).build_sqlx(PostgresQueryBuilder);
    let (count_sql, count_values) = count.build_sqlx(PostgresQueryBuilder);

    let total = conn.query_one(count_sql.as_str(), count_values).map_err(map_db_err)?.try_get::<i64, usize>(0).map_err(map_db_err)?;
    let rows = conn.query(&sql, values).map_err(map_db_err)?.iter().map(T::from_row).collect::<std::result::Result<Vec<_>, _>>().map_err(map_db_err)?;
    Ok(PageData::new(q, total as usize, rows))
}

/// Buffers inserts of append-only rows and writes them in batches.
#[derive(Debug, Clone)]
pub struct BatchWriter<T> {
    tx: flume::Sender<T>,
}

impl<T: Send + 'static> BatchWriter<T> {
    /// Batch size for inserting records
    const BATCH_SIZE: usize = 1000;
    /// Timeout for flushing the batch
    const TIMEOUT: Duration = Duration::from_secs(1);

    pub fn spawn(
        name: &'static str,
        conn: DbConnection,
        runtime: &Runtime,
        flush: fn(&DbConnection, Vec<T>) -> Result<()>,
    ) -> Self {
        let (tx, rx) = flume::bounded::<T>(1024);
        runtime.spawn(async move {
            let mut batch = Vec::with_capacity(Self::BATCH_SIZE);
            let mut interval = tokio::time::interval(Self::TIMEOUT);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        if !batch.is_empty() {
                            Self::write(name, &conn, std::mem::take(&mut batch), flush);
                        }
                    }
                    item = rx.recv_async() => match item {
                        Ok(item) => {
                            batch.push(item);
                            if batch.len() >= Self::BATCH_SIZE {
                                Self::write(name, &conn, std::mem::take(&mut batch), flush);
                            }
                        }
                        Err(_) => {
                            if !batch.is_empty() {
                                Self::write(name, &conn, std::mem::take(&mut batch), flush);
                            }
                            break;
                        }
                    }
                }
            }
        });
        Self {
            tx,
        }
    }

    pub fn push(
        &self,
        item: T,
    ) -> Result<()> {
        self.tx.try_send(item).map_err(|e| AutoflowError::Store(e.to_string()))
    }

    fn write(
        name: &str,
        conn: &DbConnection,
        items: Vec<T>,
        flush: fn(&DbConnection, Vec<T>) -> Result<()>,
    ) {
        let size = items.len();
        if let Err(e) = flush(conn, items) {
            error!("failed to insert {} {} records: {}", size, name, e);
        }
    }
}
