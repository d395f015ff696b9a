use sea_query::{ColumnDef, Expr as SeaExpr, Func as SeaFunc, Iden, Index, PostgresQueryBuilder, Query as SeaQuery, Table};
use sea_query_binder::SqlxBinder;
use sqlx::{Error as DbError, Row, postgres::PgRow};
use tokio::runtime::Runtime;

use crate::{
    Result,
    store::{
        DbCollection, PageData, data,
        db::postgres::{DbInit, DbRow},
        query,
    },
};

use super::{BatchWriter, DbConnection, fetch_page, map_db_err, map_find_err};

#[derive(Debug)]
pub struct LogCollection {
    conn: DbConnection,

    batch: BatchWriter<data::Log>,
}

#[derive(Iden, Clone, Copy)]
#[iden = "logs"]
enum CollectionIden {
    Table,

    Id,
    Eid,
    Aid,
    Content,
    Timestamp,
}

const COLUMNS: [CollectionIden; 5] = [CollectionIden::Id, CollectionIden::Eid, CollectionIden::Aid, CollectionIden::Content, CollectionIden::Timestamp];

impl DbCollection for LogCollection {
    type Item = data::Log;

    fn exists(
        &self,
        id: &str,
    ) -> Result<bool> {
        let (sql, values) = SeaQuery::select()
            .from(CollectionIden::Table)
            .expr(SeaFunc::count(SeaExpr::col(CollectionIden::Id)))
            .and_where(SeaExpr::col(CollectionIden::Id).eq(id))
            .build_sqlx(PostgresQueryBuilder);

        let count = self.conn.query_one(sql.as_str(), values).and_then(|row| row.try_get::<i64, usize>(0)).map_err(map_db_err)?;

        Ok(count > 0)
    }

    fn find(
        &self,
        id: &str,
    ) -> Result<Self::Item> {
        let (sql, values) = SeaQuery::select().from(CollectionIden::Table).columns(COLUMNS).and_where(SeaExpr::col(CollectionIden::Id).eq(id)).build_sqlx(PostgresQueryBuilder);
        self.conn.query_one(&sql, values).and_then(|row| Self::Item::from_row(&row)).map_err(map_find_err("logs", id))
    }

    fn query(
        &self,
        q: &query::Query,
    ) -> Result<PageData<Self::Item>> {
        let mut count = SeaQuery::select();
        count.from(CollectionIden::Table).expr(SeaFunc::count(SeaExpr::col(CollectionIden::Id)));

        let mut select = SeaQuery::select();
        select.columns(COLUMNS).from(CollectionIden::Table);

        fetch_page(&self.conn, q, select, count)
    }

    fn create(
        &self,
        data: &Self::Item,
    ) -> Result<bool> {
        self.batch.push(data.clone())?;
        Ok(true)
    }

    fn update(
        &self,
        data: &Self::Item,
    ) -> Result<bool> {
        let model = data.clone();
        let (sql, sql_values) = SeaQuery::update()
            .table(CollectionIden::Table)
            .values([
                (CollectionIden::Eid, model.eid.into()),
                (CollectionIden::Aid, model.aid.into()),
                (CollectionIden::Content, model.content.into()),
                (CollectionIden::Timestamp, model.timestamp.into()),
            ])
            .and_where(SeaExpr::col(CollectionIden::Id).eq(data.id()))
            .build_sqlx(PostgresQueryBuilder);

        let result = self.conn.execute(sql.as_str(), sql_values).map_err(map_db_err)?;
        Ok(result.rows_affected() > 0)
    }

    fn delete(
        &self,
        id: &str,
    ) -> Result<bool> {
        let (sql, values) =
            SeaQuery::delete().from_table(CollectionIden::Table).and_where(SeaExpr::col(CollectionIden::Id).eq(id)).build_sqlx(PostgresQueryBuilder);

        let result = self.conn.execute(sql.as_str(), values).map_err(map_db_err)?;
        Ok(result.rows_affected() > 0)
    }
}

impl DbRow for data::Log {
    fn id(&self) -> &str {
        &self.id
    }

    fn from_row(row: &PgRow) -> std::result::Result<Self, DbError>
    where
        Self: Sized,
    {
        Ok(Self {
            id: row.try_get("id")?,
            eid: row.try_get("eid")?,
            aid: row.try_get("aid")?,
            content: row.try_get("content")?,
            timestamp: row.try_get("timestamp")?,
        })
    }
}

impl DbInit for LogCollection {
    fn init(&self) -> Result<()> {
        let sql = [
            Table::create()
                .table(CollectionIden::Table)
                .if_not_exists()
                .col(ColumnDef::new(CollectionIden::Id).string().not_null().primary_key())
                .col(ColumnDef::new(CollectionIden::Eid).string().not_null())
                .col(ColumnDef::new(CollectionIden::Aid).string().not_null())
                .col(ColumnDef::new(CollectionIden::Content).text().not_null().default(""))
                .col(ColumnDef::new(CollectionIden::Timestamp).big_integer().not_null().default(0))
                .build(PostgresQueryBuilder),
            Index::create().name("idx_logs_eid").if_not_exists().table(CollectionIden::Table).col(CollectionIden::Eid).build(PostgresQueryBuilder),
            Index::create().name("idx_logs_aid").if_not_exists().table(CollectionIden::Table).col(CollectionIden::Aid).build(PostgresQueryBuilder),
        ];
        self.conn.batch_execute(&sql).map_err(map_db_err)
    }
}

impl LogCollection {
    pub fn new(
        conn: &DbConnection,
        runtime: &Runtime,
    ) -> Self {
        Self {
            conn: conn.clone(),
            batch: BatchWriter::spawn("logs", conn.clone(), runtime, Self::insert_batch),
        }
    }

    fn insert_batch(
        conn: &DbConnection,
        items: Vec<data::Log>,
    ) -> Result<()> {
        let mut binding = SeaQuery::insert();
        let stmt = binding.into_table(CollectionIden::Table).columns(COLUMNS);
        for item in items {
            stmt.values([item.id.into(), item.eid.into(), item.aid.into(), item.content.into(), item.timestamp.into()]).map_err(map_db_err)?;
        }

        let (sql, values) = stmt.build_sqlx(PostgresQueryBuilder);
        conn.execute(sql.as_str(), values).map_err(map_db_err)?;
        Ok(())
    }
}
