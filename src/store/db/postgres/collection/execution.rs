use sea_query::{ColumnDef, Expr as SeaExpr, Func as SeaFunc, Iden, Index, PostgresQueryBuilder, Query as SeaQuery, Table};
use sea_query_binder::SqlxBinder;
use sqlx::{Error as DbError, Row, postgres::PgRow};

use crate::{
    Result,
    store::{
        DbCollection, PageData, data,
        db::postgres::{DbInit, DbRow},
        query,
    },
};

use super::{DbConnection, fetch_page, map_db_err, map_find_err};

#[derive(Debug)]
pub struct ExecutionCollection {
    conn: DbConnection,
}

#[derive(Iden, Clone, Copy)]
#[iden = "executions"]
enum CollectionIden {
    Table,

    Id,
    Wid,
    Status,
    CurrentStep,
    Data,
    Err,
    StartTime,
    EndTime,
    Timestamp,
}

const COLUMNS: [CollectionIden; 9] = [
    CollectionIden::Id,
    CollectionIden::Wid,
    CollectionIden::Status,
    CollectionIden::CurrentStep,
    CollectionIden::Data,
    CollectionIden::Err,
    CollectionIden::StartTime,
    CollectionIden::EndTime,
    CollectionIden::Timestamp,
];

impl DbCollection for ExecutionCollection {
    type Item = data::Execution;

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
        self.conn.query_one(&sql, values).and_then(|row| Self::Item::from_row(&row)).map_err(map_find_err("executions", id))
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
        let data = data.clone();
        let (sql, sql_values) = SeaQuery::insert()
            .into_table(CollectionIden::Table)
            .columns(COLUMNS)
            .values([
                data.id.into(),
                data.wid.into(),
                data.status.into(),
                data.current_step.into(),
                data.data.into(),
                data.err.into(),
                data.start_time.into(),
                data.end_time.into(),
                data.timestamp.into(),
            ])
            .map_err(map_db_err)?
            .build_sqlx(PostgresQueryBuilder);

        let result = self.conn.execute(sql.as_str(), sql_values).map_err(map_db_err)?;
        Ok(result.rows_affected() > 0)
    }

    fn update(
        &self,
        data: &Self::Item,
    ) -> Result<bool> {
        let model = data.clone();
        let (sql, sql_values) = SeaQuery::update()
            .table(CollectionIden::Table)
            .values([
                (CollectionIden::Wid, model.wid.into()),
                (CollectionIden::Status, model.status.into()),
                (CollectionIden::CurrentStep, model.current_step.into()),
                (CollectionIden::Data, model.data.into()),
                (CollectionIden::Err, model.err.into()),
                (CollectionIden::StartTime, model.start_time.into()),
                (CollectionIden::EndTime, model.end_time.into()),
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

impl DbRow for data::Execution {
    fn id(&self) -> &str {
        &self.id
    }

    fn from_row(row: &PgRow) -> std::result::Result<Self, DbError>
    where
        Self: Sized,
    {
        Ok(Self {
            id: row.try_get("id")?,
            wid: row.try_get("wid")?,
            status: row.try_get("status")?,
            current_step: row.try_get("current_step")?,
            data: row.try_get("data")?,
            err: row.try_get("err")?,
            start_time: row.try_get("start_time")?,
            end_time: row.try_get("end_time")?,
            timestamp: row.try_get("timestamp")?,
        })
    }
}

impl DbInit for ExecutionCollection {
    fn init(&self) -> Result<()> {
        let sql = [
            Table::create()
                .table(CollectionIden::Table)
                .if_not_exists()
                .col(ColumnDef::new(CollectionIden::Id).string().not_null().primary_key())
                .col(ColumnDef::new(CollectionIden::Wid).string().not_null())
                .col(ColumnDef::new(CollectionIden::Status).string().not_null())
                .col(ColumnDef::new(CollectionIden::CurrentStep).string().not_null().default(""))
                .col(ColumnDef::new(CollectionIden::Data).text().not_null().default("{}"))
                .col(ColumnDef::new(CollectionIden::Err).text().null())
                .col(ColumnDef::new(CollectionIden::StartTime).big_integer().not_null().default(0))
                .col(ColumnDef::new(CollectionIden::EndTime).big_integer().not_null().default(0))
                .col(ColumnDef::new(CollectionIden::Timestamp).big_integer().not_null().default(0))
                .build(PostgresQueryBuilder),
            Index::create().name("idx_executions_wid").if_not_exists().table(CollectionIden::Table).col(CollectionIden::Wid).build(PostgresQueryBuilder),
            Index::create().name("idx_executions_status").if_not_exists().table(CollectionIden::Table).col(CollectionIden::Status).build(PostgresQueryBuilder),
        ];

        self.conn.batch_execute(&sql).map_err(map_db_err)
    }
}

impl ExecutionCollection {
    pub fn new(conn: &DbConnection) -> Self {
        Self {
            conn: conn.clone(),
        }
    }
}
