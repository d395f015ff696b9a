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
pub struct WorkflowCollection {
    conn: DbConnection,
}

#[derive(Iden, Clone, Copy)]
#[iden = "workflows"]
enum CollectionIden {
    Table,

    Id,
    Name,
    Desc,
    Owner,
    Status,
    TriggerType,
    Tags,
    Data,
    RunCount,
    SuccessCount,
    LastRun,
    CreateTime,
    UpdateTime,
}

const COLUMNS: [CollectionIden; 13] = [
    CollectionIden::Id,
    CollectionIden::Name,
    CollectionIden::Desc,
    CollectionIden::Owner,
    CollectionIden::Status,
    CollectionIden::TriggerType,
    CollectionIden::Tags,
    CollectionIden::Data,
    CollectionIden::RunCount,
    CollectionIden::SuccessCount,
    CollectionIden::LastRun,
    CollectionIden::CreateTime,
    CollectionIden::UpdateTime,
];

impl DbCollection for WorkflowCollection {
    type Item = data::Workflow;

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
        self.conn.query_one(&sql, values).and_then(|row| Self::Item::from_row(&row)).map_err(map_find_err("workflows", id))
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
                data.name.into(),
                data.desc.into(),
                data.owner.into(),
                data.status.into(),
                data.trigger_type.into(),
                data.tags.into(),
                data.data.into(),
                data.run_count.into(),
                data.success_count.into(),
                data.last_run.into(),
                data.create_time.into(),
                data.update_time.into(),
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
                (CollectionIden::Name, model.name.into()),
                (CollectionIden::Desc, model.desc.into()),
                (CollectionIden::Owner, model.owner.into()),
                (CollectionIden::Status, model.status.into()),
                (CollectionIden::TriggerType, model.trigger_type.into()),
                (CollectionIden::Tags, model.tags.into()),
                (CollectionIden::Data, model.data.into()),
                (CollectionIden::RunCount, model.run_count.into()),
                (CollectionIden::SuccessCount, model.success_count.into()),
                (CollectionIden::LastRun, model.last_run.into()),
                (CollectionIden::CreateTime, model.create_time.into()),
                (CollectionIden::UpdateTime, model.update_time.into()),
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

impl DbRow for data::Workflow {
    fn id(&self) -> &str {
        &self.id
    }

    fn from_row(row: &PgRow) -> std::result::Result<Self, DbError>
    where
        Self: Sized,
    {
        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            desc: row.try_get("desc")?,
            owner: row.try_get("owner")?,
            status: row.try_get("status")?,
            trigger_type: row.try_get("trigger_type")?,
            tags: row.try_get("tags")?,
            data: row.try_get("data")?,
            run_count: row.try_get("run_count")?,
            success_count: row.try_get("success_count")?,
            last_run: row.try_get("last_run")?,
            create_time: row.try_get("create_time")?,
            update_time: row.try_get("update_time")?,
        })
    }
}

impl DbInit for WorkflowCollection {
    fn init(&self) -> Result<()> {
        let sql = [
            Table::create()
                .table(CollectionIden::Table)
                .if_not_exists()
                .col(ColumnDef::new(CollectionIden::Id).string().not_null().primary_key())
                .col(ColumnDef::new(CollectionIden::Name).string().not_null().default(""))
                .col(ColumnDef::new(CollectionIden::Desc).text().not_null().default(""))
                .col(ColumnDef::new(CollectionIden::Owner).string().not_null().default(""))
                .col(ColumnDef::new(CollectionIden::Status).string().not_null())
                .col(ColumnDef::new(CollectionIden::TriggerType).string().not_null())
                .col(ColumnDef::new(CollectionIden::Tags).text().not_null().default(""))
                .col(ColumnDef::new(CollectionIden::Data).text().not_null())
                .col(ColumnDef::new(CollectionIden::RunCount).big_integer().not_null().default(0))
                .col(ColumnDef::new(CollectionIden::SuccessCount).big_integer().not_null().default(0))
                .col(ColumnDef::new(CollectionIden::LastRun).big_integer().not_null().default(0))
                .col(ColumnDef::new(CollectionIden::CreateTime).big_integer().not_null().default(0))
                .col(ColumnDef::new(CollectionIden::UpdateTime).big_integer().not_null().default(0))
                .build(PostgresQueryBuilder),
            Index::create().name("idx_workflows_owner").if_not_exists().table(CollectionIden::Table).col(CollectionIden::Owner).build(PostgresQueryBuilder),
            Index::create().name("idx_workflows_status").if_not_exists().table(CollectionIden::Table).col(CollectionIden::Status).build(PostgresQueryBuilder),
        ];

        self.conn.batch_execute(&sql).map_err(map_db_err)
    }
}

impl WorkflowCollection {
    pub fn new(conn: &DbConnection) -> Self {
        Self {
            conn: conn.clone(),
        }
    }
}
