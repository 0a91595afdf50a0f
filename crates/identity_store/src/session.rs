use async_trait::async_trait;
use sea_orm::sea_query::{
    Alias, Expr, ExprTrait, MysqlQueryBuilder, PostgresQueryBuilder, Query, QueryStatementWriter,
    SelectStatement, SqliteQueryBuilder, Value as SeaValue,
};
use sea_orm::{ConnectionTrait, DatabaseBackend, QueryResult, Statement};

use aideon_identity_core::{
    ColumnKind, IdentityError, IdentityResult, RelationalSession, Row, RowShape, Timestamp, Value,
};

/// Write-through session over a sea-orm connection or transaction.
pub struct SeaOrmSession<'a, C> {
    conn: &'a C,
}

impl<'a, C> SeaOrmSession<'a, C>
where
    C: ConnectionTrait + Send + Sync,
{
    pub fn new(conn: &'a C) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl<C> RelationalSession for SeaOrmSession<'_, C>
where
    C: ConnectionTrait + Send + Sync,
{
    async fn find(&self, shape: &RowShape, identifier: &Value) -> IdentityResult<Option<Row>> {
        let mut select = select_all(shape);
        select.and_where(
            Expr::col(ident(&shape.identifier)).eq(identifier_value(shape, identifier)?),
        );
        let row = query_one(self.conn, &select).await?;
        row.map(|row| decode_row(shape, &row)).transpose()
    }

    async fn insert(&self, shape: &RowShape, row: &Row) -> IdentityResult<()> {
        let mut columns = Vec::new();
        let mut values = Vec::new();
        for column in &shape.columns {
            if let Some(value) = row.values.get(&column.name) {
                columns.push(ident(&column.name));
                values.push(to_sea_value(&column.kind, &column.name, value)?);
            }
        }
        let insert = Query::insert()
            .into_table(ident(&shape.row_type))
            .columns(columns)
            .values_panic(values.into_iter().map(Into::into))
            .to_owned();
        exec(self.conn, &insert).await?;
        Ok(())
    }

    async fn merge(&self, shape: &RowShape, row: &Row) -> IdentityResult<()> {
        let identifier = identifier_value(shape, row.identifier(shape))?;
        let mut assignments = Vec::new();
        for column in &shape.columns {
            if column.name == shape.identifier {
                continue;
            }
            if let Some(value) = row.values.get(&column.name) {
                let value = to_sea_value(&column.kind, &column.name, value)?;
                assignments.push((ident(&column.name), value.into()));
            }
        }
        if !assignments.is_empty() {
            let update = Query::update()
                .table(ident(&shape.row_type))
                .values(assignments)
                .and_where(Expr::col(ident(&shape.identifier)).eq(identifier))
                .to_owned();
            if exec(self.conn, &update).await? > 0 {
                return Ok(());
            }
        }
        if self.find(shape, row.identifier(shape)).await?.is_none() {
            self.insert(shape, row).await?;
        }
        Ok(())
    }

    async fn remove(&self, shape: &RowShape, row: &Row) -> IdentityResult<()> {
        let delete = Query::delete()
            .from_table(ident(&shape.row_type))
            .and_where(
                Expr::col(ident(&shape.identifier))
                    .eq(identifier_value(shape, row.identifier(shape))?),
            )
            .to_owned();
        exec(self.conn, &delete).await?;
        Ok(())
    }

    async fn execute(
        &self,
        shape: &RowShape,
        select: &SelectStatement,
    ) -> IdentityResult<Vec<Row>> {
        let rows = query_all(self.conn, select).await?;
        rows.iter().map(|row| decode_row(shape, row)).collect()
    }

    async fn flush(&self) -> IdentityResult<()> {
        Ok(())
    }
}

pub(crate) fn ident(name: &str) -> Alias {
    Alias::new(name.to_string())
}

/// Selects every column of `shape` from its table.
pub(crate) fn select_all(shape: &RowShape) -> SelectStatement {
    Query::select()
        .columns(shape.columns.iter().map(|column| ident(&column.name)))
        .from(ident(&shape.row_type))
        .to_owned()
}

/// Converts a model value to the representation stored in a column of `kind`.
pub(crate) fn to_sea_value(
    kind: &ColumnKind,
    column: &str,
    value: &Value,
) -> IdentityResult<SeaValue> {
    let converted = match (kind, value) {
        (ColumnKind::Text | ColumnKind::Reference(_), Value::Null) => SeaValue::String(None),
        (ColumnKind::Text | ColumnKind::Reference(_), Value::Str(text)) => text.clone().into(),
        (ColumnKind::Integer | ColumnKind::Timestamp, Value::Null) => SeaValue::BigInt(None),
        (ColumnKind::Integer | ColumnKind::Timestamp, Value::I64(number)) => (*number).into(),
        (ColumnKind::Integer | ColumnKind::Timestamp, Value::Time(time)) => time.as_millis().into(),
        (ColumnKind::Float, Value::Null) => SeaValue::Double(None),
        (ColumnKind::Float, Value::F64(number)) => (*number).into(),
        (ColumnKind::Float, Value::I64(number)) => (*number as f64).into(),
        (ColumnKind::Boolean, Value::Null) => SeaValue::Bool(None),
        (ColumnKind::Boolean, Value::Bool(flag)) => (*flag).into(),
        (ColumnKind::Bytes, Value::Null) => Option::<Vec<u8>>::None.into(),
        (ColumnKind::Bytes, Value::Bytes(bytes)) => bytes.clone().into(),
        (kind, value) => {
            return Err(IdentityError::invalid(format!(
                "column [{column}] of kind {kind:?} cannot hold a {} value",
                value.kind_name()
            )));
        }
    };
    Ok(converted)
}

fn identifier_value(shape: &RowShape, identifier: &Value) -> IdentityResult<SeaValue> {
    if identifier.is_null() {
        return Err(IdentityError::invalid(format!(
            "row of [{}] has no identifier",
            shape.row_type
        )));
    }
    let kind = shape
        .find_column(&shape.identifier)
        .map(|column| column.kind.clone())
        .unwrap_or(ColumnKind::Text);
    to_sea_value(&kind, &shape.identifier, identifier)
}

fn decode_row(shape: &RowShape, result: &QueryResult) -> IdentityResult<Row> {
    let mut row = Row::new(shape.row_type.clone());
    for column in &shape.columns {
        let name = column.name.as_str();
        let value = match &column.kind {
            ColumnKind::Text | ColumnKind::Reference(_) => {
                Value::from(result.try_get::<Option<String>>("", name)?)
            }
            ColumnKind::Integer => Value::from(result.try_get::<Option<i64>>("", name)?),
            ColumnKind::Timestamp => Value::from(
                result
                    .try_get::<Option<i64>>("", name)?
                    .map(Timestamp::from_millis),
            ),
            ColumnKind::Float => Value::from(result.try_get::<Option<f64>>("", name)?),
            ColumnKind::Boolean => Value::from(result.try_get::<Option<bool>>("", name)?),
            ColumnKind::Bytes => Value::from(result.try_get::<Option<Vec<u8>>>("", name)?),
        };
        row.set(name, value);
    }
    Ok(row)
}

fn build_stmt<S: QueryStatementWriter>(
    backend: DatabaseBackend,
    stmt: &S,
) -> (String, sea_orm::sea_query::Values) {
    match backend {
        DatabaseBackend::Sqlite => stmt.build(SqliteQueryBuilder),
        DatabaseBackend::Postgres => stmt.build(PostgresQueryBuilder),
        DatabaseBackend::MySql => stmt.build(MysqlQueryBuilder),
        _ => stmt.build(SqliteQueryBuilder),
    }
}

/// Runs a write statement and reports the affected row count.
async fn exec<C, S>(conn: &C, stmt: &S) -> IdentityResult<u64>
where
    C: ConnectionTrait,
    S: QueryStatementWriter,
{
    let backend = conn.get_database_backend();
    let (sql, values) = build_stmt(backend, stmt);
    log::debug!("identity store exec: {sql}");
    let result = conn
        .execute_raw(Statement::from_sql_and_values(backend, sql, values))
        .await?;
    Ok(result.rows_affected())
}

async fn query_all<C, S>(conn: &C, stmt: &S) -> IdentityResult<Vec<QueryResult>>
where
    C: ConnectionTrait,
    S: QueryStatementWriter,
{
    let backend = conn.get_database_backend();
    let (sql, values) = build_stmt(backend, stmt);
    log::debug!("identity store query: {sql}");
    let rows = conn
        .query_all_raw(Statement::from_sql_and_values(backend, sql, values))
        .await?;
    Ok(rows)
}

async fn query_one<C, S>(conn: &C, stmt: &S) -> IdentityResult<Option<QueryResult>>
where
    C: ConnectionTrait,
    S: QueryStatementWriter,
{
    let backend = conn.get_database_backend();
    let (sql, values) = build_stmt(backend, stmt);
    let row = conn
        .query_one_raw(Statement::from_sql_and_values(backend, sql, values))
        .await?;
    Ok(row)
}

#[cfg(test)]
mod tests {
    use super::to_sea_value;
    use aideon_identity_core::{ColumnKind, IdentityError, Timestamp, Value};

    #[test]
    fn timestamps_are_stored_as_millis() {
        let value = to_sea_value(&ColumnKind::Timestamp, "created", &Value::Time(Timestamp(42)))
            .expect("convert");
        assert_eq!(value, 42_i64.into());
    }

    #[test]
    fn mismatched_kinds_are_rejected() {
        let err = to_sea_value(&ColumnKind::Boolean, "enabled", &Value::from("yes"))
            .expect_err("mismatch");
        assert!(matches!(err, IdentityError::Validation { .. }));
    }
}
