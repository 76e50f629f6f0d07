//! Connection handling and dynamic SQL execution.
//!
//! [`Database`] owns the single SQLite connection, applies pragmas and the
//! schema migration on open, and executes either raw [`SqlQuery`] values or
//! typed [`CrudOperation`]s whose identifiers are checked against
//! [`catalog_schema`](crate::schema::catalog_schema).

use crate::config::StoreConfig;
use crate::error::{Result, StoreError};
use crate::schema::{catalog_schema, Table};
use rusqlite::types::{ToSql, ToSqlOutput, Value as SqlValue, ValueRef};
use rusqlite::{params_from_iter, Connection, Statement, Transaction};
use rusqlite_migration::{Migrations, M};
use std::fmt;
use std::fs;
use std::sync::{Mutex, MutexGuard, OnceLock, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Core value types for SQLite operations
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
    Boolean(bool),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            Value::Boolean(b) => Some(*b as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Real(f) => Some(*f),
            Value::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as Json;
        match self {
            Value::Null => Json::Null,
            Value::Integer(i) => Json::from(*i),
            Value::Real(f) => serde_json::Number::from_f64(*f)
                .map(Json::Number)
                .unwrap_or(Json::Null),
            Value::Text(s) => Json::String(s.clone()),
            Value::Blob(b) => Json::String(hex(b)),
            Value::Boolean(b) => Json::Bool(*b),
        }
    }

    /// Nested arrays and objects are kept as their JSON text.
    pub fn from_json(json: &serde_json::Value) -> Self {
        use serde_json::Value as Json;
        match json {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Boolean(*b),
            Json::Number(n) => match n.as_i64() {
                Some(i) => Value::Integer(i),
                None => n.as_f64().map(Value::Real).unwrap_or(Value::Null),
            },
            Json::String(s) => Value::Text(s.clone()),
            Json::Array(_) | Json::Object(_) => Value::Text(json.to_string()),
        }
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Flat-file rendering: NULL is empty, booleans are 0/1.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Real(r) => write!(f, "{r}"),
            Value::Text(s) => f.write_str(s),
            Value::Blob(b) => f.write_str(&hex(b)),
            Value::Boolean(b) => write!(f, "{}", *b as i64),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}
impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v.into())
    }
}
impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v)
    }
}
impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}
impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}
impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}
impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Blob(v)
    }
}
impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

impl From<ValueRef<'_>> for Value {
    fn from(value_ref: ValueRef<'_>) -> Self {
        match value_ref {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(i) => Value::Integer(i),
            ValueRef::Real(f) => Value::Real(f),
            ValueRef::Text(t) => Value::Text(String::from_utf8_lossy(t).into_owned()),
            ValueRef::Blob(b) => Value::Blob(b.to_vec()),
        }
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::Owned(SqlValue::Null),
            Value::Integer(i) => ToSqlOutput::Owned(SqlValue::Integer(*i)),
            Value::Real(f) => ToSqlOutput::Owned(SqlValue::Real(*f)),
            Value::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            Value::Blob(b) => ToSqlOutput::Borrowed(ValueRef::Blob(b)),
            Value::Boolean(b) => ToSqlOutput::Owned(SqlValue::Integer(*b as i64)),
        })
    }
}

/// Parameter bindings for SQL queries, either by name or by position.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Params {
    pub named: Vec<(String, Value)>,
    pub positional: Vec<Value>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }
    /// Add a named value; `name` may be given with or without its `:` prefix.
    pub fn with_value(mut self, name: &str, value: impl Into<Value>) -> Self {
        let name = if name.starts_with([':', '@', '$']) {
            name.to_string()
        } else {
            format!(":{name}")
        };
        self.named.push((name, value.into()));
        self
    }
    /// Add the next `?` value.
    pub fn push(mut self, value: impl Into<Value>) -> Self {
        self.positional.push(value.into());
        self
    }

    fn bind(&self, stmt: &mut Statement<'_>) -> Result<()> {
        if !self.named.is_empty() && !self.positional.is_empty() {
            return Err(StoreError::validation(
                "named and positional parameters cannot be mixed",
            ));
        }
        for (i, value) in self.positional.iter().enumerate() {
            stmt.raw_bind_parameter(i + 1, value)?;
        }
        for (name, value) in &self.named {
            let index = stmt
                .parameter_index(name)?
                .ok_or_else(|| StoreError::validation(format!("unknown parameter {name}")))?;
            stmt.raw_bind_parameter(index, value)?;
        }
        Ok(())
    }
}

/// SQL Query with typed parameters
#[derive(Debug, Clone, PartialEq)]
pub struct SqlQuery {
    pub statement: String,
    pub params: Params,
}

impl SqlQuery {
    pub fn new(statement: &str) -> Self {
        Self {
            statement: statement.to_string(),
            params: Params::new(),
        }
    }
    pub fn with_params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }
}

/// Rows returned by a query, with column names in select order.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl ResultSet {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Value of `column` in row `row`, if both exist.
    pub fn get(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.columns.iter().position(|c| c == column)?;
        self.rows.get(row)?.get(idx)
    }

    /// One JSON object per row, keys in column order.
    pub fn to_json_rows(&self) -> Vec<serde_json::Value> {
        self.rows
            .iter()
            .map(|row| {
                let map: serde_json::Map<String, serde_json::Value> = self
                    .columns
                    .iter()
                    .cloned()
                    .zip(row.iter().map(Value::to_json))
                    .collect();
                serde_json::Value::Object(map)
            })
            .collect()
    }
}

/// Outcome of [`Database::execute_sql`] and [`Database::execute_crud`].
#[derive(Debug, Clone, PartialEq)]
pub enum ExecOutcome {
    Rows(ResultSet),
    Affected(usize),
    Inserted(i64),
}

/// Query operators for building advanced queries
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOperator {
    Equal(Value),
    NotEqual(Value),
    GreaterThan(Value),
    GreaterThanOrEqual(Value),
    LessThan(Value),
    LessThanOrEqual(Value),
    Like(String),
    In(Vec<Value>),
}

/// Query builder for composable, immutable queries. Conditions are ANDed.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Query {
    pub conditions: Vec<(String, QueryOperator)>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn with_condition(mut self, field: &str, op: QueryOperator) -> Self {
        self.conditions.push((field.to_string(), op));
        self
    }

    /// `WHERE ...` clause (or empty) and its bind values.
    fn to_where(&self, table: Table) -> Result<(String, Vec<Value>)> {
        if self.conditions.is_empty() {
            return Ok((String::new(), Vec::new()));
        }
        let definition = table.definition();
        let mut clauses = Vec::with_capacity(self.conditions.len());
        let mut values = Vec::new();
        for (field, op) in &self.conditions {
            definition.check_readable(field)?;
            let clause = match op {
                QueryOperator::Equal(Value::Null) => format!("{field} IS NULL"),
                QueryOperator::NotEqual(Value::Null) => format!("{field} IS NOT NULL"),
                QueryOperator::Equal(v) => bind_one(&mut values, v, field, "="),
                QueryOperator::NotEqual(v) => bind_one(&mut values, v, field, "!="),
                QueryOperator::GreaterThan(v) => bind_one(&mut values, v, field, ">"),
                QueryOperator::GreaterThanOrEqual(v) => bind_one(&mut values, v, field, ">="),
                QueryOperator::LessThan(v) => bind_one(&mut values, v, field, "<"),
                QueryOperator::LessThanOrEqual(v) => bind_one(&mut values, v, field, "<="),
                QueryOperator::Like(pattern) => {
                    values.push(Value::Text(pattern.clone()));
                    format!("{field} LIKE ?")
                }
                QueryOperator::In(list) if list.is_empty() => "0".to_string(),
                QueryOperator::In(list) => {
                    values.extend(list.iter().cloned());
                    format!("{field} IN ({})", placeholders(list.len()))
                }
            };
            clauses.push(clause);
        }
        Ok((format!(" WHERE {}", clauses.join(" AND ")), values))
    }
}

fn bind_one(values: &mut Vec<Value>, value: &Value, field: &str, op: &str) -> String {
    values.push(value.clone());
    format!("{field} {op} ?")
}

pub(crate) fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

/// CRUD operation types
#[derive(Debug, Clone, PartialEq)]
pub struct CreateOperation {
    pub table: Table,
    pub data: Vec<(String, Value)>,
}

impl CreateOperation {
    pub fn new(table: Table) -> Self {
        Self {
            table,
            data: Vec::new(),
        }
    }
    pub fn with_value(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.data.push((column.to_string(), value.into()));
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReadOperation {
    pub table: Table,
    pub query: Query,
    pub fields: Option<Vec<String>>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
    pub order_by: Option<Vec<(String, bool)>>, // (field, is_ascending)
}

impl ReadOperation {
    pub fn all(table: Table) -> Self {
        Self {
            table,
            query: Query::new(),
            fields: None,
            limit: None,
            offset: None,
            order_by: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateOperation {
    pub table: Table,
    pub query: Query,
    pub updates: Vec<(String, Value)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteOperation {
    pub table: Table,
    pub query: Query,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CrudOperation {
    Create(CreateOperation),
    Read(ReadOperation),
    Update(UpdateOperation),
    Delete(DeleteOperation),
}

/// Run `op` against `conn` (a plain connection or an open transaction).
pub(crate) fn run_crud(conn: &Connection, op: &CrudOperation) -> Result<ExecOutcome> {
    match op {
        CrudOperation::Create(create) => {
            let definition = create.table.definition();
            if create.data.is_empty() {
                conn.execute(&format!("INSERT INTO {} DEFAULT VALUES", create.table), [])?;
                return Ok(ExecOutcome::Inserted(conn.last_insert_rowid()));
            }
            for (column, _) in &create.data {
                definition.check_writable(column)?;
            }
            let columns: Vec<&str> = create.data.iter().map(|(c, _)| c.as_str()).collect();
            let sql = format!(
                "INSERT INTO {} ({}) VALUES ({})",
                create.table,
                columns.join(", "),
                placeholders(columns.len())
            );
            let mut stmt = conn.prepare_cached(&sql)?;
            let rowid = stmt.insert(params_from_iter(create.data.iter().map(|(_, v)| v)))?;
            Ok(ExecOutcome::Inserted(rowid))
        }
        CrudOperation::Read(read) => {
            let definition = read.table.definition();
            let projection = match &read.fields {
                Some(fields) if !fields.is_empty() => {
                    for field in fields {
                        definition.check_readable(field)?;
                    }
                    fields.join(", ")
                }
                _ => "*".to_string(),
            };
            let (where_clause, mut values) = read.query.to_where(read.table)?;
            let mut sql = format!("SELECT {projection} FROM {}{where_clause}", read.table);
            if let Some(order_by) = read.order_by.as_ref().filter(|o| !o.is_empty()) {
                let mut terms = Vec::with_capacity(order_by.len());
                for (field, ascending) in order_by {
                    definition.check_readable(field)?;
                    terms.push(format!("{field} {}", if *ascending { "ASC" } else { "DESC" }));
                }
                sql.push_str(&format!(" ORDER BY {}", terms.join(", ")));
            }
            match (read.limit, read.offset) {
                (Some(limit), offset) => {
                    sql.push_str(" LIMIT ? OFFSET ?");
                    values.push(Value::Integer(limit.into()));
                    values.push(Value::Integer(offset.unwrap_or(0).into()));
                }
                (None, Some(offset)) => {
                    sql.push_str(" LIMIT -1 OFFSET ?");
                    values.push(Value::Integer(offset.into()));
                }
                (None, None) => {}
            }
            query_rows(conn, &sql, &values).map(ExecOutcome::Rows)
        }
        CrudOperation::Update(update) => {
            if update.updates.is_empty() {
                return Err(StoreError::validation("update has no columns to set"));
            }
            let definition = update.table.definition();
            let mut assignments = Vec::with_capacity(update.updates.len());
            let mut values = Vec::with_capacity(update.updates.len());
            for (column, value) in &update.updates {
                definition.check_writable(column)?;
                assignments.push(format!("{column} = ?"));
                values.push(value.clone());
            }
            let (where_clause, where_values) = update.query.to_where(update.table)?;
            values.extend(where_values);
            let sql = format!(
                "UPDATE {} SET {}{where_clause}",
                update.table,
                assignments.join(", ")
            );
            let affected = conn.execute(&sql, params_from_iter(values.iter()))?;
            Ok(ExecOutcome::Affected(affected))
        }
        CrudOperation::Delete(delete) => {
            let (where_clause, values) = delete.query.to_where(delete.table)?;
            let sql = format!("DELETE FROM {}{where_clause}", delete.table);
            let affected = conn.execute(&sql, params_from_iter(values.iter()))?;
            Ok(ExecOutcome::Affected(affected))
        }
    }
}

/// Collect every row of `sql` bound with positional `values`.
pub(crate) fn query_rows(conn: &Connection, sql: &str, values: &[Value]) -> Result<ResultSet> {
    let mut stmt = conn.prepare(sql)?;
    Params {
        named: Vec::new(),
        positional: values.to_vec(),
    }
    .bind(&mut stmt)?;
    collect_rows(&mut stmt)
}

/// Rows of a read-only, row-producing statement. Anything else is refused
/// before it runs.
pub(crate) fn select(conn: &Connection, query: &SqlQuery) -> Result<ResultSet> {
    let mut stmt = conn.prepare(&query.statement)?;
    if stmt.column_count() == 0 || !stmt.readonly() {
        return Err(StoreError::validation(
            "only read-only queries returning rows are accepted",
        ));
    }
    query.params.bind(&mut stmt)?;
    collect_rows(&mut stmt)
}

fn collect_rows(stmt: &mut Statement<'_>) -> Result<ResultSet> {
    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let mut rows = stmt.raw_query();
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let mut values = Vec::with_capacity(columns.len());
        for i in 0..columns.len() {
            values.push(Value::from(row.get_ref(i)?));
        }
        out.push(values);
    }
    Ok(ResultSet { columns, rows: out })
}

fn schema_ddl() -> &'static str {
    static DDL: OnceLock<String> = OnceLock::new();
    DDL.get_or_init(|| catalog_schema().to_sql())
}

fn migrate(conn: &mut Connection) -> Result<()> {
    let migrations = Migrations::new(vec![M::up(schema_ddl())]);
    info!("applying database migrations");
    migrations.to_latest(conn)?;
    info!("migrations applied");
    Ok(())
}

/// Handle to the shop database.
///
/// The connection sits behind a mutex, so a `Database` can be shared
/// between threads; SQLite itself serialises the writes.
pub struct Database {
    config: StoreConfig,
    connection: Mutex<Option<Connection>>,
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("path", &self.config.database_path)
            .field("open", &self.connection.try_lock().map(|c| c.is_some()).ok())
            .finish()
    }
}

impl Database {
    /// Open (creating if needed) the database file named by `config` and
    /// bring its schema up to date.
    pub fn open(config: &StoreConfig) -> Result<Self> {
        let path = &config.database_path;
        info!(path = %path.display(), "opening shop database");
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let connection = Connection::open(path)?;
        Self::initialize(connection, config.clone())
    }

    /// Private in-memory database, mostly for tests and dry runs.
    pub fn open_in_memory() -> Result<Self> {
        let connection = Connection::open_in_memory()?;
        let config = StoreConfig::new(":memory:");
        Self::initialize(connection, config)
    }

    fn initialize(mut connection: Connection, config: StoreConfig) -> Result<Self> {
        connection.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;
        connection.pragma_update(None, "foreign_keys", true)?;
        let mode: String = connection.pragma_update_and_check(
            None,
            "journal_mode",
            config.journal_mode.pragma_value(),
            |row| row.get(0),
        )?;
        debug!(journal_mode = %mode, "pragmas applied");
        migrate(&mut connection)?;
        info!("database initialized");
        Ok(Self {
            config,
            connection: Mutex::new(Some(connection)),
        })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn is_open(&self) -> bool {
        self.lock().is_some()
    }

    /// Close the connection. Later calls fail with [`StoreError::NotConnected`].
    pub fn close(&self) -> Result<()> {
        let Some(connection) = self.lock().take() else {
            debug!("close called on a closed database");
            return Ok(());
        };
        connection.close().map_err(|(_, err)| {
            warn!(error = %err, "error closing database connection");
            StoreError::from(err)
        })?;
        info!("database connection closed");
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, Option<Connection>> {
        self.connection
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` with the connection.
    ///
    /// The connection lock is held while `f` runs; calling other `Database`
    /// methods from inside `f` deadlocks. Use `conn` directly instead.
    pub fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let guard = self.lock();
        let conn = guard.as_ref().ok_or(StoreError::NotConnected)?;
        f(conn)
    }

    /// Run `f` inside a transaction: committed on `Ok`, rolled back on `Err`.
    ///
    /// As with [`Database::with_conn`], `f` must only use `tx`; calling back
    /// into `self` deadlocks.
    pub fn transaction<T>(&self, f: impl FnOnce(&Transaction<'_>) -> Result<T>) -> Result<T> {
        let mut guard = self.lock();
        let conn = guard.as_mut().ok_or(StoreError::NotConnected)?;
        let tx = conn.transaction()?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    /// Execute arbitrary SQL. Statements producing columns return their rows;
    /// anything else returns the number of rows changed.
    pub fn execute_sql(&self, query: &SqlQuery) -> Result<ExecOutcome> {
        debug!(sql = %query.statement, "executing sql");
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&query.statement)?;
            query.params.bind(&mut stmt)?;
            if stmt.column_count() > 0 {
                collect_rows(&mut stmt).map(ExecOutcome::Rows)
            } else {
                Ok(ExecOutcome::Affected(stmt.raw_execute()?))
            }
        })
    }

    /// Perform a CRUD operation (type-safe API)
    pub fn execute_crud(&self, op: &CrudOperation) -> Result<ExecOutcome> {
        self.with_conn(|conn| run_crud(conn, op))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(|conn| {
            conn.execute_batch(
                "INSERT INTO categories (name, description) VALUES ('Books', 'Paper'), ('Games', NULL);",
            )?;
            Ok(())
        })
        .unwrap();
        db
    }

    fn rows(outcome: ExecOutcome) -> ResultSet {
        match outcome {
            ExecOutcome::Rows(rows) => rows,
            other => panic!("expected rows, got {other:?}"),
        }
    }

    #[test]
    fn test_value_json_bridge() {
        let nested = serde_json::json!({"tags": ["a", "b"]});
        assert_eq!(
            Value::from_json(&nested["tags"]),
            Value::Text(r#"["a","b"]"#.to_string())
        );
        assert_eq!(Value::from_json(&serde_json::json!(2)), Value::Integer(2));
        assert_eq!(Value::from_json(&serde_json::json!(2.5)), Value::Real(2.5));
        assert_eq!(Value::Real(f64::NAN).to_json(), serde_json::Value::Null);
        assert_eq!(Value::Blob(vec![0xde, 0xad]).to_json(), serde_json::json!("dead"));
        assert_eq!(Value::Null.to_string(), "");
        assert_eq!(Value::Boolean(true).to_string(), "1");
    }

    #[test]
    fn test_execute_sql_named_and_positional() {
        let db = seeded();
        let result = rows(
            db.execute_sql(
                &SqlQuery::new("SELECT name FROM categories WHERE name = :name")
                    .with_params(Params::new().with_value("name", "Books")),
            )
            .unwrap(),
        );
        assert_eq!(result.columns, vec!["name"]);
        assert_eq!(result.len(), 1);

        let outcome = db
            .execute_sql(
                &SqlQuery::new("UPDATE categories SET description = ? WHERE name = ?")
                    .with_params(Params::new().push("Fun").push("Games")),
            )
            .unwrap();
        assert_eq!(outcome, ExecOutcome::Affected(1));
    }

    #[test]
    fn test_mixed_params_rejected() {
        let db = seeded();
        let err = db
            .execute_sql(
                &SqlQuery::new("SELECT ?1, :x")
                    .with_params(Params::new().push(1).with_value("x", 2)),
            )
            .unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
    }

    #[test]
    fn test_crud_round_trip() {
        let db = seeded();
        let inserted = db
            .execute_crud(&CrudOperation::Create(
                CreateOperation::new(Table::Categories)
                    .with_value("name", "Music")
                    .with_value("description", Value::Null),
            ))
            .unwrap();
        let ExecOutcome::Inserted(id) = inserted else {
            panic!("expected insert, got {inserted:?}");
        };

        let read = rows(
            db.execute_crud(&CrudOperation::Read(ReadOperation {
                table: Table::Categories,
                query: Query::new().with_condition("description", QueryOperator::Equal(Value::Null)),
                fields: Some(vec!["category_id".into(), "name".into()]),
                limit: Some(10),
                offset: None,
                order_by: Some(vec![("name".into(), true)]),
            }))
            .unwrap(),
        );
        let names: Vec<_> = read.rows.iter().map(|r| r[1].clone()).collect();
        assert_eq!(names, vec![Value::from("Games"), Value::from("Music")]);

        let updated = db
            .execute_crud(&CrudOperation::Update(UpdateOperation {
                table: Table::Categories,
                query: Query::new().with_condition("category_id", QueryOperator::Equal(id.into())),
                updates: vec![("description".into(), "Records".into())],
            }))
            .unwrap();
        assert_eq!(updated, ExecOutcome::Affected(1));

        let deleted = db
            .execute_crud(&CrudOperation::Delete(DeleteOperation {
                table: Table::Categories,
                query: Query::new().with_condition(
                    "name",
                    QueryOperator::In(vec!["Music".into(), "Games".into()]),
                ),
            }))
            .unwrap();
        assert_eq!(deleted, ExecOutcome::Affected(2));
    }

    #[test]
    fn test_crud_rejects_unknown_identifiers() {
        let db = seeded();
        let err = db
            .execute_crud(&CrudOperation::Create(
                CreateOperation::new(Table::Categories).with_value("name; DROP TABLE x", "y"),
            ))
            .unwrap_err();
        assert!(matches!(err, StoreError::UnknownColumn { .. }));

        let mut read = ReadOperation::all(Table::Categories);
        read.order_by = Some(vec![("random()".into(), true)]);
        assert!(db.execute_crud(&CrudOperation::Read(read)).is_err());
    }

    #[test]
    fn test_offset_without_limit() {
        let db = seeded();
        let mut read = ReadOperation::all(Table::Categories);
        read.offset = Some(1);
        read.order_by = Some(vec![("category_id".into(), true)]);
        let result = rows(db.execute_crud(&CrudOperation::Read(read)).unwrap());
        assert_eq!(result.len(), 1);
        assert_eq!(result.get(0, "name"), Some(&Value::from("Games")));
    }

    #[test]
    fn test_transaction_rolls_back_on_error() {
        let db = seeded();
        let result: Result<()> = db.transaction(|tx| {
            tx.execute("INSERT INTO categories (name) VALUES ('Temp')", [])?;
            Err(StoreError::validation("abort"))
        });
        assert!(result.is_err());
        let count: i64 = db
            .with_conn(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM categories", [], |r| r.get(0))?))
            .unwrap();
        assert_eq!(count, 2);
    }

    #[test]
    fn test_closed_database_reports_not_connected() {
        let db = seeded();
        db.close().unwrap();
        assert!(!db.is_open());
        assert!(matches!(
            db.execute_sql(&SqlQuery::new("SELECT 1")),
            Err(StoreError::NotConnected)
        ));
        db.close().unwrap();
    }
}
