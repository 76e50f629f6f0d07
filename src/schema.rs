//! Schema definition for the shop database.
//!
//! Tables are described with plain data types and rendered to DDL. The same
//! definitions act as the whitelist for every dynamic identifier the crate
//! puts into SQL text (imports, exports, generic CRUD), so a table or column
//! name that is not declared here never reaches SQLite.

use crate::error::{Result, StoreError};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    pub tables: Vec<TableDefinition>,
}

impl Default for Schema {
    fn default() -> Self {
        Self::new()
    }
}

impl Schema {
    pub fn new() -> Self {
        Self { tables: Vec::new() }
    }
    pub fn add_table(mut self, table: TableDefinition) -> Self {
        self.tables.push(table);
        self
    }

    pub fn table(&self, name: &str) -> Option<&TableDefinition> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// Full DDL script: tables in declaration order, then their indexes.
    pub fn to_sql(&self) -> String {
        let mut sql = String::new();
        for table in &self.tables {
            sql.push_str(&table.to_sql());
            sql.push('\n');
        }
        for table in &self.tables {
            for index in &table.indexes {
                sql.push_str(&index.to_sql(&table.name));
                sql.push('\n');
            }
        }
        sql
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableDefinition {
    pub name: String,
    pub columns: Vec<ColumnDefinition>,
    pub foreign_keys: Vec<ForeignKey>,
    pub indexes: Vec<IndexDefinition>,
}

impl TableDefinition {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            columns: Vec::new(),
            foreign_keys: Vec::new(),
            indexes: Vec::new(),
        }
    }
    pub fn column(mut self, column: ColumnDefinition) -> Self {
        self.columns.push(column);
        self
    }
    pub fn foreign_key(mut self, fk: ForeignKey) -> Self {
        self.foreign_keys.push(fk);
        self
    }
    pub fn index(mut self, name: &str, columns: &[&str]) -> Self {
        self.indexes.push(IndexDefinition {
            name: name.to_string(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            unique: false,
        });
        self
    }

    pub fn find_column(&self, name: &str) -> Option<&ColumnDefinition> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Columns a caller may supply values for (generated columns excluded).
    pub fn writable_columns(&self) -> impl Iterator<Item = &ColumnDefinition> {
        self.columns.iter().filter(|c| !c.is_generated())
    }

    /// Fails unless `column` exists on this table.
    pub fn check_readable(&self, column: &str) -> Result<()> {
        match self.find_column(column) {
            Some(_) => Ok(()),
            None => Err(StoreError::UnknownColumn {
                table: self.name.clone(),
                column: column.to_string(),
            }),
        }
    }

    /// Fails unless `column` exists and is not generated.
    pub fn check_writable(&self, column: &str) -> Result<()> {
        self.check_readable(column)?;
        match self.find_column(column) {
            Some(c) if c.is_generated() => Err(StoreError::ReadOnlyColumn {
                table: self.name.clone(),
                column: column.to_string(),
            }),
            _ => Ok(()),
        }
    }

    pub fn to_sql(&self) -> String {
        let mut parts: Vec<String> = self.columns.iter().map(ColumnDefinition::to_sql).collect();
        parts.extend(self.foreign_keys.iter().map(ForeignKey::to_sql));
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    {}\n);",
            self.name,
            parts.join(",\n    ")
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDefinition {
    pub name: String,
    pub data_type: DataType,
    pub constraints: Vec<ColumnConstraint>,
    pub default_value: Option<DefaultValue>,
}

impl ColumnDefinition {
    pub fn new(name: &str, data_type: DataType) -> Self {
        Self {
            name: name.to_string(),
            data_type,
            constraints: Vec::new(),
            default_value: None,
        }
    }
    pub fn with(mut self, constraint: ColumnConstraint) -> Self {
        self.constraints.push(constraint);
        self
    }
    pub fn default_to(mut self, value: DefaultValue) -> Self {
        self.default_value = Some(value);
        self
    }

    pub fn is_generated(&self) -> bool {
        self.constraints
            .iter()
            .any(|c| matches!(c, ColumnConstraint::Generated(_)))
    }

    pub fn to_sql(&self) -> String {
        let mut sql = format!("{} {}", self.name, self.data_type);
        for constraint in &self.constraints {
            if !matches!(constraint, ColumnConstraint::Generated(_)) {
                sql.push(' ');
                sql.push_str(&constraint.to_string());
            }
        }
        if let Some(default) = &self.default_value {
            sql.push_str(&format!(" DEFAULT {default}"));
        }
        // GENERATED must trail every other column constraint.
        for constraint in &self.constraints {
            if let ColumnConstraint::Generated(_) = constraint {
                sql.push(' ');
                sql.push_str(&constraint.to_string());
            }
        }
        sql
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    Integer,
    Text,
    Real,
    Blob,
    DateTime,
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DataType::Integer => "INTEGER",
            DataType::Text => "TEXT",
            DataType::Real => "REAL",
            DataType::Blob => "BLOB",
            DataType::DateTime => "DATETIME",
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ColumnConstraint {
    PrimaryKey,
    AutoIncrement,
    NotNull,
    Unique,
    Check(String),
    /// Virtual column computed from an expression.
    Generated(String),
}

impl fmt::Display for ColumnConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnConstraint::PrimaryKey => f.write_str("PRIMARY KEY"),
            ColumnConstraint::AutoIncrement => f.write_str("AUTOINCREMENT"),
            ColumnConstraint::NotNull => f.write_str("NOT NULL"),
            ColumnConstraint::Unique => f.write_str("UNIQUE"),
            ColumnConstraint::Check(expr) => write!(f, "CHECK({expr})"),
            ColumnConstraint::Generated(expr) => write!(f, "GENERATED ALWAYS AS ({expr}) VIRTUAL"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DefaultValue {
    Integer(i64),
    Text(String),
    Real(f64),
    Null,
    CurrentTimestamp,
}

impl fmt::Display for DefaultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefaultValue::Integer(i) => write!(f, "{i}"),
            DefaultValue::Text(s) => write!(f, "'{}'", s.replace('\'', "''")),
            DefaultValue::Real(r) => write!(f, "{r:?}"),
            DefaultValue::Null => f.write_str("NULL"),
            DefaultValue::CurrentTimestamp => f.write_str("CURRENT_TIMESTAMP"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForeignKey {
    pub column: String,
    pub foreign_table: String,
    pub foreign_column: String,
    pub on_delete: ForeignKeyAction,
    pub on_update: ForeignKeyAction,
}

impl ForeignKey {
    pub fn new(column: &str, foreign_table: &str, foreign_column: &str) -> Self {
        Self {
            column: column.to_string(),
            foreign_table: foreign_table.to_string(),
            foreign_column: foreign_column.to_string(),
            on_delete: ForeignKeyAction::NoAction,
            on_update: ForeignKeyAction::NoAction,
        }
    }
    pub fn on_delete(mut self, action: ForeignKeyAction) -> Self {
        self.on_delete = action;
        self
    }

    pub fn to_sql(&self) -> String {
        let mut sql = format!(
            "FOREIGN KEY ({}) REFERENCES {}({})",
            self.column, self.foreign_table, self.foreign_column
        );
        if self.on_delete != ForeignKeyAction::NoAction {
            sql.push_str(&format!(" ON DELETE {}", self.on_delete));
        }
        if self.on_update != ForeignKeyAction::NoAction {
            sql.push_str(&format!(" ON UPDATE {}", self.on_update));
        }
        sql
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForeignKeyAction {
    NoAction,
    Cascade,
    SetNull,
    SetDefault,
    Restrict,
}

impl fmt::Display for ForeignKeyAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ForeignKeyAction::NoAction => "NO ACTION",
            ForeignKeyAction::Cascade => "CASCADE",
            ForeignKeyAction::SetNull => "SET NULL",
            ForeignKeyAction::SetDefault => "SET DEFAULT",
            ForeignKeyAction::Restrict => "RESTRICT",
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndexDefinition {
    pub name: String,
    pub columns: Vec<String>,
    pub unique: bool,
}

impl IndexDefinition {
    pub fn to_sql(&self, table: &str) -> String {
        format!(
            "CREATE {}INDEX IF NOT EXISTS {} ON {}({});",
            if self.unique { "UNIQUE " } else { "" },
            self.name,
            table,
            self.columns.join(", ")
        )
    }
}

/// The five tables of the shop database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Table {
    Categories,
    Products,
    Customers,
    Orders,
    OrderItems,
}

impl Table {
    pub const ALL: [Table; 5] = [
        Table::Categories,
        Table::Products,
        Table::Customers,
        Table::Orders,
        Table::OrderItems,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Table::Categories => "categories",
            Table::Products => "products",
            Table::Customers => "customers",
            Table::Orders => "orders",
            Table::OrderItems => "order_items",
        }
    }

    pub const fn primary_key(self) -> &'static str {
        match self {
            Table::Categories => "category_id",
            Table::Products => "product_id",
            Table::Customers => "customer_id",
            Table::Orders => "order_id",
            Table::OrderItems => "order_item_id",
        }
    }

    pub fn definition(self) -> &'static TableDefinition {
        catalog_schema()
            .table(self.as_str())
            .unwrap_or_else(|| unreachable!("catalog schema declares every Table variant"))
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Table {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        Table::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| StoreError::UnknownTable(s.to_string()))
    }
}

fn id_column(name: &str) -> ColumnDefinition {
    ColumnDefinition::new(name, DataType::Integer)
        .with(ColumnConstraint::PrimaryKey)
        .with(ColumnConstraint::AutoIncrement)
}

fn build_catalog_schema() -> Schema {
    use ColumnConstraint::*;
    use DataType::*;

    Schema::new()
        .add_table(
            TableDefinition::new("categories")
                .column(id_column("category_id"))
                .column(ColumnDefinition::new("name", Text).with(NotNull).with(Unique))
                .column(ColumnDefinition::new("description", Text))
                .column(ColumnDefinition::new("created_at", DateTime).default_to(DefaultValue::CurrentTimestamp)),
        )
        .add_table(
            TableDefinition::new("products")
                .column(id_column("product_id"))
                .column(ColumnDefinition::new("name", Text).with(NotNull))
                .column(ColumnDefinition::new("description", Text))
                .column(ColumnDefinition::new("price", Real).with(NotNull).with(Check("price >= 0".into())))
                .column(
                    ColumnDefinition::new("stock_quantity", Integer)
                        .with(NotNull)
                        .with(Check("stock_quantity >= 0".into()))
                        .default_to(DefaultValue::Integer(0)),
                )
                .column(ColumnDefinition::new("category_id", Integer))
                .column(ColumnDefinition::new("created_at", DateTime).default_to(DefaultValue::CurrentTimestamp))
                .foreign_key(
                    ForeignKey::new("category_id", "categories", "category_id")
                        .on_delete(ForeignKeyAction::SetNull),
                )
                .index("idx_products_category", &["category_id"])
                .index("idx_products_price", &["price"]),
        )
        .add_table(
            TableDefinition::new("customers")
                .column(id_column("customer_id"))
                .column(ColumnDefinition::new("first_name", Text).with(NotNull))
                .column(ColumnDefinition::new("last_name", Text).with(NotNull))
                .column(ColumnDefinition::new("email", Text).with(Unique).with(NotNull))
                .column(ColumnDefinition::new("phone", Text))
                .column(
                    ColumnDefinition::new("registration_date", DateTime)
                        .default_to(DefaultValue::CurrentTimestamp),
                )
                .index("idx_customers_email", &["email"]),
        )
        .add_table(
            TableDefinition::new("orders")
                .column(id_column("order_id"))
                .column(ColumnDefinition::new("customer_id", Integer).with(NotNull))
                .column(ColumnDefinition::new("order_date", DateTime).default_to(DefaultValue::CurrentTimestamp))
                .column(ColumnDefinition::new("total_amount", Real).default_to(DefaultValue::Real(0.0)))
                .column(
                    ColumnDefinition::new("status", Text)
                        .default_to(DefaultValue::Text("pending".into()))
                        .with(Check(
                            "status IN ('pending', 'confirmed', 'shipped', 'delivered', 'cancelled')".into(),
                        )),
                )
                .foreign_key(
                    ForeignKey::new("customer_id", "customers", "customer_id")
                        .on_delete(ForeignKeyAction::Cascade),
                )
                .index("idx_orders_customer_date", &["customer_id", "order_date"])
                .index("idx_orders_status", &["status"]),
        )
        .add_table(
            TableDefinition::new("order_items")
                .column(id_column("order_item_id"))
                .column(ColumnDefinition::new("order_id", Integer).with(NotNull))
                .column(ColumnDefinition::new("product_id", Integer).with(NotNull))
                .column(ColumnDefinition::new("quantity", Integer).with(NotNull).with(Check("quantity > 0".into())))
                .column(ColumnDefinition::new("unit_price", Real).with(NotNull))
                .column(ColumnDefinition::new("subtotal", Real).with(Generated("quantity * unit_price".into())))
                .foreign_key(
                    ForeignKey::new("order_id", "orders", "order_id").on_delete(ForeignKeyAction::Cascade),
                )
                .foreign_key(
                    ForeignKey::new("product_id", "products", "product_id")
                        .on_delete(ForeignKeyAction::Restrict),
                )
                .index("idx_order_items_order", &["order_id"])
                .index("idx_order_items_product", &["product_id"]),
        )
}

/// Schema of the shop database, built once.
pub fn catalog_schema() -> &'static Schema {
    static SCHEMA: OnceLock<Schema> = OnceLock::new();
    SCHEMA.get_or_init(build_catalog_schema)
}
