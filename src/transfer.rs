//! Bulk import from CSV/JSON files and export to CSV/JSON files.
//!
//! # Intention
//! Move whole tables (or query results) in and out of the shop database
//! without hand-written SQL. Every column name read from a file is checked
//! against the table definition before any row is inserted.
//!
//! # Architectural Boundaries
//! - Rows are inserted through the generic CRUD path in [`crate::sqlite`].
//! - CSV import is best effort per row; JSON import is all or nothing.

use crate::error::{Result, StoreError};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use crate::schema::{ColumnDefinition, DataType, Table};
use crate::sqlite::{
    run_crud, select, CreateOperation, CrudOperation, Database, ExecOutcome, ReadOperation,
    SqlQuery, Value,
};
use serde::Serialize;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use tracing::{info, warn};

/// Renames CSV header fields to table columns. Fields without an entry are
/// not imported.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ColumnMapping {
    pairs: Vec<(String, String)>,
}

impl ColumnMapping {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn map(mut self, field: &str, column: &str) -> Self {
        self.pairs.push((field.to_string(), column.to_string()));
        self
    }

    pub fn column_for(&self, field: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(f, _)| f == field)
            .map(|(_, c)| c.as_str())
    }
}

impl<F: Into<String>, C: Into<String>> FromIterator<(F, C)> for ColumnMapping {
    fn from_iter<I: IntoIterator<Item = (F, C)>>(iter: I) -> Self {
        Self {
            pairs: iter.into_iter().map(|(f, c)| (f.into(), c.into())).collect(),
        }
    }
}

/// Outcome of an import.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub inserted: usize,
    pub skipped: usize,
}

/// Accepted spellings of a DATETIME cell; a bare date means midnight.
const DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

fn parse_datetime(text: &str) -> Option<NaiveDateTime> {
    DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .map(|date| date.and_time(NaiveTime::MIN))
        })
}

/// Bring an imported value in line with the declared column type, so every
/// stored row can be read back into its record type.
fn coerce(table: Table, column: &ColumnDefinition, value: Value) -> Result<Value> {
    let invalid = |shown: &dyn std::fmt::Display| {
        StoreError::validation(format!(
            "{table}.{}: '{shown}' is not a valid {}",
            column.name, column.data_type
        ))
    };
    match (column.data_type, value) {
        (_, Value::Null) => Ok(Value::Null),
        (DataType::Integer, Value::Text(text)) => text
            .trim()
            .parse::<i64>()
            .map(Value::Integer)
            .map_err(|_| invalid(&text)),
        (DataType::Integer, Value::Real(real)) => {
            if real.fract() == 0.0 && real >= i64::MIN as f64 && real <= i64::MAX as f64 {
                Ok(Value::Integer(real as i64))
            } else {
                Err(invalid(&real))
            }
        }
        (DataType::Real, Value::Text(text)) => text
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|real| real.is_finite())
            .map(Value::Real)
            .ok_or_else(|| invalid(&text)),
        (DataType::DateTime, Value::Text(text)) => parse_datetime(text.trim())
            .map(|datetime| Value::Text(datetime.format("%Y-%m-%d %H:%M:%S%.f").to_string()))
            .ok_or_else(|| invalid(&text)),
        (DataType::DateTime, other) => Err(invalid(&other)),
        (_, other) => Ok(other),
    }
}

fn column_of(table: Table, name: &str) -> Result<&'static ColumnDefinition> {
    let definition = table.definition();
    definition.check_writable(name)?;
    definition.find_column(name).ok_or_else(|| StoreError::UnknownColumn {
        table: table.to_string(),
        column: name.to_string(),
    })
}

impl Database {
    /// Insert every data row of a CSV file into `table`.
    pub fn import_csv(
        &self,
        path: &Path,
        table: Table,
        mapping: Option<&ColumnMapping>,
    ) -> Result<ImportSummary> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .delimiter(self.config().csv_delimiter_byte()?)
            .from_path(path)?;
        let headers = reader.headers()?.clone();

        let mut targets: Vec<(usize, &'static ColumnDefinition)> = Vec::new();
        for (index, field) in headers.iter().enumerate() {
            let field = field.trim();
            let column = match mapping {
                Some(mapping) => match mapping.column_for(field) {
                    Some(column) => column,
                    None => continue,
                },
                None => field,
            };
            targets.push((index, column_of(table, column)?));
        }
        if targets.is_empty() {
            return Err(StoreError::validation(format!(
                "{} has no columns to import into {table}",
                path.display()
            )));
        }

        let summary = self.transaction(|tx| {
            let mut summary = ImportSummary::default();
            for (index, record) in reader.records().enumerate() {
                let row = index + 1;
                let inserted = record.map_err(StoreError::from).and_then(|record| {
                    let mut create = CreateOperation::new(table);
                    for (position, column) in &targets {
                        let cell = record.get(*position).unwrap_or_default();
                        let value = if cell.is_empty() {
                            Value::Null
                        } else {
                            coerce(table, column, Value::from(cell))?
                        };
                        create.data.push((column.name.clone(), value));
                    }
                    run_crud(tx, &CrudOperation::Create(create))
                });
                match inserted {
                    Ok(_) => summary.inserted += 1,
                    Err(err) => {
                        warn!(%table, row, error = %err, "skipping csv row");
                        summary.skipped += 1;
                    }
                }
            }
            Ok(summary)
        })?;

        info!(
            %table,
            path = %path.display(),
            inserted = summary.inserted,
            skipped = summary.skipped,
            "csv import finished"
        );
        Ok(summary)
    }

    /// Insert the objects of a JSON file (an array of objects or one object)
    /// into `table`. Nothing is kept if any object fails.
    pub fn import_json(&self, path: &Path, table: Table) -> Result<ImportSummary> {
        let document: serde_json::Value =
            serde_json::from_reader(BufReader::new(File::open(path)?))?;
        let objects = match &document {
            serde_json::Value::Array(items) => items
                .iter()
                .enumerate()
                .map(|(i, item)| {
                    item.as_object().ok_or_else(|| {
                        StoreError::validation(format!("item {} is not a JSON object", i + 1))
                    })
                })
                .collect::<Result<Vec<_>>>()?,
            serde_json::Value::Object(object) => vec![object],
            _ => {
                return Err(StoreError::validation(
                    "expected a JSON object or an array of objects",
                ))
            }
        };

        let inserted = self
            .transaction(|tx| {
                for (i, object) in objects.iter().enumerate() {
                    let mut create = CreateOperation::new(table);
                    for (key, json) in object.iter() {
                        let column = column_of(table, key)?;
                        let value = coerce(table, column, Value::from_json(json))?;
                        create.data.push((key.clone(), value));
                    }
                    run_crud(tx, &CrudOperation::Create(create))
                        .inspect_err(|err| warn!(%table, item = i + 1, error = %err, "json item rejected"))?;
                }
                Ok(objects.len())
            })
            .inspect_err(|_| warn!(%table, path = %path.display(), "json import rolled back"))?;

        info!(%table, path = %path.display(), inserted, "json import finished");
        Ok(ImportSummary {
            inserted,
            skipped: 0,
        })
    }

    /// Write all rows of `table`, ordered by primary key, to a CSV file.
    /// Returns the number of data rows written.
    pub fn export_table_csv(&self, table: Table, path: &Path, delimiter: u8) -> Result<usize> {
        let mut read = ReadOperation::all(table);
        read.order_by = Some(vec![(table.primary_key().to_string(), true)]);
        let rows = match self.execute_crud(&CrudOperation::Read(read))? {
            ExecOutcome::Rows(rows) => rows,
            other => {
                return Err(StoreError::validation(format!(
                    "unexpected read outcome {other:?}"
                )))
            }
        };
        if rows.is_empty() {
            warn!(%table, "table is empty, nothing exported");
            return Ok(0);
        }

        let mut writer = csv::WriterBuilder::new()
            .delimiter(delimiter)
            .from_path(path)?;
        writer.write_record(&rows.columns)?;
        for row in &rows.rows {
            writer.write_record(row.iter().map(Value::to_string))?;
        }
        writer.flush()?;

        info!(%table, path = %path.display(), rows = rows.len(), "csv export finished");
        Ok(rows.len())
    }

    /// Run a read-only query and write its rows to `path` as a pretty JSON
    /// array. Returns the number of rows written.
    pub fn export_query_json(&self, query: &SqlQuery, path: &Path) -> Result<usize> {
        let rows = self.with_conn(|conn| select(conn, query))?;
        let mut out = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(&mut out, &rows.to_json_rows())?;
        out.write_all(b"\n")?;
        out.flush()?;

        info!(path = %path.display(), rows = rows.len(), "json export finished");
        Ok(rows.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mapping_lookup() {
        let mapping: ColumnMapping = [("Product Name", "name"), ("Cost", "price")]
            .into_iter()
            .collect();
        assert_eq!(mapping.column_for("Cost"), Some("price"));
        assert_eq!(mapping.column_for("SKU"), None);
        assert_eq!(ColumnMapping::new().map("a", "b").column_for("a"), Some("b"));
    }

    #[test]
    fn test_coerce_numeric_text() {
        let products = Table::Products.definition();
        let price = products.find_column("price").unwrap();
        let stock = products.find_column("stock_quantity").unwrap();
        let name = products.find_column("name").unwrap();

        assert_eq!(
            coerce(Table::Products, price, Value::from(" 19.5 ")).unwrap(),
            Value::Real(19.5)
        );
        assert_eq!(
            coerce(Table::Products, stock, Value::from("7")).unwrap(),
            Value::Integer(7)
        );
        assert!(matches!(
            coerce(Table::Products, stock, Value::from("seven")),
            Err(StoreError::Validation(_))
        ));
        assert_eq!(
            coerce(Table::Products, name, Value::from("42")).unwrap(),
            Value::from("42")
        );
        assert_eq!(
            coerce(Table::Products, stock, Value::Integer(3)).unwrap(),
            Value::Integer(3)
        );
        assert_eq!(
            coerce(Table::Products, stock, Value::Real(4.0)).unwrap(),
            Value::Integer(4)
        );
        assert!(matches!(
            coerce(Table::Products, stock, Value::Real(2.5)),
            Err(StoreError::Validation(_))
        ));
        assert!(coerce(Table::Products, price, Value::from("NaN")).is_err());
    }

    #[test]
    fn test_coerce_datetime_text() {
        let order_date = Table::Orders.definition().find_column("order_date").unwrap();
        let normalized = |raw: &str| coerce(Table::Orders, order_date, Value::from(raw)).unwrap();

        assert_eq!(normalized("2024-03-05"), Value::from("2024-03-05 00:00:00"));
        assert_eq!(normalized("2024-03-05T14:30:00"), Value::from("2024-03-05 14:30:00"));
        assert_eq!(
            normalized(" 2024-03-05 14:30:00.250 "),
            Value::from("2024-03-05 14:30:00.250")
        );
        assert!(matches!(
            coerce(Table::Orders, order_date, Value::from("05/03/2024")),
            Err(StoreError::Validation(_))
        ));
        assert!(coerce(Table::Orders, order_date, Value::Integer(1_709_600_000)).is_err());
        assert_eq!(
            coerce(Table::Orders, order_date, Value::Null).unwrap(),
            Value::Null
        );
    }
}
