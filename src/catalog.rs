//! Categories and products.

use crate::error::{Result, StoreError};
use crate::models::{Category, NewProduct, Page, Product, ProductFilter, ProductUpdate};
use crate::schema::Table;
use crate::sqlite::{Database, Value};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use tracing::{info, warn};

const PRODUCT_SELECT: &str = r#"
    SELECT p.product_id, p.name, p.description, p.price, p.stock_quantity,
           p.category_id, c.name AS category_name, p.created_at
    FROM products p
    LEFT JOIN categories c ON p.category_id = c.category_id
"#;

fn category_from_row(row: &Row<'_>) -> rusqlite::Result<Category> {
    Ok(Category {
        category_id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        created_at: row.get(3)?,
    })
}

fn product_from_row(row: &Row<'_>) -> rusqlite::Result<Product> {
    Ok(Product {
        product_id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        price: row.get(3)?,
        stock_quantity: row.get(4)?,
        category_id: row.get(5)?,
        category_name: row.get(6)?,
        created_at: row.get(7)?,
    })
}

/// Escape `%`, `_` and `\` so user text matches literally under `ESCAPE '\'`.
fn like_pattern(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len() + 2);
    escaped.push('%');
    for ch in text.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped.push('%');
    escaped
}

/// 1-based page to OFFSET.
pub(crate) fn page_offset(page: u32, per_page: u32) -> Result<i64> {
    if page == 0 {
        return Err(StoreError::validation("page numbers start at 1"));
    }
    if per_page == 0 {
        return Err(StoreError::validation("per_page must be greater than zero"));
    }
    Ok((i64::from(page) - 1) * i64::from(per_page))
}

fn validate_new_product(product: &NewProduct) -> Result<()> {
    if product.name.trim().is_empty() {
        return Err(StoreError::validation("product name is required"));
    }
    if !product.price.is_finite() || product.price < 0.0 {
        return Err(StoreError::validation(format!(
            "price must be a non-negative number, got {}",
            product.price
        )));
    }
    if product.stock_quantity < 0 {
        return Err(StoreError::validation("stock_quantity cannot be negative"));
    }
    Ok(())
}

fn insert_product(conn: &Connection, product: &NewProduct) -> Result<i64> {
    validate_new_product(product)?;
    let mut stmt = conn.prepare_cached(
        "INSERT INTO products (name, description, price, stock_quantity, category_id)
         VALUES (?1, ?2, ?3, ?4, ?5)",
    )?;
    Ok(stmt.insert(params![
        product.name,
        product.description,
        product.price,
        product.stock_quantity,
        product.category_id,
    ])?)
}

impl Database {
    pub fn create_category(&self, name: &str, description: &str) -> Result<i64> {
        if name.trim().is_empty() {
            return Err(StoreError::validation("category name is required"));
        }
        let result = self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO categories (name, description) VALUES (?1, ?2)",
                params![name, description],
            )?;
            Ok(conn.last_insert_rowid())
        });
        match &result {
            Ok(id) => info!(category_id = id, name, "category created"),
            Err(err) if err.is_constraint() => {
                warn!(name, "category with this name already exists")
            }
            Err(err) => warn!(name, error = %err, "failed to create category"),
        }
        result
    }

    pub fn get_category(&self, category_id: i64) -> Result<Category> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT category_id, name, description, created_at FROM categories WHERE category_id = ?1",
                params![category_id],
                category_from_row,
            )
            .optional()?
            .ok_or_else(|| StoreError::not_found("category", category_id))
        })
    }

    pub fn list_categories(&self) -> Result<Vec<Category>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT category_id, name, description, created_at FROM categories ORDER BY name",
            )?;
            let categories = stmt
                .query_map([], category_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(categories)
        })
    }

    pub fn update_category(&self, category_id: i64, name: &str, description: &str) -> Result<()> {
        let affected = self.with_conn(|conn| {
            Ok(conn.execute(
                "UPDATE categories SET name = ?1, description = ?2 WHERE category_id = ?3",
                params![name, description, category_id],
            )?)
        })?;
        if affected == 0 {
            return Err(StoreError::not_found("category", category_id));
        }
        info!(category_id, "category updated");
        Ok(())
    }

    /// Products of the category keep existing with no category.
    pub fn delete_category(&self, category_id: i64) -> Result<()> {
        let affected = self.with_conn(|conn| {
            Ok(conn.execute(
                "DELETE FROM categories WHERE category_id = ?1",
                params![category_id],
            )?)
        })?;
        if affected == 0 {
            return Err(StoreError::not_found("category", category_id));
        }
        info!(category_id, "category deleted");
        Ok(())
    }

    pub fn create_product(&self, product: &NewProduct) -> Result<i64> {
        let product_id = self
            .with_conn(|conn| insert_product(conn, product))
            .inspect_err(|err| warn!(name = %product.name, error = %err, "failed to create product"))?;
        info!(product_id, name = %product.name, "product created");
        Ok(product_id)
    }

    /// Insert every product or none of them.
    pub fn batch_create_products(&self, products: &[NewProduct]) -> Result<usize> {
        self.transaction(|tx| {
            for (index, product) in products.iter().enumerate() {
                insert_product(tx, product).inspect_err(|err| {
                    warn!(index, name = %product.name, error = %err, "batch insert failed, rolling back")
                })?;
            }
            Ok(())
        })?;
        info!(count = products.len(), "products created in batch");
        Ok(products.len())
    }

    pub fn get_product(&self, product_id: i64) -> Result<Product> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("{PRODUCT_SELECT} WHERE p.product_id = ?1"),
                params![product_id],
                product_from_row,
            )
            .optional()?
            .ok_or_else(|| StoreError::not_found("product", product_id))
        })
    }

    /// Filtered products, newest first.
    pub fn get_products(
        &self,
        filter: &ProductFilter,
        page: u32,
        per_page: u32,
    ) -> Result<Page<Product>> {
        let offset = page_offset(page, per_page)?;

        let mut clauses: Vec<&str> = Vec::new();
        let mut values: Vec<Value> = Vec::new();
        if let Some(category_id) = filter.category_id {
            clauses.push("p.category_id = ?");
            values.push(category_id.into());
        }
        if let Some(min) = filter.min_price {
            clauses.push("p.price >= ?");
            values.push(min.into());
        }
        if let Some(max) = filter.max_price {
            clauses.push("p.price <= ?");
            values.push(max.into());
        }
        if let Some(search) = filter.search.as_deref().filter(|s| !s.is_empty()) {
            clauses.push(r"(p.name LIKE ? ESCAPE '\' OR p.description LIKE ? ESCAPE '\')");
            let pattern = like_pattern(search);
            values.push(pattern.clone().into());
            values.push(pattern.into());
        }
        let where_clause = if clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", clauses.join(" AND "))
        };

        let (items, total) = self.with_conn(|conn| {
            let total: i64 = conn.query_row(
                &format!("SELECT COUNT(*) FROM products p{where_clause}"),
                params_from_iter(values.iter()),
                |row| row.get(0),
            )?;

            let sql = format!(
                "{PRODUCT_SELECT}{where_clause} ORDER BY p.created_at DESC, p.product_id DESC LIMIT ? OFFSET ?"
            );
            let mut stmt = conn.prepare(&sql)?;
            let paged = values
                .iter()
                .cloned()
                .chain([Value::from(i64::from(per_page)), Value::from(offset)]);
            let items = stmt
                .query_map(params_from_iter(paged), product_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok((items, total))
        })?;

        info!(count = items.len(), page, total, "products fetched");
        Ok(Page {
            items,
            page,
            per_page,
            total: total.max(0) as u64,
        })
    }

    /// Returns `false` when `update` sets nothing.
    pub fn update_product(&self, product_id: i64, update: &ProductUpdate) -> Result<bool> {
        if update.is_empty() {
            warn!(product_id, "no fields to update");
            return Ok(false);
        }
        if let Some(price) = update.price {
            if !price.is_finite() || price < 0.0 {
                return Err(StoreError::validation("price must be a non-negative number"));
            }
        }

        let mut assignments: Vec<&str> = Vec::new();
        let mut values: Vec<Value> = Vec::new();
        if let Some(name) = &update.name {
            assignments.push("name = ?");
            values.push(name.as_str().into());
        }
        if let Some(description) = &update.description {
            assignments.push("description = ?");
            values.push(description.as_str().into());
        }
        if let Some(price) = update.price {
            assignments.push("price = ?");
            values.push(price.into());
        }
        if let Some(stock) = update.stock_quantity {
            assignments.push("stock_quantity = ?");
            values.push(stock.into());
        }
        if let Some(category_id) = update.category_id {
            assignments.push("category_id = ?");
            values.push(category_id.into());
        }
        values.push(product_id.into());

        let affected = self.with_conn(|conn| {
            Ok(conn.execute(
                &format!(
                    "UPDATE products SET {} WHERE product_id = ?",
                    assignments.join(", ")
                ),
                params_from_iter(values.iter()),
            )?)
        })?;
        if affected == 0 {
            warn!(product_id, "product not found");
            return Err(StoreError::not_found("product", product_id));
        }
        info!(product_id, "product updated");
        Ok(true)
    }

    /// Scale every price in a category by `increase_percent`, rounded to cents.
    pub fn bulk_update_prices(&self, category_id: i64, increase_percent: f64) -> Result<usize> {
        if !increase_percent.is_finite() || increase_percent < -100.0 {
            return Err(StoreError::validation(format!(
                "price change of {increase_percent}% would make prices negative"
            )));
        }
        let affected = self.transaction(|tx| {
            Ok(tx.execute(
                "UPDATE products SET price = ROUND(price * (1 + ?1 / 100.0), 2) WHERE category_id = ?2",
                params![increase_percent, category_id],
            )?)
        })?;
        info!(category_id, increase_percent, affected, "prices updated");
        Ok(affected)
    }

    /// Refused while any order item references the product.
    pub fn delete_product(&self, product_id: i64) -> Result<()> {
        self.transaction(|tx| {
            let order_count: i64 = tx.query_row(
                "SELECT COUNT(*) FROM order_items WHERE product_id = ?1",
                params![product_id],
                |row| row.get(0),
            )?;
            if order_count > 0 {
                warn!(product_id, order_count, "product has orders, not deleting");
                return Err(StoreError::Conflict(format!(
                    "product {product_id} is referenced by {order_count} order item(s)"
                )));
            }
            let affected = tx.execute("DELETE FROM products WHERE product_id = ?1", params![product_id])?;
            if affected == 0 {
                return Err(StoreError::not_found("product", product_id));
            }
            Ok(())
        })?;
        info!(product_id, "product deleted");
        Ok(())
    }

    /// Delete every row of `table` and reset its AUTOINCREMENT counter.
    pub fn truncate_table(&self, table: Table) -> Result<usize> {
        let removed = self
            .transaction(|tx| {
                let removed = tx.execute(&format!("DELETE FROM {table}"), [])?;
                tx.execute(
                    "DELETE FROM sqlite_sequence WHERE name = ?1",
                    params![table.as_str()],
                )?;
                Ok(removed)
            })
            .inspect_err(|err| warn!(%table, error = %err, "failed to truncate table"))?;
        info!(%table, removed, "table truncated");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("50%_off"), r"%50\%\_off%");
        assert_eq!(like_pattern(r"a\b"), r"%a\\b%");
    }

    #[test]
    fn test_page_offset() {
        assert_eq!(page_offset(1, 10).unwrap(), 0);
        assert_eq!(page_offset(3, 25).unwrap(), 50);
        assert!(page_offset(0, 10).is_err());
        assert!(page_offset(1, 0).is_err());
    }
}
