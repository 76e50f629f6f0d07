//! Orders and order items.

use crate::error::{Result, StoreError};
use crate::models::{NewOrder, Order, OrderItem, OrderStatus, OrderWithItems};
use crate::sqlite::Database;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{info, warn};

const ORDER_SELECT: &str =
    "SELECT order_id, customer_id, order_date, total_amount, status FROM orders";

fn order_from_row(row: &Row<'_>) -> rusqlite::Result<Order> {
    Ok(Order {
        order_id: row.get(0)?,
        customer_id: row.get(1)?,
        order_date: row.get(2)?,
        total_amount: row.get(3)?,
        status: row.get(4)?,
    })
}

fn item_from_row(row: &Row<'_>) -> rusqlite::Result<OrderItem> {
    Ok(OrderItem {
        order_item_id: row.get(0)?,
        order_id: row.get(1)?,
        product_id: row.get(2)?,
        quantity: row.get(3)?,
        unit_price: row.get(4)?,
        subtotal: row.get(5)?,
    })
}

/// Store the rounded sum of the order's subtotals as its total.
fn refresh_total(conn: &Connection, order_id: i64) -> Result<f64> {
    let total: f64 = conn.query_row(
        "SELECT ROUND(COALESCE(SUM(subtotal), 0), 2) FROM order_items WHERE order_id = ?1",
        params![order_id],
        |row| row.get(0),
    )?;
    let affected = conn.execute(
        "UPDATE orders SET total_amount = ?1 WHERE order_id = ?2",
        params![total, order_id],
    )?;
    if affected == 0 {
        return Err(StoreError::not_found("order", order_id));
    }
    Ok(total)
}

impl Database {
    /// Place an order: items are priced, stock is reserved and the total is
    /// stored, all in one transaction.
    pub fn create_order(&self, order: &NewOrder) -> Result<i64> {
        if order.items.is_empty() {
            return Err(StoreError::validation("an order needs at least one item"));
        }
        if let Some(item) = order.items.iter().find(|item| item.quantity <= 0) {
            return Err(StoreError::validation(format!(
                "quantity for product {} must be positive",
                item.product_id
            )));
        }

        let (order_id, total) = self
            .transaction(|tx| {
                let customer_exists = tx
                    .query_row(
                        "SELECT 1 FROM customers WHERE customer_id = ?1",
                        params![order.customer_id],
                        |_| Ok(()),
                    )
                    .optional()?
                    .is_some();
                if !customer_exists {
                    return Err(StoreError::not_found("customer", order.customer_id));
                }

                tx.execute(
                    "INSERT INTO orders (customer_id, order_date, status)
                     VALUES (?1, COALESCE(?2, CURRENT_TIMESTAMP), ?3)",
                    params![order.customer_id, order.order_date, order.status],
                )?;
                let order_id = tx.last_insert_rowid();

                for item in &order.items {
                    let (price, stock): (f64, i64) = tx
                        .query_row(
                            "SELECT price, stock_quantity FROM products WHERE product_id = ?1",
                            params![item.product_id],
                            |row| Ok((row.get(0)?, row.get(1)?)),
                        )
                        .optional()?
                        .ok_or_else(|| StoreError::not_found("product", item.product_id))?;
                    if stock < item.quantity {
                        return Err(StoreError::validation(format!(
                            "insufficient stock for product {}: {} requested, {} available",
                            item.product_id, item.quantity, stock
                        )));
                    }
                    let unit_price = item.unit_price.unwrap_or(price);
                    if !unit_price.is_finite() || unit_price < 0.0 {
                        return Err(StoreError::validation("unit_price must be a non-negative number"));
                    }
                    tx.execute(
                        "INSERT INTO order_items (order_id, product_id, quantity, unit_price)
                         VALUES (?1, ?2, ?3, ?4)",
                        params![order_id, item.product_id, item.quantity, unit_price],
                    )?;
                    tx.execute(
                        "UPDATE products SET stock_quantity = stock_quantity - ?1 WHERE product_id = ?2",
                        params![item.quantity, item.product_id],
                    )?;
                }

                let total = refresh_total(tx, order_id)?;
                Ok((order_id, total))
            })
            .inspect_err(|err| {
                warn!(customer_id = order.customer_id, error = %err, "failed to create order")
            })?;

        info!(order_id, customer_id = order.customer_id, total, "order created");
        Ok(order_id)
    }

    pub fn get_order(&self, order_id: i64) -> Result<OrderWithItems> {
        self.with_conn(|conn| {
            let order = conn
                .query_row(
                    &format!("{ORDER_SELECT} WHERE order_id = ?1"),
                    params![order_id],
                    order_from_row,
                )
                .optional()?
                .ok_or_else(|| StoreError::not_found("order", order_id))?;
            let mut stmt = conn.prepare(
                "SELECT order_item_id, order_id, product_id, quantity, unit_price, subtotal
                 FROM order_items WHERE order_id = ?1 ORDER BY order_item_id",
            )?;
            let items = stmt
                .query_map(params![order_id], item_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(OrderWithItems { order, items })
        })
    }

    /// A customer's orders, newest first.
    pub fn list_orders(&self, customer_id: i64) -> Result<Vec<Order>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "{ORDER_SELECT} WHERE customer_id = ?1 ORDER BY order_date DESC, order_id DESC"
            ))?;
            let orders = stmt
                .query_map(params![customer_id], order_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(orders)
        })
    }

    pub fn update_order_status(&self, order_id: i64, status: OrderStatus) -> Result<()> {
        let affected = self.with_conn(|conn| {
            Ok(conn.execute(
                "UPDATE orders SET status = ?1 WHERE order_id = ?2",
                params![status, order_id],
            )?)
        })?;
        if affected == 0 {
            return Err(StoreError::not_found("order", order_id));
        }
        info!(order_id, %status, "order status updated");
        Ok(())
    }

    /// Recompute `total_amount` from the order's items (e.g. after an import).
    pub fn recalculate_order_total(&self, order_id: i64) -> Result<f64> {
        let total = self.transaction(|tx| refresh_total(tx, order_id))?;
        info!(order_id, total, "order total recalculated");
        Ok(total)
    }

    pub fn delete_order(&self, order_id: i64) -> Result<()> {
        let affected = self.with_conn(|conn| {
            Ok(conn.execute("DELETE FROM orders WHERE order_id = ?1", params![order_id])?)
        })?;
        if affected == 0 {
            return Err(StoreError::not_found("order", order_id));
        }
        info!(order_id, "order deleted");
        Ok(())
    }
}
