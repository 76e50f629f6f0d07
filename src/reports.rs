//! Aggregate sales queries. Cancelled orders never count as sales.

use crate::error::Result;
use crate::models::{CategorySales, CustomerOrderSummary, PopularProduct};
use crate::sqlite::{Database, Value};
use chrono::{Days, NaiveDate};
use rusqlite::{params, params_from_iter};
use tracing::info;

/// Lower bound on `order_date` text for the start of `day`.
fn day_start(day: NaiveDate) -> String {
    format!("{} 00:00:00", day.format("%Y-%m-%d"))
}

impl Database {
    /// Revenue per category between two calendar days (both inclusive),
    /// highest revenue first.
    pub fn sales_report(
        &self,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<Vec<CategorySales>> {
        let mut sql = String::from(
            r#"
            SELECT c.category_id,
                   c.name,
                   COUNT(oi.order_item_id),
                   SUM(oi.quantity),
                   ROUND(SUM(oi.subtotal), 2),
                   AVG(oi.unit_price),
                   MAX(oi.unit_price),
                   MIN(oi.unit_price)
            FROM order_items oi
            JOIN products p ON oi.product_id = p.product_id
            JOIN categories c ON p.category_id = c.category_id
            JOIN orders o ON oi.order_id = o.order_id
            WHERE o.status != 'cancelled'
            "#,
        );
        let mut values: Vec<Value> = Vec::new();
        if let Some(start) = start {
            sql.push_str(" AND o.order_date >= ?");
            values.push(day_start(start).into());
        }
        if let Some(end) = end {
            // Inclusive end day: everything before the following midnight.
            if let Some(next) = end.checked_add_days(Days::new(1)) {
                sql.push_str(" AND o.order_date < ?");
                values.push(day_start(next).into());
            }
        }
        sql.push_str(" GROUP BY c.category_id, c.name ORDER BY SUM(oi.subtotal) DESC, c.category_id");

        let report = self.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params_from_iter(values.iter()), |row| {
                    Ok(CategorySales {
                        category_id: row.get(0)?,
                        category_name: row.get(1)?,
                        items_sold: row.get(2)?,
                        total_quantity: row.get(3)?,
                        total_revenue: row.get(4)?,
                        avg_price: row.get(5)?,
                        max_price: row.get(6)?,
                        min_price: row.get(7)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })?;
        info!(categories = report.len(), "sales report generated");
        Ok(report)
    }

    /// Every order of a customer with its item count and product names,
    /// newest first.
    pub fn customer_orders(&self, customer_id: i64) -> Result<Vec<CustomerOrderSummary>> {
        let orders = self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                r#"
                SELECT o.order_id,
                       o.order_date,
                       o.status,
                       o.total_amount,
                       (SELECT COUNT(*) FROM order_items i WHERE i.order_id = o.order_id),
                       json_group_array(p.name) FILTER (WHERE p.name IS NOT NULL)
                FROM orders o
                LEFT JOIN order_items oi ON o.order_id = oi.order_id
                LEFT JOIN products p ON oi.product_id = p.product_id
                WHERE o.customer_id = ?1
                GROUP BY o.order_id
                ORDER BY o.order_date DESC, o.order_id DESC
                "#,
            )?;
            let rows = stmt
                .query_map(params![customer_id], |row| {
                    let names: String = row.get(5)?;
                    let product_names: Vec<String> = serde_json::from_str(&names).map_err(|e| {
                        rusqlite::Error::FromSqlConversionFailure(
                            5,
                            rusqlite::types::Type::Text,
                            Box::new(e),
                        )
                    })?;
                    Ok(CustomerOrderSummary {
                        order_id: row.get(0)?,
                        order_date: row.get(1)?,
                        status: row.get(2)?,
                        total_amount: row.get(3)?,
                        item_count: row.get(4)?,
                        product_names,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })?;
        info!(customer_id, orders = orders.len(), "customer orders fetched");
        Ok(orders)
    }

    /// Products ranked by units sold, then revenue. Products never sold
    /// appear with zero totals.
    pub fn popular_products(&self, limit: u32) -> Result<Vec<PopularProduct>> {
        let products = self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                r#"
                WITH sold AS (
                    SELECT oi.product_id,
                           SUM(oi.quantity) AS total_sold,
                           ROUND(SUM(oi.subtotal), 2) AS total_revenue
                    FROM order_items oi
                    JOIN orders o ON oi.order_id = o.order_id
                    WHERE o.status != 'cancelled'
                    GROUP BY oi.product_id
                )
                SELECT p.product_id,
                       p.name,
                       p.price,
                       c.name,
                       COALESCE(s.total_sold, 0),
                       COALESCE(s.total_revenue, 0.0)
                FROM products p
                LEFT JOIN sold s ON s.product_id = p.product_id
                LEFT JOIN categories c ON p.category_id = c.category_id
                ORDER BY 5 DESC, 6 DESC, p.product_id
                LIMIT ?1
                "#,
            )?;
            let rows = stmt
                .query_map(params![limit], |row| {
                    Ok(PopularProduct {
                        product_id: row.get(0)?,
                        name: row.get(1)?,
                        price: row.get(2)?,
                        category_name: row.get(3)?,
                        total_sold: row.get(4)?,
                        total_revenue: row.get(5)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })?;
        info!(count = products.len(), "popular products fetched");
        Ok(products)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_day_start_format() {
        let day = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        assert_eq!(day_start(day), "2024-03-09 00:00:00");
    }
}
