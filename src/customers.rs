//! Customer records.

use crate::catalog::page_offset;
use crate::error::{Result, StoreError};
use crate::models::{Customer, CustomerUpdate, NewCustomer, Page};
use crate::sqlite::{Database, Value};
use rusqlite::{params, params_from_iter, OptionalExtension, Row};
use tracing::{info, warn};

const CUSTOMER_SELECT: &str = "SELECT customer_id, first_name, last_name, email, phone, registration_date FROM customers";

fn customer_from_row(row: &Row<'_>) -> rusqlite::Result<Customer> {
    Ok(Customer {
        customer_id: row.get(0)?,
        first_name: row.get(1)?,
        last_name: row.get(2)?,
        email: row.get(3)?,
        phone: row.get(4)?,
        registration_date: row.get(5)?,
    })
}

fn normalize_email(email: &str) -> Result<String> {
    let email = email.trim();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(email.to_string()),
        _ => Err(StoreError::validation(format!("invalid email address '{email}'"))),
    }
}

fn require(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(StoreError::validation(format!("{field} is required")));
    }
    Ok(())
}

impl Database {
    pub fn create_customer(&self, customer: &NewCustomer) -> Result<i64> {
        require("first_name", &customer.first_name)?;
        require("last_name", &customer.last_name)?;
        let email = normalize_email(&customer.email)?;
        let customer_id = self
            .with_conn(|conn| {
                conn.execute(
                    "INSERT INTO customers (first_name, last_name, email, phone) VALUES (?1, ?2, ?3, ?4)",
                    params![customer.first_name, customer.last_name, email, customer.phone],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .inspect_err(|err| warn!(email = %email, error = %err, "failed to create customer"))?;
        info!(customer_id, "customer created");
        Ok(customer_id)
    }

    pub fn get_customer(&self, customer_id: i64) -> Result<Customer> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("{CUSTOMER_SELECT} WHERE customer_id = ?1"),
                params![customer_id],
                customer_from_row,
            )
            .optional()?
            .ok_or_else(|| StoreError::not_found("customer", customer_id))
        })
    }

    pub fn find_customer_by_email(&self, email: &str) -> Result<Option<Customer>> {
        self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    &format!("{CUSTOMER_SELECT} WHERE email = ?1"),
                    params![email.trim()],
                    customer_from_row,
                )
                .optional()?)
        })
    }

    /// Customers ordered by id.
    pub fn list_customers(&self, page: u32, per_page: u32) -> Result<Page<Customer>> {
        let offset = page_offset(page, per_page)?;
        let (items, total) = self.with_conn(|conn| {
            let total: i64 = conn.query_row("SELECT COUNT(*) FROM customers", [], |row| row.get(0))?;
            let mut stmt =
                conn.prepare(&format!("{CUSTOMER_SELECT} ORDER BY customer_id LIMIT ?1 OFFSET ?2"))?;
            let items = stmt
                .query_map(params![per_page, offset], customer_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok((items, total))
        })?;
        Ok(Page {
            items,
            page,
            per_page,
            total: total.max(0) as u64,
        })
    }

    /// Returns `false` when `update` sets nothing.
    pub fn update_customer(&self, customer_id: i64, update: &CustomerUpdate) -> Result<bool> {
        if update.is_empty() {
            warn!(customer_id, "no fields to update");
            return Ok(false);
        }
        let mut assignments: Vec<&str> = Vec::new();
        let mut values: Vec<Value> = Vec::new();
        if let Some(first_name) = &update.first_name {
            require("first_name", first_name)?;
            assignments.push("first_name = ?");
            values.push(first_name.as_str().into());
        }
        if let Some(last_name) = &update.last_name {
            require("last_name", last_name)?;
            assignments.push("last_name = ?");
            values.push(last_name.as_str().into());
        }
        if let Some(email) = &update.email {
            assignments.push("email = ?");
            values.push(normalize_email(email)?.into());
        }
        if let Some(phone) = &update.phone {
            assignments.push("phone = ?");
            values.push(phone.as_str().into());
        }
        values.push(customer_id.into());

        let affected = self.with_conn(|conn| {
            Ok(conn.execute(
                &format!(
                    "UPDATE customers SET {} WHERE customer_id = ?",
                    assignments.join(", ")
                ),
                params_from_iter(values.iter()),
            )?)
        })?;
        if affected == 0 {
            return Err(StoreError::not_found("customer", customer_id));
        }
        info!(customer_id, "customer updated");
        Ok(true)
    }

    /// Deletes the customer together with their orders.
    pub fn delete_customer(&self, customer_id: i64) -> Result<()> {
        let affected = self.with_conn(|conn| {
            Ok(conn.execute(
                "DELETE FROM customers WHERE customer_id = ?1",
                params![customer_id],
            )?)
        })?;
        if affected == 0 {
            return Err(StoreError::not_found("customer", customer_id));
        }
        info!(customer_id, "customer deleted");
        Ok(())
    }
}
