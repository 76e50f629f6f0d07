//! `shop-db` command-line tool.
//!
//! Thin shell over the `shop_sqlite` library: every subcommand opens the
//! configured database, runs one operation and prints its result as JSON on
//! stdout. Logs go to stderr (and the configured log file).
//!
//! ```bash
//! shop-db --db shop.db demo --out ./exports
//! shop-db import-csv products products.csv --map "Product Name=name"
//! shop-db sales-report --from 2024-01-01 --to 2024-01-31
//! ```

use anyhow::{bail, Context};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::json;
use shop_sqlite::{
    config::delimiter_byte, logging, ColumnMapping, Database, NewCustomer, NewOrder,
    NewOrderItem, NewProduct, ProductFilter, ProductUpdate, SqlQuery, StoreConfig, Table,
};
use std::path::{Path, PathBuf};
use tracing::info;

const DEFAULT_CONFIG_FILE: &str = "shop-db.toml";

#[derive(Parser)]
#[command(name = "shop-db")]
#[command(about = "Manage the shop SQLite database")]
#[command(version)]
struct Cli {
    /// Path to the TOML configuration file (missing file means defaults)
    #[arg(long, env = "SHOP_CONFIG", default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Database file, overriding the configuration
    #[arg(long)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database file and apply the schema
    Init,

    /// Seed sample data into an empty database and exercise every feature
    Demo {
        /// Directory for the exported demo files
        #[arg(long, default_value = ".")]
        out: PathBuf,
    },

    /// Import rows from a CSV file with a header row
    ImportCsv {
        table: Table,
        file: PathBuf,
        /// Map a CSV header to a column, as FIELD=COLUMN (repeatable)
        #[arg(long = "map", value_parser = parse_mapping)]
        mappings: Vec<(String, String)>,
    },

    /// Import an array of JSON objects (or a single object)
    ImportJson { table: Table, file: PathBuf },

    /// Export a whole table to CSV
    ExportCsv {
        table: Table,
        file: PathBuf,
        /// Field delimiter (defaults to the configured one)
        #[arg(long)]
        delimiter: Option<char>,
    },

    /// Export the rows of a read-only query to JSON
    ExportJson {
        file: PathBuf,
        #[arg(long, default_value = "SELECT * FROM products")]
        query: String,
    },

    /// Revenue per category, optionally between two days (inclusive)
    SalesReport {
        #[arg(long)]
        from: Option<NaiveDate>,
        #[arg(long)]
        to: Option<NaiveDate>,
    },

    /// Best-selling products
    Popular {
        #[arg(long, default_value_t = 10)]
        limit: u32,
    },

    /// All orders of one customer
    CustomerOrders { customer_id: i64 },

    /// One page of products, newest first
    Products {
        #[arg(long)]
        category: Option<i64>,
        #[arg(long)]
        min_price: Option<f64>,
        #[arg(long)]
        max_price: Option<f64>,
        #[arg(long)]
        search: Option<String>,
        #[arg(long, default_value_t = 1)]
        page: u32,
        /// Defaults to the configured page size
        #[arg(long)]
        per_page: Option<u32>,
    },

    /// One page of customers
    Customers {
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long)]
        per_page: Option<u32>,
    },

    /// Size, row counts and indexes
    Stats,

    /// Run ANALYZE and VACUUM
    Optimize,

    /// Delete every row of a table
    Truncate {
        table: Table,
        /// Required confirmation
        #[arg(long)]
        yes: bool,
    },
}

fn parse_mapping(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((field, column)) if !field.trim().is_empty() && !column.trim().is_empty() => {
            Ok((field.trim().to_string(), column.trim().to_string()))
        }
        _ => Err(format!("expected FIELD=COLUMN, got '{raw}'")),
    }
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn load_config(cli: &Cli) -> anyhow::Result<StoreConfig> {
    let mut config = StoreConfig::load(&cli.config)
        .with_context(|| format!("failed to load config from {}", cli.config.display()))?
        .with_env_overrides();
    if let Some(db) = &cli.db {
        config = config.with_database_path(db);
    }
    Ok(config)
}

fn run_demo(db: &Database, out: &Path) -> anyhow::Result<serde_json::Value> {
    let stats = db.stats()?;
    if stats.table_counts.values().any(|count| *count > 0) {
        bail!(
            "demo needs an empty database, {} already has data",
            db.config().database_path.display()
        );
    }
    std::fs::create_dir_all(out)?;

    let electronics = db.create_category("Electronics", "Devices and gadgets")?;
    let books = db.create_category("Books", "Fiction and textbooks")?;
    db.batch_create_products(&[
        NewProduct::new("iPhone 13", 799.99, electronics).with_stock(10),
        NewProduct::new("Samsung Galaxy", 699.99, electronics).with_stock(15),
        NewProduct::new("War and Peace", 25.50, books).with_stock(50),
        NewProduct::new("Crime and Punishment", 20.00, books).with_stock(30),
    ])?;

    let page = db.get_products(&ProductFilter::default().category(electronics), 1, 10)?;
    let iphone = page
        .items
        .iter()
        .find(|p| p.name == "iPhone 13")
        .context("seeded product missing")?
        .product_id;
    db.update_product(
        iphone,
        &ProductUpdate {
            price: Some(749.99),
            stock_quantity: Some(8),
            ..Default::default()
        },
    )?;
    let repriced = db.bulk_update_prices(books, 10.0)?;

    let customer = db.create_customer(&NewCustomer::new("Ada", "Lovelace", "ada@example.com"))?;
    let books_page = db.get_products(&ProductFilter::default().category(books), 1, 10)?;
    let mut items = vec![NewOrderItem::new(iphone, 1)];
    items.extend(books_page.items.iter().map(|p| NewOrderItem::new(p.product_id, 2)));
    let order_id = db.create_order(&NewOrder::new(customer, items))?;

    let sales = db.sales_report(None, None)?;
    let popular = db.popular_products(3)?;

    let csv_rows = db.export_table_csv(
        Table::Products,
        &out.join("products_export.csv"),
        db.config().csv_delimiter_byte()?,
    )?;
    let json_rows = db.export_query_json(
        &SqlQuery::new("SELECT * FROM products WHERE price > 100"),
        &out.join("expensive_products.json"),
    )?;

    db.optimize()?;
    let stats = db.stats()?;

    Ok(json!({
        "electronics_products": page.total,
        "books_repriced": repriced,
        "order_id": order_id,
        "sales_report": sales,
        "popular_products": popular,
        "exported_csv_rows": csv_rows,
        "exported_json_rows": json_rows,
        "stats": stats,
    }))
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(&cli)?;
    logging::init(&config.logging)?;
    let db = Database::open(&config)
        .with_context(|| format!("failed to open {}", config.database_path.display()))?;

    match cli.command {
        Commands::Init => {
            info!(path = %config.database_path.display(), "database ready");
            print_json(&json!({ "database": config.database_path }))?;
        }
        Commands::Demo { out } => print_json(&run_demo(&db, &out)?)?,
        Commands::ImportCsv {
            table,
            file,
            mappings,
        } => {
            let mapping: Option<ColumnMapping> =
                (!mappings.is_empty()).then(|| mappings.into_iter().collect());
            print_json(&db.import_csv(&file, table, mapping.as_ref())?)?;
        }
        Commands::ImportJson { table, file } => print_json(&db.import_json(&file, table)?)?,
        Commands::ExportCsv {
            table,
            file,
            delimiter,
        } => {
            let delimiter = delimiter_byte(delimiter.unwrap_or(config.csv_delimiter))?;
            let rows = db.export_table_csv(table, &file, delimiter)?;
            print_json(&json!({ "table": table.as_str(), "rows": rows }))?;
        }
        Commands::ExportJson { file, query } => {
            let rows = db.export_query_json(&SqlQuery::new(&query), &file)?;
            print_json(&json!({ "file": file, "rows": rows }))?;
        }
        Commands::SalesReport { from, to } => print_json(&db.sales_report(from, to)?)?,
        Commands::Popular { limit } => print_json(&db.popular_products(limit)?)?,
        Commands::CustomerOrders { customer_id } => {
            print_json(&db.customer_orders(customer_id)?)?
        }
        Commands::Products {
            category,
            min_price,
            max_price,
            search,
            page,
            per_page,
        } => {
            let filter = ProductFilter {
                category_id: category,
                min_price,
                max_price,
                search,
            };
            let per_page = per_page.unwrap_or(config.default_page_size);
            print_json(&db.get_products(&filter, page, per_page)?)?;
        }
        Commands::Customers { page, per_page } => {
            let per_page = per_page.unwrap_or(config.default_page_size);
            print_json(&db.list_customers(page, per_page)?)?;
        }
        Commands::Stats => print_json(&db.stats()?)?,
        Commands::Optimize => {
            db.optimize()?;
            print_json(&json!({ "optimized": true }))?;
        }
        Commands::Truncate { table, yes } => {
            if !yes {
                bail!("refusing to truncate {table} without --yes");
            }
            let removed = db.truncate_table(table)?;
            print_json(&json!({ "table": table.as_str(), "removed": removed }))?;
        }
    }

    db.close()?;
    Ok(())
}

fn main() -> anyhow::Result<()> {
    run(Cli::parse())
}
