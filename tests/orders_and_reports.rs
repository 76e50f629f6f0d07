use chrono::{NaiveDate, NaiveDateTime};
use shop_sqlite::{
    Database, NewCustomer, NewOrder, NewOrderItem, NewProduct, OrderStatus, Result, StoreError,
};

struct Shop {
    db: Database,
    phone: i64,
    book: i64,
    novel: i64,
    customer: i64,
}

// Helper function to create an in-memory database with a small catalog
fn create_test_shop() -> Result<Shop> {
    let db = Database::open_in_memory()?;
    let electronics = db.create_category("Electronics", "")?;
    let books = db.create_category("Books", "")?;
    let phone = db.create_product(&NewProduct::new("Phone", 500.0, electronics).with_stock(5))?;
    let book = db.create_product(&NewProduct::new("Atlas", 30.0, books).with_stock(10))?;
    let novel = db.create_product(&NewProduct::new("Novel", 12.5, books).with_stock(10))?;
    let customer = db.create_customer(&NewCustomer::new("Ann", "Lee", "ann@example.com"))?;
    Ok(Shop {
        db,
        phone,
        book,
        novel,
        customer,
    })
}

fn at(year: i32, month: u32, day: u32, hour: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|d| d.and_hms_opt(hour, 0, 0))
        .unwrap()
}

fn day(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}

#[test]
fn test_create_order_prices_items_and_reserves_stock() {
    test_create_order_prices_items_and_reserves_stock_impl().unwrap();
}

fn test_create_order_prices_items_and_reserves_stock_impl() -> Result<()> {
    let shop = create_test_shop()?;
    let mut discounted = NewOrderItem::new(shop.book, 3);
    discounted.unit_price = Some(25.0);
    let order_id = shop.db.create_order(&NewOrder::new(
        shop.customer,
        vec![NewOrderItem::new(shop.phone, 2), discounted],
    ))?;

    let order = shop.db.get_order(order_id)?;
    assert_eq!(order.order.status, OrderStatus::Pending);
    assert_eq!(order.order.total_amount, 1075.0);
    assert_eq!(order.items.len(), 2);
    assert_eq!(order.items[0].unit_price, 500.0);
    assert_eq!(order.items[0].subtotal, 1000.0);
    assert_eq!(order.items[1].subtotal, 75.0);

    assert_eq!(shop.db.get_product(shop.phone)?.stock_quantity, 3);
    assert_eq!(shop.db.get_product(shop.book)?.stock_quantity, 7);
    Ok(())
}

#[test]
fn test_failed_order_changes_nothing() {
    test_failed_order_changes_nothing_impl().unwrap();
}

fn test_failed_order_changes_nothing_impl() -> Result<()> {
    let shop = create_test_shop()?;

    let err = shop
        .db
        .create_order(&NewOrder::new(
            shop.customer,
            vec![NewOrderItem::new(shop.book, 2), NewOrderItem::new(shop.phone, 6)],
        ))
        .unwrap_err();
    assert!(matches!(err, StoreError::Validation(ref msg) if msg.contains("insufficient stock")));
    assert_eq!(shop.db.get_product(shop.book)?.stock_quantity, 10);
    assert!(shop.db.list_orders(shop.customer)?.is_empty());

    assert!(matches!(
        shop.db
            .create_order(&NewOrder::new(4242, vec![NewOrderItem::new(shop.book, 1)])),
        Err(StoreError::NotFound { entity: "customer", .. })
    ));
    assert!(matches!(
        shop.db
            .create_order(&NewOrder::new(shop.customer, vec![NewOrderItem::new(4242, 1)])),
        Err(StoreError::NotFound { entity: "product", .. })
    ));
    assert!(matches!(
        shop.db.create_order(&NewOrder::new(shop.customer, Vec::new())),
        Err(StoreError::Validation(_))
    ));
    assert!(matches!(
        shop.db
            .create_order(&NewOrder::new(shop.customer, vec![NewOrderItem::new(shop.book, 0)])),
        Err(StoreError::Validation(_))
    ));
    assert!(shop.db.list_orders(shop.customer)?.is_empty());
    Ok(())
}

#[test]
fn test_order_status_and_deletion() {
    test_order_status_and_deletion_impl().unwrap();
}

fn test_order_status_and_deletion_impl() -> Result<()> {
    let shop = create_test_shop()?;
    let older = shop.db.create_order(
        &NewOrder::new(shop.customer, vec![NewOrderItem::new(shop.book, 1)])
            .placed_at(at(2024, 1, 5, 9)),
    )?;
    let newer = shop.db.create_order(
        &NewOrder::new(shop.customer, vec![NewOrderItem::new(shop.novel, 1)])
            .placed_at(at(2024, 2, 5, 9)),
    )?;

    let ids: Vec<i64> = shop
        .db
        .list_orders(shop.customer)?
        .iter()
        .map(|o| o.order_id)
        .collect();
    assert_eq!(ids, vec![newer, older]);

    shop.db.update_order_status(older, OrderStatus::Shipped)?;
    assert_eq!(shop.db.get_order(older)?.order.status, OrderStatus::Shipped);
    assert!(matches!(
        shop.db.update_order_status(4242, OrderStatus::Shipped),
        Err(StoreError::NotFound { entity: "order", .. })
    ));

    // Totals drift when items are edited by hand; recalculation repairs them.
    shop.db.with_conn(|conn| {
        conn.execute(
            "UPDATE order_items SET quantity = 4 WHERE order_id = ?1",
            [older],
        )?;
        Ok(())
    })?;
    assert_eq!(shop.db.recalculate_order_total(older)?, 120.0);
    assert_eq!(shop.db.get_order(older)?.order.total_amount, 120.0);

    shop.db.delete_order(newer)?;
    assert!(matches!(
        shop.db.get_order(newer),
        Err(StoreError::NotFound { .. })
    ));

    // Deleting the customer cascades to the remaining order.
    shop.db.delete_customer(shop.customer)?;
    assert!(matches!(
        shop.db.get_order(older),
        Err(StoreError::NotFound { .. })
    ));
    Ok(())
}

#[test]
fn test_sales_report_date_range_and_cancellations() {
    test_sales_report_date_range_and_cancellations_impl().unwrap();
}

fn test_sales_report_date_range_and_cancellations_impl() -> Result<()> {
    let shop = create_test_shop()?;
    shop.db.create_order(
        &NewOrder::new(
            shop.customer,
            vec![NewOrderItem::new(shop.book, 2), NewOrderItem::new(shop.novel, 2)],
        )
        .placed_at(at(2024, 3, 1, 0)),
    )?;
    shop.db.create_order(
        &NewOrder::new(shop.customer, vec![NewOrderItem::new(shop.phone, 1)])
            .placed_at(at(2024, 3, 31, 23)),
    )?;
    shop.db.create_order(
        &NewOrder::new(shop.customer, vec![NewOrderItem::new(shop.phone, 1)])
            .placed_at(at(2024, 3, 15, 12))
            .with_status(OrderStatus::Cancelled),
    )?;
    shop.db.create_order(
        &NewOrder::new(shop.customer, vec![NewOrderItem::new(shop.novel, 1)])
            .placed_at(at(2024, 4, 1, 0)),
    )?;

    let march = shop.db.sales_report(Some(day(2024, 3, 1)), Some(day(2024, 3, 31)))?;
    assert_eq!(march.len(), 2);
    assert_eq!(march[0].category_name, "Electronics");
    assert_eq!(march[0].total_revenue, 500.0);
    assert_eq!(march[0].items_sold, 1);
    assert_eq!(march[1].category_name, "Books");
    assert_eq!(march[1].total_quantity, 4);
    assert_eq!(march[1].total_revenue, 85.0);
    assert_eq!(march[1].max_price, 30.0);
    assert_eq!(march[1].min_price, 12.5);

    let everything = shop.db.sales_report(None, None)?;
    let books = everything
        .iter()
        .find(|s| s.category_name == "Books")
        .unwrap();
    assert_eq!(books.total_quantity, 5);

    let april = shop.db.sales_report(Some(day(2024, 4, 1)), None)?;
    assert_eq!(april.len(), 1);
    assert_eq!(april[0].total_revenue, 12.5);

    assert!(shop
        .db
        .sales_report(Some(day(2025, 1, 1)), Some(day(2025, 1, 31)))?
        .is_empty());
    Ok(())
}

#[test]
fn test_popular_products_ignore_cancelled_orders() {
    test_popular_products_ignore_cancelled_orders_impl().unwrap();
}

fn test_popular_products_ignore_cancelled_orders_impl() -> Result<()> {
    let shop = create_test_shop()?;
    shop.db.create_order(&NewOrder::new(
        shop.customer,
        vec![NewOrderItem::new(shop.novel, 3), NewOrderItem::new(shop.book, 1)],
    ))?;
    shop.db.create_order(
        &NewOrder::new(shop.customer, vec![NewOrderItem::new(shop.phone, 4)])
            .with_status(OrderStatus::Cancelled),
    )?;

    let popular = shop.db.popular_products(10)?;
    assert_eq!(popular.len(), 3);
    assert_eq!(popular[0].product_id, shop.novel);
    assert_eq!(popular[0].total_sold, 3);
    assert_eq!(popular[0].total_revenue, 37.5);
    assert_eq!(popular[1].product_id, shop.book);
    assert_eq!(popular[2].product_id, shop.phone);
    assert_eq!(popular[2].total_sold, 0);

    assert_eq!(shop.db.popular_products(1)?.len(), 1);
    Ok(())
}

#[test]
fn test_customer_orders_summary() {
    test_customer_orders_summary_impl().unwrap();
}

fn test_customer_orders_summary_impl() -> Result<()> {
    let shop = create_test_shop()?;
    let first = shop.db.create_order(
        &NewOrder::new(shop.customer, vec![NewOrderItem::new(shop.phone, 1)])
            .placed_at(at(2024, 5, 1, 10)),
    )?;
    let second = shop.db.create_order(
        &NewOrder::new(
            shop.customer,
            vec![NewOrderItem::new(shop.book, 1), NewOrderItem::new(shop.novel, 2)],
        )
        .placed_at(at(2024, 5, 2, 10)),
    )?;

    let orders = shop.db.customer_orders(shop.customer)?;
    assert_eq!(orders.len(), 2);
    assert_eq!(orders[0].order_id, second);
    assert_eq!(orders[0].item_count, 2);
    let mut names = orders[0].product_names.clone();
    names.sort();
    assert_eq!(names, vec!["Atlas", "Novel"]);
    assert_eq!(orders[0].total_amount, 55.0);
    assert_eq!(orders[1].order_id, first);
    assert_eq!(orders[1].order_date, at(2024, 5, 1, 10));

    let stranger = shop
        .db
        .create_customer(&NewCustomer::new("Bob", "Stone", "bob@example.com"))?;
    assert!(shop.db.customer_orders(stranger)?.is_empty());
    Ok(())
}

#[test]
fn test_report_revenue_is_rounded_to_cents() {
    test_report_revenue_is_rounded_to_cents_impl().unwrap();
}

fn test_report_revenue_is_rounded_to_cents_impl() -> Result<()> {
    let shop = create_test_shop()?;
    let candy = shop.db.create_category("Candy", "")?;
    let mint = shop
        .db
        .create_product(&NewProduct::new("Mint", 0.1, candy).with_stock(10))?;
    // 3 * 0.1 is 0.30000000000000004 in binary floating point.
    shop.db
        .create_order(&NewOrder::new(shop.customer, vec![NewOrderItem::new(mint, 3)]))?;

    let report = shop.db.sales_report(None, None)?;
    let sweets = report.iter().find(|s| s.category_id == candy).unwrap();
    assert_eq!(sweets.total_revenue, 0.3);

    let popular = shop.db.popular_products(1)?;
    assert_eq!(popular[0].product_id, mint);
    assert_eq!(popular[0].total_revenue, 0.3);
    Ok(())
}
