use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{HolderId, OrderId, ProductId};
use sqlx::{PgPool, Row, postgres::PgRow};

use crate::{
    CatalogStore, Order, OrderFilter, OrderLine, OrderStatus, OrderStore, PatchGuard, Product,
    Reservation, Result, Revision, StoreError, VersionedProduct,
};

fn malformed(message: impl Into<String>) -> StoreError {
    StoreError::Serialization(serde_json::Error::io(std::io::Error::other(message.into())))
}

/// PostgreSQL-backed catalog store.
///
/// Products are stored as one row per document with the reservation ledger in
/// a JSONB column; the `revision` column carries the optimistic-concurrency
/// token.
#[derive(Clone)]
pub struct PostgresCatalogStore {
    pool: PgPool,
}

impl PostgresCatalogStore {
    /// Creates a new PostgreSQL catalog store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    /// Splits a raw ledger array into typed entries and undecodable leftovers.
    ///
    /// Malformed entries are kept, not discarded: dropping them on a routine
    /// write could silently release a reservation that a human needs to look
    /// at first.
    fn decode_ledger(raw: serde_json::Value) -> (Vec<Reservation>, Vec<serde_json::Value>) {
        let entries = match raw {
            serde_json::Value::Array(entries) => entries,
            _ => return (Vec::new(), Vec::new()),
        };

        let mut typed = Vec::with_capacity(entries.len());
        let mut retained = Vec::new();
        for entry in entries {
            match serde_json::from_value::<Reservation>(entry.clone()) {
                Ok(reservation) => typed.push(reservation),
                Err(err) => {
                    tracing::warn!(error = %err, "retaining malformed reservation entry");
                    retained.push(entry);
                }
            }
        }
        (typed, retained)
    }

    fn row_to_product(row: &PgRow) -> Result<VersionedProduct> {
        let reservations_json: serde_json::Value = row.try_get("reservations")?;
        let (reservations, retained) = Self::decode_ledger(reservations_json);
        if !retained.is_empty() {
            metrics::counter!("ledger_malformed_entries_total").increment(retained.len() as u64);
        }

        let stock: i64 = row.try_get("stock")?;
        Ok(VersionedProduct {
            product: Product {
                id: ProductId::new(row.try_get::<String, _>("id")?),
                title: row.try_get("title")?,
                stock: u32::try_from(stock).unwrap_or(0),
                reservations,
            },
            revision: Revision::new(row.try_get("revision")?),
        })
    }
}

#[async_trait]
impl CatalogStore for PostgresCatalogStore {
    async fn fetch(&self, product_id: &ProductId) -> Result<Option<VersionedProduct>> {
        let row = sqlx::query(
            "SELECT id, title, stock, reservations, revision FROM products WHERE id = $1",
        )
        .bind(product_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| Self::row_to_product(&row)).transpose()
    }

    async fn put(&self, product: Product) -> Result<Revision> {
        let reservations = serde_json::to_value(&product.reservations)?;

        let revision: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO products (id, title, stock, reservations, revision)
            VALUES ($1, $2, $3, $4, 1)
            ON CONFLICT (id) DO UPDATE
            SET title = EXCLUDED.title,
                stock = EXCLUDED.stock,
                reservations = EXCLUDED.reservations,
                revision = products.revision + 1
            RETURNING revision
            "#,
        )
        .bind(product.id.as_str())
        .bind(&product.title)
        .bind(product.stock as i64)
        .bind(reservations)
        .fetch_one(&self.pool)
        .await?;

        Ok(Revision::new(revision))
    }

    async fn patch_reservations(
        &self,
        product_id: &ProductId,
        reservations: Vec<Reservation>,
        guard: PatchGuard,
    ) -> Result<Revision> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            "SELECT reservations, revision FROM products WHERE id = $1 FOR UPDATE",
        )
        .bind(product_id.as_str())
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| StoreError::ProductNotFound(product_id.clone()))?;

        let actual = Revision::new(row.try_get("revision")?);
        if let Some(expected) = guard.expected_revision
            && actual != expected
        {
            return Err(StoreError::RevisionConflict {
                product_id: product_id.clone(),
                expected,
                actual,
            });
        }

        // Carry undecodable entries over so a rewrite never loses them.
        let (_, retained) = Self::decode_ledger(row.try_get("reservations")?);
        let mut ledger = reservations
            .iter()
            .map(serde_json::to_value)
            .collect::<std::result::Result<Vec<_>, _>>()?;
        ledger.extend(retained);

        let new_revision: i64 = sqlx::query_scalar(
            r#"
            UPDATE products
            SET reservations = $2, revision = revision + 1
            WHERE id = $1
            RETURNING revision
            "#,
        )
        .bind(product_id.as_str())
        .bind(serde_json::Value::Array(ledger))
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Revision::new(new_revision))
    }

    async fn set_stock(&self, product_id: &ProductId, stock: u32) -> Result<Revision> {
        let revision: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE products
            SET stock = $2, revision = revision + 1
            WHERE id = $1
            RETURNING revision
            "#,
        )
        .bind(product_id.as_str())
        .bind(stock as i64)
        .fetch_optional(&self.pool)
        .await?;

        revision
            .map(Revision::new)
            .ok_or_else(|| StoreError::ProductNotFound(product_id.clone()))
    }

    async fn list_ids(&self) -> Result<Vec<ProductId>> {
        let rows = sqlx::query_scalar::<_, String>("SELECT id FROM products ORDER BY id")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(ProductId::new).collect())
    }
}

/// PostgreSQL-backed order store.
#[derive(Clone)]
pub struct PostgresOrderStore {
    pool: PgPool,
}

impl PostgresOrderStore {
    /// Creates a new PostgreSQL order store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_order(row: &PgRow) -> Result<Order> {
        let status_raw: String = row.try_get("status")?;
        let status = OrderStatus::parse(&status_raw)
            .ok_or_else(|| malformed(format!("unknown order status: {status_raw}")))?;

        let items: Vec<OrderLine> = serde_json::from_value(row.try_get("items")?)?;

        Ok(Order {
            order_id: OrderId::new(row.try_get::<String, _>("order_id")?),
            session_id: HolderId::new(row.try_get::<String, _>("session_id")?),
            status,
            items,
            created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        })
    }
}

#[async_trait]
impl OrderStore for PostgresOrderStore {
    async fn insert(&self, order: Order) -> Result<()> {
        let items = serde_json::to_value(&order.items)?;

        sqlx::query(
            r#"
            INSERT INTO orders (order_id, session_id, status, items, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(order.order_id.as_str())
        .bind(order.session_id.as_str())
        .bind(order.status.as_str())
        .bind(items)
        .bind(order.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, order_id: &OrderId) -> Result<Option<Order>> {
        let row = sqlx::query(
            "SELECT order_id, session_id, status, items, created_at FROM orders WHERE order_id = $1",
        )
        .bind(order_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| Self::row_to_order(&row)).transpose()
    }

    async fn find(&self, filter: &OrderFilter) -> Result<Vec<Order>> {
        // Status narrowing happens in SQL; product/session matching reuses the
        // same filter logic as the in-memory store so the two cannot drift.
        let rows = if let Some(ref statuses) = filter.statuses {
            let names: Vec<String> = statuses.iter().map(|s| s.as_str().to_string()).collect();
            sqlx::query(
                r#"
                SELECT order_id, session_id, status, items, created_at
                FROM orders WHERE status = ANY($1) ORDER BY created_at
                "#,
            )
            .bind(names)
            .fetch_all(&self.pool)
            .await?
        } else {
            sqlx::query(
                "SELECT order_id, session_id, status, items, created_at FROM orders ORDER BY created_at",
            )
            .fetch_all(&self.pool)
            .await?
        };

        let mut orders = Vec::with_capacity(rows.len());
        for row in &rows {
            let order = Self::row_to_order(row)?;
            if filter.matches(&order) {
                orders.push(order);
            }
        }
        Ok(orders)
    }

    async fn transition(&self, order_id: &OrderId, next: OrderStatus) -> Result<Order> {
        let mut tx = self.pool.begin().await?;

        let status_raw: String =
            sqlx::query_scalar("SELECT status FROM orders WHERE order_id = $1 FOR UPDATE")
                .bind(order_id.as_str())
                .fetch_optional(&mut *tx)
                .await?
                .ok_or_else(|| StoreError::OrderNotFound(order_id.clone()))?;

        let current = OrderStatus::parse(&status_raw)
            .ok_or_else(|| malformed(format!("unknown order status: {status_raw}")))?;

        if !current.can_transition_to(next) {
            return Err(StoreError::InvalidTransition {
                order_id: order_id.clone(),
                from: current,
                to: next,
            });
        }

        let row = sqlx::query(
            r#"
            UPDATE orders SET status = $2
            WHERE order_id = $1
            RETURNING order_id, session_id, status, items, created_at
            "#,
        )
        .bind(order_id.as_str())
        .bind(next.as_str())
        .fetch_one(&mut *tx)
        .await?;

        let order = Self::row_to_order(&row)?;
        tx.commit().await?;
        Ok(order)
    }
}
