//! Product Catalog
//!
//! Read access and status transitions for products. The catalog shares the
//! engine database, so lifecycle transitions can couple the product write
//! with the auction write in one transaction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Postgres, Row, Transaction};

use crate::errors::{CoreError, CoreResult, ErrorCode};
use crate::models::{ProductInfo, ProductKind, ProductStatus};

#[async_trait]
pub trait ProductCatalog: Send + Sync {
    async fn get(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        product_id: i64,
    ) -> CoreResult<Option<ProductInfo>>;

    async fn set_status(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        product_id: i64,
        status: ProductStatus,
        now: DateTime<Utc>,
    ) -> CoreResult<()>;
}

/// Catalog over the shared `products` table.
#[derive(Debug, Default, Clone)]
pub struct PgProductCatalog;

#[async_trait]
impl ProductCatalog for PgProductCatalog {
    async fn get(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        product_id: i64,
    ) -> CoreResult<Option<ProductInfo>> {
        let row = sqlx::query("SELECT id, title, type, status FROM products WHERE id = $1")
            .bind(product_id)
            .fetch_optional(&mut **tx)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let kind_raw: String = row.get("type");
        let status_raw: String = row.get("status");
        let kind = ProductKind::parse(&kind_raw).ok_or_else(|| {
            CoreError::new(
                ErrorCode::Internal,
                format!("Unknown product type {kind_raw:?}"),
            )
        })?;
        let status = ProductStatus::parse(&status_raw).ok_or_else(|| {
            CoreError::new(
                ErrorCode::Internal,
                format!("Unknown product status {status_raw:?}"),
            )
        })?;

        Ok(Some(ProductInfo {
            id: row.get("id"),
            title: row.get("title"),
            kind,
            status,
        }))
    }

    async fn set_status(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        product_id: i64,
        status: ProductStatus,
        now: DateTime<Utc>,
    ) -> CoreResult<()> {
        sqlx::query("UPDATE products SET status = $2, updated_at = $3 WHERE id = $1")
            .bind(product_id)
            .bind(status.as_str())
            .bind(now)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }
}
