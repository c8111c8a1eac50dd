//! Item queries. Conditional writes are `UPDATE ... WHERE status = $n` so the
//! row lock taken by Postgres serializes racing transitions.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::model::{Item, ItemId, Status};
use crate::store::{Guard, ItemStore};

const ITEM_COLUMNS: &str =
    "id, description, status, due_date, completed_date, created_at, updated_at";

#[async_trait]
impl ItemStore for super::Db {
    async fn get(&self, id: ItemId) -> Result<Item> {
        let row: Option<ItemRow> =
            sqlx::query_as(&format!("SELECT {ITEM_COLUMNS} FROM items WHERE id = $1"))
                .bind(id.0)
                .fetch_optional(&self.pool)
                .await?;

        row.ok_or_else(|| Error::NotFound(format!("item {id}")))?
            .try_into_item()
    }

    async fn create(&self, item: &Item) -> Result<ItemId> {
        sqlx::query(
            "INSERT INTO items (id, description, status, due_date, completed_date, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(item.id.0)
        .bind(&item.description)
        .bind(item.status.to_string())
        .bind(item.due_date)
        .bind(item.completed_date)
        .bind(item.created_at)
        .bind(item.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                Error::Conflict(format!("item {} already exists", item.id))
            }
            other => Error::Database(other),
        })?;

        Ok(item.id)
    }

    async fn list(&self, status: Option<Status>) -> Result<Vec<Item>> {
        let rows: Vec<ItemRow> = sqlx::query_as(&format!(
            "SELECT {ITEM_COLUMNS} FROM items
             WHERE ($1::text IS NULL OR status = $1)
             ORDER BY created_at ASC, id ASC"
        ))
        .bind(status.map(|s| s.to_string()))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(ItemRow::try_into_item).collect()
    }

    async fn replace_if(&self, item: &Item, expected: Status) -> Result<bool> {
        let rows_affected = sqlx::query(
            "UPDATE items SET description = $1, status = $2, due_date = $3, completed_date = $4, updated_at = $5
             WHERE id = $6 AND status = $7",
        )
        .bind(&item.description)
        .bind(item.status.to_string())
        .bind(item.due_date)
        .bind(item.completed_date)
        .bind(item.updated_at)
        .bind(item.id.0)
        .bind(expected.to_string())
        .execute(&self.pool)
        .await?
        .rows_affected();

        if rows_affected == 0 {
            // Distinguish "lost the race" from "never existed".
            self.get(item.id).await?;
            return Ok(false);
        }
        Ok(true)
    }

    async fn transition_if(
        &self,
        id: ItemId,
        guard: Guard,
        to: Status,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let rows_affected = sqlx::query(
            "UPDATE items SET status = $1, updated_at = $2
             WHERE id = $3 AND status = $4 AND ($5::timestamptz IS NULL OR due_date = $5)",
        )
        .bind(to.to_string())
        .bind(now)
        .bind(id.0)
        .bind(guard.status.to_string())
        .bind(guard.due_date)
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(rows_affected > 0)
    }

    async fn transition_due(&self, now: DateTime<Utc>, to: Status) -> Result<Vec<ItemId>> {
        let ids: Vec<(Uuid,)> = sqlx::query_as(
            "UPDATE items SET status = $1, updated_at = $2
             WHERE status = 'pending' AND due_date <= $2
             RETURNING id",
        )
        .bind(to.to_string())
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids.into_iter().map(|(id,)| ItemId(id)).collect())
    }
}

/// Internal row type for sqlx::FromRow.
#[derive(sqlx::FromRow)]
struct ItemRow {
    id: Uuid,
    description: String,
    status: String,
    due_date: DateTime<Utc>,
    completed_date: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ItemRow {
    fn try_into_item(self) -> Result<Item> {
        Ok(Item {
            id: ItemId(self.id),
            description: self.description,
            status: self.status.parse()?,
            due_date: self.due_date,
            completed_date: self.completed_date,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}
