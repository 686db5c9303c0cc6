use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::{Pool, Sqlite};

use crate::models::*;

use super::row_helpers::map_policy_row;

const SELECT_POLICY: &str = r#"
    SELECT id, name, policy_type, description, config, status, created_by,
           created_at, updated_at
    FROM policies
"#;

/// Policy database operations
pub struct PolicyRepo;

impl PolicyRepo {
    pub async fn get(pool: &Pool<Sqlite>, id: i64) -> Result<Option<Policy>> {
        let row = sqlx::query(&format!("{} WHERE id = ?", SELECT_POLICY))
            .bind(id)
            .fetch_optional(pool)
            .await?;

        Ok(row.as_ref().map(map_policy_row))
    }

    pub async fn create(pool: &Pool<Sqlite>, req: &CreatePolicyRequest) -> Result<Policy> {
        let now = Utc::now();
        let config = serde_json::to_string(&req.config)?;
        let id = sqlx::query(
            r#"
            INSERT INTO policies (name, policy_type, description, config, status, created_by,
                                  created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&req.name)
        .bind(&req.policy_type)
        .bind(&req.description)
        .bind(&config)
        .bind(&req.status)
        .bind(req.created_by)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await?
        .last_insert_rowid();

        Self::get(pool, id)
            .await?
            .context("Policy not found after creation")
    }

    pub async fn update_status(pool: &Pool<Sqlite>, id: i64, status: &str) -> Result<()> {
        let result = sqlx::query("UPDATE policies SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status)
            .bind(Utc::now())
            .bind(id)
            .execute(pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(super::NotFoundError::new("Policy", &id.to_string()).into());
        }
        Ok(())
    }

    pub async fn update_config(pool: &Pool<Sqlite>, id: i64, config: &serde_json::Value) -> Result<()> {
        let result = sqlx::query("UPDATE policies SET config = ?, updated_at = ? WHERE id = ?")
            .bind(serde_json::to_string(config)?)
            .bind(Utc::now())
            .bind(id)
            .execute(pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(super::NotFoundError::new("Policy", &id.to_string()).into());
        }
        Ok(())
    }
}
