use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::{Pool, Sqlite};

use crate::models::*;

use super::row_helpers::map_deployment_row;

const SELECT_DEPLOYMENT: &str = r#"
    SELECT id, policy_id, device_id, operation, status, deployed_at, deployed_by,
           config_snapshot, result
    FROM policy_deployments
"#;

/// Deployment history operations. Rows are append-only apart from the
/// final status/result of an attempt.
pub struct DeploymentRepo;

impl DeploymentRepo {
    pub async fn create(pool: &Pool<Sqlite>, new: &NewDeployment) -> Result<PolicyDeployment> {
        let id = sqlx::query(
            r#"
            INSERT INTO policy_deployments (policy_id, device_id, operation, status, deployed_at,
                                            deployed_by, config_snapshot, result)
            VALUES (?, ?, ?, 'pending', ?, ?, ?, ?)
            "#,
        )
        .bind(new.policy_id)
        .bind(new.device_id)
        .bind(new.operation)
        .bind(Utc::now())
        .bind(new.deployed_by)
        .bind(serde_json::to_string(&new.config_snapshot)?)
        .bind(serde_json::to_string(&new.result)?)
        .execute(pool)
        .await?
        .last_insert_rowid();

        Self::get(pool, id)
            .await?
            .context("Deployment not found after creation")
    }

    pub async fn get(pool: &Pool<Sqlite>, id: i64) -> Result<Option<PolicyDeployment>> {
        let row = sqlx::query(&format!("{} WHERE id = ?", SELECT_DEPLOYMENT))
            .bind(id)
            .fetch_optional(pool)
            .await?;

        Ok(row.as_ref().map(map_deployment_row))
    }

    /// Most recently created row for the pair. Ids are monotonic, so ordering
    /// by id is stable even when two rows share a timestamp.
    pub async fn latest(pool: &Pool<Sqlite>, policy_id: i64, device_id: i64) -> Result<Option<PolicyDeployment>> {
        let row = sqlx::query(&format!(
            "{} WHERE policy_id = ? AND device_id = ? ORDER BY id DESC LIMIT 1",
            SELECT_DEPLOYMENT
        ))
        .bind(policy_id)
        .bind(device_id)
        .fetch_optional(pool)
        .await?;

        Ok(row.as_ref().map(map_deployment_row))
    }

    pub async fn list_for_policy(pool: &Pool<Sqlite>, policy_id: i64, limit: i32) -> Result<Vec<PolicyDeployment>> {
        let rows = sqlx::query(&format!(
            "{} WHERE policy_id = ? ORDER BY id DESC LIMIT ?",
            SELECT_DEPLOYMENT
        ))
        .bind(policy_id)
        .bind(limit)
        .fetch_all(pool)
        .await?;

        Ok(rows.iter().map(map_deployment_row).collect())
    }

    pub async fn list_for_pair(pool: &Pool<Sqlite>, policy_id: i64, device_id: i64) -> Result<Vec<PolicyDeployment>> {
        let rows = sqlx::query(&format!(
            "{} WHERE policy_id = ? AND device_id = ? ORDER BY id",
            SELECT_DEPLOYMENT
        ))
        .bind(policy_id)
        .bind(device_id)
        .fetch_all(pool)
        .await?;

        Ok(rows.iter().map(map_deployment_row).collect())
    }

    /// Pairs whose current (latest) row is a successful deploy, optionally
    /// narrowed to one policy and/or device.
    pub async fn list_current_deployed(
        pool: &Pool<Sqlite>,
        policy_id: Option<i64>,
        device_id: Option<i64>,
    ) -> Result<Vec<PolicyDeployment>> {
        let rows = sqlx::query(&format!(
            r#"{} d
            WHERE d.status = 'success' AND d.operation = 'deploy'
              AND d.id = (SELECT MAX(x.id) FROM policy_deployments x
                          WHERE x.policy_id = d.policy_id AND x.device_id = d.device_id)
              AND (? IS NULL OR d.policy_id = ?)
              AND (? IS NULL OR d.device_id = ?)
            ORDER BY d.id"#,
            SELECT_DEPLOYMENT
        ))
        .bind(policy_id)
        .bind(policy_id)
        .bind(device_id)
        .bind(device_id)
        .fetch_all(pool)
        .await?;

        Ok(rows.iter().map(map_deployment_row).collect())
    }

    pub async fn finish(pool: &Pool<Sqlite>, id: i64, status: &str, result: &serde_json::Value) -> Result<()> {
        sqlx::query("UPDATE policy_deployments SET status = ?, result = ? WHERE id = ?")
            .bind(status)
            .bind(serde_json::to_string(result)?)
            .bind(id)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Replace only the result payload; status is left untouched.
    pub async fn update_result(pool: &Pool<Sqlite>, id: i64, result: &serde_json::Value) -> Result<()> {
        let updated = sqlx::query("UPDATE policy_deployments SET result = ? WHERE id = ?")
            .bind(serde_json::to_string(result)?)
            .bind(id)
            .execute(pool)
            .await?;

        if updated.rows_affected() == 0 {
            return Err(super::NotFoundError::new("Deployment", &id.to_string()).into());
        }
        Ok(())
    }
}
