use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::{Pool, Sqlite};

use crate::models::*;

use super::row_helpers::map_device_row;

const SELECT_DEVICE: &str = r#"
    SELECT id, name, ip_address, manufacturer, model, username, password,
           snmp_community, port, connection_protocol, created_at, updated_at
    FROM devices
"#;

/// Device database operations
pub struct DeviceRepo;

impl DeviceRepo {
    pub async fn list(pool: &Pool<Sqlite>) -> Result<Vec<Device>> {
        let rows = sqlx::query(&format!("{} ORDER BY name", SELECT_DEVICE))
            .fetch_all(pool)
            .await?;

        Ok(rows.iter().map(map_device_row).collect())
    }

    pub async fn get(pool: &Pool<Sqlite>, id: i64) -> Result<Option<Device>> {
        let row = sqlx::query(&format!("{} WHERE id = ?", SELECT_DEVICE))
            .bind(id)
            .fetch_optional(pool)
            .await?;

        Ok(row.as_ref().map(map_device_row))
    }

    pub async fn create(pool: &Pool<Sqlite>, req: &CreateDeviceRequest) -> Result<Device> {
        let now = Utc::now();
        let id = sqlx::query(
            r#"
            INSERT INTO devices (name, ip_address, manufacturer, model, username, password,
                                 snmp_community, port, connection_protocol, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&req.name)
        .bind(&req.ip_address)
        .bind(&req.manufacturer)
        .bind(&req.model)
        .bind(&req.username)
        .bind(&req.password)
        .bind(&req.snmp_community)
        .bind(req.port)
        .bind(&req.connection_protocol)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await?
        .last_insert_rowid();

        Self::get(pool, id)
            .await?
            .context("Device not found after creation")
    }

    /// Replace a device's inventory fields. Returns `None` when the id is unknown.
    pub async fn update(pool: &Pool<Sqlite>, id: i64, req: &CreateDeviceRequest) -> Result<Option<Device>> {
        let updated = sqlx::query(
            r#"
            UPDATE devices
            SET name = ?, ip_address = ?, manufacturer = ?, model = ?, username = ?, password = ?,
                snmp_community = ?, port = ?, connection_protocol = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&req.name)
        .bind(&req.ip_address)
        .bind(&req.manufacturer)
        .bind(&req.model)
        .bind(&req.username)
        .bind(&req.password)
        .bind(&req.snmp_community)
        .bind(req.port)
        .bind(&req.connection_protocol)
        .bind(Utc::now())
        .bind(id)
        .execute(pool)
        .await?
        .rows_affected();

        if updated == 0 {
            return Ok(None);
        }
        Self::get(pool, id).await
    }
}
