// ==========================================
// 生产排程核心 - 级联补偿队列仓储
// ==========================================
// 级联写入重试耗尽后登记到 cascade_reconciliation,
// 由 reconcile_pending / reconcile_cascade 二进制重新执行
// ==========================================

use crate::db::fmt_ts;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::row_helpers::{get_opt_ts, get_ts};
use chrono::NaiveDateTime;
use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

/// 补偿条目状态
pub const RECONCILIATION_PENDING: &str = "pending";
pub const RECONCILIATION_RESOLVED: &str = "resolved";

// ==========================================
// CascadeReconciliationEntity - 补偿条目
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CascadeReconciliationEntity {
    pub entry_id: String,
    pub order_id: String,
    pub job_id: Option<String>,   // 步骤触发时为所属作业
    pub trigger_type: String,     // step_completed / job_completed
    pub error_message: String,    // 最近一次失败原因
    pub attempts: i64,
    pub status: String,
    pub created_at: NaiveDateTime,
    pub resolved_at: Option<NaiveDateTime>,
}

impl CascadeReconciliationEntity {
    pub fn pending(
        order_id: &str,
        job_id: Option<&str>,
        trigger_type: &str,
        error_message: String,
        attempts: i64,
        now: NaiveDateTime,
    ) -> Self {
        Self {
            entry_id: uuid::Uuid::new_v4().to_string(),
            order_id: order_id.to_string(),
            job_id: job_id.map(str::to_string),
            trigger_type: trigger_type.to_string(),
            error_message,
            attempts,
            status: RECONCILIATION_PENDING.to_string(),
            created_at: now,
            resolved_at: None,
        }
    }
}

fn map_entry(row: &Row<'_>) -> rusqlite::Result<CascadeReconciliationEntity> {
    Ok(CascadeReconciliationEntity {
        entry_id: row.get(0)?,
        order_id: row.get(1)?,
        job_id: row.get(2)?,
        trigger_type: row.get(3)?,
        error_message: row.get(4)?,
        attempts: row.get(5)?,
        status: row.get(6)?,
        created_at: get_ts(row, 7)?,
        resolved_at: get_opt_ts(row, 8)?,
    })
}

// ==========================================
// ReconciliationRepository
// ==========================================
pub struct ReconciliationRepository {
    conn: Arc<Mutex<Connection>>,
}

impl ReconciliationRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    pub fn insert(&self, entry: &CascadeReconciliationEntity) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO cascade_reconciliation (
                entry_id, order_id, job_id, trigger_type, error_message,
                attempts, status, created_at, resolved_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            params![
                entry.entry_id,
                entry.order_id,
                entry.job_id,
                entry.trigger_type,
                entry.error_message,
                entry.attempts,
                entry.status,
                fmt_ts(&entry.created_at),
                entry.resolved_at.as_ref().map(fmt_ts),
            ],
        )?;
        Ok(())
    }

    /// 待补偿条目 (先进先出)
    pub fn find_pending(&self) -> RepositoryResult<Vec<CascadeReconciliationEntity>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT entry_id, order_id, job_id, trigger_type, error_message,
                   attempts, status, created_at, resolved_at
            FROM cascade_reconciliation
            WHERE status = ?1
            ORDER BY created_at ASC
            "#,
        )?;
        let entries = stmt
            .query_map(params![RECONCILIATION_PENDING], map_entry)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    pub fn count_pending(&self) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM cascade_reconciliation WHERE status = ?1",
            params![RECONCILIATION_PENDING],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    pub fn mark_resolved(&self, entry_id: &str, now: NaiveDateTime) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let rows = conn.execute(
            r#"
            UPDATE cascade_reconciliation
            SET status = ?1, resolved_at = ?2
            WHERE entry_id = ?3
            "#,
            params![RECONCILIATION_RESOLVED, fmt_ts(&now), entry_id],
        )?;
        if rows == 0 {
            return Err(RepositoryError::not_found("CascadeReconciliation", entry_id));
        }
        Ok(())
    }

    /// 记录一次失败的补偿尝试
    pub fn record_failure(&self, entry_id: &str, error_message: &str) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let rows = conn.execute(
            r#"
            UPDATE cascade_reconciliation
            SET attempts = attempts + 1, error_message = ?1
            WHERE entry_id = ?2
            "#,
            params![error_message, entry_id],
        )?;
        if rows == 0 {
            return Err(RepositoryError::not_found("CascadeReconciliation", entry_id));
        }
        Ok(())
    }
}
