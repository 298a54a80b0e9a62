// ==========================================
// 生产排程核心 - 驾驶舱汇总仓储
// ==========================================
// 只读; 所有计数在同一事务内读取, 不会看到级联写入的中间状态
// ==========================================

use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::NaiveDateTime;
use rusqlite::{Connection, Transaction};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

// ==========================================
// DashboardSnapshot - 驾驶舱快照
// ==========================================
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DashboardSnapshot {
    pub taken_at: Option<NaiveDateTime>,

    // ===== 按状态计数 (status → count) =====
    pub machines_by_status: BTreeMap<String, i64>,
    pub bookings_by_status: BTreeMap<String, i64>,
    pub jobs_by_status: BTreeMap<String, i64>,
    pub steps_by_status: BTreeMap<String, i64>,

    // ===== 订单 =====
    pub orders_total: i64,
    pub orders_done: i64,

    // ===== 工时 =====
    pub booked_hours_total: i64,      // 未完成预约的预计小时
    pub logged_step_hours_total: f64, // 工序已报工时

    pub pending_reconciliations: i64,
}

impl DashboardSnapshot {
    /// 读取某状态计数 (缺省 0)
    pub fn count(map: &BTreeMap<String, i64>, status: &str) -> i64 {
        map.get(status).copied().unwrap_or(0)
    }
}

// 表名来自固定白名单, 不接受外部输入
const STATUS_TABLES: [&str; 4] = ["machines", "order_bookings", "production_jobs", "production_steps"];

fn count_by_status(tx: &Transaction<'_>, table: &str) -> RepositoryResult<BTreeMap<String, i64>> {
    if !STATUS_TABLES.contains(&table) {
        return Err(RepositoryError::InternalError(format!("非法的统计表: {}", table)));
    }
    let sql = format!("SELECT status, COUNT(*) FROM {} GROUP BY status", table);
    let mut stmt = tx.prepare(&sql)?;
    let rows = stmt
        .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
        .collect::<Result<BTreeMap<_, _>, _>>()?;
    Ok(rows)
}

// ==========================================
// DashboardRepository
// ==========================================
pub struct DashboardRepository {
    conn: Arc<Mutex<Connection>>,
}

impl DashboardRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 读取一致性快照
    pub fn snapshot(&self, now: NaiveDateTime) -> RepositoryResult<DashboardSnapshot> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        let machines_by_status = count_by_status(&tx, "machines")?;
        let bookings_by_status = count_by_status(&tx, "order_bookings")?;
        let jobs_by_status = count_by_status(&tx, "production_jobs")?;
        let steps_by_status = count_by_status(&tx, "production_steps")?;

        let (orders_total, orders_done): (i64, i64) = tx.query_row(
            r#"
            SELECT COUNT(*),
                   COALESCE(SUM(CASE WHEN production_status = 'done' THEN 1 ELSE 0 END), 0)
            FROM orders
            "#,
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        let booked_hours_total: i64 = tx.query_row(
            "SELECT COALESCE(SUM(estimated_hours), 0) FROM order_bookings WHERE status <> 'completed'",
            [],
            |row| row.get(0),
        )?;

        let logged_step_hours_total: f64 = tx.query_row(
            "SELECT COALESCE(SUM(actual_hours), 0.0) FROM production_steps",
            [],
            |row| row.get(0),
        )?;

        let pending_reconciliations: i64 = tx.query_row(
            "SELECT COUNT(*) FROM cascade_reconciliation WHERE status = 'pending'",
            [],
            |row| row.get(0),
        )?;

        tx.commit()?;

        Ok(DashboardSnapshot {
            taken_at: Some(now),
            machines_by_status,
            bookings_by_status,
            jobs_by_status,
            steps_by_status,
            orders_total,
            orders_done,
            booked_hours_total,
            logged_step_hours_total,
            pending_reconciliations,
        })
    }
}
