// ==========================================
// 生产排程核心 - 订单生产状态仓储
// ==========================================
// 订单主数据由外部 CRUD 维护, 这里只登记订单ID并读写 production_status
// ==========================================

use crate::db::fmt_ts;
use crate::domain::job::ProductionJob;
use crate::domain::order::OrderProductionView;
use crate::domain::types::ProductionStatus;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::job_repo::load_jobs_by_order;
use crate::repository::row_helpers::{get_enum, get_ts};
use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::{Arc, Mutex};

fn map_order(row: &Row<'_>) -> rusqlite::Result<OrderProductionView> {
    Ok(OrderProductionView {
        order_id: row.get(0)?,
        production_status: get_enum(row, 1, ProductionStatus::from_str)?,
        updated_at: get_ts(row, 2)?,
        updated_by: row.get(3)?,
    })
}

/// 在给定连接/事务上把订单推进为 done (已是 done 时不写)
///
/// # 返回
/// - Ok(true): 本次写入了 done
/// - Ok(false): 订单已是 done, 无变化
pub(crate) fn mark_done_if_not_done(
    conn: &Connection,
    order_id: &str,
    now: NaiveDateTime,
    updated_by: &str,
) -> RepositoryResult<bool> {
    let rows = conn.execute(
        r#"
        UPDATE orders
        SET production_status = 'done', updated_at = ?1, updated_by = ?2
        WHERE order_id = ?3 AND production_status <> 'done'
        "#,
        params![fmt_ts(&now), updated_by, order_id],
    )?;
    if rows == 1 {
        return Ok(true);
    }

    let exists: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM orders WHERE order_id = ?1",
            params![order_id],
            |row| row.get(0),
        )
        .optional()?;
    match exists {
        Some(_) => Ok(false),
        None => Err(RepositoryError::not_found("Order", order_id)),
    }
}

// ==========================================
// OrderRepository - 订单生产状态仓储
// ==========================================
pub struct OrderRepository {
    conn: Arc<Mutex<Connection>>,
}

impl OrderRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 登记订单 (初始 production_status = start)
    pub fn register(&self, order_id: &str, now: NaiveDateTime, registered_by: &str) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO orders (order_id, production_status, created_at, updated_at, updated_by)
            VALUES (?1, 'start', ?2, ?2, ?3)
            "#,
            params![order_id, fmt_ts(&now), registered_by],
        )?;
        Ok(())
    }

    pub fn find_by_id(&self, order_id: &str) -> RepositoryResult<Option<OrderProductionView>> {
        let conn = self.get_conn()?;
        let order = conn
            .query_row(
                r#"
                SELECT order_id, production_status, updated_at, updated_by
                FROM orders WHERE order_id = ?1
                "#,
                params![order_id],
                map_order,
            )
            .optional()?;
        Ok(order)
    }

    pub fn get(&self, order_id: &str) -> RepositoryResult<OrderProductionView> {
        self.find_by_id(order_id)?
            .ok_or_else(|| RepositoryError::not_found("Order", order_id))
    }

    pub fn exists(&self, order_id: &str) -> RepositoryResult<bool> {
        Ok(self.find_by_id(order_id)?.is_some())
    }

    /// 在同一事务内读取订单的全部作业, `decide` 为 true 时推进为 done
    ///
    /// # 返回
    /// - Ok(true): 本次写入了 done
    /// - Ok(false): 不满足条件, 或订单已是 done
    pub fn mark_done_when<F>(
        &self,
        order_id: &str,
        now: NaiveDateTime,
        updated_by: &str,
        decide: F,
    ) -> RepositoryResult<bool>
    where
        F: FnOnce(&[ProductionJob]) -> bool,
    {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        let jobs = load_jobs_by_order(&tx, order_id)?;
        let written = if decide(&jobs) {
            mark_done_if_not_done(&tx, order_id, now, updated_by)?
        } else {
            false
        };

        tx.commit()?;
        Ok(written)
    }

    /// 人工设置生产状态 (允许任意方向)
    pub fn set_production_status(
        &self,
        order_id: &str,
        status: ProductionStatus,
        now: NaiveDateTime,
        updated_by: &str,
    ) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let rows = conn.execute(
            r#"
            UPDATE orders
            SET production_status = ?1, updated_at = ?2, updated_by = ?3
            WHERE order_id = ?4
            "#,
            params![status.to_db_str(), fmt_ts(&now), updated_by, order_id],
        )?;
        if rows == 0 {
            return Err(RepositoryError::not_found("Order", order_id));
        }
        Ok(())
    }
}
