// ==========================================
// 生产排程核心 - 生产作业数据仓储
// ==========================================
// 红线: Repository 不含业务逻辑 (状态机规则在 engine::job_lifecycle)
// 并发: 以读取时的 (status, actual_hours, started_at) 作为条件更新
// ==========================================

use crate::db::fmt_ts;
use crate::domain::job::ProductionJob;
use crate::domain::step::ProductionStep;
use crate::domain::types::{JobPriority, JobStatus};
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::row_helpers::{get_enum, get_opt_ts, get_ts};
use crate::repository::step_repo::load_steps_by_job;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::{Arc, Mutex};

const JOB_COLUMNS: &str = r#"
    job_id, order_id, title, description, status, priority,
    estimated_hours, actual_hours, started_at, created_at, completed_at
"#;

fn map_job(row: &Row<'_>) -> rusqlite::Result<ProductionJob> {
    Ok(ProductionJob {
        job_id: row.get(0)?,
        order_id: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        status: get_enum(row, 4, JobStatus::from_str)?,
        priority: get_enum(row, 5, JobPriority::from_str)?,
        estimated_hours: row.get(6)?,
        actual_hours: row.get(7)?,
        started_at: get_opt_ts(row, 8)?,
        created_at: get_ts(row, 9)?,
        completed_at: get_opt_ts(row, 10)?,
    })
}

/// 在给定连接/事务上读取作业
pub(crate) fn load_job(conn: &Connection, job_id: &str) -> RepositoryResult<Option<ProductionJob>> {
    let sql = format!("SELECT {} FROM production_jobs WHERE job_id = ?1", JOB_COLUMNS);
    let job = conn.query_row(&sql, params![job_id], map_job).optional()?;
    Ok(job)
}

/// 在给定连接/事务上读取订单下全部作业
pub(crate) fn load_jobs_by_order(conn: &Connection, order_id: &str) -> RepositoryResult<Vec<ProductionJob>> {
    let sql = format!(
        "SELECT {} FROM production_jobs WHERE order_id = ?1 ORDER BY created_at ASC",
        JOB_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let jobs = stmt
        .query_map(params![order_id], map_job)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(jobs)
}

/// 在给定连接/事务上做条件更新
///
/// # 错误
/// - `ConcurrencyConflict`: 读取后作业已被其他操作修改
/// - `NotFound`: 作业不存在
pub(crate) fn write_job_cas(
    conn: &Connection,
    updated: &ProductionJob,
    expected: &ProductionJob,
) -> RepositoryResult<()> {
    let rows = conn.execute(
        r#"
        UPDATE production_jobs
        SET status = ?1, actual_hours = ?2, started_at = ?3, completed_at = ?4
        WHERE job_id = ?5
          AND status = ?6
          AND actual_hours IS ?7
          AND started_at IS ?8
        "#,
        params![
            updated.status.to_db_str(),
            updated.actual_hours,
            updated.started_at.as_ref().map(fmt_ts),
            updated.completed_at.as_ref().map(fmt_ts),
            updated.job_id,
            expected.status.to_db_str(),
            expected.actual_hours,
            expected.started_at.as_ref().map(fmt_ts),
        ],
    )?;

    if rows == 0 {
        let exists: Option<String> = conn
            .query_row(
                "SELECT status FROM production_jobs WHERE job_id = ?1",
                params![updated.job_id],
                |row| row.get(0),
            )
            .optional()?;
        return match exists {
            Some(actual) => Err(RepositoryError::conflict(
                "ProductionJob",
                &updated.job_id,
                format!(
                    "期望状态={}，实际状态={}",
                    expected.status.to_db_str(),
                    actual
                ),
            )),
            None => Err(RepositoryError::not_found("ProductionJob", &updated.job_id)),
        };
    }
    Ok(())
}

// ==========================================
// JobRepository - 生产作业仓储
// ==========================================
pub struct JobRepository {
    conn: Arc<Mutex<Connection>>,
}

impl JobRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 新增作业
    pub fn insert(&self, job: &ProductionJob) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO production_jobs (
                job_id, order_id, title, description, status, priority,
                estimated_hours, actual_hours, started_at, created_at, completed_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
            params![
                job.job_id,
                job.order_id,
                job.title,
                job.description,
                job.status.to_db_str(),
                job.priority.to_db_str(),
                job.estimated_hours,
                job.actual_hours,
                job.started_at.as_ref().map(fmt_ts),
                fmt_ts(&job.created_at),
                job.completed_at.as_ref().map(fmt_ts),
            ],
        )?;
        Ok(())
    }

    pub fn find_by_id(&self, job_id: &str) -> RepositoryResult<Option<ProductionJob>> {
        let conn = self.get_conn()?;
        load_job(&conn, job_id)
    }

    pub fn get(&self, job_id: &str) -> RepositoryResult<ProductionJob> {
        self.find_by_id(job_id)?
            .ok_or_else(|| RepositoryError::not_found("ProductionJob", job_id))
    }

    /// 查询订单下全部作业
    pub fn find_by_order(&self, order_id: &str) -> RepositoryResult<Vec<ProductionJob>> {
        let conn = self.get_conn()?;
        load_jobs_by_order(&conn, order_id)
    }

    /// 列出全部作业 (新建在前)
    pub fn list_all(&self) -> RepositoryResult<Vec<ProductionJob>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT {} FROM production_jobs ORDER BY created_at DESC",
            JOB_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let jobs = stmt
            .query_map([], map_job)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(jobs)
    }

    /// 条件更新 (带读取时快照检查)
    pub fn update_cas(&self, updated: &ProductionJob, expected: &ProductionJob) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        write_job_cas(&conn, updated, expected)
    }

    /// 在同一事务内读取作业及其全部工序, 由 `decide` 给出更新后的作业
    ///
    /// # 返回
    /// - Ok(Some(job)): 已写入更新
    /// - Ok(None): `decide` 判定无需更新
    /// - Err(NotFound): 作业不存在
    pub fn update_with_steps<F>(&self, job_id: &str, decide: F) -> RepositoryResult<Option<ProductionJob>>
    where
        F: FnOnce(&ProductionJob, &[ProductionStep]) -> Option<ProductionJob>,
    {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        let job = load_job(&tx, job_id)?
            .ok_or_else(|| RepositoryError::not_found("ProductionJob", job_id))?;
        let steps = load_steps_by_job(&tx, job_id)?;

        let updated = match decide(&job, &steps) {
            Some(updated) => updated,
            None => return Ok(None),
        };
        write_job_cas(&tx, &updated, &job)?;

        tx.commit()?;
        Ok(Some(updated))
    }
}
