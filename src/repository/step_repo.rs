// ==========================================
// 生产排程核心 - 工序数据仓储
// ==========================================
// 红线: Repository 不含业务逻辑 (状态机规则在 engine::step_lifecycle)
// 查询时带出所属作业的标题与订单ID
// ==========================================

use crate::db::fmt_ts;
use crate::domain::step::ProductionStep;
use crate::domain::types::StepStatus;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::row_helpers::{get_enum, get_opt_ts, get_ts};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::{Arc, Mutex};

const STEP_SELECT: &str = r#"
    SELECT
        s.step_id, s.job_id, s.title, s.description,
        s.assigned_worker_id, s.assigned_worker_name,
        s.status, s.estimated_hours, s.actual_hours, s.notes,
        s.created_at, s.completed_at,
        j.title, j.order_id
    FROM production_steps s
    LEFT JOIN production_jobs j ON j.job_id = s.job_id
"#;

fn map_step(row: &Row<'_>) -> rusqlite::Result<ProductionStep> {
    Ok(ProductionStep {
        step_id: row.get(0)?,
        job_id: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        assigned_worker_id: row.get(4)?,
        assigned_worker_name: row.get(5)?,
        status: get_enum(row, 6, StepStatus::from_str)?,
        estimated_hours: row.get(7)?,
        actual_hours: row.get(8)?,
        notes: row.get(9)?,
        created_at: get_ts(row, 10)?,
        completed_at: get_opt_ts(row, 11)?,
        job_title: row.get(12)?,
        order_id: row.get(13)?,
    })
}

/// 在给定连接/事务上读取作业的全部工序
///
/// 级联判定每次都重新读取完整工序集合, 不依赖计数器
pub(crate) fn load_steps_by_job(conn: &Connection, job_id: &str) -> RepositoryResult<Vec<ProductionStep>> {
    let sql = format!("{} WHERE s.job_id = ?1 ORDER BY s.created_at ASC", STEP_SELECT);
    let mut stmt = conn.prepare(&sql)?;
    let steps = stmt
        .query_map(params![job_id], map_step)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(steps)
}

// ==========================================
// StepRepository - 工序仓储
// ==========================================
pub struct StepRepository {
    conn: Arc<Mutex<Connection>>,
}

impl StepRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 新增工序
    /// 插入工序
    ///
    /// 所属作业须存在且未完成; 判断与插入在同一条语句内完成
    ///
    /// # 错误
    /// - NotFound: 作业不存在
    /// - BusinessRuleViolation: 作业已完成
    pub fn insert(&self, step: &ProductionStep) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let rows = conn.execute(
            r#"
            INSERT INTO production_steps (
                step_id, job_id, title, description,
                assigned_worker_id, assigned_worker_name,
                status, estimated_hours, actual_hours, notes,
                created_at, completed_at
            )
            SELECT ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12
            WHERE EXISTS (
                SELECT 1 FROM production_jobs
                WHERE job_id = ?2 AND status <> 'completed'
            )
            "#,
            params![
                step.step_id,
                step.job_id,
                step.title,
                step.description,
                step.assigned_worker_id,
                step.assigned_worker_name,
                step.status.to_db_str(),
                step.estimated_hours,
                step.actual_hours,
                step.notes,
                fmt_ts(&step.created_at),
                step.completed_at.as_ref().map(fmt_ts),
            ],
        )?;

        if rows == 0 {
            let job_status: Option<String> = conn
                .query_row(
                    "SELECT status FROM production_jobs WHERE job_id = ?1",
                    params![step.job_id],
                    |row| row.get(0),
                )
                .optional()?;
            return Err(match job_status {
                Some(_) => RepositoryError::BusinessRuleViolation(format!(
                    "作业 {} 已完成, 不能再添加工序",
                    step.job_id
                )),
                None => RepositoryError::not_found("ProductionJob", &step.job_id),
            });
        }
        Ok(())
    }

    pub fn find_by_id(&self, step_id: &str) -> RepositoryResult<Option<ProductionStep>> {
        let conn = self.get_conn()?;
        let sql = format!("{} WHERE s.step_id = ?1", STEP_SELECT);
        let step = conn.query_row(&sql, params![step_id], map_step).optional()?;
        Ok(step)
    }

    pub fn get(&self, step_id: &str) -> RepositoryResult<ProductionStep> {
        self.find_by_id(step_id)?
            .ok_or_else(|| RepositoryError::not_found("ProductionStep", step_id))
    }

    pub fn find_by_job(&self, job_id: &str) -> RepositoryResult<Vec<ProductionStep>> {
        let conn = self.get_conn()?;
        load_steps_by_job(&conn, job_id)
    }

    /// 查询分派给某工人的工序 (新建在前)
    pub fn find_by_worker(&self, worker_id: &str) -> RepositoryResult<Vec<ProductionStep>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "{} WHERE s.assigned_worker_id = ?1 ORDER BY s.created_at DESC",
            STEP_SELECT
        );
        let mut stmt = conn.prepare(&sql)?;
        let steps = stmt
            .query_map(params![worker_id], map_step)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(steps)
    }

    /// 列出全部工序 (新建在前)
    pub fn list_all(&self) -> RepositoryResult<Vec<ProductionStep>> {
        let conn = self.get_conn()?;
        let sql = format!("{} ORDER BY s.created_at DESC", STEP_SELECT);
        let mut stmt = conn.prepare(&sql)?;
        let steps = stmt
            .query_map([], map_step)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(steps)
    }

    /// 条件更新 (以读取时的 status/actual_hours/assigned_worker_id 为条件)
    ///
    /// # 错误
    /// - `ConcurrencyConflict`: 读取后工序已被其他操作修改
    /// - `NotFound`: 工序不存在
    pub fn update_cas(&self, updated: &ProductionStep, expected: &ProductionStep) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let rows = conn.execute(
            r#"
            UPDATE production_steps
            SET status = ?1, actual_hours = ?2,
                assigned_worker_id = ?3, assigned_worker_name = ?4,
                notes = ?5, completed_at = ?6
            WHERE step_id = ?7
              AND status = ?8
              AND actual_hours IS ?9
              AND assigned_worker_id IS ?10
            "#,
            params![
                updated.status.to_db_str(),
                updated.actual_hours,
                updated.assigned_worker_id,
                updated.assigned_worker_name,
                updated.notes,
                updated.completed_at.as_ref().map(fmt_ts),
                updated.step_id,
                expected.status.to_db_str(),
                expected.actual_hours,
                expected.assigned_worker_id,
            ],
        )?;

        if rows == 0 {
            let exists: Option<String> = conn
                .query_row(
                    "SELECT status FROM production_steps WHERE step_id = ?1",
                    params![updated.step_id],
                    |row| row.get(0),
                )
                .optional()?;
            return match exists {
                Some(actual) => Err(RepositoryError::conflict(
                    "ProductionStep",
                    &updated.step_id,
                    format!(
                        "期望状态={}，实际状态={}",
                        expected.status.to_db_str(),
                        actual
                    ),
                )),
                None => Err(RepositoryError::not_found("ProductionStep", &updated.step_id)),
            };
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::job::ProductionJob;
    use crate::domain::types::{JobPriority, JobStatus};
    use crate::repository::job_repo::JobRepository;
    use crate::repository::order_repo::OrderRepository;
    use chrono::{NaiveDate, NaiveDateTime};

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 4, 1)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap()
    }

    fn setup() -> (StepRepository, ProductionJob) {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::configure_sqlite_connection(&conn).unwrap();
        crate::db::init_schema(&conn).unwrap();
        let conn = Arc::new(Mutex::new(conn));
        OrderRepository::new(conn.clone())
            .register("O-1", now(), "u1")
            .unwrap();
        let job = ProductionJob::new(
            "O-1".into(),
            "Wedding invites".into(),
            "".into(),
            JobPriority::Medium,
            8.0,
            now(),
        );
        JobRepository::new(conn.clone()).insert(&job).unwrap();
        (StepRepository::new(conn), job)
    }

    #[test]
    fn test_find_carries_parent_job() {
        let (repo, job) = setup();
        let step = ProductionStep::new(job.job_id.clone(), "Print".into(), "".into(), 3.0, None, now());
        repo.insert(&step).unwrap();

        let found = repo.get(&step.step_id).unwrap();
        assert_eq!(found.job_title.as_deref(), Some("Wedding invites"));
        assert_eq!(found.order_id.as_deref(), Some("O-1"));
    }

    #[test]
    fn test_find_by_worker() {
        let (repo, job) = setup();
        let mut step = ProductionStep::new(job.job_id.clone(), "Fold".into(), "".into(), 1.0, None, now());
        repo.insert(&step).unwrap();
        let before = repo.get(&step.step_id).unwrap();

        step.assigned_worker_id = Some("w-7".into());
        step.assigned_worker_name = Some("Noor".into());
        step.status = StepStatus::InProgress;
        repo.update_cas(&step, &before).unwrap();

        let mine = repo.find_by_worker("w-7").unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].status, StepStatus::InProgress);
        assert!(repo.find_by_worker("w-8").unwrap().is_empty());

        // 过期快照
        assert!(matches!(
            repo.update_cas(&step, &before),
            Err(RepositoryError::ConcurrencyConflict { .. })
        ));
    }

    #[test]
    fn test_insert_refuses_completed_or_missing_job() {
        let (repo, job) = setup();
        let jobs = JobRepository::new(repo.conn.clone());
        let mut done = job.clone();
        done.status = JobStatus::Completed;
        done.completed_at = Some(now());
        jobs.update_cas(&done, &job).unwrap();

        let late = ProductionStep::new(job.job_id.clone(), "Late".into(), "".into(), 1.0, None, now());
        assert!(matches!(
            repo.insert(&late),
            Err(RepositoryError::BusinessRuleViolation(_))
        ));
        assert!(repo.find_by_job(&job.job_id).unwrap().is_empty());

        let orphan = ProductionStep::new("no-such-job".into(), "Orphan".into(), "".into(), 1.0, None, now());
        assert!(matches!(
            repo.insert(&orphan),
            Err(RepositoryError::NotFound { .. })
        ));
    }
}
