// ==========================================
// 生产排程核心 - 工序任务 API
// ==========================================
// 职责: 工序创建、派工、状态更新、报工, 工人任务视图
// 权限: 工人只能操作派给自己的工序 (或把未派工工序派给自己)
// 级联: 工序进入 completed 后同步触发作业/订单级联
// ==========================================

use std::sync::Arc;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::api::error::{require, ApiError, ApiResult};
use crate::domain::action_log::{ActionLog, ActionType};
use crate::domain::context::OperatorContext;
use crate::domain::step::{NewStep, ProductionStep};
use crate::domain::types::StepStatus;
use crate::engine::cascade::{CascadeOutcome, StatusCascadeCoordinator};
use crate::engine::step_lifecycle::StepLifecycle;
use crate::repository::action_log_repo::ActionLogRepository;
use crate::repository::job_repo::JobRepository;
use crate::repository::step_repo::StepRepository;

/// 工序状态更新结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepUpdateOutcome {
    pub step: ProductionStep,
    pub hours_entry_ignored: bool,
    /// 仅进入 completed 时存在
    pub cascade: Option<CascadeOutcome>,
}

/// 工人任务视图行
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerTask {
    pub step: ProductionStep,
    pub progress_pct: f64,
}

impl From<ProductionStep> for WorkerTask {
    fn from(step: ProductionStep) -> Self {
        let progress_pct = step.progress_pct();
        Self { step, progress_pct }
    }
}

// ==========================================
// TaskApi - 工序任务 API
// ==========================================
pub struct TaskApi {
    step_repo: Arc<StepRepository>,
    job_repo: Arc<JobRepository>,
    action_log_repo: Arc<ActionLogRepository>,
    cascade: Arc<StatusCascadeCoordinator>,
}

impl TaskApi {
    pub fn new(
        step_repo: Arc<StepRepository>,
        job_repo: Arc<JobRepository>,
        action_log_repo: Arc<ActionLogRepository>,
        cascade: Arc<StatusCascadeCoordinator>,
    ) -> Self {
        Self {
            step_repo,
            job_repo,
            action_log_repo,
            cascade,
        }
    }

    /// 工人只能操作派给自己的工序
    fn ensure_can_work(&self, ctx: &OperatorContext, step: &ProductionStep, action: &str) -> ApiResult<()> {
        require(ctx.can_work_steps(), action, &ctx.actor_id)?;
        if ctx.is_worker() && !step.is_assigned_to(&ctx.actor_id) {
            return Err(ApiError::PermissionDenied(format!(
                "工人 {} 未被派工到工序 {}",
                ctx.actor_id, step.step_id
            )));
        }
        Ok(())
    }

    /// 工序所属订单 (优先用联表字段)
    fn order_id_of(&self, step: &ProductionStep) -> ApiResult<String> {
        match &step.order_id {
            Some(order_id) => Ok(order_id.clone()),
            None => Ok(self.job_repo.get(&step.job_id)?.order_id),
        }
    }

    /// 创建工序 (初始 pending)
    ///
    /// # 错误
    /// - NotFound: 作业不存在
    /// - BusinessRuleViolation: 作业已完成
    pub fn create_step(&self, ctx: &OperatorContext, req: NewStep) -> ApiResult<ProductionStep> {
        self.create_step_at(ctx, req, chrono::Local::now().naive_local())
    }

    pub fn create_step_at(
        &self,
        ctx: &OperatorContext,
        req: NewStep,
        now: NaiveDateTime,
    ) -> ApiResult<ProductionStep> {
        require(ctx.can_manage_jobs(), "create_step", &ctx.actor_id)?;

        if req.title.trim().is_empty() {
            return Err(ApiError::InvalidInput("工序标题不能为空".to_string()));
        }
        if !req.estimated_hours.is_finite() || req.estimated_hours < 0.0 {
            return Err(ApiError::InvalidHours(format!(
                "预计工时必须为非负数: {}",
                req.estimated_hours
            )));
        }

        let job = self.job_repo.get(&req.job_id)?;

        let step = ProductionStep::new(
            req.job_id,
            req.title.trim().to_string(),
            req.description,
            req.estimated_hours,
            req.notes,
            now,
        );
        // 作业未完成的判断随插入一并执行
        self.step_repo.insert(&step)?;

        self.action_log_repo.insert(
            &ActionLog::new(ctx, ActionType::CreateStep)
                .at(now)
                .order(&job.order_id)
                .payload(serde_json::json!({
                    "job_id": job.job_id,
                    "step_id": step.step_id,
                    "estimated_hours": step.estimated_hours,
                }))
                .detail(format!("创建工序: {}", step.title)),
        )?;

        tracing::info!(step_id = %step.step_id, job_id = %job.job_id, "工序已创建");
        Ok(self.step_repo.get(&step.step_id)?)
    }

    /// 派工
    ///
    /// 管理角色可派给任何人; 工人只能把未派工的工序派给自己
    pub fn assign_step(
        &self,
        ctx: &OperatorContext,
        step_id: &str,
        worker_id: &str,
        worker_name: &str,
    ) -> ApiResult<ProductionStep> {
        if worker_id.trim().is_empty() {
            return Err(ApiError::InvalidInput("工人ID不能为空".to_string()));
        }

        let current = self.step_repo.get(step_id)?;

        let self_claim = ctx.is_worker() && worker_id == ctx.actor_id && !current.is_assigned();
        if !(ctx.can_manage_jobs() || self_claim) {
            return Err(ApiError::PermissionDenied(format!(
                "actor={} 无权派工工序 {}",
                ctx.actor_id, step_id
            )));
        }

        let updated = StepLifecycle::assign(&current, worker_id, worker_name)?;
        self.step_repo.update_cas(&updated, &current)?;

        let order_id = self.order_id_of(&current)?;
        self.action_log_repo.insert(
            &ActionLog::new(ctx, ActionType::AssignStep)
                .order(&order_id)
                .payload(serde_json::json!({
                    "step_id": step_id,
                    "worker_id": worker_id,
                    "from_status": current.status.to_db_str(),
                    "to_status": updated.status.to_db_str(),
                }))
                .detail(format!("派工: {} → {}", current.title, worker_name)),
        )?;

        tracing::info!(step_id, worker_id, status = %updated.status, "工序已派工");
        Ok(self.step_repo.get(step_id)?)
    }

    /// 更新工序状态
    ///
    /// # 参数
    /// - hours_entry: 完成时录入的总工时; 缺省为 0
    ///
    /// # 返回
    /// - Ok(StepUpdateOutcome): 完成时附带级联结果; 级联失败只标记 deferred
    pub fn update_step_status(
        &self,
        ctx: &OperatorContext,
        step_id: &str,
        to: StepStatus,
        hours_entry: Option<f64>,
    ) -> ApiResult<StepUpdateOutcome> {
        self.update_step_status_at(ctx, step_id, to, hours_entry, chrono::Local::now().naive_local())
    }

    pub fn update_step_status_at(
        &self,
        ctx: &OperatorContext,
        step_id: &str,
        to: StepStatus,
        hours_entry: Option<f64>,
        now: NaiveDateTime,
    ) -> ApiResult<StepUpdateOutcome> {
        let current = self.step_repo.get(step_id)?;
        self.ensure_can_work(ctx, &current, "update_step_status")?;

        let order_id = self.order_id_of(&current)?;
        let result = StepLifecycle::apply_transition(&current, to, hours_entry, now)?;
        self.step_repo.update_cas(&result.step, &current)?;

        if result.hours_entry_ignored {
            tracing::warn!(
                step_id,
                entry = hours_entry.unwrap_or_default(),
                "录入工时低于已累计工时, 已忽略"
            );
        }

        let cascade = if result.completed() {
            Some(self.cascade.on_step_completed(&order_id, &current.job_id, now))
        } else {
            None
        };

        self.action_log_repo.insert_after_commit(
            &ActionLog::new(ctx, ActionType::StepTransition)
                .at(now)
                .order(&order_id)
                .payload(serde_json::json!({
                    "step_id": step_id,
                    "job_id": current.job_id,
                    "from": current.status.to_db_str(),
                    "to": to.to_db_str(),
                    "hours_entry": hours_entry,
                }))
                .detail(format!("工序状态: {} → {}", current.status, to)),
        );
        tracing::info!(step_id, from = %current.status, to = %to, "工序状态已更新");

        Ok(StepUpdateOutcome {
            step: result.step,
            hours_entry_ignored: result.hours_entry_ignored,
            cascade,
        })
    }

    /// 报工 (非负增量)
    pub fn record_step_hours(
        &self,
        ctx: &OperatorContext,
        step_id: &str,
        increment: f64,
    ) -> ApiResult<ProductionStep> {
        let current = self.step_repo.get(step_id)?;
        self.ensure_can_work(ctx, &current, "record_step_hours")?;

        let updated = StepLifecycle::add_hours(&current, increment)?;
        self.step_repo.update_cas(&updated, &current)?;

        let order_id = self.order_id_of(&current)?;
        self.action_log_repo.insert(
            &ActionLog::new(ctx, ActionType::StepHoursEntry)
                .order(&order_id)
                .payload(serde_json::json!({
                    "step_id": step_id,
                    "increment": increment,
                    "actual_hours": updated.actual_hours,
                })),
        )?;

        Ok(self.step_repo.get(step_id)?)
    }

    // ==========================================
    // 查询
    // ==========================================

    pub fn get_step(&self, step_id: &str) -> ApiResult<WorkerTask> {
        Ok(self.step_repo.get(step_id)?.into())
    }

    pub fn list_steps_for_job(&self, job_id: &str) -> ApiResult<Vec<WorkerTask>> {
        let steps = self.step_repo.find_by_job(job_id)?;
        Ok(steps.into_iter().map(WorkerTask::from).collect())
    }

    /// 工人任务列表 (工人只能看自己的)
    pub fn list_steps_for_worker(
        &self,
        ctx: &OperatorContext,
        worker_id: &str,
    ) -> ApiResult<Vec<WorkerTask>> {
        require(ctx.can_work_steps(), "list_steps_for_worker", &ctx.actor_id)?;
        if ctx.is_worker() && ctx.actor_id != worker_id {
            return Err(ApiError::PermissionDenied(format!(
                "工人 {} 不能查看 {} 的任务",
                ctx.actor_id, worker_id
            )));
        }
        let steps = self.step_repo.find_by_worker(worker_id)?;
        Ok(steps.into_iter().map(WorkerTask::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::job::ProductionJob;
    use crate::domain::types::{JobPriority, JobStatus, UserRole};
    use crate::engine::cascade::CascadeRetryPolicy;
    use crate::repository::order_repo::OrderRepository;
    use crate::repository::reconciliation_repo::ReconciliationRepository;
    use chrono::NaiveDate;
    use rusqlite::Connection;
    use std::sync::Mutex;

    struct Fixture {
        api: TaskApi,
        jobs: Arc<JobRepository>,
        orders: Arc<OrderRepository>,
    }

    fn setup() -> Fixture {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::configure_sqlite_connection(&conn).unwrap();
        crate::db::init_schema(&conn).unwrap();
        let conn = Arc::new(Mutex::new(conn));
        let jobs = Arc::new(JobRepository::new(conn.clone()));
        let orders = Arc::new(OrderRepository::new(conn.clone()));
        let cascade = Arc::new(StatusCascadeCoordinator::new(
            jobs.clone(),
            orders.clone(),
            Arc::new(ReconciliationRepository::new(conn.clone())),
            CascadeRetryPolicy { attempts: 1, backoff_ms: 0 },
        ));
        let api = TaskApi::new(
            Arc::new(StepRepository::new(conn.clone())),
            jobs.clone(),
            Arc::new(ActionLogRepository::new(conn)),
            cascade,
        );
        Fixture { api, jobs, orders }
    }

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 5, 4)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap()
    }

    fn manager() -> OperatorContext {
        OperatorContext::new("pm-1", "Pat", UserRole::ProductionManager)
    }

    fn worker(id: &str) -> OperatorContext {
        OperatorContext::new(id, id, UserRole::Worker)
    }

    fn seed_job(fx: &Fixture, order_id: &str) -> ProductionJob {
        fx.orders.register(order_id, now(), "pm-1").unwrap();
        let job = ProductionJob::new(
            order_id.to_string(),
            "Label run".to_string(),
            String::new(),
            JobPriority::Medium,
            6.0,
            now(),
        );
        fx.jobs.insert(&job).unwrap();
        job
    }

    fn new_step(job_id: &str, title: &str) -> NewStep {
        NewStep {
            job_id: job_id.to_string(),
            title: title.to_string(),
            description: String::new(),
            estimated_hours: 2.0,
            notes: None,
        }
    }

    #[test]
    fn test_assign_starts_unassigned_pending_step() {
        let fx = setup();
        let job = seed_job(&fx, "O-1");
        let step = fx.api.create_step_at(&manager(), new_step(&job.job_id, "Print"), now()).unwrap();
        assert_eq!(step.job_title.as_deref(), Some("Label run"));
        assert_eq!(step.order_id.as_deref(), Some("O-1"));

        let assigned = fx.api.assign_step(&manager(), &step.step_id, "w-1", "Wen").unwrap();
        assert_eq!(assigned.status, StepStatus::InProgress);

        let reassigned = fx.api.assign_step(&manager(), &step.step_id, "w-2", "Ola").unwrap();
        assert_eq!(reassigned.status, StepStatus::InProgress);
        assert!(reassigned.is_assigned_to("w-2"));
    }

    #[test]
    fn test_worker_ownership_rules() {
        let fx = setup();
        let job = seed_job(&fx, "O-1");
        let step = fx.api.create_step_at(&manager(), new_step(&job.job_id, "Cut"), now()).unwrap();

        // 未派工工序: 不能更新, 可以派给自己
        assert!(matches!(
            fx.api.update_step_status_at(&worker("w-1"), &step.step_id, StepStatus::InProgress, None, now()),
            Err(ApiError::PermissionDenied(_))
        ));
        assert!(matches!(
            fx.api.assign_step(&worker("w-1"), &step.step_id, "w-2", "Ola"),
            Err(ApiError::PermissionDenied(_))
        ));
        fx.api.assign_step(&worker("w-1"), &step.step_id, "w-1", "w-1").unwrap();

        // 已派工后别的工人不能抢
        assert!(matches!(
            fx.api.assign_step(&worker("w-2"), &step.step_id, "w-2", "w-2"),
            Err(ApiError::PermissionDenied(_))
        ));
        assert!(matches!(
            fx.api.record_step_hours(&worker("w-2"), &step.step_id, 1.0),
            Err(ApiError::PermissionDenied(_))
        ));
        fx.api.record_step_hours(&worker("w-1"), &step.step_id, 1.0).unwrap();

        let tasks = fx.api.list_steps_for_worker(&worker("w-1"), "w-1").unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].progress_pct, 50.0);
        assert!(fx.api.list_steps_for_worker(&worker("w-1"), "w-2").is_err());
    }

    #[test]
    fn test_last_step_completion_cascades_to_order() {
        let fx = setup();
        let job = seed_job(&fx, "O-1");
        let s1 = fx.api.create_step_at(&manager(), new_step(&job.job_id, "Print"), now()).unwrap();
        let s2 = fx.api.create_step_at(&manager(), new_step(&job.job_id, "Cut"), now()).unwrap();
        fx.api.assign_step(&manager(), &s1.step_id, "w-1", "Wen").unwrap();
        fx.api.assign_step(&manager(), &s2.step_id, "w-1", "Wen").unwrap();

        let first = fx
            .api
            .update_step_status_at(&worker("w-1"), &s1.step_id, StepStatus::Completed, Some(2.5), now())
            .unwrap();
        let cascade = first.cascade.unwrap();
        assert!(cascade.job_auto_completed.is_none());
        assert!(!cascade.order_done);

        let last = fx
            .api
            .update_step_status_at(&worker("w-1"), &s2.step_id, StepStatus::Completed, None, now())
            .unwrap();
        assert_eq!(last.step.actual_hours, Some(0.0));
        let cascade = last.cascade.unwrap();
        assert_eq!(cascade.job_auto_completed.as_deref(), Some(job.job_id.as_str()));
        assert!(cascade.order_done);
        assert_eq!(fx.jobs.get(&job.job_id).unwrap().status, JobStatus::Completed);

        // 作业完成后不能再加工序
        assert!(matches!(
            fx.api.create_step_at(&manager(), new_step(&job.job_id, "Pack"), now()),
            Err(ApiError::BusinessRuleViolation(_))
        ));
    }

    #[test]
    fn test_blocked_step_returns_to_pending() {
        let fx = setup();
        let job = seed_job(&fx, "O-1");
        let step = fx.api.create_step_at(&manager(), new_step(&job.job_id, "Laminate"), now()).unwrap();
        fx.api.assign_step(&manager(), &step.step_id, "w-1", "Wen").unwrap();

        fx.api
            .update_step_status_at(&manager(), &step.step_id, StepStatus::Blocked, None, now())
            .unwrap();
        assert!(matches!(
            fx.api.update_step_status_at(&manager(), &step.step_id, StepStatus::InProgress, None, now()),
            Err(ApiError::InvalidTransition { .. })
        ));
        let back = fx
            .api
            .update_step_status_at(&manager(), &step.step_id, StepStatus::Pending, None, now())
            .unwrap();
        assert_eq!(back.step.status, StepStatus::Pending);
        assert!(back.cascade.is_none());
    }
}
