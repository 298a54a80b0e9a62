// ==========================================
// 生产排程核心 - 生产作业 API
// ==========================================
// 职责: 作业创建、状态推进、工时检查点与补录
// 级联: 作业进入 completed 后同步触发订单级联
// 红线: 级联失败不影响作业完成本身
// ==========================================

use std::sync::Arc;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::api::error::{require, ApiError, ApiResult};
use crate::config::ConfigManager;
use crate::domain::action_log::{ActionLog, ActionType};
use crate::domain::context::OperatorContext;
use crate::domain::job::{NewJob, ProductionJob};
use crate::domain::types::JobStatus;
use crate::engine::cascade::{CascadeOutcome, ReconcileReport, StatusCascadeCoordinator};
use crate::engine::job_lifecycle::JobLifecycle;
use crate::repository::action_log_repo::ActionLogRepository;
use crate::repository::job_repo::JobRepository;
use crate::repository::order_repo::OrderRepository;

/// 作业状态推进结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobTransitionOutcome {
    pub job: ProductionJob,
    pub hours_entry_ignored: bool,
    /// 仅进入 completed 时存在
    pub cascade: Option<CascadeOutcome>,
}

/// 作业计时视图 (供界面推导实时计时)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobTimer {
    pub job_id: String,
    pub status: JobStatus,
    pub accumulated_hours: f64,
    pub started_at: Option<NaiveDateTime>,
    pub live_hours: f64,
}

// ==========================================
// ProductionApi - 生产作业 API
// ==========================================
pub struct ProductionApi {
    job_repo: Arc<JobRepository>,
    order_repo: Arc<OrderRepository>,
    action_log_repo: Arc<ActionLogRepository>,
    config_manager: Arc<ConfigManager>,
    cascade: Arc<StatusCascadeCoordinator>,
}

impl ProductionApi {
    pub fn new(
        job_repo: Arc<JobRepository>,
        order_repo: Arc<OrderRepository>,
        action_log_repo: Arc<ActionLogRepository>,
        config_manager: Arc<ConfigManager>,
        cascade: Arc<StatusCascadeCoordinator>,
    ) -> Self {
        Self {
            job_repo,
            order_repo,
            action_log_repo,
            config_manager,
            cascade,
        }
    }

    /// 创建作业 (初始 created)
    ///
    /// # 错误
    /// - NotFound: 订单未登记
    /// - InvalidInput: 标题为空
    /// - InvalidHours: 预计工时为负
    pub fn create_job(&self, ctx: &OperatorContext, req: NewJob) -> ApiResult<ProductionJob> {
        self.create_job_at(ctx, req, chrono::Local::now().naive_local())
    }

    pub fn create_job_at(
        &self,
        ctx: &OperatorContext,
        req: NewJob,
        now: NaiveDateTime,
    ) -> ApiResult<ProductionJob> {
        require(ctx.can_manage_jobs(), "create_job", &ctx.actor_id)?;

        if req.title.trim().is_empty() {
            return Err(ApiError::InvalidInput("作业标题不能为空".to_string()));
        }
        if !req.estimated_hours.is_finite() || req.estimated_hours < 0.0 {
            return Err(ApiError::InvalidHours(format!(
                "预计工时必须为非负数: {}",
                req.estimated_hours
            )));
        }
        if !self.order_repo.exists(&req.order_id)? {
            return Err(ApiError::NotFound(format!("Order(id={})不存在", req.order_id)));
        }

        let priority = match req.priority {
            Some(p) => p,
            None => self
                .config_manager
                .get_default_job_priority()
                .map_err(|e| ApiError::InternalError(format!("读取默认优先级失败: {}", e)))?,
        };

        let job = ProductionJob::new(
            req.order_id,
            req.title.trim().to_string(),
            req.description,
            priority,
            req.estimated_hours,
            now,
        );
        self.job_repo.insert(&job)?;

        self.action_log_repo.insert(
            &ActionLog::new(ctx, ActionType::CreateJob)
                .at(now)
                .order(&job.order_id)
                .payload(serde_json::json!({
                    "job_id": job.job_id,
                    "priority": job.priority.to_db_str(),
                    "estimated_hours": job.estimated_hours,
                }))
                .detail(format!("创建作业: {}", job.title)),
        )?;

        tracing::info!(job_id = %job.job_id, order_id = %job.order_id, "作业已创建");
        Ok(job)
    }

    /// 推进作业状态
    ///
    /// # 参数
    /// - hours_entry: 完成时录入的总工时 (低于已累计值时忽略)
    ///
    /// # 返回
    /// - Ok(JobTransitionOutcome): 完成时附带级联结果 (可能 deferred)
    /// - Err(InvalidTransition): 例如 created → completed
    /// - Err(ConcurrencyConflict): 作业已被其他操作修改
    pub fn transition_job(
        &self,
        ctx: &OperatorContext,
        job_id: &str,
        to: JobStatus,
        hours_entry: Option<f64>,
    ) -> ApiResult<JobTransitionOutcome> {
        self.transition_job_at(ctx, job_id, to, hours_entry, chrono::Local::now().naive_local())
    }

    pub fn transition_job_at(
        &self,
        ctx: &OperatorContext,
        job_id: &str,
        to: JobStatus,
        hours_entry: Option<f64>,
        now: NaiveDateTime,
    ) -> ApiResult<JobTransitionOutcome> {
        require(ctx.can_manage_jobs(), "transition_job", &ctx.actor_id)?;

        let current = self.job_repo.get(job_id)?;
        let result = JobLifecycle::apply_transition(&current, to, hours_entry, now)?;
        self.job_repo.update_cas(&result.job, &current)?;

        if result.hours_entry_ignored {
            tracing::warn!(
                job_id,
                entry = hours_entry.unwrap_or_default(),
                accumulated = result.job.accumulated_hours(),
                "录入工时低于已累计工时, 已忽略"
            );
        }

        let cascade = if to == JobStatus::Completed {
            Some(
                self.cascade
                    .on_job_completed(&current.order_id, Some(job_id), now),
            )
        } else {
            None
        };

        self.action_log_repo.insert_after_commit(
            &ActionLog::new(ctx, ActionType::JobTransition)
                .at(now)
                .order(&current.order_id)
                .payload(serde_json::json!({
                    "job_id": job_id,
                    "from": current.status.to_db_str(),
                    "to": to.to_db_str(),
                    "hours_entry": hours_entry,
                    "actual_hours": result.job.actual_hours,
                }))
                .detail(format!("作业状态: {} → {}", current.status, to)),
        );
        tracing::info!(job_id, from = %current.status, to = %to, "作业状态已推进");

        Ok(JobTransitionOutcome {
            job: result.job,
            hours_entry_ignored: result.hours_entry_ignored,
            cascade,
        })
    }

    /// 计时检查点: 把运行时间并入 actual_hours
    pub fn checkpoint_job_hours(&self, ctx: &OperatorContext, job_id: &str) -> ApiResult<ProductionJob> {
        self.checkpoint_job_hours_at(ctx, job_id, chrono::Local::now().naive_local())
    }

    pub fn checkpoint_job_hours_at(
        &self,
        ctx: &OperatorContext,
        job_id: &str,
        now: NaiveDateTime,
    ) -> ApiResult<ProductionJob> {
        require(ctx.can_manage_jobs(), "checkpoint_job_hours", &ctx.actor_id)?;

        let current = self.job_repo.get(job_id)?;
        let updated = JobLifecycle::checkpoint(&current, now)?;
        self.job_repo.update_cas(&updated, &current)?;

        self.action_log_repo.insert(
            &ActionLog::new(ctx, ActionType::JobHoursCheckpoint)
                .at(now)
                .order(&current.order_id)
                .payload(serde_json::json!({
                    "job_id": job_id,
                    "actual_hours": updated.actual_hours,
                })),
        )?;

        tracing::debug!(job_id, actual_hours = updated.accumulated_hours(), "作业计时检查点");
        Ok(updated)
    }

    /// 补录作业工时 (非负增量)
    pub fn record_job_hours(
        &self,
        ctx: &OperatorContext,
        job_id: &str,
        increment: f64,
    ) -> ApiResult<ProductionJob> {
        require(ctx.can_manage_jobs(), "record_job_hours", &ctx.actor_id)?;

        let current = self.job_repo.get(job_id)?;
        let updated = JobLifecycle::add_hours(&current, increment)?;
        self.job_repo.update_cas(&updated, &current)?;

        self.action_log_repo.insert(
            &ActionLog::new(ctx, ActionType::JobHoursCheckpoint)
                .order(&current.order_id)
                .payload(serde_json::json!({
                    "job_id": job_id,
                    "increment": increment,
                    "actual_hours": updated.actual_hours,
                }))
                .detail("补录作业工时"),
        )?;

        Ok(updated)
    }

    /// 重新执行待补偿的级联
    pub fn reconcile_cascade(&self, ctx: &OperatorContext) -> ApiResult<ReconcileReport> {
        self.reconcile_cascade_at(ctx, chrono::Local::now().naive_local())
    }

    pub fn reconcile_cascade_at(
        &self,
        ctx: &OperatorContext,
        now: NaiveDateTime,
    ) -> ApiResult<ReconcileReport> {
        require(ctx.can_manage_jobs(), "reconcile_cascade", &ctx.actor_id)?;

        let report = self.cascade.reconcile_pending(now)?;
        if report.scanned > 0 {
            self.action_log_repo.insert(
                &ActionLog::new(ctx, ActionType::CascadeReconcile)
                    .at(now)
                    .payload(serde_json::to_value(&report).unwrap_or_default())
                    .detail(format!(
                        "级联补偿: 扫描 {}, 解决 {}, 失败 {}",
                        report.scanned, report.resolved, report.failed
                    )),
            )?;
        }
        tracing::info!(
            scanned = report.scanned,
            resolved = report.resolved,
            failed = report.failed,
            "级联补偿执行完毕"
        );
        Ok(report)
    }

    // ==========================================
    // 查询
    // ==========================================

    pub fn get_job(&self, job_id: &str) -> ApiResult<ProductionJob> {
        Ok(self.job_repo.get(job_id)?)
    }

    pub fn list_jobs_for_order(&self, order_id: &str) -> ApiResult<Vec<ProductionJob>> {
        Ok(self.job_repo.find_by_order(order_id)?)
    }

    pub fn list_jobs(&self) -> ApiResult<Vec<ProductionJob>> {
        Ok(self.job_repo.list_all()?)
    }

    /// 作业计时视图
    pub fn job_timer_at(&self, job_id: &str, now: NaiveDateTime) -> ApiResult<JobTimer> {
        let job = self.job_repo.get(job_id)?;
        Ok(JobTimer {
            job_id: job.job_id.clone(),
            status: job.status,
            accumulated_hours: job.accumulated_hours(),
            started_at: job.started_at,
            live_hours: job.live_hours(now),
        })
    }
}
