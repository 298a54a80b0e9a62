// ==========================================
// 生产排程核心 - 状态级联协调器
// ==========================================
// 触发: 工序进入 completed / 作业进入 completed
// 规则:
// - 作业有工序且全部 completed → 作业自动完成
// - 订单下全部作业 completed → production_status = done
// - 单向、幂等: 不会把 done 降级
// ==========================================
// 红线: 级联写入失败不回滚触发它的完成操作
//       重试耗尽后登记 cascade_reconciliation 待补偿
// 并发: 每次判定都在事务内重新读取完整的工序/作业集合
// ==========================================

use crate::domain::job::ProductionJob;
use crate::domain::types::JobStatus;
use crate::engine::events::{OptionalEventPublisher, ProductionEvent, ProductionEventType};
use crate::engine::job_lifecycle::JobLifecycle;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::job_repo::JobRepository;
use crate::repository::order_repo::OrderRepository;
use crate::repository::reconciliation_repo::{CascadeReconciliationEntity, ReconciliationRepository};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// 级联写入使用的操作者标识
pub const CASCADE_ACTOR: &str = "system";

/// 补偿条目触发类型
pub const TRIGGER_STEP_COMPLETED: &str = "step_completed";
pub const TRIGGER_JOB_COMPLETED: &str = "job_completed";

const EVENT_SOURCE: &str = "StatusCascadeCoordinator";

// ==========================================
// CascadeRetryPolicy - 重试策略
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CascadeRetryPolicy {
    pub attempts: u32,
    pub backoff_ms: u64,
}

impl Default for CascadeRetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff_ms: 20,
        }
    }
}

// ==========================================
// CascadeOutcome - 单次级联结果
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CascadeOutcome {
    /// 被自动完成的作业
    pub job_auto_completed: Option<String>,
    /// 本次把订单推进为 done
    pub order_done: bool,
    /// 写入失败, 已登记待补偿
    pub deferred: bool,
}

// ==========================================
// ReconcileReport - 补偿执行报告
// ==========================================
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReconcileReport {
    pub scanned: usize,
    pub resolved: usize,
    pub failed: usize,
    pub jobs_completed: usize,
    pub orders_done: usize,
}

/// 订单是否满足 done 条件: 有作业且全部 completed
pub fn all_jobs_completed(jobs: &[ProductionJob]) -> bool {
    !jobs.is_empty() && jobs.iter().all(|j| j.status == JobStatus::Completed)
}

fn is_retryable(err: &RepositoryError) -> bool {
    !matches!(
        err,
        RepositoryError::NotFound { .. } | RepositoryError::ValidationError(_)
    )
}

// ==========================================
// StatusCascadeCoordinator - 状态级联协调器
// ==========================================
pub struct StatusCascadeCoordinator {
    job_repo: Arc<JobRepository>,
    order_repo: Arc<OrderRepository>,
    reconciliation_repo: Arc<ReconciliationRepository>,
    publisher: OptionalEventPublisher,
    policy: CascadeRetryPolicy,
}

impl StatusCascadeCoordinator {
    pub fn new(
        job_repo: Arc<JobRepository>,
        order_repo: Arc<OrderRepository>,
        reconciliation_repo: Arc<ReconciliationRepository>,
        policy: CascadeRetryPolicy,
    ) -> Self {
        Self {
            job_repo,
            order_repo,
            reconciliation_repo,
            publisher: OptionalEventPublisher::none(),
            policy,
        }
    }

    /// 挂接事件发布者
    pub fn with_publisher(mut self, publisher: OptionalEventPublisher) -> Self {
        self.publisher = publisher;
        self
    }

    pub fn policy(&self) -> CascadeRetryPolicy {
        self.policy
    }

    // ==========================================
    // 触发入口
    // ==========================================

    /// 工序完成后的级联
    ///
    /// 从不返回错误; 写入失败时登记补偿并在结果中标记 deferred
    pub fn on_step_completed(&self, order_id: &str, job_id: &str, now: NaiveDateTime) -> CascadeOutcome {
        match self.with_retry(|| self.evaluate_job(job_id, now)) {
            Ok(Some(_)) => {
                info!(order_id, job_id, "全部工序完成, 作业自动完成");
                self.publisher.publish(
                    ProductionEvent::new(ProductionEventType::JobAutoCompleted, order_id, Some(job_id))
                        .with_source(EVENT_SOURCE),
                );
                let mut outcome = self.on_job_completed(order_id, Some(job_id), now);
                outcome.job_auto_completed = Some(job_id.to_string());
                outcome
            }
            Ok(None) => {
                debug!(order_id, job_id, "作业未满足自动完成条件");
                CascadeOutcome::default()
            }
            Err(e) => self.defer(order_id, Some(job_id), TRIGGER_STEP_COMPLETED, e, now),
        }
    }

    /// 作业完成后的级联
    pub fn on_job_completed(
        &self,
        order_id: &str,
        job_id: Option<&str>,
        now: NaiveDateTime,
    ) -> CascadeOutcome {
        match self.with_retry(|| self.evaluate_order(order_id, now)) {
            Ok(true) => {
                info!(order_id, "订单全部作业完成, production_status → done");
                self.publisher.publish(
                    ProductionEvent::new(ProductionEventType::OrderProductionDone, order_id, job_id)
                        .with_source(EVENT_SOURCE),
                );
                CascadeOutcome {
                    order_done: true,
                    ..CascadeOutcome::default()
                }
            }
            Ok(false) => {
                debug!(order_id, "订单未满足 done 条件或已是 done");
                CascadeOutcome::default()
            }
            Err(e) => self.defer(order_id, job_id, TRIGGER_JOB_COMPLETED, e, now),
        }
    }

    // ==========================================
    // 补偿
    // ==========================================

    /// 重新执行所有待补偿条目
    ///
    /// 每个条目都重新判定作业 (若有) 与订单, 成功即标记 resolved
    pub fn reconcile_pending(&self, now: NaiveDateTime) -> RepositoryResult<ReconcileReport> {
        let entries = self.reconciliation_repo.find_pending()?;
        let mut report = ReconcileReport {
            scanned: entries.len(),
            ..ReconcileReport::default()
        };

        for entry in entries {
            let result = self.rerun_entry(&entry, now);
            match result {
                Ok((job_completed, order_done)) => {
                    self.reconciliation_repo.mark_resolved(&entry.entry_id, now)?;
                    report.resolved += 1;
                    if job_completed {
                        report.jobs_completed += 1;
                        self.publisher.publish(
                            ProductionEvent::new(
                                ProductionEventType::JobAutoCompleted,
                                &entry.order_id,
                                entry.job_id.as_deref(),
                            )
                            .with_source(EVENT_SOURCE),
                        );
                    }
                    if order_done {
                        report.orders_done += 1;
                        self.publisher.publish(
                            ProductionEvent::new(
                                ProductionEventType::OrderProductionDone,
                                &entry.order_id,
                                entry.job_id.as_deref(),
                            )
                            .with_source(EVENT_SOURCE),
                        );
                    }
                    info!(entry_id = %entry.entry_id, order_id = %entry.order_id, "级联补偿完成");
                }
                Err(e) => {
                    warn!(entry_id = %entry.entry_id, error = %e, "级联补偿仍失败");
                    self.reconciliation_repo
                        .record_failure(&entry.entry_id, &e.to_string())?;
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }

    fn rerun_entry(
        &self,
        entry: &CascadeReconciliationEntity,
        now: NaiveDateTime,
    ) -> RepositoryResult<(bool, bool)> {
        let job_completed = match entry.job_id.as_deref() {
            Some(job_id) => self.evaluate_job(job_id, now)?.is_some(),
            None => false,
        };
        let order_done = self.evaluate_order(&entry.order_id, now)?;
        Ok((job_completed, order_done))
    }

    // ==========================================
    // 内部
    // ==========================================

    fn evaluate_job(&self, job_id: &str, now: NaiveDateTime) -> RepositoryResult<Option<ProductionJob>> {
        self.job_repo
            .update_with_steps(job_id, |job, steps| JobLifecycle::auto_complete(job, steps, now))
    }

    fn evaluate_order(&self, order_id: &str, now: NaiveDateTime) -> RepositoryResult<bool> {
        self.order_repo
            .mark_done_when(order_id, now, CASCADE_ACTOR, all_jobs_completed)
    }

    fn with_retry<T, F>(&self, mut op: F) -> RepositoryResult<T>
    where
        F: FnMut() -> RepositoryResult<T>,
    {
        let attempts = self.policy.attempts.max(1);
        let mut attempt = 1;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(e) if attempt < attempts && is_retryable(&e) => {
                    warn!(attempt, attempts, error = %e, "级联写入失败, 准备重试");
                    if self.policy.backoff_ms > 0 {
                        std::thread::sleep(Duration::from_millis(self.policy.backoff_ms));
                    }
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn defer(
        &self,
        order_id: &str,
        job_id: Option<&str>,
        trigger_type: &str,
        err: RepositoryError,
        now: NaiveDateTime,
    ) -> CascadeOutcome {
        warn!(
            order_id,
            job_id = job_id.unwrap_or("-"),
            trigger_type,
            error = %err,
            "级联写入重试耗尽, 登记待补偿"
        );

        let entry = CascadeReconciliationEntity::pending(
            order_id,
            job_id,
            trigger_type,
            err.to_string(),
            i64::from(self.policy.attempts.max(1)),
            now,
        );
        if let Err(record_err) = self.reconciliation_repo.insert(&entry) {
            error!(order_id, error = %record_err, "登记级联补偿失败");
        }

        self.publisher.publish(
            ProductionEvent::new(ProductionEventType::CascadeDeferred, order_id, job_id)
                .with_source(EVENT_SOURCE)
                .with_detail(err.to_string()),
        );

        CascadeOutcome {
            deferred: true,
            ..CascadeOutcome::default()
        }
    }
}
