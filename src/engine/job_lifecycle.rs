// ==========================================
// 生产排程核心 - 生产作业状态机
// ==========================================
// 状态: created → in_progress → completed
//       in_progress ↔ on_hold
// 终态: completed
// ==========================================
// 红线: 不允许 created → completed 直达
// 红线: actual_hours 只增不减
// 计时: 进入 in_progress 记录 started_at; 离开时把流逝时间并入 actual_hours
// ==========================================

use crate::domain::job::{elapsed_hours, ProductionJob};
use crate::domain::step::ProductionStep;
use crate::domain::types::{JobStatus, StepStatus};
use crate::engine::error::{EngineError, EngineResult};
use chrono::NaiveDateTime;

// ==========================================
// JobTransitionResult - 状态迁移结果
// ==========================================
#[derive(Debug, Clone)]
pub struct JobTransitionResult {
    pub job: ProductionJob,
    /// 完成时录入的工时低于已累计工时而被忽略
    pub hours_entry_ignored: bool,
}

// ==========================================
// JobLifecycle - 作业状态机
// ==========================================
pub struct JobLifecycle;

impl JobLifecycle {
    /// 判断迁移是否合法 (同状态迁移视为非法)
    pub fn can_transition(from: JobStatus, to: JobStatus) -> bool {
        matches!(
            (from, to),
            (JobStatus::Created, JobStatus::InProgress)
                | (JobStatus::OnHold, JobStatus::InProgress)
                | (JobStatus::InProgress, JobStatus::OnHold)
                | (JobStatus::InProgress, JobStatus::Completed)
        )
    }

    pub fn check_transition(from: JobStatus, to: JobStatus) -> EngineResult<()> {
        if Self::can_transition(from, to) {
            Ok(())
        } else {
            Err(EngineError::transition("ProductionJob", from, to))
        }
    }

    /// 执行状态迁移
    ///
    /// # 参数
    /// - `job`: 当前作业
    /// - `to`: 目标状态
    /// - `hours_entry`: 完成时录入的总工时 (仅 to = completed 时生效)
    /// - `now`: 当前时间
    ///
    /// # 返回
    /// - Ok(JobTransitionResult): 迁移后的作业
    /// - Err(InvalidTransition): 迁移不合法
    /// - Err(InvalidHours): 录入工时为负或非有限值
    pub fn apply_transition(
        job: &ProductionJob,
        to: JobStatus,
        hours_entry: Option<f64>,
        now: NaiveDateTime,
    ) -> EngineResult<JobTransitionResult> {
        Self::check_transition(job.status, to)?;

        let mut updated = job.clone();
        let mut hours_entry_ignored = false;

        // 1. 离开 in_progress: 折算计时
        if job.status == JobStatus::InProgress {
            fold_running_time(&mut updated, now);
            updated.started_at = None;
        }

        // 2. 进入新状态
        match to {
            JobStatus::InProgress => {
                updated.started_at = Some(now);
            }
            JobStatus::Completed => {
                if let Some(entry) = hours_entry {
                    validate_hours(entry)?;
                    let accumulated = updated.accumulated_hours();
                    if entry >= accumulated {
                        updated.actual_hours = Some(entry);
                    } else {
                        hours_entry_ignored = true;
                    }
                }
                updated.completed_at = Some(now);
            }
            JobStatus::OnHold | JobStatus::Created => {}
        }
        updated.status = to;

        Ok(JobTransitionResult {
            job: updated,
            hours_entry_ignored,
        })
    }

    /// 计时检查点: 把 started_at 以来的时间并入 actual_hours 并重置检查点
    pub fn checkpoint(job: &ProductionJob, now: NaiveDateTime) -> EngineResult<ProductionJob> {
        if job.status != JobStatus::InProgress {
            return Err(EngineError::transition("ProductionJob", job.status, "checkpoint"));
        }
        let mut updated = job.clone();
        fold_running_time(&mut updated, now);
        updated.started_at = Some(now);
        Ok(updated)
    }

    /// 追加工时 (非负增量)
    pub fn add_hours(job: &ProductionJob, increment: f64) -> EngineResult<ProductionJob> {
        validate_hours(increment)?;
        let mut updated = job.clone();
        updated.actual_hours = Some(job.accumulated_hours() + increment);
        Ok(updated)
    }

    /// 工序驱动的自动完成
    ///
    /// 作业至少有一道工序且全部工序 completed 时, 沿合法路径推进到 completed:
    /// created → in_progress → completed, on_hold → in_progress → completed
    ///
    /// # 返回
    /// - Some(job): 需要写入的完成态作业
    /// - None: 不满足条件或作业已完成
    pub fn auto_complete(
        job: &ProductionJob,
        steps: &[ProductionStep],
        now: NaiveDateTime,
    ) -> Option<ProductionJob> {
        if job.status == JobStatus::Completed || !all_steps_completed(steps) {
            return None;
        }

        let mut current = job.clone();
        if current.status != JobStatus::InProgress {
            current = Self::apply_transition(&current, JobStatus::InProgress, None, now)
                .ok()?
                .job;
        }
        Self::apply_transition(&current, JobStatus::Completed, None, now)
            .ok()
            .map(|r| r.job)
    }
}

/// 作业是否满足级联完成条件: 有工序且全部 completed
pub fn all_steps_completed(steps: &[ProductionStep]) -> bool {
    !steps.is_empty() && steps.iter().all(|s| s.status == StepStatus::Completed)
}

fn fold_running_time(job: &mut ProductionJob, now: NaiveDateTime) {
    if let Some(since) = job.started_at {
        job.actual_hours = Some(job.accumulated_hours() + elapsed_hours(since, now));
    }
}

fn validate_hours(hours: f64) -> EngineResult<()> {
    if !hours.is_finite() || hours < 0.0 {
        return Err(EngineError::InvalidHours(format!(
            "工时必须为非负数: {}",
            hours
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::JobPriority;
    use chrono::{Duration, NaiveDate};

    fn t0() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 5, 4)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap()
    }

    fn new_job() -> ProductionJob {
        ProductionJob::new(
            "O-1".into(),
            "Print".into(),
            "".into(),
            JobPriority::Medium,
            4.0,
            t0(),
        )
    }

    fn step(status: StepStatus) -> ProductionStep {
        let mut s = ProductionStep::new("J".into(), "s".into(), "".into(), 1.0, None, t0());
        s.status = status;
        s
    }

    const ALL: [JobStatus; 4] = [
        JobStatus::Created,
        JobStatus::InProgress,
        JobStatus::OnHold,
        JobStatus::Completed,
    ];

    #[test]
    fn test_created_to_completed_is_rejected() {
        let err = JobLifecycle::apply_transition(&new_job(), JobStatus::Completed, None, t0())
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidTransition { .. }));
    }

    #[test]
    fn test_start_then_finish_sets_completed_at() {
        let started = JobLifecycle::apply_transition(&new_job(), JobStatus::InProgress, None, t0())
            .unwrap()
            .job;
        assert_eq!(started.started_at, Some(t0()));

        let done = JobLifecycle::apply_transition(
            &started,
            JobStatus::Completed,
            None,
            t0() + Duration::hours(2),
        )
        .unwrap()
        .job;
        assert_eq!(done.status, JobStatus::Completed);
        assert_eq!(done.completed_at, Some(t0() + Duration::hours(2)));
        assert_eq!(done.actual_hours, Some(2.0));
        assert!(done.started_at.is_none());
    }

    #[test]
    fn test_completed_is_terminal() {
        for to in ALL {
            assert!(!JobLifecycle::can_transition(JobStatus::Completed, to));
        }
    }

    #[test]
    fn test_transition_table() {
        let allowed = [
            (JobStatus::Created, JobStatus::InProgress),
            (JobStatus::OnHold, JobStatus::InProgress),
            (JobStatus::InProgress, JobStatus::OnHold),
            (JobStatus::InProgress, JobStatus::Completed),
        ];
        for from in ALL {
            for to in ALL {
                assert_eq!(
                    JobLifecycle::can_transition(from, to),
                    allowed.contains(&(from, to)),
                    "{} -> {}",
                    from,
                    to
                );
            }
        }
    }

    #[test]
    fn test_pause_resume_accumulates() {
        let mut job = JobLifecycle::apply_transition(&new_job(), JobStatus::InProgress, None, t0())
            .unwrap()
            .job;
        job = JobLifecycle::apply_transition(&job, JobStatus::OnHold, None, t0() + Duration::hours(1))
            .unwrap()
            .job;
        assert_eq!(job.actual_hours, Some(1.0));
        assert!(job.started_at.is_none());

        job = JobLifecycle::apply_transition(&job, JobStatus::InProgress, None, t0() + Duration::hours(5))
            .unwrap()
            .job;
        job = JobLifecycle::checkpoint(&job, t0() + Duration::minutes(330)).unwrap();
        assert_eq!(job.actual_hours, Some(1.5));
        assert_eq!(job.started_at, Some(t0() + Duration::minutes(330)));
    }

    #[test]
    fn test_lower_hours_entry_is_ignored() {
        let mut job = new_job();
        job.status = JobStatus::InProgress;
        job.actual_hours = Some(3.0);
        job.started_at = Some(t0());

        let result = JobLifecycle::apply_transition(&job, JobStatus::Completed, Some(1.0), t0()).unwrap();
        assert!(result.hours_entry_ignored);
        assert_eq!(result.job.actual_hours, Some(3.0));

        let result = JobLifecycle::apply_transition(&job, JobStatus::Completed, Some(6.0), t0()).unwrap();
        assert!(!result.hours_entry_ignored);
        assert_eq!(result.job.actual_hours, Some(6.0));
    }

    #[test]
    fn test_negative_hours_rejected() {
        let mut job = new_job();
        job.status = JobStatus::InProgress;
        assert!(matches!(
            JobLifecycle::apply_transition(&job, JobStatus::Completed, Some(-1.0), t0()),
            Err(EngineError::InvalidHours(_))
        ));
        assert!(matches!(
            JobLifecycle::add_hours(&job, f64::NAN),
            Err(EngineError::InvalidHours(_))
        ));
    }

    #[test]
    fn test_hours_never_decrease_over_sequences() {
        // 穷举长度 4 的操作序列, actual_hours 单调不减
        let ops = [
            JobStatus::InProgress,
            JobStatus::OnHold,
            JobStatus::Completed,
            JobStatus::Created,
        ];
        for a in ops {
            for b in ops {
                for c in ops {
                    for d in ops {
                        let mut job = new_job();
                        let mut last = job.accumulated_hours();
                        for (i, to) in [a, b, c, d].iter().enumerate() {
                            let at = t0() + Duration::hours(i as i64 + 1);
                            if let Ok(r) = JobLifecycle::apply_transition(&job, *to, Some(0.5), at) {
                                job = r.job;
                            }
                            assert!(job.accumulated_hours() >= last);
                            last = job.accumulated_hours();
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn test_auto_complete_follows_legal_path() {
        let steps = vec![step(StepStatus::Completed), step(StepStatus::Completed)];
        let done = JobLifecycle::auto_complete(&new_job(), &steps, t0()).unwrap();
        assert_eq!(done.status, JobStatus::Completed);
        assert_eq!(done.completed_at, Some(t0()));

        let mut held = new_job();
        held.status = JobStatus::OnHold;
        held.actual_hours = Some(2.0);
        let done = JobLifecycle::auto_complete(&held, &steps, t0()).unwrap();
        assert_eq!(done.actual_hours, Some(2.0));
    }

    #[test]
    fn test_auto_complete_requires_all_steps() {
        assert!(JobLifecycle::auto_complete(&new_job(), &[], t0()).is_none());
        let steps = vec![step(StepStatus::Completed), step(StepStatus::Blocked)];
        assert!(JobLifecycle::auto_complete(&new_job(), &steps, t0()).is_none());

        let mut done = new_job();
        done.status = JobStatus::Completed;
        done.completed_at = Some(t0());
        assert!(JobLifecycle::auto_complete(&done, &[step(StepStatus::Completed)], t0()).is_none());
    }
}
