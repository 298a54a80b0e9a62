// ==========================================
// 生产排程核心 - 工序状态机
// ==========================================
// 状态: pending → in_progress → completed
//       in_progress → blocked → pending (重新分诊)
// 终态: completed
// 派工: 完成前任意时刻可派工; 未派工的 pending 工序首次派工即开工
// ==========================================

use crate::domain::step::ProductionStep;
use crate::domain::types::StepStatus;
use crate::engine::error::{EngineError, EngineResult};
use chrono::NaiveDateTime;

// ==========================================
// StepTransitionResult - 状态迁移结果
// ==========================================
#[derive(Debug, Clone)]
pub struct StepTransitionResult {
    pub step: ProductionStep,
    /// 完成时录入的工时低于已累计工时而被忽略
    pub hours_entry_ignored: bool,
}

impl StepTransitionResult {
    /// 本次迁移是否进入 completed (级联触发点)
    pub fn completed(&self) -> bool {
        self.step.status == StepStatus::Completed
    }
}

// ==========================================
// StepLifecycle - 工序状态机
// ==========================================
pub struct StepLifecycle;

impl StepLifecycle {
    pub fn can_transition(from: StepStatus, to: StepStatus) -> bool {
        matches!(
            (from, to),
            (StepStatus::Pending, StepStatus::InProgress)
                | (StepStatus::InProgress, StepStatus::Completed)
                | (StepStatus::InProgress, StepStatus::Blocked)
                | (StepStatus::Blocked, StepStatus::Pending)
        )
    }

    pub fn check_transition(from: StepStatus, to: StepStatus) -> EngineResult<()> {
        if Self::can_transition(from, to) {
            Ok(())
        } else {
            Err(EngineError::transition("ProductionStep", from, to))
        }
    }

    /// 执行状态迁移
    ///
    /// # 参数
    /// - `hours_entry`: 完成时录入的总工时; 缺省视为 0 (不是错误)
    ///
    /// # 返回
    /// - Err(InvalidTransition): 迁移不合法
    /// - Err(InvalidHours): 录入工时为负或非有限值
    pub fn apply_transition(
        step: &ProductionStep,
        to: StepStatus,
        hours_entry: Option<f64>,
        now: NaiveDateTime,
    ) -> EngineResult<StepTransitionResult> {
        Self::check_transition(step.status, to)?;

        let mut updated = step.clone();
        let mut hours_entry_ignored = false;

        if to == StepStatus::Completed {
            let entry = hours_entry.unwrap_or(0.0);
            validate_hours(entry)?;
            let accumulated = step.actual_hours.unwrap_or(0.0);
            if entry >= accumulated {
                updated.actual_hours = Some(entry);
            } else {
                hours_entry_ignored = true;
            }
            updated.completed_at = Some(now);
        }
        updated.status = to;

        Ok(StepTransitionResult {
            step: updated,
            hours_entry_ignored,
        })
    }

    /// 派工
    ///
    /// 未派工且 pending 的工序派工后进入 in_progress; 其余情况只改派工人
    ///
    /// # 返回
    /// - Err(InvalidTransition): 工序已完成
    pub fn assign(
        step: &ProductionStep,
        worker_id: &str,
        worker_name: &str,
    ) -> EngineResult<ProductionStep> {
        if step.status == StepStatus::Completed {
            return Err(EngineError::transition("ProductionStep", step.status, "assign"));
        }

        let mut updated = step.clone();
        if !step.is_assigned() && step.status == StepStatus::Pending {
            updated.status = StepStatus::InProgress;
        }
        updated.assigned_worker_id = Some(worker_id.to_string());
        updated.assigned_worker_name = Some(worker_name.to_string());
        Ok(updated)
    }

    /// 追加工时 (非负增量)
    pub fn add_hours(step: &ProductionStep, increment: f64) -> EngineResult<ProductionStep> {
        validate_hours(increment)?;
        let mut updated = step.clone();
        updated.actual_hours = Some(step.actual_hours.unwrap_or(0.0) + increment);
        Ok(updated)
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
    use chrono::NaiveDate;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 5, 4)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap()
    }

    fn new_step() -> ProductionStep {
        ProductionStep::new("J-1".into(), "Trim".into(), "".into(), 2.0, None, now())
    }

    const ALL: [StepStatus; 4] = [
        StepStatus::Pending,
        StepStatus::InProgress,
        StepStatus::Completed,
        StepStatus::Blocked,
    ];

    #[test]
    fn test_transition_table() {
        let allowed = [
            (StepStatus::Pending, StepStatus::InProgress),
            (StepStatus::InProgress, StepStatus::Completed),
            (StepStatus::InProgress, StepStatus::Blocked),
            (StepStatus::Blocked, StepStatus::Pending),
        ];
        for from in ALL {
            for to in ALL {
                assert_eq!(
                    StepLifecycle::can_transition(from, to),
                    allowed.contains(&(from, to)),
                    "{} -> {}",
                    from,
                    to
                );
            }
        }
    }

    #[test]
    fn test_blocked_returns_to_pending_not_in_progress() {
        assert!(!StepLifecycle::can_transition(StepStatus::Blocked, StepStatus::InProgress));
        assert!(StepLifecycle::can_transition(StepStatus::Blocked, StepStatus::Pending));
    }

    #[test]
    fn test_completion_defaults_hours_to_zero() {
        let mut step = new_step();
        step.status = StepStatus::InProgress;
        let result = StepLifecycle::apply_transition(&step, StepStatus::Completed, None, now()).unwrap();
        assert!(result.completed());
        assert_eq!(result.step.actual_hours, Some(0.0));
        assert_eq!(result.step.completed_at, Some(now()));
    }

    #[test]
    fn test_completion_rejects_negative_hours() {
        let mut step = new_step();
        step.status = StepStatus::InProgress;
        assert!(matches!(
            StepLifecycle::apply_transition(&step, StepStatus::Completed, Some(-0.5), now()),
            Err(EngineError::InvalidHours(_))
        ));
    }

    #[test]
    fn test_first_assignment_starts_work() {
        let step = new_step();
        let assigned = StepLifecycle::assign(&step, "w-1", "Ana").unwrap();
        assert_eq!(assigned.status, StepStatus::InProgress);
        assert!(assigned.is_assigned_to("w-1"));

        // 改派不改变状态
        let reassigned = StepLifecycle::assign(&assigned, "w-2", "Bo").unwrap();
        assert_eq!(reassigned.status, StepStatus::InProgress);
        assert!(reassigned.is_assigned_to("w-2"));
    }

    #[test]
    fn test_assignment_of_blocked_step_keeps_status() {
        let mut step = new_step();
        step.status = StepStatus::Blocked;
        let assigned = StepLifecycle::assign(&step, "w-1", "Ana").unwrap();
        assert_eq!(assigned.status, StepStatus::Blocked);
    }

    #[test]
    fn test_cannot_assign_completed_step() {
        let mut step = new_step();
        step.status = StepStatus::Completed;
        assert!(matches!(
            StepLifecycle::assign(&step, "w-1", "Ana"),
            Err(EngineError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_hours_monotonic_over_sequences() {
        // 穷举长度 4 的操作序列 (迁移/追加工时), actual_hours 单调不减
        #[derive(Clone, Copy)]
        enum Op {
            To(StepStatus, Option<f64>),
            Add(f64),
        }
        let ops = [
            Op::To(StepStatus::InProgress, None),
            Op::To(StepStatus::Blocked, None),
            Op::To(StepStatus::Pending, None),
            Op::To(StepStatus::Completed, Some(0.5)),
            Op::To(StepStatus::Completed, None),
            Op::Add(1.0),
            Op::Add(-1.0),
        ];
        for a in ops {
            for b in ops {
                for c in ops {
                    for d in ops {
                        let mut step = new_step();
                        let mut last = 0.0;
                        for op in [a, b, c, d] {
                            let next = match op {
                                Op::To(to, h) => StepLifecycle::apply_transition(&step, to, h, now())
                                    .map(|r| r.step),
                                Op::Add(h) => StepLifecycle::add_hours(&step, h),
                            };
                            if let Ok(s) = next {
                                step = s;
                            }
                            let current = step.actual_hours.unwrap_or(0.0);
                            assert!(current >= last);
                            last = current;
                        }
                    }
                }
            }
        }
    }
}
