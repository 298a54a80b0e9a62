// ==========================================
// 生产排程核心 - 生产作业领域模型
// ==========================================
// 红线: completed_at 当且仅当 status = completed 时存在
// 红线: actual_hours 只增不减
// ==========================================

use crate::domain::types::{JobPriority, JobStatus};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

// ==========================================
// ProductionJob - 生产作业
// ==========================================
// 对齐: production_jobs 表
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductionJob {
    pub job_id: String,
    pub order_id: String,
    pub title: String,
    pub description: String,
    pub status: JobStatus,
    pub priority: JobPriority,
    pub estimated_hours: f64,

    // ===== 工时 =====
    pub actual_hours: Option<f64>,          // 截至上次检查点的累计工时
    pub started_at: Option<NaiveDateTime>,  // 检查点 (仅 in_progress 时存在)

    pub created_at: NaiveDateTime,
    pub completed_at: Option<NaiveDateTime>,
}

impl ProductionJob {
    pub fn new(
        order_id: String,
        title: String,
        description: String,
        priority: JobPriority,
        estimated_hours: f64,
        now: NaiveDateTime,
    ) -> Self {
        Self {
            job_id: uuid::Uuid::new_v4().to_string(),
            order_id,
            title,
            description,
            status: JobStatus::Created,
            priority,
            estimated_hours,
            actual_hours: None,
            started_at: None,
            created_at: now,
            completed_at: None,
        }
    }

    /// 已累计工时 (未设置视为 0)
    pub fn accumulated_hours(&self) -> f64 {
        self.actual_hours.unwrap_or(0.0)
    }

    /// 展示用实时工时 = 累计工时 + 检查点以来的流逝时间
    ///
    /// 核心不维护计时循环, 由展示层按需调用
    pub fn live_hours(&self, now: NaiveDateTime) -> f64 {
        let running = match (self.status, self.started_at) {
            (JobStatus::InProgress, Some(since)) => elapsed_hours(since, now),
            _ => 0.0,
        };
        self.accumulated_hours() + running
    }
}

/// 两个时间点之间的小时数 (倒序返回 0)
pub fn elapsed_hours(since: NaiveDateTime, now: NaiveDateTime) -> f64 {
    ((now - since).num_seconds() as f64 / 3600.0).max(0.0)
}

// ==========================================
// NewJob - 创建作业输入
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewJob {
    pub order_id: String,
    pub title: String,
    pub description: String,
    pub priority: Option<JobPriority>,
    pub estimated_hours: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    #[test]
    fn test_live_hours_only_counts_while_running() {
        let t0 = NaiveDate::from_ymd_opt(2026, 3, 2)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap();
        let mut job = ProductionJob::new(
            "O1".into(),
            "Print run".into(),
            "".into(),
            JobPriority::Medium,
            4.0,
            t0,
        );
        assert_eq!(job.live_hours(t0 + Duration::hours(3)), 0.0);

        job.status = JobStatus::InProgress;
        job.actual_hours = Some(1.0);
        job.started_at = Some(t0);
        assert!((job.live_hours(t0 + Duration::minutes(30)) - 1.5).abs() < 1e-9);

        job.status = JobStatus::OnHold;
        job.started_at = None;
        assert_eq!(job.live_hours(t0 + Duration::hours(5)), 1.0);
    }
}
