// ==========================================
// 生产排程核心 - 工序 (工人任务) 领域模型
// ==========================================

use crate::domain::types::StepStatus;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

// ==========================================
// ProductionStep - 工序
// ==========================================
// 对齐: production_steps 表
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductionStep {
    pub step_id: String,
    pub job_id: String,
    pub title: String,
    pub description: String,

    // ===== 分派 =====
    pub assigned_worker_id: Option<String>,
    pub assigned_worker_name: Option<String>,

    pub status: StepStatus,
    pub estimated_hours: f64,
    pub actual_hours: Option<f64>,
    pub notes: Option<String>,

    pub created_at: NaiveDateTime,
    pub completed_at: Option<NaiveDateTime>,

    // ===== 关联作业 (只读, 查询时带出) =====
    pub job_title: Option<String>,
    pub order_id: Option<String>,
}

impl ProductionStep {
    pub fn new(
        job_id: String,
        title: String,
        description: String,
        estimated_hours: f64,
        notes: Option<String>,
        now: NaiveDateTime,
    ) -> Self {
        Self {
            step_id: uuid::Uuid::new_v4().to_string(),
            job_id,
            title,
            description,
            assigned_worker_id: None,
            assigned_worker_name: None,
            status: StepStatus::Pending,
            estimated_hours,
            actual_hours: None,
            notes,
            created_at: now,
            completed_at: None,
            job_title: None,
            order_id: None,
        }
    }

    pub fn is_assigned(&self) -> bool {
        self.assigned_worker_id.is_some()
    }

    pub fn is_assigned_to(&self, worker_id: &str) -> bool {
        self.assigned_worker_id.as_deref() == Some(worker_id)
    }

    /// 进度百分比 = actual / estimated, 截断到 [0, 100]
    pub fn progress_pct(&self) -> f64 {
        if self.estimated_hours <= 0.0 {
            return 0.0;
        }
        let pct = self.actual_hours.unwrap_or(0.0) / self.estimated_hours * 100.0;
        pct.clamp(0.0, 100.0)
    }
}

// ==========================================
// NewStep - 创建工序输入
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewStep {
    pub job_id: String,
    pub title: String,
    pub description: String,
    pub estimated_hours: f64,
    pub notes: Option<String>,
}
