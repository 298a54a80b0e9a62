// ==========================================
// 生产排程核心 - 操作日志领域模型
// ==========================================
// 红线: 所有写入必须记录
// 用途: 审计追踪
// ==========================================

use crate::domain::context::OperatorContext;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

// ==========================================
// ActionLog - 操作日志
// ==========================================
// 对齐: action_log 表
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionLog {
    pub action_id: String,
    pub action_type: String,      // 操作类型 (存储为字符串)
    pub action_ts: NaiveDateTime,
    pub actor: String,

    // ===== 关联对象 =====
    pub order_id: Option<String>,
    pub machine_id: Option<String>,

    pub payload_json: Option<JsonValue>, // 操作参数 (JSON)
    pub detail: Option<String>,
}

impl ActionLog {
    /// 以当前时间创建日志
    pub fn new(ctx: &OperatorContext, action_type: ActionType) -> Self {
        Self {
            action_id: uuid::Uuid::new_v4().to_string(),
            action_type: action_type.as_str().to_string(),
            action_ts: chrono::Local::now().naive_local(),
            actor: ctx.actor_id.clone(),
            order_id: None,
            machine_id: None,
            payload_json: None,
            detail: None,
        }
    }

    /// 覆盖操作时间 (与业务写入使用同一时刻)
    pub fn at(mut self, ts: NaiveDateTime) -> Self {
        self.action_ts = ts;
        self
    }

    pub fn order(mut self, order_id: &str) -> Self {
        self.order_id = Some(order_id.to_string());
        self
    }

    pub fn machine(mut self, machine_id: &str) -> Self {
        self.machine_id = Some(machine_id.to_string());
        self
    }

    pub fn payload(mut self, payload: JsonValue) -> Self {
        self.payload_json = Some(payload);
        self
    }

    pub fn detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

// ==========================================
// ActionType - 操作类型
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionType {
    CreateMachine,
    MachineStatusOverride,
    CommitBookings,
    ReplaceBookings,
    StartBooking,
    CompleteBooking,
    ReleaseOrderBookings,
    CreateJob,
    JobTransition,
    JobHoursCheckpoint,
    CreateStep,
    AssignStep,
    StepTransition,
    StepHoursEntry,
    RegisterOrder,
    ProductionStatusOverride,
    CascadeReconcile,
    UpdateConfig,
}

impl ActionType {
    /// 转换为字符串 (用于数据库存储)
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::CreateMachine => "CreateMachine",
            ActionType::MachineStatusOverride => "MachineStatusOverride",
            ActionType::CommitBookings => "CommitBookings",
            ActionType::ReplaceBookings => "ReplaceBookings",
            ActionType::StartBooking => "StartBooking",
            ActionType::CompleteBooking => "CompleteBooking",
            ActionType::ReleaseOrderBookings => "ReleaseOrderBookings",
            ActionType::CreateJob => "CreateJob",
            ActionType::JobTransition => "JobTransition",
            ActionType::JobHoursCheckpoint => "JobHoursCheckpoint",
            ActionType::CreateStep => "CreateStep",
            ActionType::AssignStep => "AssignStep",
            ActionType::StepTransition => "StepTransition",
            ActionType::StepHoursEntry => "StepHoursEntry",
            ActionType::RegisterOrder => "RegisterOrder",
            ActionType::ProductionStatusOverride => "ProductionStatusOverride",
            ActionType::CascadeReconcile => "CascadeReconcile",
            ActionType::UpdateConfig => "UpdateConfig",
        }
    }
}
