// ==========================================
// 生产排程核心 - 操作者上下文
// ==========================================
// 登录态/角色由外部系统维护, 每个核心操作显式传入,
// 核心不读取任何全局会话
// ==========================================

use crate::domain::types::UserRole;
use serde::{Deserialize, Serialize};

/// 操作者上下文 (能力对象)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperatorContext {
    pub actor_id: String,
    pub actor_name: String,
    pub role: UserRole,
}

impl OperatorContext {
    pub fn new(actor_id: impl Into<String>, actor_name: impl Into<String>, role: UserRole) -> Self {
        Self {
            actor_id: actor_id.into(),
            actor_name: actor_name.into(),
            role,
        }
    }

    /// 系统内部操作 (级联补偿等)
    pub fn system() -> Self {
        Self::new("system", "system", UserRole::SuperAdmin)
    }

    /// 可排程: 提交/编辑预约, 启停预约, 覆写机台状态
    pub fn can_schedule(&self) -> bool {
        matches!(
            self.role,
            UserRole::SuperAdmin | UserRole::Admin | UserRole::ProductionManager
        )
    }

    /// 可管理作业 (创建/推进作业, 创建工序, 派工)
    pub fn can_manage_jobs(&self) -> bool {
        self.can_schedule()
    }

    /// 可执行工序 (更新状态/报工)
    pub fn can_work_steps(&self) -> bool {
        self.can_manage_jobs() || self.role == UserRole::Worker
    }

    /// 可人工覆写订单生产状态
    pub fn can_override_order_status(&self) -> bool {
        self.can_schedule()
    }

    /// 可查看驾驶舱汇总
    pub fn can_view_dashboard(&self) -> bool {
        self.role != UserRole::Customer
    }

    pub fn is_worker(&self) -> bool {
        self.role == UserRole::Worker
    }
}
