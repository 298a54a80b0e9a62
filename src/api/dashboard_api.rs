// ==========================================
// 生产排程核心 - 驾驶舱 API
// ==========================================
// 职责: 一致性快照汇总 + 操作日志查询
// 只读: 不做任何写入
// ==========================================

use std::sync::Arc;

use chrono::NaiveDateTime;

use crate::api::error::{require, ApiError, ApiResult};
use crate::domain::action_log::ActionLog;
use crate::domain::context::OperatorContext;
use crate::repository::action_log_repo::ActionLogRepository;
use crate::repository::dashboard_repo::{DashboardRepository, DashboardSnapshot};

/// 最近操作日志默认条数上限
const MAX_RECENT_ACTIONS: i64 = 500;

// ==========================================
// DashboardApi - 驾驶舱 API
// ==========================================
pub struct DashboardApi {
    dashboard_repo: Arc<DashboardRepository>,
    action_log_repo: Arc<ActionLogRepository>,
}

impl DashboardApi {
    pub fn new(
        dashboard_repo: Arc<DashboardRepository>,
        action_log_repo: Arc<ActionLogRepository>,
    ) -> Self {
        Self {
            dashboard_repo,
            action_log_repo,
        }
    }

    /// 驾驶舱快照 (同一事务内读取)
    pub fn snapshot(&self, ctx: &OperatorContext) -> ApiResult<DashboardSnapshot> {
        self.snapshot_at(ctx, chrono::Local::now().naive_local())
    }

    pub fn snapshot_at(
        &self,
        ctx: &OperatorContext,
        now: NaiveDateTime,
    ) -> ApiResult<DashboardSnapshot> {
        require(ctx.can_view_dashboard(), "dashboard_snapshot", &ctx.actor_id)?;
        Ok(self.dashboard_repo.snapshot(now)?)
    }

    /// 最近操作日志
    ///
    /// # 参数
    /// - limit: 1..=500
    pub fn list_recent_actions(
        &self,
        ctx: &OperatorContext,
        limit: i64,
    ) -> ApiResult<Vec<ActionLog>> {
        require(ctx.can_view_dashboard(), "list_recent_actions", &ctx.actor_id)?;
        if limit <= 0 || limit > MAX_RECENT_ACTIONS {
            return Err(ApiError::InvalidInput(format!(
                "limit 必须在 1..={} 之间: {}",
                MAX_RECENT_ACTIONS, limit
            )));
        }
        Ok(self.action_log_repo.find_recent(limit)?)
    }

    /// 订单相关操作日志 (新在前)
    pub fn list_actions_for_order(
        &self,
        ctx: &OperatorContext,
        order_id: &str,
    ) -> ApiResult<Vec<ActionLog>> {
        require(ctx.can_view_dashboard(), "list_actions_for_order", &ctx.actor_id)?;
        if order_id.trim().is_empty() {
            return Err(ApiError::InvalidInput("订单ID不能为空".to_string()));
        }
        Ok(self.action_log_repo.find_by_order(order_id)?)
    }
}
