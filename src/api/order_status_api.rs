// ==========================================
// 生产排程核心 - 订单生产状态 API
// ==========================================
// 职责: 订单登记、生产状态查询与人工覆写
// 红线: production_status 只由级联或人工覆写写入
// ==========================================

use std::sync::Arc;

use chrono::NaiveDateTime;

use crate::api::error::{require, ApiError, ApiResult};
use crate::domain::action_log::{ActionLog, ActionType};
use crate::domain::context::OperatorContext;
use crate::domain::order::OrderProductionView;
use crate::domain::types::ProductionStatus;
use crate::repository::action_log_repo::ActionLogRepository;
use crate::repository::order_repo::OrderRepository;

pub struct OrderStatusApi {
    order_repo: Arc<OrderRepository>,
    action_log_repo: Arc<ActionLogRepository>,
}

impl OrderStatusApi {
    pub fn new(order_repo: Arc<OrderRepository>, action_log_repo: Arc<ActionLogRepository>) -> Self {
        Self {
            order_repo,
            action_log_repo,
        }
    }

    /// 登记订单 (初始 production_status = start)
    pub fn register_order(
        &self,
        ctx: &OperatorContext,
        order_id: &str,
    ) -> ApiResult<OrderProductionView> {
        self.register_order_at(ctx, order_id, chrono::Local::now().naive_local())
    }

    pub fn register_order_at(
        &self,
        ctx: &OperatorContext,
        order_id: &str,
        now: NaiveDateTime,
    ) -> ApiResult<OrderProductionView> {
        require(ctx.can_schedule(), "register_order", &ctx.actor_id)?;
        if order_id.trim().is_empty() {
            return Err(ApiError::InvalidInput("订单ID不能为空".to_string()));
        }

        self.order_repo.register(order_id, now, &ctx.actor_id)?;
        self.action_log_repo.insert(
            &ActionLog::new(ctx, ActionType::RegisterOrder)
                .at(now)
                .order(order_id),
        )?;

        tracing::info!(order_id, "订单已登记");
        Ok(self.order_repo.get(order_id)?)
    }

    pub fn get_order_status(&self, order_id: &str) -> ApiResult<OrderProductionView> {
        Ok(self.order_repo.get(order_id)?)
    }

    /// 人工覆写生产状态 (唯一允许把 done 降级的入口)
    pub fn override_production_status(
        &self,
        ctx: &OperatorContext,
        order_id: &str,
        status: ProductionStatus,
        reason: &str,
    ) -> ApiResult<OrderProductionView> {
        require(
            ctx.can_override_order_status(),
            "override_production_status",
            &ctx.actor_id,
        )?;

        let now = chrono::Local::now().naive_local();
        let before = self.order_repo.get(order_id)?;
        self.order_repo
            .set_production_status(order_id, status, now, &ctx.actor_id)?;

        self.action_log_repo.insert(
            &ActionLog::new(ctx, ActionType::ProductionStatusOverride)
                .at(now)
                .order(order_id)
                .payload(serde_json::json!({
                    "from": before.production_status.to_db_str(),
                    "to": status.to_db_str(),
                    "reason": reason,
                }))
                .detail(format!(
                    "生产状态覆写: {} → {}",
                    before.production_status, status
                )),
        )?;

        tracing::info!(order_id, from = %before.production_status, to = %status, "订单生产状态已覆写");
        Ok(self.order_repo.get(order_id)?)
    }
}
