// ==========================================
// 生产排程核心 - 订单生产状态视图
// ==========================================
// 订单本身由外部 CRUD 管理, 核心只关心 production_status
// ==========================================

use crate::domain::types::ProductionStatus;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// 订单生产状态视图
/// 对齐: orders 表 (核心只读写 production_status)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderProductionView {
    pub order_id: String,
    pub production_status: ProductionStatus,
    pub updated_at: NaiveDateTime,
    pub updated_by: Option<String>,
}
