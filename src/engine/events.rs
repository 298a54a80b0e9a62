// ==========================================
// 生产排程核心 - 引擎层事件发布
// ==========================================
// 职责: 定义生产事件发布 trait, 级联协调器通过它通知下游
// 说明: Engine 层定义 trait, 外部系统 (通知/看板刷新) 实现适配器
// ==========================================

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::sync::Arc;

// ==========================================
// 生产事件类型
// ==========================================

/// 生产事件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductionEventType {
    /// 作业因全部工序完成而自动完成
    JobAutoCompleted,
    /// 订单生产状态推进为 done
    OrderProductionDone,
    /// 级联写入失败, 已登记待补偿
    CascadeDeferred,
}

impl ProductionEventType {
    /// 转换为字符串标识
    pub fn as_str(&self) -> &str {
        match self {
            ProductionEventType::JobAutoCompleted => "JobAutoCompleted",
            ProductionEventType::OrderProductionDone => "OrderProductionDone",
            ProductionEventType::CascadeDeferred => "CascadeDeferred",
        }
    }
}

/// 生产事件
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductionEvent {
    pub event_type: ProductionEventType,
    pub order_id: String,
    pub job_id: Option<String>,
    /// 事件来源描述
    pub source: Option<String>,
    pub detail: Option<String>,
}

impl ProductionEvent {
    pub fn new(event_type: ProductionEventType, order_id: &str, job_id: Option<&str>) -> Self {
        Self {
            event_type,
            order_id: order_id.to_string(),
            job_id: job_id.map(str::to_string),
            source: None,
            detail: None,
        }
    }

    pub fn with_source(mut self, source: &str) -> Self {
        self.source = Some(source.to_string());
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

// ==========================================
// 事件发布 Trait
// ==========================================

/// 生产事件发布者 Trait
///
/// # 实现说明
/// - 发布失败只记录日志, 不影响触发它的写入
pub trait ProductionEventPublisher: Send + Sync {
    /// 发布生产事件
    ///
    /// # 返回
    /// - `Ok(id)`: 下游分配的ID (如果支持) 或空字符串
    /// - `Err`: 发布失败
    fn publish(&self, event: ProductionEvent) -> Result<String, Box<dyn Error + Send + Sync>>;
}

/// 空操作事件发布者
#[derive(Debug, Clone, Default)]
pub struct NoOpEventPublisher;

impl ProductionEventPublisher for NoOpEventPublisher {
    fn publish(&self, event: ProductionEvent) -> Result<String, Box<dyn Error + Send + Sync>> {
        tracing::debug!(
            "NoOpEventPublisher: 跳过事件发布 - order_id={}, event_type={}",
            event.order_id,
            event.event_type.as_str()
        );
        Ok(String::new())
    }
}

/// 可选的事件发布者包装
///
/// 简化 Option<Arc<dyn ProductionEventPublisher>> 的使用
#[derive(Clone)]
pub struct OptionalEventPublisher {
    inner: Option<Arc<dyn ProductionEventPublisher>>,
}

impl OptionalEventPublisher {
    /// 创建带发布者的实例
    pub fn with_publisher(publisher: Arc<dyn ProductionEventPublisher>) -> Self {
        Self {
            inner: Some(publisher),
        }
    }

    /// 创建空实例（不发布事件）
    pub fn none() -> Self {
        Self { inner: None }
    }

    /// 发布事件（如果有发布者）
    ///
    /// 发布失败记录 warn 日志后吞掉
    pub fn publish(&self, event: ProductionEvent) {
        let event_type = event.event_type;
        let order_id = event.order_id.clone();
        match &self.inner {
            Some(publisher) => {
                if let Err(e) = publisher.publish(event) {
                    tracing::warn!(
                        order_id = %order_id,
                        event_type = event_type.as_str(),
                        error = %e,
                        "生产事件发布失败"
                    );
                }
            }
            None => {
                tracing::debug!(
                    "OptionalEventPublisher: 未配置发布者，跳过事件 - order_id={}, event_type={}",
                    order_id,
                    event_type.as_str()
                );
            }
        }
    }

    /// 检查是否配置了发布者
    pub fn is_configured(&self) -> bool {
        self.inner.is_some()
    }
}

impl Default for OptionalEventPublisher {
    fn default() -> Self {
        Self::none()
    }
}
