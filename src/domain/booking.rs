// ==========================================
// 生产排程核心 - 机台预约领域模型
// ==========================================
// 一个预约属于唯一订单, 引用唯一机台
// 同一订单内机台不可重复
// ==========================================

use crate::domain::types::{BookingStatus, MachineStatus};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

// ==========================================
// Booking - 订单对机台的预约
// ==========================================
// 对齐: order_bookings 表
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub booking_id: String,
    pub order_id: String,
    pub machine_id: String,
    pub machine_name: String, // 机台名称快照 (不随机台改名变化)
    pub estimated_hours: i64,
    pub status: BookingStatus,
    pub start_time: Option<NaiveDateTime>,
    pub end_time: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
}

impl Booking {
    /// 由已校验的预约行生成 Scheduled 预约
    pub fn scheduled(order_id: &str, line: &BookingLine, now: NaiveDateTime) -> Self {
        Self {
            booking_id: uuid::Uuid::new_v4().to_string(),
            order_id: order_id.to_string(),
            machine_id: line.machine_id.clone(),
            machine_name: line.machine_name.clone(),
            estimated_hours: line.estimated_hours,
            status: BookingStatus::Scheduled,
            start_time: None,
            end_time: None,
            created_at: now,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == BookingStatus::Running
    }
}

// ==========================================
// BookingRequest - 预约请求 (machine_id, estimated_hours)
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingRequest {
    pub machine_id: String,
    pub estimated_hours: i64,
}

impl BookingRequest {
    pub fn new(machine_id: impl Into<String>, estimated_hours: i64) -> Self {
        Self {
            machine_id: machine_id.into(),
            estimated_hours,
        }
    }

    /// 从界面输入的原始文本解析
    ///
    /// # 返回
    /// - Ok: 正整数小时
    /// - Err(raw): 非数值/小数/非正数, 交给上层转为 InvalidHours
    pub fn parse(machine_id: impl Into<String>, raw_hours: &str) -> Result<Self, String> {
        let trimmed = raw_hours.trim();
        match trimmed.parse::<i64>() {
            Ok(h) if h > 0 => Ok(Self::new(machine_id, h)),
            _ => Err(trimmed.to_string()),
        }
    }
}

// ==========================================
// OrderDraft - 待提交的订单草稿
// ==========================================
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderDraft {
    /// 编辑已有订单时填写
    pub order_id: Option<String>,
    /// 展示用标签 (客户/品名等)
    pub label: Option<String>,
}

// ==========================================
// BookingLine - 预览中的单行
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingLine {
    pub machine_id: String,
    pub machine_name: String,
    pub machine_status: MachineStatus,
    pub estimated_hours: i64,
}
