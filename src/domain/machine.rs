// ==========================================
// 生产排程核心 - 机台领域模型
// ==========================================
// 红线: estimated_free_time 只在 status = occupied 时存在
//       离开 occupied 时必须同步清空 (含 current_order_id)
// ==========================================

use crate::domain::types::{MachineStatus, MachineType};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

// ==========================================
// Machine - 机台
// ==========================================
// 对齐: machines 表
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Machine {
    // ===== 主键 =====
    pub machine_id: String,

    // ===== 基本信息 =====
    pub name: String,
    pub description: String,
    pub machine_type: MachineType,
    pub specifications: Option<String>, // 自由文本规格

    // ===== 占用状态 (成对更新) =====
    pub status: MachineStatus,
    pub current_order_id: Option<String>,            // 当前占用订单
    pub estimated_free_time: Option<NaiveDateTime>,  // 预计空闲时间

    pub created_at: NaiveDateTime,
}

impl Machine {
    /// 创建新机台 (初始为空闲)
    pub fn new(
        name: String,
        description: String,
        machine_type: MachineType,
        specifications: Option<String>,
    ) -> Self {
        Self {
            machine_id: uuid::Uuid::new_v4().to_string(),
            name,
            description,
            machine_type,
            specifications,
            status: MachineStatus::Free,
            current_order_id: None,
            estimated_free_time: None,
            created_at: chrono::Local::now().naive_local(),
        }
    }

    /// 判断占用字段是否满足成对约束
    pub fn is_consistent(&self) -> bool {
        match self.status {
            MachineStatus::Occupied => self.estimated_free_time.is_some(),
            MachineStatus::Free | MachineStatus::Maintenance => {
                self.estimated_free_time.is_none() && self.current_order_id.is_none()
            }
        }
    }

    /// 相对 now 的剩余等待秒数 (非占用或已过期返回 0)
    pub fn wait_seconds_from(&self, now: NaiveDateTime) -> i64 {
        match (self.status, self.estimated_free_time) {
            (MachineStatus::Occupied, Some(free_at)) => (free_at - now).num_seconds().max(0),
            _ => 0,
        }
    }
}

// ==========================================
// MachineStateChange - 机台状态变更
// ==========================================
// 每个变更都一次性给出 (status, estimated_free_time, current_order_id) 三列,
// 仓储层以单条 UPDATE 写入
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MachineStateChange {
    /// 占用 (必须带预计空闲时间)
    Occupy {
        estimated_free_time: NaiveDateTime,
        order_id: Option<String>,
    },
    /// 释放为空闲
    Release,
    /// 进入维护
    Maintenance,
}

impl MachineStateChange {
    /// 展开为持久化列值
    pub fn columns(&self) -> (MachineStatus, Option<NaiveDateTime>, Option<String>) {
        match self {
            MachineStateChange::Occupy {
                estimated_free_time,
                order_id,
            } => (
                MachineStatus::Occupied,
                Some(*estimated_free_time),
                order_id.clone(),
            ),
            MachineStateChange::Release => (MachineStatus::Free, None, None),
            MachineStateChange::Maintenance => (MachineStatus::Maintenance, None, None),
        }
    }

    /// 作用于内存中的机台
    pub fn apply_to(&self, machine: &mut Machine) {
        let (status, free_at, order_id) = self.columns();
        machine.status = status;
        machine.estimated_free_time = free_at;
        machine.current_order_id = order_id;
    }
}
