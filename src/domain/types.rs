// ==========================================
// 生产排程核心 - 领域类型定义
// ==========================================
// 职责: 机台/预约/作业/工序/订单生产状态的枚举
// 序列化格式: snake_case (与数据库存储一致)
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// 机台类型 (Machine Type)
// ==========================================
// 固定枚举集合: 印刷 / 模切 / 覆膜 / 包装
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MachineType {
    Printing,   // 印刷
    Cutting,    // 模切
    Laminating, // 覆膜
    Packaging,  // 包装
}

impl MachineType {
    /// 从字符串解析机台类型
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "printing" => Some(MachineType::Printing),
            "cutting" => Some(MachineType::Cutting),
            "laminating" => Some(MachineType::Laminating),
            "packaging" => Some(MachineType::Packaging),
            _ => None,
        }
    }

    /// 转换为数据库存储的字符串
    pub fn to_db_str(&self) -> &'static str {
        match self {
            MachineType::Printing => "printing",
            MachineType::Cutting => "cutting",
            MachineType::Laminating => "laminating",
            MachineType::Packaging => "packaging",
        }
    }
}

impl fmt::Display for MachineType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

// ==========================================
// 机台状态 (Machine Status)
// ==========================================
// 红线: Occupied 时必须带预计空闲时间, 其余状态必须为空
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MachineStatus {
    Free,        // 空闲
    Occupied,    // 占用
    Maintenance, // 维护
}

impl MachineStatus {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "free" => Some(MachineStatus::Free),
            "occupied" => Some(MachineStatus::Occupied),
            "maintenance" => Some(MachineStatus::Maintenance),
            _ => None,
        }
    }

    pub fn to_db_str(&self) -> &'static str {
        match self {
            MachineStatus::Free => "free",
            MachineStatus::Occupied => "occupied",
            MachineStatus::Maintenance => "maintenance",
        }
    }
}

impl fmt::Display for MachineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

// ==========================================
// 预约状态 (Booking Status)
// ==========================================
// 生命周期: Scheduled → Running → Completed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Scheduled, // 已排程
    Running,   // 生产中
    Completed, // 已完成
}

impl BookingStatus {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "scheduled" => Some(BookingStatus::Scheduled),
            "running" => Some(BookingStatus::Running),
            "completed" => Some(BookingStatus::Completed),
            _ => None,
        }
    }

    pub fn to_db_str(&self) -> &'static str {
        match self {
            BookingStatus::Scheduled => "scheduled",
            BookingStatus::Running => "running",
            BookingStatus::Completed => "completed",
        }
    }

    /// 是否允许迁移到目标状态 (只允许单步前进)
    pub fn can_transition_to(&self, target: BookingStatus) -> bool {
        matches!(
            (self, target),
            (BookingStatus::Scheduled, BookingStatus::Running)
                | (BookingStatus::Running, BookingStatus::Completed)
        )
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

// ==========================================
// 生产作业状态 (Job Status)
// ==========================================
// 状态机: Created → InProgress → Completed, InProgress ↔ OnHold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Created,    // 已创建
    InProgress, // 进行中
    Completed,  // 已完成 (终态)
    OnHold,     // 暂停
}

impl JobStatus {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "created" => Some(JobStatus::Created),
            "in_progress" => Some(JobStatus::InProgress),
            "completed" => Some(JobStatus::Completed),
            "on_hold" => Some(JobStatus::OnHold),
            _ => None,
        }
    }

    pub fn to_db_str(&self) -> &'static str {
        match self {
            JobStatus::Created => "created",
            JobStatus::InProgress => "in_progress",
            JobStatus::Completed => "completed",
            JobStatus::OnHold => "on_hold",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

// ==========================================
// 作业优先级 (Job Priority)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobPriority {
    Low,
    Medium,
    High,
}

impl JobPriority {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "low" => Some(JobPriority::Low),
            "medium" => Some(JobPriority::Medium),
            "high" => Some(JobPriority::High),
            _ => None,
        }
    }

    pub fn to_db_str(&self) -> &'static str {
        match self {
            JobPriority::Low => "low",
            JobPriority::Medium => "medium",
            JobPriority::High => "high",
        }
    }
}

impl fmt::Display for JobPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

// ==========================================
// 工序状态 (Step Status)
// ==========================================
// 状态机: Pending → InProgress → Completed
// 逃逸路径: InProgress → Blocked → Pending (重新分诊)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,    // 待处理
    InProgress, // 进行中
    Completed,  // 已完成
    Blocked,    // 阻塞
}

impl StepStatus {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Some(StepStatus::Pending),
            "in_progress" => Some(StepStatus::InProgress),
            "completed" => Some(StepStatus::Completed),
            "blocked" => Some(StepStatus::Blocked),
            _ => None,
        }
    }

    pub fn to_db_str(&self) -> &'static str {
        match self {
            StepStatus::Pending => "pending",
            StepStatus::InProgress => "in_progress",
            StepStatus::Completed => "completed",
            StepStatus::Blocked => "blocked",
        }
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

// ==========================================
// 订单生产状态 (Production Status)
// ==========================================
// 只由完工级联或人工覆写写入
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductionStatus {
    Start,   // 开始
    Waiting, // 等待
    Done,    // 完成
}

impl ProductionStatus {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "start" => Some(ProductionStatus::Start),
            "waiting" => Some(ProductionStatus::Waiting),
            "done" => Some(ProductionStatus::Done),
            _ => None,
        }
    }

    pub fn to_db_str(&self) -> &'static str {
        match self {
            ProductionStatus::Start => "start",
            ProductionStatus::Waiting => "waiting",
            ProductionStatus::Done => "done",
        }
    }
}

impl fmt::Display for ProductionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

// ==========================================
// 用户角色 (User Role)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    SuperAdmin,
    Admin,
    Accounts,
    ProductionManager,
    Dispatch,
    Worker,
    Customer,
}

impl UserRole {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "super_admin" => Some(UserRole::SuperAdmin),
            "admin" => Some(UserRole::Admin),
            "accounts" => Some(UserRole::Accounts),
            "production_manager" => Some(UserRole::ProductionManager),
            "dispatch" => Some(UserRole::Dispatch),
            "worker" => Some(UserRole::Worker),
            "customer" => Some(UserRole::Customer),
            _ => None,
        }
    }

    pub fn to_db_str(&self) -> &'static str {
        match self {
            UserRole::SuperAdmin => "super_admin",
            UserRole::Admin => "admin",
            UserRole::Accounts => "accounts",
            UserRole::ProductionManager => "production_manager",
            UserRole::Dispatch => "dispatch",
            UserRole::Worker => "worker",
            UserRole::Customer => "customer",
        }
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_db_round_trip_names() {
        assert_eq!(JobStatus::from_str("in_progress"), Some(JobStatus::InProgress));
        assert_eq!(JobStatus::OnHold.to_db_str(), "on_hold");
        assert_eq!(StepStatus::from_str("BLOCKED"), Some(StepStatus::Blocked));
        assert_eq!(MachineStatus::from_str("unknown"), None);
        assert_eq!(ProductionStatus::Done.to_string(), "done");
    }

    #[test]
    fn test_booking_status_only_moves_forward() {
        assert!(BookingStatus::Scheduled.can_transition_to(BookingStatus::Running));
        assert!(BookingStatus::Running.can_transition_to(BookingStatus::Completed));
        assert!(!BookingStatus::Scheduled.can_transition_to(BookingStatus::Completed));
        assert!(!BookingStatus::Completed.can_transition_to(BookingStatus::Running));
        assert!(!BookingStatus::Running.can_transition_to(BookingStatus::Running));
    }

    #[test]
    fn test_serde_uses_snake_case() {
        let json = serde_json::to_string(&UserRole::ProductionManager).unwrap();
        assert_eq!(json, "\"production_manager\"");
        let status: JobStatus = serde_json::from_str("\"on_hold\"").unwrap();
        assert_eq!(status, JobStatus::OnHold);
    }
}
