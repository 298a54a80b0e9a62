// ==========================================
// 生产排程核心 - 领域模型层
// ==========================================
// 职责: 定义领域实体、类型、操作者上下文
// 红线: 不含数据访问逻辑,不含引擎逻辑
// ==========================================

pub mod action_log;
pub mod booking;
pub mod context;
pub mod job;
pub mod machine;
pub mod order;
pub mod step;
pub mod types;

// 重导出核心类型
pub use action_log::{ActionLog, ActionType};
pub use booking::{Booking, BookingLine, BookingRequest, OrderDraft};
pub use context::OperatorContext;
pub use job::{NewJob, ProductionJob};
pub use machine::{Machine, MachineStateChange};
pub use order::OrderProductionView;
pub use step::{NewStep, ProductionStep};
pub use types::{
    BookingStatus, JobPriority, JobStatus, MachineStatus, MachineType, ProductionStatus,
    StepStatus, UserRole,
};
