// ==========================================
// 生产排程核心 - 核心库
// ==========================================
// 范围: 机台登记 / 预约台账 / 可用时间预估 / 作业与工序状态机 / 完工级联
// 技术栈: Rust + SQLite
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 引擎层 - 业务规则
pub mod engine;

// 配置层 - 系统配置
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一/建表）
pub mod db;

// 日志系统
pub mod logging;

// API 层 - 业务接口
pub mod api;

// 应用层 - 装配
pub mod app;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{
    BookingStatus, JobPriority, JobStatus, MachineStatus, MachineType, ProductionStatus,
    StepStatus, UserRole,
};

// 领域实体
pub use domain::{
    ActionLog, ActionType, Booking, BookingRequest, Machine, OperatorContext,
    OrderProductionView, ProductionJob, ProductionStep,
};

// 引擎
pub use engine::{
    AvailabilityEstimate, AvailabilityEstimator, BookingLifecycle, JobLifecycle,
    StatusCascadeCoordinator, StepLifecycle,
};

// API
pub use api::{
    ApiError, ApiResult, BookingApi, DashboardApi, MachineApi, OrderStatusApi, ProductionApi,
    TaskApi,
};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "生产排程核心";
