// ==========================================
// 生产排程核心 - API 层
// ==========================================
// 职责: 供订单/机台/任务界面调用的业务接口
// 每个写操作: 校验输入 → 检查操作者能力 → 仓储/引擎 → 记录 ActionLog
// ==========================================

pub mod booking_api;
pub mod config_api;
pub mod dashboard_api;
pub mod error;
pub mod machine_api;
pub mod order_status_api;
pub mod production_api;
pub mod task_api;

// 重导出核心类型
pub use booking_api::{BookingApi, BookingCompletion, BookingPreview};
pub use config_api::ConfigApi;
pub use dashboard_api::DashboardApi;
pub use error::{ApiError, ApiResult};
pub use machine_api::{MachineApi, NewMachine};
pub use order_status_api::OrderStatusApi;
pub use production_api::{JobTimer, JobTransitionOutcome, ProductionApi};
pub use task_api::{StepUpdateOutcome, TaskApi, WorkerTask};
