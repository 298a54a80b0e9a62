// ==========================================
// 生产排程核心 - 数据仓储层
// ==========================================
// 红线: Repository 不含业务逻辑
// 职责: 提供数据访问接口,屏蔽数据库细节
// 约束: 所有查询使用参数化,防止 SQL 注入
// ==========================================

pub mod action_log_repo;
pub mod booking_repo;
pub mod dashboard_repo;
pub mod error;
pub mod job_repo;
pub mod machine_repo;
pub mod order_repo;
pub mod reconciliation_repo;
pub mod step_repo;

mod row_helpers;

// 重导出核心仓储
pub use action_log_repo::ActionLogRepository;
pub use booking_repo::{BookingRepository, ReleaseSummary};
pub use dashboard_repo::{DashboardRepository, DashboardSnapshot};
pub use error::{RepositoryError, RepositoryResult};
pub use job_repo::JobRepository;
pub use machine_repo::MachineRepository;
pub use order_repo::OrderRepository;
pub use reconciliation_repo::{CascadeReconciliationEntity, ReconciliationRepository};
pub use step_repo::StepRepository;
