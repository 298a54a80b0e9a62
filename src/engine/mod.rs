// ==========================================
// 生产排程核心 - 引擎层
// ==========================================
// 职责: 实现业务规则, 不拼 SQL
// 红线: 预估/状态机为纯函数; 级联协调器只通过仓储访问数据
// ==========================================

pub mod availability;
pub mod booking_lifecycle;
pub mod cascade;
pub mod error;
pub mod events;
pub mod job_lifecycle;
pub mod step_lifecycle;

// 重导出核心引擎
pub use availability::{AvailabilityEstimate, AvailabilityEstimator, MachineWait};
pub use booking_lifecycle::BookingLifecycle;
pub use cascade::{
    all_jobs_completed, CascadeOutcome, CascadeRetryPolicy, ReconcileReport,
    StatusCascadeCoordinator,
};
pub use error::{EngineError, EngineResult};
pub use events::{
    NoOpEventPublisher, OptionalEventPublisher, ProductionEvent, ProductionEventPublisher,
    ProductionEventType,
};
pub use job_lifecycle::{all_steps_completed, JobLifecycle, JobTransitionResult};
pub use step_lifecycle::{StepLifecycle, StepTransitionResult};
