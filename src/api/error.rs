// ==========================================
// 生产排程核心 - API层错误类型
// ==========================================
// 职责: 定义API层错误类型, 把仓储/引擎错误转换为调用方可处理的类型化结果
// 约定: 所有错误直接返回给调用方, 不吞掉
// ==========================================

use crate::engine::error::EngineError;
use crate::repository::error::RepositoryError;
use thiserror::Error;

/// API层错误类型
#[derive(Error, Debug)]
pub enum ApiError {
    // ==========================================
    // 调度核心错误
    // ==========================================
    #[error("资源未找到: {0}")]
    NotFound(String),

    #[error("工时非法: {0}")]
    InvalidHours(String),

    #[error("机台重复预约: machine_id={0}")]
    DuplicateMachine(String),

    #[error("无效的状态转换: {entity} from={from} to={to}")]
    InvalidTransition {
        entity: String,
        from: String,
        to: String,
    },

    #[error("并发冲突: {0}")]
    ConcurrencyConflict(String),

    // ==========================================
    // 权限/输入错误
    // ==========================================
    #[error("权限不足: {0}")]
    PermissionDenied(String),

    #[error("无效输入: {0}")]
    InvalidInput(String),

    #[error("业务规则违反: {0}")]
    BusinessRuleViolation(String),

    #[error("数据验证失败: {0}")]
    ValidationError(String),

    // ==========================================
    // 数据访问错误
    // ==========================================
    #[error("数据库错误: {0}")]
    DatabaseError(String),

    #[error("数据库连接失败: {0}")]
    DatabaseConnectionError(String),

    #[error("数据库事务失败: {0}")]
    DatabaseTransactionError(String),

    // ==========================================
    // 通用错误
    // ==========================================
    #[error("内部错误: {0}")]
    InternalError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

// ==========================================
// 从 RepositoryError 转换
// ==========================================
impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::ConcurrencyConflict {
                entity,
                id,
                message,
            } => ApiError::ConcurrencyConflict(format!("{}(id={}) {}", entity, id, message)),

            RepositoryError::NotFound { entity, id } => {
                ApiError::NotFound(format!("{}(id={})不存在", entity, id))
            }
            RepositoryError::DatabaseConnectionError(msg) => ApiError::DatabaseConnectionError(msg),
            RepositoryError::DatabaseTransactionError(msg) => {
                ApiError::DatabaseTransactionError(msg)
            }
            RepositoryError::LockError(msg) => {
                ApiError::DatabaseConnectionError(format!("数据库锁获取失败: {}", msg))
            }
            RepositoryError::DatabaseQueryError(msg) => ApiError::DatabaseError(msg),
            RepositoryError::UniqueConstraintViolation(msg) => {
                ApiError::BusinessRuleViolation(format!("唯一约束违反: {}", msg))
            }
            RepositoryError::ForeignKeyViolation(msg) => {
                ApiError::BusinessRuleViolation(format!("外键约束违反: {}", msg))
            }

            RepositoryError::BusinessRuleViolation(msg) => ApiError::BusinessRuleViolation(msg),
            RepositoryError::InvalidStateTransition { from, to } => ApiError::InvalidTransition {
                entity: "record".to_string(),
                from,
                to,
            },

            RepositoryError::ValidationError(msg) => ApiError::ValidationError(msg),

            RepositoryError::InternalError(msg) => ApiError::InternalError(msg),
            RepositoryError::Other(err) => ApiError::Other(err),
        }
    }
}

// ==========================================
// 从 EngineError 转换
// ==========================================
impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::InvalidTransition { entity, from, to } => {
                ApiError::InvalidTransition { entity, from, to }
            }
            EngineError::InvalidHours(msg) => ApiError::InvalidHours(msg),
            EngineError::DuplicateMachine(machine_id) => ApiError::DuplicateMachine(machine_id),
            EngineError::ConcurrencyConflict(msg) => ApiError::ConcurrencyConflict(msg),
        }
    }
}

/// Result 类型别名
pub type ApiResult<T> = Result<T, ApiError>;

/// 权限检查辅助
pub(crate) fn require(allowed: bool, action: &str, actor: &str) -> ApiResult<()> {
    if allowed {
        Ok(())
    } else {
        Err(ApiError::PermissionDenied(format!(
            "actor={} 无权执行 {}",
            actor, action
        )))
    }
}
