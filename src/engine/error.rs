// ==========================================
// 生产排程核心 - 引擎层错误类型
// ==========================================
// 纯规则判定产生的错误, 不含数据库错误
// ==========================================

use thiserror::Error;

/// 引擎层错误类型
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    /// 状态机规则违反
    #[error("无效的状态转换: {entity} from={from} to={to}")]
    InvalidTransition {
        entity: String,
        from: String,
        to: String,
    },

    /// 工时非法 (非数值/非正数/超上限/负增量)
    #[error("工时非法: {0}")]
    InvalidHours(String),

    /// 同一提案内机台重复
    #[error("机台重复预约: machine_id={0}")]
    DuplicateMachine(String),

    /// 资源已被其他操作占用
    #[error("并发冲突: {0}")]
    ConcurrencyConflict(String),
}

impl EngineError {
    pub fn transition(entity: &str, from: impl ToString, to: impl ToString) -> Self {
        EngineError::InvalidTransition {
            entity: entity.to_string(),
            from: from.to_string(),
            to: to.to_string(),
        }
    }
}

/// Result 类型别名
pub type EngineResult<T> = Result<T, EngineError>;
