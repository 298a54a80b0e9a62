// ==========================================
// 生产排程核心 - 配置管理 API
// ==========================================
// 职责: 排程配置查询、单项更新、快照
// 红线: 只接受已知配置键, 值在写入前校验
// ==========================================

use std::sync::Arc;

use crate::api::error::{require, ApiError, ApiResult};
use crate::config::{config_keys, ConfigManager, SchedulingConfig, MAX_BOOKING_HOURS_CEILING};
use crate::domain::action_log::{ActionLog, ActionType};
use crate::domain::context::OperatorContext;
use crate::domain::types::JobPriority;
use crate::repository::action_log_repo::ActionLogRepository;

pub struct ConfigApi {
    config_manager: Arc<ConfigManager>,
    action_log_repo: Arc<ActionLogRepository>,
}

impl ConfigApi {
    pub fn new(config_manager: Arc<ConfigManager>, action_log_repo: Arc<ActionLogRepository>) -> Self {
        Self {
            config_manager,
            action_log_repo,
        }
    }

    /// 当前生效的排程配置 (含默认值)
    pub fn get_scheduling_config(&self) -> ApiResult<SchedulingConfig> {
        self.config_manager
            .load_scheduling_config()
            .map_err(|e| ApiError::DatabaseError(e.to_string()))
    }

    /// 已写入的全局配置快照 (JSON)
    pub fn get_config_snapshot(&self) -> ApiResult<serde_json::Value> {
        let raw = self
            .config_manager
            .get_config_snapshot()
            .map_err(|e| ApiError::DatabaseError(e.to_string()))?;
        serde_json::from_str(&raw).map_err(|e| ApiError::InternalError(e.to_string()))
    }

    /// 更新单项配置
    ///
    /// # 错误
    /// - InvalidInput: 未知键或值不合法
    pub fn update_config(
        &self,
        ctx: &OperatorContext,
        key: &str,
        value: &str,
        reason: &str,
    ) -> ApiResult<SchedulingConfig> {
        require(ctx.can_schedule(), "update_config", &ctx.actor_id)?;
        validate_config_value(key, value)?;

        self.config_manager
            .set_global_config(key, value.trim())
            .map_err(|e| ApiError::DatabaseError(e.to_string()))?;

        self.action_log_repo.insert(
            &ActionLog::new(ctx, ActionType::UpdateConfig)
                .payload(serde_json::json!({
                    "key": key,
                    "value": value.trim(),
                    "reason": reason,
                }))
                .detail(format!("更新配置: {}", key)),
        )?;

        self.get_scheduling_config()
    }
}

fn validate_config_value(key: &str, value: &str) -> ApiResult<()> {
    let value = value.trim();
    let valid = match key {
        config_keys::CASCADE_RETRY_ATTEMPTS => value.parse::<u32>().map(|v| v >= 1).unwrap_or(false),
        config_keys::CASCADE_RETRY_BACKOFF_MS => value.parse::<u64>().is_ok(),
        config_keys::MAX_BOOKING_HOURS => value
            .parse::<i64>()
            .map(|v| v > 0 && v <= MAX_BOOKING_HOURS_CEILING)
            .unwrap_or(false),
        config_keys::DEFAULT_JOB_PRIORITY => JobPriority::from_str(value).is_some(),
        _ => return Err(ApiError::InvalidInput(format!("未知配置键: {}", key))),
    };
    if valid {
        Ok(())
    } else {
        Err(ApiError::InvalidInput(format!("配置 {} 的值非法: '{}'", key, value)))
    }
}
