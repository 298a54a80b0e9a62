// ==========================================
// 生产排程核心 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、覆写
// 存储: config_kv 表 (key-value + scope)
// ==========================================

use crate::db::open_sqlite_connection;
use crate::domain::types::JobPriority;
use crate::engine::cascade::CascadeRetryPolicy;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::error::Error;
use std::sync::{Arc, Mutex};

/// 全局配置作用域
pub const GLOBAL_SCOPE: &str = "global";

/// max_booking_hours 可配置的最大值
pub const MAX_BOOKING_HOURS_CEILING: i64 = 100_000;

// ==========================================
// SchedulingConfig - 排程配置
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulingConfig {
    pub cascade_retry_attempts: u32,
    pub cascade_retry_backoff_ms: u64,
    pub max_booking_hours: i64,
    pub default_job_priority: JobPriority,
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            cascade_retry_attempts: 3,
            cascade_retry_backoff_ms: 20,
            max_booking_hours: 1000,
            default_job_priority: JobPriority::Medium,
        }
    }
}

impl SchedulingConfig {
    pub fn retry_policy(&self) -> CascadeRetryPolicy {
        CascadeRetryPolicy {
            attempts: self.cascade_retry_attempts,
            backoff_ms: self.cascade_retry_backoff_ms,
        }
    }
}

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> Result<Self, Box<dyn Error>> {
        let conn = open_sqlite_connection(db_path)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建 ConfigManager
    ///
    /// 说明：为保证连接行为一致，会对传入连接再次应用统一 PRAGMA（幂等）。
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Result<Self, Box<dyn Error>> {
        {
            let conn_guard = conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
            crate::db::configure_sqlite_connection(&conn_guard)?;
        }

        Ok(Self { conn })
    }

    /// 从 config_kv 表读取配置值（scope_id='global'）
    ///
    /// # 返回
    /// - Some(String): 配置值
    /// - None: 配置不存在
    fn get_config_value(&self, key: &str) -> Result<Option<String>, Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let result = conn.query_row(
            "SELECT value FROM config_kv WHERE scope_id = ?1 AND key = ?2",
            params![GLOBAL_SCOPE, key],
            |row| row.get::<_, String>(0),
        );

        match result {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(Box::new(e)),
        }
    }

    /// 读取 global scope 的配置值（公开方法，供其他模块复用）
    pub fn get_global_config_value(&self, key: &str) -> Result<Option<String>, Box<dyn Error>> {
        self.get_config_value(key)
    }

    /// 写入 global scope 配置 (UPSERT)
    pub fn set_global_config(&self, key: &str, value: &str) -> Result<(), Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
        conn.execute(
            r#"
            INSERT INTO config_kv (scope_id, key, value, updated_at)
            VALUES (?1, ?2, ?3, datetime('now'))
            ON CONFLICT(scope_id, key) DO UPDATE SET value = ?3, updated_at = datetime('now')
            "#,
            params![GLOBAL_SCOPE, key, value],
        )?;
        tracing::info!(key, value, "配置已更新");
        Ok(())
    }

    /// 获取所有配置的快照（JSON格式）
    pub fn get_config_snapshot(&self) -> Result<String, Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let mut stmt = conn.prepare(
            "SELECT key, value FROM config_kv WHERE scope_id = ?1 ORDER BY key",
        )?;

        let mut config_map: BTreeMap<String, String> = BTreeMap::new();
        let rows = stmt.query_map(params![GLOBAL_SCOPE], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        for row in rows {
            let (key, value) = row?;
            config_map.insert(key, value);
        }

        let json_value = json!(config_map);
        Ok(serde_json::to_string(&json_value)?)
    }

    /// 读取并解析数值配置; 缺失或非法时回退默认值
    fn parse_or_default<T>(&self, key: &str, default: T) -> Result<T, Box<dyn Error>>
    where
        T: std::str::FromStr + Copy + std::fmt::Display,
    {
        match self.get_config_value(key)? {
            Some(raw) => match raw.trim().parse::<T>() {
                Ok(v) => Ok(v),
                Err(_) => {
                    tracing::warn!(key, value = %raw, default = %default, "配置值非法, 使用默认值");
                    Ok(default)
                }
            },
            None => Ok(default),
        }
    }

    // ===== 排程配置 =====

    /// 加载排程配置
    pub fn load_scheduling_config(&self) -> Result<SchedulingConfig, Box<dyn Error>> {
        let defaults = SchedulingConfig::default();

        let mut max_booking_hours =
            self.parse_or_default(config_keys::MAX_BOOKING_HOURS, defaults.max_booking_hours)?;
        if max_booking_hours <= 0 || max_booking_hours > MAX_BOOKING_HOURS_CEILING {
            tracing::warn!(
                max_booking_hours,
                ceiling = MAX_BOOKING_HOURS_CEILING,
                "max_booking_hours 超出 (0, 上限] 范围, 使用默认值"
            );
            max_booking_hours = defaults.max_booking_hours;
        }

        let default_job_priority = match self.get_config_value(config_keys::DEFAULT_JOB_PRIORITY)? {
            Some(raw) => JobPriority::from_str(&raw).unwrap_or_else(|| {
                tracing::warn!(value = %raw, "default_job_priority 非法, 使用默认值");
                defaults.default_job_priority
            }),
            None => defaults.default_job_priority,
        };

        Ok(SchedulingConfig {
            cascade_retry_attempts: self.parse_or_default(
                config_keys::CASCADE_RETRY_ATTEMPTS,
                defaults.cascade_retry_attempts,
            )?,
            cascade_retry_backoff_ms: self.parse_or_default(
                config_keys::CASCADE_RETRY_BACKOFF_MS,
                defaults.cascade_retry_backoff_ms,
            )?,
            max_booking_hours,
            default_job_priority,
        })
    }

    /// 单条预约工时上限
    pub fn get_max_booking_hours(&self) -> Result<i64, Box<dyn Error>> {
        Ok(self.load_scheduling_config()?.max_booking_hours)
    }

    /// 新建作业的默认优先级
    pub fn get_default_job_priority(&self) -> Result<JobPriority, Box<dyn Error>> {
        Ok(self.load_scheduling_config()?.default_job_priority)
    }
}

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    // 级联重试
    pub const CASCADE_RETRY_ATTEMPTS: &str = "cascade_retry_attempts";
    pub const CASCADE_RETRY_BACKOFF_MS: &str = "cascade_retry_backoff_ms";

    // 预约
    pub const MAX_BOOKING_HOURS: &str = "max_booking_hours";

    // 作业
    pub const DEFAULT_JOB_PRIORITY: &str = "default_job_priority";
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> ConfigManager {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::init_schema(&conn).unwrap();
        ConfigManager::from_connection(Arc::new(Mutex::new(conn))).unwrap()
    }

    #[test]
    fn test_defaults_when_empty() {
        let manager = setup();
        assert_eq!(manager.load_scheduling_config().unwrap(), SchedulingConfig::default());
        assert_eq!(manager.get_config_snapshot().unwrap(), "{}");
    }

    #[test]
    fn test_overrides_are_applied() {
        let manager = setup();
        manager.set_global_config(config_keys::MAX_BOOKING_HOURS, "48").unwrap();
        manager.set_global_config(config_keys::DEFAULT_JOB_PRIORITY, "high").unwrap();
        manager.set_global_config(config_keys::CASCADE_RETRY_ATTEMPTS, "5").unwrap();

        let config = manager.load_scheduling_config().unwrap();
        assert_eq!(config.max_booking_hours, 48);
        assert_eq!(config.default_job_priority, JobPriority::High);
        assert_eq!(config.retry_policy().attempts, 5);
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let manager = setup();
        manager.set_global_config(config_keys::MAX_BOOKING_HOURS, "-3").unwrap();
        manager.set_global_config(config_keys::CASCADE_RETRY_BACKOFF_MS, "soon").unwrap();
        manager.set_global_config(config_keys::DEFAULT_JOB_PRIORITY, "urgent").unwrap();

        let config = manager.load_scheduling_config().unwrap();
        assert_eq!(config, SchedulingConfig::default());
    }

    #[test]
    fn test_snapshot_lists_global_keys() {
        let manager = setup();
        manager.set_global_config(config_keys::MAX_BOOKING_HOURS, "12").unwrap();
        let snapshot: serde_json::Value =
            serde_json::from_str(&manager.get_config_snapshot().unwrap()).unwrap();
        assert_eq!(snapshot["max_booking_hours"], "12");
    }
}
