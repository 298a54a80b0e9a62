use super::ActionLogRepository;
use crate::domain::action_log::ActionLog;
use crate::repository::error::RepositoryResult;
use crate::repository::row_helpers::get_ts;
use rusqlite::{params, OptionalExtension, Row};

const LOG_COLUMNS: &str = r#"
    action_id, action_type, action_ts, actor,
    order_id, machine_id, payload_json, detail
"#;

fn map_log(row: &Row<'_>) -> rusqlite::Result<ActionLog> {
    Ok(ActionLog {
        action_id: row.get(0)?,
        action_type: row.get(1)?,
        action_ts: get_ts(row, 2)?,
        actor: row.get(3)?,
        order_id: row.get(4)?,
        machine_id: row.get(5)?,
        payload_json: row
            .get::<_, Option<String>>(6)?
            .and_then(|s| serde_json::from_str(&s).ok()),
        detail: row.get(7)?,
    })
}

impl ActionLogRepository {
    // ==========================================
    // 查询操作
    // ==========================================

    /// 根据ID查询操作日志
    pub fn find_by_id(&self, action_id: &str) -> RepositoryResult<Option<ActionLog>> {
        let conn = self.get_conn()?;
        let sql = format!("SELECT {} FROM action_log WHERE action_id = ?1", LOG_COLUMNS);
        let log = conn
            .query_row(&sql, params![action_id], map_log)
            .optional()?;
        Ok(log)
    }

    /// 查询订单相关的操作日志 (最新在前)
    pub fn find_by_order(&self, order_id: &str) -> RepositoryResult<Vec<ActionLog>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT {} FROM action_log WHERE order_id = ?1 ORDER BY action_ts DESC, rowid DESC",
            LOG_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let logs = stmt
            .query_map(params![order_id], map_log)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(logs)
    }

    /// 查询最近的操作日志
    ///
    /// # 参数
    /// - `limit`: 返回条数上限
    pub fn find_recent(&self, limit: i64) -> RepositoryResult<Vec<ActionLog>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT {} FROM action_log ORDER BY action_ts DESC, rowid DESC LIMIT ?1",
            LOG_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let logs = stmt
            .query_map(params![limit], map_log)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(logs)
    }

    /// 按操作类型统计条数
    pub fn count_by_type(&self, action_type: &str) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM action_log WHERE action_type = ?1",
            params![action_type],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}
