// ==========================================
// 生产排程核心 - 机台数据仓储
// ==========================================
// 红线: Repository 不含业务逻辑
// 红线: (status, estimated_free_time, current_order_id) 只以单条 UPDATE 成对写入
// ==========================================

use crate::db::fmt_ts;
use crate::domain::machine::{Machine, MachineStateChange};
use crate::domain::types::{MachineStatus, MachineType};
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::row_helpers::{get_enum, get_opt_ts, get_ts};
use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::{Arc, Mutex};

const MACHINE_COLUMNS: &str = r#"
    machine_id, name, description, machine_type, specifications,
    status, current_order_id, estimated_free_time, created_at
"#;

fn map_machine(row: &Row<'_>) -> rusqlite::Result<Machine> {
    Ok(Machine {
        machine_id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        machine_type: get_enum(row, 3, MachineType::from_str)?,
        specifications: row.get(4)?,
        status: get_enum(row, 5, MachineStatus::from_str)?,
        current_order_id: row.get(6)?,
        estimated_free_time: get_opt_ts(row, 7)?,
        created_at: get_ts(row, 8)?,
    })
}

// ==========================================
// 连接级操作 (供跨仓储事务复用)
// ==========================================

/// 在给定连接/事务上读取机台
pub(crate) fn load_machine(conn: &Connection, machine_id: &str) -> RepositoryResult<Option<Machine>> {
    let sql = format!("SELECT {} FROM machines WHERE machine_id = ?1", MACHINE_COLUMNS);
    let machine = conn
        .query_row(&sql, params![machine_id], map_machine)
        .optional()?;
    Ok(machine)
}

/// 在给定连接/事务上写入状态变更 (单条 UPDATE)
///
/// # 返回
/// - Ok(()): 写入成功
/// - Err(NotFound): 机台不存在
pub(crate) fn write_state_change(
    conn: &Connection,
    machine_id: &str,
    change: &MachineStateChange,
) -> RepositoryResult<()> {
    let (status, free_at, order_id) = change.columns();
    let rows = conn.execute(
        r#"
        UPDATE machines
        SET status = ?1, estimated_free_time = ?2, current_order_id = ?3
        WHERE machine_id = ?4
        "#,
        params![
            status.to_db_str(),
            free_at.as_ref().map(fmt_ts),
            order_id,
            machine_id,
        ],
    )?;
    if rows == 0 {
        return Err(RepositoryError::not_found("Machine", machine_id));
    }
    Ok(())
}

/// 条件占用: 仅当机台空闲, 或已被同一订单占用时写入
///
/// # 返回
/// - Ok(true): 占用成功
/// - Ok(false): 条件不满足 (被其他订单抢占/维护中/不存在)
pub(crate) fn occupy_if_claimable(
    conn: &Connection,
    machine_id: &str,
    order_id: &str,
    estimated_free_time: NaiveDateTime,
) -> RepositoryResult<bool> {
    let rows = conn.execute(
        r#"
        UPDATE machines
        SET status = 'occupied', estimated_free_time = ?1, current_order_id = ?2
        WHERE machine_id = ?3
          AND (status = 'free' OR (status = 'occupied' AND current_order_id = ?2))
        "#,
        params![fmt_ts(&estimated_free_time), order_id, machine_id],
    )?;
    Ok(rows == 1)
}

/// 条件释放: 仅当机台仍被该订单占用时释放
///
/// # 返回
/// - Ok(true): 已释放
/// - Ok(false): 机台已不属于该订单 (人工覆写/其他订单), 保持原状
pub(crate) fn release_if_held_by(
    conn: &Connection,
    machine_id: &str,
    order_id: &str,
) -> RepositoryResult<bool> {
    let rows = conn.execute(
        r#"
        UPDATE machines
        SET status = 'free', estimated_free_time = NULL, current_order_id = NULL
        WHERE machine_id = ?1 AND status = 'occupied' AND current_order_id = ?2
        "#,
        params![machine_id, order_id],
    )?;
    Ok(rows == 1)
}

// ==========================================
// MachineRepository - 机台仓储
// ==========================================
/// 机台仓储
/// 职责: 管理 machines 表的读写
pub struct MachineRepository {
    conn: Arc<Mutex<Connection>>,
}

impl MachineRepository {
    /// 从已有连接创建仓储实例
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 新增机台
    pub fn insert(&self, machine: &Machine) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO machines (
                machine_id, name, description, machine_type, specifications,
                status, current_order_id, estimated_free_time, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            params![
                machine.machine_id,
                machine.name,
                machine.description,
                machine.machine_type.to_db_str(),
                machine.specifications,
                machine.status.to_db_str(),
                machine.current_order_id,
                machine.estimated_free_time.as_ref().map(fmt_ts),
                fmt_ts(&machine.created_at),
            ],
        )?;
        Ok(())
    }

    /// 按ID查询
    ///
    /// # 返回
    /// - Ok(Some(Machine)): 找到机台
    /// - Ok(None): 未找到
    pub fn find_by_id(&self, machine_id: &str) -> RepositoryResult<Option<Machine>> {
        let conn = self.get_conn()?;
        load_machine(&conn, machine_id)
    }

    /// 按ID查询 (不存在返回 NotFound)
    pub fn get(&self, machine_id: &str) -> RepositoryResult<Machine> {
        self.find_by_id(machine_id)?
            .ok_or_else(|| RepositoryError::not_found("Machine", machine_id))
    }

    /// 按一组ID查询 (不存在的ID被跳过)
    pub fn find_by_ids(&self, machine_ids: &[String]) -> RepositoryResult<Vec<Machine>> {
        let conn = self.get_conn()?;
        let mut machines = Vec::with_capacity(machine_ids.len());
        for id in machine_ids {
            if let Some(m) = load_machine(&conn, id)? {
                machines.push(m);
            }
        }
        Ok(machines)
    }

    /// 列出全部机台 (新建在前)
    pub fn list_all(&self) -> RepositoryResult<Vec<Machine>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT {} FROM machines ORDER BY created_at DESC, name ASC",
            MACHINE_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let machines = stmt
            .query_map([], map_machine)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(machines)
    }

    /// 写入状态变更
    pub fn apply_change(&self, machine_id: &str, change: &MachineStateChange) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        write_state_change(&conn, machine_id, change)
    }

    /// 标记为占用
    pub fn set_occupied(
        &self,
        machine_id: &str,
        estimated_free_time: NaiveDateTime,
        order_id: Option<&str>,
    ) -> RepositoryResult<()> {
        self.apply_change(
            machine_id,
            &MachineStateChange::Occupy {
                estimated_free_time,
                order_id: order_id.map(str::to_string),
            },
        )
    }

    /// 标记为空闲
    pub fn set_free(&self, machine_id: &str) -> RepositoryResult<()> {
        self.apply_change(machine_id, &MachineStateChange::Release)
    }

    /// 标记为维护
    pub fn set_maintenance(&self, machine_id: &str) -> RepositoryResult<()> {
        self.apply_change(machine_id, &MachineStateChange::Maintenance)
    }
}
