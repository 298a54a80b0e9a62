// ==========================================
// 生产排程核心 - 机台预约数据仓储
// ==========================================
// 红线: Repository 不含业务逻辑
// 红线: 多行写入与跨表写入 (预约 + 机台) 均在同一事务内完成
// 并发: 未完成预约上的 (order_id, machine_id) 唯一索引兜底重复预约
// ==========================================

use crate::db::fmt_ts;
use crate::domain::booking::Booking;
use crate::domain::types::BookingStatus;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::machine_repo::{occupy_if_claimable, release_if_held_by};
use crate::repository::row_helpers::{get_enum, get_opt_ts, get_ts};
use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

const BOOKING_COLUMNS: &str = r#"
    booking_id, order_id, machine_id, machine_name, estimated_hours,
    status, start_time, end_time, created_at
"#;

fn map_booking(row: &Row<'_>) -> rusqlite::Result<Booking> {
    Ok(Booking {
        booking_id: row.get(0)?,
        order_id: row.get(1)?,
        machine_id: row.get(2)?,
        machine_name: row.get(3)?,
        estimated_hours: row.get(4)?,
        status: get_enum(row, 5, BookingStatus::from_str)?,
        start_time: get_opt_ts(row, 6)?,
        end_time: get_opt_ts(row, 7)?,
        created_at: get_ts(row, 8)?,
    })
}

fn insert_booking(conn: &Connection, booking: &Booking) -> RepositoryResult<()> {
    // 先查一次, 让错误信息带上具体机台; 唯一索引负责并发兜底
    let existing: Option<String> = conn
        .query_row(
            r#"
            SELECT booking_id FROM order_bookings
            WHERE order_id = ?1 AND machine_id = ?2 AND status <> 'completed'
            "#,
            params![booking.order_id, booking.machine_id],
            |row| row.get(0),
        )
        .optional()?;
    if existing.is_some() {
        return Err(RepositoryError::UniqueConstraintViolation(format!(
            "order_bookings(order_id={}, machine_id={})",
            booking.order_id, booking.machine_id
        )));
    }

    conn.execute(
        r#"
        INSERT INTO order_bookings (
            booking_id, order_id, machine_id, machine_name, estimated_hours,
            status, start_time, end_time, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        "#,
        params![
            booking.booking_id,
            booking.order_id,
            booking.machine_id,
            booking.machine_name,
            booking.estimated_hours,
            booking.status.to_db_str(),
            booking.start_time.as_ref().map(fmt_ts),
            booking.end_time.as_ref().map(fmt_ts),
            fmt_ts(&booking.created_at),
        ],
    )?;
    Ok(())
}

fn running_count_on_machine(conn: &Connection, machine_id: &str) -> RepositoryResult<i64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM order_bookings WHERE machine_id = ?1 AND status = 'running'",
        params![machine_id],
        |row| row.get(0),
    )?;
    Ok(count)
}

fn booking_exists(conn: &Connection, booking_id: &str) -> RepositoryResult<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM order_bookings WHERE booking_id = ?1",
            params![booking_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

// ==========================================
// ReleaseSummary - 订单预约释放结果
// ==========================================
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReleaseSummary {
    pub order_id: String,
    pub deleted_bookings: usize,
    pub released_machine_ids: Vec<String>, // 因此变为空闲的机台
}

// ==========================================
// BookingRepository - 预约仓储
// ==========================================
pub struct BookingRepository {
    conn: Arc<Mutex<Connection>>,
}

impl BookingRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    // ==========================================
    // 写入操作
    // ==========================================

    /// 批量插入预约 (全有或全无)
    ///
    /// # 错误
    /// - `UniqueConstraintViolation`: 同一订单已存在该机台的未完成预约
    /// - `ForeignKeyViolation`: 订单或机台不存在
    pub fn insert_all(&self, bookings: &[Booking]) -> RepositoryResult<usize> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        for booking in bookings {
            insert_booking(&tx, booking)?;
        }
        tx.commit()?;
        Ok(bookings.len())
    }

    /// 用新预约替换订单中仍处于 scheduled 的预约
    ///
    /// running/completed 的预约保持不动; 新预约若与其机台重复则整体回滚
    ///
    /// # 返回
    /// - Ok((deleted, inserted))
    pub fn replace_scheduled_for_order(
        &self,
        order_id: &str,
        bookings: &[Booking],
    ) -> RepositoryResult<(usize, usize)> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        let deleted = tx.execute(
            "DELETE FROM order_bookings WHERE order_id = ?1 AND status = 'scheduled'",
            params![order_id],
        )?;
        for booking in bookings {
            insert_booking(&tx, booking)?;
        }

        tx.commit()?;
        Ok((deleted, bookings.len()))
    }

    /// 开始预约: scheduled → running, 同时占用机台
    ///
    /// # 并发控制
    /// - 预约按 status = scheduled 条件更新
    /// - 机台按 "空闲或被同一订单占用" 条件更新
    ///
    /// 任一条件不满足时整个事务回滚
    pub fn start_booking(
        &self,
        booking: &Booking,
        start_time: NaiveDateTime,
        estimated_free_time: NaiveDateTime,
    ) -> RepositoryResult<()> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        let rows = tx.execute(
            r#"
            UPDATE order_bookings
            SET status = 'running', start_time = ?1
            WHERE booking_id = ?2 AND status = 'scheduled'
            "#,
            params![fmt_ts(&start_time), booking.booking_id],
        )?;
        if rows == 0 {
            if !booking_exists(&tx, &booking.booking_id)? {
                return Err(RepositoryError::not_found("Booking", &booking.booking_id));
            }
            return Err(RepositoryError::conflict(
                "Booking",
                &booking.booking_id,
                "预约状态已被其他操作修改",
            ));
        }

        let claimed = occupy_if_claimable(
            &tx,
            &booking.machine_id,
            &booking.order_id,
            estimated_free_time,
        )?;
        if !claimed {
            return Err(RepositoryError::conflict(
                "Machine",
                &booking.machine_id,
                "机台已被其他订单占用或不可用",
            ));
        }

        tx.commit()?;
        Ok(())
    }

    /// 完成预约: running → completed, 无其他运行中预约时释放机台
    ///
    /// # 返回
    /// - Ok(true): 机台已释放
    /// - Ok(false): 机台仍被占用 (其他运行中预约/已被覆写)
    pub fn complete_booking(&self, booking: &Booking, end_time: NaiveDateTime) -> RepositoryResult<bool> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        let rows = tx.execute(
            r#"
            UPDATE order_bookings
            SET status = 'completed', end_time = ?1
            WHERE booking_id = ?2 AND status = 'running'
            "#,
            params![fmt_ts(&end_time), booking.booking_id],
        )?;
        if rows == 0 {
            if !booking_exists(&tx, &booking.booking_id)? {
                return Err(RepositoryError::not_found("Booking", &booking.booking_id));
            }
            return Err(RepositoryError::conflict(
                "Booking",
                &booking.booking_id,
                "预约状态已被其他操作修改",
            ));
        }

        let released = if running_count_on_machine(&tx, &booking.machine_id)? == 0 {
            release_if_held_by(&tx, &booking.machine_id, &booking.order_id)?
        } else {
            false
        };

        tx.commit()?;
        Ok(released)
    }

    /// 释放订单的全部预约 (订单删除前调用)
    ///
    /// 删除该订单所有预约; 其运行中预约占用的机台若再无其他运行中预约则释放
    pub fn release_all_for_order(&self, order_id: &str) -> RepositoryResult<ReleaseSummary> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        let running_machines: Vec<String> = {
            let mut stmt = tx.prepare(
                "SELECT machine_id FROM order_bookings WHERE order_id = ?1 AND status = 'running'",
            )?;
            let rows = stmt
                .query_map(params![order_id], |row| row.get(0))?
                .collect::<Result<Vec<String>, _>>()?;
            rows
        };

        let deleted = tx.execute(
            "DELETE FROM order_bookings WHERE order_id = ?1",
            params![order_id],
        )?;

        let mut released_machine_ids = Vec::new();
        for machine_id in running_machines {
            if running_count_on_machine(&tx, &machine_id)? == 0
                && release_if_held_by(&tx, &machine_id, order_id)?
            {
                released_machine_ids.push(machine_id);
            }
        }

        tx.commit()?;
        Ok(ReleaseSummary {
            order_id: order_id.to_string(),
            deleted_bookings: deleted,
            released_machine_ids,
        })
    }

    // ==========================================
    // 查询操作
    // ==========================================

    pub fn find_by_id(&self, booking_id: &str) -> RepositoryResult<Option<Booking>> {
        let conn = self.get_conn()?;
        let sql = format!("SELECT {} FROM order_bookings WHERE booking_id = ?1", BOOKING_COLUMNS);
        let booking = conn
            .query_row(&sql, params![booking_id], map_booking)
            .optional()?;
        Ok(booking)
    }

    pub fn get(&self, booking_id: &str) -> RepositoryResult<Booking> {
        self.find_by_id(booking_id)?
            .ok_or_else(|| RepositoryError::not_found("Booking", booking_id))
    }

    /// 查询订单的全部预约 (按创建时间)
    pub fn find_by_order(&self, order_id: &str) -> RepositoryResult<Vec<Booking>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT {} FROM order_bookings WHERE order_id = ?1 ORDER BY created_at ASC, machine_name ASC",
            BOOKING_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let bookings = stmt
            .query_map(params![order_id], map_booking)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(bookings)
    }

    /// 查询引用某机台的运行中预约
    pub fn find_running_by_machine(&self, machine_id: &str) -> RepositoryResult<Vec<Booking>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT {} FROM order_bookings WHERE machine_id = ?1 AND status = 'running'",
            BOOKING_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let bookings = stmt
            .query_map(params![machine_id], map_booking)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(bookings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::booking::BookingLine;
    use crate::domain::machine::Machine;
    use crate::domain::types::{MachineStatus, MachineType};
    use crate::repository::machine_repo::MachineRepository;
    use crate::repository::order_repo::OrderRepository;
    use chrono::{Duration, NaiveDate};

    struct Fixture {
        bookings: BookingRepository,
        machines: MachineRepository,
        orders: OrderRepository,
    }

    fn setup() -> Fixture {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::configure_sqlite_connection(&conn).unwrap();
        crate::db::init_schema(&conn).unwrap();
        let conn = Arc::new(Mutex::new(conn));
        Fixture {
            bookings: BookingRepository::new(conn.clone()),
            machines: MachineRepository::new(conn.clone()),
            orders: OrderRepository::new(conn),
        }
    }

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 4, 1)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap()
    }

    fn machine(fx: &Fixture, name: &str) -> Machine {
        let m = Machine::new(name.into(), "".into(), MachineType::Printing, None);
        fx.machines.insert(&m).unwrap();
        m
    }

    fn booking(order_id: &str, m: &Machine, hours: i64) -> Booking {
        let line = BookingLine {
            machine_id: m.machine_id.clone(),
            machine_name: m.name.clone(),
            machine_status: m.status,
            estimated_hours: hours,
        };
        Booking::scheduled(order_id, &line, now())
    }

    #[test]
    fn test_insert_all_is_all_or_nothing() {
        let fx = setup();
        fx.orders.register("O-1", now(), "u1").unwrap();
        let m1 = machine(&fx, "P1");
        let m2 = machine(&fx, "P2");

        let batch = vec![booking("O-1", &m1, 2), booking("O-1", &m2, 3), booking("O-1", &m1, 4)];
        let result = fx.bookings.insert_all(&batch);
        assert!(matches!(result, Err(RepositoryError::UniqueConstraintViolation(_))));
        assert!(fx.bookings.find_by_order("O-1").unwrap().is_empty());
    }

    #[test]
    fn test_start_and_complete_booking_moves_machine() {
        let fx = setup();
        fx.orders.register("O-1", now(), "u1").unwrap();
        let m1 = machine(&fx, "P1");
        let b = booking("O-1", &m1, 2);
        fx.bookings.insert_all(std::slice::from_ref(&b)).unwrap();

        fx.bookings
            .start_booking(&b, now(), now() + Duration::hours(2))
            .unwrap();
        let running = fx.bookings.get(&b.booking_id).unwrap();
        assert_eq!(running.status, BookingStatus::Running);
        assert_eq!(running.start_time, Some(now()));
        let occupied = fx.machines.get(&m1.machine_id).unwrap();
        assert_eq!(occupied.status, MachineStatus::Occupied);
        assert_eq!(occupied.current_order_id.as_deref(), Some("O-1"));

        let released = fx
            .bookings
            .complete_booking(&running, now() + Duration::hours(2))
            .unwrap();
        assert!(released);
        assert_eq!(fx.machines.get(&m1.machine_id).unwrap().status, MachineStatus::Free);
    }

    #[test]
    fn test_start_booking_rolls_back_when_machine_taken() {
        let fx = setup();
        fx.orders.register("O-1", now(), "u1").unwrap();
        fx.orders.register("O-2", now(), "u1").unwrap();
        let m1 = machine(&fx, "P1");
        let b1 = booking("O-1", &m1, 2);
        let b2 = booking("O-2", &m1, 3);
        fx.bookings.insert_all(std::slice::from_ref(&b1)).unwrap();
        fx.bookings.insert_all(std::slice::from_ref(&b2)).unwrap();

        fx.bookings
            .start_booking(&b1, now(), now() + Duration::hours(2))
            .unwrap();
        let err = fx
            .bookings
            .start_booking(&b2, now(), now() + Duration::hours(3))
            .unwrap_err();
        assert!(matches!(err, RepositoryError::ConcurrencyConflict { .. }));
        // 预约状态随事务回滚
        assert_eq!(
            fx.bookings.get(&b2.booking_id).unwrap().status,
            BookingStatus::Scheduled
        );
    }

    #[test]
    fn test_release_all_for_order() {
        let fx = setup();
        fx.orders.register("O-1", now(), "u1").unwrap();
        let m1 = machine(&fx, "P1");
        let m2 = machine(&fx, "P2");
        let b1 = booking("O-1", &m1, 2);
        let b2 = booking("O-1", &m2, 2);
        fx.bookings.insert_all(&[b1.clone(), b2]).unwrap();
        fx.bookings
            .start_booking(&b1, now(), now() + Duration::hours(2))
            .unwrap();

        let summary = fx.bookings.release_all_for_order("O-1").unwrap();
        assert_eq!(summary.deleted_bookings, 2);
        assert_eq!(summary.released_machine_ids, vec![m1.machine_id.clone()]);
        assert!(fx.bookings.find_by_order("O-1").unwrap().is_empty());
        assert_eq!(fx.machines.get(&m1.machine_id).unwrap().status, MachineStatus::Free);
    }

    #[test]
    fn test_replace_keeps_running_bookings() {
        let fx = setup();
        fx.orders.register("O-1", now(), "u1").unwrap();
        let m1 = machine(&fx, "P1");
        let m2 = machine(&fx, "P2");
        let m3 = machine(&fx, "P3");
        let b1 = booking("O-1", &m1, 2);
        let b2 = booking("O-1", &m2, 2);
        fx.bookings.insert_all(&[b1.clone(), b2]).unwrap();
        fx.bookings
            .start_booking(&b1, now(), now() + Duration::hours(2))
            .unwrap();

        let (deleted, inserted) = fx
            .bookings
            .replace_scheduled_for_order("O-1", &[booking("O-1", &m3, 5)])
            .unwrap();
        assert_eq!((deleted, inserted), (1, 1));

        let remaining = fx.bookings.find_by_order("O-1").unwrap();
        assert_eq!(remaining.len(), 2);
        assert!(remaining.iter().any(|b| b.machine_id == m1.machine_id && b.is_active()));
        assert!(remaining.iter().any(|b| b.machine_id == m3.machine_id));
    }
}
