// ==========================================
// 生产排程核心 - 机台预约规则
// ==========================================
// 提案校验: 机台不可重复, 工时为正整数且不超过上限
// 预约状态: scheduled → running → completed
// 开工: 机台须空闲, 或已被同一订单占用
// ==========================================

use crate::domain::booking::{Booking, BookingRequest};
use crate::domain::machine::Machine;
use crate::domain::types::{BookingStatus, MachineStatus};
use crate::engine::error::{EngineError, EngineResult};
use chrono::{Duration, NaiveDateTime};
use std::collections::HashSet;

pub struct BookingLifecycle;

impl BookingLifecycle {
    /// 校验预约提案
    ///
    /// 按请求顺序检查, 返回遇到的第一个错误
    ///
    /// # 参数
    /// - `requested`: 请求列表
    /// - `max_hours`: 单条预约工时上限 (配置项 max_booking_hours)
    pub fn validate_requests(requested: &[BookingRequest], max_hours: i64) -> EngineResult<()> {
        let mut seen: HashSet<&str> = HashSet::with_capacity(requested.len());
        for request in requested {
            if request.estimated_hours <= 0 {
                return Err(EngineError::InvalidHours(format!(
                    "机台 {} 的预计工时必须为正整数: {}",
                    request.machine_id, request.estimated_hours
                )));
            }
            if request.estimated_hours > max_hours {
                return Err(EngineError::InvalidHours(format!(
                    "机台 {} 的预计工时 {} 超过上限 {}",
                    request.machine_id, request.estimated_hours, max_hours
                )));
            }
            if !seen.insert(request.machine_id.as_str()) {
                return Err(EngineError::DuplicateMachine(request.machine_id.clone()));
            }
        }
        Ok(())
    }

    /// 校验开工条件, 返回机台预计空闲时间
    ///
    /// # 返回
    /// - Ok(estimated_free_time): start_time + estimated_hours
    /// - Err(InvalidTransition): 预约不在 scheduled, 或机台维护中
    /// - Err(ConcurrencyConflict): 机台被其他订单占用
    pub fn check_start(
        booking: &Booking,
        machine: &Machine,
        start_time: NaiveDateTime,
    ) -> EngineResult<NaiveDateTime> {
        if !booking.status.can_transition_to(BookingStatus::Running) {
            return Err(EngineError::transition(
                "Booking",
                booking.status,
                BookingStatus::Running,
            ));
        }

        match machine.status {
            MachineStatus::Free => {}
            MachineStatus::Occupied => {
                if machine.current_order_id.as_deref() != Some(booking.order_id.as_str()) {
                    return Err(EngineError::ConcurrencyConflict(format!(
                        "机台 {} 已被订单 {} 占用",
                        machine.machine_id,
                        machine.current_order_id.as_deref().unwrap_or("未知")
                    )));
                }
            }
            MachineStatus::Maintenance => {
                return Err(EngineError::transition(
                    "Machine",
                    MachineStatus::Maintenance,
                    MachineStatus::Occupied,
                ));
            }
        }

        Self::estimated_free_time(start_time, booking.estimated_hours)
    }

    /// 校验完工条件
    pub fn check_complete(booking: &Booking) -> EngineResult<()> {
        if !booking.status.can_transition_to(BookingStatus::Completed) {
            return Err(EngineError::transition(
                "Booking",
                booking.status,
                BookingStatus::Completed,
            ));
        }
        Ok(())
    }

    /// 预计空闲时间 = 开工时间 + 预计小时
    ///
    /// 超出时间可表示范围时返回 InvalidHours
    pub fn estimated_free_time(
        start_time: NaiveDateTime,
        estimated_hours: i64,
    ) -> EngineResult<NaiveDateTime> {
        Duration::try_hours(estimated_hours)
            .and_then(|d| start_time.checked_add_signed(d))
            .ok_or_else(|| {
                EngineError::InvalidHours(format!(
                    "预计工时 {} 超出可表示的时间范围",
                    estimated_hours
                ))
            })
    }
}
