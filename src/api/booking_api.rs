// ==========================================
// 生产排程核心 - 机台预约 API
// ==========================================
// 职责: 预约提案预览、提交、订单编辑替换、开工/完工、订单释放
// 红线: commit 是预约产生的唯一入口, 且不改变机台状态
// 红线: 开工/完工时预约与机台在同一事务内更新
// ==========================================

use std::collections::HashSet;
use std::sync::Arc;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::api::error::{require, ApiError, ApiResult};
use crate::config::{ConfigManager, SchedulingConfig};
use crate::domain::action_log::{ActionLog, ActionType};
use crate::domain::booking::{Booking, BookingLine, BookingRequest, OrderDraft};
use crate::domain::context::OperatorContext;
use crate::domain::machine::Machine;
use crate::domain::types::BookingStatus;
use crate::engine::availability::{AvailabilityEstimate, AvailabilityEstimator};
use crate::engine::booking_lifecycle::BookingLifecycle;
use crate::repository::action_log_repo::ActionLogRepository;
use crate::repository::booking_repo::{BookingRepository, ReleaseSummary};
use crate::repository::error::RepositoryError;
use crate::repository::machine_repo::MachineRepository;
use crate::repository::order_repo::OrderRepository;

// ==========================================
// BookingPreview - 提交前预览
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingPreview {
    pub draft: OrderDraft,
    pub lines: Vec<BookingLine>,
    pub total_estimated_hours: i64,
    pub estimate: AvailabilityEstimate,
}

/// 完工结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingCompletion {
    pub booking: Booking,
    pub machine_released: bool,
}

// ==========================================
// BookingApi - 机台预约 API
// ==========================================
pub struct BookingApi {
    booking_repo: Arc<BookingRepository>,
    machine_repo: Arc<MachineRepository>,
    order_repo: Arc<OrderRepository>,
    action_log_repo: Arc<ActionLogRepository>,
    config_manager: Arc<ConfigManager>,
    estimator: AvailabilityEstimator,
}

impl BookingApi {
    pub fn new(
        booking_repo: Arc<BookingRepository>,
        machine_repo: Arc<MachineRepository>,
        order_repo: Arc<OrderRepository>,
        action_log_repo: Arc<ActionLogRepository>,
        config_manager: Arc<ConfigManager>,
    ) -> Self {
        Self {
            booking_repo,
            machine_repo,
            order_repo,
            action_log_repo,
            config_manager,
            estimator: AvailabilityEstimator::new(),
        }
    }

    fn scheduling_config(&self) -> ApiResult<SchedulingConfig> {
        self.config_manager
            .load_scheduling_config()
            .map_err(|e| ApiError::InternalError(format!("读取排程配置失败: {}", e)))
    }

    /// 校验提案并解析出预约行 (机台必须全部存在)
    fn resolve_lines(
        &self,
        requested: &[BookingRequest],
    ) -> ApiResult<(Vec<BookingLine>, Vec<Machine>)> {
        let config = self.scheduling_config()?;
        BookingLifecycle::validate_requests(requested, config.max_booking_hours)?;

        let ids: Vec<String> = requested.iter().map(|r| r.machine_id.clone()).collect();
        let machines = self.machine_repo.find_by_ids(&ids)?;

        let mut lines = Vec::with_capacity(requested.len());
        for request in requested {
            let machine = machines
                .iter()
                .find(|m| m.machine_id == request.machine_id)
                .ok_or_else(|| {
                    ApiError::NotFound(format!("Machine(id={})不存在", request.machine_id))
                })?;
            lines.push(BookingLine {
                machine_id: machine.machine_id.clone(),
                machine_name: machine.name.clone(),
                machine_status: machine.status,
                estimated_hours: request.estimated_hours,
            });
        }
        Ok((lines, machines))
    }

    /// 把未完成预约上的 (order_id, machine_id) 唯一冲突翻译为 DuplicateMachine
    fn map_duplicate(&self, order_id: &str, requested: &[BookingRequest], err: RepositoryError) -> ApiError {
        match err {
            RepositoryError::UniqueConstraintViolation(msg) => {
                let requested_ids: HashSet<&str> =
                    requested.iter().map(|r| r.machine_id.as_str()).collect();
                let clash = self
                    .booking_repo
                    .find_by_order(order_id)
                    .ok()
                    .and_then(|existing| {
                        existing
                            .into_iter()
                            .filter(|b| b.status != BookingStatus::Completed)
                            .map(|b| b.machine_id)
                            .find(|id| requested_ids.contains(id.as_str()))
                    });
                ApiError::DuplicateMachine(clash.unwrap_or(msg))
            }
            other => other.into(),
        }
    }

    fn ensure_order(&self, order_id: &str) -> ApiResult<()> {
        if order_id.trim().is_empty() {
            return Err(ApiError::InvalidInput("订单ID不能为空".to_string()));
        }
        if !self.order_repo.exists(order_id)? {
            return Err(ApiError::NotFound(format!("Order(id={})不存在", order_id)));
        }
        Ok(())
    }

    // ==========================================
    // 请求解析
    // ==========================================

    /// 解析界面输入的 (机台, 工时文本)
    ///
    /// 非数值/小数/非正数 → InvalidHours
    pub fn parse_requests(raw: &[(String, String)]) -> ApiResult<Vec<BookingRequest>> {
        raw.iter()
            .map(|(machine_id, hours)| {
                BookingRequest::parse(machine_id.clone(), hours).map_err(|bad| {
                    ApiError::InvalidHours(format!("机台 {} 的预计工时非法: '{}'", machine_id, bad))
                })
            })
            .collect()
    }

    // ==========================================
    // 提案与提交
    // ==========================================

    /// 预约提案预览 (只读)
    pub fn propose(
        &self,
        ctx: &OperatorContext,
        draft: &OrderDraft,
        requested: &[BookingRequest],
    ) -> ApiResult<BookingPreview> {
        self.propose_at(ctx, draft, requested, chrono::Local::now().naive_local())
    }

    pub fn propose_at(
        &self,
        ctx: &OperatorContext,
        draft: &OrderDraft,
        requested: &[BookingRequest],
        now: NaiveDateTime,
    ) -> ApiResult<BookingPreview> {
        require(ctx.can_schedule(), "propose_bookings", &ctx.actor_id)?;

        let (lines, machines) = self.resolve_lines(requested)?;
        let estimate = self.estimator.estimate(requested, &machines, now);
        let total_estimated_hours = lines.iter().map(|l| l.estimated_hours).sum();

        tracing::debug!(
            machines = lines.len(),
            wait_hours = estimate.wait_hours(),
            any_occupied = estimate.any_occupied(),
            "预约提案已预估"
        );

        Ok(BookingPreview {
            draft: draft.clone(),
            lines,
            total_estimated_hours,
            estimate,
        })
    }

    /// 提交预约 (全有或全无)
    ///
    /// # 错误
    /// - DuplicateMachine: 提案内重复, 或订单已预约过该机台
    /// - InvalidHours: 工时非正或超上限
    /// - NotFound: 订单或机台不存在
    pub fn commit(
        &self,
        ctx: &OperatorContext,
        order_id: &str,
        requested: &[BookingRequest],
    ) -> ApiResult<Vec<Booking>> {
        self.commit_at(ctx, order_id, requested, chrono::Local::now().naive_local())
    }

    pub fn commit_at(
        &self,
        ctx: &OperatorContext,
        order_id: &str,
        requested: &[BookingRequest],
        now: NaiveDateTime,
    ) -> ApiResult<Vec<Booking>> {
        require(ctx.can_schedule(), "commit_bookings", &ctx.actor_id)?;
        self.ensure_order(order_id)?;

        let (lines, _) = self.resolve_lines(requested)?;
        let bookings: Vec<Booking> = lines
            .iter()
            .map(|line| Booking::scheduled(order_id, line, now))
            .collect();

        self.booking_repo
            .insert_all(&bookings)
            .map_err(|e| self.map_duplicate(order_id, requested, e))?;

        self.action_log_repo.insert(
            &ActionLog::new(ctx, ActionType::CommitBookings)
                .at(now)
                .order(order_id)
                .payload(serde_json::json!({ "requested": requested }))
                .detail(format!("提交预约 {} 条", bookings.len())),
        )?;

        tracing::info!(order_id, count = bookings.len(), "预约已提交");
        Ok(bookings)
    }

    /// 订单编辑: 用新提案替换仍为 scheduled 的预约
    ///
    /// running/completed 预约保持不动; 新提案与其机台重复 → DuplicateMachine
    pub fn replace_for_order(
        &self,
        ctx: &OperatorContext,
        order_id: &str,
        requested: &[BookingRequest],
    ) -> ApiResult<Vec<Booking>> {
        self.replace_for_order_at(ctx, order_id, requested, chrono::Local::now().naive_local())
    }

    pub fn replace_for_order_at(
        &self,
        ctx: &OperatorContext,
        order_id: &str,
        requested: &[BookingRequest],
        now: NaiveDateTime,
    ) -> ApiResult<Vec<Booking>> {
        require(ctx.can_schedule(), "replace_bookings", &ctx.actor_id)?;
        self.ensure_order(order_id)?;

        let (lines, _) = self.resolve_lines(requested)?;
        let bookings: Vec<Booking> = lines
            .iter()
            .map(|line| Booking::scheduled(order_id, line, now))
            .collect();

        let (deleted, inserted) = self
            .booking_repo
            .replace_scheduled_for_order(order_id, &bookings)
            .map_err(|e| self.map_duplicate(order_id, requested, e))?;

        self.action_log_repo.insert(
            &ActionLog::new(ctx, ActionType::ReplaceBookings)
                .at(now)
                .order(order_id)
                .payload(serde_json::json!({
                    "requested": requested,
                    "deleted": deleted,
                    "inserted": inserted,
                }))
                .detail(format!("替换预约: 删除 {} 条, 新增 {} 条", deleted, inserted)),
        )?;

        tracing::info!(order_id, deleted, inserted, "订单预约已替换");
        Ok(bookings)
    }

    // ==========================================
    // 开工与完工
    // ==========================================

    /// 开工: scheduled → running, 机台占用至 now + estimated_hours
    pub fn start_booking(&self, ctx: &OperatorContext, booking_id: &str) -> ApiResult<Booking> {
        self.start_booking_at(ctx, booking_id, chrono::Local::now().naive_local())
    }

    pub fn start_booking_at(
        &self,
        ctx: &OperatorContext,
        booking_id: &str,
        now: NaiveDateTime,
    ) -> ApiResult<Booking> {
        require(ctx.can_schedule(), "start_booking", &ctx.actor_id)?;

        let booking = self.booking_repo.get(booking_id)?;
        let machine = self.machine_repo.get(&booking.machine_id)?;
        let free_at = BookingLifecycle::check_start(&booking, &machine, now)?;

        self.booking_repo.start_booking(&booking, now, free_at)?;

        self.action_log_repo.insert(
            &ActionLog::new(ctx, ActionType::StartBooking)
                .at(now)
                .order(&booking.order_id)
                .machine(&booking.machine_id)
                .payload(serde_json::json!({
                    "booking_id": booking_id,
                    "estimated_free_time": crate::db::fmt_ts(&free_at),
                }))
                .detail(format!("开工: {}", booking.machine_name)),
        )?;

        tracing::info!(
            booking_id,
            order_id = %booking.order_id,
            machine_id = %booking.machine_id,
            "预约已开工"
        );
        Ok(self.booking_repo.get(booking_id)?)
    }

    /// 完工: running → completed, 机台无其他运行中预约时释放
    pub fn complete_booking(
        &self,
        ctx: &OperatorContext,
        booking_id: &str,
    ) -> ApiResult<BookingCompletion> {
        self.complete_booking_at(ctx, booking_id, chrono::Local::now().naive_local())
    }

    pub fn complete_booking_at(
        &self,
        ctx: &OperatorContext,
        booking_id: &str,
        now: NaiveDateTime,
    ) -> ApiResult<BookingCompletion> {
        require(ctx.can_schedule(), "complete_booking", &ctx.actor_id)?;

        let booking = self.booking_repo.get(booking_id)?;
        BookingLifecycle::check_complete(&booking)?;

        let machine_released = self.booking_repo.complete_booking(&booking, now)?;

        self.action_log_repo.insert(
            &ActionLog::new(ctx, ActionType::CompleteBooking)
                .at(now)
                .order(&booking.order_id)
                .machine(&booking.machine_id)
                .payload(serde_json::json!({
                    "booking_id": booking_id,
                    "machine_released": machine_released,
                }))
                .detail(format!("完工: {}", booking.machine_name)),
        )?;

        if !machine_released {
            tracing::debug!(machine_id = %booking.machine_id, "机台仍被占用, 未释放");
        }
        tracing::info!(booking_id, machine_released, "预约已完工");

        Ok(BookingCompletion {
            booking: self.booking_repo.get(booking_id)?,
            machine_released,
        })
    }

    /// 订单删除前释放其全部预约
    pub fn release_all_for_order(
        &self,
        ctx: &OperatorContext,
        order_id: &str,
    ) -> ApiResult<ReleaseSummary> {
        require(ctx.can_schedule(), "release_order_bookings", &ctx.actor_id)?;
        self.ensure_order(order_id)?;

        let summary = self.booking_repo.release_all_for_order(order_id)?;

        self.action_log_repo.insert(
            &ActionLog::new(ctx, ActionType::ReleaseOrderBookings)
                .order(order_id)
                .payload(serde_json::json!({
                    "deleted_bookings": summary.deleted_bookings,
                    "released_machine_ids": summary.released_machine_ids,
                }))
                .detail(format!("释放订单预约 {} 条", summary.deleted_bookings)),
        )?;

        tracing::info!(
            order_id,
            deleted = summary.deleted_bookings,
            released = summary.released_machine_ids.len(),
            "订单预约已释放"
        );
        Ok(summary)
    }

    // ==========================================
    // 查询
    // ==========================================

    pub fn list_for_order(&self, order_id: &str) -> ApiResult<Vec<Booking>> {
        Ok(self.booking_repo.find_by_order(order_id)?)
    }

    pub fn get_booking(&self, booking_id: &str) -> ApiResult<Booking> {
        Ok(self.booking_repo.get(booking_id)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::{BookingStatus, MachineStatus, MachineType, UserRole};
    use chrono::{Duration, NaiveDate};
    use rusqlite::Connection;
    use std::sync::Mutex;

    struct Fixture {
        api: BookingApi,
        machines: Arc<MachineRepository>,
        orders: Arc<OrderRepository>,
    }

    fn setup() -> Fixture {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::configure_sqlite_connection(&conn).unwrap();
        crate::db::init_schema(&conn).unwrap();
        let conn = Arc::new(Mutex::new(conn));
        let machines = Arc::new(MachineRepository::new(conn.clone()));
        let orders = Arc::new(OrderRepository::new(conn.clone()));
        let api = BookingApi::new(
            Arc::new(BookingRepository::new(conn.clone())),
            machines.clone(),
            orders.clone(),
            Arc::new(ActionLogRepository::new(conn.clone())),
            Arc::new(ConfigManager::from_connection(conn).unwrap()),
        );
        Fixture { api, machines, orders }
    }

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 5, 4)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap()
    }

    fn manager() -> OperatorContext {
        OperatorContext::new("pm-1", "Pat", UserRole::ProductionManager)
    }

    fn machine(fx: &Fixture, name: &str) -> String {
        let m = Machine::new(name.to_string(), String::new(), MachineType::Printing, None);
        fx.machines.insert(&m).unwrap();
        m.machine_id
    }

    #[test]
    fn test_propose_uses_max_wait() {
        let fx = setup();
        let m1 = machine(&fx, "Printer");
        let m2 = machine(&fx, "Cutter");
        fx.machines
            .set_occupied(&m1, now() + Duration::hours(1), None)
            .unwrap();

        let preview = fx
            .api
            .propose_at(
                &manager(),
                &OrderDraft::default(),
                &[BookingRequest::new(&m1, 2), BookingRequest::new(&m2, 3)],
                now(),
            )
            .unwrap();
        assert_eq!(preview.total_estimated_hours, 5);
        assert_eq!(preview.estimate.start_time(), Some(now() + Duration::hours(1)));
        assert!(preview.estimate.any_occupied());
        assert_eq!(preview.lines[0].machine_status, MachineStatus::Occupied);
    }

    #[test]
    fn test_propose_unknown_machine_is_not_found() {
        let fx = setup();
        let result = fx.api.propose_at(
            &manager(),
            &OrderDraft::default(),
            &[BookingRequest::new("ghost", 2)],
            now(),
        );
        assert!(matches!(result, Err(ApiError::NotFound(_))));
    }

    #[test]
    fn test_commit_rejects_previously_booked_machine() {
        let fx = setup();
        let m1 = machine(&fx, "Printer");
        fx.orders.register("O-1", now(), "pm-1").unwrap();

        fx.api
            .commit_at(&manager(), "O-1", &[BookingRequest::new(&m1, 2)], now())
            .unwrap();
        let again = fx
            .api
            .commit_at(&manager(), "O-1", &[BookingRequest::new(&m1, 4)], now());
        assert!(matches!(again, Err(ApiError::DuplicateMachine(id)) if id == m1));
        assert_eq!(fx.api.list_for_order("O-1").unwrap().len(), 1);
    }

    #[test]
    fn test_commit_requires_registered_order() {
        let fx = setup();
        let m1 = machine(&fx, "Printer");
        let result = fx
            .api
            .commit_at(&manager(), "O-404", &[BookingRequest::new(&m1, 2)], now());
        assert!(matches!(result, Err(ApiError::NotFound(_))));
    }

    #[test]
    fn test_start_and_complete_cycle() {
        let fx = setup();
        let m1 = machine(&fx, "Printer");
        fx.orders.register("O-1", now(), "pm-1").unwrap();
        let booking = fx
            .api
            .commit_at(&manager(), "O-1", &[BookingRequest::new(&m1, 3)], now())
            .unwrap()
            .remove(0);

        let started = fx.api.start_booking_at(&manager(), &booking.booking_id, now()).unwrap();
        assert_eq!(started.status, BookingStatus::Running);
        let m = fx.machines.get(&m1).unwrap();
        assert_eq!(m.estimated_free_time, Some(now() + Duration::hours(3)));
        assert_eq!(m.current_order_id.as_deref(), Some("O-1"));

        let done = fx
            .api
            .complete_booking_at(&manager(), &booking.booking_id, now() + Duration::hours(2))
            .unwrap();
        assert!(done.machine_released);
        assert_eq!(done.booking.status, BookingStatus::Completed);
        assert_eq!(fx.machines.get(&m1).unwrap().status, MachineStatus::Free);

        let again = fx.api.complete_booking_at(&manager(), &booking.booking_id, now());
        assert!(matches!(again, Err(ApiError::InvalidTransition { .. })));
    }

    #[test]
    fn test_parse_requests_rejects_fractional_hours() {
        let raw = vec![
            ("M1".to_string(), "4".to_string()),
            ("M2".to_string(), "2.5".to_string()),
        ];
        assert!(matches!(
            BookingApi::parse_requests(&raw),
            Err(ApiError::InvalidHours(_))
        ));
        let ok = BookingApi::parse_requests(&raw[..1]).unwrap();
        assert_eq!(ok[0].estimated_hours, 4);
    }

    #[test]
    fn test_worker_cannot_commit() {
        let fx = setup();
        let worker = OperatorContext::new("w-1", "Wen", UserRole::Worker);
        let result = fx.api.commit_at(&worker, "O-1", &[], now());
        assert!(matches!(result, Err(ApiError::PermissionDenied(_))));
    }
}
