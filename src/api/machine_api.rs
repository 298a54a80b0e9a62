// ==========================================
// 生产排程核心 - 机台登记 API
// ==========================================
// 职责: 机台登记、查询、人工状态覆写
// 红线: 状态覆写仍走 (status, estimated_free_time) 成对写入
// ==========================================

use std::sync::Arc;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::api::error::{require, ApiError, ApiResult};
use crate::domain::action_log::{ActionLog, ActionType};
use crate::domain::context::OperatorContext;
use crate::domain::machine::{Machine, MachineStateChange};
use crate::domain::types::{MachineStatus, MachineType};
use crate::repository::action_log_repo::ActionLogRepository;
use crate::repository::booking_repo::BookingRepository;
use crate::repository::machine_repo::MachineRepository;

/// 新建机台请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMachine {
    pub name: String,
    pub description: String,
    pub machine_type: MachineType,
    pub specifications: Option<String>,
}

// ==========================================
// MachineApi - 机台登记 API
// ==========================================
pub struct MachineApi {
    machine_repo: Arc<MachineRepository>,
    booking_repo: Arc<BookingRepository>,
    action_log_repo: Arc<ActionLogRepository>,
}

impl MachineApi {
    pub fn new(
        machine_repo: Arc<MachineRepository>,
        booking_repo: Arc<BookingRepository>,
        action_log_repo: Arc<ActionLogRepository>,
    ) -> Self {
        Self {
            machine_repo,
            booking_repo,
            action_log_repo,
        }
    }

    /// 登记机台 (初始状态 free)
    pub fn create_machine(&self, ctx: &OperatorContext, req: NewMachine) -> ApiResult<Machine> {
        require(ctx.can_schedule(), "create_machine", &ctx.actor_id)?;

        if req.name.trim().is_empty() {
            return Err(ApiError::InvalidInput("机台名称不能为空".to_string()));
        }

        let machine = Machine::new(
            req.name.trim().to_string(),
            req.description,
            req.machine_type,
            req.specifications,
        );
        self.machine_repo.insert(&machine)?;

        self.action_log_repo.insert(
            &ActionLog::new(ctx, ActionType::CreateMachine)
                .machine(&machine.machine_id)
                .payload(serde_json::json!({
                    "name": machine.name,
                    "machine_type": machine.machine_type.to_db_str(),
                }))
                .detail(format!("登记机台: {}", machine.name)),
        )?;

        tracing::info!(machine_id = %machine.machine_id, name = %machine.name, "机台已登记");
        Ok(machine)
    }

    /// 查询单个机台
    pub fn get_machine(&self, machine_id: &str) -> ApiResult<Machine> {
        Ok(self.machine_repo.get(machine_id)?)
    }

    /// 机台列表 (新建在前)
    pub fn list_machines(&self) -> ApiResult<Vec<Machine>> {
        Ok(self.machine_repo.list_all()?)
    }

    /// 人工覆写机台状态
    ///
    /// # 参数
    /// - status: 目标状态
    /// - estimated_free_time: 仅 occupied 时必填, 其余状态必须为空
    ///
    /// # 返回
    /// - Ok(Machine): 覆写后的机台
    /// - Err(InvalidInput): 预计空闲时间与状态不匹配
    pub fn set_machine_status(
        &self,
        ctx: &OperatorContext,
        machine_id: &str,
        status: MachineStatus,
        estimated_free_time: Option<NaiveDateTime>,
    ) -> ApiResult<Machine> {
        require(ctx.can_schedule(), "set_machine_status", &ctx.actor_id)?;

        let change = match (status, estimated_free_time) {
            (MachineStatus::Occupied, Some(free_at)) => MachineStateChange::Occupy {
                estimated_free_time: free_at,
                order_id: None,
            },
            (MachineStatus::Occupied, None) => {
                return Err(ApiError::InvalidInput(
                    "occupied 状态必须提供预计空闲时间".to_string(),
                ))
            }
            (_, Some(_)) => {
                return Err(ApiError::InvalidInput(format!(
                    "{} 状态不能携带预计空闲时间",
                    status
                )))
            }
            (MachineStatus::Free, None) => MachineStateChange::Release,
            (MachineStatus::Maintenance, None) => MachineStateChange::Maintenance,
        };

        let before = self.machine_repo.get(machine_id)?;
        let running = self.booking_repo.find_running_by_machine(machine_id)?;
        if !running.is_empty() {
            tracing::warn!(
                machine_id,
                running = running.len(),
                target = %status,
                "人工覆写的机台仍有生产中的预约"
            );
        }

        self.machine_repo.apply_change(machine_id, &change)?;
        let after = self.machine_repo.get(machine_id)?;

        self.action_log_repo.insert(
            &ActionLog::new(ctx, ActionType::MachineStatusOverride)
                .machine(machine_id)
                .payload(serde_json::json!({
                    "from": before.status.to_db_str(),
                    "to": status.to_db_str(),
                    "estimated_free_time": estimated_free_time.map(|t| crate::db::fmt_ts(&t)),
                }))
                .detail(format!("机台状态覆写: {} → {}", before.status, status)),
        )?;

        tracing::info!(machine_id, from = %before.status, to = %status, "机台状态已覆写");
        Ok(after)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::UserRole;
    use rusqlite::Connection;
    use std::sync::Mutex;

    fn setup() -> MachineApi {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::configure_sqlite_connection(&conn).unwrap();
        crate::db::init_schema(&conn).unwrap();
        let conn = Arc::new(Mutex::new(conn));
        MachineApi::new(
            Arc::new(MachineRepository::new(conn.clone())),
            Arc::new(BookingRepository::new(conn.clone())),
            Arc::new(ActionLogRepository::new(conn)),
        )
    }

    fn admin() -> OperatorContext {
        OperatorContext::new("u-admin", "Admin", UserRole::Admin)
    }

    fn printer() -> NewMachine {
        NewMachine {
            name: "Label Printer Pro 1".to_string(),
            description: "8-colour flexo".to_string(),
            machine_type: MachineType::Printing,
            specifications: Some("330mm web".to_string()),
        }
    }

    #[test]
    fn test_create_and_list() {
        let api = setup();
        let m = api.create_machine(&admin(), printer()).unwrap();
        assert_eq!(m.status, MachineStatus::Free);
        assert_eq!(api.list_machines().unwrap().len(), 1);
        assert_eq!(api.get_machine(&m.machine_id).unwrap().name, "Label Printer Pro 1");
    }

    #[test]
    fn test_customer_cannot_create() {
        let api = setup();
        let customer = OperatorContext::new("c1", "Cust", UserRole::Customer);
        assert!(matches!(
            api.create_machine(&customer, printer()),
            Err(ApiError::PermissionDenied(_))
        ));
    }

    #[test]
    fn test_override_enforces_pairing() {
        let api = setup();
        let m = api.create_machine(&admin(), printer()).unwrap();

        assert!(matches!(
            api.set_machine_status(&admin(), &m.machine_id, MachineStatus::Occupied, None),
            Err(ApiError::InvalidInput(_))
        ));

        let free_at = chrono::Local::now().naive_local();
        assert!(matches!(
            api.set_machine_status(&admin(), &m.machine_id, MachineStatus::Maintenance, Some(free_at)),
            Err(ApiError::InvalidInput(_))
        ));

        let occupied = api
            .set_machine_status(&admin(), &m.machine_id, MachineStatus::Occupied, Some(free_at))
            .unwrap();
        assert!(occupied.is_consistent());
        assert!(occupied.estimated_free_time.is_some());

        let maint = api
            .set_machine_status(&admin(), &m.machine_id, MachineStatus::Maintenance, None)
            .unwrap();
        assert_eq!(maint.status, MachineStatus::Maintenance);
        assert!(maint.estimated_free_time.is_none());
    }

    #[test]
    fn test_unknown_machine_is_not_found() {
        let api = setup();
        assert!(matches!(api.get_machine("nope"), Err(ApiError::NotFound(_))));
        assert!(matches!(
            api.set_machine_status(&admin(), "nope", MachineStatus::Free, None),
            Err(ApiError::NotFound(_))
        ));
    }
}
