// ==========================================
// 测试辅助函数
// ==========================================
// 职责: 临时数据库 + 完整装配的 AppState + 常用操作者与种子数据
// ==========================================
#![allow(dead_code)]

use chrono::{NaiveDate, NaiveDateTime};
use production_scheduler::api::NewMachine;
use production_scheduler::app::AppState;
use production_scheduler::domain::{Machine, MachineType, OperatorContext, UserRole};
use std::error::Error;
use tempfile::NamedTempFile;

/// 创建临时测试数据库路径
///
/// # 返回
/// - NamedTempFile: 临时数据库文件（需要保持存活）
/// - String: 数据库文件路径
pub fn create_test_db() -> Result<(NamedTempFile, String), Box<dyn Error>> {
    let temp_file = NamedTempFile::new()?;
    let db_path = temp_file
        .path()
        .to_str()
        .ok_or("临时路径不是合法 UTF-8")?
        .to_string();
    Ok((temp_file, db_path))
}

/// 创建完整装配的 AppState
pub fn create_test_state() -> (NamedTempFile, AppState) {
    production_scheduler::logging::init_test();
    let (temp_file, db_path) = create_test_db().unwrap();
    let state = AppState::new(db_path).unwrap();
    (temp_file, state)
}

/// 固定测试时间
pub fn ts(day: u32, hour: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2026, 6, day)
        .unwrap()
        .and_hms_opt(hour, 0, 0)
        .unwrap()
}

pub fn manager() -> OperatorContext {
    OperatorContext::new("pm-1", "Pat Manager", UserRole::ProductionManager)
}

pub fn worker(id: &str) -> OperatorContext {
    OperatorContext::new(id, format!("Worker {}", id), UserRole::Worker)
}

pub fn customer() -> OperatorContext {
    OperatorContext::new("cust-1", "Casey", UserRole::Customer)
}

/// 登记一台机台
pub fn add_machine(state: &AppState, name: &str, machine_type: MachineType) -> Machine {
    state
        .machine_api
        .create_machine(
            &manager(),
            NewMachine {
                name: name.to_string(),
                description: format!("{} for tests", name),
                machine_type,
                specifications: None,
            },
        )
        .unwrap()
}

/// 登记订单
pub fn add_order(state: &AppState, order_id: &str) {
    state
        .order_status_api
        .register_order_at(&manager(), order_id, ts(1, 8))
        .unwrap();
}
