// ==========================================
// 生产排程核心 - 可用时间预估引擎
// ==========================================
// 职责: 根据机台当前占用情况预估订单最早开工时间
// 输入: 请求的 (machine_id, estimated_hours) 列表 + 机台快照 + now
// 输出: AvailabilityEstimate
// ==========================================
// 红线: 纯函数, 无隐藏状态, 不访问数据库, 不返回错误
// 规则: 各机台并行, 总等待 = 各机台等待的最大值 (不是求和)
// ==========================================

use crate::domain::booking::BookingRequest;
use crate::domain::machine::Machine;
use crate::domain::types::MachineStatus;
use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ==========================================
// MachineWait - 单机台等待
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MachineWait {
    pub machine_id: String,
    pub machine_name: String,
    pub status: MachineStatus,
    pub wait_hours: f64,
}

// ==========================================
// AvailabilityEstimate - 预估结果
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AvailabilityEstimate {
    /// 未请求任何机台 (或请求的机台均不存在): 不适用, 非错误
    NotApplicable,
    Scheduled {
        start_time: NaiveDateTime,
        wait_hours: f64,
        wait_hours_rounded: i64,    // 向上取整, 用于展示
        any_occupied: bool,
        per_machine: Vec<MachineWait>,
    },
}

impl AvailabilityEstimate {
    pub fn is_applicable(&self) -> bool {
        !matches!(self, AvailabilityEstimate::NotApplicable)
    }

    pub fn start_time(&self) -> Option<NaiveDateTime> {
        match self {
            AvailabilityEstimate::Scheduled { start_time, .. } => Some(*start_time),
            AvailabilityEstimate::NotApplicable => None,
        }
    }

    pub fn wait_hours(&self) -> f64 {
        match self {
            AvailabilityEstimate::Scheduled { wait_hours, .. } => *wait_hours,
            AvailabilityEstimate::NotApplicable => 0.0,
        }
    }

    pub fn any_occupied(&self) -> bool {
        match self {
            AvailabilityEstimate::Scheduled { any_occupied, .. } => *any_occupied,
            AvailabilityEstimate::NotApplicable => false,
        }
    }
}

// ==========================================
// AvailabilityEstimator - 可用时间预估引擎
// ==========================================
pub struct AvailabilityEstimator {
    // 无状态引擎
}

impl AvailabilityEstimator {
    pub fn new() -> Self {
        Self {}
    }

    /// 预估最早开工时间
    ///
    /// # 参数
    /// - `requested`: 请求的机台与预计小时
    /// - `machines`: 机台快照 (可多于请求集合; 不在快照中的请求机台被跳过)
    /// - `now`: 当前时间
    ///
    /// # 返回
    /// - NotApplicable: 请求为空, 或没有任何请求机台出现在快照中
    /// - Scheduled: start_time = now + max(各占用机台的剩余等待)
    pub fn estimate(
        &self,
        requested: &[BookingRequest],
        machines: &[Machine],
        now: NaiveDateTime,
    ) -> AvailabilityEstimate {
        let by_id: HashMap<&str, &Machine> = machines
            .iter()
            .map(|m| (m.machine_id.as_str(), m))
            .collect();

        let mut per_machine = Vec::with_capacity(requested.len());
        let mut max_wait_secs: i64 = 0;
        let mut any_occupied = false;

        for request in requested {
            let machine = match by_id.get(request.machine_id.as_str()) {
                Some(m) => *m,
                None => continue,
            };

            any_occupied |= machine.status == MachineStatus::Occupied;
            let wait_secs = machine.wait_seconds_from(now);
            max_wait_secs = max_wait_secs.max(wait_secs);

            per_machine.push(MachineWait {
                machine_id: machine.machine_id.clone(),
                machine_name: machine.name.clone(),
                status: machine.status,
                wait_hours: wait_secs as f64 / 3600.0,
            });
        }

        if per_machine.is_empty() {
            return AvailabilityEstimate::NotApplicable;
        }

        let wait_hours = max_wait_secs as f64 / 3600.0;
        AvailabilityEstimate::Scheduled {
            start_time: now + Duration::seconds(max_wait_secs),
            wait_hours,
            wait_hours_rounded: wait_hours.ceil() as i64,
            any_occupied,
            per_machine,
        }
    }
}

impl Default for AvailabilityEstimator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::machine::MachineStateChange;
    use crate::domain::types::MachineType;
    use chrono::NaiveDate;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 5, 4)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap()
    }

    fn machine(id: &str) -> Machine {
        let mut m = Machine::new(id.to_string(), "".into(), MachineType::Printing, None);
        m.machine_id = id.to_string();
        m
    }

    fn occupied(id: &str, free_in: Duration) -> Machine {
        let mut m = machine(id);
        MachineStateChange::Occupy {
            estimated_free_time: now() + free_in,
            order_id: Some("O-X".into()),
        }
        .apply_to(&mut m);
        m
    }

    fn maintenance(id: &str) -> Machine {
        let mut m = machine(id);
        MachineStateChange::Maintenance.apply_to(&mut m);
        m
    }

    fn req(id: &str, hours: i64) -> BookingRequest {
        BookingRequest::new(id, hours)
    }

    #[test]
    fn test_empty_request_is_not_applicable() {
        let est = AvailabilityEstimator::new().estimate(&[], &[machine("M1")], now());
        assert_eq!(est, AvailabilityEstimate::NotApplicable);
        assert!(!est.is_applicable());
        assert_eq!(est.start_time(), None);
    }

    #[test]
    fn test_unknown_machines_only_is_not_applicable() {
        let est = AvailabilityEstimator::new().estimate(&[req("GHOST", 2)], &[machine("M1")], now());
        assert_eq!(est, AvailabilityEstimate::NotApplicable);
    }

    #[test]
    fn test_single_free_machine_starts_now() {
        let est = AvailabilityEstimator::new().estimate(&[req("M1", 2)], &[machine("M1")], now());
        assert_eq!(est.start_time(), Some(now()));
        assert_eq!(est.wait_hours(), 0.0);
        assert!(!est.any_occupied());
    }

    #[test]
    fn test_max_not_sum_of_waits() {
        let machines = vec![occupied("M1", Duration::hours(1)), machine("M2")];
        let est = AvailabilityEstimator::new().estimate(&[req("M1", 2), req("M2", 3)], &machines, now());
        assert_eq!(est.wait_hours(), 1.0);
        assert_eq!(est.start_time(), Some(now() + Duration::hours(1)));
        assert!(est.any_occupied());
    }

    #[test]
    fn test_two_occupied_machines_take_the_longer_wait() {
        let machines = vec![
            occupied("M1", Duration::hours(2)),
            occupied("M2", Duration::hours(5)),
        ];
        let est = AvailabilityEstimator::new().estimate(&[req("M1", 1), req("M2", 1)], &machines, now());
        assert_eq!(est.wait_hours(), 5.0);
        assert_eq!(est.start_time(), Some(now() + Duration::hours(5)));
    }

    #[test]
    fn test_expired_free_time_counts_as_zero_wait() {
        let machines = vec![occupied("M1", Duration::hours(-3))];
        let est = AvailabilityEstimator::new().estimate(&[req("M1", 1)], &machines, now());
        assert_eq!(est.wait_hours(), 0.0);
        assert_eq!(est.start_time(), Some(now()));
        // 依然如实报告有机台处于占用
        assert!(est.any_occupied());
    }

    #[test]
    fn test_maintenance_does_not_add_wait() {
        let machines = vec![maintenance("M1"), machine("M2")];
        let est = AvailabilityEstimator::new().estimate(&[req("M1", 1), req("M2", 1)], &machines, now());
        assert_eq!(est.wait_hours(), 0.0);
        assert!(!est.any_occupied());
    }

    #[test]
    fn test_rounded_wait_is_ceiling() {
        let machines = vec![occupied("M1", Duration::minutes(90))];
        match AvailabilityEstimator::new().estimate(&[req("M1", 1)], &machines, now()) {
            AvailabilityEstimate::Scheduled {
                wait_hours,
                wait_hours_rounded,
                per_machine,
                ..
            } => {
                assert_eq!(wait_hours, 1.5);
                assert_eq!(wait_hours_rounded, 2);
                assert_eq!(per_machine.len(), 1);
                assert_eq!(per_machine[0].wait_hours, 1.5);
            }
            other => panic!("unexpected estimate: {:?}", other),
        }
    }

    #[test]
    fn test_unrequested_machines_are_ignored() {
        let machines = vec![occupied("BUSY", Duration::hours(8)), machine("M1")];
        let est = AvailabilityEstimator::new().estimate(&[req("M1", 1)], &machines, now());
        assert_eq!(est.wait_hours(), 0.0);
        assert!(!est.any_occupied());
    }

    #[test]
    fn test_estimate_is_reproducible() {
        let machines = vec![occupied("M1", Duration::hours(3)), machine("M2")];
        let requested = vec![req("M1", 4), req("M2", 2)];
        let estimator = AvailabilityEstimator::new();
        let a = estimator.estimate(&requested, &machines, now());
        let b = estimator.estimate(&requested, &machines, now());
        assert_eq!(a, b);
    }

    #[test]
    fn test_wait_is_max_over_all_subsets() {
        // 穷举三台机台的占用组合, 校验 wait = max(单机等待)
        let offsets = [None, Some(1), Some(4)];
        let estimator = AvailabilityEstimator::new();
        for a in offsets {
            for b in offsets {
                for c in offsets {
                    let build = |id: &str, off: Option<i64>| match off {
                        Some(h) => occupied(id, Duration::hours(h)),
                        None => machine(id),
                    };
                    let machines = vec![build("A", a), build("B", b), build("C", c)];
                    let est = estimator.estimate(
                        &[req("A", 1), req("B", 1), req("C", 1)],
                        &machines,
                        now(),
                    );
                    let expected = [a, b, c].iter().filter_map(|o| *o).max().unwrap_or(0);
                    assert_eq!(est.wait_hours(), expected as f64);
                    assert_eq!(est.any_occupied(), [a, b, c].iter().any(|o| o.is_some()));
                    assert_eq!(est.start_time(), Some(now() + Duration::hours(expected)));
                }
            }
        }
    }
}
