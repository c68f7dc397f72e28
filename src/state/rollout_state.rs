//! Rollout 运行状态
//!
//! 每次运行新建一份，运行结束后转成 `RolloutSummary`，不做持久化。
//! 并发的主机任务通过 `RwLock` 写入各自的结果。

use chrono::{DateTime, Utc};
use std::path::PathBuf;
use tokio::sync::RwLock;

use crate::domain::{
    BatchReport, CommandFailure, Host, HostSummary, Phase, PhaseRecord, PhaseStatus,
    Reachability, RolloutSummary,
};
use crate::error::BootstrapError;

/// 单台主机的运行状态
struct HostEntry {
    host: Host,
    reachability: Reachability,
    completed: Vec<Phase>,
}

/// Rollout 状态
pub struct RolloutState {
    run_id: String,
    started_at: DateTime<Utc>,
    /// 按阶段顺序排列的记录
    phases: RwLock<Vec<PhaseRecord>>,
    /// 按配置顺序排列
    hosts: RwLock<Vec<HostEntry>>,
    failures: RwLock<Vec<CommandFailure>>,
    undelivered: RwLock<Vec<String>>,
    retrieved: RwLock<Vec<PathBuf>>,
}

impl RolloutState {
    /// 创建新的运行状态
    pub fn new(hosts: &[Host]) -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            started_at: Utc::now(),
            phases: RwLock::new(Phase::ALL.iter().copied().map(PhaseRecord::new).collect()),
            hosts: RwLock::new(
                hosts
                    .iter()
                    .cloned()
                    .map(|host| HostEntry {
                        host,
                        reachability: Reachability::Unknown,
                        completed: Vec::new(),
                    })
                    .collect(),
            ),
            failures: RwLock::new(Vec::new()),
            undelivered: RwLock::new(Vec::new()),
            retrieved: RwLock::new(Vec::new()),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// 开始阶段
    pub async fn begin_phase(&self, phase: Phase) {
        let mut phases = self.phases.write().await;
        if let Some(record) = phases.iter_mut().find(|r| r.phase == phase) {
            record.start();
        }
    }

    /// 结束阶段
    pub async fn finish_phase(&self, phase: Phase, status: PhaseStatus, message: Option<String>) {
        let mut phases = self.phases.write().await;
        if let Some(record) = phases.iter_mut().find(|r| r.phase == phase) {
            record.finish(status, message);
        }
    }

    /// 跳过阶段
    pub async fn skip_phase(&self, phase: Phase, reason: impl Into<String>) {
        let mut phases = self.phases.write().await;
        if let Some(record) = phases.iter_mut().find(|r| r.phase == phase) {
            record.skip(Some(reason.into()));
        }
    }

    /// rollout 被终止：运行中的阶段标记失败，未开始的阶段标记跳过
    pub async fn abandon(&self, reason: &str) {
        let mut phases = self.phases.write().await;
        for record in phases.iter_mut() {
            match record.status {
                PhaseStatus::Running => record.finish(PhaseStatus::Failed, Some(reason.to_string())),
                PhaseStatus::Pending => record.skip(Some(reason.to_string())),
                _ => {}
            }
        }
    }

    /// 当前正在运行的阶段
    pub async fn current_phase(&self) -> Option<Phase> {
        let phases = self.phases.read().await;
        phases
            .iter()
            .find(|r| r.status == PhaseStatus::Running)
            .map(|r| r.phase)
    }

    pub async fn phase_status(&self, phase: Phase) -> PhaseStatus {
        let phases = self.phases.read().await;
        phases
            .iter()
            .find(|r| r.phase == phase)
            .map(|r| r.status)
            .unwrap_or(PhaseStatus::Pending)
    }

    pub async fn mark_connected(&self, address: &str) {
        self.set_reachability(address, Reachability::Connected).await;
    }

    pub async fn mark_unreachable(&self, address: &str) {
        self.set_reachability(address, Reachability::Failed).await;
    }

    async fn set_reachability(&self, address: &str, reachability: Reachability) {
        let mut hosts = self.hosts.write().await;
        if let Some(entry) = hosts.iter_mut().find(|e| e.host.address == address) {
            entry.reachability = reachability;
        }
    }

    /// 未被标记为不可达
    pub async fn is_reachable(&self, address: &str) -> bool {
        let hosts = self.hosts.read().await;
        hosts
            .iter()
            .find(|e| e.host.address == address)
            .map_or(false, |e| e.reachability != Reachability::Failed)
    }

    /// 记录主机完成了某个阶段
    pub async fn mark_completed(&self, address: &str, phase: Phase) {
        let mut hosts = self.hosts.write().await;
        if let Some(entry) = hosts.iter_mut().find(|e| e.host.address == address) {
            if !entry.completed.contains(&phase) {
                entry.completed.push(phase);
            }
        }
    }

    pub async fn has_completed(&self, address: &str, phase: Phase) -> bool {
        let hosts = self.hosts.read().await;
        hosts
            .iter()
            .find(|e| e.host.address == address)
            .map_or(false, |e| e.completed.contains(&phase))
    }

    /// 收集批次中失败的命令
    pub async fn record_batch(&self, report: &BatchReport) {
        let failures: Vec<CommandFailure> = report
            .failures()
            .map(|r| CommandFailure {
                host: report.host.clone(),
                phase: report.phase,
                command: r.command.clone(),
                exit_status: r.exit_status,
                stderr: r.stderr.clone(),
            })
            .collect();
        if !failures.is_empty() {
            self.failures.write().await.extend(failures);
        }
    }

    pub async fn record_failure(&self, failure: CommandFailure) {
        self.failures.write().await.push(failure);
    }

    /// join 命令没有送达的 worker
    pub async fn record_undelivered(&self, address: &str) {
        let mut undelivered = self.undelivered.write().await;
        if !undelivered.iter().any(|a| a == address) {
            undelivered.push(address.to_string());
        }
    }

    pub async fn record_retrieved(&self, path: PathBuf) {
        self.retrieved.write().await.push(path);
    }

    pub async fn unreachable_hosts(&self) -> Vec<String> {
        let hosts = self.hosts.read().await;
        hosts
            .iter()
            .filter(|e| e.reachability == Reachability::Failed)
            .map(|e| e.host.address.clone())
            .collect()
    }

    pub async fn failure_count(&self) -> usize {
        self.failures.read().await.len()
    }

    /// 生成汇总
    pub async fn summary(&self, fatal: Option<&BootstrapError>) -> RolloutSummary {
        let hosts: Vec<HostSummary> = self
            .hosts
            .read()
            .await
            .iter()
            .map(|e| HostSummary {
                address: e.host.address.clone(),
                role: e.host.role,
                reachability: e.reachability,
                completed: e.completed.clone(),
            })
            .collect();

        RolloutSummary {
            run_id: self.run_id.clone(),
            started_at: self.started_at,
            finished_at: Utc::now(),
            phases: self.phases.read().await.clone(),
            unreachable: self.unreachable_hosts().await,
            hosts,
            failed_commands: self.failures.read().await.clone(),
            undelivered: self.undelivered.read().await.clone(),
            retrieved_files: self.retrieved.read().await.clone(),
            fatal: fatal.map(|e| e.to_string()),
            exit_code: fatal.map_or(0, |e| e.exit_code()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{assign_roles, CommandOutput, ExecutionResult, RemoteCommand};

    fn state() -> RolloutState {
        RolloutState::new(&assign_roles(&["10.0.0.1", "10.0.0.2", "10.0.0.3"], 22))
    }

    #[tokio::test]
    async fn test_phase_tracking() {
        let state = state();
        assert_eq!(state.current_phase().await, None);

        state.begin_phase(Phase::Provision).await;
        assert_eq!(state.current_phase().await, Some(Phase::Provision));

        state.finish_phase(Phase::Provision, PhaseStatus::Success, None).await;
        assert_eq!(state.current_phase().await, None);
        assert_eq!(state.phase_status(Phase::Provision).await, PhaseStatus::Success);

        state.skip_phase(Phase::PostInstall, "disabled").await;
        assert_eq!(state.phase_status(Phase::PostInstall).await, PhaseStatus::Skipped);
    }

    #[tokio::test]
    async fn test_abandon_closes_open_phases() {
        let state = state();
        state.begin_phase(Phase::Provision).await;
        state.finish_phase(Phase::Provision, PhaseStatus::Success, None).await;
        state.begin_phase(Phase::Initialize).await;

        state.abandon("kubeadm init failed").await;

        assert_eq!(state.phase_status(Phase::Provision).await, PhaseStatus::Success);
        assert_eq!(state.phase_status(Phase::Initialize).await, PhaseStatus::Failed);
        assert_eq!(state.phase_status(Phase::Join).await, PhaseStatus::Skipped);
        assert_eq!(state.current_phase().await, None);
    }

    #[tokio::test]
    async fn test_reachability_and_completion() {
        let state = state();
        assert!(state.is_reachable("10.0.0.3").await);

        state.mark_unreachable("10.0.0.3").await;
        state.mark_connected("10.0.0.2").await;
        state.mark_completed("10.0.0.2", Phase::Provision).await;
        state.mark_completed("10.0.0.2", Phase::Provision).await;

        assert!(!state.is_reachable("10.0.0.3").await);
        assert!(!state.is_reachable("10.9.9.9").await);
        assert!(state.has_completed("10.0.0.2", Phase::Provision).await);
        assert!(!state.has_completed("10.0.0.2", Phase::Join).await);
        assert_eq!(state.unreachable_hosts().await, vec!["10.0.0.3"]);

        let summary = state.summary(None).await;
        assert!(summary.is_success());
        assert_eq!(summary.exit_code, 0);
        assert_eq!(summary.host("10.0.0.2").unwrap().completed, vec![Phase::Provision]);
    }

    #[tokio::test]
    async fn test_record_batch_collects_failures() {
        let state = state();
        let ok = RemoteCommand::new("true");
        let bad = RemoteCommand::new("setenforce 0");
        let report = BatchReport {
            host: "10.0.0.2".to_string(),
            phase: Phase::Provision,
            results: vec![
                ExecutionResult::from_output(&ok, CommandOutput::ok(""), 1),
                ExecutionResult::from_output(&bad, CommandOutput::failed(1, "SELinux is disabled"), 1),
            ],
        };
        state.record_batch(&report).await;

        let summary = state.summary(Some(&BootstrapError::NoReachableHosts)).await;
        assert_eq!(summary.failed_commands.len(), 1);
        assert_eq!(summary.failed_commands[0].command, "setenforce 0");
        assert_eq!(summary.failed_commands[0].stderr, "SELinux is disabled");
        assert!(!summary.is_success());
        assert_eq!(summary.exit_code, 2);
    }
}
