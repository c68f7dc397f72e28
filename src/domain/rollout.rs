//! Rollout 阶段与汇总模型

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

use super::host::{NodeRole, Reachability};

/// Rollout 阶段，按执行顺序排列
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Provision,
    Initialize,
    Distribute,
    Join,
    PostInstall,
    Retrieve,
}

impl Phase {
    pub const ALL: [Phase; 6] = [
        Phase::Provision,
        Phase::Initialize,
        Phase::Distribute,
        Phase::Join,
        Phase::PostInstall,
        Phase::Retrieve,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Provision => "provision",
            Phase::Initialize => "initialize",
            Phase::Distribute => "distribute",
            Phase::Join => "join",
            Phase::PostInstall => "post_install",
            Phase::Retrieve => "retrieve",
        }
    }

    /// 显示名称
    pub fn display_name(&self) -> &'static str {
        match self {
            Phase::Provision => "Provision all nodes",
            Phase::Initialize => "Initialize control plane",
            Phase::Distribute => "Distribute join command",
            Phase::Join => "Join workers",
            Phase::PostInstall => "Post-install add-ons",
            Phase::Retrieve => "Retrieve artifacts",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 阶段状态
#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    Pending,
    Running,
    Success,
    /// 部分主机或命令失败
    Partial,
    Failed,
    Skipped,
}

impl PhaseStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PhaseStatus::Pending | PhaseStatus::Running)
    }
}

/// 阶段执行记录
#[derive(Clone, Debug, Serialize)]
pub struct PhaseRecord {
    pub phase: Phase,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub status: PhaseStatus,
    pub message: Option<String>,
}

impl PhaseRecord {
    pub fn new(phase: Phase) -> Self {
        Self {
            phase,
            started_at: None,
            finished_at: None,
            duration_ms: None,
            status: PhaseStatus::Pending,
            message: None,
        }
    }

    pub fn start(&mut self) {
        self.started_at = Some(Utc::now());
        self.status = PhaseStatus::Running;
    }

    pub fn finish(&mut self, status: PhaseStatus, message: Option<String>) {
        let now = Utc::now();
        self.finished_at = Some(now);
        self.status = status;
        self.message = message;
        if let Some(started) = self.started_at {
            self.duration_ms = Some((now - started).num_milliseconds());
        }
    }

    pub fn skip(&mut self, reason: Option<String>) {
        self.status = PhaseStatus::Skipped;
        self.message = reason;
    }
}

/// 一条失败的命令，供运维手工修复后重跑
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct CommandFailure {
    pub host: String,
    pub phase: Phase,
    pub command: String,
    pub exit_status: Option<u32>,
    pub stderr: String,
}

/// 单台主机的最终状态
#[derive(Clone, Debug, Serialize)]
pub struct HostSummary {
    pub address: String,
    pub role: NodeRole,
    pub reachability: Reachability,
    pub completed: Vec<Phase>,
}

/// Rollout 汇总
#[derive(Clone, Debug, Serialize)]
pub struct RolloutSummary {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub phases: Vec<PhaseRecord>,
    pub hosts: Vec<HostSummary>,
    /// 重试耗尽仍无法连接的主机
    pub unreachable: Vec<String>,
    pub failed_commands: Vec<CommandFailure>,
    /// join 命令未能送达的 worker
    pub undelivered: Vec<String>,
    pub retrieved_files: Vec<PathBuf>,
    /// 终止 rollout 的错误
    pub fatal: Option<String>,
    #[serde(skip)]
    pub exit_code: u8,
}

impl RolloutSummary {
    pub fn is_success(&self) -> bool {
        self.fatal.is_none()
    }

    pub fn phase(&self, phase: Phase) -> Option<&PhaseRecord> {
        self.phases.iter().find(|r| r.phase == phase)
    }

    pub fn host(&self, address: &str) -> Option<&HostSummary> {
        self.hosts.iter().find(|h| h.address == address)
    }

    /// 打印给运维看的汇总
    pub fn print(&self) {
        println!();
        println!("******************************************************");
        println!("* Rollout summary ({})", self.run_id);
        println!("******************************************************");
        for record in &self.phases {
            let duration = record
                .duration_ms
                .map(|ms| format!(" ({:.1}s)", ms as f64 / 1000.0))
                .unwrap_or_default();
            println!(
                "  {:<28} {:?}{}",
                record.phase.display_name(),
                record.status,
                duration
            );
        }
        if !self.unreachable.is_empty() {
            println!();
            println!("  Unreachable hosts:");
            for host in &self.unreachable {
                println!("    - {}", host);
            }
        }
        if !self.undelivered.is_empty() {
            println!();
            println!("  Join command not delivered to:");
            for host in &self.undelivered {
                println!("    - {}", host);
            }
        }
        if !self.failed_commands.is_empty() {
            println!();
            println!("  Failed commands:");
            for failure in &self.failed_commands {
                println!(
                    "    - [{}] {} ({}): {}",
                    failure.host, failure.command, failure.phase, failure.stderr
                );
            }
        }
        if !self.retrieved_files.is_empty() {
            println!();
            println!("  Retrieved files:");
            for path in &self.retrieved_files {
                println!("    - {}", path.display());
            }
        }
        if let Some(ref fatal) = self.fatal {
            println!();
            println!("  FATAL: {}", fatal);
        }
        println!();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_order() {
        let mut phases = Phase::ALL.to_vec();
        phases.reverse();
        phases.sort();
        assert_eq!(phases, Phase::ALL.to_vec());
        assert!(Phase::Distribute < Phase::Join);
    }

    #[test]
    fn test_phase_record_lifecycle() {
        let mut record = PhaseRecord::new(Phase::Provision);
        assert_eq!(record.status, PhaseStatus::Pending);

        record.start();
        assert_eq!(record.status, PhaseStatus::Running);
        assert!(record.started_at.is_some());

        record.finish(PhaseStatus::Partial, Some("1 host unreachable".to_string()));
        assert!(record.status.is_terminal());
        assert!(record.duration_ms.is_some());
    }

    #[test]
    fn test_skipped_phase_has_no_timing() {
        let mut record = PhaseRecord::new(Phase::PostInstall);
        record.skip(Some("disabled".to_string()));
        assert_eq!(record.status, PhaseStatus::Skipped);
        assert!(record.started_at.is_none());
    }
}
