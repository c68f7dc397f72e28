//! Join 命令中继
//!
//! 从控制平面的 `kubeadm init` 输出里取出 join 命令，写到控制平面的固定路径，
//! 再由控制平面直接 scp 到每个 worker 的同一路径（不经过本机）。

use std::sync::Arc;

use tracing::{info, warn};

use super::batch::{execute, BatchExecutor};
use super::session::Session;
use crate::config::Playbook;
use crate::domain::{CommandBatch, Host, JoinArtifact, Phase, RemoteCommand};
use crate::error::{BootstrapError, BootstrapResult};

/// 分发结果
#[derive(Debug, Default)]
pub struct DistributionReport {
    /// 已送达的 worker，顺序与输入一致
    pub delivered: Vec<Host>,
    /// 送达失败的 worker 及原因
    pub failed: Vec<(Host, String)>,
}

impl DistributionReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

pub struct ArtifactRelay {
    executor: Arc<BatchExecutor>,
    playbook: Playbook,
}

impl ArtifactRelay {
    pub fn new(executor: Arc<BatchExecutor>, playbook: Playbook) -> Self {
        Self { executor, playbook }
    }

    /// 读取控制平面上保存的 init 输出，提取 join 命令并落盘
    ///
    /// 找不到 join 命令时返回 `ArtifactCapture`，绝不会落盘一个空命令。
    pub async fn capture(&self, control_plane: &Host) -> BootstrapResult<JoinArtifact> {
        let mut session = self.executor.sessions().open(control_plane).await?;
        let result = self.capture_in(&mut session).await;
        session.close().await;

        if let Ok(artifact) = &result {
            info!(
                host = %control_plane.address,
                path = %self.playbook.join_command_path,
                artifact = %artifact,
                "Join command captured"
            );
        }
        result
    }

    async fn capture_in(&self, session: &mut Session) -> BootstrapResult<JoinArtifact> {
        let read = RemoteCommand::sensitive(
            format!("cat {}", self.playbook.kubeinit_log_path),
            format!("read {}", self.playbook.kubeinit_log_path),
        );
        let output = execute(session, &read).await;
        if !output.success {
            return Err(BootstrapError::control_plane(
                session.host(),
                format!(
                    "could not read {}: {}",
                    self.playbook.kubeinit_log_path, output.stderr
                ),
            ));
        }

        let artifact = JoinArtifact::extract(&output.stdout, &self.playbook.join_marker).ok_or_else(
            || BootstrapError::ArtifactCapture {
                marker: self.playbook.join_marker.clone(),
            },
        )?;

        let persist = RemoteCommand::sensitive(
            artifact.persist_script(&self.playbook.join_command_path),
            format!("write join command to {}", self.playbook.join_command_path),
        );
        let written = execute(session, &persist).await;
        if !written.success {
            return Err(BootstrapError::control_plane(
                session.host(),
                format!(
                    "could not write {}: {}",
                    self.playbook.join_command_path, written.stderr
                ),
            ));
        }

        Ok(artifact)
    }

    /// 从控制平面把 join 命令拷到每个目标主机
    ///
    /// 单个目标失败不影响其他目标；控制平面连不上时所有目标都算失败。
    pub async fn distribute(
        &self,
        artifact: &JoinArtifact,
        control_plane: &Host,
        targets: &[Host],
    ) -> DistributionReport {
        let mut report = DistributionReport::default();
        if targets.is_empty() {
            return report;
        }

        info!(
            host = %control_plane.address,
            targets = targets.len(),
            artifact = %artifact,
            "Distributing join command"
        );

        let batch = CommandBatch {
            phase: Phase::Distribute,
            commands: targets
                .iter()
                .map(|t| self.playbook.distribute_command(t))
                .collect(),
        };

        match self.executor.run_batch(control_plane, &batch).await {
            Ok(batch_report) => {
                for (target, result) in targets.iter().zip(batch_report.results) {
                    if result.success {
                        report.delivered.push(target.clone());
                    } else {
                        warn!(
                            host = %target.address,
                            stderr = %result.stderr,
                            "Join command was not delivered"
                        );
                        let reason = if result.stderr.is_empty() {
                            format!("scp exited with {:?}", result.exit_status)
                        } else {
                            result.stderr
                        };
                        report.failed.push((target.clone(), reason));
                    }
                }
            }
            Err(e) => {
                warn!(host = %control_plane.address, error = %e, "Control plane unreachable for distribution");
                let reason = e.to_string();
                report.failed = targets
                    .iter()
                    .map(|t| (t.clone(), reason.clone()))
                    .collect();
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryPolicy;
    use crate::domain::{assign_roles, CommandOutput, Credentials};
    use crate::infra::mock::{CallKind, MockTransport};
    use crate::services::session::SessionManager;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    const INIT_OUTPUT: &str = "\
Your Kubernetes control-plane has initialized successfully!

Then you can join any number of worker nodes by running the following on each as root:

kubeadm join 10.0.0.1:6443 --token abcdef.0123456789abcdef \\
\t--discovery-token-ca-cert-hash sha256:1234
";

    fn relay(transport: &MockTransport) -> ArtifactRelay {
        let sessions = SessionManager::new(
            Arc::new(transport.clone()),
            Arc::new(Credentials::password("root", "pw")),
            RetryPolicy {
                max_attempts: 1,
                interval: Duration::ZERO,
                retry_auth_failures: false,
            },
            CancellationToken::new(),
        );
        ArtifactRelay::new(Arc::new(BatchExecutor::new(sessions)), Playbook::default())
    }

    #[tokio::test]
    async fn test_capture_persists_join_command() {
        let transport = MockTransport::new().respond(
            Some("10.0.0.1"),
            "cat /tmp/kubeinit-temp",
            CommandOutput::ok(INIT_OUTPUT),
        );
        let hosts = assign_roles(&["10.0.0.1"], 22);

        let artifact = relay(&transport).capture(&hosts[0]).await.unwrap();

        assert_eq!(
            artifact.command(),
            "kubeadm join 10.0.0.1:6443 --token abcdef.0123456789abcdef --discovery-token-ca-cert-hash sha256:1234"
        );
        let commands = transport.commands_for("10.0.0.1");
        assert_eq!(commands.len(), 2);
        assert!(commands[1].contains("> /tmp/join-command"));
        assert_eq!(transport.count("10.0.0.1", &CallKind::Connect), 1);
        assert_eq!(transport.count("10.0.0.1", &CallKind::Close), 1);
    }

    #[tokio::test]
    async fn test_capture_fails_loudly_without_marker() {
        let transport = MockTransport::new().respond(
            None,
            "cat /tmp/kubeinit-temp",
            CommandOutput::ok("[preflight] Some fatal errors occurred"),
        );
        let hosts = assign_roles(&["10.0.0.1"], 22);

        let result = relay(&transport).capture(&hosts[0]).await;

        assert!(matches!(result, Err(BootstrapError::ArtifactCapture { .. })));
        // 没有写入 join 命令文件
        assert_eq!(transport.commands_for("10.0.0.1").len(), 1);
        assert_eq!(transport.count("10.0.0.1", &CallKind::Close), 1);
    }

    #[tokio::test]
    async fn test_distribute_reports_partial_failure() {
        let transport = MockTransport::new().respond(
            Some("10.0.0.1"),
            "10.0.0.3:/tmp/join-command",
            CommandOutput::failed(1, "ssh: connect to host 10.0.0.3 port 22: No route to host"),
        );
        let hosts = assign_roles(&["10.0.0.1", "10.0.0.2", "10.0.0.3", "10.0.0.4"], 22);
        let artifact = JoinArtifact::extract(INIT_OUTPUT, "kubeadm join").unwrap();

        let report = relay(&transport)
            .distribute(&artifact, &hosts[0], &hosts[1..])
            .await;

        let delivered: Vec<_> = report.delivered.iter().map(|h| h.address.as_str()).collect();
        assert_eq!(delivered, vec!["10.0.0.2", "10.0.0.4"]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0.address, "10.0.0.3");
        assert!(report.failed[0].1.contains("No route to host"));
        assert!(!report.is_complete());

        // 全部拷贝都在控制平面上执行
        assert_eq!(transport.commands_for("10.0.0.1").len(), 3);
        assert!(transport.commands_for("10.0.0.2").is_empty());
    }

    #[tokio::test]
    async fn test_distribute_without_control_plane_fails_all() {
        let transport = MockTransport::new().unreachable("10.0.0.1");
        let hosts = assign_roles(&["10.0.0.1", "10.0.0.2", "10.0.0.3"], 22);
        let artifact = JoinArtifact::extract(INIT_OUTPUT, "kubeadm join").unwrap();

        let report = relay(&transport)
            .distribute(&artifact, &hosts[0], &hosts[1..])
            .await;

        assert!(report.delivered.is_empty());
        assert_eq!(report.failed.len(), 2);
    }
}
