//! 集群引导编排
//!
//! 阶段严格按顺序执行：
//! provision → initialize → distribute → join → post-install → retrieve。
//! provision 和 join 在主机之间并发（受 `max_concurrency` 限制），
//! 每个阶段结束前等待所有主机任务完成。

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::batch::BatchExecutor;
use super::relay::ArtifactRelay;
use super::session::SessionManager;
use crate::config::constants::SUMMARY_FILE_NAME;
use crate::config::playbook::INIT_COMMAND_INDEX;
use crate::config::RolloutConfig;
use crate::domain::{
    CommandBatch, CommandFailure, FileTransfer, Host, JoinArtifact, Phase, PhaseStatus,
    RolloutSummary,
};
use crate::error::{BootstrapError, BootstrapResult};
use crate::infra::RemoteTransport;
use crate::state::RolloutState;

pub struct RoleOrchestrator {
    config: Arc<RolloutConfig>,
    executor: Arc<BatchExecutor>,
    relay: ArtifactRelay,
    state: Arc<RolloutState>,
    cancel: CancellationToken,
}

impl RoleOrchestrator {
    pub fn new(
        config: Arc<RolloutConfig>,
        transport: Arc<dyn RemoteTransport>,
        cancel: CancellationToken,
    ) -> Self {
        let sessions = SessionManager::new(
            transport,
            Arc::new(config.credentials.clone()),
            config.retry,
            cancel.clone(),
        )
        .with_command_timeout(config.command_timeout);
        let executor = Arc::new(BatchExecutor::new(sessions));
        let relay = ArtifactRelay::new(executor.clone(), config.playbook.clone());
        let state = Arc::new(RolloutState::new(&config.hosts));

        Self {
            config,
            executor,
            relay,
            state,
            cancel,
        }
    }

    pub fn state(&self) -> &Arc<RolloutState> {
        &self.state
    }

    /// 执行完整的 rollout，无论成败都返回汇总
    pub async fn run(&self) -> RolloutSummary {
        info!(
            run_id = %self.state.run_id(),
            control_plane = %self.config.control_plane(),
            hosts = self.config.hosts.len(),
            "Starting cluster rollout"
        );

        match self.run_phases().await {
            Ok(()) => {
                let summary = self.state.summary(None).await;
                info!(
                    run_id = %summary.run_id,
                    unreachable = summary.unreachable.len(),
                    failed_commands = summary.failed_commands.len(),
                    "Rollout finished"
                );
                summary
            }
            Err(e) => {
                error!(run_id = %self.state.run_id(), error = %e, "Rollout aborted");
                self.state.abandon(&e.to_string()).await;
                self.state.summary(Some(&e)).await
            }
        }
    }

    async fn run_phases(&self) -> BootstrapResult<()> {
        self.provision().await?;
        let artifact = self.initialize().await?;
        let delivered = self.distribute(&artifact).await?;
        self.join(&delivered).await?;

        if self.config.post_install {
            self.post_install().await?;
        } else {
            self.state
                .skip_phase(Phase::PostInstall, "disabled by --skip-post-install")
                .await;
        }

        self.retrieve().await
    }

    /// 进入阶段前检查取消
    async fn enter(&self, phase: Phase) -> BootstrapResult<()> {
        if self.cancel.is_cancelled() {
            return Err(BootstrapError::Cancelled);
        }
        info!(phase = %phase, "********** {} **********", phase.display_name());
        self.state.begin_phase(phase).await;
        Ok(())
    }

    async fn finish(&self, phase: Phase, failed: usize, total: usize) {
        let status = if total > 0 && failed == total {
            PhaseStatus::Failed
        } else if failed > 0 {
            PhaseStatus::Partial
        } else {
            PhaseStatus::Success
        };
        let message = (failed > 0).then(|| format!("{}/{} host(s) failed", failed, total));
        self.state.finish_phase(phase, status, message).await;
    }

    /// 在多台主机上并发执行，返回顺序不固定
    ///
    /// 每台主机都有一条结果：拿到并发许可时已取消的返回 `Cancelled`，
    /// 任务 panic 的返回 `HostTask`。
    async fn run_concurrently<F, Fut>(&self, hosts: Vec<Host>, task: F) -> Vec<(Host, BootstrapResult<bool>)>
    where
        F: Fn(Host) -> Fut,
        Fut: Future<Output = BootstrapResult<bool>> + Send + 'static,
    {
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency.max(1)));
        let mut tasks = JoinSet::new();
        let mut pending: Vec<Host> = Vec::with_capacity(hosts.len());

        for host in hosts {
            let semaphore = semaphore.clone();
            let cancel = self.cancel.clone();
            let fut = task(host.clone());
            pending.push(host.clone());
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                if cancel.is_cancelled() {
                    return (host, Err(BootstrapError::Cancelled));
                }
                let result = fut.await;
                (host, result)
            });
        }

        let mut results = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((host, result)) => {
                    pending.retain(|h| h.address != host.address);
                    results.push((host, result));
                }
                Err(e) => error!(error = %e, "Host task panicked"),
            }
        }

        for host in pending {
            let err = BootstrapError::HostTask {
                host: host.address.clone(),
                reason: "host task panicked".to_string(),
            };
            results.push((host, Err(err)));
        }
        results
    }

    /// 汇总并发结果；可恢复的错误记为主机不可达，致命错误向上返回
    async fn settle(&self, results: Vec<(Host, BootstrapResult<bool>)>) -> BootstrapResult<usize> {
        let mut failed = 0;
        let mut fatal = None;
        for (host, result) in results {
            match result {
                Ok(true) => {}
                Ok(false) => failed += 1,
                Err(e) if e.is_fatal() => {
                    fatal.get_or_insert(e);
                }
                Err(e) => {
                    warn!(host = %host.address, error = %e, "Skipping host for remaining phases");
                    self.state.mark_unreachable(&host.address).await;
                    failed += 1;
                }
            }
        }
        match fatal {
            Some(e) => Err(e),
            None => Ok(failed),
        }
    }

    async fn reachable(&self, hosts: impl Iterator<Item = &Host>) -> Vec<Host> {
        let mut reachable = Vec::new();
        for host in hosts {
            if self.state.is_reachable(&host.address).await {
                reachable.push(host.clone());
            }
        }
        reachable
    }

    /// 阶段 1：所有主机上传 yum 源并安装依赖
    async fn provision(&self) -> BootstrapResult<()> {
        self.enter(Phase::Provision).await?;

        let upload = FileTransfer::put(
            self.config.repo_file.clone(),
            self.config.playbook.repo_remote_path.clone(),
        );
        let batch = self.config.playbook.provision_batch();

        let results = self
            .run_concurrently(self.config.hosts.clone(), |host| {
                provision_host(
                    self.executor.clone(),
                    self.state.clone(),
                    host,
                    upload.clone(),
                    batch.clone(),
                )
            })
            .await;

        let total = self.config.hosts.len();
        let failed = self.settle(results).await?;
        self.finish(Phase::Provision, failed, total).await;

        if self.state.unreachable_hosts().await.len() == total {
            return Err(BootstrapError::NoReachableHosts);
        }
        Ok(())
    }

    /// 阶段 2：初始化控制平面并捕获 join 命令
    async fn initialize(&self) -> BootstrapResult<JoinArtifact> {
        self.enter(Phase::Initialize).await?;
        let control_plane = self.config.control_plane();

        if !self.state.is_reachable(&control_plane.address).await {
            return Err(BootstrapError::control_plane(
                &control_plane.address,
                "host was unreachable during provisioning",
            ));
        }

        let report = self
            .executor
            .run_batch(control_plane, &self.config.playbook.control_plane_batch())
            .await
            .map_err(|e| escalate(control_plane, e))?;
        self.state.record_batch(&report).await;

        match report.results.get(INIT_COMMAND_INDEX) {
            Some(init) if init.success => {}
            Some(init) => {
                return Err(BootstrapError::control_plane(
                    &control_plane.address,
                    format!("kubeadm init failed: {}", init.stderr),
                ));
            }
            None => {
                return Err(BootstrapError::control_plane(
                    &control_plane.address,
                    "kubeadm init did not run",
                ));
            }
        }

        let artifact = self
            .relay
            .capture(control_plane)
            .await
            .map_err(|e| escalate(control_plane, e))?;

        if report.all_succeeded() {
            self.state
                .mark_completed(&control_plane.address, Phase::Initialize)
                .await;
            self.finish(Phase::Initialize, 0, 1).await;
        } else {
            self.state
                .finish_phase(
                    Phase::Initialize,
                    PhaseStatus::Partial,
                    Some(format!("{} command(s) failed", report.failure_count())),
                )
                .await;
        }
        Ok(artifact)
    }

    /// 阶段 3：把 join 命令送到每个可达的 worker，返回送达的 worker
    async fn distribute(&self, artifact: &JoinArtifact) -> BootstrapResult<Vec<Host>> {
        self.enter(Phase::Distribute).await?;
        let control_plane = self.config.control_plane();

        let targets = self.reachable(self.config.workers()).await;
        if targets.is_empty() {
            self.state
                .skip_phase(Phase::Distribute, "no reachable workers")
                .await;
            return Ok(Vec::new());
        }

        let report = self.relay.distribute(artifact, control_plane, &targets).await;

        for (target, reason) in &report.failed {
            self.state.record_undelivered(&target.address).await;
            self.state
                .record_failure(CommandFailure {
                    host: target.address.clone(),
                    phase: Phase::Distribute,
                    command: format!(
                        "copy {} from {}",
                        self.config.playbook.join_command_path, control_plane.address
                    ),
                    exit_status: None,
                    stderr: reason.clone(),
                })
                .await;
        }
        for target in &report.delivered {
            self.state
                .mark_completed(&target.address, Phase::Distribute)
                .await;
        }

        self.finish(Phase::Distribute, report.failed.len(), targets.len())
            .await;
        Ok(report.delivered)
    }

    /// 阶段 4：已送达 join 命令的 worker 加入集群
    async fn join(&self, delivered: &[Host]) -> BootstrapResult<()> {
        self.enter(Phase::Join).await?;
        let control_plane = &self.config.control_plane().address;

        let workers: Vec<Host> = delivered
            .iter()
            .filter(|h| &h.address != control_plane)
            .cloned()
            .collect();
        if workers.is_empty() {
            self.state.skip_phase(Phase::Join, "no workers to join").await;
            return Ok(());
        }

        let batch = self.config.playbook.join_batch();
        let total = workers.len();
        let results = self
            .run_concurrently(workers, |host| {
                run_host_batch(self.executor.clone(), self.state.clone(), host, batch.clone())
            })
            .await;

        let failed = self.settle(results).await?;
        self.finish(Phase::Join, failed, total).await;
        Ok(())
    }

    /// 阶段 5：控制平面安装 helm 与管理员绑定，失败不终止 rollout
    async fn post_install(&self) -> BootstrapResult<()> {
        self.enter(Phase::PostInstall).await?;
        let control_plane = self.config.control_plane().clone();

        let result = run_host_batch(
            self.executor.clone(),
            self.state.clone(),
            control_plane.clone(),
            self.config.playbook.post_install_batch(),
        )
        .await;
        let failed = self.settle(vec![(control_plane, result)]).await?;
        self.finish(Phase::PostInstall, failed, 1).await;
        Ok(())
    }

    /// 阶段 6：把 admin.conf 和 join 命令取回本地
    async fn retrieve(&self) -> BootstrapResult<()> {
        self.enter(Phase::Retrieve).await?;
        let control_plane = self.config.control_plane();
        let save_dir = &self.config.save_dir;

        if let Err(e) = tokio::fs::create_dir_all(save_dir).await {
            warn!(path = %save_dir.display(), error = %e, "Cannot create save directory");
            self.state
                .finish_phase(Phase::Retrieve, PhaseStatus::Failed, Some(e.to_string()))
                .await;
            return Ok(());
        }

        let transfers: Vec<FileTransfer> = self
            .config
            .playbook
            .retrieve_paths()
            .into_iter()
            .map(|remote| {
                let local = save_dir.join(remote_basename(&remote));
                FileTransfer::get(remote, local)
            })
            .collect();

        let results = match self.executor.transfer(control_plane, &transfers).await {
            Ok(results) => results,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!(host = %control_plane.address, error = %e, "Cannot retrieve artifacts");
                self.state
                    .finish_phase(Phase::Retrieve, PhaseStatus::Failed, Some(e.to_string()))
                    .await;
                return Ok(());
            }
        };

        let mut failed = 0;
        for result in results {
            if result.success {
                info!(path = %result.local.display(), "Saved");
                self.state.record_retrieved(result.local).await;
            } else {
                failed += 1;
                self.state
                    .record_failure(CommandFailure {
                        host: control_plane.address.clone(),
                        phase: Phase::Retrieve,
                        command: format!("fetch {}", result.remote),
                        exit_status: None,
                        stderr: result.error.unwrap_or_default(),
                    })
                    .await;
            }
        }

        if failed == 0 {
            self.state
                .mark_completed(&control_plane.address, Phase::Retrieve)
                .await;
        }
        let status = match failed {
            0 => PhaseStatus::Success,
            n if n == transfers.len() => PhaseStatus::Failed,
            _ => PhaseStatus::Partial,
        };
        let message = (failed > 0).then(|| format!("{} file(s) not retrieved", failed));
        self.state.finish_phase(Phase::Retrieve, status, message).await;
        Ok(())
    }
}

/// 上传 yum 源后执行依赖安装批次；返回该主机是否全部成功
async fn provision_host(
    executor: Arc<BatchExecutor>,
    state: Arc<RolloutState>,
    host: Host,
    upload: FileTransfer,
    batch: CommandBatch,
) -> BootstrapResult<bool> {
    let uploaded = executor.transfer(&host, std::slice::from_ref(&upload)).await?;
    state.mark_connected(&host.address).await;

    let mut upload_ok = true;
    for result in uploaded.into_iter().filter(|r| !r.success) {
        upload_ok = false;
        state
            .record_failure(CommandFailure {
                host: host.address.clone(),
                phase: Phase::Provision,
                command: format!("upload {}", result.remote),
                exit_status: None,
                stderr: result.error.unwrap_or_default(),
            })
            .await;
    }

    let report = executor.run_batch(&host, &batch).await?;
    state.record_batch(&report).await;

    let ok = upload_ok && report.all_succeeded();
    if ok {
        state.mark_completed(&host.address, Phase::Provision).await;
    }
    Ok(ok)
}

/// 执行批次并记录结果；返回批次是否全部成功
async fn run_host_batch(
    executor: Arc<BatchExecutor>,
    state: Arc<RolloutState>,
    host: Host,
    batch: CommandBatch,
) -> BootstrapResult<bool> {
    let report = executor.run_batch(&host, &batch).await?;
    state.mark_connected(&host.address).await;
    state.record_batch(&report).await;

    let ok = report.all_succeeded();
    if ok {
        state.mark_completed(&host.address, batch.phase).await;
    }
    Ok(ok)
}

/// 控制平面上的连接失败是致命的
fn escalate(control_plane: &Host, err: BootstrapError) -> BootstrapError {
    if err.is_fatal() {
        err
    } else {
        BootstrapError::control_plane(&control_plane.address, err.to_string())
    }
}

fn remote_basename(remote: &str) -> &str {
    Path::new(remote)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(remote)
}

/// 把汇总写成 JSON，返回文件路径
pub async fn write_summary(summary: &RolloutSummary, dir: &Path) -> BootstrapResult<PathBuf> {
    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(SUMMARY_FILE_NAME);
    let json = serde_json::to_vec_pretty(summary).map_err(std::io::Error::from)?;
    tokio::fs::write(&path, json).await?;
    info!(path = %path.display(), "Summary written");
    Ok(path)
}
