//! 命令批次执行器
//!
//! 每个批次一个会话，命令严格按顺序执行。单条命令失败不会中断批次，
//! 只有连接失败（一条命令都跑不了）才作为错误返回。

use std::time::Instant;

use tracing::{debug, info, warn};

use super::session::{Session, SessionManager};
use crate::domain::{
    BatchReport, CommandBatch, ExecutionResult, FileTransfer, Host, RemoteCommand,
    TransferDirection, TransferResult,
};
use crate::error::BootstrapResult;

/// 命令批次执行器
pub struct BatchExecutor {
    sessions: SessionManager,
}

impl BatchExecutor {
    pub fn new(sessions: SessionManager) -> Self {
        Self { sessions }
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    /// 在一台主机上执行整个批次，结果数量和顺序与命令一致
    pub async fn run_batch(&self, host: &Host, batch: &CommandBatch) -> BootstrapResult<BatchReport> {
        let mut session = self.sessions.open(host).await?;

        let mut results = Vec::with_capacity(batch.len());
        for command in &batch.commands {
            results.push(execute(&mut session, command).await);
        }

        session.close().await;

        let report = BatchReport {
            host: host.address.clone(),
            phase: batch.phase,
            results,
        };
        info!(
            host = %host.address,
            phase = %batch.phase,
            commands = report.results.len(),
            failed = report.failure_count(),
            "Batch finished"
        );
        Ok(report)
    }

    /// 在一个会话里顺序完成文件传输，单个失败不影响其余传输
    pub async fn transfer(
        &self,
        host: &Host,
        transfers: &[FileTransfer],
    ) -> BootstrapResult<Vec<TransferResult>> {
        let mut session = self.sessions.open(host).await?;

        let mut results = Vec::with_capacity(transfers.len());
        for transfer in transfers {
            results.push(transfer_one(&mut session, transfer).await);
        }

        session.close().await;
        Ok(results)
    }
}

/// 执行单条命令并记录结果
pub(crate) async fn execute(session: &mut Session, command: &RemoteCommand) -> ExecutionResult {
    info!(host = %session.host(), command = %command.display(), "Executing command");
    let started = Instant::now();

    match session.run(command).await {
        Ok(output) => {
            let elapsed = started.elapsed().as_millis() as u64;
            let result = ExecutionResult::from_output(command, output, elapsed);
            if result.success {
                if !command.is_sensitive() && !result.stdout.is_empty() {
                    debug!(host = %session.host(), stdout = %result.stdout, "Command output");
                }
            } else {
                warn!(
                    host = %session.host(),
                    command = %command.display(),
                    exit_status = ?result.exit_status,
                    stderr = %result.stderr,
                    "Error running command"
                );
            }
            result
        }
        Err(e) => {
            warn!(host = %session.host(), command = %command.display(), error = %e, "Command did not complete");
            ExecutionResult::transport_failure(command, e, started.elapsed().as_millis() as u64)
        }
    }
}

async fn transfer_one(session: &mut Session, transfer: &FileTransfer) -> TransferResult {
    let outcome = match transfer.direction {
        TransferDirection::Put => session.put_file(&transfer.local, &transfer.remote).await,
        TransferDirection::Get => session.get_file(&transfer.local, &transfer.remote).await,
    };

    match outcome {
        Ok(()) => {
            info!(
                host = %session.host(),
                direction = ?transfer.direction,
                local = %transfer.local.display(),
                remote = %transfer.remote,
                "File transferred"
            );
            TransferResult {
                direction: transfer.direction,
                local: transfer.local.clone(),
                remote: transfer.remote.clone(),
                success: true,
                error: None,
            }
        }
        Err(e) => {
            warn!(
                host = %session.host(),
                direction = ?transfer.direction,
                remote = %transfer.remote,
                error = %e,
                "File transfer failed"
            );
            TransferResult {
                direction: transfer.direction,
                local: transfer.local.clone(),
                remote: transfer.remote.clone(),
                success: false,
                error: Some(e.to_string()),
            }
        }
    }
}
