//! 各阶段的命令清单
//!
//! 只是数据：命令本身都可重复执行，重跑整个工具是预期的恢复方式。

use crate::config::constants::{
    ADMIN_CONF_PATH, DEFAULT_POD_NETWORK_CIDR, HELM_INSTALLER_URL, JOIN_COMMAND_PATH, JOIN_MARKER,
    KUBEINIT_LOG_PATH, NETWORK_MANIFEST_URL, REPO_REMOTE_PATH,
};
use crate::domain::artifact::sh_quote;
use crate::domain::{CommandBatch, Host, Phase, RemoteCommand};

/// 控制平面批次中 `kubeadm init` 的位置
pub const INIT_COMMAND_INDEX: usize = 0;

#[derive(Clone, Debug)]
pub struct Playbook {
    pub repo_remote_path: String,
    pub pod_network_cidr: String,
    pub network_manifest_url: String,
    pub helm_installer_url: String,
    pub kubeinit_log_path: String,
    pub join_command_path: String,
    pub admin_conf_path: String,
    pub join_marker: String,
}

impl Default for Playbook {
    fn default() -> Self {
        Self {
            repo_remote_path: REPO_REMOTE_PATH.to_string(),
            pod_network_cidr: DEFAULT_POD_NETWORK_CIDR.to_string(),
            network_manifest_url: NETWORK_MANIFEST_URL.to_string(),
            helm_installer_url: HELM_INSTALLER_URL.to_string(),
            kubeinit_log_path: KUBEINIT_LOG_PATH.to_string(),
            join_command_path: JOIN_COMMAND_PATH.to_string(),
            admin_conf_path: ADMIN_CONF_PATH.to_string(),
            join_marker: JOIN_MARKER.to_string(),
        }
    }
}

impl Playbook {
    /// 所有节点共用的前置安装
    pub fn provision_batch(&self) -> CommandBatch {
        CommandBatch::new(
            Phase::Provision,
            [
                "yum install -y docker",
                "systemctl enable docker && systemctl start docker",
                "setenforce 0",
                "yum install -y kubelet kubeadm kubectl",
                "systemctl enable kubelet && systemctl start kubelet",
                "swapoff -a",
            ],
        )
    }

    /// 控制平面初始化，第一条是 `kubeadm init`
    pub fn control_plane_batch(&self) -> CommandBatch {
        CommandBatch::new(
            Phase::Initialize,
            [
                self.init_command(),
                RemoteCommand::new("if [ ! -d ~/.kube ]; then mkdir ~/.kube; fi"),
                RemoteCommand::new(format!(
                    "if [ ! -f ~/.kube/config ]; then cp {} ~/.kube/config; fi",
                    self.admin_conf_path
                )),
                RemoteCommand::new("sysctl net.bridge.bridge-nf-call-iptables=1"),
                RemoteCommand::new(format!("kubectl apply -f {}", self.network_manifest_url)),
            ],
        )
    }

    /// `kubeadm init`，输出里带 join token，只按 label 记录
    ///
    /// 不依赖远程登录 shell 是 bash，显式用 bash 打开 pipefail。
    fn init_command(&self) -> RemoteCommand {
        let pipeline = format!(
            "kubeadm init --pod-network-cidr={} | tee {}",
            self.pod_network_cidr, self.kubeinit_log_path
        );
        RemoteCommand::sensitive(
            format!("bash -o pipefail -c {}", sh_quote(&pipeline)),
            "kubeadm init",
        )
    }

    /// 在控制平面上执行，把 join 命令拷到 worker 的同一路径
    pub fn distribute_command(&self, target: &Host) -> RemoteCommand {
        RemoteCommand::new(format!(
            "scp -o BatchMode=yes -o StrictHostKeyChecking=no -P {} {} {}:{}",
            target.port, self.join_command_path, target.address, self.join_command_path
        ))
    }

    pub fn join_batch(&self) -> CommandBatch {
        CommandBatch::new(Phase::Join, [format!("bash {}", self.join_command_path)])
    }

    /// helm 与 admin 角色绑定，只在控制平面执行
    pub fn post_install_batch(&self) -> CommandBatch {
        CommandBatch::new(
            Phase::PostInstall,
            [
                "yum install -y wget".to_string(),
                format!(
                    "wget {} -O helm_installer && bash ./helm_installer",
                    self.helm_installer_url
                ),
                "kubectl create clusterrolebinding add-on-cluster-admin --clusterrole=cluster-admin --serviceaccount=kube-system:default".to_string(),
                "helm init && helm repo update".to_string(),
            ],
        )
    }

    /// 运行结束后从控制平面取回的文件
    pub fn retrieve_paths(&self) -> Vec<String> {
        vec![self.admin_conf_path.clone(), self.join_command_path.clone()]
    }
}
