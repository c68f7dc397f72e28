//! 常量

/// 每台主机的默认连接尝试次数
pub const DEFAULT_CONNECT_ATTEMPTS: u32 = 5;

/// 连接失败后的固定等待时间（秒）
pub const DEFAULT_RETRY_INTERVAL_SECS: u64 = 5;

/// 默认 SSH 端口
pub const DEFAULT_SSH_PORT: u16 = 22;

/// 默认 Pod 网段（flannel 默认值）
pub const DEFAULT_POD_NETWORK_CIDR: &str = "10.244.0.0/16";

/// 本地 yum 源文件名
pub const REPO_FILE_NAME: &str = "kubernetes.repo";

/// yum 源在节点上的路径
pub const REPO_REMOTE_PATH: &str = "/etc/yum.repos.d/kubernetes.repo";

/// kubeadm init 输出副本
pub const KUBEINIT_LOG_PATH: &str = "/tmp/kubeinit-temp";

/// join 命令在控制平面和 worker 上的固定路径
pub const JOIN_COMMAND_PATH: &str = "/tmp/join-command";

/// 集群管理员 kubeconfig
pub const ADMIN_CONF_PATH: &str = "/etc/kubernetes/admin.conf";

/// kubeadm init 输出中 join 命令的标记
pub const JOIN_MARKER: &str = "kubeadm join";

/// 网络插件清单
pub const NETWORK_MANIFEST_URL: &str =
    "https://raw.githubusercontent.com/coreos/flannel/v0.9.1/Documentation/kube-flannel.yml";

/// helm 安装脚本
pub const HELM_INSTALLER_URL: &str =
    "https://raw.githubusercontent.com/kubernetes/helm/master/scripts/get";

/// 汇总 JSON 文件名
pub const SUMMARY_FILE_NAME: &str = "rollout-summary.json";

/// 版本号
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
