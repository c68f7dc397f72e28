//! 命令行参数

use clap::Parser;
use std::path::PathBuf;

use crate::config::constants::{
    DEFAULT_CONNECT_ATTEMPTS, DEFAULT_POD_NETWORK_CIDR, DEFAULT_RETRY_INTERVAL_SECS,
    DEFAULT_SSH_PORT,
};

/// Bootstrap bare hosts into a Kubernetes cluster over SSH
#[derive(Parser, Debug, Clone)]
#[command(
    name = "xjp-kube-bootstrap",
    version,
    about = "Bootstrap bare hosts into a Kubernetes cluster over SSH",
    long_about = "Connects to every host over SSH, installs the container runtime and kubeadm,\n\
                  initializes the first host as control plane, joins the remaining hosts as\n\
                  workers and copies the admin kubeconfig and join command to a local directory.",
    after_help = "EXAMPLES:\n    \
        KUBE_BOOTSTRAP_PASSWORD=secret xjp-kube-bootstrap --ip 10.0.0.1 10.0.0.2 10.0.0.3\n    \
        xjp-kube-bootstrap --ip 10.0.0.1 10.0.0.2 --identity-file ~/.ssh/id_ed25519 --save-dir ./out\n    \
        xjp-kube-bootstrap --ip 10.0.0.1 --skip-post-install --max-concurrency 4"
)]
pub struct CliArgs {
    /// Host addresses, the first one becomes the control plane
    #[arg(long = "ip", value_name = "ADDR", num_args = 1.., required = true)]
    pub ips: Vec<String>,

    /// SSH username
    #[arg(long, default_value = "root", env = "KUBE_BOOTSTRAP_USERNAME")]
    pub username: String,

    /// SSH password
    #[arg(long, env = "KUBE_BOOTSTRAP_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Private key for public-key authentication (takes precedence over password)
    #[arg(long, value_name = "FILE", env = "KUBE_BOOTSTRAP_IDENTITY_FILE")]
    pub identity_file: Option<PathBuf>,

    /// Passphrase for the private key
    #[arg(long, env = "KUBE_BOOTSTRAP_KEY_PASSPHRASE", hide_env_values = true)]
    pub key_passphrase: Option<String>,

    /// SSH port used for every host
    #[arg(long, default_value_t = DEFAULT_SSH_PORT)]
    pub port: u16,

    /// Directory for retrieved files and the rollout summary (default: system temp dir)
    #[arg(long, value_name = "DIR")]
    pub save_dir: Option<PathBuf>,

    /// Connection attempts per host before giving up
    #[arg(long, default_value_t = DEFAULT_CONNECT_ATTEMPTS, value_name = "NUM")]
    pub connect_attempts: u32,

    /// Seconds to wait between connection attempts
    #[arg(long, default_value_t = DEFAULT_RETRY_INTERVAL_SECS, value_name = "SECS")]
    pub retry_interval_secs: u64,

    /// Hosts provisioned or joined in parallel (default: all hosts)
    #[arg(long, value_name = "NUM")]
    pub max_concurrency: Option<usize>,

    /// Give up on a host as soon as it rejects the credentials
    #[arg(long)]
    pub no_auth_retry: bool,

    /// Per-command timeout; unbounded when omitted
    #[arg(long, value_name = "SECS")]
    pub command_timeout_secs: Option<u64>,

    /// Package repository file pushed to every host (default: kubernetes.repo next to the binary)
    #[arg(long, value_name = "FILE", env = "KUBE_BOOTSTRAP_REPO_FILE")]
    pub repo_file: Option<PathBuf>,

    /// Pod network CIDR passed to kubeadm init
    #[arg(long, default_value = DEFAULT_POD_NETWORK_CIDR, value_name = "CIDR")]
    pub pod_network_cidr: String,

    /// Skip helm and the admin role binding on the control plane
    #[arg(long)]
    pub skip_post_install: bool,

    /// Verify host keys against ~/.ssh/known_hosts
    #[arg(long)]
    pub strict_host_keys: bool,

    /// Verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal() {
        let args = CliArgs::try_parse_from([
            "xjp-kube-bootstrap",
            "--ip",
            "10.0.0.1",
            "10.0.0.2",
            "--password",
            "pw",
        ])
        .unwrap();
        assert_eq!(args.ips, vec!["10.0.0.1", "10.0.0.2"]);
        assert_eq!(args.username, "root");
        assert_eq!(args.port, 22);
        assert_eq!(args.connect_attempts, 5);
        assert_eq!(args.retry_interval_secs, 5);
        assert!(args.command_timeout_secs.is_none());
        assert!(!args.skip_post_install);
        assert!(!args.no_auth_retry);
    }

    #[test]
    fn test_ip_is_required() {
        assert!(CliArgs::try_parse_from(["xjp-kube-bootstrap", "--password", "pw"]).is_err());
    }
}
