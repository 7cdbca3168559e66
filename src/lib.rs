//! kube-load-simulator library
//!
//! Generates concurrent create/update/delete load against a Kubernetes API
//! server. Each runner owns one namespace and one object derived from a
//! shared template, patches a counter label on a fixed interval, re-issues
//! the create on every tick and cleans up after itself when the run ends.
//!
//! # CLI Usage
//!
//! ```bash
//! # 50 runners for five minutes, ticking every 10ms
//! kube-load-simulator --concurrent 50 --duration 5m --interval 10 \
//!   --template ./testdata/manifestwork-template.yaml
//!
//! # Hammer an access-review endpoint without patching
//! kube-load-simulator --template ./testdata/selfsubjectaccessreview-template.yaml \
//!   --update=false
//!
//! # Remove what an interrupted run left behind
//! kube-load-simulator --concurrent 50 --clean
//!
//! # Try it without a cluster
//! kube-load-simulator --dry-run --duration 5s
//! ```
//!
//! The runner pool lives in `loadtest_runner`; sessions against the API
//! server are provided by `loadtest_kube_client`.

use clap::Args;
use loadtest_kube_client::ConnectParams;
use std::path::PathBuf;

pub mod config;
pub mod diagnostics;

pub use loadtest_kube_client as kube_client;
pub use loadtest_runner as runner;

/// Connection options for the target API server.
#[derive(Args, Clone, Debug)]
pub struct ClusterOpts {
    /// Path to a kubeconfig file. Without it the in-cluster service account
    /// is used when available, then ~/.kube/config.
    #[arg(long, env = "KUBECONFIG")]
    pub kubeconfig: Option<PathBuf>,

    /// Kubeconfig context to use instead of current-context
    #[arg(long)]
    pub context: Option<String>,

    /// Client-side requests per second, per runner session
    #[arg(long, default_value_t = loadtest_kube_client::DEFAULT_QPS)]
    pub qps: f64,

    /// Client-side burst, per runner session
    #[arg(long, default_value_t = loadtest_kube_client::DEFAULT_BURST)]
    pub burst: u32,
}

impl From<&ClusterOpts> for ConnectParams {
    fn from(opts: &ClusterOpts) -> Self {
        let mut params = ConnectParams::default().with_rate_limit(opts.qps, opts.burst);
        if let Some(path) = &opts.kubeconfig {
            params = params.with_kubeconfig(path);
        }
        if let Some(context) = &opts.context {
            params = params.with_context(context);
        }
        params
    }
}
