//! Connection parameters and kubeconfig loading.

use crate::error::ConnectError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};

/// Default client-side request rate per session.
pub const DEFAULT_QPS: f64 = 500.0;
/// Default burst on top of [`DEFAULT_QPS`].
pub const DEFAULT_BURST: u32 = 1000;
/// Idle connections kept per target host.
pub const DEFAULT_MAX_IDLE_PER_HOST: usize = 10;
/// Requests in flight per session.
pub const DEFAULT_MAX_CONNS_PER_HOST: usize = 10;

const SERVICE_ACCOUNT_TOKEN: &str = "/var/run/secrets/kubernetes.io/serviceaccount/token";

/// Everything a connector needs to build a session.
#[derive(Debug, Clone)]
pub struct ConnectParams {
    /// Path to a kubeconfig file. `None` (or an empty path) selects the
    /// in-cluster service account, then `~/.kube/config`.
    pub kubeconfig: Option<PathBuf>,
    /// Context to use instead of `current-context`.
    pub context: Option<String>,
    /// Client-side request rate; `0` disables limiting.
    pub qps: f64,
    pub burst: u32,
    pub max_idle_per_host: usize,
    /// Upper bound on concurrent requests, and so on open connections, to
    /// the API server. `0` is treated as `1`.
    pub max_conns_per_host: usize,
}

impl Default for ConnectParams {
    fn default() -> Self {
        Self {
            kubeconfig: None,
            context: None,
            qps: DEFAULT_QPS,
            burst: DEFAULT_BURST,
            max_idle_per_host: DEFAULT_MAX_IDLE_PER_HOST,
            max_conns_per_host: DEFAULT_MAX_CONNS_PER_HOST,
        }
    }
}

impl ConnectParams {
    pub fn with_kubeconfig(mut self, path: impl Into<PathBuf>) -> Self {
        self.kubeconfig = Some(path.into());
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_rate_limit(mut self, qps: f64, burst: u32) -> Self {
        self.qps = qps;
        self.burst = burst;
        self
    }

    pub fn with_max_conns_per_host(mut self, max_conns_per_host: usize) -> Self {
        self.max_conns_per_host = max_conns_per_host;
        self
    }
}

/// The subset of the kubeconfig format the simulator understands.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Kubeconfig {
    #[serde(default)]
    pub clusters: Vec<NamedCluster>,
    #[serde(default)]
    pub users: Vec<NamedAuthInfo>,
    #[serde(default)]
    pub contexts: Vec<NamedContext>,
    #[serde(default)]
    pub current_context: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NamedCluster {
    pub name: String,
    pub cluster: Cluster,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Cluster {
    pub server: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NamedAuthInfo {
    pub name: String,
    #[serde(default)]
    pub user: AuthInfo,
}

#[derive(Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AuthInfo {
    pub token: Option<String>,
    #[serde(rename = "tokenFile")]
    pub token_file: Option<PathBuf>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub client_certificate: Option<PathBuf>,
    pub client_certificate_data: Option<String>,
    pub client_key: Option<PathBuf>,
    pub client_key_data: Option<String>,
}

impl fmt::Debug for AuthInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthInfo")
            .field("token", &self.token.as_ref().map(|_| "***"))
            .field("token_file", &self.token_file)
            .field("username", &self.username)
            .field("client_certificate", &self.client_certificate)
            .field("client_key", &self.client_key)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NamedContext {
    pub name: String,
    pub context: Context,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Context {
    pub cluster: String,
    #[serde(default)]
    pub user: Option<String>,
}

impl Kubeconfig {
    pub fn read_from(path: &Path) -> Result<Self, ConnectError> {
        let content = read_file(path)?;
        Self::from_yaml(&String::from_utf8_lossy(&content))
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConnectError> {
        Ok(serde_yaml::from_str(content)?)
    }
}

/// How requests are authenticated.
#[derive(Clone, PartialEq, Eq)]
pub enum Auth {
    None,
    Bearer(String),
    Basic { username: String, password: String },
    /// PEM-encoded client certificate followed by its private key.
    ClientCertificate { identity_pem: Vec<u8> },
}

impl fmt::Debug for Auth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Auth::None => write!(f, "None"),
            Auth::Bearer(_) => write!(f, "Bearer(***)"),
            Auth::Basic { username, .. } => write!(f, "Basic({username}:***)"),
            Auth::ClientCertificate { .. } => write!(f, "ClientCertificate(***)"),
        }
    }
}

/// Resolved endpoint and credentials of one cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterConfig {
    pub server: String,
    pub auth: Auth,
}

impl ClusterConfig {
    /// Resolve connection parameters the way `kubectl` does: an explicit
    /// kubeconfig wins, then the in-cluster service account, then
    /// `~/.kube/config`.
    pub fn load(params: &ConnectParams) -> Result<Self, ConnectError> {
        if let Some(path) = params
            .kubeconfig
            .as_ref()
            .filter(|path| !path.as_os_str().is_empty())
        {
            return Self::from_kubeconfig(path, params.context.as_deref());
        }

        if std::env::var_os("KUBERNETES_SERVICE_HOST").is_some() {
            return Self::in_cluster();
        }

        let home = std::env::var_os("HOME").ok_or_else(|| {
            ConnectError::Config(
                "no kubeconfig given, not running in a cluster, and HOME is unset".to_string(),
            )
        })?;
        let path = PathBuf::from(home).join(".kube").join("config");
        tracing::debug!("No kubeconfig given, falling back to {:?}", path);
        Self::from_kubeconfig(&path, params.context.as_deref())
    }

    pub fn from_kubeconfig(path: &Path, context: Option<&str>) -> Result<Self, ConnectError> {
        let config = Kubeconfig::read_from(path)?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        Self::from_parsed(&config, context, base_dir)
    }

    /// Resolve `context` (or `current-context`) of an already parsed
    /// kubeconfig. Relative file paths are resolved against `base_dir`.
    pub fn from_parsed(
        config: &Kubeconfig,
        context: Option<&str>,
        base_dir: &Path,
    ) -> Result<Self, ConnectError> {
        let context_name = context
            .or(config.current_context.as_deref())
            .filter(|name| !name.is_empty())
            .ok_or_else(|| {
                ConnectError::Config("no context given and current-context is unset".to_string())
            })?;

        let context = config
            .contexts
            .iter()
            .find(|c| c.name == context_name)
            .map(|c| &c.context)
            .ok_or_else(|| {
                ConnectError::Config(format!("context '{context_name}' not found in kubeconfig"))
            })?;

        let cluster = config
            .clusters
            .iter()
            .find(|c| c.name == context.cluster)
            .map(|c| &c.cluster)
            .ok_or_else(|| {
                ConnectError::Config(format!(
                    "cluster '{}' of context '{context_name}' not found in kubeconfig",
                    context.cluster
                ))
            })?;

        let auth = match context.user.as_deref().filter(|u| !u.is_empty()) {
            Some(user_name) => {
                let user = config
                    .users
                    .iter()
                    .find(|u| u.name == user_name)
                    .map(|u| &u.user)
                    .ok_or_else(|| {
                        ConnectError::Config(format!(
                            "user '{user_name}' of context '{context_name}' not found in kubeconfig"
                        ))
                    })?;
                resolve_auth(user, base_dir)?
            }
            None => Auth::None,
        };

        if cluster.server.is_empty() {
            return Err(ConnectError::Config(format!(
                "cluster '{}' has no server",
                context.cluster
            )));
        }

        Ok(Self {
            server: cluster.server.trim_end_matches('/').to_string(),
            auth,
        })
    }

    /// Service-account configuration of a pod running inside the cluster.
    pub fn in_cluster() -> Result<Self, ConnectError> {
        let host = std::env::var("KUBERNETES_SERVICE_HOST")
            .map_err(|_| ConnectError::Config("KUBERNETES_SERVICE_HOST is unset".to_string()))?;
        let port = std::env::var("KUBERNETES_SERVICE_PORT").unwrap_or_else(|_| "443".to_string());
        let token = read_file(Path::new(SERVICE_ACCOUNT_TOKEN))?;

        Ok(Self {
            server: in_cluster_server(&host, &port),
            auth: Auth::Bearer(String::from_utf8_lossy(&token).trim().to_string()),
        })
    }
}

fn in_cluster_server(host: &str, port: &str) -> String {
    if host.contains(':') {
        format!("https://[{host}]:{port}")
    } else {
        format!("https://{host}:{port}")
    }
}

fn resolve_auth(user: &AuthInfo, base_dir: &Path) -> Result<Auth, ConnectError> {
    if let Some(token) = user.token.as_ref().filter(|t| !t.is_empty()) {
        return Ok(Auth::Bearer(token.clone()));
    }
    if let Some(path) = &user.token_file {
        let token = read_file(&base_dir.join(path))?;
        return Ok(Auth::Bearer(String::from_utf8_lossy(&token).trim().to_string()));
    }

    let certificate = inline_or_file(
        "client-certificate-data",
        user.client_certificate_data.as_deref(),
        user.client_certificate.as_deref(),
        base_dir,
    )?;
    let key = inline_or_file(
        "client-key-data",
        user.client_key_data.as_deref(),
        user.client_key.as_deref(),
        base_dir,
    )?;
    match (certificate, key) {
        (Some(mut identity_pem), Some(key)) => {
            if !identity_pem.ends_with(b"\n") {
                identity_pem.push(b'\n');
            }
            identity_pem.extend_from_slice(&key);
            return Ok(Auth::ClientCertificate { identity_pem });
        }
        (Some(_), None) | (None, Some(_)) => {
            return Err(ConnectError::Config(
                "client certificate and client key must be given together".to_string(),
            ));
        }
        (None, None) => {}
    }

    if let Some(username) = &user.username {
        return Ok(Auth::Basic {
            username: username.clone(),
            password: user.password.clone().unwrap_or_default(),
        });
    }

    Ok(Auth::None)
}

fn inline_or_file(
    field: &str,
    data: Option<&str>,
    path: Option<&Path>,
    base_dir: &Path,
) -> Result<Option<Vec<u8>>, ConnectError> {
    if let Some(data) = data.filter(|d| !d.is_empty()) {
        let decoded = STANDARD
            .decode(data.trim())
            .map_err(|source| ConnectError::Base64 {
                field: field.to_string(),
                source,
            })?;
        return Ok(Some(decoded));
    }
    path.map(|path| read_file(&base_dir.join(path))).transpose()
}

fn read_file(path: &Path) -> Result<Vec<u8>, ConnectError> {
    std::fs::read(path).map_err(|source| ConnectError::Io {
        path: path.to_path_buf(),
        source,
    })
}
