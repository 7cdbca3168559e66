//! HTTPS session against a real API server.

use crate::discovery::{ApiResource, ApiResourceList};
use crate::error::{ApiError, ConnectError};
use crate::kubeconfig::{Auth, ClusterConfig, ConnectParams};
use crate::object::{DynamicObject, ObjectKey, TypeMeta};
use crate::patch::merge_patch;
use crate::rate_limit::RateLimiter;
use crate::session::{ApiSession, Connector};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::{RwLock, Semaphore};

const MERGE_PATCH: &str = "application/merge-patch+json";

/// Builds [`HttpSession`]s from connection parameters.
#[derive(Debug, Clone)]
pub struct HttpConnector {
    params: ConnectParams,
}

impl HttpConnector {
    pub fn new(params: ConnectParams) -> Self {
        Self { params }
    }
}

#[async_trait::async_trait]
impl Connector for HttpConnector {
    type Session = HttpSession;

    async fn connect(&self) -> Result<HttpSession, ConnectError> {
        let cluster = ClusterConfig::load(&self.params)?;
        let session = HttpSession::new(cluster, &self.params)?;
        session.ping().await?;
        Ok(session)
    }
}

/// A session with its own connection pool, rate limiter and discovery cache.
///
/// At most `max_conns_per_host` requests are in flight at once. A request
/// holds its slot until the response body is read, so the pool never opens
/// more connections than that.
///
/// Certificate verification is disabled: the simulator targets short-lived
/// test clusters with self-signed serving certificates. Do not point it at a
/// cluster whose traffic needs protecting.
pub struct HttpSession {
    client: Client,
    server: String,
    auth: Auth,
    limiter: RateLimiter,
    connections: Semaphore,
    resources: RwLock<HashMap<TypeMeta, ApiResource>>,
}

impl HttpSession {
    pub fn new(cluster: ClusterConfig, params: &ConnectParams) -> Result<Self, ConnectError> {
        let mut builder = Client::builder()
            .danger_accept_invalid_certs(true)
            .pool_max_idle_per_host(params.max_idle_per_host)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")));

        if let Auth::ClientCertificate { identity_pem } = &cluster.auth {
            let identity =
                reqwest::Identity::from_pem(identity_pem).map_err(ConnectError::Client)?;
            builder = builder.identity(identity);
        }

        let client = builder.build().map_err(ConnectError::Client)?;

        Ok(Self {
            client,
            server: cluster.server,
            auth: cluster.auth,
            limiter: RateLimiter::new(params.qps, params.burst),
            connections: Semaphore::new(params.max_conns_per_host.max(1)),
            resources: RwLock::new(HashMap::new()),
        })
    }

    pub fn server(&self) -> &str {
        &self.server
    }

    /// Cheap request proving the server is reachable and accepts our
    /// credentials.
    pub async fn ping(&self) -> Result<(), ApiError> {
        self.send(self.client.get(self.url("/version")), "/version")
            .await
            .map(|_| ())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.server, path)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.auth {
            Auth::Bearer(token) => request.bearer_auth(token),
            Auth::Basic { username, password } => request.basic_auth(username, Some(password)),
            Auth::None | Auth::ClientCertificate { .. } => request,
        }
    }

    async fn send(&self, request: RequestBuilder, target: &str) -> Result<Value, ApiError> {
        self.limiter.acquire().await;
        let _connection = self
            .connections
            .acquire()
            .await
            .map_err(|_| ApiError::Closed)?;

        let response = self.authorize(request).send().await?;
        let status = response.status();
        let body = response.bytes().await?;

        if status.is_success() {
            if body.is_empty() {
                return Ok(Value::Null);
            }
            return Ok(serde_json::from_slice(&body)?);
        }

        Err(status_error(status.as_u16(), &body, target))
    }

    /// Map a type to its REST resource, consulting discovery once per type.
    pub async fn resource(&self, type_meta: &TypeMeta) -> Result<ApiResource, ApiError> {
        if let Some(resource) = self.resources.read().await.get(type_meta) {
            return Ok(resource.clone());
        }

        let path = ApiResource::discovery_path(type_meta);
        let body = match self.send(self.client.get(self.url(&path)), &path).await {
            Ok(body) => body,
            // A missing group version must not look like a missing object.
            Err(ApiError::NotFound(_)) => {
                return Err(ApiError::Discovery(format!(
                    "{} is not served by {}",
                    type_meta.api_version, self.server
                )))
            }
            Err(e) => return Err(e),
        };
        let list: ApiResourceList = serde_json::from_value(body)?;
        let resource = list.find(type_meta).ok_or_else(|| {
            ApiError::Discovery(format!(
                "kind {} is not served by {}",
                type_meta.kind, type_meta.api_version
            ))
        })?;

        tracing::debug!(
            "Resolved {} to {}",
            type_meta,
            resource.collection_path(None)
        );
        self.resources
            .write()
            .await
            .insert(type_meta.clone(), resource.clone());
        Ok(resource)
    }

    async fn object_path(&self, obj: &DynamicObject) -> Result<(String, ObjectKey), ApiError> {
        let key = obj
            .key()
            .ok_or_else(|| ApiError::InvalidObject("object has no name".to_string()))?;
        let resource = self.resource(&obj.type_meta()?).await?;
        Ok((
            resource.object_path(key.namespace.as_deref(), &key.name),
            key,
        ))
    }
}

#[async_trait::async_trait]
impl ApiSession for HttpSession {
    async fn create(&self, obj: &DynamicObject) -> Result<DynamicObject, ApiError> {
        let type_meta = obj.type_meta()?;
        let resource = self.resource(&type_meta).await?;
        let path = resource.collection_path(obj.namespace());
        let target = describe(&type_meta, obj.key().as_ref());

        let body = self
            .send(self.client.post(self.url(&path)).json(obj), &target)
            .await?;
        DynamicObject::from_value(body)
    }

    async fn get(&self, type_meta: &TypeMeta, key: &ObjectKey) -> Result<DynamicObject, ApiError> {
        let resource = self.resource(type_meta).await?;
        let path = resource.object_path(key.namespace.as_deref(), &key.name);

        let body = self
            .send(
                self.client.get(self.url(&path)),
                &describe(type_meta, Some(key)),
            )
            .await?;
        DynamicObject::from_value(body)
    }

    async fn patch(
        &self,
        obj: &DynamicObject,
        baseline: &DynamicObject,
    ) -> Result<DynamicObject, ApiError> {
        let (path, key) = self.object_path(obj).await?;
        let patch = merge_patch(baseline.as_value(), obj.as_value());
        let request = self
            .client
            .patch(self.url(&path))
            .header(CONTENT_TYPE, MERGE_PATCH)
            .body(serde_json::to_vec(&patch)?);

        let body = self
            .send(request, &describe(&obj.type_meta()?, Some(&key)))
            .await?;
        DynamicObject::from_value(body)
    }

    async fn delete(&self, obj: &DynamicObject) -> Result<(), ApiError> {
        let (path, key) = self.object_path(obj).await?;
        self.send(
            self.client.delete(self.url(&path)),
            &describe(&obj.type_meta()?, Some(&key)),
        )
        .await
        .map(|_| ())
    }
}

fn describe(type_meta: &TypeMeta, key: Option<&ObjectKey>) -> String {
    match key {
        Some(key) => format!("{} {}", type_meta.kind, key),
        None => type_meta.kind.clone(),
    }
}

/// `Status` document returned with failed requests.
#[derive(Debug, Default, Deserialize)]
struct Status {
    #[serde(default)]
    reason: String,
    #[serde(default)]
    message: String,
}

/// Classify a failed response. `AlreadyExists` and `NotFound` get their own
/// variants; everything else keeps the server's code and message.
fn status_error(code: u16, body: &[u8], target: &str) -> ApiError {
    let status: Status = serde_json::from_slice(body).unwrap_or_default();
    match (status.reason.as_str(), code) {
        ("AlreadyExists", _) => ApiError::AlreadyExists(target.to_string()),
        ("NotFound", _) | ("", 404) => ApiError::NotFound(target.to_string()),
        (reason, code) => ApiError::Status {
            code,
            reason: if reason.is_empty() {
                "Unknown".to_string()
            } else {
                reason.to_string()
            },
            message: if status.message.is_empty() {
                String::from_utf8_lossy(body).trim().to_string()
            } else {
                status.message
            },
        },
    }
}
