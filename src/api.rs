//! HTTP API for the sidecar
//!
//! Thin JSON surface over the compiler, the deployment pipeline, and the
//! config store. Endpoints do no nginx work themselves; they parse,
//! delegate, and map domain errors onto status codes.

use crate::config::Settings;
use crate::deploy::Deployer;
use crate::error::Error;
use crate::nginx::NginxControl;
use crate::store::ConfigStore;
use crate::template;
use crate::vhost::VhostSpec;
use anyhow::{Context, Result};
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::header::CONTENT_TYPE;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as AutoBuilder;
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, error, info};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const PKG_NAME: &str = env!("CARGO_PKG_NAME");

/// API response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}

/// Sidecar API server
pub struct ApiServer {
    bind_addr: SocketAddr,
    store: ConfigStore,
    nginx: NginxControl,
    deployer: Deployer,
    shutdown_rx: watch::Receiver<bool>,
}

impl ApiServer {
    /// Create a new API server and make sure both working directories
    /// exist before anything is served.
    pub async fn new(settings: &Settings, shutdown_rx: watch::Receiver<bool>) -> Result<Self> {
        tokio::fs::create_dir_all(&settings.nginx.config_dir)
            .await
            .with_context(|| {
                format!(
                    "failed to create config dir {}",
                    settings.nginx.config_dir.display()
                )
            })?;
        tokio::fs::create_dir_all(&settings.nginx.scratch_dir)
            .await
            .with_context(|| {
                format!(
                    "failed to create scratch dir {}",
                    settings.nginx.scratch_dir.display()
                )
            })?;

        let bind_addr: SocketAddr = settings
            .server
            .listen_addr()
            .parse()
            .with_context(|| format!("invalid listen address {}", settings.server.listen_addr()))?;

        let store = ConfigStore::new(&settings.nginx.config_dir);
        let nginx = NginxControl::new(settings.nginx.binary.clone());
        let deployer = Deployer::new(store.clone(), &settings.nginx.scratch_dir, nginx.clone());

        Ok(Self {
            bind_addr,
            store,
            nginx,
            deployer,
            shutdown_rx,
        })
    }

    /// Run the API server
    pub async fn run(self: Arc<Self>) -> Result<()> {
        let listener = TcpListener::bind(self.bind_addr).await?;
        info!(addr = %self.bind_addr, "API server listening");

        let mut shutdown_rx = self.shutdown_rx.clone();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            let api = Arc::clone(&self);
                            tokio::spawn(async move {
                                if let Err(e) = api.serve_connection(stream, addr).await {
                                    debug!(addr = %addr, error = %e, "Connection error");
                                }
                            });
                        }
                        Err(e) => {
                            error!(error = %e, "Failed to accept connection");
                        }
                    }
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("API server shutting down");
                        break;
                    }
                }
            }
        }

        Ok(())
    }

    async fn serve_connection<S>(self: Arc<Self>, stream: S, _addr: SocketAddr) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let io = TokioIo::new(stream);
        let service = service_fn(move |req| {
            let api = Arc::clone(&self);
            async move { api.handle_request(req).await }
        });

        AutoBuilder::new(TokioExecutor::new())
            .serve_connection(io, service)
            .await
            .map_err(|e| anyhow::anyhow!("Connection error: {}", e))?;

        Ok(())
    }

    async fn handle_request(
        self: Arc<Self>,
        req: Request<hyper::body::Incoming>,
    ) -> Result<Response<Full<Bytes>>, hyper::Error> {
        let path = req.uri().path().to_string();
        let method = req.method().clone();
        let query = req.uri().query().map(str::to_string);

        debug!(%method, %path, "API request");

        if path == "/health" && method == Method::GET {
            return Ok(json_response(StatusCode::OK, r#"{"status":"ok"}"#));
        }

        if path == "/version" && method == Method::GET {
            let version = serde_json::json!({
                "name": PKG_NAME,
                "version": VERSION,
            });
            return Ok(json_response(StatusCode::OK, version.to_string()));
        }

        // Route the request
        let response = match (method, path.as_str()) {
            (Method::POST, "/configs") => self.create_config(req).await,
            (Method::GET, "/configs") => self.list_configs(query.as_deref()).await,
            (Method::GET, "/validate") => self.validate_all().await,
            (Method::POST, "/reload") => self.reload().await,
            (Method::GET, path) if path.starts_with("/check/") => {
                let name = path.strip_prefix("/check/").unwrap_or("");
                self.check_config(name).await
            }
            (Method::GET, path) if path.starts_with("/configs/") => {
                let name = path.strip_prefix("/configs/").unwrap_or("");
                self.get_config(name).await
            }
            (Method::DELETE, path) if path.starts_with("/configs/") => {
                let name = path.strip_prefix("/configs/").unwrap_or("");
                self.delete_config(name).await
            }
            _ => Ok(json_error(StatusCode::NOT_FOUND, "Not found")),
        };

        response.or_else(|e| {
            error!(error = %e, "API error");
            Ok(json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Internal error: {}", e),
            ))
        })
    }

    /// POST /configs: compile the submitted host description, validate
    /// the result, and promote it into the live directory.
    async fn create_config(
        self: Arc<Self>,
        req: Request<hyper::body::Incoming>,
    ) -> Result<Response<Full<Bytes>>> {
        let body = req.collect().await?.to_bytes();
        let spec: VhostSpec = match serde_json::from_slice(&body) {
            Ok(spec) => spec,
            Err(e) => {
                return Ok(json_error(
                    StatusCode::BAD_REQUEST,
                    format!("Invalid JSON: {}", e),
                ));
            }
        };

        if let Err(err) = spec.validate() {
            return Ok(error_response(&err));
        }

        let content = template::render(&spec);
        match self.deployer.deploy(&spec.name, &content).await {
            Ok(receipt) => {
                let response = ApiResponse::ok(receipt);
                Ok(json_response(
                    StatusCode::CREATED,
                    serde_json::to_string(&response)?,
                ))
            }
            Err(err) => Ok(error_response(&err)),
        }
    }

    /// GET /configs: deployed artifact names, or full entries with
    /// `?full=true`.
    async fn list_configs(&self, query: Option<&str>) -> Result<Response<Full<Bytes>>> {
        let verbose = wants_full(query);
        match self.store.list(verbose).await {
            Ok(entries) if verbose => {
                let response = ApiResponse::ok(entries);
                Ok(json_response(
                    StatusCode::OK,
                    serde_json::to_string(&response)?,
                ))
            }
            Ok(entries) => {
                let names: Vec<String> = entries.into_iter().map(|entry| entry.name).collect();
                let response = ApiResponse::ok(names);
                Ok(json_response(
                    StatusCode::OK,
                    serde_json::to_string(&response)?,
                ))
            }
            Err(err) => Ok(error_response(&err)),
        }
    }

    /// GET /configs/{name}: the deployed text itself, not JSON.
    async fn get_config(&self, name: &str) -> Result<Response<Full<Bytes>>> {
        match self.store.get(name).await {
            Ok(content) => Ok(text_response(StatusCode::OK, content)),
            Err(err) => Ok(error_response(&err)),
        }
    }

    /// DELETE /configs/{name}
    async fn delete_config(&self, name: &str) -> Result<Response<Full<Bytes>>> {
        match self.store.delete(name).await {
            Ok(()) => Ok(empty_response(StatusCode::NO_CONTENT)),
            Err(err) => Ok(error_response(&err)),
        }
    }

    /// GET /check/{name}: re-validate one deployed config.
    async fn check_config(&self, name: &str) -> Result<Response<Full<Bytes>>> {
        match self.deployer.check_existing(name).await {
            Ok(_) => {
                let response = ApiResponse::ok(serde_json::json!({ "valid": true }));
                Ok(json_response(
                    StatusCode::OK,
                    serde_json::to_string(&response)?,
                ))
            }
            Err(err) => Ok(error_response(&err)),
        }
    }

    /// POST /reload: signal the engine to pick up the live directory.
    async fn reload(&self) -> Result<Response<Full<Bytes>>> {
        match self.nginx.reload().await {
            Ok(output) => {
                let response = ApiResponse::ok(serde_json::json!({ "output": output }));
                Ok(json_response(
                    StatusCode::OK,
                    serde_json::to_string(&response)?,
                ))
            }
            Err(err) => Ok(error_response(&err)),
        }
    }

    /// GET /validate: check the engine's whole active configuration.
    async fn validate_all(&self) -> Result<Response<Full<Bytes>>> {
        match self.nginx.validate_global().await {
            Ok(output) => {
                let response =
                    ApiResponse::ok(serde_json::json!({ "valid": true, "output": output }));
                Ok(json_response(
                    StatusCode::OK,
                    serde_json::to_string(&response)?,
                ))
            }
            Err(err) => Ok(error_response(&err)),
        }
    }
}

// ==================== Helper Functions ====================

fn wants_full(query: Option<&str>) -> bool {
    query
        .map(|q| q.split('&').any(|pair| pair == "full=true"))
        .unwrap_or(false)
}

fn json_response(status: StatusCode, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "application/json")
        .body(Full::new(body.into()))
        .expect("valid response")
}

fn text_response(status: StatusCode, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "text/plain; charset=utf-8")
        .body(Full::new(body.into()))
        .expect("valid response")
}

fn empty_response(status: StatusCode) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .body(Full::new(Bytes::new()))
        .expect("valid response")
}

fn json_error(status: StatusCode, message: impl Into<String>) -> Response<Full<Bytes>> {
    let response: ApiResponse<()> = ApiResponse::error(message);
    json_response(status, serde_json::to_string(&response).unwrap())
}

fn error_response(err: &Error) -> Response<Full<Bytes>> {
    json_error(err.status_code(), err.to_string())
}
