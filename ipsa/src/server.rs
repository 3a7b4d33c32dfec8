//! HTTPS endpoint receiving AdmissionReviews from the API server
//!
//! Routes:
//! - `POST /mutate`: runs the admission policies
//! - `GET /healthz`: liveness probe

use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::PathBuf;

use kube::core::DynamicObject;
use kube::core::admission::{AdmissionRequest, AdmissionReview};
use tracing::{debug, error, info};
use warp::http::{Method, StatusCode};
use warp::hyper::body::Bytes;
use warp::reply::{self, Reply, Response};
use warp::{Filter, Rejection};

use crate::admission::{self, Policies};
use crate::error::{Error, Result};

/// Default address the webhook listens on
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8443";
/// Default directory holding the mounted TLS certificate
pub const DEFAULT_TLS_DIR: &str = "/run/secrets/tls";
/// File name of the TLS certificate inside the TLS directory
pub const TLS_CERT_FILE: &str = "tls.crt";
/// File name of the TLS private key inside the TLS directory
pub const TLS_KEY_FILE: &str = "tls.key";

/// Where and how the webhook is served
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen: SocketAddr,
    pub tls_dir: PathBuf,
}

impl ServerConfig {
    pub fn cert_path(&self) -> PathBuf {
        self.tls_dir.join(TLS_CERT_FILE)
    }

    pub fn key_path(&self) -> PathBuf {
        self.tls_dir.join(TLS_KEY_FILE)
    }
}

fn plain(status: StatusCode, message: impl Into<String>) -> Response {
    reply::with_status(message.into(), status).into_response()
}

fn is_json(content_type: Option<&str>) -> bool {
    content_type
        .and_then(|ct| ct.split(';').next())
        .is_some_and(|media| media.trim().eq_ignore_ascii_case("application/json"))
}

async fn handle_mutate(
    method: Method,
    content_type: Option<String>,
    body: Bytes,
    policies: Policies,
) -> Response {
    if method != Method::POST {
        return plain(
            StatusCode::METHOD_NOT_ALLOWED,
            format!("invalid method {method}, only POST requests are allowed"),
        );
    }

    if !is_json(content_type.as_deref()) {
        return plain(
            StatusCode::BAD_REQUEST,
            format!(
                "unsupported content type {}, only application/json is supported",
                content_type.as_deref().unwrap_or("<none>")
            ),
        );
    }

    let review: AdmissionReview<DynamicObject> = match serde_json::from_slice(&body) {
        Ok(review) => review,
        Err(err) => {
            error!(error = %err, "could not deserialize request");
            return plain(
                StatusCode::BAD_REQUEST,
                format!("could not deserialize request: {err}"),
            );
        }
    };

    let req: AdmissionRequest<DynamicObject> = match review.try_into() {
        Ok(req) => req,
        Err(err) => {
            error!(error = %err, "invalid admission request");
            return plain(
                StatusCode::BAD_REQUEST,
                format!("malformed admission review: {err}"),
            );
        }
    };

    debug!(
        uid = %req.uid,
        operation = ?req.operation,
        namespace = ?req.namespace,
        name = %req.name,
        "processing admission request"
    );

    match admission::review(&policies, &req) {
        Ok(res) => reply::json(&res.into_review()).into_response(),
        // Not a denial: the API server applies the webhook's failure policy.
        Err(err) => plain(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
    }
}

async fn recover(rejection: Rejection) -> std::result::Result<Response, Infallible> {
    let res = if rejection.is_not_found() {
        plain(StatusCode::NOT_FOUND, "not found")
    } else if rejection.find::<warp::reject::MethodNotAllowed>().is_some() {
        plain(StatusCode::METHOD_NOT_ALLOWED, "invalid method")
    } else if rejection.find::<warp::reject::InvalidHeader>().is_some() {
        plain(StatusCode::BAD_REQUEST, "unsupported content type")
    } else {
        plain(
            StatusCode::BAD_REQUEST,
            format!("could not read request body: {rejection:?}"),
        )
    };

    Ok(res)
}

/// All webhook routes
pub fn routes(policies: Policies) -> impl Filter<Extract = (Response,), Error = Infallible> + Clone {
    let with_policies = warp::any().map(move || policies.clone());

    let mutate = warp::path("mutate")
        .and(warp::path::end())
        .and(warp::method())
        .and(warp::header::optional::<String>("content-type"))
        .and(warp::body::bytes())
        .and(with_policies)
        .then(handle_mutate);

    let healthz = warp::path("healthz")
        .and(warp::path::end())
        .and(warp::get())
        .map(|| reply::json(&serde_json::json!({ "alive": true })).into_response());

    mutate
        .or(healthz)
        .unify()
        .recover(recover)
        .unify()
}

/// Serves the webhook over TLS until SIGINT or SIGTERM is received
pub async fn run(config: ServerConfig, policies: Policies) -> Result<()> {
    for path in [config.cert_path(), config.key_path()] {
        if !path.is_file() {
            return Err(Error::Server(format!(
                "TLS file {} does not exist",
                path.display()
            )));
        }
    }

    let (addr, server) = warp::serve(routes(policies))
        .tls()
        .cert_path(config.cert_path())
        .key_path(config.key_path())
        .bind_with_graceful_shutdown(config.listen, shutdown_signal());

    info!(%addr, "webhook listening");
    server.await;
    info!("webhook stopped");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }

    info!("shutdown signal received");
}
