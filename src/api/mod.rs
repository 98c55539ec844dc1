mod base;
mod membership;

use std::borrow::Cow;
use std::future::Future;
use std::net::SocketAddr;

use axum::{
    error_handling::HandleErrorLayer, http::StatusCode, response::IntoResponse, routing, Router,
};
use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::time::Duration;
use tower::{BoxError, ServiceBuilder};
use tower_http::trace::TraceLayer;

pub mod paths;

pub use membership::StatusResponse;

use crate::error::Result;
use crate::node::MembershipView;
use crate::transport_error;

/// Read-only handle on a running node, shared by all handlers
#[derive(Clone, Debug)]
pub struct ApiState {
    view: watch::Receiver<MembershipView>,
    started_at: DateTime<Utc>,
}

impl ApiState {
    pub fn new(view: watch::Receiver<MembershipView>) -> Self {
        Self {
            view,
            started_at: Utc::now(),
        }
    }

    /// Latest view published by the tick driver
    pub fn current(&self) -> MembershipView {
        self.view.borrow().clone()
    }
}

/// Build the status API over the views published by a node
pub fn api(view: watch::Receiver<MembershipView>) -> Router {
    Router::new()
        .route(paths::base::ROOT, routing::get(base::root))
        .route(paths::base::HEALTH, routing::get(base::health))
        .route(paths::base::ABOUT, routing::get(base::about))
        .route(paths::MEMBERSHIP, routing::get(membership::membership))
        .route(paths::STATUS, routing::get(membership::status))
        .layer(
            ServiceBuilder::new()
                // Handle errors from middleware
                .layer(HandleErrorLayer::new(handle_error))
                .load_shed()
                .timeout(Duration::from_secs(10)),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(ApiState::new(view))
}

/// Bind the status API on `address`.
///
/// Fails right away if the address is unavailable; the returned future serves
/// requests until `shutdown` changes.
pub fn serve(
    address: SocketAddr,
    view: watch::Receiver<MembershipView>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<impl Future<Output = Result<()>> + Send> {
    let server = axum::Server::try_bind(&address)
        .map_err(|e| transport_error!("Status API bind failed on {}: {}", address, e))?
        .serve(api(view).into_make_service())
        .with_graceful_shutdown(async move {
            let _ = shutdown.changed().await;
        });
    Ok(async move {
        server
            .await
            .map_err(|e| transport_error!("Status API failed: {}", e))
    })
}

async fn handle_error(error: BoxError) -> impl IntoResponse {
    if error.is::<tower::timeout::error::Elapsed>() {
        return (StatusCode::REQUEST_TIMEOUT, Cow::from("request timed out"));
    }

    if error.is::<tower::load_shed::error::Overloaded>() {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Cow::from("service is overloaded, try again later"),
        );
    }

    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Cow::from(format!("Unhandled internal error: {}", error)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    use crate::node::{NodeIdentity, NodeState};

    fn view(state: NodeState) -> MembershipView {
        MembershipView {
            state,
            ..MembershipView::empty(NodeIdentity::new(0x7F00_0001, 7946))
        }
    }

    async fn get(router: Router, uri: &str) -> StatusCode {
        router
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
            .status()
    }

    #[tokio::test]
    async fn test_routes_respond() {
        let (_tx, rx) = watch::channel(view(NodeState::InGroup));
        for uri in [
            paths::base::ROOT,
            paths::base::HEALTH,
            paths::base::ABOUT,
            paths::MEMBERSHIP,
            paths::STATUS,
        ] {
            assert_eq!(get(api(rx.clone()), uri).await, StatusCode::OK, "{}", uri);
        }
        assert_eq!(get(api(rx), "/nope").await, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_health_unavailable_outside_group() {
        let (tx, rx) = watch::channel(view(NodeState::Joining));
        assert_eq!(
            get(api(rx.clone()), paths::base::HEALTH).await,
            StatusCode::SERVICE_UNAVAILABLE
        );

        tx.send_replace(view(NodeState::InGroup));
        assert_eq!(get(api(rx), paths::base::HEALTH).await, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_serve_rejects_address_in_use() {
        let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let address = taken.local_addr().unwrap();
        let (_tx, rx) = watch::channel(view(NodeState::InGroup));
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);

        let result = serve(address, rx, shutdown_rx);
        assert!(matches!(
            result,
            Err(crate::error::StarlingError::Transport(_))
        ));
    }

    #[tokio::test]
    async fn test_serve_stops_on_shutdown() {
        let (_tx, rx) = watch::channel(view(NodeState::InGroup));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let server = serve("127.0.0.1:0".parse().unwrap(), rx, shutdown_rx).unwrap();
        let handle = tokio::spawn(server);

        shutdown_tx.send(true).unwrap();
        let result = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("server should stop after shutdown");
        assert!(result.unwrap().is_ok());
    }
}
