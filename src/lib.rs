pub mod api;
pub mod auth;
pub mod cli;
pub mod dashboard;
pub mod guard;
pub mod pages;
pub mod profile;
pub mod provider;
pub mod rate_limit;

use api::create_api_router;
use auth::add_session_cookies;
use axum::{Router, middleware};
use guard::route_guard;
use pages::{PagesState, create_pages_router};
use provider::IdentityProvider;
use rate_limit::RateLimitConfig;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use url::Url;

pub struct ServerConfig {
    /// Identity provider backing every session and row lookup
    pub provider: Arc<dyn IdentityProvider>,
    /// Public URL of the site, used for links in provider emails
    pub site_url: Url,
    /// Whether to set Secure flag on session cookies (true when the site URL is HTTPS)
    pub secure_cookies: bool,
    /// Key rate limits on X-Forwarded-For (requires running behind a proxy)
    pub trust_forwarded_for: bool,
}

/// State for the app-wide session middleware.
#[derive(Clone)]
struct GatewayState {
    provider: Arc<dyn IdentityProvider>,
    secure_cookies: bool,
}

impl_has_session_backend!(GatewayState);

/// Create the application router with the given configuration.
pub fn create_app(config: &ServerConfig) -> Router {
    let rate_limit_config = Arc::new(RateLimitConfig::new(config.trust_forwarded_for));

    let api_router = create_api_router(
        config.provider.clone(),
        config.secure_cookies,
        config.site_url.clone(),
        rate_limit_config.clone(),
    );

    let pages_router = create_pages_router(PagesState {
        provider: config.provider.clone(),
        secure_cookies: config.secure_cookies,
        site_url: config.site_url.clone(),
        rate_limit_config,
    });

    let gateway = GatewayState {
        provider: config.provider.clone(),
        secure_cookies: config.secure_cookies,
    };

    // Cookie propagation wraps the guard so refreshes found by either reach the client
    Router::new()
        .nest("/api", api_router)
        .merge(pages_router)
        .layer(
            ServiceBuilder::new()
                .layer(middleware::from_fn_with_state(
                    gateway.clone(),
                    add_session_cookies::<GatewayState>,
                ))
                .layer(middleware::from_fn_with_state(
                    gateway,
                    route_guard::<GatewayState>,
                )),
        )
}

/// Run the server on the given listener. This function blocks until the server exits.
pub async fn run_server(config: ServerConfig, listener: TcpListener) -> Result<(), std::io::Error> {
    let app = create_app(&config);
    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, make_service).await
}
