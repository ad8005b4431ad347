mod auth;
mod models;
mod store;

use anyhow::Result;
use axum::http::{HeaderValue, Method, header};
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const BCRYPT_COSTS: std::ops::RangeInclusive<u32> = 4..=31;

#[derive(Parser, Debug)]
#[command(name = "sentinel-auth")]
#[command(about = "email + password sign in with authorization codes, PKCE and per-client tokens")]
struct Args {
    /// Host to bind to
    #[arg(long, env = "SENTINEL_HOST", default_value = "localhost")]
    host: String,

    /// Port to bind to
    #[arg(short, long, env = "SENTINEL_PORT", default_value = "8080")]
    port: u16,

    /// `iss` claim of every token
    #[arg(long, env = "SENTINEL_ISSUER", default_value = "sentinel")]
    issuer: String,

    /// Access/ID token lifetime in seconds
    #[arg(long, env = "SENTINEL_ACCESS_TOKEN_TTL", default_value = "3600")]
    access_token_ttl: u64,

    /// Authorization code lifetime in seconds
    #[arg(long, env = "SENTINEL_AUTH_CODE_TTL", default_value = "600")]
    auth_code_ttl: u64,

    /// Refresh token lifetime in seconds (default is 100 years)
    #[arg(long, env = "SENTINEL_REFRESH_TOKEN_TTL", default_value = "3153600000")]
    refresh_token_ttl: u64,

    /// bcrypt work factor
    #[arg(long, env = "SENTINEL_BCRYPT_COST", default_value_t = bcrypt::DEFAULT_COST)]
    bcrypt_cost: u32,

    /// Comma separated CORS origins, or `*`
    #[arg(long, env = "SENTINEL_ALLOWED_ORIGINS", value_delimiter = ',')]
    allowed_origins: Vec<String>,

    /// Redirect URI registered for the root client when it is first created
    #[arg(long, env = "SENTINEL_ROOT_REDIRECT_URI")]
    root_redirect_uri: Option<String>,
}

impl Args {
    fn auth_config(&self) -> auth::AuthConfig {
        auth::AuthConfig {
            issuer: self.issuer.clone(),
            access_token_ttl: Duration::from_secs(self.access_token_ttl),
            auth_code_ttl: Duration::from_secs(self.auth_code_ttl),
            refresh_token_ttl: Duration::from_secs(self.refresh_token_ttl),
            bcrypt_cost: self.bcrypt_cost,
            ..auth::AuthConfig::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sentinel_auth=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if !BCRYPT_COSTS.contains(&args.bcrypt_cost) {
        anyhow::bail!(
            "SENTINEL_BCRYPT_COST must be between {} and {}",
            BCRYPT_COSTS.start(),
            BCRYPT_COSTS.end()
        );
    }

    let store = Arc::new(store::MemoryStore::new());
    let auth = auth::AuthService::new(store, args.auth_config());

    // only the id gets logged, the secret never leaves the store
    let root = auth.ensure_root_client(args.root_redirect_uri.clone()).await?;
    tracing::info!(client_id = %root.id, "root client ready");

    let state = auth::AppState {
        auth: Arc::new(auth),
    };
    let app = auth::router(state).layer(cors_layer(&args.allowed_origins)?);

    // we pass this to TcpListener::bind() which accepts ToSocketAddrs,
    // so hostnames like "localhost" get resolved properly
    let bind_addr = format!("{}:{}", args.host, args.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("Server ready at http://{}", bind_addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    Ok(())
}

fn cors_layer(origins: &[String]) -> Result<CorsLayer> {
    let origins: Vec<&str> = origins
        .iter()
        .map(|o| o.trim())
        .filter(|o| !o.is_empty())
        .collect();

    let allow_origin = if origins.contains(&"*") {
        AllowOrigin::from(Any)
    } else {
        let values = origins
            .iter()
            .map(|o| HeaderValue::from_str(o))
            .collect::<Result<Vec<_>, _>>()?;
        if values.is_empty() {
            tracing::warn!("no CORS origins configured, browsers on other origins will be refused");
        }
        AllowOrigin::list(values)
    };

    Ok(CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]))
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("shutting down"),
        Err(e) => {
            // keep serving, we just can't stop gracefully
            tracing::error!("failed to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
    }
}
