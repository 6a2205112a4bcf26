/*
 * Responsibility
 * - Load Config → build dependencies (stores, verifiers, Authorizer) → Router
 * - Apply middleware (HTTP layers, access auth on protected routes)
 * - Start with axum::serve()
 */
use std::{panic, process, sync::Arc};

use anyhow::{Context, Result};
use axum::Router;
use axum::http::HeaderName;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::api;
use crate::config::Config;
use crate::middleware::http::{self, HttpLimits};
use crate::repos::PgTenantStore;
use crate::services::authz::{Authorizer, TenantPathResolver};
use crate::services::cache::ValkeyClient;
use crate::services::clock::{Clock, SystemClock};
use crate::services::credentials::introspection::HttpIntrospectionVerifier;
use crate::services::credentials::{CredentialResolver, OAuthVerifier, ResolverDeps};
use crate::services::store::{
    ApiKeyStore, CacheApiKeyStore, InMemoryApiKeyStore, InMemoryTenantStore, TenantStore,
};
use crate::state::{AppState, CredentialHeaders};

fn init_tracing() {
    // Prefer RUST_LOG if set; otherwise use a sensible default.
    // Ex:
    // RUST_LOG=info,fs_authz=debug,tower_http=debug cargo run
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,tower_http=info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn init_panic_hook(abort_on_panic: bool) {
    // Keep the default hook as a fallback (prints to stderr with location/payload).
    let default_hook = panic::take_hook();

    panic::set_hook(Box::new(move |info| {
        // Always surface panics via tracing; stderr can be hidden depending on
        // how the process is launched.
        tracing::error!(?info, "panic");

        // Development: crash the whole process so it gets noticed.
        // Production: default behavior, the server keeps running.
        if abort_on_panic {
            process::abort();
        } else {
            default_hook(info);
        }
    }))
}

pub async fn run() -> Result<()> {
    init_tracing();
    let config = Config::from_env()?;

    init_panic_hook(!config.app_env.is_production());

    tracing::info!(
        "starting fs-authz in {:?} mode on {} (methods: {:?}, required: {})",
        config.app_env,
        config.addr,
        config.auth.configured_methods(),
        config.auth.required
    );

    let state = build_state(&config).await?;
    let app = build_router(state, config.http);

    let listener = tokio::net::TcpListener::bind(config.addr)
        .await
        .with_context(|| format!("failed to bind {}", config.addr))?;
    axum::serve(listener, app).await?;
    Ok(())
}

/// Build process-level services and inject them into the shared state.
pub async fn build_state(config: &Config) -> Result<AppState> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let paths = TenantPathResolver::new(config.tenant_root_template.clone());

    let tenants: Arc<dyn TenantStore> = match &config.database_url {
        Some(url) => {
            let pool = sqlx::postgres::PgPoolOptions::new()
                .max_connections(5)
                .connect(url)
                .await
                .context("failed to connect to postgres")?;
            tracing::info!("tenant store: postgres");
            Arc::new(PgTenantStore::new(pool))
        }
        None => {
            let store = InMemoryTenantStore::new();
            for tenant_id in &config.dev_tenants {
                store
                    .provision(tenant_id, &paths)
                    .with_context(|| format!("invalid DEV_TENANTS entry '{tenant_id}'"))?;
            }
            tracing::info!(tenants = config.dev_tenants.len(), "tenant store: in-memory");
            Arc::new(store)
        }
    };

    let api_keys: Option<Arc<dyn ApiKeyStore>> = match (&config.auth.api_key, &config.valkey_url) {
        (None, _) => None,
        (Some(_), Some(url)) => {
            let cache = ValkeyClient::new(url)
                .await
                .context("failed to connect to valkey")?;
            tracing::info!("api key store: valkey");
            Some(Arc::new(CacheApiKeyStore::new(
                Arc::new(cache),
                config.api_key_store_prefix.clone(),
            )))
        }
        (Some(_), None) => {
            tracing::warn!("api key store: in-memory (keys do not survive restarts)");
            Some(Arc::new(InMemoryApiKeyStore::new()))
        }
    };

    let oauth_verifier: Option<Arc<dyn OAuthVerifier>> = match &config.introspection {
        Some(settings) => Some(Arc::new(
            HttpIntrospectionVerifier::new(settings).context("invalid introspection settings")?,
        )),
        None => None,
    };

    let credentials = CredentialResolver::new(
        &config.auth,
        ResolverDeps {
            api_keys,
            oauth_verifier,
            clock,
        },
    )
    .context("invalid auth configuration")?;

    let authorizer = Authorizer::new(
        credentials,
        tenants,
        paths,
        Arc::new(config.tools.clone()),
        config.auth.required,
    );

    Ok(AppState::new(
        Arc::new(authorizer),
        credential_headers(config)?,
        config.auth_timeout,
    ))
}

fn credential_headers(config: &Config) -> Result<CredentialHeaders> {
    let mut headers = CredentialHeaders::default();
    if let Some(api_key) = &config.auth.api_key {
        headers.api_key = HeaderName::from_bytes(api_key.header_name.as_bytes())
            .context("invalid API_KEY_HEADER")?;
    }
    if let Some(oauth) = &config.auth.oauth {
        headers.oauth_token = HeaderName::from_bytes(oauth.header_name.as_bytes())
            .context("invalid OAUTH_HEADER")?;
    }
    Ok(headers)
}

pub fn build_router(state: AppState, limits: HttpLimits) -> Router {
    let router = Router::new()
        .nest("/api/v1", api::v1::routes(state.clone()))
        .with_state(state);

    http::apply(router, limits)
}
