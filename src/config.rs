/*
 * Responsibility
 * - Read env / .env (PORT, APP_ENV, auth methods, stores, tenant layout)
 * - Validate settings (fail startup when something is missing or invalid)
 * - Build the library-facing AuthConfig
 */
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::middleware::http::HttpLimits;
use crate::services::authz::context::AuthMethod;
use crate::services::authz::tenant_path::DEFAULT_ROOT_TEMPLATE;
use crate::services::authz::tools::StaticToolCatalog;
use crate::services::credentials::introspection::IntrospectionSettings;
use crate::services::credentials::jwt::{self, JwtKey, JwtSettings};
use crate::services::credentials::oauth::{OAuthSettings, ScopeMapping};
use crate::services::credentials::{ApiKeySettings, AuthConfig, AuthConfigError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnv {
    Development,
    Production,
}

impl AppEnv {
    fn parse(raw: Option<String>) -> Self {
        match raw
            .unwrap_or_else(|| "development".to_string())
            .to_ascii_lowercase()
            .as_str()
        {
            "production" | "prod" => Self::Production,
            _ => Self::Development,
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Missing(&'static str),
    Invalid(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Missing(key) => write!(f, "missing configuration: {}", key),
            ConfigError::Invalid(key) => write!(f, "invalid configuration: {}", key),
        }
    }
}

impl std::error::Error for ConfigError {}

#[derive(Debug, Clone)]
pub struct Config {
    pub addr: SocketAddr,
    pub app_env: AppEnv,
    pub http: HttpLimits,

    // Backends. Absent means in-memory.
    pub database_url: Option<String>,
    pub valkey_url: Option<String>,
    pub api_key_store_prefix: String,

    pub tenant_root_template: String,
    pub dev_tenants: Vec<String>,
    pub tools: StaticToolCatalog,

    pub auth: AuthConfig,
    pub auth_timeout: Duration,
    pub introspection: Option<IntrospectionSettings>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. `from_env` passes the process environment.
    pub fn from_lookup<F>(get: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| get(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let port: u16 = parse_or(var("PORT"), 3000, "PORT")?;
        let addr: SocketAddr = SocketAddr::from_str(&format!("0.0.0.0:{}", port))
            .map_err(|_| ConfigError::Invalid("PORT"))?;

        let app_env = AppEnv::parse(var("APP_ENV"));

        let http_defaults = HttpLimits::default();
        let http = HttpLimits {
            body_limit_bytes: parse_or(
                var("HTTP_BODY_LIMIT_BYTES"),
                http_defaults.body_limit_bytes,
                "HTTP_BODY_LIMIT_BYTES",
            )?,
            request_timeout: Duration::from_secs(parse_or(
                var("HTTP_REQUEST_TIMEOUT_SECS"),
                http_defaults.request_timeout.as_secs(),
                "HTTP_REQUEST_TIMEOUT_SECS",
            )?),
        };

        let tenant_root_template =
            var("TENANT_ROOT_TEMPLATE").unwrap_or_else(|| DEFAULT_ROOT_TEMPLATE.to_string());
        if !tenant_root_template.starts_with('/') || !tenant_root_template.contains("{tenant_id}") {
            return Err(ConfigError::Invalid("TENANT_ROOT_TEMPLATE"));
        }

        let dev_tenants = var("DEV_TENANTS")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>();

        let mut tools = StaticToolCatalog::filesystem();
        if let Some(extra) = var("TOOL_OPERATIONS") {
            let parsed = StaticToolCatalog::parse(&extra).map_err(|e| {
                tracing::error!(error = %e, "invalid TOOL_OPERATIONS");
                ConfigError::Invalid("TOOL_OPERATIONS")
            })?;
            tools = tools.merge(parsed);
        }

        let jwt = jwt_settings(&var)?;
        let api_key = if parse_or(var("API_KEY_ENABLED"), false, "API_KEY_ENABLED")? {
            let defaults = ApiKeySettings::default();
            Some(ApiKeySettings {
                header_name: var("API_KEY_HEADER")
                    .map(|h| h.to_ascii_lowercase())
                    .unwrap_or(defaults.header_name),
                key_prefix: var("API_KEY_PREFIX").unwrap_or(defaults.key_prefix),
            })
        } else {
            None
        };
        if api_key
            .as_ref()
            .is_some_and(|k| k.key_prefix.contains('_') || !k.key_prefix.is_ascii())
        {
            return Err(ConfigError::Invalid("API_KEY_PREFIX"));
        }

        let (oauth, introspection) = oauth_settings(&var)?;

        let method = match var("AUTH_METHOD") {
            Some(raw) => Some(
                AuthMethod::from_str(&raw).map_err(|_| ConfigError::Invalid("AUTH_METHOD"))?,
            ),
            None => None,
        };

        let auth = AuthConfig {
            required: parse_or(var("AUTH_REQUIRED"), true, "AUTH_REQUIRED")?,
            method,
            jwt,
            api_key,
            oauth,
        };
        auth.validate().map_err(|e| match e {
            AuthConfigError::NoMethodConfigured => {
                ConfigError::Missing("JWT_SECRET | JWT_PUBLIC_KEY_PEM | API_KEY_ENABLED | OAUTH_INTROSPECTION_URL")
            }
            _ => ConfigError::Invalid("AUTH_METHOD"),
        })?;

        let auth_timeout = Duration::from_millis(parse_or(
            var("AUTH_UPSTREAM_TIMEOUT_MS"),
            5_000,
            "AUTH_UPSTREAM_TIMEOUT_MS",
        )?);

        Ok(Self {
            addr,
            app_env,
            http,
            database_url: var("DATABASE_URL"),
            valkey_url: var("VALKEY_URL"),
            api_key_store_prefix: var("API_KEY_STORE_PREFIX").unwrap_or_else(|| "apikey".to_string()),
            tenant_root_template,
            dev_tenants,
            tools,
            auth,
            auth_timeout,
            introspection,
        })
    }
}

fn parse_or<T: FromStr>(raw: Option<String>, default: T, key: &'static str) -> Result<T, ConfigError> {
    match raw {
        Some(v) => v.parse().map_err(|_| ConfigError::Invalid(key)),
        None => Ok(default),
    }
}

fn jwt_settings(var: &dyn Fn(&str) -> Option<String>) -> Result<Option<JwtSettings>, ConfigError> {
    let secret = var("JWT_SECRET");
    // PEM from env usually carries literal "\n"
    let pem = var("JWT_PUBLIC_KEY_PEM").map(|p| p.replace("\\n", "\n"));

    let key = match (secret, pem) {
        (None, None) => return Ok(None),
        (Some(_), Some(_)) => return Err(ConfigError::Invalid("JWT_SECRET")),
        (Some(secret), None) => JwtKey::Secret(secret),
        (None, Some(pem)) => JwtKey::PublicKeyPem(pem),
    };

    let default_alg = match key {
        JwtKey::Secret(_) => "HS256",
        JwtKey::PublicKeyPem(_) => "RS256",
    };
    let algorithm = jwt::parse_algorithm(&var("JWT_ALGORITHM").unwrap_or_else(|| default_alg.into()))
        .ok_or(ConfigError::Invalid("JWT_ALGORITHM"))?;

    let mut settings = JwtSettings::new(algorithm, key);
    settings.issuer = var("JWT_ISSUER");
    settings.audience = var("JWT_AUDIENCE");
    settings.leeway_seconds = parse_or(var("JWT_LEEWAY_SECONDS"), 60, "JWT_LEEWAY_SECONDS")?;
    if let Some(claim) = var("JWT_TENANT_CLAIM") {
        settings.tenant_claim = claim;
    }
    if let Some(claim) = var("JWT_ROLE_CLAIM") {
        settings.role_claim = claim;
    }
    Ok(Some(settings))
}

fn oauth_settings(
    var: &dyn Fn(&str) -> Option<String>,
) -> Result<(Option<OAuthSettings>, Option<IntrospectionSettings>), ConfigError> {
    let Some(endpoint) = var("OAUTH_INTROSPECTION_URL") else {
        return Ok((None, None));
    };
    url::Url::parse(&endpoint).map_err(|_| ConfigError::Invalid("OAUTH_INTROSPECTION_URL"))?;

    let mut scope_mapping = ScopeMapping::default();
    if let Some(extra) = var("OAUTH_SCOPE_MAPPING") {
        let parsed = ScopeMapping::parse(&extra).map_err(|e| {
            tracing::error!(error = %e, "invalid OAUTH_SCOPE_MAPPING");
            ConfigError::Invalid("OAUTH_SCOPE_MAPPING")
        })?;
        scope_mapping = scope_mapping.merge(parsed);
    }

    let defaults = OAuthSettings::default();
    let oauth = OAuthSettings {
        header_name: var("OAUTH_HEADER")
            .map(|h| h.to_ascii_lowercase())
            .unwrap_or(defaults.header_name),
        cache_ttl: Duration::from_secs(parse_or(
            var("OAUTH_CACHE_TTL_SECONDS"),
            defaults.cache_ttl.as_secs(),
            "OAUTH_CACHE_TTL_SECONDS",
        )?),
        scope_mapping,
    };

    let client_id = var("OAUTH_CLIENT_ID");
    let client_secret = var("OAUTH_CLIENT_SECRET");
    if client_secret.is_some() && client_id.is_none() {
        return Err(ConfigError::Missing("OAUTH_CLIENT_ID"));
    }

    let introspection = IntrospectionSettings {
        endpoint,
        client_id,
        client_secret,
        tenant_claim: var("OAUTH_TENANT_CLAIM").unwrap_or_else(|| "tenant_id".to_string()),
        timeout: Duration::from_millis(parse_or(
            var("OAUTH_INTROSPECTION_TIMEOUT_MS"),
            3_000,
            "OAUTH_INTROSPECTION_TIMEOUT_MS",
        )?),
    };

    Ok((Some(oauth), Some(introspection)))
}
