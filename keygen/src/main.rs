use std::{str::FromStr, sync::Arc};

use clap::{Parser, Subcommand};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use uuid::Uuid;

use fs_authz::services::authz::{Permission, PermissionSet, PermissionType, Role};
use fs_authz::services::clock::SystemClock;
use fs_authz::services::credentials::{ApiKeyIssuer, ApiKeySettings};

/// Mint development credentials for fs-authz.
///
/// - `api-key`: issues a key and prints the metadata record to store under
///   `<store-prefix>:<key_id>` (the plain key is shown once)
/// - `jwt`: signs an HS256 token carrying the tenant and role claims
#[derive(Parser, Debug)]
#[command(name = "fs-authz-keygen", version, about)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Print only the credential (no extra lines)
    #[arg(long, global = true, default_value_t = false)]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    ApiKey {
        #[arg(long)]
        tenant: String,

        #[arg(long)]
        subject: String,

        /// Grant as `type:glob`, e.g. `write:/data/**`. Repeatable.
        #[arg(long = "perm", required = true, value_parser = parse_permission)]
        permissions: Vec<Permission>,

        /// Lifetime in days. Default: no expiry.
        #[arg(long)]
        ttl_days: Option<i64>,

        #[arg(long)]
        name: Option<String>,

        #[arg(long, default_value = "fsk")]
        prefix: String,

        /// Must match API_KEY_STORE_PREFIX of the server.
        #[arg(long, default_value = "apikey")]
        store_prefix: String,
    },
    Jwt {
        #[arg(long)]
        tenant: String,

        #[arg(long)]
        subject: String,

        #[arg(long, value_parser = parse_role)]
        role: Role,

        /// HS256 secret; same value as JWT_SECRET of the server.
        #[arg(long, env = "JWT_SECRET")]
        secret: String,

        #[arg(long, default_value_t = 3600)]
        ttl_secs: i64,

        #[arg(long)]
        issuer: Option<String>,

        #[arg(long)]
        audience: Option<String>,

        #[arg(long, default_value = "tenant_id")]
        tenant_claim: String,

        #[arg(long, default_value = "role")]
        role_claim: String,
    },
}

fn parse_permission(s: &str) -> Result<Permission, String> {
    let (kind, path) = s
        .split_once(':')
        .ok_or_else(|| format!("expected type:glob, got '{s}'"))?;
    let kind = PermissionType::from_str(kind).map_err(|_| format!("unknown permission type '{kind}'"))?;
    if !path.starts_with('/') {
        return Err(format!("glob must be absolute, got '{path}'"));
    }
    Ok(Permission::new(kind, path))
}

fn parse_role(s: &str) -> Result<Role, String> {
    Role::parse(s).ok_or_else(|| format!("unknown role '{s}'"))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    match args.command {
        Command::ApiKey {
            tenant,
            subject,
            permissions,
            ttl_days,
            name,
            prefix,
            store_prefix,
        } => {
            let settings = ApiKeySettings {
                key_prefix: prefix,
                ..ApiKeySettings::default()
            };
            let issuer = ApiKeyIssuer::new(&settings, Arc::new(SystemClock));
            let issued = issuer.issue(
                &tenant,
                &subject,
                PermissionSet::from(permissions),
                ttl_days.map(chrono::Duration::days),
                name,
            )?;

            if args.quiet {
                println!("{}", issued.key);
                return Ok(());
            }

            println!("api key: {}", issued.key);
            println!("store key: {}:{}", store_prefix, issued.metadata.key_id);
            println!("record: {}", serde_json::to_string(&issued.metadata)?);
        }
        Command::Jwt {
            tenant,
            subject,
            role,
            secret,
            ttl_secs,
            issuer,
            audience,
            tenant_claim,
            role_claim,
        } => {
            let now = chrono::Utc::now().timestamp();
            let mut claims = serde_json::Map::new();
            claims.insert("sub".into(), subject.into());
            claims.insert("iat".into(), now.into());
            claims.insert("exp".into(), (now + ttl_secs).into());
            claims.insert("jti".into(), Uuid::new_v4().to_string().into());
            claims.insert(tenant_claim, tenant.into());
            claims.insert(role_claim, role.as_str().into());
            if let Some(iss) = issuer {
                claims.insert("iss".into(), iss.into());
            }
            if let Some(aud) = audience {
                claims.insert("aud".into(), aud.into());
            }

            let token = jsonwebtoken::encode(
                &Header::new(Algorithm::HS256),
                &serde_json::Value::Object(claims),
                &EncodingKey::from_secret(secret.as_bytes()),
            )?;

            if args.quiet {
                println!("{}", token);
                return Ok(());
            }

            println!("token: {}", token);
            println!("authorization: Bearer {}", token);
        }
    }

    Ok(())
}
