//! Vigil CLI - operator command-line interface
//!
//! Usage:
//!   vigil migrate
//!   vigil bootstrap-admin --username <name> --email <email> --name <name> --password <password>
//!   vigil revoke-sessions [--user <id>]
//!   vigil audit [--level <level>] [--action <text>] [--limit <n>]

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use vigil_api::audit;
use vigil_api::auth::{hash_password, validate_password_strength};
use vigil_core::{
    AppConfig, AuditFilter, AuditLevel, CredentialStore, NewAuditEvent, NewUser, PgCredentialStore,
    Role, UserStatus, DEFAULT_DATA_ACCESS, PROTECTED_USER_ID,
};

#[derive(Parser)]
#[command(name = "vigil")]
#[command(about = "Vigil session and credential lifecycle operator CLI")]
#[command(version)]
struct Cli {
    /// TOML configuration file; environment variables take precedence
    #[arg(long, env = "VIGIL_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending SQL migrations
    Migrate,
    /// Create the protected super admin on an empty store
    BootstrapAdmin {
        #[arg(long)]
        username: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        name: String,
        #[arg(long, env = "VIGIL_ADMIN_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Revoke live sessions outside the HTTP surface
    RevokeSessions {
        /// Only revoke this user's sessions
        #[arg(long)]
        user: Option<i64>,
    },
    /// Print recent audit events, newest first
    Audit {
        /// Exact level: info, warn, critical or success
        #[arg(long)]
        level: Option<AuditLevel>,
        /// Substring of the action code
        #[arg(long)]
        action: Option<String>,
        #[arg(long, default_value_t = 50)]
        limit: i64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vigil_core=info,vigil_api=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => AppConfig::from_file(path)?.with_env_override()?,
        None => AppConfig::from_env()?,
    };

    match cli.command {
        Commands::Migrate => {
            if config.uses_memory_store() {
                bail!("migrate needs a PostgreSQL DATABASE_URL");
            }
            let store = PgCredentialStore::connect(&config.database).await?;
            store.migrate().await?;
            println!("Migrations applied");
        }
        Commands::BootstrapAdmin {
            username,
            email,
            name,
            password,
        } => {
            let store = vigil_core::open_store(&config.database).await?;
            bootstrap_admin(store.as_ref(), username, email, name, &password).await?;
        }
        Commands::RevokeSessions { user } => {
            let store = vigil_core::open_store(&config.database).await?;
            revoke_sessions(store.as_ref(), user).await?;
        }
        Commands::Audit {
            level,
            action,
            limit,
        } => {
            let store = vigil_core::open_store(&config.database).await?;
            print_audit(store.as_ref(), level, action, limit).await?;
        }
    }

    Ok(())
}

async fn bootstrap_admin(
    store: &dyn CredentialStore,
    username: String,
    email: String,
    name: String,
    password: &str,
) -> anyhow::Result<()> {
    if !store.list_users().await?.is_empty() {
        bail!("users already exist; bootstrap only runs on an empty store");
    }
    validate_password_strength(password).map_err(anyhow::Error::msg)?;
    let password_hash = hash_password(password).context("failed to hash password")?;

    let role = Role::SuperAdmin;
    let user = store
        .insert_user(NewUser {
            username,
            email,
            password_hash,
            name,
            role,
            allowed_screens: role.default_screens(),
            mfa_enabled: false,
            api_access: true,
            data_access: DEFAULT_DATA_ACCESS.to_string(),
            status: UserStatus::Active,
            department: None,
            location: None,
        })
        .await?;

    if user.id != PROTECTED_USER_ID {
        tracing::warn!(
            user_id = user.id,
            "Administrator was not assigned the protected id; earlier rows exist"
        );
    }

    store
        .insert_audit_event(
            NewAuditEvent::system(audit::USER_CREATED)
                .resource("user", user.id)
                .level(AuditLevel::Critical)
                .detail("bootstrap administrator created from the CLI"),
        )
        .await?;

    println!("Created super admin '{}' with id {}", user.username, user.id);
    Ok(())
}

async fn revoke_sessions(store: &dyn CredentialStore, user: Option<i64>) -> anyhow::Result<()> {
    let (revoked, event) = match user {
        Some(user_id) => (
            store.revoke_user_sessions(user_id, None).await?,
            NewAuditEvent::system(audit::USER_SESSIONS_REVOKED)
                .resource("user", user_id)
                .level(AuditLevel::Warn),
        ),
        None => (
            store.revoke_all_sessions(None).await?,
            NewAuditEvent::system(audit::ALL_SESSIONS_REVOKED)
                .resource("session", "*")
                .level(AuditLevel::Critical),
        ),
    };

    // sessions stay revoked when the audit write fails
    if let Err(e) = store
        .insert_audit_event(
            event
                .detail("revoked from the CLI")
                .metadata(serde_json::json!({ "revoked": revoked })),
        )
        .await
    {
        tracing::error!(error = %e, "Failed to write audit event");
    }

    println!("Revoked {revoked} session(s)");
    Ok(())
}

async fn print_audit(
    store: &dyn CredentialStore,
    level: Option<AuditLevel>,
    action: Option<String>,
    limit: i64,
) -> anyhow::Result<()> {
    let filter = AuditFilter::new(level, action, None, Some(limit), None);
    let rows = store.list_audit_events(&filter).await?;

    if rows.is_empty() {
        println!("No audit events");
        return Ok(());
    }

    for event in rows {
        println!(
            "{}  {:<8}  {:<24}  {:<16}  {}",
            event.created_at.format("%Y-%m-%d %H:%M:%S"),
            event.level.as_str(),
            event.action,
            event.actor_username,
            match (&event.resource_type, &event.resource_id) {
                (Some(kind), Some(id)) => format!("{kind}:{id}"),
                _ => String::new(),
            }
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_core::InMemoryCredentialStore;

    #[test]
    fn test_cli_parses_subcommands() {
        let cli = Cli::parse_from(["vigil", "revoke-sessions", "--user", "7"]);
        assert!(matches!(cli.command, Commands::RevokeSessions { user: Some(7) }));

        let cli = Cli::parse_from(["vigil", "audit", "--level", "warn", "--limit", "5"]);
        assert!(matches!(
            cli.command,
            Commands::Audit {
                level: Some(AuditLevel::Warn),
                limit: 5,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_bootstrap_admin_gets_protected_id_once() {
        let store = InMemoryCredentialStore::new();

        bootstrap_admin(
            &store,
            "root".into(),
            "root@example.com".into(),
            "Root".into(),
            "long enough",
        )
        .await
        .unwrap();
        let admin = store.find_user(PROTECTED_USER_ID).await.unwrap().unwrap();
        assert_eq!(admin.role, Role::SuperAdmin);

        let again = bootstrap_admin(
            &store,
            "root2".into(),
            "root2@example.com".into(),
            "Root".into(),
            "long enough",
        )
        .await;
        assert!(again.is_err());
    }

    #[tokio::test]
    async fn test_revoke_sessions_is_audited_without_actor() {
        let store = InMemoryCredentialStore::new();

        revoke_sessions(&store, None).await.unwrap();

        let rows = store
            .list_audit_events(&AuditFilter::new(None, None, None, None, None))
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].action, audit::ALL_SESSIONS_REVOKED);
        assert_eq!(rows[0].actor_id, None);
    }
}
