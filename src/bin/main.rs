use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{Level, info, warn};
use tracing_subscriber::EnvFilter;
use jit_provisioner::linkage::SurrealLinkageResolver;
use jit_provisioner::types::TenantDomain;
use jit_provisioner::{DatabaseConfig, FlowContextStore, ProvisioningConfig};

/// Upper bound for `--flow-ttl-secs` (one year).
const MAX_FLOW_TTL_SECS: u64 = 365 * 24 * 60 * 60;

#[derive(Parser)]
#[command(name = "jit-provisioner")]
#[command(about = "Just-in-time provisioning of federated users")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the provisioning HTTP server
    Serve {
        #[arg(short, long, default_value = "8080")]
        port: u16,
        /// Bind address for the admin API (internal / trusted only)
        #[arg(long, default_value = "127.0.0.1:8081")]
        admin_bind: String,
        #[arg(long, default_value = "memory")]
        db_url: String,
        /// Path to provisioning.json (falls back to JIT_CONFIG, then the usual locations)
        #[arg(long, env = "JIT_CONFIG")]
        config: Option<PathBuf>,
        /// Suspended flows older than this many seconds are discarded
        #[arg(
            long,
            default_value_t = 1800,
            value_parser = clap::value_parser!(u64).range(1..=MAX_FLOW_TTL_SECS)
        )]
        flow_ttl_secs: u64,
    },
    /// Initialize the database
    Init {
        #[arg(long, default_value = "memory")]
        db_url: String,
        /// Also write a sample provisioning.json to this path
        #[arg(long)]
        write_config: Option<PathBuf>,
    },
    /// Link a federated subject to an existing local account
    Link {
        #[arg(long)]
        tenant: String,
        #[arg(long)]
        idp: String,
        #[arg(long)]
        subject: String,
        #[arg(long)]
        username: String,
        /// Must point at a persistent store; an in-memory database is discarded on exit
        #[arg(long, env = "SURREALDB_URL")]
        db_url: String,
    },
    /// List federated associations of a tenant
    ListLinks {
        #[arg(long)]
        tenant: String,
        #[arg(long, env = "SURREALDB_URL")]
        db_url: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("jit_provisioner=info".parse()?)
                .add_directive("surrealdb=warn".parse()?),
        )
        .with_max_level(Level::INFO)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            port,
            admin_bind,
            db_url,
            config,
            flow_ttl_secs,
        } => {
            info!("Starting provisioning server on port {}", port);
            info!("Starting admin API on {}", admin_bind);

            let provisioning = read_config(config)?;
            let db_config = DatabaseConfig {
                url: db_url,
                ..Default::default()
            };
            info!("Using database url for REST server: {}", db_config.url);

            let flow_ttl = chrono::Duration::seconds(i64::try_from(flow_ttl_secs)?);
            let state = jit_provisioner::connect(db_config, &provisioning).await?;
            spawn_flow_cleanup(state.flows.clone(), flow_ttl);

            let public_app = jit_provisioner::create_public_router(state.clone());
            let admin_app = jit_provisioner::create_admin_router(state);

            let public_listener =
                tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;
            let admin_listener = tokio::net::TcpListener::bind(&admin_bind).await?;

            info!("Public server listening on http://0.0.0.0:{}", port);
            info!("Admin server listening on http://{}", admin_bind);

            tokio::try_join!(
                axum::serve(public_listener, public_app),
                axum::serve(admin_listener, admin_app),
            )?;
        }
        Commands::Init {
            db_url,
            write_config,
        } => {
            let db_config = DatabaseConfig {
                url: db_url,
                ..Default::default()
            };
            info!("Using database url for initialization: {}", db_config.url);

            info!("Initializing database...");
            let db = jit_provisioner::create_connection(db_config).await?;
            jit_provisioner::ensure_schema(&db).await?;
            info!("Database initialized successfully");

            if let Some(path) = write_config {
                let sample = serde_json::to_string_pretty(&ProvisioningConfig::sample())?;
                std::fs::write(&path, sample)?;
                println!("Sample configuration written to {}", path.display());
            }
        }
        Commands::Link {
            tenant,
            idp,
            subject,
            username,
            db_url,
        } => {
            let db_config = DatabaseConfig {
                url: db_url,
                ..Default::default()
            };
            let db = jit_provisioner::create_connection(db_config).await?;
            jit_provisioner::ensure_schema(&db).await?;

            let links = SurrealLinkageResolver::new(db);
            links
                .link(
                    &tenant.as_str().into(),
                    &idp.as_str().into(),
                    &subject.as_str().into(),
                    &username.as_str().into(),
                )
                .await?;
            println!("Linked {}:{} to '{}' in {}", idp, subject, username, tenant);
        }
        Commands::ListLinks { tenant, db_url } => {
            let db_config = DatabaseConfig {
                url: db_url,
                ..Default::default()
            };
            let db = jit_provisioner::create_connection(db_config).await?;
            jit_provisioner::ensure_schema(&db).await?;

            let links = SurrealLinkageResolver::new(db)
                .list(&TenantDomain::new(tenant))
                .await?;

            if links.is_empty() {
                println!("No federated associations found.");
                return Ok(());
            }

            println!("{:<20} {:<40} {:<30}", "IDP", "SUBJECT", "USERNAME");
            println!("{}", "-".repeat(90));
            for link in links {
                println!("{:<20} {:<40} {:<30}", link.idp, link.subject, link.username);
            }
        }
    }

    Ok(())
}

/// Load the provisioning config, falling back to an empty one so the server
/// can still start (every federated login then fails with an unknown IdP).
fn read_config(path: Option<PathBuf>) -> Result<ProvisioningConfig> {
    match path {
        Some(path) => jit_provisioner::load_config_from(&path),
        None => match jit_provisioner::load_config() {
            Ok(config) => Ok(config),
            Err(e) => {
                warn!("No provisioning config loaded ({e}); no IdPs are configured");
                Ok(ProvisioningConfig::default())
            }
        },
    }
}

fn spawn_flow_cleanup(flows: FlowContextStore, ttl: chrono::Duration) {
    let period = Duration::from_secs(ttl.num_seconds().clamp(1, 300).unsigned_abs());
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;
            let cutoff = chrono::Utc::now() - ttl;
            if let Err(e) = flows.cleanup_older_than(cutoff).await {
                warn!("Flow cleanup failed: {e:#}");
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flow_ttl_is_bounded() {
        let parsed = Cli::try_parse_from(["jit-provisioner", "serve", "--flow-ttl-secs", "600"]);
        assert!(matches!(
            parsed.map(|c| c.command),
            Ok(Commands::Serve { flow_ttl_secs: 600, .. })
        ));

        for bad in ["0", "18446744073709551615", "31536001"] {
            let parsed =
                Cli::try_parse_from(["jit-provisioner", "serve", "--flow-ttl-secs", bad]);
            assert!(parsed.is_err(), "accepted --flow-ttl-secs {bad}");
        }
    }

    #[test]
    fn test_link_commands_need_a_database_url() {
        // SAFETY: no other test in this binary reads SURREALDB_URL.
        unsafe { std::env::remove_var("SURREALDB_URL") };

        let link = Cli::try_parse_from([
            "jit-provisioner",
            "link",
            "--tenant",
            "acme",
            "--idp",
            "GoogleIdP",
            "--subject",
            "alice@gmail.com",
            "--username",
            "alice",
        ]);
        assert!(link.is_err());
        assert!(Cli::try_parse_from(["jit-provisioner", "list-links", "--tenant", "acme"]).is_err());

        let parsed = Cli::try_parse_from([
            "jit-provisioner",
            "list-links",
            "--tenant",
            "acme",
            "--db-url",
            "rocksdb://jit.db",
        ]);
        assert!(matches!(
            parsed.map(|c| c.command),
            Ok(Commands::ListLinks { db_url, .. }) if db_url == "rocksdb://jit.db"
        ));
    }
}
