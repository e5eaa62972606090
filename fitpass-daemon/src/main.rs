//! FitPass Daemon - biometric enrollment store
//!
//! Command-line entry point: runs enrollments from JSON requests and
//! administers enrollment bans against the local SQLite database.

use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use fitpass_core::{parse_request_str, PersonId};
use fitpass_daemon::store::{blocks, consents, enrollments, persons};
use fitpass_daemon::{BlockAdmin, Config, Database, EnrollmentContext, EnrollmentOrchestrator};
use serde_json::json;
use tracing_subscriber::EnvFilter;

// ============================================================================
// CLI Definition
// ============================================================================

/// FitPass Daemon - biometric enrollment store
#[derive(Parser)]
#[command(name = "fitpass-daemon", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    Migrate,

    /// Run one enrollment from a JSON request
    Enroll {
        /// Request file, or "-" for stdin
        #[arg(long, default_value = "-")]
        request: String,

        /// Person ID of the operating staff member
        #[arg(long)]
        actor: Option<i64>,
    },

    /// Ban a person from enrolling
    Block {
        #[arg(long)]
        person: i64,

        #[arg(long)]
        reason: Option<String>,

        /// RFC 3339 expiry (e.g., "2025-01-31T00:00:00Z"); permanent if omitted
        #[arg(long)]
        until: Option<String>,

        #[arg(long)]
        actor: Option<i64>,
    },

    /// Lift all active bans on a person
    Unblock {
        #[arg(long)]
        person: i64,

        #[arg(long)]
        actor: Option<i64>,
    },

    /// Print a person with their consents, bans and enrollment history
    Show {
        #[arg(long)]
        person: i64,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    tracing::info!(path = %config.db_path.display(), "Opening database");
    let db = Database::open(&config.db_path, config.max_connections).await?;

    let code = match cli.command {
        Commands::Migrate => {
            println!("Database ready at {}", config.db_path.display());
            ExitCode::SUCCESS
        }
        Commands::Enroll { request, actor } => cmd_enroll(&db, &config, &request, actor).await?,
        Commands::Block {
            person,
            reason,
            until,
            actor,
        } => cmd_block(&db, person, reason, until, actor).await?,
        Commands::Unblock { person, actor } => {
            let lifted = BlockAdmin::new(db.clone())
                .lift(actor.map(PersonId::new), PersonId::new(person))
                .await?;
            println!("{}", json!({ "personId": person, "lifted": lifted }));
            ExitCode::SUCCESS
        }
        Commands::Show { person } => cmd_show(&db, PersonId::new(person)).await?,
    };

    db.close().await;
    Ok(code)
}

/// Run one enrollment. Rejections print the error report and exit with 1.
async fn cmd_enroll(
    db: &Database,
    config: &Config,
    source: &str,
    actor: Option<i64>,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let body = read_request(source)?;
    let ctx = EnrollmentContext {
        actor: actor.map(PersonId::new),
    };

    let outcome = match parse_request_str(&body) {
        Ok(request) => {
            let orchestrator =
                EnrollmentOrchestrator::new(db.clone(), config.policy, config.transaction_timeout);
            orchestrator.enroll(&request, &ctx).await
        }
        Err(err) => Err(err),
    };

    match outcome {
        Ok(result) => {
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            println!("{}", serde_json::to_string_pretty(&err.report())?);
            Ok(ExitCode::FAILURE)
        }
    }
}

fn read_request(source: &str) -> std::io::Result<String> {
    if source == "-" {
        let mut body = String::new();
        std::io::stdin().read_to_string(&mut body)?;
        Ok(body)
    } else {
        std::fs::read_to_string(PathBuf::from(source))
    }
}

async fn cmd_block(
    db: &Database,
    person: i64,
    reason: Option<String>,
    until: Option<String>,
    actor: Option<i64>,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let expires_at = until
        .as_deref()
        .map(|s| {
            DateTime::parse_from_rfc3339(s)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| format!("Invalid --until {:?}: {}", s, e))
        })
        .transpose()?;

    let record = BlockAdmin::new(db.clone())
        .place(
            actor.map(PersonId::new),
            PersonId::new(person),
            reason.as_deref(),
            expires_at,
        )
        .await?;

    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(ExitCode::SUCCESS)
}

async fn cmd_show(db: &Database, id: PersonId) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let mut conn = db.acquire().await?;

    let Some(person) = persons::get(&mut conn, id).await? else {
        eprintln!("Person {} not found", id);
        return Ok(ExitCode::FAILURE);
    };
    let consents = consents::list_for_person(&mut conn, id).await?;
    let bans = blocks::list_for_person(&mut conn, id).await?;
    let history = enrollments::history_for_person(&mut conn, id).await?;
    let blocked = blocks::is_blocked(&mut conn, id, Utc::now()).await?;

    println!(
        "{}",
        serde_json::to_string_pretty(&json!({
            "person": person,
            "blocked": blocked,
            "consents": consents,
            "blocks": bans,
            "enrollments": history,
        }))?
    );
    Ok(ExitCode::SUCCESS)
}
