use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use schedule_portal::{
    ApiClient, ClientSettings, JobRecord, JobStatus, JobWorkflow, SessionStore,
    session::{Credentials, FileTokenStorage, Registration, TokenStorage},
};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "schedule-portal", about = "Schedule analysis portal client")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Sign in and store credentials
    Login {
        #[arg(long)]
        email: String,
        #[arg(long, env = "PORTAL_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Create an account
    Register {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long, env = "PORTAL_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Sign out and forget stored credentials
    Logout,
    /// Show the signed-in user
    Whoami,
    /// Exchange the refresh token for a new access token
    Refresh,
    /// Upload a schedule and wait for the analysis
    Analyze { path: PathBuf },
}

#[tokio::main]
async fn main() {
    dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    if let Err(err) = app_main(cli).await {
        error!(?err, "command failed");
        std::process::exit(1);
    }
}

async fn app_main(cli: Cli) -> Result<()> {
    let settings = ClientSettings::from_env()?;
    let storage: Arc<dyn TokenStorage> =
        Arc::new(FileTokenStorage::new(settings.credentials_path.clone()));
    let api = ApiClient::from_settings(&settings).context("failed to build API client")?;
    let session = SessionStore::new(api, storage);
    info!(base_url = %settings.api_base_url, "portal client ready");

    match cli.command {
        Command::Login { email, password } => {
            let user = session.login(&Credentials::new(email, password)).await?;
            println!("Signed in as {} <{}> ({})", user.name, user.email, user.role);
        }
        Command::Register {
            name,
            email,
            password,
        } => {
            let registration = Registration {
                name,
                email,
                password,
            };
            match session.register(&registration).await? {
                Some(user) => println!("Registered and signed in as {}", user.name),
                None => println!("Registered. Sign in to continue."),
            }
        }
        Command::Logout => {
            session.logout().await;
            println!("Signed out.");
        }
        Command::Whoami => {
            let snapshot = session.initialize().await;
            match snapshot.user.as_ref().filter(|_| snapshot.is_authenticated()) {
                Some(user) => {
                    println!("{} <{}>", user.name, user.email);
                    println!("role: {}", user.role);
                    if !user.permissions.is_empty() {
                        let permissions: Vec<&str> =
                            user.permissions.iter().map(String::as_str).collect();
                        println!("permissions: {}", permissions.join(", "));
                    }
                }
                None => println!("Not signed in."),
            }
        }
        Command::Refresh => {
            session.refresh_token().await?;
            println!("Access token refreshed.");
        }
        Command::Analyze { path } => analyze(&session, path).await?,
    }

    Ok(())
}

async fn analyze(session: &SessionStore, path: PathBuf) -> Result<()> {
    if let Err(err) = session.ensure_fresh(chrono::Duration::seconds(60)).await {
        warn!(error = %err, "could not refresh access token before upload");
    }

    let mut workflow = JobWorkflow::new(session.api().clone());
    workflow
        .select_file(&path)
        .await
        .with_context(|| format!("failed to load {}", path.display()))?;
    let mut updates = workflow.submit().await?;

    let mut last_status: Option<JobStatus> = None;
    loop {
        let record = updates.borrow_and_update().clone();
        if last_status.as_ref() != Some(&record.status) {
            println!("job {}: {}", record.id, record.status);
            last_status = Some(record.status.clone());
        }
        if record.is_terminal() {
            return report(record);
        }

        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    bail!("polling stopped before job {} finished", record.id);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                workflow.cancel().await;
                bail!("cancelled while job {} was {}", record.id, record.status);
            }
        }
    }
}

fn report(record: JobRecord) -> Result<()> {
    match record.status {
        JobStatus::Completed => {
            let result = record.result.unwrap_or(serde_json::Value::Null);
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
        _ => bail!(
            "analysis failed: {}",
            record.error.as_deref().unwrap_or("unknown error")
        ),
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}
