use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use mathrob_client::endpoints::{self, ApiCall, ProblemFilter};
use mathrob_client::{
    ApiClient, ApiResponse, ClientConfig, ClientError, ErrorBanner, ErrorBus, FileTokenStore, RequestOptions,
    Route, Router, SessionManager, SessionPhase, SystemErrorEvent,
};
use reqwest::Method;
use serde_json::Value;
use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error("failed to read {path}: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("invalid HTTP method: {0}")]
    InvalidMethod(String),
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("server returned HTTP {status}: {body}")]
    Server { status: u16, body: String },
    #[error("identity lookup task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

#[derive(Parser, Debug)]
#[command(name = "mathrob", about = "Math tutoring backend CLI")]
struct Cli {
    /// Backend origin; overrides `MATHROB_API_URL`.
    #[arg(long, env = "MATHROB_API_URL")]
    api_url: Option<String>,

    /// Token file; overrides `MATHROB_TOKEN_FILE`.
    #[arg(long, env = "MATHROB_TOKEN_FILE")]
    token_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Exchange credentials for a token and store it.
    Login(LoginArgs),
    Logout,
    Whoami,
    /// Problems due for review today.
    Reviews,
    /// Today's generated review set.
    Daily,
    Problems {
        #[arg(long)]
        mastery: Option<u8>,
        #[arg(long)]
        limit: Option<u32>,
    },
    Problem {
        id: u64,
    },
    Mastery {
        id: u64,
        level: u8,
    },
    Review {
        id: u64,
        score: u8,
    },
    Similar {
        id: u64,
    },
    Upload {
        file: PathBuf,
    },
    /// Raw authenticated request.
    Api(RawArgs),
}

#[derive(Args, Debug)]
struct LoginArgs {
    #[arg(long, env = "MATHROB_USERNAME")]
    username: String,
    #[arg(long, env = "MATHROB_PASSWORD")]
    password: String,
}

#[derive(Args, Debug)]
struct RawArgs {
    method: String,
    endpoint: String,
    /// JSON request body.
    #[arg(long)]
    data: Option<String>,
}

#[tokio::main]
async fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let config = load_config(cli.api_url.as_deref(), cli.token_file)?;
    tracing::debug!(api_url = %config.api_url, token_file = %config.token_file.display(), "client configured");
    let bus = ErrorBus::new();
    let mut events = bus.subscribe();
    let store = Arc::new(FileTokenStore::new(config.token_file.clone()));
    let api = ApiClient::from_config(&config, store, bus)?;
    let session = SessionManager::new(api, Router::new(Route::Home));

    let result = dispatch(&session, cli.command).await;
    report_system_errors(&mut events);
    result
}

fn load_config(api_url: Option<&str>, token_file: Option<PathBuf>) -> Result<ClientConfig, CliError> {
    let mut config = match api_url {
        Some(url) => ClientConfig::with_api_url(url)?,
        None => ClientConfig::from_env()?,
    };
    if let Some(path) = token_file {
        config.token_file = path;
    }
    Ok(config)
}

async fn dispatch(session: &SessionManager, command: Command) -> Result<(), CliError> {
    match command {
        Command::Login(args) => {
            let fetch = session.login_with_password(&args.username, &args.password).await?;
            fetch.await?;
            match session.user() {
                Some(user) => println!("logged in as {}", user.display_name()),
                None => return Err(ClientError::NotAuthenticated.into()),
            }
            Ok(())
        }
        Command::Logout => {
            session.logout();
            println!("logged out");
            Ok(())
        }
        Command::Whoami => {
            ensure_authenticated(session).await?;
            if let Some(user) = session.user() {
                let role = if user.is_admin { "admin" } else { "member" };
                println!("{} ({role})", user.display_name());
            }
            Ok(())
        }
        Command::Reviews => call(session, endpoints::reviews_today()).await,
        Command::Daily => call(session, endpoints::daily_review()).await,
        Command::Problems { mastery, limit } => {
            call(session, endpoints::list_problems(ProblemFilter { limit, mastery })).await
        }
        Command::Problem { id } => call(session, endpoints::get_problem(id)).await,
        Command::Mastery { id, level } => call(session, endpoints::set_mastery(id, level)).await,
        Command::Review { id, score } => call(session, endpoints::submit_review(id, score)).await,
        Command::Similar { id } => call(session, endpoints::generate_similar(id)).await,
        Command::Upload { file } => {
            let data = tokio::fs::read(&file)
                .await
                .map_err(|source| CliError::ReadFile { path: file.clone(), source })?;
            call(session, endpoints::upload_problem(&file_name(&file), data)).await
        }
        Command::Api(raw) => call(session, raw_call(raw)?).await,
    }
}

/// Restore the stored session and wait for identity resolution.
async fn ensure_authenticated(session: &SessionManager) -> Result<(), CliError> {
    if let Some(fetch) = session.initialize() {
        fetch.await?;
    }
    if session.phase() == SessionPhase::Authenticated {
        Ok(())
    } else {
        Err(ClientError::NotAuthenticated.into())
    }
}

async fn call(session: &SessionManager, call: ApiCall) -> Result<(), CliError> {
    ensure_authenticated(session).await?;
    let response = session.api().call(call).await?;
    print_response(&response)
}

fn raw_call(raw: RawArgs) -> Result<ApiCall, CliError> {
    let method = parse_method(&raw.method)?;
    let mut options = RequestOptions::with_method(method);
    if let Some(data) = raw.data {
        let body = serde_json::from_str::<Value>(&data)?;
        options = options.json(&body);
    }
    Ok(ApiCall { endpoint: raw.endpoint, options })
}

fn parse_method(raw: &str) -> Result<Method, CliError> {
    Method::from_bytes(raw.to_ascii_uppercase().as_bytes()).map_err(|_| CliError::InvalidMethod(raw.to_owned()))
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map_or_else(|| "upload".to_owned(), |name| name.to_string_lossy().into_owned())
}

fn print_response(response: &ApiResponse) -> Result<(), CliError> {
    if !response.ok() {
        return Err(CliError::Server { status: response.status(), body: response.text() });
    }
    match response.json::<Value>() {
        Ok(value) => println!("{}", serde_json::to_string_pretty(&value)?),
        Err(_) => println!("{}", response.text()),
    }
    Ok(())
}

/// Print the banner for the latest system error seen during this run.
fn report_system_errors(events: &mut broadcast::Receiver<SystemErrorEvent>) {
    let banner = ErrorBanner::new();
    loop {
        match events.try_recv() {
            Ok(event) => banner.show(event),
            Err(TryRecvError::Lagged(_)) => {}
            Err(_) => break,
        }
    }
    if let Some(notice) = banner.notice() {
        eprintln!("{notice}");
    }
}

#[cfg(test)]
#[path = "main_test.rs"]
mod tests;
