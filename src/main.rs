use std::io::Write;
use std::sync::Arc;

use color_eyre::eyre::{eyre, Result, WrapErr};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use mailpilot::adapters::{FileCredentialsProvider, ReqwestHttpClient, TungsteniteConnector};
use mailpilot::cli::{parse_args, CliCommand, USAGE};
use mailpilot::logging::init_tracing;
use mailpilot::{
    ApiRequest, AuthError, ClientConfig, ConnectionManager, SessionContext, TokenRefreshCoordinator,
};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    let command = parse_args(std::env::args());
    if command == CliCommand::Version {
        println!("mailpilot {}", VERSION);
        return Ok(());
    }

    color_eyre::install()?;
    init_tracing();

    let config = ClientConfig::from_env();
    let store = FileCredentialsProvider::new().wrap_err("Failed to locate credential store")?;
    let session = SessionContext::with_store(Arc::new(store));
    session.restore().await;

    let http = ReqwestHttpClient::with_timeout(config.request_timeout)
        .wrap_err("Failed to build HTTP client")?;
    let coordinator = TokenRefreshCoordinator::new(Arc::new(http), session.clone(), &config);

    match command {
        CliCommand::Version => Ok(()),
        CliCommand::Usage(problem) => Err(eyre!("{}\n{}", problem, USAGE)),
        CliCommand::Login { email } => login(&coordinator, &email).await,
        CliCommand::Logout => {
            coordinator.auth().logout().await;
            println!("Signed out.");
            Ok(())
        }
        CliCommand::Get { path } => get(&coordinator, &path).await,
        CliCommand::Watch => watch(&config, session).await,
    }
}

async fn login(coordinator: &TokenRefreshCoordinator, email: &str) -> Result<()> {
    let password = match std::env::var("MAILPILOT_PASSWORD") {
        Ok(password) => password,
        Err(_) => rpassword::prompt_password("Password: ").wrap_err("Failed to read password")?,
    };
    coordinator
        .auth()
        .login(email, &password)
        .await
        .map_err(|e| match e {
            AuthError::Rejected { status: 401, .. } => eyre!("Invalid email or password."),
            e => eyre!(e.user_message()),
        })?;
    println!("Signed in as {}.", email);
    Ok(())
}

async fn get(coordinator: &TokenRefreshCoordinator, path: &str) -> Result<()> {
    if !coordinator.session().is_authenticated() {
        return Err(eyre!("Not signed in. Run `mailpilot login <email>` first."));
    }
    let response = coordinator.issue(ApiRequest::get(path)).await?;
    let body = response.text().unwrap_or_default();
    println!("{}", body);
    Ok(())
}

async fn watch(config: &ClientConfig, session: SessionContext) -> Result<()> {
    if !session.is_authenticated() {
        return Err(eyre!("Not signed in. Run `mailpilot login <email>` first."));
    }

    let manager = ConnectionManager::spawn(config, Arc::new(TungsteniteConnector::new()), session);
    let mut events = manager.subscribe();
    let mut status = manager.watch_status();
    info!(url = %config.ws_url, "watching live events (Ctrl-C to stop)");

    let mut stdout = std::io::stdout();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = *status.borrow_and_update();
                info!(phase = %current.phase, attempts = current.reconnect_attempts, "live channel status");
            }
            event = events.recv() => match event {
                Ok(message) => {
                    let line = serde_json::to_string(&message)?;
                    writeln!(stdout, "{}", line)?;
                }
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "event consumer fell behind"),
                Err(RecvError::Closed) => break,
            },
        }
    }

    manager.shutdown().await;
    Ok(())
}
