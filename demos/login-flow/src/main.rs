//! Signs in against a live API and makes one protected call.
//!
//! ```text
//! AUTHLINE_BASE_URL=http://127.0.0.1:8000 \
//! AUTHLINE_USERNAME=alice AUTHLINE_PASSWORD=secret \
//!     cargo run -p login-flow -- /games/
//! ```
//!
//! Credentials are kept under `AUTHLINE_STATE_DIR` (default `.authline`),
//! so a second run reuses the session without logging in again.
//! `AUTHLINE_CONFIG` may name a JSON file with an `AuthlineConfig`.

use std::path::PathBuf;

use authline::prelude::*;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

struct Settings {
    config: AuthlineConfig,
    username: Option<String>,
    password: Option<String>,
    state_dir: PathBuf,
    path: String,
}

impl Settings {
    fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        let mut config = match std::env::var("AUTHLINE_CONFIG") {
            Ok(file) => serde_json::from_str(&std::fs::read_to_string(file)?)?,
            Err(_) => AuthlineConfig::default(),
        };
        if let Ok(base_url) = std::env::var("AUTHLINE_BASE_URL") {
            config.endpoints.base_url = base_url;
        }

        Ok(Self {
            config,
            username: std::env::var("AUTHLINE_USERNAME").ok(),
            password: std::env::var("AUTHLINE_PASSWORD").ok(),
            state_dir: std::env::var("AUTHLINE_STATE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(".authline")),
            path: std::env::args().nth(1).unwrap_or_else(|| "/games/".into()),
        })
    }
}

// ---------------------------------------------------------------------------
// Flow
// ---------------------------------------------------------------------------

/// What the user would see at the end of the flow.
#[derive(Debug, PartialEq)]
enum Outcome {
    /// The protected call went through.
    Page { status: u16, body: String },
    /// Back to the login page, with the target to return to.
    LoginRequired { url: String },
}

async fn run(settings: &Settings) -> Result<Outcome, AuthlineError> {
    let storage = FileStorage::new(&settings.state_dir, &settings.config.endpoints.base_url);
    let client = SessionClient::builder()
        .config(settings.config.clone())
        .build_http(storage)?;

    client.subscribe(|snapshot| {
        tracing::info!(
            status = %snapshot.status,
            username = snapshot.username.as_deref().unwrap_or("-"),
            "session changed"
        );
    });

    if !client.is_authenticated() {
        let (Some(username), Some(password)) = (&settings.username, &settings.password) else {
            return Ok(login_required(&client, &settings.path));
        };
        match client.login(username, password).await {
            Ok(_) => {
                let next = Some(settings.path.as_str());
                let landing = redirect::landing_for(client.config(), next);
                tracing::info!(%landing, "signed in");
            }
            Err(AuthlineError::InvalidCredentials(fields)) => {
                tracing::warn!(%fields, "login rejected");
                return Ok(login_required(&client, &settings.path));
            }
            Err(e) => return Err(e),
        }
    }

    match client.send(ApiRequest::get(settings.path.as_str())).await {
        Ok(response) => Ok(Outcome::Page {
            status: response.status,
            body: response.text(),
        }),
        Err(e) if e.is_session_expired() => Ok(login_required(&client, &settings.path)),
        Err(e) => Err(e),
    }
}

fn login_required<B, A, T>(client: &SessionClient<B, A, T>, next: &str) -> Outcome
where
    B: StorageBackend,
    A: AuthApi,
    T: ApiTransport,
{
    Outcome::LoginRequired {
        url: redirect::login_url(client.config(), Some(next)),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("login_flow=info,authline=info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = Settings::from_env()?;
    match run(&settings).await? {
        Outcome::Page { status, body } => {
            println!("{status} {}", settings.path);
            println!("{body}");
        }
        Outcome::LoginRequired { url } => {
            eprintln!("not signed in; set AUTHLINE_USERNAME/AUTHLINE_PASSWORD ({url})");
        }
    }
    Ok(())
}
