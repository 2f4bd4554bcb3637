use clap::{Args, Parser, Subcommand};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::task::JoinSet;
use tracing_subscriber::{EnvFilter, fmt};

mod accounts;
mod assistant;
mod controller;
mod location;
mod session;
mod settings;

use accounts::{AccountsClient, NewAccount};
use assistant::HttpAssistant;
use controller::{SessionController, TurnOutcome, TurnSettings};
use location::{Coordinates, DeclinedLocation, FixedLocation, LocationProvider, NoDeviceLocation};
use session::{Message, Sender};
use settings::{ClientSettings, EffectiveSettings, Timeouts, resolve_effective_settings};

#[derive(Debug, Parser)]
#[command(name = "find-client")]
#[command(about = "Terminal client for the find. shopping assistant", long_about = None)]
struct Cli {
    /// Backend base URL
    #[arg(long, global = true)]
    api_url: Option<String>,
    #[arg(long, global = true)]
    timeout_secs: Option<u64>,
    #[arg(long, global = true)]
    location_timeout_secs: Option<u64>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Args)]
struct Position {
    #[arg(long, requires = "lon", allow_negative_numbers = true)]
    lat: Option<f64>,
    #[arg(long, requires = "lat", allow_negative_numbers = true)]
    lon: Option<f64>,
    /// Do not share a position; the default city is used instead
    #[arg(long, conflicts_with_all = ["lat", "lon"])]
    no_location: bool,
}

impl Position {
    fn provider(&self) -> Arc<dyn LocationProvider> {
        if self.no_location {
            return Arc::new(DeclinedLocation);
        }
        match (self.lat, self.lon) {
            (Some(latitude), Some(longitude)) => {
                Arc::new(FixedLocation(Coordinates { latitude, longitude }))
            }
            _ => Arc::new(NoDeviceLocation),
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Interactive conversation. `/new` starts over, `/quit` exits.
    Chat {
        #[command(flatten)]
        position: Position,
    },
    /// Ask a single question and print the answer.
    Ask {
        query: String,
        #[command(flatten)]
        position: Position,
    },
    Register {
        #[arg(long)]
        username: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        #[arg(long)]
        first_name: String,
        #[arg(long)]
        last_name: String,
        #[arg(long)]
        phone: String,
    },
    /// Log in and show the account profile.
    Profile {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Check that the backend is up.
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = effective_settings(&cli)?;
    match cli.command {
        Commands::Chat { position } => {
            let ctl = build_controller(&settings, position.provider())?;
            let stdin = BufReader::new(tokio::io::stdin());
            run_chat(ctl, stdin).await?;
        }
        Commands::Ask { query, position } => {
            let ctl = build_controller(&settings, position.provider())?;
            match ctl.submit_turn(&query).await {
                TurnOutcome::Ignored => anyhow::bail!("empty query"),
                outcome => print_reply(&ctl, &outcome).await,
            }
        }
        Commands::Register { username, email, password, first_name, last_name, phone } => {
            let client = AccountsClient::new(settings.api_url.clone());
            let account = NewAccount {
                username,
                email,
                password,
                first_name,
                last_name,
                phone_number: phone,
            };
            let account = client.register(&account).await?;
            println!("registered {} (id {})", account.email, account.id);
        }
        Commands::Profile { email, password } => {
            let client = AccountsClient::new(settings.api_url.clone());
            let auth = client.login(&email, &password).await?;
            tracing::debug!(token_type = auth.token_type(), "session opened");
            let me = client.me(&auth).await;
            client.logout(auth);
            let me = me?;
            println!("{} {} <{}>", me.first_name, me.last_name, me.email);
            println!("username: {}", me.username);
            println!("phone:    {}", me.phone_number);
            println!("joined:   {}", me.created_at.format("%Y-%m-%d"));
        }
        Commands::Status => {
            let client = AccountsClient::new(settings.api_url.clone());
            if client.status().await? {
                println!("backend ok at {}", settings.api_url);
            } else {
                anyhow::bail!("backend at {} reported not ok", settings.api_url);
            }
        }
    }
    Ok(())
}

fn effective_settings(cli: &Cli) -> anyhow::Result<EffectiveSettings> {
    let from_cli = ClientSettings {
        api_url: cli.api_url.clone(),
        timeouts: Some(Timeouts {
            request_secs: cli.timeout_secs,
            location_secs: cli.location_timeout_secs,
        }),
        fallback: None,
    };
    let (defaults, env) = (ClientSettings::defaults(), ClientSettings::from_env());
    let eff = resolve_effective_settings(&defaults, &env, &from_cli)?;
    tracing::debug!(api_url = %eff.api_url, "settings resolved");
    Ok(eff)
}

fn build_controller(
    settings: &EffectiveSettings,
    location: Arc<dyn LocationProvider>,
) -> anyhow::Result<SessionController> {
    let endpoint = HttpAssistant::new(&settings.api_url)?;
    Ok(SessionController::new(Arc::new(endpoint), location, TurnSettings::from(settings)))
}

/// Reads turns from `input` until EOF or `/quit`, then waits for any turn
/// still out so its reply is printed before returning.
async fn run_chat<R>(ctl: SessionController, input: R) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    print_welcome(&ctl).await;
    let mut turns = JoinSet::new();
    let mut lines = input.lines();
    while let Some(line) = lines.next_line().await? {
        match line.trim() {
            "/quit" => break,
            "/new" => {
                ctl.reset_session().await;
                print_welcome(&ctl).await;
            }
            _ => {
                // Turns run in the background so input stays live; the
                // controller turns overlapping submissions away.
                let ctl = ctl.clone();
                turns.spawn(async move {
                    let outcome = ctl.submit_turn(&line).await;
                    print_reply(&ctl, &outcome).await;
                });
            }
        }
        while turns.try_join_next().is_some() {}
    }
    if ctl.is_busy().await {
        println!("(aștept ultimul răspuns...)");
    }
    while let Some(joined) = turns.join_next().await {
        if let Err(err) = joined {
            tracing::error!(error = %err, "chat turn task failed");
        }
    }
    Ok(())
}

async fn print_welcome(ctl: &SessionController) {
    for msg in ctl.snapshot().await {
        print_message(&msg);
    }
    let suggestions = ctl.suggestions().await;
    if !suggestions.is_empty() {
        println!("Câteva sugestii:");
        for s in suggestions {
            println!("  \"{s}\"");
        }
    }
}

async fn print_reply(ctl: &SessionController, outcome: &TurnOutcome) {
    match outcome {
        TurnOutcome::Answered { reply_id } | TurnOutcome::Failed { reply_id } => {
            if let Some(msg) = ctl.snapshot().await.iter().find(|m| m.id == *reply_id) {
                print_message(msg);
            }
        }
        TurnOutcome::Busy => println!("(încă aștept răspunsul anterior)"),
        TurnOutcome::Ignored | TurnOutcome::Discarded => {}
    }
}

fn print_message(msg: &Message) {
    let who = match msg.sender {
        Sender::User => "tu",
        Sender::Assistant => "find.",
    };
    println!("{who}> {}", msg.content.rendered());
}
