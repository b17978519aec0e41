//! Entry point for the svcwatch client. Parses args, resolves the connection
//! profile and runs the App with commands read from stdin.

use anyhow::{bail, Context};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use svcwatch::api::{build_http_client, normalize_base, ApiClient};
use svcwatch::app::{App, Command};
use svcwatch::config::{
    load_config, save_config, upsert_profile, ProfileChange, ProfileEntry, ProfileRequest,
    ResolveProfile, DEFAULT_BASE_URL,
};

#[derive(Parser, Debug)]
#[command(name = "svcwatch")]
#[command(about = "Watch services: live status stream, pinned charts, watchlist control")]
struct Args {
    /// Server API base URL (e.g. http://127.0.0.1:8080/v1/)
    url: Option<String>,

    /// Extra CA certificate (PEM) to trust for https servers
    #[arg(short = 't', long = "tls-ca")]
    tls_ca: Option<String>,

    /// Named connection profile to load or create
    #[arg(short = 'P', long)]
    profile: Option<String>,

    /// Overwrite an existing profile whose settings differ
    #[arg(long)]
    save: bool,

    /// Points kept per chart series
    #[arg(long)]
    max_points: Option<usize>,

    /// Lookback window for metrics queries (e.g. "24h", "30m")
    #[arg(long)]
    since: Option<String>,

    /// Seconds between watchlist refreshes
    #[arg(long)]
    refresh_secs: Option<u64>,

    /// Resolve (and persist) the profile, print the target and exit
    #[arg(long)]
    dry_run: bool,
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging();

    let mut cfg = load_config();
    let req = ProfileRequest {
        profile_name: args.profile.clone(),
        url: args.url.clone(),
        tls_ca: args.tls_ca.clone(),
    };
    let (url, tls_ca) = match req.resolve(&cfg) {
        ResolveProfile::Direct(u, t) => {
            if let Some(name) = args.profile.as_deref() {
                let entry = ProfileEntry {
                    url: u.clone(),
                    tls_ca: t.clone(),
                };
                match upsert_profile(&mut cfg, name, entry, args.save) {
                    ProfileChange::Created | ProfileChange::Updated => {
                        if let Err(e) = save_config(&cfg) {
                            warn!("could not save profile '{name}': {e}");
                        }
                    }
                    ProfileChange::Kept => warn!(
                        profile = name,
                        "differs from saved settings; pass --save to overwrite"
                    ),
                    ProfileChange::Unchanged => {}
                }
            }
            (u, t)
        }
        ResolveProfile::Loaded(u, t) => (u, t),
        ResolveProfile::Unknown(name) => {
            bail!("profile '{name}' does not exist; pass a URL to create it")
        }
        ResolveProfile::None => (DEFAULT_BASE_URL.to_string(), args.tls_ca.clone()),
    };

    let mut tunables = cfg.tunables.clone();
    if let Some(n) = args.max_points {
        tunables.max_points = n;
    }
    if let Some(s) = args.since {
        tunables.lookback = s;
    }
    if let Some(r) = args.refresh_secs {
        tunables.refresh_interval_secs = r;
    }

    let base = normalize_base(&url)?;
    if args.dry_run {
        println!("{base}");
        return Ok(());
    }

    let http = build_http_client(tls_ca.as_deref()).context("building http client")?;
    let api = ApiClient::new(http, base);
    let mut app = App::new(api, tunables)?;

    let (tx, rx) = mpsc::channel::<Command>(32);
    spawn_stdin_reader(tx.clone());
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = tx.send(Command::Quit).await;
        }
    });

    info!(url = %url, "starting");
    app.run(rx).await;
    Ok(())
}

fn spawn_stdin_reader(tx: mpsc::Sender<Command>) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            match line.parse::<Command>() {
                Ok(cmd) => {
                    if tx.send(cmd).await.is_err() {
                        break;
                    }
                }
                Err(msg) => eprintln!("{msg}"),
            }
        }
    });
}
