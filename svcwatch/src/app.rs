//! App state and main loop: stream signals, user commands, background
//! request results and the refresh timer, applied one at a time.

use std::str::FromStr;

use tokio::{
    sync::mpsc,
    time::{interval_at, Instant, Interval, MissedTickBehavior},
};
use tracing::{debug, info, warn};

use crate::api::{ApiClient, ApiError};
use crate::config::Tunables;
use crate::state::Dashboard;
use crate::stream::{ConnectionState, Reconciler};
use crate::types::{MetricsEntry, MetricsQuery, ServiceAction, WatchlistItem};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Pin(String),
    Unpin(String),
    Toggle(String),
    Add(String),
    Remove(String),
    AutoRestart(String, bool),
    Control(String, ServiceAction),
    Refresh,
    Status,
    Logs(Option<String>),
    Quit,
}

pub const USAGE: &str = "commands: pin|unpin|toggle NAME, add|remove NAME, \
autorestart on|off NAME, start|stop|restart NAME, refresh, status, logs [NAME], quit";

impl FromStr for Command {
    type Err = String;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let (verb, rest) = match line.split_once(char::is_whitespace) {
            Some((v, r)) => (v, r.trim()),
            None => (line, ""),
        };
        let name = || {
            if rest.is_empty() {
                Err(format!("'{verb}' needs a service name"))
            } else {
                Ok(rest.to_string())
            }
        };
        let cmd = match verb.to_ascii_lowercase().as_str() {
            "pin" => Command::Pin(name()?),
            "unpin" => Command::Unpin(name()?),
            "toggle" => Command::Toggle(name()?),
            "add" => Command::Add(name()?),
            "remove" | "rm" => Command::Remove(name()?),
            "start" => Command::Control(name()?, ServiceAction::Start),
            "stop" => Command::Control(name()?, ServiceAction::Stop),
            "restart" => Command::Control(name()?, ServiceAction::Restart),
            "autorestart" => {
                let (flag, svc) = rest
                    .split_once(char::is_whitespace)
                    .ok_or_else(|| "usage: autorestart on|off NAME".to_string())?;
                let on = match flag {
                    "on" | "true" | "yes" => true,
                    "off" | "false" | "no" => false,
                    _ => return Err(format!("expected on|off, got '{flag}'")),
                };
                Command::AutoRestart(svc.trim().to_string(), on)
            }
            "refresh" => Command::Refresh,
            "status" | "" => Command::Status,
            "logs" => Command::Logs((!rest.is_empty()).then(|| rest.to_string())),
            "quit" | "exit" | "q" => Command::Quit,
            other => return Err(format!("unknown command '{other}'. {USAGE}")),
        };
        Ok(cmd)
    }
}

/// Results of requests that ran off the loop.
#[derive(Debug)]
enum Completion {
    Watchlist {
        generation: u64,
        result: Result<Vec<WatchlistItem>, ApiError>,
    },
    // a mutation finished; the watchlist should be refetched
    Mutated,
    FailedCount(u64),
    Logs(Vec<MetricsEntry>),
}

pub struct App {
    dash: Dashboard,
    api: ApiClient,
    reconciler: Reconciler,
    done_tx: mpsc::UnboundedSender<Completion>,
    done_rx: mpsc::UnboundedReceiver<Completion>,
    // monotonic request counter for watchlist snapshots
    next_generation: u64,
    // periodic refresh, armed by `start`
    ticker: Option<Interval>,
}

impl App {
    pub fn new(api: ApiClient, tunables: Tunables) -> Result<Self, ApiError> {
        let events_url = api.endpoint(&["events"])?;
        let reconciler =
            Reconciler::new(api.http().clone(), events_url, tunables.reconnect_delay());
        Ok(Self::with_reconciler(api, reconciler, tunables))
    }

    pub fn with_reconciler(api: ApiClient, reconciler: Reconciler, tunables: Tunables) -> Self {
        let (done_tx, done_rx) = mpsc::unbounded_channel();
        Self {
            dash: Dashboard::new(tunables),
            api,
            reconciler,
            done_tx,
            done_rx,
            next_generation: 0,
            ticker: None,
        }
    }

    pub fn dashboard(&self) -> &Dashboard {
        &self.dash
    }

    pub fn connection(&self) -> ConnectionState {
        self.reconciler.state()
    }

    /// Run until `Quit` or the command channel closes. The stream is
    /// released before returning.
    pub async fn run(&mut self, mut commands: mpsc::Receiver<Command>) {
        self.start();
        while self.step(&mut commands).await {}
        self.teardown();
    }

    /// Open the stream, fetch the first snapshot and arm the refresh timer.
    pub fn start(&mut self) {
        self.reconciler.connect();
        self.refresh();

        let period = self.dash.tunables().refresh_interval();
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.ticker = Some(ticker);
    }

    /// Wait for the next stream signal, command, request result or tick and
    /// apply it. Returns false once `Quit` arrives or the commands close.
    pub async fn step(&mut self, commands: &mut mpsc::Receiver<Command>) -> bool {
        tokio::select! {
            signal = self.reconciler.next_signal() => match signal {
                Some(s) => {
                    if self.reconciler.handle(s, &mut self.dash) {
                        info!("event stream reopened; refetching watchlist");
                        self.refresh();
                    }
                }
                None => self.reconciler.handle_end(),
            },
            cmd = commands.recv() => match cmd {
                Some(Command::Quit) | None => return false,
                Some(c) => self.execute(c),
            },
            Some(done) = self.done_rx.recv() => self.complete(done),
            _ = tick(&mut self.ticker) => {
                debug!("periodic refresh");
                self.refresh();
            }
        }
        true
    }

    pub fn teardown(&mut self) {
        self.reconciler.disconnect();
        info!("dashboard stopped");
    }

    pub fn execute(&mut self, cmd: Command) {
        match cmd {
            Command::Pin(name) => {
                self.dash.pin(&name);
            }
            Command::Unpin(name) => {
                self.dash.unpin(&name);
            }
            Command::Toggle(name) => {
                self.dash.toggle_pin(&name);
            }
            Command::Add(name) => self.mutate(move |api| async move {
                api.add_to_watchlist(&name).await
            }),
            Command::Remove(name) => self.mutate(move |api| async move {
                api.remove_from_watchlist(&name).await
            }),
            Command::AutoRestart(name, on) => self.mutate(move |api| async move {
                api.set_auto_restart(&name, on).await
            }),
            Command::Control(name, action) => {
                let api = self.api.clone();
                let tx = self.done_tx.clone();
                tokio::spawn(async move {
                    if api.control(&name, action).await {
                        let _ = tx.send(Completion::Mutated);
                    }
                });
            }
            Command::Refresh => self.refresh(),
            Command::Status => println!("{}", render_status(&self.dash, self.reconciler.state())),
            Command::Logs(service) => {
                let api = self.api.clone();
                let tx = self.done_tx.clone();
                let mut q = MetricsQuery::default()
                    .since(&self.dash.tunables().lookback)
                    .limit(20);
                if let Some(s) = service {
                    q = q.service(&s);
                }
                tokio::spawn(async move {
                    let _ = tx.send(Completion::Logs(api.service_logs(&q).await));
                });
            }
            Command::Quit => {}
        }
    }

    fn mutate<F, Fut>(&self, op: F)
    where
        F: FnOnce(ApiClient) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = Result<(), ApiError>> + Send + 'static,
    {
        let api = self.api.clone();
        let tx = self.done_tx.clone();
        tokio::spawn(async move {
            match op(api).await {
                Ok(()) => {
                    let _ = tx.send(Completion::Mutated);
                }
                Err(e) => warn!("watchlist update failed: {e}"),
            }
        });
    }

    /// Refetch the watchlist and the failure count in the background.
    pub fn refresh(&mut self) {
        self.next_generation += 1;
        let generation = self.next_generation;
        let api = self.api.clone();
        let tx = self.done_tx.clone();
        let since = self.dash.tunables().lookback.clone();
        tokio::spawn(async move {
            let result = api.fetch_watchlist().await;
            let _ = tx.send(Completion::Watchlist { generation, result });
            let failed = api.service_failed_count(&since).await;
            let _ = tx.send(Completion::FailedCount(failed));
        });
    }

    fn complete(&mut self, done: Completion) {
        match done {
            Completion::Watchlist { generation, result } => match result {
                Ok(items) => {
                    if self.dash.apply_watchlist_snapshot(generation, items) {
                        debug!(generation, "watchlist applied");
                    }
                }
                Err(e) => warn!("failed to fetch watchlist: {e}"),
            },
            Completion::Mutated => self.refresh(),
            Completion::FailedCount(n) => self.dash.set_failed_recent(n),
            Completion::Logs(entries) => {
                for e in &entries {
                    println!(
                        "{} {:<5} {:<24} {}",
                        e.time.as_deref().unwrap_or("-"),
                        e.level.as_deref().unwrap_or("-"),
                        e.event.as_deref().unwrap_or("-"),
                        e.data
                    );
                }
                if entries.is_empty() {
                    println!("(no log entries)");
                }
            }
        }
    }
}

async fn tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(t) => {
            t.tick().await;
        }
        None => std::future::pending().await,
    }
}

/// Plain-text summary of the dashboard.
pub fn render_status(dash: &Dashboard, conn: ConnectionState) -> String {
    let wl = dash.watchlist();
    let mut out = format!(
        "stream: {conn:?} | watched: {} running: {} stopped: {}",
        wl.len(),
        wl.num_running(),
        wl.num_stopped()
    );
    if let Some(n) = dash.failed_recent() {
        out.push_str(&format!(" | failed ({}): {n}", dash.tunables().lookback));
    }
    if let Some(h) = dash.host() {
        out.push_str(&format!(
            "\nhost: cpu {:.1}% mem {:.1}%",
            h.cpu_percent, h.used_percent
        ));
    }
    for item in wl.items() {
        let pin = if dash.is_pinned(&item.service_name) { "*" } else { " " };
        match &item.service {
            Some(s) => out.push_str(&format!(
                "\n{pin} {:<32} {:<9} cpu {:>5.1}% mem {:>8.1}MB up {}s",
                item.service_name,
                s.state.as_str(),
                s.cpu_percent,
                s.memory_mb,
                s.uptime_seconds
            )),
            None => out.push_str(&format!("\n{pin} {:<32} (no status)", item.service_name)),
        }
    }
    for name in dash.pins().names() {
        if let Some((_, cpu, mem)) = dash.series(name).and_then(|s| s.latest()) {
            let len = dash.series(name).map(|s| s.len()).unwrap_or(0);
            out.push_str(&format!(
                "\nchart {name}: {len} pts, last cpu {cpu:.1}% mem {mem:.1}%"
            ));
        }
    }
    for alert in dash.alerts().take(5) {
        out.push_str(&format!(
            "\nalert {} {}{}",
            alert.kind.event_name(),
            alert.payload.service_name,
            alert
                .payload
                .message
                .as_deref()
                .map(|m| format!(": {m}"))
                .unwrap_or_default()
        ));
    }
    out
}
