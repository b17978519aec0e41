//! Push-stream lifecycle: one cancellable SSE subscription at a time, and the
//! reconciler that feeds its frames into the dashboard.

use std::{
    fmt,
    pin::Pin,
    task::{Context, Poll},
    time::Duration,
};

use futures::Stream;
use futures_util::StreamExt;
use reqwest::{header, Client};
use tokio::{sync::mpsc, task::JoinHandle, time::sleep};
use tracing::{debug, info, warn};
use url::Url;

use crate::api::ApiError;
use crate::sse::{SseDecoder, SseFrame};
use crate::state::Dashboard;

const SIGNAL_BUFFER: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// What the transport task reports to the consumer loop.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamSignal {
    /// Server accepted the subscription; frames follow.
    Opened,
    Frame(SseFrame),
    /// Transport failure or end of stream; the transport retries by itself.
    Error(String),
}

/// A live subscription. Yields signals until closed; dropping it closes it.
pub struct Subscription {
    rx: mpsc::Receiver<StreamSignal>,
    // None when fed from a caller-owned channel
    task: Option<JoinHandle<()>>,
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("finished", &self.task.as_ref().map(JoinHandle::is_finished))
            .finish()
    }
}

impl Subscription {
    /// Open `url` as an event stream in a background task, reconnecting after
    /// `retry` (or the server's `retry:` hint) whenever the transport fails.
    pub fn open(http: Client, url: Url, retry: Duration) -> Self {
        let (tx, rx) = mpsc::channel(SIGNAL_BUFFER);
        let task = tokio::spawn(run_transport(http, url, retry, tx));
        Self {
            rx,
            task: Some(task),
        }
    }

    /// Wrap an existing signal source; used to drive the reconciler without
    /// a server. Needs no runtime.
    pub fn from_channel(rx: mpsc::Receiver<StreamSignal>) -> Self {
        Self { rx, task: None }
    }

    pub async fn recv(&mut self) -> Option<StreamSignal> {
        self.rx.recv().await
    }

    /// Release the connection. Further signals are discarded.
    pub fn close(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(task) = &self.task {
            task.abort();
        }
        self.rx.close();
    }
}

impl Stream for Subscription {
    type Item = StreamSignal;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<StreamSignal>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn open_stream(http: &Client, url: &Url) -> Result<reqwest::Response, ApiError> {
    let resp = http
        .get(url.clone())
        .header(header::ACCEPT, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .send()
        .await?;
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(ApiError::Status { status, body });
    }
    Ok(resp)
}

async fn run_transport(
    http: Client,
    url: Url,
    default_retry: Duration,
    tx: mpsc::Sender<StreamSignal>,
) {
    let mut retry = default_retry;
    loop {
        match open_stream(&http, &url).await {
            Ok(resp) => {
                if tx.send(StreamSignal::Opened).await.is_err() {
                    return;
                }
                let mut decoder = SseDecoder::new();
                let mut body = resp.bytes_stream();
                let reason = loop {
                    match body.next().await {
                        Some(Ok(chunk)) => {
                            for frame in decoder.feed(&chunk) {
                                if tx.send(StreamSignal::Frame(frame)).await.is_err() {
                                    return;
                                }
                            }
                            if let Some(r) = decoder.retry() {
                                retry = r;
                            }
                        }
                        Some(Err(e)) => break format!("stream read failed: {e}"),
                        None => break "stream closed by server".to_string(),
                    }
                };
                if tx.send(StreamSignal::Error(reason)).await.is_err() {
                    return;
                }
            }
            Err(e) => {
                if tx.send(StreamSignal::Error(e.to_string())).await.is_err() {
                    return;
                }
            }
        }
        sleep(retry).await;
        debug!(%url, "reconnecting event stream");
    }
}

/// Owns the stream connection and applies whatever it delivers.
#[derive(Debug)]
pub struct Reconciler {
    http: Client,
    url: Url,
    retry: Duration,
    state: ConnectionState,
    subscription: Option<Subscription>,
    // an open acknowledgment has been seen at least once
    opened_before: bool,
}

impl Reconciler {
    pub fn new(http: Client, url: Url, retry: Duration) -> Self {
        Self {
            http,
            url,
            retry,
            state: ConnectionState::Disconnected,
            subscription: None,
            opened_before: false,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Open the subscription unless one is already live.
    pub fn connect(&mut self) {
        if self.subscription.is_some() {
            debug!("event stream already open");
            return;
        }
        let sub = Subscription::open(self.http.clone(), self.url.clone(), self.retry);
        self.attach(sub);
    }

    /// Use a caller-provided subscription instead of opening one.
    pub fn attach(&mut self, sub: Subscription) {
        if let Some(old) = self.subscription.replace(sub) {
            old.close();
        }
        self.state = ConnectionState::Connecting;
        info!(url = %self.url, "event stream connecting");
    }

    pub fn disconnect(&mut self) {
        if let Some(sub) = self.subscription.take() {
            sub.close();
            info!("event stream closed");
        }
        self.state = ConnectionState::Disconnected;
    }

    /// Next signal from the live subscription. Pending forever while
    /// disconnected, so it can sit in a `select!` unconditionally.
    pub async fn next_signal(&mut self) -> Option<StreamSignal> {
        match self.subscription.as_mut() {
            Some(sub) => sub.recv().await,
            None => std::future::pending().await,
        }
    }

    /// Apply one signal. Returns true when the stream opened again after an
    /// earlier open: events may have been missed in between, so the caller
    /// should rebuild its state from the server.
    pub fn handle(&mut self, signal: StreamSignal, dash: &mut Dashboard) -> bool {
        match signal {
            StreamSignal::Opened => {
                self.state = ConnectionState::Connected;
                info!(url = %self.url, "event stream connected");
                return std::mem::replace(&mut self.opened_before, true);
            }
            StreamSignal::Frame(frame) => {
                if self.state != ConnectionState::Connected {
                    debug!(event = %frame.event, "frame before open acknowledgment");
                }
                dash.apply_frame(&frame);
            }
            StreamSignal::Error(reason) => {
                warn!("event stream error: {reason}");
                if self.subscription.is_some() {
                    self.state = ConnectionState::Connecting;
                }
            }
        }
        false
    }

    /// The transport task ended (channel drained); forget the subscription.
    pub fn handle_end(&mut self) {
        if self.subscription.take().is_some() {
            warn!("event stream ended");
        }
        self.state = ConnectionState::Disconnected;
    }
}

impl Drop for Reconciler {
    fn drop(&mut self) {
        self.disconnect();
    }
}
