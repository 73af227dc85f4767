//! Latest page reported by the browser, pushed from outside the tracker.
//!
//! Reports arrive as JSON lines over a local TCP socket (see [FeedListener]). Only the most
//! recent one is kept. The tracker reads it when a focused browser window doesn't expose its
//! own address.

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream, ToSocketAddrs},
    select,
    sync::watch,
};
use futures::StreamExt;
use tokio_util::{
    codec::{FramedRead, LinesCodec},
    sync::CancellationToken,
};
use tracing::{debug, error, info, warn};

use crate::{classification::keys::is_browser, utils::clock::Clock, window_api::ActiveWindowData};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrowserReport {
    pub url: Arc<str>,
    pub title: Option<Arc<str>>,
    pub received_at: DateTime<Utc>,
}

impl BrowserReport {
    fn is_fresh(&self, now: DateTime<Utc>, max_age: Option<Duration>) -> bool {
        max_age.map_or(true, |max_age| now - self.received_at <= max_age)
    }
}

/// Write side of the feed. Cloning it gives another writer to the same feed.
#[derive(Clone)]
pub struct BrowserFeed {
    sender: Arc<watch::Sender<Option<BrowserReport>>>,
}

impl Default for BrowserFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl BrowserFeed {
    pub fn new() -> Self {
        Self {
            sender: Arc::new(watch::Sender::new(None)),
        }
    }

    /// Replaces the last report.
    pub fn push(&self, url: &str, title: Option<&str>, received_at: DateTime<Utc>) {
        debug!("Browser reported {url}");
        self.sender.send_replace(Some(BrowserReport {
            url: url.into(),
            title: title.filter(|v| !v.is_empty()).map(Into::into),
            received_at,
        }));
    }

    pub fn reader(&self) -> FeedReader {
        FeedReader {
            receiver: self.sender.subscribe(),
        }
    }
}

pub struct FeedReader {
    receiver: watch::Receiver<Option<BrowserReport>>,
}

impl FeedReader {
    pub fn latest(&self) -> Option<BrowserReport> {
        self.receiver.borrow().clone()
    }
}

/// Fills in the address of a browser window from the last report. The report's title replaces
/// the window title as well, since the two describe the same page. Reports older than
/// `max_age` are ignored; without `max_age` any report counts while a browser has focus.
pub fn backfill(
    mut window: ActiveWindowData,
    report: Option<&BrowserReport>,
    now: DateTime<Utc>,
    max_age: Option<Duration>,
) -> ActiveWindowData {
    if window.url.as_deref().is_some_and(|v| !v.is_empty()) || !is_browser(&window.app_name) {
        return window;
    }

    let Some(report) = report.filter(|v| v.is_fresh(now, max_age)) else {
        return window;
    };

    window.url = Some(report.url.clone());
    if let Some(title) = &report.title {
        window.title = title.clone();
    }
    window
}

/// One line sent by a reporter.
#[derive(Debug, Serialize, Deserialize)]
pub struct FeedMessage {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
}

/// Answer to every [FeedMessage] line.
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeedReply {
    Accepted { success: bool },
    Rejected { error: String },
}

pub struct FeedListener {
    listener: TcpListener,
    feed: BrowserFeed,
    clock: Arc<dyn Clock>,
    shutdown: CancellationToken,
}

impl FeedListener {
    pub async fn bind(
        address: impl ToSocketAddrs,
        feed: BrowserFeed,
        clock: Arc<dyn Clock>,
        shutdown: CancellationToken,
    ) -> Result<Self> {
        let listener = TcpListener::bind(address)
            .await
            .context("Failed to bind the browser feed")?;
        info!("Browser feed listening on {:?}", listener.local_addr());
        Ok(Self {
            listener,
            feed,
            clock,
            shutdown,
        })
    }

    pub fn local_addr(&self) -> Result<std::net::SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accepts reporters until shutdown. Each connection is served on its own task.
    pub async fn run(self) -> Result<()> {
        loop {
            let (stream, peer) = select! {
                _ = self.shutdown.cancelled() => return Ok(()),
                accepted = self.listener.accept() => match accepted {
                    Ok(v) => v,
                    Err(e) => {
                        error!("Failed to accept a reporter {e:?}");
                        continue;
                    }
                },
            };

            debug!("Reporter connected from {peer}");
            let feed = self.feed.clone();
            let clock = self.clock.clone();
            let shutdown = self.shutdown.clone();
            tokio::spawn(async move {
                select! {
                    _ = shutdown.cancelled() => (),
                    result = serve_reporter(stream, feed, clock) => {
                        if let Err(e) = result {
                            warn!("Reporter {peer} failed {e:?}");
                        }
                    }
                }
            });
        }
    }
}

fn handle_message(line: &str, feed: &BrowserFeed, now: DateTime<Utc>) -> FeedReply {
    let message = match serde_json::from_str::<FeedMessage>(line) {
        Ok(v) => v,
        Err(e) => {
            return FeedReply::Rejected {
                error: format!("Malformed report: {e}"),
            }
        }
    };

    match message.url.as_deref().filter(|v| !v.is_empty()) {
        Some(url) => {
            feed.push(url, message.title.as_deref(), now);
            FeedReply::Accepted { success: true }
        }
        None => FeedReply::Rejected {
            error: "Missing URL".into(),
        },
    }
}

/// Longest report line a reporter may send. Longer lines drop the connection.
const MAX_REPORT_LENGTH: usize = 64 * 1024;

async fn serve_reporter(stream: TcpStream, feed: BrowserFeed, clock: Arc<dyn Clock>) -> Result<()> {
    let (read, mut write) = stream.into_split();
    let mut lines = FramedRead::new(read, LinesCodec::new_with_max_length(MAX_REPORT_LENGTH));
    while let Some(line) = lines.next().await {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let reply = handle_message(&line, &feed, clock.time());
        let mut buffer = serde_json::to_vec(&reply)?;
        buffer.push(b'\n');
        write.write_all(&buffer).await?;
    }
    Ok(())
}

/// Sends a single report to a running daemon and waits for its answer.
pub async fn report_url(address: impl ToSocketAddrs, url: &str, title: Option<&str>) -> Result<()> {
    let stream = TcpStream::connect(address)
        .await
        .context("Failed to reach the daemon. Is it running?")?;
    let (read, mut write) = stream.into_split();

    let message = FeedMessage {
        url: Some(url.into()),
        title: title.map(Into::into),
    };
    let mut buffer = serde_json::to_vec(&message)?;
    buffer.push(b'\n');
    write.write_all(&buffer).await?;

    let reply = BufReader::new(read)
        .lines()
        .next_line()
        .await?
        .ok_or_else(|| anyhow!("Daemon closed the connection without answering"))?;

    match serde_json::from_str(&reply)? {
        FeedReply::Accepted { .. } => Ok(()),
        FeedReply::Rejected { error } => Err(anyhow!("Daemon rejected the report: {error}")),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use anyhow::Result;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use tokio_util::sync::CancellationToken;

    use crate::{
        utils::clock::DefaultClock,
        window_api::ActiveWindowData,
    };

    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::TcpStream,
    };

    use super::{
        backfill, handle_message, report_url, BrowserFeed, FeedListener, FeedReply,
        MAX_REPORT_LENGTH,
    };

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2018, 7, 4, 10, 0, 0).unwrap()
    }

    fn window(app_name: &str, url: Option<&str>) -> ActiveWindowData {
        ActiveWindowData {
            app_name: app_name.into(),
            title: "Google Chrome".into(),
            url: url.map(Into::into),
        }
    }

    #[test]
    fn backfills_browser_without_url() {
        let feed = BrowserFeed::new();
        feed.push("https://github.com/rust-lang", Some("rust-lang - GitHub"), t0());
        let report = feed.reader().latest();

        let window = backfill(window("chrome.exe", None), report.as_ref(), t0(), None);
        assert_eq!(window.url.as_deref(), Some("https://github.com/rust-lang"));
        assert_eq!(&*window.title, "rust-lang - GitHub");
    }

    #[test]
    fn keeps_what_the_observer_knows() {
        let feed = BrowserFeed::new();
        feed.push("https://github.com/rust-lang", None, t0());
        let report = feed.reader().latest();

        let own = backfill(
            window("firefox", Some("https://crates.io/")),
            report.as_ref(),
            t0(),
            None,
        );
        assert_eq!(own.url.as_deref(), Some("https://crates.io/"));

        let editor = backfill(window("Code.exe", None), report.as_ref(), t0(), None);
        assert_eq!(editor.url, None);

        let untitled = backfill(window("chrome.exe", None), report.as_ref(), t0(), None);
        assert_eq!(&*untitled.title, "Google Chrome");
    }

    #[test]
    fn stale_reports_are_ignored_when_bounded() {
        let feed = BrowserFeed::new();
        feed.push("https://github.com/rust-lang", None, t0());
        let report = feed.reader().latest();
        let later = t0() + Duration::seconds(30);

        let bounded = backfill(
            window("chrome.exe", None),
            report.as_ref(),
            later,
            Some(Duration::seconds(10)),
        );
        assert_eq!(bounded.url, None);

        let unbounded = backfill(window("chrome.exe", None), report.as_ref(), later, None);
        assert!(unbounded.url.is_some());
    }

    #[test]
    fn rejects_reports_without_url() {
        let feed = BrowserFeed::new();
        assert_eq!(
            handle_message(r#"{"title": "Nothing"}"#, &feed, t0()),
            FeedReply::Rejected {
                error: "Missing URL".into()
            }
        );
        assert!(matches!(
            handle_message("not json", &feed, t0()),
            FeedReply::Rejected { .. }
        ));
        assert_eq!(feed.reader().latest(), None);
    }

    #[tokio::test]
    async fn test_reports_travel_over_tcp() -> Result<()> {
        let feed = BrowserFeed::new();
        let reader = feed.reader();
        let shutdown = CancellationToken::new();
        let listener = FeedListener::bind(
            "127.0.0.1:0",
            feed,
            Arc::new(DefaultClock),
            shutdown.clone(),
        )
        .await?;
        let address = listener.local_addr()?;

        let (result, _) = tokio::join!(listener.run(), async {
            report_url(address, "https://www.youtube.com/watch?v=1", Some("Video - YouTube"))
                .await
                .unwrap();
            assert!(report_url(address, "", None).await.is_err());
            shutdown.cancel();
        });
        result?;

        let report = reader.latest().unwrap();
        assert_eq!(&*report.url, "https://www.youtube.com/watch?v=1");
        assert_eq!(report.title.as_deref(), Some("Video - YouTube"));
        Ok(())
    }

    #[tokio::test]
    async fn test_endless_line_closes_the_connection() -> Result<()> {
        let feed = BrowserFeed::new();
        let reader = feed.reader();
        let shutdown = CancellationToken::new();
        let listener = FeedListener::bind(
            "127.0.0.1:0",
            feed,
            Arc::new(DefaultClock),
            shutdown.clone(),
        )
        .await?;
        let address = listener.local_addr()?;

        let (result, _) = tokio::join!(listener.run(), async {
            let mut stream = TcpStream::connect(address).await.unwrap();
            // No newline ever arrives
            let line = vec![b'a'; MAX_REPORT_LENGTH + 1];
            stream.write_all(&line).await.unwrap();

            let mut buffer = [0u8; 64];
            let closed = stream.read(&mut buffer).await;
            assert!(matches!(closed, Ok(0) | Err(_)));

            // The listener keeps serving other reporters
            report_url(address, "https://crates.io/", None).await.unwrap();
            shutdown.cancel();
        });
        result?;

        assert_eq!(&*reader.latest().unwrap().url, "https://crates.io/");
        Ok(())
    }
}
