//! Follows a running gateway's change stream and republishes each event on a
//! local [`ChangeFeed`], so synchronizers outside the gateway process refresh
//! on pushes too.

use std::time::Duration;

use anyhow::Result;
use reqwest::Client;
use reqwest::header::ACCEPT;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::feed::{ChangeEvent, ChangeFeed};
use crate::utils::http::streaming_http_client;
use crate::utils::trim_base_url;

/// Gateway route serving accepted change events as Server-Sent Events.
pub const CHANGES_STREAM_PATH: &str = "/api/changes/stream";
/// SSE event name carrying one change payload.
pub const CHANGE_STREAM_EVENT: &str = "change";
/// SSE event name sent when the gateway dropped events for a slow follower.
pub const LAGGED_STREAM_EVENT: &str = "lagged";

const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Background subscription to a gateway's change stream. Reconnects until
/// dropped.
pub struct ChangeRelay {
    url: String,
    handle: JoinHandle<()>,
}

impl ChangeRelay {
    pub fn spawn(gateway_url: &str, feed: ChangeFeed) -> Self {
        let url = format!("{}{}", trim_base_url(gateway_url), CHANGES_STREAM_PATH);
        let handle = tokio::spawn(run(streaming_http_client(), url.clone(), feed));
        Self { url, handle }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Drop for ChangeRelay {
    fn drop(&mut self) {
        self.handle.abort();
        debug!("stopped following change stream at {}", self.url);
    }
}

async fn run(client: Client, url: String, feed: ChangeFeed) {
    let mut warned = false;
    loop {
        match follow(&client, &url, &feed).await {
            Ok(()) => debug!("change stream at {} ended, reconnecting", url),
            Err(e) if !warned => {
                warn!(
                    "change stream at {} unavailable ({}), conversations refresh on the interval only",
                    url, e
                );
                warned = true;
            }
            Err(e) => debug!("change stream at {} still unavailable: {}", url, e),
        }
        tokio::time::sleep(RECONNECT_DELAY).await;
    }
}

async fn follow(client: &Client, url: &str, feed: &ChangeFeed) -> Result<()> {
    let mut resp = client
        .get(url)
        .header(ACCEPT, "text/event-stream")
        .send()
        .await?
        .error_for_status()?;
    info!("following change stream at {}", url);

    let mut buffer = Vec::new();
    while let Some(chunk) = resp.chunk().await? {
        buffer.extend_from_slice(&chunk);
        while let Some(frame) = take_frame(&mut buffer) {
            if let Some(frame) = parse_frame(&frame) {
                relay_frame(&frame, feed);
            }
        }
    }
    Ok(())
}

/// One decoded Server-Sent Event.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct StreamFrame {
    pub event: Option<String>,
    pub data: String,
}

/// Split the first complete (blank-line terminated) frame off `buffer`.
pub(crate) fn take_frame(buffer: &mut Vec<u8>) -> Option<String> {
    let end = buffer.windows(2).position(|w| w == b"\n\n")?;
    let frame: Vec<u8> = buffer.drain(..end + 2).collect();
    Some(String::from_utf8_lossy(&frame[..end]).into_owned())
}

/// Decode `event:`/`data:` lines. Comment-only frames (keep-alives) yield
/// `None`.
pub(crate) fn parse_frame(frame: &str) -> Option<StreamFrame> {
    let mut event = None;
    let mut data: Option<String> = None;
    for line in frame.lines() {
        let (field, value) = line.split_once(':').unwrap_or((line, ""));
        let value = value.strip_prefix(' ').unwrap_or(value);
        match field {
            "event" => event = Some(value.to_string()),
            "data" => match &mut data {
                Some(existing) => {
                    existing.push('\n');
                    existing.push_str(value);
                }
                None => data = Some(value.to_string()),
            },
            _ => {}
        }
    }
    data.map(|data| StreamFrame { event, data })
}

fn relay_frame(frame: &StreamFrame, feed: &ChangeFeed) {
    match frame.event.as_deref() {
        None | Some(CHANGE_STREAM_EVENT) => match ChangeEvent::parse(frame.data.as_bytes()) {
            Ok(event) => {
                let delivered = feed.publish(event);
                debug!("relayed change to {} subscribers", delivered);
            }
            Err(e) => debug!("ignoring malformed change frame: {}", e),
        },
        Some(LAGGED_STREAM_EVENT) => {
            warn!(
                "gateway dropped {} change events for this follower; polling will catch up",
                frame.data
            );
        }
        Some(other) => debug!("ignoring change stream event {}", other),
    }
}
