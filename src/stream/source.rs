// Firehose source — a websocket connection that yields raw JSON frames.
//
// The intake producer only needs "give me the next frame". Keeping that
// behind a trait lets tests replay canned frames without a socket.

use std::collections::VecDeque;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info};

/// Default Jetstream endpoint, subscribed to posts, reposts and likes.
pub const DEFAULT_JETSTREAM_URL: &str = "wss://jetstream2.us-east.bsky.network/subscribe?wantedCollections=app.bsky.feed.post&wantedCollections=app.bsky.feed.repost&wantedCollections=app.bsky.feed.like";

/// Anything that produces firehose frames one at a time.
#[async_trait]
pub trait FrameSource: Send {
    /// The next text frame. `None` means the stream ended; `Some(Err(_))`
    /// is a read failure the caller may tolerate.
    async fn next_frame(&mut self) -> Option<Result<String>>;
}

/// Jetstream over a websocket.
pub struct JetstreamSource {
    socket: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl JetstreamSource {
    pub async fn connect(url: &str) -> Result<Self> {
        info!(url = url, "Connecting to firehose");
        let (socket, _) = connect_async(url)
            .await
            .with_context(|| format!("Failed to connect to firehose at {url}"))?;
        Ok(Self { socket })
    }
}

#[async_trait]
impl FrameSource for JetstreamSource {
    async fn next_frame(&mut self) -> Option<Result<String>> {
        loop {
            let message = match self.socket.next().await? {
                Ok(message) => message,
                Err(e) => return Some(Err(anyhow::Error::new(e).context("Websocket read failed"))),
            };

            match message {
                Message::Text(text) => return Some(Ok(text)),
                Message::Binary(data) => {
                    return Some(
                        String::from_utf8(data).context("Binary firehose frame is not UTF-8"),
                    )
                }
                Message::Ping(data) => {
                    if let Err(e) = self.socket.send(Message::Pong(data)).await {
                        return Some(Err(anyhow::Error::new(e).context("Failed to answer ping")));
                    }
                }
                Message::Close(frame) => {
                    info!(frame = ?frame, "Firehose closed the connection");
                    return None;
                }
                other => debug!(message = ?other, "Ignoring websocket control frame"),
            }
        }
    }
}

/// A fixed sequence of frames, for replaying captured traffic.
#[derive(Default)]
pub struct ReplaySource {
    frames: VecDeque<Result<String>>,
}

impl ReplaySource {
    pub fn new(frames: impl IntoIterator<Item = Result<String>>) -> Self {
        Self {
            frames: frames.into_iter().collect(),
        }
    }
}

#[async_trait]
impl FrameSource for ReplaySource {
    async fn next_frame(&mut self) -> Option<Result<String>> {
        self.frames.pop_front()
    }
}
