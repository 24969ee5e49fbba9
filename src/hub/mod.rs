//! Streaming hub: fans change feeds out to WebSocket/SSE subscribers.
//!
//! The hub sits between the storage change feeds and any number of
//! subscriber connections. Each subscriber declares a feed scope, a start
//! cursor and a delivery filter; the hub replays history where the cursor
//! asks for it, then follows the live tail, with no duplicates and no gaps
//! at the boundary.
//!
//! ```text
//! storage feed ──► forwarder task ──► bounded channel ──► WS / SSE writer
//!                  (one per subscriber, replay + live + filter)
//! ```
//!
//! Backpressure is drop-on-full per subscriber: a slow consumer loses
//! messages but never stalls producers or other subscribers. The
//! subscriber registry is the only process-wide mutable state and is
//! guarded by a mutex; everything else is task-local.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;

use crate::domain::FlowEvent;
use crate::storage::{FeedKey, FeedMessage, Storage, StorageResult};

/// Default per-subscriber delivery buffer.
pub const DEFAULT_SUBSCRIBER_BUFFER: usize = 100;

/// Where a subscription starts reading its feed.
///
/// This is a first-class case split, not a sentinel string: `$` is "only
/// messages appended strictly after the subscriber is registered", `0` is
/// the earliest available message, anything else is an opaque feed message
/// id to resume after.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamCursor {
    /// Live tail only; no history.
    NewOnly,
    /// Everything the feed still holds.
    Earliest,
    /// Messages with id strictly greater than the given one.
    After(u64),
}

impl StreamCursor {
    /// Parse a wire cursor (`streamMessageStartId`).
    pub fn parse(raw: &str) -> Result<Self, String> {
        match raw {
            "$" => Ok(Self::NewOnly),
            "" | "0" => Ok(Self::Earliest),
            other => other
                .parse::<u64>()
                .map(Self::After)
                .map_err(|_| format!("Invalid stream cursor: {other}")),
        }
    }

    /// Replay floor for history-reading cursors; `None` for [`Self::NewOnly`].
    fn replay_after(self) -> Option<u64> {
        match self {
            Self::NewOnly => None,
            Self::Earliest => Some(0),
            Self::After(id) => Some(id),
        }
    }
}

/// Per-message filter a subscriber registers with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionFilter {
    /// Deliver every message on the feed.
    All,
    /// Deliver only flow events whose `parentId` has been subscribed via
    /// [`Subscription::add_parent`]. Starts empty.
    Parents,
}

/// Internal delivery state. Watermarks guard the replay/live boundary so a
/// message straddling registration is delivered exactly once.
#[derive(Debug)]
enum DeliveryFilter {
    All { delivered_up_to: u64 },
    Parents { watermarks: HashMap<String, u64> },
}

impl DeliveryFilter {
    fn wants(&self, message: &FeedMessage) -> bool {
        match self {
            Self::All { delivered_up_to } => message.id > *delivered_up_to,
            Self::Parents { watermarks } => message
                .payload
                .parent_id()
                .and_then(|p| watermarks.get(p))
                .is_some_and(|wm| message.id > *wm),
        }
    }

    fn advance(&mut self, message: &FeedMessage) {
        match self {
            Self::All { delivered_up_to } => *delivered_up_to = message.id,
            Self::Parents { watermarks } => {
                if let Some(parent) = message.payload.parent_id() {
                    watermarks.insert(parent.to_string(), message.id);
                }
            }
        }
    }
}

#[derive(Debug)]
enum Command {
    AddParent {
        parent_id: String,
        cursor: StreamCursor,
    },
}

/// A live subscription handed to a connection handler.
///
/// Dropping the subscription cancels the forwarder and releases the feed
/// attachment.
#[derive(Debug)]
pub struct Subscription {
    receiver: mpsc::Receiver<FeedMessage>,
    commands: mpsc::UnboundedSender<Command>,
    cancel: CancellationToken,
}

impl Subscription {
    /// Next delivered message; `None` once the subscription is torn down.
    pub async fn recv(&mut self) -> Option<FeedMessage> {
        self.receiver.recv().await
    }

    /// Extend a [`SubscriptionFilter::Parents`] filter with another
    /// sub-stream: replays that parent's history per the cursor, then
    /// continues live.
    pub fn add_parent(&self, parent_id: &str, cursor: StreamCursor) {
        let _ = self.commands.send(Command::AddParent {
            parent_id: parent_id.to_string(),
            cursor,
        });
    }

    /// Tear the subscription down. Also happens on drop.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Process-wide feed multiplexer.
#[derive(Clone)]
pub struct StreamingHub {
    storage: Arc<dyn Storage>,
    buffer: usize,
    registry: Arc<Mutex<HashMap<String, usize>>>,
}

impl std::fmt::Debug for StreamingHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingHub")
            .field("buffer", &self.buffer)
            .field("active_feeds", &self.registry.lock().len())
            .finish()
    }
}

impl StreamingHub {
    #[must_use]
    pub fn new(storage: Arc<dyn Storage>, buffer: usize) -> Self {
        Self {
            storage,
            buffer,
            registry: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Register a subscriber on a feed.
    ///
    /// The live channel is attached *before* any history is read, so no
    /// message straddling registration is dropped; the replay/live boundary
    /// is deduplicated by feed id. Delivery is in feed order; a full buffer
    /// drops the message for this subscriber only.
    #[must_use]
    pub fn subscribe(
        &self,
        key: FeedKey,
        cursor: StreamCursor,
        filter: SubscriptionFilter,
    ) -> Subscription {
        // Attach to the live tail first; anything appended from here on is
        // either in this receiver or in the history snapshot read below.
        let live = self.storage.subscribe_feed(&key);

        let (tx, receiver) = mpsc::channel(self.buffer);
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        {
            let mut registry = self.registry.lock();
            *registry.entry(key.to_string()).or_insert(0) += 1;
        }

        let forwarder = Forwarder {
            key,
            cursor,
            storage: Arc::clone(&self.storage),
            filter: match filter {
                SubscriptionFilter::All => DeliveryFilter::All { delivered_up_to: 0 },
                SubscriptionFilter::Parents => DeliveryFilter::Parents {
                    watermarks: HashMap::new(),
                },
            },
            tx,
            commands: commands_rx,
            live,
            cancel: cancel.clone(),
            registry: Arc::clone(&self.registry),
        };
        tokio::spawn(forwarder.run());

        Subscription {
            receiver,
            commands: commands_tx,
            cancel,
        }
    }

    /// Append the terminal marker for one sub-stream of a flow's event
    /// feed. Subscribers observe it as a normal event and treat the
    /// sub-stream as closed.
    pub async fn end_stream(
        &self,
        workspace_id: &str,
        flow_id: &str,
        parent_id: &str,
    ) -> StorageResult<u64> {
        self.storage
            .append_flow_event(
                workspace_id,
                flow_id,
                FlowEvent::EndStream {
                    parent_id: parent_id.to_string(),
                },
            )
            .await
    }

    /// Number of feeds with at least one live subscriber.
    #[must_use]
    pub fn active_feeds(&self) -> usize {
        self.registry.lock().len()
    }

    /// Live subscribers on one feed.
    #[must_use]
    pub fn subscriber_count(&self, key: &FeedKey) -> usize {
        self.registry.lock().get(&key.to_string()).copied().unwrap_or(0)
    }
}

/// Per-subscriber delivery task.
struct Forwarder {
    key: FeedKey,
    cursor: StreamCursor,
    storage: Arc<dyn Storage>,
    filter: DeliveryFilter,
    tx: mpsc::Sender<FeedMessage>,
    commands: mpsc::UnboundedReceiver<Command>,
    live: broadcast::Receiver<FeedMessage>,
    cancel: CancellationToken,
    registry: Arc<Mutex<HashMap<String, usize>>>,
}

impl Forwarder {
    async fn run(mut self) {
        if let Err(error) = self.replay_initial().await {
            tracing::warn!(feed = %self.key, %error, "feed replay failed, continuing live");
        }

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => break,
                command = self.commands.recv() => match command {
                    Some(Command::AddParent { parent_id, cursor }) => {
                        if let Err(error) = self.add_parent(&parent_id, cursor).await {
                            tracing::warn!(
                                feed = %self.key,
                                %parent_id,
                                %error,
                                "parent replay failed"
                            );
                        }
                    }
                    None => break,
                },
                message = self.live.recv() => match message {
                    Ok(message) => {
                        if !self.forward(message) {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(feed = %self.key, skipped, "subscriber lagged behind feed");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }

        self.detach();
    }

    /// Replay history for the start cursor. `NewOnly` delivers nothing.
    /// Replay sends block this forwarder only; the source is the feed log,
    /// so nothing upstream stalls.
    async fn replay_initial(&mut self) -> StorageResult<()> {
        let Some(after) = self.cursor.replay_after() else {
            return Ok(());
        };
        if matches!(self.filter, DeliveryFilter::Parents { .. }) {
            // Parent-filtered feeds replay per parent, on add_parent.
            return Ok(());
        }
        let history = self.storage.read_feed(&self.key, after).await?;
        for message in history {
            if self.filter.wants(&message) {
                self.filter.advance(&message);
                if self.tx.send(message).await.is_err() {
                    self.cancel.cancel();
                    break;
                }
            }
        }
        Ok(())
    }

    /// Extend the parent filter: replay that parent's history up to now,
    /// then let the live path take over (the watermark dedupes the
    /// boundary).
    async fn add_parent(&mut self, parent_id: &str, cursor: StreamCursor) -> StorageResult<()> {
        if !matches!(self.filter, DeliveryFilter::Parents { .. }) {
            tracing::debug!(feed = %self.key, "add_parent on an unfiltered subscription");
            return Ok(());
        }

        let watermark = match cursor.replay_after() {
            // New-only: skip straight past the current tail.
            None => self.storage.last_feed_id(&self.key).await?,
            Some(after) => {
                let mut watermark = after;
                let history = self.storage.read_feed(&self.key, after).await?;
                for message in history {
                    if message.payload.parent_id() == Some(parent_id) {
                        watermark = message.id;
                        if self.tx.send(message).await.is_err() {
                            self.cancel.cancel();
                            break;
                        }
                    }
                }
                watermark
            }
        };

        if let DeliveryFilter::Parents { watermarks } = &mut self.filter {
            watermarks.insert(parent_id.to_string(), watermark);
        }
        Ok(())
    }

    /// Deliver one live message. Returns `false` when the subscriber is
    /// gone. A full buffer drops the message for this subscriber only.
    fn forward(&mut self, message: FeedMessage) -> bool {
        if !self.filter.wants(&message) {
            return true;
        }
        self.filter.advance(&message);
        match self.tx.try_send(message) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(message)) => {
                tracing::debug!(
                    feed = %self.key,
                    message_id = message.id,
                    "subscriber buffer full, dropping message"
                );
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    fn detach(&self) {
        let mut registry = self.registry.lock();
        let key = self.key.to_string();
        if let Some(count) = registry.get_mut(&key) {
            *count -= 1;
            if *count == 0 {
                registry.remove(&key);
            }
        }
    }
}
