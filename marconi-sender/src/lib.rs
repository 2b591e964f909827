//! Async driver for MTProto sessions.
//!
//! [`Sender`] owns one encrypted session on one data-center: it dials
//! the transport, negotiates an authorization key when the session
//! store has none, keeps the link alive, and multiplexes any number of
//! concurrent [`invoke`](Sender::invoke) calls over it. Server pushes
//! that belong to no request arrive on the [`Updates`] stream as raw
//! TL bytes.
//!
//! ```no_run
//! use marconi_sender::{Sender, SenderConfig};
//! use marconi_tl_types::mtproto::functions;
//!
//! # async fn run() -> Result<(), marconi_sender::InvocationError> {
//! let (sender, mut updates) = Sender::connect(SenderConfig::default()).await?;
//!
//! let _pong = sender.invoke(&functions::Ping { ping_id: 0 }).await?;
//! while let Some(update) = updates.next().await {
//!     println!("{} raw update bytes", update.len());
//! }
//! sender.stop().await;
//! # Ok(())
//! # }
//! ```
//!
//! Everything stateful lives behind an `Arc`, so [`Sender`] is `Clone`
//! and callers on different tasks share one session. Requests survive
//! salt changes, clock-skew corrections and data-center redirects
//! without the caller noticing; what cannot be hidden surfaces as an
//! [`InvocationError`].

#![deny(unsafe_code)]

mod envelope;
mod pool;

pub mod dc;
pub mod errors;
pub mod retry;
pub mod session_store;
pub mod socks5;
pub mod transport;

pub use errors::{InvocationError, RpcError};
pub use pool::TransferConnection;
pub use retry::{AutoSleep, NoRetries, RetryContext, RetryPolicy};
pub use session_store::{
    BinaryFileStore, DcEntry, MemoryStore, SessionStore, StoredSession, UserMarker,
};
pub use socks5::Socks5Config;
pub use transport::TransportKind;

use std::collections::HashMap;
use std::io;
use std::num::NonZeroU32;
use std::ops::ControlFlow;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use marconi_crypto::rsa;
use marconi_mtproto::authentication;
use marconi_mtproto::encrypted::DecryptError;
use marconi_mtproto::{EncryptedSession, PlainSession};
use marconi_tl_types::mtproto::{enums, functions, types};
use marconi_tl_types::{Deserializable, RemoteCall, Serializable};
use tokio::sync::{mpsc, oneshot, Mutex as AsyncMutex};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use envelope::{Inbound, InboundMessage};
use pool::DcPool;
use transport::{Connection, ConnectionReader, ConnectionWriter};

/// How long the server may go without traffic before dropping us; the
/// ping interval must stay comfortably below this.
const PING_DISCONNECT_DELAY: i32 = 75;

// ─── SenderConfig ────────────────────────────────────────────────────────────

/// Configuration for [`Sender::connect`].
pub struct SenderConfig {
    /// Data-center to dial when the store holds no session yet.
    pub dc_id: i32,
    /// Connect to the test network instead of production.
    pub test_mode: bool,
    /// Prefer IPv6 directory addresses.
    pub ipv6: bool,
    /// Framing used by every connection.
    pub transport: TransportKind,
    /// Route every connection through a SOCKS5 proxy.
    pub socks5: Option<Socks5Config>,
    /// Addresses consulted before the static directory, keyed by
    /// data-center id.
    pub dc_overrides: HashMap<i32, String>,
    /// Where session credentials persist between runs.
    pub session_store: Arc<dyn SessionStore>,
    /// Reaction to failed requests.
    pub retry_policy: Arc<dyn RetryPolicy>,
    /// RSA keys trusted during key negotiation.
    pub keyring: rsa::Keyring,
    /// TCP dial attempts per connection.
    pub connect_attempts: u32,
    /// Pause between TCP dial attempts.
    pub connect_backoff: Duration,
    /// Fresh-nonce restarts of a failed key negotiation.
    pub handshake_attempts: u32,
    /// How long one request may stay unanswered before re-sending.
    pub request_timeout: Duration,
    /// Idempotent re-sends before a request fails with
    /// [`InvocationError::Timeout`].
    pub request_retries: u32,
    /// Keep-alive ping cadence.
    pub ping_interval: Duration,
    /// Queued acknowledgments that force an immediate flush.
    pub ack_threshold: usize,
    /// Most simultaneous transfer connections per data-center.
    pub transfer_limit: usize,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            dc_id: 2,
            test_mode: false,
            ipv6: false,
            transport: TransportKind::default(),
            socks5: None,
            dc_overrides: HashMap::new(),
            session_store: Arc::new(BinaryFileStore::new("marconi.session")),
            retry_policy: Arc::new(AutoSleep::io_only()),
            keyring: rsa::Keyring::known(),
            connect_attempts: 3,
            connect_backoff: Duration::from_secs(1),
            handshake_attempts: 3,
            request_timeout: Duration::from_secs(15),
            request_retries: 5,
            ping_interval: Duration::from_secs(10),
            ack_threshold: 8,
            transfer_limit: 4,
        }
    }
}

// ─── Updates ─────────────────────────────────────────────────────────────────

/// Server pushes that are not answers to any request.
///
/// Bodies arrive TL-serialized and are forwarded unopened; decoding
/// them is the business of whatever schema layer sits above.
pub struct Updates {
    rx: mpsc::UnboundedReceiver<Vec<u8>>,
    stop: CancellationToken,
}

impl Updates {
    /// The next update, or `None` once the sender has stopped and the
    /// queue has drained.
    pub async fn next(&mut self) -> Option<Vec<u8>> {
        tokio::select! {
            biased;
            update = self.rx.recv() => update,
            _ = self.stop.cancelled() => self.rx.try_recv().ok(),
        }
    }
}

// ─── Sender ──────────────────────────────────────────────────────────────────

struct PendingRequest {
    /// Serialized request body, kept so the message can be re-sent
    /// under a fresh `msg_id` after salt or clock corrections.
    body: Vec<u8>,
    tx: oneshot::Sender<Result<Vec<u8>, InvocationError>>,
    resends: u32,
}

/// State of the current link, guarded by a short-held sync mutex.
/// Never hold this lock across an await point.
struct Active {
    session: EncryptedSession,
    dc_id: i32,
    pending: HashMap<i64, PendingRequest>,
    acks: Vec<i64>,
    /// Bumped whenever the connection is replaced, so a dying read
    /// loop cannot damage the state of its successor.
    generation: u64,
    /// Cancelled to shut down the read loop of this generation.
    link_token: CancellationToken,
}

struct SenderInner {
    config: SenderConfig,
    active: Mutex<Active>,
    /// `None` while no usable connection exists.
    writer: AsyncMutex<Option<ConnectionWriter>>,
    /// Serializes reconnects and migrations.
    reconnect_lock: AsyncMutex<()>,
    pool: DcPool,
    tasks: TaskTracker,
    stop: CancellationToken,
    updates_tx: mpsc::UnboundedSender<Vec<u8>>,
}

/// Removes the pending entry if the caller gives up before the answer
/// arrives, wherever salt corrections may have re-keyed it to.
struct PendingGuard<'a> {
    inner: &'a SenderInner,
    msg_id: i64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut active) = self.inner.active.lock() {
            active.pending.remove(&self.msg_id);
            active.pending.retain(|_, entry| !entry.tx.is_closed());
        }
    }
}

/// A connected MTProto session.
#[derive(Clone)]
pub struct Sender {
    inner: Arc<SenderInner>,
}

impl Sender {
    /// Connects to the configured data-center and returns the sender
    /// together with its update stream.
    ///
    /// When the session store holds an authorization key for the
    /// data-center it is reused; otherwise a new key is negotiated
    /// and persisted before this returns.
    pub async fn connect(config: SenderConfig) -> Result<(Self, Updates), InvocationError> {
        let mut stored = config
            .session_store
            .load()
            .map_err(InvocationError::Io)?
            .unwrap_or_else(|| StoredSession::fresh(config.dc_id, config.test_mode));
        if stored.test_mode != config.test_mode {
            tracing::warn!("stored session belongs to the other network, starting fresh");
            stored = StoredSession::fresh(config.dc_id, config.test_mode);
        }
        let dc_id = stored.home_dc_id;

        let link = establish(&config, &mut stored, dc_id).await?;
        config.session_store.save(&stored).map_err(InvocationError::Io)?;

        let Link {
            reader,
            writer,
            session,
        } = link;
        let auth_key = session.auth_key_bytes();
        let session_id = session.session_id();

        let (updates_tx, updates_rx) = mpsc::unbounded_channel();
        let stop = CancellationToken::new();
        let link_token = stop.child_token();
        let transfer_limit = config.transfer_limit;
        let inner = Arc::new(SenderInner {
            config,
            active: Mutex::new(Active {
                session,
                dc_id,
                pending: HashMap::new(),
                acks: Vec::new(),
                generation: 0,
                link_token: link_token.clone(),
            }),
            writer: AsyncMutex::new(Some(writer)),
            reconnect_lock: AsyncMutex::new(()),
            pool: DcPool::new(transfer_limit),
            tasks: TaskTracker::new(),
            stop: stop.clone(),
            updates_tx,
        });
        inner.spawn_read_loop(reader, 0, auth_key, session_id, link_token);
        inner.spawn_service_loop();

        Ok((
            Self { inner },
            Updates {
                rx: updates_rx,
                stop,
            },
        ))
    }

    /// Sends a remote call and decodes its answer.
    ///
    /// Data-center redirects are followed transparently; other
    /// failures go through the configured [`RetryPolicy`] before
    /// surfacing.
    pub async fn invoke<R: RemoteCall>(&self, request: &R) -> Result<R::Return, InvocationError> {
        let answer = self.invoke_raw(&request.to_bytes()).await?;
        R::Return::from_bytes(&answer).map_err(Into::into)
    }

    /// Sends a pre-serialized call and returns the raw answer bytes.
    pub async fn invoke_raw(&self, body: &[u8]) -> Result<Vec<u8>, InvocationError> {
        self.inner.invoke_raw(body).await
    }

    /// Checks a lock-step connection to `dc_id` out of the transfer
    /// pool, dialing one if none is idle. Waits when the per-dc limit
    /// is reached.
    pub async fn transfer(&self, dc_id: i32) -> Result<TransferConnection, InvocationError> {
        self.inner.pool.acquire(&self.inner, dc_id).await
    }

    /// Returns a healthy transfer connection to the pool for reuse.
    /// Broken connections should be dropped instead.
    pub fn release_transfer(&self, connection: TransferConnection) {
        self.inner.pool.release(connection);
    }

    /// The authorization key of the current session.
    pub fn auth_key(&self) -> [u8; 256] {
        self.inner.active.lock().unwrap().session.auth_key_bytes()
    }

    /// The data-center this session currently lives on.
    pub fn dc_id(&self) -> i32 {
        self.inner.active.lock().unwrap().dc_id
    }

    /// Records who the session is signed in as. The marker is
    /// persisted with the session.
    pub fn set_user(&self, user: Option<UserMarker>) -> io::Result<()> {
        let mut stored = self.inner.load_or_fresh()?;
        stored.user = user;
        self.inner.config.session_store.save(&stored)
    }

    /// Shuts the sender down: flushes queued acknowledgments on a
    /// best-effort basis, stops the background tasks, fails every
    /// outstanding request with [`InvocationError::Dropped`] and
    /// persists the session.
    pub async fn stop(&self) {
        if self.inner.stop.is_cancelled() {
            return;
        }
        tracing::info!("stopping sender");
        let farewell = {
            let mut active = self.inner.active.lock().unwrap();
            (!active.acks.is_empty()).then(|| SenderInner::pack_acks(&mut active))
        };
        if let Some(frame) = farewell {
            let mut writer = self.inner.writer.lock().await;
            if let Some(writer) = writer.as_mut() {
                let _ = writer.send(&frame).await;
            }
        }
        self.inner.stop.cancel();
        *self.inner.writer.lock().await = None;
        self.inner.fail_all_pending(|| InvocationError::Dropped);
        self.inner.tasks.close();
        self.inner.tasks.wait().await;
        if let Err(error) = self.inner.persist() {
            tracing::warn!("saving session on stop failed: {error}");
        }
    }
}

// ─── Request path ────────────────────────────────────────────────────────────

impl SenderInner {
    async fn invoke_raw(self: &Arc<Self>, body: &[u8]) -> Result<Vec<u8>, InvocationError> {
        let mut fail_count = NonZeroU32::MIN;
        let mut slept_so_far = Duration::ZERO;
        loop {
            match self.invoke_once(body).await {
                Ok(answer) => return Ok(answer),
                Err(error) => {
                    if let Some(dc_id) = error.migration_dc() {
                        tracing::info!("server redirected this session to dc {dc_id}");
                        self.migrate(dc_id).await?;
                        continue;
                    }
                    let ctx = RetryContext {
                        fail_count,
                        slept_so_far,
                        error,
                    };
                    match self.config.retry_policy.should_retry(&ctx) {
                        ControlFlow::Continue(delay) => {
                            tokio::time::sleep(delay).await;
                            slept_so_far += delay;
                            fail_count = fail_count.saturating_add(1);
                        }
                        ControlFlow::Break(()) => return Err(ctx.error),
                    }
                }
            }
        }
    }

    /// One attempt: register, send, wait. Re-sends the identical frame
    /// on timeout, which the server deduplicates by `msg_id`.
    async fn invoke_once(self: &Arc<Self>, body: &[u8]) -> Result<Vec<u8>, InvocationError> {
        self.ensure_connected().await?;

        let (tx, rx) = oneshot::channel();
        let (frame, msg_id) = {
            let mut active = self.active.lock().unwrap();
            let (frame, msg_id) = active.session.pack_body(body, true);
            active.pending.insert(
                msg_id,
                PendingRequest {
                    body: body.to_vec(),
                    tx,
                    resends: 0,
                },
            );
            (frame, msg_id)
        };
        let _guard = PendingGuard {
            inner: self.as_ref(),
            msg_id,
        };
        // Declared after the guard so the channel closes first and the
        // guard's sweep can find re-keyed entries.
        let mut rx = rx;

        let mut sends = 0;
        loop {
            sends += 1;
            {
                let mut writer = self.writer.lock().await;
                match writer.as_mut() {
                    Some(writer) => writer.send(&frame).await?,
                    None => {
                        return Err(InvocationError::Io(io::Error::new(
                            io::ErrorKind::NotConnected,
                            "connection lost",
                        )));
                    }
                }
            }
            match tokio::time::timeout(self.config.request_timeout, &mut rx).await {
                Ok(Ok(answer)) => return answer,
                Ok(Err(_)) => return Err(InvocationError::Dropped),
                Err(_) if sends <= self.config.request_retries => {
                    tracing::debug!(
                        "request {msg_id} unanswered, sending again ({sends}/{})",
                        self.config.request_retries
                    );
                }
                Err(_) => return Err(InvocationError::Timeout),
            }
        }
    }

    /// Reconnects to the current data-center if the link is down.
    async fn ensure_connected(self: &Arc<Self>) -> Result<(), InvocationError> {
        if self.stop.is_cancelled() {
            return Err(InvocationError::Dropped);
        }
        if self.writer.lock().await.is_some() {
            return Ok(());
        }
        let _permit = self.reconnect_lock.lock().await;
        if self.writer.lock().await.is_some() {
            return Ok(());
        }
        let dc_id = self.active.lock().unwrap().dc_id;
        tracing::info!("link is down, reconnecting to dc {dc_id}");
        self.switch_connection(dc_id).await
    }

    /// Moves the whole session to another data-center.
    async fn migrate(self: &Arc<Self>, dc_id: i32) -> Result<(), InvocationError> {
        let _permit = self.reconnect_lock.lock().await;
        if self.active.lock().unwrap().dc_id == dc_id {
            // Another request raced us here and already migrated.
            return Ok(());
        }
        tracing::info!("migrating session to dc {dc_id}");
        self.switch_connection(dc_id).await
    }

    /// Replaces the current link with a fresh one to `dc_id` and
    /// re-sends every outstanding request on it. The caller must hold
    /// `reconnect_lock`.
    async fn switch_connection(self: &Arc<Self>, dc_id: i32) -> Result<(), InvocationError> {
        let mut stored = self.load_or_fresh().map_err(InvocationError::Io)?;
        let link = establish(&self.config, &mut stored, dc_id).await?;
        stored.home_dc_id = dc_id;
        self.config
            .session_store
            .save(&stored)
            .map_err(InvocationError::Io)?;

        let Link {
            reader,
            writer,
            session,
        } = link;
        let auth_key = session.auth_key_bytes();
        let session_id = session.session_id();
        let link_token = self.stop.child_token();

        let (old_token, generation, resends) = {
            let mut active = self.active.lock().unwrap();
            let old_token = std::mem::replace(&mut active.link_token, link_token.clone());
            active.generation += 1;
            active.dc_id = dc_id;
            active.session = session;
            active.acks.clear();

            let pending = std::mem::take(&mut active.pending);
            let mut resends = Vec::with_capacity(pending.len());
            for (_, entry) in pending {
                let (frame, new_msg_id) = active.session.pack_body(&entry.body, true);
                active.pending.insert(new_msg_id, entry);
                resends.push(frame);
            }
            (old_token, active.generation, resends)
        };
        old_token.cancel();

        {
            let mut guard = self.writer.lock().await;
            *guard = Some(writer);
        }
        self.spawn_read_loop(reader, generation, auth_key, session_id, link_token);

        if !resends.is_empty() {
            tracing::debug!("re-sending {} outstanding requests", resends.len());
            let mut guard = self.writer.lock().await;
            if let Some(writer) = guard.as_mut() {
                for frame in &resends {
                    writer.send(frame).await?;
                }
            }
        }
        Ok(())
    }

    /// Called by a read loop that lost its connection.
    async fn handle_link_failure(self: &Arc<Self>, generation: u64, error: InvocationError) {
        if self.stop.is_cancelled() {
            return;
        }
        let _permit = self.reconnect_lock.lock().await;
        let (stale, dc_id) = {
            let active = self.active.lock().unwrap();
            (active.generation != generation, active.dc_id)
        };
        if stale {
            return;
        }
        tracing::warn!("connection lost ({error}), reconnecting to dc {dc_id}");
        *self.writer.lock().await = None;
        if let Err(error) = self.switch_connection(dc_id).await {
            tracing::warn!("reconnect failed: {error}");
            self.fail_all_pending(|| {
                InvocationError::Io(io::Error::new(
                    io::ErrorKind::ConnectionReset,
                    "connection lost and reconnect failed",
                ))
            });
        }
    }

    fn fail_all_pending(&self, mut error: impl FnMut() -> InvocationError) {
        let pending = {
            let mut active = self.active.lock().unwrap();
            std::mem::take(&mut active.pending)
        };
        if !pending.is_empty() {
            tracing::debug!("failing {} outstanding requests", pending.len());
        }
        for (_, entry) in pending {
            let _ = entry.tx.send(Err(error()));
        }
    }
}

// ─── Receive path ────────────────────────────────────────────────────────────

impl SenderInner {
    fn spawn_read_loop(
        self: &Arc<Self>,
        mut reader: ConnectionReader,
        generation: u64,
        auth_key: [u8; 256],
        session_id: i64,
        token: CancellationToken,
    ) {
        let inner = Arc::clone(self);
        self.tasks.spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    frame = reader.recv() => {
                        let outcome = match frame {
                            Ok(raw) => {
                                inner
                                    .process_frame(raw, generation, &auth_key, session_id)
                                    .await
                            }
                            Err(error) => Err(error),
                        };
                        if let Err(error) = outcome {
                            inner.handle_link_failure(generation, error).await;
                            break;
                        }
                    }
                }
            }
            tracing::debug!("read loop of generation {generation} finished");
        });
    }

    fn spawn_service_loop(self: &Arc<Self>) {
        let inner = Arc::clone(self);
        let token = self.stop.clone();
        self.tasks.spawn(async move {
            let mut ticker = tokio::time::interval(inner.config.ping_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.reset();
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => inner.service_tick().await,
                }
            }
        });
    }

    /// Periodic housekeeping: flush leftover acknowledgments and keep
    /// the connection alive with a fire-and-forget ping.
    async fn service_tick(&self) {
        let frames = {
            let mut active = self.active.lock().unwrap();
            let mut frames = Vec::new();
            if !active.acks.is_empty() {
                frames.push(Self::pack_acks(&mut active));
            }
            let ping = functions::PingDelayDisconnect {
                ping_id: random_i64(),
                disconnect_delay: PING_DISCONNECT_DELAY,
            };
            frames.push(active.session.pack(&ping, true).0);
            frames
        };
        let mut writer = self.writer.lock().await;
        if let Some(writer) = writer.as_mut() {
            for frame in &frames {
                if let Err(error) = writer.send(frame).await {
                    tracing::debug!("keep-alive send failed: {error}");
                    break;
                }
            }
        }
    }

    async fn process_frame(
        &self,
        mut raw: Vec<u8>,
        generation: u64,
        auth_key: &[u8; 256],
        session_id: i64,
    ) -> Result<(), InvocationError> {
        let message =
            match EncryptedSession::decrypt_frame_standalone(auth_key, session_id, &mut raw) {
                Ok(message) => message,
                Err(DecryptError::SessionMismatch) => {
                    tracing::debug!("dropping frame addressed to another session");
                    return Ok(());
                }
                Err(error) => return Err(InvocationError::Deserialize(error.to_string())),
            };
        let mut inbound = Vec::new();
        envelope::classify(message.msg_id, message.seq_no, &message.body, &mut inbound)?;

        let outgoing = {
            let mut active = self.active.lock().unwrap();
            if active.generation != generation {
                return Ok(());
            }
            if message.salt != 0 {
                active.session.salt = message.salt;
            }
            let mut outgoing = Vec::new();
            for item in inbound {
                if item.requires_ack {
                    active.acks.push(item.msg_id);
                }
                self.dispatch(&mut active, item, &mut outgoing);
            }
            if active.acks.len() >= self.config.ack_threshold {
                outgoing.push(Self::pack_acks(&mut active));
            }
            outgoing
        };
        if !outgoing.is_empty() {
            let mut writer = self.writer.lock().await;
            if let Some(writer) = writer.as_mut() {
                for frame in &outgoing {
                    writer.send(frame).await?;
                }
            }
        }
        Ok(())
    }

    fn dispatch(&self, active: &mut Active, message: InboundMessage, outgoing: &mut Vec<Vec<u8>>) {
        match message.inbound {
            Inbound::RpcResult { req_msg_id, body } => {
                match active.pending.remove(&req_msg_id) {
                    Some(entry) => {
                        let _ = entry.tx.send(envelope::into_rpc_answer(body));
                    }
                    None => tracing::debug!("answer for unknown request {req_msg_id}"),
                }
            }
            Inbound::Pong(pong) => {
                tracing::trace!("pong for ping {}", pong.ping_id);
                if let Some(entry) = active.pending.remove(&pong.msg_id) {
                    let _ = entry.tx.send(Ok(enums::Pong::Pong(pong).to_bytes()));
                }
            }
            Inbound::BadServerSalt(salt) => {
                tracing::debug!("salt rejected, adopting the replacement and re-sending");
                active.session.salt = salt.new_server_salt;
                self.resend(active, salt.bad_msg_id, outgoing);
            }
            Inbound::BadMsgNotification(notification) => match notification.error_code {
                // 16 and 17 mean our msg_ids embed a clock too far off.
                16 | 17 => {
                    active.session.msg_ids().correct_from_server_id(message.msg_id);
                    tracing::debug!(
                        "message time rejected (code {}), re-sending",
                        notification.error_code
                    );
                    self.resend(active, notification.bad_msg_id, outgoing);
                }
                code => {
                    tracing::warn!(
                        "request {} rejected with bad_msg code {code}",
                        notification.bad_msg_id
                    );
                    if let Some(entry) = active.pending.remove(&notification.bad_msg_id) {
                        let _ = entry.tx.send(Err(InvocationError::Rpc(RpcError {
                            code: 400,
                            name: "BAD_MSG_NOTIFICATION".into(),
                            value: Some(code as u32),
                        })));
                    }
                }
            },
            Inbound::NewSessionCreated(created) => {
                tracing::debug!("server opened session (unique_id {:x})", created.unique_id);
                active.session.salt = created.server_salt;
            }
            Inbound::MsgsAck(ack) => {
                tracing::trace!("server acknowledged {} messages", ack.msg_ids.len());
            }
            Inbound::DetailedInfo { answer_msg_id } => {
                // Acknowledging the held answer makes the server send it.
                active.acks.push(answer_msg_id);
            }
            Inbound::Update(bytes) => {
                let _ = self.updates_tx.send(bytes);
            }
            Inbound::Unmatched(bytes) => {
                // An answer missing its rpc_result wrapper can only be
                // matched when exactly one request is in flight.
                if active.pending.len() == 1 {
                    if let Some(msg_id) = active.pending.keys().next().copied() {
                        if let Some(entry) = active.pending.remove(&msg_id) {
                            let _ = entry.tx.send(Ok(bytes));
                            return;
                        }
                    }
                }
                let _ = self.updates_tx.send(bytes);
            }
        }
    }

    /// Re-sends a rejected request under a fresh `msg_id`, keeping its
    /// pending entry (and with it the caller's channel) alive.
    fn resend(&self, active: &mut Active, bad_msg_id: i64, outgoing: &mut Vec<Vec<u8>>) {
        let Some(mut entry) = active.pending.remove(&bad_msg_id) else {
            return;
        };
        entry.resends += 1;
        if entry.resends > self.config.request_retries {
            tracing::warn!("request rejected too many times, giving up");
            let _ = entry.tx.send(Err(InvocationError::Timeout));
            return;
        }
        let (frame, new_msg_id) = active.session.pack_body(&entry.body, true);
        active.pending.insert(new_msg_id, entry);
        outgoing.push(frame);
    }

    fn pack_acks(active: &mut Active) -> Vec<u8> {
        let msg_ids = std::mem::take(&mut active.acks);
        tracing::trace!("acknowledging {} messages", msg_ids.len());
        let ack = enums::MsgsAck::MsgsAck(types::MsgsAck { msg_ids });
        active.session.pack(&ack, false).0
    }
}

// ─── Persistence ─────────────────────────────────────────────────────────────

impl SenderInner {
    fn load_or_fresh(&self) -> io::Result<StoredSession> {
        Ok(self.config.session_store.load()?.unwrap_or_else(|| {
            let dc_id = self.active.lock().unwrap().dc_id;
            StoredSession::fresh(dc_id, self.config.test_mode)
        }))
    }

    fn persist(&self) -> io::Result<()> {
        let mut stored = self.load_or_fresh()?;
        {
            let active = self.active.lock().unwrap();
            stored.home_dc_id = active.dc_id;
            stored.test_mode = self.config.test_mode;
            let entry = stored.entry_mut(active.dc_id);
            entry.auth_key = Some(active.session.auth_key_bytes());
            entry.first_salt = active.session.salt;
            entry.time_offset = active.session.msg_ids().time_offset();
        }
        self.config.session_store.save(&stored)
    }
}

// ─── Connecting ──────────────────────────────────────────────────────────────

/// A freshly established encrypted link.
pub(crate) struct Link {
    pub(crate) reader: ConnectionReader,
    pub(crate) writer: ConnectionWriter,
    pub(crate) session: EncryptedSession,
}

/// Dials `dc_id` and returns an encrypted link, reusing the stored
/// authorization key when one exists and negotiating (and recording)
/// a new one otherwise.
pub(crate) async fn establish(
    config: &SenderConfig,
    stored: &mut StoredSession,
    dc_id: i32,
) -> Result<Link, InvocationError> {
    let addr = match config.dc_overrides.get(&dc_id) {
        Some(addr) => addr.clone(),
        None => dc::address(dc_id, config.test_mode, config.ipv6),
    };

    let saved = stored
        .entry(dc_id)
        .and_then(|entry| entry.auth_key.map(|key| (key, entry.first_salt, entry.time_offset)));
    if let Some((auth_key, first_salt, time_offset)) = saved {
        let connection = Connection::connect(
            &addr,
            &config.transport,
            config.socks5.as_ref(),
            config.connect_attempts,
            config.connect_backoff,
        )
        .await?;
        let (reader, writer) = connection.split();
        let session = EncryptedSession::new(auth_key, first_salt, time_offset);
        return Ok(Link {
            reader,
            writer,
            session,
        });
    }

    let mut attempt = 0;
    loop {
        attempt += 1;
        let connection = Connection::connect(
            &addr,
            &config.transport,
            config.socks5.as_ref(),
            config.connect_attempts,
            config.connect_backoff,
        )
        .await?;
        let (mut reader, mut writer) = connection.split();
        let negotiated = tokio::time::timeout(
            config.request_timeout,
            negotiate_key(&mut reader, &mut writer, &config.keyring),
        )
        .await
        .unwrap_or(Err(InvocationError::Timeout));
        match negotiated {
            Ok(finished) => {
                tracing::info!("negotiated a new authorization key for dc {dc_id}");
                let entry = stored.entry_mut(dc_id);
                entry.auth_key = Some(finished.auth_key);
                entry.first_salt = finished.first_salt;
                entry.time_offset = finished.time_offset;
                let session = EncryptedSession::new(
                    finished.auth_key,
                    finished.first_salt,
                    finished.time_offset,
                );
                return Ok(Link {
                    reader,
                    writer,
                    session,
                });
            }
            Err(error) if error.is_transient() && attempt < config.handshake_attempts => {
                tracing::warn!("key negotiation attempt {attempt} failed: {error}");
            }
            Err(error) => return Err(error),
        }
    }
}

/// Runs the plaintext key exchange over an established connection.
async fn negotiate_key(
    reader: &mut ConnectionReader,
    writer: &mut ConnectionWriter,
    keyring: &rsa::Keyring,
) -> Result<authentication::Finished, InvocationError> {
    tracing::debug!("negotiating authorization key");
    let plain = PlainSession::new();

    let (request, state) = authentication::step1();
    writer.send(&plain.pack(&request)).await?;
    let response = plain.unpack::<functions::ReqPqMulti>(&reader.recv().await?)?;

    let (request, state) = authentication::step2(state, response, keyring)?;
    writer.send(&plain.pack(&request)).await?;
    let response = plain.unpack::<functions::ReqDhParams>(&reader.recv().await?)?;

    let (request, state) = authentication::step3(state, response)?;
    writer.send(&plain.pack(&request)).await?;
    let response = plain.unpack::<functions::SetClientDhParams>(&reader.recv().await?)?;

    authentication::finish(state, response).map_err(Into::into)
}

fn random_i64() -> i64 {
    let mut buf = [0u8; 8];
    getrandom::getrandom(&mut buf).expect("getrandom");
    i64::from_le_bytes(buf)
}
