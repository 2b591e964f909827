//! Pooled lock-step connections for bulk transfers.
//!
//! Uploads and downloads go over connections of their own so a slow
//! file part never sits in front of an interactive request. Each
//! transfer connection runs one request at a time on a session of its
//! own, sharing only the authorization key of its data-center.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use marconi_mtproto::EncryptedSession;
use marconi_tl_types::mtproto::{enums, types};
use marconi_tl_types::{Deserializable, RemoteCall};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::envelope::{self, Inbound};
use crate::errors::{InvocationError, RpcError};
use crate::transport::{ConnectionReader, ConnectionWriter};
use crate::{Link, SenderInner};

/// Per-data-center pools with a shared connection limit.
///
/// The semaphore counts checked-out connections; idle ones wait in
/// `idle` without holding capacity, so a release always unblocks a
/// waiting [`acquire`](DcPool::acquire).
pub(crate) struct DcPool {
    limit: usize,
    semaphores: Mutex<HashMap<i32, Arc<Semaphore>>>,
    idle: Mutex<HashMap<i32, Vec<TransferConnection>>>,
}

impl DcPool {
    pub(crate) fn new(limit: usize) -> Self {
        Self {
            limit,
            semaphores: Mutex::new(HashMap::new()),
            idle: Mutex::new(HashMap::new()),
        }
    }

    /// Checks a connection to `dc_id` out, reusing an idle one when
    /// possible. Waits while the data-center is at its limit.
    pub(crate) async fn acquire(
        &self,
        inner: &Arc<SenderInner>,
        dc_id: i32,
    ) -> Result<TransferConnection, InvocationError> {
        let semaphore = self.semaphore(dc_id);
        let permit = semaphore
            .acquire_owned()
            .await
            .map_err(|_| InvocationError::Dropped)?;
        if let Some(mut connection) = self.pop_idle(dc_id) {
            tracing::debug!("reusing an idle transfer connection to dc {dc_id}");
            connection.permit = Some(permit);
            return Ok(connection);
        }
        inner.open_transfer(dc_id, permit).await
    }

    /// Returns a healthy connection for reuse. Its capacity frees the
    /// moment the permit drops, so a waiting `acquire` finds the
    /// connection already queued.
    pub(crate) fn release(&self, mut connection: TransferConnection) {
        let mut idle = self.idle.lock().unwrap();
        idle.entry(connection.dc_id).or_default().push({
            connection.permit = None;
            connection
        });
    }

    fn semaphore(&self, dc_id: i32) -> Arc<Semaphore> {
        let mut semaphores = self.semaphores.lock().unwrap();
        Arc::clone(
            semaphores
                .entry(dc_id)
                .or_insert_with(|| Arc::new(Semaphore::new(self.limit))),
        )
    }

    fn pop_idle(&self, dc_id: i32) -> Option<TransferConnection> {
        self.idle.lock().unwrap().get_mut(&dc_id).and_then(Vec::pop)
    }
}

impl SenderInner {
    pub(crate) async fn open_transfer(
        &self,
        dc_id: i32,
        permit: OwnedSemaphorePermit,
    ) -> Result<TransferConnection, InvocationError> {
        tracing::debug!("opening a transfer connection to dc {dc_id}");
        let mut stored = self.load_or_fresh().map_err(InvocationError::Io)?;
        let link = crate::establish(&self.config, &mut stored, dc_id).await?;
        self.config
            .session_store
            .save(&stored)
            .map_err(InvocationError::Io)?;
        let Link {
            reader,
            writer,
            session,
        } = link;
        Ok(TransferConnection {
            dc_id,
            reader,
            writer,
            session,
            deadline: self.config.request_timeout,
            retries: self.config.request_retries,
            permit: Some(permit),
        })
    }
}

/// One checked-out connection running one request at a time.
///
/// Obtained from [`Sender::transfer`](crate::Sender::transfer) and
/// given back with
/// [`Sender::release_transfer`](crate::Sender::release_transfer);
/// dropping it instead closes the socket and frees its slot.
pub struct TransferConnection {
    dc_id: i32,
    reader: ConnectionReader,
    writer: ConnectionWriter,
    session: EncryptedSession,
    deadline: Duration,
    retries: u32,
    /// Pool capacity, held while checked out and surrendered on
    /// release so waiters can claim the idle connection.
    permit: Option<OwnedSemaphorePermit>,
}

impl TransferConnection {
    /// The data-center this connection talks to.
    pub fn dc_id(&self) -> i32 {
        self.dc_id
    }

    /// Sends a remote call and decodes its answer.
    pub async fn invoke<R: RemoteCall>(
        &mut self,
        request: &R,
    ) -> Result<R::Return, InvocationError> {
        let answer = self.invoke_raw(&request.to_bytes()).await?;
        R::Return::from_bytes(&answer).map_err(Into::into)
    }

    /// Sends a pre-serialized call and returns the raw answer bytes.
    ///
    /// The connection speaks lock-step: it waits for this answer
    /// before anything else may be sent, handling salt and clock
    /// corrections along the way and dropping unrelated chatter.
    pub async fn invoke_raw(&mut self, body: &[u8]) -> Result<Vec<u8>, InvocationError> {
        let (mut frame, mut msg_id) = self.session.pack_body(body, true);
        let mut sends = 0;
        'send: loop {
            sends += 1;
            self.writer.send(&frame).await?;
            loop {
                let mut raw = match tokio::time::timeout(self.deadline, self.reader.recv()).await {
                    Ok(received) => received?,
                    Err(_) if sends <= self.retries => {
                        tracing::debug!("transfer request unanswered, sending again");
                        continue 'send;
                    }
                    Err(_) => return Err(InvocationError::Timeout),
                };
                let message = self
                    .session
                    .unpack(&mut raw)
                    .map_err(|error| InvocationError::Deserialize(error.to_string()))?;
                if message.salt != 0 {
                    self.session.salt = message.salt;
                }
                let mut inbound = Vec::new();
                envelope::classify(message.msg_id, message.seq_no, &message.body, &mut inbound)?;

                let mut acks = Vec::new();
                let mut answer = None;
                let mut repack = false;
                for item in inbound {
                    if item.requires_ack {
                        acks.push(item.msg_id);
                    }
                    match item.inbound {
                        Inbound::RpcResult { req_msg_id, body } if req_msg_id == msg_id => {
                            answer = Some(envelope::into_rpc_answer(body));
                        }
                        Inbound::RpcResult { req_msg_id, .. } => {
                            tracing::debug!("dropping stray answer to {req_msg_id}");
                        }
                        Inbound::BadServerSalt(salt) => {
                            self.session.salt = salt.new_server_salt;
                            if salt.bad_msg_id == msg_id {
                                repack = true;
                            }
                        }
                        Inbound::BadMsgNotification(notification) => {
                            match notification.error_code {
                                16 | 17 if notification.bad_msg_id == msg_id => {
                                    self.session
                                        .msg_ids()
                                        .correct_from_server_id(message.msg_id);
                                    repack = true;
                                }
                                code if notification.bad_msg_id == msg_id => {
                                    answer = Some(Err(InvocationError::Rpc(RpcError {
                                        code: 400,
                                        name: "BAD_MSG_NOTIFICATION".into(),
                                        value: Some(code as u32),
                                    })));
                                }
                                _ => {}
                            }
                        }
                        Inbound::NewSessionCreated(created) => {
                            self.session.salt = created.server_salt;
                        }
                        _ => {}
                    }
                }
                if !acks.is_empty() {
                    let ack = enums::MsgsAck::MsgsAck(types::MsgsAck { msg_ids: acks });
                    let (ack_frame, _) = self.session.pack(&ack, false);
                    self.writer.send(&ack_frame).await?;
                }
                if let Some(result) = answer {
                    return result;
                }
                if repack {
                    if sends > self.retries {
                        return Err(InvocationError::Timeout);
                    }
                    tracing::debug!("transfer request rejected, re-sending");
                    (frame, msg_id) = self.session.pack_body(body, true);
                    continue 'send;
                }
            }
        }
    }
}
