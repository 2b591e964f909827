//! End-to-end tests against a scripted data-center on a loopback
//! socket. The session store is seeded with a shared authorization
//! key, so every exchange runs over the encrypted channel without a
//! key negotiation first.

use std::sync::Arc;
use std::time::{Duration, Instant};

use marconi_crypto::{AuthKey, DequeBuffer, Side, decrypt_data_v2_as, encrypt_data_v2_as};
use marconi_sender::{
    InvocationError, MemoryStore, NoRetries, Sender, SenderConfig, SessionStore, StoredSession,
    TransportKind,
};
use marconi_tl_types::mtproto::{enums, functions, types};
use marconi_tl_types::{Deserializable, Identifiable, Serializable};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;

const TEST_SALT: i64 = 0x11aa_22bb_33cc_44dd;
const RPC_RESULT_ID: u32 = 0xf35c6d01;
const UPDATES_TOO_LONG_ID: u32 = 0xe317af7e;

fn test_key() -> [u8; 256] {
    core::array::from_fn(|i| (i * 11 + 5) as u8)
}

fn request_bytes() -> Vec<u8> {
    let mut body = 0x6046_9778u32.to_le_bytes().to_vec();
    body.extend_from_slice(&99i64.to_le_bytes());
    body
}

fn answer_bytes() -> Vec<u8> {
    let mut body = 0x30c6_b6c9u32.to_le_bytes().to_vec();
    body.extend_from_slice(&7i32.to_le_bytes());
    body
}

fn rpc_result(req_msg_id: i64, result: &[u8]) -> Vec<u8> {
    let mut body = RPC_RESULT_ID.to_le_bytes().to_vec();
    body.extend_from_slice(&req_msg_id.to_le_bytes());
    body.extend_from_slice(result);
    body
}

fn rpc_error(code: i32, message: &str) -> Vec<u8> {
    enums::RpcError::RpcError(types::RpcError {
        error_code: code,
        error_message: message.to_string(),
    })
    .to_bytes()
}

/// A config pointing every listed data-center at a local listener,
/// with the shared key already stored for each of them. Pings and
/// automatic ack flushes are pushed out of the way so tests control
/// the traffic.
fn config_for(addrs: &[(i32, &str)]) -> (SenderConfig, Arc<MemoryStore>) {
    let mut stored = StoredSession::fresh(addrs[0].0, false);
    for (dc_id, _) in addrs {
        let entry = stored.entry_mut(*dc_id);
        entry.auth_key = Some(test_key());
        entry.first_salt = TEST_SALT;
    }
    let store = Arc::new(MemoryStore::seeded(stored));
    let mut config = SenderConfig {
        dc_id: addrs[0].0,
        transport: TransportKind::Intermediate,
        session_store: store.clone(),
        retry_policy: Arc::new(NoRetries),
        request_timeout: Duration::from_secs(5),
        ping_interval: Duration::from_secs(120),
        ack_threshold: 1000,
        ..SenderConfig::default()
    };
    for (dc_id, addr) in addrs {
        config.dc_overrides.insert(*dc_id, addr.to_string());
    }
    (config, store)
}

struct ClientMessage {
    salt: i64,
    msg_id: i64,
    seq_no: i32,
    body: Vec<u8>,
}

/// The server end of one intermediate-framed connection.
struct ServerLink {
    stream: TcpStream,
    buffer: Vec<u8>,
    key: AuthKey,
    session_id: i64,
    salt: i64,
    sequence: i32,
    next_msg_id: i64,
}

impl ServerLink {
    async fn accept(listener: &TcpListener) -> Self {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut preamble = [0u8; 4];
        stream.read_exact(&mut preamble).await.unwrap();
        assert_eq!(preamble, [0xee; 4]);
        Self {
            stream,
            buffer: Vec::new(),
            key: AuthKey::from_bytes(test_key()),
            session_id: 0,
            salt: TEST_SALT,
            sequence: 0,
            next_msg_id: 0x5e57_ac50_0000_0001,
        }
    }

    /// The next client message, learning the session id as a side
    /// effect of the first one.
    async fn recv(&mut self) -> ClientMessage {
        loop {
            if self.buffer.len() >= 4 {
                let len = u32::from_le_bytes(self.buffer[..4].try_into().unwrap()) as usize;
                if self.buffer.len() >= 4 + len {
                    let mut frame = self.buffer[4..4 + len].to_vec();
                    self.buffer.drain(..4 + len);
                    let plain = decrypt_data_v2_as(&mut frame, &self.key, Side::Client).unwrap();
                    self.session_id = i64::from_le_bytes(plain[8..16].try_into().unwrap());
                    let body_len =
                        u32::from_le_bytes(plain[28..32].try_into().unwrap()) as usize;
                    return ClientMessage {
                        salt: i64::from_le_bytes(plain[..8].try_into().unwrap()),
                        msg_id: i64::from_le_bytes(plain[16..24].try_into().unwrap()),
                        seq_no: i32::from_le_bytes(plain[24..28].try_into().unwrap()),
                        body: plain[32..32 + body_len].to_vec(),
                    };
                }
            }
            let mut chunk = [0u8; 4096];
            let n = self.stream.read(&mut chunk).await.unwrap();
            assert!(n > 0, "client closed the connection");
            self.buffer.extend_from_slice(&chunk[..n]);
        }
    }

    /// Encrypts `body` for the session and sends it, returning the
    /// message id it went out under.
    async fn send(&mut self, body: &[u8], content_related: bool) -> i64 {
        let msg_id = self.next_msg_id;
        self.next_msg_id += 4;
        let seq_no = if content_related {
            let seq = self.sequence * 2 + 1;
            self.sequence += 1;
            seq
        } else {
            self.sequence * 2
        };

        let mut buf = DequeBuffer::with_capacity(32 + body.len(), 32);
        buf.extend(self.salt.to_le_bytes());
        buf.extend(self.session_id.to_le_bytes());
        buf.extend(msg_id.to_le_bytes());
        buf.extend(seq_no.to_le_bytes());
        buf.extend((body.len() as u32).to_le_bytes());
        buf.extend(body.iter().copied());
        encrypt_data_v2_as(&mut buf, &self.key, Side::Server);

        let frame = buf.as_ref();
        let mut wire = (frame.len() as u32).to_le_bytes().to_vec();
        wire.extend_from_slice(frame);
        self.stream.write_all(&wire).await.unwrap();
        msg_id
    }
}

async fn local_listener() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    (listener, addr)
}

#[tokio::test]
async fn pings_resolve_with_their_pong() {
    let (listener, addr) = local_listener().await;
    let (config, _store) = config_for(&[(2, &addr)]);
    let (hold_tx, hold_rx) = oneshot::channel::<()>();

    tokio::join!(
        async {
            let (sender, _updates) = Sender::connect(config).await.unwrap();
            let enums::Pong::Pong(pong) =
                sender.invoke(&functions::Ping { ping_id: 77 }).await.unwrap();
            assert_eq!(pong.ping_id, 77);
            let _ = hold_tx.send(());
            sender.stop().await;
        },
        async {
            let mut server = ServerLink::accept(&listener).await;
            let request = server.recv().await;
            assert_eq!(request.salt, TEST_SALT);
            assert_eq!(request.seq_no % 2, 1);
            assert_eq!(
                &request.body[..4],
                &functions::Ping::CONSTRUCTOR_ID.to_le_bytes()
            );
            let pong = enums::Pong::Pong(types::Pong {
                msg_id: request.msg_id,
                ping_id: i64::from_le_bytes(request.body[4..12].try_into().unwrap()),
            });
            server.send(&pong.to_bytes(), false).await;
            let _ = hold_rx.await;
        },
    );
}

#[tokio::test]
async fn invoke_resolves_with_the_rpc_answer() {
    let (listener, addr) = local_listener().await;
    let (config, _store) = config_for(&[(2, &addr)]);
    let (hold_tx, hold_rx) = oneshot::channel::<()>();

    tokio::join!(
        async {
            let (sender, _updates) = Sender::connect(config).await.unwrap();
            let answer = sender.invoke_raw(&request_bytes()).await.unwrap();
            assert_eq!(answer, answer_bytes());
            let _ = hold_tx.send(());
            sender.stop().await;
        },
        async {
            let mut server = ServerLink::accept(&listener).await;
            let request = server.recv().await;
            assert_eq!(request.body, request_bytes());
            server
                .send(&rpc_result(request.msg_id, &answer_bytes()), true)
                .await;
            let _ = hold_rx.await;
        },
    );
}

#[tokio::test]
async fn rpc_errors_surface_with_code_and_value() {
    let (listener, addr) = local_listener().await;
    let (config, _store) = config_for(&[(2, &addr)]);
    let (hold_tx, hold_rx) = oneshot::channel::<()>();

    tokio::join!(
        async {
            let (sender, _updates) = Sender::connect(config).await.unwrap();
            let error = sender.invoke_raw(&request_bytes()).await.unwrap_err();
            assert!(error.is("FLOOD_WAIT*"));
            assert_eq!(error.flood_wait_seconds(), Some(10));
            match error {
                InvocationError::Rpc(rpc) => {
                    assert_eq!(rpc.code, 420);
                    assert_eq!(rpc.name, "FLOOD_WAIT");
                    assert_eq!(rpc.value, Some(10));
                }
                other => panic!("expected an rpc error, got {other:?}"),
            }
            let _ = hold_tx.send(());
            sender.stop().await;
        },
        async {
            let mut server = ServerLink::accept(&listener).await;
            let request = server.recv().await;
            server
                .send(
                    &rpc_result(request.msg_id, &rpc_error(420, "FLOOD_WAIT_10")),
                    true,
                )
                .await;
            let _ = hold_rx.await;
        },
    );
}

#[tokio::test]
async fn server_redirects_move_the_session() {
    let (home, home_addr) = local_listener().await;
    let (target, target_addr) = local_listener().await;
    let (config, store) = config_for(&[(2, &home_addr), (3, &target_addr)]);
    let (hold_tx, hold_rx) = oneshot::channel::<()>();

    tokio::join!(
        async {
            let (sender, _updates) = Sender::connect(config).await.unwrap();
            assert_eq!(sender.dc_id(), 2);
            let answer = sender.invoke_raw(&request_bytes()).await.unwrap();
            assert_eq!(answer, answer_bytes());
            assert_eq!(sender.dc_id(), 3);
            let _ = hold_tx.send(());
            sender.stop().await;
            let stored = store.load().unwrap().unwrap();
            assert_eq!(stored.home_dc_id, 3);
        },
        async {
            let mut server = ServerLink::accept(&home).await;
            let request = server.recv().await;
            server
                .send(
                    &rpc_result(request.msg_id, &rpc_error(303, "NETWORK_MIGRATE_3")),
                    true,
                )
                .await;
        },
        async {
            let mut server = ServerLink::accept(&target).await;
            let request = server.recv().await;
            assert_eq!(request.body, request_bytes());
            server
                .send(&rpc_result(request.msg_id, &answer_bytes()), true)
                .await;
            let _ = hold_rx.await;
        },
    );
}

#[tokio::test]
async fn stopping_fails_requests_in_flight() {
    let (listener, addr) = local_listener().await;
    let (config, _store) = config_for(&[(2, &addr)]);
    let (seen_tx, seen_rx) = oneshot::channel::<()>();
    let (hold_tx, hold_rx) = oneshot::channel::<()>();

    tokio::join!(
        async {
            let (sender, _updates) = Sender::connect(config).await.unwrap();
            let workers: Vec<_> = (0..3)
                .map(|_| {
                    tokio::spawn({
                        let sender = sender.clone();
                        async move { sender.invoke_raw(&request_bytes()).await }
                    })
                })
                .collect();
            seen_rx.await.unwrap();
            sender.stop().await;
            for worker in workers {
                let outcome = worker.await.unwrap();
                assert!(matches!(outcome, Err(InvocationError::Dropped)));
            }
            // Requests after the shutdown fail the same way.
            let late = sender.invoke_raw(&request_bytes()).await;
            assert!(matches!(late, Err(InvocationError::Dropped)));
            let _ = hold_tx.send(());
        },
        async {
            let mut server = ServerLink::accept(&listener).await;
            for _ in 0..3 {
                let _request = server.recv().await;
            }
            seen_tx.send(()).unwrap();
            let _ = hold_rx.await;
        },
    );
}

#[tokio::test]
async fn unanswered_requests_time_out_after_resending() {
    let (listener, addr) = local_listener().await;
    let (mut config, _store) = config_for(&[(2, &addr)]);
    config.request_timeout = Duration::from_millis(100);
    config.request_retries = 1;
    let (hold_tx, hold_rx) = oneshot::channel::<()>();

    tokio::join!(
        async {
            let (sender, _updates) = Sender::connect(config).await.unwrap();
            let started = Instant::now();
            let outcome = sender.invoke_raw(&request_bytes()).await;
            assert!(matches!(outcome, Err(InvocationError::Timeout)));
            assert!(started.elapsed() >= Duration::from_millis(150));
            let _ = hold_tx.send(());
            sender.stop().await;
        },
        async {
            let mut server = ServerLink::accept(&listener).await;
            let first = server.recv().await;
            let second = server.recv().await;
            // The retry is the identical message, not a new one.
            assert_eq!(first.msg_id, second.msg_id);
            assert_eq!(first.body, second.body);
            let _ = hold_rx.await;
        },
    );
}

#[tokio::test]
async fn stale_salts_are_replaced_transparently() {
    let (listener, addr) = local_listener().await;
    let (config, store) = config_for(&[(2, &addr)]);
    let (hold_tx, hold_rx) = oneshot::channel::<()>();
    let new_salt = 0x7777_8888_9999_0000;

    tokio::join!(
        async {
            let (sender, _updates) = Sender::connect(config).await.unwrap();
            let answer = sender.invoke_raw(&request_bytes()).await.unwrap();
            assert_eq!(answer, answer_bytes());
            let _ = hold_tx.send(());
            sender.stop().await;
            let stored = store.load().unwrap().unwrap();
            assert_eq!(stored.entry(2).unwrap().first_salt, new_salt);
        },
        async {
            let mut server = ServerLink::accept(&listener).await;
            let first = server.recv().await;
            let rejection = enums::BadMsgNotification::ServerSalt(types::BadServerSalt {
                bad_msg_id: first.msg_id,
                bad_msg_seqno: first.seq_no,
                error_code: 48,
                new_server_salt: new_salt,
            });
            server.salt = new_salt;
            server.send(&rejection.to_bytes(), false).await;

            let second = server.recv().await;
            assert_eq!(second.body, first.body);
            assert_ne!(second.msg_id, first.msg_id);
            assert_eq!(second.salt, new_salt);
            server
                .send(&rpc_result(second.msg_id, &answer_bytes()), true)
                .await;
            let _ = hold_rx.await;
        },
    );
}

#[tokio::test]
async fn updates_flow_raw_and_get_acknowledged() {
    let (listener, addr) = local_listener().await;
    let (mut config, _store) = config_for(&[(2, &addr)]);
    config.ack_threshold = 1;
    let (ready_tx, ready_rx) = oneshot::channel::<()>();

    tokio::join!(
        async {
            let (sender, mut updates) = Sender::connect(config).await.unwrap();
            ready_tx.send(()).unwrap();
            let update = updates.next().await.unwrap();
            assert_eq!(update, UPDATES_TOO_LONG_ID.to_le_bytes().to_vec());
            sender.stop().await;
            assert!(updates.next().await.is_none());
        },
        async {
            let mut server = ServerLink::accept(&listener).await;
            ready_rx.await.unwrap();
            let update_id = server
                .send(&UPDATES_TOO_LONG_ID.to_le_bytes(), true)
                .await;
            let ack = server.recv().await;
            assert_eq!(ack.seq_no % 2, 0);
            let enums::MsgsAck::MsgsAck(ack) =
                enums::MsgsAck::from_bytes(&ack.body).unwrap();
            assert_eq!(ack.msg_ids, vec![update_id]);
        },
    );
}

#[tokio::test]
async fn unwrapped_answers_match_the_sole_outstanding_request() {
    let (listener, addr) = local_listener().await;
    let (config, _store) = config_for(&[(2, &addr)]);
    let (hold_tx, hold_rx) = oneshot::channel::<()>();

    tokio::join!(
        async {
            let (sender, _updates) = Sender::connect(config).await.unwrap();
            let answer = sender.invoke_raw(&request_bytes()).await.unwrap();
            assert_eq!(answer, answer_bytes());
            let _ = hold_tx.send(());
            sender.stop().await;
        },
        async {
            let mut server = ServerLink::accept(&listener).await;
            let request = server.recv().await;
            assert_eq!(request.body, request_bytes());
            // Answer without the rpc_result wrapper.
            server.send(&answer_bytes(), true).await;
            let _ = hold_rx.await;
        },
    );
}

#[tokio::test]
async fn idle_links_are_kept_alive_with_pings() {
    let (listener, addr) = local_listener().await;
    let (mut config, _store) = config_for(&[(2, &addr)]);
    config.ping_interval = Duration::from_millis(100);
    let (seen_tx, seen_rx) = oneshot::channel::<()>();

    tokio::join!(
        async {
            let (sender, _updates) = Sender::connect(config).await.unwrap();
            seen_rx.await.unwrap();
            sender.stop().await;
        },
        async {
            let mut server = ServerLink::accept(&listener).await;
            let ping = server.recv().await;
            assert_eq!(
                &ping.body[..4],
                &functions::PingDelayDisconnect::CONSTRUCTOR_ID.to_le_bytes()
            );
            let delay = i32::from_le_bytes(ping.body[12..16].try_into().unwrap());
            assert_eq!(delay, 75);
            assert_eq!(ping.seq_no % 2, 1);
            seen_tx.send(()).unwrap();
        },
    );
}

#[tokio::test]
async fn transfer_connections_run_lock_step_and_are_reused() {
    let (listener, addr) = local_listener().await;
    let (config, _store) = config_for(&[(2, &addr)]);
    let (hold_tx, hold_rx) = oneshot::channel::<()>();

    tokio::join!(
        async {
            let (sender, _updates) = Sender::connect(config).await.unwrap();

            let mut transfer = sender.transfer(2).await.unwrap();
            assert_eq!(transfer.dc_id(), 2);
            let first = transfer.invoke_raw(&request_bytes()).await.unwrap();
            assert_eq!(first, answer_bytes());
            sender.release_transfer(transfer);

            let mut transfer = sender.transfer(2).await.unwrap();
            let second = transfer.invoke_raw(&request_bytes()).await.unwrap();
            assert_eq!(second, answer_bytes());

            let _ = hold_tx.send(());
            sender.stop().await;
        },
        async {
            let _main = ServerLink::accept(&listener).await;
            let mut server = ServerLink::accept(&listener).await;

            let first = server.recv().await;
            assert_eq!(first.body, request_bytes());
            let reply_id = server
                .send(&rpc_result(first.msg_id, &answer_bytes()), true)
                .await;
            let ack = server.recv().await;
            let enums::MsgsAck::MsgsAck(ack) =
                enums::MsgsAck::from_bytes(&ack.body).unwrap();
            assert!(ack.msg_ids.contains(&reply_id));

            // No third accept: the released connection is the one that
            // must come back.
            let second = server.recv().await;
            assert_eq!(second.body, request_bytes());
            server
                .send(&rpc_result(second.msg_id, &answer_bytes()), true)
                .await;
            let ack = server.recv().await;
            let _ = enums::MsgsAck::from_bytes(&ack.body).unwrap();
            let _ = hold_rx.await;
        },
    );
}
