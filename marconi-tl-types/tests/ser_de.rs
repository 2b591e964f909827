use marconi_tl_types::mtproto::{enums, functions, types};
use marconi_tl_types::{Deserializable, Identifiable, RawVec, RemoteCall, Serializable};

// ── Primitive round-trips ─────────────────────────────────────────────────────

#[test]
fn roundtrip_i32() {
    for v in [0i32, -1, i32::MAX, i32::MIN, 42] {
        assert_eq!(i32::from_bytes(&v.to_bytes()).unwrap(), v);
    }
}

#[test]
fn roundtrip_i64() {
    for v in [0i64, -1, i64::MAX, i64::MIN, 1_234_567_890] {
        assert_eq!(i64::from_bytes(&v.to_bytes()).unwrap(), v);
    }
}

#[test]
fn roundtrip_f64() {
    for v in [0.0f64, -1.5, f64::MAX, f64::MIN_POSITIVE] {
        assert_eq!(f64::from_bytes(&v.to_bytes()).unwrap(), v);
    }
}

#[test]
fn roundtrip_int128_and_int256() {
    let small: [u8; 16] = core::array::from_fn(|i| i as u8);
    let large: [u8; 32] = core::array::from_fn(|i| (i * 3) as u8);
    assert_eq!(<[u8; 16]>::from_bytes(&small.to_bytes()).unwrap(), small);
    assert_eq!(<[u8; 32]>::from_bytes(&large.to_bytes()).unwrap(), large);
}

// ── String / bytes ────────────────────────────────────────────────────────────

#[test]
fn roundtrip_bytes_short_and_long() {
    for len in [0usize, 1, 3, 4, 253, 254, 1024] {
        let v: Vec<u8> = (0..len).map(|i| i as u8).collect();
        let bytes = v.to_bytes();
        assert_eq!(bytes.len() % 4, 0, "len {len} not 4-byte aligned");
        assert_eq!(Vec::<u8>::from_bytes(&bytes).unwrap(), v);
    }
}

#[test]
fn roundtrip_string() {
    let s = "FLOOD_WAIT_23".to_owned();
    assert_eq!(String::from_bytes(&s.to_bytes()).unwrap(), s);
}

// ── Vectors ───────────────────────────────────────────────────────────────────

#[test]
fn roundtrip_vec_i64() {
    let v: Vec<i64> = vec![i64::MIN, -7, 0, 7, i64::MAX];
    assert_eq!(Vec::<i64>::from_bytes(&v.to_bytes()).unwrap(), v);
}

#[test]
fn raw_vec_lacks_only_the_constructor() {
    let boxed = vec![1i32, 2, 3].to_bytes();
    let raw = RawVec(vec![1i32, 2, 3]).to_bytes();
    assert_eq!(&boxed[4..], &raw[..]);
    assert_eq!(RawVec::<i32>::from_bytes(&raw).unwrap().0, vec![1, 2, 3]);
}

// ── Handshake constructors ────────────────────────────────────────────────────

#[test]
fn req_pq_multi_known_bytes() {
    let call = functions::ReqPqMulti { nonce: [7u8; 16] };
    let bytes = call.to_bytes();
    assert_eq!(&bytes[..4], &0xbe7e8ef1u32.to_le_bytes());
    assert_eq!(&bytes[4..], &[7u8; 16]);
}

#[test]
fn roundtrip_res_pq_boxed() {
    let original = enums::ResPq::ResPq(types::ResPq {
        nonce: [1; 16],
        server_nonce: [2; 16],
        pq: vec![0x17, 0xed, 0x48, 0x94, 0x1a, 0x08, 0xf9, 0x81],
        server_public_key_fingerprints: vec![-3414540481677951611],
    });
    let bytes = original.to_bytes();
    assert_eq!(&bytes[..4], &0x05162463u32.to_le_bytes());
    assert_eq!(enums::ResPq::from_bytes(&bytes).unwrap(), original);
}

#[test]
fn roundtrip_pq_inner_data_boxed() {
    let original = enums::PqInnerData::PqInnerData(types::PqInnerData {
        pq: vec![0x17, 0xed, 0x48, 0x94, 0x1a, 0x08, 0xf9, 0x81],
        p: vec![0x49, 0x4c, 0x55, 0x3b],
        q: vec![0x53, 0x91, 0x10, 0x73],
        nonce: [1; 16],
        server_nonce: [2; 16],
        new_nonce: [3; 32],
    });
    assert_eq!(
        enums::PqInnerData::from_bytes(&original.to_bytes()).unwrap(),
        original
    );
}

#[test]
fn server_dh_params_distinguishes_ok_from_fail() {
    let ok = enums::ServerDhParams::Ok(types::ServerDhParamsOk {
        nonce: [1; 16],
        server_nonce: [2; 16],
        encrypted_answer: vec![0xaa; 592],
    });
    let fail = enums::ServerDhParams::Fail(types::ServerDhParamsFail {
        nonce: [1; 16],
        server_nonce: [2; 16],
        new_nonce_hash: [9; 16],
    });
    assert_eq!(
        enums::ServerDhParams::from_bytes(&ok.to_bytes()).unwrap(),
        ok
    );
    assert_eq!(
        enums::ServerDhParams::from_bytes(&fail.to_bytes()).unwrap(),
        fail
    );
}

#[test]
fn roundtrip_dh_inner_data_both_directions() {
    let server = enums::ServerDhInnerData::ServerDhInnerData(types::ServerDhInnerData {
        nonce: [1; 16],
        server_nonce: [2; 16],
        g: 3,
        dh_prime: vec![0xc7; 256],
        g_a: vec![0x5a; 256],
        server_time: 1_700_000_000,
    });
    let client = enums::ClientDhInnerData::ClientDhInnerData(types::ClientDhInnerData {
        nonce: [1; 16],
        server_nonce: [2; 16],
        retry_id: 0,
        g_b: vec![0xa5; 255],
    });
    assert_eq!(
        enums::ServerDhInnerData::from_bytes(&server.to_bytes()).unwrap(),
        server
    );
    assert_eq!(
        enums::ClientDhInnerData::from_bytes(&client.to_bytes()).unwrap(),
        client
    );
}

#[test]
fn dh_gen_answers_cover_all_three_verdicts() {
    let answers = [
        enums::SetClientDhParamsAnswer::DhGenOk(types::DhGenOk {
            nonce: [1; 16],
            server_nonce: [2; 16],
            new_nonce_hash1: [3; 16],
        }),
        enums::SetClientDhParamsAnswer::DhGenRetry(types::DhGenRetry {
            nonce: [1; 16],
            server_nonce: [2; 16],
            new_nonce_hash2: [4; 16],
        }),
        enums::SetClientDhParamsAnswer::DhGenFail(types::DhGenFail {
            nonce: [1; 16],
            server_nonce: [2; 16],
            new_nonce_hash3: [5; 16],
        }),
    ];
    for answer in answers {
        assert_eq!(
            enums::SetClientDhParamsAnswer::from_bytes(&answer.to_bytes()).unwrap(),
            answer
        );
    }
}

#[test]
fn boxed_decode_rejects_a_foreign_constructor() {
    use marconi_tl_types::deserialize::Error;
    let pong = enums::Pong::Pong(types::Pong {
        msg_id: 1,
        ping_id: 2,
    });
    assert_eq!(
        enums::SetClientDhParamsAnswer::from_bytes(&pong.to_bytes()),
        Err(Error::UnexpectedConstructor {
            id: types::Pong::CONSTRUCTOR_ID
        })
    );
}

// ── Service constructors ──────────────────────────────────────────────────────

#[test]
fn msgs_ack_nests_a_boxed_vector() {
    let ack = enums::MsgsAck::MsgsAck(types::MsgsAck {
        msg_ids: vec![0x0102030405060708, -1],
    });
    let bytes = ack.to_bytes();
    assert_eq!(&bytes[..4], &0x62d6b459u32.to_le_bytes());
    assert_eq!(&bytes[4..8], &0x1cb5c415u32.to_le_bytes());
    assert_eq!(enums::MsgsAck::from_bytes(&bytes).unwrap(), ack);
}

#[test]
fn bad_msg_notification_distinguishes_salt_updates() {
    let plain = enums::BadMsgNotification::Notification(types::BadMsgNotification {
        bad_msg_id: 10,
        bad_msg_seqno: 3,
        error_code: 16,
    });
    let salted = enums::BadMsgNotification::ServerSalt(types::BadServerSalt {
        bad_msg_id: 10,
        bad_msg_seqno: 3,
        error_code: 48,
        new_server_salt: 0x1122334455667788,
    });
    assert_eq!(
        enums::BadMsgNotification::from_bytes(&plain.to_bytes()).unwrap(),
        plain
    );
    assert_eq!(
        enums::BadMsgNotification::from_bytes(&salted.to_bytes()).unwrap(),
        salted
    );
}

#[test]
fn roundtrip_new_session_and_detailed_info() {
    let session = enums::NewSession::Created(types::NewSessionCreated {
        first_msg_id: 0x5555,
        unique_id: -9,
        server_salt: 0x0102030405060708,
    });
    let info = enums::MsgDetailedInfo::Info(types::MsgDetailedInfo {
        msg_id: 1,
        answer_msg_id: 2,
        bytes: 64,
        status: 0,
    });
    let new_info = enums::MsgDetailedInfo::NewInfo(types::MsgNewDetailedInfo {
        answer_msg_id: 2,
        bytes: 64,
        status: 0,
    });
    assert_eq!(
        enums::NewSession::from_bytes(&session.to_bytes()).unwrap(),
        session
    );
    assert_eq!(
        enums::MsgDetailedInfo::from_bytes(&info.to_bytes()).unwrap(),
        info
    );
    assert_eq!(
        enums::MsgDetailedInfo::from_bytes(&new_info.to_bytes()).unwrap(),
        new_info
    );
}

#[test]
fn roundtrip_rpc_error_and_gzip() {
    let error = enums::RpcError::RpcError(types::RpcError {
        error_code: 420,
        error_message: "FLOOD_WAIT_31".to_owned(),
    });
    let gzip = enums::GzipPacked::GzipPacked(types::GzipPacked {
        packed_data: vec![0x1f, 0x8b, 0x08, 0x00],
    });
    assert_eq!(
        enums::RpcError::from_bytes(&error.to_bytes()).unwrap(),
        error
    );
    assert_eq!(enums::GzipPacked::from_bytes(&gzip.to_bytes()).unwrap(), gzip);
}

// ── RemoteCall wiring ─────────────────────────────────────────────────────────

fn parse_reply<C: RemoteCall>(_call: &C, reply: &[u8]) -> C::Return {
    C::Return::from_bytes(reply).unwrap()
}

#[test]
fn calls_know_how_to_parse_their_answers() {
    let call = functions::Ping { ping_id: 77 };
    let reply = enums::Pong::Pong(types::Pong {
        msg_id: 0x0102,
        ping_id: 77,
    });
    let enums::Pong::Pong(parsed) = parse_reply(&call, &reply.to_bytes());
    assert_eq!(parsed.ping_id, 77);
}

#[test]
fn delayed_ping_answers_with_the_same_pong_type() {
    let call = functions::PingDelayDisconnect {
        ping_id: -3,
        disconnect_delay: 75,
    };
    let bytes = call.to_bytes();
    assert_eq!(&bytes[..4], &0xf3427b8cu32.to_le_bytes());
    let reply = enums::Pong::Pong(types::Pong {
        msg_id: 8,
        ping_id: -3,
    });
    let enums::Pong::Pong(parsed) = parse_reply(&call, &reply.to_bytes());
    assert_eq!(parsed.ping_id, -3);
}
