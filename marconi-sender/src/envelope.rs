//! Classification of decrypted payloads.
//!
//! A decrypted frame carries one payload that may be a container of
//! further messages, a compressed blob, an answer to one of our
//! requests, session bookkeeping, or something addressed to nobody in
//! particular (an update). [`classify`] flattens all of that into a
//! list of [`InboundMessage`]s for the dispatch loop.

use std::io::Read;

use marconi_tl_types::mtproto::{enums, types};
use marconi_tl_types::{Cursor, Deserializable, Identifiable};

use crate::errors::{InvocationError, RpcError};

/// `rpc_result` and `msg_container` have no schema entry; their ids
/// are part of the protocol itself.
pub(crate) const RPC_RESULT_ID: u32 = 0xf35c_6d01;
pub(crate) const MSG_CONTAINER_ID: u32 = 0x73f1_f8dc;

/// Constructor ids of the update wrappers in the base schema. The
/// session layer forwards their bodies without understanding them.
const UPDATE_IDS: [u32; 6] = [
    0xe317_af7e, // updatesTooLong
    0x313b_c7f8, // updateShortMessage
    0x4d6d_eea5, // updateShortChatMessage
    0x78d4_dec1, // updateShort
    0x725b_04c3, // updatesCombined
    0x74ae_4240, // updates
];

/// One fully unwrapped inbound message.
pub(crate) struct InboundMessage {
    pub(crate) msg_id: i64,
    /// Content-related messages (odd sequence number) must be
    /// acknowledged or the server re-sends them.
    pub(crate) requires_ack: bool,
    pub(crate) inbound: Inbound,
}

pub(crate) enum Inbound {
    /// The answer to the request we sent with `req_msg_id`.
    RpcResult { req_msg_id: i64, body: Vec<u8> },
    Pong(types::Pong),
    BadServerSalt(types::BadServerSalt),
    BadMsgNotification(types::BadMsgNotification),
    NewSessionCreated(types::NewSessionCreated),
    MsgsAck(types::MsgsAck),
    /// The server holds an answer with this id for us.
    DetailedInfo { answer_msg_id: i64 },
    /// An update wrapper, forwarded raw.
    Update(Vec<u8>),
    /// A constructor this layer does not know.
    Unmatched(Vec<u8>),
}

/// Recursively unwraps `body`, appending every contained message.
pub(crate) fn classify(
    msg_id: i64,
    seq_no: i32,
    body: &[u8],
    out: &mut Vec<InboundMessage>,
) -> Result<(), InvocationError> {
    if body.len() < 4 {
        return Err(InvocationError::Deserialize(
            "payload shorter than a constructor id".into(),
        ));
    }
    let constructor = u32::from_le_bytes(body[..4].try_into().unwrap());
    let requires_ack = seq_no % 2 != 0;
    let mut push = |inbound| {
        out.push(InboundMessage {
            msg_id,
            requires_ack,
            inbound,
        })
    };

    match constructor {
        MSG_CONTAINER_ID => {
            let mut cursor = Cursor::from_slice(&body[4..]);
            let count = i32::deserialize(&mut cursor)?;
            for _ in 0..count {
                let inner_msg_id = i64::deserialize(&mut cursor)?;
                let inner_seq_no = i32::deserialize(&mut cursor)?;
                let len = u32::deserialize(&mut cursor)? as usize;
                let inner = cursor.read(len)?;
                classify(inner_msg_id, inner_seq_no, inner, out)?;
            }
        }
        types::GzipPacked::CONSTRUCTOR_ID => {
            let packed = types::GzipPacked::from_bytes(&body[4..])?;
            let inflated = inflate(&packed.packed_data)?;
            classify(msg_id, seq_no, &inflated, out)?;
        }
        RPC_RESULT_ID => {
            if body.len() < 12 {
                return Err(InvocationError::Deserialize("rpc_result too short".into()));
            }
            let req_msg_id = i64::from_le_bytes(body[4..12].try_into().unwrap());
            let mut answer = body[12..].to_vec();
            if answer.len() >= 4
                && u32::from_le_bytes(answer[..4].try_into().unwrap())
                    == types::GzipPacked::CONSTRUCTOR_ID
            {
                let packed = types::GzipPacked::from_bytes(&answer[4..])?;
                answer = inflate(&packed.packed_data)?;
            }
            push(Inbound::RpcResult {
                req_msg_id,
                body: answer,
            });
        }
        types::Pong::CONSTRUCTOR_ID => {
            let enums::Pong::Pong(pong) = enums::Pong::from_bytes(body)?;
            push(Inbound::Pong(pong));
        }
        types::BadServerSalt::CONSTRUCTOR_ID | types::BadMsgNotification::CONSTRUCTOR_ID => {
            match enums::BadMsgNotification::from_bytes(body)? {
                enums::BadMsgNotification::ServerSalt(salt) => {
                    push(Inbound::BadServerSalt(salt));
                }
                enums::BadMsgNotification::Notification(notification) => {
                    push(Inbound::BadMsgNotification(notification));
                }
            }
        }
        types::NewSessionCreated::CONSTRUCTOR_ID => {
            let enums::NewSession::Created(created) = enums::NewSession::from_bytes(body)?;
            push(Inbound::NewSessionCreated(created));
        }
        types::MsgsAck::CONSTRUCTOR_ID => {
            let enums::MsgsAck::MsgsAck(ack) = enums::MsgsAck::from_bytes(body)?;
            push(Inbound::MsgsAck(ack));
        }
        types::MsgDetailedInfo::CONSTRUCTOR_ID | types::MsgNewDetailedInfo::CONSTRUCTOR_ID => {
            let answer_msg_id = match enums::MsgDetailedInfo::from_bytes(body)? {
                enums::MsgDetailedInfo::Info(info) => info.answer_msg_id,
                enums::MsgDetailedInfo::NewInfo(info) => info.answer_msg_id,
            };
            push(Inbound::DetailedInfo { answer_msg_id });
        }
        id if UPDATE_IDS.contains(&id) => push(Inbound::Update(body.to_vec())),
        _ => push(Inbound::Unmatched(body.to_vec())),
    }
    Ok(())
}

/// Turns an `rpc_result` body into the caller's answer, unwrapping a
/// leading `rpc_error` into [`InvocationError::Rpc`].
pub(crate) fn into_rpc_answer(body: Vec<u8>) -> Result<Vec<u8>, InvocationError> {
    if body.len() >= 4
        && u32::from_le_bytes(body[..4].try_into().unwrap()) == types::RpcError::CONSTRUCTOR_ID
    {
        let enums::RpcError::RpcError(error) = enums::RpcError::from_bytes(&body)?;
        return Err(InvocationError::Rpc(RpcError::from_telegram(
            error.error_code,
            &error.error_message,
        )));
    }
    Ok(body)
}

/// Inflates a `gzip_packed` payload. Falls back to a bare zlib stream
/// for peers that strip the gzip wrapper.
fn inflate(data: &[u8]) -> Result<Vec<u8>, InvocationError> {
    let mut out = Vec::new();
    if flate2::read::GzDecoder::new(data)
        .read_to_end(&mut out)
        .is_ok()
        && !out.is_empty()
    {
        return Ok(out);
    }
    out.clear();
    flate2::read::ZlibDecoder::new(data)
        .read_to_end(&mut out)
        .map_err(|_| InvocationError::Deserialize("gzip_packed payload did not inflate".into()))?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    use marconi_tl_types::Serializable;

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder =
            flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    fn container(items: &[(i64, i32, Vec<u8>)]) -> Vec<u8> {
        let mut body = MSG_CONTAINER_ID.to_le_bytes().to_vec();
        body.extend_from_slice(&(items.len() as i32).to_le_bytes());
        for (msg_id, seq_no, bytes) in items {
            body.extend_from_slice(&msg_id.to_le_bytes());
            body.extend_from_slice(&seq_no.to_le_bytes());
            body.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
            body.extend_from_slice(bytes);
        }
        body
    }

    fn rpc_result(req_msg_id: i64, answer: &[u8]) -> Vec<u8> {
        let mut body = RPC_RESULT_ID.to_le_bytes().to_vec();
        body.extend_from_slice(&req_msg_id.to_le_bytes());
        body.extend_from_slice(answer);
        body
    }

    fn classify_one(msg_id: i64, seq_no: i32, body: &[u8]) -> Vec<InboundMessage> {
        let mut out = Vec::new();
        classify(msg_id, seq_no, body, &mut out).unwrap();
        out
    }

    #[test]
    fn containers_flatten_with_per_item_ack_flags() {
        let pong = enums::Pong::Pong(types::Pong {
            msg_id: 11,
            ping_id: 7,
        })
        .to_bytes();
        let answer = rpc_result(11, &enums::Pong::Pong(types::Pong {
            msg_id: 11,
            ping_id: 7,
        })
        .to_bytes());
        let body = container(&[(100, 2, pong), (102, 3, answer)]);

        let messages = classify_one(1, 0, &body);
        assert_eq!(messages.len(), 2);
        assert!(!messages[0].requires_ack);
        assert!(messages[1].requires_ack);
        assert_eq!(messages[0].msg_id, 100);
        assert!(matches!(messages[0].inbound, Inbound::Pong(_)));
        assert!(matches!(
            messages[1].inbound,
            Inbound::RpcResult { req_msg_id: 11, .. }
        ));
    }

    #[test]
    fn gzip_packed_is_inflated_and_reclassified() {
        let pong = enums::Pong::Pong(types::Pong {
            msg_id: 3,
            ping_id: 4,
        })
        .to_bytes();
        let packed = types::GzipPacked {
            packed_data: gzip(&pong),
        };
        let mut body = types::GzipPacked::CONSTRUCTOR_ID.to_le_bytes().to_vec();
        body.extend_from_slice(&packed.to_bytes());

        let messages = classify_one(5, 1, &body);
        assert_eq!(messages.len(), 1);
        match &messages[0].inbound {
            Inbound::Pong(pong) => assert_eq!(pong.ping_id, 4),
            _ => panic!("expected a pong"),
        }
    }

    #[test]
    fn compressed_rpc_answers_are_inflated() {
        let answer = b"not really TL, but opaque bytes are fine here".to_vec();
        let packed = types::GzipPacked {
            packed_data: gzip(&answer),
        };
        let mut wrapped = types::GzipPacked::CONSTRUCTOR_ID.to_le_bytes().to_vec();
        wrapped.extend_from_slice(&packed.to_bytes());
        let body = rpc_result(77, &wrapped);

        let messages = classify_one(9, 1, &body);
        match &messages[0].inbound {
            Inbound::RpcResult { req_msg_id, body } => {
                assert_eq!(*req_msg_id, 77);
                assert_eq!(body, &answer);
            }
            _ => panic!("expected an rpc result"),
        }
    }

    #[test]
    fn bad_server_salt_is_recognized() {
        let salt = enums::BadMsgNotification::ServerSalt(types::BadServerSalt {
            bad_msg_id: 10,
            bad_msg_seqno: 1,
            error_code: 48,
            new_server_salt: 0x1234,
        })
        .to_bytes();
        let messages = classify_one(2, 0, &salt);
        match &messages[0].inbound {
            Inbound::BadServerSalt(salt) => assert_eq!(salt.new_server_salt, 0x1234),
            _ => panic!("expected bad_server_salt"),
        }
    }

    #[test]
    fn update_wrappers_are_forwarded_raw() {
        let body = 0xe317_af7eu32.to_le_bytes().to_vec();
        let messages = classify_one(4, 1, &body);
        match &messages[0].inbound {
            Inbound::Update(raw) => assert_eq!(raw, &body),
            _ => panic!("expected an update"),
        }
    }

    #[test]
    fn unknown_constructors_are_kept_whole() {
        let body = 0xdead_beefu32.to_le_bytes().to_vec();
        let messages = classify_one(4, 1, &body);
        match &messages[0].inbound {
            Inbound::Unmatched(raw) => assert_eq!(raw, &body),
            _ => panic!("expected an unmatched payload"),
        }
    }

    #[test]
    fn truncated_container_is_an_error() {
        let pong = enums::Pong::Pong(types::Pong {
            msg_id: 1,
            ping_id: 2,
        })
        .to_bytes();
        let mut body = container(&[(100, 2, pong)]);
        body.truncate(body.len() - 5);
        let mut out = Vec::new();
        assert!(matches!(
            classify(1, 0, &body, &mut out),
            Err(InvocationError::Deserialize(_))
        ));
    }

    #[test]
    fn rpc_errors_become_invocation_errors() {
        let error = enums::RpcError::RpcError(types::RpcError {
            error_code: 420,
            error_message: "FLOOD_WAIT_10".into(),
        })
        .to_bytes();
        match into_rpc_answer(error) {
            Err(InvocationError::Rpc(rpc)) => {
                assert_eq!(rpc.code, 420);
                assert_eq!(rpc.name, "FLOOD_WAIT");
                assert_eq!(rpc.value, Some(10));
            }
            other => panic!("expected an rpc error, got {other:?}"),
        }
    }

    #[test]
    fn plain_answers_pass_through() {
        let body = vec![1, 2, 3, 4];
        assert_eq!(into_rpc_answer(body.clone()).unwrap(), body);
    }
}
