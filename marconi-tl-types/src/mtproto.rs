//! The MTProto service schema, maintained by hand.
//!
//! The session layer speaks a small, frozen vocabulary: the three key
//! generation functions with their answers, pings, acknowledgements and the
//! handful of notifications the server pushes on its own. The definitions
//! here mirror the layout machine-generated schema code would have, with
//! bare fields on the [`types`] structs and constructor identifiers added
//! by the [`enums`] and [`functions`] impls.
//!
//! Two service constructors are absent on purpose. `msg_container` holds
//! length-prefixed raw messages and `rpc_result` holds an arbitrary answer
//! body, so neither can be decoded without outside knowledge; the message
//! layer takes those apart itself.

/// Bare constructors: fields only, no identifier on the wire.
pub mod types {
    use crate::deserialize::{Buffer, Result};
    use crate::{Deserializable, Identifiable, Serializable};

    /// The server's opening answer during key generation, carrying the
    /// factorization challenge and the RSA fingerprints it accepts.
    #[derive(Debug, Clone, PartialEq)]
    pub struct ResPq {
        pub nonce: [u8; 16],
        pub server_nonce: [u8; 16],
        pub pq: Vec<u8>,
        pub server_public_key_fingerprints: Vec<i64>,
    }

    impl Identifiable for ResPq {
        const CONSTRUCTOR_ID: u32 = 0x05162463;
    }

    impl Serializable for ResPq {
        fn serialize(&self, buf: &mut impl Extend<u8>) {
            self.nonce.serialize(buf);
            self.server_nonce.serialize(buf);
            self.pq.serialize(buf);
            self.server_public_key_fingerprints.serialize(buf);
        }
    }

    impl Deserializable for ResPq {
        fn deserialize(buf: Buffer) -> Result<Self> {
            let nonce = <[u8; 16]>::deserialize(buf)?;
            let server_nonce = <[u8; 16]>::deserialize(buf)?;
            let pq = Vec::<u8>::deserialize(buf)?;
            let server_public_key_fingerprints = Vec::<i64>::deserialize(buf)?;
            Ok(Self {
                nonce,
                server_nonce,
                pq,
                server_public_key_fingerprints,
            })
        }
    }

    /// The proof of work the client sends back under RSA, binding the
    /// factored challenge to the secret `new_nonce`.
    #[derive(Debug, Clone, PartialEq)]
    pub struct PqInnerData {
        pub pq: Vec<u8>,
        pub p: Vec<u8>,
        pub q: Vec<u8>,
        pub nonce: [u8; 16],
        pub server_nonce: [u8; 16],
        pub new_nonce: [u8; 32],
    }

    impl Identifiable for PqInnerData {
        const CONSTRUCTOR_ID: u32 = 0x83c95aec;
    }

    impl Serializable for PqInnerData {
        fn serialize(&self, buf: &mut impl Extend<u8>) {
            self.pq.serialize(buf);
            self.p.serialize(buf);
            self.q.serialize(buf);
            self.nonce.serialize(buf);
            self.server_nonce.serialize(buf);
            self.new_nonce.serialize(buf);
        }
    }

    impl Deserializable for PqInnerData {
        fn deserialize(buf: Buffer) -> Result<Self> {
            let pq = Vec::<u8>::deserialize(buf)?;
            let p = Vec::<u8>::deserialize(buf)?;
            let q = Vec::<u8>::deserialize(buf)?;
            let nonce = <[u8; 16]>::deserialize(buf)?;
            let server_nonce = <[u8; 16]>::deserialize(buf)?;
            let new_nonce = <[u8; 32]>::deserialize(buf)?;
            Ok(Self {
                pq,
                p,
                q,
                nonce,
                server_nonce,
                new_nonce,
            })
        }
    }

    /// Rejection of `req_DH_params`, authenticated by a hash of the
    /// still-secret `new_nonce`.
    #[derive(Debug, Clone, PartialEq)]
    pub struct ServerDhParamsFail {
        pub nonce: [u8; 16],
        pub server_nonce: [u8; 16],
        pub new_nonce_hash: [u8; 16],
    }

    impl Identifiable for ServerDhParamsFail {
        const CONSTRUCTOR_ID: u32 = 0x79cb045d;
    }

    impl Serializable for ServerDhParamsFail {
        fn serialize(&self, buf: &mut impl Extend<u8>) {
            self.nonce.serialize(buf);
            self.server_nonce.serialize(buf);
            self.new_nonce_hash.serialize(buf);
        }
    }

    impl Deserializable for ServerDhParamsFail {
        fn deserialize(buf: Buffer) -> Result<Self> {
            let nonce = <[u8; 16]>::deserialize(buf)?;
            let server_nonce = <[u8; 16]>::deserialize(buf)?;
            let new_nonce_hash = <[u8; 16]>::deserialize(buf)?;
            Ok(Self {
                nonce,
                server_nonce,
                new_nonce_hash,
            })
        }
    }

    /// Acceptance of `req_DH_params`; `encrypted_answer` hides a
    /// [`ServerDhInnerData`] under the temporary nonce-derived key.
    #[derive(Debug, Clone, PartialEq)]
    pub struct ServerDhParamsOk {
        pub nonce: [u8; 16],
        pub server_nonce: [u8; 16],
        pub encrypted_answer: Vec<u8>,
    }

    impl Identifiable for ServerDhParamsOk {
        const CONSTRUCTOR_ID: u32 = 0xd0e8075c;
    }

    impl Serializable for ServerDhParamsOk {
        fn serialize(&self, buf: &mut impl Extend<u8>) {
            self.nonce.serialize(buf);
            self.server_nonce.serialize(buf);
            self.encrypted_answer.serialize(buf);
        }
    }

    impl Deserializable for ServerDhParamsOk {
        fn deserialize(buf: Buffer) -> Result<Self> {
            let nonce = <[u8; 16]>::deserialize(buf)?;
            let server_nonce = <[u8; 16]>::deserialize(buf)?;
            let encrypted_answer = Vec::<u8>::deserialize(buf)?;
            Ok(Self {
                nonce,
                server_nonce,
                encrypted_answer,
            })
        }
    }

    /// The server's half of the Diffie-Hellman exchange.
    #[derive(Debug, Clone, PartialEq)]
    pub struct ServerDhInnerData {
        pub nonce: [u8; 16],
        pub server_nonce: [u8; 16],
        pub g: i32,
        pub dh_prime: Vec<u8>,
        pub g_a: Vec<u8>,
        pub server_time: i32,
    }

    impl Identifiable for ServerDhInnerData {
        const CONSTRUCTOR_ID: u32 = 0xb5890dba;
    }

    impl Serializable for ServerDhInnerData {
        fn serialize(&self, buf: &mut impl Extend<u8>) {
            self.nonce.serialize(buf);
            self.server_nonce.serialize(buf);
            self.g.serialize(buf);
            self.dh_prime.serialize(buf);
            self.g_a.serialize(buf);
            self.server_time.serialize(buf);
        }
    }

    impl Deserializable for ServerDhInnerData {
        fn deserialize(buf: Buffer) -> Result<Self> {
            let nonce = <[u8; 16]>::deserialize(buf)?;
            let server_nonce = <[u8; 16]>::deserialize(buf)?;
            let g = i32::deserialize(buf)?;
            let dh_prime = Vec::<u8>::deserialize(buf)?;
            let g_a = Vec::<u8>::deserialize(buf)?;
            let server_time = i32::deserialize(buf)?;
            Ok(Self {
                nonce,
                server_nonce,
                g,
                dh_prime,
                g_a,
                server_time,
            })
        }
    }

    /// The client's half of the Diffie-Hellman exchange, sent encrypted
    /// inside `set_client_DH_params`.
    #[derive(Debug, Clone, PartialEq)]
    pub struct ClientDhInnerData {
        pub nonce: [u8; 16],
        pub server_nonce: [u8; 16],
        pub retry_id: i64,
        pub g_b: Vec<u8>,
    }

    impl Identifiable for ClientDhInnerData {
        const CONSTRUCTOR_ID: u32 = 0x6643b654;
    }

    impl Serializable for ClientDhInnerData {
        fn serialize(&self, buf: &mut impl Extend<u8>) {
            self.nonce.serialize(buf);
            self.server_nonce.serialize(buf);
            self.retry_id.serialize(buf);
            self.g_b.serialize(buf);
        }
    }

    impl Deserializable for ClientDhInnerData {
        fn deserialize(buf: Buffer) -> Result<Self> {
            let nonce = <[u8; 16]>::deserialize(buf)?;
            let server_nonce = <[u8; 16]>::deserialize(buf)?;
            let retry_id = i64::deserialize(buf)?;
            let g_b = Vec::<u8>::deserialize(buf)?;
            Ok(Self {
                nonce,
                server_nonce,
                retry_id,
                g_b,
            })
        }
    }

    /// Key generation succeeded; `new_nonce_hash1` proves the server
    /// derived the same key.
    #[derive(Debug, Clone, PartialEq)]
    pub struct DhGenOk {
        pub nonce: [u8; 16],
        pub server_nonce: [u8; 16],
        pub new_nonce_hash1: [u8; 16],
    }

    impl Identifiable for DhGenOk {
        const CONSTRUCTOR_ID: u32 = 0x3bcbf734;
    }

    impl Serializable for DhGenOk {
        fn serialize(&self, buf: &mut impl Extend<u8>) {
            self.nonce.serialize(buf);
            self.server_nonce.serialize(buf);
            self.new_nonce_hash1.serialize(buf);
        }
    }

    impl Deserializable for DhGenOk {
        fn deserialize(buf: Buffer) -> Result<Self> {
            let nonce = <[u8; 16]>::deserialize(buf)?;
            let server_nonce = <[u8; 16]>::deserialize(buf)?;
            let new_nonce_hash1 = <[u8; 16]>::deserialize(buf)?;
            Ok(Self {
                nonce,
                server_nonce,
                new_nonce_hash1,
            })
        }
    }

    /// The server asks for another exchange with a fresh client exponent.
    #[derive(Debug, Clone, PartialEq)]
    pub struct DhGenRetry {
        pub nonce: [u8; 16],
        pub server_nonce: [u8; 16],
        pub new_nonce_hash2: [u8; 16],
    }

    impl Identifiable for DhGenRetry {
        const CONSTRUCTOR_ID: u32 = 0x46dc1fb9;
    }

    impl Serializable for DhGenRetry {
        fn serialize(&self, buf: &mut impl Extend<u8>) {
            self.nonce.serialize(buf);
            self.server_nonce.serialize(buf);
            self.new_nonce_hash2.serialize(buf);
        }
    }

    impl Deserializable for DhGenRetry {
        fn deserialize(buf: Buffer) -> Result<Self> {
            let nonce = <[u8; 16]>::deserialize(buf)?;
            let server_nonce = <[u8; 16]>::deserialize(buf)?;
            let new_nonce_hash2 = <[u8; 16]>::deserialize(buf)?;
            Ok(Self {
                nonce,
                server_nonce,
                new_nonce_hash2,
            })
        }
    }

    /// Key generation failed for good.
    #[derive(Debug, Clone, PartialEq)]
    pub struct DhGenFail {
        pub nonce: [u8; 16],
        pub server_nonce: [u8; 16],
        pub new_nonce_hash3: [u8; 16],
    }

    impl Identifiable for DhGenFail {
        const CONSTRUCTOR_ID: u32 = 0xa69dae02;
    }

    impl Serializable for DhGenFail {
        fn serialize(&self, buf: &mut impl Extend<u8>) {
            self.nonce.serialize(buf);
            self.server_nonce.serialize(buf);
            self.new_nonce_hash3.serialize(buf);
        }
    }

    impl Deserializable for DhGenFail {
        fn deserialize(buf: Buffer) -> Result<Self> {
            let nonce = <[u8; 16]>::deserialize(buf)?;
            let server_nonce = <[u8; 16]>::deserialize(buf)?;
            let new_nonce_hash3 = <[u8; 16]>::deserialize(buf)?;
            Ok(Self {
                nonce,
                server_nonce,
                new_nonce_hash3,
            })
        }
    }

    /// An error that stands in for the answer to some request.
    #[derive(Debug, Clone, PartialEq)]
    pub struct RpcError {
        pub error_code: i32,
        pub error_message: String,
    }

    impl Identifiable for RpcError {
        const CONSTRUCTOR_ID: u32 = 0x2144ca19;
    }

    impl Serializable for RpcError {
        fn serialize(&self, buf: &mut impl Extend<u8>) {
            self.error_code.serialize(buf);
            self.error_message.serialize(buf);
        }
    }

    impl Deserializable for RpcError {
        fn deserialize(buf: Buffer) -> Result<Self> {
            let error_code = i32::deserialize(buf)?;
            let error_message = String::deserialize(buf)?;
            Ok(Self {
                error_code,
                error_message,
            })
        }
    }

    /// The answer to either ping flavor.
    #[derive(Debug, Clone, PartialEq)]
    pub struct Pong {
        pub msg_id: i64,
        pub ping_id: i64,
    }

    impl Identifiable for Pong {
        const CONSTRUCTOR_ID: u32 = 0x347773c5;
    }

    impl Serializable for Pong {
        fn serialize(&self, buf: &mut impl Extend<u8>) {
            self.msg_id.serialize(buf);
            self.ping_id.serialize(buf);
        }
    }

    impl Deserializable for Pong {
        fn deserialize(buf: Buffer) -> Result<Self> {
            let msg_id = i64::deserialize(buf)?;
            let ping_id = i64::deserialize(buf)?;
            Ok(Self { msg_id, ping_id })
        }
    }

    /// Pushed by the server the first time it sees a session, carrying the
    /// salt it expects from now on.
    #[derive(Debug, Clone, PartialEq)]
    pub struct NewSessionCreated {
        pub first_msg_id: i64,
        pub unique_id: i64,
        pub server_salt: i64,
    }

    impl Identifiable for NewSessionCreated {
        const CONSTRUCTOR_ID: u32 = 0x9ec20908;
    }

    impl Serializable for NewSessionCreated {
        fn serialize(&self, buf: &mut impl Extend<u8>) {
            self.first_msg_id.serialize(buf);
            self.unique_id.serialize(buf);
            self.server_salt.serialize(buf);
        }
    }

    impl Deserializable for NewSessionCreated {
        fn deserialize(buf: Buffer) -> Result<Self> {
            let first_msg_id = i64::deserialize(buf)?;
            let unique_id = i64::deserialize(buf)?;
            let server_salt = i64::deserialize(buf)?;
            Ok(Self {
                first_msg_id,
                unique_id,
                server_salt,
            })
        }
    }

    /// Confirms receipt of the listed messages. Flows both ways.
    #[derive(Debug, Clone, PartialEq)]
    pub struct MsgsAck {
        pub msg_ids: Vec<i64>,
    }

    impl Identifiable for MsgsAck {
        const CONSTRUCTOR_ID: u32 = 0x62d6b459;
    }

    impl Serializable for MsgsAck {
        fn serialize(&self, buf: &mut impl Extend<u8>) {
            self.msg_ids.serialize(buf);
        }
    }

    impl Deserializable for MsgsAck {
        fn deserialize(buf: Buffer) -> Result<Self> {
            let msg_ids = Vec::<i64>::deserialize(buf)?;
            Ok(Self { msg_ids })
        }
    }

    /// A message of ours was rejected; `error_code` says why.
    #[derive(Debug, Clone, PartialEq)]
    pub struct BadMsgNotification {
        pub bad_msg_id: i64,
        pub bad_msg_seqno: i32,
        pub error_code: i32,
    }

    impl Identifiable for BadMsgNotification {
        const CONSTRUCTOR_ID: u32 = 0xa7eff811;
    }

    impl Serializable for BadMsgNotification {
        fn serialize(&self, buf: &mut impl Extend<u8>) {
            self.bad_msg_id.serialize(buf);
            self.bad_msg_seqno.serialize(buf);
            self.error_code.serialize(buf);
        }
    }

    impl Deserializable for BadMsgNotification {
        fn deserialize(buf: Buffer) -> Result<Self> {
            let bad_msg_id = i64::deserialize(buf)?;
            let bad_msg_seqno = i32::deserialize(buf)?;
            let error_code = i32::deserialize(buf)?;
            Ok(Self {
                bad_msg_id,
                bad_msg_seqno,
                error_code,
            })
        }
    }

    /// A message of ours carried a stale salt; the replacement to use is
    /// included.
    #[derive(Debug, Clone, PartialEq)]
    pub struct BadServerSalt {
        pub bad_msg_id: i64,
        pub bad_msg_seqno: i32,
        pub error_code: i32,
        pub new_server_salt: i64,
    }

    impl Identifiable for BadServerSalt {
        const CONSTRUCTOR_ID: u32 = 0xedab447b;
    }

    impl Serializable for BadServerSalt {
        fn serialize(&self, buf: &mut impl Extend<u8>) {
            self.bad_msg_id.serialize(buf);
            self.bad_msg_seqno.serialize(buf);
            self.error_code.serialize(buf);
            self.new_server_salt.serialize(buf);
        }
    }

    impl Deserializable for BadServerSalt {
        fn deserialize(buf: Buffer) -> Result<Self> {
            let bad_msg_id = i64::deserialize(buf)?;
            let bad_msg_seqno = i32::deserialize(buf)?;
            let error_code = i32::deserialize(buf)?;
            let new_server_salt = i64::deserialize(buf)?;
            Ok(Self {
                bad_msg_id,
                bad_msg_seqno,
                error_code,
                new_server_salt,
            })
        }
    }

    /// The server already answered `msg_id`; the answer's own identifier is
    /// handed over so it can be acknowledged or re-requested.
    #[derive(Debug, Clone, PartialEq)]
    pub struct MsgDetailedInfo {
        pub msg_id: i64,
        pub answer_msg_id: i64,
        pub bytes: i32,
        pub status: i32,
    }

    impl Identifiable for MsgDetailedInfo {
        const CONSTRUCTOR_ID: u32 = 0x276d3ec6;
    }

    impl Serializable for MsgDetailedInfo {
        fn serialize(&self, buf: &mut impl Extend<u8>) {
            self.msg_id.serialize(buf);
            self.answer_msg_id.serialize(buf);
            self.bytes.serialize(buf);
            self.status.serialize(buf);
        }
    }

    impl Deserializable for MsgDetailedInfo {
        fn deserialize(buf: Buffer) -> Result<Self> {
            let msg_id = i64::deserialize(buf)?;
            let answer_msg_id = i64::deserialize(buf)?;
            let bytes = i32::deserialize(buf)?;
            let status = i32::deserialize(buf)?;
            Ok(Self {
                msg_id,
                answer_msg_id,
                bytes,
                status,
            })
        }
    }

    /// Like [`MsgDetailedInfo`] but for an answer the client never asked
    /// about, usually after a reconnect.
    #[derive(Debug, Clone, PartialEq)]
    pub struct MsgNewDetailedInfo {
        pub answer_msg_id: i64,
        pub bytes: i32,
        pub status: i32,
    }

    impl Identifiable for MsgNewDetailedInfo {
        const CONSTRUCTOR_ID: u32 = 0x809db6df;
    }

    impl Serializable for MsgNewDetailedInfo {
        fn serialize(&self, buf: &mut impl Extend<u8>) {
            self.answer_msg_id.serialize(buf);
            self.bytes.serialize(buf);
            self.status.serialize(buf);
        }
    }

    impl Deserializable for MsgNewDetailedInfo {
        fn deserialize(buf: Buffer) -> Result<Self> {
            let answer_msg_id = i64::deserialize(buf)?;
            let bytes = i32::deserialize(buf)?;
            let status = i32::deserialize(buf)?;
            Ok(Self {
                answer_msg_id,
                bytes,
                status,
            })
        }
    }

    /// A DEFLATE-compressed TL object standing in for an uncompressed one.
    #[derive(Debug, Clone, PartialEq)]
    pub struct GzipPacked {
        pub packed_data: Vec<u8>,
    }

    impl Identifiable for GzipPacked {
        const CONSTRUCTOR_ID: u32 = 0x3072cfa1;
    }

    impl Serializable for GzipPacked {
        fn serialize(&self, buf: &mut impl Extend<u8>) {
            self.packed_data.serialize(buf);
        }
    }

    impl Deserializable for GzipPacked {
        fn deserialize(buf: Buffer) -> Result<Self> {
            let packed_data = Vec::<u8>::deserialize(buf)?;
            Ok(Self { packed_data })
        }
    }
}

/// Boxed constructors: the identifier on the wire picks the variant.
pub mod enums {
    use crate::deserialize::{Buffer, Error, Result};
    use crate::{Deserializable, Identifiable, Serializable};

    /// The one answer to `req_pq_multi`.
    #[derive(Debug, Clone, PartialEq)]
    pub enum ResPq {
        ResPq(crate::mtproto::types::ResPq),
    }

    impl Serializable for ResPq {
        fn serialize(&self, buf: &mut impl Extend<u8>) {
            match self {
                Self::ResPq(x) => {
                    crate::mtproto::types::ResPq::CONSTRUCTOR_ID.serialize(buf);
                    x.serialize(buf)
                }
            }
        }
    }

    impl Deserializable for ResPq {
        fn deserialize(buf: Buffer) -> Result<Self> {
            match u32::deserialize(buf)? {
                crate::mtproto::types::ResPq::CONSTRUCTOR_ID => Ok(Self::ResPq(
                    crate::mtproto::types::ResPq::deserialize(buf)?,
                )),
                id => Err(Error::UnexpectedConstructor { id }),
            }
        }
    }

    /// The RSA-protected payload of `req_DH_params`.
    #[derive(Debug, Clone, PartialEq)]
    pub enum PqInnerData {
        PqInnerData(crate::mtproto::types::PqInnerData),
    }

    impl Serializable for PqInnerData {
        fn serialize(&self, buf: &mut impl Extend<u8>) {
            match self {
                Self::PqInnerData(x) => {
                    crate::mtproto::types::PqInnerData::CONSTRUCTOR_ID.serialize(buf);
                    x.serialize(buf)
                }
            }
        }
    }

    impl Deserializable for PqInnerData {
        fn deserialize(buf: Buffer) -> Result<Self> {
            match u32::deserialize(buf)? {
                crate::mtproto::types::PqInnerData::CONSTRUCTOR_ID => Ok(Self::PqInnerData(
                    crate::mtproto::types::PqInnerData::deserialize(buf)?,
                )),
                id => Err(Error::UnexpectedConstructor { id }),
            }
        }
    }

    /// Success or rejection of `req_DH_params`.
    #[derive(Debug, Clone, PartialEq)]
    pub enum ServerDhParams {
        Fail(crate::mtproto::types::ServerDhParamsFail),
        Ok(crate::mtproto::types::ServerDhParamsOk),
    }

    impl Serializable for ServerDhParams {
        fn serialize(&self, buf: &mut impl Extend<u8>) {
            match self {
                Self::Fail(x) => {
                    crate::mtproto::types::ServerDhParamsFail::CONSTRUCTOR_ID.serialize(buf);
                    x.serialize(buf)
                }
                Self::Ok(x) => {
                    crate::mtproto::types::ServerDhParamsOk::CONSTRUCTOR_ID.serialize(buf);
                    x.serialize(buf)
                }
            }
        }
    }

    impl Deserializable for ServerDhParams {
        fn deserialize(buf: Buffer) -> Result<Self> {
            match u32::deserialize(buf)? {
                crate::mtproto::types::ServerDhParamsFail::CONSTRUCTOR_ID => Ok(Self::Fail(
                    crate::mtproto::types::ServerDhParamsFail::deserialize(buf)?,
                )),
                crate::mtproto::types::ServerDhParamsOk::CONSTRUCTOR_ID => Ok(Self::Ok(
                    crate::mtproto::types::ServerDhParamsOk::deserialize(buf)?,
                )),
                id => Err(Error::UnexpectedConstructor { id }),
            }
        }
    }

    /// The decrypted answer inside [`ServerDhParams::Ok`].
    #[derive(Debug, Clone, PartialEq)]
    pub enum ServerDhInnerData {
        ServerDhInnerData(crate::mtproto::types::ServerDhInnerData),
    }

    impl Serializable for ServerDhInnerData {
        fn serialize(&self, buf: &mut impl Extend<u8>) {
            match self {
                Self::ServerDhInnerData(x) => {
                    crate::mtproto::types::ServerDhInnerData::CONSTRUCTOR_ID.serialize(buf);
                    x.serialize(buf)
                }
            }
        }
    }

    impl Deserializable for ServerDhInnerData {
        fn deserialize(buf: Buffer) -> Result<Self> {
            match u32::deserialize(buf)? {
                crate::mtproto::types::ServerDhInnerData::CONSTRUCTOR_ID => {
                    Ok(Self::ServerDhInnerData(
                        crate::mtproto::types::ServerDhInnerData::deserialize(buf)?,
                    ))
                }
                id => Err(Error::UnexpectedConstructor { id }),
            }
        }
    }

    /// The encrypted payload of `set_client_DH_params`.
    #[derive(Debug, Clone, PartialEq)]
    pub enum ClientDhInnerData {
        ClientDhInnerData(crate::mtproto::types::ClientDhInnerData),
    }

    impl Serializable for ClientDhInnerData {
        fn serialize(&self, buf: &mut impl Extend<u8>) {
            match self {
                Self::ClientDhInnerData(x) => {
                    crate::mtproto::types::ClientDhInnerData::CONSTRUCTOR_ID.serialize(buf);
                    x.serialize(buf)
                }
            }
        }
    }

    impl Deserializable for ClientDhInnerData {
        fn deserialize(buf: Buffer) -> Result<Self> {
            match u32::deserialize(buf)? {
                crate::mtproto::types::ClientDhInnerData::CONSTRUCTOR_ID => {
                    Ok(Self::ClientDhInnerData(
                        crate::mtproto::types::ClientDhInnerData::deserialize(buf)?,
                    ))
                }
                id => Err(Error::UnexpectedConstructor { id }),
            }
        }
    }

    /// The verdict on `set_client_DH_params`.
    #[derive(Debug, Clone, PartialEq)]
    pub enum SetClientDhParamsAnswer {
        DhGenOk(crate::mtproto::types::DhGenOk),
        DhGenRetry(crate::mtproto::types::DhGenRetry),
        DhGenFail(crate::mtproto::types::DhGenFail),
    }

    impl Serializable for SetClientDhParamsAnswer {
        fn serialize(&self, buf: &mut impl Extend<u8>) {
            match self {
                Self::DhGenOk(x) => {
                    crate::mtproto::types::DhGenOk::CONSTRUCTOR_ID.serialize(buf);
                    x.serialize(buf)
                }
                Self::DhGenRetry(x) => {
                    crate::mtproto::types::DhGenRetry::CONSTRUCTOR_ID.serialize(buf);
                    x.serialize(buf)
                }
                Self::DhGenFail(x) => {
                    crate::mtproto::types::DhGenFail::CONSTRUCTOR_ID.serialize(buf);
                    x.serialize(buf)
                }
            }
        }
    }

    impl Deserializable for SetClientDhParamsAnswer {
        fn deserialize(buf: Buffer) -> Result<Self> {
            match u32::deserialize(buf)? {
                crate::mtproto::types::DhGenOk::CONSTRUCTOR_ID => Ok(Self::DhGenOk(
                    crate::mtproto::types::DhGenOk::deserialize(buf)?,
                )),
                crate::mtproto::types::DhGenRetry::CONSTRUCTOR_ID => Ok(Self::DhGenRetry(
                    crate::mtproto::types::DhGenRetry::deserialize(buf)?,
                )),
                crate::mtproto::types::DhGenFail::CONSTRUCTOR_ID => Ok(Self::DhGenFail(
                    crate::mtproto::types::DhGenFail::deserialize(buf)?,
                )),
                id => Err(Error::UnexpectedConstructor { id }),
            }
        }
    }

    /// A failed answer inside `rpc_result`.
    #[derive(Debug, Clone, PartialEq)]
    pub enum RpcError {
        RpcError(crate::mtproto::types::RpcError),
    }

    impl Serializable for RpcError {
        fn serialize(&self, buf: &mut impl Extend<u8>) {
            match self {
                Self::RpcError(x) => {
                    crate::mtproto::types::RpcError::CONSTRUCTOR_ID.serialize(buf);
                    x.serialize(buf)
                }
            }
        }
    }

    impl Deserializable for RpcError {
        fn deserialize(buf: Buffer) -> Result<Self> {
            match u32::deserialize(buf)? {
                crate::mtproto::types::RpcError::CONSTRUCTOR_ID => Ok(Self::RpcError(
                    crate::mtproto::types::RpcError::deserialize(buf)?,
                )),
                id => Err(Error::UnexpectedConstructor { id }),
            }
        }
    }

    /// The answer to either ping flavor.
    #[derive(Debug, Clone, PartialEq)]
    pub enum Pong {
        Pong(crate::mtproto::types::Pong),
    }

    impl Serializable for Pong {
        fn serialize(&self, buf: &mut impl Extend<u8>) {
            match self {
                Self::Pong(x) => {
                    crate::mtproto::types::Pong::CONSTRUCTOR_ID.serialize(buf);
                    x.serialize(buf)
                }
            }
        }
    }

    impl Deserializable for Pong {
        fn deserialize(buf: Buffer) -> Result<Self> {
            match u32::deserialize(buf)? {
                crate::mtproto::types::Pong::CONSTRUCTOR_ID => {
                    Ok(Self::Pong(crate::mtproto::types::Pong::deserialize(buf)?))
                }
                id => Err(Error::UnexpectedConstructor { id }),
            }
        }
    }

    /// Session birth announcement.
    #[derive(Debug, Clone, PartialEq)]
    pub enum NewSession {
        Created(crate::mtproto::types::NewSessionCreated),
    }

    impl Serializable for NewSession {
        fn serialize(&self, buf: &mut impl Extend<u8>) {
            match self {
                Self::Created(x) => {
                    crate::mtproto::types::NewSessionCreated::CONSTRUCTOR_ID.serialize(buf);
                    x.serialize(buf)
                }
            }
        }
    }

    impl Deserializable for NewSession {
        fn deserialize(buf: Buffer) -> Result<Self> {
            match u32::deserialize(buf)? {
                crate::mtproto::types::NewSessionCreated::CONSTRUCTOR_ID => Ok(Self::Created(
                    crate::mtproto::types::NewSessionCreated::deserialize(buf)?,
                )),
                id => Err(Error::UnexpectedConstructor { id }),
            }
        }
    }

    /// Receipt confirmation, sent and received as a plain message.
    #[derive(Debug, Clone, PartialEq)]
    pub enum MsgsAck {
        MsgsAck(crate::mtproto::types::MsgsAck),
    }

    impl Serializable for MsgsAck {
        fn serialize(&self, buf: &mut impl Extend<u8>) {
            match self {
                Self::MsgsAck(x) => {
                    crate::mtproto::types::MsgsAck::CONSTRUCTOR_ID.serialize(buf);
                    x.serialize(buf)
                }
            }
        }
    }

    impl Deserializable for MsgsAck {
        fn deserialize(buf: Buffer) -> Result<Self> {
            match u32::deserialize(buf)? {
                crate::mtproto::types::MsgsAck::CONSTRUCTOR_ID => Ok(Self::MsgsAck(
                    crate::mtproto::types::MsgsAck::deserialize(buf)?,
                )),
                id => Err(Error::UnexpectedConstructor { id }),
            }
        }
    }

    /// Rejection notices; the salt flavor carries its own replacement.
    #[derive(Debug, Clone, PartialEq)]
    pub enum BadMsgNotification {
        Notification(crate::mtproto::types::BadMsgNotification),
        ServerSalt(crate::mtproto::types::BadServerSalt),
    }

    impl Serializable for BadMsgNotification {
        fn serialize(&self, buf: &mut impl Extend<u8>) {
            match self {
                Self::Notification(x) => {
                    crate::mtproto::types::BadMsgNotification::CONSTRUCTOR_ID.serialize(buf);
                    x.serialize(buf)
                }
                Self::ServerSalt(x) => {
                    crate::mtproto::types::BadServerSalt::CONSTRUCTOR_ID.serialize(buf);
                    x.serialize(buf)
                }
            }
        }
    }

    impl Deserializable for BadMsgNotification {
        fn deserialize(buf: Buffer) -> Result<Self> {
            match u32::deserialize(buf)? {
                crate::mtproto::types::BadMsgNotification::CONSTRUCTOR_ID => {
                    Ok(Self::Notification(
                        crate::mtproto::types::BadMsgNotification::deserialize(buf)?,
                    ))
                }
                crate::mtproto::types::BadServerSalt::CONSTRUCTOR_ID => Ok(Self::ServerSalt(
                    crate::mtproto::types::BadServerSalt::deserialize(buf)?,
                )),
                id => Err(Error::UnexpectedConstructor { id }),
            }
        }
    }

    /// Pointers to answers that already exist server-side.
    #[derive(Debug, Clone, PartialEq)]
    pub enum MsgDetailedInfo {
        Info(crate::mtproto::types::MsgDetailedInfo),
        NewInfo(crate::mtproto::types::MsgNewDetailedInfo),
    }

    impl Serializable for MsgDetailedInfo {
        fn serialize(&self, buf: &mut impl Extend<u8>) {
            match self {
                Self::Info(x) => {
                    crate::mtproto::types::MsgDetailedInfo::CONSTRUCTOR_ID.serialize(buf);
                    x.serialize(buf)
                }
                Self::NewInfo(x) => {
                    crate::mtproto::types::MsgNewDetailedInfo::CONSTRUCTOR_ID.serialize(buf);
                    x.serialize(buf)
                }
            }
        }
    }

    impl Deserializable for MsgDetailedInfo {
        fn deserialize(buf: Buffer) -> Result<Self> {
            match u32::deserialize(buf)? {
                crate::mtproto::types::MsgDetailedInfo::CONSTRUCTOR_ID => Ok(Self::Info(
                    crate::mtproto::types::MsgDetailedInfo::deserialize(buf)?,
                )),
                crate::mtproto::types::MsgNewDetailedInfo::CONSTRUCTOR_ID => Ok(Self::NewInfo(
                    crate::mtproto::types::MsgNewDetailedInfo::deserialize(buf)?,
                )),
                id => Err(Error::UnexpectedConstructor { id }),
            }
        }
    }

    /// A compressed object in place of a plain one.
    #[derive(Debug, Clone, PartialEq)]
    pub enum GzipPacked {
        GzipPacked(crate::mtproto::types::GzipPacked),
    }

    impl Serializable for GzipPacked {
        fn serialize(&self, buf: &mut impl Extend<u8>) {
            match self {
                Self::GzipPacked(x) => {
                    crate::mtproto::types::GzipPacked::CONSTRUCTOR_ID.serialize(buf);
                    x.serialize(buf)
                }
            }
        }
    }

    impl Deserializable for GzipPacked {
        fn deserialize(buf: Buffer) -> Result<Self> {
            match u32::deserialize(buf)? {
                crate::mtproto::types::GzipPacked::CONSTRUCTOR_ID => Ok(Self::GzipPacked(
                    crate::mtproto::types::GzipPacked::deserialize(buf)?,
                )),
                id => Err(Error::UnexpectedConstructor { id }),
            }
        }
    }
}

/// Function constructors. These serialize with their identifier up front,
/// since a call is always boxed inside its message.
pub mod functions {
    use crate::deserialize::{Buffer, Result};
    use crate::{Deserializable, Identifiable, RemoteCall, Serializable};

    /// Opens key generation by asking the server for a challenge.
    #[derive(Debug, Clone, PartialEq)]
    pub struct ReqPqMulti {
        pub nonce: [u8; 16],
    }

    impl Identifiable for ReqPqMulti {
        const CONSTRUCTOR_ID: u32 = 0xbe7e8ef1;
    }

    impl Serializable for ReqPqMulti {
        fn serialize(&self, buf: &mut impl Extend<u8>) {
            Self::CONSTRUCTOR_ID.serialize(buf);
            self.nonce.serialize(buf);
        }
    }

    impl Deserializable for ReqPqMulti {
        fn deserialize(buf: Buffer) -> Result<Self> {
            let nonce = <[u8; 16]>::deserialize(buf)?;
            Ok(Self { nonce })
        }
    }

    impl RemoteCall for ReqPqMulti {
        type Return = crate::mtproto::enums::ResPq;
    }

    /// Presents the factored challenge plus the RSA-encrypted inner data.
    #[derive(Debug, Clone, PartialEq)]
    pub struct ReqDhParams {
        pub nonce: [u8; 16],
        pub server_nonce: [u8; 16],
        pub p: Vec<u8>,
        pub q: Vec<u8>,
        pub public_key_fingerprint: i64,
        pub encrypted_data: Vec<u8>,
    }

    impl Identifiable for ReqDhParams {
        const CONSTRUCTOR_ID: u32 = 0xd712e4be;
    }

    impl Serializable for ReqDhParams {
        fn serialize(&self, buf: &mut impl Extend<u8>) {
            Self::CONSTRUCTOR_ID.serialize(buf);
            self.nonce.serialize(buf);
            self.server_nonce.serialize(buf);
            self.p.serialize(buf);
            self.q.serialize(buf);
            self.public_key_fingerprint.serialize(buf);
            self.encrypted_data.serialize(buf);
        }
    }

    impl Deserializable for ReqDhParams {
        fn deserialize(buf: Buffer) -> Result<Self> {
            let nonce = <[u8; 16]>::deserialize(buf)?;
            let server_nonce = <[u8; 16]>::deserialize(buf)?;
            let p = Vec::<u8>::deserialize(buf)?;
            let q = Vec::<u8>::deserialize(buf)?;
            let public_key_fingerprint = i64::deserialize(buf)?;
            let encrypted_data = Vec::<u8>::deserialize(buf)?;
            Ok(Self {
                nonce,
                server_nonce,
                p,
                q,
                public_key_fingerprint,
                encrypted_data,
            })
        }
    }

    impl RemoteCall for ReqDhParams {
        type Return = crate::mtproto::enums::ServerDhParams;
    }

    /// Closes the exchange with the encrypted client half.
    #[derive(Debug, Clone, PartialEq)]
    pub struct SetClientDhParams {
        pub nonce: [u8; 16],
        pub server_nonce: [u8; 16],
        pub encrypted_data: Vec<u8>,
    }

    impl Identifiable for SetClientDhParams {
        const CONSTRUCTOR_ID: u32 = 0xf5045f1f;
    }

    impl Serializable for SetClientDhParams {
        fn serialize(&self, buf: &mut impl Extend<u8>) {
            Self::CONSTRUCTOR_ID.serialize(buf);
            self.nonce.serialize(buf);
            self.server_nonce.serialize(buf);
            self.encrypted_data.serialize(buf);
        }
    }

    impl Deserializable for SetClientDhParams {
        fn deserialize(buf: Buffer) -> Result<Self> {
            let nonce = <[u8; 16]>::deserialize(buf)?;
            let server_nonce = <[u8; 16]>::deserialize(buf)?;
            let encrypted_data = Vec::<u8>::deserialize(buf)?;
            Ok(Self {
                nonce,
                server_nonce,
                encrypted_data,
            })
        }
    }

    impl RemoteCall for SetClientDhParams {
        type Return = crate::mtproto::enums::SetClientDhParamsAnswer;
    }

    /// Round-trip probe; the server echoes `ping_id` in its pong.
    #[derive(Debug, Clone, PartialEq)]
    pub struct Ping {
        pub ping_id: i64,
    }

    impl Identifiable for Ping {
        const CONSTRUCTOR_ID: u32 = 0x7abe77ec;
    }

    impl Serializable for Ping {
        fn serialize(&self, buf: &mut impl Extend<u8>) {
            Self::CONSTRUCTOR_ID.serialize(buf);
            self.ping_id.serialize(buf);
        }
    }

    impl Deserializable for Ping {
        fn deserialize(buf: Buffer) -> Result<Self> {
            let ping_id = i64::deserialize(buf)?;
            Ok(Self { ping_id })
        }
    }

    impl RemoteCall for Ping {
        type Return = crate::mtproto::enums::Pong;
    }

    /// A ping that doubles as a dead-man switch: the server drops the
    /// connection if no further ping arrives within `disconnect_delay`.
    #[derive(Debug, Clone, PartialEq)]
    pub struct PingDelayDisconnect {
        pub ping_id: i64,
        pub disconnect_delay: i32,
    }

    impl Identifiable for PingDelayDisconnect {
        const CONSTRUCTOR_ID: u32 = 0xf3427b8c;
    }

    impl Serializable for PingDelayDisconnect {
        fn serialize(&self, buf: &mut impl Extend<u8>) {
            Self::CONSTRUCTOR_ID.serialize(buf);
            self.ping_id.serialize(buf);
            self.disconnect_delay.serialize(buf);
        }
    }

    impl Deserializable for PingDelayDisconnect {
        fn deserialize(buf: Buffer) -> Result<Self> {
            let ping_id = i64::deserialize(buf)?;
            let disconnect_delay = i32::deserialize(buf)?;
            Ok(Self {
                ping_id,
                disconnect_delay,
            })
        }
    }

    impl RemoteCall for PingDelayDisconnect {
        type Return = crate::mtproto::enums::Pong;
    }
}
