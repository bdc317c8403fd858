//! ABCI request and response messages.
//!
//! Byte payloads are carried as hex strings on the wire so every transport can
//! use plain JSON.

use serde::{Deserialize, Serialize};

/// Hex (de)serialization for byte fields.
pub mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        hex::decode(s).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestInfo {
    pub version: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResponseInfo {
    pub data: String,
    pub version: String,
    pub last_block_height: u64,
    #[serde(with = "hex_bytes")]
    pub last_block_app_hash: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestInitChain {
    pub chain_id: String,
    pub time: u64,
    pub initial_height: u64,
    pub app_state: serde_json::Value,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResponseInitChain {
    #[serde(with = "hex_bytes")]
    pub app_hash: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestCheckTx {
    #[serde(with = "hex_bytes")]
    pub tx: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResponseCheckTx {
    pub code: u32,
    pub log: String,
    pub gas_wanted: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestDeliverTx {
    #[serde(with = "hex_bytes")]
    pub tx: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResponseDeliverTx {
    pub code: u32,
    pub log: String,
}

/// Header of the block being committed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestCommit {
    pub height: u64,
    /// Block time in Unix seconds.
    pub time: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResponseCommit {
    #[serde(with = "hex_bytes")]
    pub data: Vec<u8>,
    /// Blocks below this height may be pruned by the engine (0 keeps all).
    pub retain_height: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestQuery {
    pub path: String,
    #[serde(with = "hex_bytes")]
    pub data: Vec<u8>,
    pub height: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResponseQuery {
    pub code: u32,
    pub log: String,
    #[serde(with = "hex_bytes")]
    pub key: Vec<u8>,
    #[serde(with = "hex_bytes")]
    pub value: Vec<u8>,
    pub height: u64,
}

/// Any request a consensus engine can send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    Echo { message: String },
    Flush,
    Info(RequestInfo),
    InitChain(RequestInitChain),
    CheckTx(RequestCheckTx),
    DeliverTx(RequestDeliverTx),
    Commit(RequestCommit),
    Query(RequestQuery),
}

/// Response paired with a `Request`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    Echo { message: String },
    Flush,
    Info(ResponseInfo),
    InitChain(ResponseInitChain),
    CheckTx(ResponseCheckTx),
    DeliverTx(ResponseDeliverTx),
    Commit(ResponseCommit),
    Query(ResponseQuery),
    Exception { error: String },
}
