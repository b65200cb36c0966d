//! # Cross-plugin API
//!
//! Two request kinds, answered fire-and-forget to the sender:
//!
//! | kind | request payload | response payload |
//! |---|---|---|
//! | `NETWORK_LIST_REQUEST` | none | `u32 count`, then `count` NUL-terminated names |
//! | `NETWORK_CONTAINERS_REQUEST` | `char[64]` name | `char[64]` echo, `u32 master`, `u32 catch_all`, `u32 n`, `n × u32` |
//!
//! Integers are little-endian. `catch_all` is `0` when it equals the master; the filter
//! container list is de-duplicated and excludes master and catch-all. An unknown network
//! yields an all-zero header. Malformed requests are logged and dropped.

use bytes::{Buf, BufMut, BytesMut};
use log::{debug, warn};

use crate::errors::StashError;
use crate::host::{FormId, NO_REF};
use crate::network::NetworkManager;

pub const NETWORK_LIST_REQUEST: u32 = 0x5346_0001;
pub const NETWORK_LIST_RESPONSE: u32 = 0x5346_0002;
pub const NETWORK_CONTAINERS_REQUEST: u32 = 0x5346_0003;
pub const NETWORK_CONTAINERS_RESPONSE: u32 = 0x5346_0004;

/// Fixed width of network names in container messages.
pub const NAME_FIELD_LEN: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiRequest {
    NetworkList,
    NetworkContainers { name: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiResponse {
    NetworkList(Vec<String>),
    NetworkContainers {
        name: String,
        master: FormId,
        catch_all: FormId,
        filters: Vec<FormId>,
    },
}

fn put_name_field(buf: &mut BytesMut, name: &str) {
    let mut field = [0u8; NAME_FIELD_LEN];
    let bytes = name.as_bytes();
    // Leave room for the terminator and never split a UTF-8 sequence.
    let mut len = bytes.len().min(NAME_FIELD_LEN - 1);
    while !name.is_char_boundary(len) {
        len -= 1;
    }
    field[..len].copy_from_slice(&bytes[..len]);
    buf.put_slice(&field);
}

fn read_name_field(buf: &mut &[u8]) -> Result<String, StashError> {
    if buf.remaining() < NAME_FIELD_LEN {
        return Err(StashError::MalformedMessage(format!(
            "name field needs {} bytes, got {}",
            NAME_FIELD_LEN,
            buf.remaining()
        )));
    }
    let field = &buf[..NAME_FIELD_LEN];
    let end = field.iter().position(|&b| b == 0).unwrap_or(NAME_FIELD_LEN);
    let name = String::from_utf8(field[..end].to_vec())?;
    buf.advance(NAME_FIELD_LEN);
    Ok(name)
}

impl ApiRequest {
    pub fn kind(&self) -> u32 {
        match self {
            ApiRequest::NetworkList => NETWORK_LIST_REQUEST,
            ApiRequest::NetworkContainers { .. } => NETWORK_CONTAINERS_REQUEST,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = BytesMut::new();
        if let ApiRequest::NetworkContainers { name } = self {
            put_name_field(&mut buf, name);
        }
        buf.to_vec()
    }

    pub fn decode(kind: u32, mut payload: &[u8]) -> Result<Self, StashError> {
        match kind {
            NETWORK_LIST_REQUEST => Ok(ApiRequest::NetworkList),
            NETWORK_CONTAINERS_REQUEST => Ok(ApiRequest::NetworkContainers {
                name: read_name_field(&mut payload)?,
            }),
            other => Err(StashError::MalformedMessage(format!(
                "unknown message kind {other:#010X}"
            ))),
        }
    }
}

impl ApiResponse {
    pub fn kind(&self) -> u32 {
        match self {
            ApiResponse::NetworkList(_) => NETWORK_LIST_RESPONSE,
            ApiResponse::NetworkContainers { .. } => NETWORK_CONTAINERS_RESPONSE,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = BytesMut::new();
        match self {
            ApiResponse::NetworkList(names) => {
                buf.put_u32_le(names.len() as u32);
                for name in names {
                    buf.put_slice(name.as_bytes());
                    buf.put_u8(0);
                }
            }
            ApiResponse::NetworkContainers {
                name,
                master,
                catch_all,
                filters,
            } => {
                put_name_field(&mut buf, name);
                buf.put_u32_le(*master);
                buf.put_u32_le(*catch_all);
                buf.put_u32_le(filters.len() as u32);
                for container in filters {
                    buf.put_u32_le(*container);
                }
            }
        }
        buf.to_vec()
    }

    pub fn decode(kind: u32, mut payload: &[u8]) -> Result<Self, StashError> {
        let short = |what: &str| StashError::MalformedMessage(format!("truncated {what}"));
        match kind {
            NETWORK_LIST_RESPONSE => {
                if payload.remaining() < 4 {
                    return Err(short("count"));
                }
                let count = payload.get_u32_le() as usize;
                let mut names = Vec::new();
                for _ in 0..count {
                    let end = payload
                        .iter()
                        .position(|&b| b == 0)
                        .ok_or_else(|| short("name"))?;
                    names.push(String::from_utf8(payload[..end].to_vec())?);
                    payload.advance(end + 1);
                }
                Ok(ApiResponse::NetworkList(names))
            }
            NETWORK_CONTAINERS_RESPONSE => {
                let name = read_name_field(&mut payload)?;
                if payload.remaining() < 12 {
                    return Err(short("header"));
                }
                let master = payload.get_u32_le();
                let catch_all = payload.get_u32_le();
                let count = payload.get_u32_le() as usize;
                if payload.remaining() < count.saturating_mul(4) {
                    return Err(short("container list"));
                }
                let filters = (0..count).map(|_| payload.get_u32_le()).collect();
                Ok(ApiResponse::NetworkContainers {
                    name,
                    master,
                    catch_all,
                    filters,
                })
            }
            other => Err(StashError::MalformedMessage(format!(
                "unknown message kind {other:#010X}"
            ))),
        }
    }
}

/// Answer a request from the current network state.
pub fn respond(request: &ApiRequest, manager: &NetworkManager) -> ApiResponse {
    match request {
        ApiRequest::NetworkList => ApiResponse::NetworkList(manager.list()),
        ApiRequest::NetworkContainers { name } => match manager.find(name) {
            Some(network) => {
                let catch_all = if network.catch_all == network.master {
                    NO_REF
                } else {
                    network.catch_all
                };
                let mut filters: Vec<FormId> = Vec::new();
                for stage in &network.stages {
                    let c = stage.container;
                    if c != NO_REF && c != network.master && c != catch_all && !filters.contains(&c) {
                        filters.push(c);
                    }
                }
                ApiResponse::NetworkContainers {
                    name: name.clone(),
                    master: network.master,
                    catch_all,
                    filters,
                }
            }
            None => ApiResponse::NetworkContainers {
                name: name.clone(),
                master: NO_REF,
                catch_all: NO_REF,
                filters: Vec::new(),
            },
        },
    }
}

/// Decode, answer and encode one raw message. Malformed input yields `None`.
pub fn handle_message(kind: u32, payload: &[u8], manager: &NetworkManager) -> Option<(u32, Vec<u8>)> {
    match ApiRequest::decode(kind, payload) {
        Ok(request) => {
            debug!("api request {:?}", request);
            let response = respond(&request, manager);
            Some((response.kind(), response.encode()))
        }
        Err(e) => {
            warn!("ignoring api message: {}", e);
            None
        }
    }
}
