//! Co-save serialisation.
//!
//! The blob is a flat sequence of records:
//!
//! ```text
//! +--------+---------+--------+-----------------+
//! | tag u32| ver u32 | len u32| payload (len B) |
//! +--------+---------+--------+-----------------+
//! ```
//!
//! All integers are little-endian; the tag is four ASCII bytes. Strings are a `u16` length
//! followed by UTF-8. Sets are written sorted. Form handles are written raw and passed
//! through [`Host::resolve_saved_ref`] on load; handles that no longer resolve load as `0`
//! and are remembered in [`LostRefs`] so validation can count them as pruned.
//!
//! A record with an unknown tag or unexpected version is skipped whole and the rest of the
//! blob still loads.

use std::collections::{BTreeMap, BTreeSet};

use bytes::{Buf, BufMut, BytesMut};
use log::{debug, info, warn};
use serde::Serialize;

use super::manager::{LostRefs, NetworkManager, State};
use super::{FilterStage, Network, SellState, Transaction, Vendor};
use crate::errors::StashError;
use crate::host::{FormId, Host, NO_REF};

pub const TAG_NETWORKS: [u8; 4] = *b"NETW";
pub const TAG_TAGS: [u8; 4] = *b"TAGS";
pub const TAG_MODS: [u8; 4] = *b"MODS";
pub const TAG_SELL: [u8; 4] = *b"SELL";
pub const TAG_TRANSACTIONS: [u8; 4] = *b"TLOG";
pub const TAG_CONTAINER_LISTS: [u8; 4] = *b"CLST";
pub const TAG_VENDORS: [u8; 4] = *b"VEND";

const VERSION_NETWORKS: u32 = 2;
const VERSION_TAGS: u32 = 1;
const VERSION_MODS: u32 = 1;
const VERSION_SELL: u32 = 1;
const VERSION_TRANSACTIONS: u32 = 1;
const VERSION_CONTAINER_LISTS: u32 = 1;
const VERSION_VENDORS: u32 = 1;

const HEADER_LEN: usize = 12;

/// Header of one record in a blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordInfo {
    pub tag: String,
    pub version: u32,
    pub length: u32,
}

/// Outcome of [`NetworkManager::load`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LoadReport {
    pub loaded: Vec<String>,
    /// Records skipped for version mismatch, unknown tag or bad payload.
    pub skipped: Vec<String>,
    /// Plugins present at save time that are no longer loaded.
    pub missing_plugins: Vec<String>,
    /// Saved handles that did not rewrite to a live handle.
    pub unresolved_refs: usize,
}

fn tag_name(tag: [u8; 4]) -> String {
    String::from_utf8_lossy(&tag).into_owned()
}

// ============================================================================
// Encoding
// ============================================================================

struct Writer {
    buf: BytesMut,
}

impl Writer {
    fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(1024),
        }
    }

    fn record(&mut self, tag: [u8; 4], version: u32, payload: BytesMut) {
        self.buf.put_slice(&tag);
        self.buf.put_u32_le(version);
        self.buf.put_u32_le(payload.len() as u32);
        self.buf.put_slice(&payload);
    }
}

fn put_str(buf: &mut BytesMut, s: &str) {
    let mut len = s.len().min(u16::MAX as usize);
    while !s.is_char_boundary(len) {
        len -= 1;
    }
    buf.put_u16_le(len as u16);
    buf.put_slice(&s.as_bytes()[..len]);
}

fn put_bool(buf: &mut BytesMut, value: bool) {
    buf.put_u8(u8::from(value));
}

fn encode_networks(networks: &[Network]) -> BytesMut {
    let mut buf = BytesMut::new();
    buf.put_u32_le(networks.len() as u32);
    for network in networks {
        put_str(&mut buf, &network.name);
        buf.put_u32_le(network.master);
        buf.put_u32_le(network.stages.len() as u32);
        for stage in &network.stages {
            put_str(&mut buf, &stage.filter_id);
            buf.put_u32_le(stage.container);
        }
        buf.put_u32_le(network.catch_all);
        put_bool(&mut buf, network.whoosh_configured);
        buf.put_u32_le(network.whoosh_filters.len() as u32);
        for id in &network.whoosh_filters {
            put_str(&mut buf, id);
        }
    }
    buf
}

fn encode_tags(tags: &BTreeMap<FormId, String>) -> BytesMut {
    let mut buf = BytesMut::new();
    buf.put_u32_le(tags.len() as u32);
    for (id, name) in tags {
        buf.put_u32_le(*id);
        put_str(&mut buf, name);
    }
    buf
}

fn encode_strings<'a>(items: impl ExactSizeIterator<Item = &'a String>) -> BytesMut {
    let mut buf = BytesMut::new();
    buf.put_u32_le(items.len() as u32);
    for item in items {
        put_str(&mut buf, item);
    }
    buf
}

fn encode_sell(sell: &SellState) -> BytesMut {
    let mut buf = BytesMut::new();
    buf.put_u32_le(sell.container);
    buf.put_u32_le(sell.total_items_sold);
    buf.put_u32_le(sell.total_gold_earned);
    buf.put_f64_le(sell.last_sell_time);
    put_bool(&mut buf, sell.timer_started);
    buf
}

fn encode_transactions(log: &[Transaction]) -> BytesMut {
    let mut buf = BytesMut::new();
    buf.put_u32_le(log.len() as u32);
    for tx in log {
        put_str(&mut buf, &tx.item_name);
        put_str(&mut buf, &tx.vendor_name);
        put_str(&mut buf, &tx.vendor_assortment);
        buf.put_i32_le(tx.quantity);
        buf.put_i32_le(tx.gold_earned);
        buf.put_f32_le(tx.price_per_unit);
        buf.put_f64_le(tx.game_time);
    }
    buf
}

fn encode_vendors(vendors: &[Vendor]) -> BytesMut {
    let mut buf = BytesMut::new();
    buf.put_u32_le(vendors.len() as u32);
    for vendor in vendors {
        buf.put_u32_le(vendor.npc);
        buf.put_u32_le(vendor.faction);
        put_str(&mut buf, &vendor.vendor_name);
        put_str(&mut buf, &vendor.store_name);
        buf.put_f64_le(vendor.last_visit_time);
        put_bool(&mut buf, vendor.active);
        put_bool(&mut buf, vendor.invested);
        buf.put_u32_le(vendor.npc_base);
    }
    buf
}

// ============================================================================
// Decoding
// ============================================================================

/// Bounds-checked cursor over one record payload.
struct Reader<'a> {
    buf: &'a [u8],
    record: String,
    host: &'a dyn Host,
    unresolved: usize,
    lost: LostRefs,
}

impl<'a> Reader<'a> {
    fn need(&self, n: usize) -> Result<(), StashError> {
        if self.buf.remaining() < n {
            return Err(StashError::Truncated {
                record: self.record.clone(),
            });
        }
        Ok(())
    }

    fn u8(&mut self) -> Result<u8, StashError> {
        self.need(1)?;
        Ok(self.buf.get_u8())
    }

    fn bool(&mut self) -> Result<bool, StashError> {
        Ok(self.u8()? != 0)
    }

    fn u32(&mut self) -> Result<u32, StashError> {
        self.need(4)?;
        Ok(self.buf.get_u32_le())
    }

    fn i32(&mut self) -> Result<i32, StashError> {
        self.need(4)?;
        Ok(self.buf.get_i32_le())
    }

    fn f32(&mut self) -> Result<f32, StashError> {
        self.need(4)?;
        Ok(self.buf.get_f32_le())
    }

    fn f64(&mut self) -> Result<f64, StashError> {
        self.need(8)?;
        Ok(self.buf.get_f64_le())
    }

    fn string(&mut self) -> Result<String, StashError> {
        self.need(2)?;
        let len = self.buf.get_u16_le() as usize;
        self.need(len)?;
        let bytes = self.buf[..len].to_vec();
        self.buf.advance(len);
        Ok(String::from_utf8(bytes)?)
    }

    /// Saved handle rewritten to the live one; `None` if a non-zero handle no longer
    /// resolves.
    fn form_checked(&mut self) -> Result<Option<FormId>, StashError> {
        let saved = self.u32()?;
        if saved == NO_REF {
            return Ok(Some(NO_REF));
        }
        match self.host.resolve_saved_ref(saved) {
            Some(live) => Ok(Some(live)),
            None => {
                debug!("{}: saved ref {:#010X} did not resolve", self.record, saved);
                self.unresolved += 1;
                Ok(None)
            }
        }
    }

    /// Like [`Reader::form_checked`] with unresolved handles loaded as `0`.
    fn form(&mut self) -> Result<FormId, StashError> {
        Ok(self.form_checked()?.unwrap_or(NO_REF))
    }

    /// Destination handle; an unresolved one is counted as a lost filter reference.
    fn destination(&mut self) -> Result<FormId, StashError> {
        Ok(self.form_checked()?.unwrap_or_else(|| {
            self.lost.filters += 1;
            NO_REF
        }))
    }

    /// Element count, sanity-checked against the bytes left.
    fn count(&mut self, min_element: usize) -> Result<usize, StashError> {
        let count = self.u32()? as usize;
        self.need(count.saturating_mul(min_element))?;
        Ok(count)
    }
}

fn decode_networks(r: &mut Reader) -> Result<Vec<Network>, StashError> {
    let count = r.count(15)?;
    let mut networks = Vec::with_capacity(count);
    for _ in 0..count {
        let name = r.string()?;
        let master = r.form()?;
        let stage_count = r.count(6)?;
        let mut stages = Vec::with_capacity(stage_count);
        for _ in 0..stage_count {
            let filter_id = r.string()?;
            let container = r.destination()?;
            stages.push(FilterStage { filter_id, container });
        }
        let catch_all = r.destination()?;
        let whoosh_configured = r.bool()?;
        let whoosh_count = r.count(2)?;
        let mut whoosh_filters = BTreeSet::new();
        for _ in 0..whoosh_count {
            whoosh_filters.insert(r.string()?);
        }
        networks.push(Network {
            name,
            master,
            stages,
            catch_all,
            whoosh_filters,
            whoosh_configured,
        });
    }
    Ok(networks)
}

fn decode_tags(r: &mut Reader) -> Result<BTreeMap<FormId, String>, StashError> {
    let count = r.count(6)?;
    let mut tags = BTreeMap::new();
    for _ in 0..count {
        let id = r.form_checked()?;
        let name = r.string()?;
        match id {
            Some(NO_REF) => {}
            Some(id) => {
                tags.insert(id, name);
            }
            None => r.lost.tags += 1,
        }
    }
    Ok(tags)
}

fn decode_strings(r: &mut Reader) -> Result<Vec<String>, StashError> {
    let count = r.count(2)?;
    (0..count).map(|_| r.string()).collect()
}

fn decode_sell(r: &mut Reader) -> Result<SellState, StashError> {
    let container = match r.form_checked()? {
        Some(id) => id,
        None => {
            r.lost.sell = true;
            NO_REF
        }
    };
    Ok(SellState {
        container,
        total_items_sold: r.u32()?,
        total_gold_earned: r.u32()?,
        last_sell_time: r.f64()?,
        timer_started: r.bool()?,
    })
}

fn decode_transactions(r: &mut Reader) -> Result<Vec<Transaction>, StashError> {
    let count = r.count(26)?;
    let mut log = Vec::with_capacity(count);
    for _ in 0..count {
        log.push(Transaction {
            item_name: r.string()?,
            vendor_name: r.string()?,
            vendor_assortment: r.string()?,
            quantity: r.i32()?,
            gold_earned: r.i32()?,
            price_per_unit: r.f32()?,
            game_time: r.f64()?,
        });
    }
    Ok(log)
}

fn decode_vendors(r: &mut Reader) -> Result<Vec<Vendor>, StashError> {
    let count = r.count(26)?;
    let mut vendors = Vec::with_capacity(count);
    for _ in 0..count {
        vendors.push(Vendor {
            npc: r.form()?,
            faction: r.form()?,
            vendor_name: r.string()?,
            store_name: r.string()?,
            last_visit_time: r.f64()?,
            active: r.bool()?,
            invested: r.bool()?,
            npc_base: r.form()?,
        });
    }
    Ok(vendors)
}

/// Split a blob into `(header, payload)` pairs without interpreting payloads.
fn split_records(mut data: &[u8]) -> Result<Vec<([u8; 4], u32, &[u8])>, StashError> {
    let mut records = Vec::new();
    while data.has_remaining() {
        if data.remaining() < HEADER_LEN {
            return Err(StashError::Truncated {
                record: "header".to_string(),
            });
        }
        let mut tag = [0u8; 4];
        data.copy_to_slice(&mut tag);
        let version = data.get_u32_le();
        let length = data.get_u32_le() as usize;
        if data.remaining() < length {
            return Err(StashError::Truncated {
                record: tag_name(tag),
            });
        }
        records.push((tag, version, &data[..length]));
        data.advance(length);
    }
    Ok(records)
}

/// Record headers of a blob, for inspection.
pub fn inspect(data: &[u8]) -> Result<Vec<RecordInfo>, StashError> {
    Ok(split_records(data)?
        .into_iter()
        .map(|(tag, version, payload)| RecordInfo {
            tag: tag_name(tag),
            version,
            length: payload.len() as u32,
        })
        .collect())
}

fn expected_version(tag: [u8; 4]) -> Option<u32> {
    match &tag {
        b"NETW" => Some(VERSION_NETWORKS),
        b"TAGS" => Some(VERSION_TAGS),
        b"MODS" => Some(VERSION_MODS),
        b"SELL" => Some(VERSION_SELL),
        b"TLOG" => Some(VERSION_TRANSACTIONS),
        b"CLST" => Some(VERSION_CONTAINER_LISTS),
        b"VEND" => Some(VERSION_VENDORS),
        _ => None,
    }
}

fn apply_record(
    state: &mut State,
    tag: [u8; 4],
    r: &mut Reader,
    report: &mut LoadReport,
) -> Result<(), StashError> {
    match &tag {
        b"NETW" => state.networks = decode_networks(r)?,
        b"TAGS" => state.tags = decode_tags(r)?,
        b"MODS" => {
            let saved = decode_strings(r)?;
            report.missing_plugins = saved
                .into_iter()
                .filter(|p| !r.host.is_plugin_loaded(p))
                .collect();
            for plugin in &report.missing_plugins {
                warn!("plugin '{}' was loaded when this game was saved but is missing now", plugin);
            }
        }
        b"SELL" => state.sell = decode_sell(r)?,
        b"TLOG" => state.transactions = decode_transactions(r)?,
        b"CLST" => state.disabled_lists = decode_strings(r)?.into_iter().collect(),
        b"VEND" => state.vendors = decode_vendors(r)?,
        _ => {}
    }
    Ok(())
}

impl NetworkManager {
    /// Serialise persisted state into a co-save blob.
    pub fn save(&self, host: &dyn Host) -> Vec<u8> {
        let plugins = host.loaded_plugins();
        let state = self.lock();
        let mut w = Writer::new();
        w.record(TAG_NETWORKS, VERSION_NETWORKS, encode_networks(&state.networks));
        w.record(TAG_TAGS, VERSION_TAGS, encode_tags(&state.tags));
        w.record(TAG_MODS, VERSION_MODS, encode_strings(plugins.iter()));
        w.record(TAG_SELL, VERSION_SELL, encode_sell(&state.sell));
        w.record(
            TAG_TRANSACTIONS,
            VERSION_TRANSACTIONS,
            encode_transactions(&state.transactions),
        );
        w.record(
            TAG_CONTAINER_LISTS,
            VERSION_CONTAINER_LISTS,
            encode_strings(state.disabled_lists.iter()),
        );
        w.record(TAG_VENDORS, VERSION_VENDORS, encode_vendors(&state.vendors));
        debug!(
            "saved {} networks, {} tags, {} transactions ({} bytes)",
            state.networks.len(),
            state.tags.len(),
            state.transactions.len(),
            w.buf.len()
        );
        w.buf.to_vec()
    }

    /// Replace persisted state from a co-save blob.
    ///
    /// Fails only when the record framing itself is broken; the current state is left
    /// untouched in that case. Records that fail individually are skipped and reported.
    pub fn load(&self, data: &[u8], host: &dyn Host) -> Result<LoadReport, StashError> {
        let records = split_records(data)?;
        let mut report = LoadReport::default();
        let mut fresh = State::default();

        for (tag, version, payload) in records {
            let name = tag_name(tag);
            let Some(expected) = expected_version(tag) else {
                warn!("skipping unknown record '{}'", name);
                report.skipped.push(name);
                continue;
            };
            if version != expected {
                let err = StashError::VersionMismatch {
                    record: name.clone(),
                    expected,
                    found: version,
                };
                warn!("{}; record skipped, use the reset action if data looks wrong", err);
                report.skipped.push(name);
                continue;
            }
            let mut reader = Reader {
                buf: payload,
                record: name.clone(),
                host,
                unresolved: 0,
                lost: LostRefs::default(),
            };
            match apply_record(&mut fresh, tag, &mut reader, &mut report) {
                Ok(()) => {
                    report.unresolved_refs += reader.unresolved;
                    fresh.lost.merge(reader.lost);
                    report.loaded.push(name);
                }
                Err(e) => {
                    warn!("record '{}' unreadable ({}); skipped", name, e);
                    report.skipped.push(name);
                }
            }
        }

        let mut state = self.lock();
        fresh.presets = std::mem::take(&mut state.presets);
        fresh.container_lists = std::mem::take(&mut state.container_lists);
        *state = fresh;
        info!(
            "loaded {} networks, {} tags ({} records skipped)",
            state.networks.len(),
            state.tags.len(),
            report.skipped.len()
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::MemoryHost;

    #[test]
    fn version_mismatch_skips_only_that_record() {
        let host = MemoryHost::new();
        let manager = NetworkManager::new();
        manager.create_network("Home", 0x10).unwrap();
        manager.tag(0x20, "Ore Chest");
        let mut blob = manager.save(&host);
        // NETW is the first record; bump its version.
        blob[4] = 99;

        let restored = NetworkManager::new();
        let report = restored.load(&blob, &host).unwrap();
        assert_eq!(report.skipped, vec!["NETW".to_string()]);
        assert!(restored.list().is_empty());
        assert_eq!(restored.name_of(0x20).as_deref(), Some("Ore Chest"));
    }

    #[test]
    fn truncated_framing_is_an_error() {
        let host = MemoryHost::new();
        let manager = NetworkManager::new();
        manager.create_network("Home", 0x10).unwrap();
        let blob = manager.save(&host);
        assert!(matches!(
            manager.load(&blob[..blob.len() - 3], &host),
            Err(StashError::Truncated { .. })
        ));
        assert_eq!(manager.list(), vec!["Home".to_string()]);
    }

    #[test]
    fn inspect_lists_headers() {
        let host = MemoryHost::new();
        let blob = NetworkManager::new().save(&host);
        let tags: Vec<String> = inspect(&blob).unwrap().into_iter().map(|r| r.tag).collect();
        assert_eq!(tags, vec!["NETW", "TAGS", "MODS", "SELL", "TLOG", "CLST", "VEND"]);
    }

    #[test]
    fn unresolved_refs_load_as_zero() {
        let host = MemoryHost::new();
        let manager = NetworkManager::new();
        manager.tag(0x20, "Gone");
        manager.set_sell_container(0x30, 1.0);
        let blob = manager.save(&host);
        host.remap_saved_ref(0x20, None);
        host.remap_saved_ref(0x30, None);
        let report = manager.load(&blob, &host).unwrap();
        assert_eq!(report.unresolved_refs, 2);
        assert!(manager.tags().is_empty());
        assert_eq!(manager.sell_state().container, NO_REF);

        let validation = manager.validate(&host, 24.0);
        assert_eq!(validation.pruned_tags, 1);
        assert_eq!(validation.pruned_sell, 1);
        assert!(!manager.sell_state().timer_started);
    }

    #[test]
    fn long_strings_truncate_on_a_char_boundary() {
        let mut buf = BytesMut::new();
        let name = "é".repeat(40_000);
        put_str(&mut buf, &name);
        let host = MemoryHost::new();
        let mut reader = Reader {
            buf: &buf[..],
            record: "TEST".to_string(),
            host: &host,
            unresolved: 0,
            lost: LostRefs::default(),
        };
        let decoded = reader.string().unwrap();
        assert_eq!(decoded.len(), u16::MAX as usize - 1);
        assert!(decoded.chars().all(|c| c == 'é'));
    }
}
