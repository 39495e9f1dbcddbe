//! Log masks, event reporting and log packet decoding
//!
//! Once a log mask is set the device starts emitting `DIAG_CMD_LOG` packets
//! on its own. They arrive interleaved with command responses and are
//! routed by log code (see [`crate::port::QcdmPort::add_log_handler`]).

use super::check_command;
use super::codes::*;
use crate::protocol::error::{CommandError, NakKind};
use crate::protocol::result::{DmResult, ResultBuilder};
use crate::protocol::wire::{FieldReader, PayloadWriter};

const EXT_LOGMASK_MASK_LEN: usize = 512;
const EXT_LOGMASK_RSP_LEN: usize = 3;
const LOG_CONFIG_RSP_LEN: usize = 12;
const LOG_CONFIG_MASK_RSP_LEN: usize = 20;

/// Size of the header preceding every log item
pub const LOG_PACKET_HEADER_LEN: usize = 16;

fn set_bit(mask: &mut [u8], bit: usize) {
    mask[bit / 8] |= 1 << (bit % 8);
}

fn bit_set(mask: &[u8], bit: usize) -> bool {
    mask.get(bit / 8).is_some_and(|b| b & (1 << (bit % 8)) != 0)
}

// Extended log mask

/// Build an ext log mask request.
///
/// With no items and `max_items` zero the device reports its current mask.
pub(super) fn ext_logmask_request(items: &[u16], max_items: u16) -> Result<Vec<u8>, CommandError> {
    if max_items > EXT_LOGMASK_MAX_ITEMS {
        return Err(CommandError::InvalidParameter(format!(
            "Log mask size {} exceeds {}",
            max_items, EXT_LOGMASK_MAX_ITEMS
        )));
    }

    let mut mask = [0u8; EXT_LOGMASK_MASK_LEN];
    for &item in items {
        if item > max_items {
            return Err(CommandError::InvalidParameter(format!(
                "Log item {:#x} beyond mask size {}",
                item, max_items
            )));
        }
        set_bit(&mut mask, item as usize);
    }

    Ok(PayloadWriter::command(DIAG_CMD_EXT_LOGMASK)
        .u16(max_items)
        .bytes(&mask)
        .finish())
}

/// Decode an ext log mask response: `max-items` and the raw `mask`
pub fn parse_ext_logmask(raw: &[u8]) -> Result<DmResult, CommandError> {
    let r = check_command(raw, DIAG_CMD_EXT_LOGMASK, EXT_LOGMASK_RSP_LEN)?;
    Ok(ResultBuilder::new()
        .u16("max-items", r.u16(1)?)
        .bytes("mask", &raw[EXT_LOGMASK_RSP_LEN..])
        .build())
}

/// Whether `item` is enabled in an ext log mask result
pub fn ext_logmask_has_item(result: &DmResult, item: u16) -> bool {
    let Ok(max) = result.get_u16("max-items") else {
        return false;
    };
    if item > max {
        return false;
    }
    result
        .get_bytes("mask")
        .map(|mask| bit_set(mask, item as usize))
        .unwrap_or(false)
}

// Event reporting

pub(super) fn event_report_request(start: bool) -> Vec<u8> {
    PayloadWriter::command(DIAG_CMD_EVENT_REPORT)
        .u8(start as u8)
        .finish()
}

pub fn parse_event_report(raw: &[u8]) -> Result<DmResult, CommandError> {
    check_command(raw, DIAG_CMD_EVENT_REPORT, 1)?;
    Ok(DmResult::default())
}

// Log config

fn log_config_header(op: u32, equip_id: u32) -> PayloadWriter {
    PayloadWriter::command(DIAG_CMD_LOG_CONFIG)
        .zeros(3)
        .u32(op)
        .u32(equip_id)
}

pub(super) fn log_config_get_mask_request(equip_id: u32) -> Vec<u8> {
    log_config_header(LOG_CONFIG_OP_GET_MASK, equip_id)
        .u32(0)
        .finish()
}

/// Build a log config set-mask request.
///
/// Log codes carry their equipment id in the top nibble; every item must
/// belong to `equip_id`. An empty item list clears the mask.
pub(super) fn log_config_set_mask_request(
    equip_id: u32,
    items: &[u16],
) -> Result<Vec<u8>, CommandError> {
    let mut highest = 0usize;
    for &item in items {
        if (item >> 12) as u32 != equip_id {
            return Err(CommandError::InvalidParameter(format!(
                "Log item {:#06x} does not belong to equipment {}",
                item, equip_id
            )));
        }
        highest = highest.max((item & 0x0FFF) as usize);
    }

    let num_items = if items.is_empty() { 0 } else { highest + 1 };
    let mut mask = vec![0u8; num_items.div_ceil(8)];
    for &item in items {
        set_bit(&mut mask, (item & 0x0FFF) as usize);
    }

    Ok(log_config_header(LOG_CONFIG_OP_SET_MASK, equip_id)
        .u32(num_items as u32)
        .bytes(&mask)
        .finish())
}

/// Decode a get-mask or set-mask response
pub fn parse_log_config_mask(raw: &[u8], op: u32) -> Result<DmResult, CommandError> {
    let r = check_command(raw, DIAG_CMD_LOG_CONFIG, LOG_CONFIG_RSP_LEN)?;

    let actual_op = r.u32(4)?;
    if actual_op != op {
        return Err(CommandError::InvalidParameter(format!(
            "Log config response for operation {} (expected {})",
            actual_op, op
        )));
    }
    if r.u32(8)? != 0 {
        return Err(CommandError::Nak {
            kind: NakKind::NotAccepted,
            command: DIAG_CMD_LOG_CONFIG,
        });
    }

    let num_items = r.u32(16)?;
    let mask_len = (num_items as usize).div_ceil(8);
    Ok(ResultBuilder::new()
        .u32("equip-id", r.u32(12)?)
        .u32("num-items", num_items)
        .bytes("items", r.bytes(LOG_CONFIG_MASK_RSP_LEN, mask_len)?)
        .build())
}

/// Whether `log_code` is enabled in a log config mask result
pub fn log_config_code_set(result: &DmResult, equip_id: u32, log_code: u16) -> bool {
    if (log_code >> 12) as u32 != equip_id || result.get_u32("equip-id") != Ok(equip_id) {
        return false;
    }
    let bit = (log_code & 0x0FFF) as u32;
    match (result.get_u32("num-items"), result.get_bytes("items")) {
        (Ok(n), Ok(mask)) if bit < n => bit_set(mask, bit as usize),
        _ => false,
    }
}

// Log packets

/// Header of an unsolicited log packet and its item payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogPacket<'a> {
    pub log_code: u16,
    pub timestamp: u64,
    pub data: &'a [u8],
}

impl<'a> LogPacket<'a> {
    /// Parse a decapsulated `DIAG_CMD_LOG` payload
    pub fn parse(raw: &'a [u8]) -> Result<Self, CommandError> {
        let r = check_command(raw, DIAG_CMD_LOG, LOG_PACKET_HEADER_LEN)?;
        Ok(Self {
            log_code: r.u16(6)?,
            timestamp: r.u64(8)?,
            data: &raw[LOG_PACKET_HEADER_LEN..],
        })
    }
}

/// Peek at the log code of a raw log packet
pub fn log_code(raw: &[u8]) -> Option<u16> {
    LogPacket::parse(raw).ok().map(|p| p.log_code)
}

/// One pilot of an EVDO pilot sets v2 log item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvdoPilot {
    pub pilot_pn: u16,
    pub energy: u16,
    /// MAC index for active pilots, channel number otherwise
    pub channel_or_mac: u16,
    pub window_center: u16,
}

impl EvdoPilot {
    /// Rough RSSI in dBm derived from the pilot energy
    pub fn approx_rssi_dbm(&self) -> i32 {
        -110 + (self.energy as i32 - 50).max(0) / 14
    }
}

/// EVDO pilot sets v2 log item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvdoPilotSets {
    pub pn_offset: u8,
    pub active_channel: u16,
    pub active: Vec<EvdoPilot>,
    pub candidate: Vec<EvdoPilot>,
    pub remaining: Vec<EvdoPilot>,
}

const EVDO_PILOT_SETS_HEADER_LEN: usize = 11;
const EVDO_PILOT_LEN: usize = 10;

#[derive(Clone, Copy)]
enum EvdoSet {
    Active,
    Candidate,
    Remaining,
}

fn evdo_pilot(r: &FieldReader<'_>, base: usize, set: EvdoSet) -> Result<EvdoPilot, CommandError> {
    let window_center = match set {
        EvdoSet::Active | EvdoSet::Candidate => r.u16(base + 8)?,
        EvdoSet::Remaining => r.u16(base + 6)?,
    };
    Ok(EvdoPilot {
        pilot_pn: r.u16(base)?,
        energy: r.u16(base + 2)?,
        channel_or_mac: r.u16(base + 4)?,
        window_center,
    })
}

impl EvdoPilotSets {
    /// Decode the item payload of a [`LOG_ITEM_EVDO_PILOT_SETS_V2`] packet
    pub fn parse(data: &[u8]) -> Result<Self, CommandError> {
        let r = FieldReader::new(data, DIAG_CMD_LOG);
        r.bytes(0, EVDO_PILOT_SETS_HEADER_LEN)?;

        let mut offset = EVDO_PILOT_SETS_HEADER_LEN;
        let mut take = |count: u8, set: EvdoSet| -> Result<Vec<EvdoPilot>, CommandError> {
            let mut pilots = Vec::with_capacity(count as usize);
            for _ in 0..count {
                pilots.push(evdo_pilot(&r, offset, set)?);
                offset += EVDO_PILOT_LEN;
            }
            Ok(pilots)
        };

        let active = take(r.u8(1)?, EvdoSet::Active)?;
        let candidate = take(r.u8(6)?, EvdoSet::Candidate)?;
        let remaining = take(r.u8(8)?, EvdoSet::Remaining)?;

        Ok(Self {
            pn_offset: r.u8(0)?,
            active_channel: r.u16(3)?,
            active,
            candidate,
            remaining,
        })
    }
}

/// WCDMA RRC states reported by [`LOG_ITEM_WCDMA_RRC_STATE`]
pub mod rrc_state {
    pub const DISCONNECTED: u8 = 0;
    pub const CONNECTING: u8 = 1;
    pub const CELL_FACH: u8 = 2;
    pub const CELL_DCH: u8 = 3;
    pub const CELL_PCH: u8 = 4;
    pub const URA_PCH: u8 = 5;
}

/// Decode a [`LOG_ITEM_WCDMA_RRC_STATE`] payload
pub fn parse_wcdma_rrc_state(data: &[u8]) -> Result<u8, CommandError> {
    FieldReader::new(data, DIAG_CMD_LOG).u8(0)
}

/// Decode a [`LOG_ITEM_WCDMA_CELL_ID`] payload
pub fn parse_wcdma_cell_id(data: &[u8]) -> Result<u32, CommandError> {
    let r = FieldReader::new(data, DIAG_CMD_LOG);
    r.bytes(0, 16)?;
    r.u32(8)
}
