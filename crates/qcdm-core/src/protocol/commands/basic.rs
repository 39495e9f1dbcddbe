//! Core DM commands: identification, CDMA status and pilot sets

use super::codes::*;
use super::decode::{cdma_band_class_to_qcdm, cdma_prev_to_qcdm, esn_string, mcc_from_raw};
use super::check_command;
use crate::protocol::error::CommandError;
use crate::protocol::result::{DmResult, ResultBuilder};
use crate::protocol::wire::{FieldReader, PayloadWriter};

const VERSION_INFO_RSP_LEN: usize = 55;
const ESN_RSP_LEN: usize = 5;
const CDMA_STATUS_RSP_LEN: usize = 48;
const SW_VERSION_RSP_LEN: usize = 55;
const STATUS_SNAPSHOT_RSP_LEN: usize = 36;
const CONTROL_RSP_LEN: usize = 3;
const PILOT_SETS_HEADER_LEN: usize = 6;
const SAMSUNG_IND_RSP_LEN: usize = 12;

/// Size of one pilot record: PN offset and Ec/Io, both u16
pub const PILOT_RECORD_LEN: usize = 4;

pub(super) fn control_request(mode: u16) -> Result<Vec<u8>, CommandError> {
    if mode != CONTROL_MODE_OFFLINE && mode != CONTROL_MODE_RESET {
        return Err(CommandError::InvalidParameter(format!(
            "Invalid control mode {}",
            mode
        )));
    }
    Ok(PayloadWriter::command(DIAG_CMD_CONTROL).u16(mode).finish())
}

/// Decode a version info response
pub fn parse_version_info(raw: &[u8]) -> Result<DmResult, CommandError> {
    let r = check_command(raw, DIAG_CMD_VERSION_INFO, VERSION_INFO_RSP_LEN)?;
    Ok(ResultBuilder::new()
        .string("comp-date", r.text(1, 11)?)
        .string("comp-time", r.text(12, 8)?)
        .string("release-date", r.text(20, 11)?)
        .string("release-time", r.text(31, 8)?)
        .string("model", r.text(39, 8)?)
        .build())
}

/// Decode an ESN response
pub fn parse_esn(raw: &[u8]) -> Result<DmResult, CommandError> {
    let r = check_command(raw, DIAG_CMD_ESN, ESN_RSP_LEN)?;
    Ok(ResultBuilder::new()
        .string("esn", esn_string(r.bytes(1, 4)?))
        .build())
}

/// Decode a CDMA status response
pub fn parse_cdma_status(raw: &[u8]) -> Result<DmResult, CommandError> {
    let r = check_command(raw, DIAG_CMD_STATUS, CDMA_STATUS_RSP_LEN)?;
    Ok(ResultBuilder::new()
        .string("esn", esn_string(r.bytes(4, 4)?))
        .u32("rf-mode", r.u16(8)? as u32)
        .u32("rx-state", r.u16(23)? as u32)
        .u32("entry-reason", r.u16(32)? as u32)
        .u32("current-channel", r.u16(34)? as u32)
        .u8("code-channel", r.u8(36)?)
        .u32("pilot-base", r.u16(37)? as u32)
        .u32("sid", r.u16(39)? as u32)
        .u32("nid", r.u16(41)? as u32)
        .build())
}

/// Decode a software version response
pub fn parse_sw_version(raw: &[u8]) -> Result<DmResult, CommandError> {
    let r = check_command(raw, DIAG_CMD_SW_VERSION, SW_VERSION_RSP_LEN)?;
    Ok(ResultBuilder::new()
        .string("version", r.text(1, 31)?)
        .string("comp-date", r.text(32, 11)?)
        .string("comp-time", r.text(45, 8)?)
        .build())
}

/// Decode a status snapshot response.
///
/// The device reports the call processing state zero-based; results carry
/// it shifted by one so that zero means unknown (see [`snapshot_state`]).
pub fn parse_status_snapshot(raw: &[u8]) -> Result<DmResult, CommandError> {
    let r = check_command(raw, DIAG_CMD_STATUS_SNAPSHOT, STATUS_SNAPSHOT_RSP_LEN)?;
    Ok(ResultBuilder::new()
        .string("esn", esn_string(r.bytes(1, 4)?))
        .u32("mcc", mcc_from_raw(r.u16(20)?))
        .u8("prev", cdma_prev_to_qcdm(r.u8(27)?))
        .u8("prev-in-use", cdma_prev_to_qcdm(r.u8(28)?))
        .u8("mob-prev", cdma_prev_to_qcdm(r.u8(29)?))
        .u8("band-class", cdma_band_class_to_qcdm(r.u8(30)?))
        .u8("state", r.u8(34)?.wrapping_add(1))
        .build())
}

/// Decode a control (offline/reset) acknowledgement
pub fn parse_control(raw: &[u8]) -> Result<DmResult, CommandError> {
    let r = check_command(raw, DIAG_CMD_CONTROL, CONTROL_RSP_LEN)?;
    Ok(ResultBuilder::new().u16("mode", r.u16(1)?).build())
}

/// Decode a pilot sets response.
///
/// Active, candidate and neighbor records follow the header back to back;
/// each set present is stored as its raw records under [`PilotSetType::key`].
pub fn parse_pilot_sets(raw: &[u8]) -> Result<DmResult, CommandError> {
    let r = check_command(raw, DIAG_CMD_PILOT_SETS, PILOT_SETS_HEADER_LEN)?;

    let counts = [
        (PilotSetType::Active, r.u8(3)? as usize),
        (PilotSetType::Candidate, r.u8(4)? as usize),
        (PilotSetType::Neighbor, r.u8(5)? as usize),
    ];

    let mut builder = ResultBuilder::new().u16("pilot-inc", r.u16(1)?);
    let mut offset = PILOT_SETS_HEADER_LEN;
    for (set, count) in counts {
        let len = count * PILOT_RECORD_LEN;
        if count > 0 {
            builder = builder.bytes(set.key(), r.bytes(offset, len)?);
        }
        offset += len;
    }
    Ok(builder.build())
}

/// One pilot record from a pilot sets result
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pilot {
    pub pn_offset: u16,
    pub ecio: u16,
    /// Ec/Io in dB
    pub db: f32,
}

/// Number of pilots in `set`; zero when the set was empty
pub fn pilot_set_count(result: &DmResult, set: PilotSetType) -> usize {
    result
        .get_bytes(set.key())
        .map(|b| b.len() / PILOT_RECORD_LEN)
        .unwrap_or(0)
}

/// The `index`th pilot of `set`
pub fn pilot_set_pilot(result: &DmResult, set: PilotSetType, index: usize) -> Option<Pilot> {
    let records = result.get_bytes(set.key()).ok()?;
    let r = FieldReader::new(records, DIAG_CMD_PILOT_SETS);
    let base = index.checked_mul(PILOT_RECORD_LEN)?;
    let pn_offset = r.u16(base).ok()?;
    let ecio = r.u16(base + 2).ok()?;
    Some(Pilot {
        pn_offset,
        ecio,
        db: ecio as f32 * -0.5,
    })
}

/// Decode the unsolicited Samsung indication carrying signal quality
pub fn parse_samsung_ind(raw: &[u8]) -> Result<DmResult, CommandError> {
    let r = check_command(raw, DIAG_CMD_SAMSUNG_IND, SAMSUNG_IND_RSP_LEN)?;
    Ok(ResultBuilder::new().u8("signal", r.u8(11)?).build())
}
