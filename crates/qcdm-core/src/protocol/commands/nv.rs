//! NV item read/write commands
//!
//! NV requests and responses share one layout: command code, item id, a
//! 128-byte item payload and a status word. The device echoes the whole
//! structure back with the status filled in.

use super::check_command;
use super::codes::*;
use crate::protocol::error::{CommandError, NvError};
use crate::protocol::result::{DmResult, ResultBuilder};
use crate::protocol::wire::{FieldReader, PayloadWriter};

/// Full size of an NV read/write packet
pub const NV_PACKET_LEN: usize = 1 + 2 + NV_ITEM_DATA_LEN + 2;

const NV_DATA_OFFSET: usize = 3;
const NV_STATUS_OFFSET: usize = NV_DATA_OFFSET + NV_ITEM_DATA_LEN;
const MDN_LEN: usize = 10;

pub(super) fn nv_request(code: u8, item: u16, data: &[u8]) -> Vec<u8> {
    PayloadWriter::command(code)
        .u16(item)
        .fixed(data, NV_ITEM_DATA_LEN)
        .u16(0)
        .finish()
}

pub(super) fn nv_read(item: u16, data: &[u8]) -> Vec<u8> {
    nv_request(DIAG_CMD_NV_READ, item, data)
}

pub(super) fn nv_write(item: u16, data: &[u8]) -> Vec<u8> {
    nv_request(DIAG_CMD_NV_WRITE, item, data)
}

/// Validate an NV response and return a reader over its item payload
fn check_nv(raw: &[u8], code: u8, item: u16) -> Result<FieldReader<'_>, CommandError> {
    let r = check_command(raw, code, NV_PACKET_LEN)?;

    if let Some(err) = NvError::from_status(r.u16(NV_STATUS_OFFSET)?) {
        return Err(err.into());
    }

    let actual = r.u16(1)?;
    if actual != item {
        return Err(CommandError::NvItemMismatch {
            expected: item,
            actual,
        });
    }

    Ok(FieldReader::new(r.bytes(NV_DATA_OFFSET, NV_ITEM_DATA_LEN)?, code))
}

fn invalid(what: &str, v: u8) -> CommandError {
    CommandError::InvalidParameter(format!("Invalid {} {}", what, v))
}

fn check_write(raw: &[u8], item: u16) -> Result<DmResult, CommandError> {
    check_nv(raw, DIAG_CMD_NV_WRITE, item)?;
    Ok(DmResult::default())
}

// MDN

pub(super) fn get_mdn_request(profile: u8) -> Vec<u8> {
    nv_read(DIAG_NV_DIR_NUMBER, &[profile])
}

/// Decode the mobile directory number of a profile
pub fn parse_get_mdn(raw: &[u8]) -> Result<DmResult, CommandError> {
    let data = check_nv(raw, DIAG_CMD_NV_READ, DIAG_NV_DIR_NUMBER)?;
    Ok(ResultBuilder::new()
        .u8("profile", data.u8(0)?)
        .string("mdn", data.text(1, MDN_LEN)?)
        .build())
}

// Roaming preference

pub(super) fn get_roam_pref_request(profile: u8) -> Vec<u8> {
    nv_read(DIAG_NV_ROAM_PREF, &[profile])
}

pub(super) fn set_roam_pref_request(profile: u8, pref: u8) -> Result<Vec<u8>, CommandError> {
    if !roam_pref::is_valid(pref) {
        return Err(invalid("roam preference", pref));
    }
    Ok(nv_write(DIAG_NV_ROAM_PREF, &[profile, pref]))
}

/// Decode the roaming preference; unknown values are rejected
pub fn parse_get_roam_pref(raw: &[u8]) -> Result<DmResult, CommandError> {
    let data = check_nv(raw, DIAG_CMD_NV_READ, DIAG_NV_ROAM_PREF)?;
    let pref = data.u8(1)?;
    if !roam_pref::is_valid(pref) {
        return Err(NvError::BadParameter.into());
    }
    Ok(ResultBuilder::new()
        .u8("profile", data.u8(0)?)
        .u8("roam-pref", pref)
        .build())
}

pub fn parse_set_roam_pref(raw: &[u8]) -> Result<DmResult, CommandError> {
    check_write(raw, DIAG_NV_ROAM_PREF)
}

// Mode preference

pub(super) fn get_mode_pref_request(profile: u8) -> Vec<u8> {
    nv_read(DIAG_NV_MODE_PREF, &[profile])
}

pub(super) fn set_mode_pref_request(profile: u8, pref: u8) -> Result<Vec<u8>, CommandError> {
    if !mode_pref::is_valid(pref) {
        return Err(invalid("mode preference", pref));
    }
    Ok(nv_write(DIAG_NV_MODE_PREF, &[profile, pref]))
}

pub fn parse_get_mode_pref(raw: &[u8]) -> Result<DmResult, CommandError> {
    let data = check_nv(raw, DIAG_CMD_NV_READ, DIAG_NV_MODE_PREF)?;
    let pref = data.u8(1)?;
    if !mode_pref::is_valid(pref) {
        return Err(NvError::BadParameter.into());
    }
    Ok(ResultBuilder::new()
        .u8("profile", data.u8(0)?)
        .u8("mode-pref", pref)
        .build())
}

pub fn parse_set_mode_pref(raw: &[u8]) -> Result<DmResult, CommandError> {
    check_write(raw, DIAG_NV_MODE_PREF)
}

// Hybrid preference

pub(super) fn get_hybrid_pref_request() -> Vec<u8> {
    nv_read(DIAG_NV_HYBRID_PREF, &[])
}

pub(super) fn set_hybrid_pref_request(pref: u8) -> Result<Vec<u8>, CommandError> {
    if pref != hybrid_pref::OFF && pref != hybrid_pref::ON {
        return Err(invalid("hybrid preference", pref));
    }
    Ok(nv_write(DIAG_NV_HYBRID_PREF, &[pref]))
}

pub fn parse_get_hybrid_pref(raw: &[u8]) -> Result<DmResult, CommandError> {
    let data = check_nv(raw, DIAG_CMD_NV_READ, DIAG_NV_HYBRID_PREF)?;
    let pref = data.u8(0)?;
    if pref > hybrid_pref::ON {
        return Err(NvError::BadParameter.into());
    }
    Ok(ResultBuilder::new().u8("hybrid-pref", pref).build())
}

pub fn parse_set_hybrid_pref(raw: &[u8]) -> Result<DmResult, CommandError> {
    check_write(raw, DIAG_NV_HYBRID_PREF)
}

// IPv6

pub(super) fn get_ipv6_enabled_request() -> Vec<u8> {
    nv_read(DIAG_NV_IPV6_ENABLED, &[])
}

pub(super) fn set_ipv6_enabled_request(enabled: u8) -> Result<Vec<u8>, CommandError> {
    if enabled != ipv6_enabled::OFF && enabled != ipv6_enabled::ON {
        return Err(invalid("IPv6 enabled value", enabled));
    }
    Ok(nv_write(DIAG_NV_IPV6_ENABLED, &[enabled]))
}

pub fn parse_get_ipv6_enabled(raw: &[u8]) -> Result<DmResult, CommandError> {
    let data = check_nv(raw, DIAG_CMD_NV_READ, DIAG_NV_IPV6_ENABLED)?;
    let enabled = data.u8(0)?;
    if enabled > ipv6_enabled::ON {
        return Err(NvError::BadParameter.into());
    }
    Ok(ResultBuilder::new().u8("ipv6-enabled", enabled).build())
}

pub fn parse_set_ipv6_enabled(raw: &[u8]) -> Result<DmResult, CommandError> {
    check_write(raw, DIAG_NV_IPV6_ENABLED)
}

// HDR revision preference

pub(super) fn get_hdr_rev_pref_request() -> Vec<u8> {
    nv_read(DIAG_NV_HDR_REV_PREF, &[])
}

pub(super) fn set_hdr_rev_pref_request(pref: u8) -> Result<Vec<u8>, CommandError> {
    if !hdr_rev_pref::is_valid(pref) {
        return Err(invalid("HDR revision preference", pref));
    }
    Ok(nv_write(DIAG_NV_HDR_REV_PREF, &[pref]))
}

pub fn parse_get_hdr_rev_pref(raw: &[u8]) -> Result<DmResult, CommandError> {
    let data = check_nv(raw, DIAG_CMD_NV_READ, DIAG_NV_HDR_REV_PREF)?;
    let pref = data.u8(0)?;
    if !hdr_rev_pref::is_valid(pref) {
        return Err(NvError::BadParameter.into());
    }
    Ok(ResultBuilder::new().u8("rev-pref", pref).build())
}

pub fn parse_set_hdr_rev_pref(raw: &[u8]) -> Result<DmResult, CommandError> {
    check_write(raw, DIAG_NV_HDR_REV_PREF)
}
