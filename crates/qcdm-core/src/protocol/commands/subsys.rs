//! Subsystem-dispatched commands (call manager, HDR, WCDMA, GSM, vendor)

use super::codes::*;
use super::decode::{
    cdma_band_class_to_qcdm, cdma_prev_to_qcdm, decode_lai, hdr_rev_to_qcdm, imxi_bcd_to_string,
};
use super::check_subsys;
use crate::protocol::error::{CommandError, NvError};
use crate::protocol::result::{DmResult, ResultBuilder};
use crate::protocol::wire::{FieldReader, PayloadWriter};

/// Code, subsystem id and u16 subsystem command
pub const SUBSYS_HEADER_LEN: usize = 4;

const CM_STATE_INFO_RSP_LEN: usize = SUBSYS_HEADER_LEN + 10 * 4;
const HDR_STATE_INFO_RSP_LEN: usize = SUBSYS_HEADER_LEN + 9;
const ZTE_STATUS_RSP_LEN: usize = SUBSYS_HEADER_LEN + 10;
const WCDMA_STATE_INFO_RSP_LEN: usize = SUBSYS_HEADER_LEN + 19;
const GSM_STATE_INFO_RSP_LEN: usize = SUBSYS_HEADER_LEN + 28;
const NW_SNAPSHOT_DATA_OFFSET: usize = SUBSYS_HEADER_LEN + 9;
const NW_SNAPSHOT_CDMA_LEN: usize = 43;
const NW_SNAPSHOT_RSP_LEN: usize = NW_SNAPSHOT_DATA_OFFSET + NW_SNAPSHOT_CDMA_LEN;
const NW_ERI_RSP_LEN: usize = SUBSYS_HEADER_LEN + 87;
const NW_ERI_TEXT_LEN: usize = 32;

/// Longest dial string a WCDMA call start can carry
pub const WCDMA_CALL_MAX_DIGITS: usize = 32;
const WCDMA_AMR_RATE_DEFAULT: u8 = 7;

pub(super) fn subsys_request(subsys_id: u8, subsys_cmd: u16) -> PayloadWriter {
    PayloadWriter::command(DIAG_CMD_SUBSYS)
        .u8(subsys_id)
        .u16(subsys_cmd)
}

// Call manager

/// Decode call manager state; the roaming preference must be a known value
pub fn parse_cm_state_info(raw: &[u8]) -> Result<DmResult, CommandError> {
    let r = check_subsys(
        raw,
        DIAG_SUBSYS_CM,
        DIAG_SUBSYS_CM_STATE_INFO,
        CM_STATE_INFO_RSP_LEN,
    )?;

    let roam = r.u32(24)?;
    let valid = u8::try_from(roam).map(roam_pref::is_valid).unwrap_or(false);
    if !valid {
        return Err(NvError::BadParameter.into());
    }

    Ok(ResultBuilder::new()
        .u32("call-state", r.u32(4)?)
        .u32("operating-mode", r.u32(8)?)
        .u32("system-mode", r.u32(12)?)
        .u32("mode-pref", r.u32(16)?)
        .u32("band-pref", r.u32(20)?)
        .u32("roam-pref", roam)
        .u32("service-domain-pref", r.u32(28)?)
        .u32("acq-order-pref", r.u32(32)?)
        .u32("hybrid-pref", r.u32(36)?)
        .u32("network-selection-pref", r.u32(40)?)
        .build())
}

// HDR

pub fn parse_hdr_state_info(raw: &[u8]) -> Result<DmResult, CommandError> {
    let r = check_subsys(
        raw,
        DIAG_SUBSYS_HDR,
        DIAG_SUBSYS_HDR_STATE_INFO,
        HDR_STATE_INFO_RSP_LEN,
    )?;
    Ok(ResultBuilder::new()
        .u8("at-state", r.u8(4)?)
        .u8("session-state", r.u8(5)?)
        .u8("almp-state", r.u8(6)?)
        .u8("init-state", r.u8(7)?)
        .u8("idle-state", r.u8(8)?)
        .u8("connected-state", r.u8(9)?)
        .u8("route-update-state", r.u8(10)?)
        .u8("overhead-msg-state", r.u8(11)?)
        .u8("hdr-hybrid-mode", r.u8(12)?)
        .build())
}

// WCDMA / GSM

/// Add the IMEI and IMSI of a state info response; undecodable ones are left out
fn add_identities(mut b: ResultBuilder, r: &FieldReader<'_>) -> Result<ResultBuilder, CommandError> {
    let imei_len = (r.u8(4)? as usize).min(8);
    if let Some(imei) = imxi_bcd_to_string(r.bytes(5, imei_len)?) {
        b = b.string("imei", imei);
    }
    let imsi_len = (r.u8(13)? as usize).min(8);
    if let Some(imsi) = imxi_bcd_to_string(r.bytes(14, imsi_len)?) {
        b = b.string("imsi", imsi);
    }
    Ok(b)
}

pub fn parse_wcdma_state_info(raw: &[u8]) -> Result<DmResult, CommandError> {
    let r = check_subsys(
        raw,
        DIAG_SUBSYS_WCDMA,
        DIAG_SUBSYS_WCDMA_STATE_INFO,
        WCDMA_STATE_INFO_RSP_LEN,
    )?;
    let b = add_identities(ResultBuilder::new(), &r)?;
    Ok(b.u8("l1-state", r.u8(22)?).build())
}

pub fn parse_gsm_state_info(raw: &[u8]) -> Result<DmResult, CommandError> {
    let r = check_subsys(
        raw,
        DIAG_SUBSYS_GSM,
        DIAG_SUBSYS_GSM_STATE_INFO,
        GSM_STATE_INFO_RSP_LEN,
    )?;
    let mut b = add_identities(ResultBuilder::new(), &r)?;
    if let Some(lai) = decode_lai(r.bytes(22, 5)?) {
        b = b
            .u32("lai-mcc", lai.mcc)
            .u32("lai-mnc", lai.mnc)
            .u32("lai-lac", lai.lac);
    }
    Ok(b.u32("cellid", r.u16(27)? as u32)
        .u8("cm-call-state", r.u8(29)?)
        .u8("cm-op-mode", r.u8(30)?)
        .u8("cm-sys-mode", r.u8(31)?)
        .build())
}

pub(super) fn wcdma_call_start_request(number: &str) -> Result<Vec<u8>, CommandError> {
    let digits = number.as_bytes();
    if digits.is_empty() || digits.len() > WCDMA_CALL_MAX_DIGITS {
        return Err(CommandError::InvalidParameter(format!(
            "Dial string must be 1 to {} digits",
            WCDMA_CALL_MAX_DIGITS
        )));
    }
    if let Some(bad) = digits
        .iter()
        .find(|&&c| !(c.is_ascii_digit() || c == b'*' || c == b'#'))
    {
        return Err(CommandError::InvalidParameter(format!(
            "Invalid dial character '{}'",
            *bad as char
        )));
    }

    Ok(subsys_request(DIAG_SUBSYS_WCDMA, DIAG_SUBSYS_WCDMA_CALL_START)
        .u8(digits.len() as u8)
        .fixed(digits, WCDMA_CALL_MAX_DIGITS)
        .u8(WCDMA_AMR_RATE_DEFAULT)
        .finish())
}

pub fn parse_wcdma_call_start(raw: &[u8]) -> Result<DmResult, CommandError> {
    check_subsys(
        raw,
        DIAG_SUBSYS_WCDMA,
        DIAG_SUBSYS_WCDMA_CALL_START,
        SUBSYS_HEADER_LEN,
    )?;
    Ok(DmResult::default())
}

pub fn parse_wcdma_call_end(raw: &[u8]) -> Result<DmResult, CommandError> {
    check_subsys(
        raw,
        DIAG_SUBSYS_WCDMA,
        DIAG_SUBSYS_WCDMA_CALL_END,
        SUBSYS_HEADER_LEN,
    )?;
    Ok(DmResult::default())
}

// Vendor: ZTE

pub fn parse_zte_status(raw: &[u8]) -> Result<DmResult, CommandError> {
    let r = check_subsys(raw, DIAG_SUBSYS_ZTE, DIAG_SUBSYS_ZTE_STATUS, ZTE_STATUS_RSP_LEN)?;
    Ok(ResultBuilder::new()
        .u8("signal-indicator", r.u8(12)?)
        .build())
}

// Vendor: Novatel

pub(super) fn nw_snapshot_cdma_request(chipset: NovatelChipset) -> Vec<u8> {
    subsys_request(chipset.subsys_id(), DIAG_SUBSYS_NOVATEL_MODEM_SNAPSHOT)
        .u8(NOVATEL_SNAPSHOT_TECH_CDMA_EVDO)
        .u32(0xFFFF)
        .finish()
}

/// Decode the CDMA/EVDO part of a Novatel modem snapshot
pub fn parse_nw_snapshot_cdma(
    raw: &[u8],
    chipset: NovatelChipset,
) -> Result<DmResult, CommandError> {
    let r = check_subsys(
        raw,
        chipset.subsys_id(),
        DIAG_SUBSYS_NOVATEL_MODEM_SNAPSHOT,
        NW_SNAPSHOT_RSP_LEN,
    )?;
    let cdma = FieldReader::new(
        r.bytes(NW_SNAPSHOT_DATA_OFFSET, NW_SNAPSHOT_CDMA_LEN)?,
        DIAG_CMD_SUBSYS,
    );

    Ok(ResultBuilder::new()
        .u32("rssi", cdma.u32(0)?)
        .u8("prev", cdma_prev_to_qcdm(cdma.u8(18)?))
        .u8("band-class", cdma_band_class_to_qcdm(cdma.u8(19)?))
        .u8("eri", cdma.u8(20)?)
        .u8("hdr-rev", hdr_rev_to_qcdm(cdma.u8(42)?))
        .build())
}

pub(super) fn nw_eri_request(chipset: NovatelChipset) -> Vec<u8> {
    subsys_request(chipset.subsys_id(), DIAG_SUBSYS_NOVATEL_ERI).finish()
}

/// Decode the Novatel extended roaming indicator
pub fn parse_nw_eri(raw: &[u8], chipset: NovatelChipset) -> Result<DmResult, CommandError> {
    let r = check_subsys(raw, chipset.subsys_id(), DIAG_SUBSYS_NOVATEL_ERI, NW_ERI_RSP_LEN)?;
    let text_len = (r.u8(58)? as usize).min(NW_ERI_TEXT_LEN);

    Ok(ResultBuilder::new()
        .u8("roam", r.u8(7)?)
        .u8("indicator-id", r.u8(52)?)
        .u8("icon-id", r.u8(53)?)
        .u8("icon-mode", r.u8(54)?)
        .u8("call-prompt-id", r.u8(55)?)
        .u8("alert-id", r.u8(56)?)
        .string("text", r.text(59, text_len)?)
        .build())
}
