//! DM command builders and response parsers
//!
//! [`Command`] is the closed set of requests this crate knows how to speak.
//! Each variant serializes to its exact little-endian payload and knows how
//! to validate and decode the device's answer into a [`DmResult`].
//!
//! Free parser functions are exported per command kind for callers that
//! receive raw payloads some other way (captures, unsolicited traffic).

pub mod basic;
pub mod codes;
pub mod decode;
pub mod logging;
pub mod nv;
pub mod subsys;

use tracing::trace;

use super::error::{CommandError, NakKind};
use super::frame;
use super::result::DmResult;
use super::wire::{FieldReader, PayloadWriter};

pub use basic::{pilot_set_count, pilot_set_pilot, Pilot};
pub use codes::{NovatelChipset, PilotSetType};
pub use logging::{
    ext_logmask_has_item, log_config_code_set, EvdoPilot, EvdoPilotSets, LogPacket,
};

use codes::*;

/// Map a generic negative acknowledgement code
fn nak_kind(code: u8) -> Option<NakKind> {
    match code {
        DIAG_CMD_BAD_CMD => Some(NakKind::BadCommand),
        DIAG_CMD_BAD_PARM => Some(NakKind::BadParameter),
        DIAG_CMD_BAD_LEN => Some(NakKind::BadLength),
        DIAG_CMD_BAD_DEV => Some(NakKind::NotAccepted),
        DIAG_CMD_BAD_MODE => Some(NakKind::BadMode),
        DIAG_CMD_BAD_SPC_MODE => Some(NakKind::SpcLocked),
        _ => None,
    }
}

/// Validate the command code and minimum length of a response
pub(crate) fn check_command(
    raw: &[u8],
    cmd: u8,
    min_len: usize,
) -> Result<FieldReader<'_>, CommandError> {
    let first = *raw.first().ok_or(CommandError::Malformed)?;

    if let Some(kind) = nak_kind(first) {
        return Err(CommandError::Nak { kind, command: cmd });
    }
    if first != cmd {
        return Err(CommandError::Unexpected {
            expected: cmd,
            actual: first,
        });
    }
    if raw.len() < min_len {
        return Err(CommandError::TooShort {
            command: cmd,
            needed: min_len,
            got: raw.len(),
        });
    }

    Ok(FieldReader::new(raw, cmd))
}

/// Validate a subsystem response header, then its minimum length
pub(crate) fn check_subsys(
    raw: &[u8],
    subsys_id: u8,
    subsys_cmd: u16,
    min_len: usize,
) -> Result<FieldReader<'_>, CommandError> {
    let r = check_command(raw, DIAG_CMD_SUBSYS, subsys::SUBSYS_HEADER_LEN)?;

    let actual_id = r.u8(1)?;
    let actual_cmd = r.u16(2)?;
    if actual_id != subsys_id || actual_cmd != subsys_cmd {
        return Err(CommandError::UnexpectedSubsystem {
            expected_id: subsys_id,
            expected_cmd: subsys_cmd,
            actual_id,
            actual_cmd,
        });
    }

    check_command(raw, DIAG_CMD_SUBSYS, min_len)
}

/// Which response a command expects: the command code, plus the
/// subsystem id and command for subsystem requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResponseKind {
    pub code: u8,
    pub subsys: Option<(u8, u16)>,
}

impl ResponseKind {
    const fn code(code: u8) -> Self {
        Self { code, subsys: None }
    }

    const fn subsys(id: u8, cmd: u16) -> Self {
        Self {
            code: DIAG_CMD_SUBSYS,
            subsys: Some((id, cmd)),
        }
    }

    /// Classify a raw response payload; `None` if it is too short to tell
    pub fn of(raw: &[u8]) -> Option<Self> {
        let code = *raw.first()?;
        if code != DIAG_CMD_SUBSYS {
            return Some(Self::code(code));
        }
        let r = FieldReader::new(raw, code);
        Some(Self::subsys(r.u8(1).ok()?, r.u16(2).ok()?))
    }
}

/// A DM request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    VersionInfo,
    Esn,
    CdmaStatus,
    SwVersion,
    StatusSnapshot,
    PilotSets,
    /// Take the modem offline or reset it ([`CONTROL_MODE_OFFLINE`], [`CONTROL_MODE_RESET`])
    Control { mode: u16 },
    NvGetMdn { profile: u8 },
    NvGetRoamPref { profile: u8 },
    NvSetRoamPref { profile: u8, roam_pref: u8 },
    NvGetModePref { profile: u8 },
    NvSetModePref { profile: u8, mode_pref: u8 },
    NvGetHybridPref,
    NvSetHybridPref { hybrid_pref: u8 },
    NvGetIpv6Enabled,
    NvSetIpv6Enabled { enabled: u8 },
    NvGetHdrRevPref,
    NvSetHdrRevPref { rev_pref: u8 },
    CmStateInfo,
    HdrStateInfo,
    WcdmaStateInfo,
    GsmStateInfo,
    /// Dial `number` (digits, `*` and `#`)
    WcdmaCallStart { number: String },
    WcdmaCallEnd,
    ZteStatus,
    NovatelModemSnapshotCdma { chipset: NovatelChipset },
    NovatelEri { chipset: NovatelChipset },
    /// Set the extended log mask; no items and `max_items` zero reads it back
    ExtLogMask { items: Vec<u16>, max_items: u16 },
    EventReport { start: bool },
    LogConfigGetMask { equip_id: u32 },
    LogConfigSetMask { equip_id: u32, items: Vec<u16> },
}

impl Command {
    /// The response this command is answered with
    pub fn response_kind(&self) -> ResponseKind {
        use Command::*;
        match self {
            VersionInfo => ResponseKind::code(DIAG_CMD_VERSION_INFO),
            Esn => ResponseKind::code(DIAG_CMD_ESN),
            CdmaStatus => ResponseKind::code(DIAG_CMD_STATUS),
            SwVersion => ResponseKind::code(DIAG_CMD_SW_VERSION),
            StatusSnapshot => ResponseKind::code(DIAG_CMD_STATUS_SNAPSHOT),
            PilotSets => ResponseKind::code(DIAG_CMD_PILOT_SETS),
            Control { .. } => ResponseKind::code(DIAG_CMD_CONTROL),
            NvGetMdn { .. }
            | NvGetRoamPref { .. }
            | NvGetModePref { .. }
            | NvGetHybridPref
            | NvGetIpv6Enabled
            | NvGetHdrRevPref => ResponseKind::code(DIAG_CMD_NV_READ),
            NvSetRoamPref { .. }
            | NvSetModePref { .. }
            | NvSetHybridPref { .. }
            | NvSetIpv6Enabled { .. }
            | NvSetHdrRevPref { .. } => ResponseKind::code(DIAG_CMD_NV_WRITE),
            CmStateInfo => ResponseKind::subsys(DIAG_SUBSYS_CM, DIAG_SUBSYS_CM_STATE_INFO),
            HdrStateInfo => ResponseKind::subsys(DIAG_SUBSYS_HDR, DIAG_SUBSYS_HDR_STATE_INFO),
            WcdmaStateInfo => {
                ResponseKind::subsys(DIAG_SUBSYS_WCDMA, DIAG_SUBSYS_WCDMA_STATE_INFO)
            }
            GsmStateInfo => ResponseKind::subsys(DIAG_SUBSYS_GSM, DIAG_SUBSYS_GSM_STATE_INFO),
            WcdmaCallStart { .. } => {
                ResponseKind::subsys(DIAG_SUBSYS_WCDMA, DIAG_SUBSYS_WCDMA_CALL_START)
            }
            WcdmaCallEnd => ResponseKind::subsys(DIAG_SUBSYS_WCDMA, DIAG_SUBSYS_WCDMA_CALL_END),
            ZteStatus => ResponseKind::subsys(DIAG_SUBSYS_ZTE, DIAG_SUBSYS_ZTE_STATUS),
            NovatelModemSnapshotCdma { chipset } => {
                ResponseKind::subsys(chipset.subsys_id(), DIAG_SUBSYS_NOVATEL_MODEM_SNAPSHOT)
            }
            NovatelEri { chipset } => {
                ResponseKind::subsys(chipset.subsys_id(), DIAG_SUBSYS_NOVATEL_ERI)
            }
            ExtLogMask { .. } => ResponseKind::code(DIAG_CMD_EXT_LOGMASK),
            EventReport { .. } => ResponseKind::code(DIAG_CMD_EVENT_REPORT),
            LogConfigGetMask { .. } | LogConfigSetMask { .. } => {
                ResponseKind::code(DIAG_CMD_LOG_CONFIG)
            }
        }
    }

    /// Serialize into an unframed payload, validating parameters
    pub fn to_payload(&self) -> Result<Vec<u8>, CommandError> {
        use Command::*;
        let payload = match self {
            VersionInfo => PayloadWriter::command(DIAG_CMD_VERSION_INFO).finish(),
            Esn => PayloadWriter::command(DIAG_CMD_ESN).finish(),
            CdmaStatus => PayloadWriter::command(DIAG_CMD_STATUS).finish(),
            SwVersion => PayloadWriter::command(DIAG_CMD_SW_VERSION).finish(),
            StatusSnapshot => PayloadWriter::command(DIAG_CMD_STATUS_SNAPSHOT).finish(),
            PilotSets => PayloadWriter::command(DIAG_CMD_PILOT_SETS).finish(),
            Control { mode } => basic::control_request(*mode)?,
            NvGetMdn { profile } => nv::get_mdn_request(*profile),
            NvGetRoamPref { profile } => nv::get_roam_pref_request(*profile),
            NvSetRoamPref { profile, roam_pref } => {
                nv::set_roam_pref_request(*profile, *roam_pref)?
            }
            NvGetModePref { profile } => nv::get_mode_pref_request(*profile),
            NvSetModePref { profile, mode_pref } => {
                nv::set_mode_pref_request(*profile, *mode_pref)?
            }
            NvGetHybridPref => nv::get_hybrid_pref_request(),
            NvSetHybridPref { hybrid_pref } => nv::set_hybrid_pref_request(*hybrid_pref)?,
            NvGetIpv6Enabled => nv::get_ipv6_enabled_request(),
            NvSetIpv6Enabled { enabled } => nv::set_ipv6_enabled_request(*enabled)?,
            NvGetHdrRevPref => nv::get_hdr_rev_pref_request(),
            NvSetHdrRevPref { rev_pref } => nv::set_hdr_rev_pref_request(*rev_pref)?,
            CmStateInfo | HdrStateInfo | WcdmaStateInfo | GsmStateInfo | WcdmaCallEnd
            | ZteStatus => {
                let kind = self.response_kind();
                let (id, cmd) = kind.subsys.unwrap_or_default();
                subsys::subsys_request(id, cmd).finish()
            }
            WcdmaCallStart { number } => subsys::wcdma_call_start_request(number)?,
            NovatelModemSnapshotCdma { chipset } => subsys::nw_snapshot_cdma_request(*chipset),
            NovatelEri { chipset } => subsys::nw_eri_request(*chipset),
            ExtLogMask { items, max_items } => logging::ext_logmask_request(items, *max_items)?,
            EventReport { start } => logging::event_report_request(*start),
            LogConfigGetMask { equip_id } => logging::log_config_get_mask_request(*equip_id),
            LogConfigSetMask { equip_id, items } => {
                logging::log_config_set_mask_request(*equip_id, items)?
            }
        };
        Ok(payload)
    }

    /// Serialize into a complete frame ready for the wire
    pub fn to_frame(&self) -> Result<Vec<u8>, CommandError> {
        let payload = self.to_payload()?;
        trace!(kind = ?self.response_kind(), len = payload.len(), "built DM command");
        Ok(frame::encapsulate(&payload))
    }

    /// Serialize into `dest`, returning the number of bytes written
    pub fn build(&self, dest: &mut [u8]) -> Result<usize, CommandError> {
        let payload = self.to_payload()?;
        frame::encapsulate_into(&payload, dest).map_err(|_| CommandError::BufferTooSmall {
            needed: frame::escape_to_vec(&payload).len() + frame::DIAG_TRAILER_LEN,
            available: dest.len(),
        })
    }

    /// Validate and decode the decapsulated response to this command
    pub fn parse(&self, raw: &[u8]) -> Result<DmResult, CommandError> {
        use Command::*;
        match self {
            VersionInfo => basic::parse_version_info(raw),
            Esn => basic::parse_esn(raw),
            CdmaStatus => basic::parse_cdma_status(raw),
            SwVersion => basic::parse_sw_version(raw),
            StatusSnapshot => basic::parse_status_snapshot(raw),
            PilotSets => basic::parse_pilot_sets(raw),
            Control { .. } => basic::parse_control(raw),
            NvGetMdn { .. } => nv::parse_get_mdn(raw),
            NvGetRoamPref { .. } => nv::parse_get_roam_pref(raw),
            NvSetRoamPref { .. } => nv::parse_set_roam_pref(raw),
            NvGetModePref { .. } => nv::parse_get_mode_pref(raw),
            NvSetModePref { .. } => nv::parse_set_mode_pref(raw),
            NvGetHybridPref => nv::parse_get_hybrid_pref(raw),
            NvSetHybridPref { .. } => nv::parse_set_hybrid_pref(raw),
            NvGetIpv6Enabled => nv::parse_get_ipv6_enabled(raw),
            NvSetIpv6Enabled { .. } => nv::parse_set_ipv6_enabled(raw),
            NvGetHdrRevPref => nv::parse_get_hdr_rev_pref(raw),
            NvSetHdrRevPref { .. } => nv::parse_set_hdr_rev_pref(raw),
            CmStateInfo => subsys::parse_cm_state_info(raw),
            HdrStateInfo => subsys::parse_hdr_state_info(raw),
            WcdmaStateInfo => subsys::parse_wcdma_state_info(raw),
            GsmStateInfo => subsys::parse_gsm_state_info(raw),
            WcdmaCallStart { .. } => subsys::parse_wcdma_call_start(raw),
            WcdmaCallEnd => subsys::parse_wcdma_call_end(raw),
            ZteStatus => subsys::parse_zte_status(raw),
            NovatelModemSnapshotCdma { chipset } => subsys::parse_nw_snapshot_cdma(raw, *chipset),
            NovatelEri { chipset } => subsys::parse_nw_eri(raw, *chipset),
            ExtLogMask { .. } => logging::parse_ext_logmask(raw),
            EventReport { .. } => logging::parse_event_report(raw),
            LogConfigGetMask { .. } => logging::parse_log_config_mask(raw, LOG_CONFIG_OP_GET_MASK),
            LogConfigSetMask { .. } => logging::parse_log_config_mask(raw, LOG_CONFIG_OP_SET_MASK),
        }
    }
}
