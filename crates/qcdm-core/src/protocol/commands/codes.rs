//! Wire constants: command codes, subsystems, NV items and value enums

/// Version info
pub const DIAG_CMD_VERSION_INFO: u8 = 0;
/// Electronic serial number
pub const DIAG_CMD_ESN: u8 = 1;
/// Station status
pub const DIAG_CMD_STATUS: u8 = 12;
/// Log packet (unsolicited when logging is enabled)
pub const DIAG_CMD_LOG: u8 = 16;
/// Invalid command
pub const DIAG_CMD_BAD_CMD: u8 = 19;
/// Invalid parameter
pub const DIAG_CMD_BAD_PARM: u8 = 20;
/// Invalid packet length
pub const DIAG_CMD_BAD_LEN: u8 = 21;
/// Not accepted by the device
pub const DIAG_CMD_BAD_DEV: u8 = 22;
/// Not allowed in this mode
pub const DIAG_CMD_BAD_MODE: u8 = 24;
/// Read NV item
pub const DIAG_CMD_NV_READ: u8 = 38;
/// Write NV item
pub const DIAG_CMD_NV_WRITE: u8 = 39;
/// Mode change request
pub const DIAG_CMD_CONTROL: u8 = 41;
/// Software version
pub const DIAG_CMD_SW_VERSION: u8 = 56;
/// Current pilot sets
pub const DIAG_CMD_PILOT_SETS: u8 = 64;
/// NV access refused while the SPC lock is active
pub const DIAG_CMD_BAD_SPC_MODE: u8 = 66;
/// Operation not allowed in this security state
pub const DIAG_CMD_BAD_SEC_MODE: u8 = 71;
/// Subsystem dispatch
pub const DIAG_CMD_SUBSYS: u8 = 75;
/// Extended log mask
pub const DIAG_CMD_EXT_LOGMASK: u8 = 93;
/// Event reporting on/off
pub const DIAG_CMD_EVENT_REPORT: u8 = 96;
/// Status snapshot
pub const DIAG_CMD_STATUS_SNAPSHOT: u8 = 99;
/// Log configuration
pub const DIAG_CMD_LOG_CONFIG: u8 = 115;
/// Unsolicited indication seen on some Samsung devices
pub const DIAG_CMD_SAMSUNG_IND: u8 = 217;

pub const DIAG_SUBSYS_WCDMA: u8 = 4;
pub const DIAG_SUBSYS_HDR: u8 = 5;
pub const DIAG_SUBSYS_GSM: u8 = 8;
pub const DIAG_SUBSYS_CM: u8 = 15;
pub const DIAG_SUBSYS_NOVATEL_6500: u8 = 50;
pub const DIAG_SUBSYS_LTE: u8 = 68;
pub const DIAG_SUBSYS_ZTE: u8 = 101;
pub const DIAG_SUBSYS_NOVATEL_6800: u8 = 250;

pub const DIAG_SUBSYS_WCDMA_CALL_START: u16 = 12;
pub const DIAG_SUBSYS_WCDMA_CALL_END: u16 = 13;
pub const DIAG_SUBSYS_WCDMA_STATE_INFO: u16 = 15;
pub const DIAG_SUBSYS_HDR_STATE_INFO: u16 = 8;
pub const DIAG_SUBSYS_GSM_STATE_INFO: u16 = 1;
pub const DIAG_SUBSYS_CM_STATE_INFO: u16 = 0;
pub const DIAG_SUBSYS_ZTE_STATUS: u16 = 0;
pub const DIAG_SUBSYS_NOVATEL_MODEM_SNAPSHOT: u16 = 7;
pub const DIAG_SUBSYS_NOVATEL_ERI: u16 = 8;

pub const NOVATEL_SNAPSHOT_TECH_CDMA_EVDO: u8 = 7;
pub const NOVATEL_SNAPSHOT_TECH_WCDMA: u8 = 20;

// NV item ids
pub const DIAG_NV_MODE_PREF: u16 = 10;
pub const DIAG_NV_DIR_NUMBER: u16 = 178;
pub const DIAG_NV_ROAM_PREF: u16 = 442;
pub const DIAG_NV_HYBRID_PREF: u16 = 562;
pub const DIAG_NV_IPV6_ENABLED: u16 = 4102;
pub const DIAG_NV_HDR_REV_PREF: u16 = 4964;

/// NV item payload size inside read/write commands
pub const NV_ITEM_DATA_LEN: usize = 128;

/// Control command modes
pub const CONTROL_MODE_OFFLINE: u16 = 1;
pub const CONTROL_MODE_RESET: u16 = 2;

pub const LOG_CONFIG_OP_GET_RANGE: u32 = 0x01;
pub const LOG_CONFIG_OP_SET_MASK: u32 = 0x03;
pub const LOG_CONFIG_OP_GET_MASK: u32 = 0x04;

/// Largest log code representable in an ext log mask
pub const EXT_LOGMASK_MAX_ITEMS: u16 = 4095;

/// Roaming preference values (NV and call manager share these)
pub mod roam_pref {
    pub const HOME_ONLY: u8 = 0x01;
    pub const ROAM_ONLY: u8 = 0x06;
    pub const AUTO: u8 = 0xFF;

    /// Whether `v` is one of the known roaming preferences
    pub fn is_valid(v: u8) -> bool {
        matches!(v, HOME_ONLY | ROAM_ONLY | AUTO)
    }
}

/// NV mode preference values
pub mod mode_pref {
    pub const DIGITAL: u8 = 0x00;
    pub const DIGITAL_ONLY: u8 = 0x01;
    pub const ANALOG: u8 = 0x02;
    pub const ANALOG_ONLY: u8 = 0x03;
    pub const AUTO: u8 = 0x04;
    pub const ONE_X_ONLY: u8 = 0x09;
    pub const HDR_ONLY: u8 = 0x0A;
    pub const GPRS_ONLY: u8 = 0x0D;
    pub const UMTS_ONLY: u8 = 0x0E;
    pub const GSM_UMTS_ONLY: u8 = 0x11;
    pub const ONE_X_HDR_ONLY: u8 = 0x13;
    pub const LTE_ONLY: u8 = 0x1E;
    pub const GSM_UMTS_LTE_ONLY: u8 = 0x1F;
    pub const ONE_X_HDR_LTE_ONLY: u8 = 0x24;

    /// Whether `v` is one of the known NV mode preferences
    pub fn is_valid(v: u8) -> bool {
        matches!(
            v,
            DIGITAL
                | DIGITAL_ONLY
                | ANALOG
                | ANALOG_ONLY
                | AUTO
                | ONE_X_ONLY
                | HDR_ONLY
                | GPRS_ONLY
                | UMTS_ONLY
                | GSM_UMTS_ONLY
                | ONE_X_HDR_ONLY
                | LTE_ONLY
                | GSM_UMTS_LTE_ONLY
                | ONE_X_HDR_LTE_ONLY
        )
    }
}

pub mod hybrid_pref {
    pub const OFF: u8 = 0x00;
    pub const ON: u8 = 0x01;
}

pub mod ipv6_enabled {
    pub const OFF: u8 = 0x00;
    pub const ON: u8 = 0x01;
}

pub mod hdr_rev_pref {
    pub const REV_0: u8 = 0x00;
    pub const REV_A: u8 = 0x01;
    pub const EHRPD: u8 = 0x04;

    /// Whether `v` is one of the known HDR revision preferences
    pub fn is_valid(v: u8) -> bool {
        matches!(v, REV_0 | REV_A | EHRPD)
    }
}

/// Protocol-neutral CDMA protocol revisions
pub mod cdma_prev {
    pub const UNKNOWN: u8 = 0;
    pub const IS_95: u8 = 1;
    pub const IS_95A: u8 = 2;
    pub const IS_95A_TSB74: u8 = 3;
    pub const IS_95B_PHASE1: u8 = 4;
    pub const IS_95B_PHASE2: u8 = 5;
    pub const IS2000_REL0: u8 = 6;
    pub const IS2000_RELA: u8 = 7;
}

/// Protocol-neutral CDMA band classes: band class N maps to N + 1
pub mod cdma_band_class {
    pub const UNKNOWN: u8 = 0;
    pub const BC0_CELLULAR_800: u8 = 1;
    pub const BC1_PCS: u8 = 2;
    pub const BC10_SECONDARY_800: u8 = 11;
    pub const BC15_AWS: u8 = 16;
    pub const BC19_US_LOWER_700: u8 = 20;
}

pub mod hdr_rev {
    pub const UNKNOWN: u8 = 0x00;
    pub const REV_0: u8 = 0x01;
    pub const REV_A: u8 = 0x02;
}

/// Status snapshot "state" values as reported in results
pub mod snapshot_state {
    pub const UNKNOWN: u8 = 0x00;
    pub const NO_SERVICE: u8 = 0x01;
    pub const IDLE: u8 = 0x03;
    pub const CONVERSATION: u8 = 0x07;
    pub const HDR: u8 = 0x41;
}

/// Pilot set selectors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PilotSetType {
    Active = 1,
    Candidate = 2,
    Neighbor = 3,
}

impl PilotSetType {
    /// Result key holding the raw records of this set
    pub fn key(self) -> &'static str {
        match self {
            PilotSetType::Active => "active-set",
            PilotSetType::Candidate => "candidate-set",
            PilotSetType::Neighbor => "neighbor-set",
        }
    }
}

/// Novatel diagnostic subsystem flavours
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NovatelChipset {
    Msm6500,
    Msm6800,
}

impl NovatelChipset {
    /// Subsystem id used by this chipset
    pub fn subsys_id(self) -> u8 {
        match self {
            NovatelChipset::Msm6500 => DIAG_SUBSYS_NOVATEL_6500,
            NovatelChipset::Msm6800 => DIAG_SUBSYS_NOVATEL_6800,
        }
    }

    /// Map a numeric chipset selector (1 = 6500, 2 = 6800)
    pub fn from_selector(v: u8) -> Option<Self> {
        match v {
            1 => Some(NovatelChipset::Msm6500),
            2 => Some(NovatelChipset::Msm6800),
            _ => None,
        }
    }
}

// Log item codes
pub const LOG_ITEM_CDMA_PAGING_CHANNEL_MSG: u16 = 0x1007;
pub const LOG_ITEM_CDMA_REVERSE_POWER_CONTROL: u16 = 0x102C;
pub const LOG_ITEM_EVDO_PILOT_SETS_V2: u16 = 0x108B;
pub const LOG_ITEM_WCDMA_AGC_INFO: u16 = 0x4105;
pub const LOG_ITEM_WCDMA_RRC_STATE: u16 = 0x4125;
pub const LOG_ITEM_WCDMA_CELL_ID: u16 = 0x4127;
pub const LOG_ITEM_GSM_BCCH_MESSAGE: u16 = 0x5134;

/// Equipment id used for LTE log items
pub const LOG_EQUIP_ID_LTE: u32 = 11;
