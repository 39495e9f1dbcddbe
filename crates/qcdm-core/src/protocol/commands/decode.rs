//! Field reinterpretation helpers shared by the parsers

use super::codes::{cdma_band_class, cdma_prev, hdr_rev};

const HEX_DIGITS: &[u8; 16] = b"0123456789abcdef";

/// Lower-case hex string of `bytes`
pub fn bin2hex(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for &b in bytes {
        s.push(HEX_DIGITS[(b >> 4) as usize] as char);
        s.push(HEX_DIGITS[(b & 0x0F) as usize] as char);
    }
    s
}

/// ESN as printed on the device: the little-endian bytes reversed, in hex
pub fn esn_string(esn: &[u8]) -> String {
    let swapped: Vec<u8> = esn.iter().rev().copied().collect();
    bin2hex(&swapped)
}

/// Map a device CDMA protocol revision to [`cdma_prev`]
pub fn cdma_prev_to_qcdm(raw: u8) -> u8 {
    match raw {
        1..=7 => raw,
        _ => cdma_prev::UNKNOWN,
    }
}

/// Map a device CDMA band class to [`cdma_band_class`]
pub fn cdma_band_class_to_qcdm(raw: u8) -> u8 {
    match raw {
        0..=19 => raw + 1,
        _ => cdma_band_class::UNKNOWN,
    }
}

/// Map the Novatel snapshot HDR revision to [`hdr_rev`]
pub fn hdr_rev_to_qcdm(raw: u8) -> u8 {
    match raw {
        0 => hdr_rev::REV_0,
        1 => hdr_rev::REV_A,
        _ => hdr_rev::UNKNOWN,
    }
}

/// Decode an IS-95 encoded MCC.
///
/// The 10-bit field stores three digits, each minus one, with digit 0
/// transmitted as 10.
pub fn mcc_from_raw(raw: u16) -> u32 {
    let fix = |d: u32| if d == 10 { 0 } else { d };
    let raw = raw as u32 & 0x3FF;
    let d3 = fix(raw % 10 + 1);
    let d2 = fix((raw / 10) % 10 + 1);
    let d1 = fix((raw / 100) % 10 + 1);
    d1 * 100 + d2 * 10 + d3
}

/// Decode byte-packed IMEI/IMSI digits.
///
/// The low nibble of the first byte is a type/parity field and is skipped.
/// A `0xF` nibble ends the number; any other non-decimal nibble fails.
pub fn imxi_bcd_to_string(bytes: &[u8]) -> Option<String> {
    if bytes.is_empty() || bytes.len() > 8 {
        return None;
    }

    let mut out = String::with_capacity(bytes.len() * 2);
    for (i, &b) in bytes.iter().enumerate() {
        let nibbles: &[u8] = if i == 0 {
            &[b >> 4]
        } else {
            &[b & 0x0F, b >> 4]
        };
        for &n in nibbles {
            match n {
                0..=9 => out.push((b'0' + n) as char),
                0x0F => return Some(out),
                _ => return None,
            }
        }
    }
    Some(out)
}

/// Location area identity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lai {
    pub mcc: u32,
    pub mnc: u32,
    pub lac: u32,
}

/// Decode a 24.008 LAI: BCD MCC/MNC in three bytes, big-endian LAC.
pub fn decode_lai(lai: &[u8]) -> Option<Lai> {
    if lai.len() < 5 {
        return None;
    }
    let digit = |n: u8| if n <= 9 { Some(n as u32) } else { None };

    let mcc1 = digit(lai[0] & 0x0F)?;
    let mcc2 = digit(lai[0] >> 4)?;
    let mcc3 = digit(lai[1] & 0x0F)?;
    let mnc3 = lai[1] >> 4;
    let mnc1 = digit(lai[2] & 0x0F)?;
    let mnc2 = digit(lai[2] >> 4)?;

    let mnc = if mnc3 == 0x0F {
        mnc1 * 10 + mnc2
    } else {
        mnc1 * 100 + mnc2 * 10 + digit(mnc3)?
    };

    Some(Lai {
        mcc: mcc1 * 100 + mcc2 * 10 + mcc3,
        mnc,
        lac: u16::from_be_bytes([lai[3], lai[4]]) as u32,
    })
}
