//! DM frame encoding/decoding
//!
//! Implements the HDLC-like framing used on Qualcomm diagnostic ports.
//!
//! Frame format:
//! - N bytes: payload
//! - 2 bytes: CRC-16 of the payload (little-endian)
//! - 1 byte: terminator (`0x7E`)
//!
//! Payload and CRC are escaped: every `0x7E` or `0x7D` becomes
//! `0x7D, byte ^ 0x20`. The terminator itself is never escaped.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use super::error::FrameError;

/// Frame terminator
pub const DIAG_CONTROL_CHAR: u8 = 0x7E;
/// Escape marker
pub const DIAG_ESC_CHAR: u8 = 0x7D;
/// XOR mask applied to escaped bytes
pub const DIAG_ESC_MASK: u8 = 0x20;
/// CRC trailer plus terminator
pub const DIAG_TRAILER_LEN: usize = 3;

/// Smallest buffer `decapsulate` will look at
const MIN_FRAME_LEN: usize = 4;

const CRC16_POLY: u16 = 0x8408;
const CRC16_SEED: u16 = 0xFFFF;

const fn build_crc16_table() -> [u16; 256] {
    let mut table = [0u16; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u16;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 1 != 0 {
                (crc >> 1) ^ CRC16_POLY
            } else {
                crc >> 1
            };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

static CRC16_TABLE: [u16; 256] = build_crc16_table();

/// CRC-16 over `data`: table-driven, seed `0xFFFF`, ones-complemented result.
pub fn crc16(data: &[u8]) -> u16 {
    let crc = data.iter().fold(CRC16_SEED, |crc, &b| {
        CRC16_TABLE[((crc ^ b as u16) & 0xFF) as usize] ^ (crc >> 8)
    });
    !crc
}

fn needs_escape(b: u8) -> bool {
    b == DIAG_CONTROL_CHAR || b == DIAG_ESC_CHAR
}

/// Escape `input` into `out`, returning the number of bytes written.
///
/// When `out` is larger than twice the input the exact size check is
/// skipped since no input can expand beyond that.
pub fn escape(input: &[u8], out: &mut [u8]) -> Result<usize, FrameError> {
    if out.len() <= input.len() * 2 {
        let needed = input.len() + input.iter().filter(|&&b| needs_escape(b)).count();
        if out.len() < needed {
            return Err(FrameError::EscapeOverflow);
        }
    }

    let mut written = 0;
    for &b in input {
        if needs_escape(b) {
            out[written] = DIAG_ESC_CHAR;
            out[written + 1] = b ^ DIAG_ESC_MASK;
            written += 2;
        } else {
            out[written] = b;
            written += 1;
        }
    }
    Ok(written)
}

/// Escape `input` into a freshly allocated vector
pub fn escape_to_vec(input: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(input.len() * 2);
    for &b in input {
        if needs_escape(b) {
            out.push(DIAG_ESC_CHAR);
            out.push(b ^ DIAG_ESC_MASK);
        } else {
            out.push(b);
        }
    }
    out
}

/// Unescape `input` into `out`.
///
/// `escaping` carries the "previous byte was an escape marker" state across
/// calls so a stream can be unescaped in arbitrary chunks. Returns the number
/// of bytes written and the state to pass to the next call.
pub fn unescape(input: &[u8], out: &mut [u8], escaping: bool) -> Result<(usize, bool), FrameError> {
    let mut escaping = escaping;
    let mut written = 0;

    for &b in input {
        if written >= out.len() {
            return Err(FrameError::EscapeOverflow);
        }

        if escaping {
            out[written] = b ^ DIAG_ESC_MASK;
            written += 1;
            escaping = false;
        } else if b == DIAG_ESC_CHAR {
            escaping = true;
        } else {
            out[written] = b;
            written += 1;
        }
    }

    Ok((written, escaping))
}

/// Build a complete frame for `payload`
pub fn encapsulate(payload: &[u8]) -> Vec<u8> {
    let mut raw = Vec::with_capacity(payload.len() + 2);
    raw.extend_from_slice(payload);
    raw.extend_from_slice(&crc16(payload).to_le_bytes());

    let mut frame = escape_to_vec(&raw);
    frame.push(DIAG_CONTROL_CHAR);
    frame
}

/// Build a complete frame for `payload` into `out`, returning its length
pub fn encapsulate_into(payload: &[u8], out: &mut [u8]) -> Result<usize, FrameError> {
    let mut raw = Vec::with_capacity(payload.len() + 2);
    raw.extend_from_slice(payload);
    raw.extend_from_slice(&crc16(payload).to_le_bytes());

    if out.is_empty() {
        return Err(FrameError::EscapeOverflow);
    }
    let body_room = out.len() - 1;
    let written = escape(&raw, &mut out[..body_room])?;
    out[written] = DIAG_CONTROL_CHAR;
    Ok(written + 1)
}

/// Outcome of a single [`decapsulate`] attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decapsulated {
    /// Bytes the caller must drop from the head of its buffer
    pub consumed: usize,
    /// Decoded payload (CRC stripped) or the reason decoding failed
    pub result: Result<Vec<u8>, FrameError>,
}

impl Decapsulated {
    fn need_more() -> Self {
        Self {
            consumed: 0,
            result: Err(FrameError::NeedMoreData),
        }
    }

    /// True when the buffer holds an incomplete frame
    pub fn needs_more(&self) -> bool {
        matches!(self.result, Err(FrameError::NeedMoreData))
    }
}

/// Decode the first frame in `raw`.
///
/// Callers must always advance their buffer by `consumed`, whether or not a
/// payload was produced, so bad data is never reprocessed.
pub fn decapsulate(raw: &[u8]) -> Decapsulated {
    if raw.len() < MIN_FRAME_LEN {
        return Decapsulated::need_more();
    }

    let Some(pkt_len) = raw.iter().position(|&b| b == DIAG_CONTROL_CHAR) else {
        return Decapsulated::need_more();
    };

    // A terminator this early cannot follow a payload plus CRC
    if pkt_len < 3 {
        return Decapsulated {
            consumed: pkt_len + 1,
            result: Err(FrameError::MalformedBoundary { offset: pkt_len }),
        };
    }

    let mut unesc = vec![0u8; pkt_len];
    let (unesc_len, escaping) = match unescape(&raw[..pkt_len], &mut unesc, false) {
        Ok(v) => v,
        Err(e) => {
            return Decapsulated {
                consumed: pkt_len + 1,
                result: Err(e),
            }
        }
    };

    // The terminator is never escaped, so more data cannot finish this frame
    if escaping {
        return Decapsulated {
            consumed: pkt_len + 1,
            result: Err(FrameError::MalformedBoundary { offset: pkt_len }),
        };
    }

    if unesc_len < 2 {
        return Decapsulated {
            consumed: pkt_len + 1,
            result: Err(FrameError::MalformedBoundary { offset: pkt_len }),
        };
    }

    let body = &unesc[..unesc_len - 2];
    let expected = crc16(body);
    let actual = u16::from_le_bytes([unesc[unesc_len - 2], unesc[unesc_len - 1]]);
    if expected != actual {
        return Decapsulated {
            consumed: pkt_len + 1,
            result: Err(FrameError::CrcMismatch { expected, actual }),
        };
    }

    Decapsulated {
        consumed: pkt_len + 1,
        result: Ok(body.to_vec()),
    }
}

/// Stream codec for DM frames.
///
/// Empty and malformed frames (for example runs of bare terminators) are
/// skipped silently; CRC failures are returned as errors after the bad frame
/// has been dropped from the buffer.
#[derive(Debug, Default, Clone, Copy)]
pub struct DmCodec;

impl DmCodec {
    /// Create a new codec
    pub fn new() -> Self {
        Self
    }
}

impl Decoder for DmCodec {
    type Item = Vec<u8>;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            let d = decapsulate(src);
            src.advance(d.consumed);
            match d.result {
                Ok(payload) => return Ok(Some(payload)),
                Err(FrameError::NeedMoreData) => return Ok(None),
                Err(FrameError::MalformedBoundary { .. }) => continue,
                Err(e) => return Err(e),
            }
        }
    }
}

impl Encoder<&[u8]> for DmCodec {
    type Error = FrameError;

    fn encode(&mut self, payload: &[u8], dst: &mut BytesMut) -> Result<(), Self::Error> {
        let frame = encapsulate(payload);
        dst.reserve(frame.len());
        dst.put_slice(&frame);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crc16_table_prefix() {
        assert_eq!(&CRC16_TABLE[..4], &[0x0000, 0x1189, 0x2312, 0x329b]);
        assert_eq!(CRC16_TABLE[255], 0x0f78);
    }

    #[test]
    fn test_crc16_check_value() {
        assert_eq!(crc16(b"123456789"), 0x906E);
    }

    #[test]
    fn test_escape_special_bytes() {
        let mut out = [0u8; 16];
        let n = escape(&[0x01, 0x7E, 0x7D, 0x02], &mut out).unwrap();
        assert_eq!(&out[..n], &[0x01, 0x7D, 0x5E, 0x7D, 0x5D, 0x02]);
    }

    #[test]
    fn test_escape_overflow() {
        let mut out = [0u8; 3];
        assert_eq!(escape(&[0x7E, 0x7E], &mut out), Err(FrameError::EscapeOverflow));
    }

    #[test]
    fn test_escape_exact_fit() {
        let mut out = [0u8; 3];
        assert_eq!(escape(&[0x7E, 0x01], &mut out), Ok(3));
    }

    #[test]
    fn test_unescape_overflow() {
        let mut out = [0u8; 1];
        assert_eq!(unescape(&[1, 2], &mut out, false), Err(FrameError::EscapeOverflow));
    }

    #[test]
    fn test_unescape_carries_flag() {
        let mut out = [0u8; 4];
        let (n, esc) = unescape(&[0x01, 0x7D], &mut out, false).unwrap();
        assert_eq!((n, esc), (1, true));
        let (n2, esc2) = unescape(&[0x5E], &mut out[n..], esc).unwrap();
        assert_eq!((n2, esc2), (1, false));
        assert_eq!(&out[..2], &[0x01, 0x7E]);
    }

    #[test]
    fn test_encapsulate_version_info() {
        let frame = encapsulate(&[0x00]);
        assert_eq!(*frame.last().unwrap(), DIAG_CONTROL_CHAR);
        let d = decapsulate(&frame);
        assert_eq!(d.consumed, frame.len());
        assert_eq!(d.result, Ok(vec![0x00]));
    }

    #[test]
    fn test_encapsulate_into_matches_vec() {
        let payload = [0x4B, 0x0F, 0x00, 0x00, 0x7E];
        let mut buf = [0u8; 32];
        let n = encapsulate_into(&payload, &mut buf).unwrap();
        assert_eq!(&buf[..n], encapsulate(&payload).as_slice());
    }

    #[test]
    fn test_encapsulate_into_too_small() {
        let mut buf = [0u8; 2];
        assert!(encapsulate_into(&[0x00, 0x01], &mut buf).is_err());
    }

    #[test]
    fn test_decapsulate_short_input() {
        let d = decapsulate(&[0x00, 0x7E]);
        assert!(d.needs_more());
        assert_eq!(d.consumed, 0);
    }

    #[test]
    fn test_decapsulate_early_terminator() {
        let d = decapsulate(&[0x00, 0x7E, 0x01, 0x02, 0x03]);
        assert_eq!(d.consumed, 2);
        assert_eq!(d.result, Err(FrameError::MalformedBoundary { offset: 1 }));
    }

    #[test]
    fn test_decapsulate_dangling_escape() {
        // Escape marker directly before the terminator
        let d = decapsulate(&[0x01, 0x02, 0x03, 0x7D, 0x7E]);
        assert_eq!(d.consumed, 5);
        assert_eq!(d.result, Err(FrameError::MalformedBoundary { offset: 4 }));
    }

    #[test]
    fn test_codec_skips_dangling_escape() {
        let mut codec = DmCodec::new();
        let mut buf = BytesMut::new();
        buf.put_slice(&[0x01, 0x02, 0x03, 0x7D, 0x7E]);
        buf.put_slice(&encapsulate(&[0x01, 0x78, 0x56, 0x34, 0x12]));
        let item = codec.decode(&mut buf).unwrap();
        assert_eq!(item, Some(vec![0x01, 0x78, 0x56, 0x34, 0x12]));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_codec_error_from_io() {
        let err: FrameError = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone").into();
        assert_eq!(err, FrameError::Io("gone".into()));
    }

    #[test]
    fn test_decapsulate_crc_mismatch() {
        let mut frame = encapsulate(&[0x0C, 0x01, 0x02]);
        frame[1] ^= 0x01;
        let d = decapsulate(&frame);
        assert_eq!(d.consumed, frame.len());
        assert!(matches!(d.result, Err(FrameError::CrcMismatch { .. })));
    }

    #[test]
    fn test_codec_skips_empty_frames() {
        let mut codec = DmCodec::new();
        let mut buf = BytesMut::new();
        buf.put_slice(&[0x7E; 12]);
        buf.put_slice(&encapsulate(&[0x01, 0x02, 0x03, 0x04]));
        let item = codec.decode(&mut buf).unwrap();
        assert_eq!(item, Some(vec![0x01, 0x02, 0x03, 0x04]));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_codec_encode() {
        let mut codec = DmCodec::new();
        let mut buf = BytesMut::new();
        codec.encode(&[0x7D][..], &mut buf).unwrap();
        assert_eq!(&buf[..2], &[0x7D, 0x5D]);
        assert_eq!(buf[buf.len() - 1], 0x7E);
    }
}
