use bytes::BytesMut;
use pretty_assertions::assert_eq;
use qcdm_core::protocol::frame::{crc16, escape_to_vec, unescape};
use qcdm_core::protocol::{decapsulate, encapsulate, DmCodec, FrameError};
use tokio_util::codec::{Decoder, Encoder};

/// Version info response captured from a Novatel modem
const VERINFO_FRAME: [u8; 58] = [
    0x00, 0x41, 0x75, 0x67, 0x20, 0x31, 0x39, 0x20, 0x32, 0x30, 0x30, 0x38, 0x32, 0x30, 0x3a,
    0x34, 0x38, 0x3a, 0x34, 0x37, 0x4f, 0x63, 0x74, 0x20, 0x32, 0x39, 0x20, 0x32, 0x30, 0x30,
    0x37, 0x31, 0x39, 0x3a, 0x30, 0x30, 0x3a, 0x30, 0x30, 0x53, 0x43, 0x4e, 0x52, 0x5a, 0x2e,
    0x2e, 0x2e, 0x2a, 0x06, 0x04, 0xb9, 0x0b, 0x02, 0x00, 0xb2, 0x19, 0xc4, 0x7e,
];

#[test]
fn test_captured_frame_decodes() {
    let d = decapsulate(&VERINFO_FRAME);
    assert_eq!(d.consumed, VERINFO_FRAME.len());
    let payload = d.result.unwrap();
    assert_eq!(payload.len(), 55);
    assert_eq!(&payload[1..12], b"Aug 19 2008");
    // Re-encoding the payload reproduces the captured bytes
    assert_eq!(encapsulate(&payload), VERINFO_FRAME.to_vec());
}

#[test]
fn test_roundtrip_with_reserved_bytes() {
    let payloads: [&[u8]; 4] = [
        &[0x00],
        &[0x7E, 0x7D, 0x7E, 0x7D],
        &[0x4B, 0x0F, 0x00, 0x00, 0x7D, 0x5E, 0x5D],
        &[0xFF; 300],
    ];
    for payload in payloads {
        let frame = encapsulate(payload);
        assert_eq!(*frame.last().unwrap(), 0x7E);
        assert!(!frame[..frame.len() - 1].contains(&0x7E));

        let d = decapsulate(&frame);
        assert_eq!(d.consumed, frame.len());
        assert_eq!(d.result.unwrap(), payload.to_vec());
    }
}

#[test]
fn test_single_bit_flip_detected() {
    let payload = [0x26, 0xBA, 0x01, 0x00, 0x12, 0x34];
    let frame = encapsulate(&payload);
    for i in 0..frame.len() - 1 {
        for bit in 0..8 {
            let mut bad = frame.clone();
            bad[i] ^= 1 << bit;
            // Flips that create reserved bytes change the framing itself
            if bad[i] == 0x7E || bad[i] == 0x7D || frame[i] == 0x7D {
                continue;
            }
            let d = decapsulate(&bad);
            assert!(
                matches!(d.result, Err(FrameError::CrcMismatch { .. })),
                "flip of bit {} in byte {} went unnoticed",
                bit,
                i
            );
        }
    }
}

#[test]
fn test_crc_appended_little_endian() {
    let payload = [0x0C];
    let crc = crc16(&payload);
    let frame = encapsulate(&payload);
    let unescaped = {
        let mut out = vec![0u8; frame.len()];
        let (n, escaping) = unescape(&frame[..frame.len() - 1], &mut out, false).unwrap();
        assert!(!escaping);
        out.truncate(n);
        out
    };
    assert_eq!(unescaped, vec![0x0C, crc as u8, (crc >> 8) as u8]);
}

#[test]
fn test_unescape_restarts_across_chunks() {
    let escaped = escape_to_vec(&[0x01, 0x7E, 0x02, 0x7D, 0x03]);
    let whole = {
        let mut out = vec![0u8; escaped.len()];
        let (n, _) = unescape(&escaped, &mut out, false).unwrap();
        out.truncate(n);
        out
    };

    // Split at every position, including right after an escape byte
    for split in 0..=escaped.len() {
        let mut out = vec![0u8; escaped.len()];
        let (n1, escaping) = unescape(&escaped[..split], &mut out, false).unwrap();
        let (n2, escaping) = unescape(&escaped[split..], &mut out[n1..], escaping).unwrap();
        assert!(!escaping);
        assert_eq!(&out[..n1 + n2], whole.as_slice(), "split at {}", split);
    }
}

#[test]
fn test_incomplete_frame_needs_more() {
    let frame = encapsulate(&[0x00, 0x01, 0x02, 0x03]);
    for len in 0..frame.len() {
        let d = decapsulate(&frame[..len]);
        assert!(d.needs_more(), "prefix of {} bytes", len);
        assert_eq!(d.consumed, 0);
    }
}

#[test]
fn test_codec_skips_leading_terminators() {
    let mut src = BytesMut::new();
    src.extend_from_slice(&[0x7E; 12]);
    src.extend_from_slice(&VERINFO_FRAME);

    let mut codec = DmCodec::new();
    let payload = codec.decode(&mut src).unwrap().unwrap();
    assert_eq!(payload.len(), 55);
    assert_eq!(payload[0], 0x00);
    assert!(src.is_empty());
    assert_eq!(codec.decode(&mut src).unwrap(), None);
}

#[test]
fn test_codec_stream_of_frames() {
    let mut codec = DmCodec::new();
    let mut wire = BytesMut::new();
    codec.encode(&[0x00][..], &mut wire).unwrap();
    codec.encode(&[0x01, 0x7E][..], &mut wire).unwrap();

    // Feed one byte at a time
    let mut src = BytesMut::new();
    let mut frames = Vec::new();
    for b in wire {
        src.extend_from_slice(&[b]);
        while let Some(f) = codec.decode(&mut src).unwrap() {
            frames.push(f);
        }
    }
    assert_eq!(frames, vec![vec![0x00], vec![0x01, 0x7E]]);
}

#[test]
fn test_codec_reports_crc_error_then_continues() {
    let mut src = BytesMut::new();
    src.extend_from_slice(&[0x00, 0x01, 0x02, 0x03, 0x7E]);
    src.extend_from_slice(&encapsulate(&[0x05]));

    let mut codec = DmCodec::new();
    assert!(matches!(
        codec.decode(&mut src),
        Err(FrameError::CrcMismatch { .. })
    ));
    assert_eq!(codec.decode(&mut src).unwrap(), Some(vec![0x05]));
}
