use pretty_assertions::assert_eq;
use qcdm_core::protocol::commands::codes::*;
use qcdm_core::protocol::commands::nv::NV_PACKET_LEN;
use qcdm_core::protocol::{
    decapsulate, encapsulate, Command, CommandError, DmValue, NakKind, NvError, ResponseKind,
    ResultError,
};

fn verinfo_payload() -> Vec<u8> {
    let mut p = vec![DIAG_CMD_VERSION_INFO];
    p.extend_from_slice(b"Aug 19 2008");
    p.extend_from_slice(b"20:48:47");
    p.extend_from_slice(b"Oct 29 2007");
    p.extend_from_slice(b"19:00:00");
    p.extend_from_slice(b"SCNRZ...");
    p.extend_from_slice(&[0x2a, 0x06, 0x04, 0xb9, 0x0b, 0x02, 0x00, 0xb2]);
    p
}

fn nv_response(code: u8, item: u16, data: &[u8], status: u16) -> Vec<u8> {
    let mut p = vec![code];
    p.extend_from_slice(&item.to_le_bytes());
    let mut item_data = [0u8; NV_ITEM_DATA_LEN];
    item_data[..data.len()].copy_from_slice(data);
    p.extend_from_slice(&item_data);
    p.extend_from_slice(&status.to_le_bytes());
    assert_eq!(p.len(), NV_PACKET_LEN);
    p
}

#[test]
fn test_version_info_exchange() {
    let cmd = Command::VersionInfo;
    assert_eq!(cmd.to_frame().unwrap(), vec![0x00, 0x78, 0xF0, 0x7E]);

    let frame = encapsulate(&verinfo_payload());
    assert_eq!(&frame[frame.len() - 3..], &[0x19, 0xc4, 0x7e]);

    let raw = decapsulate(&frame).result.unwrap();
    let res = cmd.parse(&raw).unwrap();
    assert_eq!(res.get_string("comp-date").unwrap(), "Aug 19 2008");
    assert_eq!(res.get_string("comp-time").unwrap(), "20:48:47");
    assert_eq!(res.get_string("release-date").unwrap(), "Oct 29 2007");
    assert_eq!(res.get_string("release-time").unwrap(), "19:00:00");
    assert_eq!(res.get_string("model").unwrap(), "SCNRZ...");
}

#[test]
fn test_foreign_framing_rejected() {
    // Sierra CnS traffic uses the same terminator but is not a DM response
    let cns = [0x0a, 0x6b, 0x6d, 0x00, 0x00, 0x07, 0x00, 0x00];
    let raw = decapsulate(&encapsulate(&cns)).result.unwrap();
    assert_eq!(
        Command::VersionInfo.parse(&raw).unwrap_err(),
        CommandError::Unexpected {
            expected: DIAG_CMD_VERSION_INFO,
            actual: 0x0a
        }
    );
}

#[test]
fn test_nv_memory_full() {
    let raw = nv_response(DIAG_CMD_NV_READ, DIAG_NV_ROAM_PREF, &[0, 1], 3);
    let err = Command::NvGetRoamPref { profile: 0 }.parse(&raw).unwrap_err();
    assert_eq!(err, CommandError::Nv(NvError::MemoryFull));
    assert!(!err.is_nak());
}

#[test]
fn test_nv_unknown_status_preserved() {
    let raw = nv_response(DIAG_CMD_NV_READ, DIAG_NV_MODE_PREF, &[], 0x42);
    assert_eq!(
        Command::NvGetModePref { profile: 0 }.parse(&raw).unwrap_err(),
        CommandError::Nv(NvError::Unknown(0x42))
    );
}

#[test]
fn test_generic_naks() {
    let cases = [
        (DIAG_CMD_BAD_CMD, NakKind::BadCommand),
        (DIAG_CMD_BAD_PARM, NakKind::BadParameter),
        (DIAG_CMD_BAD_LEN, NakKind::BadLength),
        (DIAG_CMD_BAD_DEV, NakKind::NotAccepted),
        (DIAG_CMD_BAD_MODE, NakKind::BadMode),
        (DIAG_CMD_BAD_SPC_MODE, NakKind::SpcLocked),
    ];
    for (code, kind) in cases {
        let err = Command::CmStateInfo.parse(&[code, 0x4b, 0x0f]).unwrap_err();
        assert_eq!(
            err,
            CommandError::Nak {
                kind,
                command: DIAG_CMD_SUBSYS
            }
        );
        assert!(err.is_nak());
    }
}

#[test]
fn test_empty_response_malformed() {
    assert_eq!(Command::Esn.parse(&[]).unwrap_err(), CommandError::Malformed);
}

#[test]
fn test_response_kind_matches_payload() {
    let commands = [
        Command::VersionInfo,
        Command::CmStateInfo,
        Command::HdrStateInfo,
        Command::GsmStateInfo,
        Command::NovatelEri {
            chipset: NovatelChipset::Msm6800,
        },
        Command::NvGetHybridPref,
    ];
    for cmd in commands {
        let payload = cmd.to_payload().unwrap();
        assert_eq!(ResponseKind::of(&payload), Some(cmd.response_kind()), "{:?}", cmd);
    }
}

#[test]
fn test_esn_and_result_types() {
    let res = Command::Esn.parse(&[DIAG_CMD_ESN, 0x78, 0x56, 0x34, 0x12]).unwrap();
    assert_eq!(res.get_string("esn").unwrap(), "12345678");
    assert_eq!(res.get("esn"), Some(&DmValue::String("12345678".into())));
    assert!(matches!(
        res.get_u32("esn"),
        Err(ResultError::WrongType { .. })
    ));
    assert!(matches!(
        res.get_string("imei"),
        Err(ResultError::Missing(_))
    ));
}

#[test]
fn test_set_then_ack() {
    let cmd = Command::NvSetRoamPref {
        profile: 0,
        roam_pref: roam_pref::AUTO,
    };
    let payload = cmd.to_payload().unwrap();
    assert_eq!(payload.len(), NV_PACKET_LEN);
    assert_eq!(payload[0], DIAG_CMD_NV_WRITE);

    // The device echoes the request with a zero status
    let res = cmd.parse(&payload).unwrap();
    assert!(res.is_empty());
}

#[test]
fn test_invalid_builder_parameters() {
    assert!(matches!(
        Command::NvSetRoamPref {
            profile: 0,
            roam_pref: 0x55
        }
        .to_frame(),
        Err(CommandError::InvalidParameter(_))
    ));
    assert!(matches!(
        Command::WcdmaCallStart {
            number: "555-1234".into()
        }
        .to_frame(),
        Err(CommandError::InvalidParameter(_))
    ));
}

#[test]
fn test_build_into_small_buffer() {
    let mut small = [0u8; 2];
    assert!(matches!(
        Command::VersionInfo.build(&mut small),
        Err(CommandError::BufferTooSmall { .. })
    ));
    let mut buf = [0u8; 16];
    assert_eq!(Command::VersionInfo.build(&mut buf).unwrap(), 4);
}
