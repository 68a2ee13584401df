//! Multiplexed Tx: buffer composition, padding, selector stamping, trigger
//! sends, just-in-time updates and confirmation fan-out.
mod helpers {
    include!("../../helpers/mod.rs");
}

use helpers::{setup, Arena};
use korri_ipdum::{
    core::{
        ByteOrder, IpduMConfig, MuxTxPart, MuxTxPathway, PartKind, PduInfo, Segment,
        SelectorPattern, TxLoInfo, TxLoTarget, TxResult, TxUpTarget,
    },
    error::{DevError, PduError},
};

const STATIC_PART: u16 = 0;
const SHORT_PART: u16 = 1;
const LONG_PART: u16 = 2;

const fn selector(value: u8) -> [SelectorPattern; 1] {
    [SelectorPattern {
        byte_position: 1,
        mask: 0x0F,
        value,
    }]
}

const SELECT_1: [SelectorPattern; 1] = selector(1);
const SELECT_2: [SelectorPattern; 1] = selector(2);

/// byte 0
const STATIC_SEGMENTS: [Segment; 1] = [Segment {
    start_bit: 0,
    length_bits: 8,
}];

/// high nibble of byte 1 and byte 2
const SHORT_SEGMENTS: [Segment; 1] = [Segment {
    start_bit: 12,
    length_bits: 12,
}];

/// bytes 2 and 3
const LONG_SEGMENTS: [Segment; 1] = [Segment {
    start_bit: 16,
    length_bits: 16,
}];

const PATHWAY: MuxTxPathway = MuxTxPathway {
    tx_lo: 0,
    length: 4,
    byte_order: ByteOrder::LittleEndian,
    padding: 0xFF,
    static_part: Some(STATIC_PART),
    dynamic_parts: 1..3,
    initial_dynamic_part: Some(SHORT_PART),
};

const CONFIG: IpduMConfig<'static> = IpduMConfig {
    tx_up: &[
        TxUpTarget::MuxPart(0),
        TxUpTarget::MuxPart(1),
        TxUpTarget::MuxPart(2),
    ],
    tx_lo: &[TxLoInfo {
        lower_pdu: 300,
        confirmation_timeout: 0,
        target: TxLoTarget::Pathway(0),
        partition: 0,
    }],
    mux_tx_pathways: &[PATHWAY],
    mux_tx_parts: &[
        MuxTxPart {
            pathway: 0,
            kind: PartKind::Static,
            upper_pdu: 50,
            length: 4,
            segments: &STATIC_SEGMENTS,
            selector: &[],
            trigger: false,
            jit_update: true,
            confirmation: true,
        },
        MuxTxPart {
            pathway: 0,
            kind: PartKind::Dynamic,
            upper_pdu: 51,
            length: 4,
            segments: &SHORT_SEGMENTS,
            selector: &SELECT_1,
            trigger: true,
            jit_update: false,
            confirmation: true,
        },
        MuxTxPart {
            pathway: 0,
            kind: PartKind::Dynamic,
            upper_pdu: 52,
            length: 4,
            segments: &LONG_SEGMENTS,
            selector: &SELECT_2,
            trigger: true,
            jit_update: true,
            confirmation: false,
        },
    ],
    ..IpduMConfig::EMPTY
};

#[test]
/// A non-trigger part only updates the buffer; the trigger part sends it
/// with the static part refreshed just in time.
fn test_trigger_sends_composed_buffer() {
    let mut arena = Arena::new(&CONFIG);
    let ipdum = setup(&CONFIG, &mut arena);
    let router = ipdum.router();

    ipdum
        .transmit(0, PduInfo::with_data(&[0x12, 0x00, 0x00, 0x00]))
        .unwrap();
    assert!(router.transmissions().is_empty());

    // no JIT data: the static part keeps 0x12
    ipdum
        .transmit(1, PduInfo::with_data(&[0x00, 0xA0, 0xBB, 0x00]))
        .unwrap();
    assert_eq!(router.trigger_requests(), vec![50]);
    assert_eq!(
        router.transmissions(),
        vec![(300, Some(vec![0x12, 0xA1, 0xBB, 0xFF]), 4)]
    );

    router.clear();
    router.set_data(50, &[0x34, 0x00, 0x00, 0x00]);
    ipdum
        .transmit(1, PduInfo::with_data(&[0x00, 0xC0, 0xDD, 0x00]))
        .unwrap();
    assert_eq!(
        router.transmissions(),
        vec![(300, Some(vec![0x34, 0xC1, 0xDD, 0xFF]), 4)]
    );
}

#[test]
/// Switching dynamic parts pads the bits the new part does not use and
/// stamps its selector.
fn test_dynamic_switch_pads_rest() {
    let mut arena = Arena::new(&CONFIG);
    let ipdum = setup(&CONFIG, &mut arena);
    let router = ipdum.router();

    ipdum
        .transmit(0, PduInfo::with_data(&[0x12, 0x00, 0x00, 0x00]))
        .unwrap();
    ipdum
        .transmit(1, PduInfo::with_data(&[0x00, 0xA0, 0xBB, 0x00]))
        .unwrap();
    router.clear();

    ipdum
        .transmit(2, PduInfo::with_data(&[0x00, 0x00, 0x11, 0x22]))
        .unwrap();
    assert_eq!(
        router.transmissions(),
        vec![(300, Some(vec![0x12, 0xF2, 0x11, 0x22]), 4)]
    );
}

#[test]
/// Trigger transmit refreshes the static part and the active dynamic part.
fn test_trigger_transmit_refreshes_parts() {
    let mut arena = Arena::new(&CONFIG);
    let ipdum = setup(&CONFIG, &mut arena);
    let router = ipdum.router();

    ipdum
        .transmit(2, PduInfo::with_data(&[0x00, 0x00, 0x11, 0x22]))
        .unwrap();
    router.clear();
    router.set_data(50, &[0x56, 0x00, 0x00, 0x00]);
    router.set_data(52, &[0x00, 0x00, 0x33, 0x44]);

    let mut out = [0u8; 8];
    assert_eq!(ipdum.trigger_transmit(0, &mut out), Ok(4));
    assert_eq!(out[..4], [0x56, 0xF2, 0x33, 0x44]);
    assert_eq!(router.trigger_requests(), vec![50, 52]);

    let mut short = [0u8; 3];
    assert_eq!(ipdum.trigger_transmit(0, &mut short), Err(PduError::NotOk));
}

#[test]
/// Positive confirmations reach the static part and the active dynamic part
/// when configured; negative ones are not forwarded.
fn test_confirmation_fan_out() {
    let mut arena = Arena::new(&CONFIG);
    let ipdum = setup(&CONFIG, &mut arena);
    let router = ipdum.router();

    ipdum
        .transmit(1, PduInfo::with_data(&[0x00, 0xA0, 0xBB, 0x00]))
        .unwrap();
    ipdum.tx_confirmation(0, TxResult::Ok);
    assert_eq!(
        router.confirmations(),
        vec![(50, TxResult::Ok), (51, TxResult::Ok)]
    );

    router.clear();
    ipdum
        .transmit(2, PduInfo::with_data(&[0x00, 0x00, 0x11, 0x22]))
        .unwrap();
    ipdum.tx_confirmation(0, TxResult::Ok);
    assert_eq!(router.confirmations(), vec![(50, TxResult::Ok)]);

    router.clear();
    ipdum.tx_confirmation(0, TxResult::NotOk);
    assert!(router.confirmations().is_empty());
}

#[test]
/// While a confirmation is outstanding a trigger part is written but not
/// sent.
fn test_blocked_until_confirmed() {
    const SUPERVISED: IpduMConfig<'static> = IpduMConfig {
        tx_lo: &[TxLoInfo {
            lower_pdu: 300,
            confirmation_timeout: 3,
            target: TxLoTarget::Pathway(0),
            partition: 0,
        }],
        ..CONFIG
    };
    let mut arena = Arena::new(&SUPERVISED);
    let ipdum = setup(&SUPERVISED, &mut arena);
    let router = ipdum.router();

    ipdum
        .transmit(1, PduInfo::with_data(&[0x00, 0xA0, 0xBB, 0x00]))
        .unwrap();
    assert_eq!(ipdum.confirmation_timeout(0), Some(3));

    assert_eq!(
        ipdum.transmit(1, PduInfo::with_data(&[0x00, 0xC0, 0xDD, 0x00])),
        Err(PduError::NotOk)
    );
    assert_eq!(router.transmissions().len(), 1);

    ipdum.tx_confirmation(0, TxResult::Ok);
    assert_eq!(ipdum.confirmation_timeout(0), Some(0));

    // the blocked write is in the buffer
    router.clear();
    ipdum
        .transmit(0, PduInfo::with_data(&[0x12, 0x00, 0x00, 0x00]))
        .unwrap();
    let mut out = [0u8; 4];
    assert_eq!(ipdum.trigger_transmit(0, &mut out), Ok(4));
    assert_eq!(out[1..], [0xC1, 0xDD, 0xFF]);

    // an elapsed timeout frees the pathway without any confirmation
    ipdum
        .transmit(1, PduInfo::with_data(&[0x00, 0xA0, 0xBB, 0x00]))
        .unwrap();
    for _ in 0..3 {
        ipdum.main_function(0);
    }
    assert_eq!(ipdum.confirmation_timeout(0), Some(0));
    assert!(router.confirmations().is_empty());
}

#[test]
/// A part must be transmitted with exactly its configured length.
fn test_length_mismatch_rejected() {
    let mut arena = Arena::new(&CONFIG);
    let ipdum = setup(&CONFIG, &mut arena);

    assert_eq!(
        ipdum.transmit(1, PduInfo::with_data(&[0x00, 0xA0])),
        Err(PduError::Development(DevError::Param))
    );
    assert_eq!(
        ipdum.transmit(1, PduInfo::announce(4)),
        Err(PduError::Development(DevError::ParamPointer))
    );
    assert!(ipdum.router().transmissions().is_empty());
}
