//! Last-is-best Tx containers: priority order, latest data, deduplication,
//! rollback on rejection and trigger-transmit provision.
mod helpers {
    include!("../../helpers/mod.rs");
}

use helpers::{setup, Arena};
use korri_ipdum::{
    core::{
        Collection, ContainedTxPdu, ContainerTxPdu, DataProvision, HeaderSize, IpduMConfig,
        PduInfo, TxLoInfo, TxLoTarget, TxResult, TxUpTarget,
    },
    error::{PduError, RuntimeError},
};

const fn contained(header_id: u32, upper_pdu: u16, priority: u8) -> ContainedTxPdu {
    ContainedTxPdu {
        container: 0,
        header_id,
        length: 4,
        upper_pdu,
        offset: 0,
        update_bit: None,
        send_timeout: 0,
        trigger: false,
        confirmation: true,
        priority,
    }
}

const CONTAINER: ContainerTxPdu<'static> = ContainerTxPdu {
    tx_lo: 0,
    length: 16,
    header: HeaderSize::Short,
    meta_data_size: 0,
    size_threshold: None,
    send_timeout: 0,
    first_contained_trigger: false,
    provision: DataProvision::Direct,
    collection: Collection::LastIsBest {
        queue_depths: &[2, 2],
    },
    contained: 0..5,
    partition: 0,
    unused_byte: 0,
};

/// Priority 0 is served first.
const CONFIG: IpduMConfig<'static> = IpduMConfig {
    tx_up: &[
        TxUpTarget::Contained(0),
        TxUpTarget::Contained(1),
        TxUpTarget::Contained(2),
        TxUpTarget::Contained(3),
        TxUpTarget::Contained(4),
    ],
    tx_lo: &[TxLoInfo {
        lower_pdu: 200,
        confirmation_timeout: 0,
        target: TxLoTarget::Container(0),
        partition: 0,
    }],
    container_tx: &[CONTAINER],
    contained_tx: &[
        contained(1, 20, 1),
        contained(2, 21, 0),
        ContainedTxPdu {
            trigger: true,
            ..contained(3, 22, 0)
        },
        contained(4, 23, 1),
        contained(5, 24, 1),
    ],
    ..IpduMConfig::EMPTY
};

const FULL_CONTAINER: [u8; 14] = [
    0x00, 0x00, 0x02, 0x04, 0x21, 0x21, 0x21, 0x21, // id 2
    0x00, 0x00, 0x03, 0x02, 0x22, 0x22, // id 3, shorter than announced
];

#[test]
/// Highest priority first; the entry that no longer fits stays pending.
fn test_priority_fill_and_latest_data() {
    let mut arena = Arena::new(&CONFIG);
    let ipdum = setup(&CONFIG, &mut arena);
    let router = ipdum.router();
    router.set_data(20, &[0x20; 4]);
    router.set_data(21, &[0x21; 4]);
    router.set_data(22, &[0x22; 2]);

    ipdum.transmit(0, PduInfo::announce(4)).unwrap();
    ipdum.transmit(1, PduInfo::announce(4)).unwrap();
    assert!(router.transmissions().is_empty());

    // trigger PDU
    ipdum.transmit(2, PduInfo::announce(4)).unwrap();
    assert_eq!(router.trigger_requests(), vec![21, 22]);
    assert_eq!(
        router.transmissions(),
        vec![(200, Some(FULL_CONTAINER.to_vec()), 14)]
    );

    ipdum.tx_confirmation(0, TxResult::Ok);
    assert_eq!(
        router.confirmations(),
        vec![(21, TxResult::Ok), (22, TxResult::Ok)]
    );

    // id 1 is still pending and leaves with the next trigger
    router.clear();
    ipdum.transmit(2, PduInfo::announce(4)).unwrap();
    assert_eq!(router.trigger_requests(), vec![22, 20]);
    assert_eq!(
        router.transmissions(),
        vec![(
            200,
            Some(vec![
                0x00, 0x00, 0x03, 0x02, 0x22, 0x22, 0x00, 0x00, 0x01, 0x04, 0x20, 0x20, 0x20,
                0x20
            ]),
            14
        )]
    );
}

#[test]
/// A PDU requested twice is fetched once.
fn test_duplicate_request_not_requeued() {
    let mut arena = Arena::new(&CONFIG);
    let ipdum = setup(&CONFIG, &mut arena);
    let router = ipdum.router();
    router.set_data(20, &[0x20; 4]);
    router.set_data(22, &[0x22; 4]);

    ipdum.transmit(0, PduInfo::announce(4)).unwrap();
    ipdum.transmit(0, PduInfo::announce(4)).unwrap();
    ipdum.transmit(2, PduInfo::announce(4)).unwrap();

    assert_eq!(router.trigger_requests(), vec![22, 20]);
    assert!(ipdum.diagnostics().runtime_errors().is_empty());
}

#[test]
/// A full request queue rejects the request and reports an overflow.
fn test_request_queue_overflow() {
    let mut arena = Arena::new(&CONFIG);
    let ipdum = setup(&CONFIG, &mut arena);

    assert_eq!(ipdum.transmit(0, PduInfo::announce(4)), Ok(()));
    assert_eq!(ipdum.transmit(3, PduInfo::announce(4)), Ok(()));
    assert_eq!(ipdum.transmit(4, PduInfo::announce(4)), Err(PduError::NotOk));
    assert_eq!(
        ipdum.diagnostics().runtime_errors(),
        vec![RuntimeError::QueueOverflow]
    );
}

#[test]
/// A rejected transmission restores every consumed request; the retry on
/// the next main function sends the same content.
fn test_rejected_transmission_rolls_back() {
    let mut arena = Arena::new(&CONFIG);
    let ipdum = setup(&CONFIG, &mut arena);
    let router = ipdum.router();
    router.set_data(20, &[0x20; 4]);
    router.set_data(21, &[0x21; 4]);
    router.set_data(22, &[0x22; 2]);
    router.set_reject(true);

    ipdum.transmit(0, PduInfo::announce(4)).unwrap();
    ipdum.transmit(1, PduInfo::announce(4)).unwrap();
    ipdum.transmit(2, PduInfo::announce(4)).unwrap();
    assert_eq!(router.transmissions().len(), 1);

    ipdum.tx_confirmation(0, TxResult::Ok);
    assert!(router.confirmations().is_empty());

    router.set_reject(false);
    router.clear();
    ipdum.main_function(0);
    assert_eq!(router.trigger_requests(), vec![21, 22]);
    assert_eq!(
        router.transmissions(),
        vec![(200, Some(FULL_CONTAINER.to_vec()), 14)]
    );

    // Nothing requested anymore.
    router.clear();
    ipdum.main_function(0);
    assert!(router.transmissions().is_empty());
}

#[test]
/// A PDU without data is dropped from the container.
fn test_no_data_drops_request() {
    let mut arena = Arena::new(&CONFIG);
    let ipdum = setup(&CONFIG, &mut arena);
    let router = ipdum.router();
    router.set_data(20, &[0x20; 4]);
    router.set_data(22, &[0x22; 2]);

    ipdum.transmit(0, PduInfo::announce(4)).unwrap();
    ipdum.transmit(1, PduInfo::announce(4)).unwrap();
    ipdum.transmit(2, PduInfo::announce(4)).unwrap();

    assert_eq!(router.trigger_requests(), vec![21, 22, 20]);
    assert_eq!(
        router.transmissions(),
        vec![(
            200,
            Some(vec![
                0x00, 0x00, 0x03, 0x02, 0x22, 0x22, 0x00, 0x00, 0x01, 0x04, 0x20, 0x20, 0x20,
                0x20
            ]),
            14
        )]
    );
}

#[test]
/// With trigger-transmit provision the pending length is announced and the
/// container is built into the lower layer's buffer.
fn test_trigger_transmit_provision() {
    const TRIGGERED: IpduMConfig<'static> = IpduMConfig {
        container_tx: &[ContainerTxPdu {
            provision: DataProvision::TriggerTransmit,
            meta_data_size: 1,
            ..CONTAINER
        }],
        ..CONFIG
    };
    let mut arena = Arena::new(&TRIGGERED);
    let ipdum = setup(&TRIGGERED, &mut arena);
    let router = ipdum.router();
    router.set_data(21, &[0x21; 4]);
    router.set_data(22, &[0x22; 4]);

    ipdum.transmit(1, PduInfo::announce(4)).unwrap();
    ipdum.transmit(2, PduInfo::announce(4)).unwrap();
    assert_eq!(router.transmissions(), vec![(200, None, 17)]);
    assert!(router.trigger_requests().is_empty());

    let mut out = [0xFFu8; 17];
    assert_eq!(ipdum.trigger_transmit(0, &mut out), Ok(17));
    assert_eq!(
        out,
        [
            0x00, 0x00, 0x02, 0x04, 0x21, 0x21, 0x21, 0x21, 0x00, 0x00, 0x03, 0x04, 0x22, 0x22,
            0x22, 0x22, 0x00
        ]
    );

    // Nothing pending anymore.
    assert_eq!(ipdum.trigger_transmit(0, &mut out), Err(PduError::NotOk));
}

#[test]
/// Static layout places the fetched data at its offset with its update bit.
fn test_static_layout() {
    const STATIC: IpduMConfig<'static> = IpduMConfig {
        tx_up: &[TxUpTarget::Contained(0), TxUpTarget::Contained(1)],
        container_tx: &[ContainerTxPdu {
            length: 4,
            header: HeaderSize::None,
            unused_byte: 0xFF,
            collection: Collection::LastIsBest { queue_depths: &[2] },
            contained: 0..2,
            ..CONTAINER
        }],
        contained_tx: &[
            ContainedTxPdu {
                length: 2,
                update_bit: Some(31),
                ..contained(0, 20, 0)
            },
            ContainedTxPdu {
                length: 1,
                offset: 2,
                trigger: true,
                ..contained(0, 21, 0)
            },
        ],
        ..CONFIG
    };
    let mut arena = Arena::new(&STATIC);
    let ipdum = setup(&STATIC, &mut arena);
    let router = ipdum.router();
    router.set_data(21, &[0x5A]);

    ipdum.transmit(1, PduInfo::announce(1)).unwrap();
    assert_eq!(
        router.transmissions(),
        vec![(200, Some(vec![0xFF, 0xFF, 0x5A, 0x7F]), 4)]
    );
}

/// Trigger-transmit provision without meta data.
const PULLED: IpduMConfig<'static> = IpduMConfig {
    container_tx: &[ContainerTxPdu {
        provision: DataProvision::TriggerTransmit,
        send_timeout: 3,
        ..CONTAINER
    }],
    ..CONFIG
};

#[test]
/// A buffer of the announced length is enough to pull the container.
fn test_trigger_transmit_into_announced_length() {
    let mut arena = Arena::new(&PULLED);
    let ipdum = setup(&PULLED, &mut arena);
    let router = ipdum.router();
    router.set_data(22, &[0x22; 4]);

    ipdum.transmit(2, PduInfo::announce(4)).unwrap();
    assert_eq!(router.transmissions(), vec![(200, None, 8)]);

    let mut out = [0u8; 8];
    assert_eq!(ipdum.trigger_transmit(0, &mut out), Ok(8));
    assert_eq!(out, [0x00, 0x00, 0x03, 0x04, 0x22, 0x22, 0x22, 0x22]);

    ipdum.tx_confirmation(0, TxResult::Ok);
    assert_eq!(router.confirmations(), vec![(22, TxResult::Ok)]);
}

#[test]
/// A buffer too short for the first pending PDU yields nothing and keeps
/// the request.
fn test_trigger_transmit_short_buffer_keeps_request() {
    let mut arena = Arena::new(&PULLED);
    let ipdum = setup(&PULLED, &mut arena);
    let router = ipdum.router();
    router.set_data(22, &[0x22; 4]);

    ipdum.transmit(2, PduInfo::announce(4)).unwrap();
    let mut short = [0u8; 6];
    assert_eq!(ipdum.trigger_transmit(0, &mut short), Err(PduError::NotOk));
    assert!(router.trigger_requests().is_empty());

    let mut out = [0u8; 8];
    assert_eq!(ipdum.trigger_transmit(0, &mut out), Ok(8));
}

#[test]
/// A triggered announcement stops the running send timeout, so the
/// container is announced once.
fn test_triggered_announce_stops_send_timeout() {
    let mut arena = Arena::new(&PULLED);
    let ipdum = setup(&PULLED, &mut arena);
    let router = ipdum.router();

    ipdum.transmit(1, PduInfo::announce(4)).unwrap();
    assert_eq!(ipdum.send_timeout(0), Some(3));
    assert!(router.transmissions().is_empty());

    ipdum.transmit(2, PduInfo::announce(4)).unwrap();
    assert_eq!(router.transmissions(), vec![(200, None, 16)]);
    assert_eq!(ipdum.send_timeout(0), Some(0));

    for _ in 0..4 {
        ipdum.main_function(0);
    }
    assert_eq!(router.transmissions().len(), 1);
}
