//! Queued Tx containers: dynamic and static layouts, FIFO closing, eviction,
//! send timeouts, meta data and facade checks.
mod helpers {
    include!("../../helpers/mod.rs");
}

use helpers::{setup, Arena};
use korri_ipdum::{
    core::{
        Collection, ContainedTxPdu, ContainerTxPdu, DataProvision, HeaderSize, IpduMConfig,
        PduInfo, TxLoInfo, TxLoTarget, TxResult, TxUpTarget,
    },
    error::{DevError, PduError, RuntimeError},
};

const fn contained(header_id: u32, length: u16, upper_pdu: u16) -> ContainedTxPdu {
    ContainedTxPdu {
        container: 0,
        header_id,
        length,
        upper_pdu,
        offset: 0,
        update_bit: None,
        send_timeout: 0,
        trigger: false,
        confirmation: true,
        priority: 0,
    }
}

const DYNAMIC: ContainerTxPdu<'static> = ContainerTxPdu {
    tx_lo: 0,
    length: 8,
    header: HeaderSize::Short,
    meta_data_size: 0,
    size_threshold: None,
    send_timeout: 0,
    first_contained_trigger: false,
    provision: DataProvision::Direct,
    collection: Collection::Queued { depth: 1 },
    contained: 0..2,
    partition: 0,
    unused_byte: 0,
};

const TX_LO: &[TxLoInfo] = &[TxLoInfo {
    lower_pdu: 100,
    confirmation_timeout: 0,
    target: TxLoTarget::Container(0),
    partition: 0,
}];

const DIRECT: IpduMConfig<'static> = IpduMConfig {
    tx_up: &[TxUpTarget::Contained(0), TxUpTarget::Contained(1)],
    tx_lo: TX_LO,
    container_tx: &[DYNAMIC],
    contained_tx: &[contained(1, 3, 10), contained(2, 3, 11)],
    ..IpduMConfig::EMPTY
};

const TRIGGERED: IpduMConfig<'static> = IpduMConfig {
    container_tx: &[ContainerTxPdu {
        provision: DataProvision::TriggerTransmit,
        ..DYNAMIC
    }],
    ..DIRECT
};

#[test]
/// A PDU that does not fit closes the current instance first; the closed
/// instance waits in the FIFO until the lower layer pulls it.
fn test_dynamic_overflow_queues_instance() {
    let mut arena = Arena::new(&TRIGGERED);
    let ipdum = setup(&TRIGGERED, &mut arena);

    assert_eq!(ipdum.transmit(0, PduInfo::with_data(&[1, 2, 3])), Ok(()));
    assert_eq!(ipdum.tx_queue_len(0), Some(0));
    assert!(ipdum.router().transmissions().is_empty());

    // 4 + 3 + 4 + 3 = 14 > 8
    assert_eq!(ipdum.transmit(1, PduInfo::with_data(&[4, 5, 6])), Ok(()));
    assert_eq!(ipdum.tx_queue_len(0), Some(1));
    assert_eq!(ipdum.router().transmissions(), vec![(100, None, 7)]);

    let mut out = [0u8; 8];
    assert_eq!(ipdum.trigger_transmit(0, &mut out), Ok(7));
    assert_eq!(&out[..7], &[0x00, 0x00, 0x01, 0x03, 1, 2, 3]);
    assert_eq!(ipdum.tx_queue_len(0), Some(0));

    // Nothing closed: the current instance is queued on demand.
    assert_eq!(ipdum.trigger_transmit(0, &mut out), Ok(7));
    assert_eq!(&out[..7], &[0x00, 0x00, 0x02, 0x03, 4, 5, 6]);
    assert_eq!(ipdum.trigger_transmit(0, &mut out), Err(PduError::NotOk));
}

#[test]
/// Informative transmissions repeat every main function while the FIFO holds
/// an instance.
fn test_trigger_transmit_announces_per_tick() {
    let mut arena = Arena::new(&TRIGGERED);
    let ipdum = setup(&TRIGGERED, &mut arena);

    ipdum.transmit(0, PduInfo::with_data(&[1, 2, 3])).unwrap();
    ipdum.transmit(1, PduInfo::with_data(&[4, 5, 6])).unwrap();
    ipdum.router().clear();

    ipdum.main_function(0);
    assert_eq!(ipdum.router().transmissions(), vec![(100, None, 7)]);

    let mut out = [0u8; 8];
    ipdum.trigger_transmit(0, &mut out).unwrap();
    ipdum.router().clear();
    ipdum.main_function(0);
    assert!(ipdum.router().transmissions().is_empty());
}

#[test]
/// Direct provision sends the closed instance right away and confirms the
/// PDUs it carried.
fn test_direct_drain_and_confirmation() {
    let mut arena = Arena::new(&DIRECT);
    let ipdum = setup(&DIRECT, &mut arena);

    ipdum.transmit(0, PduInfo::with_data(&[1, 2, 3])).unwrap();
    ipdum.transmit(1, PduInfo::with_data(&[4, 5, 6])).unwrap();

    assert_eq!(
        ipdum.router().transmissions(),
        vec![(100, Some(vec![0x00, 0x00, 0x01, 0x03, 1, 2, 3]), 7)]
    );
    assert_eq!(ipdum.tx_queue_len(0), Some(0));

    ipdum.tx_confirmation(0, TxResult::Ok);
    assert_eq!(ipdum.router().confirmations(), vec![(10, TxResult::Ok)]);

    // The ring was drained.
    ipdum.tx_confirmation(0, TxResult::Ok);
    assert_eq!(ipdum.router().confirmations().len(), 1);
}

#[test]
/// Closing into a full FIFO evicts the oldest instance.
fn test_fifo_overflow_evicts_oldest() {
    let mut arena = Arena::new(&DIRECT);
    let ipdum = setup(&DIRECT, &mut arena);
    ipdum.router().set_reject(true);

    ipdum.transmit(0, PduInfo::with_data(&[1, 2, 3])).unwrap();
    ipdum.transmit(1, PduInfo::with_data(&[4, 5, 6])).unwrap();
    assert_eq!(ipdum.tx_queue_len(0), Some(1));

    // closes [B] while [A] still waits
    ipdum.transmit(0, PduInfo::with_data(&[7, 8, 9])).unwrap();
    assert_eq!(ipdum.tx_queue_len(0), Some(1));
    assert_eq!(
        ipdum.diagnostics().runtime_errors(),
        vec![RuntimeError::QueueOverflow]
    );

    ipdum.router().set_reject(false);
    ipdum.router().clear();
    ipdum.main_function(0);
    assert_eq!(
        ipdum.router().transmissions(),
        vec![(100, Some(vec![0x00, 0x00, 0x02, 0x03, 4, 5, 6]), 7)]
    );
    assert_eq!(ipdum.tx_queue_len(0), Some(0));
}

#[test]
/// An expired send timeout closes a partially filled instance.
fn test_send_timeout_closes_partial_instance() {
    const CONFIG: IpduMConfig<'static> = IpduMConfig {
        container_tx: &[ContainerTxPdu {
            send_timeout: 3,
            ..DYNAMIC
        }],
        ..DIRECT
    };
    let mut arena = Arena::new(&CONFIG);
    let ipdum = setup(&CONFIG, &mut arena);

    ipdum.transmit(0, PduInfo::with_data(&[1, 2, 3])).unwrap();
    assert_eq!(ipdum.send_timeout(0), Some(3));

    ipdum.main_function(0);
    ipdum.main_function(0);
    assert!(ipdum.router().transmissions().is_empty());
    assert_eq!(ipdum.send_timeout(0), Some(1));

    ipdum.main_function(0);
    assert_eq!(
        ipdum.router().transmissions(),
        vec![(100, Some(vec![0x00, 0x00, 0x01, 0x03, 1, 2, 3]), 7)]
    );
    assert_eq!(ipdum.send_timeout(0), Some(0));
}

#[test]
/// A contained timeout shorter than the running one takes over.
fn test_contained_send_timeout_shortens() {
    const CONFIG: IpduMConfig<'static> = IpduMConfig {
        container_tx: &[ContainerTxPdu {
            length: 16,
            send_timeout: 10,
            ..DYNAMIC
        }],
        contained_tx: &[
            contained(1, 3, 10),
            ContainedTxPdu {
                send_timeout: 2,
                ..contained(2, 3, 11)
            },
        ],
        ..DIRECT
    };
    let mut arena = Arena::new(&CONFIG);
    let ipdum = setup(&CONFIG, &mut arena);

    ipdum.transmit(0, PduInfo::with_data(&[1, 2, 3])).unwrap();
    assert_eq!(ipdum.send_timeout(0), Some(10));
    ipdum.transmit(1, PduInfo::with_data(&[4, 5, 6])).unwrap();
    assert_eq!(ipdum.send_timeout(0), Some(2));

    ipdum.main_function(0);
    assert!(ipdum.router().transmissions().is_empty());
    ipdum.main_function(0);
    assert_eq!(
        ipdum.router().transmissions(),
        vec![(
            100,
            Some(vec![0x00, 0x00, 0x01, 0x03, 1, 2, 3, 0x00, 0x00, 0x02, 0x03, 4, 5, 6]),
            14
        )]
    );
}

#[test]
/// Exceeding the size threshold sends at once.
fn test_size_threshold_triggers() {
    const CONFIG: IpduMConfig<'static> = IpduMConfig {
        container_tx: &[ContainerTxPdu {
            size_threshold: Some(6),
            ..DYNAMIC
        }],
        ..DIRECT
    };
    let mut arena = Arena::new(&CONFIG);
    let ipdum = setup(&CONFIG, &mut arena);

    ipdum.transmit(0, PduInfo::with_data(&[1, 2, 3])).unwrap();
    assert_eq!(ipdum.router().transmissions().len(), 1);
    assert_eq!(ipdum.tx_queue_len(0), Some(0));
}

#[test]
/// Static layout: data lands at its offset and sets its update bit.
fn test_static_layout_trigger_transmit() {
    const CONFIG: IpduMConfig<'static> = IpduMConfig {
        tx_up: &[TxUpTarget::Contained(0), TxUpTarget::Contained(1)],
        tx_lo: TX_LO,
        container_tx: &[ContainerTxPdu {
            length: 4,
            header: HeaderSize::None,
            provision: DataProvision::TriggerTransmit,
            ..DYNAMIC
        }],
        contained_tx: &[
            ContainedTxPdu {
                update_bit: Some(24),
                ..contained(0, 2, 10)
            },
            ContainedTxPdu {
                offset: 2,
                update_bit: Some(25),
                ..contained(0, 1, 11)
            },
        ],
        ..IpduMConfig::EMPTY
    };
    let mut arena = Arena::new(&CONFIG);
    let ipdum = setup(&CONFIG, &mut arena);

    assert_eq!(ipdum.transmit(0, PduInfo::with_data(&[0xAA, 0xBB])), Ok(()));
    assert!(ipdum.router().transmissions().is_empty());

    let mut out = [0u8; 4];
    assert_eq!(ipdum.trigger_transmit(0, &mut out), Ok(4));
    assert_eq!(out, [0xAA, 0xBB, 0x00, 0x01]);

    // Confirmation fans out to the PDU carried by that instance only.
    ipdum.tx_confirmation(0, TxResult::Ok);
    assert_eq!(ipdum.router().confirmations(), vec![(10, TxResult::Ok)]);
}

#[test]
/// Meta data travels behind the payload, directly after the last contained PDU.
fn test_meta_data_follows_payload() {
    const CONFIG: IpduMConfig<'static> = IpduMConfig {
        container_tx: &[ContainerTxPdu {
            meta_data_size: 2,
            ..DYNAMIC
        }],
        contained_tx: &[
            ContainedTxPdu {
                trigger: true,
                ..contained(1, 3, 10)
            },
            contained(2, 3, 11),
        ],
        ..DIRECT
    };
    let mut arena = Arena::new(&CONFIG);
    let ipdum = setup(&CONFIG, &mut arena);

    ipdum
        .transmit(0, PduInfo::with_data(&[1, 2, 3, 0xE1, 0xE2]))
        .unwrap();
    assert_eq!(
        ipdum.router().transmissions(),
        vec![(
            100,
            Some(vec![0x00, 0x00, 0x01, 0x03, 1, 2, 3, 0xE1, 0xE2]),
            9
        )]
    );
}

#[test]
/// Facade checks reject bad handles, missing data and wrong lengths.
fn test_transmit_development_errors() {
    const CONFIG: IpduMConfig<'static> = IpduMConfig {
        container_tx: &[ContainerTxPdu {
            length: 4,
            header: HeaderSize::None,
            contained: 0..1,
            ..DYNAMIC
        }],
        contained_tx: &[contained(0, 2, 10)],
        tx_up: &[TxUpTarget::Contained(0)],
        ..DIRECT
    };
    let mut arena = Arena::new(&CONFIG);
    let ipdum = setup(&CONFIG, &mut arena);

    assert_eq!(
        ipdum.transmit(5, PduInfo::with_data(&[1, 2])),
        Err(PduError::Development(DevError::Param))
    );
    assert_eq!(
        ipdum.transmit(0, PduInfo::announce(2)),
        Err(PduError::Development(DevError::ParamPointer))
    );
    assert_eq!(
        ipdum.transmit(0, PduInfo::with_data(&[1])),
        Err(PduError::Development(DevError::Param))
    );
    assert_eq!(
        ipdum.trigger_transmit(0, &mut []),
        Err(PduError::Development(DevError::ParamPointer))
    );
    assert_eq!(
        ipdum.diagnostics().development_errors(),
        vec![
            DevError::Param,
            DevError::ParamPointer,
            DevError::Param,
            DevError::ParamPointer
        ]
    );
}
