
use fixtures::*;

use crate::config::DeviceConfig;
use crate::fsk::{self, FcsType, FskPhyHeader};
use crate::interface::{BusConfig, BusProtocol, SpiInterface};
use crate::mod_params::*;
use crate::radio::Radio;

type TestRadio<'a> = Radio<'a, FakeChip, RecordingListener, FakeClock>;

async fn ready_radio<'a>(chip: FakeChip, config: &'a DeviceConfig<'a>) -> TestRadio<'a> {
    let mut radio = Radio::new(chip, RecordingListener::default(), FakeClock::default(), config);
    radio.init().await.unwrap();
    radio.chip.take_calls();
    radio
}

async fn raise(radio: &mut TestRadio<'_>, irq: IrqFlags) -> Vec<Call> {
    radio.chip.irq_status.push_back(irq);
    radio.process_irq().await.unwrap();
    radio.chip.take_calls()
}

#[tokio::test]
async fn test_init_sequence() {
    let config = device_config();
    let mut radio = Radio::new(FakeChip::new(), RecordingListener::default(), FakeClock::default(), &config);
    assert_eq!(radio.state(), RadioState::Unknown);
    radio.init().await.unwrap();

    let pa = pa_lookup(14).unwrap();
    assert_eq!(
        radio.chip.take_calls(),
        vec![
            Call::RfSwitch(RfPath::Off),
            Call::Reset,
            Call::Wakeup,
            Call::ClearIrq(IrqFlags::all()),
            Call::RfSwitch(RfPath::Off),
            Call::Standby(false),
            Call::Init,
            Call::PacketType(ModemMode::LoRa),
            Call::PaConfig(pa),
            Call::TxParams(14, 0x04),
            Call::IrqMask(IrqFlags::LORA_DEFAULT),
        ]
    );
    assert_eq!(radio.state(), RadioState::Standby);
    assert_eq!(radio.modem_mode(), ModemMode::LoRa);
    assert_eq!(radio.pa_config(), &pa);
    assert_eq!(radio.max_tx_power(DataRate::Kbps50), Ok(14));
    assert_eq!(radio.cca_level_adjust(DataRate::Kbps22), Ok(-3));
}

#[tokio::test]
async fn test_sleep_twice_touches_bus_once() {
    let config = device_config();
    let mut radio = ready_radio(FakeChip::new(), &config).await;
    radio.clock.now_us = 5_000;

    radio.sleep(1_000).await.unwrap();
    assert_eq!(
        radio.chip.take_calls(),
        vec![
            Call::ClearIrq(IrqFlags::all()),
            Call::RfSwitch(RfPath::Off),
            Call::IrqMask(IrqFlags::empty()),
            Call::Sleep(true),
        ]
    );
    assert_eq!(radio.listener.sleeps, vec![6_000]);
    assert_eq!(radio.state(), RadioState::Sleep);

    radio.sleep(1_000).await.unwrap();
    assert!(radio.chip.take_calls().is_empty());
    assert_eq!(radio.listener.sleeps.len(), 1);
}

#[tokio::test]
async fn test_standby_wakes_from_sleep() {
    let config = device_config();
    let mut radio = ready_radio(FakeChip::new(), &config).await;
    radio.sleep(0).await.unwrap();
    radio.chip.take_calls();
    assert!(radio.listener.sleeps.is_empty());

    radio.standby().await.unwrap();
    assert_eq!(
        radio.chip.take_calls(),
        vec![
            Call::Wakeup,
            Call::IrqMask(IrqFlags::LORA_DEFAULT),
            Call::ClearIrq(IrqFlags::all()),
            Call::RfSwitch(RfPath::Off),
            Call::Standby(false),
        ]
    );
    assert_eq!(radio.state(), RadioState::Standby);
}

#[tokio::test]
async fn test_failed_sleep_rearms_interrupts() {
    let config = device_config();
    let mut radio = ready_radio(FakeChip::new(), &config).await;
    radio.chip.fail_sleep = true;

    assert_eq!(radio.sleep(0).await, Err(RadioError::HardwareError));
    assert_eq!(radio.state(), RadioState::Standby);
    assert_eq!(radio.chip.calls.last(), Some(&Call::IrqMask(IrqFlags::LORA_DEFAULT)));
}

#[tokio::test]
async fn test_wrong_state_is_rejected_without_bus_traffic() {
    let config = device_config();
    let mut radio = ready_radio(FakeChip::new(), &config).await;
    radio.set_busy().unwrap();
    assert_eq!(radio.state(), RadioState::Busy);

    assert_eq!(radio.set_frequency(868_100_000).await, Err(RadioError::InvalidState));
    assert_eq!(radio.start_tx(0).await, Err(RadioError::InvalidState));
    assert_eq!(radio.start_rx(1_000).await, Err(RadioError::InvalidState));
    assert_eq!(radio.set_tx_power(10).await, Err(RadioError::InvalidState));
    assert_eq!(radio.set_busy(), Err(RadioError::InvalidState));
    assert!(radio.chip.calls.is_empty());
    assert_eq!(radio.state(), RadioState::Busy);
}

async fn enter_state(radio: &mut TestRadio<'_>, state: RadioState) {
    match state {
        RadioState::Sleep => radio.sleep(0).await.unwrap(),
        RadioState::Rx => radio.start_rx(1_000).await.unwrap(),
        RadioState::Tx => radio.start_tx(0).await.unwrap(),
        RadioState::Cad => radio.lora_start_cad().await.unwrap(),
        _ => {}
    }
    assert_eq!(radio.state(), state);
}

#[tokio::test]
async fn test_standby_only_operations_outside_standby() {
    let config = device_config();
    for state in [
        RadioState::Unknown,
        RadioState::Sleep,
        RadioState::Rx,
        RadioState::Tx,
        RadioState::Cad,
    ] {
        let mut radio = if state == RadioState::Unknown {
            Radio::new(FakeChip::with_scan(), RecordingListener::default(), FakeClock::default(), &config)
        } else {
            ready_radio(FakeChip::with_scan(), &config).await
        };
        enter_state(&mut radio, state).await;
        radio.chip.take_calls();

        assert_eq!(radio.set_frequency(868_100_000).await, Err(RadioError::InvalidState));
        assert_eq!(radio.set_tx_power(10).await, Err(RadioError::InvalidState));
        assert_eq!(radio.set_busy(), Err(RadioError::InvalidState));
        assert_eq!(radio.hold_scan().await, Err(RadioError::InvalidState));
        assert!(radio.chip.calls.is_empty(), "bus traffic in {:?}", state);
        assert_eq!(radio.state(), state);
    }
}

#[tokio::test]
async fn test_continuous_wave_from_each_state() {
    let config = device_config();
    for state in [RadioState::Standby, RadioState::Rx, RadioState::Tx, RadioState::Cad] {
        let mut radio = ready_radio(FakeChip::new(), &config).await;
        enter_state(&mut radio, state).await;
        radio.chip.take_calls();

        radio.set_tx_continuous_wave(868_100_000, 14).await.unwrap();
        let calls = radio.chip.take_calls();
        assert_eq!(calls.contains(&Call::Standby(false)), state != RadioState::Standby);
        assert!(calls.contains(&Call::Frequency(868_100_000)));
        assert_eq!(calls.last(), Some(&Call::TxCw));
        assert_eq!(radio.state(), RadioState::Tx);
    }

    for state in [RadioState::Unknown, RadioState::Sleep] {
        let mut radio = if state == RadioState::Unknown {
            Radio::new(FakeChip::new(), RecordingListener::default(), FakeClock::default(), &config)
        } else {
            ready_radio(FakeChip::new(), &config).await
        };
        enter_state(&mut radio, state).await;
        radio.chip.take_calls();

        assert_eq!(
            radio.set_tx_continuous_wave(868_100_000, 14).await,
            Err(RadioError::InvalidState)
        );
        assert!(radio.chip.calls.is_empty());
        assert_eq!(radio.state(), state);
    }
}

#[tokio::test]
async fn test_tx_done_is_delivered_once() {
    let config = device_config();
    let mut radio = ready_radio(FakeChip::new(), &config).await;

    radio.set_region(Region::Na).unwrap();
    assert_eq!(radio.max_tx_power(DataRate::Kbps50), Ok(20));
    assert_eq!(radio.antenna_gain(), 2);

    radio.set_frequency(915_000_000).await.unwrap();
    assert_eq!(
        radio.chip.take_calls(),
        vec![
            Call::CalibrateImage(915_000_000),
            Call::BandEdge(915_000_000),
            Call::Frequency(915_000_000),
        ]
    );

    radio.start_tx(0).await.unwrap();
    assert_eq!(
        radio.chip.take_calls(),
        vec![Call::RfSwitch(RfPath::Tx), Call::ClearIrq(IrqFlags::all()), Call::Tx(0)]
    );
    assert_eq!(radio.state(), RadioState::Tx);

    let calls = raise(&mut radio, IrqFlags::TX_DONE).await;
    assert_eq!(
        calls,
        vec![
            Call::IrqMask(IrqFlags::empty()),
            Call::GetIrq,
            Call::IrqMask(IrqFlags::LORA_DEFAULT),
        ]
    );
    assert_eq!(radio.listener.events, vec![RadioEvent::TxDone]);
}

#[tokio::test]
async fn test_unknown_region_is_not_supported() {
    let config = device_config();
    let mut radio = ready_radio(FakeChip::new(), &config).await;
    assert_eq!(radio.set_region(Region::Jp), Err(RadioError::NotSupported));
    assert_eq!(radio.max_tx_power(DataRate::Kbps50), Ok(14));
}

#[tokio::test]
async fn test_retune_within_band_skips_calibration() {
    let config = device_config();
    let mut radio = ready_radio(FakeChip::new(), &config).await;

    radio.set_frequency(915_000_000).await.unwrap();
    radio.chip.take_calls();
    radio.set_frequency(920_000_000).await.unwrap();
    assert!(!radio
        .chip
        .take_calls()
        .iter()
        .any(|call| matches!(call, Call::CalibrateImage(_))));

    radio.set_frequency(868_100_000).await.unwrap();
    assert_eq!(radio.chip.take_calls()[0], Call::CalibrateImage(868_100_000));

    assert_eq!(radio.set_frequency(400_000_000).await, Err(RadioError::InvalidParams));
    assert!(radio.chip.calls.is_empty());
}

#[tokio::test]
async fn test_fsk_skips_band_edge_fix() {
    let config = device_config();
    let mut radio = ready_radio(FakeChip::new(), &config).await;
    radio.set_modem_mode(ModemMode::Fsk).await.unwrap();
    radio.chip.take_calls();

    radio.set_frequency(915_000_000).await.unwrap();
    assert!(!radio
        .chip
        .take_calls()
        .iter()
        .any(|call| matches!(call, Call::BandEdge(_))));
}

#[tokio::test]
async fn test_timeouts_are_converted_to_ticks() {
    let config = device_config();
    let mut radio = ready_radio(FakeChip::new(), &config).await;

    radio.start_tx(1_000).await.unwrap();
    assert_eq!(radio.chip.take_calls().last(), Some(&Call::Tx(64)));

    radio.start_rx(10).await.unwrap();
    assert_eq!(radio.chip.take_calls().last(), Some(&Call::Rx(1)));

    radio.start_continuous_rx().await.unwrap();
    assert_eq!(radio.chip.take_calls().last(), Some(&Call::Rx(0x00FF_FFFF)));

    radio.start_rx_duty_cycle(1_000, 2_000).await.unwrap();
    assert_eq!(radio.chip.take_calls().last(), Some(&Call::RxDutyCycle(64, 128)));
    assert_eq!(radio.state(), RadioState::RxDutyCycle);

    assert_eq!(radio.start_rx_duty_cycle(0, 2_000).await, Err(RadioError::InvalidParams));
}

#[tokio::test]
async fn test_timeout_events_follow_state() {
    let config = device_config();
    let mut radio = ready_radio(FakeChip::new(), &config).await;

    radio.start_tx(1_000).await.unwrap();
    raise(&mut radio, IrqFlags::TIMEOUT).await;
    radio.start_rx(1_000).await.unwrap();
    raise(&mut radio, IrqFlags::TIMEOUT).await;
    raise(&mut radio, IrqFlags::HEADER_ERROR).await;
    raise(&mut radio, IrqFlags::CRC_ERROR | IrqFlags::RX_DONE).await;
    raise(&mut radio, IrqFlags::empty()).await;

    assert_eq!(
        radio.listener.events,
        vec![
            RadioEvent::TxTimeout,
            RadioEvent::RxTimeout,
            RadioEvent::RxTimeout,
            RadioEvent::RxError,
        ]
    );
}

#[tokio::test]
async fn test_chip_errors_are_read_and_cleared() {
    let config = device_config();
    let mut radio = ready_radio(FakeChip::new(), &config).await;
    radio.chip.errors = 0x0040;

    let calls = raise(&mut radio, IrqFlags::ERROR | IrqFlags::TX_DONE).await;
    assert!(calls.contains(&Call::GetErrors));
    assert_eq!(radio.chip.errors, 0);
    assert_eq!(radio.listener.events, vec![RadioEvent::TxDone]);
}

#[tokio::test]
async fn test_lora_rx_done_corrects_rssi() {
    let config = device_config();
    let mut radio = ready_radio(FakeChip::new(), &config).await;
    radio.chip.buffer = vec![0x11, 0x22, 0x33, 0x44];
    radio.chip.rx_buffer_status = RxBufferStatus {
        payload_len: 4,
        start_offset: 0,
    };
    radio.chip.lora_status = LoraPacketStatus {
        rssi_pkt: -80,
        snr_pkt: -3,
        signal_rssi_pkt: -90,
    };
    radio.chip.crc_in_header = true;
    radio.clock.now_us = 42_000;

    radio.start_rx(100_000).await.unwrap();
    raise(&mut radio, IrqFlags::RX_DONE).await;

    let packet = radio.rx_packet();
    assert_eq!(packet.payload(), &[0x11, 0x22, 0x33, 0x44]);
    assert_eq!(
        packet.lora_status,
        LoraRxPacketStatus {
            rssi: -85,
            snr: -3,
            signal_rssi: -92,
            crc_present: true,
        }
    );
    assert_eq!(packet.fsk_status, FskRxPacketStatus::default());
    assert_eq!(packet.received_at_us, 42_000);

    radio.chip.lora_status.snr_pkt = 6;
    raise(&mut radio, IrqFlags::RX_DONE).await;
    assert_eq!(radio.rx_packet().lora_status.rssi, -82);
    assert_eq!(radio.listener.events, vec![RadioEvent::RxDone, RadioEvent::RxDone]);
}

#[tokio::test]
async fn test_lora_sync_word_is_silent() {
    let config = device_config();
    let mut radio = ready_radio(FakeChip::new(), &config).await;
    radio.start_rx(100_000).await.unwrap();
    raise(&mut radio, IrqFlags::SYNC_WORD_VALID | IrqFlags::HEADER_VALID).await;
    assert!(radio.listener.events.is_empty());
}

#[tokio::test]
async fn test_lora_rx_done_with_header_bit_is_finished() {
    use crate::lr11xx::radio_kind_params::{irq_flags_from_register, IrqMask};

    let config = device_config();
    let mut radio = ready_radio(FakeChip::new(), &config).await;
    radio.chip.buffer = vec![0xC0, 0xFF, 0xEE];
    radio.chip.rx_buffer_status = RxBufferStatus {
        payload_len: 3,
        start_offset: 0,
    };
    radio.start_rx(100_000).await.unwrap();

    // LR11xx reports sync word and header on one bit, set alongside rx done
    let irq = irq_flags_from_register(IrqMask::RxDone.value() | IrqMask::SyncWordHeaderValid.value());
    assert!(irq.contains(IrqFlags::SYNC_WORD_VALID));
    raise(&mut radio, irq).await;

    assert_eq!(radio.listener.events, vec![RadioEvent::RxDone]);
    assert_eq!(radio.rx_packet().payload(), &[0xC0, 0xFF, 0xEE]);
}

fn fsk_frame(payload: &[u8]) -> Vec<u8> {
    let mut frame = [0u8; 64];
    frame[..payload.len()].copy_from_slice(payload);
    let hdr = FskPhyHeader {
        fcs_type: FcsType::Crc16,
        whitening: true,
        fec: false,
    };
    let mut params = FskPacketParams {
        preamble_length: 8,
        payload_length: payload.len() as u8,
        ..Default::default()
    };
    fsk::prepare_for_tx(&mut frame, &hdr, &mut params).unwrap();
    frame[..params.payload_length as usize].to_vec()
}

async fn fsk_radio<'a>(config: &'a DeviceConfig<'a>) -> TestRadio<'a> {
    let mut radio = ready_radio(FakeChip::new(), config).await;
    radio.set_modem_mode(ModemMode::Fsk).await.unwrap();
    radio.chip.take_calls();
    radio
}

#[tokio::test]
async fn test_fsk_sync_then_rx_done() {
    let config = device_config();
    let mut radio = fsk_radio(&config).await;
    let frame = fsk_frame(&[0xDE, 0xAD, 0xBE, 0xEF]);
    radio.chip.buffer = frame.clone();
    radio.chip.fill_level = 2;
    radio.chip.fsk_status = FskPacketStatus {
        rssi_sync: -70,
        rssi_avg: -74,
    };

    radio.start_rx(100_000).await.unwrap();
    assert!(radio.chip.take_calls().contains(&Call::StopOnPreamble(true)));

    let calls = raise(&mut radio, IrqFlags::SYNC_WORD_VALID).await;
    assert!(calls.contains(&Call::FskPayloadLength(frame.len() as u8)));
    assert!(radio.listener.events.is_empty());

    raise(&mut radio, IrqFlags::RX_DONE).await;
    assert_eq!(radio.listener.events, vec![RadioEvent::RxDone]);
    let packet = radio.rx_packet();
    assert_eq!(packet.payload(), &[0xDE, 0xAD, 0xBE, 0xEF]);
    assert_eq!(
        packet.fsk_status,
        FskRxPacketStatus {
            rssi_sync: -72,
            rssi_avg: -76,
            snr: 0,
        }
    );
    assert_eq!(packet.lora_status, LoraRxPacketStatus::default());
}

#[tokio::test]
async fn test_fsk_rx_done_without_sync_is_an_error() {
    let config = device_config();
    let mut radio = fsk_radio(&config).await;
    radio.chip.buffer = fsk_frame(&[1, 2, 3]);

    radio.start_rx(100_000).await.unwrap();
    raise(&mut radio, IrqFlags::RX_DONE).await;
    assert_eq!(radio.listener.events, vec![RadioEvent::RxError]);
    assert_eq!(radio.rx_packet().payload_len, 0);
}

#[tokio::test]
async fn test_fsk_corrupted_frame_is_an_error() {
    let config = device_config();
    let mut radio = fsk_radio(&config).await;
    let mut frame = fsk_frame(&[1, 2, 3, 4, 5]);
    frame[4] ^= 0x10;
    radio.chip.buffer = frame;
    radio.chip.fill_level = 2;

    radio.start_rx(100_000).await.unwrap();
    raise(&mut radio, IrqFlags::SYNC_WORD_VALID).await;
    raise(&mut radio, IrqFlags::RX_DONE).await;
    assert_eq!(radio.listener.events, vec![RadioEvent::RxError]);

    // marker is consumed by the first receive-done
    raise(&mut radio, IrqFlags::RX_DONE).await;
    assert_eq!(radio.listener.events, vec![RadioEvent::RxError, RadioEvent::RxError]);
}

const CS_PARAMS: FskCadParams = FskCadParams {
    cs_duration_us: 5_000,
    cs_threshold: -90,
};

#[tokio::test]
async fn test_carrier_sense_detects_busy_channel() {
    let config = device_config();
    let mut radio = fsk_radio(&config).await;

    radio.start_carrier_sense(&CS_PARAMS, CadExitMode::CsOnly).await.unwrap();
    let calls = radio.chip.take_calls();
    assert!(calls.contains(&Call::IrqMask(IrqFlags::CARRIER_SENSE)));
    assert_eq!(calls.last(), Some(&Call::Rx(320)));
    assert_eq!(radio.irq_mask(), IrqFlags::CARRIER_SENSE);
    assert_eq!(radio.cad_exit_mode(), CadExitMode::CsOnly);
    assert_eq!(radio.fsk_cad_params(), Some(&CS_PARAMS));
    assert_eq!(radio.state(), RadioState::Rx);

    radio.chip.rssi.push_back(-60);
    let calls = raise(&mut radio, IrqFlags::PREAMBLE_DETECTED).await;
    assert_eq!(radio.listener.events, vec![RadioEvent::CsDone]);
    assert_eq!(radio.state(), RadioState::Standby);
    assert_eq!(radio.cad_exit_mode(), CadExitMode::None);
    assert_eq!(radio.irq_mask(), IrqFlags::FSK_DEFAULT);
    assert_eq!(radio.rx_packet().fsk_status.rssi_sync, -62);
    assert_eq!(calls.last(), Some(&Call::IrqMask(IrqFlags::FSK_DEFAULT)));
}

#[tokio::test]
async fn test_carrier_sense_needs_fsk() {
    let config = device_config();
    let mut radio = ready_radio(FakeChip::new(), &config).await;
    assert_eq!(
        radio.start_carrier_sense(&CS_PARAMS, CadExitMode::CsOnly).await,
        Err(RadioError::InvalidParams)
    );

    let mut radio = fsk_radio(&config).await;
    assert_eq!(
        radio.start_carrier_sense(&CS_PARAMS, CadExitMode::None).await,
        Err(RadioError::InvalidParams)
    );
    assert!(radio.chip.calls.is_empty());
}

#[tokio::test]
async fn test_carrier_sense_then_receive() {
    let config = device_config();
    let mut radio = fsk_radio(&config).await;

    radio.start_carrier_sense(&CS_PARAMS, CadExitMode::CsRx).await.unwrap();
    let calls = raise(&mut radio, IrqFlags::PREAMBLE_DETECTED).await;
    assert!(radio.listener.events.is_empty());
    assert_eq!(radio.state(), RadioState::Rx);
    assert_eq!(radio.cad_exit_mode(), CadExitMode::None);
    assert_eq!(calls.last(), Some(&Call::IrqMask(IrqFlags::FSK_DEFAULT)));
}

#[cfg(not(feature = "diagnostics"))]
#[tokio::test]
async fn test_quiet_channel_starts_transmission() {
    let config = device_config();
    let mut radio = fsk_radio(&config).await;

    radio.start_carrier_sense(&CS_PARAMS, CadExitMode::CsLbt).await.unwrap();
    let calls = raise(&mut radio, IrqFlags::TIMEOUT).await;
    assert!(radio.listener.events.is_empty());
    assert_eq!(radio.state(), RadioState::Tx);
    assert!(calls.contains(&Call::Tx(6_400)));
    assert_eq!(radio.irq_mask(), IrqFlags::FSK_DEFAULT);
}

#[cfg(feature = "diagnostics")]
#[tokio::test]
async fn test_quiet_channel_reports_timeout() {
    let config = device_config();
    let mut radio = fsk_radio(&config).await;

    radio.start_carrier_sense(&CS_PARAMS, CadExitMode::CsLbt).await.unwrap();
    raise(&mut radio, IrqFlags::TIMEOUT).await;
    assert_eq!(radio.listener.events, vec![RadioEvent::CsTimeout]);
    assert_eq!(radio.state(), RadioState::Rx);
}

#[tokio::test]
async fn test_carrier_sense_timeout_without_lbt() {
    let config = device_config();
    let mut radio = fsk_radio(&config).await;

    radio.start_carrier_sense(&CS_PARAMS, CadExitMode::CsOnly).await.unwrap();
    raise(&mut radio, IrqFlags::TIMEOUT).await;
    assert_eq!(radio.listener.events, vec![RadioEvent::RxTimeout]);
    assert_eq!(radio.cad_exit_mode(), CadExitMode::None);
}

fn cad_params(exit_mode: CadExitMode) -> LoraCadParams {
    LoraCadParams {
        symbol_num: 0x01,
        detect_peak: 22,
        detect_min: 10,
        exit_mode,
        timeout: 0,
    }
}

#[tokio::test]
async fn test_lora_cad_outcomes() {
    let config = device_config();
    let mut radio = ready_radio(FakeChip::new(), &config).await;

    radio.set_lora_cad_params(&cad_params(CadExitMode::CsOnly)).await.unwrap();
    assert_eq!(radio.cad_exit_mode(), CadExitMode::CsOnly);
    radio.lora_start_cad().await.unwrap();
    assert_eq!(radio.chip.take_calls().last(), Some(&Call::Cad));
    assert_eq!(radio.state(), RadioState::Cad);

    raise(&mut radio, IrqFlags::CAD_DONE).await;
    assert_eq!(radio.cad_exit_mode(), CadExitMode::None);

    radio.set_lora_cad_params(&cad_params(CadExitMode::CsRx)).await.unwrap();
    radio.lora_start_cad().await.unwrap();
    raise(&mut radio, IrqFlags::CAD_DONE | IrqFlags::CAD_DETECTED).await;

    assert_eq!(radio.listener.events, vec![RadioEvent::CadTimeout, RadioEvent::CadDone]);
}

#[tokio::test]
async fn test_failed_cad_params_keep_exit_mode() {
    let config = device_config();
    let mut radio = ready_radio(FakeChip::new(), &config).await;
    radio.set_lora_cad_params(&cad_params(CadExitMode::CsRx)).await.unwrap();

    radio.chip.fail_cad_params = true;
    assert_eq!(
        radio.set_lora_cad_params(&cad_params(CadExitMode::CsLbt)).await,
        Err(RadioError::HardwareError)
    );
    assert_eq!(radio.cad_exit_mode(), CadExitMode::CsRx);
}

#[cfg(not(feature = "diagnostics"))]
#[tokio::test]
async fn test_free_lora_channel_transmits_with_lora_timeout() {
    let config = device_config();
    let mut radio = ready_radio(FakeChip::new(), &config).await;

    radio.set_lora_cad_params(&cad_params(CadExitMode::CsLbt)).await.unwrap();
    radio.lora_start_cad().await.unwrap();
    let calls = raise(&mut radio, IrqFlags::CAD_DONE).await;

    assert!(radio.listener.events.is_empty());
    assert_eq!(radio.state(), RadioState::Tx);
    // 5 s at 64 kHz
    assert!(calls.contains(&Call::Tx(320_000)));
    assert_eq!(radio.cad_exit_mode(), CadExitMode::None);
}

#[tokio::test]
async fn test_lora_cad_rejects_energy_detect() {
    let config = device_config();
    let mut radio = ready_radio(FakeChip::new(), &config).await;
    assert_eq!(
        radio.set_lora_cad_params(&cad_params(CadExitMode::EdRx)).await,
        Err(RadioError::InvalidParams)
    );
    assert_eq!(radio.cad_exit_mode(), CadExitMode::None);

    radio.set_modem_mode(ModemMode::Fsk).await.unwrap();
    assert_eq!(radio.lora_start_cad().await, Err(RadioError::InvalidParams));
}

#[tokio::test]
async fn test_hold_scan_preconditions() {
    let config = device_config();
    let mut radio = ready_radio(FakeChip::new(), &config).await;
    assert_eq!(radio.hold_scan().await, Err(RadioError::NotSupported));

    let mut radio = ready_radio(FakeChip::with_scan(), &config).await;
    radio.chip.irq_line = true;
    assert_eq!(radio.hold_scan().await, Err(RadioError::Busy));
    radio.chip.irq_line = false;

    radio.start_rx(1_000).await.unwrap();
    assert_eq!(radio.hold_scan().await, Err(RadioError::InvalidState));
    assert_eq!(radio.state(), RadioState::Rx);
}

#[tokio::test]
async fn test_scan_owns_the_radio() {
    let config = device_config();
    let mut radio = ready_radio(FakeChip::with_scan(), &config).await;
    radio.hold_scan().await.unwrap();
    assert_eq!(radio.state(), RadioState::Scan);

    assert_eq!(radio.start_tx(0).await, Err(RadioError::Busy));
    assert_eq!(radio.sleep(0).await, Err(RadioError::Busy));
    assert_eq!(radio.standby().await, Err(RadioError::Busy));
    assert_eq!(radio.rssi().await, Err(RadioError::Busy));
    assert_eq!(radio.set_busy(), Err(RadioError::Busy));
    radio.chip.irq_status.push_back(IrqFlags::RX_DONE);
    radio.process_irq().await.unwrap();
    assert!(radio.chip.calls.is_empty());
    assert!(radio.listener.events.is_empty());

    radio.abort_scan().await.unwrap();
    assert_eq!(radio.chip.take_calls(), vec![Call::Abort]);

    radio.release_scan().await.unwrap();
    assert_eq!(
        radio.chip.take_calls(),
        vec![
            Call::PacketType(ModemMode::LoRa),
            Call::IrqMask(IrqFlags::LORA_DEFAULT),
        ]
    );
    assert_eq!(radio.state(), RadioState::Standby);
    assert_eq!(radio.release_scan().await, Err(RadioError::InvalidState));
    assert_eq!(radio.abort_scan().await, Err(RadioError::InvalidState));
}

#[tokio::test]
async fn test_scan_irq_outcomes() {
    let config = device_config();
    let mut radio = ready_radio(FakeChip::with_scan(), &config).await;
    assert_eq!(radio.scan_irq(IrqFlags::GNSS_SCAN_DONE).await, Err(RadioError::InvalidState));

    radio.hold_scan().await.unwrap();
    radio.scan_irq(IrqFlags::WIFI_SCAN_DONE).await.unwrap();
    assert_eq!(radio.state(), RadioState::Busy);
    assert_eq!(
        radio.chip.take_calls(),
        vec![
            Call::PacketType(ModemMode::LoRa),
            Call::IrqMask(IrqFlags::LORA_DEFAULT),
        ]
    );

    let mut radio = ready_radio(FakeChip::with_scan(), &config).await;
    radio.hold_scan().await.unwrap();
    radio.chip.bus_status.last_command = 0x0300;
    radio.scan_irq(IrqFlags::CMD_ERROR).await.unwrap();
    assert_eq!(radio.state(), RadioState::Scan);

    radio.chip.bus_status.last_command = 0x0409;
    radio.scan_irq(IrqFlags::CMD_ERROR).await.unwrap();
    assert_eq!(radio.state(), RadioState::Standby);
}

#[tokio::test]
async fn test_random_disarms_interrupts() {
    let config = device_config();
    let mut radio = ready_radio(FakeChip::new(), &config).await;
    radio.chip.random = 0xDEAD_BEEF;

    assert_eq!(radio.random().await, Ok(0xDEAD_BEEF));
    assert_eq!(
        radio.chip.take_calls(),
        vec![
            Call::IrqMask(IrqFlags::empty()),
            Call::Random,
            Call::IrqMask(IrqFlags::LORA_DEFAULT),
        ]
    );
}

#[tokio::test]
async fn test_rssi_is_gain_corrected() {
    let config = device_config();
    let mut radio = ready_radio(FakeChip::new(), &config).await;
    radio.chip.rssi.push_back(-97);
    assert_eq!(radio.rssi().await, Ok(-97 - LNA_GAIN));
}

#[tokio::test]
async fn test_channel_noise_averages_samples() {
    let config = device_config();
    let mut radio = ready_radio(FakeChip::new(), &config).await;
    for i in 0..32 {
        radio.chip.rssi.push_back(if i % 2 == 0 { -100 } else { -104 });
    }

    assert_eq!(radio.channel_noise(868_100_000).await, Ok(-104));
    assert_eq!(radio.state(), RadioState::Standby);
    let calls = radio.chip.take_calls();
    assert_eq!(calls.iter().filter(|call| **call == Call::RssiInst).count(), 32);
    assert!(calls.contains(&Call::IrqMask(IrqFlags::LORA_DEFAULT)));
}

#[tokio::test]
async fn test_channel_free_check() {
    let config = device_config();
    let mut radio = ready_radio(FakeChip::new(), &config).await;

    radio.chip.rssi.push_back(-100);
    assert_eq!(radio.is_channel_free(868_100_000, -90, 0).await, Ok(true));
    assert_eq!(radio.state(), RadioState::Standby);

    radio.chip.rssi.push_back(-50);
    assert_eq!(radio.is_channel_free(868_100_000, -90, 0).await, Ok(false));
    assert_eq!(radio.state(), RadioState::Standby);
    assert_eq!(radio.chip.calls.last(), Some(&Call::Standby(false)));
}

#[tokio::test]
async fn test_empty_payload_is_rejected() {
    let config = device_config();
    let mut radio = ready_radio(FakeChip::new(), &config).await;
    assert_eq!(radio.set_tx_payload(&[]).await, Err(RadioError::InvalidParams));
    radio.set_tx_payload(&[1, 2, 3]).await.unwrap();
    assert_eq!(radio.chip.take_calls(), vec![Call::WriteBuffer(0, vec![1, 2, 3])]);
}

#[tokio::test]
async fn test_external_pa_uses_its_own_path() {
    let mut config = device_config();
    config.enable_ext_pa = true;
    let mut radio = ready_radio(FakeChip::new(), &config).await;
    assert!(radio.pa_config().enable_ext_pa);

    radio.start_tx(0).await.unwrap();
    assert_eq!(radio.chip.take_calls()[0], Call::RfSwitch(RfPath::TxExtPa));
}

#[tokio::test]
async fn test_unknown_power_is_invalid() {
    let config = device_config();
    let mut radio = ready_radio(FakeChip::new(), &config).await;
    assert_eq!(radio.set_tx_power(30).await, Err(RadioError::InvalidParams));
    assert!(radio.chip.calls.is_empty());
}

#[tokio::test]
async fn test_state_transition_delays() {
    let mut config = device_config();
    config.state_timings.rx_to_tx_us = 150;
    config.state_timings.tcxo_delay_us = 1_000;
    let radio = Radio::new(FakeChip::new(), RecordingListener::default(), FakeClock::default(), &config);
    let timings = radio.state_transition_delays();
    assert_eq!(timings.rx_to_tx_us, 150);
    assert_eq!(timings.tcxo_delay_us, 1_000);
}

const BUS: BusConfig = BusConfig {
    protocol: BusProtocol::SingleShot,
    busy_budget: 5,
    wake_settle_us: 100,
    poll_interval_us: 10,
};

type TestBus = SpiInterface<TestFixture, DummyVariant, Delayer>;

fn bus(spi: TestFixture, iv: DummyVariant, config: BusConfig) -> TestBus {
    SpiInterface::new(spi, iv, Delayer::default(), config)
}

#[tokio::test]
async fn test_busy_budget_is_exhausted() {
    let iv = DummyVariant {
        stuck_busy: true,
        ..Default::default()
    };
    let mut intf = bus(TestFixture::new(), iv, BUS);

    assert_eq!(intf.write(&[0x80, 0x00], false).await, Err(RadioError::Busy));
    assert_eq!(intf.iv.busy_checks, 5);
    assert_eq!(intf.delay.calls, 5);
    assert!(intf.spi.transfers().is_empty());
}

#[tokio::test]
async fn test_busy_line_is_waited_out() {
    let iv = DummyVariant {
        busy_polls: 3,
        ..Default::default()
    };
    let mut intf = bus(TestFixture::new(), iv, BUS);

    intf.write(&[0x80, 0x00], false).await.unwrap();
    assert_eq!(intf.iv.busy_checks, 4);
    assert_eq!(intf.delay.calls, 3);
    assert_eq!(intf.spi.transfers(), vec![vec![0x80, 0x00]]);
}

#[tokio::test]
async fn test_sleep_command_wakes_before_next_transfer() {
    let mut intf = bus(TestFixture::new(), DummyVariant::default(), BUS);

    intf.write(&[0x84, 0x04], true).await.unwrap();
    assert!(intf.is_sleeping());
    intf.write(&[0x80, 0x00], false).await.unwrap();
    assert!(!intf.is_sleeping());
    assert_eq!(
        intf.spi.ops,
        vec![
            Ops::Transfer(vec![0x84, 0x04]),
            Ops::Delay(100_000),
            Ops::Transfer(vec![0x80, 0x00]),
        ]
    );
}

#[tokio::test]
async fn test_single_shot_read_and_status() {
    let spi = TestFixture::with_responses(&[&[0xA2, 0xA2, 0x12, 0x34]]);
    let mut intf = bus(spi, DummyVariant::default(), BUS);

    let mut out = [0u8; 2];
    intf.read(&[0x1D, 0x07], &mut out).await.unwrap();
    assert_eq!(out, [0x12, 0x34]);
    assert_eq!(intf.spi.transfers(), vec![vec![0x1D, 0x07, 0x00, 0x00]]);
    assert_eq!(
        intf.status(),
        BusStatus {
            last_command: 0x1D,
            last_status1: 0xA2,
            last_status2: 0xA2,
            failed_command: 0,
        }
    );
}

#[tokio::test]
async fn test_two_phase_read_drops_status_byte() {
    let config = BusConfig {
        protocol: BusProtocol::TwoPhase,
        ..BUS
    };
    let spi = TestFixture::with_responses(&[&[0x04, 0x04], &[0x05, 0xAA, 0xBB]]);
    let mut intf = bus(spi, DummyVariant::default(), config);

    let mut out = [0u8; 2];
    intf.read(&[0x01, 0x09], &mut out).await.unwrap();
    assert_eq!(out, [0xAA, 0xBB]);
    assert_eq!(intf.spi.transfers(), vec![vec![0x01, 0x09], vec![0x00, 0x00, 0x00]]);
    assert_eq!(intf.status().last_command, 0x0109);
}

#[tokio::test]
async fn test_oversized_write_is_refused() {
    let mut intf = bus(TestFixture::new(), DummyVariant::default(), BUS);
    let payload = [0u8; 300];
    assert_eq!(
        intf.write_with_payload(&[0x0E, 0x00], &payload, false).await,
        Err(RadioError::NoMem)
    );
    assert!(intf.spi.ops.is_empty());
}

#[tokio::test]
async fn test_abort_ignores_busy_on_entry() {
    let iv = DummyVariant {
        busy_polls: 2,
        ..Default::default()
    };
    let mut intf = bus(TestFixture::new(), iv, BUS);

    intf.abort().await.unwrap();
    assert_eq!(intf.spi.transfers(), vec![vec![0x00, 0x00, 0x00, 0x00]]);
    assert_eq!(intf.iv.busy_checks, 3);
}

#[tokio::test]
async fn test_abort_acknowledgement_is_consumed_once() {
    let config = BusConfig {
        protocol: BusProtocol::TwoPhase,
        ..BUS
    };
    let spi = TestFixture::with_responses(&[
        &[0x04, 0x00],
        &[0x00, 0x00, 0x00, 0x00],
        // command status 4: the chip acknowledges the abort
        &[0x08, 0x00],
        &[0x08, 0x00],
    ]);
    let mut intf = bus(spi, DummyVariant::default(), config);

    intf.write(&[0x04, 0x09, 0x00], false).await.unwrap();
    intf.abort().await.unwrap();
    intf.write(&[0x01, 0x1C, 0x00], false).await.unwrap();
    assert_eq!(
        intf.status(),
        BusStatus {
            last_command: 0x011C,
            last_status1: 0x08,
            last_status2: 0x00,
            failed_command: 0,
        }
    );

    // the same status without a pending abort is a failure
    intf.write(&[0x01, 0x1C, 0x00], false).await.unwrap();
    assert_eq!(intf.status().failed_command, 0x011C);
    assert_eq!(intf.spi.transfers()[1], vec![0x00, 0x00, 0x00, 0x00]);
}

#[tokio::test]
async fn test_direct_read_leaves_status_alone() {
    let spi = TestFixture::with_responses(&[&[0xA2, 0xA2], &[0x00, 0x00, 0x00, 0x08, 0x00, 0x00]]);
    let mut intf = bus(spi, DummyVariant::default(), BUS);
    intf.write(&[0x80, 0x00], false).await.unwrap();
    let before = intf.status();

    let mut out = [0xFFu8; 6];
    intf.direct_read(&mut out).await.unwrap();
    assert_eq!(out, [0x00, 0x00, 0x00, 0x08, 0x00, 0x00]);
    assert_eq!(intf.spi.transfers()[1], vec![0u8; 6]);
    assert_eq!(intf.status(), before);
}
