//! LoRa parameter mapping and the receive-done finisher

use crate::mod_params::*;
use crate::mod_traits::ChipOps;

/// Sync word of private networks in the two-byte notation
pub const LORA_PRIVATE_SYNC_WORD: u16 = 0x1424;

const LORA_PRIVATE_SYNC_WORD_VALUE: u8 = 0x12;
const LORA_PUBLIC_SYNC_WORD_VALUE: u8 = 0x34;

/// Numeric spreading factor
pub fn spreading_factor_value(spreading_factor: &SpreadingFactor) -> u8 {
    match spreading_factor {
        SpreadingFactor::_5 => 5,
        SpreadingFactor::_6 => 6,
        SpreadingFactor::_7 => 7,
        SpreadingFactor::_8 => 8,
        SpreadingFactor::_9 => 9,
        SpreadingFactor::_10 => 10,
        SpreadingFactor::_11 => 11,
        SpreadingFactor::_12 => 12,
    }
}

/// Bandwidth in Hz; only the sub-GHz bandwidths this driver supports are accepted
pub fn bandwidth_hz(bandwidth: &Bandwidth) -> Result<u32, RadioError> {
    #[allow(unreachable_patterns)]
    match bandwidth {
        Bandwidth::_125KHz => Ok(125_000),
        Bandwidth::_250KHz => Ok(250_000),
        Bandwidth::_500KHz => Ok(500_000),
        _ => Err(RadioError::InvalidParams),
    }
}

/// Coding rate code shared by SX126x and LR11xx. Long interleaving has no 4/7 variant.
pub fn coding_rate_value(coding_rate: &CodingRate, long_interleaver: bool) -> Result<u8, RadioError> {
    match (coding_rate, long_interleaver) {
        (CodingRate::_4_5, false) => Ok(0x01),
        (CodingRate::_4_6, false) => Ok(0x02),
        (CodingRate::_4_7, false) => Ok(0x03),
        (CodingRate::_4_8, false) => Ok(0x04),
        (CodingRate::_4_5, true) => Ok(0x05),
        (CodingRate::_4_6, true) => Ok(0x06),
        (CodingRate::_4_8, true) => Ok(0x07),
        (CodingRate::_4_7, true) => Err(RadioError::InvalidParams),
    }
}

/// Low data rate optimisation is required when a symbol lasts 16 ms or more
pub fn low_data_rate_optimize(spreading_factor: &SpreadingFactor, bandwidth: &Bandwidth) -> bool {
    matches!(
        (spreading_factor, bandwidth),
        (SpreadingFactor::_11 | SpreadingFactor::_12, Bandwidth::_125KHz)
            | (SpreadingFactor::_12, Bandwidth::_250KHz)
    )
}

/// One-byte sync word programmed for a two-byte network sync word
pub fn sync_word_value(sync_word: u16) -> u8 {
    if sync_word == LORA_PRIVATE_SYNC_WORD {
        LORA_PRIVATE_SYNC_WORD_VALUE
    } else {
        LORA_PUBLIC_SYNC_WORD_VALUE
    }
}

/// Modulation parameters of a LoRa data rate
pub fn data_rate_to_modulation_params(
    data_rate: DataRate,
    long_interleaver: bool,
) -> Result<LoraModulationParams, RadioError> {
    let (spreading_factor, coding_rate, long_interleaver) = match data_rate {
        DataRate::Kbps22 => (SpreadingFactor::_7, CodingRate::_4_6, false),
        DataRate::Kbps12_5 => (SpreadingFactor::_8, CodingRate::_4_5, true),
        DataRate::Kbps2 => (SpreadingFactor::_11, CodingRate::_4_5, long_interleaver),
        _ => return Err(RadioError::NotSupported),
    };
    Ok(LoraModulationParams {
        spreading_factor,
        bandwidth: Bandwidth::_500KHz,
        coding_rate,
        long_interleaver,
    })
}

/// Data rate described by LoRa modulation parameters
pub fn modulation_params_to_data_rate(params: &LoraModulationParams) -> Option<DataRate> {
    if !matches!(params.bandwidth, Bandwidth::_500KHz) {
        return None;
    }
    match (&params.spreading_factor, &params.coding_rate, params.long_interleaver) {
        (SpreadingFactor::_7, CodingRate::_4_6, false) => Some(DataRate::Kbps22),
        (SpreadingFactor::_8, CodingRate::_4_5, true) => Some(DataRate::Kbps12_5),
        (SpreadingFactor::_11, CodingRate::_4_5, _) => Some(DataRate::Kbps2),
        _ => None,
    }
}

/// Pull a received LoRa packet out of the chip and fill `packet`.
///
/// RSSI values are corrected by the receive path gain. The chip RSSI saturates
/// before the SNR does, so a negative SNR is folded into the packet RSSI.
pub(crate) async fn finish_rx<CO: ChipOps>(
    chip: &mut CO,
    lna_gain: i16,
    packet: &mut RxPacket,
) -> Result<(), RadioError> {
    let buffer_status = chip.get_rx_buffer_status().await?;
    let len = buffer_status.payload_len as usize;
    if len > packet.payload.len() {
        return Err(RadioError::NoMem);
    }
    chip.read_buffer(buffer_status.start_offset, &mut packet.payload[..len])
        .await?;
    packet.payload_len = buffer_status.payload_len;

    let raw = chip.get_lora_packet_status().await?;
    let mut status = LoraRxPacketStatus {
        rssi: raw.rssi_pkt - lna_gain,
        snr: raw.snr_pkt,
        signal_rssi: raw.signal_rssi_pkt - lna_gain,
        crc_present: false,
    };
    if status.snr < 0 {
        status.rssi += status.snr as i16;
    }

    status.crc_present = chip.lora_crc_in_header().await.map_err(|_| RadioError::Generic)?;
    packet.lora_status = status;
    Ok(())
}
