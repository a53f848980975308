//! FSK framing: PHY header, whitening, software FCS and the two-phase
//! receive finisher.
//!
//! The chip runs in fixed-length mode with its own CRC and whitening off.
//! Frames carry a two-byte PHY header `[fcs_type << 4 | whitening << 3, psdu_len]`
//! followed by the PSDU, which is the payload plus a big-endian CRC32 (FCS type 0)
//! or CRC16 (FCS type 1), optionally whitened.

use crc::{Crc, CRC_16_XMODEM, CRC_32_BZIP2};

use crate::mod_params::*;
use crate::mod_traits::ChipOps;

/// Seed of the whitening LFSR
pub const FSK_WHITENING_SEED: u16 = 0x01FF;
/// Length of the PHY header preceding the PSDU
pub const FSK_PHY_HEADER_LEN: usize = 2;
/// Payload length programmed for reception, the chip maximum
pub const FSK_RX_PAYLOAD_LEN: u8 = 255;
/// Largest payload with a CRC32 frame check sequence
pub const FSK_MAX_PAYLOAD_LEN_CRC32: usize = FSK_RX_PAYLOAD_LEN as usize - FSK_PHY_HEADER_LEN - 4;
/// Largest payload with a CRC16 frame check sequence
pub const FSK_MAX_PAYLOAD_LEN_CRC16: usize = FSK_RX_PAYLOAD_LEN as usize - FSK_PHY_HEADER_LEN - 2;
/// Sync word length used in both directions, bytes
pub const FSK_SYNC_WORD_LEN: usize = 3;

const PACKET_TYPE_OFFSET: usize = 0;
const PACKET_LENGTH_OFFSET: usize = 1;
const SYNC_MARKER_OFFSET: usize = 2;
const SYNC_MARKER: [u8; 2] = [0xAB, 0xBA];

// Fill-level polls granted to the sync step before the header has to be there
const SYNC_POLL_BUDGET: u32 = 1000;

const CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_XMODEM);
const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_BZIP2);

/// Frame check sequence carried in the PHY header
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum FcsType {
    /// 4-byte CRC32
    Crc32 = 0,
    /// 2-byte CRC16
    Crc16 = 1,
}

impl FcsType {
    fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            0 => Some(FcsType::Crc32),
            1 => Some(FcsType::Crc16),
            _ => None,
        }
    }

    /// Length of the trailing checksum
    pub fn crc_len(self) -> usize {
        match self {
            FcsType::Crc32 => 4,
            FcsType::Crc16 => 2,
        }
    }

    /// Largest payload whose frame, PHY header included, fits the chip buffer
    pub fn max_payload_len(self) -> usize {
        match self {
            FcsType::Crc32 => FSK_MAX_PAYLOAD_LEN_CRC32,
            FcsType::Crc16 => FSK_MAX_PAYLOAD_LEN_CRC16,
        }
    }

    fn checksum(self, data: &[u8]) -> u32 {
        match self {
            FcsType::Crc32 => crc32(data),
            FcsType::Crc16 => crc16(data) as u32,
        }
    }
}

/// FSK PHY header options
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct FskPhyHeader {
    /// Checksum appended to the payload
    pub fcs_type: FcsType,
    /// Whiten the PSDU
    pub whitening: bool,
    /// Forward error correction requested, selects the sync word
    pub fec: bool,
}

/// XOR `data` in place with the whitening sequence generated from `seed`.
/// Applying it twice with the same seed restores the input.
pub fn whiten(seed: u16, data: &mut [u8]) {
    fn step(lfsr: &mut u16) {
        let feedback = ((*lfsr >> 5) & 0x0F) ^ (*lfsr & 0x0F);
        *lfsr = (*lfsr >> 4) | (feedback << 5);
    }

    let mut lfsr = seed;
    for byte in data.iter_mut() {
        step(&mut lfsr);
        let mut mask = ((lfsr >> 5) & 0x0F) as u8;
        step(&mut lfsr);
        mask |= ((lfsr >> 1) & 0xF0) as u8;
        *byte ^= mask.reverse_bits();
    }
}

/// CRC-16/XMODEM; empty input yields 0
pub fn crc16(data: &[u8]) -> u16 {
    if data.is_empty() {
        return 0;
    }
    CRC16.checksum(data)
}

/// CRC-32/BZIP2 with inputs shorter than four bytes zero-padded to four;
/// empty input yields 0
pub fn crc32(data: &[u8]) -> u32 {
    match data.len() {
        0 => 0,
        1..=3 => {
            let mut padded = [0u8; 4];
            padded[..data.len()].copy_from_slice(data);
            CRC32.checksum(&padded)
        }
        _ => CRC32.checksum(data),
    }
}

/// Sync word for both directions; the middle byte encodes FEC
pub fn sync_word(fec: bool) -> [u8; FSK_SYNC_WORD_LEN] {
    [0x55, if fec { 0x6F } else { 0x90 }, 0x4E]
}

/// Frame the payload held at the start of `frame` for transmission.
///
/// On entry `packet_params.payload_length` is the payload length. On success
/// `frame[..packet_params.payload_length]` holds header and PSDU, the packet
/// parameters describe that frame, and the sync word to program is returned.
pub fn prepare_for_tx(
    frame: &mut [u8],
    phy_hdr: &FskPhyHeader,
    packet_params: &mut FskPacketParams,
) -> Result<[u8; FSK_SYNC_WORD_LEN], RadioError> {
    let payload_len = packet_params.payload_length as usize;
    if payload_len == 0 || packet_params.preamble_length == 0 {
        return Err(RadioError::InvalidParams);
    }
    if payload_len > phy_hdr.fcs_type.max_payload_len() {
        return Err(RadioError::InvalidParams);
    }
    let psdu_len = payload_len + phy_hdr.fcs_type.crc_len();
    let frame_len = FSK_PHY_HEADER_LEN + psdu_len;
    // the header travels inside the chip payload, which is at most 255 bytes
    let frame_len_u8 = u8::try_from(frame_len).map_err(|_| RadioError::InvalidParams)?;
    if frame.len() < frame_len {
        return Err(RadioError::NoMem);
    }

    let crc = phy_hdr.fcs_type.checksum(&frame[..payload_len]);
    frame.copy_within(..payload_len, FSK_PHY_HEADER_LEN);
    let crc_bytes = crc.to_be_bytes();
    frame[FSK_PHY_HEADER_LEN + payload_len..frame_len]
        .copy_from_slice(&crc_bytes[4 - phy_hdr.fcs_type.crc_len()..]);

    frame[PACKET_TYPE_OFFSET] = ((phy_hdr.fcs_type as u8) << 4) | ((phy_hdr.whitening as u8) << 3);
    frame[PACKET_LENGTH_OFFSET] = psdu_len as u8;
    if phy_hdr.whitening {
        whiten(FSK_WHITENING_SEED, &mut frame[FSK_PHY_HEADER_LEN..frame_len]);
    }

    packet_params.sync_word_length = FSK_SYNC_WORD_LEN as u8;
    packet_params.addr_comp = false;
    packet_params.variable_length = false;
    packet_params.payload_length = frame_len_u8;
    packet_params.crc_on = false;
    packet_params.whitening = false;
    Ok(sync_word(phy_hdr.fec))
}

/// Receive-side packet parameters matching [`prepare_for_tx`]; returns the sync word.
pub fn prepare_for_rx(phy_hdr: &FskPhyHeader, packet_params: &mut FskPacketParams) -> [u8; FSK_SYNC_WORD_LEN] {
    packet_params.preamble_min_detect = FskPreambleDetect::Bits16;
    packet_params.sync_word_length = FSK_SYNC_WORD_LEN as u8;
    packet_params.addr_comp = false;
    packet_params.variable_length = false;
    packet_params.payload_length = FSK_RX_PAYLOAD_LEN;
    packet_params.crc_on = false;
    packet_params.whitening = false;
    sync_word(phy_hdr.fec)
}

/// Modulation parameters of an FSK data rate
pub fn data_rate_to_modulation_params(data_rate: DataRate) -> Result<FskModulationParams, RadioError> {
    let (bit_rate, freq_dev, bandwidth, pulse_shape) = match data_rate {
        DataRate::Kbps50 => (50_000, 25_000, FskBandwidth::Bw156200, FskPulseShape::Bt1),
        DataRate::Kbps150 => (150_000, 37_500, FskBandwidth::Bw312000, FskPulseShape::Bt05),
        DataRate::Kbps250 => (250_000, 62_500, FskBandwidth::Bw467000, FskPulseShape::Bt05),
        _ => return Err(RadioError::InvalidParams),
    };
    Ok(FskModulationParams {
        bit_rate,
        freq_dev,
        bandwidth,
        pulse_shape,
    })
}

/// Data rate described by FSK modulation parameters; pulse shaping is not compared
pub fn modulation_params_to_data_rate(params: &FskModulationParams) -> Option<DataRate> {
    [DataRate::Kbps50, DataRate::Kbps150, DataRate::Kbps250]
        .into_iter()
        .find(|dr| {
            data_rate_to_modulation_params(*dr).is_ok_and(|p| {
                p.bit_rate == params.bit_rate && p.freq_dev == params.freq_dev && p.bandwidth == params.bandwidth
            })
        })
}

/// De-whiten and verify a received PSDU in place. Returns the payload length.
pub fn decode_psdu(header: [u8; FSK_PHY_HEADER_LEN], psdu: &mut [u8]) -> Result<usize, FskRxDoneStatus> {
    let fcs_type = FcsType::from_bits(header[PACKET_TYPE_OFFSET] >> 4).ok_or(FskRxDoneStatus::UnknownError)?;
    let whitening = header[PACKET_TYPE_OFFSET] & 0x08 != 0;
    let crc_len = fcs_type.crc_len();
    if psdu.len() <= crc_len {
        return Err(FskRxDoneStatus::InvalidLength);
    }

    if whitening {
        whiten(FSK_WHITENING_SEED, psdu);
    }
    let payload_len = psdu.len() - crc_len;
    let expected = fcs_type.checksum(&psdu[..payload_len]).to_be_bytes();
    if psdu[payload_len..] != expected[4 - crc_len..] {
        return Err(FskRxDoneStatus::BadCrc);
    }
    Ok(payload_len)
}

/// Sync-detected phase: once the PHY header is in, program the payload length
/// the chip has to wait for and stamp the marker the receive-done phase checks.
pub(crate) async fn process_sync_word<CO: ChipOps>(chip: &mut CO, packet: &mut RxPacket) -> Result<(), RadioError> {
    let mut polls = 0;
    while (chip.fsk_rx_fill_level().await? as usize) < FSK_PHY_HEADER_LEN {
        polls += 1;
        if polls >= SYNC_POLL_BUDGET {
            warn!("fsk header not received after {} polls", polls);
            return Err(RadioError::Busy);
        }
    }

    let buffer_status = chip.get_rx_buffer_status().await?;
    chip.read_buffer(buffer_status.start_offset, &mut packet.payload[..FSK_PHY_HEADER_LEN])
        .await?;
    let frame_len = packet.payload[PACKET_LENGTH_OFFSET].wrapping_add(FSK_PHY_HEADER_LEN as u8);
    chip.set_fsk_payload_length(frame_len).await?;

    packet.payload[SYNC_MARKER_OFFSET..SYNC_MARKER_OFFSET + 2].copy_from_slice(&SYNC_MARKER);
    Ok(())
}

/// Receive-done phase. Failures carry the decode status the dispatcher maps
/// to events.
pub(crate) async fn finish_rx<CO: ChipOps>(
    chip: &mut CO,
    lna_gain: i16,
    packet: &mut RxPacket,
) -> Result<(), (RadioError, FskRxDoneStatus)> {
    if packet.payload[SYNC_MARKER_OFFSET..SYNC_MARKER_OFFSET + 2] != SYNC_MARKER {
        debug!("fsk rx done without sync word marker");
        return Err((RadioError::Generic, FskRxDoneStatus::SwMarkNotPresent));
    }
    packet.payload[SYNC_MARKER_OFFSET..SYNC_MARKER_OFFSET + 2].fill(0);
    packet.payload_len = 0;

    let header = [packet.payload[PACKET_TYPE_OFFSET], packet.payload[PACKET_LENGTH_OFFSET]];
    let psdu_len = header[PACKET_LENGTH_OFFSET] as usize;
    match FcsType::from_bits(header[PACKET_TYPE_OFFSET] >> 4) {
        Some(fcs_type) if psdu_len <= fcs_type.crc_len() => {
            debug!("fsk psdu too short: {}", psdu_len);
            return Err((RadioError::Generic, FskRxDoneStatus::InvalidLength));
        }
        Some(_) => {}
        None => {
            debug!("fsk unknown fcs type: {=u8}", header[PACKET_TYPE_OFFSET] >> 4);
            return Err((RadioError::Generic, FskRxDoneStatus::UnknownError));
        }
    }

    let timeout = |_| (RadioError::IoError, FskRxDoneStatus::Timeout);
    let buffer_status = chip.get_rx_buffer_status().await.map_err(timeout)?;
    let offset = buffer_status.start_offset.wrapping_add(FSK_PHY_HEADER_LEN as u8);
    chip.read_buffer(offset, &mut packet.payload[..psdu_len])
        .await
        .map_err(timeout)?;

    let payload_len = decode_psdu(header, &mut packet.payload[..psdu_len]).map_err(|status| {
        debug!("fsk decode failed: {}", status);
        (RadioError::Generic, status)
    })?;

    let raw = chip.get_fsk_packet_status().await.map_err(timeout)?;
    packet.payload_len = payload_len as u8;
    packet.fsk_status = FskRxPacketStatus {
        rssi_sync: raw.rssi_sync - lna_gain,
        rssi_avg: raw.rssi_avg - lna_gain,
        snr: 0,
    };
    Ok(())
}
