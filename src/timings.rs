//! Conversions between wall-clock time and chip units, symbol counts and
//! time-on-air for both modems. Everything here is pure.

use crate::lora::{bandwidth_hz, coding_rate_value, low_data_rate_optimize, spreading_factor_value};
use crate::mod_params::*;

/// Timeout value that disables the chip timer
pub const TIMEOUT_NONE: u32 = 0;
/// Timeout value that keeps the receiver on until told otherwise
pub const TIMEOUT_CONTINUOUS: u32 = 0x00FF_FFFF;
const TIMEOUT_MAX_FINITE: u32 = 0x00FF_FFFE;

/// LoRa transmit processing delay, microseconds
pub const LORA_TX_PROCESS_DELAY_US: u32 = 336;
/// LoRa receive processing delay, microseconds
pub const LORA_RX_PROCESS_DELAY_US: u32 = 286;
/// Duration of one LoRa channel activity detection, microseconds
pub const LORA_CAD_DURATION_US: u32 = 2000;

const FSK_PROCESS_DELAY_US_MIN: u32 = 1000;
const FSK_PROCESS_DELAY_US_MAX: u32 = 5000;
const FSK_PROCESS_DELAY_US_DEFAULT: u32 = 1000;

const RX_DONE_IRQ_PROCESSING_TIME_US: u32 = 54;
const TX_DONE_IRQ_PROCESSING_TIME_US: u32 = 53;
const LORA_OVERSAMPLING_RATE: u32 = 32;

/// Convert microseconds into chip timer ticks.
///
/// 0 (no timeout) and `0xFFFFFF` (continuous) pass through unchanged; any
/// other value is rounded down, kept non-zero and capped below the
/// continuous marker.
pub fn us_to_ticks(us: u32, ticks_per_second: u32) -> u32 {
    if us == TIMEOUT_NONE || us == TIMEOUT_CONTINUOUS {
        return us;
    }
    let ticks = (us as u64 * ticks_per_second as u64) / 1_000_000;
    ticks.clamp(1, TIMEOUT_MAX_FINITE as u64) as u32
}

/// Convert chip timer ticks into microseconds
pub fn ticks_to_us(ticks: u32, ticks_per_second: u32) -> u32 {
    if ticks_per_second == 0 {
        return 0;
    }
    ((ticks as u64 * 1_000_000) / ticks_per_second as u64).min(u32::MAX as u64) as u32
}

/// PA ramp time of a ramp code, microseconds
pub fn ramp_time_us(ramp_time: u8) -> u32 {
    match ramp_time {
        0 => 10,
        1 => 20,
        2 => 40,
        3 => 80,
        4 => 200,
        5 => 800,
        6 => 1700,
        7 => 3400,
        _ => 0,
    }
}

/// Duration of one LoRa symbol, microseconds
pub fn lora_symbol_time_us(spreading_factor: &SpreadingFactor, bandwidth: &Bandwidth) -> Result<u32, RadioError> {
    let chips = 1u32 << spreading_factor_value(spreading_factor);
    Ok(chips * 1_000_000 / bandwidth_hz(bandwidth)?)
}

/// Smallest number of LoRa symbols lasting at least `delay_us`
pub fn lora_symbols_for_delay(params: &LoraModulationParams, delay_us: u32) -> Result<u32, RadioError> {
    let ts = lora_symbol_time_us(&params.spreading_factor, &params.bandwidth)?;
    Ok(delay_us.div_ceil(ts))
}

/// Duration of `symbols` LoRa symbols, microseconds
pub fn lora_symbol_timeout_us(params: &LoraModulationParams, symbols: u8) -> Result<u32, RadioError> {
    let ts = lora_symbol_time_us(&params.spreading_factor, &params.bandwidth)?;
    Ok(ts * symbols as u32)
}

/// Duration of one LoRa channel activity detection
pub fn lora_cad_duration_us(_symbols: u8, _params: &LoraModulationParams) -> u32 {
    LORA_CAD_DURATION_US
}

// Numerator of the LoRa time on air, in units of 1 / bandwidth
fn lora_time_on_air_numerator(mdltn: &LoraModulationParams, pkt: &LoraPacketParams) -> Result<u32, RadioError> {
    let sf = spreading_factor_value(&mdltn.spreading_factor) as i32;
    let cr = coding_rate_value(&mdltn.coding_rate, mdltn.long_interleaver)? as i32;
    let ldro = low_data_rate_optimize(&mdltn.spreading_factor, &mdltn.bandwidth) as i32;
    let pld_len = pkt.payload_length as i32;
    let fine_sync = (sf <= 6) as i32;

    let total_bytes = pld_len + if pkt.crc_on { 2 } else { 0 };
    let bits_per_symbol = sf - 2 * ldro;

    let (numerator, denominator) = if mdltn.long_interleaver {
        let fec_num = 4;
        let fec_den = cr + (cr == 7) as i32;

        if pkt.implicit_header {
            let bits_per_symbol_start = sf - 2 + 2 * fine_sync;
            if 8 * total_bytes * fec_den <= 7 * fec_num * bits_per_symbol_start {
                (8 * total_bytes * fec_den, fec_num * bits_per_symbol_start)
            } else {
                let coded_header_bits = bits_per_symbol_start * 8;
                (
                    8 * fec_num * bits_per_symbol + 8 * total_bytes * fec_den - fec_num * coded_header_bits,
                    fec_num * bits_per_symbol,
                )
            }
        } else {
            let mut header_bits = (sf * 4 + fine_sync * 8 - 28) & !0x07;
            if header_bits < 8 * total_bytes && header_bits > 8 * pld_len {
                header_bits = 8 * pld_len;
            }
            let payload_bits = (8 * total_bytes - header_bits).max(0);
            (
                payload_bits * fec_den + 8 * fec_num * bits_per_symbol,
                fec_num * bits_per_symbol,
            )
        }
    } else {
        let mut header_bits = sf * 4 + fine_sync * 8 - 8;
        if !pkt.implicit_header {
            header_bits -= 20;
        }
        let payload_bits = (8 * total_bytes - header_bits).max(0);
        (payload_bits, 4 * bits_per_symbol)
    };

    let mut data_symbols = (numerator + denominator - 1) / denominator;
    if !mdltn.long_interleaver {
        data_symbols = data_symbols * (cr + 4) + 8;
    }
    let intermediate = pkt.preamble_length as i32 + 4 + 2 * fine_sync + data_symbols;

    Ok(((4 * intermediate + 1) * (1 << (sf - 2)) - 1) as u32)
}

/// LoRa time on air of a packet, milliseconds rounded up
pub fn lora_time_on_air_ms(mdltn: &LoraModulationParams, pkt: &LoraPacketParams) -> Result<u32, RadioError> {
    let numerator = 1000u64 * lora_time_on_air_numerator(mdltn, pkt)? as u64;
    let denominator = bandwidth_hz(&mdltn.bandwidth)? as u64;
    Ok(numerator.div_ceil(denominator) as u32)
}

fn lora_rx_input_delay_us(bandwidth: &Bandwidth) -> u32 {
    #[allow(unreachable_patterns)]
    match bandwidth {
        Bandwidth::_500KHz => 16,
        Bandwidth::_250KHz => 31,
        Bandwidth::_125KHz => 57,
        _ => 0,
    }
}

// Demodulator latency after the last bit, in LoRa clock cycles
fn lora_rx_data_delay_cycles(mdltn: &LoraModulationParams, pkt: &LoraPacketParams) -> Result<u32, RadioError> {
    let sf = spreading_factor_value(&mdltn.spreading_factor) as u32;
    let cr = coding_rate_value(&mdltn.coding_rate, mdltn.long_interleaver)? as u32;
    let fine_sync = (sf <= 6) as u32;
    let cr_len = if cr == 7 { cr + 1 } else { cr };
    let crc_len = pkt.crc_on as u32;
    let pld_len = pkt.payload_length as u32;
    let header_offset = sf + 2 * fine_sync - 7;

    if !mdltn.long_interleaver {
        let bits = (2 * (pld_len + 2 * crc_len)).wrapping_sub(header_offset);
        Ok((bits % sf) * 16 * (4 + cr_len) + 5)
    } else {
        let len = (pld_len + 2 * crc_len).wrapping_sub(header_offset / 2);
        let coded = 2u32.wrapping_mul(len);
        Ok(coded
            .wrapping_mul(5 + cr_len)
            .wrapping_add(coded.wrapping_mul(cr_len) % sf)
            .wrapping_add(4))
    }
}

/// Delay between the last bit on air and the receive-done interrupt, microseconds
pub fn lora_rx_done_delay_us(mdltn: &LoraModulationParams, pkt: &LoraPacketParams) -> Result<u32, RadioError> {
    let sf = spreading_factor_value(&mdltn.spreading_factor) as u32;
    let cycles = ((sf + 1) << (sf + 1)) + (1 << sf) + lora_rx_data_delay_cycles(mdltn, pkt)?;
    let clock_mhz = LORA_OVERSAMPLING_RATE * bandwidth_hz(&mdltn.bandwidth)? / 1_000_000;
    let phy_delay = cycles.div_ceil(clock_mhz);
    Ok(lora_rx_input_delay_us(&mdltn.bandwidth) + phy_delay + RX_DONE_IRQ_PROCESSING_TIME_US)
}

/// Delay between the last bit on air and the transmit-done interrupt, microseconds
pub fn lora_tx_done_delay_us(ramp_time: u8) -> u32 {
    ramp_time_us(ramp_time) + TX_DONE_IRQ_PROCESSING_TIME_US
}

/// Preamble length in bits as programmed into the FSK packet engine
pub fn fsk_preamble_bits(preamble_length: u16) -> u16 {
    if preamble_length > 1 {
        (preamble_length - 1) << 3
    } else {
        0
    }
}

/// FSK time on air of a packet, milliseconds rounded up
pub fn fsk_time_on_air_ms(mdltn: &FskModulationParams, pkt: &FskPacketParams) -> Result<u32, RadioError> {
    if mdltn.bit_rate == 0 {
        return Err(RadioError::InvalidParams);
    }
    let bytes = pkt.payload_length as u32 + pkt.addr_comp as u32 + if pkt.crc_on { 2 } else { 0 };
    let bits = fsk_preamble_bits(pkt.preamble_length) as u32
        + if pkt.variable_length { 8 } else { 0 }
        + pkt.sync_word_length as u32 * 8
        + (bytes << 3);
    Ok((1000u64 * bits as u64).div_ceil(mdltn.bit_rate as u64) as u32)
}

/// Number of FSK symbols sent during `delay_us`
pub fn fsk_symbols_for_delay(mdltn: &FskModulationParams, delay_us: u32) -> u32 {
    (delay_us as u64 * mdltn.bit_rate as u64 / 1_000_000) as u32
}

/// Board FSK processing delay, falling back to 1000 µs outside 1000..=5000
pub fn fsk_process_delay_us(configured_us: u32) -> u32 {
    if (FSK_PROCESS_DELAY_US_MIN..=FSK_PROCESS_DELAY_US_MAX).contains(&configured_us) {
        configured_us
    } else {
        FSK_PROCESS_DELAY_US_DEFAULT
    }
}
