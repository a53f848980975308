use embedded_hal_async::delay::DelayNs;

use crate::mod_params::*;

/// Functions implemented for an embedded framework for an MCU/radio chip combination
/// to allow this crate to control the chip.
pub trait InterfaceVariant {
    /// Reset the radio chip
    async fn reset(&mut self, delay: &mut impl DelayNs) -> Result<(), RadioError>;
    /// Sample the busy line once
    fn is_busy(&mut self) -> Result<bool, RadioError>;
    /// Sample the interrupt line once
    fn irq_asserted(&mut self) -> Result<bool, RadioError>;
    /// Wait for the radio chip to indicate an event has occurred
    async fn await_irq(&mut self) -> Result<(), RadioError>;
    /// Enable an antenna used for receive operations, disabling other antennas
    async fn enable_rf_switch_rx(&mut self) -> Result<(), RadioError>;
    /// Enable an antenna used for send operations, disabling other antennas
    async fn enable_rf_switch_tx(&mut self) -> Result<(), RadioError>;
    /// Disable all antennas
    async fn disable_rf_switch(&mut self) -> Result<(), RadioError>;
    /// Drive the external PA bypass line; boards without one keep the default
    async fn set_ext_pa(&mut self, _enable: bool) -> Result<(), RadioError> {
        Ok(())
    }
}

/// Capability set of one transceiver family. The driver core is written once
/// against this trait; opcodes and registers stay inside the implementations.
pub trait ChipOps {
    /// Rate of the chip timer used for rx/tx/sleep timeouts
    const TICKS_PER_SECOND: u32;

    /// Whether an auxiliary scan subsystem may take over this chip
    fn supports_scan(&self) -> bool;
    /// Most recent command and status bytes seen on the bus
    fn bus_status(&self) -> BusStatus;
    /// Sample the interrupt line
    fn irq_line_asserted(&mut self) -> Result<bool, RadioError>;
    /// Oscillator startup time the chip adds to every wakeup, microseconds
    fn tcxo_startup_us(&self) -> u32 {
        0
    }

    /// Hardware reset through the reset line
    async fn reset(&mut self) -> Result<(), RadioError>;
    /// One-time chip setup after reset: regulator, oscillator, buffers, calibration
    async fn init(&mut self) -> Result<(), RadioError>;
    /// Wake the chip out of sleep and wait until it is ready
    async fn wakeup(&mut self) -> Result<(), RadioError>;
    /// Busy-wait using the bus delay provider
    async fn delay_us(&mut self, us: u32);
    /// Wait for the interrupt line
    async fn await_irq(&mut self) -> Result<(), RadioError>;
    /// Route the antenna
    async fn set_rf_switch(&mut self, path: RfPath) -> Result<(), RadioError>;
    /// Abort a long-running chip operation
    async fn abort(&mut self) -> Result<(), RadioError> {
        Err(RadioError::NotSupported)
    }

    /// Select the packet type for a modem
    async fn set_packet_type(&mut self, mode: ModemMode) -> Result<(), RadioError>;
    /// Arm the interrupt line for these bits; empty disables it
    async fn set_irq_mask(&mut self, mask: IrqFlags) -> Result<(), RadioError>;
    /// Read and clear the interrupt status register
    async fn get_and_clear_irq_status(&mut self) -> Result<IrqFlags, RadioError>;
    /// Clear the given interrupt bits
    async fn clear_irq_status(&mut self, mask: IrqFlags) -> Result<(), RadioError>;
    /// Read and clear the chip internal error register
    async fn get_and_clear_errors(&mut self) -> Result<u16, RadioError>;

    /// Enter standby on the RC or crystal oscillator
    async fn set_standby(&mut self, xosc: bool) -> Result<(), RadioError>;
    /// Enter sleep, retaining the configuration when `warm_start` is set
    async fn set_sleep(&mut self, warm_start: bool) -> Result<(), RadioError>;
    /// Calibrate the image rejection for the band containing `freq_hz`
    async fn calibrate_image(&mut self, freq_hz: u32) -> Result<(), RadioError>;
    /// Program the carrier frequency
    async fn set_rf_frequency(&mut self, freq_hz: u32) -> Result<(), RadioError>;
    /// Band-edge compensation applied before tuning into `freq_hz`
    async fn apply_band_edge_fix(&mut self, _freq_hz: u32) -> Result<(), RadioError> {
        Ok(())
    }

    /// Program the power amplifier
    async fn set_pa_config(&mut self, pa: &PaConfig) -> Result<(), RadioError>;
    /// Program output power and ramp time
    async fn set_tx_params(&mut self, power: i8, ramp_time: u8) -> Result<(), RadioError>;

    /// Start a transmission; zero ticks means no timeout
    async fn set_tx(&mut self, ticks: u32) -> Result<(), RadioError>;
    /// Start an unmodulated carrier
    async fn set_tx_cw(&mut self) -> Result<(), RadioError>;
    /// Start a reception; `0xFFFFFF` ticks means continuous
    async fn set_rx(&mut self, ticks: u32) -> Result<(), RadioError>;
    /// Start hardware rx/sleep alternation
    async fn set_rx_duty_cycle(&mut self, rx_ticks: u32, sleep_ticks: u32) -> Result<(), RadioError>;
    /// Start LoRa channel activity detection
    async fn set_cad(&mut self) -> Result<(), RadioError>;
    /// Program LoRa channel activity detection
    async fn set_lora_cad_params(&mut self, params: &LoraCadParams) -> Result<(), RadioError>;
    /// Whether the rx timeout stops at preamble detection instead of sync/header
    async fn stop_timer_on_preamble(&mut self, enable: bool) -> Result<(), RadioError>;

    /// Write into the chip data buffer
    async fn write_buffer(&mut self, offset: u8, data: &[u8]) -> Result<(), RadioError>;
    /// Read from the chip data buffer
    async fn read_buffer(&mut self, offset: u8, out: &mut [u8]) -> Result<(), RadioError>;
    /// Length and start offset of the last reception
    async fn get_rx_buffer_status(&mut self) -> Result<RxBufferStatus, RadioError>;
    /// Raw LoRa packet metrics
    async fn get_lora_packet_status(&mut self) -> Result<LoraPacketStatus, RadioError>;
    /// Raw FSK packet metrics
    async fn get_fsk_packet_status(&mut self) -> Result<FskPacketStatus, RadioError>;
    /// Whether the last LoRa header declared a payload CRC
    async fn lora_crc_in_header(&mut self) -> Result<bool, RadioError>;
    /// Number of FSK bytes received so far in the current packet
    async fn fsk_rx_fill_level(&mut self) -> Result<u8, RadioError>;
    /// Override the FSK payload length while a packet is being received
    async fn set_fsk_payload_length(&mut self, len: u8) -> Result<(), RadioError>;

    /// Instantaneous RSSI, dBm, not gain-corrected
    async fn rssi_inst(&mut self) -> Result<i16, RadioError>;
    /// Hardware random number
    async fn random(&mut self) -> Result<u32, RadioError>;

    /// Program LoRa modulation parameters
    async fn set_lora_modulation_params(&mut self, params: &LoraModulationParams) -> Result<(), RadioError>;
    /// Program LoRa packet parameters
    async fn set_lora_packet_params(&mut self, params: &LoraPacketParams) -> Result<(), RadioError>;
    /// Program the one-byte LoRa sync word
    async fn set_lora_sync_word(&mut self, sync_word: u8) -> Result<(), RadioError>;
    /// Number of symbols to wait for a LoRa preamble
    async fn set_lora_symbol_timeout(&mut self, symbols: u8) -> Result<(), RadioError>;
    /// Program FSK modulation parameters
    async fn set_fsk_modulation_params(&mut self, params: &FskModulationParams) -> Result<(), RadioError>;
    /// Program FSK packet parameters
    async fn set_fsk_packet_params(&mut self, params: &FskPacketParams) -> Result<(), RadioError>;
    /// Program the FSK sync word
    async fn set_fsk_sync_word(&mut self, sync_word: &[u8]) -> Result<(), RadioError>;
}

/// Receiver of the driver's semantic events
pub trait RadioListener {
    /// Called at most once per interrupt dispatch
    fn on_event(&mut self, event: RadioEvent);
    /// Called before the radio goes to sleep with the expected wake deadline
    fn on_sleep_start(&mut self, _wake_at_us: u64) {}
}

/// Monotonic time source
pub trait Clock {
    /// Microseconds since an arbitrary epoch
    fn now_us(&self) -> u64;
}
