use crate::config::{DeviceConfig, RegionalParam};
use crate::lora;
use crate::mod_params::RadioError::*;
use crate::mod_params::*;
use crate::mod_traits::{ChipOps, Clock, RadioListener};
use crate::state::StateCell;
use crate::timings::{us_to_ticks, TIMEOUT_CONTINUOUS};

// Settle time between switching the antenna off and entering standby
const STANDBY_DELAY_US: u32 = 10;
// Shortest listening window and spacing of RSSI samples during a clear channel check
const CHANNEL_FREE_SAMPLE_US: u32 = 30;
const CHANNEL_NOISE_SAMPLES: i32 = 32;

/// Image calibration bands. Retuning inside a band skips the calibration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
#[allow(missing_docs)]
pub enum FreqBand {
    Band430,
    Band460,
    Band770,
    Band850,
    Band900,
}

impl FreqBand {
    /// Band containing `freq_hz`, if the front end supports it
    pub fn of(freq_hz: u32) -> Option<Self> {
        match freq_hz {
            f if f > 900_000_000 => Some(FreqBand::Band900),
            f if f > 850_000_000 => Some(FreqBand::Band850),
            f if f > 770_000_000 => Some(FreqBand::Band770),
            f if f > 460_000_000 => Some(FreqBand::Band460),
            f if f > 430_000_000 => Some(FreqBand::Band430),
            _ => None,
        }
    }
}

fn is_awake(state: RadioState) -> bool {
    matches!(
        state,
        RadioState::Standby | RadioState::Rx | RadioState::Tx | RadioState::Cad | RadioState::RxDutyCycle
    )
}

/// Radio driver context: owns the chip, the state machine and the receive record.
///
/// Operations validate the current state, issue the chip commands and only
/// then commit the new state. While an auxiliary scan owns the radio every
/// operation except [`Radio::release_scan`] and [`Radio::abort_scan`] returns
/// [`RadioError::Busy`] without touching the bus.
pub struct Radio<'a, CO, L, CLK>
where
    CO: ChipOps,
    L: RadioListener,
    CLK: Clock,
{
    pub(crate) chip: CO,
    pub(crate) listener: L,
    pub(crate) clock: CLK,
    pub(crate) config: &'a DeviceConfig<'a>,
    pub(crate) state: StateCell,
    pub(crate) modem: ModemMode,
    pub(crate) irq_mask: IrqFlags,
    pub(crate) cad_exit_mode: CadExitMode,
    pub(crate) rx_packet: RxPacket,
    fsk_cad_params: Option<FskCadParams>,
    regional_param: Option<&'a RegionalParam>,
    pa: PaConfig,
    freq_hz: u32,
}

impl<'a, CO, L, CLK> Radio<'a, CO, L, CLK>
where
    CO: ChipOps,
    L: RadioListener,
    CLK: Clock,
{
    /// Wrap a chip; nothing is sent on the bus until [`Radio::init`]
    pub fn new(chip: CO, listener: L, clock: CLK, config: &'a DeviceConfig<'a>) -> Self {
        Self {
            chip,
            listener,
            clock,
            config,
            state: StateCell::new(RadioState::Unknown),
            modem: ModemMode::LoRa,
            irq_mask: IrqFlags::LORA_DEFAULT,
            cad_exit_mode: CadExitMode::None,
            rx_packet: RxPacket::new(),
            fsk_cad_params: None,
            regional_param: None,
            pa: PaConfig::default(),
            freq_hz: 0,
        }
    }

    /// Reset and configure the chip, select the default region and its
    /// maximum power, and arm the LoRa interrupt mask.
    pub async fn init(&mut self) -> Result<(), RadioError> {
        self.ensure_not_scanning()?;
        self.regional_param = self.config.regional_param(self.config.default_region);
        if self.regional_param.is_none() {
            warn!("no regional parameters for {}", self.config.default_region);
        }

        self.chip.set_rf_switch(RfPath::Off).await?;
        self.chip.reset().await?;
        self.modem = ModemMode::LoRa;
        self.irq_mask = IrqFlags::LORA_DEFAULT;
        self.cad_exit_mode = CadExitMode::None;
        self.state.set(RadioState::Unknown);

        self.standby().await?;
        self.chip.init().await.map_err(|_| HardwareError)?;
        self.chip.set_packet_type(self.modem).await?;

        if let Some(param) = self.regional_param {
            self.set_tx_power(param.max_tx_power(DataRate::Kbps50)).await?;
        }
        self.chip.set_irq_mask(self.irq_mask).await
    }

    /// Release the radio; the chip is left as is
    pub async fn deinit(&mut self) -> Result<(), RadioError> {
        Ok(())
    }

    /// Current state
    pub fn state(&self) -> RadioState {
        self.state.get()
    }

    /// Active modem
    pub fn modem_mode(&self) -> ModemMode {
        self.modem
    }

    /// Interrupt mask armed outside of interrupt processing
    pub fn irq_mask(&self) -> IrqFlags {
        self.irq_mask
    }

    /// Exit policy of the carrier sense or CAD cycle in progress
    pub fn cad_exit_mode(&self) -> CadExitMode {
        self.cad_exit_mode
    }

    /// Parameters of the last FSK carrier sense window
    pub fn fsk_cad_params(&self) -> Option<&FskCadParams> {
        self.fsk_cad_params.as_ref()
    }

    /// Record filled by the last `RxDone`
    pub fn rx_packet(&self) -> &RxPacket {
        &self.rx_packet
    }

    /// Power amplifier configuration currently programmed
    pub fn pa_config(&self) -> &PaConfig {
        &self.pa
    }

    /// Last command and status bytes seen on the bus
    pub fn bus_status(&self) -> BusStatus {
        self.chip.bus_status()
    }

    /// Access to the chip implementation
    pub fn chip(&mut self) -> &mut CO {
        &mut self.chip
    }

    /// Wait for the interrupt line; follow with [`Radio::process_irq`]
    pub async fn await_irq(&mut self) -> Result<(), RadioError> {
        self.chip.await_irq().await
    }

    fn ensure_not_scanning(&self) -> Result<(), RadioError> {
        if self.state.get() == RadioState::Scan {
            debug!("radio owned by scan");
            return Err(Busy);
        }
        Ok(())
    }

    // Guard an operation on the current state. No bus traffic happens before this.
    fn ensure_state(&self, allowed: impl Fn(RadioState) -> bool) -> Result<(), RadioError> {
        match self.state.get() {
            RadioState::Scan => Err(Busy),
            state if allowed(state) => Ok(()),
            state => {
                debug!("operation not allowed in {}", state);
                Err(InvalidState)
            }
        }
    }

    /// Select the modem and arm its default interrupt mask
    pub async fn set_modem_mode(&mut self, mode: ModemMode) -> Result<(), RadioError> {
        self.ensure_not_scanning()?;
        self.chip.set_packet_type(mode).await.map_err(|_| HardwareError)?;
        self.modem = mode;
        self.irq_mask = IrqFlags::default_for(mode);
        self.chip.set_irq_mask(self.irq_mask).await.map_err(|_| HardwareError)
    }

    /// Select the regional limits
    pub fn set_region(&mut self, region: Region) -> Result<(), RadioError> {
        self.ensure_not_scanning()?;
        self.regional_param = Some(self.config.regional_param(region).ok_or(NotSupported)?);
        Ok(())
    }

    /// Maximum transmit power of the selected region for a data rate
    pub fn max_tx_power(&self, data_rate: DataRate) -> Result<i8, RadioError> {
        self.regional_param
            .map(|p| p.max_tx_power(data_rate))
            .ok_or(NotSupported)
    }

    /// CCA threshold adjustment of the selected region for a data rate
    pub fn cca_level_adjust(&self, data_rate: DataRate) -> Result<i8, RadioError> {
        self.regional_param
            .map(|p| p.cca_level_adjust(data_rate))
            .ok_or(NotSupported)
    }

    /// Antenna gain of the selected region, dBi
    pub fn antenna_gain(&self) -> i8 {
        self.regional_param.map(|p| p.ant_dbi).unwrap_or(0)
    }

    /// Board state transition timings, with the oscillator startup of the chip
    pub fn state_transition_delays(&self) -> StateTimings {
        let mut timings = self.config.state_timings;
        let tcxo = self.chip.tcxo_startup_us();
        if tcxo != 0 {
            timings.tcxo_delay_us = tcxo;
        }
        timings
    }

    /// Enter standby from any state, waking the chip first if needed
    pub async fn standby(&mut self) -> Result<(), RadioError> {
        let from = match self.state.get() {
            RadioState::Scan => return Err(Busy),
            RadioState::Standby => return Ok(()),
            state => state,
        };

        if matches!(from, RadioState::Sleep | RadioState::Unknown) {
            if let Err(err) = self.chip.wakeup().await {
                warn!("wakeup failed: {}", err);
                self.state.set(RadioState::Unknown);
                return Err(HardwareError);
            }
            if from == RadioState::Sleep {
                if self.config.disable_irq_in_sleep {
                    self.chip.set_irq_mask(self.irq_mask).await.map_err(|_| HardwareError)?;
                }
                self.state.set(RadioState::Unknown);
            }
        }

        self.chip.clear_irq_status(IrqFlags::all()).await.map_err(|_| HardwareError)?;
        self.chip.set_rf_switch(RfPath::Off).await?;
        self.chip.delay_us(STANDBY_DELAY_US).await;
        self.chip
            .set_standby(self.config.standby_xosc)
            .await
            .map_err(|_| HardwareError)?;
        self.state.set(RadioState::Standby);
        Ok(())
    }

    /// Put the chip to sleep. `sleep_us` is the expected sleep time, used to
    /// tell the listener when the radio will be needed again.
    pub async fn sleep(&mut self, sleep_us: u32) -> Result<(), RadioError> {
        match self.state.get() {
            RadioState::Scan => return Err(Busy),
            RadioState::Sleep => return Ok(()),
            _ => {}
        }

        if sleep_us != 0 {
            self.listener
                .on_sleep_start(self.clock.now_us() + sleep_us as u64);
        }

        self.chip.clear_irq_status(IrqFlags::all()).await.map_err(|_| HardwareError)?;
        self.chip.set_rf_switch(RfPath::Off).await?;
        if self.config.disable_irq_in_sleep {
            self.chip.set_irq_mask(IrqFlags::empty()).await?;
        }
        if let Err(err) = self.chip.set_sleep(true).await {
            warn!("sleep command failed: {}", err);
            if self.config.disable_irq_in_sleep {
                self.chip.set_irq_mask(self.irq_mask).await?;
            }
            return Err(HardwareError);
        }
        self.state.set(RadioState::Sleep);
        Ok(())
    }

    /// Reserve the radio for another stack without touching the chip
    pub fn set_busy(&mut self) -> Result<(), RadioError> {
        match self
            .state
            .transition(|state| state == RadioState::Standby, RadioState::Busy)
        {
            Ok(_) => Ok(()),
            Err(RadioState::Scan) => Err(Busy),
            Err(_) => Err(InvalidState),
        }
    }

    /// Hand the radio to the scan subsystem. Only possible from standby with
    /// no interrupt pending.
    pub async fn hold_scan(&mut self) -> Result<(), RadioError> {
        if !self.chip.supports_scan() {
            return Err(NotSupported);
        }
        if self.chip.irq_line_asserted()? {
            warn!("hold scan: interrupt pending");
            return Err(Busy);
        }
        match self
            .state
            .transition(|state| state == RadioState::Standby, RadioState::Scan)
        {
            Ok(_) => {
                info!("radio held for scan");
                Ok(())
            }
            Err(state) => {
                warn!("hold scan: radio in {}", state);
                Err(InvalidState)
            }
        }
    }

    /// Take the radio back from the scan subsystem
    pub async fn release_scan(&mut self) -> Result<(), RadioError> {
        if self.state.get() != RadioState::Scan {
            warn!("release scan: radio not held");
            return Err(InvalidState);
        }
        let restored = self.restore_transceiver().await;
        self.state.set(RadioState::Standby);
        info!("radio released from scan");
        restored
    }

    /// Abort the long-running scan command in progress
    pub async fn abort_scan(&mut self) -> Result<(), RadioError> {
        if self.state.get() != RadioState::Scan {
            return Err(InvalidState);
        }
        self.chip.abort().await
    }

    // Packet type and interrupt mask may have been changed by the scan subsystem
    pub(crate) async fn restore_transceiver(&mut self) -> Result<(), RadioError> {
        let packet_type = self.chip.set_packet_type(self.modem).await;
        if let Err(err) = packet_type {
            error!("restoring packet type failed: {}", err);
        }
        let mask = self.chip.set_irq_mask(self.irq_mask).await;
        if let Err(err) = mask {
            error!("restoring interrupt mask failed: {}", err);
        }
        packet_type.and(mask)
    }

    /// Tune to `freq_hz`, calibrating the image first when the band changes
    pub async fn set_frequency(&mut self, freq_hz: u32) -> Result<(), RadioError> {
        self.ensure_state(|state| state == RadioState::Standby)?;
        let band = FreqBand::of(freq_hz).ok_or(InvalidParams)?;

        if FreqBand::of(self.freq_hz) != Some(band) {
            self.chip.calibrate_image(freq_hz).await.map_err(|_| HardwareError)?;
        }
        if self.modem == ModemMode::LoRa {
            self.chip.apply_band_edge_fix(freq_hz).await?;
        }
        self.chip.set_rf_frequency(freq_hz).await.map_err(|_| HardwareError)?;
        self.freq_hz = freq_hz;
        Ok(())
    }

    /// Resolve and program the PA for `power_dbm`
    pub async fn set_tx_power(&mut self, power_dbm: i8) -> Result<(), RadioError> {
        self.ensure_state(|state| state == RadioState::Standby)?;
        let mut pa = (self.config.pa_lookup)(power_dbm).ok_or(InvalidParams)?;
        pa.enable_ext_pa |= self.config.enable_ext_pa;

        self.chip.set_pa_config(&pa).await?;
        self.chip.set_tx_params(pa.tx_power, pa.ramp_time).await?;
        self.pa = pa;
        Ok(())
    }

    /// Copy the next frame into the chip buffer
    pub async fn set_tx_payload(&mut self, payload: &[u8]) -> Result<(), RadioError> {
        if payload.is_empty() {
            return Err(InvalidParams);
        }
        self.ensure_not_scanning()?;
        self.chip.write_buffer(0x00, payload).await
    }

    fn tx_path(&self) -> RfPath {
        if self.pa.enable_ext_pa {
            RfPath::TxExtPa
        } else {
            RfPath::Tx
        }
    }

    /// Transmit the buffered frame; a zero timeout disables the chip timer
    pub async fn start_tx(&mut self, timeout_us: u32) -> Result<(), RadioError> {
        self.ensure_state(is_awake)?;
        self.chip.set_rf_switch(self.tx_path()).await?;
        self.chip.clear_irq_status(IrqFlags::all()).await?;
        self.chip
            .set_tx(us_to_ticks(timeout_us, CO::TICKS_PER_SECOND))
            .await
            .map_err(|_| HardwareError)?;
        self.state.set(RadioState::Tx);
        Ok(())
    }

    /// Transmit an unmodulated carrier. An active receive, transmit or CAD
    /// is dropped to standby first so the radio can be retuned.
    pub async fn set_tx_continuous_wave(&mut self, freq_hz: u32, power_dbm: i8) -> Result<(), RadioError> {
        self.ensure_state(is_awake)?;
        if self.state.get() != RadioState::Standby {
            self.standby().await?;
        }
        self.set_frequency(freq_hz).await?;
        self.set_tx_power(power_dbm).await?;
        self.chip.set_rf_switch(self.tx_path()).await?;
        self.chip.clear_irq_status(IrqFlags::all()).await?;
        self.chip.set_tx_cw().await.map_err(|_| HardwareError)?;
        self.state.set(RadioState::Tx);
        Ok(())
    }

    async fn start_receiver(&mut self, ticks: u32) -> Result<(), RadioError> {
        // FSK keeps the timer running through the preamble until the sync word
        self.chip
            .stop_timer_on_preamble(self.modem == ModemMode::Fsk)
            .await
            .map_err(|_| HardwareError)?;
        self.chip.set_rf_switch(RfPath::Rx).await?;
        self.chip.clear_irq_status(IrqFlags::all()).await?;
        self.chip.set_rx(ticks).await.map_err(|_| HardwareError)?;
        self.state.set(RadioState::Rx);
        Ok(())
    }

    /// Receive a single packet within `timeout_us`
    pub async fn start_rx(&mut self, timeout_us: u32) -> Result<(), RadioError> {
        self.ensure_state(is_awake)?;
        self.start_receiver(us_to_ticks(timeout_us, CO::TICKS_PER_SECOND))
            .await
    }

    /// Receive until told otherwise
    pub async fn start_continuous_rx(&mut self) -> Result<(), RadioError> {
        self.ensure_state(is_awake)?;
        self.start_receiver(TIMEOUT_CONTINUOUS).await
    }

    /// Listen on an FSK channel for `cs_duration_us`. The interrupt handler
    /// concludes the window according to `exit_mode`.
    pub async fn start_carrier_sense(
        &mut self,
        params: &FskCadParams,
        exit_mode: CadExitMode,
    ) -> Result<(), RadioError> {
        self.ensure_state(is_awake)?;
        if self.modem != ModemMode::Fsk || exit_mode == CadExitMode::None {
            return Err(InvalidParams);
        }

        self.chip.stop_timer_on_preamble(true).await.map_err(|_| HardwareError)?;
        self.chip.set_rf_switch(RfPath::Rx).await?;
        self.chip.clear_irq_status(IrqFlags::all()).await?;
        self.irq_mask = IrqFlags::CARRIER_SENSE;
        self.chip.set_irq_mask(self.irq_mask).await?;
        self.chip
            .set_rx(us_to_ticks(params.cs_duration_us, CO::TICKS_PER_SECOND))
            .await
            .map_err(|_| HardwareError)?;

        self.fsk_cad_params = Some(*params);
        self.cad_exit_mode = exit_mode;
        self.state.set(RadioState::Rx);
        Ok(())
    }

    /// Alternate between receiving for `rx_us` and sleeping for `sleep_us`
    pub async fn start_rx_duty_cycle(&mut self, rx_us: u32, sleep_us: u32) -> Result<(), RadioError> {
        if rx_us == 0 || sleep_us == 0 {
            return Err(InvalidParams);
        }
        self.ensure_state(is_awake)?;
        self.chip.set_rf_switch(RfPath::Rx).await?;
        self.chip.clear_irq_status(IrqFlags::all()).await?;
        self.chip
            .set_rx_duty_cycle(
                us_to_ticks(rx_us, CO::TICKS_PER_SECOND),
                us_to_ticks(sleep_us, CO::TICKS_PER_SECOND),
            )
            .await
            .map_err(|_| HardwareError)?;
        self.state.set(RadioState::RxDutyCycle);
        Ok(())
    }

    /// Start a LoRa channel activity detection with the programmed CAD parameters
    pub async fn lora_start_cad(&mut self) -> Result<(), RadioError> {
        self.ensure_state(is_awake)?;
        if self.modem != ModemMode::LoRa {
            return Err(InvalidParams);
        }
        self.chip.set_rf_switch(RfPath::Rx).await?;
        self.chip.clear_irq_status(IrqFlags::all()).await?;
        self.chip.set_cad().await.map_err(|_| HardwareError)?;
        self.state.set(RadioState::Cad);
        Ok(())
    }

    /// Program the LoRa CAD and remember its exit policy
    pub async fn set_lora_cad_params(&mut self, params: &LoraCadParams) -> Result<(), RadioError> {
        self.ensure_not_scanning()?;
        if !matches!(
            params.exit_mode,
            CadExitMode::CsOnly | CadExitMode::CsRx | CadExitMode::CsLbt
        ) {
            return Err(InvalidParams);
        }
        self.chip
            .set_lora_cad_params(params)
            .await
            .map_err(|_| HardwareError)?;
        self.cad_exit_mode = params.exit_mode;
        Ok(())
    }

    /// Instantaneous RSSI, gain-corrected
    pub async fn rssi(&mut self) -> Result<i16, RadioError> {
        self.ensure_not_scanning()?;
        Ok(self.chip.rssi_inst().await? - self.config.lna_gain)
    }

    /// Listen on `freq_hz` for `delay_us` and report whether the RSSI stayed
    /// at or below `threshold`. The radio is back in standby afterwards.
    pub async fn is_channel_free(
        &mut self,
        freq_hz: u32,
        threshold: i16,
        delay_us: u32,
    ) -> Result<bool, RadioError> {
        self.set_frequency(freq_hz).await?;
        self.chip.set_irq_mask(IrqFlags::empty()).await?;

        let window_us = delay_us.max(CHANNEL_FREE_SAMPLE_US);
        let result = self.sample_channel_free(threshold, window_us).await;
        self.finish_measurement(result).await
    }

    async fn sample_channel_free(&mut self, threshold: i16, window_us: u32) -> Result<bool, RadioError> {
        self.start_continuous_rx().await?;
        let start = self.clock.now_us();
        for _ in 0..window_us.div_ceil(CHANNEL_FREE_SAMPLE_US) {
            self.chip.delay_us(CHANNEL_FREE_SAMPLE_US).await;
            if self.rssi().await? > threshold {
                return Ok(false);
            }
            if self.clock.now_us().saturating_sub(start) >= window_us as u64 {
                break;
            }
        }
        Ok(true)
    }

    /// Average RSSI on `freq_hz` over 32 samples. The radio is back in standby afterwards.
    pub async fn channel_noise(&mut self, freq_hz: u32) -> Result<i16, RadioError> {
        self.set_frequency(freq_hz).await?;
        self.chip.set_irq_mask(IrqFlags::empty()).await?;

        let result = self.sample_channel_noise().await;
        self.finish_measurement(result).await
    }

    async fn sample_channel_noise(&mut self) -> Result<i16, RadioError> {
        self.start_continuous_rx().await?;
        let mut sum: i32 = 0;
        for _ in 0..CHANNEL_NOISE_SAMPLES {
            self.chip.delay_us(CHANNEL_FREE_SAMPLE_US).await;
            sum += self.rssi().await? as i32;
        }
        Ok((sum / CHANNEL_NOISE_SAMPLES) as i16)
    }

    // Re-arm interrupts and return to standby; the measurement error wins.
    async fn finish_measurement<T>(&mut self, result: Result<T, RadioError>) -> Result<T, RadioError> {
        let armed = self.chip.set_irq_mask(self.irq_mask).await;
        let standby = self.standby().await;
        let value = result?;
        armed?;
        standby?;
        Ok(value)
    }

    /// Hardware random number, read with interrupts disarmed
    pub async fn random(&mut self) -> Result<u32, RadioError> {
        self.ensure_not_scanning()?;
        self.chip.set_irq_mask(IrqFlags::empty()).await?;
        let random = self.chip.random().await.map_err(|_| HardwareError);
        self.chip.set_irq_mask(self.irq_mask).await?;
        random
    }

    /// Program LoRa modulation parameters
    pub async fn set_lora_modulation_params(&mut self, params: &LoraModulationParams) -> Result<(), RadioError> {
        self.ensure_not_scanning()?;
        self.chip.set_lora_modulation_params(params).await
    }

    /// Program LoRa packet parameters
    pub async fn set_lora_packet_params(&mut self, params: &LoraPacketParams) -> Result<(), RadioError> {
        self.ensure_not_scanning()?;
        self.chip.set_lora_packet_params(params).await
    }

    /// Program the LoRa sync word from its two-byte network notation
    pub async fn set_lora_sync_word(&mut self, sync_word: u16) -> Result<(), RadioError> {
        self.ensure_not_scanning()?;
        self.chip
            .set_lora_sync_word(lora::sync_word_value(sync_word))
            .await
    }

    /// Number of symbols the receiver waits for a preamble
    pub async fn set_lora_symbol_timeout(&mut self, symbols: u8) -> Result<(), RadioError> {
        self.ensure_not_scanning()?;
        self.chip.set_lora_symbol_timeout(symbols).await
    }

    /// Program FSK modulation parameters
    pub async fn set_fsk_modulation_params(&mut self, params: &FskModulationParams) -> Result<(), RadioError> {
        self.ensure_not_scanning()?;
        self.chip.set_fsk_modulation_params(params).await
    }

    /// Program FSK packet parameters
    pub async fn set_fsk_packet_params(&mut self, params: &FskPacketParams) -> Result<(), RadioError> {
        self.ensure_not_scanning()?;
        self.chip.set_fsk_packet_params(params).await
    }

    /// Program the FSK sync word
    pub async fn set_fsk_sync_word(&mut self, sync_word: &[u8]) -> Result<(), RadioError> {
        self.ensure_not_scanning()?;
        self.chip.set_fsk_sync_word(sync_word).await
    }
}
