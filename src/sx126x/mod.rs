//! Semtech SX1261/SX1262 and STM32WL sub-GHz radio

mod radio_kind_params;

use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::spi::*;
pub use radio_kind_params::TcxoCtrlVoltage;
use radio_kind_params::*;

use crate::interface::{BusConfig, BusProtocol, SpiInterface};
use crate::lora::{coding_rate_value, low_data_rate_optimize, spreading_factor_value};
use crate::mod_params::*;
use crate::mod_traits::{ChipOps, InterfaceVariant};
mod variant;
pub use variant::*;

/// Crystal trim written when no TCXO is fitted (XTA, XTB)
pub const DEFAULT_XTAL_TRIM: u16 = 0x1212;

// Retention list capacity of the chip
const RETENTION_SLOTS: usize = 4;

const XTAL_FREQ_HZ: u32 = 32_000_000;

// PLL step is XTAL / 2^25; keep 14 fractional bits while dividing
const PLL_STEP_SHIFT: u32 = 14;
const PLL_STEP_SCALED: u32 = XTAL_FREQ_HZ >> (25 - PLL_STEP_SHIFT);

const TCXO_STARTUP_MS: u32 = 10;

// Symbol counts from this value on need the sync timeout register as well
const SYMB_TIMEOUT_REGISTER_THRESHOLD: u8 = 64;

const RX_GAIN_POWER_SAVING: u8 = 0x94;
const RX_GAIN_BOOSTED: u8 = 0x96;

const BUSY_BUDGET: u32 = 2000;
const WAKE_SETTLE_US: u32 = 100;
const POLL_INTERVAL_US: u32 = 10;

#[cfg(feature = "sx1262-txpwr-workaround")]
const BAND_EDGE_LIMIT_FREQ: u32 = 903_000_000;
#[cfg(feature = "sx1262-txpwr-workaround")]
const BAND_EDGE_FREQ_LOW: u8 = 0x1F;
#[cfg(feature = "sx1262-txpwr-workaround")]
const BAND_EDGE_FREQ_HIGH: u8 = 0x18;

/// Power amplifier selection
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum DeviceSel {
    /// Low power PA, up to +15 dBm
    LowPowerPA = 1,
    /// High power PA, up to +22 dBm
    HighPowerPA = 0,
}

/// Configuration for SX126x-based boards
pub struct Config<C: Sx126xVariant + Sized> {
    /// LoRa chip variant on this board
    pub chip: C,
    /// TCXO supply voltage driven on DIO3; `None` for a crystal
    pub tcxo_ctrl: Option<TcxoCtrlVoltage>,
    /// Run from the DC-DC converter instead of the LDO
    pub use_dcdc: bool,
    /// Boosted receiver gain, about 2 mA more for 3 dB of sensitivity
    pub rx_boost: bool,
    /// Crystal trim capacitors, XTA in the high byte; ignored with a TCXO.
    /// [`DEFAULT_XTAL_TRIM`] matches the chip reset value.
    pub trim: u16,
}

/// SX126x implementation of [`ChipOps`]
pub struct Sx126x<SPI, IV, DLY, C: Sx126xVariant + Sized> {
    intf: SpiInterface<SPI, IV, DLY>,
    config: Config<C>,
}

impl<SPI, IV, DLY, C> Sx126x<SPI, IV, DLY, C>
where
    SPI: SpiDevice<u8>,
    IV: InterfaceVariant,
    DLY: DelayNs,
    C: Sx126xVariant,
{
    /// Create the chip driver for a board
    pub fn new(spi: SPI, iv: IV, delay: DLY, config: Config<C>) -> Self {
        let bus = BusConfig {
            protocol: BusProtocol::SingleShot,
            busy_budget: BUSY_BUDGET,
            wake_settle_us: WAKE_SETTLE_US,
            poll_interval_us: POLL_INTERVAL_US,
        };
        let intf = SpiInterface::new(spi, iv, delay, bus);
        Self { intf, config }
    }

    async fn read_register(&mut self, register: Register, out: &mut [u8]) -> Result<(), RadioError> {
        self.intf
            .read(
                &[OpCode::ReadRegister.value(), register.addr1(), register.addr2(), 0x00u8],
                out,
            )
            .await
    }

    async fn write_register(&mut self, register: Register, data: &[u8]) -> Result<(), RadioError> {
        self.intf
            .write_with_payload(
                &[OpCode::WriteRegister.value(), register.addr1(), register.addr2()],
                data,
                false,
            )
            .await
    }

    async fn read_register_u8(&mut self, register: Register) -> Result<u8, RadioError> {
        let mut value = [0x00u8];
        self.read_register(register, &mut value).await?;
        Ok(value[0])
    }

    // The list is a count byte followed by up to four big-endian addresses
    async fn retain_register(&mut self, register: Register) -> Result<(), RadioError> {
        let mut list = [0x00u8; 1 + 2 * RETENTION_SLOTS];
        self.read_register(Register::RetentionList, &mut list).await?;

        let count = (list[0] as usize).min(RETENTION_SLOTS);
        let addr = [register.addr1(), register.addr2()];
        if list[1..1 + 2 * count].chunks_exact(2).any(|entry| entry == addr.as_slice()) {
            return Ok(());
        }
        if count == RETENTION_SLOTS {
            return Err(RadioError::InvalidParams);
        }

        list[1 + 2 * count..3 + 2 * count].copy_from_slice(&addr);
        list[0] = count as u8 + 1;
        self.write_register(Register::RetentionList, &list).await
    }

    // Registers that must survive a warm start
    async fn update_retention_list(&mut self) -> Result<(), RadioError> {
        self.retain_register(Register::RxGain).await?;
        self.retain_register(Register::TxModulation).await
    }

    async fn set_tcxo(&mut self, voltage: TcxoCtrlVoltage) -> Result<(), RadioError> {
        // XOSC_START_ERR is always raised before the chip knows about the TCXO
        self.clear_device_errors().await?;

        // 15.625 us steps
        let [t1, t2, t3] = Self::be24(TCXO_STARTUP_MS << 6);
        let op_code_and_tcxo_control = [OpCode::SetTCXOMode.value(), voltage.value() & 0x07, t1, t2, t3];
        self.intf.write(&op_code_and_tcxo_control, false).await?;
        // calibration has to run again on the TCXO clock
        self.intf
            .write(&[OpCode::Calibrate.value(), CalibrationParams::ALL.value()], false)
            .await?;

        let errors = self.get_device_errors().await?;
        if errors != 0 {
            debug!("device errors after tcxo calibration: {=u16:#06x}", errors);
        }
        self.clear_device_errors().await
    }

    // Trim capacitors can only be written while running on the crystal
    async fn set_xtal_trim(&mut self, trim: u16) -> Result<(), RadioError> {
        self.intf
            .write(&[OpCode::SetStandby.value(), StandbyMode::XOSC.value()], false)
            .await?;
        self.write_register(Register::XTATrim, &trim.to_be_bytes()).await?;
        self.intf
            .write(&[OpCode::SetStandby.value(), StandbyMode::RC.value()], false)
            .await
    }

    async fn get_device_errors(&mut self) -> Result<u16, RadioError> {
        let mut errors = [0u8; 2];
        self.intf
            .read(&[OpCode::GetDeviceErrors.value(), 0x00u8], &mut errors)
            .await?;
        Ok(u16::from_be_bytes(errors))
    }

    async fn clear_device_errors(&mut self) -> Result<(), RadioError> {
        self.intf
            .write(&[OpCode::ClearDeviceErrors.value(), 0x00u8, 0x00u8], false)
            .await
    }

    async fn set_standby_mode(&mut self, mode: StandbyMode) -> Result<(), RadioError> {
        self.intf
            .write(&[OpCode::SetStandby.value(), mode.value()], false)
            .await
    }

    async fn write_timed_command(&mut self, op_code: OpCode, ticks: u32) -> Result<(), RadioError> {
        let [t1, t2, t3] = Self::be24(ticks);
        let cmd = [op_code.value(), t1, t2, t3];
        self.intf.write(&cmd, false).await
    }

    // Low three bytes, big endian
    fn be24(value: u32) -> [u8; 3] {
        let [_, b1, b2, b3] = value.to_be_bytes();
        [b1, b2, b3]
    }

    // Frequency in PLL steps, rounded to nearest, without 64-bit arithmetic
    fn pll_steps(freq_hz: u32) -> u32 {
        let whole = freq_hz / PLL_STEP_SCALED;
        let rest = freq_hz % PLL_STEP_SCALED;
        (whole << PLL_STEP_SHIFT) + (((rest << PLL_STEP_SHIFT) + (PLL_STEP_SCALED >> 1)) / PLL_STEP_SCALED)
    }

    fn rssi_from_raw(raw: u8) -> i16 {
        ((-(raw as i32)) >> 1) as i16
    }
}

impl<SPI, IV, DLY, C> ChipOps for Sx126x<SPI, IV, DLY, C>
where
    SPI: SpiDevice<u8>,
    IV: InterfaceVariant,
    DLY: DelayNs,
    C: Sx126xVariant,
{
    const TICKS_PER_SECOND: u32 = 64_000;

    fn supports_scan(&self) -> bool {
        false
    }

    fn bus_status(&self) -> BusStatus {
        self.intf.status()
    }

    fn irq_line_asserted(&mut self) -> Result<bool, RadioError> {
        self.intf.iv.irq_asserted()
    }

    fn tcxo_startup_us(&self) -> u32 {
        match self.config.tcxo_ctrl {
            Some(_) => TCXO_STARTUP_MS * 1000,
            None => 0,
        }
    }

    async fn reset(&mut self) -> Result<(), RadioError> {
        self.intf.iv.reset(&mut self.intf.delay).await?;
        self.intf.after_reset();
        self.intf.wait_ready(BUSY_BUDGET).await
    }

    async fn init(&mut self) -> Result<(), RadioError> {
        if self.config.chip.dio2_drives_rf_switch() {
            self.intf
                .write(&[OpCode::SetDIO2AsRfSwitchCtrl.value(), 0x01], false)
                .await?;
        }
        if self.config.use_dcdc {
            self.intf
                .write(
                    &[OpCode::SetRegulatorMode.value(), RegulatorMode::UseDCDC.value()],
                    false,
                )
                .await?;
        }
        self.intf
            .write(&[OpCode::SetBufferBaseAddress.value(), 0x00, 0x00], false)
            .await?;

        let rx_gain = if self.config.rx_boost {
            RX_GAIN_BOOSTED
        } else {
            RX_GAIN_POWER_SAVING
        };
        self.write_register(Register::RxGain, &[rx_gain]).await?;

        // trim capacitors only apply to a crystal
        match self.config.tcxo_ctrl {
            Some(voltage) => self.set_tcxo(voltage).await?,
            None => self.set_xtal_trim(self.config.trim).await?,
        }

        self.update_retention_list().await
    }

    async fn wakeup(&mut self) -> Result<(), RadioError> {
        self.intf.wakeup().await
    }

    async fn delay_us(&mut self, us: u32) {
        self.intf.delay.delay_us(us).await
    }

    async fn await_irq(&mut self) -> Result<(), RadioError> {
        self.intf.iv.await_irq().await
    }

    async fn set_rf_switch(&mut self, path: RfPath) -> Result<(), RadioError> {
        match path {
            RfPath::Off => {
                self.intf.iv.set_ext_pa(false).await?;
                self.intf.iv.disable_rf_switch().await
            }
            RfPath::Rx => self.intf.iv.enable_rf_switch_rx().await,
            RfPath::Tx => {
                self.intf.iv.set_ext_pa(false).await?;
                self.intf.iv.enable_rf_switch_tx().await
            }
            RfPath::TxExtPa => {
                self.intf.iv.set_ext_pa(true).await?;
                self.intf.iv.enable_rf_switch_tx().await
            }
        }
    }

    async fn set_packet_type(&mut self, mode: ModemMode) -> Result<(), RadioError> {
        self.intf
            .write(&[OpCode::SetPacketType.value(), PacketType::from(mode).value()], false)
            .await
    }

    async fn set_irq_mask(&mut self, mask: IrqFlags) -> Result<(), RadioError> {
        let [hi, lo] = irq_register_from_flags(mask).to_be_bytes();
        // everything on DIO1, DIO2 and DIO3 unused
        let op_code_and_masks = [OpCode::CfgDIOIrq.value(), hi, lo, hi, lo, 0x00, 0x00, 0x00, 0x00];
        self.intf.write(&op_code_and_masks, false).await
    }

    async fn get_and_clear_irq_status(&mut self) -> Result<IrqFlags, RadioError> {
        let mut irq_status = [0x00u8, 0x00u8];
        self.intf
            .read(&[OpCode::GetIrqStatus.value(), 0x00u8], &mut irq_status)
            .await?;
        let irq = u16::from_be_bytes(irq_status);
        if irq != 0 {
            self.intf
                .write(&[OpCode::ClrIrqStatus.value(), irq_status[0], irq_status[1]], false)
                .await?;
        }
        Ok(irq_flags_from_register(irq))
    }

    async fn clear_irq_status(&mut self, mask: IrqFlags) -> Result<(), RadioError> {
        let [hi, lo] = irq_register_from_flags(mask).to_be_bytes();
        self.intf.write(&[OpCode::ClrIrqStatus.value(), hi, lo], false).await
    }

    async fn get_and_clear_errors(&mut self) -> Result<u16, RadioError> {
        let errors = self.get_device_errors().await?;
        self.clear_device_errors().await?;
        Ok(errors)
    }

    async fn set_standby(&mut self, xosc: bool) -> Result<(), RadioError> {
        let mode = if xosc { StandbyMode::XOSC } else { StandbyMode::RC };
        self.set_standby_mode(mode).await
    }

    async fn set_sleep(&mut self, warm_start: bool) -> Result<(), RadioError> {
        let sleep_params = SleepParams {
            wakeup_rtc: false,
            reset: false,
            warm_start,
        };
        self.intf
            .write(&[OpCode::SetSleep.value(), sleep_params.value()], true)
            .await?;
        self.intf.delay.delay_ms(2).await;
        Ok(())
    }

    async fn calibrate_image(&mut self, freq_hz: u32) -> Result<(), RadioError> {
        let [freq1, freq2] = image_calibration_values(freq_hz);
        self.intf
            .write(&[OpCode::CalibrateImage.value(), freq1, freq2], false)
            .await
    }

    async fn set_rf_frequency(&mut self, freq_hz: u32) -> Result<(), RadioError> {
        debug!("channel = {}", freq_hz);
        let [f1, f2, f3, f4] = Self::pll_steps(freq_hz).to_be_bytes();
        self.intf
            .write(&[OpCode::SetRFFrequency.value(), f1, f2, f3, f4], false)
            .await
    }

    #[cfg(feature = "sx1262-txpwr-workaround")]
    async fn apply_band_edge_fix(&mut self, freq_hz: u32) -> Result<(), RadioError> {
        if crate::radio::FreqBand::of(freq_hz) != Some(crate::radio::FreqBand::Band900) {
            return Ok(());
        }
        let value = if freq_hz <= BAND_EDGE_LIMIT_FREQ {
            BAND_EDGE_FREQ_LOW
        } else {
            BAND_EDGE_FREQ_HIGH
        };
        self.write_register(Register::LrFreqCfg, &[value]).await
    }

    async fn set_pa_config(&mut self, pa: &PaConfig) -> Result<(), RadioError> {
        let op_code_and_pa_config = [
            OpCode::SetPAConfig.value(),
            pa.pa_duty_cycle,
            pa.hp_max,
            pa.device_sel,
            pa.pa_lut,
        ];
        self.intf.write(&op_code_and_pa_config, false).await?;
        let ocp = self.config.chip.ocp_value();
        self.write_register(Register::OCP, &[ocp]).await?;

        #[cfg(feature = "sx1262-txpwr-workaround")]
        {
            let ovp = self.read_register_u8(Register::Ovp).await?;
            self.write_register(Register::Ovp, &[ovp & 0xF9]).await?;
        }
        Ok(())
    }

    async fn set_tx_params(&mut self, power: i8, ramp_time: u8) -> Result<(), RadioError> {
        self.intf
            .write(&[OpCode::SetTxParams.value(), power as u8, ramp_time], false)
            .await
    }

    async fn set_tx(&mut self, ticks: u32) -> Result<(), RadioError> {
        self.write_timed_command(OpCode::SetTx, ticks).await
    }

    async fn set_tx_cw(&mut self) -> Result<(), RadioError> {
        self.intf.write(&[OpCode::SetTxContinuousWave.value()], false).await
    }

    async fn set_rx(&mut self, ticks: u32) -> Result<(), RadioError> {
        self.write_timed_command(OpCode::SetRx, ticks).await
    }

    async fn set_rx_duty_cycle(&mut self, rx_ticks: u32, sleep_ticks: u32) -> Result<(), RadioError> {
        let [rx1, rx2, rx3] = Self::be24(rx_ticks);
        let [sl1, sl2, sl3] = Self::be24(sleep_ticks);
        let op_code_and_timings = [
            OpCode::SetRxDutyCycle.value(),
            rx1,
            rx2,
            rx3,
            sl1,
            sl2,
            sl3,
        ];
        self.intf.write(&op_code_and_timings, false).await
    }

    async fn set_cad(&mut self) -> Result<(), RadioError> {
        self.intf.write(&[OpCode::SetCAD.value()], false).await
    }

    async fn set_lora_cad_params(&mut self, params: &LoraCadParams) -> Result<(), RadioError> {
        let [t1, t2, t3] = Self::be24(params.timeout);
        let op_code_and_cad_params = [
            OpCode::SetCADParams.value(),
            params.symbol_num,
            params.detect_peak,
            params.detect_min,
            cad_exit_value(params.exit_mode),
            t1,
            t2,
            t3,
        ];
        self.intf.write(&op_code_and_cad_params, false).await
    }

    async fn stop_timer_on_preamble(&mut self, enable: bool) -> Result<(), RadioError> {
        self.intf
            .write(&[OpCode::SetStopRxTimerOnPreamble.value(), enable as u8], false)
            .await
    }

    async fn write_buffer(&mut self, offset: u8, data: &[u8]) -> Result<(), RadioError> {
        self.intf
            .write_with_payload(&[OpCode::WriteBuffer.value(), offset], data, false)
            .await
    }

    async fn read_buffer(&mut self, offset: u8, out: &mut [u8]) -> Result<(), RadioError> {
        self.intf
            .read(&[OpCode::ReadBuffer.value(), offset, 0x00u8], out)
            .await
    }

    async fn get_rx_buffer_status(&mut self) -> Result<RxBufferStatus, RadioError> {
        let mut rx_buffer_status = [0x00u8; 2];
        self.intf
            .read(&[OpCode::GetRxBufferStatus.value(), 0x00u8], &mut rx_buffer_status)
            .await?;
        Ok(RxBufferStatus {
            payload_len: rx_buffer_status[0],
            start_offset: rx_buffer_status[1],
        })
    }

    async fn get_lora_packet_status(&mut self) -> Result<LoraPacketStatus, RadioError> {
        let mut pkt_status = [0x00u8; 3];
        self.intf
            .read(&[OpCode::GetPacketStatus.value(), 0x00u8], &mut pkt_status)
            .await?;
        Ok(LoraPacketStatus {
            rssi_pkt: Self::rssi_from_raw(pkt_status[0]),
            snr_pkt: (((pkt_status[1] as i8 as i16) + 2) >> 2) as i8,
            signal_rssi_pkt: Self::rssi_from_raw(pkt_status[2]),
        })
    }

    async fn get_fsk_packet_status(&mut self) -> Result<FskPacketStatus, RadioError> {
        // rx status, rssi at sync, average rssi
        let mut pkt_status = [0x00u8; 3];
        self.intf
            .read(&[OpCode::GetPacketStatus.value(), 0x00u8], &mut pkt_status)
            .await?;
        Ok(FskPacketStatus {
            rssi_sync: Self::rssi_from_raw(pkt_status[1]),
            rssi_avg: Self::rssi_from_raw(pkt_status[2]),
        })
    }

    async fn lora_crc_in_header(&mut self) -> Result<bool, RadioError> {
        let header_info = self.read_register_u8(Register::LoRaHeaderInfo).await?;
        Ok(header_info & (1 << 4) != 0)
    }

    async fn fsk_rx_fill_level(&mut self) -> Result<u8, RadioError> {
        self.read_register_u8(Register::RxAddrPointer).await
    }

    async fn set_fsk_payload_length(&mut self, len: u8) -> Result<(), RadioError> {
        self.write_register(Register::RxTxPayloadLength, &[len]).await
    }

    async fn rssi_inst(&mut self) -> Result<i16, RadioError> {
        let mut rssi = [0x00u8];
        self.intf
            .read(&[OpCode::GetRSSIInst.value(), 0x00u8], &mut rssi)
            .await?;
        Ok(Self::rssi_from_raw(rssi[0]))
    }

    async fn random(&mut self) -> Result<u32, RadioError> {
        // Noise from the receiver front end with the LNA and mixer detached
        let ana_lna = self.read_register_u8(Register::AnaLNA).await?;
        self.write_register(Register::AnaLNA, &[ana_lna & !(1 << 0)]).await?;
        let ana_mixer = self.read_register_u8(Register::AnaMixer).await?;
        self.write_register(Register::AnaMixer, &[ana_mixer & !(1 << 7)]).await?;

        self.write_timed_command(OpCode::SetRx, crate::timings::TIMEOUT_CONTINUOUS)
            .await?;
        let mut number = [0x00u8; 4];
        self.read_register(Register::GeneratedRandomNumber, &mut number).await?;
        self.set_standby_mode(StandbyMode::RC).await?;

        self.write_register(Register::AnaLNA, &[ana_lna]).await?;
        self.write_register(Register::AnaMixer, &[ana_mixer]).await?;
        Ok(u32::from_be_bytes(number))
    }

    async fn set_lora_modulation_params(&mut self, params: &LoraModulationParams) -> Result<(), RadioError> {
        let spreading_factor_val = spreading_factor_value(&params.spreading_factor);
        let bandwidth_val = bandwidth_value(&params.bandwidth)?;
        let coding_rate_val = coding_rate_value(&params.coding_rate, params.long_interleaver)?;
        let ldro = low_data_rate_optimize(&params.spreading_factor, &params.bandwidth);
        debug!(
            "sf = {}, bw = {}, cr = {}",
            spreading_factor_val, bandwidth_val, coding_rate_val
        );
        let op_code_and_mod_params = [
            OpCode::SetModulationParams.value(),
            spreading_factor_val,
            bandwidth_val,
            coding_rate_val,
            ldro as u8,
        ];
        self.intf.write(&op_code_and_mod_params, false).await?;

        // modulation quality erratum: bit 2 of TxModulation is cleared only at 500 kHz
        let tx_mod = self.read_register_u8(Register::TxModulation).await?;
        let tx_mod = if matches!(params.bandwidth, Bandwidth::_500KHz) {
            tx_mod & !(1 << 2)
        } else {
            tx_mod | (1 << 2)
        };
        self.write_register(Register::TxModulation, &[tx_mod]).await
    }

    async fn set_lora_packet_params(&mut self, params: &LoraPacketParams) -> Result<(), RadioError> {
        let [pbl_hi, pbl_lo] = params.preamble_length.to_be_bytes();
        let op_code_and_pkt_params = [
            OpCode::SetPacketParams.value(),
            pbl_hi,
            pbl_lo,
            params.implicit_header as u8,
            params.payload_length,
            params.crc_on as u8,
            params.invert_iq as u8,
        ];
        self.intf.write(&op_code_and_pkt_params, false).await?;

        // IQ polarity erratum: bit 2 of IqPolarity set only for standard IQ
        let iq_polarity = self.read_register_u8(Register::IQPolarity).await?;
        let reg = if params.invert_iq {
            iq_polarity & !(1 << 2)
        } else {
            iq_polarity | (1 << 2)
        };
        self.write_register(Register::IQPolarity, &[reg]).await
    }

    async fn set_lora_sync_word(&mut self, sync_word: u8) -> Result<(), RadioError> {
        // one nibble of the sync word in the upper half of each register byte
        let mut word = [0x00u8; 2];
        self.read_register(Register::LoRaSyncword, &mut word).await?;
        word[0] = (word[0] & 0x0F) | (sync_word & 0xF0);
        word[1] = (word[1] & 0x0F) | ((sync_word & 0x0F) << 4);
        self.write_register(Register::LoRaSyncword, &word).await
    }

    async fn set_lora_symbol_timeout(&mut self, symbols: u8) -> Result<(), RadioError> {
        self.intf
            .write(&[OpCode::SetLoRaSymbTimeout.value(), symbols], false)
            .await?;

        if symbols >= SYMB_TIMEOUT_REGISTER_THRESHOLD {
            let mut mant = symbols >> 1;
            let mut exp = 0u8;
            while mant > 31 {
                mant >>= 2;
                exp += 1;
            }
            self.write_register(Register::SynchTimeout, &[exp + (mant << 3)])
                .await?;
        }
        Ok(())
    }

    async fn set_fsk_modulation_params(&mut self, params: &FskModulationParams) -> Result<(), RadioError> {
        if params.bit_rate == 0 {
            return Err(RadioError::InvalidParams);
        }
        let [br1, br2, br3] = Self::be24((32 * XTAL_FREQ_HZ) / params.bit_rate);
        let [fd1, fd2, fd3] = Self::be24(Self::pll_steps(params.freq_dev));
        let op_code_and_mod_params = [
            OpCode::SetModulationParams.value(),
            br1,
            br2,
            br3,
            params.pulse_shape as u8,
            params.bandwidth as u8,
            fd1,
            fd2,
            fd3,
        ];
        self.intf.write(&op_code_and_mod_params, false).await
    }

    async fn set_fsk_packet_params(&mut self, params: &FskPacketParams) -> Result<(), RadioError> {
        let [pbl_hi, pbl_lo] = params.preamble_length.saturating_mul(8).to_be_bytes();
        let header_type = if params.variable_length {
            GFSK_HEADER_VARIABLE
        } else {
            GFSK_HEADER_FIXED
        };
        let crc_type = if params.crc_on {
            GFSK_CRC_2_BYTES_INV
        } else {
            GFSK_CRC_OFF
        };
        let op_code_and_pkt_params = [
            OpCode::SetPacketParams.value(),
            pbl_hi,
            pbl_lo,
            params.preamble_min_detect as u8,
            params.sync_word_length.saturating_mul(8),
            params.addr_comp as u8,
            header_type,
            params.payload_length,
            crc_type,
            params.whitening as u8,
        ];
        self.intf.write(&op_code_and_pkt_params, false).await
    }

    async fn set_fsk_sync_word(&mut self, sync_word: &[u8]) -> Result<(), RadioError> {
        if sync_word.len() > GFSK_SYNC_WORD_MAX_LEN {
            return Err(RadioError::InvalidParams);
        }
        let mut word = [0x00u8; GFSK_SYNC_WORD_MAX_LEN];
        word[..sync_word.len()].copy_from_slice(sync_word);
        self.write_register(Register::Syncword, &word).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::fixtures::*;

    type TestChip = Sx126x<TestFixture, DummyVariant, Delayer, Sx1262>;

    fn chip(responses: &[&[u8]]) -> TestChip {
        let config = Config {
            chip: Sx1262,
            tcxo_ctrl: None,
            use_dcdc: true,
            rx_boost: false,
            trim: DEFAULT_XTAL_TRIM,
        };
        Sx126x::new(TestFixture::with_responses(responses), DummyVariant::default(), Delayer::default(), config)
    }

    fn transfers(chip: &TestChip) -> Vec<Vec<u8>> {
        chip.intf.spi.transfers()
    }

    #[test]
    fn pll_steps() {
        assert_eq!(TestChip::pll_steps(915_000_000), 959_447_040);
        assert_eq!(TestChip::pll_steps(868_000_000), 910_163_968);
    }

    #[test]
    fn irq_register_translation() {
        let flags = IrqFlags::TX_DONE | IrqFlags::CAD_DETECTED | IrqFlags::TIMEOUT;
        assert_eq!(irq_register_from_flags(flags), 0x0301);
        assert_eq!(irq_flags_from_register(0x0242), IrqFlags::RX_DONE | IrqFlags::CRC_ERROR | IrqFlags::TIMEOUT);
        assert_eq!(irq_register_from_flags(IrqFlags::ERROR), 0);
    }

    #[tokio::test]
    async fn frequency_command() {
        let mut chip = chip(&[]);
        chip.set_rf_frequency(915_000_000).await.unwrap();
        assert_eq!(transfers(&chip), vec![vec![0x86, 0x39, 0x30, 0x00, 0x00]]);
    }

    #[tokio::test]
    async fn irq_status_is_cleared_only_when_set() {
        let mut chip = chip(&[&[0xA2, 0xA2, 0x00, 0x00]]);
        assert_eq!(chip.get_and_clear_irq_status().await.unwrap(), IrqFlags::empty());
        assert_eq!(transfers(&chip).len(), 1);

        let mut chip = self::chip(&[&[0xA2, 0xA2, 0x00, 0x02]]);
        assert_eq!(chip.get_and_clear_irq_status().await.unwrap(), IrqFlags::RX_DONE);
        assert_eq!(
            transfers(&chip),
            vec![vec![0x12, 0x00, 0x00, 0x00], vec![0x02, 0x00, 0x02]]
        );
    }

    #[tokio::test]
    async fn lora_packet_status_decoding() {
        // rssi 0x50 -> -40, snr -20/4 -> -5, signal 0x60 -> -48
        let mut chip = chip(&[&[0xA2, 0xA2, 0x50, 0xEC, 0x60]]);
        let status = chip.get_lora_packet_status().await.unwrap();
        assert_eq!(
            status,
            LoraPacketStatus {
                rssi_pkt: -40,
                snr_pkt: -5,
                signal_rssi_pkt: -48,
            }
        );
    }

    #[tokio::test]
    async fn lora_sync_word_keeps_low_nibbles() {
        let mut chip = chip(&[&[0xA2, 0xA2, 0xA2, 0xA2, 0x0A, 0x0B]]);
        chip.set_lora_sync_word(0x34).await.unwrap();
        assert_eq!(transfers(&chip)[1], vec![0x0D, 0x07, 0x40, 0x3A, 0x4B]);
    }

    #[tokio::test]
    async fn short_symbol_timeout_skips_register() {
        let mut chip = chip(&[]);
        chip.set_lora_symbol_timeout(8).await.unwrap();
        assert_eq!(transfers(&chip), vec![vec![0xA0, 8]]);
    }

    #[tokio::test]
    async fn long_symbol_timeout_programs_register() {
        let mut chip = chip(&[]);
        chip.set_lora_symbol_timeout(200).await.unwrap();
        // mant 100 -> 25 with exp 1
        assert_eq!(
            transfers(&chip),
            vec![vec![0xA0, 200], vec![0x0D, 0x07, 0x06, 1 + (25 << 3)]]
        );
    }

    #[tokio::test]
    async fn inverted_iq_clears_polarity_bit() {
        let params = LoraPacketParams {
            preamble_length: 8,
            implicit_header: false,
            payload_length: 12,
            crc_on: true,
            invert_iq: true,
        };
        let mut chip = chip(&[&[0xA2], &[0xA2, 0xA2, 0xA2, 0xA2, 0x0D]]);
        chip.set_lora_packet_params(&params).await.unwrap();
        let sent = transfers(&chip);
        assert_eq!(sent[0], vec![0x8C, 0x00, 0x08, 0x00, 12, 0x01, 0x01]);
        assert_eq!(sent[2], vec![0x0D, 0x07, 0x36, 0x09]);
    }

    #[tokio::test]
    async fn pa_config_writes_ocp() {
        let pa = PaConfig {
            target_power_dbm: 22,
            tx_power: 22,
            ramp_time: 0x04,
            pa_duty_cycle: 0x04,
            hp_max: 0x07,
            device_sel: 0x00,
            pa_lut: 0x01,
            enable_ext_pa: false,
        };
        let mut chip = chip(&[]);
        chip.set_pa_config(&pa).await.unwrap();
        let sent = transfers(&chip);
        assert_eq!(sent[0], vec![0x95, 0x04, 0x07, 0x00, 0x01]);
        assert_eq!(sent[1], vec![0x0D, 0x08, 0xE7, 0x38]);
    }

    #[tokio::test]
    async fn fsk_sync_word_is_padded() {
        let mut chip = chip(&[]);
        chip.set_fsk_sync_word(&[0x55, 0x90, 0x4E]).await.unwrap();
        assert_eq!(
            transfers(&chip),
            vec![vec![0x0D, 0x06, 0xC0, 0x55, 0x90, 0x4E, 0, 0, 0, 0, 0]]
        );
        assert_eq!(chip.set_fsk_sync_word(&[0u8; 9]).await, Err(RadioError::InvalidParams));
    }

    #[tokio::test]
    async fn external_pa_path_drives_bypass_line() {
        let mut chip = chip(&[]);
        chip.set_rf_switch(RfPath::TxExtPa).await.unwrap();
        chip.set_rf_switch(RfPath::Off).await.unwrap();
        assert_eq!(chip.intf.iv.ext_pa, vec![true, false]);
        assert_eq!(chip.intf.iv.rf_switch, vec![RfPath::Tx, RfPath::Off]);
        assert!(transfers(&chip).is_empty());
    }

    #[tokio::test]
    async fn sleep_marks_bus_asleep() {
        let mut chip = chip(&[]);
        chip.set_sleep(true).await.unwrap();
        assert_eq!(transfers(&chip), vec![vec![0x84, 0x04]]);
        assert!(chip.intf.is_sleeping());
    }
}
