//! Semtech LR1110/LR1120/LR1121 sub-GHz radio

pub(crate) mod radio_kind_params;
mod variant;

use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::spi::*;
pub use radio_kind_params::{RfSwitchConfig, TcxoCtrlVoltage};
use radio_kind_params::*;
pub use variant::*;

use crate::interface::{BusConfig, BusProtocol, SpiInterface};
use crate::lora::{coding_rate_value, low_data_rate_optimize, spreading_factor_value};
use crate::mod_params::*;
use crate::mod_traits::{ChipOps, InterfaceVariant};

// Time required for the TCXO to wakeup [ms].
const BRD_TCXO_WAKEUP_TIME: u32 = 10;

const BUSY_BUDGET: u32 = 40_000;

// Sleep time for SetSleep; the RTC never expires and the chip waits for the host
const SLEEP_FOREVER: u32 = 0xFFFF_FFFF;
const POLL_INTERVAL_US: u32 = 10;

/// Configuration for LR11xx-based boards
pub struct Config<C: Lr11xxVariant + Sized> {
    /// LoRa chip variant on this board
    pub chip: C,
    /// Board is using TCXO driven by VTCXO
    pub tcxo_ctrl: Option<TcxoCtrlVoltage>,
    /// Whether board is using the DCDC regulator instead of LDO
    pub use_dcdc: bool,
    /// Whether to boost receive
    pub rx_boost: bool,
}

/// LR11xx implementation of [`ChipOps`]
pub struct Lr11xx<SPI, IV, DLY, C: Lr11xxVariant + Sized> {
    intf: SpiInterface<SPI, IV, DLY>,
    config: Config<C>,
}

impl<SPI, IV, DLY, C> Lr11xx<SPI, IV, DLY, C>
where
    SPI: SpiDevice<u8>,
    IV: InterfaceVariant,
    DLY: DelayNs,
    C: Lr11xxVariant,
{
    /// Create the chip driver for a board
    pub fn new(spi: SPI, iv: IV, delay: DLY, config: Config<C>) -> Self {
        let bus = BusConfig {
            protocol: BusProtocol::TwoPhase,
            busy_budget: BUSY_BUDGET,
            wake_settle_us: config.chip.wake_settle_us(),
            poll_interval_us: POLL_INTERVAL_US,
        };
        let intf = SpiInterface::new(spi, iv, delay, bus);
        Self { intf, config }
    }

    async fn write_command(&mut self, cmd: &[u8]) -> Result<(), RadioError> {
        self.intf.write(cmd, false).await
    }

    async fn read_regmem32(&mut self, address: u32) -> Result<u32, RadioError> {
        let [op1, op2] = RegMemOpCode::ReadRegMem32.bytes();
        let [a1, a2, a3, a4] = address.to_be_bytes();
        let mut word = [0x00u8; 4];
        self.intf.read(&[op1, op2, a1, a2, a3, a4, 1], &mut word).await?;
        Ok(u32::from_be_bytes(word))
    }

    // register = (register & !mask) | (data & mask)
    async fn write_regmem32_mask(&mut self, address: u32, mask: u32, data: u32) -> Result<(), RadioError> {
        let [op1, op2] = RegMemOpCode::WriteRegMem32Mask.bytes();
        let [a1, a2, a3, a4] = address.to_be_bytes();
        let [m1, m2, m3, m4] = mask.to_be_bytes();
        let [d1, d2, d3, d4] = data.to_be_bytes();
        self.write_command(&[op1, op2, a1, a2, a3, a4, m1, m2, m3, m4, d1, d2, d3, d4])
            .await
    }

    async fn write_timed_command(&mut self, op_code: RadioOpCode, ticks: u32) -> Result<(), RadioError> {
        let [op1, op2] = op_code.bytes();
        let [_, t1, t2, t3] = ticks.to_be_bytes();
        self.write_command(&[op1, op2, t1, t2, t3]).await
    }

    async fn set_tcxo(&mut self, voltage: TcxoCtrlVoltage) -> Result<(), RadioError> {
        let timeout = convert_time_in_ms_to_rtc_step(BRD_TCXO_WAKEUP_TIME);
        let [op1, op2] = SystemOpCode::SetTcxoMode.bytes();
        let [_, t1, t2, t3] = timeout.to_be_bytes();
        self.write_command(&[op1, op2, voltage.value(), t1, t2, t3]).await?;

        // Re-run calibration now that chip knows it's running from TCXO
        let [op1, op2] = SystemOpCode::Calibrate.bytes();
        self.write_command(&[op1, op2, CalibrationParams::ALL.value()]).await?;

        let [op1, op2] = RadioOpCode::SetRxTxFallbackMode.bytes();
        self.write_command(&[op1, op2, FallbackMode::StandbyXosc.value()]).await
    }

    async fn set_dio_as_rf_switch(&mut self, rf_switch: &RfSwitchConfig) -> Result<(), RadioError> {
        let [op1, op2] = SystemOpCode::SetDioAsRfSwitch.bytes();
        self.write_command(&[
            op1,
            op2,
            rf_switch.enable,
            rf_switch.standby,
            rf_switch.rx,
            rf_switch.tx,
            rf_switch.tx_hp,
            rf_switch.tx_hf,
            rf_switch.gnss,
            rf_switch.wifi,
        ])
        .await
    }

    async fn get_errors(&mut self) -> Result<u16, RadioError> {
        let mut errors = [0x00u8; 2];
        self.intf.read(&SystemOpCode::GetErrors.bytes(), &mut errors).await?;
        Ok(u16::from_be_bytes(errors))
    }

    async fn clear_errors(&mut self) -> Result<(), RadioError> {
        self.write_command(&SystemOpCode::ClearErrors.bytes()).await
    }

    fn rssi_from_raw(raw: u8) -> i16 {
        -((raw as i16) >> 1)
    }
}

impl<SPI, IV, DLY, C> ChipOps for Lr11xx<SPI, IV, DLY, C>
where
    SPI: SpiDevice<u8>,
    IV: InterfaceVariant,
    DLY: DelayNs,
    C: Lr11xxVariant,
{
    const TICKS_PER_SECOND: u32 = 32_768;

    fn supports_scan(&self) -> bool {
        self.config.chip.supports_scan()
    }

    fn bus_status(&self) -> BusStatus {
        self.intf.status()
    }

    fn irq_line_asserted(&mut self) -> Result<bool, RadioError> {
        self.intf.iv.irq_asserted()
    }

    fn tcxo_startup_us(&self) -> u32 {
        match self.config.tcxo_ctrl {
            Some(_) => BRD_TCXO_WAKEUP_TIME * 1000,
            None => 0,
        }
    }

    async fn reset(&mut self) -> Result<(), RadioError> {
        self.intf.iv.reset(&mut self.intf.delay).await?;
        let boot_time_ms = self.config.chip.boot_time_ms();
        self.intf.delay.delay_ms(boot_time_ms).await;
        self.intf.after_reset();
        self.intf.wait_ready(BUSY_BUDGET).await
    }

    async fn init(&mut self) -> Result<(), RadioError> {
        if let Some(voltage) = self.config.tcxo_ctrl {
            self.set_tcxo(voltage).await?;
        }
        self.set_standby(false).await?;

        let reg_mode = if self.config.use_dcdc {
            RegulatorMode::Dcdc
        } else {
            RegulatorMode::Ldo
        };
        let [op1, op2] = SystemOpCode::SetRegMode.bytes();
        self.write_command(&[op1, op2, reg_mode.value()]).await?;

        if let Some(rf_switch) = self.config.chip.rf_switch_config() {
            self.set_dio_as_rf_switch(&rf_switch).await?;
        }

        let [op1, op2] = RadioOpCode::SetRxBoosted.bytes();
        self.write_command(&[op1, op2, self.config.rx_boost as u8]).await?;

        // Start from a clean slate, a TCXO start raises an error at power-on
        self.get_and_clear_irq_status().await?;
        let errors = self.get_and_clear_errors().await?;
        if errors != 0 {
            debug!("device errors after init: {=u16:#06x}", errors);
        }

        // Keep the antenna switch lines driven while asleep
        let [op1, op2] = SystemOpCode::DriveDioInSleepMode.bytes();
        self.write_command(&[op1, op2, 0x01]).await
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

    async fn abort(&mut self) -> Result<(), RadioError> {
        if !self.config.chip.supports_scan() {
            return Err(RadioError::NotSupported);
        }
        self.intf.abort().await
    }

    async fn set_packet_type(&mut self, mode: ModemMode) -> Result<(), RadioError> {
        let [op1, op2] = RadioOpCode::SetPktType.bytes();
        self.write_command(&[op1, op2, PacketType::from(mode).value()]).await
    }

    async fn set_irq_mask(&mut self, mask: IrqFlags) -> Result<(), RadioError> {
        let [op1, op2] = SystemOpCode::SetDioIrqParams.bytes();
        let [m1, m2, m3, m4] = irq_register_from_flags(mask).to_be_bytes();
        // everything on DIO9, DIO11 unused
        self.write_command(&[op1, op2, m1, m2, m3, m4, 0x00, 0x00, 0x00, 0x00])
            .await
    }

    async fn get_and_clear_irq_status(&mut self) -> Result<IrqFlags, RadioError> {
        // stat1, stat2, then the interrupt register
        let mut status = [0x00u8; 6];
        self.intf.direct_read(&mut status).await?;
        let irq = u32::from_be_bytes([status[2], status[3], status[4], status[5]]);
        if irq != 0 {
            let [op1, op2] = SystemOpCode::ClearIrq.bytes();
            self.write_command(&[op1, op2, status[2], status[3], status[4], status[5]])
                .await?;
        }
        Ok(irq_flags_from_register(irq))
    }

    async fn clear_irq_status(&mut self, mask: IrqFlags) -> Result<(), RadioError> {
        let [op1, op2] = SystemOpCode::ClearIrq.bytes();
        let [m1, m2, m3, m4] = irq_register_from_flags(mask).to_be_bytes();
        self.write_command(&[op1, op2, m1, m2, m3, m4]).await
    }

    async fn get_and_clear_errors(&mut self) -> Result<u16, RadioError> {
        let errors = self.get_errors().await?;
        self.clear_errors().await?;
        Ok(errors)
    }

    async fn set_standby(&mut self, xosc: bool) -> Result<(), RadioError> {
        let mode = if xosc { StandbyMode::Xosc } else { StandbyMode::Rc };
        let [op1, op2] = SystemOpCode::SetStandby.bytes();
        self.write_command(&[op1, op2, mode.value()]).await
    }

    async fn set_sleep(&mut self, warm_start: bool) -> Result<(), RadioError> {
        let sleep_params = SleepParams {
            warm_start,
            rtc_wakeup: true,
        };
        let [op1, op2] = SystemOpCode::SetSleep.bytes();
        let [t1, t2, t3, t4] = SLEEP_FOREVER.to_be_bytes();
        self.intf
            .write(&[op1, op2, sleep_params.value(), t1, t2, t3, t4], true)
            .await?;
        self.intf.delay.delay_ms(2).await;
        Ok(())
    }

    async fn calibrate_image(&mut self, freq_hz: u32) -> Result<(), RadioError> {
        let [op1, op2] = SystemOpCode::CalibrateImage.bytes();
        let [freq1, freq2] = image_calibration_values(freq_hz);
        self.write_command(&[op1, op2, freq1, freq2]).await
    }

    async fn set_rf_frequency(&mut self, freq_hz: u32) -> Result<(), RadioError> {
        debug!("channel = {}", freq_hz);
        let [op1, op2] = RadioOpCode::SetRfFrequency.bytes();
        let [f1, f2, f3, f4] = freq_hz.to_be_bytes();
        self.write_command(&[op1, op2, f1, f2, f3, f4]).await
    }

    #[cfg(feature = "lr11xx-txpwr-workaround")]
    async fn apply_band_edge_fix(&mut self, freq_hz: u32) -> Result<(), RadioError> {
        if !(902_000_000..=928_000_000).contains(&freq_hz) {
            return Ok(());
        }
        let value = if freq_hz <= BAND_EDGE_LIMIT_FREQ {
            BAND_EDGE_FIX_LO
        } else {
            BAND_EDGE_FIX_HI
        };
        self.write_regmem32_mask(BAND_EDGE_FIX_REG, BAND_EDGE_FIX_MASK, value)
            .await
    }

    async fn set_pa_config(&mut self, pa: &PaConfig) -> Result<(), RadioError> {
        let [op1, op2] = RadioOpCode::SetPaCfg.bytes();
        self.write_command(&[op1, op2, pa.device_sel, pa.pa_lut, pa.pa_duty_cycle, pa.hp_max])
            .await
    }

    async fn set_tx_params(&mut self, power: i8, ramp_time: u8) -> Result<(), RadioError> {
        let [op1, op2] = RadioOpCode::SetTxParams.bytes();
        self.write_command(&[op1, op2, power as u8, ramp_time]).await
    }

    async fn set_tx(&mut self, ticks: u32) -> Result<(), RadioError> {
        self.write_timed_command(RadioOpCode::SetTx, ticks).await
    }

    async fn set_tx_cw(&mut self) -> Result<(), RadioError> {
        self.write_command(&RadioOpCode::SetTxCw.bytes()).await
    }

    async fn set_rx(&mut self, ticks: u32) -> Result<(), RadioError> {
        self.write_timed_command(RadioOpCode::SetRx, ticks).await
    }

    async fn set_rx_duty_cycle(&mut self, rx_ticks: u32, sleep_ticks: u32) -> Result<(), RadioError> {
        let [op1, op2] = RadioOpCode::SetRxDutyCycle.bytes();
        let [_, r1, r2, r3] = rx_ticks.to_be_bytes();
        let [_, s1, s2, s3] = sleep_ticks.to_be_bytes();
        // mode 0: listen for a packet during the rx window
        self.write_command(&[op1, op2, r1, r2, r3, s1, s2, s3, 0x00]).await
    }

    async fn set_cad(&mut self) -> Result<(), RadioError> {
        self.write_command(&RadioOpCode::SetCad.bytes()).await
    }

    async fn set_lora_cad_params(&mut self, params: &LoraCadParams) -> Result<(), RadioError> {
        let [op1, op2] = RadioOpCode::SetCadParams.bytes();
        let [_, t1, t2, t3] = params.timeout.to_be_bytes();
        self.write_command(&[
            op1,
            op2,
            params.symbol_num,
            params.detect_peak,
            params.detect_min,
            cad_exit_value(params.exit_mode),
            t1,
            t2,
            t3,
        ])
        .await
    }

    async fn stop_timer_on_preamble(&mut self, enable: bool) -> Result<(), RadioError> {
        let [op1, op2] = RadioOpCode::StopTimeoutOnPreamble.bytes();
        self.write_command(&[op1, op2, enable as u8]).await
    }

    async fn write_buffer(&mut self, offset: u8, data: &[u8]) -> Result<(), RadioError> {
        // the tx buffer is always filled from its start
        if offset != 0 {
            return Err(RadioError::InvalidParams);
        }
        self.intf
            .write_with_payload(&RegMemOpCode::WriteBuffer8.bytes(), data, false)
            .await
    }

    async fn read_buffer(&mut self, offset: u8, out: &mut [u8]) -> Result<(), RadioError> {
        let len = u8::try_from(out.len()).map_err(|_| RadioError::NoMem)?;
        let [op1, op2] = RegMemOpCode::ReadBuffer8.bytes();
        self.intf.read(&[op1, op2, offset, len], out).await
    }

    async fn get_rx_buffer_status(&mut self) -> Result<RxBufferStatus, RadioError> {
        let mut rx_buffer_status = [0x00u8; 2];
        self.intf
            .read(&RadioOpCode::GetRxBufferStatus.bytes(), &mut rx_buffer_status)
            .await?;
        Ok(RxBufferStatus {
            payload_len: rx_buffer_status[0],
            start_offset: rx_buffer_status[1],
        })
    }

    async fn get_lora_packet_status(&mut self) -> Result<LoraPacketStatus, RadioError> {
        let mut pkt_status = [0x00u8; 3];
        self.intf
            .read(&RadioOpCode::GetPktStatus.bytes(), &mut pkt_status)
            .await?;
        Ok(LoraPacketStatus {
            rssi_pkt: Self::rssi_from_raw(pkt_status[0]),
            snr_pkt: (((pkt_status[1] as i8 as i16) + 2) >> 2) as i8,
            signal_rssi_pkt: Self::rssi_from_raw(pkt_status[2]),
        })
    }

    async fn get_fsk_packet_status(&mut self) -> Result<FskPacketStatus, RadioError> {
        // length, rssi at sync, average rssi, rx status
        let mut pkt_status = [0x00u8; 4];
        self.intf
            .read(&RadioOpCode::GetPktStatus.bytes(), &mut pkt_status)
            .await?;
        Ok(FskPacketStatus {
            rssi_sync: Self::rssi_from_raw(pkt_status[1]),
            rssi_avg: Self::rssi_from_raw(pkt_status[2]),
        })
    }

    async fn lora_crc_in_header(&mut self) -> Result<bool, RadioError> {
        let mut rx_info = [0x00u8; 2];
        self.intf
            .read(&RadioOpCode::GetLoRaRxInfo.bytes(), &mut rx_info)
            .await?;
        Ok(rx_info[0] & (1 << 4) != 0)
    }

    async fn fsk_rx_fill_level(&mut self) -> Result<u8, RadioError> {
        let value = self.read_regmem32(GFSK_RX_FILL_LEVEL_REG).await?;
        let level = (value & GFSK_RX_FILL_LEVEL_MASK) >> GFSK_RX_FILL_LEVEL_SHIFT;
        Ok(level.min(u8::MAX as u32) as u8)
    }

    async fn set_fsk_payload_length(&mut self, len: u8) -> Result<(), RadioError> {
        self.write_regmem32_mask(
            GFSK_PAYLOAD_LENGTH_REG,
            GFSK_PAYLOAD_LENGTH_MASK,
            (len as u32) << GFSK_PAYLOAD_LENGTH_SHIFT,
        )
        .await
    }

    async fn rssi_inst(&mut self) -> Result<i16, RadioError> {
        let mut rssi = [0x00u8];
        self.intf.read(&RadioOpCode::GetRssiInst.bytes(), &mut rssi).await?;
        Ok(Self::rssi_from_raw(rssi[0]))
    }

    async fn random(&mut self) -> Result<u32, RadioError> {
        let mut number = [0x00u8; 4];
        self.intf.read(&SystemOpCode::GetRandom.bytes(), &mut number).await?;
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
        let [op1, op2] = RadioOpCode::SetModulationParam.bytes();
        self.write_command(&[
            op1,
            op2,
            spreading_factor_val,
            bandwidth_val,
            coding_rate_val,
            ldro as u8,
        ])
        .await
    }

    async fn set_lora_packet_params(&mut self, params: &LoraPacketParams) -> Result<(), RadioError> {
        let [op1, op2] = RadioOpCode::SetPktParam.bytes();
        let [pbl_hi, pbl_lo] = params.preamble_length.to_be_bytes();
        self.write_command(&[
            op1,
            op2,
            pbl_hi,
            pbl_lo,
            params.implicit_header as u8,
            params.payload_length,
            params.crc_on as u8,
            params.invert_iq as u8,
        ])
        .await
    }

    async fn set_lora_sync_word(&mut self, sync_word: u8) -> Result<(), RadioError> {
        let [op1, op2] = RadioOpCode::SetLoRaSyncWord.bytes();
        self.write_command(&[op1, op2, sync_word]).await
    }

    async fn set_lora_symbol_timeout(&mut self, symbols: u8) -> Result<(), RadioError> {
        let [op1, op2] = RadioOpCode::SetLoRaSyncTimeout.bytes();
        self.write_command(&[op1, op2, symbols]).await
    }

    async fn set_fsk_modulation_params(&mut self, params: &FskModulationParams) -> Result<(), RadioError> {
        if params.bit_rate == 0 {
            return Err(RadioError::InvalidParams);
        }
        let [op1, op2] = RadioOpCode::SetModulationParam.bytes();
        let [br1, br2, br3, br4] = params.bit_rate.to_be_bytes();
        let [fd1, fd2, fd3, fd4] = params.freq_dev.to_be_bytes();
        self.write_command(&[
            op1,
            op2,
            br1,
            br2,
            br3,
            br4,
            params.pulse_shape as u8,
            params.bandwidth as u8,
            fd1,
            fd2,
            fd3,
            fd4,
        ])
        .await
    }

    async fn set_fsk_packet_params(&mut self, params: &FskPacketParams) -> Result<(), RadioError> {
        let [op1, op2] = RadioOpCode::SetPktParam.bytes();
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
        self.write_command(&[
            op1,
            op2,
            pbl_hi,
            pbl_lo,
            params.preamble_min_detect as u8,
            params.sync_word_length.saturating_mul(8),
            params.addr_comp as u8,
            header_type,
            params.payload_length,
            crc_type,
            params.whitening as u8,
        ])
        .await
    }

    async fn set_fsk_sync_word(&mut self, sync_word: &[u8]) -> Result<(), RadioError> {
        if sync_word.len() > GFSK_SYNC_WORD_LEN {
            return Err(RadioError::InvalidParams);
        }
        let [op1, op2] = RadioOpCode::SetGfskSyncWord.bytes();
        let mut word = [0x00u8; GFSK_SYNC_WORD_LEN];
        word[..sync_word.len()].copy_from_slice(sync_word);
        self.intf.write_with_payload(&[op1, op2], &word, false).await
    }
}
