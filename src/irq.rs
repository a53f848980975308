use crate::fsk;
use crate::lora;
use crate::mod_params::*;
use crate::mod_traits::{ChipOps, Clock, RadioListener};
use crate::radio::Radio;

// Scan start commands whose failure hands the radio back
const GNSS_SCAN_COMMANDS: [u16; 2] = [0x0409, 0x040A];

impl<'a, CO, L, CLK> Radio<'a, CO, L, CLK>
where
    CO: ChipOps,
    L: RadioListener,
    CLK: Clock,
{
    /// Interrupt bottom half. Reads and clears the chip interrupt status,
    /// runs the packet finishers and delivers at most one event to the
    /// listener. The interrupt mask is re-armed unless the radio went to sleep.
    ///
    /// Nothing happens while a scan owns the radio; the scan subsystem forwards
    /// its own status through [`Radio::scan_irq`].
    pub async fn process_irq(&mut self) -> Result<(), RadioError> {
        if self.state.get() == RadioState::Scan {
            return Ok(());
        }

        let dispatched = self.dispatch_irq().await;
        if let Ok(Some(event)) = dispatched {
            trace!("radio event {}", event);
            self.listener.on_event(event);
        }

        let rearmed = if self.state.get() != RadioState::Sleep {
            self.chip.set_irq_mask(self.irq_mask).await
        } else {
            Ok(())
        };
        dispatched?;
        rearmed
    }

    async fn dispatch_irq(&mut self) -> Result<Option<RadioEvent>, RadioError> {
        self.chip.set_irq_mask(IrqFlags::empty()).await?;
        let irq = self.chip.get_and_clear_irq_status().await?;
        trace!("irq {}", irq);

        if irq.contains(IrqFlags::RX_DONE) {
            self.rx_packet.received_at_us = self.clock.now_us();
        }

        if irq.contains(IrqFlags::ERROR) {
            match self.chip.get_and_clear_errors().await {
                Ok(errors) => warn!("chip errors {=u16:#06x}", errors),
                Err(err) => warn!("chip errors unreadable: {}", err),
            }
        }

        if irq.contains(IrqFlags::TX_DONE) {
            return Ok(Some(RadioEvent::TxDone));
        }
        if irq.contains(IrqFlags::CRC_ERROR) {
            return Ok(Some(RadioEvent::RxError));
        }
        if irq.contains(IrqFlags::TIMEOUT) {
            if self.state.get() == RadioState::Tx {
                return Ok(Some(RadioEvent::TxTimeout));
            }
            let listen_before_talk = self.cad_exit_mode.is_listen_before_talk();
            self.end_cad_cycle();
            if listen_before_talk {
                return Ok(self.carrier_sense_timeout().await);
            }
            return Ok(Some(RadioEvent::RxTimeout));
        }
        if irq.contains(IrqFlags::HEADER_ERROR) {
            return Ok(Some(RadioEvent::RxTimeout));
        }

        match self.modem {
            ModemMode::LoRa => self.dispatch_lora(irq).await,
            ModemMode::Fsk => self.dispatch_fsk(irq).await,
        }
    }

    // The channel stayed quiet through a listen-before-talk window.
    #[cfg(feature = "diagnostics")]
    async fn carrier_sense_timeout(&mut self) -> Option<RadioEvent> {
        Some(RadioEvent::CsTimeout)
    }

    // The channel stayed quiet through a listen-before-talk window.
    #[cfg(not(feature = "diagnostics"))]
    async fn carrier_sense_timeout(&mut self) -> Option<RadioEvent> {
        let timeout_us = match self.modem {
            ModemMode::LoRa => self.config.lora_lbt_tx_timeout_us,
            ModemMode::Fsk => self.config.fsk_lbt_tx_timeout_us,
        };
        if let Err(err) = self.start_tx(timeout_us).await {
            warn!("transmit after carrier sense failed: {}", err);
        }
        None
    }

    // Drop the exit policy and the narrowed carrier sense mask
    fn end_cad_cycle(&mut self) {
        self.cad_exit_mode = CadExitMode::None;
        self.irq_mask = IrqFlags::default_for(self.modem);
    }

    // Preamble, sync word and header flags alone carry no LoRa event
    async fn dispatch_lora(&mut self, irq: IrqFlags) -> Result<Option<RadioEvent>, RadioError> {
        if irq.contains(IrqFlags::CAD_DONE) {
            let detected = irq.contains(IrqFlags::CAD_DETECTED);
            let listen_before_talk = self.cad_exit_mode.is_listen_before_talk();
            self.end_cad_cycle();
            if detected {
                return Ok(Some(RadioEvent::CadDone));
            }
            if listen_before_talk {
                return Ok(self.carrier_sense_timeout().await);
            }
            return Ok(Some(RadioEvent::CadTimeout));
        }

        if irq.contains(IrqFlags::RX_DONE) {
            return match lora::finish_rx(&mut self.chip, self.config.lna_gain, &mut self.rx_packet).await {
                Ok(()) => {
                    self.rx_packet.fsk_status = FskRxPacketStatus::default();
                    Ok(Some(RadioEvent::RxDone))
                }
                Err(err) => {
                    warn!("lora rx done processing failed: {}", err);
                    Ok(None)
                }
            };
        }

        Ok(None)
    }

    async fn dispatch_fsk(&mut self, irq: IrqFlags) -> Result<Option<RadioEvent>, RadioError> {
        if irq.contains(IrqFlags::SYNC_WORD_VALID) {
            if let Err(err) = fsk::process_sync_word(&mut self.chip, &mut self.rx_packet).await {
                warn!("fsk sync word processing failed: {}", err);
            }
            return Ok(None);
        }

        if irq.contains(IrqFlags::PREAMBLE_DETECTED) {
            let exit_mode = self.cad_exit_mode;
            match exit_mode {
                CadExitMode::None => return Ok(None),
                // keep receiving with the full mask
                CadExitMode::CsRx | CadExitMode::EdRx => {
                    self.end_cad_cycle();
                    return Ok(None);
                }
                _ => {}
            }
            match self.rssi().await {
                Ok(rssi) => self.rx_packet.fsk_status.rssi_sync = rssi,
                Err(err) => warn!("carrier sense rssi unreadable: {}", err),
            }
            self.end_cad_cycle();
            self.standby().await?;
            return Ok(Some(RadioEvent::CsDone));
        }

        if irq.contains(IrqFlags::RX_DONE) {
            return match fsk::finish_rx(&mut self.chip, self.config.lna_gain, &mut self.rx_packet).await {
                Ok(()) => {
                    self.rx_packet.lora_status = LoraRxPacketStatus::default();
                    Ok(Some(RadioEvent::RxDone))
                }
                Err((
                    RadioError::Generic,
                    FskRxDoneStatus::SwMarkNotPresent
                    | FskRxDoneStatus::UnknownError
                    | FskRxDoneStatus::BadCrc
                    | FskRxDoneStatus::InvalidLength,
                )) => Ok(Some(RadioEvent::RxError)),
                Err((err, status)) => {
                    warn!("fsk rx done processing failed: {} {}", err, status);
                    Ok(None)
                }
            };
        }

        Ok(None)
    }

    /// Interrupt status forwarded by the scan subsystem while it owns the
    /// radio. A finished scan leaves the radio reserved for the scan consumer;
    /// a rejected scan start hands it back in standby.
    pub async fn scan_irq(&mut self, irq: IrqFlags) -> Result<(), RadioError> {
        if self.state.get() != RadioState::Scan {
            return Err(RadioError::InvalidState);
        }

        if irq.intersects(IrqFlags::GNSS_SCAN_DONE | IrqFlags::WIFI_SCAN_DONE) {
            let restored = self.restore_transceiver().await;
            self.state.set(RadioState::Busy);
            return restored;
        }

        if irq.contains(IrqFlags::CMD_ERROR) {
            let last_command = self.chip.bus_status().last_command;
            if GNSS_SCAN_COMMANDS.contains(&last_command) {
                let restored = self.restore_transceiver().await;
                self.state.set(RadioState::Standby);
                return restored;
            }
        }

        warn!("unexpected scan interrupt {}", irq);
        Ok(())
    }
}
