use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::spi::{Operation, SpiDevice};
use heapless::Vec;

use crate::mod_params::BusStatus;
use crate::mod_params::RadioError::{self, *};
use crate::mod_traits::InterfaceVariant;

/// Size of the shared command+payload scratch buffer
pub const BUS_SCRATCH_LEN: usize = 264;

// Busy polls granted to the transfer that follows an abort
const ABORT_BUSY_BUDGET: u32 = 1_000_000;

/// How the chip returns response data
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum BusProtocol {
    /// Response bytes are clocked out during the command transfer itself,
    /// right after the command bytes (SX126x).
    SingleShot,
    /// Command transfer, busy wait, then a second transfer whose first byte
    /// is a status byte (LR11xx).
    TwoPhase,
}

/// Bus handshake parameters of a chip family
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct BusConfig {
    /// Response framing
    pub protocol: BusProtocol,
    /// Number of busy-line polls before giving up
    pub busy_budget: u32,
    /// How long chip select stays asserted to wake the chip, microseconds
    pub wake_settle_us: u32,
    /// Delay between two busy-line polls, microseconds
    pub poll_interval_us: u32,
}

impl BusConfig {
    // Command status bits [3:1]
    fn command_status(stat1: u8) -> u8 {
        (stat1 & 0x0e) >> 1
    }

    fn is_failure(&self, stat1: u8) -> bool {
        match self.protocol {
            // timeout, processing error, execution error
            BusProtocol::SingleShot => matches!(Self::command_status(stat1), 3..=5),
            // CMD_OK and CMD_DAT both carry bit 2
            BusProtocol::TwoPhase => stat1 & 0x04 == 0,
        }
    }

    fn is_abort_ack(stat1: u8) -> bool {
        Self::command_status(stat1) == 4
    }
}

/// Command/response transactor honouring the chip's busy handshake.
///
/// Every transaction waits for the busy line, wakes the chip first if the
/// previous command put it to sleep, and records the status bytes the chip
/// echoed so a failed command is reported on the next exchange.
pub(crate) struct SpiInterface<SPI, IV, DLY> {
    pub(crate) spi: SPI,
    pub(crate) iv: IV,
    pub(crate) delay: DLY,
    config: BusConfig,
    scratch: Vec<u8, BUS_SCRATCH_LEN>,
    status: BusStatus,
    sleeping: bool,
    aborted: bool,
}

impl<SPI, IV, DLY> SpiInterface<SPI, IV, DLY>
where
    SPI: SpiDevice<u8>,
    IV: InterfaceVariant,
    DLY: DelayNs,
{
    pub fn new(spi: SPI, iv: IV, delay: DLY, config: BusConfig) -> Self {
        Self {
            spi,
            iv,
            delay,
            config,
            scratch: Vec::new(),
            status: BusStatus::default(),
            sleeping: false,
            aborted: false,
        }
    }

    pub fn status(&self) -> BusStatus {
        self.status
    }

    pub fn is_sleeping(&self) -> bool {
        self.sleeping
    }

    pub fn config(&self) -> &BusConfig {
        &self.config
    }

    // A hardware reset leaves the chip awake with nothing pending.
    pub fn after_reset(&mut self) {
        self.sleeping = false;
        self.aborted = false;
        self.status = BusStatus::default();
    }

    // Poll the busy line until it deasserts, at most `budget` times.
    pub async fn wait_ready(&mut self, budget: u32) -> Result<(), RadioError> {
        for _ in 0..budget {
            if !self.iv.is_busy()? {
                return Ok(());
            }
            self.delay.delay_us(self.config.poll_interval_us).await;
        }
        warn!("busy line still asserted after {} polls", budget);
        Err(Busy)
    }

    // Hold chip select for the settle time, then wait for the chip to boot its
    // digital core back up.
    pub async fn wakeup(&mut self) -> Result<(), RadioError> {
        let settle_ns = self.config.wake_settle_us.saturating_mul(1000);
        self.spi
            .transaction(&mut [Operation::DelayNs(settle_ns)])
            .await
            .map_err(|_| IoError)?;
        self.sleeping = false;
        trace!("wakeup");
        self.wait_ready(self.config.busy_budget).await
    }

    async fn prepare(&mut self) -> Result<(), RadioError> {
        if self.sleeping {
            self.wakeup().await
        } else {
            self.wait_ready(self.config.busy_budget).await
        }
    }

    fn opcode_of(&self, cmd: &[u8]) -> u16 {
        match (self.config.protocol, cmd) {
            (BusProtocol::SingleShot, [op, ..]) => *op as u16,
            (BusProtocol::TwoPhase, [hi, lo, ..]) => u16::from_be_bytes([*hi, *lo]),
            _ => 0,
        }
    }

    // Record the echoed status bytes. The status describes the command sent
    // before this one, so a failure is attributed to `last_command`.
    fn record_status(&mut self, cmd: &[u8]) {
        let stat1 = self.scratch.first().copied().unwrap_or(0);
        let stat2 = self.scratch.get(1).copied().unwrap_or(0);
        let mut failed_command = self.status.failed_command;

        if self.config.is_failure(stat1) && self.status.last_command != 0 {
            if self.aborted && BusConfig::is_abort_ack(stat1) {
                debug!("abort acknowledged by the chip");
            } else {
                warn!(
                    "command {=u16:#06x} failed: status {=u8:#04x} {=u8:#04x}",
                    self.status.last_command,
                    stat1,
                    stat2
                );
                failed_command = self.status.last_command;
            }
        }
        self.aborted = false;
        self.status = BusStatus {
            last_command: self.opcode_of(cmd),
            last_status1: stat1,
            last_status2: stat2,
            failed_command,
        };
    }

    async fn transfer_scratch(&mut self) -> Result<(), RadioError> {
        self.spi
            .transfer_in_place(&mut self.scratch[..])
            .await
            .map_err(|_| IoError)
    }

    // Write a command to the radio.
    pub async fn write(&mut self, cmd: &[u8], is_sleep_command: bool) -> Result<(), RadioError> {
        self.write_with_payload(cmd, &[], is_sleep_command).await
    }

    // Write a command followed by data in one transfer.
    pub async fn write_with_payload(
        &mut self,
        cmd: &[u8],
        payload: &[u8],
        is_sleep_command: bool,
    ) -> Result<(), RadioError> {
        if cmd.len() + payload.len() > BUS_SCRATCH_LEN {
            return Err(NoMem);
        }
        self.prepare().await?;

        self.scratch.clear();
        self.scratch.extend_from_slice(cmd).map_err(|_| NoMem)?;
        self.scratch.extend_from_slice(payload).map_err(|_| NoMem)?;
        self.transfer_scratch().await?;
        trace!("write: {=[u8]:02x} -> {=[u8]:02x}", cmd, payload);
        self.record_status(cmd);

        if is_sleep_command {
            self.sleeping = true;
        }
        Ok(())
    }

    // Issue a command and fill `out` with the response.
    pub async fn read(&mut self, cmd: &[u8], out: &mut [u8]) -> Result<(), RadioError> {
        match self.config.protocol {
            BusProtocol::SingleShot => {
                if cmd.len() + out.len() > BUS_SCRATCH_LEN {
                    return Err(NoMem);
                }
                self.prepare().await?;

                self.scratch.clear();
                self.scratch.extend_from_slice(cmd).map_err(|_| NoMem)?;
                self.scratch.resize(cmd.len() + out.len(), 0).map_err(|_| NoMem)?;
                self.transfer_scratch().await?;
                self.record_status(cmd);
                out.copy_from_slice(&self.scratch[cmd.len()..]);
            }
            BusProtocol::TwoPhase => {
                if cmd.len() > BUS_SCRATCH_LEN || out.len() + 1 > BUS_SCRATCH_LEN {
                    return Err(NoMem);
                }
                self.prepare().await?;

                self.scratch.clear();
                self.scratch.extend_from_slice(cmd).map_err(|_| NoMem)?;
                self.transfer_scratch().await?;
                self.record_status(cmd);

                self.wait_ready(self.config.busy_budget).await?;
                self.scratch.clear();
                self.scratch.resize(out.len() + 1, 0).map_err(|_| NoMem)?;
                self.transfer_scratch().await?;
                // leading byte is stat1
                out.copy_from_slice(&self.scratch[1..]);
            }
        }
        trace!("read: {=[u8]:02x} <- {=[u8]:02x}", cmd, out);
        Ok(())
    }

    // Read without a command phase. Leaves the status record untouched.
    pub async fn direct_read(&mut self, out: &mut [u8]) -> Result<(), RadioError> {
        self.prepare().await?;
        out.fill(0);
        self.spi.transfer_in_place(out).await.map_err(|_| IoError)?;
        trace!("direct_read: {=[u8]:02x}", out);
        Ok(())
    }

    // Interrupt a long-running chip operation. The busy line is ignored on
    // the way in since the chip is expected to be busy.
    pub async fn abort(&mut self) -> Result<(), RadioError> {
        let mut cmd = [0u8; 4];
        self.spi.transfer_in_place(&mut cmd).await.map_err(|_| IoError)?;
        self.wait_ready(ABORT_BUSY_BUDGET).await?;
        self.aborted = true;
        debug!("abort issued");
        Ok(())
    }
}
