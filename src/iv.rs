use embedded_hal::digital::{InputPin, OutputPin};
use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::digital::Wait;

use crate::mod_params::RadioError;
use crate::mod_params::RadioError::*;
use crate::mod_traits::InterfaceVariant;

// Reset line timing, milliseconds: settle, pulse width, release
const RESET_SETTLE_MS: u32 = 10;
const RESET_PULSE_MS: u32 = 20;

// Optional output line; `None` means not connected and is skipped
fn drive<P: OutputPin>(pin: &mut Option<P>, high: bool, err: RadioError) -> Result<(), RadioError> {
    match pin {
        Some(pin) if high => pin.set_high().map_err(|_| err),
        Some(pin) => pin.set_low().map_err(|_| err),
        None => Ok(()),
    }
}

/// [`InterfaceVariant`] for a board wiring reset, busy and one interrupt line
/// to the MCU, with optional antenna switch and external PA enable lines.
pub struct GenericInterfaceVariant<CTRL, WAIT> {
    reset: CTRL,
    irq: WAIT,
    busy: WAIT,
    rx_enable: Option<CTRL>,
    tx_enable: Option<CTRL>,
    ext_pa: Option<CTRL>,
}

impl<CTRL, WAIT> GenericInterfaceVariant<CTRL, WAIT>
where
    CTRL: OutputPin,
    WAIT: Wait + InputPin,
{
    /// Board lines; pass `None` for antenna switch lines that are not connected
    pub fn new(
        reset: CTRL,
        irq: WAIT,
        busy: WAIT,
        rx_enable: Option<CTRL>,
        tx_enable: Option<CTRL>,
    ) -> Result<Self, RadioError> {
        Ok(Self {
            reset,
            irq,
            busy,
            rx_enable,
            tx_enable,
            ext_pa: None,
        })
    }

    /// Line enabling the external PA, driven high for [`RfPath::TxExtPa`](crate::RfPath::TxExtPa)
    pub fn with_ext_pa(mut self, ext_pa: CTRL) -> Self {
        self.ext_pa = Some(ext_pa);
        self
    }
}

impl<CTRL, WAIT> InterfaceVariant for GenericInterfaceVariant<CTRL, WAIT>
where
    CTRL: OutputPin,
    WAIT: Wait + InputPin,
{
    async fn reset(&mut self, delay: &mut impl DelayNs) -> Result<(), RadioError> {
        delay.delay_ms(RESET_SETTLE_MS).await;
        self.reset.set_low().map_err(|_| Reset)?;
        delay.delay_ms(RESET_PULSE_MS).await;
        self.reset.set_high().map_err(|_| Reset)?;
        delay.delay_ms(RESET_SETTLE_MS).await;
        Ok(())
    }

    fn is_busy(&mut self) -> Result<bool, RadioError> {
        self.busy.is_high().map_err(|_| Busy)
    }

    fn irq_asserted(&mut self) -> Result<bool, RadioError> {
        self.irq.is_high().map_err(|_| Irq)
    }

    async fn await_irq(&mut self) -> Result<(), RadioError> {
        self.irq.wait_for_high().await.map_err(|_| Irq)
    }

    // Break before make: the opposite path is released first
    async fn enable_rf_switch_rx(&mut self) -> Result<(), RadioError> {
        drive(&mut self.tx_enable, false, RfSwitchTx)?;
        drive(&mut self.rx_enable, true, RfSwitchRx)
    }

    async fn enable_rf_switch_tx(&mut self) -> Result<(), RadioError> {
        drive(&mut self.rx_enable, false, RfSwitchRx)?;
        drive(&mut self.tx_enable, true, RfSwitchTx)
    }

    async fn disable_rf_switch(&mut self) -> Result<(), RadioError> {
        drive(&mut self.rx_enable, false, RfSwitchRx)?;
        drive(&mut self.tx_enable, false, RfSwitchTx)
    }

    async fn set_ext_pa(&mut self, enable: bool) -> Result<(), RadioError> {
        drive(&mut self.ext_pa, enable, RfSwitchTx)
    }
}
