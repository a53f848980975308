use super::DeviceSel;

/// Differences between the members of the SX126x family.
///
/// Implement this trait on your custom variant or use provided impls.
pub trait Sx126xVariant {
    /// Power amplifier wired to the antenna
    fn pa(&self) -> DeviceSel;

    /// DIO2 switches the antenna while transmitting
    fn dio2_drives_rf_switch(&self) -> bool {
        true
    }

    /// Over-current protection limit, in steps of 2.5 mA
    fn ocp_value(&self) -> u8 {
        match self.pa() {
            // 60 mA
            DeviceSel::LowPowerPA => 0x18,
            // 140 mA
            DeviceSel::HighPowerPA => 0x38,
        }
    }
}

/// SX1261, low power PA up to +15 dBm
#[derive(Clone, Copy, Debug, Default)]
pub struct Sx1261;

impl Sx126xVariant for Sx1261 {
    fn pa(&self) -> DeviceSel {
        DeviceSel::LowPowerPA
    }
}

/// SX1262, high power PA up to +22 dBm
#[derive(Clone, Copy, Debug, Default)]
pub struct Sx1262;

impl Sx126xVariant for Sx1262 {
    fn pa(&self) -> DeviceSel {
        DeviceSel::HighPowerPA
    }
}

/// Sub-GHz radio inside STM32WL parts. The antenna switch is driven by MCU
/// pins, never by DIO2.
#[derive(Clone, Copy, Debug, Default)]
pub struct Stm32wl {
    /// The board routes the high power PA output to the antenna
    pub high_power_pa: bool,
}

impl Sx126xVariant for Stm32wl {
    fn pa(&self) -> DeviceSel {
        if self.high_power_pa {
            DeviceSel::HighPowerPA
        } else {
            DeviceSel::LowPowerPA
        }
    }

    fn dio2_drives_rf_switch(&self) -> bool {
        false
    }
}
