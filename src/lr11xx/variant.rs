use super::RfSwitchConfig;

/// Differences between the members of the LR11xx family.
///
/// Implement this trait on your custom variant or use provided impls.
pub trait Lr11xxVariant {
    /// Whether the chip carries the GNSS/Wi-Fi scanner that may take the radio over
    fn supports_scan(&self) -> bool;

    /// Time from reset release until the chip accepts commands, milliseconds
    fn boot_time_ms(&self) -> u32;

    /// How long chip select is held low to wake the chip, microseconds
    fn wake_settle_us(&self) -> u32;

    /// DIO routing when the chip drives the antenna switch.
    /// `None` leaves switching to the board.
    fn rf_switch_config(&self) -> Option<RfSwitchConfig> {
        None
    }
}

/// LR1110, sub-GHz transceiver with GNSS and Wi-Fi scanning
/// driven by the host only
#[derive(Default)]
pub struct Lr1110 {
    /// Optional chip-driven antenna switch
    pub rf_switch: Option<RfSwitchConfig>,
}

impl Lr11xxVariant for Lr1110 {
    fn supports_scan(&self) -> bool {
        false
    }

    fn boot_time_ms(&self) -> u32 {
        185
    }

    fn wake_settle_us(&self) -> u32 {
        5
    }

    fn rf_switch_config(&self) -> Option<RfSwitchConfig> {
        self.rf_switch
    }
}

/// LR1120, adds the 2.4 GHz path and autonomous scanning
#[derive(Default)]
pub struct Lr1120 {
    /// Optional chip-driven antenna switch
    pub rf_switch: Option<RfSwitchConfig>,
}

impl Lr11xxVariant for Lr1120 {
    fn supports_scan(&self) -> bool {
        true
    }

    fn boot_time_ms(&self) -> u32 {
        40
    }

    fn wake_settle_us(&self) -> u32 {
        98
    }

    fn rf_switch_config(&self) -> Option<RfSwitchConfig> {
        self.rf_switch
    }
}

/// LR1121, LR1120 without the GNSS front end
#[derive(Default)]
pub struct Lr1121 {
    /// Optional chip-driven antenna switch
    pub rf_switch: Option<RfSwitchConfig>,
}

impl Lr11xxVariant for Lr1121 {
    fn supports_scan(&self) -> bool {
        true
    }

    fn boot_time_ms(&self) -> u32 {
        40
    }

    fn wake_settle_us(&self) -> u32 {
        98
    }

    fn rf_switch_config(&self) -> Option<RfSwitchConfig> {
        self.rf_switch
    }
}
