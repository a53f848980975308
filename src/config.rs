use crate::mod_params::*;

/// Regulatory limits of one region, indexed by data rate
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct RegionalParam {
    /// Region these limits apply to
    pub region: Region,
    /// Maximum conducted transmit power per data rate, dBm
    pub max_tx_power: [i8; DataRate::COUNT],
    /// Clear channel assessment threshold adjustment per data rate, dB
    pub cca_level_adjust: [i8; DataRate::COUNT],
    /// Antenna gain, dBi
    pub ant_dbi: i8,
}

impl RegionalParam {
    /// Maximum transmit power for a data rate
    pub fn max_tx_power(&self, data_rate: DataRate) -> i8 {
        self.max_tx_power[data_rate.index()]
    }

    /// CCA adjustment for a data rate
    pub fn cca_level_adjust(&self, data_rate: DataRate) -> i8 {
        self.cca_level_adjust[data_rate.index()]
    }
}

/// Resolve a PA configuration for a requested output power in dBm
pub type PaLookup = fn(i8) -> Option<PaConfig>;

/// Board and channel configuration, owned by the application and held by reference
pub struct DeviceConfig<'a> {
    /// Receive path gain subtracted from every RSSI reading, dB
    pub lna_gain: i16,
    /// Regional limits the radio may be switched between
    pub regional_params: &'a [RegionalParam],
    /// Region selected by `init`
    pub default_region: Region,
    /// Board PA lookup
    pub pa_lookup: PaLookup,
    /// Drive the external PA enable line on transmit
    pub enable_ext_pa: bool,
    /// Enter standby on the crystal oscillator instead of the RC oscillator
    pub standby_xosc: bool,
    /// Disarm chip interrupts before sleeping to avoid noise-induced wakeups
    pub disable_irq_in_sleep: bool,
    /// State transition timings
    pub state_timings: StateTimings,
    /// Timeout of the transmission started after a quiet FSK carrier sense,
    /// microseconds; zero disables the chip timer
    pub fsk_lbt_tx_timeout_us: u32,
    /// Timeout of the transmission started after a LoRa CAD found the
    /// channel free, microseconds
    pub lora_lbt_tx_timeout_us: u32,
}

impl<'a> DeviceConfig<'a> {
    pub(crate) fn regional_param(&self, region: Region) -> Option<&'a RegionalParam> {
        self.regional_params.iter().find(|p| p.region == region)
    }
}
