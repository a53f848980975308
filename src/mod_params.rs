use bitflags::bitflags;
pub use lora_modulation::{Bandwidth, CodingRate, SpreadingFactor};

/// Maximum number of payload bytes a receive record can hold
pub const RX_PAYLOAD_MAX_SIZE: usize = 255;

/// Errors reported by the radio driver
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum RadioError {
    /// Operation not available on this chip or build
    NotSupported,
    /// An argument is out of range or inconsistent with the current modem
    InvalidParams,
    /// The bus transfer itself failed
    IoError,
    /// The busy line never deasserted, or the radio is owned by a scan
    Busy,
    /// A buffer is too small for the requested transfer
    NoMem,
    /// The chip rejected or failed a command sequence
    HardwareError,
    /// The operation is illegal in the current radio state
    InvalidState,
    /// Post-hoc packet validation failed
    Generic,
    /// Reset pin could not be driven
    Reset,
    /// Interrupt line could not be read or awaited
    Irq,
    /// Receive antenna switch pin could not be driven
    RfSwitchRx,
    /// Transmit antenna switch pin could not be driven
    RfSwitchTx,
}

/// Operating state of the transceiver as tracked by the driver
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum RadioState {
    /// After reset, before the first confirmed transition
    Unknown,
    /// Idle, ready to accept configuration
    Standby,
    /// Lowest-power retaining state
    Sleep,
    /// Receiving (single, continuous or carrier sense)
    Rx,
    /// Transmitting
    Tx,
    /// LoRa channel activity detection in progress
    Cad,
    /// Hardware rx/sleep alternation
    RxDutyCycle,
    /// Reserved by another stack
    Busy,
    /// Owned by an auxiliary GNSS/Wi-Fi scan subsystem
    Scan,
}

/// Active modem
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum ModemMode {
    /// (G)FSK modem
    Fsk,
    /// LoRa modem
    LoRa,
}

/// Semantic events delivered to the registered listener, one per interrupt at most
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
#[allow(missing_docs)]
pub enum RadioEvent {
    TxDone,
    RxDone,
    RxError,
    TxTimeout,
    RxTimeout,
    CadDone,
    CadTimeout,
    CsDone,
    CsTimeout,
    HeaderError,
    /// Never delivered
    Unknown,
}

/// What happens when a channel activity detection or carrier sense cycle concludes
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum CadExitMode {
    /// Carrier sense only, report and stop
    CsOnly,
    /// Carrier sense, then receive on activity
    CsRx,
    /// Carrier sense, then transmit when the channel is free
    CsLbt,
    /// Energy detect only
    EdOnly,
    /// Energy detect, then receive
    EdRx,
    /// Energy detect, then transmit when the channel is free
    EdLbt,
    /// No cycle in progress
    None,
}

impl CadExitMode {
    pub(crate) fn is_listen_before_talk(self) -> bool {
        matches!(self, CadExitMode::CsLbt | CadExitMode::EdLbt)
    }
}

/// Antenna path selection
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
#[allow(missing_docs)]
pub enum RfPath {
    Off,
    Rx,
    Tx,
    /// Transmit through the external PA
    TxExtPa,
}

/// Data rates with regional limits
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
#[allow(missing_docs)]
pub enum DataRate {
    Kbps2 = 1,
    Kbps22 = 2,
    Kbps50 = 3,
    Kbps150 = 4,
    Kbps250 = 5,
    Kbps12_5 = 6,
}

impl DataRate {
    /// Number of defined data rates
    pub const COUNT: usize = 6;

    pub(crate) fn index(self) -> usize {
        self as usize - 1
    }
}

impl TryFrom<u8> for DataRate {
    type Error = RadioError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(DataRate::Kbps2),
            2 => Ok(DataRate::Kbps22),
            3 => Ok(DataRate::Kbps50),
            4 => Ok(DataRate::Kbps150),
            5 => Ok(DataRate::Kbps250),
            6 => Ok(DataRate::Kbps12_5),
            _ => Err(RadioError::InvalidParams),
        }
    }
}

/// Regulatory regions
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
#[allow(missing_docs)]
pub enum Region {
    Na = 1,
    Eu = 2,
    Jp = 3,
}

bitflags! {
    /// Chip-independent interrupt bits. Each chip family translates its own
    /// register layout to and from these.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct IrqFlags: u32 {
        /// Transmission complete
        const TX_DONE = 1 << 0;
        /// Packet received
        const RX_DONE = 1 << 1;
        /// Preamble detected
        const PREAMBLE_DETECTED = 1 << 2;
        /// Sync word (FSK) or valid header (LoRa sync) detected
        const SYNC_WORD_VALID = 1 << 3;
        /// Valid LoRa header received
        const HEADER_VALID = 1 << 4;
        /// LoRa header CRC error
        const HEADER_ERROR = 1 << 5;
        /// Payload CRC error
        const CRC_ERROR = 1 << 6;
        /// Channel activity detection finished
        const CAD_DONE = 1 << 7;
        /// Channel activity detected
        const CAD_DETECTED = 1 << 8;
        /// Rx or tx timeout
        const TIMEOUT = 1 << 9;
        /// Chip internal error register is non-zero
        const ERROR = 1 << 10;
        /// Last command failed
        const CMD_ERROR = 1 << 11;
        /// GNSS scan finished
        const GNSS_SCAN_DONE = 1 << 12;
        /// Wi-Fi scan finished
        const WIFI_SCAN_DONE = 1 << 13;
    }
}

impl IrqFlags {
    /// Default interrupt mask armed in LoRa mode
    pub const LORA_DEFAULT: IrqFlags = IrqFlags::TX_DONE
        .union(IrqFlags::RX_DONE)
        .union(IrqFlags::TIMEOUT)
        .union(IrqFlags::CRC_ERROR)
        .union(IrqFlags::HEADER_ERROR)
        .union(IrqFlags::CAD_DONE)
        .union(IrqFlags::CAD_DETECTED)
        .union(IrqFlags::ERROR);

    /// Default interrupt mask armed in FSK mode
    pub const FSK_DEFAULT: IrqFlags = IrqFlags::TX_DONE
        .union(IrqFlags::RX_DONE)
        .union(IrqFlags::TIMEOUT)
        .union(IrqFlags::SYNC_WORD_VALID)
        .union(IrqFlags::CRC_ERROR)
        .union(IrqFlags::ERROR);

    /// Narrowed mask used during an FSK carrier sense window
    pub const CARRIER_SENSE: IrqFlags = IrqFlags::TIMEOUT.union(IrqFlags::PREAMBLE_DETECTED);

    /// Extra bits armed while a scan owns the radio
    pub const SCAN: IrqFlags = IrqFlags::GNSS_SCAN_DONE
        .union(IrqFlags::WIFI_SCAN_DONE)
        .union(IrqFlags::CMD_ERROR);

    /// Default mask for a modem
    pub fn default_for(mode: ModemMode) -> IrqFlags {
        match mode {
            ModemMode::LoRa => IrqFlags::LORA_DEFAULT,
            ModemMode::Fsk => IrqFlags::FSK_DEFAULT,
        }
    }
}

#[cfg(feature = "defmt-03")]
impl defmt::Format for IrqFlags {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "IrqFlags({=u32:#x})", self.bits())
    }
}

/// Quality metrics of a received LoRa packet, gain-corrected
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct LoraRxPacketStatus {
    /// Packet RSSI in dBm, SNR-adjusted when SNR is negative
    pub rssi: i16,
    /// SNR in dB
    pub snr: i8,
    /// RSSI of the despread signal in dBm
    pub signal_rssi: i16,
    /// Whether the received header declared a payload CRC
    pub crc_present: bool,
}

/// Quality metrics of a received FSK packet, gain-corrected
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct FskRxPacketStatus {
    /// RSSI latched at sync word detection, dBm
    pub rssi_sync: i16,
    /// Average RSSI over the packet, dBm
    pub rssi_avg: i16,
    /// Always zero, FSK provides no SNR
    pub snr: i8,
}

/// Receive record populated by the driver before an `RxDone` event
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RxPacket {
    /// Payload storage; the FSK sync step also uses it as scratch
    pub payload: [u8; RX_PAYLOAD_MAX_SIZE],
    /// Number of valid payload bytes
    pub payload_len: u8,
    /// LoRa metrics, zeroed after an FSK reception
    pub lora_status: LoraRxPacketStatus,
    /// FSK metrics, zeroed after a LoRa reception
    pub fsk_status: FskRxPacketStatus,
    /// Clock reading when the receive-done interrupt was serviced, microseconds
    pub received_at_us: u64,
}

impl RxPacket {
    /// Empty record
    pub const fn new() -> Self {
        Self {
            payload: [0u8; RX_PAYLOAD_MAX_SIZE],
            payload_len: 0,
            lora_status: LoraRxPacketStatus {
                rssi: 0,
                snr: 0,
                signal_rssi: 0,
                crc_present: false,
            },
            fsk_status: FskRxPacketStatus {
                rssi_sync: 0,
                rssi_avg: 0,
                snr: 0,
            },
            received_at_us: 0,
        }
    }

    /// Valid payload bytes
    pub fn payload(&self) -> &[u8] {
        &self.payload[..self.payload_len as usize]
    }
}

impl Default for RxPacket {
    fn default() -> Self {
        Self::new()
    }
}

/// Power amplifier configuration resolved by the board lookup
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct PaConfig {
    /// Requested output power, dBm
    pub target_power_dbm: i8,
    /// Power value programmed with the tx params command
    pub tx_power: i8,
    /// Chip ramp-time code
    pub ramp_time: u8,
    /// PA duty cycle
    pub pa_duty_cycle: u8,
    /// High-power PA size (SX126x) or HP selection (LR11xx)
    pub hp_max: u8,
    /// Amplifier selection code
    pub device_sel: u8,
    /// LUT (SX126x) or supply (LR11xx) code
    pub pa_lut: u8,
    /// Drive the external PA enable line on transmit
    pub enable_ext_pa: bool,
}

/// Raw receive buffer status from the chip
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct RxBufferStatus {
    /// Number of received bytes
    pub payload_len: u8,
    /// Buffer offset of the first received byte
    pub start_offset: u8,
}

/// Raw LoRa packet status, before gain correction
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
#[allow(missing_docs)]
pub struct LoraPacketStatus {
    pub rssi_pkt: i16,
    pub snr_pkt: i8,
    pub signal_rssi_pkt: i16,
}

/// Raw FSK packet status, before gain correction
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
#[allow(missing_docs)]
pub struct FskPacketStatus {
    pub rssi_sync: i16,
    pub rssi_avg: i16,
}

/// LoRa modulation parameters
#[derive(Clone, Debug, PartialEq)]
pub struct LoraModulationParams {
    /// Spreading factor
    pub spreading_factor: SpreadingFactor,
    /// Bandwidth
    pub bandwidth: Bandwidth,
    /// Coding rate
    pub coding_rate: CodingRate,
    /// Use the long interleaver variant of the coding rate
    pub long_interleaver: bool,
}

/// LoRa packet parameters
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct LoraPacketParams {
    /// Preamble length in symbols
    pub preamble_length: u16,
    /// Implicit (fixed length) header
    pub implicit_header: bool,
    /// Payload length in bytes
    pub payload_length: u8,
    /// Payload CRC on
    pub crc_on: bool,
    /// Inverted IQ
    pub invert_iq: bool,
}

/// LoRa channel activity detection parameters
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct LoraCadParams {
    /// Number of symbols, chip encoding
    pub symbol_num: u8,
    /// Detection peak threshold
    pub detect_peak: u8,
    /// Detection minimum threshold
    pub detect_min: u8,
    /// Exit policy, only the carrier-sense variants are accepted
    pub exit_mode: CadExitMode,
    /// Timeout applied by the exit policy, chip ticks
    pub timeout: u32,
}

/// FSK receiver bandwidth, chip encoding shared by SX126x and LR11xx
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
#[allow(missing_docs)]
pub enum FskBandwidth {
    Bw117300 = 0x0B,
    Bw156200 = 0x1A,
    Bw234300 = 0x0A,
    Bw312000 = 0x19,
    Bw373600 = 0x11,
    Bw467000 = 0x09,
}

/// FSK pulse shaping, chip encoding
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
#[allow(missing_docs)]
pub enum FskPulseShape {
    Off = 0x00,
    Bt03 = 0x08,
    Bt05 = 0x09,
    Bt07 = 0x0A,
    Bt1 = 0x0B,
}

/// FSK modulation parameters
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct FskModulationParams {
    /// Bit rate, bits per second
    pub bit_rate: u32,
    /// Frequency deviation, Hz
    pub freq_dev: u32,
    /// Receiver bandwidth
    pub bandwidth: FskBandwidth,
    /// Pulse shaping
    pub pulse_shape: FskPulseShape,
}

/// FSK preamble detector length, chip encoding
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
#[allow(missing_docs)]
pub enum FskPreambleDetect {
    Off = 0x00,
    Bits8 = 0x04,
    Bits16 = 0x05,
    Bits24 = 0x06,
    Bits32 = 0x07,
}

/// FSK packet parameters
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct FskPacketParams {
    /// Preamble length in bytes
    pub preamble_length: u16,
    /// Minimum preamble the detector needs
    pub preamble_min_detect: FskPreambleDetect,
    /// Sync word length in bytes
    pub sync_word_length: u8,
    /// Address filtering on
    pub addr_comp: bool,
    /// Variable length header handled by the chip
    pub variable_length: bool,
    /// Payload length in bytes
    pub payload_length: u8,
    /// Chip-side CRC on
    pub crc_on: bool,
    /// Chip-side whitening on
    pub whitening: bool,
}

impl Default for FskPacketParams {
    fn default() -> Self {
        Self {
            preamble_length: 0,
            preamble_min_detect: FskPreambleDetect::Bits16,
            sync_word_length: 0,
            addr_comp: false,
            variable_length: false,
            payload_length: 0,
            crc_on: false,
            whitening: false,
        }
    }
}

/// Parameters of an FSK carrier sense window
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct FskCadParams {
    /// Length of the listening window, microseconds
    pub cs_duration_us: u32,
    /// Energy threshold used by energy-detect policies, dBm
    pub cs_threshold: i16,
}

/// Typed outcome of the FSK receive-done decode
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
#[allow(missing_docs)]
pub enum FskRxDoneStatus {
    Ok,
    InvalidParameter,
    InvalidLength,
    BadCrc,
    Timeout,
    UnknownError,
    SwMarkNotPresent,
}

/// Board timing characteristics of the radio state transitions, microseconds
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
#[allow(missing_docs)]
pub struct StateTimings {
    pub sleep_to_full_power_us: u32,
    pub full_power_to_sleep_us: u32,
    pub rx_to_tx_us: u32,
    pub tx_to_rx_us: u32,
    pub tcxo_delay_us: u32,
    /// Board FSK transmit processing delay, used when within 1000..=5000
    pub tx_process_delay_us: u32,
    /// Board FSK receive processing delay, used when within 1000..=5000
    pub rx_process_delay_us: u32,
}

/// Snapshot of the last bus command and the status bytes the chip echoed
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
#[allow(missing_docs)]
pub struct BusStatus {
    pub last_command: u16,
    pub last_status1: u8,
    pub last_status2: u8,
    /// Most recent command the chip reported as failed, 0 if none
    pub failed_command: u16,
}
