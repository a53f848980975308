//! LR11xx opcodes, registers and bit encodings

use crate::mod_params::*;

/// Internal RTC frequency
pub const LR11XX_RTC_FREQ_HZ: u32 = 32768;

/// Packet types used by this driver
#[derive(Clone, Copy, PartialEq)]
pub enum PacketType {
    Gfsk = 0x01,
    LoRa = 0x02,
}

impl PacketType {
    pub const fn value(self) -> u8 {
        self as u8
    }
}

impl From<ModemMode> for PacketType {
    fn from(mode: ModemMode) -> Self {
        match mode {
            ModemMode::Fsk => PacketType::Gfsk,
            ModemMode::LoRa => PacketType::LoRa,
        }
    }
}

/// IRQ flags (32-bit register)
#[derive(Clone, Copy)]
pub enum IrqMask {
    TxDone = 0x00000004,              // bit 2
    RxDone = 0x00000008,              // bit 3
    PreambleDetected = 0x00000010,    // bit 4
    SyncWordHeaderValid = 0x00000020, // bit 5
    HeaderError = 0x00000040,         // bit 6
    CrcError = 0x00000080,            // bit 7
    CadDone = 0x00000100,             // bit 8
    CadDetected = 0x00000200,         // bit 9
    Timeout = 0x00000400,             // bit 10
    GnssScanDone = 0x00080000,        // bit 19
    WifiScanDone = 0x00100000,        // bit 20
    CmdError = 0x00400000,            // bit 22
    Error = 0x00800000,               // bit 23
}

impl IrqMask {
    pub fn value(self) -> u32 {
        self as u32
    }

    pub fn is_set(self, mask: u32) -> bool {
        self.value() & mask == self.value()
    }
}

// FSK sync word and LoRa header share one register bit
const IRQ_MAP: [(IrqFlags, IrqMask); 14] = [
    (IrqFlags::TX_DONE, IrqMask::TxDone),
    (IrqFlags::RX_DONE, IrqMask::RxDone),
    (IrqFlags::PREAMBLE_DETECTED, IrqMask::PreambleDetected),
    (IrqFlags::SYNC_WORD_VALID, IrqMask::SyncWordHeaderValid),
    (IrqFlags::HEADER_VALID, IrqMask::SyncWordHeaderValid),
    (IrqFlags::HEADER_ERROR, IrqMask::HeaderError),
    (IrqFlags::CRC_ERROR, IrqMask::CrcError),
    (IrqFlags::CAD_DONE, IrqMask::CadDone),
    (IrqFlags::CAD_DETECTED, IrqMask::CadDetected),
    (IrqFlags::TIMEOUT, IrqMask::Timeout),
    (IrqFlags::GNSS_SCAN_DONE, IrqMask::GnssScanDone),
    (IrqFlags::WIFI_SCAN_DONE, IrqMask::WifiScanDone),
    (IrqFlags::CMD_ERROR, IrqMask::CmdError),
    (IrqFlags::ERROR, IrqMask::Error),
];

pub fn irq_register_from_flags(flags: IrqFlags) -> u32 {
    IRQ_MAP
        .iter()
        .filter(|(flag, _)| flags.contains(*flag))
        .fold(0, |reg, (_, bit)| reg | bit.value())
}

pub fn irq_flags_from_register(reg: u32) -> IrqFlags {
    IRQ_MAP
        .iter()
        .filter(|(_, bit)| bit.is_set(reg))
        .fold(IrqFlags::empty(), |flags, (flag, _)| flags | *flag)
}

/// System OpCodes
#[derive(Clone, Copy, PartialEq)]
pub enum SystemOpCode {
    GetErrors = 0x010D,
    ClearErrors = 0x010E,
    Calibrate = 0x010F,
    SetRegMode = 0x0110,
    CalibrateImage = 0x0111,
    SetDioAsRfSwitch = 0x0112,
    SetDioIrqParams = 0x0113,
    ClearIrq = 0x0114,
    SetTcxoMode = 0x0117,
    SetSleep = 0x011B,
    SetStandby = 0x011C,
    GetRandom = 0x0120,
    DriveDioInSleepMode = 0x012A,
}

impl SystemOpCode {
    pub fn bytes(self) -> [u8; 2] {
        (self as u16).to_be_bytes()
    }
}

/// Radio OpCodes
#[derive(Clone, Copy, PartialEq)]
pub enum RadioOpCode {
    GetRxBufferStatus = 0x0203,
    GetPktStatus = 0x0204,
    GetRssiInst = 0x0205,
    SetGfskSyncWord = 0x0206,
    SetRx = 0x0209,
    SetTx = 0x020A,
    SetRfFrequency = 0x020B,
    SetCadParams = 0x020D,
    SetPktType = 0x020E,
    SetModulationParam = 0x020F,
    SetPktParam = 0x0210,
    SetTxParams = 0x0211,
    SetRxTxFallbackMode = 0x0213,
    SetRxDutyCycle = 0x0214,
    SetPaCfg = 0x0215,
    StopTimeoutOnPreamble = 0x0217,
    SetCad = 0x0218,
    SetTxCw = 0x0219,
    SetLoRaSyncTimeout = 0x021B,
    SetRxBoosted = 0x0227,
    SetLoRaSyncWord = 0x022B,
    GetLoRaRxInfo = 0x0230,
}

impl RadioOpCode {
    pub fn bytes(self) -> [u8; 2] {
        (self as u16).to_be_bytes()
    }
}

/// Register/Memory OpCodes
#[derive(Clone, Copy, PartialEq)]
pub enum RegMemOpCode {
    ReadRegMem32 = 0x0106,
    WriteBuffer8 = 0x0108,
    ReadBuffer8 = 0x0109,
    WriteRegMem32Mask = 0x010C,
}

impl RegMemOpCode {
    pub fn bytes(self) -> [u8; 2] {
        (self as u16).to_be_bytes()
    }
}

/// Bytes received so far by the GFSK packet engine, bits 16..27
pub const GFSK_RX_FILL_LEVEL_REG: u32 = 0x00F20384;
pub const GFSK_RX_FILL_LEVEL_MASK: u32 = 0x0FFF0000;
pub const GFSK_RX_FILL_LEVEL_SHIFT: u32 = 16;

/// Payload length of the GFSK packet being received, bits 20..31
pub const GFSK_PAYLOAD_LENGTH_REG: u32 = 0x00F20368;
pub const GFSK_PAYLOAD_LENGTH_MASK: u32 = 0xFFF00000;
pub const GFSK_PAYLOAD_LENGTH_SHIFT: u32 = 20;

#[cfg(feature = "lr11xx-txpwr-workaround")]
pub const BAND_EDGE_FIX_REG: u32 = 0x00F20420;
#[cfg(feature = "lr11xx-txpwr-workaround")]
pub const BAND_EDGE_FIX_MASK: u32 = 0x00070000;
#[cfg(feature = "lr11xx-txpwr-workaround")]
pub const BAND_EDGE_FIX_LO: u32 = 0x00050000;
#[cfg(feature = "lr11xx-txpwr-workaround")]
pub const BAND_EDGE_FIX_HI: u32 = 0x00040000;
#[cfg(feature = "lr11xx-txpwr-workaround")]
pub const BAND_EDGE_LIMIT_FREQ: u32 = 903_000_000;

/// Standby modes
#[derive(Clone, Copy, PartialEq)]
pub enum StandbyMode {
    Rc = 0x00,
    Xosc = 0x01,
}

impl StandbyMode {
    pub fn value(self) -> u8 {
        self as u8
    }
}

/// Regulator mode
#[derive(Clone, Copy)]
pub enum RegulatorMode {
    Ldo = 0x00,
    Dcdc = 0x01,
}

impl RegulatorMode {
    pub fn value(self) -> u8 {
        self as u8
    }
}

/// TCXO control voltage
#[allow(missing_docs)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum TcxoCtrlVoltage {
    Ctrl1V6 = 0x00,
    Ctrl1V7 = 0x01,
    Ctrl1V8 = 0x02,
    Ctrl2V2 = 0x03,
    Ctrl2V4 = 0x04,
    Ctrl2V7 = 0x05,
    Ctrl3V0 = 0x06,
    Ctrl3V3 = 0x07,
}

#[allow(missing_docs)]
impl TcxoCtrlVoltage {
    pub fn value(self) -> u8 {
        self as u8
    }
}

/// Mode the radio falls back to once a tx or rx completes
#[derive(Clone, Copy)]
pub enum FallbackMode {
    StandbyXosc = 0x02,
}

impl FallbackMode {
    pub fn value(self) -> u8 {
        self as u8
    }
}

/// Sleep configuration
pub struct SleepParams {
    pub warm_start: bool,
    pub rtc_wakeup: bool,
}

impl SleepParams {
    pub fn value(self) -> u8 {
        ((self.rtc_wakeup as u8) << 1) | (self.warm_start as u8)
    }
}

/// Calibration parameters
pub struct CalibrationParams {
    pub lf_rc_enable: bool,
    pub hf_rc_enable: bool,
    pub pll_enable: bool,
    pub adc_enable: bool,
    pub img_enable: bool,
    pub pll_tx_enable: bool,
}

impl CalibrationParams {
    pub const ALL: CalibrationParams = CalibrationParams {
        lf_rc_enable: true,
        hf_rc_enable: true,
        pll_enable: true,
        adc_enable: true,
        img_enable: true,
        pll_tx_enable: true,
    };

    pub fn value(self) -> u8 {
        ((self.pll_tx_enable as u8) << 5)
            | ((self.img_enable as u8) << 4)
            | ((self.adc_enable as u8) << 3)
            | ((self.pll_enable as u8) << 2)
            | ((self.hf_rc_enable as u8) << 1)
            | (self.lf_rc_enable as u8)
    }
}

/// DIO routing used when the chip drives the antenna switch itself.
/// Each field is a bit set over DIO5..DIO10.
#[allow(missing_docs)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RfSwitchConfig {
    pub enable: u8,
    pub standby: u8,
    pub rx: u8,
    pub tx: u8,
    pub tx_hp: u8,
    pub tx_hf: u8,
    pub gnss: u8,
    pub wifi: u8,
}

/// What the chip does once a channel activity detection finishes
pub fn cad_exit_value(exit_mode: CadExitMode) -> u8 {
    match exit_mode {
        CadExitMode::CsRx | CadExitMode::EdRx => 0x01,
        CadExitMode::CsLbt | CadExitMode::EdLbt => 0x10,
        CadExitMode::CsOnly | CadExitMode::EdOnly | CadExitMode::None => 0x00,
    }
}

pub fn bandwidth_value(bandwidth: &Bandwidth) -> Result<u8, RadioError> {
    #[allow(unreachable_patterns)]
    match bandwidth {
        Bandwidth::_125KHz => Ok(0x04),
        Bandwidth::_250KHz => Ok(0x05),
        Bandwidth::_500KHz => Ok(0x06),
        _ => Err(RadioError::InvalidParams),
    }
}

// Image calibration works on 4 MHz steps over these bands
const IMAGE_CALIBRATION_STEP_HZ: u32 = 4_000_000;
const IMAGE_CALIBRATION_BANDS: [(u32, u32); 5] = [
    (430_000_000, 440_000_000),
    (470_000_000, 510_000_000),
    (779_000_000, 787_000_000),
    (863_000_000, 879_000_000),
    (902_000_000, 928_000_000),
];

/// Image calibration band containing `freq_hz`, in 4 MHz steps.
/// A frequency outside the known bands gets a one-step band around it.
pub fn image_calibration_values(freq_hz: u32) -> [u8; 2] {
    let (start, stop) = IMAGE_CALIBRATION_BANDS
        .iter()
        .copied()
        .find(|(start, stop)| (*start..=*stop).contains(&freq_hz))
        .unwrap_or((freq_hz, freq_hz + IMAGE_CALIBRATION_STEP_HZ - 1));
    let start = start / IMAGE_CALIBRATION_STEP_HZ;
    let stop = stop.div_ceil(IMAGE_CALIBRATION_STEP_HZ);
    [start.min(u8::MAX as u32) as u8, stop.min(u8::MAX as u32) as u8]
}

/// Convert time in milliseconds to RTC steps
pub fn convert_time_in_ms_to_rtc_step(time_in_ms: u32) -> u32 {
    ((time_in_ms as u64 * LR11XX_RTC_FREQ_HZ as u64) / 1000) as u32
}

// GFSK packet engine encodings
pub const GFSK_HEADER_FIXED: u8 = 0x00;
pub const GFSK_HEADER_VARIABLE: u8 = 0x01;
pub const GFSK_CRC_OFF: u8 = 0x01;
pub const GFSK_CRC_2_BYTES_INV: u8 = 0x06;
pub const GFSK_SYNC_WORD_LEN: usize = 8;
