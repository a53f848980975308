use crate::mod_params::*;

#[derive(Clone, Copy, PartialEq)]
#[allow(clippy::upper_case_acronyms)]
pub enum PacketType {
    GFSK = 0x00,
    LoRa = 0x01,
}

impl PacketType {
    pub const fn value(self) -> u8 {
        self as u8
    }
}

impl From<ModemMode> for PacketType {
    fn from(mode: ModemMode) -> Self {
        match mode {
            ModemMode::Fsk => PacketType::GFSK,
            ModemMode::LoRa => PacketType::LoRa,
        }
    }
}

#[derive(Clone, Copy)]
pub enum IrqMask {
    TxDone = 0x0001,
    RxDone = 0x0002,
    PreambleDetected = 0x0004,
    SyncwordValid = 0x0008,
    HeaderValid = 0x0010,
    HeaderError = 0x0020,
    CRCError = 0x0040,
    CADDone = 0x0080,
    CADActivityDetected = 0x0100,
    RxTxTimeout = 0x0200,
}

impl IrqMask {
    pub fn value(self) -> u16 {
        self as u16
    }

    pub fn is_set_in(self, mask: u16) -> bool {
        self.value() & mask == self.value()
    }
}

// Register bit for each driver flag. The chip has no error interrupt.
const IRQ_MAP: [(IrqFlags, IrqMask); 10] = [
    (IrqFlags::TX_DONE, IrqMask::TxDone),
    (IrqFlags::RX_DONE, IrqMask::RxDone),
    (IrqFlags::PREAMBLE_DETECTED, IrqMask::PreambleDetected),
    (IrqFlags::SYNC_WORD_VALID, IrqMask::SyncwordValid),
    (IrqFlags::HEADER_VALID, IrqMask::HeaderValid),
    (IrqFlags::HEADER_ERROR, IrqMask::HeaderError),
    (IrqFlags::CRC_ERROR, IrqMask::CRCError),
    (IrqFlags::CAD_DONE, IrqMask::CADDone),
    (IrqFlags::CAD_DETECTED, IrqMask::CADActivityDetected),
    (IrqFlags::TIMEOUT, IrqMask::RxTxTimeout),
];

pub fn irq_register_from_flags(flags: IrqFlags) -> u16 {
    IRQ_MAP
        .iter()
        .filter(|(flag, _)| flags.contains(*flag))
        .fold(0, |reg, (_, bit)| reg | bit.value())
}

pub fn irq_flags_from_register(reg: u16) -> IrqFlags {
    IRQ_MAP
        .iter()
        .filter(|(_, bit)| bit.is_set_in(reg))
        .fold(IrqFlags::empty(), |flags, (flag, _)| flags | *flag)
}

#[derive(Clone, Copy)]
#[allow(clippy::upper_case_acronyms)]
pub enum Register {
    /// Payload length of the packet being received, FSK only
    RxTxPayloadLength = 0x06BB,
    /// Symbol timeout as mantissa in bits 7:3 and exponent in bits 2:0
    SynchTimeout = 0x0706,
    Syncword = 0x06C0,
    LoRaSyncword = 0x0740,
    /// Bit 4 holds the CRC flag of the last explicit header
    LoRaHeaderInfo = 0x076B,
    /// Write pointer into the receive buffer
    RxAddrPointer = 0x0803,
    /// Four bytes of entropy, big endian
    GeneratedRandomNumber = 0x0819,
    AnaLNA = 0x08E2,
    AnaMixer = 0x08E5,
    /// 0x94 power saving, 0x96 boosted
    RxGain = 0x08AC,
    /// XTA trim capacitor, XTB trim at the next address
    XTATrim = 0x0911,
    OCP = 0x08E7,
    RetentionList = 0x029F,
    /// Bit 2 needs fixing up after every IQ change
    IQPolarity = 0x0736,
    /// Bit 2 set everywhere except 500 kHz LoRa
    TxModulation = 0x0889,
    #[cfg(feature = "sx1262-txpwr-workaround")]
    /// PA behaviour near the 900 MHz band edge
    LrFreqCfg = 0x088B,
    #[cfg(feature = "sx1262-txpwr-workaround")]
    Ovp = 0x08D8,
}

impl Register {
    pub fn addr1(self) -> u8 {
        ((self as u16 & 0xFF00) >> 8) as u8
    }
    pub fn addr2(self) -> u8 {
        (self as u16 & 0x00FF) as u8
    }
}

#[derive(Clone, Copy, PartialEq)]
pub enum OpCode {
    WriteRegister = 0x0D,
    ReadRegister = 0x1D,
    WriteBuffer = 0x0E,
    ReadBuffer = 0x1E,
    SetSleep = 0x84,
    SetStandby = 0x80,
    SetTx = 0x83,
    SetRx = 0x82,
    SetRxDutyCycle = 0x94,
    SetCAD = 0xC5,
    SetTxContinuousWave = 0xD1,
    SetPacketType = 0x8A,
    SetRFFrequency = 0x86,
    SetTxParams = 0x8E,
    SetPAConfig = 0x95,
    SetCADParams = 0x88,
    SetBufferBaseAddress = 0x8F,
    SetModulationParams = 0x8B,
    SetPacketParams = 0x8C,
    GetRxBufferStatus = 0x13,
    GetPacketStatus = 0x14,
    GetRSSIInst = 0x15,
    CfgDIOIrq = 0x08,
    GetIrqStatus = 0x12,
    ClrIrqStatus = 0x02,
    Calibrate = 0x89,
    CalibrateImage = 0x98,
    SetRegulatorMode = 0x96,
    GetDeviceErrors = 0x17,
    ClearDeviceErrors = 0x07,
    SetTCXOMode = 0x97,
    SetDIO2AsRfSwitchCtrl = 0x9d,
    SetStopRxTimerOnPreamble = 0x9F,
    SetLoRaSymbTimeout = 0xA0,
}

impl OpCode {
    pub fn value(self) -> u8 {
        self as u8
    }
}

#[derive(Clone, Copy)]
pub struct SleepParams {
    pub wakeup_rtc: bool,
    pub reset: bool,
    pub warm_start: bool,
}

impl SleepParams {
    pub fn value(self) -> u8 {
        ((self.warm_start as u8) << 2) | ((self.reset as u8) << 1) | (self.wakeup_rtc as u8)
    }
}

#[derive(Clone, Copy, PartialEq)]
#[allow(clippy::upper_case_acronyms)]
pub enum StandbyMode {
    RC = 0x00,
    XOSC = 0x01,
}

impl StandbyMode {
    pub fn value(self) -> u8 {
        self as u8
    }
}

#[derive(Clone, Copy)]
pub enum RegulatorMode {
    UseDCDC = 0x01,
}

impl RegulatorMode {
    pub fn value(self) -> u8 {
        self as u8
    }
}

#[derive(Clone, Copy)]
pub struct CalibrationParams {
    pub rc64k_enable: bool,
    pub rc13m_enable: bool,
    pub pll_enable: bool,
    pub adc_pulse_enable: bool,
    pub adc_bulkn_enable: bool,
    pub adc_bulkp_enable: bool,
    pub img_enable: bool,
}

impl CalibrationParams {
    pub const ALL: CalibrationParams = CalibrationParams {
        rc64k_enable: true,
        rc13m_enable: true,
        pll_enable: true,
        adc_pulse_enable: true,
        adc_bulkn_enable: true,
        adc_bulkp_enable: true,
        img_enable: true,
    };

    pub fn value(self) -> u8 {
        ((self.img_enable as u8) << 6)
            | ((self.adc_bulkp_enable as u8) << 5)
            | ((self.adc_bulkn_enable as u8) << 4)
            | ((self.adc_pulse_enable as u8) << 3)
            | ((self.pll_enable as u8) << 2)
            | ((self.rc13m_enable as u8) << 1)
            | (self.rc64k_enable as u8)
    }
}

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

/// Image calibration frequency pair for the band containing `freq_hz`
pub fn image_calibration_values(freq_hz: u32) -> [u8; 2] {
    match freq_hz {
        f if f > 900_000_000 => [0xE1, 0xE9],
        f if f > 850_000_000 => [0xD7, 0xDB],
        f if f > 770_000_000 => [0xC1, 0xC5],
        f if f > 460_000_000 => [0x75, 0x81],
        _ => [0x6B, 0x6F],
    }
}

// GFSK packet engine encodings
pub const GFSK_HEADER_FIXED: u8 = 0x00;
pub const GFSK_HEADER_VARIABLE: u8 = 0x01;
pub const GFSK_CRC_OFF: u8 = 0x01;
pub const GFSK_CRC_2_BYTES_INV: u8 = 0x06;
pub const GFSK_SYNC_WORD_MAX_LEN: usize = 8;
