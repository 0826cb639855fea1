//! Portable port configuration and its native device encoding.
//!
//! The portable model (`PortConfiguration` and friends) is what the port
//! object works with. `NativeSettings` is the device's own settings record,
//! round-tripped through the OS and never interpreted anywhere else.
//! Everything here is pure: no I/O, so it can be tested without a device.

use crate::error::{EngineError, EngineResult};
use crate::rates::{rate_from_token, token_from_rate, RateToken};
use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Number of data bits per character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataBits {
    Five,
    Six,
    Seven,
    Eight,
    /// Detected value with no portable equivalent.
    Unknown,
}

impl TryFrom<u8> for DataBits {
    type Error = EngineError;

    fn try_from(bits: u8) -> Result<Self, Self::Error> {
        match bits {
            5 => Ok(Self::Five),
            6 => Ok(Self::Six),
            7 => Ok(Self::Seven),
            8 => Ok(Self::Eight),
            other => Err(EngineError::unsupported(format!(
                "{other} data bits per character"
            ))),
        }
    }
}

/// Parity checking modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Parity {
    None,
    Even,
    Odd,
    Mark,
    Space,
    /// Detected value with no portable equivalent.
    Unknown,
}

impl FromStr for Parity {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" | "n" => Ok(Self::None),
            "even" | "e" => Ok(Self::Even),
            "odd" | "o" => Ok(Self::Odd),
            "mark" | "m" => Ok(Self::Mark),
            "space" | "s" => Ok(Self::Space),
            _ => Err(EngineError::unsupported(format!("parity '{s}'"))),
        }
    }
}

/// Number of stop bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopBits {
    One,
    Two,
    /// Detected value with no portable equivalent.
    Unknown,
}

impl TryFrom<u8> for StopBits {
    type Error = EngineError;

    fn try_from(bits: u8) -> Result<Self, Self::Error> {
        match bits {
            1 => Ok(Self::One),
            2 => Ok(Self::Two),
            other => Err(EngineError::unsupported(format!("{other} stop bits"))),
        }
    }
}

/// Flow control modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowControl {
    None,
    /// RTS/CTS.
    Hardware,
    /// XON/XOFF.
    Software,
    /// Detected handshake with no portable equivalent.
    Unknown,
}

impl FromStr for FlowControl {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "hardware" | "rtscts" => Ok(Self::Hardware),
            "software" | "xonxoff" => Ok(Self::Software),
            _ => Err(EngineError::unsupported(format!("flow control '{s}'"))),
        }
    }
}

/// Direction a rate applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Input,
    Output,
    All,
}

/// Portable serial line configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortConfiguration {
    /// Receive baud rate; 0 when the device rate has no numeric value.
    pub input_rate: u32,
    /// Transmit baud rate; 0 when the device rate has no numeric value.
    pub output_rate: u32,
    pub data_bits: DataBits,
    pub parity: Parity,
    pub stop_bits: StopBits,
    pub flow_control: FlowControl,
}

impl Default for PortConfiguration {
    fn default() -> Self {
        Self {
            input_rate: 9600,
            output_rate: 9600,
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
            flow_control: FlowControl::None,
        }
    }
}

impl PortConfiguration {
    /// Whether any field came back from detection as unknown.
    pub fn has_unknown(&self) -> bool {
        self.input_rate == 0
            || self.output_rate == 0
            || self.data_bits == DataBits::Unknown
            || self.parity == Parity::Unknown
            || self.stop_bits == StopBits::Unknown
            || self.flow_control == FlowControl::Unknown
    }
}

/// A single validate-and-apply edit of the port configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortSetting {
    Rate { rate: u32, direction: Direction },
    DataBits(DataBits),
    Parity(Parity),
    StopBits(StopBits),
    FlowControl(FlowControl),
}

impl fmt::Display for PortSetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rate { rate, direction } => write!(f, "rate {rate} ({direction:?})"),
            Self::DataBits(bits) => write!(f, "data bits {bits:?}"),
            Self::Parity(parity) => write!(f, "parity {parity:?}"),
            Self::StopBits(bits) => write!(f, "stop bits {bits:?}"),
            Self::FlowControl(flow) => write!(f, "flow control {flow:?}"),
        }
    }
}

// ========== Native representation ==========

/// Native data-bits code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeDataBits(pub u8);

impl NativeDataBits {
    pub const DATA_5: Self = Self(0);
    pub const DATA_6: Self = Self(1);
    pub const DATA_7: Self = Self(2);
    pub const DATA_8: Self = Self(3);
}

/// Native parity code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeParity(pub u8);

impl NativeParity {
    pub const NONE: Self = Self(0);
    pub const EVEN: Self = Self(1);
    pub const ODD: Self = Self(2);
    pub const MARK: Self = Self(3);
    pub const SPACE: Self = Self(4);
}

/// Native stop-bits code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeStopBits(pub u8);

impl NativeStopBits {
    pub const STOP_1: Self = Self(0);
    pub const STOP_2: Self = Self(1);
}

bitflags! {
    /// Native handshake word.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Handshake: u32 {
        /// Stop transmitting on received XOFF.
        const OBEY_XOFF = 1 << 0;
        /// Send XOFF when the receive buffer fills.
        const SEND_XOFF = 1 << 1;
        /// Transmit only while CTS is asserted.
        const OBEY_CTS = 1 << 2;
        /// Fail outstanding requests when CTS drops.
        const FAIL_CTS = 1 << 3;
        const OBEY_DSR = 1 << 4;
        /// Fail outstanding requests when DSR drops.
        const FAIL_DSR = 1 << 5;
        const OBEY_DCD = 1 << 6;
        const FAIL_DCD = 1 << 7;
        /// RTS is driven by the application, not the driver.
        const FREE_RTS = 1 << 8;
        /// DTR is driven by the application, not the driver.
        const FREE_DTR = 1 << 9;
        /// Writes complete once data is buffered rather than transmitted.
        const WRITE_BUFFERED_COMPLETE = 1 << 10;
    }
}

const SOFTWARE_FLOW: Handshake = Handshake::OBEY_XOFF.union(Handshake::SEND_XOFF);
const HARDWARE_FLOW: Handshake = Handshake::OBEY_CTS.union(Handshake::FREE_RTS);
const NO_FLOW: Handshake = Handshake::FAIL_DSR;

/// The device's settings record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeSettings {
    pub rate: RateToken,
    pub data_bits: NativeDataBits,
    pub parity: NativeParity,
    pub stop_bits: NativeStopBits,
    pub handshake: Handshake,
}

impl Default for NativeSettings {
    fn default() -> Self {
        Self {
            rate: RateToken::BPS_9600,
            data_bits: NativeDataBits::DATA_8,
            parity: NativeParity::NONE,
            stop_bits: NativeStopBits::STOP_1,
            handshake: NO_FLOW,
        }
    }
}

impl NativeSettings {
    /// Apply one portable edit to this record.
    ///
    /// On error the record is left untouched.
    pub fn apply(&mut self, setting: PortSetting) -> EngineResult<()> {
        match setting {
            PortSetting::Rate { rate, direction } => {
                if direction != Direction::All {
                    return Err(EngineError::unsupported(format!(
                        "separate {direction:?} rate; the device uses one rate for both directions"
                    )));
                }
                self.rate = token_from_rate(rate).ok_or_else(|| {
                    EngineError::unsupported(format!("rate {rate} is not a standard rate"))
                })?;
            }
            PortSetting::DataBits(bits) => self.data_bits = native_data_bits(bits)?,
            PortSetting::Parity(parity) => self.parity = native_parity(parity)?,
            PortSetting::StopBits(bits) => self.stop_bits = native_stop_bits(bits)?,
            PortSetting::FlowControl(flow) => self.handshake = native_handshake(flow)?,
        }
        Ok(())
    }
}

fn native_data_bits(bits: DataBits) -> EngineResult<NativeDataBits> {
    match bits {
        DataBits::Five => Ok(NativeDataBits::DATA_5),
        DataBits::Six => Ok(NativeDataBits::DATA_6),
        DataBits::Seven => Ok(NativeDataBits::DATA_7),
        DataBits::Eight => Ok(NativeDataBits::DATA_8),
        DataBits::Unknown => Err(EngineError::unsupported("unknown data bits")),
    }
}

fn native_parity(parity: Parity) -> EngineResult<NativeParity> {
    match parity {
        Parity::None => Ok(NativeParity::NONE),
        Parity::Even => Ok(NativeParity::EVEN),
        Parity::Odd => Ok(NativeParity::ODD),
        Parity::Mark => Ok(NativeParity::MARK),
        Parity::Space => Ok(NativeParity::SPACE),
        Parity::Unknown => Err(EngineError::unsupported("unknown parity")),
    }
}

fn native_stop_bits(bits: StopBits) -> EngineResult<NativeStopBits> {
    match bits {
        StopBits::One => Ok(NativeStopBits::STOP_1),
        StopBits::Two => Ok(NativeStopBits::STOP_2),
        StopBits::Unknown => Err(EngineError::unsupported("unknown stop bits")),
    }
}

fn native_handshake(flow: FlowControl) -> EngineResult<Handshake> {
    match flow {
        FlowControl::None => Ok(NO_FLOW),
        FlowControl::Hardware => Ok(HARDWARE_FLOW),
        FlowControl::Software => Ok(SOFTWARE_FLOW),
        FlowControl::Unknown => Err(EngineError::unsupported("unknown flow control")),
    }
}

/// Translate a portable configuration into a native settings record.
///
/// Fails with `Unsupported` for non-standard rates, asymmetric
/// input/output rates and any `Unknown` field.
pub fn to_native(config: &PortConfiguration) -> EngineResult<NativeSettings> {
    if config.input_rate != config.output_rate {
        return Err(EngineError::unsupported(format!(
            "asymmetric rates (input {}, output {})",
            config.input_rate, config.output_rate
        )));
    }

    let mut native = NativeSettings::default();
    native.apply(PortSetting::Rate {
        rate: config.input_rate,
        direction: Direction::All,
    })?;
    native.apply(PortSetting::DataBits(config.data_bits))?;
    native.apply(PortSetting::Parity(config.parity))?;
    native.apply(PortSetting::StopBits(config.stop_bits))?;
    native.apply(PortSetting::FlowControl(config.flow_control))?;
    Ok(native)
}

/// Detect the portable configuration of a native settings record.
///
/// Never fails: values with no portable equivalent come back as `Unknown`
/// (or rate 0).
pub fn from_native(native: &NativeSettings) -> PortConfiguration {
    let rate = rate_from_token(native.rate).unwrap_or(0);

    let data_bits = match native.data_bits {
        NativeDataBits::DATA_5 => DataBits::Five,
        NativeDataBits::DATA_6 => DataBits::Six,
        NativeDataBits::DATA_7 => DataBits::Seven,
        NativeDataBits::DATA_8 => DataBits::Eight,
        _ => DataBits::Unknown,
    };

    let parity = match native.parity {
        NativeParity::NONE => Parity::None,
        NativeParity::EVEN => Parity::Even,
        NativeParity::ODD => Parity::Odd,
        NativeParity::MARK => Parity::Mark,
        NativeParity::SPACE => Parity::Space,
        _ => Parity::Unknown,
    };

    let stop_bits = match native.stop_bits {
        NativeStopBits::STOP_1 => StopBits::One,
        NativeStopBits::STOP_2 => StopBits::Two,
        _ => StopBits::Unknown,
    };

    PortConfiguration {
        input_rate: rate,
        output_rate: rate,
        data_bits,
        parity,
        stop_bits,
        flow_control: detect_flow_control(native.handshake),
    }
}

/// Software bits win over hardware bits, which win over the no-flow marker.
fn detect_flow_control(handshake: Handshake) -> FlowControl {
    if handshake.contains(SOFTWARE_FLOW) {
        FlowControl::Software
    } else if handshake.contains(HARDWARE_FLOW) {
        FlowControl::Hardware
    } else if handshake.intersects(NO_FLOW) {
        FlowControl::None
    } else {
        FlowControl::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PortErrorKind;
    use crate::rates::standard_rates;
    use proptest::prelude::*;

    fn assert_unsupported(result: EngineResult<NativeSettings>) {
        match result {
            Err(e) => assert_eq!(e.kind(), PortErrorKind::UnsupportedOperation),
            Ok(native) => panic!("Expected UnsupportedOperation, got {native:?}"),
        }
    }

    #[test]
    fn test_default_configuration() {
        let config = PortConfiguration::default();
        assert_eq!(config.input_rate, 9600);
        assert_eq!(config.output_rate, 9600);
        assert_eq!(config.data_bits, DataBits::Eight);
        assert_eq!(config.parity, Parity::None);
        assert_eq!(config.stop_bits, StopBits::One);
        assert_eq!(config.flow_control, FlowControl::None);
        assert!(!config.has_unknown());
    }

    #[test]
    fn test_default_native_matches_default_configuration() {
        assert_eq!(
            to_native(&PortConfiguration::default()).unwrap(),
            NativeSettings::default()
        );
    }

    #[test]
    fn test_to_native_rejects_unlisted_rate() {
        let config = PortConfiguration {
            input_rate: 14400,
            output_rate: 14400,
            ..Default::default()
        };
        assert_unsupported(to_native(&config));
    }

    #[test]
    fn test_to_native_rejects_asymmetric_rates() {
        let config = PortConfiguration {
            input_rate: 9600,
            output_rate: 19200,
            ..Default::default()
        };
        assert_unsupported(to_native(&config));
    }

    #[test]
    fn test_to_native_rejects_unknown_fields() {
        let base = PortConfiguration::default();
        assert_unsupported(to_native(&PortConfiguration {
            data_bits: DataBits::Unknown,
            ..base
        }));
        assert_unsupported(to_native(&PortConfiguration {
            parity: Parity::Unknown,
            ..base
        }));
        assert_unsupported(to_native(&PortConfiguration {
            stop_bits: StopBits::Unknown,
            ..base
        }));
        assert_unsupported(to_native(&PortConfiguration {
            flow_control: FlowControl::Unknown,
            ..base
        }));
    }

    #[test]
    fn test_numeric_inputs_out_of_range() {
        assert_eq!(DataBits::try_from(8).unwrap(), DataBits::Eight);
        assert_eq!(
            DataBits::try_from(4).unwrap_err().kind(),
            PortErrorKind::UnsupportedOperation
        );
        assert_eq!(StopBits::try_from(2).unwrap(), StopBits::Two);
        assert_eq!(
            StopBits::try_from(3).unwrap_err().kind(),
            PortErrorKind::UnsupportedOperation
        );
    }

    #[test]
    fn test_parse_parity_and_flow() {
        assert_eq!("Even".parse::<Parity>().unwrap(), Parity::Even);
        assert_eq!("s".parse::<Parity>().unwrap(), Parity::Space);
        assert!("bogus".parse::<Parity>().is_err());
        assert_eq!("rtscts".parse::<FlowControl>().unwrap(), FlowControl::Hardware);
        assert!("dtrdsr".parse::<FlowControl>().is_err());
    }

    #[test]
    fn test_apply_rejects_single_direction_rate() {
        let mut native = NativeSettings::default();
        let err = native
            .apply(PortSetting::Rate {
                rate: 115200,
                direction: Direction::Input,
            })
            .unwrap_err();
        assert_eq!(err.kind(), PortErrorKind::UnsupportedOperation);
        assert_eq!(native, NativeSettings::default());
    }

    #[test]
    fn test_apply_leaves_record_untouched_on_error() {
        let mut native = NativeSettings::default();
        assert!(native.apply(PortSetting::Parity(Parity::Unknown)).is_err());
        assert!(native
            .apply(PortSetting::Rate {
                rate: 1,
                direction: Direction::All
            })
            .is_err());
        assert_eq!(native, NativeSettings::default());
    }

    #[test]
    fn test_flow_control_encoding() {
        let mut native = NativeSettings::default();
        native
            .apply(PortSetting::FlowControl(FlowControl::Hardware))
            .unwrap();
        assert_eq!(native.handshake, Handshake::OBEY_CTS | Handshake::FREE_RTS);

        native
            .apply(PortSetting::FlowControl(FlowControl::Software))
            .unwrap();
        assert_eq!(native.handshake, Handshake::OBEY_XOFF | Handshake::SEND_XOFF);

        native.apply(PortSetting::FlowControl(FlowControl::None)).unwrap();
        assert_eq!(native.handshake, Handshake::FAIL_DSR);
    }

    #[test]
    fn test_flow_detection_precedence() {
        // Software and hardware bits together resolve to software.
        let both = SOFTWARE_FLOW | HARDWARE_FLOW | Handshake::FAIL_DSR;
        assert_eq!(detect_flow_control(both), FlowControl::Software);

        let hw_and_fail = HARDWARE_FLOW | Handshake::FAIL_DSR;
        assert_eq!(detect_flow_control(hw_and_fail), FlowControl::Hardware);

        // Half of a pair is not enough.
        let half = Handshake::OBEY_XOFF | Handshake::FAIL_DSR;
        assert_eq!(detect_flow_control(half), FlowControl::None);

        assert_eq!(
            detect_flow_control(Handshake::OBEY_CTS),
            FlowControl::Unknown
        );
        assert_eq!(detect_flow_control(Handshake::empty()), FlowControl::Unknown);
    }

    #[test]
    fn test_from_native_maps_exotic_values_to_unknown() {
        let native = NativeSettings {
            rate: RateToken::SPECIAL,
            data_bits: NativeDataBits(9),
            parity: NativeParity(7),
            stop_bits: NativeStopBits(2),
            handshake: Handshake::FREE_DTR,
        };
        let config = from_native(&native);
        assert_eq!(config.input_rate, 0);
        assert_eq!(config.output_rate, 0);
        assert_eq!(config.data_bits, DataBits::Unknown);
        assert_eq!(config.parity, Parity::Unknown);
        assert_eq!(config.stop_bits, StopBits::Unknown);
        assert_eq!(config.flow_control, FlowControl::Unknown);
        assert!(config.has_unknown());
    }

    #[test]
    fn test_from_native_keeps_known_fields_beside_unknown_ones() {
        let native = NativeSettings {
            parity: NativeParity(42),
            ..NativeSettings::default()
        };
        let config = from_native(&native);
        assert_eq!(config.parity, Parity::Unknown);
        assert_eq!(config.input_rate, 9600);
        assert_eq!(config.data_bits, DataBits::Eight);
    }

    #[test]
    fn test_configuration_serde_names() {
        let json = serde_json::to_value(PortConfiguration::default()).unwrap();
        assert_eq!(json["data_bits"], "eight");
        assert_eq!(json["flow_control"], "none");
    }

    fn valid_configuration() -> impl Strategy<Value = PortConfiguration> {
        let rates: Vec<u32> = standard_rates().collect();
        (
            proptest::sample::select(rates),
            prop_oneof![
                Just(DataBits::Five),
                Just(DataBits::Six),
                Just(DataBits::Seven),
                Just(DataBits::Eight)
            ],
            prop_oneof![
                Just(Parity::None),
                Just(Parity::Even),
                Just(Parity::Odd),
                Just(Parity::Mark),
                Just(Parity::Space)
            ],
            prop_oneof![Just(StopBits::One), Just(StopBits::Two)],
            prop_oneof![
                Just(FlowControl::None),
                Just(FlowControl::Hardware),
                Just(FlowControl::Software)
            ],
        )
            .prop_map(|(rate, data_bits, parity, stop_bits, flow_control)| {
                PortConfiguration {
                    input_rate: rate,
                    output_rate: rate,
                    data_bits,
                    parity,
                    stop_bits,
                    flow_control,
                }
            })
    }

    proptest! {
        #[test]
        fn prop_native_round_trip(config in valid_configuration()) {
            let native = to_native(&config).unwrap();
            let detected = from_native(&native);
            prop_assert_eq!(detected, config);
            prop_assert!(!detected.has_unknown());
        }

        #[test]
        fn prop_from_native_is_total(
            rate in any::<u32>(),
            data in any::<u8>(),
            parity in any::<u8>(),
            stop in any::<u8>(),
            handshake in any::<u32>(),
        ) {
            let native = NativeSettings {
                rate: RateToken(rate),
                data_bits: NativeDataBits(data),
                parity: NativeParity(parity),
                stop_bits: NativeStopBits(stop),
                handshake: Handshake::from_bits_retain(handshake),
            };
            let config = from_native(&native);
            prop_assert_eq!(config.input_rate, config.output_rate);
        }
    }
}
