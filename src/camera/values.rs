//! Vendor-neutral camera setting values.
//!
//! Raw wire encodings differ per manufacturer; these types are what the rest
//! of the engine and its callers trade in. Fractions and fixed-point integers
//! are used instead of floats so table lookups and round-trips stay exact.

use std::fmt;

/// An f-number stored in hundredths (f/2.8 is 280). Hundredths keep the
/// sub-tenth stops some fast primes report (f/0.95, f/1.05) exact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FNumber(u16);

impl FNumber {
    pub const fn from_hundredths(hundredths: u16) -> Self {
        Self(hundredths)
    }

    pub const fn from_tenths(tenths: u16) -> Self {
        Self(tenths * 10)
    }

    pub fn hundredths(self) -> u16 {
        self.0
    }

    /// Lossy for sub-tenth values; table lookups that key on tenths accept
    /// that quantization.
    pub fn tenths(self) -> u16 {
        self.0 / 10
    }
}

impl fmt::Display for FNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 % 100 == 0 {
            write!(f, "f/{}", self.0 / 100)
        } else if self.0 % 10 == 0 {
            write!(f, "f/{}.{}", self.0 / 100, self.0 / 10 % 10)
        } else {
            write!(f, "f/{}.{:02}", self.0 / 100, self.0 % 100)
        }
    }
}

/// Lens aperture. Auto is only meaningful on bodies with an auto exposure
/// program; when telemetry reports the value the camera picked, it rides
/// along without changing what the setting encodes back to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aperture {
    Auto(Option<FNumber>),
    Value(FNumber),
}

impl fmt::Display for Aperture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto(Some(resolved)) => write!(f, "Auto ({resolved})"),
            Self::Auto(None) => write!(f, "Auto"),
            Self::Value(value) => write!(f, "{value}"),
        }
    }
}

/// Exact shutter duration as numerator/denominator of a second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fraction {
    pub numerator: u32,
    pub denominator: u32,
}

impl Fraction {
    pub const fn new(numerator: u32, denominator: u32) -> Self {
        Self { numerator, denominator }
    }
}

impl fmt::Display for Fraction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.denominator == 10 {
            if self.numerator % 10 == 0 {
                write!(f, "{}\"", self.numerator / 10)
            } else {
                write!(f, "{}.{}\"", self.numerator / 10, self.numerator % 10)
            }
        } else if self.numerator == 1 {
            write!(f, "1/{}", self.denominator)
        } else {
            write!(f, "{}/{}", self.numerator, self.denominator)
        }
    }
}

/// Shutter speed setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutterSpeed {
    /// Camera-chosen; telemetry may resolve the actual duration.
    Auto(Option<Fraction>),
    Bulb,
    Value(Fraction),
}

impl fmt::Display for ShutterSpeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto(Some(resolved)) => write!(f, "Auto ({resolved})"),
            Self::Auto(None) => write!(f, "Auto"),
            Self::Bulb => write!(f, "Bulb"),
            Self::Value(value) => write!(f, "{value}"),
        }
    }
}

/// ISO sensitivity setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Iso {
    /// Camera-chosen; telemetry may resolve the actual sensitivity.
    Auto(Option<u32>),
    MultiFrameNrAuto,
    MultiFrameNrHiAuto,
    Native(u32),
    Extended(u32),
    MultiFrameNr(u32),
    MultiFrameNrHi(u32),
}

impl fmt::Display for Iso {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto(Some(resolved)) => write!(f, "ISO Auto ({resolved})"),
            Self::Auto(None) => write!(f, "ISO Auto"),
            Self::MultiFrameNrAuto => write!(f, "ISO Auto (multi-frame NR)"),
            Self::MultiFrameNrHiAuto => write!(f, "ISO Auto (multi-frame NR hi)"),
            Self::Native(v) => write!(f, "ISO {v}"),
            Self::Extended(v) => write!(f, "ISO {v} (extended)"),
            Self::MultiFrameNr(v) => write!(f, "ISO {v} (multi-frame NR)"),
            Self::MultiFrameNrHi(v) => write!(f, "ISO {v} (multi-frame NR hi)"),
        }
    }
}

/// Exposure compensation in thirds of a stop (+1 EV is 3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExposureCompensation {
    thirds: i8,
}

impl ExposureCompensation {
    pub const fn from_thirds(thirds: i8) -> Self {
        Self { thirds }
    }

    pub fn thirds(self) -> i8 {
        self.thirds
    }
}

impl fmt::Display for ExposureCompensation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.thirds < 0 { "-" } else { "+" };
        let abs = self.thirds.unsigned_abs();
        match abs % 3 {
            0 => write!(f, "{sign}{} EV", abs / 3),
            1 => write!(f, "{sign}{}.3 EV", abs / 3),
            _ => write!(f, "{sign}{}.7 EV", abs / 3),
        }
    }
}

/// Exposure program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExposureMode {
    /// Full scene-intelligent auto (A+ / iAuto).
    IntelligentAuto,
    Program,
    AperturePriority,
    ShutterPriority,
    Manual,
    Bulb,
    /// Flexible priority (Fv).
    FlexiblePriority,
}

/// White balance preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WhiteBalanceMode {
    Auto,
    Daylight,
    Shade,
    Cloudy,
    Incandescent,
    FluorescentWarmWhite,
    FluorescentCoolWhite,
    FluorescentDayWhite,
    FluorescentDaylight,
    Flash,
    Underwater,
    ColorTemperature,
    Custom,
}

/// Drive / still capture mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShootingMode {
    Single,
    SelfTimer2,
    SelfTimer10,
    SingleSilent,
    Continuous,
    ContinuousLow,
    ContinuousHigh,
    ContinuousSuperHigh,
    ContinuousSilent,
    ContinuousSilentHigh,
}

impl ShootingMode {
    /// Whether the drive keeps firing while the shutter is held.
    pub fn is_continuous(self) -> bool {
        matches!(
            self,
            Self::Continuous
                | Self::ContinuousLow
                | Self::ContinuousHigh
                | Self::ContinuousSuperHigh
                | Self::ContinuousSilent
                | Self::ContinuousSilentHigh
        )
    }
}

/// Focus drive mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FocusMode {
    Manual,
    AutoSingle,
    AutoContinuous,
    Auto,
    DirectManual,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fnumber_display() {
        assert_eq!(FNumber::from_tenths(28).to_string(), "f/2.8");
        assert_eq!(FNumber::from_tenths(80).to_string(), "f/8");
        assert_eq!(FNumber::from_hundredths(95).to_string(), "f/0.95");
        assert_eq!(FNumber::from_hundredths(120).to_string(), "f/1.2");
    }

    #[test]
    fn test_fnumber_hundredths_keep_sub_tenth_values() {
        let f = FNumber::from_hundredths(95);
        assert_eq!(f.hundredths(), 95);
        assert_eq!(FNumber::from_tenths(28), FNumber::from_hundredths(280));
    }

    #[test]
    fn test_fraction_display() {
        assert_eq!(Fraction::new(300, 10).to_string(), "30\"");
        assert_eq!(Fraction::new(13, 10).to_string(), "1.3\"");
        assert_eq!(Fraction::new(1, 8000).to_string(), "1/8000");
    }

    #[test]
    fn test_exposure_compensation_display() {
        assert_eq!(ExposureCompensation::from_thirds(0).to_string(), "+0 EV");
        assert_eq!(ExposureCompensation::from_thirds(4).to_string(), "+1.3 EV");
        assert_eq!(ExposureCompensation::from_thirds(-9).to_string(), "-3 EV");
        assert_eq!(ExposureCompensation::from_thirds(-2).to_string(), "-0.7 EV");
    }

    #[test]
    fn test_shooting_mode_classification() {
        assert!(!ShootingMode::Single.is_continuous());
        assert!(!ShootingMode::SelfTimer10.is_continuous());
        assert!(ShootingMode::ContinuousHigh.is_continuous());
        assert!(ShootingMode::ContinuousSilent.is_continuous());
    }
}
