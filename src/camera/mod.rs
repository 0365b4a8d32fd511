//! Camera-domain model: semantic values, property descriptors, and the two
//! vendor codecs that translate them to raw wire encodings.

pub mod canon;
pub mod event;
pub mod property;
pub mod sony;
pub mod values;

use canon::OlcInfo;
use property::PropertyCode;
use values::{
    Aperture, ExposureCompensation, ExposureMode, FocusMode, Iso, ShootingMode, ShutterSpeed,
    WhiteBalanceMode,
};

pub use event::{CameraEvent, PropertyState};

/// Supported camera manufacturers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vendor {
    Sony,
    Canon,
}

impl Vendor {
    /// Match a manufacturer string from discovery metadata.
    pub fn from_manufacturer(manufacturer: &str) -> Option<Self> {
        let lower = manufacturer.to_lowercase();
        if lower.contains("sony") {
            Some(Self::Sony)
        } else if lower.contains("canon") {
            Some(Self::Canon)
        } else {
            None
        }
    }

    /// Decode a raw property value. Canon auto sentinels resolve against OLC
    /// telemetry when it is present; Sony ignores `olc`.
    pub(crate) fn decode_value(
        self,
        code: PropertyCode,
        raw: u64,
        olc: Option<&OlcInfo>,
    ) -> Option<TypedValue> {
        match self {
            Self::Sony => sony::decode_value(code, raw),
            Self::Canon => canon::decode_value(code, raw, olc),
        }
    }
}

/// A semantic setting value, one variant per property family.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TypedValue {
    Aperture(Aperture),
    ShutterSpeed(ShutterSpeed),
    Iso(Iso),
    ExposureMode(ExposureMode),
    ExposureCompensation(ExposureCompensation),
    WhiteBalance(WhiteBalanceMode),
    ShootingMode(ShootingMode),
    FocusMode(FocusMode),
}
