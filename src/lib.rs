pub mod camera;
pub mod config;
pub mod device;
pub mod error;
pub mod ptpip;

pub use camera::{CameraEvent, PropertyState, TypedValue, Vendor};
pub use config::{ConfigLoadResult, EngineConfig};
pub use device::{
    CameraCommand, CameraDevice, CameraIdentity, CameraReply, CaptureCaps, StorageInfo,
};
pub use error::{PtpError, Result};
