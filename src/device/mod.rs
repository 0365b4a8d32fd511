//! Camera session layer: vendor handshakes, property access, and capture.

pub mod capture;
pub mod info;

#[cfg(test)]
mod tests;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::camera::canon::{self, CanonEventRecord, OlcInfo};
use crate::camera::property::{DeviceProperty, PropertyCode};
use crate::camera::sony;
use crate::camera::values::ShootingMode;
use crate::camera::{CameraEvent, TypedValue, Vendor};
use crate::config::{CaptureConfig, ConnectionConfig, EngineConfig};
use crate::error::{PtpError, Result};
use crate::ptpip::buffer::ByteBuffer;
use crate::ptpip::client::{Command, Priority, PtpEvent, PtpIpClient, Response, derive_guid};
use crate::ptpip::codes::*;
use crate::ptpip::transport::{PtpTransport, TcpTransport};

pub use capture::CaptureCaps;
pub use info::{DeviceInfo, ObjectInfo, StorageInfo};

/// Discovery metadata identifying one camera on the network.
#[derive(Debug, Clone)]
pub struct CameraIdentity {
    /// Unique device identifier, typically a UPnP UDN. Seeds the client GUID.
    pub identifier: String,
    pub friendly_name: String,
    pub manufacturer: String,
    pub host: String,
    pub port: u16,
}

/// Which operation family serves property reads on this body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FetchPath {
    /// Canon: current values arrive through the GetEvent registry.
    CanonEvent,
    /// Sony: one batched call returns every descriptor.
    AllAtOnce,
    /// Sony vendor per-code descriptor fetch.
    VendorSingle,
    /// Standard per-code descriptor fetch.
    StandardSingle,
}

fn choose_fetch_path(device_info: &DeviceInfo) -> Option<FetchPath> {
    if device_info.supports_operation(OP_CANON_GET_EVENT) {
        Some(FetchPath::CanonEvent)
    } else if device_info.supports_operation(OP_SONY_GET_ALL_DEVICE_PROP_DATA) {
        Some(FetchPath::AllAtOnce)
    } else if device_info.supports_operation(OP_SONY_GET_DEVICE_PROP_DESC) {
        Some(FetchPath::VendorSingle)
    } else if device_info.supports_operation(OP_GET_DEVICE_PROP_DESC) {
        Some(FetchPath::StandardSingle)
    } else {
        None
    }
}

/// Codes polled when building a full snapshot over per-code fetch paths.
const SNAPSHOT_CODES: &[PropertyCode] = &[
    PropertyCode::WhiteBalance,
    PropertyCode::FNumber,
    PropertyCode::FocusMode,
    PropertyCode::ExposureProgramMode,
    PropertyCode::ExposureBiasCompensation,
    PropertyCode::StillCaptureMode,
    PropertyCode::ShutterSpeed,
    PropertyCode::FocusStatus,
    PropertyCode::ObjectInMemory,
    PropertyCode::Iso,
];

/// Vendor error-code responses mapped to their semantic errors.
fn refine(err: PtpError) -> PtpError {
    match err {
        PtpError::CommandRequestFailed(RC_OPERATION_NOT_SUPPORTED) => {
            PtpError::OperationNotSupported
        }
        PtpError::CommandRequestFailed(RC_SESSION_ALREADY_OPEN) => PtpError::AnotherSessionOpen,
        other => other,
    }
}

fn refine_code(code: u16) -> PtpError {
    refine(PtpError::CommandRequestFailed(code))
}

/// One operation from the fixed catalog, carrying its own typed payload.
/// A payload of the wrong shape for an operation is unrepresentable.
#[derive(Debug, Clone)]
pub enum CameraCommand {
    GetValue(PropertyCode),
    SetValue(TypedValue),
    Capture,
    GetEvent,
    StartLiveView,
    EndLiveView,
    LiveViewFrame,
    StorageInfo,
    Ping,
}

/// What each [`CameraCommand`] resolves to.
#[derive(Debug, Clone)]
pub enum CameraReply {
    Value(TypedValue),
    Event(CameraEvent),
    Captured(PathBuf),
    /// One viewfinder frame, handed over undecoded.
    Frame(Vec<u8>),
    Storages(Vec<StorageInfo>),
    Done,
}

/// Object handle Sony bodies serve the current viewfinder frame under.
const SONY_LIVE_VIEW_OBJECT: u32 = 0xffff_c002;

/// Canon EVF output-device property; bit 1 routes frames to the host.
const CANON_PROP_EVF_OUTPUT_DEVICE: u32 = 0xd1b0;

#[derive(Default)]
pub(crate) struct SessionState {
    pub(crate) info: Option<DeviceInfo>,
    pub(crate) caps: Option<CaptureCaps>,
    /// Canon: last reported raw value per vendor property code.
    pub(crate) canon_values: HashMap<u32, u32>,
    /// Canon: last advertised availability list per vendor property code.
    pub(crate) canon_lists: HashMap<u32, Vec<u32>>,
    pub(crate) last_olc: Option<OlcInfo>,
    pub(crate) pending_object: Option<u32>,
    pub(crate) pending_develop_object: Option<u32>,
    pub(crate) last_shooting_mode: Option<ShootingMode>,
    pub(crate) captured_images: Vec<(ShootingMode, PathBuf)>,
}

pub(crate) struct DeviceInner {
    pub(crate) client: PtpIpClient,
    pub(crate) vendor: Vendor,
    pub(crate) identity: CameraIdentity,
    pub(crate) connection: ConnectionConfig,
    pub(crate) capture: CaptureConfig,
    pub(crate) state: Mutex<SessionState>,
}

/// A connected (or connectable) camera. Cheap to clone; all clones share the
/// same session.
#[derive(Clone)]
pub struct CameraDevice {
    pub(crate) inner: Arc<DeviceInner>,
}

impl CameraDevice {
    /// Build a device that will reach the camera over TCP.
    pub fn new(identity: CameraIdentity, config: &EngineConfig) -> Result<Self> {
        let transport = Box::new(TcpTransport::new(
            identity.host.clone(),
            identity.port,
            config.connection.connect_timeout(),
        ));
        Self::with_transport(identity, config, transport)
    }

    /// Build a device over an arbitrary transport.
    pub fn with_transport(
        identity: CameraIdentity,
        config: &EngineConfig,
        transport: Box<dyn PtpTransport>,
    ) -> Result<Self> {
        let vendor = Vendor::from_manufacturer(&identity.manufacturer).ok_or_else(|| {
            PtpError::invalid_payload(format!(
                "unsupported manufacturer: {}",
                identity.manufacturer
            ))
        })?;
        let guid = derive_guid(&identity.identifier);
        let (client, events) = PtpIpClient::new(
            guid,
            &config.connection.client_name,
            transport,
            config.connection.connect_timeout(),
        );
        let inner = Arc::new(DeviceInner {
            client,
            vendor,
            identity,
            connection: config.connection.clone(),
            capture: config.capture.clone(),
            state: Mutex::new(SessionState::default()),
        });
        tokio::spawn(run_event_pump(events, Arc::downgrade(&inner)));
        Ok(Self { inner })
    }

    pub fn vendor(&self) -> Vendor {
        self.inner.vendor
    }

    pub fn identity(&self) -> &CameraIdentity {
        &self.inner.identity
    }

    /// The DeviceInfo dataset fetched at connect time.
    pub fn device_info(&self) -> Option<DeviceInfo> {
        self.inner.state.lock().unwrap().info.clone()
    }

    pub fn capture_caps(&self) -> Option<CaptureCaps> {
        self.inner.state.lock().unwrap().caps
    }

    /// Connect and run the vendor handshake. Retries on the errors some
    /// bodies return while tearing down a previous session.
    pub async fn connect(&self) -> Result<()> {
        let mut attempt = 1;
        loop {
            match self.try_connect().await {
                Ok(()) => return Ok(()),
                Err(err) if attempt < self.inner.connection.connect_attempts && err.is_retriable_connect() => {
                    warn!(attempt, "connect failed ({err}), retrying");
                    self.inner.client.disconnect();
                    tokio::time::sleep(Duration::from_millis(500)).await;
                    attempt += 1;
                }
                Err(err) => {
                    self.inner.client.disconnect();
                    return Err(err);
                }
            }
        }
    }

    async fn try_connect(&self) -> Result<()> {
        {
            let mut st = self.inner.state.lock().unwrap();
            *st = SessionState::default();
        }
        self.inner.client.connect().await?;
        match self.inner.vendor {
            Vendor::Sony => self.sony_handshake().await?,
            Vendor::Canon => self.canon_handshake().await?,
        }

        let (_, data) = self
            .run_with_data(Command::new(OP_GET_DEVICE_INFO, vec![]))
            .await?;
        let device_info = DeviceInfo::parse(data.view(0))
            .ok_or_else(|| PtpError::invalid_response("short DeviceInfo dataset"))?;
        let caps = CaptureCaps::decide(self.inner.vendor, &device_info);
        info!(
            model = %device_info.model,
            name = %self.inner.identity.friendly_name,
            "connected"
        );
        {
            let mut st = self.inner.state.lock().unwrap();
            st.info = Some(device_info);
            st.caps = Some(caps);
        }

        // Prime the Canon registry so the first snapshot is populated.
        if self.inner.vendor == Vendor::Canon {
            if let Err(err) = self.refresh_canon_event().await {
                debug!("initial event poll failed: {err}");
            }
        }
        Ok(())
    }

    async fn sony_handshake(&self) -> Result<()> {
        // Some firmwares answer OpenSession without echoing the transaction id.
        let response = self
            .inner
            .client
            .command_any_response(Command::new(OP_OPEN_SESSION, vec![1]), Priority::Normal)
            .await?;
        if !response.ok() {
            return Err(refine_code(response.code));
        }
        self.run(Command::new(OP_SONY_SDIO_CONNECT, vec![1, 0, 0])).await?;
        self.run(Command::new(OP_SONY_SDIO_CONNECT, vec![2, 0, 0])).await?;
        self.run_with_data(Command::new(OP_SONY_GET_EXT_DEVICE_INFO, vec![0x12c]))
            .await?;
        self.run(Command::new(OP_SONY_SDIO_CONNECT, vec![3, 0, 0])).await?;
        Ok(())
    }

    async fn canon_handshake(&self) -> Result<()> {
        let response = self
            .inner
            .client
            .command_any_response(Command::new(OP_OPEN_SESSION, vec![0x41]), Priority::Normal)
            .await?;
        if !response.ok() {
            return Err(refine_code(response.code));
        }
        self.run(Command::new(OP_CANON_SET_REMOTE_MODE, vec![0x15])).await?;
        self.run(Command::new(OP_CANON_SET_EVENT_MODE, vec![0x02])).await?;
        Ok(())
    }

    /// Close the session and tear down both channels. Best effort; the camera
    /// may already be gone.
    pub async fn disconnect(&self) {
        if self.inner.client.is_connected() {
            let close = self
                .inner
                .client
                .command(Command::new(OP_CLOSE_SESSION, vec![]), Priority::High);
            let _ = tokio::time::timeout(Duration::from_secs(2), close).await;
        }
        self.inner.client.disconnect();
    }

    pub async fn ping(&self) -> Result<()> {
        self.inner
            .client
            .ping(self.inner.connection.connect_timeout())
            .await
    }

    /// Issue a command and require an OK response.
    pub(crate) async fn run(&self, command: Command) -> Result<Response> {
        let response = self.inner.client.command(command, Priority::Normal).await?;
        if response.ok() {
            Ok(response)
        } else {
            Err(refine_code(response.code))
        }
    }

    /// Issue a command with an inbound data phase.
    pub(crate) async fn run_with_data(&self, command: Command) -> Result<(Response, ByteBuffer)> {
        self.inner
            .client
            .command_with_data(command, Priority::Normal)
            .await
            .map_err(refine)
    }

    fn fetch_path(&self) -> Result<FetchPath> {
        let st = self.inner.state.lock().unwrap();
        let device_info = st.info.as_ref().ok_or(PtpError::SocketClosed)?;
        choose_fetch_path(device_info).ok_or(PtpError::OperationNotSupported)
    }

    /// Poll Canon's event queue and fold the records into the registry.
    pub(crate) async fn refresh_canon_event(&self) -> Result<()> {
        let (_, data) = self
            .run_with_data(Command::new(OP_CANON_GET_EVENT, vec![]))
            .await?;
        let records = canon::parse_event_blob(data.view(0));
        let mut st = self.inner.state.lock().unwrap();
        for record in records {
            match record {
                CanonEventRecord::PropertyChanged { code, value } => {
                    st.canon_values.insert(code, value);
                }
                CanonEventRecord::AvailableListChanged { code, values } => {
                    st.canon_lists.insert(code, values);
                }
                CanonEventRecord::OlcInfoChanged(olc) => {
                    // Records carry only the fields whose mask bits are set;
                    // merge so sparse updates don't erase known telemetry.
                    let merged = match st.last_olc {
                        Some(prev) => OlcInfo {
                            button: olc.button.or(prev.button),
                            shutter: olc.shutter.or(prev.shutter),
                            aperture: olc.aperture.or(prev.aperture),
                            iso: olc.iso.or(prev.iso),
                        },
                        None => olc,
                    };
                    st.last_olc = Some(merged);
                }
                CanonEventRecord::ObjectAdded { object_id } => {
                    debug!(object_id = format_args!("{object_id:#010x}"), "object added");
                    st.pending_object = Some(object_id);
                }
                CanonEventRecord::DevelopedObjectAdded { object_id } => {
                    debug!(
                        object_id = format_args!("{object_id:#010x}"),
                        "developed object added"
                    );
                    st.pending_develop_object = Some(object_id);
                }
            }
        }
        Ok(())
    }

    /// Fetch descriptors over whichever read path the body supports. With an
    /// empty `codes` filter the batched path returns everything. Per-code
    /// paths skip properties the body refuses rather than failing the batch.
    pub(crate) async fn fetch_descriptors(
        &self,
        codes: &[PropertyCode],
    ) -> Result<Vec<DeviceProperty>> {
        match self.fetch_path()? {
            FetchPath::CanonEvent => Err(PtpError::OperationNotSupported),
            FetchPath::AllAtOnce => {
                let (_, data) = self
                    .run_with_data(Command::new(OP_SONY_GET_ALL_DEVICE_PROP_DATA, vec![0]))
                    .await?;
                let mut descriptors = DeviceProperty::parse_all(data.view(0));
                if !codes.is_empty() {
                    descriptors.retain(|d| codes.contains(&d.code));
                }
                Ok(descriptors)
            }
            path @ (FetchPath::VendorSingle | FetchPath::StandardSingle) => {
                let op = if path == FetchPath::VendorSingle {
                    OP_SONY_GET_DEVICE_PROP_DESC
                } else {
                    OP_GET_DEVICE_PROP_DESC
                };
                let mut descriptors = Vec::with_capacity(codes.len());
                for &code in codes {
                    match self
                        .run_with_data(Command::new(op, vec![code.raw() as u32]))
                        .await
                    {
                        Ok((_, data)) => match DeviceProperty::parse(data.view(0), 0) {
                            Some((descriptor, _)) => descriptors.push(descriptor),
                            None => debug!(%code, "empty descriptor"),
                        },
                        Err(PtpError::CommandRequestFailed(_))
                        | Err(PtpError::OperationNotSupported) => {
                            debug!(%code, "property fetch refused");
                        }
                        Err(other) => return Err(other),
                    }
                }
                Ok(descriptors)
            }
        }
    }

    /// Read one property as a semantic value.
    pub async fn get_value(&self, code: PropertyCode) -> Result<TypedValue> {
        let not_found = || PtpError::PropertyNotFound(code.to_string());
        match self.fetch_path()? {
            FetchPath::CanonEvent => {
                self.refresh_canon_event().await?;
                let st = self.inner.state.lock().unwrap();
                let canon_code = code.canon().ok_or_else(not_found)?;
                let raw = st.canon_values.get(&canon_code).copied().ok_or_else(not_found)?;
                Vendor::Canon
                    .decode_value(code, raw as u64, st.last_olc.as_ref())
                    .ok_or_else(not_found)
            }
            _ => {
                let descriptors = self.fetch_descriptors(&[code]).await?;
                let descriptor = descriptors
                    .iter()
                    .find(|d| d.code == code)
                    .ok_or_else(not_found)?;
                let raw = descriptor.current_u64().ok_or_else(not_found)?;
                self.inner
                    .vendor
                    .decode_value(code, raw, None)
                    .ok_or_else(not_found)
            }
        }
    }

    /// Write one setting.
    pub async fn set_value(&self, value: TypedValue) -> Result<()> {
        match self.inner.vendor {
            Vendor::Sony => {
                let (code, prop_value) = sony::encode_value(&value)?;
                let mut data = ByteBuffer::new();
                prop_value.write_into(&mut data);
                self.run(Command::with_data(
                    sony::control_op(code),
                    vec![code.raw() as u32],
                    data,
                ))
                .await?;
            }
            Vendor::Canon => {
                let (canon_code, raw) = canon::encode_value(&value)?;
                self.run(Command::with_data(
                    OP_CANON_SET_DEVICE_PROP_VALUE_EX,
                    vec![],
                    canon::set_property_payload(canon_code, raw),
                ))
                .await?;
                self.inner
                    .state
                    .lock()
                    .unwrap()
                    .canon_values
                    .insert(canon_code, raw);
            }
        }
        Ok(())
    }

    /// Build a full state snapshot, draining the captured-image log.
    pub async fn get_event(&self) -> Result<CameraEvent> {
        let mut event = match self.fetch_path()? {
            FetchPath::CanonEvent => {
                self.refresh_canon_event().await?;
                let st = self.inner.state.lock().unwrap();
                CameraEvent::from_canon_registry(
                    &st.canon_values,
                    &st.canon_lists,
                    st.last_olc.as_ref(),
                )
            }
            _ => {
                let descriptors = self.fetch_descriptors(SNAPSHOT_CODES).await?;
                CameraEvent::from_descriptors(self.inner.vendor, &descriptors, None)
            }
        };
        let mut st = self.inner.state.lock().unwrap();
        if let Some(state) = &event.shooting_mode {
            st.last_shooting_mode = Some(state.current);
        }
        event.captured_images = std::mem::take(&mut st.captured_images);
        Ok(event)
    }

    /// Route viewfinder frames to the host. Sony bodies stream on demand and
    /// need no setup; Canon bodies switch the EVF output device.
    pub async fn start_live_view(&self) -> Result<()> {
        match self.inner.vendor {
            Vendor::Sony => Ok(()),
            Vendor::Canon => self.set_evf_output(2).await,
        }
    }

    /// Give the viewfinder back to the camera.
    pub async fn end_live_view(&self) -> Result<()> {
        match self.inner.vendor {
            Vendor::Sony => Ok(()),
            Vendor::Canon => self.set_evf_output(0).await,
        }
    }

    async fn set_evf_output(&self, value: u32) -> Result<()> {
        self.run(Command::with_data(
            OP_CANON_SET_DEVICE_PROP_VALUE_EX,
            vec![],
            canon::set_property_payload(CANON_PROP_EVF_OUTPUT_DEVICE, value),
        ))
        .await?;
        Ok(())
    }

    /// Fetch one viewfinder frame. The bytes are passed through undecoded;
    /// rendering is the caller's concern.
    pub async fn live_view_frame(&self) -> Result<Vec<u8>> {
        let (_, data) = match self.inner.vendor {
            Vendor::Sony => {
                self.run_with_data(Command::new(OP_GET_OBJECT, vec![SONY_LIVE_VIEW_OBJECT]))
                    .await?
            }
            Vendor::Canon => {
                self.run_with_data(Command::new(
                    OP_CANON_GET_VIEWFINDER_DATA,
                    vec![0x0010_0000],
                ))
                .await?
            }
        };
        if data.is_empty() {
            return Err(PtpError::ObjectNotFound);
        }
        Ok(data.into_vec())
    }

    /// Enumerate storages and fetch the StorageInfo dataset for each.
    pub async fn storage_info(&self) -> Result<Vec<StorageInfo>> {
        let short = || PtpError::invalid_response("short storage id array");
        let (_, data) = self
            .run_with_data(Command::new(OP_GET_STORAGE_IDS, vec![]))
            .await?;
        let view = data.view(0);
        let count = view.read_u32(0).ok_or_else(short)? as usize;
        let mut storages = Vec::with_capacity(count);
        for i in 0..count {
            let id = view.read_u32(4 + i * 4).ok_or_else(short)?;
            let (_, data) = self
                .run_with_data(Command::new(OP_GET_STORAGE_INFO, vec![id]))
                .await?;
            let info = StorageInfo::parse(id, data.view(0))
                .ok_or_else(|| PtpError::invalid_response("short StorageInfo dataset"))?;
            storages.push(info);
        }
        Ok(storages)
    }

    /// Dispatch one catalog operation.
    pub async fn perform(&self, command: CameraCommand) -> Result<CameraReply> {
        match command {
            CameraCommand::GetValue(code) => self.get_value(code).await.map(CameraReply::Value),
            CameraCommand::SetValue(value) => {
                self.set_value(value).await?;
                Ok(CameraReply::Done)
            }
            CameraCommand::Capture => self.capture().await.map(CameraReply::Captured),
            CameraCommand::GetEvent => self.get_event().await.map(CameraReply::Event),
            CameraCommand::StartLiveView => {
                self.start_live_view().await?;
                Ok(CameraReply::Done)
            }
            CameraCommand::EndLiveView => {
                self.end_live_view().await?;
                Ok(CameraReply::Done)
            }
            CameraCommand::LiveViewFrame => self.live_view_frame().await.map(CameraReply::Frame),
            CameraCommand::StorageInfo => self.storage_info().await.map(CameraReply::Storages),
            CameraCommand::Ping => {
                self.ping().await?;
                Ok(CameraReply::Done)
            }
        }
    }
}

/// Fold pushed protocol events into session state.
async fn run_event_pump(
    mut events: mpsc::UnboundedReceiver<PtpEvent>,
    inner: Weak<DeviceInner>,
) {
    while let Some(event) = events.recv().await {
        let Some(inner) = inner.upgrade() else { return };
        match event.code {
            EV_OBJECT_ADDED | EV_SONY_OBJECT_ADDED => {
                if let Some(&object_id) = event.params.first() {
                    debug!(object_id = format_args!("{object_id:#010x}"), "object added");
                    inner.state.lock().unwrap().pending_object = Some(object_id);
                }
            }
            EV_OBJECT_REMOVED => {
                if let Some(&object_id) = event.params.first() {
                    let mut st = inner.state.lock().unwrap();
                    if st.pending_object == Some(object_id) {
                        st.pending_object = None;
                    }
                }
            }
            EV_DEVICE_PROP_CHANGED | EV_SONY_PROPERTY_CHANGED => {
                debug!("camera reported a property change");
            }
            EV_CANON_REQUEST_GET_EVENT => {
                debug!("camera requested an event poll");
            }
            other => {
                debug!(code = format_args!("{other:#06x}"), "unhandled event");
            }
        }
    }
}
