//! The capture sequence: press, focus wait, release, object wait, download.

use std::path::PathBuf;

use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};

use crate::camera::property::{PropValue, PropertyCode};
use crate::camera::sony::{self, FOCUS_STATUS_FOCUSING};
use crate::camera::values::ShootingMode;
use crate::camera::Vendor;
use crate::error::{PtpError, Result};
use crate::ptpip::buffer::ByteBuffer;
use crate::ptpip::client::Command;
use crate::ptpip::codes::*;

use super::info::ObjectInfo;
use super::{CameraDevice, DeviceInfo};

/// Object handle Sony bodies use for a shot still sitting in camera memory.
const SHOT_IN_MEMORY_OBJECT: u32 = 0xffff_c001;

/// Target byte size requested from GetReducedObject.
const REDUCED_TARGET_SIZE: u32 = 0x0020_0000;

/// How the engine learns that autofocus has settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusWait {
    /// Canon: watch the OLC button state in the event stream.
    PushTelemetry,
    /// Sony: poll the focus status property.
    Poll,
}

/// How the engine learns the new object's handle after release.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectWait {
    /// ObjectAdded arrives as a pushed event or event-queue record.
    PushEvent,
    /// Poll the object-in-memory flag and use the in-memory handle.
    PollMemoryFlag,
}

/// How the image is pulled off the body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadMethod {
    /// One GetReducedObject call for a preview-sized rendition.
    ReducedObject,
    /// GetObjectInfo then chunked GetPartialObject reads.
    PartialObject,
    /// Canon in-camera develop then chunked 64-bit partial reads.
    InnerDevelop,
}

/// Per-body capture strategy, decided from the DeviceInfo dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureCaps {
    pub focus_wait: FocusWait,
    pub object_wait: ObjectWait,
    pub download: DownloadMethod,
}

impl CaptureCaps {
    pub(crate) fn decide(vendor: Vendor, device_info: &DeviceInfo) -> Self {
        match vendor {
            Vendor::Sony => Self {
                focus_wait: FocusWait::Poll,
                object_wait: if device_info.supports_event(EV_SONY_OBJECT_ADDED)
                    || device_info.supports_event(EV_OBJECT_ADDED)
                {
                    ObjectWait::PushEvent
                } else {
                    ObjectWait::PollMemoryFlag
                },
                download: DownloadMethod::PartialObject,
            },
            Vendor::Canon => Self {
                focus_wait: FocusWait::PushTelemetry,
                object_wait: ObjectWait::PushEvent,
                download: if device_info.supports_operation(OP_CANON_INNER_DEVELOP_START) {
                    DownloadMethod::InnerDevelop
                } else {
                    DownloadMethod::ReducedObject
                },
            },
        }
    }
}

impl CameraDevice {
    /// Take one picture and download it. Returns the saved file path.
    pub async fn capture(&self) -> Result<PathBuf> {
        let caps = self.capture_caps().ok_or(PtpError::SocketClosed)?;
        let shooting_mode = {
            let mut st = self.inner.state.lock().unwrap();
            st.pending_object = None;
            st.pending_develop_object = None;
            st.last_shooting_mode.unwrap_or(ShootingMode::Single)
        };
        info!("starting capture");

        self.press_shutter().await?;
        self.await_focus(caps).await?;
        self.release_shutter().await?;
        let object_id = self.await_object(caps).await?;
        let (filename, bytes) = self.download_object(caps, object_id).await?;
        let path = self.save_image(&filename, &bytes).await?;

        self.inner
            .state
            .lock()
            .unwrap()
            .captured_images
            .push((shooting_mode, path.clone()));
        Ok(path)
    }

    async fn sony_button(&self, code: PropertyCode, value: u16) -> Result<()> {
        let mut data = ByteBuffer::new();
        PropValue::U16(value).write_into(&mut data);
        self.run(Command::with_data(
            sony::control_op(code),
            vec![code.raw() as u32],
            data,
        ))
        .await?;
        Ok(())
    }

    async fn press_shutter(&self) -> Result<()> {
        match self.inner.vendor {
            Vendor::Sony => {
                self.sony_button(PropertyCode::AutoFocus, 2).await?;
                self.sony_button(PropertyCode::Capture, 2).await?;
            }
            Vendor::Canon => {
                self.run(Command::new(OP_CANON_REMOTE_RELEASE_ON, vec![3, 0]))
                    .await?;
            }
        }
        Ok(())
    }

    async fn release_shutter(&self) -> Result<()> {
        match self.inner.vendor {
            Vendor::Sony => {
                self.sony_button(PropertyCode::Capture, 1).await?;
                self.sony_button(PropertyCode::AutoFocus, 1).await?;
            }
            Vendor::Canon => {
                self.run(Command::new(OP_CANON_REMOTE_RELEASE_OFF, vec![3]))
                    .await?;
            }
        }
        Ok(())
    }

    /// Wait for autofocus to settle. Expiry is not an error: the camera will
    /// still expose with whatever focus it reached.
    async fn await_focus(&self, caps: CaptureCaps) -> Result<()> {
        let timeout = match caps.focus_wait {
            FocusWait::PushTelemetry => self.inner.capture.focus_push_timeout(),
            FocusWait::Poll => self.inner.capture.focus_poll_timeout(),
        };
        let deadline = Instant::now() + timeout;
        loop {
            let settled = match caps.focus_wait {
                FocusWait::PushTelemetry => {
                    if let Err(err) = self.refresh_canon_event().await {
                        debug!("event poll during focus wait failed: {err}");
                    }
                    self.inner
                        .state
                        .lock()
                        .unwrap()
                        .last_olc
                        .map(|olc| olc.focus_settled())
                        .unwrap_or(false)
                }
                FocusWait::Poll => match self
                    .fetch_descriptors(&[PropertyCode::FocusStatus])
                    .await
                {
                    Ok(descriptors) => descriptors
                        .first()
                        .and_then(|d| d.current_u64())
                        .map(|status| status != FOCUS_STATUS_FOCUSING)
                        .unwrap_or(true),
                    Err(_) => true,
                },
            };
            if settled {
                return Ok(());
            }
            if Instant::now() >= deadline {
                debug!("focus wait expired, proceeding with capture");
                return Ok(());
            }
            sleep(self.inner.capture.poll_interval()).await;
        }
    }

    /// Wait for the new object's handle. Expiry here is fatal: with no handle
    /// there is nothing to download.
    async fn await_object(&self, caps: CaptureCaps) -> Result<u32> {
        let timeout = match caps.object_wait {
            ObjectWait::PushEvent => self.inner.capture.object_push_timeout(),
            ObjectWait::PollMemoryFlag => self.inner.capture.object_poll_timeout(),
        };
        let deadline = Instant::now() + timeout;
        loop {
            if self.inner.vendor == Vendor::Canon {
                if let Err(err) = self.refresh_canon_event().await {
                    debug!("event poll during object wait failed: {err}");
                }
            }
            if let Some(object_id) = self.inner.state.lock().unwrap().pending_object.take() {
                return Ok(object_id);
            }
            if caps.object_wait == ObjectWait::PollMemoryFlag {
                if let Ok(descriptors) = self
                    .fetch_descriptors(&[PropertyCode::ObjectInMemory])
                    .await
                {
                    let in_memory = descriptors
                        .first()
                        .and_then(|d| d.current_u64())
                        .map(|flag| flag >= 0x8000)
                        .unwrap_or(false);
                    if in_memory {
                        return Ok(SHOT_IN_MEMORY_OBJECT);
                    }
                }
            }
            if Instant::now() >= deadline {
                return Err(PtpError::ObjectNotFound);
            }
            sleep(self.inner.capture.poll_interval()).await;
        }
    }

    async fn download_object(
        &self,
        caps: CaptureCaps,
        object_id: u32,
    ) -> Result<(String, Vec<u8>)> {
        match caps.download {
            DownloadMethod::ReducedObject => {
                let (_, data) = self
                    .run_with_data(Command::new(
                        OP_CANON_GET_REDUCED_OBJECT,
                        vec![object_id, REDUCED_TARGET_SIZE, 0],
                    ))
                    .await?;
                Ok((default_filename(object_id), data.into_vec()))
            }
            DownloadMethod::PartialObject => self.download_partial(object_id).await,
            DownloadMethod::InnerDevelop => self.download_developed(object_id).await,
        }
    }

    /// GetObjectInfo for the size and name, then chunked partial reads.
    async fn download_partial(&self, object_id: u32) -> Result<(String, Vec<u8>)> {
        let (_, info_data) = self
            .run_with_data(Command::new(OP_GET_OBJECT_INFO, vec![object_id]))
            .await?;
        let object_info = ObjectInfo::parse(info_data.view(0))
            .ok_or_else(|| PtpError::invalid_response("short ObjectInfo dataset"))?;

        let total = object_info.compressed_size as usize;
        let chunk = self.inner.capture.download_chunk_size as usize;
        let mut bytes = Vec::with_capacity(total);
        while bytes.len() < total {
            let request = chunk.min(total - bytes.len());
            let (_, data) = self
                .run_with_data(Command::new(
                    OP_GET_PARTIAL_OBJECT,
                    vec![object_id, bytes.len() as u32, request as u32],
                ))
                .await?;
            if data.is_empty() {
                return Err(PtpError::invalid_response("empty partial object read"));
            }
            bytes.extend_from_slice(data.as_slice());
        }

        let filename = if object_info.filename.is_empty() {
            default_filename(object_id)
        } else {
            object_info.filename
        };
        Ok((filename, bytes))
    }

    /// Canon in-camera develop. The develop-end call is issued whether or not
    /// the transfer succeeded, or the body stays wedged in develop mode.
    async fn download_developed(&self, object_id: u32) -> Result<(String, Vec<u8>)> {
        let mut start_data = ByteBuffer::new();
        start_data.append_u32(0x0f);
        start_data.append_u32(0x02);
        self.run(Command::with_data(
            OP_CANON_INNER_DEVELOP_START,
            vec![object_id, 0x04],
            start_data,
        ))
        .await?;

        let result = self.transfer_developed().await;

        let mut end_data = ByteBuffer::new();
        end_data.append_u32(0);
        if let Err(err) = self
            .run(Command::with_data(
                OP_CANON_INNER_DEVELOP_END,
                vec![0],
                end_data,
            ))
            .await
        {
            warn!("develop end failed: {err}");
        }

        Ok((default_filename(object_id), result?))
    }

    async fn transfer_developed(&self) -> Result<Vec<u8>> {
        let deadline = Instant::now() + self.inner.capture.object_push_timeout();
        let develop_id = loop {
            if let Err(err) = self.refresh_canon_event().await {
                debug!("event poll during develop wait failed: {err}");
            }
            if let Some(id) = self
                .inner
                .state
                .lock()
                .unwrap()
                .pending_develop_object
                .take()
            {
                break id;
            }
            if Instant::now() >= deadline {
                return Err(PtpError::ObjectNotFound);
            }
            sleep(self.inner.capture.poll_interval()).await;
        };

        // Size is unknown up front; a short read marks the end.
        let chunk = self.inner.capture.download_chunk_size;
        let mut bytes = Vec::new();
        loop {
            let (_, data) = self
                .run_with_data(Command::new(
                    OP_CANON_GET_PARTIAL_OBJECT_64,
                    vec![develop_id, bytes.len() as u32, chunk, 0],
                ))
                .await?;
            let read = data.len();
            bytes.extend_from_slice(data.as_slice());
            if read < chunk as usize {
                break;
            }
        }
        self.run(Command::new(OP_CANON_TRANSFER_COMPLETE, vec![develop_id]))
            .await?;
        Ok(bytes)
    }

    async fn save_image(&self, filename: &str, bytes: &[u8]) -> Result<PathBuf> {
        let dir = self.inner.capture.image_dir_or_temp();
        tokio::fs::create_dir_all(&dir).await?;
        let path = dir.join(filename);
        tokio::fs::write(&path, bytes).await?;
        info!(path = %path.display(), size = bytes.len(), "saved image");
        Ok(path)
    }
}

fn default_filename(object_id: u32) -> String {
    format!("capture_{object_id:08x}.jpg")
}
