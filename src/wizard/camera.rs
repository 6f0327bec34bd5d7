use image::{codecs::jpeg::JpegEncoder, ImageBuffer, Rgb};
use log::{debug, info};
use thiserror::Error;

use super::state::{Device, WizardError};
use crate::models::Photo;

/// One raw RGB8 frame from a camera.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub rgb: Vec<u8>,
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum CaptureError {
    #[error("camera permission denied")]
    Denied,
    #[error("camera unavailable: {0}")]
    Unavailable(String),
    #[error("could not encode frame: {0}")]
    Encode(String),
}

impl From<CaptureError> for WizardError {
    fn from(err: CaptureError) -> Self {
        match err {
            CaptureError::Denied => WizardError::Permission {
                device: Device::Camera,
                reason: "allow camera access to take your attendance photo".into(),
            },
            other => WizardError::Capture(other.to_string()),
        }
    }
}

/// An open hardware stream. `stop` must be cheap and safe to call twice.
pub trait CameraStream: Send {
    fn grab(&mut self) -> Result<Frame, CaptureError>;
    fn stop(&mut self);
}

pub trait Camera: Send + Sync {
    fn open(&self) -> Result<Box<dyn CameraStream>, CaptureError>;
}

/// Owns an open stream and stops it when dropped, so leaving the capture
/// step never leaves the camera running.
pub struct CameraGuard {
    stream: Option<Box<dyn CameraStream>>,
}

impl CameraGuard {
    pub fn open(camera: &dyn Camera) -> Result<Self, CaptureError> {
        let stream = camera.open()?;
        debug!("camera stream opened");
        Ok(Self {
            stream: Some(stream),
        })
    }

    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    /// Grabs one frame, releases the stream, then encodes.
    pub fn capture(mut self, quality: u8) -> Result<Photo, CaptureError> {
        let frame = match self.stream.as_mut() {
            Some(stream) => stream.grab(),
            None => Err(CaptureError::Unavailable("stream already released".into())),
        };
        self.release();
        encode_jpeg(&frame?, quality)
    }

    pub fn release(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.stop();
            info!("camera stream released");
        }
    }
}

impl Drop for CameraGuard {
    fn drop(&mut self) {
        self.release();
    }
}

pub fn encode_jpeg(frame: &Frame, quality: u8) -> Result<Photo, CaptureError> {
    let buffer: ImageBuffer<Rgb<u8>, Vec<u8>> =
        ImageBuffer::from_raw(frame.width, frame.height, frame.rgb.clone()).ok_or_else(|| {
            CaptureError::Encode(format!(
                "{} bytes do not fill a {}x{} frame",
                frame.rgb.len(),
                frame.width,
                frame.height
            ))
        })?;

    let mut bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut bytes, quality.clamp(1, 100))
        .encode_image(&buffer)
        .map_err(|err| CaptureError::Encode(err.to_string()))?;

    Ok(Photo::jpeg(bytes))
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    };

    use super::*;

    /// Fake camera that records how many streams are still running.
    #[derive(Clone, Default)]
    pub struct FakeCamera {
        pub live_streams: Arc<AtomicUsize>,
        pub deny: Arc<AtomicBool>,
    }

    struct FakeStream {
        live_streams: Arc<AtomicUsize>,
        stopped: bool,
    }

    impl CameraStream for FakeStream {
        fn grab(&mut self) -> Result<Frame, CaptureError> {
            Ok(Frame {
                width: 4,
                height: 4,
                rgb: vec![180; 4 * 4 * 3],
            })
        }

        fn stop(&mut self) {
            if !self.stopped {
                self.stopped = true;
                self.live_streams.fetch_sub(1, Ordering::SeqCst);
            }
        }
    }

    impl Camera for FakeCamera {
        fn open(&self) -> Result<Box<dyn CameraStream>, CaptureError> {
            if self.deny.load(Ordering::SeqCst) {
                return Err(CaptureError::Denied);
            }
            self.live_streams.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(FakeStream {
                live_streams: Arc::clone(&self.live_streams),
                stopped: false,
            }))
        }
    }

    impl FakeCamera {
        pub fn live(&self) -> usize {
            self.live_streams.load(Ordering::SeqCst)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::FakeCamera;
    use super::*;

    #[test]
    fn encodes_frames_as_jpeg() {
        let frame = Frame {
            width: 2,
            height: 2,
            rgb: vec![255, 0, 0, 0, 255, 0, 0, 0, 255, 255, 255, 255],
        };
        let photo = encode_jpeg(&frame, 80).unwrap();
        assert_eq!(photo.mime, "image/jpeg");
        assert_eq!(&photo.bytes[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn short_frames_are_rejected() {
        let frame = Frame {
            width: 10,
            height: 10,
            rgb: vec![0; 3],
        };
        assert!(matches!(encode_jpeg(&frame, 80), Err(CaptureError::Encode(_))));
    }

    #[test]
    fn dropping_the_guard_releases_the_stream() {
        let camera = FakeCamera::default();
        let guard = CameraGuard::open(&camera).unwrap();
        assert!(guard.is_open());
        assert_eq!(camera.live(), 1);
        drop(guard);
        assert_eq!(camera.live(), 0);

        let guard = CameraGuard::open(&camera).unwrap();
        guard.capture(80).unwrap();
        assert_eq!(camera.live(), 0);
    }

    #[test]
    fn denied_camera_redirects_to_camera_step() {
        let camera = FakeCamera::default();
        camera.deny.store(true, std::sync::atomic::Ordering::SeqCst);

        let err = match CameraGuard::open(&camera) {
            Err(err) => WizardError::from(err),
            Ok(_) => panic!("camera should be denied"),
        };
        assert_eq!(err.redirect(), Some(super::super::state::Route::Camera));
        assert_eq!(camera.live(), 0);
    }
}
