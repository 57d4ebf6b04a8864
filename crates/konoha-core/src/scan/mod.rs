//! Scan decoder adapter.
//!
//! Wraps a barcode-detection collaborator behind [`BarcodeDetector`] and turns
//! camera frames into zero or one decoded payload each. The detector is
//! acquired by [`ScanDecoder::open`] and released when the decoder drops.

use thiserror::Error;

use crate::error::{Error, Result};

/// A single camera frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    /// Raw pixel data, or UTF-8 text for pre-decoded sources
    pub data: Vec<u8>,
    /// Capture time (Unix ms)
    pub captured_at: i64,
}

impl Frame {
    #[must_use]
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            data,
            captured_at: crate::util::now_millis(),
        }
    }

    /// Frame carrying already-decoded text
    #[must_use]
    pub fn from_text(text: impl Into<String>) -> Self {
        Self::new(0, 0, text.into().into_bytes())
    }
}

/// Detector could not start, e.g. camera permission was denied
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct DetectorError(pub String);

/// Barcode-detection collaborator
pub trait BarcodeDetector: Send {
    /// Acquire the camera/detector resources
    fn initialize(&mut self) -> std::result::Result<(), DetectorError>;

    /// Decode at most one payload from a frame
    fn detect(&mut self, frame: &Frame) -> Option<String>;

    /// Release resources acquired by `initialize`
    fn release(&mut self) {}
}

impl<D: BarcodeDetector + ?Sized> BarcodeDetector for Box<D> {
    fn initialize(&mut self) -> std::result::Result<(), DetectorError> {
        (**self).initialize()
    }

    fn detect(&mut self, frame: &Frame) -> Option<String> {
        (**self).detect(frame)
    }

    fn release(&mut self) {
        (**self).release();
    }
}

/// Result of decoding one frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeOutcome {
    Payload(String),
    NoResult,
}

/// Scoped owner of an initialized detector
pub struct ScanDecoder<D: BarcodeDetector> {
    detector: D,
}

impl<D: BarcodeDetector> ScanDecoder<D> {
    /// Initialize the detector. Failure is reported as `DecodeUnavailable` and not retried.
    pub fn open(mut detector: D) -> Result<Self> {
        detector.initialize().map_err(|error| {
            tracing::warn!("Barcode detector failed to initialize: {}", error);
            Error::DecodeUnavailable(error.0)
        })?;
        Ok(Self { detector })
    }

    pub fn decode(&mut self, frame: &Frame) -> DecodeOutcome {
        match self.detector.detect(frame) {
            Some(payload) if !payload.trim().is_empty() => DecodeOutcome::Payload(payload),
            _ => DecodeOutcome::NoResult,
        }
    }
}

impl<D: BarcodeDetector> Drop for ScanDecoder<D> {
    fn drop(&mut self) {
        self.detector.release();
        tracing::debug!("Barcode detector released");
    }
}

/// Detector for frames that already carry decoded text (wedge scanners, stdin).
#[derive(Debug, Default, Clone, Copy)]
pub struct TextFrameDetector;

impl BarcodeDetector for TextFrameDetector {
    fn initialize(&mut self) -> std::result::Result<(), DetectorError> {
        Ok(())
    }

    fn detect(&mut self, frame: &Frame) -> Option<String> {
        let text = std::str::from_utf8(&frame.data).ok()?.trim();
        if text.is_empty() {
            None
        } else {
            Some(text.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    struct DeniedDetector;

    impl BarcodeDetector for DeniedDetector {
        fn initialize(&mut self) -> std::result::Result<(), DetectorError> {
            Err(DetectorError("camera permission denied".to_string()))
        }

        fn detect(&mut self, _frame: &Frame) -> Option<String> {
            None
        }
    }

    struct TrackingDetector {
        released: Arc<AtomicBool>,
    }

    impl BarcodeDetector for TrackingDetector {
        fn initialize(&mut self) -> std::result::Result<(), DetectorError> {
            Ok(())
        }

        fn detect(&mut self, _frame: &Frame) -> Option<String> {
            Some("   ".to_string())
        }

        fn release(&mut self) {
            self.released.store(true, Ordering::SeqCst);
        }
    }

    #[test]
    fn text_frames_decode_to_payload() {
        let mut decoder = ScanDecoder::open(TextFrameDetector).unwrap();
        assert_eq!(
            decoder.decode(&Frame::from_text(" konoha://checkin/x \n")),
            DecodeOutcome::Payload("konoha://checkin/x".to_string())
        );
    }

    #[test]
    fn empty_or_binary_frames_have_no_result() {
        let mut decoder = ScanDecoder::open(TextFrameDetector).unwrap();
        assert_eq!(decoder.decode(&Frame::from_text("  ")), DecodeOutcome::NoResult);
        assert_eq!(
            decoder.decode(&Frame::new(2, 2, vec![0xff, 0xfe, 0x00, 0x01])),
            DecodeOutcome::NoResult
        );
    }

    #[test]
    fn init_failure_is_decode_unavailable() {
        let error = ScanDecoder::open(DeniedDetector).err().unwrap();
        assert!(matches!(error, Error::DecodeUnavailable(message) if message.contains("permission")));
    }

    #[test]
    fn whitespace_detection_is_no_result_and_drop_releases() {
        let released = Arc::new(AtomicBool::new(false));
        {
            let mut decoder = ScanDecoder::open(TrackingDetector {
                released: Arc::clone(&released),
            })
            .unwrap();
            assert_eq!(decoder.decode(&Frame::from_text("x")), DecodeOutcome::NoResult);
            assert!(!released.load(Ordering::SeqCst));
        }
        assert!(released.load(Ordering::SeqCst));
    }

    #[test]
    fn boxed_detectors_are_supported() {
        let boxed: Box<dyn BarcodeDetector> = Box::new(TextFrameDetector);
        let mut decoder = ScanDecoder::open(boxed).unwrap();
        assert!(matches!(
            decoder.decode(&Frame::from_text("payload")),
            DecodeOutcome::Payload(_)
        ));
    }
}
