//! Frame transcoding: device PNG in, bounded JPEG out.
//!
//! Raw `screencap` frames are full-resolution PNGs, far too heavy for
//! a 60 fps JSON transport. Each frame is decoded, downscaled so its
//! longest edge fits the configured bound, and re-encoded as JPEG.
//! CPU-bound; callers run it on a blocking thread.

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;

use crate::error::Result;

/// Transcoding parameters.
#[derive(Debug, Clone)]
pub struct TranscodeConfig {
    /// Longest output edge in pixels.
    pub max_edge: u32,
    /// JPEG quality, 1-100.
    pub jpeg_quality: u8,
}

impl Default for TranscodeConfig {
    fn default() -> Self {
        Self {
            max_edge: 1280,
            jpeg_quality: 85,
        }
    }
}

/// A transcoded frame ready for transport.
#[derive(Debug, Clone)]
pub struct EncodedFrame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

/// Stateless PNG→JPEG transcoder.
#[derive(Debug, Clone)]
pub struct FrameTranscoder {
    config: TranscodeConfig,
}

impl FrameTranscoder {
    pub fn new(config: TranscodeConfig) -> Self {
        Self { config }
    }

    pub fn transcode(&self, raw: &[u8]) -> Result<EncodedFrame> {
        let img = image::load_from_memory(raw)?;

        let img = if img.width().max(img.height()) > self.config.max_edge {
            // Aspect ratio is preserved; both dimensions are bounded.
            img.resize(
                self.config.max_edge,
                self.config.max_edge,
                FilterType::Lanczos3,
            )
        } else {
            img
        };

        let rgb = img.to_rgb8();
        let (width, height) = (rgb.width(), rgb.height());

        let mut data = Vec::new();
        let encoder =
            JpegEncoder::new_with_quality(Cursor::new(&mut data), self.config.jpeg_quality);
        rgb.write_with_encoder(encoder)?;

        Ok(EncodedFrame {
            width,
            height,
            data,
        })
    }
}
