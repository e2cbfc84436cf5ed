//! Frame type and image processing: YUYV conversion, dark detection, JPEG encoding.

use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;
use std::path::Path;

/// Pixel layout of a captured frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelLayout {
    /// 8-bit luma, 1 byte/pixel.
    Luma8,
    /// Packed RGB, 3 bytes/pixel.
    Rgb8,
}

impl PixelLayout {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelLayout::Luma8 => 1,
            PixelLayout::Rgb8 => 3,
        }
    }

    fn color_type(self) -> ExtendedColorType {
        match self {
            PixelLayout::Luma8 => ExtendedColorType::L8,
            PixelLayout::Rgb8 => ExtendedColorType::Rgb8,
        }
    }
}

/// A captured camera still.
#[derive(Clone)]
pub struct Frame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub layout: PixelLayout,
    pub timestamp: std::time::Instant,
    pub sequence: u32,
    pub is_dark: bool,
}

impl Frame {
    /// Average sample value (0.0–255.0) across all channels.
    pub fn avg_brightness(&self) -> f32 {
        if self.data.is_empty() {
            return 0.0;
        }
        self.data.iter().map(|&b| b as f32).sum::<f32>() / self.data.len() as f32
    }

    /// Encode the frame as a baseline JPEG.
    pub fn to_jpeg(&self, quality: u8) -> Result<Vec<u8>, FrameError> {
        let expected = self.width as usize * self.height as usize * self.layout.bytes_per_pixel();
        if self.data.len() < expected {
            return Err(FrameError::InvalidLength {
                expected,
                actual: self.data.len(),
            });
        }

        let mut out = Vec::new();
        JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100)).encode(
            &self.data[..expected],
            self.width,
            self.height,
            self.layout.color_type(),
        )?;
        Ok(out)
    }
}

/// Convert packed YUYV (4:2:2) to grayscale by extracting the Y channel.
///
/// YUYV packs two pixels per 4 bytes: [Y0, U, Y1, V].
/// Grayscale = every even-indexed byte.
pub fn yuyv_to_grayscale(yuyv: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let expected = (width * height * 2) as usize;
    if yuyv.len() < expected {
        return Err(FrameError::InvalidLength {
            expected,
            actual: yuyv.len(),
        });
    }
    Ok(yuyv[..expected].iter().step_by(2).copied().collect())
}

/// Convert packed YUYV (4:2:2) to RGB24 using BT.601 limited-range coefficients.
pub fn yuyv_to_rgb(yuyv: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let expected = (width * height * 2) as usize;
    if yuyv.len() < expected {
        return Err(FrameError::InvalidLength {
            expected,
            actual: yuyv.len(),
        });
    }

    let mut rgb = Vec::with_capacity((width * height * 3) as usize);
    for chunk in yuyv[..expected].chunks_exact(4) {
        let (y0, u, y1, v) = (chunk[0], chunk[1], chunk[2], chunk[3]);
        rgb.extend_from_slice(&ycbcr_to_rgb(y0, u, v));
        rgb.extend_from_slice(&ycbcr_to_rgb(y1, u, v));
    }
    Ok(rgb)
}

fn ycbcr_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
    let c = (y as f32 - 16.0) * 1.164;
    let d = u as f32 - 128.0;
    let e = v as f32 - 128.0;
    let r = c + 1.596 * e;
    let g = c - 0.392 * d - 0.813 * e;
    let b = c + 2.017 * d;
    [
        r.round().clamp(0.0, 255.0) as u8,
        g.round().clamp(0.0, 255.0) as u8,
        b.round().clamp(0.0, 255.0) as u8,
    ]
}

/// Check if a frame is dark.
///
/// Returns true if more than `threshold_pct` of pixels fall in the darkest
/// bucket (0–31).
pub fn is_dark_frame(gray: &[u8], threshold_pct: f32) -> bool {
    if gray.is_empty() {
        return true;
    }
    let dark_count = gray.iter().filter(|&&p| p < 32).count();
    (dark_count as f32 / gray.len() as f32) > threshold_pct
}

/// Load any image file the `image` crate understands and re-encode it as JPEG.
pub fn image_file_to_jpeg(path: &Path, quality: u8) -> Result<Vec<u8>, FrameError> {
    let rgb = image::open(path)?.to_rgb8();
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100)).encode(
        rgb.as_raw(),
        rgb.width(),
        rgb.height(),
        ExtendedColorType::Rgb8,
    )?;
    Ok(out)
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid frame length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(data: Vec<u8>, width: u32, height: u32, layout: PixelLayout) -> Frame {
        Frame {
            data,
            width,
            height,
            layout,
            timestamp: std::time::Instant::now(),
            sequence: 0,
            is_dark: false,
        }
    }

    #[test]
    fn test_yuyv_to_grayscale() {
        // 2x1 image: [Y0=100, U=128, Y1=200, V=128]
        let yuyv = vec![100, 128, 200, 128];
        let gray = yuyv_to_grayscale(&yuyv, 2, 1).unwrap();
        assert_eq!(gray, vec![100, 200]);
    }

    #[test]
    fn test_yuyv_invalid_length() {
        let yuyv = vec![100, 128]; // too short for 2x1
        assert!(yuyv_to_grayscale(&yuyv, 2, 1).is_err());
        assert!(yuyv_to_rgb(&yuyv, 2, 1).is_err());
    }

    #[test]
    fn test_yuyv_to_rgb_neutral_chroma_is_gray() {
        // Neutral chroma (128) yields R == G == B.
        let yuyv = vec![16, 128, 235, 128];
        let rgb = yuyv_to_rgb(&yuyv, 2, 1).unwrap();
        assert_eq!(rgb.len(), 6);
        assert_eq!(&rgb[..3], &[0, 0, 0]);
        assert_eq!(&rgb[3..], &[255, 255, 255]);
    }

    #[test]
    fn test_yuyv_to_rgb_red_dominant() {
        // High V (Cr) pushes red up and green down.
        let rgb = yuyv_to_rgb(&[81, 90, 81, 240], 2, 1).unwrap();
        assert!(rgb[0] > 200);
        assert!(rgb[1] < 60);
    }

    #[test]
    fn test_dark_frame_all_black() {
        assert!(is_dark_frame(&vec![0u8; 1000], 0.95));
    }

    #[test]
    fn test_dark_frame_normal() {
        assert!(!is_dark_frame(&vec![128u8; 1000], 0.95));
    }

    #[test]
    fn test_dark_frame_empty() {
        assert!(is_dark_frame(&[], 0.95));
    }

    #[test]
    fn test_dark_frame_borderline_bright() {
        // 94% dark, 6% bright → should NOT be dark
        let mut gray = vec![10u8; 940];
        gray.extend(vec![128u8; 60]);
        assert!(!is_dark_frame(&gray, 0.95));
    }

    #[test]
    fn test_to_jpeg_produces_jpeg_markers() {
        let f = frame(vec![128u8; 16 * 16 * 3], 16, 16, PixelLayout::Rgb8);
        let jpeg = f.to_jpeg(80).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
        assert_eq!(&jpeg[jpeg.len() - 2..], &[0xFF, 0xD9]);
    }

    #[test]
    fn test_to_jpeg_luma() {
        let f = frame(vec![200u8; 8 * 8], 8, 8, PixelLayout::Luma8);
        assert!(f.to_jpeg(90).is_ok());
    }

    #[test]
    fn test_to_jpeg_short_buffer() {
        let f = frame(vec![0u8; 10], 8, 8, PixelLayout::Rgb8);
        assert!(matches!(f.to_jpeg(80), Err(FrameError::InvalidLength { .. })));
    }

    #[test]
    fn test_avg_brightness() {
        let f = frame(vec![0, 100, 200], 1, 1, PixelLayout::Rgb8);
        assert!((f.avg_brightness() - 100.0).abs() < 1e-3);
        let empty = frame(Vec::new(), 0, 0, PixelLayout::Luma8);
        assert_eq!(empty.avg_brightness(), 0.0);
    }
}
