use image::{imageops, GrayImage, ImageFormat, Luma};
use qrcode::{EcLevel, QrCode};
use serde::Deserialize;
use std::io::Cursor;

use super::credentials::CredentialError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCorrection {
    Low,
    Medium,
    Quartile,
    High,
}

impl From<ErrorCorrection> for EcLevel {
    fn from(level: ErrorCorrection) -> Self {
        match level {
            ErrorCorrection::Low => EcLevel::L,
            ErrorCorrection::Medium => EcLevel::M,
            ErrorCorrection::Quartile => EcLevel::Q,
            ErrorCorrection::High => EcLevel::H,
        }
    }
}

/// Size and robustness of a rendered credential image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QrRenderOptions {
    /// Target edge length. The image is the largest whole multiple of the
    /// module count that fits, or one pixel per module if none does.
    pub size_px: u32,
    /// Quiet zone width in modules.
    pub margin_modules: u32,
    pub error_correction: ErrorCorrection,
}

impl QrRenderOptions {
    /// For display on a phone or monitor.
    pub fn screen() -> Self {
        Self {
            size_px: 300,
            margin_modules: 2,
            error_correction: ErrorCorrection::Medium,
        }
    }

    /// For printed or PDF tickets, which get photographed and scanned under
    /// worse conditions.
    pub fn print() -> Self {
        Self {
            size_px: 600,
            margin_modules: 4,
            error_correction: ErrorCorrection::High,
        }
    }
}

impl Default for QrRenderOptions {
    fn default() -> Self {
        Self::screen()
    }
}

pub fn render(payload: &str, options: &QrRenderOptions) -> Result<GrayImage, CredentialError> {
    let code = QrCode::with_error_correction_level(payload.as_bytes(), options.error_correction.into())
        .map_err(|e| CredentialError::Render(e.to_string()))?;

    let modules = code.width() as u32 + 2 * options.margin_modules;
    let module_px = (options.size_px / modules).max(1);

    let symbol = code
        .render::<Luma<u8>>()
        .quiet_zone(false)
        .module_dimensions(module_px, module_px)
        .build();

    let edge = modules * module_px;
    let mut canvas = GrayImage::from_pixel(edge, edge, Luma([255]));
    let offset = i64::from(options.margin_modules * module_px);
    imageops::overlay(&mut canvas, &symbol, offset, offset);
    Ok(canvas)
}

pub fn encode_png(image: &GrayImage) -> Result<Vec<u8>, CredentialError> {
    let mut buffer = Cursor::new(Vec::new());
    image
        .write_to(&mut buffer, ImageFormat::Png)
        .map_err(|e| CredentialError::Render(e.to_string()))?;
    Ok(buffer.into_inner())
}
