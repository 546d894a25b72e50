//! Pairing-code rendering.
//!
//! The session manager treats rendering as a collaborator behind the
//! [`PairingRenderer`] trait: it hands over the opaque code string and gets
//! back a transportable image representation. The production implementation
//! renders an SVG QR code wrapped in a base64 `data:` URL so the HTTP
//! response can embed it directly.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use qrcode::render::svg;
use qrcode::QrCode;

use crate::{AppError, Result};

/// Renders a pairing code into a transportable image representation.
pub trait PairingRenderer: Send + Sync {
    /// Render `code` into an image `data:` URL.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Render`] if image generation fails; the code
    /// itself remains valid.
    fn render(&self, code: &str) -> Result<String>;
}

/// QR renderer producing `data:image/svg+xml;base64,…` URLs.
#[derive(Debug, Default, Clone, Copy)]
pub struct QrSvgRenderer;

impl PairingRenderer for QrSvgRenderer {
    fn render(&self, code: &str) -> Result<String> {
        let qr = QrCode::new(code.as_bytes())
            .map_err(|err| AppError::Render(format!("failed to encode pairing code: {err}")))?;

        let image = qr
            .render::<svg::Color<'_>>()
            .min_dimensions(256, 256)
            .build();

        Ok(format!(
            "data:image/svg+xml;base64,{}",
            STANDARD.encode(image)
        ))
    }
}
