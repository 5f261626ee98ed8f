use base64::{Engine as _, engine::general_purpose::STANDARD};
use qrcode::render::svg;
use qrcode::{EcLevel, QrCode};

/// Renders `data` as a QR symbol and returns the SVG document base64-encoded,
/// ready to drop into `data:image/svg+xml;base64,...`.
pub fn render_svg_base64(data: &str) -> Result<String, qrcode::types::QrError> {
    let code = QrCode::with_error_correction_level(data.as_bytes(), EcLevel::L)?;
    let image = code
        .render::<svg::Color<'_>>()
        .min_dimensions(256, 256)
        .quiet_zone(true)
        .dark_color(svg::Color("#000000"))
        .light_color(svg::Color("#ffffff"))
        .build();
    Ok(STANDARD.encode(image.as_bytes()))
}
