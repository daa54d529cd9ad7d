use qrcode::{QrCode, render::unicode::Dense1x2, types::QrError};

/// Render a login challenge as a block-character QR code for a terminal.
///
/// Colors are inverted so the code scans on dark terminal backgrounds.
pub fn render_terminal(payload: &str) -> Result<String, QrError> {
    let code = QrCode::new(payload.as_bytes())?;
    Ok(code
        .render::<Dense1x2>()
        .dark_color(Dense1x2::Light)
        .light_color(Dense1x2::Dark)
        .quiet_zone(true)
        .build())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_a_multi_line_block() {
        let rendered = render_terminal("2@abcDEF,ghiJKL,mnoPQR,1").unwrap();
        let lines: Vec<&str> = rendered.lines().collect();
        assert!(lines.len() > 10);
        assert!(lines.iter().all(|l| l.chars().count() == lines[0].chars().count()));
    }

    #[test]
    fn oversized_payload_is_an_error() {
        let payload = "x".repeat(8_000);
        assert!(render_terminal(&payload).is_err());
    }
}
