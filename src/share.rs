use std::io::Cursor;

use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb, RgbImage};
use qrcode::{Color, QrCode};

use crate::auth::app_url;
use crate::error::{Error, Result};

pub const QR_DARK: Rgb<u8> = Rgb([0x8B, 0x5C, 0xF6]);
pub const QR_LIGHT: Rgb<u8> = Rgb([0xFF, 0xFF, 0xFF]);
/// Light border around the code, in modules.
pub const QR_MARGIN: u32 = 2;
pub const QR_DEFAULT_SIZE: u32 = 300;

/// Public verification page for a profile.
pub fn profile_url(origin: &str, user_id: &str) -> String {
    app_url(
        origin,
        &format!("/verify?profile={}", urlencoding::encode(user_id)),
    )
}

/// Render `payload` as a QR code no larger than `size` pixels square.
///
/// Modules are whole pixels, so the result may be a little smaller than `size`.
pub fn render_qr(payload: &str, size: u32) -> Result<RgbImage> {
    let code = QrCode::new(payload.as_bytes()).map_err(|e| Error::Qr(e.to_string()))?;
    let width = code.width() as u32;
    let colors = code.to_colors();

    let span = width + 2 * QR_MARGIN;
    let module = (size / span).max(1);
    let side = span * module;
    let img = ImageBuffer::from_fn(side, side, |x, y| {
        let mx = (x / module).checked_sub(QR_MARGIN);
        let my = (y / module).checked_sub(QR_MARGIN);
        match (mx, my) {
            (Some(mx), Some(my)) if mx < width && my < width => {
                match colors[(my * width + mx) as usize] {
                    Color::Dark => QR_DARK,
                    Color::Light => QR_LIGHT,
                }
            }
            _ => QR_LIGHT,
        }
    });
    Ok(img)
}

pub fn qr_png(payload: &str, size: u32) -> Result<Vec<u8>> {
    let img = render_qr(payload, size)?;
    let mut buf = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img).write_to(&mut buf, ImageFormat::Png)?;
    Ok(buf.into_inner())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShareLinks {
    pub whatsapp: String,
    pub email: String,
    pub twitter: String,
    pub facebook: String,
}

pub fn share_text(user_name: Option<&str>, profile_url: &str) -> String {
    format!(
        "Check out {}'s verified digital identity: {}",
        user_name.unwrap_or("My Profile"),
        profile_url
    )
}

pub fn share_links(user_name: Option<&str>, profile_url: &str) -> ShareLinks {
    let text = urlencoding::encode(&share_text(user_name, profile_url)).into_owned();
    let url = urlencoding::encode(profile_url);
    ShareLinks {
        whatsapp: format!("https://wa.me/?text={}", text),
        email: format!(
            "mailto:?subject={}&body={}",
            urlencoding::encode("Verified Digital Identity"),
            text
        ),
        twitter: format!("https://twitter.com/intent/tweet?text={}", text),
        facebook: format!("https://www.facebook.com/sharer/sharer.php?u={}", url),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_url_uses_origin() {
        assert_eq!(
            profile_url("https://id.example.org/", "4f1c-22"),
            "https://id.example.org/verify?profile=4f1c-22"
        );
    }

    #[test]
    fn qr_fits_requested_size_with_light_border() {
        let img = render_qr("https://id.example.org/verify?profile=abc", 300).unwrap();
        assert_eq!(img.width(), img.height());
        assert!(img.width() <= 300);
        assert!(img.width() > 150);
        assert_eq!(img.get_pixel(0, 0), &QR_LIGHT);
        assert!(img.pixels().any(|p| *p == QR_DARK));
        assert!(img.pixels().all(|p| *p == QR_DARK || *p == QR_LIGHT));
    }

    #[test]
    fn tiny_size_still_renders_one_pixel_modules() {
        let img = render_qr("x", 1).unwrap();
        // version 1 is 21 modules wide plus the border
        assert_eq!(img.width(), 21 + 2 * QR_MARGIN);
    }

    #[test]
    fn qr_png_is_png() {
        let png = qr_png("hello", 100).unwrap();
        assert_eq!(&png[1..4], b"PNG");
    }

    #[test]
    fn share_links_are_encoded() {
        let links = share_links(Some("Ada"), "https://id.example.org/verify?profile=1");
        assert!(links.whatsapp.starts_with("https://wa.me/?text=Check%20out%20Ada"));
        assert!(links
            .facebook
            .ends_with("u=https%3A%2F%2Fid.example.org%2Fverify%3Fprofile%3D1"));
        assert!(links.email.starts_with("mailto:?subject=Verified%20Digital%20Identity&body="));
        assert!(!links.twitter.contains(' '));
    }

    #[test]
    fn share_text_defaults_name() {
        assert_eq!(
            share_text(None, "u"),
            "Check out My Profile's verified digital identity: u"
        );
    }
}
