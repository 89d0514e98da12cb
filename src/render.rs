//! Renderer: converts a decoded photo to RGBA8, resizes and center-crops it
//! to exactly fill the framebuffer (fill-to-cover), and blits it with an
//! explicit flush.

use anyhow::{Context, Result, ensure};
use fast_image_resize as fir;
use image::{DynamicImage, RgbaImage, imageops};

use crate::fb::Framebuffer;

/// Displays one decoded photo on the framebuffer.
pub fn show(fb: &mut Framebuffer, image: &DynamicImage) -> Result<()> {
    let source = image.to_rgba8();
    let framed = compose_cover(&source, fb.width(), fb.height())?;
    fb.blit(&framed)?;
    fb.flush()
}

/// Fill-to-cover compose: scales the source so both axes cover the target,
/// then crops the excess with a centered anchor. The output is always
/// exactly `target_w` x `target_h`.
pub fn compose_cover(source: &RgbaImage, target_w: u32, target_h: u32) -> Result<RgbaImage> {
    ensure!(
        target_w > 0 && target_h > 0,
        "target dimensions must be positive"
    );
    let (fill_w, fill_h) = cover_dimensions(target_w, target_h, source.width(), source.height());
    let resized = resize_rgba(source, fill_w, fill_h)?;
    if fill_w == target_w && fill_h == target_h {
        return Ok(resized);
    }
    let crop_x = fill_w.saturating_sub(target_w) / 2;
    let crop_y = fill_h.saturating_sub(target_h) / 2;
    Ok(imageops::crop_imm(&resized, crop_x, crop_y, target_w, target_h).to_image())
}

/// Smallest scaled size that covers the target on both axes while keeping
/// the source aspect ratio. Rounding never drops below the target.
fn cover_dimensions(target_w: u32, target_h: u32, src_w: u32, src_h: u32) -> (u32, u32) {
    let iw = src_w.max(1) as f32;
    let ih = src_h.max(1) as f32;
    let tw = target_w.max(1) as f32;
    let th = target_h.max(1) as f32;
    let scale = (tw / iw).max(th / ih);
    let w = ((iw * scale).round() as u32).max(target_w);
    let h = ((ih * scale).round() as u32).max(target_h);
    (w, h)
}

fn resize_rgba(source: &RgbaImage, target_w: u32, target_h: u32) -> Result<RgbaImage> {
    if source.width() == target_w && source.height() == target_h {
        return Ok(source.clone());
    }

    let src_view = fir::images::ImageRef::new(
        source.width(),
        source.height(),
        source.as_raw(),
        fir::PixelType::U8x4,
    )
    .context("failed to create source view for resize")?;
    let mut dst_image = fir::images::Image::new(target_w, target_h, fir::PixelType::U8x4);
    let options =
        fir::ResizeOptions::new().resize_alg(fir::ResizeAlg::Convolution(fir::FilterType::Lanczos3));
    let mut resizer = fir::Resizer::new();
    resizer
        .resize(&src_view, &mut dst_image, Some(&options))
        .context("cover resize failed")?;
    let buffer = dst_image.into_vec();
    RgbaImage::from_raw(target_w, target_h, buffer)
        .ok_or_else(|| anyhow::anyhow!("failed to construct resized RGBA image"))
}
