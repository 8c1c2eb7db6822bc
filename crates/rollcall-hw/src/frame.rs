//! Frame type and pixel conversion: YUYV/RGB/GREY to BGR, dark detection.

/// A captured camera frame, 3 bytes per pixel in BGR order.
#[derive(Clone)]
pub struct Frame {
    /// BGR pixel data (width * height * 3 bytes).
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub sequence: u32,
    pub is_dark: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid {format} length: expected {expected}, got {actual}")]
    InvalidLength {
        format: &'static str,
        expected: usize,
        actual: usize,
    },
}

fn check_len(format: &'static str, buf: &[u8], expected: usize) -> Result<(), FrameError> {
    if buf.len() < expected {
        return Err(FrameError::InvalidLength {
            format,
            expected,
            actual: buf.len(),
        });
    }
    Ok(())
}

/// Convert packed YUYV (4:2:2) to BGR using BT.601 limited-range coefficients.
///
/// YUYV packs two pixels per 4 bytes: [Y0, U, Y1, V], sharing chroma.
pub fn yuyv_to_bgr(yuyv: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let pixels = (width * height) as usize;
    check_len("YUYV", yuyv, pixels * 2)?;

    let mut bgr = Vec::with_capacity(pixels * 3);
    for chunk in yuyv[..pixels * 2].chunks_exact(4) {
        let (y0, u, y1, v) = (chunk[0], chunk[1], chunk[2], chunk[3]);
        push_bgr(&mut bgr, y0, u, v);
        push_bgr(&mut bgr, y1, u, v);
    }
    // Odd widths leave a final half-macropixel.
    if pixels % 2 == 1 {
        let tail = &yuyv[(pixels - 1) * 2..pixels * 2];
        push_bgr(&mut bgr, tail[0], tail[1], 128);
    }
    Ok(bgr)
}

fn push_bgr(out: &mut Vec<u8>, y: u8, u: u8, v: u8) {
    let c = (y as f32 - 16.0) * 1.164;
    let d = u as f32 - 128.0;
    let e = v as f32 - 128.0;
    let r = c + 1.596 * e;
    let g = c - 0.392 * d - 0.813 * e;
    let b = c + 2.017 * d;
    out.push(b.round().clamp(0.0, 255.0) as u8);
    out.push(g.round().clamp(0.0, 255.0) as u8);
    out.push(r.round().clamp(0.0, 255.0) as u8);
}

/// Reorder packed RGB24 to BGR.
pub fn rgb_to_bgr(rgb: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let expected = (width * height * 3) as usize;
    check_len("RGB3", rgb, expected)?;
    Ok(rgb[..expected]
        .chunks_exact(3)
        .flat_map(|px| [px[2], px[1], px[0]])
        .collect())
}

/// Replicate 8-bit grayscale into three channels.
pub fn grey_to_bgr(gray: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let expected = (width * height) as usize;
    check_len("GREY", gray, expected)?;
    Ok(gray[..expected].iter().flat_map(|&g| [g, g, g]).collect())
}

/// Integer BT.601 luma of each BGR pixel.
pub fn bgr_luma(bgr: &[u8]) -> Vec<u8> {
    bgr.chunks_exact(3)
        .map(|px| ((29 * px[0] as u32 + 150 * px[1] as u32 + 77 * px[2] as u32) >> 8) as u8)
        .collect()
}

/// True if more than `threshold_pct` of pixels fall in the darkest bucket (0–31).
pub fn is_dark_frame(luma: &[u8], threshold_pct: f32) -> bool {
    if luma.is_empty() {
        return true;
    }
    let dark_count = luma.iter().filter(|&&p| p < 32).count();
    (dark_count as f32 / luma.len() as f32) > threshold_pct
}
