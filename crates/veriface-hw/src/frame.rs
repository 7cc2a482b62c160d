//! Pixel-format conversion — YUYV and GREY to the RGB the encoding backends
//! expect (the capture source and the face services disagree on channel
//! order, so every frame passes through here).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("buffer too short: expected {expected}, got {actual}")]
    BufferTooShort { expected: usize, actual: usize },
}

/// Convert packed YUYV 4:2:2 to RGB888.
///
/// YUYV packs two pixels per 4 bytes: [Y0, U, Y1, V]; U and V are shared by
/// the pixel pair. BT.601 integer conversion.
pub fn yuyv_to_rgb(yuyv: &[u8], width: u32, height: u32) -> Result<Vec<u8>, ConvertError> {
    let expected = (width * height * 2) as usize;
    if yuyv.len() < expected {
        return Err(ConvertError::BufferTooShort {
            expected,
            actual: yuyv.len(),
        });
    }

    let mut rgb = Vec::with_capacity((width * height * 3) as usize);
    for chunk in yuyv[..expected].chunks_exact(4) {
        let [y0, u, y1, v] = [chunk[0], chunk[1], chunk[2], chunk[3]];
        push_yuv(&mut rgb, y0, u, v);
        push_yuv(&mut rgb, y1, u, v);
    }
    Ok(rgb)
}

/// Expand 8-bit grayscale to RGB888 by channel replication.
pub fn grey_to_rgb(grey: &[u8], width: u32, height: u32) -> Result<Vec<u8>, ConvertError> {
    let expected = (width * height) as usize;
    if grey.len() < expected {
        return Err(ConvertError::BufferTooShort {
            expected,
            actual: grey.len(),
        });
    }

    let mut rgb = Vec::with_capacity(expected * 3);
    for &y in &grey[..expected] {
        rgb.extend_from_slice(&[y, y, y]);
    }
    Ok(rgb)
}

fn push_yuv(rgb: &mut Vec<u8>, y: u8, u: u8, v: u8) {
    let c = y as i32 - 16;
    let d = u as i32 - 128;
    let e = v as i32 - 128;

    let r = (298 * c + 409 * e + 128) >> 8;
    let g = (298 * c - 100 * d - 208 * e + 128) >> 8;
    let b = (298 * c + 516 * d + 128) >> 8;

    rgb.push(r.clamp(0, 255) as u8);
    rgb.push(g.clamp(0, 255) as u8);
    rgb.push(b.clamp(0, 255) as u8);
}
