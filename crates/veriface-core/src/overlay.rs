//! Overlay rendering — bounding boxes and match/no-match styling drawn onto
//! the full-resolution frame.

use crate::types::FaceLocation;
use image::{Rgb, RgbImage};

const MATCH_COLOR: Rgb<u8> = Rgb([0, 200, 0]);
const NO_MATCH_COLOR: Rgb<u8> = Rgb([220, 40, 40]);
const BORDER_PX: u32 = 2;
const TAG_HEIGHT: u32 = 12;

/// Draw one rectangle plus a tag bar per (location, match) pair.
///
/// `scale` is the downscale factor the locations were produced under; every
/// location is mapped back to full-frame coordinates before drawing. The
/// frame is mutated in place; drawing clips at the frame edges.
pub fn draw_overlays(frame: &mut RgbImage, overlays: &[(FaceLocation, bool)], scale: u32) {
    for (location, matched) in overlays {
        let color = if *matched { MATCH_COLOR } else { NO_MATCH_COLOR };
        let full = location.scaled(scale);
        draw_box(frame, &full, color);
        draw_tag(frame, &full, color);
    }
}

/// Hollow rectangle with a `BORDER_PX`-thick border.
fn draw_box(frame: &mut RgbImage, rect: &FaceLocation, color: Rgb<u8>) {
    let (w, h) = (frame.width(), frame.height());
    let left = rect.left.min(w);
    let right = rect.right.min(w);
    let top = rect.top.min(h);
    let bottom = rect.bottom.min(h);

    for y in top..bottom {
        for x in left..right {
            let on_vertical = x < left + BORDER_PX || x + BORDER_PX >= right;
            let on_horizontal = y < top + BORDER_PX || y + BORDER_PX >= bottom;
            if on_vertical || on_horizontal {
                frame.put_pixel(x, y, color);
            }
        }
    }
}

/// Filled tag bar sitting just above the box (or inside its top edge when
/// the box touches the top of the frame). Stands in for the MATCH / NO MATCH
/// label text: the status itself is also logged by the loop.
fn draw_tag(frame: &mut RgbImage, rect: &FaceLocation, color: Rgb<u8>) {
    let (w, h) = (frame.width(), frame.height());
    let left = rect.left.min(w);
    let right = rect.right.min(w);
    if left >= right {
        return;
    }

    let top = rect.top.saturating_sub(TAG_HEIGHT).min(h);
    let bottom = rect.top.min(h);
    for y in top..bottom {
        for x in left..right {
            frame.put_pixel(x, y, color);
        }
    }
}
