//! Output-size and zoom-scale arithmetic for resized renders.

use crate::options::FixDimension;

/// Pixel size plus zoom scale of a flame, before or after a resize.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameGeometry {
    pub width: u32,
    pub height: u32,
    pub scale: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResizeRequest {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub fix: Option<FixDimension>,
    pub keep_ratio: bool,
}

impl ResizeRequest {
    pub fn is_requested(&self) -> bool {
        self.width.is_some() || self.height.is_some()
    }
}

/// Computes the resized geometry, or `None` when no dimension was requested.
///
/// The zoom scale follows the ratio of the basis dimension so the composition
/// stays visually identical. With both dimensions requested the other one is
/// taken verbatim (cropping or expanding the frame) unless `keep_ratio` asks
/// for it to be recomputed from the source aspect ratio.
pub fn resize(original: FrameGeometry, request: &ResizeRequest) -> Option<FrameGeometry> {
    let width = f64::from(original.width);
    let height = f64::from(original.height);

    let (new_width, new_height, ratio) = match (request.width, request.height) {
        (None, None) => return None,
        (Some(new_width), None) => {
            let ratio = f64::from(new_width) / width;
            (new_width, scaled(height, ratio), ratio)
        }
        (None, Some(new_height)) => {
            let ratio = f64::from(new_height) / height;
            (scaled(width, ratio), new_height, ratio)
        }
        (Some(new_width), Some(new_height)) => {
            let basis = request.fix.unwrap_or_else(|| {
                let requested_aspect = f64::from(new_width) / f64::from(new_height);
                if requested_aspect > width / height {
                    FixDimension::Height
                } else {
                    FixDimension::Width
                }
            });

            match basis {
                FixDimension::Height => {
                    let ratio = f64::from(new_height) / height;
                    let new_width = if request.keep_ratio {
                        scaled(width, ratio)
                    } else {
                        new_width
                    };
                    (new_width, new_height, ratio)
                }
                FixDimension::Width => {
                    let ratio = f64::from(new_width) / width;
                    let new_height = if request.keep_ratio {
                        scaled(height, ratio)
                    } else {
                        new_height
                    };
                    (new_width, new_height, ratio)
                }
            }
        }
    };

    Some(FrameGeometry {
        width: new_width,
        height: new_height,
        scale: original.scale * ratio,
    })
}

fn scaled(dimension: f64, ratio: f64) -> u32 {
    // Positive sizes are a descriptor invariant; never round down to zero.
    ((dimension * ratio).round() as u32).max(1)
}
