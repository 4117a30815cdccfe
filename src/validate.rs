//! Quadrilateral plausibility validation.
//!
//! Pure and stateless: one candidate quad in, accept or a named rejection
//! out. Every check must pass; there is no partial credit and no history.
//! This sits between the quad detector and the tracker so that only
//! plausibly square, plausibly sized shapes ever acquire identity.

use serde::Deserialize;

use crate::geometry::Quad;

#[derive(Clone, Copy, Debug, Deserialize)]
pub struct QuadValidatorConfig {
    /// Minimum detector confidence.
    pub min_confidence: f32,
    /// Minimum area as a fraction of the (normalized) frame area.
    pub min_area_fraction: f32,
    /// Allowed width/height ratio band.
    pub min_aspect_ratio: f32,
    pub max_aspect_ratio: f32,
    /// Opposite sides must agree within this fraction of the longer side.
    pub side_tolerance: f32,
    /// Interior angles must sit within this band around 90 degrees.
    pub corner_angle_tolerance_deg: f32,
}

impl Default for QuadValidatorConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.5,
            min_area_fraction: 0.01,
            min_aspect_ratio: 0.5,
            max_aspect_ratio: 2.0,
            side_tolerance: 0.15,
            corner_angle_tolerance_deg: 20.0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum QuadRejection {
    #[error("confidence below threshold")]
    LowConfidence,
    #[error("area below minimum frame fraction")]
    TooSmall,
    #[error("aspect ratio outside allowed band")]
    Elongated,
    #[error("opposite sides unequal beyond tolerance")]
    UnequalSides,
    #[error("corner angle outside band around 90 degrees")]
    SkewedCorner,
}

/// Validate one candidate quadrilateral. Checks run cheapest first and the
/// first failure wins.
pub fn validate_quad(
    cfg: &QuadValidatorConfig,
    quad: &Quad,
    confidence: f32,
) -> Result<(), QuadRejection> {
    if confidence < cfg.min_confidence {
        return Err(QuadRejection::LowConfidence);
    }

    if quad.area() < cfg.min_area_fraction {
        return Err(QuadRejection::TooSmall);
    }

    let sides = quad.side_lengths();
    let width = (sides[0] + sides[2]) / 2.0;
    let height = (sides[1] + sides[3]) / 2.0;
    if height <= 0.0 {
        return Err(QuadRejection::Elongated);
    }
    let aspect = width / height;
    if aspect < cfg.min_aspect_ratio || aspect > cfg.max_aspect_ratio {
        return Err(QuadRejection::Elongated);
    }

    for (a, b) in [(sides[0], sides[2]), (sides[1], sides[3])] {
        let longer = a.max(b);
        if longer <= 0.0 || (a - b).abs() / longer > cfg.side_tolerance {
            return Err(QuadRejection::UnequalSides);
        }
    }

    for angle in quad.interior_angles() {
        if (angle - 90.0).abs() > cfg.corner_angle_tolerance_deg {
            return Err(QuadRejection::SkewedCorner);
        }
    }

    Ok(())
}
