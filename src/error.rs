//! Error taxonomy for road-network reconstruction.
//!
//! Library code returns typed errors; the CLI wraps them in `anyhow` at the
//! application boundary. Derived-geometry generation never aborts a whole
//! network on one bad unit — failures are collected as [`Diagnostic`]s.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// The document violates a structural rule. Loading is atomic: the
    /// first violation rejects the whole document.
    #[error("validation failed: {0}")]
    Validation(String),

    /// An s-coordinate or range query outside the valid interval.
    #[error("out of range: {0}")]
    Range(String),

    /// Input uses a combination the engine deliberately refuses instead of
    /// producing silently wrong geometry.
    #[error("unsupported feature: {0}")]
    UnsupportedFeature(String),

    /// Derived-geometry generation failed for reasons other than the above.
    #[error("geometry error: {0}")]
    Geometry(String),

    #[error("malformed XML: {0}")]
    Xml(#[from] roxmltree::Error),

    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// One isolated failure during derived-geometry generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub road_id: String,
    pub lane_section: Option<usize>,
    pub lane_id: Option<i32>,
    pub message: String,
}

impl Diagnostic {
    pub fn road(road_id: &str, message: String) -> Self {
        Diagnostic {
            road_id: road_id.to_string(),
            lane_section: None,
            lane_id: None,
            message,
        }
    }

    pub fn with_section(mut self, lane_section: usize) -> Self {
        self.lane_section = Some(lane_section);
        self
    }

    pub fn lane(road_id: &str, lane_section: usize, lane_id: i32, message: String) -> Self {
        Diagnostic {
            road_id: road_id.to_string(),
            lane_section: Some(lane_section),
            lane_id: Some(lane_id),
            message,
        }
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "road#{}", self.road_id)?;
        if let Some(section) = self.lane_section {
            write!(f, " laneSection#{section}")?;
        }
        if let Some(lane) = self.lane_id {
            write!(f, " lane#{lane}")?;
        }
        write!(f, ": {}", self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = Error::Validation("road 5 has no geometry".to_string());
        assert_eq!(err.to_string(), "validation failed: road 5 has no geometry");

        let err = Error::UnsupportedFeature("lane offset on arc".to_string());
        assert!(err.to_string().contains("unsupported feature"));
    }

    #[test]
    fn diagnostic_display() {
        let d = Diagnostic::lane("12", 1, -2, "width sampling failed".to_string());
        assert_eq!(d.to_string(), "road#12 laneSection#1 lane#-2: width sampling failed");

        let d = Diagnostic::road("7", "no successor".to_string());
        assert_eq!(d.to_string(), "road#7: no successor");
    }
}
