//! # Roadweave
//!
//! Road-network reconstruction from OpenDRIVE (`.xodr`) documents.
//!
//! Loading is atomic: [`parse::load`] validates the whole document and the
//! first violation rejects it. Everything derived afterwards is isolated
//! per unit: resolving geometry, lane boundaries or poses returns the
//! successful results alongside a list of [`Diagnostic`]s instead of
//! failing the whole network.
//!
//! ```no_run
//! use std::path::Path;
//!
//! let network = roadweave::parse::load(Path::new("town.xodr"))?;
//! let (resolved, diagnostics) = roadweave::resolve::resolve_network(&network);
//! let (boundaries, _) = roadweave::boundary::network_boundaries(&network, &resolved);
//! # Ok::<(), roadweave::Error>(())
//! ```

pub mod boundary;
pub mod connect;
pub mod error;
pub mod model;
pub mod parse;
pub mod profile;
pub mod resolve;
pub mod sample;
pub mod transform;

pub use error::{Diagnostic, Error, Result};
pub use model::RoadNetwork;
pub use sample::{Vec3, SAMPLE_STEP};
pub use transform::{track_to_inertial, Pose};
