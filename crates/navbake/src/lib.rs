#![doc = include_str!("../../../readme.md")]

pub mod backend;
mod blob;
mod config;
mod error;
mod extract;
mod flags;
mod geometry;
mod native;
mod pipeline;

pub use backend::{DetailMeshView, PolyMeshView, RecastBackend, Stage, StageResource};
pub use blob::{NavmeshBlob, PolygonFlagging};
pub use config::{AgentParams, BakeConfig, BakeConfigBuilder};
pub use error::{BakeError, BakeStatus, BlobError, BoxedError, ExtractError};
pub use extract::{ExtractedMesh, VERTICAL_CLEARANCE, extract_mesh};
pub use flags::{BakeFlags, BakeOptions, PartitionStrategy};
pub use geometry::{GeometryError, InputGeometry};
pub use native::{NativeBackend, NativeError};
pub use pipeline::{BakeOutput, BakePipeline};

pub use navbake_recast as recast;
