use thiserror::Error;

use crate::Stage;

/// A type-erased error reported by a stage.
pub type BoxedError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur during [`BakePipeline::bake`](crate::BakePipeline::bake).
///
/// Every structure the bake held at the point of failure has been released by the time this is returned.
#[derive(Error, Debug)]
pub enum BakeError {
    /// An intermediate structure could not be allocated.
    #[error("Failed to allocate the {stage}")]
    Memory {
        /// The structure that could not be allocated
        stage: Stage,
        /// The underlying error
        #[source]
        source: BoxedError,
    },
    /// Rasterizing the triangles failed.
    #[error("Failed to rasterize triangles")]
    Rasterize(#[source] BoxedError),
    /// Building the compact heightfield failed.
    #[error("Failed to build the compact heightfield")]
    BuildCompactHeightfield(#[source] BoxedError),
    /// Layer partitioning failed.
    #[error("Failed to build layer regions")]
    BuildLayerRegions(#[source] BoxedError),
    /// Monotone partitioning failed.
    #[error("Failed to build monotone regions")]
    BuildRegionsMonotone(#[source] BoxedError),
    /// Building the distance field for watershed partitioning failed.
    #[error("Failed to build the distance field")]
    BuildDistanceField(#[source] BoxedError),
    /// Watershed partitioning failed.
    #[error("Failed to build watershed regions")]
    BuildRegions(#[source] BoxedError),
    /// The contour set could not be allocated.
    #[error("Failed to allocate the contour set")]
    AllocContourSet(#[source] BoxedError),
    /// Tracing the contours failed.
    #[error("Failed to build contours")]
    BuildContours(#[source] BoxedError),
    /// The heightfield could not be initialized.
    #[error("Failed to create the heightfield")]
    CreateHeightfield(#[source] BoxedError),
    /// The polygon mesh could not be allocated.
    #[error("Failed to allocate the polygon mesh")]
    AllocPolyMesh(#[source] BoxedError),
    /// Building the polygon mesh failed.
    #[error("Failed to build the polygon mesh")]
    BuildPolyMesh(#[source] BoxedError),
    /// The detail mesh could not be allocated.
    #[error("Failed to allocate the detail mesh")]
    AllocDetailMesh(#[source] BoxedError),
    /// Building the detail mesh failed.
    #[error("Failed to build the detail mesh")]
    BuildDetailMesh(#[source] BoxedError),
}

impl BakeError {
    /// The host-facing status code of this error.
    pub fn status(&self) -> BakeStatus {
        match self {
            BakeError::Memory { .. } => BakeStatus::Memory,
            BakeError::Rasterize(_) => BakeStatus::Rasterize,
            BakeError::BuildCompactHeightfield(_) => BakeStatus::BuildCompactHeightfield,
            BakeError::BuildLayerRegions(_) => BakeStatus::BuildLayerRegions,
            BakeError::BuildRegionsMonotone(_) => BakeStatus::BuildRegionsMonotone,
            BakeError::BuildDistanceField(_) => BakeStatus::BuildDistanceField,
            BakeError::BuildRegions(_) => BakeStatus::BuildRegions,
            BakeError::AllocContourSet(_) => BakeStatus::AllocContourSet,
            BakeError::BuildContours(_) => BakeStatus::BuildContours,
            BakeError::CreateHeightfield(_) => BakeStatus::CreateHeightfield,
            BakeError::AllocPolyMesh(_) => BakeStatus::AllocPolyMesh,
            BakeError::BuildPolyMesh(_) => BakeStatus::BuildPolyMesh,
            BakeError::AllocDetailMesh(_) => BakeStatus::AllocDetailMesh,
            BakeError::BuildDetailMesh(_) => BakeStatus::BuildDetailMesh,
        }
    }

    pub(crate) fn memory(stage: Stage, source: impl Into<BoxedError>) -> Self {
        BakeError::Memory {
            stage,
            source: source.into(),
        }
    }
}

/// The numeric outcome of a bake, as reported to hosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum BakeStatus {
    /// The bake succeeded.
    Ok = 0,
    /// See [`BakeError::Memory`].
    Memory = 1,
    /// See [`BakeError::Rasterize`].
    Rasterize = 2,
    /// See [`BakeError::BuildCompactHeightfield`].
    BuildCompactHeightfield = 3,
    /// See [`BakeError::BuildLayerRegions`].
    BuildLayerRegions = 4,
    /// See [`BakeError::BuildRegionsMonotone`].
    BuildRegionsMonotone = 5,
    /// See [`BakeError::BuildDistanceField`].
    BuildDistanceField = 6,
    /// See [`BakeError::BuildRegions`].
    BuildRegions = 7,
    /// See [`BakeError::AllocContourSet`].
    AllocContourSet = 8,
    /// See [`BakeError::BuildContours`].
    BuildContours = 9,
    /// See [`BakeError::CreateHeightfield`].
    CreateHeightfield = 10,
    /// See [`BakeError::AllocPolyMesh`].
    AllocPolyMesh = 11,
    /// See [`BakeError::BuildPolyMesh`].
    BuildPolyMesh = 12,
    /// See [`BakeError::AllocDetailMesh`].
    AllocDetailMesh = 13,
    /// See [`BakeError::BuildDetailMesh`].
    BuildDetailMesh = 14,
}

impl BakeStatus {
    /// The status of a bake result.
    pub fn of<T>(result: &Result<T, BakeError>) -> Self {
        match result {
            Ok(_) => BakeStatus::Ok,
            Err(err) => err.status(),
        }
    }

    /// The numeric code.
    #[inline]
    pub fn code(self) -> u8 {
        self as u8
    }
}

/// Errors that can occur when building a navmesh tile.
#[derive(Error, Debug)]
pub enum BlobError {
    /// The polygons have more vertex slots than a navmesh tile supports.
    #[error("Polygons have up to {vertices_per_polygon} vertices, but navmesh tiles support at most {max}")]
    VerticesExceeded {
        /// The requested number of vertices per polygon
        vertices_per_polygon: u16,
        /// The supported maximum
        max: usize,
    },
    /// The serializer rejected the mesh.
    #[error("Failed to build navmesh data")]
    BuildNavmesh(#[source] BoxedError),
}

impl BlobError {
    /// The host-facing status code of this error. Success is 0.
    pub fn code(&self) -> u8 {
        match self {
            BlobError::VerticesExceeded { .. } => 1,
            BlobError::BuildNavmesh(_) => 2,
        }
    }
}

/// Errors that can occur when extracting a render mesh.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractError {
    /// An output buffer could not be allocated.
    #[error("Failed to allocate {len} elements for the {buffer} buffer")]
    OutOfMemory {
        /// The buffer that could not be allocated
        buffer: &'static str,
        /// The requested length
        len: usize,
    },
}
