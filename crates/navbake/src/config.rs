use navbake_recast::{Aabb3d, BuildContoursFlags};

/// Specifies the configuration of a single bake. Usually built using [`BakeConfigBuilder`].
///
/// Units are either voxels (vx) or world units (wu). The voxel units are based on
/// [`BakeConfig::cell_size`] and [`BakeConfig::cell_height`].
///
/// In this documentation, the term 'field' refers to heightfield and contour data structures
/// that define spacial information using an integer grid.
///
/// > Note:
/// >
/// > First you should decide the size of your agent's logical cylinder.
/// > If your game world uses meters as units, a reasonable starting point for a human-sized agent
/// > might be a radius of 0.4 and a height of 2.0.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct BakeConfig {
    /// The xz-plane cell size to use for fields. `[Limit: > 0] [Units: wu]`.
    ///
    /// This value is usually derived from the character radius r. A recommended starting value is either r/2 or r/3.
    /// Smaller values increase rasterization resolution and navmesh detail, but generation time grows quickly.
    pub cell_size: f32,

    /// The y-axis cell size to use for fields. `[Limit: > 0] [Units: wu]`
    ///
    /// A good starting point is half the [`BakeConfig::cell_size`].
    /// Decrease it if small holes appear where the height changes, e.g. on stairs or curbs.
    pub cell_height: f32,

    /// The bounds of the field's AABB. `[Units: wu]`
    pub aabb: Aabb3d,

    /// The maximum slope that is considered walkable. `[Limits: 0 <= value < 0.5*π] [Units: Radians]`
    pub walkable_slope_angle: f32,

    /// Minimum floor to 'ceiling' height that will still allow the floor area to be considered walkable. `[Limit: >= 3] [Units: vx]`
    pub walkable_height: u16,

    /// Maximum ledge height that is considered to still be traversable. `[Limit: >=0] [Units: vx]`
    ///
    /// Also used as the flag merge threshold when rasterizing.
    pub walkable_climb: u16,

    /// The distance to erode/shrink the walkable area of the heightfield away from obstructions.  `[Limit: >=0] [Units: vx]`
    pub walkable_radius: u16,

    /// The maximum allowed length for contour edges along the border of the mesh. `[Limit: >=0] [Units: vx]`
    ///
    /// A value of zero disables long edge splitting.
    pub max_edge_len: u16,

    /// The maximum distance a simplified contour's border edges should deviate from the original raw contour. `[Limit: >=0] [Units: vx]`
    pub max_simplification_error: f32,

    /// The minimum number of cells allowed to form isolated island areas. `[Limit: >=0] [Units: vx]`
    ///
    /// Any regions that are smaller than this area will be marked as unwalkable.
    pub min_region_area: u16,

    /// Any regions with a span count smaller than this value will, if possible, be merged with larger regions. `[Limit: >=0] [Units: vx]`
    pub merge_region_area: u16,

    /// The maximum number of vertices allowed for polygons generated during the contour to polygon conversion process. `[Limit: >= 3]`
    ///
    /// Navmesh tiles can only hold polygons with up to [`navbake_recast::DT_VERTS_PER_POLYGON`] vertices.
    pub max_vertices_per_polygon: u16,

    /// Sets the sampling distance to use when generating the detail mesh. `[Limits: 0 or >= 0.9] [Units: wu]`
    pub detail_sample_dist: f32,

    /// The maximum distance the detail mesh surface should deviate from heightfield data. `[Limit: >=0] [Units: wu]`
    pub detail_sample_max_error: f32,

    /// Flags controlling how contours are tessellated.
    pub contour_flags: BuildContoursFlags,
}

impl Default for BakeConfig {
    fn default() -> Self {
        BakeConfigBuilder::default().build()
    }
}

/// A builder for [`BakeConfig`], taking its parameters in world units and agent terms.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct BakeConfigBuilder {
    /// The xz-plane cell size to use for fields. `[Limit: > 0] [Units: wu]`
    ///
    /// Default: 0.3
    pub cell_size: f32,

    /// The y-axis cell size to use for fields. `[Limit: > 0] [Units: wu]`
    ///
    /// Default: 0.2
    pub cell_height: f32,

    /// The height of the agent. `[Limit: > 0] [Units: wu]`
    ///
    /// Default: 2.0
    pub agent_height: f32,

    /// The radius of the agent. `[Limit: >= 0] [Units: wu]`
    ///
    /// Default: 0.6
    pub agent_radius: f32,

    /// The maximum height of a ledge the agent can climb. `[Limit: >= 0] [Units: wu]`
    ///
    /// Default: 0.9
    pub agent_max_climb: f32,

    /// The maximum slope the agent can walk on. `[Limits: 0 <= value < 0.5*π] [Units: Radians]`
    ///
    /// Default: 45°
    pub agent_max_slope: f32,

    /// The side length of the smallest island that is kept. `[Limit: >= 0] [Units: vx]`
    ///
    /// Default: 8
    pub region_min_size: f32,

    /// The side length below which regions are merged into their neighbours. `[Limit: >= 0] [Units: vx]`
    ///
    /// Default: 20
    pub region_merge_size: f32,

    /// The maximum length of a border edge. `[Limit: >= 0] [Units: wu]`
    ///
    /// Default: 12
    pub edge_max_len: f32,

    /// See [`BakeConfig::max_simplification_error`]. `[Limit: >= 0] [Units: vx]`
    ///
    /// Default: 1.3
    pub edge_max_error: f32,

    /// See [`BakeConfig::max_vertices_per_polygon`].
    ///
    /// Default: 6
    pub verts_per_poly: u16,

    /// The detail sample distance as a multiple of the cell size. `[Limits: 0 or >= 0.9] [Units: vx]`
    ///
    /// Default: 6
    pub detail_sample_dist: f32,

    /// The detail sample error as a multiple of the cell height. `[Limit: >= 0] [Units: vx]`
    ///
    /// Default: 1
    pub detail_sample_max_error: f32,

    /// The bounds of the field's AABB. `[Units: wu]`
    ///
    /// Default: [`Aabb3d::default`]
    pub aabb: Aabb3d,

    /// See [`BakeConfig::contour_flags`].
    ///
    /// Default: [`BuildContoursFlags::DEFAULT`]
    pub contour_flags: BuildContoursFlags,
}

impl Default for BakeConfigBuilder {
    fn default() -> Self {
        Self {
            cell_size: 0.3,
            cell_height: 0.2,
            agent_height: 2.0,
            agent_radius: 0.6,
            agent_max_climb: 0.9,
            agent_max_slope: 45.0_f32.to_radians(),
            region_min_size: 8.0,
            region_merge_size: 20.0,
            edge_max_len: 12.0,
            edge_max_error: 1.3,
            verts_per_poly: 6,
            detail_sample_dist: 6.0,
            detail_sample_max_error: 1.0,
            aabb: Aabb3d::default(),
            contour_flags: BuildContoursFlags::default(),
        }
    }
}

impl BakeConfigBuilder {
    /// Converts the world space parameters into a [`BakeConfig`].
    pub fn build(&self) -> BakeConfig {
        BakeConfig {
            cell_size: self.cell_size,
            cell_height: self.cell_height,
            aabb: self.aabb,
            walkable_slope_angle: self.agent_max_slope,
            walkable_height: (self.agent_height / self.cell_height).ceil() as u16,
            walkable_climb: (self.agent_max_climb / self.cell_height).floor() as u16,
            walkable_radius: (self.agent_radius / self.cell_size).ceil() as u16,
            max_edge_len: (self.edge_max_len / self.cell_size) as u16,
            max_simplification_error: self.edge_max_error,
            min_region_area: (self.region_min_size * self.region_min_size) as u16,
            merge_region_area: (self.region_merge_size * self.region_merge_size) as u16,
            max_vertices_per_polygon: self.verts_per_poly,
            detail_sample_dist: if self.detail_sample_dist < 0.9 {
                0.0
            } else {
                self.cell_size * self.detail_sample_dist
            },
            detail_sample_max_error: self.cell_height * self.detail_sample_max_error,
            contour_flags: self.contour_flags,
        }
    }

    /// The agent parameters a navmesh tile is built for.
    pub fn agent(&self) -> AgentParams {
        AgentParams {
            height: self.agent_height,
            radius: self.agent_radius,
            max_climb: self.agent_max_climb,
        }
    }
}

/// The agent a navmesh tile is built for, stored in the tile header.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct AgentParams {
    /// The height of the agent. `[Units: wu]`
    pub height: f32,
    /// The radius of the agent. `[Units: wu]`
    pub radius: f32,
    /// The maximum height of a ledge the agent can climb. `[Units: wu]`
    pub max_climb: f32,
}

impl Default for AgentParams {
    fn default() -> Self {
        BakeConfigBuilder::default().agent()
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn default_builder_converts_to_voxels() {
        let config = BakeConfigBuilder::default().build();
        assert_eq!(config.walkable_height, 10);
        assert_eq!(config.walkable_climb, 4);
        assert_eq!(config.walkable_radius, 2);
        assert_eq!(config.max_edge_len, 40);
        assert_eq!(config.min_region_area, 64);
        assert_eq!(config.merge_region_area, 400);
        assert_eq!(config.max_vertices_per_polygon, 6);
        assert_relative_eq!(config.detail_sample_dist, 1.8, epsilon = 1e-5);
        assert_relative_eq!(config.detail_sample_max_error, 0.2, epsilon = 1e-6);
    }

    #[test]
    fn small_detail_sample_distance_disables_sampling() {
        let config = BakeConfigBuilder {
            detail_sample_dist: 0.5,
            ..Default::default()
        }
        .build();
        assert_eq!(config.detail_sample_dist, 0.0);
    }

    #[test]
    fn radius_rounds_up_and_climb_rounds_down() {
        let config = BakeConfigBuilder {
            cell_size: 0.5,
            cell_height: 0.5,
            agent_radius: 0.6,
            agent_max_climb: 0.9,
            ..Default::default()
        }
        .build();
        assert_eq!(config.walkable_radius, 2);
        assert_eq!(config.walkable_climb, 1);
    }

    #[test]
    fn agent_keeps_world_units() {
        let builder = BakeConfigBuilder {
            agent_radius: 0.5,
            ..Default::default()
        };
        assert_eq!(
            builder.agent(),
            AgentParams {
                height: 2.0,
                radius: 0.5,
                max_climb: 0.9,
            }
        );
    }

    #[cfg(feature = "serialize")]
    #[test]
    fn config_survives_json() {
        let config = BakeConfigBuilder::default().build();
        let json = serde_json::to_string(&config).unwrap();
        let decoded: BakeConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, config);
    }
}
