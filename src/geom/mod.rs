mod core;
mod diagnostics;
mod extension;
mod mesh;
mod metrics;

pub use core::{BBox, Point3, Tolerance, Transform, Vec3};
pub use diagnostics::GeomMeshDiagnostics;
pub use extension::{ExtensionError, HeadExtension, extend_contour, synthesize_extension};
pub use mesh::{
    EdgeTopology, boundary_edges, count_edge_topology, mesh_diagnostics, signed_volume,
};
pub use metrics::{PipelineMetrics, StageBucket, StageTimingReport};
