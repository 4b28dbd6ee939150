//! Topology diagnostics for assembled head meshes.
//!
//! Diagnostics are computed once per assembled asset and answer the questions
//! a consumer cares about before shipping a head to a renderer:
//!
//! - Is the head closed (no open edges)?
//! - Is it manifold (no edge shared by more than two triangles)?
//! - Do neighbouring triangles agree on winding (each shared edge is walked
//!   once in each direction)?
//!
//! # Example
//!
//! ```ignore
//! use headgen_engine::geom::mesh_diagnostics;
//!
//! let diagnostics = mesh_diagnostics(&asset.positions, &asset.indices);
//! if !diagnostics.is_closed_solid() {
//!     log::warn!("head mesh: {}", diagnostics.summary());
//! }
//! ```

use std::fmt;

use serde::Serialize;

use super::metrics::StageTimingReport;

/// Counts and warnings describing the topology of a triangle mesh.
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct GeomMeshDiagnostics {
    /// Total number of vertices in the mesh.
    pub vertex_count: usize,

    /// Total number of triangles in the mesh.
    pub triangle_count: usize,

    /// Triangles with a repeated vertex index or zero area.
    pub degenerate_triangle_count: usize,

    /// Edges with only one adjacent triangle.
    ///
    /// A closed head has zero open edges; the frontal topology alone has
    /// exactly one per silhouette segment.
    pub open_edge_count: usize,

    /// Edges with more than two adjacent triangles.
    pub non_manifold_edge_count: usize,

    /// Edges shared by two triangles that walk the edge in the same direction.
    ///
    /// Non-zero values mean some faces point inward while their neighbours
    /// point outward.
    pub inconsistent_edge_count: usize,

    /// Signed enclosed volume. Positive for an outward-facing closed mesh.
    pub signed_volume: f64,

    /// Optional per-stage timing of the run that produced the mesh.
    ///
    /// Only populated when the `pipeline_metrics` feature is enabled
    /// and the target is not WASM.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timing: Option<StageTimingReport>,

    /// Human-readable warnings collected while building the mesh.
    pub warnings: Vec<String>,
}

impl GeomMeshDiagnostics {
    /// Returns `true` if the mesh has no open edges.
    #[must_use]
    pub fn is_watertight(&self) -> bool {
        self.open_edge_count == 0
    }

    /// Returns `true` if no edge is shared by more than two triangles.
    #[must_use]
    pub fn is_manifold(&self) -> bool {
        self.non_manifold_edge_count == 0
    }

    /// Returns `true` if every shared edge is walked once in each direction.
    #[must_use]
    pub fn is_consistently_oriented(&self) -> bool {
        self.inconsistent_edge_count == 0
    }

    /// Watertight, manifold, consistently oriented and facing outward.
    #[must_use]
    pub fn is_closed_solid(&self) -> bool {
        self.is_watertight()
            && self.is_manifold()
            && self.is_consistently_oriented()
            && self.signed_volume > 0.0
    }

    /// Returns `true` if no issues were detected and no warnings were recorded.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.is_closed_solid() && self.degenerate_triangle_count == 0 && self.warnings.is_empty()
    }

    #[must_use]
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// Returns the total number of edge-level topology issues.
    #[must_use]
    pub fn topology_issue_count(&self) -> usize {
        self.open_edge_count + self.non_manifold_edge_count + self.inconsistent_edge_count
    }

    pub fn add_warning(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }

    /// Returns a short summary string suitable for logging.
    ///
    /// Format: `"V:{vertices} T:{triangles} [issues...]"`
    #[must_use]
    pub fn summary(&self) -> String {
        let mut parts = vec![format!("V:{} T:{}", self.vertex_count, self.triangle_count)];

        if self.degenerate_triangle_count > 0 {
            parts.push(format!("degenerate:{}", self.degenerate_triangle_count));
        }
        if self.open_edge_count > 0 {
            parts.push(format!("open:{}", self.open_edge_count));
        }
        if self.non_manifold_edge_count > 0 {
            parts.push(format!("non-manifold:{}", self.non_manifold_edge_count));
        }
        if self.inconsistent_edge_count > 0 {
            parts.push(format!("inconsistent:{}", self.inconsistent_edge_count));
        }
        if self.signed_volume <= 0.0 {
            parts.push("inward".to_string());
        }

        parts.join(" ")
    }
}

impl fmt::Display for GeomMeshDiagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Mesh Diagnostics:")?;
        writeln!(f, "  Vertices: {}", self.vertex_count)?;
        writeln!(f, "  Triangles: {}", self.triangle_count)?;
        writeln!(f, "  Signed volume: {:.6}", self.signed_volume)?;

        if self.topology_issue_count() > 0 || self.degenerate_triangle_count > 0 {
            writeln!(f, "  Topology issues:")?;
            if self.degenerate_triangle_count > 0 {
                writeln!(f, "    - Degenerate triangles: {}", self.degenerate_triangle_count)?;
            }
            if self.open_edge_count > 0 {
                writeln!(f, "    - Open edges: {}", self.open_edge_count)?;
            }
            if self.non_manifold_edge_count > 0 {
                writeln!(f, "    - Non-manifold edges: {}", self.non_manifold_edge_count)?;
            }
            if self.inconsistent_edge_count > 0 {
                writeln!(f, "    - Inconsistently oriented edges: {}", self.inconsistent_edge_count)?;
            }
        }

        if !self.warnings.is_empty() {
            writeln!(f, "  Warnings:")?;
            for warning in &self.warnings {
                writeln!(f, "    - {warning}")?;
            }
        }

        if let Some(ref timing) = self.timing {
            writeln!(f, "  Timing: {} ms total", timing.total_ms())?;
        }

        let status = if self.is_clean() {
            "CLEAN"
        } else if self.is_closed_solid() {
            "CLOSED (with warnings)"
        } else {
            "ISSUES DETECTED"
        };
        writeln!(f, "  Status: {status}")?;

        Ok(())
    }
}
