use std::collections::HashMap;

use super::diagnostics::GeomMeshDiagnostics;
use super::{Point3, Tolerance};

/// Edge-level topology counts for an indexed triangle list.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct EdgeTopology {
    pub open_edge_count: usize,
    pub non_manifold_edge_count: usize,
    pub inconsistent_edge_count: usize,
    /// Triangles skipped because two of their indices coincide.
    pub degenerate_triangle_count: usize,
}

/// Directed edge usage per undirected edge: `(forward, backward)` where
/// forward means walked from the lower to the higher index.
fn directed_edge_usage(indices: &[u32]) -> (HashMap<(u32, u32), (u32, u32)>, usize) {
    let mut usage: HashMap<(u32, u32), (u32, u32)> = HashMap::new();
    let mut degenerate = 0usize;

    for tri in indices.chunks_exact(3) {
        let (i0, i1, i2) = (tri[0], tri[1], tri[2]);
        if i0 == i1 || i1 == i2 || i0 == i2 {
            degenerate += 1;
            continue;
        }

        for (a, b) in [(i0, i1), (i1, i2), (i2, i0)] {
            let entry = usage.entry((a.min(b), a.max(b))).or_insert((0, 0));
            if a < b {
                entry.0 += 1;
            } else {
                entry.1 += 1;
            }
        }
    }

    (usage, degenerate)
}

/// Classify every edge of a triangle list.
///
/// An edge used once is open, more than twice is non-manifold, and exactly
/// twice in the same direction is inconsistently oriented.
#[must_use]
pub fn count_edge_topology(indices: &[u32]) -> EdgeTopology {
    let (usage, degenerate) = directed_edge_usage(indices);
    let mut topology = EdgeTopology {
        degenerate_triangle_count: degenerate,
        ..EdgeTopology::default()
    };

    for (forward, backward) in usage.into_values() {
        match forward + backward {
            1 => topology.open_edge_count += 1,
            2 if forward != 1 => topology.inconsistent_edge_count += 1,
            2 => {}
            _ => topology.non_manifold_edge_count += 1,
        }
    }

    topology
}

/// Returns the open edges of a triangle list, each directed the way its single
/// triangle walks it. Sorted for deterministic comparison.
#[must_use]
pub fn boundary_edges(indices: &[u32]) -> Vec<(u32, u32)> {
    let (usage, _) = directed_edge_usage(indices);
    let mut edges: Vec<(u32, u32)> = usage
        .into_iter()
        .filter_map(|((lo, hi), (forward, backward))| match (forward, backward) {
            (1, 0) => Some((lo, hi)),
            (0, 1) => Some((hi, lo)),
            _ => None,
        })
        .collect();
    edges.sort_unstable();
    edges
}

/// Signed volume enclosed by a triangle list (divergence theorem).
///
/// Positive when the triangles of a closed mesh face outward. Triangles with
/// out-of-range indices are ignored.
#[must_use]
pub fn signed_volume<P>(positions: &[P], indices: &[u32]) -> f64
where
    P: Copy + Into<Point3>,
{
    let mut volume = 0.0;
    for tri in indices.chunks_exact(3) {
        let (Some(&a), Some(&b), Some(&c)) = (
            positions.get(tri[0] as usize),
            positions.get(tri[1] as usize),
            positions.get(tri[2] as usize),
        ) else {
            continue;
        };

        let a = a.into().sub_point(Point3::ORIGIN);
        let b = b.into().sub_point(Point3::ORIGIN);
        let c = c.into().sub_point(Point3::ORIGIN);
        volume += a.dot(b.cross(c));
    }

    volume / 6.0
}

fn zero_area_count<P>(positions: &[P], indices: &[u32]) -> usize
where
    P: Copy + Into<Point3>,
{
    let tol = Tolerance::DEFAULT;
    indices
        .chunks_exact(3)
        .filter(|tri| tri[0] != tri[1] && tri[1] != tri[2] && tri[0] != tri[2])
        .filter_map(|tri| {
            let a: Point3 = (*positions.get(tri[0] as usize)?).into();
            let b: Point3 = (*positions.get(tri[1] as usize)?).into();
            let c: Point3 = (*positions.get(tri[2] as usize)?).into();
            Some(b.sub_point(a).cross(c.sub_point(a)).length())
        })
        .filter(|&doubled_area| doubled_area <= tol.eps)
        .count()
}

/// Compute full topology diagnostics for a mesh.
#[must_use]
pub fn mesh_diagnostics<P>(positions: &[P], indices: &[u32]) -> GeomMeshDiagnostics
where
    P: Copy + Into<Point3>,
{
    let topology = count_edge_topology(indices);
    let mut diagnostics = GeomMeshDiagnostics {
        vertex_count: positions.len(),
        triangle_count: indices.len() / 3,
        degenerate_triangle_count: topology.degenerate_triangle_count
            + zero_area_count(positions, indices),
        open_edge_count: topology.open_edge_count,
        non_manifold_edge_count: topology.non_manifold_edge_count,
        inconsistent_edge_count: topology.inconsistent_edge_count,
        signed_volume: signed_volume(positions, indices),
        ..GeomMeshDiagnostics::default()
    };

    if diagnostics.open_edge_count > 0 {
        diagnostics.add_warning("mesh has open edges");
    }
    if diagnostics.non_manifold_edge_count > 0 {
        diagnostics.add_warning("mesh has non-manifold edges");
    }
    if diagnostics.inconsistent_edge_count > 0 {
        diagnostics.add_warning("mesh has inconsistently oriented triangles");
    }

    diagnostics
}
