use std::collections::HashSet;

use gyrus_model::{RoiMask, SurfaceMesh};

/// Extra hop levels tried when ROI filtering leaves too few neighbors. On a
/// disconnected or near-empty ROI the widening loop would otherwise never
/// terminate usefully; past the cap the caller takes whatever was found.
const MAX_WIDEN: usize = 4;

/// A node needs at least this many in-ROI neighbors before the tangent-plane
/// regression is worth attempting.
pub(crate) const MIN_USABLE_NEIGHBORS: usize = 2;

/// One-time adjacency table over mesh nodes, built from the triangle list.
/// Read-only after construction and shared across worker tasks.
#[derive(Debug, Clone)]
pub struct NodeNeighbors {
    adjacency: Vec<Vec<u32>>,
}

impl NodeNeighbors {
    pub fn build(mesh: &SurfaceMesh) -> Self {
        let mut adjacency = vec![Vec::new(); mesh.node_count()];
        for tri in mesh.triangles.chunks_exact(3) {
            let a = tri[0] as usize;
            let b = tri[1] as usize;
            let c = tri[2] as usize;
            if a < adjacency.len() && b < adjacency.len() && c < adjacency.len() {
                adjacency[a].extend([tri[1], tri[2]]);
                adjacency[b].extend([tri[0], tri[2]]);
                adjacency[c].extend([tri[0], tri[1]]);
            }
        }
        for list in &mut adjacency {
            list.sort_unstable();
            list.dedup();
        }
        Self { adjacency }
    }

    pub fn node_count(&self) -> usize {
        self.adjacency.len()
    }

    /// Direct (1-hop) neighbors. Empty for isolated nodes.
    pub fn direct(&self, node: usize) -> &[u32] {
        self.adjacency
            .get(node)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// All nodes within `depth` hops of `node`, excluding `node` itself,
    /// sorted ascending. A depth below 1 is treated as 1.
    pub fn neighbors(&self, node: usize, depth: usize) -> Vec<u32> {
        let depth = depth.max(1);
        if node >= self.adjacency.len() {
            return Vec::new();
        }

        let mut visited = HashSet::new();
        visited.insert(node as u32);
        let mut frontier = vec![node as u32];
        let mut found = Vec::new();

        for _ in 0..depth {
            let mut next = Vec::new();
            for &current in &frontier {
                for &neighbor in &self.adjacency[current as usize] {
                    if visited.insert(neighbor) {
                        found.push(neighbor);
                        next.push(neighbor);
                    }
                }
            }
            if next.is_empty() {
                break;
            }
            frontier = next;
        }

        found.sort_unstable();
        found
    }

    /// Neighbors of `node` restricted to non-zero ROI values, widening the
    /// hop depth only as far as needed to reach a usable count. Widening is
    /// capped; whatever is available at the cap is returned.
    pub fn neighbors_in_roi(&self, node: usize, roi: &RoiMask) -> Vec<u32> {
        let mut depth = 1;
        loop {
            let mut found = self.neighbors(node, depth);
            found.retain(|&n| roi.is_inside(n as usize));
            if found.len() >= MIN_USABLE_NEIGHBORS || depth > MAX_WIDEN {
                return found;
            }
            // No point widening once the component is exhausted.
            if self.neighbors(node, depth + 1).len() == self.neighbors(node, depth).len() {
                return found;
            }
            depth += 1;
        }
    }
}
