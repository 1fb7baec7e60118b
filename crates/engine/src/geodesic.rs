use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};

use ordered_float::OrderedFloat;

use gyrus_model::SurfaceMesh;

use crate::neighbors::NodeNeighbors;

/// Geodesic distances along mesh edges, computed with Dijkstra expansion
/// from a single source. Distances are path lengths through the edge graph,
/// not straight-line distances. Unreachable nodes are simply absent from the
/// results; callers treat "missing" as "not a neighbor".
pub struct GeodesicDistance<'a> {
    mesh: &'a SurfaceMesh,
    neighbors: &'a NodeNeighbors,
}

impl<'a> GeodesicDistance<'a> {
    pub fn new(mesh: &'a SurfaceMesh, neighbors: &'a NodeNeighbors) -> Self {
        Self { mesh, neighbors }
    }

    /// All nodes within `radius` of `source`, with their geodesic distances,
    /// in increasing-distance order. The source itself is included at
    /// distance 0.
    pub fn within_radius(&self, source: usize, radius: f32) -> Vec<(u32, f32)> {
        if source >= self.mesh.node_count() || radius < 0.0 {
            return Vec::new();
        }

        let mut settled: HashMap<u32, f32> = HashMap::new();
        let mut heap = BinaryHeap::new();
        let mut result = Vec::new();
        heap.push(Reverse((OrderedFloat(0.0f32), source as u32)));

        while let Some(Reverse((OrderedFloat(dist), node))) = heap.pop() {
            if dist > radius {
                break;
            }
            if settled.contains_key(&node) {
                continue;
            }
            settled.insert(node, dist);
            result.push((node, dist));

            let here = self.mesh.position(node as usize);
            for &next in self.neighbors.direct(node as usize) {
                if settled.contains_key(&next) {
                    continue;
                }
                let step = here.distance(self.mesh.position(next as usize));
                let candidate = dist + step;
                if candidate <= radius {
                    heap.push(Reverse((OrderedFloat(candidate), next)));
                }
            }
        }

        result
    }

    /// Geodesic distances from `source` to a fixed target set, in target
    /// order. Targets unreachable from `source` are omitted. If the caller
    /// lists `source` among the targets it comes back at distance 0.
    pub fn distances_to(&self, source: usize, targets: &[u32]) -> Vec<(u32, f32)> {
        if source >= self.mesh.node_count() || targets.is_empty() {
            return Vec::new();
        }

        let wanted: HashSet<u32> = targets.iter().copied().collect();
        let mut remaining = wanted.len();
        let mut settled: HashMap<u32, f32> = HashMap::new();
        let mut heap = BinaryHeap::new();
        heap.push(Reverse((OrderedFloat(0.0f32), source as u32)));

        while let Some(Reverse((OrderedFloat(dist), node))) = heap.pop() {
            if settled.contains_key(&node) {
                continue;
            }
            settled.insert(node, dist);
            if wanted.contains(&node) {
                remaining -= 1;
                if remaining == 0 {
                    break;
                }
            }

            let here = self.mesh.position(node as usize);
            for &next in self.neighbors.direct(node as usize) {
                if settled.contains_key(&next) {
                    continue;
                }
                let step = here.distance(self.mesh.position(next as usize));
                heap.push(Reverse((OrderedFloat(dist + step), next)));
            }
        }

        targets
            .iter()
            .filter_map(|&target| settled.get(&target).map(|&dist| (target, dist)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gyrus_model::make_grid;

    #[test]
    fn source_is_included_at_zero() {
        let mesh = make_grid(5, 5, 1.0);
        let neighbors = NodeNeighbors::build(&mesh);
        let geo = GeodesicDistance::new(&mesh, &neighbors);
        let within = geo.within_radius(12, 1.5);
        assert_eq!(within.first(), Some(&(12, 0.0)));
    }

    #[test]
    fn axis_neighbors_are_at_edge_length() {
        let mesh = make_grid(5, 5, 1.0);
        let neighbors = NodeNeighbors::build(&mesh);
        let geo = GeodesicDistance::new(&mesh, &neighbors);
        let within: Vec<(u32, f32)> = geo.within_radius(12, 1.01);
        // Center, its four axis neighbors and two diagonal-edge neighbors
        // (the grid split puts diagonal edges of length sqrt(2) > 1.01 out).
        let map: std::collections::HashMap<u32, f32> = within.into_iter().collect();
        assert!((map[&11] - 1.0).abs() < 1.0e-6);
        assert!((map[&13] - 1.0).abs() < 1.0e-6);
        assert!((map[&7] - 1.0).abs() < 1.0e-6);
        assert!((map[&17] - 1.0).abs() < 1.0e-6);
    }

    #[test]
    fn path_distance_beats_straight_line_on_grid() {
        let mesh = make_grid(5, 5, 1.0);
        let neighbors = NodeNeighbors::build(&mesh);
        let geo = GeodesicDistance::new(&mesh, &neighbors);
        // Corner to corner: the split diagonals run the wrong way, so the
        // path is 8 unit edges, well above the straight-line 4*sqrt(2).
        let distances = geo.distances_to(0, &[24]);
        assert_eq!(distances.len(), 1);
        assert!((distances[0].1 - 8.0).abs() < 1.0e-4);
        assert!(distances[0].1 > 4.0 * std::f32::consts::SQRT_2);
    }

    #[test]
    fn unreachable_targets_are_omitted() {
        let mut mesh = make_grid(3, 3, 1.0);
        mesh.positions.push([50.0, 0.0, 0.0]);
        let neighbors = NodeNeighbors::build(&mesh);
        let geo = GeodesicDistance::new(&mesh, &neighbors);
        let distances = geo.distances_to(0, &[8, 9]);
        assert_eq!(distances.len(), 1);
        assert_eq!(distances[0].0, 8);
    }

    #[test]
    fn radius_limits_expansion() {
        let mesh = make_grid(9, 9, 1.0);
        let neighbors = NodeNeighbors::build(&mesh);
        let geo = GeodesicDistance::new(&mesh, &neighbors);
        for (_, dist) in geo.within_radius(40, 2.0) {
            assert!(dist <= 2.0);
        }
    }
}
