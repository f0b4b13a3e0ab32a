//! Route override store for delivery tests.
//!
//! Routes are supplied by the test configuration and never learned. There is
//! no reachability check and no duplicate detection.

use meshwork_lib::NodeId;
use std::collections::HashMap;

/// A path from `src` to `dst` through `hops`. No hops means direct.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub src: NodeId,
    pub dst: NodeId,
    pub hops: Vec<NodeId>,
}

impl Route {
    /// Build a route from a path whose last element is the destination and
    /// whose other elements are the intermediate hops, in order.
    ///
    /// Returns `None` for an empty path.
    pub fn from_path(src: NodeId, path: &[NodeId]) -> Option<Self> {
        let (dst, hops) = path.split_last()?;
        Some(Self {
            src,
            dst: *dst,
            hops: hops.to_vec(),
        })
    }

    pub fn hop_count(&self) -> usize {
        self.hops.len()
    }

    pub fn is_direct(&self) -> bool {
        self.hops.is_empty()
    }
}

/// All known routes to one destination, in insertion order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteList {
    pub dst: NodeId,
    routes: Vec<Route>,
}

impl RouteList {
    pub fn new(dst: NodeId) -> Self {
        Self {
            dst,
            routes: Vec::new(),
        }
    }

    pub fn add_route(&mut self, route: Route) {
        self.routes.push(route);
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct RoutingTable {
    lists: HashMap<NodeId, RouteList>,
}

impl RoutingTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_create_route_list(&mut self, dst: NodeId) -> &mut RouteList {
        self.lists.entry(dst).or_insert_with(|| RouteList::new(dst))
    }

    pub fn route_list(&self, dst: NodeId) -> Option<&RouteList> {
        self.lists.get(&dst)
    }

    pub fn clear(&mut self) {
        self.lists.clear();
    }

    /// Number of destinations with a route list.
    pub fn len(&self) -> usize {
        self.lists.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lists.is_empty()
    }

    /// Add one route per non-empty path and return the destination of each,
    /// in path order.
    pub fn seed_from_paths(&mut self, src: NodeId, paths: &[Vec<NodeId>]) -> Vec<NodeId> {
        let mut destinations = Vec::with_capacity(paths.len());
        for route in paths.iter().filter_map(|path| Route::from_path(src, path)) {
            destinations.push(route.dst);
            self.get_or_create_route_list(route.dst).add_route(route);
        }
        destinations
    }
}
