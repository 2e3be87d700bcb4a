//! # Switchyard Router
//!
//! Longest-prefix route table mapping request paths to backend targets.
//!
//! - Segment-aware matching: `/api/wallet` never serves `/api/walletx`
//! - The longest matching prefix wins; equal lengths keep configuration order
//! - Lock-free reads; the whole table is swapped atomically on reload

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub
)]

pub mod route;

pub use route::{normalize_prefix, Route, RouteBuilder};

use arc_swap::ArcSwap;
use std::collections::HashSet;
use std::sync::Arc;
use switchyard_core::{Error, Result};

/// Immutable snapshot of the route table
#[derive(Debug, Default)]
struct RouteTable {
    /// Routes in configuration order
    routes: Vec<Arc<Route>>,

    /// Same routes, longest prefix first
    by_specificity: Vec<Arc<Route>>,
}

impl RouteTable {
    fn build(routes: Vec<Route>) -> Result<Self> {
        let mut seen = HashSet::new();
        for route in &routes {
            if !seen.insert(route.prefix.as_str()) {
                return Err(Error::Config(format!(
                    "duplicate route prefix '{}'",
                    route.prefix
                )));
            }
        }

        let routes: Vec<Arc<Route>> = routes.into_iter().map(Arc::new).collect();
        let mut by_specificity = routes.clone();
        // Stable sort: equal-length prefixes keep their configured order.
        by_specificity.sort_by(|a, b| b.prefix.len().cmp(&a.prefix.len()));

        Ok(Self {
            routes,
            by_specificity,
        })
    }

    fn resolve(&self, path: &str) -> Option<&Arc<Route>> {
        self.by_specificity.iter().find(|route| route.matches(path))
    }
}

/// Router for matching request paths to routes
#[derive(Debug, Clone)]
pub struct Router {
    table: Arc<ArcSwap<RouteTable>>,
}

impl Router {
    /// Create a router over the given routes
    pub fn new(routes: Vec<Route>) -> Result<Self> {
        let table = RouteTable::build(routes)?;
        tracing::debug!(routes = table.routes.len(), "Route table built");

        Ok(Self {
            table: Arc::new(ArcSwap::from_pointee(table)),
        })
    }

    /// Resolve a request path to its route
    pub fn resolve(&self, path: &str) -> Result<Arc<Route>> {
        if !path.starts_with('/') {
            return Err(Error::RouteNotFound(path.to_string()));
        }

        self.table
            .load()
            .resolve(path)
            .cloned()
            .ok_or_else(|| Error::RouteNotFound(path.to_string()))
    }

    /// Replace the whole route table.
    ///
    /// In-flight lookups finish against the table they loaded; the new table
    /// is visible to every lookup that starts after this returns.
    pub fn replace(&self, routes: Vec<Route>) -> Result<()> {
        let table = RouteTable::build(routes)?;
        let count = table.routes.len();
        self.table.store(Arc::new(table));

        tracing::info!(routes = count, "Route table replaced");
        Ok(())
    }

    /// All routes in configuration order
    pub fn routes(&self) -> Vec<Arc<Route>> {
        self.table.load().routes.clone()
    }

    /// Number of routes
    pub fn len(&self) -> usize {
        self.table.load().routes.len()
    }

    /// Whether the table is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for Router {
    fn default() -> Self {
        Self {
            table: Arc::new(ArcSwap::from_pointee(RouteTable::default())),
        }
    }
}
