//! A fixed set of named curves.

use std::collections::HashMap;

use glam::Vec2;

use crate::error::{Error, Result};
use crate::path::Path;
use crate::Direction;

/// Named paths a topology is drawn with.
#[derive(Debug, Clone, Default)]
pub struct PathSet {
    paths: HashMap<String, Path>,
}

impl PathSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a path under `name`.
    pub fn insert(&mut self, name: impl Into<String>, path: Path) {
        self.paths.insert(name.into(), path);
    }

    /// Look up a path by name.
    pub fn get(&self, name: &str) -> Result<&Path> {
        self.paths
            .get(name)
            .ok_or_else(|| Error::UnknownPath(name.to_string()))
    }

    /// Whether a path is registered under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.paths.contains_key(name)
    }

    /// Total length of the named path.
    pub fn length(&self, name: &str) -> Result<f32> {
        Ok(self.get(name)?.length())
    }

    /// Point `distance` along the named path in `direction`.
    pub fn point_along(&self, name: &str, distance: f32, direction: Direction) -> Result<Vec2> {
        Ok(self.get(name)?.point_along(distance, direction))
    }

    /// Registered names.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.paths.keys().map(String::as_str)
    }

    /// Number of registered paths.
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    /// Whether no paths are registered.
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_by_name() {
        let mut set = PathSet::new();
        set.insert("orchestrator->excel", Path::parse("M 0 0 L 100 0").unwrap());

        assert_eq!(set.len(), 1);
        assert!(set.contains("orchestrator->excel"));
        assert_eq!(set.length("orchestrator->excel").unwrap(), 100.0);
        assert_eq!(
            set.point_along("orchestrator->excel", 25.0, Direction::Reverse).unwrap(),
            Vec2::new(75.0, 0.0)
        );
    }

    #[test]
    fn unknown_name_is_an_error() {
        let set = PathSet::new();
        assert!(set.is_empty());
        assert_eq!(
            set.length("missing"),
            Err(Error::UnknownPath("missing".to_string()))
        );
    }
}
