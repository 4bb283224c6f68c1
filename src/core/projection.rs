//! Projection descriptors and the factory that rebuilds them from a code
//!
//! Frame states only carry the projection code across the channel; each
//! side looks the behaviour back up here on arrival.

use crate::core::geo::Extent;
use crate::prelude::{Arc, HashMap};
use crate::{MapError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Units {
    Meters,
    Degrees,
}

/// A projected coordinate reference system
#[derive(Debug, Clone, PartialEq)]
pub struct Projection {
    code: String,
    units: Units,
    extent: Option<Extent>,
}

impl Projection {
    pub fn new(code: impl Into<String>, units: Units, extent: Option<Extent>) -> Self {
        Self {
            code: code.into(),
            units,
            extent,
        }
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn units(&self) -> Units {
        self.units
    }

    pub fn extent(&self) -> Option<&Extent> {
        self.extent.as_ref()
    }

    pub fn meters_per_unit(&self) -> f64 {
        match self.units {
            Units::Meters => 1.0,
            // mean equatorial degree
            Units::Degrees => 2.0 * std::f64::consts::PI * 6_370_997.0 / 360.0,
        }
    }
}

/// Factory of [`Projection`]s keyed by code
#[derive(Debug, Clone)]
pub struct ProjectionRegistry {
    projections: HashMap<String, Arc<Projection>>,
}

impl ProjectionRegistry {
    pub fn new() -> Self {
        Self {
            projections: HashMap::default(),
        }
    }

    /// Registry with Web Mercator, WGS84 and ETRS-TM35FIN
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        let half = 20_037_508.342_789_244;
        registry.register(Projection::new(
            "EPSG:3857",
            Units::Meters,
            Some(Extent::new(-half, -half, half, half)),
        ));
        registry.register(Projection::new(
            "EPSG:4326",
            Units::Degrees,
            Some(Extent::new(-180.0, -90.0, 180.0, 90.0)),
        ));
        registry.register(Projection::new(
            "EPSG:3067",
            Units::Meters,
            Some(Extent::new(-548_576.0, 6_291_456.0, 1_548_576.0, 8_388_608.0)),
        ));
        registry
    }

    pub fn register(&mut self, projection: Projection) {
        self.projections
            .insert(projection.code().to_string(), Arc::new(projection));
    }

    pub fn get(&self, code: &str) -> Result<Arc<Projection>> {
        self.projections
            .get(code)
            .cloned()
            .ok_or_else(|| MapError::Projection(format!("unknown projection {code}")).into())
    }
}

impl Default for ProjectionRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_by_code() {
        let registry = ProjectionRegistry::with_defaults();
        let proj = registry.get("EPSG:3067").unwrap();
        assert_eq!(proj.code(), "EPSG:3067");
        assert_eq!(proj.units(), Units::Meters);
        assert_eq!(proj.meters_per_unit(), 1.0);
        assert!(registry.get("EPSG:9999").is_err());
    }
}
