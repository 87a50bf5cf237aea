//! Fuel model registry (spec.md §1/§4.3, DESIGN NOTES "deep inheritance of
//! fuel types... re-expressed as a registry").
//!
//! The full Canadian FBP fuel-behaviour equations are an external
//! collaborator (spec.md §1: "Fuel-type behaviour library... treated as a
//! pluggable fuel model registry"). This module defines that contract —
//! `FuelCode -> FuelBehaviour`, a tagged variant rather than the deep
//! inheritance hierarchy the original system used, so no virtual dispatch
//! is needed on the hot spread path — plus a small reference registry with
//! enough named fuel types to drive [`crate::spread_kernel::FbpSpreadKernel`]
//! and the integration tests.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Opaque identifier for a fuel type, as referenced by a raster's integer
/// fuel code and the fuel lookup table (spec.md §6.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FuelId(pub u16);

/// A cell's fuel reference: `None` is the "invalid/unburnable" sentinel
/// (spec.md §3 `Cell`).
pub type FuelCode = Option<FuelId>;

/// Coarse FBP fuel-type group. The full FBP System has dozens of named
/// fuels (C-1..C-7, D-1, M-1..M-4, O-1, S-1..S-3); this reference registry
/// keeps one representative per group rather than the complete table,
/// matching the "pluggable registry, not a complete FBP implementation"
/// scope from spec.md §1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FuelGroup {
    /// Coniferous forest (closed canopy, needle litter).
    Conifer,
    /// Deciduous forest (leaf litter, low flammability when leafed-out).
    Deciduous,
    /// Mixedwood (conifer/deciduous blend).
    Mixedwood,
    /// Slash / logging debris.
    Slash,
    /// Open grass (cured or green, curing-dependent).
    Grass,
    /// Non-combustible (water, rock, bare ground).
    NonFuel,
}

/// Per-fuel-type behaviour parameters driving rate of spread and
/// extinction (spec.md §4.6 spread-kernel contract inputs). A tagged
/// variant rather than a class hierarchy: the hot path matches on
/// `FuelGroup` once per cell instead of dispatching through a vtable.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FuelBehaviour {
    /// Which coarse group this fuel belongs to.
    pub group: FuelGroup,
    /// Fuel moisture content (fraction) above which this fuel will not
    /// sustain spread.
    pub moisture_of_extinction: f64,
    /// Base rate-of-spread coefficient used by the reference spread
    /// kernel's simplified ROS formula (m/min at ISI = 10, no slope).
    pub ros_coefficient: f64,
    /// Curing factor in `[0, 1]`; `1.0` for fuels with no curing concept
    /// (forest litter), driven by `--curing`/`--force-greenup` for grass.
    pub curing: f64,
    /// Crown fraction burned threshold (fireline intensity, kW/m) above
    /// which this fuel type transitions to crown fire behaviour.
    pub crown_fire_threshold: f64,
}

impl FuelGroup {
    /// `true` for water, rock, and other cells that can never burn
    /// regardless of moisture.
    #[must_use]
    pub fn is_non_fuel(self) -> bool {
        matches!(self, FuelGroup::NonFuel)
    }
}

/// Outcome of a fuel lookup, distinguishing "explicitly non-combustible"
/// from "no entry in the table at all" (SPEC_FULL.md §9 supplemented
/// feature, grounded in `original_source/Environment.cpp`/`FuelType.cpp`).
/// Both non-`Combustible` outcomes behave identically for spread (the cell
/// is marked unburnable) but are logged differently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FuelLookup {
    /// A combustible fuel with a registered [`FuelBehaviour`].
    Combustible(FuelId),
    /// The code is in the LUT but marked explicitly non-combustible.
    NonCombustible,
    /// The code has no entry in the LUT at all.
    Unknown,
}

/// Maps [`FuelId`]s to [`FuelBehaviour`] (the "fuel model registry"
/// collaborator, spec.md §1).
#[derive(Debug, Clone, Default)]
pub struct FuelModelRegistry {
    behaviours: HashMap<FuelId, FuelBehaviour>,
    non_combustible: HashMap<u16, ()>,
}

impl FuelModelRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `behaviour` under `id`.
    pub fn insert(&mut self, id: FuelId, behaviour: FuelBehaviour) {
        self.behaviours.insert(id, behaviour);
    }

    /// Mark `id` as present in the LUT but explicitly non-combustible
    /// (water, rock, bare ground).
    pub fn insert_non_combustible(&mut self, id: u16) {
        self.non_combustible.insert(id, ());
    }

    /// Behaviour registered for `id`, if any.
    #[must_use]
    pub fn behaviour(&self, id: FuelId) -> Option<&FuelBehaviour> {
        self.behaviours.get(&id)
    }

    /// Classify a raw raster fuel code per [`FuelLookup`]'s three cases.
    #[must_use]
    pub fn lookup(&self, raw_code: u16) -> FuelLookup {
        let id = FuelId(raw_code);
        if self.behaviours.contains_key(&id) {
            FuelLookup::Combustible(id)
        } else if self.non_combustible.contains_key(&raw_code) {
            FuelLookup::NonCombustible
        } else {
            FuelLookup::Unknown
        }
    }

    /// A small reference registry covering one representative fuel per
    /// [`FuelGroup`] plus a non-combustible "water" code, sufficient to run
    /// the reference spread kernel and the integration tests end to end.
    #[must_use]
    pub fn reference() -> Self {
        let mut reg = Self::new();
        reg.insert(
            FuelId(1),
            FuelBehaviour {
                group: FuelGroup::Conifer,
                moisture_of_extinction: 0.30,
                ros_coefficient: 12.0,
                curing: 1.0,
                crown_fire_threshold: 2_000.0,
            },
        );
        reg.insert(
            FuelId(2),
            FuelBehaviour {
                group: FuelGroup::Deciduous,
                moisture_of_extinction: 0.35,
                ros_coefficient: 4.0,
                curing: 1.0,
                crown_fire_threshold: 4_000.0,
            },
        );
        reg.insert(
            FuelId(3),
            FuelBehaviour {
                group: FuelGroup::Mixedwood,
                moisture_of_extinction: 0.32,
                ros_coefficient: 8.0,
                curing: 1.0,
                crown_fire_threshold: 3_000.0,
            },
        );
        reg.insert(
            FuelId(4),
            FuelBehaviour {
                group: FuelGroup::Slash,
                moisture_of_extinction: 0.25,
                ros_coefficient: 14.0,
                curing: 1.0,
                crown_fire_threshold: 10_000.0,
            },
        );
        reg.insert(
            FuelId(5),
            FuelBehaviour {
                group: FuelGroup::Grass,
                moisture_of_extinction: 0.20,
                ros_coefficient: 22.0,
                curing: 0.8,
                crown_fire_threshold: 10_000.0,
            },
        );
        reg.insert_non_combustible(99);
        reg
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_distinguishes_non_combustible_from_unknown() {
        let reg = FuelModelRegistry::reference();
        assert_eq!(reg.lookup(1), FuelLookup::Combustible(FuelId(1)));
        assert_eq!(reg.lookup(99), FuelLookup::NonCombustible);
        assert_eq!(reg.lookup(1234), FuelLookup::Unknown);
    }

    #[test]
    fn grass_has_lower_moisture_of_extinction_than_conifer() {
        let reg = FuelModelRegistry::reference();
        let grass = reg.behaviour(FuelId(5)).unwrap();
        let conifer = reg.behaviour(FuelId(1)).unwrap();
        assert!(grass.moisture_of_extinction < conifer.moisture_of_extinction);
    }
}
