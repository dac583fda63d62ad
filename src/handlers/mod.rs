//! C3: Collection Handler Registry — country-specific policies for bounds
//! intersection, CRS handling, and campaign prioritisation.

mod au;
mod nz;

use std::collections::HashMap;

use crate::collections::{Collection, Country, DataType, FileRef};
use crate::crs::CrsTransformer;
use crate::error::ElevationError;
use crate::geometry::QueryPoint;
use crate::spatial_index::SpatialIndex;

pub use au::AuHandler;
pub use nz::NzHandler;

/// Shared AU/NZ ordering: DEM before DSM, then survey year descending
/// (newer first, null years last), then resolution ascending (finer
/// first), then lexicographic id. DEM is preferred over DSM when both
/// cover a point because road engineers want bare-earth elevation, not
/// the top of vegetation or buildings.
pub(super) fn temporal_sort_key(c: &Collection) -> (bool, bool, i64, u64, &str) {
    let year_key = match c.survey_year {
        Some(year) => -(year as i64),
        None => 0,
    };
    (
        c.data_type != DataType::Dem,
        c.survey_year.is_none(),
        year_key,
        c.resolution_m.to_bits(),
        c.id.as_str(),
    )
}

/// Per-country policy. Adding a country is a configuration change
/// (register a new handler) and must not require touching orchestration
/// code.
pub trait CollectionHandler: Send + Sync {
    /// Stable sort, highest priority first.
    fn prioritise<'a>(&self, collections: Vec<&'a Collection>) -> Vec<&'a Collection>;

    /// Transform the point to the collection's native CRS via C1 if
    /// needed, then ask C2. Handlers never open rasters themselves.
    fn files<'a>(
        &self,
        collection: &'a Collection,
        query_point: &QueryPoint,
        index: &SpatialIndex,
        transformer: &CrsTransformer,
    ) -> Result<Vec<&'a FileRef>, ElevationError> {
        index.files_for(collection, query_point, transformer)
    }
}

/// Registry of country handlers, built once at startup.
pub struct HandlerRegistry {
    handlers: HashMap<Country, Box<dyn CollectionHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        let mut handlers: HashMap<Country, Box<dyn CollectionHandler>> = HashMap::new();
        handlers.insert(Country::Au, Box::new(AuHandler));
        handlers.insert(Country::Nz, Box::new(NzHandler));
        Self { handlers }
    }

    pub fn for_country(&self, country: Country) -> Option<&dyn CollectionHandler> {
        self.handlers.get(&country).map(|h| h.as_ref())
    }

    /// Group candidates by country and apply each country's
    /// prioritisation, then flatten with NZ's additive boost already
    /// baked in by the handler — see `NzHandler::prioritise`.
    pub fn prioritise_all<'a>(&self, candidates: Vec<&'a Collection>) -> Vec<&'a Collection> {
        let mut by_country: HashMap<Country, Vec<&'a Collection>> = HashMap::new();
        for c in candidates {
            by_country.entry(c.country).or_default().push(c);
        }

        let mut prioritised: Vec<(i64, &'a Collection)> = Vec::new();
        for (country, collections) in by_country {
            if let Some(handler) = self.for_country(country) {
                let ordered = handler.prioritise(collections);
                let boost = country_boost(country);
                for (rank, c) in ordered.into_iter().enumerate() {
                    // rank is ascending (0 = best); invert so higher total
                    // sorts first, and NZ's boost keeps it ahead of any AU
                    // collection regardless of rank.
                    prioritised.push((boost - rank as i64, c));
                }
            }
        }

        prioritised.sort_by(|a, b| b.0.cmp(&a.0));
        prioritised.into_iter().map(|(_, c)| c).collect()
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// NZ collections get a large additive priority boost over AU so a NZ
/// point never falls through to incidentally-intersecting AU collections.
fn country_boost(country: Country) -> i64 {
    match country {
        Country::Nz => 1_000_000,
        Country::Au => 0,
    }
}
