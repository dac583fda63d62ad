use crate::collections::Collection;

use super::{temporal_sort_key, CollectionHandler};

/// NZ prioritisation: same DEM/year/resolution/id keys as AU. The
/// country-level boost that keeps NZ ahead of AU regardless of these keys
/// is applied by `HandlerRegistry::prioritise_all`, not here — this
/// handler only orders *within* NZ's own collections.
pub struct NzHandler;

impl CollectionHandler for NzHandler {
    fn prioritise<'a>(&self, mut collections: Vec<&'a Collection>) -> Vec<&'a Collection> {
        collections.sort_by(|a, b| temporal_sort_key(a).cmp(&temporal_sort_key(b)));
        collections
    }
}
