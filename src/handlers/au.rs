use crate::collections::Collection;

use super::{temporal_sort_key, CollectionHandler};

/// AU prioritisation: DEM over DSM, then survey year descending (newer
/// first, null years last), then resolution ascending (finer first), then
/// lexicographic id. Road engineers prefer the most recent high-resolution
/// LiDAR survey.
pub struct AuHandler;

impl CollectionHandler for AuHandler {
    fn prioritise<'a>(&self, mut collections: Vec<&'a Collection>) -> Vec<&'a Collection> {
        collections.sort_by(|a, b| temporal_sort_key(a).cmp(&temporal_sort_key(b)));
        collections
    }
}
