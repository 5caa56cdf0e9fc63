use std::collections::HashSet;

/// Identity of a record, used for duplicate suppression across fetches.
pub trait RecordKey: core::hash::Hash + Eq + Clone + Send + Sync + 'static {}
impl<K: core::hash::Hash + Eq + Clone + Send + Sync + 'static> RecordKey for K {}

pub(crate) type KeySet<K> = HashSet<K>;
