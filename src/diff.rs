use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::Flag;

/// Changes between two consecutive cache snapshots.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiffCache {
    /// Flags present in the old snapshot only.
    pub deleted: HashMap<String, Flag>,
    /// Flags present in the new snapshot only.
    pub added: HashMap<String, Flag>,
    /// Flags present in both snapshots with a different definition.
    pub updated: HashMap<String, DiffUpdated>,
}

/// Before and after values of an updated flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffUpdated {
    /// Definition in the old snapshot.
    #[serde(rename = "old_value")]
    pub before: Flag,
    /// Definition in the new snapshot.
    #[serde(rename = "new_value")]
    pub after: Flag,
}

impl DiffCache {
    /// Compute the changes needed to go from `old` to `new`.
    ///
    /// When `old` is empty (first load), every flag of `new` is reported as added.
    pub fn between(old: &HashMap<String, Flag>, new: &HashMap<String, Flag>) -> DiffCache {
        let mut diff = DiffCache::default();

        for (key, old_flag) in old {
            match new.get(key) {
                None => {
                    diff.deleted.insert(key.clone(), old_flag.clone());
                }
                Some(new_flag) if new_flag != old_flag => {
                    diff.updated.insert(
                        key.clone(),
                        DiffUpdated {
                            before: old_flag.clone(),
                            after: new_flag.clone(),
                        },
                    );
                }
                Some(_) => {}
            }
        }

        for (key, new_flag) in new {
            if !old.contains_key(key) {
                diff.added.insert(key.clone(), new_flag.clone());
            }
        }

        diff
    }

    /// Returns `true` if anything changed.
    pub fn has_diff(&self) -> bool {
        !self.deleted.is_empty() || !self.added.is_empty() || !self.updated.is_empty()
    }
}
