//! Session-owned store of structure sets and their ROI contours.
//!
//! All creation goes through a get-or-create path that holds the registry
//! lock for the whole check-then-insert, so concurrent callers asking for
//! the same `(series, label)` pair always observe the same entity.

use crate::model::{
    RoiContour, SharedRoiContour, SharedStructureSet, StructureSet, StructureSetDefaults,
    StructureSetKey, read_lock, write_lock,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use tracing::debug;

#[derive(Debug, Default)]
pub struct VolumeRegistry {
    structure_sets: Mutex<HashMap<StructureSetKey, SharedStructureSet>>,
}

impl VolumeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<StructureSetKey, SharedStructureSet>> {
        self.structure_sets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Return the structure set for `(series_instance_uid, label)`, creating
    /// it with `defaults` when absent.
    pub fn get_or_create_structure_set(
        &self,
        series_instance_uid: &str,
        label: &str,
        defaults: StructureSetDefaults,
    ) -> SharedStructureSet {
        let mut entries = self.entries();
        Self::structure_set_entry(&mut entries, StructureSetKey::new(series_instance_uid, label), defaults)
    }

    fn structure_set_entry(
        entries: &mut HashMap<StructureSetKey, SharedStructureSet>,
        key: StructureSetKey,
        defaults: StructureSetDefaults,
    ) -> SharedStructureSet {
        entries
            .entry(key.clone())
            .or_insert_with(|| {
                debug!(series = %key.series_instance_uid, label = %key.label, "creating structure set");
                Arc::new(RwLock::new(StructureSet::new(key, defaults)))
            })
            .clone()
    }

    /// Return the ROI contour `uid` of the given structure set, creating both
    /// as needed.
    ///
    /// The registry lock is held until the ROI is in place, so a concurrent
    /// [`VolumeRegistry::commit`] cannot swap the structure set in between.
    pub fn get_or_create_roi_contour(
        &self,
        series_instance_uid: &str,
        label: &str,
        name: &str,
        uid: &str,
    ) -> SharedRoiContour {
        let mut entries = self.entries();
        let structure_set = Self::structure_set_entry(
            &mut entries,
            StructureSetKey::new(series_instance_uid, label),
            StructureSetDefaults {
                name: label.to_string(),
                ..StructureSetDefaults::default()
            },
        );
        let mut structure_set = write_lock(&structure_set);
        if let Some(existing) = structure_set.find_roi_contour(uid) {
            return existing;
        }
        debug!(uid, name, "creating ROI contour");
        let roi = Arc::new(RwLock::new(RoiContour::new(uid, name)));
        structure_set.roi_contours.push(Arc::clone(&roi));
        roi
    }

    pub fn structure_set(&self, series_instance_uid: &str, label: &str) -> Option<SharedStructureSet> {
        self.entries()
            .get(&StructureSetKey::new(series_instance_uid, label))
            .cloned()
    }

    /// All structure sets registered for a series, ordered by label.
    pub fn structure_sets_for_series(&self, series_instance_uid: &str) -> Vec<SharedStructureSet> {
        let entries = self.entries();
        let mut keys: Vec<_> = entries
            .keys()
            .filter(|key| key.series_instance_uid == series_instance_uid)
            .collect();
        keys.sort();
        keys.into_iter().map(|key| Arc::clone(&entries[key])).collect()
    }

    /// Non-empty ROI contours of one structure set.
    pub fn list_non_empty_roi_contours(structure_set: &StructureSet) -> Vec<SharedRoiContour> {
        structure_set.non_empty_roi_contours()
    }

    /// Look up a ROI contour by uid across every structure set of a series.
    pub fn find_roi_contour(&self, series_instance_uid: &str, uid: &str) -> Option<SharedRoiContour> {
        self.structure_sets_for_series(series_instance_uid)
            .iter()
            .find_map(|set| read_lock(set).find_roi_contour(uid))
    }

    /// Move every structure set of `staged` into this registry in one step,
    /// replacing entries with the same `(series, label)` key.
    pub fn commit(&self, staged: VolumeRegistry) {
        let staged = staged
            .structure_sets
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);
        let mut entries = self.entries();
        for (key, structure_set) in staged {
            if entries.insert(key.clone(), structure_set).is_some() {
                debug!(series = %key.series_instance_uid, label = %key.label, "replaced structure set");
            }
        }
    }

    pub fn remove_structure_set(&self, series_instance_uid: &str, label: &str) -> bool {
        self.entries()
            .remove(&StructureSetKey::new(series_instance_uid, label))
            .is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}
