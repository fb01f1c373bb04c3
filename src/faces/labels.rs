//! Identity labels, bound to clusters rather than to individual faces.
//!
//! [`LabelPropagationManager`] holds the authoritative `cluster_id -> label`
//! bindings. A face's own `label` column is a cache filled in by propagation
//! and may lag behind these bindings until the next reconciliation.
//!
//! Bindings are keyed by cluster id, and cluster ids are recomputed by every
//! clustering run. When the face population changes, a binding can end up
//! attached to a different identity.
// TODO: key bindings by an anchor face id so they survive re-clustering.

use std::collections::BTreeMap;

use anyhow::Result;
use rusqlite::Connection;
use serde::Serialize;
use tracing::info;

use super::cluster::NOISE;
use crate::error::LabelError;
use crate::memory::store;

/// Where a face's label came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelSource {
    /// Inherited from the face's cluster binding.
    Propagated,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PropagatedLabel {
    pub label: String,
    pub source: LabelSource,
}

#[derive(Debug, Clone, Default)]
pub struct LabelPropagationManager {
    labels: BTreeMap<i64, String>,
}

impl LabelPropagationManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore bindings saved with [`save`](Self::save).
    pub fn load(conn: &Connection) -> Result<Self> {
        let labels = store::load_cluster_labels(conn)?;
        info!(count = labels.len(), "cluster labels loaded");
        Ok(Self { labels })
    }

    /// Replace the stored bindings with the current ones.
    pub fn save(&self, conn: &mut Connection) -> Result<()> {
        store::save_cluster_labels(conn, &self.labels)
    }

    /// Bind `label` to a cluster, replacing any existing binding.
    pub fn set_label(&mut self, cluster_id: i64, label: impl Into<String>) -> Result<(), LabelError> {
        if cluster_id == NOISE {
            return Err(LabelError::InvalidCluster(cluster_id));
        }
        let label = label.into();
        info!(cluster_id, label = %label, "label set");
        self.labels.insert(cluster_id, label);
        Ok(())
    }

    /// Change the label of an already-labeled cluster.
    pub fn rename_label(&mut self, cluster_id: i64, new_label: impl Into<String>) -> Result<(), LabelError> {
        let slot = self
            .labels
            .get_mut(&cluster_id)
            .ok_or(LabelError::LabelNotFound(cluster_id))?;
        *slot = new_label.into();
        info!(cluster_id, label = %slot, "label renamed");
        Ok(())
    }

    /// Drop a binding. Absent bindings are ignored.
    pub fn remove_label(&mut self, cluster_id: i64) -> Option<String> {
        let removed = self.labels.remove(&cluster_id);
        if removed.is_some() {
            info!(cluster_id, "label removed");
        }
        removed
    }

    pub fn get_label(&self, cluster_id: i64) -> Option<&str> {
        self.labels.get(&cluster_id).map(String::as_str)
    }

    pub fn labels(&self) -> &BTreeMap<i64, String> {
        &self.labels
    }

    /// Labels for every face whose cluster is bound to a non-empty label.
    ///
    /// Faces in noise or unlabeled clusters are left out.
    pub fn propagate<Id: Clone + Ord>(
        &self,
        face_clusters: &BTreeMap<Id, i64>,
    ) -> BTreeMap<Id, PropagatedLabel> {
        face_clusters
            .iter()
            .filter_map(|(face_id, &cluster_id)| {
                self.get_label(cluster_id)
                    .filter(|label| !label.is_empty())
                    .map(|label| {
                        (
                            face_id.clone(),
                            PropagatedLabel {
                                label: label.to_string(),
                                source: LabelSource::Propagated,
                            },
                        )
                    })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_memory_database;

    #[test]
    fn noise_cluster_cannot_be_labeled() {
        let mut manager = LabelPropagationManager::new();
        assert_eq!(manager.set_label(-1, "x"), Err(LabelError::InvalidCluster(-1)));
        assert!(manager.labels().is_empty());
    }

    #[test]
    fn set_then_get() {
        let mut manager = LabelPropagationManager::new();
        manager.set_label(5, "Raj").unwrap();
        assert_eq!(manager.get_label(5), Some("Raj"));
        assert_eq!(manager.get_label(6), None);
    }

    #[test]
    fn rename_requires_existing_label() {
        let mut manager = LabelPropagationManager::new();
        assert_eq!(manager.rename_label(6, "y"), Err(LabelError::LabelNotFound(6)));

        manager.set_label(6, "Ravi").unwrap();
        manager.rename_label(6, "Raj").unwrap();
        assert_eq!(manager.get_label(6), Some("Raj"));
    }

    #[test]
    fn remove_is_noop_when_absent() {
        let mut manager = LabelPropagationManager::new();
        assert_eq!(manager.remove_label(3), None);
        manager.set_label(3, "Meera").unwrap();
        assert_eq!(manager.remove_label(3).as_deref(), Some("Meera"));
        assert_eq!(manager.get_label(3), None);
    }

    #[test]
    fn propagate_skips_noise_and_unlabeled() {
        let mut manager = LabelPropagationManager::new();
        manager.set_label(0, "Raj").unwrap();
        manager.set_label(2, "").unwrap();

        let mut clusters = BTreeMap::new();
        clusters.insert("f1".to_string(), 0);
        clusters.insert("f2".to_string(), 0);
        clusters.insert("f3".to_string(), 1);
        clusters.insert("f4".to_string(), NOISE);
        clusters.insert("f5".to_string(), 2);

        let labeled = manager.propagate(&clusters);
        assert_eq!(labeled.len(), 2);
        assert_eq!(labeled["f1"].label, "Raj");
        assert_eq!(labeled["f2"].source, LabelSource::Propagated);
        assert!(!labeled.contains_key("f3"));
        assert!(!labeled.contains_key("f4"));
    }

    #[test]
    fn save_and_load() {
        let mut conn = open_memory_database().unwrap();
        let mut manager = LabelPropagationManager::new();
        manager.set_label(1, "Raj").unwrap();
        manager.set_label(4, "Meera").unwrap();
        manager.save(&mut conn).unwrap();

        let restored = LabelPropagationManager::load(&conn).unwrap();
        assert_eq!(restored.labels(), manager.labels());
    }
}
