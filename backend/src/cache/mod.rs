//! Plan Registry - Store and reuse plan documents
//!
//! Saves plans to disk and matches them to new client tables based on the
//! columns they read. A client sending the same export every week only needs a
//! plan from the provider once.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{RegistryError, RegistryResult};
use crate::transform::plan::PlanDocument;

/// Directory where plans are stored (relative to current dir)
const DEFAULT_REGISTRY_DIR: &str = ".orderload/plans";

/// Minimum share of a plan's source columns a table must have.
const COMPATIBILITY_THRESHOLD: f64 = 0.5;

/// A stored plan with usage statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredPlan {
    pub id: String,
    pub name: String,
    pub plan: PlanDocument,
    /// Raw columns the plan reads
    pub source_columns: Vec<String>,
    pub created_at: String,
    pub last_used: Option<String>,
    /// Exponential moving success rate (0.0 to 1.0)
    pub success_rate: f64,
    pub use_count: u32,
}

/// Registry of plan documents on disk
pub struct PlanRegistry {
    registry_dir: PathBuf,
    plans: HashMap<String, StoredPlan>,
}

impl PlanRegistry {
    /// Open the default registry, loading existing plans from disk
    pub fn new() -> Self {
        Self::with_dir(DEFAULT_REGISTRY_DIR)
    }

    /// Open a registry in a custom directory
    pub fn with_dir(dir: impl AsRef<Path>) -> Self {
        let mut registry = Self {
            registry_dir: PathBuf::from(dir.as_ref()),
            plans: HashMap::new(),
        };
        registry.load_all();
        registry
    }

    pub fn dir(&self) -> &Path {
        &self.registry_dir
    }

    /// Unreadable or malformed entries are skipped.
    fn load_all(&mut self) {
        let Ok(entries) = fs::read_dir(&self.registry_dir) else {
            return;
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().is_some_and(|e| e == "json") {
                if let Ok(content) = fs::read_to_string(&path) {
                    if let Ok(plan) = serde_json::from_str::<StoredPlan>(&content) {
                        self.plans.insert(plan.id.clone(), plan);
                    }
                }
            }
        }
    }

    /// All stored plans, oldest first
    pub fn list(&self) -> Vec<&StoredPlan> {
        let mut plans: Vec<_> = self.plans.values().collect();
        plans.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        plans
    }

    pub fn get(&self, id: &str) -> Option<&StoredPlan> {
        self.plans.get(id)
    }

    pub fn len(&self) -> usize {
        self.plans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plans.is_empty()
    }

    /// Plans whose source columns mostly appear in `headers`, best first.
    ///
    /// Ranking is compatibility score times success rate.
    pub fn find_compatible(&self, headers: &[String]) -> Vec<(&StoredPlan, f64)> {
        let mut compatible: Vec<_> = self
            .plans
            .values()
            .filter_map(|p| {
                let score = compatibility(&p.source_columns, headers);
                (score > COMPATIBILITY_THRESHOLD).then_some((p, score))
            })
            .collect();

        compatible.sort_by(|a, b| {
            let score_a = a.1 * a.0.success_rate;
            let score_b = b.1 * b.0.success_rate;
            score_b
                .partial_cmp(&score_a)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.id.cmp(&b.0.id))
        });

        compatible
    }

    /// Save a plan document, returning its id.
    pub fn save(&mut self, plan: PlanDocument, name: &str) -> RegistryResult<String> {
        let source_columns = plan
            .resolve()
            .map_err(|e| RegistryError::InvalidPlan(e.to_string()))?
            .source_columns();

        fs::create_dir_all(&self.registry_dir)?;

        let id = self.generate_id(name);
        let stored = StoredPlan {
            id: id.clone(),
            name: name.to_string(),
            plan,
            source_columns,
            created_at: chrono::Utc::now().to_rfc3339(),
            last_used: None,
            success_rate: 1.0,
            use_count: 0,
        };

        self.write(&stored)?;
        self.plans.insert(id.clone(), stored);
        Ok(id)
    }

    /// Import a plan document from a JSON file
    pub fn import(&mut self, path: &Path, name: Option<&str>) -> RegistryResult<String> {
        let content = fs::read_to_string(path)?;
        let plan =
            PlanDocument::from_json(&content).map_err(|e| RegistryError::InvalidPlan(e.to_string()))?;

        let plan_name = name.unwrap_or_else(|| {
            path.file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("imported")
        });

        self.save(plan, plan_name)
    }

    /// Record the outcome of using a plan
    pub fn update_stats(&mut self, id: &str, success: bool) -> RegistryResult<()> {
        let plan = self
            .plans
            .get_mut(id)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;

        plan.success_rate = if success {
            plan.success_rate * 0.9 + 0.1
        } else {
            plan.success_rate * 0.9
        };
        plan.last_used = Some(chrono::Utc::now().to_rfc3339());
        plan.use_count += 1;

        let snapshot = plan.clone();
        self.write(&snapshot)
    }

    /// Delete a plan
    pub fn delete(&mut self, id: &str) -> RegistryResult<()> {
        if self.plans.remove(id).is_none() {
            return Err(RegistryError::NotFound(id.to_string()));
        }
        fs::remove_file(self.path_for(id))?;
        Ok(())
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.registry_dir.join(format!("{}.json", id))
    }

    fn write(&self, stored: &StoredPlan) -> RegistryResult<()> {
        let content = serde_json::to_string_pretty(stored)?;
        fs::write(self.path_for(&stored.id), content)?;
        Ok(())
    }

    /// Slug of the name plus a millisecond timestamp
    fn generate_id(&self, name: &str) -> String {
        let slug: String = name
            .to_lowercase()
            .chars()
            .map(|c| if c.is_alphanumeric() { c } else { '-' })
            .collect::<String>()
            .split('-')
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("-");
        let slug = if slug.is_empty() { "plan".to_string() } else { slug };

        let mut timestamp = chrono::Utc::now().timestamp_millis();
        let mut id = format!("{}-{}", slug, timestamp);
        while self.plans.contains_key(&id) {
            timestamp += 1;
            id = format!("{}-{}", slug, timestamp);
        }
        id
    }
}

impl Default for PlanRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Share of `stored` columns present in `headers`, case-insensitive.
fn compatibility(stored: &[String], headers: &[String]) -> f64 {
    if stored.is_empty() {
        return 0.0;
    }

    let headers_lower: Vec<String> = headers.iter().map(|c| c.to_lowercase()).collect();
    let match_count = stored
        .iter()
        .filter(|col| headers_lower.contains(&col.to_lowercase()))
        .count();

    match_count as f64 / stored.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::plan::{example_long_plan, example_wide_plan};
    use tempfile::tempdir;

    fn headers(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_compatibility_score() {
        let stored = headers(&["PO", "Store", "Article"]);
        let score = compatibility(&stored, &headers(&["PO", "Store", "Qty"]));
        assert!((score - 0.666).abs() < 0.01);
    }

    #[test]
    fn test_case_insensitive_match() {
        let score = compatibility(&headers(&["po", "STORE"]), &headers(&["PO", "store"]));
        assert!((score - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_save_reload_and_find() {
        let dir = tempdir().unwrap();
        let id = {
            let mut registry = PlanRegistry::with_dir(dir.path());
            registry.save(example_long_plan(), "Weekly ACME").unwrap()
        };
        assert!(id.starts_with("weekly-acme-"));

        let registry = PlanRegistry::with_dir(dir.path());
        assert_eq!(registry.len(), 1);

        let table_headers = headers(&[
            "PO Number",
            "Order Date",
            "Store Code",
            "Article",
            "Qty",
        ]);
        let found = registry.find_compatible(&table_headers);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].0.id, id);

        assert!(registry.find_compatible(&headers(&["Other"])).is_empty());
    }

    #[test]
    fn test_success_rate_orders_candidates() {
        let dir = tempdir().unwrap();
        let mut registry = PlanRegistry::with_dir(dir.path());
        let first = registry.save(example_wide_plan(), "first").unwrap();
        let second = registry.save(example_wide_plan(), "second").unwrap();

        registry.update_stats(&first, false).unwrap();
        let table_headers = headers(&["Store Code", "Delivery Date", "SKU-1001", "SKU-1002", "SKU-1003"]);
        let found = registry.find_compatible(&table_headers);
        assert_eq!(found[0].0.id, second);
        assert!((registry.get(&first).unwrap().success_rate - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_delete_and_missing() {
        let dir = tempdir().unwrap();
        let mut registry = PlanRegistry::with_dir(dir.path());
        let id = registry.save(example_long_plan(), "gone").unwrap();

        registry.delete(&id).unwrap();
        assert!(registry.is_empty());
        assert!(matches!(registry.delete(&id), Err(RegistryError::NotFound(_))));
        assert!(matches!(
            registry.update_stats(&id, true),
            Err(RegistryError::NotFound(_))
        ));
    }

    #[test]
    fn test_import_rejects_invalid_plan() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("bad.json");
        std::fs::write(&file, r#"{"mapping_plan": []}"#).unwrap();

        let mut registry = PlanRegistry::with_dir(dir.path().join("plans"));
        assert!(matches!(
            registry.import(&file, None),
            Err(RegistryError::InvalidPlan(_))
        ));
    }
}
