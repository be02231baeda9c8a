//! User Profile Document Store
//!
//! The profile is a single JSON document carrying constraints,
//! preferences, and identities that apply across every topic and
//! session. The Scribe is its only writer; updates are
//! read-modify-write with last-writer-wins, acceptable because a single
//! user owns the document.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// A hard constraint on generated output (diet, allergy, policy)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileConstraint {
    pub key: String,
    /// Constraint category, e.g. `dietary`, `allergy`, `rule`
    #[serde(rename = "type")]
    pub constraint_type: String,
    pub description: String,
    /// Free-form severity, e.g. `low` / `medium` / `high` / `critical`
    pub severity: String,
}

/// A keyed preference or identity statement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileEntry {
    pub key: String,
    pub value: String,
}

/// The glossary section of the profile document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Glossary {
    #[serde(default)]
    pub constraints: Vec<ProfileConstraint>,
    #[serde(default)]
    pub preferences: Vec<ProfileEntry>,
    #[serde(default)]
    pub identities: Vec<ProfileEntry>,
}

/// The user profile document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default)]
    pub glossary: Glossary,
}

impl UserProfile {
    /// Whether the document carries any content
    pub fn is_empty(&self) -> bool {
        self.glossary.constraints.is_empty()
            && self.glossary.preferences.is_empty()
            && self.glossary.identities.is_empty()
    }

    /// Insert or replace a constraint by key
    pub fn upsert_constraint(&mut self, constraint: ProfileConstraint) {
        match self
            .glossary
            .constraints
            .iter_mut()
            .find(|c| c.key == constraint.key)
        {
            Some(existing) => *existing = constraint,
            None => self.glossary.constraints.push(constraint),
        }
    }

    /// Insert or replace a preference by key
    pub fn upsert_preference(&mut self, entry: ProfileEntry) {
        upsert_entry(&mut self.glossary.preferences, entry);
    }

    /// Insert or replace an identity by key
    pub fn upsert_identity(&mut self, entry: ProfileEntry) {
        upsert_entry(&mut self.glossary.identities, entry);
    }
}

fn upsert_entry(entries: &mut Vec<ProfileEntry>, entry: ProfileEntry) {
    match entries.iter_mut().find(|e| e.key == entry.key) {
        Some(existing) => *existing = entry,
        None => entries.push(entry),
    }
}

/// File-backed profile store
#[derive(Debug, Clone)]
pub struct ProfileStore {
    path: PathBuf,
}

impl ProfileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the profile; a missing file yields an empty profile
    pub fn load(&self) -> CoreResult<UserProfile> {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) => serde_json::from_str(&raw)
                .map_err(|e| CoreError::profile(format!("malformed profile document: {}", e))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(UserProfile::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Persist the profile document
    pub fn save(&self, profile: &UserProfile) -> CoreResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let raw = serde_json::to_string_pretty(profile)?;
        std::fs::write(&self.path, raw)?;
        Ok(())
    }

    /// Read-modify-write update, last-writer-wins
    pub fn update(&self, apply: impl FnOnce(&mut UserProfile)) -> CoreResult<UserProfile> {
        let mut profile = self.load()?;
        apply(&mut profile);
        self.save(&profile)?;
        Ok(profile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, ProfileStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = ProfileStore::new(dir.path().join("profile.json"));
        (dir, store)
    }

    fn vegetarian() -> ProfileConstraint {
        ProfileConstraint {
            key: "diet_vegetarian".into(),
            constraint_type: "dietary".into(),
            description: "User is strictly vegetarian and eats no meat or fish.".into(),
            severity: "high".into(),
        }
    }

    #[test]
    fn test_missing_file_is_empty_profile() {
        let (_dir, store) = store();
        let profile = store.load().unwrap();
        assert!(profile.is_empty());
    }

    #[test]
    fn test_save_and_reload() {
        let (_dir, store) = store();

        let mut profile = UserProfile::default();
        profile.upsert_constraint(vegetarian());
        profile.upsert_preference(ProfileEntry {
            key: "theme".into(),
            value: "dark mode".into(),
        });
        store.save(&profile).unwrap();

        let reloaded = store.load().unwrap();
        assert_eq!(reloaded.glossary.constraints.len(), 1);
        assert_eq!(reloaded.glossary.preferences[0].value, "dark mode");
    }

    #[test]
    fn test_upsert_replaces_by_key() {
        let mut profile = UserProfile::default();
        profile.upsert_constraint(vegetarian());

        let mut updated = vegetarian();
        updated.severity = "critical".into();
        profile.upsert_constraint(updated);

        assert_eq!(profile.glossary.constraints.len(), 1);
        assert_eq!(profile.glossary.constraints[0].severity, "critical");
    }

    #[test]
    fn test_update_read_modify_write() {
        let (_dir, store) = store();

        store
            .update(|p| p.upsert_identity(ProfileEntry {
                key: "name".into(),
                value: "Sam".into(),
            }))
            .unwrap();
        store
            .update(|p| p.upsert_identity(ProfileEntry {
                key: "name".into(),
                value: "Samantha".into(),
            }))
            .unwrap();

        let profile = store.load().unwrap();
        assert_eq!(profile.glossary.identities.len(), 1);
        assert_eq!(profile.glossary.identities[0].value, "Samantha");
    }

    #[test]
    fn test_serde_shape_matches_document_contract() {
        let mut profile = UserProfile::default();
        profile.upsert_constraint(vegetarian());
        let json = serde_json::to_value(&profile).unwrap();
        assert!(json["glossary"]["constraints"][0]["type"].is_string());
        assert!(json["glossary"]["constraints"][0]["severity"].is_string());
    }
}
