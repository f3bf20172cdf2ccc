//! Configuration manager
//!
//! Owns the preferences file and the current snapshot. Every mutation is
//! persisted before it returns.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use common::error::Result;
use storage_adapter::JsonStore;

use crate::preferences::{clamp_weight, PreferencesUpdate, SelectionPreferences};

/// Configuration manager for the selection preferences
#[derive(Debug, Clone)]
pub struct ConfigManager {
    /// Preferences document
    store: JsonStore,

    /// Current preferences snapshot
    preferences: SelectionPreferences,
}

impl ConfigManager {
    /// Loads the preferences stored at `path`
    ///
    /// A missing or malformed file yields the defaults; an invalid enum value
    /// is returned as an error.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let store = JsonStore::new(path);
        let preferences = SelectionPreferences::load(&store)?;

        info!(
            "Loaded preferences from {:?} (mode: {}, accuracy: {})",
            store.path(),
            preferences.performance_mode,
            preferences.accuracy_preference
        );

        Ok(Self { store, preferences })
    }

    /// Creates a manager around an existing snapshot without touching disk
    pub fn with_preferences(path: impl Into<PathBuf>, mut preferences: SelectionPreferences) -> Self {
        preferences.normalize();
        Self {
            store: JsonStore::new(path),
            preferences,
        }
    }

    /// Path of the preferences file
    pub fn path(&self) -> &Path {
        self.store.path()
    }

    /// Current preferences snapshot
    pub fn preferences(&self) -> &SelectionPreferences {
        &self.preferences
    }

    /// Applies a partial update and persists the result
    pub fn update(&mut self, update: PreferencesUpdate) -> Result<&SelectionPreferences> {
        if update.is_empty() {
            debug!("Empty preferences update, nothing to persist");
            return Ok(&self.preferences);
        }

        let mut preferences = self.preferences.clone();
        preferences.apply(update);
        self.commit(preferences)?;

        Ok(&self.preferences)
    }

    /// Sets the score multiplier for one model and persists it
    pub fn set_custom_model_weight(&mut self, model_name: &str, weight: f64) -> Result<()> {
        let mut preferences = self.preferences.clone();
        preferences
            .custom_model_weights
            .insert(model_name.to_string(), clamp_weight(weight));
        self.commit(preferences)
    }

    /// Removes the score multiplier for one model and persists the change
    ///
    /// Returns true if a weight was removed.
    pub fn remove_custom_model_weight(&mut self, model_name: &str) -> Result<bool> {
        if !self.preferences.custom_model_weights.contains_key(model_name) {
            return Ok(false);
        }

        let mut preferences = self.preferences.clone();
        preferences.custom_model_weights.remove(model_name);
        self.commit(preferences)?;

        Ok(true)
    }

    /// Restores and persists the default preferences
    pub fn reset_to_defaults(&mut self) -> Result<()> {
        self.commit(SelectionPreferences::default())
    }

    /// Persists the current snapshot
    pub fn save(&self) -> Result<()> {
        self.preferences.save(&self.store)
    }

    /// Persists a new snapshot, then swaps it in
    fn commit(&mut self, preferences: SelectionPreferences) -> Result<()> {
        preferences.save(&self.store)?;
        self.preferences = preferences;

        info!("Saved preferences to {:?}", self.store.path());

        Ok(())
    }
}
