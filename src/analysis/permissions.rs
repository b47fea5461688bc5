//! API-level keyed tables mapping framework methods to the permissions they
//! require.
//!
//! Methods are keyed as `class-name-descriptor`, see
//! [`ExternalMethod::permission_api_name`](crate::analysis::ExternalMethod::permission_api_name).

use std::collections::{BTreeMap, HashMap};

use log::warn;
use serde::{Deserialize, Serialize};

use crate::dex::error::DexError;

/// Method name to required permissions.
pub type ApiPermissions = HashMap<String, Vec<String>>;

pub trait PermissionSource {
    /// Levels with a table, ascending.
    fn levels(&self) -> Vec<u32>;

    fn permissions_for(&self, level: u32) -> Option<&ApiPermissions>;
}

/// In-memory mappings, usually loaded from JSON such as
/// `{"28": {"Landroid/location/LocationManager;-getLastKnownLocation-(Ljava/lang/String;)Landroid/location/Location;": ["android.permission.ACCESS_FINE_LOCATION"]}}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionMappings {
    levels: BTreeMap<u32, ApiPermissions>,
}

impl PermissionMappings {
    pub fn new() -> Self {
        PermissionMappings::default()
    }

    pub fn insert(&mut self, level: u32, permissions: ApiPermissions) {
        self.levels.insert(level, permissions);
    }

    /// Adds one method to the table of `level`.
    pub fn add(&mut self, level: u32, api: &str, permissions: &[&str]) {
        self.levels
            .entry(level)
            .or_default()
            .insert(api.to_string(), permissions.iter().map(|p| p.to_string()).collect());
    }

    pub fn from_json(json: &str) -> Result<Self, DexError> {
        serde_json::from_str(json)
            .map_err(|e| DexError::invalid_argument(&format!("Unable to read permission mappings: {}", e)))
    }

    /// Reads the table of a single level, as shipped in one file per level.
    pub fn insert_json(&mut self, level: u32, json: &str) -> Result<(), DexError> {
        let table: ApiPermissions = serde_json::from_str(json).map_err(|e| {
            DexError::invalid_argument(&format!("Unable to read permission mappings for API {}: {}", level, e))
        })?;
        self.insert(level, table);
        Ok(())
    }
}

impl PermissionSource for PermissionMappings {
    fn levels(&self) -> Vec<u32> {
        self.levels.keys().copied().collect()
    }

    fn permissions_for(&self, level: u32) -> Option<&ApiPermissions> {
        self.levels.get(&level)
    }
}

/// The level to use for `requested`: itself when present, else the closest
/// lower level, else the lowest one available.
pub fn resolve_level<P>(source: &P, requested: u32) -> Result<u32, DexError>
where
    P: PermissionSource + ?Sized,
{
    let mut levels = source.levels();
    levels.sort_unstable();
    if levels.is_empty() {
        return Err(DexError::invalid_argument("No permission mappings are available"));
    }
    if levels.contains(&requested) {
        return Ok(requested);
    }
    let level = match levels.iter().rev().find(|l| **l < requested) {
        Some(l) => *l,
        None => levels[0],
    };
    warn!("No permission mapping for API {}, using API {} instead", requested, level);
    Ok(level)
}

pub(crate) fn mapping_for<P>(source: &P, requested: u32) -> Result<&ApiPermissions, DexError>
where
    P: PermissionSource + ?Sized,
{
    let level = resolve_level(source, requested)?;
    source
        .permissions_for(level)
        .ok_or_else(|| DexError::invalid_argument(&format!("Permission mappings list API {} but have no table", level)))
}
