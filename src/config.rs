//! Application configuration document.
//!
//! Loaded from the project's JSON file at packaging time and embedded into the asset bundle,
//! where the payload reads it back at run time.

use std::{fs::read_to_string, path::Path};

use serde::{Deserialize, Serialize};

use crate::error::{PackError, PackResult};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AppConfig {
    pub app:    AppInfo,
    pub window: WindowConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AppInfo {
    pub name:       String,
    pub version:    String,
    /// Stable project identifier, the input of bundle key derivation.
    pub identifier: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WindowConfig {
    pub title:         String,
    pub width:         u32,
    pub height:        u32,
    pub min_width:     u32,
    pub min_height:    u32,
    pub resizable:     bool,
    pub frameless:     bool,
    pub fullscreen:    bool,
    pub always_on_top: bool,
    pub debug:         bool,
}

impl Default for AppInfo {
    fn default() -> Self {
        AppInfo {
            name:       "app".to_string(),
            version:    "1.0.0".to_string(),
            identifier: None,
        }
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        WindowConfig {
            title:         "App".to_string(),
            width:         1280,
            height:        720,
            min_width:     800,
            min_height:    600,
            resizable:     true,
            frameless:     false,
            fullscreen:    false,
            always_on_top: false,
            debug:         false,
        }
    }
}

impl AppConfig {
    pub fn load(path: &Path) -> PackResult<Self> {
        if !path.is_file() {
            return Err(PackError::MissingInput {
                path: path.to_path_buf(),
            });
        }
        Self::from_json(&read_to_string(path)?)
    }

    pub fn from_json(json: &str) -> PackResult<Self> { Ok(serde_json::from_str(json)?) }

    pub fn to_json(&self) -> PackResult<String> { Ok(serde_json::to_string_pretty(self)?) }

    /// Identifier used for key derivation, falling back to the application name.
    pub fn project_id(&self) -> &str { self.app.identifier.as_deref().unwrap_or(&self.app.name) }
}
