use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

pub const PROJECT_CONFIG_FILE: &str = "permission-hooks.toml";

#[derive(Debug, Clone, Deserialize)]
pub struct HookConfig {
    pub general: GeneralConfig,
    pub review: ReviewConfig,
    pub platform: PlatformConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeneralConfig {
    pub snapshot_file: String,
    pub working_dir: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReviewConfig {
    pub manifest_targets: Vec<String>,
    pub indent: usize,
    pub auto_remove: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlatformConfig {
    pub node_binary: String,
    pub use_platform_www: bool,
    pub module_paths: Vec<String>,
}

impl HookConfig {
    /// Load configuration with layering: defaults → user config → project
    /// config → explicit file. Later layers override individual keys.
    pub fn load(project_root: &Path, explicit: Option<&Path>) -> Result<Self> {
        let mut merged = Self::defaults_value()?;

        if let Some(proj_dirs) = directories::ProjectDirs::from("", "", "permission-hooks") {
            let user_path = proj_dirs.config_dir().join("config.toml");
            if user_path.exists() {
                merge_tables(&mut merged, read_layer(&user_path)?);
            }
        }

        let project_path = project_root.join(PROJECT_CONFIG_FILE);
        if project_path.exists() {
            merge_tables(&mut merged, read_layer(&project_path)?);
        }

        if let Some(path) = explicit {
            if !path.is_file() {
                return Err(anyhow!("config file not found: {}", path.display()));
            }
            merge_tables(&mut merged, read_layer(path)?);
        }

        let mut config: HookConfig = merged.try_into().context("invalid configuration")?;
        config.expand_paths()?;
        Ok(config)
    }

    #[cfg(test)]
    pub fn defaults() -> Result<Self> {
        Ok(Self::defaults_value()?.try_into()?)
    }

    fn defaults_value() -> Result<toml::Value> {
        let defaults = include_str!("../../config/default.toml");
        Ok(toml::from_str(defaults)?)
    }

    pub fn working_dir(&self) -> Option<PathBuf> {
        let dir = self.general.working_dir.trim();
        if dir.is_empty() {
            None
        } else {
            Some(PathBuf::from(dir))
        }
    }

    fn expand_paths(&mut self) -> Result<()> {
        if self.general.working_dir.starts_with('~') {
            self.general.working_dir = expand_tilde(&self.general.working_dir)?;
        }

        for path in &mut self.platform.module_paths {
            if path.starts_with('~') {
                *path = expand_tilde(path)?;
            }
        }

        Ok(())
    }
}

fn read_layer(path: &Path) -> Result<toml::Value> {
    let raw =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("failed to parse {}", path.display()))
}

fn merge_tables(base: &mut toml::Value, overlay: toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base), toml::Value::Table(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge_tables(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

fn expand_tilde(path: &str) -> Result<String> {
    let home = directories::BaseDirs::new()
        .map(|d| d.home_dir().to_path_buf())
        .ok_or_else(|| anyhow!("cannot determine home directory"))?;
    Ok(path.replacen('~', &home.to_string_lossy(), 1))
}
