use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{HookError, Result};
use crate::model::roster::{PluginId, PluginRoster};

/// Fallback working directory when the hook is not shipped inside a plugin.
pub const DEFAULT_WORKING_DIR: &str = ".permission-hooks";

/// Everything the hook needs from the Cordova project it runs in.
#[derive(Debug, Clone)]
pub struct HookContext {
    pub project_root: PathBuf,
    pub working_dir: PathBuf,
    pub installed_plugins: PluginRoster,
    pub installed_platforms: Vec<String>,
}

impl HookContext {
    /// Scan `plugins/` and `platforms/` under the project root.
    pub fn discover(project_root: PathBuf, working_dir: PathBuf) -> Result<Self> {
        let installed_plugins = list_subdirs(&project_root.join("plugins"))?
            .into_iter()
            .map(PluginId::new)
            .collect::<Vec<_>>();
        let installed_platforms = list_subdirs(&project_root.join("platforms"))?;

        fs::create_dir_all(&working_dir).map_err(|err| HookError::write(&working_dir, err))?;

        tracing::debug!(
            root = %project_root.display(),
            plugins = installed_plugins.len(),
            platforms = ?installed_platforms,
            "hook context discovered"
        );

        Ok(Self {
            project_root,
            working_dir,
            installed_plugins: PluginRoster::new(installed_plugins),
            installed_platforms,
        })
    }

    pub fn plugin_dir(&self, plugin: &PluginId) -> PathBuf {
        self.project_root.join("plugins").join(plugin.as_str())
    }

    pub fn platform_dir(&self, platform: &str) -> PathBuf {
        self.project_root.join("platforms").join(platform)
    }

    pub fn has_platform(&self, platform: &str) -> bool {
        self.installed_platforms.iter().any(|p| p == platform)
    }
}

/// Pick the snapshot directory: explicit flag, then config, then the plugin
/// that ships the hook script, then a hidden directory in the project.
pub fn resolve_working_dir(
    project_root: &Path,
    flag: Option<&Path>,
    configured: Option<PathBuf>,
    hook_script: Option<&Path>,
) -> PathBuf {
    if let Some(dir) = flag {
        return absolutize(project_root, dir);
    }

    if let Some(dir) = configured {
        return absolutize(project_root, &dir);
    }

    if let Some(plugin_dir) = hook_script.and_then(owning_plugin_dir) {
        return plugin_dir;
    }

    project_root.join(DEFAULT_WORKING_DIR)
}

fn owning_plugin_dir(hook_script: &Path) -> Option<PathBuf> {
    hook_script
        .ancestors()
        .skip(1)
        .find(|dir| dir.join("plugin.xml").is_file())
        .map(Path::to_path_buf)
}

fn absolutize(project_root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        project_root.join(path)
    }
}

fn list_subdirs(dir: &Path) -> Result<Vec<String>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut names: Vec<String> = fs::read_dir(dir)
        .map_err(|err| HookError::read(dir, err))?
        .flatten()
        .filter_map(|entry| {
            let name = entry.file_name().to_str()?.to_string();
            if name.starts_with('.') {
                return None;
            }
            entry.file_type().ok()?.is_dir().then_some(name)
        })
        .collect();

    names.sort();
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn mkdirs(root: &Path, dirs: &[&str]) {
        for dir in dirs {
            fs::create_dir_all(root.join(dir)).unwrap();
        }
    }

    #[test]
    fn discovers_plugins_and_platforms() {
        let project = TempDir::new().unwrap();
        mkdirs(
            project.path(),
            &[
                "plugins/cordova-plugin-file",
                "plugins/cordova-plugin-camera",
                "plugins/.hidden",
                "platforms/android",
                "platforms/ios",
            ],
        );
        fs::write(project.path().join("plugins/fetch.json"), "{}").unwrap();

        let ctx = HookContext::discover(
            project.path().to_path_buf(),
            project.path().join(DEFAULT_WORKING_DIR),
        )
        .unwrap();

        let plugins: Vec<&str> = ctx.installed_plugins.iter().map(PluginId::as_str).collect();
        assert_eq!(plugins, vec!["cordova-plugin-camera", "cordova-plugin-file"]);
        assert_eq!(ctx.installed_platforms, vec!["android", "ios"]);
        assert!(ctx.has_platform("android"));
        assert!(!ctx.has_platform("browser"));
        assert!(ctx.working_dir.is_dir());
    }

    #[test]
    fn empty_project_has_empty_rosters() {
        let project = TempDir::new().unwrap();
        let ctx = HookContext::discover(project.path().to_path_buf(), project.path().join("w"))
            .unwrap();

        assert!(ctx.installed_plugins.is_empty());
        assert!(ctx.installed_platforms.is_empty());
    }

    #[test]
    fn working_dir_prefers_flag_then_config() {
        let root = Path::new("/project");

        assert_eq!(
            resolve_working_dir(root, Some(Path::new("state")), Some("other".into()), None),
            PathBuf::from("/project/state")
        );
        assert_eq!(
            resolve_working_dir(root, None, Some("/abs/state".into()), None),
            PathBuf::from("/abs/state")
        );
        assert_eq!(
            resolve_working_dir(root, None, None, None),
            PathBuf::from("/project/.permission-hooks")
        );
    }

    #[test]
    fn working_dir_falls_back_to_hook_owner_plugin() {
        let project = TempDir::new().unwrap();
        let plugin = project.path().join("plugins/permission-control");
        mkdirs(&plugin, &["hooks/after_plugin_add"]);
        fs::write(plugin.join("plugin.xml"), "<plugin/>").unwrap();
        let script = plugin.join("hooks/after_plugin_add/permission-hooks");

        assert_eq!(
            resolve_working_dir(project.path(), None, None, Some(&script)),
            plugin
        );
    }
}
