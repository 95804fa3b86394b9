use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use serde::Serialize;
use tempfile::NamedTempFile;

use crate::error::{HookError, Result};
use crate::model::config::PlatformConfig;
use crate::model::roster::PluginId;

/// A plugin as the platform installer sees it: where it lives and the exact
/// `plugin.xml` text that describes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginDescriptor {
    pub id: PluginId,
    pub dir: PathBuf,
    pub manifest: String,
}

impl PluginDescriptor {
    pub fn new(id: PluginId, dir: PathBuf, manifest: String) -> Self {
        Self { id, dir, manifest }
    }

    /// Read the descriptor from `<dir>/plugin.xml` as it is on disk now.
    pub fn load(id: PluginId, dir: &Path) -> Result<Self> {
        let path = dir.join("plugin.xml");
        let manifest = fs::read_to_string(&path).map_err(|err| HookError::read(&path, err))?;
        Ok(Self::new(id, dir.to_path_buf(), manifest))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallOptions {
    pub use_platform_www: bool,
}

/// A generated native project the plugin can be (re)installed into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformTarget {
    pub name: String,
    pub dir: PathBuf,
}

pub trait PlatformInstaller {
    fn remove_plugin(
        &mut self,
        platform: &PlatformTarget,
        plugin: &PluginDescriptor,
        options: InstallOptions,
    ) -> Result<()>;

    fn add_plugin(
        &mut self,
        platform: &PlatformTarget,
        plugin: &PluginDescriptor,
        options: InstallOptions,
    ) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
enum BridgeAction {
    Add,
    Remove,
}

impl BridgeAction {
    fn label(self) -> &'static str {
        match self {
            BridgeAction::Add => "install",
            BridgeAction::Remove => "uninstall",
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BridgeRequest<'a> {
    action: BridgeAction,
    platform: &'a str,
    platform_dir: &'a Path,
    plugin_dir: &'a Path,
    manifest_path: &'a Path,
    search_paths: Vec<PathBuf>,
    options: InstallOptions,
}

pub const BRIDGE_REQUEST_ENV: &str = "PERMISSION_HOOKS_REQUEST";

const BRIDGE_SCRIPT: &str = r#"
const req = JSON.parse(process.env.PERMISSION_HOOKS_REQUEST);
const load = (name) => require(require.resolve(name, { paths: req.searchPaths }));
const lib = load('cordova-lib');
const common = lib.cordova_common || load('cordova-common');
const platforms = lib.cordova_platforms || load('cordova-lib/src/platforms/platforms');
const info = new common.PluginInfo(req.pluginDir);
info._et = common.xmlHelpers.parseElementtreeSync(req.manifestPath);
const api = platforms.getPlatformApi(req.platform, req.platformDir);
const run = req.action === 'remove' ? api.removePlugin(info, req.options) : api.addPlugin(info, req.options);
Promise.resolve(run).then(
    () => process.exit(0),
    (err) => { console.error((err && err.stack) || String(err)); process.exit(1); }
);
"#;

/// Drives Cordova's own platform API through a short-lived `node` process.
#[derive(Debug, Clone)]
pub struct NodePlatformInstaller {
    node_binary: String,
    search_paths: Vec<PathBuf>,
}

impl NodePlatformInstaller {
    pub fn new(project_root: &Path, config: &PlatformConfig) -> Self {
        let mut search_paths = vec![project_root.to_path_buf()];
        search_paths.extend(config.module_paths.iter().map(PathBuf::from));

        Self {
            node_binary: config.node_binary.clone(),
            search_paths,
        }
    }

    fn request<'a>(
        &self,
        action: BridgeAction,
        platform: &'a PlatformTarget,
        plugin: &'a PluginDescriptor,
        manifest_path: &'a Path,
        options: InstallOptions,
    ) -> BridgeRequest<'a> {
        BridgeRequest {
            action,
            platform: &platform.name,
            platform_dir: &platform.dir,
            plugin_dir: &plugin.dir,
            manifest_path,
            search_paths: self.search_paths.clone(),
            options,
        }
    }

    fn run(
        &self,
        action: BridgeAction,
        platform: &PlatformTarget,
        plugin: &PluginDescriptor,
        options: InstallOptions,
    ) -> Result<()> {
        let fail = |message: String| HookError::Platform {
            platform: platform.name.clone(),
            plugin: plugin.id.to_string(),
            action: action.label(),
            message,
        };

        // The descriptor text may differ from what is on disk (the prior
        // manifest during uninstall), so hand it over through a temp file.
        let mut manifest = NamedTempFile::new().map_err(|err| fail(err.to_string()))?;
        manifest
            .write_all(plugin.manifest.as_bytes())
            .and_then(|()| manifest.flush())
            .map_err(|err| fail(err.to_string()))?;

        let request = self.request(action, platform, plugin, manifest.path(), options);
        let payload = serde_json::to_string(&request).map_err(|err| fail(err.to_string()))?;

        tracing::info!(
            platform = %platform.name,
            plugin = %plugin.id,
            action = action.label(),
            "running platform api"
        );

        let output = Command::new(&self.node_binary)
            .arg("-e")
            .arg(BRIDGE_SCRIPT)
            .env(BRIDGE_REQUEST_ENV, payload)
            .current_dir(&platform.dir)
            .stdin(Stdio::null())
            .output()
            .map_err(|err| fail(format!("failed to spawn {}: {err}", self.node_binary)))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !stdout.trim().is_empty() {
            tracing::debug!(platform = %platform.name, "{}", stdout.trim());
        }

        if !output.status.success() {
            let code = output
                .status
                .code()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "signal".to_string());
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(fail(if stderr.is_empty() {
                format!("node exited with code {code}")
            } else {
                format!("node exited with code {code}: {stderr}")
            }));
        }

        Ok(())
    }
}

impl PlatformInstaller for NodePlatformInstaller {
    fn remove_plugin(
        &mut self,
        platform: &PlatformTarget,
        plugin: &PluginDescriptor,
        options: InstallOptions,
    ) -> Result<()> {
        self.run(BridgeAction::Remove, platform, plugin, options)
    }

    fn add_plugin(
        &mut self,
        platform: &PlatformTarget,
        plugin: &PluginDescriptor,
        options: InstallOptions,
    ) -> Result<()> {
        self.run(BridgeAction::Add, platform, plugin, options)
    }
}
