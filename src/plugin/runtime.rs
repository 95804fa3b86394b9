use std::path::{Path, PathBuf};

use crate::error::{HookError, Result};
use crate::model::context::HookContext;
use crate::model::roster::PluginId;
use crate::plugin::installer::PluginDescriptor;
use crate::plugin::manifest::ManifestDocument;
use crate::plugin::permission::{self, PermissionEntry};
use crate::prompt::{Choice, PermissionSelector};

/// Where a single plugin's review currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewStage {
    Prompt,
    Rewrite,
    Reapply,
    Done,
}

/// Working state for reviewing one newly added plugin. Owns the parsed
/// manifest exclusively; entries always point into that document.
#[derive(Debug)]
pub struct PluginReviewContext {
    pub plugin: PluginId,
    permissions: Vec<PermissionEntry>,
    document: ManifestDocument,
    manifest_path: PathBuf,
    original: PluginDescriptor,
    stage: ReviewStage,
}

impl PluginReviewContext {
    /// Parse `plugins/<id>/plugin.xml` and collect its Android permissions.
    pub fn discover(ctx: &HookContext, plugin: &PluginId, targets: &[String]) -> Result<Self> {
        let plugin_dir = ctx.plugin_dir(plugin);
        let original = PluginDescriptor::load(plugin.clone(), &plugin_dir)?;
        let manifest_path = plugin_dir.join("plugin.xml");

        let document = ManifestDocument::parse(&original.manifest).map_err(|message| {
            HookError::MalformedManifest {
                path: manifest_path.clone(),
                message,
            }
        })?;
        let permissions = permission::scan_permissions(&document, targets);

        tracing::info!(
            plugin = %plugin,
            permissions = permissions.len(),
            "discovered plugin permissions"
        );

        let stage = if permissions.is_empty() {
            ReviewStage::Done
        } else {
            ReviewStage::Prompt
        };

        Ok(Self {
            plugin: plugin.clone(),
            permissions,
            document,
            manifest_path,
            original,
            stage,
        })
    }

    pub fn stage(&self) -> ReviewStage {
        self.stage
    }

    pub fn permissions(&self) -> &[PermissionEntry] {
        &self.permissions
    }

    pub fn manifest_path(&self) -> &Path {
        &self.manifest_path
    }

    /// The descriptor captured before any edit, used to uninstall.
    pub fn original(&self) -> &PluginDescriptor {
        &self.original
    }

    /// Ask the operator which permissions to remove. Afterwards only the
    /// chosen entries remain.
    pub fn prompt(&mut self, selector: &mut dyn PermissionSelector) -> Result<()> {
        if self.permissions.is_empty() {
            self.stage = ReviewStage::Done;
            return Ok(());
        }

        let choices: Vec<Choice> = self
            .permissions
            .iter()
            .map(|entry| Choice {
                label: entry.label(),
                permission: entry.name.clone(),
            })
            .collect();

        let chosen = selector.select(self.plugin.as_str(), &choices)?;
        self.retain_selected(&chosen);
        Ok(())
    }

    /// Keep only the entries at `indices`; out-of-range indices are ignored.
    pub fn retain_selected(&mut self, indices: &[usize]) {
        let mut idx = 0;
        self.permissions.retain(|_| {
            let keep = indices.contains(&idx);
            idx += 1;
            keep
        });

        self.stage = if self.permissions.is_empty() {
            ReviewStage::Done
        } else {
            ReviewStage::Rewrite
        };
    }

    /// Detach every selected permission and rewrite `plugin.xml`.
    pub fn rewrite(&mut self, indent: usize) -> Result<usize> {
        if self.permissions.is_empty() {
            self.stage = ReviewStage::Done;
            return Ok(0);
        }

        let mut removed = 0;
        for entry in &self.permissions {
            if permission::remove_permission(&mut self.document, entry)? {
                removed += 1;
            } else {
                tracing::warn!(
                    plugin = %self.plugin,
                    permission = %entry.name,
                    "permission already removed from its config-file"
                );
            }
        }

        self.document.save(&self.manifest_path, indent)?;
        tracing::info!(
            plugin = %self.plugin,
            removed,
            path = %self.manifest_path.display(),
            "rewrote plugin manifest"
        );

        self.stage = ReviewStage::Reapply;
        Ok(removed)
    }

    /// Distinct platforms of the entries still selected, first appearance first.
    pub fn affected_platforms(&self) -> Vec<String> {
        let mut platforms: Vec<String> = Vec::new();
        for entry in &self.permissions {
            if !platforms.contains(&entry.platform) {
                platforms.push(entry.platform.clone());
            }
        }
        platforms
    }

    pub fn finish(&mut self) {
        self.stage = ReviewStage::Done;
    }
}
