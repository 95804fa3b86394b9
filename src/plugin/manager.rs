use crate::error::Result;
use crate::model::config::ReviewConfig;
use crate::model::context::HookContext;
use crate::model::roster::PluginId;
use crate::plugin::installer::{
    InstallOptions, PlatformInstaller, PlatformTarget, PluginDescriptor,
};
use crate::plugin::runtime::{PluginReviewContext, ReviewStage};
use crate::prompt::PermissionSelector;
use crate::snapshot::SnapshotStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewOutcome {
    NoPermissions,
    NothingSelected,
    Applied {
        removed: Vec<String>,
        reapplied: Vec<String>,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReviewReport {
    pub plugins: Vec<(PluginId, ReviewOutcome)>,
}

impl ReviewReport {
    pub fn summary_lines(&self) -> Vec<String> {
        if self.plugins.is_empty() {
            return vec!["permissions: no newly added plugins".to_string()];
        }

        self.plugins
            .iter()
            .map(|(plugin, outcome)| match outcome {
                ReviewOutcome::NoPermissions => {
                    format!("permissions: {plugin} declares no Android permissions")
                }
                ReviewOutcome::NothingSelected => {
                    format!("permissions: {plugin} kept all permissions")
                }
                ReviewOutcome::Applied { removed, reapplied } => {
                    let platforms = if reapplied.is_empty() {
                        "no installed platform to update".to_string()
                    } else {
                        format!("reinstalled on {}", reapplied.join(", "))
                    };
                    format!(
                        "permissions: {plugin} removed {} ({platforms})",
                        removed.join(", ")
                    )
                }
            })
            .collect()
    }
}

/// Reviews every newly added plugin, one after another. Holds the external
/// collaborators the review needs instead of reaching for global state.
pub struct PermissionReviewer<S, I> {
    snapshot: SnapshotStore,
    rules: ReviewConfig,
    options: InstallOptions,
    selector: S,
    installer: I,
}

impl<S: PermissionSelector, I: PlatformInstaller> PermissionReviewer<S, I> {
    pub fn new(
        snapshot: SnapshotStore,
        rules: ReviewConfig,
        options: InstallOptions,
        selector: S,
        installer: I,
    ) -> Self {
        Self {
            snapshot,
            rules,
            options,
            selector,
            installer,
        }
    }

    #[cfg(test)]
    pub fn selector(&self) -> &S {
        &self.selector
    }

    #[cfg(test)]
    pub fn installer(&self) -> &I {
        &self.installer
    }

    /// Diff the snapshot against the installed plugins and review each new
    /// one. Stops at the first failure; earlier plugins keep their changes.
    pub fn run(&mut self, ctx: &HookContext) -> Result<ReviewReport> {
        let before = self.snapshot.load()?;
        let added = ctx.installed_plugins.newly_added(&before);

        tracing::info!(
            before = before.len(),
            now = ctx.installed_plugins.len(),
            added = ?added,
            "resolved newly added plugins"
        );

        let mut report = ReviewReport::default();
        for plugin in added {
            let outcome = self.review_plugin(ctx, &plugin).inspect_err(|err| {
                tracing::error!(plugin = %plugin, "permission review failed: {err}");
            })?;
            report.plugins.push((plugin, outcome));
        }

        Ok(report)
    }

    pub fn review_plugin(&mut self, ctx: &HookContext, plugin: &PluginId) -> Result<ReviewOutcome> {
        let mut review =
            PluginReviewContext::discover(ctx, plugin, &self.rules.manifest_targets)?;
        if review.stage() == ReviewStage::Done {
            return Ok(ReviewOutcome::NoPermissions);
        }
        tracing::debug!(
            plugin = %plugin,
            path = %review.manifest_path().display(),
            "reviewing manifest"
        );

        let mut reapplied = Vec::new();
        loop {
            match review.stage() {
                ReviewStage::Prompt => review.prompt(&mut self.selector)?,
                ReviewStage::Rewrite => {
                    review.rewrite(self.rules.indent)?;
                }
                ReviewStage::Reapply => {
                    reapplied = self.reapply(ctx, &review)?;
                    review.finish();
                }
                ReviewStage::Done => break,
            }
        }

        if review.permissions().is_empty() {
            return Ok(ReviewOutcome::NothingSelected);
        }

        Ok(ReviewOutcome::Applied {
            removed: review.permissions().iter().map(|p| p.name.clone()).collect(),
            reapplied,
        })
    }

    /// Uninstall the prior plugin and install the rewritten one on each
    /// installed platform touched by the removal, one platform at a time.
    fn reapply(&mut self, ctx: &HookContext, review: &PluginReviewContext) -> Result<Vec<String>> {
        let mut reapplied = Vec::new();

        for platform in review.affected_platforms() {
            if !ctx.has_platform(&platform) {
                tracing::debug!(
                    plugin = %review.plugin,
                    platform = %platform,
                    "platform not installed, nothing to re-apply"
                );
                continue;
            }

            let target = PlatformTarget {
                dir: ctx.platform_dir(&platform),
                name: platform,
            };

            self.installer
                .remove_plugin(&target, review.original(), self.options)?;

            let fresh =
                PluginDescriptor::load(review.plugin.clone(), &ctx.plugin_dir(&review.plugin))?;
            self.installer.add_plugin(&target, &fresh, self.options)?;

            tracing::info!(
                plugin = %review.plugin,
                platform = %target.name,
                "re-applied plugin to platform"
            );
            reapplied.push(target.name);
        }

        Ok(reapplied)
    }
}
