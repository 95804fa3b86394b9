mod cli;
mod error;
mod fsio;
mod model;
mod plugin;
mod prompt;
mod snapshot;

use std::env;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use cli::{Action, Invocation};
use error::HookError;
use model::config::HookConfig;
use model::context::{HookContext, resolve_working_dir};
use plugin::PermissionReviewer;
use plugin::installer::{InstallOptions, NodePlatformInstaller};
use prompt::OperatorSelector;
use snapshot::SnapshotStore;

fn main() -> ExitCode {
    // Initialize logging to file (stdout belongs to Cordova and the prompt)
    let log_dir = directories::ProjectDirs::from("", "", "permission-hooks")
        .map(|d| d.data_dir().to_path_buf())
        .unwrap_or_else(env::temp_dir);
    let _guard = std::fs::create_dir_all(&log_dir).ok().map(|()| {
        let file_appender = tracing_appender::rolling::daily(&log_dir, "permission-hooks.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        tracing_subscriber::fmt()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_env_filter(
                EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| EnvFilter::new("permission_hooks=info")),
            )
            .init();
        guard
    });

    let hook_script = env::var_os("CORDOVA_HOOK")
        .map(PathBuf::from)
        .or_else(|| env::args_os().next().map(PathBuf::from));

    let invocation = match Invocation::parse(env::args().skip(1), hook_script) {
        Ok(invocation) => invocation,
        Err(err) => {
            eprintln!("permission-hooks: {err}");
            cli::print_help();
            return ExitCode::from(2);
        }
    };

    if invocation.action == Action::Help {
        cli::print_help();
        return ExitCode::from(2);
    }

    tracing::info!(action = ?invocation.action, "permission-hooks starting");

    match run(invocation) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("hook failed: {err:#}");
            eprintln!("permission-hooks: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(invocation: Invocation) -> Result<()> {
    let project_root = match invocation.project_root {
        Some(root) => root,
        None => env::current_dir().context("cannot determine project root")?,
    };
    let project_root = project_root
        .canonicalize()
        .with_context(|| format!("project root {} not found", project_root.display()))?;

    let config = HookConfig::load(&project_root, invocation.config.as_deref())?;
    let working_dir = resolve_working_dir(
        &project_root,
        invocation.working_dir.as_deref(),
        config.working_dir(),
        invocation.hook_script.as_deref(),
    );

    let ctx = HookContext::discover(project_root, working_dir)?;
    let store = SnapshotStore::new(&ctx.working_dir, &config.general.snapshot_file);

    match invocation.action {
        Action::Snapshot => {
            if ctx.installed_plugins.is_empty() {
                tracing::info!("no plugins installed yet");
            }
            store.record(&ctx.installed_plugins)?;
            eprintln!(
                "permissions: recorded {} installed plugins in {}",
                ctx.installed_plugins.len(),
                store.path().display()
            );
        }
        Action::Review => {
            let options = InstallOptions {
                use_platform_www: config.platform.use_platform_www,
            };
            let mut reviewer = PermissionReviewer::new(
                store,
                config.review.clone(),
                options,
                OperatorSelector::detect(config.review.auto_remove.clone()),
                NodePlatformInstaller::new(&ctx.project_root, &config.platform),
            );

            let report = reviewer.run(&ctx).map_err(|err| match err {
                HookError::Platform { .. } => anyhow::Error::new(err).context(
                    "plugin may be left uninstalled on that platform; rerun `cordova plugin add`",
                ),
                other => anyhow::Error::new(other),
            })?;

            for line in report.summary_lines() {
                eprintln!("{line}");
            }
        }
        Action::Help => cli::print_help(),
    }

    Ok(())
}
