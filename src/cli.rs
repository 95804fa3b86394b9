use std::path::{Path, PathBuf};

use crate::error::{HookError, Result};

pub const BEFORE_PLUGIN_ADD: &str = "before_plugin_add";
pub const AFTER_PLUGIN_ADD: &str = "after_plugin_add";

/// Which hook stage to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Snapshot,
    Review,
    Help,
}

impl Action {
    /// Infer the stage from the hook script location, e.g.
    /// `hooks/after_plugin_add/permission-hooks`.
    pub fn from_hook_path(path: &Path) -> Option<Self> {
        path.components().rev().find_map(|component| {
            match component.as_os_str().to_str()? {
                BEFORE_PLUGIN_ADD => Some(Action::Snapshot),
                AFTER_PLUGIN_ADD => Some(Action::Review),
                _ => None,
            }
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub action: Action,
    pub project_root: Option<PathBuf>,
    pub working_dir: Option<PathBuf>,
    pub config: Option<PathBuf>,
    pub hook_script: Option<PathBuf>,
}

impl Invocation {
    /// `args` excludes the program name. `hook_script` is `CORDOVA_HOOK`,
    /// falling back to the program path.
    pub fn parse<I>(args: I, hook_script: Option<PathBuf>) -> Result<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let mut action = None;
        let mut project_root = None;
        let mut working_dir = None;
        let mut config = None;

        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "snapshot" if action.is_none() => action = Some(Action::Snapshot),
                "review" if action.is_none() => action = Some(Action::Review),
                "help" | "-h" | "--help" => action = Some(Action::Help),
                "--working-dir" => working_dir = Some(flag_value(&mut args, "--working-dir")?),
                "--config" => config = Some(flag_value(&mut args, "--config")?),
                flag if flag.starts_with("--") => {
                    return Err(HookError::Usage(format!("unknown option {flag}")));
                }
                _ if project_root.is_none() => project_root = Some(PathBuf::from(arg)),
                _ => {
                    return Err(HookError::Usage(format!("unexpected argument {arg}")));
                }
            }
        }

        let action = action
            .or_else(|| hook_script.as_deref().and_then(Action::from_hook_path))
            .unwrap_or(Action::Help);

        Ok(Self {
            action,
            project_root,
            working_dir,
            config,
            hook_script,
        })
    }
}

fn flag_value(args: &mut impl Iterator<Item = String>, flag: &str) -> Result<PathBuf> {
    args.next()
        .map(PathBuf::from)
        .ok_or_else(|| HookError::Usage(format!("{flag} needs a value")))
}

pub fn print_help() {
    eprintln!("permission-hooks: Cordova plugin-add hooks for Android permission review");
    eprintln!();
    eprintln!("  permission-hooks snapshot [PROJECT_ROOT]   record installed plugins ({BEFORE_PLUGIN_ADD})");
    eprintln!("  permission-hooks review [PROJECT_ROOT]     review new plugins' permissions ({AFTER_PLUGIN_ADD})");
    eprintln!("  permission-hooks help                      show this help");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --working-dir DIR   where pluginNames.json is kept");
    eprintln!("  --config FILE       extra TOML configuration layer");
    eprintln!();
    eprintln!("Without a subcommand the stage is taken from the hook directory name");
    eprintln!("({BEFORE_PLUGIN_ADD} / {AFTER_PLUGIN_ADD}) of CORDOVA_HOOK or the program path.");
}
