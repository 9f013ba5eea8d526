use std::path::PathBuf;
use std::process::Command;

/// Native directory chooser. Returns the chosen directory, or `None` when the
/// user cancels. Blocks until the user responds.
pub trait DirectoryPicker: Send + Sync {
    fn pick_directory(&self) -> Option<PathBuf>;
}

impl<F> DirectoryPicker for F
where
    F: Fn() -> Option<PathBuf> + Send + Sync,
{
    fn pick_directory(&self) -> Option<PathBuf> {
        self()
    }
}

/// Picker backed by an external dialog program (e.g. `zenity`, `kdialog`)
/// that prints the chosen path on stdout and exits non-zero on cancel.
#[derive(Debug, Clone)]
pub struct CommandPicker {
    program: String,
    args: Vec<String>,
}

impl CommandPicker {
    /// Build from a full argv. Returns `None` for an empty argv.
    pub fn from_argv(argv: &[String]) -> Option<Self> {
        let (program, args) = argv.split_first()?;
        Some(CommandPicker {
            program: program.clone(),
            args: args.to_vec(),
        })
    }
}

impl DirectoryPicker for CommandPicker {
    fn pick_directory(&self) -> Option<PathBuf> {
        let output = match Command::new(&self.program).args(&self.args).output() {
            Ok(o) => o,
            Err(e) => {
                log::error!("Failed to run directory picker '{}': {}", self.program, e);
                return None;
            }
        };
        if !output.status.success() {
            log::debug!("Directory picker cancelled ({})", output.status);
            return None;
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let chosen = stdout.lines().next().unwrap_or("").trim();
        if chosen.is_empty() {
            None
        } else {
            Some(PathBuf::from(chosen))
        }
    }
}
