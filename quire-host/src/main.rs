mod settings;
mod stdio;

use quire_bridge::picker::{CommandPicker, DirectoryPicker};
use quire_bridge::{Session, SessionConfig};
use quire_core::store::StateStore;
use std::path::PathBuf;
use std::sync::Arc;

fn main() {
    // stdout carries the protocol; logs go to stderr.
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    let settings = load_settings();
    let store = Arc::new(open_store(&settings));
    let picker = build_picker(&settings.picker_command);

    let session = Session::new(
        store,
        picker,
        SessionConfig {
            list_depth: settings.list_depth,
            io_workers: settings.io_workers,
        },
    );
    session.attach_view(Arc::new(stdio::LineSink::new(std::io::stdout())));

    session.coordinator().restore_last_workspace();

    let stdin = std::io::stdin();
    match stdio::pump(stdin.lock(), &session) {
        Ok(n) => log::info!("View closed after {} messages", n),
        Err(e) => log::error!("{}", e),
    }

    session.coordinator().wait_idle();
    session.detach_view();
}

fn load_settings() -> settings::Settings {
    let settings = settings::load();
    let first_run = settings::settings_path().is_some_and(|p| !p.exists());
    if first_run {
        if let Err(e) = settings::save(&settings) {
            log::warn!("{}", e);
        }
    }
    settings
}

fn open_store(settings: &settings::Settings) -> StateStore {
    match settings.state_path() {
        Some(path) => {
            let store = StateStore::open(path);
            if let Some(path) = store.path() {
                log::debug!("State file: {}", path.display());
            }
            store
        }
        None => {
            log::warn!("No data directory; workspace and layout state will not persist");
            StateStore::in_memory()
        }
    }
}

fn build_picker(argv: &[String]) -> Box<dyn DirectoryPicker> {
    match CommandPicker::from_argv(argv) {
        Some(picker) => Box::new(picker),
        None => {
            log::warn!("No picker_command configured; openWorkspace is disabled");
            Box::new(|| -> Option<PathBuf> { None })
        }
    }
}
