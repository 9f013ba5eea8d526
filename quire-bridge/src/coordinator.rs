use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use quire_core::access::{AccessGrant, AccessTokenStore, ScopedToken};
use quire_core::filesystem::{self, build_tree};
use quire_core::store::StateStore;
use quire_core::util::path_to_string;

use crate::channel::BridgeChannel;
use crate::lanes::IoLanes;
use crate::picker::DirectoryPicker;
use crate::protocol::{FileOp, HostCommand, ViewEvent};

/// State slot holding the token for the most recently opened workspace.
pub const WORKSPACE_TOKEN_KEY: &str = "workspace.token";

/// Depth used when listing a directory without an explicit depth.
pub const DEFAULT_LIST_DEPTH: u32 = 2;

/// Where file system work runs.
pub enum Dispatch {
    /// On the calling thread. Deterministic; used by tests and tools.
    Inline,
    /// On keyed worker lanes, off the thread that pumps view messages.
    Lanes(IoLanes),
}

impl Dispatch {
    fn run<F>(&self, key: &str, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        match self {
            Dispatch::Inline => job(),
            Dispatch::Lanes(lanes) => lanes.submit(key, job),
        }
    }

    fn run_many<F>(&self, keys: &[&str], job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        match self {
            Dispatch::Inline => job(),
            Dispatch::Lanes(lanes) => lanes.submit_many(keys, job),
        }
    }

    fn wait_idle(&self) {
        if let Dispatch::Lanes(lanes) = self {
            lanes.wait_idle();
        }
    }
}

struct Workspace {
    root: PathBuf,
    // Held for the lifetime of the workspace; dropping it ends access.
    _grant: Option<AccessGrant>,
}

/// Owns the active workspace and answers every view command.
///
/// This is the only producer of outbound events. File system failures become
/// `error` events; nothing here panics or propagates an error to the caller.
pub struct WorkspaceCoordinator {
    channel: Arc<BridgeChannel>,
    store: Arc<StateStore>,
    tokens: AccessTokenStore,
    picker: Box<dyn DirectoryPicker>,
    dispatch: Dispatch,
    list_depth: u32,
    workspace: Mutex<Option<Workspace>>,
}

impl WorkspaceCoordinator {
    pub fn new(
        channel: Arc<BridgeChannel>,
        store: Arc<StateStore>,
        picker: Box<dyn DirectoryPicker>,
        dispatch: Dispatch,
    ) -> Self {
        WorkspaceCoordinator {
            channel,
            store,
            tokens: AccessTokenStore::new(),
            picker,
            dispatch,
            list_depth: DEFAULT_LIST_DEPTH,
            workspace: Mutex::new(None),
        }
    }

    /// Depth used for workspace-open listings and depth-less `listDir`.
    pub fn with_list_depth(mut self, depth: u32) -> Self {
        self.list_depth = depth;
        self
    }

    pub fn tokens(&self) -> &AccessTokenStore {
        &self.tokens
    }

    pub fn root_path(&self) -> Option<PathBuf> {
        self.workspace.lock().as_ref().map(|w| w.root.clone())
    }

    pub fn handle(&self, command: HostCommand) {
        match command {
            HostCommand::OpenWorkspace => {
                self.open_workspace();
            }
            HostCommand::ListDir { path, depth } => self.list_dir(&path, depth),
            HostCommand::ReadFile { path } => self.read_file(&path),
            HostCommand::WriteFile { path, content } => self.write_file(&path, content),
            HostCommand::CompareFiles {
                left_path,
                right_path,
            } => self.compare_files(&left_path, &right_path),
        }
    }

    /// Reopen the workspace remembered from the previous run.
    ///
    /// Returns whether a workspace was opened. A missing or unresolvable token
    /// leaves the coordinator untouched and emits nothing.
    pub fn restore_last_workspace(&self) -> bool {
        let Some(raw) = self.store.get::<String>(WORKSPACE_TOKEN_KEY) else {
            log::debug!("No remembered workspace");
            return false;
        };
        let Some(grant) = self.tokens.resolve(&ScopedToken::from_string(raw)) else {
            return false;
        };

        let root = grant.path().to_path_buf();
        log::info!("Restored workspace {} (grant {})", root.display(), grant.id());
        self.replace_workspace(root.clone(), Some(grant));

        let channel = Arc::clone(&self.channel);
        let depth = self.list_depth;
        self.dispatch.run(&path_to_string(&root), move || {
            emit_listing(&channel, &root, depth);
            channel.send(&ViewEvent::WorkspaceOpened {
                root_path: path_to_string(&root),
            });
        });
        true
    }

    /// Ask the user for a directory and make it the workspace.
    ///
    /// Returns whether a workspace was opened; cancelling changes nothing.
    pub fn open_workspace(&self) -> bool {
        let Some(picked) = self.picker.pick_directory() else {
            log::debug!("Workspace selection cancelled");
            return false;
        };
        // Same form a restored workspace reports, even through symlinks.
        let root = std::fs::canonicalize(&picked).unwrap_or(picked);

        match self.tokens.mint(&root) {
            Some(token) => {
                if let Err(e) = self.store.set(WORKSPACE_TOKEN_KEY, token.as_str()) {
                    log::warn!("Failed to remember workspace: {}", e);
                }
            }
            None => {
                log::warn!("Workspace {} will not be remembered", root.display());
                // Do not reopen the previous workspace on the next start.
                if let Err(e) = self.store.remove(WORKSPACE_TOKEN_KEY) {
                    log::warn!("Failed to forget previous workspace: {}", e);
                }
            }
        }

        log::info!("Opened workspace {}", root.display());
        self.replace_workspace(root.clone(), None);

        let channel = Arc::clone(&self.channel);
        let depth = self.list_depth;
        self.dispatch.run(&path_to_string(&root), move || {
            channel.send(&ViewEvent::WorkspaceOpened {
                root_path: path_to_string(&root),
            });
            emit_listing(&channel, &root, depth);
        });
        true
    }

    pub fn list_dir(&self, path: &str, depth: Option<u32>) {
        let channel = Arc::clone(&self.channel);
        let depth = depth.unwrap_or(self.list_depth);
        let dir = PathBuf::from(path);
        self.dispatch.run(path, move || emit_listing(&channel, &dir, depth));
    }

    pub fn read_file(&self, path: &str) {
        let channel = Arc::clone(&self.channel);
        let owned = path.to_string();
        self.dispatch.run(path, move || {
            let path = owned;
            let event = match filesystem::read_text_lenient(Path::new(&path)) {
                Ok(content) => ViewEvent::FileRead { path, content },
                Err(e) => failure(FileOp::ReadFile, e),
            };
            channel.send(&event);
        });
    }

    pub fn write_file(&self, path: &str, content: String) {
        let channel = Arc::clone(&self.channel);
        let owned = path.to_string();
        self.dispatch.run(path, move || {
            let path = owned;
            let event = match filesystem::write_text_atomic(Path::new(&path), &content) {
                Ok(()) => ViewEvent::FileWritten { path },
                Err(e) => failure(FileOp::WriteFile, e),
            };
            channel.send(&event);
        });
    }

    /// Read both sides for a comparison. Either both contents are sent or a
    /// single error is; never half a comparison. Ordered against pending work
    /// on both paths.
    pub fn compare_files(&self, left: &str, right: &str) {
        let channel = Arc::clone(&self.channel);
        let left_path = left.to_string();
        let right_path = right.to_string();
        self.dispatch.run_many(&[left, right], move || {
            let both = filesystem::read_text_strict(Path::new(&left_path)).and_then(|l| {
                filesystem::read_text_strict(Path::new(&right_path)).map(|r| (l, r))
            });
            let event = match both {
                Ok((left_content, right_content)) => ViewEvent::FilesCompared {
                    left_path,
                    right_path,
                    left_content,
                    right_content,
                },
                Err(e) => failure(FileOp::CompareFiles, e),
            };
            channel.send(&event);
        });
    }

    /// Block until all dispatched file system work has emitted its events.
    pub fn wait_idle(&self) {
        self.dispatch.wait_idle();
    }

    fn replace_workspace(&self, root: PathBuf, grant: Option<AccessGrant>) {
        let previous = self.workspace.lock().replace(Workspace {
            root,
            _grant: grant,
        });
        if let Some(previous) = previous {
            log::debug!("Superseded workspace {}", previous.root.display());
        }
    }
}

fn failure(op: FileOp, message: String) -> ViewEvent {
    log::warn!("{} failed: {}", op.as_str(), message);
    ViewEvent::error(op, message)
}

fn emit_listing(channel: &BridgeChannel, dir: &Path, depth: u32) {
    let tree = build_tree(dir, depth);
    channel.send(&ViewEvent::DirListed {
        path: path_to_string(dir),
        tree,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::ViewSink;
    use serde_json::Value;
    use std::fs;

    struct Harness {
        coordinator: WorkspaceCoordinator,
        events: Arc<Mutex<Vec<Value>>>,
    }

    impl Harness {
        fn new(store: Arc<StateStore>, pick: Option<PathBuf>) -> Self {
            let channel = Arc::new(BridgeChannel::new());
            let events = Arc::new(Mutex::new(Vec::new()));
            let sink_events = Arc::clone(&events);
            let sink: Arc<dyn ViewSink> = Arc::new(move |msg: &str| {
                sink_events.lock().push(serde_json::from_str(msg).unwrap())
            });
            channel.attach(sink);
            let picker = move || pick.clone();
            let coordinator =
                WorkspaceCoordinator::new(channel, store, Box::new(picker), Dispatch::Inline);
            Harness {
                coordinator,
                events,
            }
        }

        fn names(&self) -> Vec<String> {
            self.events
                .lock()
                .iter()
                .map(|e| e["event"].as_str().unwrap_or_default().to_string())
                .collect()
        }
    }

    #[test]
    fn restore_without_token_is_silent() {
        let h = Harness::new(Arc::new(StateStore::in_memory()), None);
        assert!(!h.coordinator.restore_last_workspace());
        assert!(h.coordinator.root_path().is_none());
        assert!(h.events.lock().is_empty());
    }

    #[test]
    fn restore_with_garbage_token_is_silent() {
        let store = Arc::new(StateStore::in_memory());
        store.set(WORKSPACE_TOKEN_KEY, "garbage").unwrap();
        let h = Harness::new(store, None);
        assert!(!h.coordinator.restore_last_workspace());
        assert!(h.events.lock().is_empty());
    }

    #[test]
    fn open_workspace_persists_token_and_emits_events() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("readme.md"), "# hi").unwrap();
        let store = Arc::new(StateStore::in_memory());
        let h = Harness::new(Arc::clone(&store), Some(dir.path().to_path_buf()));

        assert!(h.coordinator.open_workspace());
        let canonical = fs::canonicalize(dir.path()).unwrap();
        assert_eq!(h.coordinator.root_path(), Some(canonical.clone()));
        assert!(store.get::<String>(WORKSPACE_TOKEN_KEY).is_some());
        assert_eq!(h.names(), vec!["workspaceOpened", "dirListed"]);

        let events = h.events.lock();
        assert_eq!(events[0]["payload"]["rootPath"], path_to_string(&canonical));
        assert_eq!(events[1]["payload"]["tree"][0]["name"], "readme.md");
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_pick_reports_same_root_as_restore() {
        let dir = tempfile::tempdir().unwrap();
        let real = dir.path().join("real");
        fs::create_dir(&real).unwrap();
        let link = dir.path().join("link");
        std::os::unix::fs::symlink(&real, &link).unwrap();
        let store = Arc::new(StateStore::in_memory());

        let opened = Harness::new(Arc::clone(&store), Some(link));
        assert!(opened.coordinator.open_workspace());
        let restored = Harness::new(Arc::clone(&store), None);
        assert!(restored.coordinator.restore_last_workspace());

        let canonical = path_to_string(&fs::canonicalize(&real).unwrap());
        assert_eq!(opened.events.lock()[0]["payload"]["rootPath"], canonical);
        assert_eq!(restored.events.lock()[1]["payload"]["rootPath"], canonical);
    }

    #[test]
    fn unrememberable_pick_forgets_previous_workspace() {
        let previous = tempfile::tempdir().unwrap();
        let store = Arc::new(StateStore::in_memory());
        let token = AccessTokenStore::new().mint(previous.path()).unwrap();
        store.set(WORKSPACE_TOKEN_KEY, token.as_str()).unwrap();

        let gone = previous.path().join("not-there");
        let h = Harness::new(Arc::clone(&store), Some(gone.clone()));
        assert!(h.coordinator.open_workspace());
        assert_eq!(h.coordinator.root_path(), Some(gone));
        assert!(store.get::<String>(WORKSPACE_TOKEN_KEY).is_none());
    }

    #[test]
    fn cancelled_picker_changes_nothing() {
        let store = Arc::new(StateStore::in_memory());
        let h = Harness::new(Arc::clone(&store), None);
        assert!(!h.coordinator.open_workspace());
        assert!(h.coordinator.root_path().is_none());
        assert!(store.get::<String>(WORKSPACE_TOKEN_KEY).is_none());
        assert!(h.events.lock().is_empty());
    }

    #[test]
    fn restore_reopens_previous_workspace() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(StateStore::in_memory());
        {
            let first = Harness::new(Arc::clone(&store), Some(dir.path().to_path_buf()));
            first.coordinator.open_workspace();
        }

        let second = Harness::new(Arc::clone(&store), None);
        assert!(second.coordinator.restore_last_workspace());
        let canonical = fs::canonicalize(dir.path()).unwrap();
        assert_eq!(second.coordinator.root_path(), Some(canonical.clone()));
        assert_eq!(second.names(), vec!["dirListed", "workspaceOpened"]);
        assert_eq!(second.coordinator.tokens().live_grants(), 1);
        assert_eq!(
            second.events.lock()[1]["payload"]["rootPath"],
            path_to_string(&canonical)
        );
    }

    #[test]
    fn replacing_workspace_releases_grant() {
        let first_dir = tempfile::tempdir().unwrap();
        let second_dir = tempfile::tempdir().unwrap();
        let store = Arc::new(StateStore::in_memory());
        let token = AccessTokenStore::new().mint(first_dir.path()).unwrap();
        store.set(WORKSPACE_TOKEN_KEY, token.as_str()).unwrap();

        let h = Harness::new(Arc::clone(&store), Some(second_dir.path().to_path_buf()));
        assert!(h.coordinator.restore_last_workspace());
        assert_eq!(h.coordinator.tokens().live_grants(), 1);
        assert!(h.coordinator.restore_last_workspace());
        assert_eq!(h.coordinator.tokens().live_grants(), 1);

        h.coordinator.open_workspace();
        assert_eq!(h.coordinator.tokens().live_grants(), 0);
    }

    #[test]
    fn dropping_coordinator_releases_grant() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(StateStore::in_memory());
        let token = AccessTokenStore::new().mint(dir.path()).unwrap();
        store.set(WORKSPACE_TOKEN_KEY, token.as_str()).unwrap();

        let h = Harness::new(store, None);
        h.coordinator.restore_last_workspace();
        let tokens = h.coordinator.tokens().clone();
        assert_eq!(tokens.live_grants(), 1);
        drop(h);
        assert_eq!(tokens.live_grants(), 0);
    }

    #[test]
    fn list_dir_uses_default_depth() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("a/b/c/d")).unwrap();
        let h = Harness::new(Arc::new(StateStore::in_memory()), None);
        h.coordinator.list_dir(&path_to_string(dir.path()), None);

        let events = h.events.lock();
        let tree = &events[0]["payload"]["tree"];
        let c = &tree[0]["children"][0]["children"][0];
        assert_eq!(c["name"], "c");
        assert!(c.get("children").is_none());
    }

    #[test]
    fn list_dir_of_missing_path_is_empty_listing() {
        let dir = tempfile::tempdir().unwrap();
        let missing = path_to_string(&dir.path().join("gone"));
        let h = Harness::new(Arc::new(StateStore::in_memory()), None);
        h.coordinator.list_dir(&missing, Some(1));
        assert_eq!(h.names(), vec!["dirListed"]);
        assert_eq!(h.events.lock()[0]["payload"]["tree"], Value::Array(Vec::new()));
    }

    #[test]
    fn read_missing_file_emits_error() {
        let dir = tempfile::tempdir().unwrap();
        let h = Harness::new(Arc::new(StateStore::in_memory()), None);
        h.coordinator
            .read_file(&path_to_string(&dir.path().join("missing.md")));
        let events = h.events.lock();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0]["event"], "error");
        assert_eq!(events[0]["payload"]["op"], "readFile");
        assert!(!events[0]["payload"]["message"].as_str().unwrap().is_empty());
    }

    #[test]
    fn read_undecodable_file_emits_empty_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blob.bin");
        fs::write(&path, b"\xc3\x28\xff").unwrap();
        let h = Harness::new(Arc::new(StateStore::in_memory()), None);
        h.coordinator.read_file(&path_to_string(&path));
        let events = h.events.lock();
        assert_eq!(events[0]["event"], "fileRead");
        assert_eq!(events[0]["payload"]["content"], "");
    }

    #[test]
    fn write_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = path_to_string(&dir.path().join("note.md"));
        let h = Harness::new(Arc::new(StateStore::in_memory()), None);
        h.coordinator.write_file(&path, "it's \"here\"\n".to_string());
        h.coordinator.read_file(&path);

        assert_eq!(h.names(), vec!["fileWritten", "fileRead"]);
        let events = h.events.lock();
        assert_eq!(events[0]["payload"]["path"], path);
        assert_eq!(events[1]["payload"]["content"], "it's \"here\"\n");
    }

    #[test]
    fn write_failure_emits_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = path_to_string(&dir.path().join("missing/dir/x.txt"));
        let h = Harness::new(Arc::new(StateStore::in_memory()), None);
        h.coordinator.write_file(&path, "x".to_string());
        let events = h.events.lock();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0]["payload"]["op"], "writeFile");
    }

    #[test]
    fn compare_with_missing_right_is_single_error() {
        let dir = tempfile::tempdir().unwrap();
        let left = dir.path().join("left.txt");
        fs::write(&left, "left").unwrap();
        let h = Harness::new(Arc::new(StateStore::in_memory()), None);
        h.coordinator.compare_files(
            &path_to_string(&left),
            &path_to_string(&dir.path().join("right.txt")),
        );
        assert_eq!(h.names(), vec!["error"]);
        assert_eq!(h.events.lock()[0]["payload"]["op"], "compareFiles");
    }

    #[test]
    fn compare_emits_both_contents() {
        let dir = tempfile::tempdir().unwrap();
        let left = dir.path().join("l.txt");
        let right = dir.path().join("r.txt");
        fs::write(&left, "alpha").unwrap();
        fs::write(&right, "beta").unwrap();
        let h = Harness::new(Arc::new(StateStore::in_memory()), None);
        h.coordinator
            .compare_files(&path_to_string(&left), &path_to_string(&right));

        let events = h.events.lock();
        assert_eq!(events.len(), 1);
        let payload = &events[0]["payload"];
        assert_eq!(payload["leftContent"], "alpha");
        assert_eq!(payload["rightContent"], "beta");
        assert_eq!(payload["rightPath"], path_to_string(&right));
    }

    #[test]
    fn compare_rejects_undecodable_side() {
        let dir = tempfile::tempdir().unwrap();
        let left = dir.path().join("l.txt");
        let right = dir.path().join("r.bin");
        fs::write(&left, "alpha").unwrap();
        fs::write(&right, b"\xff\xfe").unwrap();
        let h = Harness::new(Arc::new(StateStore::in_memory()), None);
        h.coordinator
            .compare_files(&path_to_string(&left), &path_to_string(&right));
        assert_eq!(h.names(), vec!["error"]);
    }
}
