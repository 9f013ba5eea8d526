use quire_core::filesystem::FileTreeNode;
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Commands: view → host (received as `{ "type": ..., "payload": { ... } }`)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum HostCommand {
    OpenWorkspace,
    ListDir {
        path: String,
        depth: Option<u32>,
    },
    ReadFile {
        path: String,
    },
    WriteFile {
        path: String,
        content: String,
    },
    CompareFiles {
        left_path: String,
        right_path: String,
    },
}

#[derive(Deserialize)]
struct InboundEnvelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    payload: Value,
}

#[derive(Deserialize)]
struct PathPayload {
    path: String,
}

#[derive(Deserialize)]
struct ListDirPayload {
    path: String,
    #[serde(default)]
    depth: Option<u32>,
}

#[derive(Deserialize)]
struct WriteFilePayload {
    path: String,
    content: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CompareFilesPayload {
    left_path: String,
    right_path: String,
}

impl HostCommand {
    /// The `type` tag this command arrives under.
    pub fn name(&self) -> &'static str {
        match self {
            HostCommand::OpenWorkspace => "openWorkspace",
            HostCommand::ListDir { .. } => "listDir",
            HostCommand::ReadFile { .. } => "readFile",
            HostCommand::WriteFile { .. } => "writeFile",
            HostCommand::CompareFiles { .. } => "compareFiles",
        }
    }

    /// Parse a raw JSON message from the view.
    pub fn parse(raw: &str) -> Result<Self, String> {
        let value: Value =
            serde_json::from_str(raw).map_err(|e| format!("Invalid JSON message: {}", e))?;
        Self::from_value(value)
    }

    /// Decode an already-structured message body. Unknown `type` tags and
    /// payloads missing required fields are rejected here, at the boundary.
    pub fn from_value(value: Value) -> Result<Self, String> {
        let envelope: InboundEnvelope =
            serde_json::from_value(value).map_err(|e| format!("Invalid envelope: {}", e))?;
        let payload = envelope.payload;
        let bad = |e: serde_json::Error| format!("Invalid {} payload: {}", envelope.kind, e);

        match envelope.kind.as_str() {
            "openWorkspace" => Ok(HostCommand::OpenWorkspace),
            "listDir" => {
                let p: ListDirPayload = serde_json::from_value(payload).map_err(bad)?;
                Ok(HostCommand::ListDir {
                    path: p.path,
                    depth: p.depth,
                })
            }
            "readFile" => {
                let p: PathPayload = serde_json::from_value(payload).map_err(bad)?;
                Ok(HostCommand::ReadFile { path: p.path })
            }
            "writeFile" => {
                let p: WriteFilePayload = serde_json::from_value(payload).map_err(bad)?;
                Ok(HostCommand::WriteFile {
                    path: p.path,
                    content: p.content,
                })
            }
            "compareFiles" => {
                let p: CompareFilesPayload = serde_json::from_value(payload).map_err(bad)?;
                Ok(HostCommand::CompareFiles {
                    left_path: p.left_path,
                    right_path: p.right_path,
                })
            }
            other => Err(format!("Unknown command type: {}", other)),
        }
    }
}

// ---------------------------------------------------------------------------
// Events: host → view (sent as `{ "event": ..., "payload": { ... } }`)
// ---------------------------------------------------------------------------

/// File operation named by an `error` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum FileOp {
    ReadFile,
    WriteFile,
    CompareFiles,
}

impl FileOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileOp::ReadFile => "readFile",
            FileOp::WriteFile => "writeFile",
            FileOp::CompareFiles => "compareFiles",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "payload", rename_all = "camelCase")]
pub enum ViewEvent {
    #[serde(rename_all = "camelCase")]
    WorkspaceOpened { root_path: String },
    DirListed {
        path: String,
        tree: Vec<FileTreeNode>,
    },
    FileRead {
        path: String,
        content: String,
    },
    FileWritten {
        path: String,
    },
    #[serde(rename_all = "camelCase")]
    FilesCompared {
        left_path: String,
        right_path: String,
        left_content: String,
        right_content: String,
    },
    Error {
        op: FileOp,
        message: String,
    },
}

impl ViewEvent {
    pub fn error(op: FileOp, message: impl Into<String>) -> Self {
        ViewEvent::Error {
            op,
            message: message.into(),
        }
    }

    /// The `event` tag this variant is sent under.
    pub fn name(&self) -> &'static str {
        match self {
            ViewEvent::WorkspaceOpened { .. } => "workspaceOpened",
            ViewEvent::DirListed { .. } => "dirListed",
            ViewEvent::FileRead { .. } => "fileRead",
            ViewEvent::FileWritten { .. } => "fileWritten",
            ViewEvent::FilesCompared { .. } => "filesCompared",
            ViewEvent::Error { .. } => "error",
        }
    }

    pub fn to_json(&self) -> Result<String, String> {
        serde_json::to_string(self).map_err(|e| format!("Failed to serialize {}: {}", self.name(), e))
    }
}

// ---------------------------------------------------------------------------
// Script dispatch for views reachable only through script evaluation
// ---------------------------------------------------------------------------

/// Global the view installs to receive events.
pub const VIEW_DISPATCH_FN: &str = "window.__quireDispatch";

/// Build a script that hands `json` (a serialized event) to the view.
///
/// The JSON text is embedded as an object literal, not inside a quoted
/// string, so quotes and backslashes in payloads need no extra escaping. The
/// two line separators JSON permits but older script engines reject are
/// escaped.
pub fn dispatch_script_for_json(json: &str) -> String {
    let literal = json.replace('\u{2028}', "\\u2028").replace('\u{2029}', "\\u2029");
    format!("{}({});", VIEW_DISPATCH_FN, literal)
}

pub fn dispatch_script(event: &ViewEvent) -> Result<String, String> {
    event.to_json().map(|json| dispatch_script_for_json(&json))
}
