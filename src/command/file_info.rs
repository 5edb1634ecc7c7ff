use std::path::{Component, Path, PathBuf};

use serde::Serialize;

use super::{Exchange, FileInfoRequest};
use crate::error::Result;
use crate::protocol::ArgumentMap;

pub const FILE_STATUS_COMMAND: &str = "icon_overlay_file_status";
pub const CONTEXT_OPTIONS_COMMAND: &str = "icon_overlay_context_options";
pub const FOLDER_TAG_COMMAND: &str = "get_folder_tag";

/// Sync status of a file as reported by the daemon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    UpToDate,
    Syncing,
    Other(String),
}

impl FileStatus {
    pub fn from_wire(raw: &str) -> Self {
        match raw {
            "up to date" => Self::UpToDate,
            "syncing" => Self::Syncing,
            other => Self::Other(other.to_string()),
        }
    }
}

impl std::fmt::Display for FileStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UpToDate => f.write_str("up to date"),
            Self::Syncing => f.write_str("syncing"),
            Self::Other(raw) => f.write_str(raw),
        }
    }
}

/// Sharing tag of a folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FolderTag {
    Public,
    Shared,
    Photos,
    Other(String),
}

impl FolderTag {
    pub fn from_wire(raw: &str) -> Self {
        match raw {
            "public" => Self::Public,
            "shared" => Self::Shared,
            "photos" => Self::Photos,
            other => Self::Other(other.to_string()),
        }
    }
}

impl std::fmt::Display for FolderTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Public => f.write_str("public"),
            Self::Shared => f.write_str("shared"),
            Self::Photos => f.write_str("photos"),
            Self::Other(raw) => f.write_str(raw),
        }
    }
}

/// One context-menu entry offered by the daemon for a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContextMenuItem {
    pub title: String,
    pub tooltip: String,
    pub verb: String,
}

impl ContextMenuItem {
    /// Parse a `title~tooltip~verb` option. Anything after the second `~`
    /// belongs to the verb.
    pub fn parse(raw: &str) -> Option<Self> {
        let mut parts = raw.splitn(3, '~');
        let title = parts.next()?;
        let tooltip = parts.next()?;
        let verb = parts.next()?;
        Some(Self {
            title: title.to_string(),
            tooltip: tooltip.to_string(),
            verb: verb.to_string(),
        })
    }
}

/// Everything the daemon knows about one path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileInfo {
    pub status: FileStatus,
    pub options: Vec<ContextMenuItem>,
    pub folder_tag: Option<FolderTag>,
}

impl FileInfo {
    /// Assemble from the sub-responses. `None` when the status or options
    /// response lacks its payload key.
    pub fn from_responses(
        status: &ArgumentMap,
        options: &ArgumentMap,
        folder_tag: Option<&ArgumentMap>,
    ) -> Option<Self> {
        let status = FileStatus::from_wire(status.first("status")?);
        let options = options
            .get("options")?
            .iter()
            .filter_map(|raw| {
                let item = ContextMenuItem::parse(raw);
                if item.is_none() {
                    tracing::debug!(option = %raw, "skipping malformed context option");
                }
                item
            })
            .collect();
        let folder_tag = folder_tag
            .and_then(|tag| tag.first("tag"))
            .map(FolderTag::from_wire);

        Some(Self {
            status,
            options,
            folder_tag,
        })
    }
}

/// Run the file-info composite on one connection: status, then context
/// options, then (directories only) the folder tag. Stops at the first
/// exchange the daemon refuses; nothing collected so far is returned.
pub(crate) fn execute<E: Exchange>(conn: &mut E, req: &FileInfoRequest) -> Result<Option<FileInfo>> {
    let path = req.path.to_string_lossy().into_owned();

    let path_arg = ArgumentMap::new().with("path", path.as_str());
    let Some(status) = conn.exchange(FILE_STATUS_COMMAND, &path_arg)? else {
        tracing::debug!(path = %path, "daemon refused file status");
        return Ok(None);
    };

    let paths_arg = ArgumentMap::new().with("paths", path.as_str());
    let Some(options) = conn.exchange(CONTEXT_OPTIONS_COMMAND, &paths_arg)? else {
        tracing::debug!(path = %path, "daemon refused context options");
        return Ok(None);
    };

    let folder_tag = if req.is_directory {
        match conn.exchange(FOLDER_TAG_COMMAND, &path_arg)? {
            Some(tag) => Some(tag),
            None => {
                tracing::debug!(path = %path, "daemon refused folder tag");
                return Ok(None);
            }
        }
    } else {
        None
    };

    Ok(FileInfo::from_responses(&status, &options, folder_tag.as_ref()))
}

/// Lexically resolve `.`, `..` and repeated separators without touching
/// the filesystem. `..` never climbs above the root of an absolute path.
pub fn canonicalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            other => out.push(other.as_os_str()),
        }
    }
    if out.as_os_str().is_empty() {
        out.push(".");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BridgeError;
    use std::collections::VecDeque;

    /// Replays canned replies and records the commands it was asked for.
    struct Scripted {
        replies: VecDeque<Result<Option<ArgumentMap>>>,
        sent: Vec<(String, ArgumentMap)>,
    }

    impl Scripted {
        fn new(replies: Vec<Result<Option<ArgumentMap>>>) -> Self {
            Self {
                replies: replies.into(),
                sent: Vec::new(),
            }
        }
    }

    impl Exchange for Scripted {
        fn exchange(&mut self, command: &str, args: &ArgumentMap) -> Result<Option<ArgumentMap>> {
            self.sent.push((command.to_string(), args.clone()));
            self.replies.pop_front().unwrap_or(Err(BridgeError::PeerClosed))
        }
    }

    fn status(raw: &str) -> ArgumentMap {
        ArgumentMap::new().with("status", raw)
    }

    fn options(raw: &[&str]) -> ArgumentMap {
        raw.iter().fold(ArgumentMap::new(), |map, o| map.with("options", *o))
    }

    #[test]
    fn file_takes_two_exchanges() {
        let mut conn = Scripted::new(vec![
            Ok(Some(status("up to date"))),
            Ok(Some(options(&["Share~Share this file~share"]))),
        ]);
        let req = FileInfoRequest::new("/home/u/Dropbox/a.txt", false);

        let info = execute(&mut conn, &req).unwrap().unwrap();
        assert_eq!(info.status, FileStatus::UpToDate);
        assert_eq!(info.options[0].verb, "share");
        assert!(info.folder_tag.is_none());

        let commands: Vec<_> = conn.sent.iter().map(|(c, _)| c.as_str()).collect();
        assert_eq!(commands, [FILE_STATUS_COMMAND, CONTEXT_OPTIONS_COMMAND]);
        assert_eq!(conn.sent[0].1.first("path"), Some("/home/u/Dropbox/a.txt"));
        assert_eq!(conn.sent[1].1.first("paths"), Some("/home/u/Dropbox/a.txt"));
    }

    #[test]
    fn directory_adds_folder_tag() {
        let mut conn = Scripted::new(vec![
            Ok(Some(status("syncing"))),
            Ok(Some(options(&[]).with("options", "Browse~Open on web~browse"))),
            Ok(Some(ArgumentMap::new().with("tag", "shared"))),
        ]);
        let req = FileInfoRequest::new("/home/u/Dropbox/team", true);

        let info = execute(&mut conn, &req).unwrap().unwrap();
        assert_eq!(info.status, FileStatus::Syncing);
        assert_eq!(info.folder_tag, Some(FolderTag::Shared));
        assert_eq!(conn.sent.len(), 3);
        assert_eq!(conn.sent[2].0, FOLDER_TAG_COMMAND);
    }

    #[test]
    fn first_refusal_fails_whole_composite() {
        let mut conn = Scripted::new(vec![
            Ok(None),
            Ok(Some(options(&["Share~Share~share"]))),
            Ok(Some(ArgumentMap::new().with("tag", "public"))),
        ]);
        let req = FileInfoRequest::new("/home/u/Dropbox/team", true);

        assert!(execute(&mut conn, &req).unwrap().is_none());
        assert_eq!(conn.sent.len(), 1);
    }

    #[test]
    fn transport_error_propagates() {
        let mut conn = Scripted::new(vec![
            Ok(Some(status("up to date"))),
            Err(BridgeError::PeerClosed),
        ]);
        let req = FileInfoRequest::new("/a", false);
        assert!(matches!(
            execute(&mut conn, &req),
            Err(BridgeError::PeerClosed)
        ));
    }

    #[test]
    fn missing_status_key_fails() {
        let mut conn = Scripted::new(vec![
            Ok(Some(ArgumentMap::new().with("unexpected", "x"))),
            Ok(Some(options(&["Share~Share~share"]))),
        ]);
        let req = FileInfoRequest::new("/a", false);
        assert!(execute(&mut conn, &req).unwrap().is_none());
    }

    #[test]
    fn context_item_parsing() {
        let item = ContextMenuItem::parse("Copy link~Copy public link~copy~link").unwrap();
        assert_eq!(item.title, "Copy link");
        assert_eq!(item.verb, "copy~link");
        assert!(ContextMenuItem::parse("only~two").is_none());
    }

    #[test]
    fn canonicalize_resolves_dots() {
        assert_eq!(
            canonicalize_path(Path::new("/home/u/./Dropbox//x/../y")),
            PathBuf::from("/home/u/Dropbox/y")
        );
        assert_eq!(canonicalize_path(Path::new("/../..")), PathBuf::from("/"));
        assert_eq!(canonicalize_path(Path::new("a/../../b")), PathBuf::from("../b"));
    }
}
