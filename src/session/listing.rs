use heapless::String;
use sdcard::BlockDevice;

use super::{SdSession, Volume};
use crate::{
    console::{console_line, Console},
    error::{FsError, FsResult},
    paths::{self, copy_truncated},
    storage::BlockStorage,
    SD_NAME_MAX, SD_PATH_MAX,
};

const SD_LIST_INDENT: usize = 2;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListedEntry {
    pub name: String<SD_NAME_MAX>,
    pub size: u64,
    pub is_dir: bool,
    pub depth: usize,
}

impl ListedEntry {
    pub(crate) fn from_fat(name: &str, size: u64, is_dir: bool, depth: usize) -> Self {
        Self {
            name: copy_truncated(name),
            size: if is_dir { 0 } else { size },
            is_dir,
            depth,
        }
    }

    pub(crate) fn directory(name: &str, depth: usize) -> Self {
        Self::from_fat(name, 0, true, depth)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WalkEvent<'e> {
    Entry(&'e ListedEntry),
    /// The starting directory could not be opened.
    OpenFailed { path: &'e str, depth: usize },
    /// `parent/name` does not fit in a path buffer; the directory is skipped.
    PathTooLong {
        parent: &'e str,
        name: &'e str,
        depth: usize,
    },
    /// Directory beyond the configured depth limit; listed but not entered.
    DepthLimit { path: &'e str, depth: usize },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WalkControl {
    Continue,
    Stop,
}

struct Frame<'a, D: BlockDevice> {
    path: String<SD_PATH_MAX>,
    depth: usize,
    entries: fatfs::DirIter<'a, BlockStorage<D>>,
}

impl<D: BlockDevice> Volume<'_, D> {
    /// Pre-order traversal with an explicit stack of open directories. An
    /// enumeration error or an empty name ends the directory it occurred in.
    fn walk<F>(
        &self,
        path: &str,
        depth: usize,
        max_depth: Option<usize>,
        visit: &mut F,
    ) -> FsResult<()>
    where
        F: FnMut(WalkEvent<'_>) -> WalkControl,
    {
        let opened = self
            .resolve(path)
            .and_then(|rel| self.open_dir(rel).map_err(|err| FsError::from_io(&err)));
        let root = match opened {
            Ok(dir) => dir,
            Err(code) => {
                log::warn!("sdfat: ls_error path={} err={}", path, code.label());
                visit(WalkEvent::OpenFailed { path, depth });
                return Err(code);
            }
        };
        // `resolve` already bounded the length.
        let root_path = copy_truncated::<SD_PATH_MAX>(path);

        let mut stack = vec![Frame {
            path: root_path,
            depth,
            entries: root.iter(),
        }];
        while let Some(frame) = stack.last_mut() {
            let entry = match frame.entries.next() {
                Some(Ok(entry)) => entry,
                Some(Err(err)) => {
                    log::warn!(
                        "sdfat: ls_scan_error path={} err={}",
                        frame.path,
                        FsError::from_io(&err).label()
                    );
                    stack.pop();
                    continue;
                }
                None => {
                    stack.pop();
                    continue;
                }
            };

            let name = entry.file_name();
            if name.is_empty() {
                stack.pop();
                continue;
            }
            if name == "." || name == ".." {
                continue;
            }

            let listed = ListedEntry::from_fat(&name, entry.len(), entry.is_dir(), frame.depth);
            if visit(WalkEvent::Entry(&listed)) == WalkControl::Stop {
                return Ok(());
            }
            if !listed.is_dir {
                continue;
            }

            let child_depth = frame.depth + 1;
            let Some(child_path) = paths::join(&frame.path, &name) else {
                log::warn!("sdfat: ls_path_too_long parent={} name={}", frame.path, name);
                let control = visit(WalkEvent::PathTooLong {
                    parent: &frame.path,
                    name: &name,
                    depth: child_depth,
                });
                if control == WalkControl::Stop {
                    return Ok(());
                }
                continue;
            };
            if max_depth.is_some_and(|max| child_depth > max) {
                if visit(WalkEvent::DepthLimit {
                    path: &child_path,
                    depth: child_depth,
                }) == WalkControl::Stop
                {
                    return Ok(());
                }
                continue;
            }

            let entries = entry.to_dir().iter();
            stack.push(Frame {
                path: child_path,
                depth: child_depth,
                entries,
            });
        }
        Ok(())
    }
}

impl<D: BlockDevice, C: Console> SdSession<D, C> {
    /// Visits every entry below `path` without printing anything.
    pub fn walk_directory<F>(&mut self, path: &str, depth: usize, mut visit: F) -> FsResult<()>
    where
        F: FnMut(WalkEvent<'_>) -> WalkControl,
    {
        let max_depth = self.config.list_max_depth;
        match self.volume() {
            Ok(volume) => volume.walk(path, depth, max_depth, &mut visit),
            Err(code) => {
                visit(WalkEvent::OpenFailed { path, depth });
                Err(code)
            }
        }
    }

    /// Prints the tree below `path`, two spaces of indent per level.
    pub fn list_directory_recursive(&mut self, path: &str, depth: usize) -> FsResult<()> {
        let SdSession {
            fs,
            console,
            config,
            ..
        } = self;
        let max_depth = config.list_max_depth;
        let mut print = |event: WalkEvent<'_>| {
            print_event(&mut *console, event);
            WalkControl::Continue
        };
        match fs.as_ref() {
            Some(fs) => {
                let volume = Volume { fs, config };
                volume.walk(path, depth, max_depth, &mut print)
            }
            None => {
                print(WalkEvent::OpenFailed { path, depth });
                Err(FsError::NotEnabled)
            }
        }
    }

    /// Prints every file and directory on the card.
    pub fn list_files(&mut self) -> FsResult<()> {
        console_line!(self.console, "📂 Files on SD Card:");
        let mount_point = self.config.mount_point.clone();
        let result = self.list_directory_recursive(&mount_point, 0);
        console_line!(self.console, "");
        result
    }
}

fn print_event<C: Console + ?Sized>(console: &mut C, event: WalkEvent<'_>) {
    match event {
        WalkEvent::Entry(entry) => {
            let indent = entry.depth * SD_LIST_INDENT;
            if entry.is_dir {
                console_line!(*console, "{:indent$}📁 {}", "", entry.name);
            } else {
                console_line!(
                    *console,
                    "{:indent$}📄 {} ({} bytes)",
                    "",
                    entry.name,
                    entry.size
                );
            }
        }
        WalkEvent::OpenFailed { path, depth } => {
            let indent = depth * SD_LIST_INDENT;
            console_line!(*console, "{:indent$}[ERR] Cannot open: {}", "", path);
        }
        WalkEvent::PathTooLong {
            parent,
            name,
            depth,
        } => {
            let indent = depth * SD_LIST_INDENT;
            let sep = if parent.ends_with('/') { "" } else { "/" };
            console_line!(
                *console,
                "{:indent$}[ERR] Path too long: {}{}{}",
                "",
                parent,
                sep,
                name
            );
        }
        WalkEvent::DepthLimit { path, depth } => {
            let indent = depth * SD_LIST_INDENT;
            console_line!(*console, "{:indent$}[SKIP] depth limit: {}", "", path);
        }
    }
}
