use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use super::types::{Action, EntryKind, Outcome, Verdict};

/// Performs (or simulates) the mutation a verdict calls for. Failures are
/// returned as an error outcome, never raised.
pub fn execute(verdict: &Verdict, simulate: bool) -> Outcome {
    if verdict.action() != Action::Delete {
        return Outcome::untouched();
    }

    let entry = verdict.entry();
    let size = entry.size();

    if simulate {
        log::debug!("Would delete: {} ({})", entry.path.display(), bytesize::ByteSize(size));
        return Outcome::reclaimed(size, false);
    }

    let result = match entry.kind {
        EntryKind::Directory => remove_empty_dir(&entry.path),
        EntryKind::File => remove_file(&entry.path),
        EntryKind::Symlink => Err("symbolic links are never removed".to_string()),
    };

    match result {
        Ok(()) => {
            log::debug!("Deleted: {} ({})", entry.path.display(), bytesize::ByteSize(size));
            Outcome::reclaimed(size, true)
        }
        Err(err) => {
            log::warn!("Failed to remove {}: {}", entry.path.display(), err);
            Outcome::failed(err)
        }
    }
}

fn remove_file(path: &Path) -> Result<(), String> {
    // a node swapped for a directory or link since enumeration is left alone
    match fs::symlink_metadata(path) {
        Ok(md) if md.file_type().is_dir() || md.file_type().is_symlink() => {
            return Err("entry changed type since it was scanned".into());
        }
        Ok(_) => {}
        Err(err) => return Err(describe(&err)),
    }
    fs::remove_file(path).map_err(|err| describe(&err))
}

fn remove_empty_dir(path: &Path) -> Result<(), String> {
    let mut children = fs::read_dir(path).map_err(|err| describe(&err))?;
    if children.next().is_some() {
        return Err("directory is no longer empty".into());
    }
    // remove_dir refuses non-empty directories, so a writer racing the
    // check above makes this fail instead of losing data
    fs::remove_dir(path).map_err(|err| describe(&err))
}

fn describe(err: &std::io::Error) -> String {
    match err.kind() {
        ErrorKind::NotFound => format!("vanished before removal: {}", err),
        ErrorKind::PermissionDenied => format!("permission denied: {}", err),
        _ => err.to_string(),
    }
}
