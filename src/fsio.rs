use std::fs;
use std::io::{self, Write};
use std::path::Path;

use tempfile::NamedTempFile;

use crate::error::{HookError, Result};

/// Replace `path` with `contents` without ever leaving a truncated file:
/// write a sibling temp file, flush it, then rename over the target. An
/// existing target keeps its permission bits.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut tmp = NamedTempFile::new_in(dir).map_err(|err| HookError::write(path, err))?;
    tmp.write_all(contents)
        .and_then(|()| tmp.as_file().sync_all())
        .map_err(|err| HookError::write(path, err))?;

    match fs::metadata(path) {
        Ok(meta) => tmp
            .as_file()
            .set_permissions(meta.permissions())
            .map_err(|err| HookError::write(path, err))?,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => return Err(HookError::read(path, err)),
    }

    tmp.persist(path)
        .map_err(|err| HookError::write(path, err.error))?;

    Ok(())
}
