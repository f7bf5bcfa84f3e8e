use heapless::String;

use crate::{config::SdConfig, error::FsError, error::FsResult, SD_PATH_MAX};

const SD_INVALID_NAME_CHARS: &[char] = &['"', '*', ':', '<', '>', '?', '\\', '|'];

/// Strips the drive prefix and surrounding slashes from `path` and validates
/// each component. Returns the volume-relative path, `""` for the root.
pub fn resolve<'a>(config: &SdConfig, path: &'a str) -> FsResult<&'a str> {
    if path.len() > SD_PATH_MAX {
        return Err(FsError::InvalidName);
    }

    let rest = match path.find(':') {
        Some(colon) => {
            let (drive, rest) = path.split_at(colon + 1);
            if config.drive_prefix() != Some(drive) {
                return Err(FsError::InvalidDrive);
            }
            rest
        }
        None => path,
    };

    let rest = rest.strip_prefix('/').unwrap_or(rest);
    let rest = rest.strip_suffix('/').unwrap_or(rest);
    if rest.is_empty() {
        return Ok(rest);
    }
    for component in rest.split('/') {
        validate_component(component)?;
    }
    Ok(rest)
}

/// Like `resolve`, but the root itself is not a valid target.
pub fn resolve_entry<'a>(config: &SdConfig, path: &'a str) -> FsResult<&'a str> {
    match resolve(config, path)? {
        "" => Err(FsError::InvalidName),
        rel => Ok(rel),
    }
}

fn validate_component(component: &str) -> FsResult<()> {
    if component.is_empty() || component == "." || component == ".." {
        return Err(FsError::InvalidName);
    }
    if component
        .chars()
        .any(|c| c.is_control() || SD_INVALID_NAME_CHARS.contains(&c))
    {
        return Err(FsError::InvalidName);
    }
    Ok(())
}

/// Splits a volume-relative path into parent directory and final name.
pub fn split_parent(rel: &str) -> (&str, &str) {
    match rel.rfind('/') {
        Some(idx) => (&rel[..idx], &rel[idx + 1..]),
        None => ("", rel),
    }
}

/// Joins a directory path and an entry name with a single separator.
/// Returns `None` when the result would not fit in `SD_PATH_MAX`.
pub fn join(parent: &str, name: &str) -> Option<String<SD_PATH_MAX>> {
    let mut out = String::new();
    out.push_str(parent).ok()?;
    if !parent.ends_with('/') {
        out.push('/').ok()?;
    }
    out.push_str(name).ok()?;
    Some(out)
}

/// Copies as much of `src` as fits in `N` bytes without splitting a character.
pub fn copy_truncated<const N: usize>(src: &str) -> String<N> {
    let mut end = src.len().min(N);
    while !src.is_char_boundary(end) {
        end -= 1;
    }
    let mut out = String::new();
    // `end` never exceeds the capacity.
    let _ = out.push_str(&src[..end]);
    out
}
