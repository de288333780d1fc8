use thiserror::Error;

pub const RESOURCE_SCHEME: &str = "res://";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResourcePathError {
    #[error("resource path must start with 'res://'")]
    MissingScheme,
    #[error("resource path has nothing after 'res://'")]
    Empty,
    #[error("resource path must not contain '\\\\'")]
    Backslash,
    #[error("resource path must not contain '..'")]
    ParentTraversal,
    #[error("resource path must not contain an empty segment")]
    EmptySegment,
    #[error("resource path contains invalid character '{character}'")]
    InvalidCharacter { character: char },
}

/// Returns the part after the scheme, which is relative to the scene root.
pub fn validate_resource_path(path: &str) -> Result<&str, ResourcePathError> {
    let relative = path
        .strip_prefix(RESOURCE_SCHEME)
        .ok_or(ResourcePathError::MissingScheme)?;
    if relative.is_empty() {
        return Err(ResourcePathError::Empty);
    }
    if relative.contains('\\') {
        return Err(ResourcePathError::Backslash);
    }
    if relative.contains("..") {
        return Err(ResourcePathError::ParentTraversal);
    }
    if relative.split('/').any(str::is_empty) {
        return Err(ResourcePathError::EmptySegment);
    }
    for ch in relative.chars() {
        if ch.is_ascii_alphanumeric() || matches!(ch, '_' | '/' | '-' | '.') {
            continue;
        }
        return Err(ResourcePathError::InvalidCharacter { character: ch });
    }
    Ok(relative)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_valid_paths() {
        for path in [
            "res://demo/cube.tscn",
            "res://cell.json",
            "res://organelles/Nucleus_2.scene.json",
        ] {
            assert!(validate_resource_path(path).is_ok(), "path={path}");
        }
        assert_eq!(
            validate_resource_path("res://demo/cube.tscn"),
            Ok("demo/cube.tscn")
        );
    }

    #[test]
    fn rejects_invalid_paths() {
        for path in [
            "demo/cube.tscn",
            "res://",
            "res:///abs",
            "res://a/../b",
            r"res://a\b",
            "res://a//b",
            "res://a b",
        ] {
            assert!(validate_resource_path(path).is_err(), "path={path}");
        }
    }
}
