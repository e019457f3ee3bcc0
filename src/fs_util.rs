use camino::Utf8PathBuf;

pub const PLACEHOLDER_SEGMENT: &str = "unknown";

/// Makes catalog-supplied text safe to use as a single directory name.
pub fn sanitize_segment(value: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed == "." || trimmed == ".." {
        return PLACEHOLDER_SEGMENT.to_string();
    }
    trimmed.replace(['/', '\\'], "_")
}

/// Local path of `key` below the series directory: the part after `prefix`,
/// or the basename when the key does not start with it. Empty, `.` and `..`
/// components are dropped; `None` means nothing usable is left.
pub fn relative_object_path(prefix: &str, key: &str) -> Option<Utf8PathBuf> {
    let relative = match key.strip_prefix(prefix) {
        Some(rest) => rest,
        None => key.rsplit('/').next().unwrap_or(key),
    };
    let parts = relative
        .split(['/', '\\'])
        .filter(|part| !part.is_empty() && *part != "." && *part != "..")
        .collect::<Vec<_>>();
    if parts.is_empty() {
        return None;
    }
    Some(parts.into_iter().collect())
}
