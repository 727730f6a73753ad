//! Restart marker detection.

use instances_core::constants::RESTART_MARKER;

/// Whether any launch argument carries the restart marker.
///
/// The marker may be embedded in a larger argument, so this is a substring
/// match.
pub fn relaunched_by_instances<I, S>(args: I) -> bool
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    args.into_iter()
        .any(|arg| arg.as_ref().contains(RESTART_MARKER))
}
