//! Rejection of shell and statement metacharacters in administrative input.
//!
//! Applied before any Create/ChangePassword/ChangeAccess command is built, in
//! addition to the quoting done by the statement builders.

use std::path::{Component, Path};

use crate::error::PanelError;

/// Characters never accepted in names, usernames, passwords, or formats.
const ILLEGAL_CHARS: &[char] = &['&', '|', ';', '$', '\'', '`', '(', ')', '"', '\n', '\r', '>', '<'];

/// Check whether any argument contains an illegal character.
pub fn check_illegal(args: &[&str]) -> bool {
    args.iter().any(|arg| arg.contains(ILLEGAL_CHARS))
}

/// Validate named inputs, reporting the first offending field.
///
/// Values are never echoed back since they may be passwords.
pub fn ensure_legal(fields: &[(&str, &str)]) -> Result<(), PanelError> {
    match fields.iter().find(|(_, value)| check_illegal(&[*value])) {
        Some((field, _)) => {
            tracing::warn!(field = *field, "Rejected administrative input with illegal characters");
            Err(PanelError::cmd_illegal(*field))
        }
        None => Ok(()),
    }
}

/// Check that a name is exactly one ordinary directory component.
///
/// Database and engine names become directories under the upload and backup
/// trees, so `.`, `..` and anything with a separator must never pass.
pub fn is_path_segment(name: &str) -> bool {
    if name.contains(['/', '\\']) {
        return false;
    }
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(part)), None) if part == name
    )
}

/// Validate a name that is also used as a directory.
pub fn ensure_path_segment(field: &str, value: &str) -> Result<(), PanelError> {
    if is_path_segment(value) {
        Ok(())
    } else {
        Err(PanelError::invalid_input(format!("{field} must be a plain name without path separators")))
    }
}
