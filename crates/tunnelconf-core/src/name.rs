/// Longest accepted tunnel name.
pub const MAX_NAME_LEN: usize = 32;

const RESERVED_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Predicate deciding whether a string may be used as a tunnel name.
pub trait NameValidator: Send + Sync {
    fn is_valid(&self, name: &str) -> bool;
}

impl<F> NameValidator for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn is_valid(&self, name: &str) -> bool {
        self(name)
    }
}

/// Default tunnel name rule: 1..=32 characters from `[A-Za-z0-9_=+.-]`, and
/// not a reserved device name so the name stays usable as a filename everywhere.
pub fn is_valid_tunnel_name(name: &str) -> bool {
    if name.is_empty() || name.len() > MAX_NAME_LEN {
        return false;
    }
    if !name
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'=' | b'+' | b'.' | b'-'))
    {
        return false;
    }
    !RESERVED_NAMES
        .iter()
        .any(|reserved| reserved.eq_ignore_ascii_case(name))
}
