//! SHA-256 helpers used for landing dedup and change detection

use sha2::{Digest, Sha256};

/// Hex-encoded SHA-256 of raw bytes
pub fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Hash of attribute values joined by `|`
///
/// Missing values hash as the empty string, so `None` and `Some("")` collide.
/// Callers only pass numeric and identifier fields where that cannot happen.
pub fn hash_fields<I, S>(fields: I) -> String
where
    I: IntoIterator<Item = Option<S>>,
    S: AsRef<str>,
{
    let joined = fields
        .into_iter()
        .map(|f| match f {
            Some(s) => AsRef::<str>::as_ref(&s).to_owned(),
            None => String::new(),
        })
        .collect::<Vec<_>>()
        .join("|");
    sha256_hex(joined.as_bytes())
}
