use anyhow::{anyhow, Result};
use uuid::Uuid;

use crate::storage::record_storage::Record;

/// Enough of an id to tell records apart in listings.
pub fn short_id(id: Uuid) -> String {
    id.to_string().chars().take(8).collect()
}

/// Picks the one record whose id starts with `prefix`.
pub fn by_id_prefix<R: Record<Id = Uuid>>(records: Vec<R>, prefix: &str, kind: &str) -> Result<R> {
    let wanted = prefix.trim().to_lowercase();
    let mut matching = records
        .into_iter()
        .filter(|r| !wanted.is_empty() && r.id().to_string().starts_with(&wanted))
        .collect::<Vec<_>>();
    match matching.len() {
        1 => Ok(matching.remove(0)),
        0 => Err(anyhow!("No {kind} matches {prefix:?}")),
        _ => Err(anyhow!("{prefix:?} matches several {kind}s, use a longer id")),
    }
}
