//! JSON export of the link cache

use super::traits::{CacheError, CacheResult, Link, LinkCache};
use std::collections::BTreeMap;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;
use tempfile::NamedTempFile;

/// Write the cache as a JSON object `{term: [links...]}`.
///
/// Terms with no links are skipped unless `include_empty` is set. Corrupt
/// entries are logged and left out. Returns the number of terms written.
pub fn export_json(cache: &dyn LinkCache, path: &Path, include_empty: bool) -> CacheResult<usize> {
    let mut out: BTreeMap<String, Vec<Link>> = BTreeMap::new();
    let mut corrupt = 0usize;
    for term in cache.terms()? {
        match cache.get(&term) {
            Ok(Some(entry)) => {
                if include_empty || !entry.is_empty() {
                    out.insert(entry.term, entry.links);
                }
            }
            Ok(None) => {}
            Err(CacheError::Corrupt { term, reason }) => {
                tracing::warn!(term = %term, reason = %reason, "skipping corrupt cache entry");
                corrupt += 1;
            }
            Err(e) => return Err(e),
        }
    }

    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;
    let tmp = NamedTempFile::new_in(dir)?;
    {
        let mut writer = BufWriter::new(tmp.as_file());
        serde_json::to_writer_pretty(&mut writer, &out)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
    }
    tmp.persist(path).map_err(|e| e.error)?;

    tracing::info!(terms = out.len(), corrupt, path = %path.display(), "exported link cache");
    Ok(out.len())
}
