use std::io::Write as _;
use std::path::{Path, PathBuf};

use anyhow::Context as _;

use crate::formats::ChapterRecord;

/// Filesystem-safe rendering of a heading. Returns `None` when nothing
/// usable remains, so callers can substitute their placeholder identity.
pub fn fs_name(raw: &str) -> Option<String> {
    let cleaned: String = raw
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let cleaned = cleaned
        .trim_matches(|c: char| c == '.' || c.is_whitespace())
        .to_owned();
    if cleaned.is_empty() { None } else { Some(cleaned) }
}

pub fn catalog_root(out_dir: &Path, source_id: &str) -> PathBuf {
    out_dir.join(source_id)
}

pub fn volume_dir(root: &Path, volume_name: &str) -> PathBuf {
    root.join(volume_name)
}

pub fn chapter_dir(volume_dir: &Path, chapter_name: &str) -> PathBuf {
    volume_dir.join(chapter_name)
}

pub fn record_path(chapter_dir: &Path) -> PathBuf {
    chapter_dir.join("record.json")
}

pub fn pictures_dir(chapter_dir: &Path) -> PathBuf {
    chapter_dir.join("pictures")
}

/// Resume check: a chapter with a persisted record needs no network work.
pub fn chapter_record_exists(chapter_dir: &Path) -> bool {
    record_path(chapter_dir).is_file()
}

/// Persist a chapter record all-or-nothing. An interrupt mid-write leaves
/// either the previous record or the complete new one, never a partial file.
pub fn write_chapter_record(chapter_dir: &Path, record: &ChapterRecord) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(chapter_dir)
        .with_context(|| format!("create chapter dir: {}", chapter_dir.display()))?;
    let path = record_path(chapter_dir);
    let json = serde_json::to_vec_pretty(record).context("serialize chapter record")?;
    write_atomic(&path, &json)?;
    Ok(path)
}

/// Write `bytes` to `path` through a temp file in the same directory plus a
/// rename.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    let dir = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .ok_or_else(|| anyhow::anyhow!("path has no parent: {}", path.display()))?;
    std::fs::create_dir_all(dir).with_context(|| format!("create dir: {}", dir.display()))?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .with_context(|| format!("create temp file in: {}", dir.display()))?;
    tmp.write_all(bytes)
        .with_context(|| format!("write temp file for: {}", path.display()))?;
    tmp.persist(path)
        .map_err(|err| anyhow::anyhow!("persist {}: {}", path.display(), err.error))?;
    Ok(())
}
