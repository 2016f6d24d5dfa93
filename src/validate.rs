use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::Context as _;
use serde_json::Value;

use crate::cli::ValidateArgs;

/// One reason a chapter record file fails validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordIssue {
    Unparseable(String),
    RootNotObject,
    TitleMissing,
    TitleNotString,
    TitleEmpty,
    ContentsMissing,
    ContentsNotArray,
    ContentsEmpty,
    GroupNotArray { index: usize },
    GroupEmpty { index: usize },
}

impl fmt::Display for RecordIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordIssue::Unparseable(reason) => write!(f, "not valid JSON: {reason}"),
            RecordIssue::RootNotObject => write!(f, "root is not an object"),
            RecordIssue::TitleMissing => write!(f, "chapterTitle is missing"),
            RecordIssue::TitleNotString => write!(f, "chapterTitle is not a string"),
            RecordIssue::TitleEmpty => write!(f, "chapterTitle is empty"),
            RecordIssue::ContentsMissing => write!(f, "contents is missing"),
            RecordIssue::ContentsNotArray => write!(f, "contents is not an array"),
            RecordIssue::ContentsEmpty => write!(f, "contents is empty"),
            RecordIssue::GroupNotArray { index } => {
                write!(f, "contents[{index}] is not an array")
            }
            RecordIssue::GroupEmpty { index } => write!(f, "contents[{index}] is empty"),
        }
    }
}

#[derive(Debug)]
pub struct FileReport {
    pub path: PathBuf,
    pub issues: Vec<RecordIssue>,
}

#[derive(Debug, Default)]
pub struct ValidationReport {
    pub checked: usize,
    pub invalid: Vec<FileReport>,
}

impl ValidationReport {
    pub fn all_valid(&self) -> bool {
        self.invalid.is_empty()
    }
}

/// Check every `.json` file under the given path (or the single given file)
/// and print an itemized reason per failing field.
pub fn run(args: &ValidateArgs) -> anyhow::Result<ValidationReport> {
    let root = PathBuf::from(&args.dir);
    if !root.exists() {
        anyhow::bail!("no such path: {}", root.display());
    }

    let mut files = Vec::new();
    collect_json_files(&root, &mut files)
        .with_context(|| format!("walk: {}", root.display()))?;
    files.sort();

    let mut report = ValidationReport::default();
    for path in files {
        let bytes = std::fs::read(&path).with_context(|| format!("read: {}", path.display()))?;
        let issues = check_bytes(&bytes);
        report.checked += 1;
        if issues.is_empty() {
            continue;
        }
        for issue in &issues {
            println!("{}: {issue}", path.display());
        }
        report.invalid.push(FileReport { path, issues });
    }

    if report.all_valid() {
        println!("{} record(s) checked, all valid", report.checked);
    } else {
        println!(
            "{} record(s) checked, {} invalid",
            report.checked,
            report.invalid.len()
        );
    }
    Ok(report)
}

fn collect_json_files(path: &Path, files: &mut Vec<PathBuf>) -> anyhow::Result<()> {
    if path.is_file() {
        files.push(path.to_path_buf());
        return Ok(());
    }
    let mut stack = vec![path.to_path_buf()];
    while let Some(current) = stack.pop() {
        for entry in std::fs::read_dir(&current)
            .with_context(|| format!("read dir: {}", current.display()))?
        {
            let entry = entry?;
            let entry_path = entry.path();
            if entry_path.is_dir() {
                stack.push(entry_path);
            } else if entry_path.extension().and_then(|ext| ext.to_str()) == Some("json") {
                files.push(entry_path);
            }
        }
    }
    Ok(())
}

pub fn check_bytes(bytes: &[u8]) -> Vec<RecordIssue> {
    match serde_json::from_slice::<Value>(bytes) {
        Ok(value) => check_value(&value),
        Err(err) => vec![RecordIssue::Unparseable(err.to_string())],
    }
}

/// Structural checks on one parsed record, all reported rather than
/// short-circuiting on the first failure.
pub fn check_value(value: &Value) -> Vec<RecordIssue> {
    let Some(object) = value.as_object() else {
        return vec![RecordIssue::RootNotObject];
    };

    let mut issues = Vec::new();

    match object.get("chapterTitle") {
        None => issues.push(RecordIssue::TitleMissing),
        Some(Value::String(title)) => {
            if title.trim().is_empty() {
                issues.push(RecordIssue::TitleEmpty);
            }
        }
        Some(_) => issues.push(RecordIssue::TitleNotString),
    }

    match object.get("contents") {
        None => issues.push(RecordIssue::ContentsMissing),
        Some(Value::Array(groups)) => {
            if groups.is_empty() {
                issues.push(RecordIssue::ContentsEmpty);
            }
            for (index, group) in groups.iter().enumerate() {
                match group {
                    Value::Array(items) => {
                        if items.is_empty() {
                            issues.push(RecordIssue::GroupEmpty { index });
                        }
                    }
                    _ => issues.push(RecordIssue::GroupNotArray { index }),
                }
            }
        }
        Some(_) => issues.push(RecordIssue::ContentsNotArray),
    }

    issues
}
