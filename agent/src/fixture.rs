//! Normalises copied integration-test fixture directories.
//!
//! Copying a fixture directory in a file manager produces names such as
//! `scrap-prom-metrics copy 3`. This module renames those to
//! `scrap-prom-metrics-copy3` and then suffixes the fixture's identifiers in
//! its generated files with the copy number, so every copy registers
//! distinct components and test functions. Running it again changes nothing.

use std::fs;
use std::path::{Path, PathBuf};

use lazy_static::lazy_static;
use log::{debug, info, warn};
use regex::{Captures, Regex};

use common::error::{Error, Result};

pub const DEFAULT_PREFIX: &str = "scrap-prom-metrics";
pub const CONFIG_FILE: &str = "config.river";

const COPY_MARKER: &str = "-copy";

lazy_static! {
    static ref COPY_NUMBER_RE: Regex = Regex::new(r"^(\d+)$").unwrap();
}

#[derive(Debug, Clone)]
pub struct Options {
    pub root: PathBuf,
    /// Directory name prefix shared by the fixture and all its copies.
    pub prefix: String,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            prefix: DEFAULT_PREFIX.to_string(),
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Report {
    pub renamed: Vec<(PathBuf, PathBuf)>,
    pub rewritten: Vec<PathBuf>,
}

/// `scrap-prom-metrics copy 3` becomes `scrap-prom-metrics-copy3`. Returns
/// `None` for names that are already normalised.
pub fn normalize_name(name: &str) -> Option<String> {
    let normalized = name.replace(" copy ", COPY_MARKER).replace(' ', "-");
    if normalized == name {
        None
    } else {
        Some(normalized)
    }
}

/// The copy number of a normalised fixture directory name.
pub fn copy_number(prefix: &str, name: &str) -> Option<u64> {
    let rest = name.strip_prefix(prefix)?.strip_prefix(COPY_MARKER)?;
    if !COPY_NUMBER_RE.is_match(rest) {
        return None;
    }
    match rest.parse() {
        Ok(number) => Some(number),
        Err(err) => {
            warn!("skipping {:?}: copy number {:?} is not usable: {}", name, rest, err);
            None
        }
    }
}

/// `scrap-prom-metrics` to `scrap_prom_metrics`.
fn identifier(prefix: &str) -> String {
    prefix.replace('-', "_")
}

/// `scrap-prom-metrics` to `TestScrapPromMetrics`.
fn test_function(prefix: &str) -> String {
    let mut name = String::from("Test");
    for part in prefix.split(['-', '_']).filter(|p| !p.is_empty()) {
        let mut chars = part.chars();
        if let Some(first) = chars.next() {
            name.extend(first.to_uppercase());
            name.push_str(chars.as_str());
        }
    }
    name
}

/// The generated test file of a fixture.
pub fn test_file_name(prefix: &str) -> String {
    format!("{}_test.go", identifier(prefix))
}

pub fn run(opts: &Options) -> Result<Report> {
    let mut report = Report {
        renamed: rename_pass(opts)?,
        ..Default::default()
    };
    let substitutions = Substitutions::new(&opts.prefix)?;
    for dir in fixture_dirs(&opts.root)? {
        let Some(name) = dir.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Some(number) = copy_number(&opts.prefix, name) else {
            continue;
        };
        for file in [dir.join(test_file_name(&opts.prefix)), dir.join(CONFIG_FILE)] {
            if substitutions.apply(&file, number)? {
                report.rewritten.push(file);
            }
        }
    }
    info!(
        "fixtures: renamed {} directories, rewrote {} files",
        report.renamed.len(),
        report.rewritten.len()
    );
    Ok(report)
}

fn fixture_dirs(root: &Path) -> Result<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    for entry in fs::read_dir(root)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            dirs.push(entry.path());
        }
    }
    dirs.sort();
    Ok(dirs)
}

fn rename_pass(opts: &Options) -> Result<Vec<(PathBuf, PathBuf)>> {
    let mut renamed = Vec::new();
    for dir in fixture_dirs(&opts.root)? {
        let Some(name) = dir.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !name.starts_with(&opts.prefix) {
            continue;
        }
        let Some(new_name) = normalize_name(name) else {
            continue;
        };
        let new_path = dir.with_file_name(&new_name);
        if new_path.exists() {
            warn!("not renaming {:?}: {:?} already exists", dir, new_path);
            continue;
        }
        debug!("renaming {:?} to {:?}", dir, new_path);
        fs::rename(&dir, &new_path)?;
        renamed.push((dir, new_path));
    }
    Ok(renamed)
}

/// The two textual patterns rewritten in each numbered fixture. Each one
/// matches the bare name plus any digits already appended to it.
struct Substitutions {
    identifier: Regex,
    test_function: Regex,
}

impl Substitutions {
    fn new(prefix: &str) -> Result<Self> {
        let numbered = |s: &str| {
            Regex::new(&format!(r"\b{}(\d*)", regex::escape(s)))
                .map_err(|err| Error::InvalidArguments(format!("fixture prefix {:?}: {}", prefix, err)))
        };
        Ok(Self {
            identifier: numbered(&identifier(prefix))?,
            test_function: numbered(&test_function(prefix))?,
        })
    }

    /// Rewrites `file` in place; returns whether it changed. Missing files
    /// are skipped.
    fn apply(&self, file: &Path, number: u64) -> Result<bool> {
        if !file.is_file() {
            debug!("skipping {:?}: no such file", file);
            return Ok(false);
        }
        let content = fs::read_to_string(file)?;
        let mut updated = content.clone();
        for re in [&self.identifier, &self.test_function] {
            updated = re
                .replace_all(&updated, |caps: &Captures| {
                    if caps[1].is_empty() {
                        format!("{}{}", &caps[0], number)
                    } else {
                        caps[0].to_string()
                    }
                })
                .into_owned();
        }
        if updated == content {
            return Ok(false);
        }
        fs::write(file, updated)?;
        debug!("rewrote {:?}", file);
        Ok(true)
    }
}
