use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use log::{info, warn};

/// Wildcard-aware deny-list matcher for recognized subtitle text.
///
/// Matching is case-insensitive and word-boundary-anchored: the subject
/// is lowercased, every non-alphabetic character becomes a space, and
/// the whole string is bracketed with spaces, so a plain entry only
/// matches whole words. A leading or trailing `*` on an entry drops the
/// boundary requirement on that side.
#[derive(Debug, Default, Clone)]
pub struct WordFilter {
    needles: Vec<String>,
}

impl WordFilter {
    /// Loads a deny list, one entry per line, blank lines ignored.
    ///
    /// A missing or unreadable file yields an empty filter; the feature
    /// is optional enrichment and must never abort playback.
    pub fn load(path: &Path) -> Self {
        match File::open(path) {
            Ok(file) => {
                let filter = Self::from_lines(BufReader::new(file).lines().map_while(Result::ok));
                info!(
                    "loaded {} filter words from {}",
                    filter.len(),
                    path.display()
                );
                filter
            }
            Err(e) => {
                warn!("word list {} not loaded: {e}", path.display());
                Self::default()
            }
        }
    }

    pub fn from_lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let needles = lines
            .into_iter()
            .filter_map(|line| compile_entry(line.as_ref()))
            .collect();

        Self { needles }
    }

    pub fn len(&self) -> usize {
        self.needles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.needles.is_empty()
    }

    /// Checks whether the text contains any deny-list entry.
    pub fn contains_banned(&self, text: &str) -> bool {
        if self.needles.is_empty() {
            return false;
        }

        let subject = normalize(text);
        self.needles.iter().any(|needle| subject.contains(needle))
    }
}

/// Lowercases and maps every non-alphabetic character to a space, with
/// a bracketing space on both ends so entries can anchor on word
/// boundaries.
fn normalize(text: &str) -> String {
    let mut subject = String::with_capacity(text.len() + 2);
    subject.push(' ');

    for c in text.chars() {
        if c.is_alphabetic() {
            subject.extend(c.to_lowercase());
        } else {
            subject.push(' ');
        }
    }

    subject.push(' ');
    subject
}

/// Turns one deny-list line into the needle searched for in normalized
/// subjects. Boundary spaces are kept unless the matching side carries
/// a `*` wildcard.
fn compile_entry(line: &str) -> Option<String> {
    let entry = line.trim();
    if entry.is_empty() {
        return None;
    }

    let left_wild = entry.starts_with('*');
    let right_wild = entry.len() > 1 && entry.ends_with('*');
    let core = entry.trim_matches('*');
    if core.is_empty() {
        return None;
    }

    let mut needle = String::with_capacity(core.len() + 2);
    if !left_wild {
        needle.push(' ');
    }
    needle.push_str(&core.to_lowercase());
    if !right_wild {
        needle.push(' ');
    }

    Some(needle)
}
