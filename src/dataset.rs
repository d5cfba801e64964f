//! Labeled image lists read in lockstep.
//!
//! A list file holds one `<image path> <label>` pair per line. Relative
//! image paths resolve against the list's own directory. Several lists are
//! the *slices* of one dataset: line `i` of every list describes the same
//! document.

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// One labeled image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabeledEntry {
    pub path: PathBuf,
    pub label: usize,
}

impl LabeledEntry {
    /// File name used to match entries across slices.
    #[must_use]
    pub fn key(&self) -> String {
        self.path.file_name().map_or_else(
            || self.path.display().to_string(),
            |name| name.to_string_lossy().into_owned(),
        )
    }
}

/// The entries of one list file.
#[derive(Debug, Clone)]
pub struct LabeledList {
    source: PathBuf,
    entries: Vec<LabeledEntry>,
}

impl LabeledList {
    /// Parse list text. Blank lines and `#` comments are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DataSource`] for a line without a path and an
    /// unsigned integer label.
    pub fn parse(text: &str, source: &Path) -> Result<Self> {
        let base = source.parent().unwrap_or_else(|| Path::new(""));
        let mut entries = Vec::new();

        for (lineno, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let bad_line = |reason: &str| Error::DataSource {
                path: source.to_path_buf(),
                reason: format!("line {}: {reason}", lineno + 1),
            };

            let (path, label) = line
                .rsplit_once(char::is_whitespace)
                .ok_or_else(|| bad_line("expected `<path> <label>`"))?;
            let label = label
                .parse()
                .map_err(|_| bad_line(&format!("bad label {label:?}")))?;

            entries.push(LabeledEntry {
                path: base.join(path.trim()),
                label,
            });
        }

        Ok(Self {
            source: source.to_path_buf(),
            entries,
        })
    }

    /// Read and parse a list file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DataSource`] if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| Error::DataSource {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::parse(&text, path)
    }

    #[must_use]
    pub fn source(&self) -> &Path {
        &self.source
    }

    #[must_use]
    pub fn entries(&self) -> &[LabeledEntry] {
        &self.entries
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// One document across every slice.
#[derive(Debug, Clone, Copy)]
pub struct Record<'a> {
    /// Label from the first slice.
    pub label: usize,
    /// The entry from each slice, in slice order.
    pub entries: &'a [&'a LabeledEntry],
}

/// Parallel slices of a dataset.
#[derive(Debug, Clone)]
pub struct SliceSet {
    lists: Vec<LabeledList>,
}

impl SliceSet {
    /// Open one list per slice.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParameter`] for no paths, or the first list
    /// that fails to load.
    pub fn open(paths: &[PathBuf]) -> Result<Self> {
        if paths.is_empty() {
            return Err(Error::invalid_parameter("lists", "at least one list is required"));
        }
        let lists = paths
            .iter()
            .map(|p| LabeledList::from_file(p))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::from_lists(lists))
    }

    #[must_use]
    pub fn from_lists(lists: Vec<LabeledList>) -> Self {
        let shortest = lists.iter().map(LabeledList::len).min().unwrap_or(0);
        if lists.iter().any(|l| l.len() != shortest) {
            tracing::warn!("Slices differ in length; stopping after {shortest} record(s)");
        }
        Self { lists }
    }

    #[must_use]
    pub fn num_slices(&self) -> usize {
        self.lists.len()
    }

    /// Number of records readable from every slice.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lists.iter().map(LabeledList::len).min().unwrap_or(0)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Walk every record, at most `limit` of them, calling `f` with the
    /// record and its index.
    ///
    /// Keys or labels that disagree with the first slice are logged as
    /// warnings; the first slice's label wins.
    ///
    /// # Errors
    ///
    /// Stops at and returns the first error from `f`.
    pub fn for_each<F>(&self, limit: usize, mut f: F) -> Result<()>
    where
        F: FnMut(usize, Record<'_>) -> Result<()>,
    {
        let mut entries = Vec::with_capacity(self.lists.len());
        for index in 0..self.len().min(limit) {
            entries.clear();
            entries.extend(self.lists.iter().map(|l| &l.entries[index]));
            let record = self.check(&entries);
            f(index, record)?;
        }
        Ok(())
    }

    fn check<'a>(&self, entries: &'a [&'a LabeledEntry]) -> Record<'a> {
        let first = entries[0];
        let key = first.key();
        for (slice, entry) in entries.iter().enumerate().skip(1) {
            if entry.key() != key {
                tracing::warn!(
                    "Keys differ {key} vs {} for slices 0 and {slice} ({})",
                    entry.key(),
                    self.lists[slice].source.display()
                );
            }
            if entry.label != first.label {
                tracing::warn!(
                    "Key {key} has differing labels: {} vs {} for slices 0 and {slice}",
                    first.label,
                    entry.label
                );
            }
        }
        Record {
            label: first.label,
            entries,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_parse_list() {
        let text = "# docs\nimgs/a.png 3\n\n  b c.png   12 \n";
        let list = LabeledList::parse(text, Path::new("/data/train.txt")).unwrap();

        assert_eq!(list.len(), 2);
        assert_eq!(list.entries()[0].path, PathBuf::from("/data/imgs/a.png"));
        assert_eq!(list.entries()[0].label, 3);
        assert_eq!(list.entries()[1].path, PathBuf::from("/data/b c.png"));
        assert_eq!(list.entries()[1].key(), "b c.png");
        assert_eq!(list.entries()[1].label, 12);
    }

    #[test]
    fn test_parse_errors_name_the_line() {
        let err = LabeledList::parse("a.png 1\nb.png x\n", Path::new("l.txt")).unwrap_err();
        assert!(matches!(err, Error::DataSource { ref reason, .. } if reason.starts_with("line 2")));

        assert!(LabeledList::parse("lonely\n", Path::new("l.txt")).is_err());
    }

    #[test]
    fn test_open_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "/abs/x.png 0").unwrap();
        writeln!(file, "/abs/y.png 1").unwrap();

        let set = SliceSet::open(&[file.path().to_path_buf()]).unwrap();
        assert_eq!(set.num_slices(), 1);
        assert_eq!(set.len(), 2);

        assert!(SliceSet::open(&[]).is_err());
        assert!(SliceSet::open(&[PathBuf::from("/missing/list.txt")]).is_err());
    }

    #[test]
    fn test_lockstep_uses_shortest_and_first_label() {
        let a = LabeledList::parse("/a/1.png 0\n/a/2.png 1\n/a/3.png 1\n", Path::new("a")).unwrap();
        let b = LabeledList::parse("/b/1.png 0\n/b/2.png 2\n", Path::new("b")).unwrap();
        let set = SliceSet::from_lists(vec![a, b]);

        let mut seen = Vec::new();
        set.for_each(usize::MAX, |i, record| {
            seen.push((i, record.label, record.entries.len()));
            Ok(())
        })
        .unwrap();

        assert_eq!(seen, vec![(0, 0, 2), (1, 1, 2)]);
    }

    #[test]
    fn test_limit_and_early_stop() {
        let a = LabeledList::parse("/1.png 0\n/2.png 0\n/3.png 0\n", Path::new("a")).unwrap();
        let set = SliceSet::from_lists(vec![a]);

        let mut count = 0;
        set.for_each(2, |_, _| {
            count += 1;
            Ok(())
        })
        .unwrap();
        assert_eq!(count, 2);

        let err = set
            .for_each(3, |i, _| {
                if i == 1 {
                    Err(Error::invalid_parameter("stop", "here"))
                } else {
                    Ok(())
                }
            })
            .unwrap_err();
        assert!(matches!(err, Error::InvalidParameter { .. }));
    }
}
