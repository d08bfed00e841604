//! Readable corpus sources
//!
//! Two layouts are recognized: paired lines (title on one line, abstract on
//! the next) and JSON lines of [`Document`].

use super::Document;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Lines};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised while reading documents from a source.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("line {line}: {reason}")]
    Malformed { line: usize, reason: String },
}

/// On-disk layout of a corpus source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    /// Title line followed by abstract line; ids are assigned in order
    PairedLines,
    /// One JSON [`Document`] per line
    JsonLines,
}

impl SourceFormat {
    /// `.jsonl` / `.json` files are JSON lines, anything else paired lines.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("jsonl") | Some("json") => SourceFormat::JsonLines,
            _ => SourceFormat::PairedLines,
        }
    }
}

/// A re-readable corpus location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorpusSource {
    path: PathBuf,
    format: SourceFormat,
}

impl CorpusSource {
    pub fn new(path: impl Into<PathBuf>, format: SourceFormat) -> Self {
        Self {
            path: path.into(),
            format,
        }
    }

    pub fn paired_lines(path: impl Into<PathBuf>) -> Self {
        Self::new(path, SourceFormat::PairedLines)
    }

    pub fn json_lines(path: impl Into<PathBuf>) -> Self {
        Self::new(path, SourceFormat::JsonLines)
    }

    /// Pick the format from the file extension.
    pub fn detect(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let format = SourceFormat::from_path(&path);
        Self { path, format }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> SourceFormat {
        self.format
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Open a fresh reader positioned at the first document.
    pub fn open(&self) -> io::Result<DocumentReader> {
        let file = File::open(&self.path)?;
        Ok(DocumentReader {
            lines: BufReader::new(file).lines(),
            format: self.format,
            line: 0,
            next_id: 0,
        })
    }
}

/// Sequential document reader over a [`CorpusSource`].
pub struct DocumentReader {
    lines: Lines<BufReader<File>>,
    format: SourceFormat,
    line: usize,
    next_id: u64,
}

impl DocumentReader {
    fn next_line(&mut self) -> Option<io::Result<String>> {
        let line = self.lines.next()?;
        self.line += 1;
        Some(line.map(|l| l.trim_end_matches('\r').to_string()))
    }

    fn next_paired(&mut self) -> Option<Result<Document, SourceError>> {
        let title = match self.next_line()? {
            Ok(t) => t,
            Err(e) => return Some(Err(e.into())),
        };
        let abstract_text = match self.next_line() {
            Some(Ok(a)) => a,
            Some(Err(e)) => return Some(Err(e.into())),
            None => {
                tracing::warn!(line = self.line, "dropping unpaired trailing title line");
                return None;
            }
        };
        let id = self.next_id;
        self.next_id += 1;
        Some(Ok(Document::new(id, title.trim(), abstract_text.trim())))
    }

    fn next_json(&mut self) -> Option<Result<Document, SourceError>> {
        loop {
            let line = match self.next_line()? {
                Ok(l) => l,
                Err(e) => return Some(Err(e.into())),
            };
            if line.trim().is_empty() {
                continue;
            }
            return Some(serde_json::from_str(&line).map_err(|e| SourceError::Malformed {
                line: self.line,
                reason: e.to_string(),
            }));
        }
    }

    /// Line number of the last line consumed.
    pub fn line(&self) -> usize {
        self.line
    }
}

impl Iterator for DocumentReader {
    type Item = Result<Document, SourceError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.format {
            SourceFormat::PairedLines => self.next_paired(),
            SourceFormat::JsonLines => self.next_json(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(suffix: &str, content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_paired_lines_assign_sequential_ids() {
        let file = write_file(".txt", "Title A\nAbstract A\nTitle B\r\nAbstract B\n");
        let docs: Vec<Document> = CorpusSource::paired_lines(file.path())
            .open()
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0], Document::new(0, "Title A", "Abstract A"));
        assert_eq!(docs[1], Document::new(1, "Title B", "Abstract B"));
    }

    #[test]
    fn test_paired_lines_drop_unpaired_tail() {
        let file = write_file(".txt", "Title A\nAbstract A\nOrphan\n");
        let docs: Vec<_> = CorpusSource::paired_lines(file.path()).open().unwrap().collect();
        assert_eq!(docs.len(), 1);
    }

    #[test]
    fn test_json_lines_skip_blank_and_report_line() {
        let file = write_file(
            ".jsonl",
            "{\"id\":9,\"title\":\"t\",\"abstract\":\"a\"}\n\nnot json\n",
        );
        let source = CorpusSource::detect(file.path());
        assert_eq!(source.format(), SourceFormat::JsonLines);

        let mut reader = source.open().unwrap();
        assert_eq!(reader.next().unwrap().unwrap().id, 9);
        match reader.next().unwrap() {
            Err(SourceError::Malformed { line, .. }) => assert_eq!(line, 3),
            other => panic!("expected malformed line, got {:?}", other),
        }
        assert!(reader.next().is_none());
    }

    #[test]
    fn test_detect_defaults_to_paired_lines() {
        assert_eq!(
            CorpusSource::detect("abstracts_v1.txt").format(),
            SourceFormat::PairedLines
        );
    }
}
