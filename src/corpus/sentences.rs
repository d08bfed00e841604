//! Tokenized sentences handed to phrase mining and embedding training

use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Lines, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Boxed iterator over tokenized sentences.
pub type Sentences<'a> = Box<dyn Iterator<Item = io::Result<Vec<String>>> + 'a>;

/// A re-readable collection of tokenized sentences.
///
/// Collocation mining makes one pass per level, so sources must support
/// being iterated more than once.
pub trait SentenceSource {
    fn sentences(&self) -> io::Result<Sentences<'_>>;
}

impl SentenceSource for [Vec<String>] {
    fn sentences(&self) -> io::Result<Sentences<'_>> {
        Ok(Box::new(self.iter().cloned().map(Ok::<_, io::Error>)))
    }
}

impl SentenceSource for Vec<Vec<String>> {
    fn sentences(&self) -> io::Result<Sentences<'_>> {
        self.as_slice().sentences()
    }
}

/// JSON-lines file with one token array per line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentenceFile {
    path: PathBuf,
}

impl SentenceFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

struct SentenceLines {
    lines: Lines<BufReader<File>>,
    line: usize,
}

impl Iterator for SentenceLines {
    type Item = io::Result<Vec<String>>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match self.lines.next()? {
                Ok(l) => l,
                Err(e) => return Some(Err(e)),
            };
            self.line += 1;
            if line.trim().is_empty() {
                continue;
            }
            let line_no = self.line;
            return Some(serde_json::from_str(&line).map_err(|e| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("line {}: {}", line_no, e),
                )
            }));
        }
    }
}

impl SentenceSource for SentenceFile {
    fn sentences(&self) -> io::Result<Sentences<'_>> {
        let file = File::open(&self.path)?;
        Ok(Box::new(SentenceLines {
            lines: BufReader::new(file).lines(),
            line: 0,
        }))
    }
}

/// Atomically write sentences as JSON lines; returns the sentence count.
pub fn write_sentences<I>(path: &Path, sentences: I) -> io::Result<usize>
where
    I: IntoIterator<Item = io::Result<Vec<String>>>,
{
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;
    let tmp = NamedTempFile::new_in(dir)?;
    let mut count = 0;
    {
        let mut writer = BufWriter::new(tmp.as_file());
        for sentence in sentences {
            serde_json::to_writer(&mut writer, &sentence?)?;
            writer.write_all(b"\n")?;
            count += 1;
        }
        writer.flush()?;
    }
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(count)
}
