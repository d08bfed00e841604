//! word2vec vector file formats
//!
//! Both formats start with a `<count> <dimension>` header line. The text
//! format then has one `term v1 v2 ...` line per term; the binary format has
//! the term, a space, `dimension` little-endian `f32`s and an optional
//! newline.

use super::{EmbeddingError, InMemoryVectorSpace, VectorSpace};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;

/// Largest vector dimension a header may declare
pub const MAX_DIMENSION: usize = 1 << 16;

/// On-disk vector file layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorFormat {
    Text,
    Binary,
}

impl VectorFormat {
    /// `.bin` files are binary, anything else text.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("bin") => VectorFormat::Binary,
            _ => VectorFormat::Text,
        }
    }
}

fn parse_header(line: &str) -> Result<(usize, usize), EmbeddingError> {
    let malformed = |reason: &str| EmbeddingError::Malformed {
        line: 1,
        reason: reason.to_string(),
    };
    let mut parts = line.split_whitespace();
    let count = parts
        .next()
        .and_then(|p| p.parse().ok())
        .ok_or_else(|| malformed("expected vector count"))?;
    let dimension = parts
        .next()
        .and_then(|p| p.parse().ok())
        .ok_or_else(|| malformed("expected vector dimension"))?;
    if dimension == 0 {
        return Err(malformed("dimension must be positive"));
    }
    if dimension > MAX_DIMENSION {
        return Err(malformed("dimension exceeds supported maximum"));
    }
    Ok((count, dimension))
}

/// Load vectors, picking the format from the file extension.
pub fn load(path: impl AsRef<Path>) -> Result<InMemoryVectorSpace, EmbeddingError> {
    let path = path.as_ref();
    match VectorFormat::from_path(path) {
        VectorFormat::Text => load_text(path),
        VectorFormat::Binary => load_binary(path),
    }
}

pub fn load_text(path: impl AsRef<Path>) -> Result<InMemoryVectorSpace, EmbeddingError> {
    let mut lines = BufReader::new(File::open(path)?).lines();
    let header = match lines.next() {
        Some(line) => line?,
        None => {
            return Err(EmbeddingError::Malformed {
                line: 1,
                reason: "empty file".to_string(),
            })
        }
    };
    let (count, dimension) = parse_header(&header)?;

    let space = InMemoryVectorSpace::new();
    for (i, line) in lines.enumerate() {
        let line = line?;
        let line_no = i + 2;
        if line.trim().is_empty() {
            continue;
        }
        let mut parts = line.split_whitespace();
        let term = parts.next().unwrap_or_default();
        let vector = parts
            .map(str::parse::<f32>)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| EmbeddingError::Malformed {
                line: line_no,
                reason: e.to_string(),
            })?;
        if vector.len() != dimension {
            return Err(EmbeddingError::DimensionMismatch {
                expected: dimension,
                found: vector.len(),
            });
        }
        space.insert(term, vector)?;
    }
    if space.len() != count {
        tracing::warn!(
            header = count,
            loaded = space.len(),
            "vector count differs from header"
        );
    }
    tracing::debug!(terms = space.len(), dimension, "loaded text vectors");
    Ok(space)
}

pub fn load_binary(path: impl AsRef<Path>) -> Result<InMemoryVectorSpace, EmbeddingError> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut header = String::new();
    reader.read_line(&mut header)?;
    let (count, dimension) = parse_header(&header)?;

    let row_bytes = dimension
        .checked_mul(std::mem::size_of::<f32>())
        .ok_or_else(|| EmbeddingError::Malformed {
            line: 1,
            reason: "dimension overflows row size".to_string(),
        })?;
    let space = InMemoryVectorSpace::new();
    let mut buf = vec![0u8; row_bytes];
    for i in 0..count {
        let mut term = Vec::new();
        reader.read_until(b' ', &mut term)?;
        if term.last() != Some(&b' ') {
            return Err(EmbeddingError::Malformed {
                line: i + 2,
                reason: "truncated term".to_string(),
            });
        }
        term.pop();
        // Some writers put the separating newline before the term
        while term.first() == Some(&b'\n') {
            term.remove(0);
        }
        let term = String::from_utf8(term).map_err(|e| EmbeddingError::Malformed {
            line: i + 2,
            reason: e.to_string(),
        })?;

        reader.read_exact(&mut buf)?;
        let vector = buf
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        space.insert(term, vector)?;
    }
    tracing::debug!(terms = space.len(), dimension, "loaded binary vectors");
    Ok(space)
}

/// Write a space in the text format, in vocabulary order.
pub fn save_text(space: &InMemoryVectorSpace, path: impl AsRef<Path>) -> Result<(), EmbeddingError> {
    let mut out = BufWriter::new(File::create(path)?);
    let terms = space.vocabulary();
    writeln!(out, "{} {}", terms.len(), space.dimension().unwrap_or(0))?;
    for term in terms {
        if let Some(vector) = space.vector(&term) {
            write!(out, "{}", term)?;
            for v in vector {
                write!(out, " {}", v)?;
            }
            writeln!(out)?;
        }
    }
    out.flush()?;
    Ok(())
}

/// Write a space in the binary format, in vocabulary order.
pub fn save_binary(
    space: &InMemoryVectorSpace,
    path: impl AsRef<Path>,
) -> Result<(), EmbeddingError> {
    let mut out = BufWriter::new(File::create(path)?);
    let terms = space.vocabulary();
    writeln!(out, "{} {}", terms.len(), space.dimension().unwrap_or(0))?;
    for term in terms {
        if let Some(vector) = space.vector(&term) {
            out.write_all(term.as_bytes())?;
            out.write_all(b" ")?;
            for v in vector {
                out.write_all(&v.to_le_bytes())?;
            }
            out.write_all(b"\n")?;
        }
    }
    out.flush()?;
    Ok(())
}
