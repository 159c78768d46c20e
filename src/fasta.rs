//! FASTA flattening for multi-sequence BWT construction.
//!
//! The builder conceptually *prepends* each fed character, so to obtain
//! the standard (forward) BWT of every record the loader reverses each
//! sequence before appending it, then terminates it with the end-marker
//! byte. The result is one flat byte stream ready to feed through
//! `extend`/`sap_extend` one symbol at a time.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::error::{Error, Result};

/// A flattened multi-sequence text.
pub struct FlatText {
    /// Concatenation of reversed records, each followed by the marker.
    pub text: Vec<u8>,
    /// Number of records seen.
    pub num_seqs: u64,
}

/// Flatten an iterator of records: reverse each one, append `em` after
/// it.
pub fn flatten_records<'a, I>(records: I, em: u8) -> FlatText
where
    I: IntoIterator<Item = &'a [u8]>,
{
    let mut text = Vec::new();
    let mut num_seqs = 0u64;
    for rec in records {
        let mut r = rec.to_vec();
        r.reverse();
        text.extend_from_slice(&r);
        text.push(em);
        num_seqs += 1;
    }
    FlatText { text, num_seqs }
}

/// Load a FASTA file and flatten it with [`flatten_records`].
///
/// Header lines start with `>`; blank lines are skipped; sequence lines
/// between headers are concatenated. A file that starts with sequence
/// data (no header) is rejected.
pub fn load_fasta<P: AsRef<Path>>(path: P, em: u8) -> Result<FlatText> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let mut records: Vec<Vec<u8>> = Vec::new();
    let mut current: Option<Vec<u8>> = None;
    for line in reader.lines() {
        let line = line?;
        if line.is_empty() {
            continue;
        }
        if line.starts_with('>') {
            if let Some(seq) = current.take() {
                records.push(seq);
            }
            current = Some(Vec::new());
        } else {
            match current.as_mut() {
                Some(seq) => seq.extend_from_slice(line.trim_end().as_bytes()),
                None => {
                    return Err(Error::Parse(
                        "sequence data before the first FASTA header".into(),
                    ))
                }
            }
        }
    }
    if let Some(seq) = current.take() {
        records.push(seq);
    }
    Ok(flatten_records(records.iter().map(|r| r.as_slice()), em))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flatten_reverses_and_terminates() {
        let flat = flatten_records([&b"acgt"[..], &b"gg"[..]], 1);
        assert_eq!(flat.text, b"tgca\x01gg\x01");
        assert_eq!(flat.num_seqs, 2);
    }

    #[test]
    fn test_flatten_empty() {
        let flat = flatten_records(std::iter::empty::<&[u8]>(), 1);
        assert!(flat.text.is_empty());
        assert_eq!(flat.num_seqs, 0);
    }
}
