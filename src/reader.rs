//! Corpus document readers.
//!
//! A [`DocumentReader`] yields a finite sequence of raw documents. The
//! corpus loader runs two passes over it: one to count (for accurate
//! progress totals) and one to load, so `documents` must start a fresh
//! pass each time it is called.
//!
//! [`JsonlReader`] reads JSON-lines corpus dumps: one object per line with
//! mandatory `id` and `abstract` fields and optional `title`, `year`,
//! `authors` and `language`. Lines that are not valid JSON, or records
//! missing the mandatory fields, are skipped with a warning and counted;
//! they never abort a load. An unreadable file does abort.

use serde::Deserialize;
use std::cell::Cell;
use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::PathBuf;

use crate::error::{StoreError, StoreResult};

/// A document as produced by a reader, before storage normalization.
#[derive(Debug, Clone)]
pub struct RawDocument {
    pub identifier: String,
    pub abstract_text: String,
    pub title: Option<String>,
    pub year: Option<i64>,
    pub authors: Vec<String>,
    pub language: Option<String>,
}

/// A finite, re-iterable source of corpus documents.
pub trait DocumentReader {
    /// Start a fresh pass over the input.
    fn documents(
        &self,
    ) -> StoreResult<Box<dyn Iterator<Item = StoreResult<RawDocument>> + '_>>;

    /// Records skipped so far in the current pass.
    fn skipped(&self) -> u64 {
        0
    }
}

#[derive(Debug, Deserialize)]
struct JsonlRecord {
    id: String,
    #[serde(rename = "abstract")]
    abstract_text: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    year: Option<i64>,
    #[serde(default)]
    authors: Vec<String>,
    #[serde(default)]
    language: Option<String>,
}

/// Reader over one or more JSON-lines corpus files.
#[derive(Debug)]
pub struct JsonlReader {
    paths: Vec<PathBuf>,
    skipped: Cell<u64>,
}

impl JsonlReader {
    /// Every path must exist up front; a load should not fail halfway
    /// through because of a typo in the third file argument.
    pub fn new(paths: Vec<PathBuf>) -> StoreResult<Self> {
        if paths.is_empty() {
            return Err(StoreError::validation("no corpus files given"));
        }
        for path in &paths {
            if !path.is_file() {
                return Err(StoreError::artifact(path, "no such file"));
            }
        }
        Ok(JsonlReader {
            paths,
            skipped: Cell::new(0),
        })
    }
}

impl DocumentReader for JsonlReader {
    fn documents(
        &self,
    ) -> StoreResult<Box<dyn Iterator<Item = StoreResult<RawDocument>> + '_>> {
        self.skipped.set(0);
        Ok(Box::new(JsonlIter {
            reader: self,
            next_file: 0,
            current: None,
        }))
    }

    fn skipped(&self) -> u64 {
        self.skipped.get()
    }
}

struct JsonlIter<'a> {
    reader: &'a JsonlReader,
    next_file: usize,
    current: Option<(PathBuf, Lines<BufReader<File>>)>,
}

impl Iterator for JsonlIter<'_> {
    type Item = StoreResult<RawDocument>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.current.is_none() {
                let path = self.reader.paths.get(self.next_file)?.clone();
                self.next_file += 1;
                match File::open(&path) {
                    Ok(file) => {
                        self.current = Some((path, BufReader::new(file).lines()));
                    }
                    Err(err) => return Some(Err(StoreError::artifact(path, err))),
                }
            }

            let line = match self.current.as_mut() {
                Some((_, lines)) => lines.next(),
                None => None,
            };

            match line {
                None => {
                    self.current = None;
                    continue;
                }
                Some(Err(err)) => {
                    let (path, _) = self.current.take()?;
                    return Some(Err(StoreError::artifact(path, err)));
                }
                Some(Ok(text)) => {
                    if text.trim().is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<JsonlRecord>(&text) {
                        Ok(record)
                            if !record.id.trim().is_empty()
                                && !record.abstract_text.trim().is_empty() =>
                        {
                            return Some(Ok(RawDocument {
                                identifier: record.id,
                                abstract_text: record.abstract_text,
                                title: record.title,
                                year: record.year,
                                authors: record.authors,
                                language: record.language,
                            }));
                        }
                        Ok(record) => {
                            tracing::warn!(
                                identifier = %record.id,
                                "skipping corpus record with empty id or abstract"
                            );
                            self.reader.skipped.set(self.reader.skipped.get() + 1);
                        }
                        Err(err) => {
                            tracing::warn!(%err, "skipping malformed corpus line");
                            self.reader.skipped.set(self.reader.skipped.get() + 1);
                        }
                    }
                }
            }
        }
    }
}
