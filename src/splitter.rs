//! Recursive character text splitting
//!
//! Chunks arbitrary text into pieces of at most `chunk_size` characters by
//! walking a separator hierarchy from coarse (paragraphs) to fine (single
//! characters), carrying `chunk_overlap` characters of context between chunks.

use crate::{Error, Result};

pub const DEFAULT_SEPARATORS: [&str; 8] = ["\n\n", "\n", ".", ",", ">", "<", " ", ""];

#[derive(Debug, Clone)]
pub struct RecursiveCharacterTextSplitter {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub separators: Vec<String>,
}

impl RecursiveCharacterTextSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        let splitter = Self {
            chunk_size,
            chunk_overlap,
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
        };
        splitter.validate()?;
        Ok(splitter)
    }

    pub fn with_separators(mut self, separators: Vec<String>) -> Self {
        self.separators = separators;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.chunk_overlap >= self.chunk_size {
            return Err(Error::Config(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        Ok(())
    }

    /// Split `text` into chunks of at most `chunk_size` characters.
    ///
    /// Fails only when the fields were changed after construction into an
    /// invalid combination.
    pub fn split_text(&self, text: &str) -> Result<Vec<String>> {
        self.validate()?;
        Ok(self.split_with(text, &self.separators))
    }

    fn split_with(&self, text: &str, separators: &[String]) -> Vec<String> {
        let (separator, remaining) = pick_separator(text, separators);

        if separator.is_empty() {
            return fixed_windows(text, self.chunk_size);
        }

        if separator == " " && char_len(text) <= self.chunk_size {
            return glued_words(text);
        }

        let mut chunks = Vec::new();
        let mut good_splits: Vec<&str> = Vec::new();

        for piece in text.split(separator).filter(|piece| !piece.is_empty()) {
            if char_len(piece) < self.chunk_size {
                good_splits.push(piece);
                continue;
            }

            if !good_splits.is_empty() {
                chunks.extend(self.merge_splits(&good_splits, separator));
                good_splits.clear();
            }
            chunks.extend(self.split_with(piece, remaining));
        }

        if !good_splits.is_empty() {
            chunks.extend(self.merge_splits(&good_splits, separator));
        }

        chunks
    }

    /// Greedily join `splits` with `separator` into chunks no longer than
    /// `chunk_size`, keeping trailing pieces worth `chunk_overlap` characters
    /// at the start of the next chunk.
    fn merge_splits(&self, splits: &[&str], separator: &str) -> Vec<String> {
        let separator_len = char_len(separator);
        let mut docs = Vec::new();
        let mut current: Vec<&str> = Vec::new();
        let mut total = 0usize;

        for piece in splits {
            let len = char_len(piece);
            let joiner = if current.is_empty() { 0 } else { separator_len };

            if total + joiner + len > self.chunk_size && !current.is_empty() {
                if let Some(doc) = join_docs(&current, separator) {
                    docs.push(doc);
                }

                loop {
                    let joiner = if current.is_empty() { 0 } else { separator_len };
                    let overflows = total > 0 && total + joiner + len > self.chunk_size;
                    if total <= self.chunk_overlap && !overflows {
                        break;
                    }
                    let Some(first) = current.first() else {
                        break;
                    };
                    total -= char_len(first);
                    if current.len() > 1 {
                        total -= separator_len;
                    }
                    current.remove(0);
                }
            }

            if !current.is_empty() {
                total += separator_len;
            }
            current.push(piece);
            total += len;
        }

        if let Some(doc) = join_docs(&current, separator) {
            docs.push(doc);
        }

        docs
    }
}

fn pick_separator<'a>(text: &str, separators: &'a [String]) -> (&'a str, &'a [String]) {
    for (i, separator) in separators.iter().enumerate() {
        if separator.is_empty() {
            return ("", &[]);
        }
        if text.contains(separator.as_str()) {
            return (separator.as_str(), &separators[i + 1..]);
        }
    }
    ("", &[])
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

fn join_docs(docs: &[&str], separator: &str) -> Option<String> {
    let joined = docs.join(separator);
    let trimmed = joined.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn fixed_windows(text: &str, size: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(size.max(1))
        .map(|window| window.iter().collect())
        .collect()
}

/// Word split that keeps a `(`-ending word together with a following
/// `)`-ending word.
fn glued_words(text: &str) -> Vec<String> {
    let mut tokens: Vec<String> = Vec::new();
    let mut words = text.split(' ').filter(|w| !w.is_empty()).peekable();

    while let Some(word) = words.next() {
        match words.peek() {
            Some(next) if word.ends_with('(') && next.ends_with(')') => {
                tokens.push(format!("{} {}", word, next));
                words.next();
            }
            _ => tokens.push(word.to_string()),
        }
    }

    tokens
}
