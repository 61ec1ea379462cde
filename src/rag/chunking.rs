//! Text cleanup and chunking for uploaded documents.

use text_splitter::{Characters, ChunkConfig, TextSplitter};

/// Normalize extracted document text.
///
/// Non-breaking spaces become spaces, line endings become `\n`, each line is
/// trimmed, runs of spaces and tabs collapse to one space and runs of blank
/// lines collapse to a single blank line.
pub fn clean_text(text: &str) -> String {
    let text = text
        .replace('\u{a0}', " ")
        .replace("\r\n", "\n")
        .replace('\r', "\n");

    let mut out = String::with_capacity(text.len());
    let mut blank_run = 0;
    for line in text.lines() {
        let line = collapse_spaces(line.trim());
        if line.is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        out.push_str(&line);
        out.push('\n');
    }
    out.trim().to_string()
}

fn collapse_spaces(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut in_gap = false;
    for c in line.chars() {
        if c == ' ' || c == '\t' {
            if !in_gap {
                out.push(' ');
            }
            in_gap = true;
        } else {
            out.push(c);
            in_gap = false;
        }
    }
    out
}

/// Splits cleaned text into overlapping character-bounded chunks.
pub struct Chunker {
    size: usize,
    overlap: usize,
    splitter: TextSplitter<Characters>,
}

impl std::fmt::Debug for Chunker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chunker")
            .field("size", &self.size)
            .field("overlap", &self.overlap)
            .finish()
    }
}

impl Chunker {
    /// Chunks of at most `size` characters, consecutive chunks sharing up to
    /// `overlap` characters.
    ///
    /// # Errors
    ///
    /// Fails when `size` is zero or `overlap` is not smaller than `size`.
    pub fn new(size: usize, overlap: usize) -> anyhow::Result<Self> {
        if size == 0 {
            anyhow::bail!("chunk size must be positive");
        }
        let config = ChunkConfig::new(size)
            .with_sizer(Characters)
            .with_trim(true)
            .with_overlap(overlap)
            .map_err(|e| anyhow::anyhow!("invalid chunk overlap {overlap} for size {size}: {e}"))?;

        Ok(Self {
            size,
            overlap,
            splitter: TextSplitter::new(config),
        })
    }

    /// Clean `text` and split it. Blank documents yield no chunks.
    pub fn chunk(&self, text: &str) -> Vec<String> {
        let text = clean_text(text);
        if text.is_empty() {
            return Vec::new();
        }
        self.splitter
            .chunks(&text)
            .map(ToString::to_string)
            .filter(|c| !c.is_empty())
            .collect()
    }

    /// Maximum characters per chunk.
    pub fn size(&self) -> usize {
        self.size
    }
}
