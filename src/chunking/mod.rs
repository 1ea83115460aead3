//! Chunk building: label each fetched file with its path, then split it with
//! the recursive splitter.

pub mod splitter;

pub use splitter::{RecursiveSplitter, SplitterConfig};

use crate::models::{Chunk, RepoFile};

/// The text block a file contributes to the corpus.
pub fn label_file(file: &RepoFile) -> String {
    format!("File: {}\n\n{}", file.path, file.content)
}

/// Split every file into chunks. Chunks never span two files and keep the
/// fetch order.
pub fn build_chunks(files: &[RepoFile], splitter: &RecursiveSplitter) -> Vec<Chunk> {
    files
        .iter()
        .flat_map(|file| {
            splitter
                .split(&label_file(file))
                .into_iter()
                .enumerate()
                .map(|(i, content)| Chunk {
                    file_path: file.path.clone(),
                    chunk_index: i,
                    content,
                })
        })
        .collect()
}
