use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs;
use std::path::{Path, PathBuf};

use ragdb_core::config::IngestSettings;
use ragdb_core::terms::estimate_tokens;
use ragdb_core::traits::Embedder;
use ragdb_core::types::Document;
use ragdb_hybrid::DocumentIndex;

/// A piece of a source file small enough to embed and index on its own.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: String,
    pub doc_id: String,
    pub doc_path: String,
    pub category: String,
    pub text: String,
    pub chunk_index: usize,
    pub total_chunks: usize,
}

impl Chunk {
    pub fn into_document(self, embedding: Vec<f32>) -> Document {
        Document::new(self.id, self.text, embedding)
            .with_meta("doc_id", self.doc_id)
            .with_meta("doc_path", self.doc_path)
            .with_meta("category", self.category)
            .with_meta("chunk_index", self.chunk_index as u64)
    }
}

/// Splits `.txt` files into paragraph chunks; paragraphs over the token
/// limit become overlapping word windows.
pub struct Chunker {
    max_tokens: usize,
    overlap_percent: f32,
}

impl Chunker {
    pub fn new(settings: &IngestSettings) -> Self {
        Self { max_tokens: settings.max_tokens.max(1), overlap_percent: settings.overlap_percent }
    }

    pub fn process_directory(&self, data_dir: &Path) -> Result<Vec<Chunk>> {
        let files = list_txt_files(data_dir);
        if files.is_empty() {
            tracing::warn!(dir = %data_dir.display(), "no .txt files found");
            return Ok(vec![]);
        }
        let mut all_chunks = Vec::new();
        for file_path in &files {
            let content = read_file_content(file_path)?;
            let doc_id = extract_doc_id(file_path, data_dir);
            let category = category_from_path(file_path, data_dir);
            all_chunks.extend(self.chunk_content(&content, &doc_id, file_path, &category));
        }
        tracing::info!(files = files.len(), chunks = all_chunks.len(), "chunked corpus");
        Ok(all_chunks)
    }

    pub fn chunk_content(&self, content: &str, doc_id: &str, file_path: &Path, category: &str) -> Vec<Chunk> {
        let mut pieces = Vec::new();
        for paragraph in content.split("\n\n").map(str::trim).filter(|p| !p.is_empty()) {
            if estimate_tokens(paragraph) <= self.max_tokens {
                pieces.push(paragraph.to_string());
            } else {
                pieces.extend(self.split_paragraph_with_overlap(paragraph));
            }
        }
        let total_chunks = pieces.len();
        pieces
            .into_iter()
            .enumerate()
            .map(|(chunk_index, text)| Chunk {
                id: format!("{doc_id}:{chunk_index}"),
                doc_id: doc_id.to_string(),
                doc_path: file_path.to_string_lossy().to_string(),
                category: category.to_string(),
                text,
                chunk_index,
                total_chunks,
            })
            .collect()
    }

    fn split_paragraph_with_overlap(&self, paragraph: &str) -> Vec<String> {
        let words: Vec<&str> = paragraph.split_whitespace().collect();
        let words_per_chunk = ((self.max_tokens as f32 * 0.75) as usize).max(1);
        let overlap_words = ((words_per_chunk as f32 * self.overlap_percent) as usize).min(words_per_chunk - 1);
        let mut chunks = Vec::new();
        let mut start = 0;
        while start < words.len() {
            let end = (start + words_per_chunk).min(words.len());
            chunks.push(words[start..end].join(" "));
            if end >= words.len() { break; }
            start = end - overlap_words;
        }
        chunks
    }
}

fn read_file_content(file_path: &Path) -> Result<String> {
    match fs::read_to_string(file_path) {
        Ok(content) => Ok(content),
        Err(_) => Ok(String::from_utf8_lossy(&fs::read(file_path)?).to_string()),
    }
}

/// Path relative to the data dir, without extension, so equal file names in
/// different folders stay distinct.
fn extract_doc_id(file_path: &Path, data_dir: &Path) -> String {
    let relative = file_path.strip_prefix(data_dir).unwrap_or(file_path);
    relative.with_extension("").to_string_lossy().replace(std::path::MAIN_SEPARATOR, "/")
}

fn category_from_path(file_path: &Path, data_dir: &Path) -> String {
    let relative = file_path.strip_prefix(data_dir).unwrap_or(file_path);
    match relative.parent().and_then(Path::to_str) {
        Some(parent) if !parent.is_empty() => parent.replace(std::path::MAIN_SEPARATOR, "/"),
        _ => "misc".to_string(),
    }
}

pub fn list_txt_files(root: &Path) -> Vec<PathBuf> {
    let mut txt_files: Vec<PathBuf> = walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.path().to_path_buf())
        .filter(|p| p.extension().and_then(|s| s.to_str()) == Some("txt"))
        .collect();
    txt_files.sort();
    txt_files
}

/// Embeds and upserts every chunk, reporting progress on stderr.
pub async fn index_chunks(index: &DocumentIndex, embedder: &dyn Embedder, chunks: Vec<Chunk>) -> Result<usize> {
    let pb = ProgressBar::new(chunks.len() as u64);
    pb.set_style(
        ProgressStyle::with_template("{spinner} indexing [{bar:40}] {pos}/{len} ({eta})")?
            .progress_chars("=> "),
    );
    let mut indexed = 0;
    for chunk in chunks {
        let embedding = embedder.embed(&chunk.text).await?;
        index.upsert(chunk.into_document(embedding)).await?;
        indexed += 1;
        pb.inc(1);
    }
    pb.finish_and_clear();
    Ok(indexed)
}
