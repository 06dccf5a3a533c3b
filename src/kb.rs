//! Knowledge retrieval contract and a small in-memory implementation.

use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;

use crate::Result;

pub const DEFAULT_CHUNK_SIZE: usize = 500;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KbSource {
    pub title: String,
    pub score: f64,
}

impl KbSource {
    pub fn new(title: impl Into<String>, score: f64) -> Self {
        Self {
            title: title.into(),
            score,
        }
    }
}

/// Retrieved context with its sources, best first.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct KbAnswer {
    pub context: String,
    pub sources: Vec<KbSource>,
}

impl KbAnswer {
    /// Scores are clamped into `[0, 1]` (NaN becomes 0) and sources sorted descending.
    #[must_use]
    pub fn new(context: impl Into<String>, mut sources: Vec<KbSource>) -> Self {
        for source in &mut sources {
            source.score = if source.score.is_nan() {
                0.0
            } else {
                source.score.clamp(0.0, 1.0)
            };
        }
        sources.sort_by(|a, b| b.score.total_cmp(&a.score));
        Self {
            context: context.into(),
            sources,
        }
    }

    #[must_use]
    pub fn top_confidence(&self) -> f64 {
        self.sources.first().map_or(0.0, |source| source.score)
    }
}

#[async_trait]
pub trait KnowledgeBase: Send + Sync {
    async fn search(&self, question: &str, language: &str, top_k: usize) -> Result<KbAnswer>;
}

/// Split on blank lines and merge paragraphs while they fit in `max_len` bytes.
///
/// A paragraph longer than `max_len` starts its own chunk, truncated on a char boundary.
#[must_use]
pub fn chunk_text(text: &str, max_len: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    for para in text.split("\n\n").map(str::trim).filter(|p| !p.is_empty()) {
        if current.is_empty() {
            current = truncate(para, max_len).to_string();
        } else if current.len() + para.len() + 2 <= max_len {
            current.push_str("\n\n");
            current.push_str(para);
        } else {
            chunks.push(std::mem::take(&mut current));
            current = truncate(para, max_len).to_string();
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

fn truncate(s: &str, max_len: usize) -> &str {
    if s.len() <= max_len {
        return s;
    }
    let mut end = max_len;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Cosine of the angle between two vectors; 0 when either is zero or lengths differ.
#[must_use]
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    if a.len() != b.len() {
        return 0.0;
    }
    let (mut dot, mut norm_a, mut norm_b) = (0.0, 0.0, 0.0);
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

fn terms(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() > 1)
        .map(str::to_lowercase)
}

#[derive(Debug, Clone)]
struct Chunk {
    title: String,
    language: String,
    text: String,
    counts: HashMap<String, f64>,
}

/// Term-frequency retrieval over documents held in memory.
#[derive(Debug, Clone, Default)]
pub struct KeywordKnowledgeBase {
    chunks: Vec<Chunk>,
    chunk_size: usize,
}

impl KeywordKnowledgeBase {
    #[must_use]
    pub fn new() -> Self {
        Self {
            chunks: Vec::new(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    #[must_use]
    pub const fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Chunk and index a document. Returns how many chunks were added.
    pub fn add_document(&mut self, title: &str, language: &str, text: &str) -> usize {
        let before = self.chunks.len();
        for chunk in chunk_text(text, self.chunk_size) {
            let mut counts = HashMap::new();
            for term in terms(&chunk) {
                *counts.entry(term).or_insert(0.0) += 1.0;
            }
            self.chunks.push(Chunk {
                title: title.to_string(),
                language: language.to_ascii_lowercase(),
                text: chunk,
                counts,
            });
        }
        self.chunks.len() - before
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    fn score(query: &HashMap<String, f64>, chunk: &Chunk) -> f64 {
        let mut vocab: Vec<&String> = query.keys().chain(chunk.counts.keys()).collect();
        vocab.sort();
        vocab.dedup();
        let a: Vec<f64> = vocab.iter().map(|t| query.get(*t).copied().unwrap_or(0.0)).collect();
        let b: Vec<f64> = vocab
            .iter()
            .map(|t| chunk.counts.get(*t).copied().unwrap_or(0.0))
            .collect();
        cosine_similarity(&a, &b)
    }
}

#[async_trait]
impl KnowledgeBase for KeywordKnowledgeBase {
    async fn search(&self, question: &str, language: &str, top_k: usize) -> Result<KbAnswer> {
        let mut query = HashMap::new();
        for term in terms(question) {
            *query.entry(term).or_insert(0.0) += 1.0;
        }
        if query.is_empty() || top_k == 0 {
            return Ok(KbAnswer::default());
        }

        let language = language.to_ascii_lowercase();
        let mut hits: Vec<(f64, &Chunk)> = self
            .chunks
            .iter()
            .filter(|chunk| chunk.language == language)
            .map(|chunk| (Self::score(&query, chunk), chunk))
            .filter(|(score, _)| *score > 0.0)
            .collect();
        hits.sort_by(|a, b| b.0.total_cmp(&a.0));
        hits.truncate(top_k);

        let context = hits
            .iter()
            .map(|(_, chunk)| chunk.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        let sources = hits
            .iter()
            .map(|(score, chunk)| KbSource::new(chunk.title.clone(), *score))
            .collect();
        Ok(KbAnswer::new(context, sources))
    }
}
