//! Offline semantic index persisted as LightRAG-style JSON key/value stores.
//!
//! Stores are loaded on `initialize_storages`, mutated in memory, and written back
//! on `finalize_storages` through a temp file + rename per store.

use crate::chunking::{chunk_by_paragraph, ChunkingConfig};
use crate::ingest::truncate_chars;
use crate::inspector::{parse_document_marker, ENTITIES_STORE, FULL_DOCS_STORE, TEXT_CHUNKS_STORE};
use crate::traits::SemanticIndex;
use crate::{SearchMode, ServiceError};
use async_trait::async_trait;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

pub const CHUNK_VECTORS_STORE: &str = "vdb_chunks.json";

const DEFAULT_TOP_K: usize = 5;
const VECTOR_DIMENSIONS: usize = 128;
const EXCERPT_CHARS: usize = 500;
const ENTITY_PATTERN: &str = r"\b[A-Z][A-Za-z0-9]+(?:[ -][A-Z][A-Za-z0-9]+)*\b";
const ENTITY_STOPWORDS: [&str; 16] = [
    "the", "this", "that", "these", "there", "page", "document", "when", "what", "which",
    "and", "for", "with", "from", "our", "its",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChunkRecord {
    content: String,
    full_doc_id: String,
    chunk_order_index: usize,
    tokens: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct EntityRecord {
    entity_name: String,
    chunk_ids: BTreeSet<String>,
}

#[derive(Debug, Default)]
struct LocalState {
    full_docs: BTreeMap<String, String>,
    chunks: BTreeMap<String, ChunkRecord>,
    entities: BTreeMap<String, EntityRecord>,
    vectors: BTreeMap<String, Vec<f32>>,
    dirty: bool,
}

#[derive(Debug, Clone)]
struct Ranked {
    chunk_id: String,
    score: f64,
}

pub struct LocalIndex {
    storage_dir: PathBuf,
    chunking: ChunkingConfig,
    entity_pattern: Regex,
    top_k: usize,
    state: Mutex<Option<LocalState>>,
}

impl LocalIndex {
    pub fn open(storage_dir: impl Into<PathBuf>) -> Result<Self, ServiceError> {
        Ok(Self {
            storage_dir: storage_dir.into(),
            chunking: ChunkingConfig::default(),
            entity_pattern: Regex::new(ENTITY_PATTERN)?,
            top_k: DEFAULT_TOP_K,
            state: Mutex::new(None),
        })
    }

    fn extract_entities(&self, text: &str) -> BTreeMap<String, String> {
        self.entity_pattern
            .find_iter(text)
            .filter_map(|found| {
                let name = found
                    .as_str()
                    .split(' ')
                    .skip_while(|word| ENTITY_STOPWORDS.contains(&word.to_lowercase().as_str()))
                    .collect::<Vec<_>>()
                    .join(" ");
                (name.chars().count() >= 3).then_some(name)
            })
            .map(|name| (name.to_lowercase(), name))
            .collect()
    }

    fn rank_naive(&self, state: &LocalState, query: &str) -> Vec<Ranked> {
        let query_vector = trigram_vector(query);
        let mut ranked: Vec<Ranked> = state
            .vectors
            .iter()
            .map(|(chunk_id, vector)| Ranked {
                chunk_id: chunk_id.clone(),
                score: f64::from(cosine_similarity(&query_vector, vector)),
            })
            .filter(|hit| hit.score > 0.0)
            .collect();
        sort_ranked(&mut ranked);
        ranked
    }

    fn rank_local(&self, state: &LocalState, query: &str) -> Vec<Ranked> {
        let query_words: BTreeSet<String> = query
            .split(|ch: char| !ch.is_alphanumeric() && ch != '-')
            .filter(|word| !word.is_empty())
            .map(str::to_lowercase)
            .collect();

        let mut overlap: HashMap<String, f64> = HashMap::new();
        for (key, entity) in &state.entities {
            let words: Vec<&str> = key.split([' ', '-']).collect();
            if words.iter().all(|word| query_words.contains(*word)) {
                for chunk_id in &entity.chunk_ids {
                    *overlap.entry(chunk_id.clone()).or_insert(0.0) += words.len() as f64;
                }
            }
        }

        if overlap.is_empty() {
            debug!("no entity in query matched the store, falling back to passage similarity");
            return self.rank_naive(state, query);
        }

        let query_vector = trigram_vector(query);
        let mut ranked: Vec<Ranked> = overlap
            .into_iter()
            .map(|(chunk_id, score)| {
                let similarity = state
                    .vectors
                    .get(&chunk_id)
                    .map(|vector| cosine_similarity(&query_vector, vector))
                    .unwrap_or(0.0);
                Ranked {
                    chunk_id,
                    score: score + f64::from(similarity) * 0.1,
                }
            })
            .collect();
        sort_ranked(&mut ranked);
        ranked
    }

    fn rank_global(&self, state: &LocalState, query: &str) -> Vec<Ranked> {
        let mut best_per_document: HashMap<&str, Ranked> = HashMap::new();
        for hit in self.rank_naive(state, query) {
            let Some(chunk) = state.chunks.get(&hit.chunk_id) else {
                continue;
            };
            best_per_document
                .entry(chunk.full_doc_id.as_str())
                .and_modify(|best| {
                    if hit.score > best.score {
                        *best = hit.clone();
                    }
                })
                .or_insert(hit);
        }

        let mut ranked: Vec<Ranked> = best_per_document.into_values().collect();
        sort_ranked(&mut ranked);
        ranked
    }

    fn rank_hybrid(&self, state: &LocalState, query: &str) -> Vec<Ranked> {
        let mut fused = HashMap::<String, f64>::new();
        apply_rrf(&mut fused, &self.rank_local(state, query), 0.5);
        apply_rrf(&mut fused, &self.rank_global(state, query), 0.5);

        let mut ranked: Vec<Ranked> = fused
            .into_iter()
            .map(|(chunk_id, score)| Ranked { chunk_id, score })
            .collect();
        sort_ranked(&mut ranked);
        ranked
    }

    fn render_answer(&self, state: &LocalState, mode: SearchMode, ranked: &[Ranked]) -> String {
        if ranked.is_empty() {
            return "No relevant passages found in the indexed documents.".to_string();
        }

        let mut answer = format!("Top passages ({mode} mode):");
        for (position, hit) in ranked.iter().take(self.top_k).enumerate() {
            let Some(chunk) = state.chunks.get(&hit.chunk_id) else {
                continue;
            };
            let source = state
                .full_docs
                .get(&chunk.full_doc_id)
                .and_then(|text| parse_document_marker(text))
                .unwrap_or_else(|| chunk.full_doc_id.clone());

            answer.push_str(&format!(
                "\n\n[{}] {} (score {:.4})\n{}",
                position + 1,
                source,
                hit.score,
                truncate_chars(&chunk.content, EXCERPT_CHARS)
            ));
        }
        answer
    }
}

#[async_trait]
impl SemanticIndex for LocalIndex {
    async fn initialize_storages(&self) -> Result<(), ServiceError> {
        let mut guard = self.state.lock().await;
        if guard.is_some() {
            debug!(storage_dir = %self.storage_dir.display(), "storages already initialized");
            return Ok(());
        }

        tokio::fs::create_dir_all(&self.storage_dir).await?;
        let state = LocalState {
            full_docs: load_store(&self.storage_dir.join(FULL_DOCS_STORE)).await?,
            chunks: load_store(&self.storage_dir.join(TEXT_CHUNKS_STORE)).await?,
            entities: load_store(&self.storage_dir.join(ENTITIES_STORE)).await?,
            vectors: load_store(&self.storage_dir.join(CHUNK_VECTORS_STORE)).await?,
            dirty: false,
        };
        debug!(
            storage_dir = %self.storage_dir.display(),
            documents = state.full_docs.len(),
            chunks = state.chunks.len(),
            "local storages loaded"
        );
        *guard = Some(state);
        Ok(())
    }

    async fn finalize_storages(&self) -> Result<(), ServiceError> {
        let Some(state) = self.state.lock().await.take() else {
            warn!(storage_dir = %self.storage_dir.display(), "finalize without initialize");
            return Ok(());
        };

        if !state.dirty {
            return Ok(());
        }

        save_store(&self.storage_dir.join(FULL_DOCS_STORE), &state.full_docs).await?;
        save_store(&self.storage_dir.join(TEXT_CHUNKS_STORE), &state.chunks).await?;
        save_store(&self.storage_dir.join(ENTITIES_STORE), &state.entities).await?;
        save_store(&self.storage_dir.join(CHUNK_VECTORS_STORE), &state.vectors).await?;
        info!(
            storage_dir = %self.storage_dir.display(),
            documents = state.full_docs.len(),
            chunks = state.chunks.len(),
            entities = state.entities.len(),
            "local storages flushed"
        );
        Ok(())
    }

    async fn insert(&self, text: &str) -> Result<(), ServiceError> {
        let mut guard = self.state.lock().await;
        let state = guard
            .as_mut()
            .ok_or_else(|| ServiceError::NotReady("insert before initialize".to_string()))?;

        let doc_id = format!("doc-{}", sha256_hex(text.as_bytes()));
        if state.full_docs.contains_key(&doc_id) {
            debug!(%doc_id, "identical document already stored");
            return Ok(());
        }

        let passages = chunk_by_paragraph(text, self.chunking);
        if passages.is_empty() {
            return Err(ServiceError::Request("document has no indexable text".to_string()));
        }

        let mut chunks = Vec::with_capacity(passages.len());
        for (order, content) in passages.into_iter().enumerate() {
            let chunk_id = format!(
                "chunk-{}",
                sha256_hex(format!("{doc_id}:{order}:{content}").as_bytes())
            );
            let vector = trigram_vector(&content);
            let entities = self.extract_entities(&content);
            chunks.push((chunk_id, content, vector, entities));
        }

        for (order, (chunk_id, content, vector, entities)) in chunks.into_iter().enumerate() {
            for (key, name) in entities {
                state
                    .entities
                    .entry(key)
                    .or_insert_with(|| EntityRecord {
                        entity_name: name,
                        chunk_ids: BTreeSet::new(),
                    })
                    .chunk_ids
                    .insert(chunk_id.clone());
            }
            state.vectors.insert(chunk_id.clone(), vector);
            state.chunks.insert(
                chunk_id,
                ChunkRecord {
                    tokens: content.split_whitespace().count(),
                    content,
                    full_doc_id: doc_id.clone(),
                    chunk_order_index: order,
                },
            );
        }
        state.full_docs.insert(doc_id, text.to_string());
        state.dirty = true;
        Ok(())
    }

    async fn query(&self, text: &str, mode: SearchMode) -> Result<String, ServiceError> {
        let guard = self.state.lock().await;
        let state = guard
            .as_ref()
            .ok_or_else(|| ServiceError::NotReady("query before initialize".to_string()))?;

        let ranked = match mode {
            SearchMode::Naive => self.rank_naive(state, text),
            SearchMode::Local => self.rank_local(state, text),
            SearchMode::Global => self.rank_global(state, text),
            SearchMode::Hybrid => self.rank_hybrid(state, text),
        };

        Ok(self.render_answer(state, mode, &ranked))
    }
}

fn apply_rrf(target: &mut HashMap<String, f64>, ranked: &[Ranked], weight: f64) {
    const K: f64 = 60.0;
    for (position, hit) in ranked.iter().enumerate() {
        let rank_component = 1.0 / (K + (position as f64 + 1.0));
        *target.entry(hit.chunk_id.clone()).or_insert(0.0) += weight * rank_component;
    }
}

fn sort_ranked(ranked: &mut [Ranked]) {
    ranked.sort_by(|left, right| {
        right
            .score
            .total_cmp(&left.score)
            .then_with(|| left.chunk_id.cmp(&right.chunk_id))
    });
}

/// Counts hashed character trigrams into a fixed-width, unit-length vector.
fn trigram_vector(text: &str) -> Vec<f32> {
    let mut vector = vec![0f32; VECTOR_DIMENSIONS];
    let chars: Vec<char> = text.to_lowercase().chars().collect();

    for trigram in chars.windows(3) {
        let mut hasher = Sha256::new();
        for ch in trigram {
            hasher.update(ch.encode_utf8(&mut [0u8; 4]).as_bytes());
        }
        let digest = hasher.finalize();
        let bucket = u16::from_le_bytes([digest[0], digest[1]]) as usize % VECTOR_DIMENSIONS;
        vector[bucket] += 1.0;
    }

    let norm = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
    if norm > 0.0 {
        vector.iter_mut().for_each(|value| *value /= norm);
    }
    vector
}

fn cosine_similarity(left: &[f32], right: &[f32]) -> f32 {
    if left.len() != right.len() {
        return 0.0;
    }
    let dot: f32 = left.iter().zip(right).map(|(l, r)| l * r).sum();
    let norms = left.iter().map(|v| v * v).sum::<f32>().sqrt()
        * right.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norms > 0.0 {
        dot / norms
    } else {
        0.0
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

async fn load_store<T>(path: &Path) -> Result<BTreeMap<String, T>, ServiceError>
where
    T: DeserializeOwned,
{
    match tokio::fs::read_to_string(path).await {
        Ok(raw) if raw.trim().is_empty() => Ok(BTreeMap::new()),
        Ok(raw) => Ok(serde_json::from_str(&raw)?),
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
        Err(error) => Err(error.into()),
    }
}

async fn save_store<T>(path: &Path, records: &BTreeMap<String, T>) -> Result<(), ServiceError>
where
    T: Serialize,
{
    let serialized = serde_json::to_string_pretty(records)?;
    let staging = path.with_extension("json.tmp");
    tokio::fs::write(&staging, serialized).await?;
    tokio::fs::rename(&staging, path).await?;
    Ok(())
}
