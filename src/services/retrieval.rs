use async_trait::async_trait;
use color_eyre::Result;
use std::cmp::Ordering;

use crate::services::embeddings::EmbeddingClient;
use crate::services::fuzzy::partial_score;
use crate::storage::StorageManager;

/// How many neighbours a dish lookup asks the index for
pub const SEARCH_LIMIT: usize = 7;
const RECIPE_PREFIX: &str = "وصفة ";

/// A recipe document returned by the vector index
#[derive(Debug, Clone, PartialEq)]
pub struct RecipeCandidate {
    pub title: String,
    pub document: String,
    /// Cosine distance, lower is closer
    pub distance: f32,
}

/// Nearest-neighbour lookup over the recipe collection
#[async_trait]
pub trait RecipeIndex: Send + Sync {
    /// Up to `limit` candidates ordered by ascending distance
    async fn query(&self, text: &str, limit: usize) -> Result<Vec<RecipeCandidate>>;
}

/// Recipe index backed by SurrealDB vectors and Ollama embeddings
pub struct SurrealRecipeIndex {
    storage: StorageManager,
    embeddings: EmbeddingClient,
}

impl SurrealRecipeIndex {
    pub fn new(storage: StorageManager, embeddings: EmbeddingClient) -> Self {
        Self {
            storage,
            embeddings,
        }
    }
}

#[async_trait]
impl RecipeIndex for SurrealRecipeIndex {
    async fn query(&self, text: &str, limit: usize) -> Result<Vec<RecipeCandidate>> {
        let embedding = self.embeddings.embed(text).await?;
        self.storage.search_recipes(embedding, limit).await
    }
}

/// Removes Arabic short vowels and related marks (U+064B..=U+0652)
pub fn strip_diacritics(text: &str) -> String {
    text.chars()
        .filter(|c| !('\u{064B}'..='\u{0652}').contains(c))
        .collect()
}

/// Canonical query form: no diacritics, single spaces, "وصفة " prefix
pub fn normalize_query(label: &str) -> String {
    let stripped = strip_diacritics(label);
    let collapsed = stripped.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.starts_with(RECIPE_PREFIX.trim_end()) {
        collapsed
    } else {
        format!("{}{}", RECIPE_PREFIX, collapsed)
    }
}

/// True when the closest recipe to the raw label is within `threshold`.
///
/// An empty index means "not in the knowledge base".
pub async fn is_in_knowledge_base(
    index: &dyn RecipeIndex,
    label: &str,
    threshold: f32,
) -> Result<bool> {
    let candidates = index.query(label, 1).await?;
    let closest = candidates.first().map(|candidate| candidate.distance);
    tracing::debug!(label, ?closest, threshold, "knowledge base check");
    Ok(closest.is_some_and(|distance| distance <= threshold))
}

/// Looks up a dish with the normalized query and reranks the hits
pub async fn search_recipes(index: &dyn RecipeIndex, label: &str) -> Result<Vec<RecipeCandidate>> {
    let query = normalize_query(label);
    let candidates = index.query(&query, SEARCH_LIMIT).await?;
    Ok(rerank(&query, candidates))
}

/// Orders by fuzzy match against title or body (best first), then by distance
pub fn rerank(query: &str, candidates: Vec<RecipeCandidate>) -> Vec<RecipeCandidate> {
    let mut scored: Vec<(f64, RecipeCandidate)> = candidates
        .into_iter()
        .map(|candidate| {
            let score = partial_score(query, &candidate.title)
                .max(partial_score(query, &candidate.document));
            (score, candidate)
        })
        .collect();

    scored.sort_by(|(score_a, a), (score_b, b)| {
        score_b
            .partial_cmp(score_a)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.distance.partial_cmp(&b.distance).unwrap_or(Ordering::Equal))
    });

    scored.into_iter().map(|(_, candidate)| candidate).collect()
}
