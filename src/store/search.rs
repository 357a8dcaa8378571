//! Keyword, vector, and hybrid search over the knowledge store.
//!
//! Keyword search rides FTS5's bm25 ranking. Vector search is brute force:
//! all embeddings for the model are pulled and scored by dot product against
//! the unit-normalized query, with an optional category pre-filter. Hybrid
//! search runs both and fuses the ranked lists with Reciprocal Rank Fusion;
//! a source that fails or returns nothing is simply left out.

use rustc_hash::{FxHashMap, FxHashSet};
use sqlx::Row;
use tracing::{instrument, warn};

use crate::error::Result;
use crate::record::ItemCategory;
use crate::store::{decode_embedding, KnowledgeStore};

const RRF_K: f64 = 60.0;

/// One search result, carrying the item row plus session context.
#[derive(Clone, Debug, sqlx::FromRow)]
pub struct SearchHit {
    #[sqlx(rename = "id")]
    pub item_id: i64,
    pub session_id: String,
    pub category: String,
    pub content: String,
    pub detail: Option<String>,
    pub owner: Option<String>,
    pub date: Option<String>,
    pub project_key: String,
    pub extracted_at: Option<String>,
    #[sqlx(default)]
    pub score: f64,
}

const HIT_COLUMNS: &str = "i.id, i.session_id, i.category, i.content, i.detail, i.owner, \
                           i.date, s.project_key, s.extracted_at";

impl KnowledgeStore {
    /// Full-text search via FTS5, best (lowest bm25 rank) first.
    #[instrument(skip(self))]
    pub async fn search_keyword(
        &self,
        query: &str,
        category: Option<ItemCategory>,
        limit: u32,
    ) -> Result<Vec<SearchHit>> {
        let sql = format!(
            "SELECT {HIT_COLUMNS}, items_fts.rank AS score \
             FROM items_fts \
             JOIN items i ON i.id = items_fts.rowid \
             JOIN sessions s ON s.id = i.session_id \
             WHERE items_fts MATCH ?1 {} \
             ORDER BY items_fts.rank LIMIT ?2",
            if category.is_some() {
                "AND i.category = ?3"
            } else {
                ""
            }
        );
        let mut q = sqlx::query_as::<_, SearchHit>(&sql).bind(query).bind(limit);
        if let Some(category) = category {
            q = q.bind(category.as_str());
        }
        Ok(q.fetch_all(&self.pool).await?)
    }

    /// Brute-force cosine search over stored embeddings for `model`.
    ///
    /// Stored vectors are unit length by contract, but both sides are
    /// normalized here so stale rows cannot skew scores. A zero query vector
    /// matches nothing.
    #[instrument(skip_all, fields(model, limit))]
    pub async fn search_vector(
        &self,
        query_embedding: &[f32],
        category: Option<ItemCategory>,
        limit: u32,
        model: &str,
    ) -> Result<Vec<SearchHit>> {
        let norm = query_embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm == 0.0 {
            return Ok(Vec::new());
        }
        let query: Vec<f32> = query_embedding.iter().map(|x| x / norm).collect();

        let rows = sqlx::query(
            "SELECT item_id, embedding FROM item_embeddings WHERE model = ?1 ORDER BY item_id",
        )
        .bind(model)
        .fetch_all(&self.pool)
        .await?;
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let allowed: Option<FxHashSet<i64>> = match category {
            Some(category) => {
                let ids: Vec<i64> = sqlx::query_scalar(
                    "SELECT e.item_id FROM item_embeddings e \
                     JOIN items i ON i.id = e.item_id \
                     WHERE i.category = ?1 AND e.model = ?2",
                )
                .bind(category.as_str())
                .bind(model)
                .fetch_all(&self.pool)
                .await?;
                Some(ids.into_iter().collect())
            }
            None => None,
        };

        let mut scored: Vec<(i64, f64)> = Vec::with_capacity(rows.len());
        for row in &rows {
            let item_id: i64 = row.get("item_id");
            if let Some(allowed) = &allowed {
                if !allowed.contains(&item_id) {
                    continue;
                }
            }
            let stored = decode_embedding(row.get::<&[u8], _>("embedding"));
            if stored.len() != query.len() {
                continue;
            }
            let stored_norm = stored.iter().map(|x| x * x).sum::<f32>().sqrt();
            let divisor = if stored_norm == 0.0 { 1.0 } else { stored_norm };
            let dot: f32 = stored.iter().zip(&query).map(|(a, b)| a * b).sum();
            scored.push((item_id, f64::from(dot / divisor)));
        }

        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        scored.truncate(limit as usize);

        let mut hits = Vec::with_capacity(scored.len());
        for (item_id, score) in scored {
            if let Some(mut hit) = self.get_item(item_id).await? {
                hit.score = score;
                hits.push(hit);
            }
        }
        Ok(hits)
    }

    /// Keyword + vector search fused with Reciprocal Rank Fusion.
    ///
    /// Either source failing is logged and dropped; the other still answers.
    /// With no embedding (or both sources empty) this degrades to whatever
    /// the surviving list holds, rescored by RRF.
    #[instrument(skip_all, fields(limit))]
    pub async fn search_hybrid(
        &self,
        query: &str,
        query_embedding: Option<&[f32]>,
        category: Option<ItemCategory>,
        limit: u32,
        model: &str,
    ) -> Result<Vec<SearchHit>> {
        let mut ranked_lists = Vec::new();

        match self.search_keyword(query, category, limit).await {
            Ok(hits) if !hits.is_empty() => ranked_lists.push(hits),
            Ok(_) => {}
            Err(error) => warn!(%error, "keyword search failed, continuing with vector only"),
        }

        if let Some(embedding) = query_embedding {
            match self.search_vector(embedding, category, limit, model).await {
                Ok(hits) if !hits.is_empty() => ranked_lists.push(hits),
                Ok(_) => {}
                Err(error) => warn!(%error, "vector search failed, continuing with keyword only"),
            }
        }

        let mut merged = rrf_merge(ranked_lists);
        merged.truncate(limit as usize);
        Ok(merged)
    }

    /// Single item with its session context.
    pub async fn get_item(&self, item_id: i64) -> Result<Option<SearchHit>> {
        let sql = format!(
            "SELECT {HIT_COLUMNS}, 0.0 AS score \
             FROM items i \
             JOIN sessions s ON s.id = i.session_id \
             WHERE i.id = ?1"
        );
        Ok(sqlx::query_as::<_, SearchHit>(&sql)
            .bind(item_id)
            .fetch_optional(&self.pool)
            .await?)
    }
}

/// Merge ranked lists by summing reciprocal ranks, highest total first.
/// Ties break toward the lower item id for stable output.
fn rrf_merge(ranked_lists: Vec<Vec<SearchHit>>) -> Vec<SearchHit> {
    let mut scores: FxHashMap<i64, f64> = FxHashMap::default();
    let mut hits: FxHashMap<i64, SearchHit> = FxHashMap::default();

    for list in ranked_lists {
        for (rank, hit) in list.into_iter().enumerate() {
            let reciprocal = 1.0 / (RRF_K + (rank + 1) as f64);
            *scores.entry(hit.item_id).or_insert(0.0) += reciprocal;
            hits.entry(hit.item_id).or_insert(hit);
        }
    }

    let mut merged: Vec<SearchHit> = hits
        .into_values()
        .map(|mut hit| {
            hit.score = scores[&hit.item_id];
            hit
        })
        .collect();
    merged.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.item_id.cmp(&b.item_id)));
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(item_id: i64) -> SearchHit {
        SearchHit {
            item_id,
            session_id: "s".into(),
            category: "concept".into(),
            content: format!("item {item_id}"),
            detail: None,
            owner: None,
            date: None,
            project_key: "p".into(),
            extracted_at: None,
            score: 0.0,
        }
    }

    #[test]
    fn rrf_sums_reciprocal_ranks_across_lists() {
        let merged = rrf_merge(vec![vec![hit(1), hit(2)], vec![hit(2), hit(3)]]);
        assert_eq!(merged[0].item_id, 2);
        assert!((merged[0].score - (1.0 / 62.0 + 1.0 / 61.0)).abs() < 1e-12);
        assert!((merged[1].score - 1.0 / 61.0).abs() < 1e-12);
        // Items 1 and 3 tie at 1/61; lower id wins.
        assert_eq!(merged[1].item_id, 1);
        assert_eq!(merged[2].item_id, 3);
    }

    #[test]
    fn rrf_of_single_list_preserves_order() {
        let merged = rrf_merge(vec![vec![hit(5), hit(9), hit(2)]]);
        let ids: Vec<i64> = merged.iter().map(|h| h.item_id).collect();
        assert_eq!(ids, vec![5, 9, 2]);
    }

    #[test]
    fn rrf_of_nothing_is_empty() {
        assert!(rrf_merge(Vec::new()).is_empty());
    }
}
