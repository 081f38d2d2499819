use crate::index::Posting;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;

/// BM25 parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Bm25Params {
    /// Term frequency saturation parameter
    pub k1: f64,
    /// Length normalization parameter
    pub b: f64,
    /// Weight of a title occurrence relative to a body occurrence
    pub title_boost: f64,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self {
            k1: 1.2,
            b: 0.75,
            title_boost: 1.5,
        }
    }
}

impl Bm25Params {
    pub fn validate(&self) -> Result<(), String> {
        if !(self.k1 >= 0.0 && self.k1.is_finite()) {
            return Err(format!("k1 must be a non-negative number, got {}", self.k1));
        }
        if !(0.0..=1.0).contains(&self.b) {
            return Err(format!("b must lie in [0, 1], got {}", self.b));
        }
        if !(self.title_boost >= 1.0 && self.title_boost.is_finite()) {
            return Err(format!("title_boost must be at least 1, got {}", self.title_boost));
        }
        Ok(())
    }
}

pub struct BM25 {
    params: Bm25Params,
}

impl Default for BM25 {
    fn default() -> Self {
        Self::new(Bm25Params::default())
    }
}

impl BM25 {
    pub fn new(params: Bm25Params) -> Self {
        Self { params }
    }

    /// Inverse document frequency; positive for any `doc_freq <= total_docs`
    pub fn idf(&self, total_docs: u64, doc_freq: usize) -> f64 {
        let total_docs = total_docs as f64;
        let doc_freq = doc_freq as f64;
        ((total_docs - doc_freq + 0.5) / (doc_freq + 0.5) + 1.0).ln()
    }

    /// Contribution of one matched term to a document's score
    pub fn term_score(&self, idf: f64, posting: &Posting, doc_length: u32, avg_doc_length: f64) -> f64 {
        let Bm25Params { k1, b, title_boost } = self.params;

        let tf = f64::from(posting.term_frequency)
            + (title_boost - 1.0) * f64::from(posting.title_frequency);
        if tf == 0.0 {
            return 0.0;
        }

        let relative_length = if avg_doc_length > 0.0 {
            f64::from(doc_length) / avg_doc_length
        } else {
            1.0
        };

        idf * (tf * (k1 + 1.0)) / (tf + k1 * (1.0 - b + b * relative_length))
    }
}

/// Ranked search result
#[derive(Debug, Clone)]
pub struct ScoredDocument {
    pub doc_id: String,
    pub score: f64,
    pub matched_terms: BTreeSet<String>,
}

/// Sort by score descending, ties by document id, then keep at most `limit` (0 keeps all)
pub fn rank_documents(mut scored: Vec<ScoredDocument>, limit: usize) -> Vec<ScoredDocument> {
    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.doc_id.cmp(&b.doc_id))
    });

    if limit > 0 {
        scored.truncate(limit);
    }
    scored
}

#[cfg(test)]
mod tests {
    use super::*;

    fn posting(tf: u32, title: u32) -> Posting {
        Posting {
            doc_id: "doc".to_string(),
            term_frequency: tf,
            title_frequency: title,
            positions: (0..tf).collect(),
        }
    }

    fn scored(id: &str, score: f64) -> ScoredDocument {
        ScoredDocument {
            doc_id: id.to_string(),
            score,
            matched_terms: BTreeSet::new(),
        }
    }

    #[test]
    fn test_bm25_score() {
        let bm25 = BM25::default();
        let idf = bm25.idf(1, 1);
        assert!(idf > 0.0);
        assert!(bm25.term_score(idf, &posting(2, 0), 10, 10.0) > 0.0);
    }

    #[test]
    fn test_score_grows_with_tf_and_saturates() {
        let bm25 = BM25::default();
        let idf = bm25.idf(10, 2);
        let once = bm25.term_score(idf, &posting(1, 0), 10, 10.0);
        let twice = bm25.term_score(idf, &posting(2, 0), 11, 10.0);
        let many = bm25.term_score(idf, &posting(100, 0), 10, 10.0);

        assert!(twice > once);
        assert!(many < idf * (1.2 + 1.0));
    }

    #[test]
    fn test_rarer_terms_weigh_more() {
        let bm25 = BM25::default();
        assert!(bm25.idf(100, 1) > bm25.idf(100, 50));
        assert!(bm25.idf(100, 100) > 0.0);
    }

    #[test]
    fn test_longer_documents_score_lower() {
        let bm25 = BM25::default();
        let idf = bm25.idf(10, 2);
        let short = bm25.term_score(idf, &posting(1, 0), 5, 10.0);
        let long = bm25.term_score(idf, &posting(1, 0), 40, 10.0);
        assert!(short > long);
    }

    #[test]
    fn test_title_occurrence_boosted() {
        let bm25 = BM25::default();
        let idf = bm25.idf(10, 2);
        assert!(
            bm25.term_score(idf, &posting(1, 1), 10, 10.0)
                > bm25.term_score(idf, &posting(1, 0), 10, 10.0)
        );
    }

    #[test]
    fn test_rank_ties_by_doc_id_and_limit() {
        let ranked = rank_documents(
            vec![scored("b", 1.0), scored("c", 2.0), scored("a", 1.0)],
            2,
        );
        let ids: Vec<&str> = ranked.iter().map(|d| d.doc_id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a"]);

        assert_eq!(rank_documents(vec![scored("a", 1.0), scored("b", 1.0)], 0).len(), 2);
    }

    #[test]
    fn test_validate() {
        assert!(Bm25Params::default().validate().is_ok());
        let bad = Bm25Params {
            b: 1.5,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
    }
}
