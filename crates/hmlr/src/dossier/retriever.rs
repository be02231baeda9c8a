//! Dossier Retriever - read-side dossier search.
//!
//! Companion to the Crawler: takes per-fact hits, dedupes them by
//! dossier keeping the best score, loads the full rows, and renders the
//! FACT DOSSIERS section of the prompt.

use hmlr_core::chunk::estimate_tokens;
use hmlr_core::types::{Dossier, DossierFact, DossierFactHit};
use hmlr_core::Storage;

use crate::error::HmlrResult;

/// A retrieved dossier with its facts and best hit score
#[derive(Debug, Clone)]
pub struct DossierView {
    pub dossier: Dossier,
    pub facts: Vec<DossierFact>,
    pub score: f32,
}

/// Read-side dossier loader
pub struct DossierRetriever {
    storage: Storage,
}

impl DossierRetriever {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    /// Resolve fact hits into full dossiers, best first
    pub async fn resolve_hits(
        &self,
        hits: &[DossierFactHit],
        limit: usize,
    ) -> HmlrResult<Vec<DossierView>> {
        let mut best: Vec<(String, f32)> = Vec::new();
        for hit in hits {
            match best.iter_mut().find(|(id, _)| *id == hit.dossier_id) {
                Some((_, score)) => *score = score.max(hit.score),
                None => best.push((hit.dossier_id.clone(), hit.score)),
            }
        }
        best.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        best.truncate(limit);

        let mut views = Vec::with_capacity(best.len());
        for (dossier_id, score) in best {
            let Some(dossier) = self.storage.get_dossier(&dossier_id).await? else {
                continue;
            };
            let facts = self.storage.dossier_facts(&dossier_id).await?;
            views.push(DossierView {
                dossier,
                facts,
                score,
            });
        }
        Ok(views)
    }
}

/// Render the dossier section under a token budget
pub fn format_dossiers(views: &[DossierView], token_budget: usize) -> String {
    if views.is_empty() {
        return String::new();
    }

    let mut parts = vec!["=== FACT DOSSIERS ===".to_string()];
    for view in views {
        parts.push(format!("### Dossier: {}", view.dossier.title));
        parts.push(format!("Summary: {}", view.dossier.summary));
        if !view.facts.is_empty() {
            parts.push("Facts:".into());
            for fact in &view.facts {
                parts.push(format!("- {}", fact.fact_text));
            }
        }
        parts.push(format!(
            "Last Updated: {}",
            view.dossier.last_updated.to_rfc3339()
        ));
        parts.push(String::new());
    }

    let section = parts.join("\n");
    if estimate_tokens(&section) <= token_budget as u32 {
        return section;
    }

    // Over budget: cut at the character equivalent and mark it
    let char_limit = token_budget * 4;
    let truncated: String = section.chars().take(char_limit).collect();
    format!("{}\n[dossier context truncated]", truncated)
}
