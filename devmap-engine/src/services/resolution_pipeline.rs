//! Resolution Pipeline
//!
//! **[DME-PIPE-010]** Linear strategy chain over one extracted record:
//! Cached -> Exact -> Fuzzy -> Heuristic -> Failed. The pipeline halts at the
//! first strategy whose result meets the accept threshold; otherwise it
//! accumulates candidates from every strategy and falls back to the single
//! best candidate at or above the review threshold, flagged for review.
//! Every attempt lands in the decision path whether or not it succeeded.

use crate::catalog::{CatalogError, CatalogReader, KnowledgeBaseReader};
use crate::config::PipelineConfig;
use crate::db::MappingCache;
use crate::error::{EngineError, EngineResult};
use crate::models::{
    CandidateFilter, CandidateSummary, CatalogCandidate, DecisionStep, DeviceMetadata,
    DeviceSignature, MappingAlgorithm, MappingResult,
};
use crate::services::candidate_scorer::CandidateScorer;
use crate::services::heuristics::{default_rules, HeuristicRule};
use chrono::Utc;
use std::sync::Arc;

/// Per-call resolution options
#[derive(Debug, Clone)]
pub struct ResolveOptions {
    /// When false the Cached strategy is skipped entirely (forced
    /// re-evaluation during optimization jobs)
    pub use_cache: bool,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self { use_cache: true }
    }
}

/// Best outcome one strategy produced
struct StrategyOutcome {
    capacity_id: uuid::Uuid,
    confidence: u8,
    algorithm: MappingAlgorithm,
    ambiguous: bool,
}

pub struct ResolutionPipeline {
    config: PipelineConfig,
    scorer: CandidateScorer,
    catalog: Arc<dyn CatalogReader>,
    knowledge: Arc<dyn KnowledgeBaseReader>,
    cache: MappingCache,
    rules: Vec<HeuristicRule>,
}

impl ResolutionPipeline {
    pub fn new(
        config: PipelineConfig,
        catalog: Arc<dyn CatalogReader>,
        knowledge: Arc<dyn KnowledgeBaseReader>,
        cache: MappingCache,
    ) -> Self {
        let scorer = CandidateScorer::new(config.weights.clone());
        Self {
            config,
            scorer,
            catalog,
            knowledge,
            cache,
            rules: default_rules(),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Resolve one extracted record to a catalog capacity
    ///
    /// Errors are reserved for infrastructure failures scoped to this record
    /// (cache write conflicts, all collaborators unreachable); resolution
    /// failures are values on the returned `MappingResult`.
    pub async fn resolve(
        &self,
        meta: &DeviceMetadata,
        options: &ResolveOptions,
    ) -> EngineResult<MappingResult> {
        let signature = meta.signature();
        let mut path: Vec<DecisionStep> = Vec::new();
        let mut considered: Vec<CandidateSummary> = Vec::new();
        let mut rejections: Vec<String> = Vec::new();
        let mut outcomes: Vec<StrategyOutcome> = Vec::new();
        let mut collaborator_failures = 0usize;

        // -- Cached ----------------------------------------------------------
        if options.use_cache {
            match self.try_cached(meta, &signature, &mut path, &mut rejections).await {
                Some(outcome) if outcome.confidence >= self.config.accept_threshold => {
                    return self.finish(meta, &signature, outcome, path, considered, rejections)
                        .await;
                }
                Some(outcome) => outcomes.push(outcome),
                None => {}
            }
        }

        // -- Exact -----------------------------------------------------------
        match self
            .try_exact(meta, &mut path, &mut considered, &mut rejections)
            .await
        {
            Ok(Some(outcome))
                if outcome.confidence >= self.config.accept_threshold && !outcome.ambiguous =>
            {
                return self.finish(meta, &signature, outcome, path, considered, rejections).await;
            }
            Ok(Some(outcome)) => outcomes.push(outcome),
            Ok(None) => {}
            Err(CatalogError::Unavailable(msg)) => {
                collaborator_failures += 1;
                tracing::warn!(error = %msg, "Catalog unavailable, skipping exact strategy");
                rejections.push(format!("exact strategy skipped: {}", msg));
            }
        }

        // -- Fuzzy -----------------------------------------------------------
        match self
            .try_fuzzy(meta, &mut path, &mut considered, &mut rejections)
            .await
        {
            Ok(Some(outcome))
                if outcome.confidence >= self.config.accept_threshold && !outcome.ambiguous =>
            {
                return self.finish(meta, &signature, outcome, path, considered, rejections).await;
            }
            Ok(Some(outcome)) => outcomes.push(outcome),
            Ok(None) => {}
            Err(CatalogError::Unavailable(msg)) => {
                collaborator_failures += 1;
                tracing::warn!(error = %msg, "Catalog unavailable, skipping fuzzy strategy");
                rejections.push(format!("fuzzy strategy skipped: {}", msg));
            }
        }

        // -- Heuristic -------------------------------------------------------
        match self
            .try_heuristic(meta, &mut path, &mut considered, &mut rejections)
            .await
        {
            Ok(Some(outcome))
                if outcome.confidence >= self.config.accept_threshold && !outcome.ambiguous =>
            {
                return self.finish(meta, &signature, outcome, path, considered, rejections).await;
            }
            Ok(Some(outcome)) => outcomes.push(outcome),
            Ok(None) => {}
            Err(CatalogError::Unavailable(msg)) => {
                collaborator_failures += 1;
                tracing::warn!(error = %msg, "Catalog unavailable, skipping heuristic strategy");
                rejections.push(format!("heuristic strategy skipped: {}", msg));
            }
        }

        // All catalog-backed strategies unreachable and nothing to fall back
        // on: fail closed with the underlying cause
        if outcomes.is_empty() && collaborator_failures >= 3 {
            return Err(EngineError::CollaboratorUnavailable(
                "all resolution strategies unreachable".to_string(),
            ));
        }

        // Fallback: best candidate across all strategies, review band
        let best = outcomes.into_iter().max_by_key(|o| o.confidence);
        match best {
            Some(outcome) if outcome.confidence >= self.config.review_threshold => {
                self.finish(meta, &signature, outcome, path, considered, rejections).await
            }
            _ => {
                rejections.push("no candidate reached the review threshold".to_string());
                tracing::debug!(signature = %signature, "Resolution failed, no candidate found");
                let mut result = MappingResult::failed(path, considered, rejections);
                result.extra_fields = meta.extra_fields.clone();
                Ok(result)
            }
        }
    }

    /// Assemble the final result and write back to the cache when warranted
    async fn finish(
        &self,
        meta: &DeviceMetadata,
        signature: &DeviceSignature,
        outcome: StrategyOutcome,
        path: Vec<DecisionStep>,
        considered: Vec<CandidateSummary>,
        rejections: Vec<String>,
    ) -> EngineResult<MappingResult> {
        // An ambiguous winner is demoted into the review band so it can never
        // present as an auto-accepted mapping
        let confidence = if outcome.ambiguous {
            outcome
                .confidence
                .min(self.config.accept_threshold.saturating_sub(1))
        } else {
            outcome.confidence
        };
        let needs_review = confidence < self.config.accept_threshold || outcome.ambiguous;
        let result = MappingResult {
            capacity_id: Some(outcome.capacity_id),
            confidence: confidence.min(100),
            algorithm: outcome.algorithm,
            decision_path: path,
            candidates: considered,
            rejections,
            needs_review,
            ambiguous: outcome.ambiguous,
            extra_fields: meta.extra_fields.clone(),
        };

        // One cache-counter bump per appearance: a chosen cached outcome
        // confirms the existing row, anything else writes back through the
        // upsert (which itself increments the counter on conflict)
        if result.algorithm == MappingAlgorithm::Cached {
            if let Err(e) = self.cache.confirm(signature).await {
                tracing::warn!(error = %e, "Cache confirmation failed");
            }
        } else {
            self.cache.upsert(signature, &result).await?;
        }

        tracing::debug!(
            signature = %signature,
            algorithm = result.algorithm.as_str(),
            confidence = result.confidence,
            needs_review = result.needs_review,
            "Resolution complete"
        );
        Ok(result)
    }

    /// Cached strategy: signature lookup with read-time confidence decay
    async fn try_cached(
        &self,
        _meta: &DeviceMetadata,
        signature: &DeviceSignature,
        path: &mut Vec<DecisionStep>,
        rejections: &mut Vec<String>,
    ) -> Option<StrategyOutcome> {
        let found = match self.cache.find(signature).await {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!(error = %e, "Cache lookup failed, skipping cached strategy");
                rejections.push(format!("cached strategy skipped: {}", e));
                return None;
            }
        };

        match found {
            Some(mapping) if mapping.is_active => {
                let days = (Utc::now() - mapping.last_confirmed_at).num_seconds() as f64 / 86_400.0;
                let decayed = self.decayed_confidence(mapping.confidence, days);

                push_step(path, MappingAlgorithm::Cached, true, decayed, 1);
                Some(StrategyOutcome {
                    capacity_id: mapping.capacity_id,
                    confidence: decayed,
                    algorithm: MappingAlgorithm::Cached,
                    ambiguous: false,
                })
            }
            // A plain miss is not an attempt worth recording; the decision
            // path starts with the first strategy that actually ran
            _ => None,
        }
    }

    /// Read-time decay: `max(floor, base * factor^(days/30))`
    pub fn decayed_confidence(&self, base: u8, days: f64) -> u8 {
        let decayed = base as f64 * self.config.decay_factor.powf(days.max(0.0) / 30.0);
        (decayed.round() as u8).max(self.config.decay_floor).min(base)
    }

    /// Exact strategy: identification code first, else two independent
    /// strong signals; exact capacity match among survivors
    async fn try_exact(
        &self,
        meta: &DeviceMetadata,
        path: &mut Vec<DecisionStep>,
        considered: &mut Vec<CandidateSummary>,
        rejections: &mut Vec<String>,
    ) -> Result<Option<StrategyOutcome>, CatalogError> {
        let candidates = if let Some(code) = &meta.identification_code {
            // The code is the single strongest signal; no family filter needed
            self.catalog.find_by_identifier(code)?
        } else {
            // Without a code, demand at least two independent strong signals
            // before attempting an exact match at all
            let strong_signals = [
                meta.vendor_model_code.is_some(),
                meta.release_year.is_some(),
                meta.screen_size_in.is_some(),
                meta.chip.is_some(),
            ]
            .iter()
            .filter(|s| **s)
            .count();
            if strong_signals < 2 {
                rejections.push("exact: fewer than two strong signals".to_string());
                push_step(path, MappingAlgorithm::Exact, false, 0, 0);
                return Ok(None);
            }
            let filter = CandidateFilter {
                release_year: meta.release_year,
                ..Default::default()
            };
            self.catalog
                .find_candidates(meta.brand, meta.family.as_deref(), &filter)?
        };

        let Some(capacity_gb) = meta.capacity_gb else {
            rejections.push("exact: record has no capacity".to_string());
            push_step(path, MappingAlgorithm::Exact, false, 0, candidates.len());
            return Ok(None);
        };

        // Knowledge base corroboration for the identification code
        let kb_model = meta
            .identification_code
            .as_deref()
            .and_then(|code| self.knowledge.lookup(code).ok().flatten())
            .map(|entry| entry.normalized_model);

        let mut survivors: Vec<(CatalogCandidate, u8, Vec<String>)> = Vec::new();
        for candidate in &candidates {
            if candidate.capacity_gb != capacity_gb {
                rejections.push(format!(
                    "exact: {} capacity {}GB != {}GB",
                    candidate.description, candidate.capacity_gb, capacity_gb
                ));
                continue;
            }
            let (signals, reasons) = corroborating_signals(meta, candidate, kb_model.as_deref());
            // Code-less exact matches need the two-signal floor per candidate
            if meta.identification_code.is_none() && signals < 2 {
                rejections.push(format!(
                    "exact: {} has insufficient corroboration",
                    candidate.description
                ));
                continue;
            }
            // Baseline 70, rising with corroborating signals, capped at 90
            let confidence = (70 + signals * 5).min(90);
            survivors.push((candidate.clone(), confidence, reasons));
        }

        survivors.sort_by(|a, b| {
            b.1.cmp(&a.1)
                .then(b.0.description.len().cmp(&a.0.description.len()))
        });

        for (candidate, confidence, reasons) in &survivors {
            considered.push(CandidateSummary {
                capacity_id: candidate.capacity_id,
                description: candidate.description.clone(),
                raw_score: *confidence as u32,
                confidence: *confidence,
                algorithm: MappingAlgorithm::Exact,
                reasons: reasons.clone(),
            });
        }

        let Some((best, confidence, _)) = survivors.first().cloned() else {
            push_step(path, MappingAlgorithm::Exact, false, 0, candidates.len());
            return Ok(None);
        };

        // Two survivors within the ambiguity delta cannot be told apart on
        // the available signals; accept the higher but force review
        let ambiguous = survivors
            .get(1)
            .map(|(_, second, _)| confidence - second <= self.config.ambiguity_delta)
            .unwrap_or(false);
        if ambiguous {
            rejections.push("exact: ambiguous match, top candidates within delta".to_string());
        }

        push_step(path, MappingAlgorithm::Exact, true, confidence, survivors.len());
        Ok(Some(StrategyOutcome {
            capacity_id: best.capacity_id,
            confidence,
            algorithm: MappingAlgorithm::Exact,
            ambiguous,
        }))
    }

    /// Fuzzy strategy: bounded candidate set scored by the candidate scorer,
    /// tolerant capacity matching
    async fn try_fuzzy(
        &self,
        meta: &DeviceMetadata,
        path: &mut Vec<DecisionStep>,
        considered: &mut Vec<CandidateSummary>,
        rejections: &mut Vec<String>,
    ) -> Result<Option<StrategyOutcome>, CatalogError> {
        let filter = CandidateFilter {
            limit: self.config.fuzzy_candidate_limit,
            ..Default::default()
        };
        let candidates = self
            .catalog
            .find_candidates(meta.brand, meta.family.as_deref(), &filter)?;

        let mut scored: Vec<_> = candidates
            .iter()
            .filter(|candidate| match meta.capacity_gb {
                Some(capacity) => {
                    let tolerance = self.config.capacity_tolerance(capacity);
                    candidate.capacity_gb.abs_diff(capacity) <= tolerance
                }
                None => true,
            })
            .map(|candidate| self.scorer.score(meta, candidate))
            .collect();
        scored.sort_by(|a, b| b.raw_score.cmp(&a.raw_score));

        let Some(top) = scored.first() else {
            rejections.push("fuzzy: no candidates within capacity tolerance".to_string());
            push_step(path, MappingAlgorithm::Fuzzy, false, 0, candidates.len());
            return Ok(None);
        };

        let confidence = self
            .scorer
            .confidence_from_raw(top.raw_score, self.config.fuzzy_confidence_cap);

        for score in scored.iter().take(5) {
            considered.push(CandidateSummary {
                capacity_id: score.candidate.capacity_id,
                description: score.candidate.description.clone(),
                raw_score: score.raw_score,
                confidence: self
                    .scorer
                    .confidence_from_raw(score.raw_score, self.config.fuzzy_confidence_cap),
                algorithm: MappingAlgorithm::Fuzzy,
                reasons: score.reasons.clone(),
            });
        }

        if confidence < self.config.review_threshold {
            rejections.push(format!(
                "fuzzy: best candidate {} below review threshold",
                top.candidate.description
            ));
            push_step(path, MappingAlgorithm::Fuzzy, false, confidence, scored.len());
            return Ok(None);
        }

        let second_confidence = scored.get(1).map(|s| {
            self.scorer
                .confidence_from_raw(s.raw_score, self.config.fuzzy_confidence_cap)
        });
        let ambiguous = second_confidence
            .map(|second| confidence - second <= self.config.ambiguity_delta)
            .unwrap_or(false);

        push_step(path, MappingAlgorithm::Fuzzy, true, confidence, scored.len());
        Ok(Some(StrategyOutcome {
            capacity_id: top.candidate.capacity_id,
            confidence,
            algorithm: MappingAlgorithm::Fuzzy,
            ambiguous,
        }))
    }

    /// Heuristic strategy: brand-specific rule table for known ambiguous
    /// configurations (e.g. one vendor code shared by two hardware variants)
    async fn try_heuristic(
        &self,
        meta: &DeviceMetadata,
        path: &mut Vec<DecisionStep>,
        considered: &mut Vec<CandidateSummary>,
        rejections: &mut Vec<String>,
    ) -> Result<Option<StrategyOutcome>, CatalogError> {
        let Some(code) = &meta.identification_code else {
            push_step(path, MappingAlgorithm::Heuristic, false, 0, 0);
            return Ok(None);
        };

        let candidates = self.catalog.find_by_identifier(code)?;
        let shared: Vec<_> = candidates
            .into_iter()
            .filter(|c| Some(c.capacity_gb) == meta.capacity_gb)
            .collect();
        if shared.len() < 2 {
            push_step(path, MappingAlgorithm::Heuristic, false, 0, shared.len());
            return Ok(None);
        }

        for rule in self.rules.iter().filter(|r| r.brand == meta.brand) {
            if let Some((candidate, reason)) = rule.apply(meta, &shared) {
                let confidence = self.config.heuristic_confidence_cap;
                considered.push(CandidateSummary {
                    capacity_id: candidate.capacity_id,
                    description: candidate.description.clone(),
                    raw_score: confidence as u32,
                    confidence,
                    algorithm: MappingAlgorithm::Heuristic,
                    reasons: vec![reason.clone()],
                });
                push_step(path, MappingAlgorithm::Heuristic, true, confidence, shared.len());
                tracing::debug!(rule = rule.name, reason = %reason, "Heuristic rule matched");
                return Ok(Some(StrategyOutcome {
                    capacity_id: candidate.capacity_id,
                    confidence,
                    algorithm: MappingAlgorithm::Heuristic,
                    ambiguous: false,
                }));
            }
        }

        rejections.push("heuristic: no rule disambiguated the shared code".to_string());
        push_step(path, MappingAlgorithm::Heuristic, false, 0, shared.len());
        Ok(None)
    }
}

/// Corroborating signals for the exact strategy, beyond code and capacity
fn corroborating_signals(
    meta: &DeviceMetadata,
    candidate: &CatalogCandidate,
    kb_model: Option<&str>,
) -> (u8, Vec<String>) {
    let mut signals = 0u8;
    let mut reasons = Vec::new();

    if let Some(code) = &meta.identification_code {
        if candidate.has_identification_code(code) {
            signals += 1;
            reasons.push(format!("identification code {}", code));
        }
    }
    if meta.release_year.is_some() && meta.release_year == candidate.release_year {
        signals += 1;
        reasons.push("release year".to_string());
    }
    if let (Some(chip), Some(candidate_chip)) = (&meta.chip, &candidate.chip) {
        if chip.eq_ignore_ascii_case(candidate_chip) {
            signals += 1;
            reasons.push("chip".to_string());
        }
    }
    if let (Some(size), Some(candidate_size)) = (meta.screen_size_in, candidate.screen_size_in) {
        if (size - candidate_size).abs() < 0.1 {
            signals += 1;
            reasons.push("screen size".to_string());
        }
    }
    if let (Some(code), Some(candidate_code)) = (&meta.vendor_model_code, &candidate.model_code) {
        if code == candidate_code {
            signals += 1;
            reasons.push("vendor model code".to_string());
        }
    }
    if let (Some(model), Some(kb_model)) = (&meta.normalized_model, kb_model) {
        if model.contains(kb_model) || kb_model.contains(model.as_str()) {
            signals += 1;
            reasons.push("knowledge base model".to_string());
        }
    }

    (signals, reasons)
}

fn push_step(
    path: &mut Vec<DecisionStep>,
    strategy: MappingAlgorithm,
    success: bool,
    confidence: u8,
    candidate_count: usize,
) {
    path.push(DecisionStep {
        strategy,
        attempted_at: Utc::now(),
        success,
        confidence,
        candidate_count,
    });
}
