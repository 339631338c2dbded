use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::language::{detect_source_language, LanguageDetection, MIN_PROBE_SAMPLES};
use super::similarity::{scorer_for, SimilarityScorer};
use super::terms::TermOverrides;
use super::TranslationService;
use crate::chunk::Chunk;
use crate::config::{SourceLangMode, SourceLanguage, TranslateConfig};
use crate::error::{DubError, Result};

/// Chunks shorter than this are zero-padded before speech-to-text
const MIN_CHUNK_SAMPLES: usize = 400;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TranslationStrategy {
    /// Speech straight to Pashto text
    Direct,
    /// Source transcript translated text-to-text
    TextRelay,
}

impl fmt::Display for TranslationStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Direct => f.write_str("direct"),
            Self::TextRelay => f.write_str("text_relay"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TranslationCandidate {
    pub strategy: TranslationStrategy,
    pub text: String,
    /// Back-translation similarity, `None` when not verified
    pub score: Option<f64>,
}

/// Translation chosen for one chunk plus the diagnostics behind the choice
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TranslatedChunk {
    pub index: usize,
    pub start_s: f64,
    pub end_s: f64,
    pub source_text: String,
    pub text: String,
    pub strategy: TranslationStrategy,
    pub score: Option<f64>,
    pub verified: bool,
    /// Verification problems and low-confidence warnings
    pub notes: Vec<String>,
}

/// Outcome of source language resolution
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LanguageChoice {
    pub language: SourceLanguage,
    pub detection: Option<LanguageDetection>,
    pub note: String,
}

/// Pick the best-scoring candidate. A non-direct winner must beat the direct
/// candidate by at least `margin`, otherwise direct is kept.
pub fn select_candidate(candidates: &[TranslationCandidate], margin: f64) -> Option<&TranslationCandidate> {
    let direct = candidates.iter().find(|c| c.strategy == TranslationStrategy::Direct);
    let best = candidates.iter().fold(None::<&TranslationCandidate>, |best, c| match best {
        Some(b) if b.score.unwrap_or(0.0) >= c.score.unwrap_or(0.0) => Some(b),
        _ => Some(c),
    })?;

    match direct {
        Some(d) if best.strategy != TranslationStrategy::Direct => {
            if best.score.unwrap_or(0.0) - d.score.unwrap_or(0.0) > margin {
                Some(best)
            } else {
                Some(d)
            }
        }
        _ => Some(best),
    }
}

/// Obtains Pashto text per chunk and, when enabled, checks candidates by
/// round-trip translation
pub struct TranslationVerifier {
    service: Arc<dyn TranslationService>,
    scorer: Box<dyn SimilarityScorer>,
    overrides: TermOverrides,
    target_lang: String,
    margin: f64,
    min_score: f64,
    verify: AtomicBool,
}

impl TranslationVerifier {
    pub fn new(service: Arc<dyn TranslationService>, config: &TranslateConfig, target_lang: &str, verify: bool) -> Self {
        Self {
            service,
            scorer: scorer_for(config.similarity),
            overrides: TermOverrides::load(config.term_overrides_path.as_deref()),
            target_lang: target_lang.to_string(),
            margin: config.verification_margin,
            min_score: config.min_roundtrip_score,
            verify: AtomicBool::new(verify),
        }
    }

    pub fn with_scorer(mut self, scorer: Box<dyn SimilarityScorer>) -> Self {
        self.scorer = scorer;
        self
    }

    pub fn with_overrides(mut self, overrides: TermOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn verification_enabled(&self) -> bool {
        self.verify.load(Ordering::SeqCst)
    }

    /// Resolve the source language. Detection problems fall back to
    /// `fallback`; only cancellation is an error.
    pub async fn resolve_language(
        &self,
        mode: SourceLangMode,
        fallback: SourceLanguage,
        probe: &[f32],
        sample_rate: u32,
        cancel: &CancellationToken,
    ) -> Result<LanguageChoice> {
        if let Some(language) = mode.fixed() {
            return Ok(LanguageChoice {
                language,
                detection: None,
                note: format!("Using user-selected source language: {}", language),
            });
        }

        if probe.len() < MIN_PROBE_SAMPLES {
            return Ok(LanguageChoice {
                language: fallback,
                detection: None,
                note: format!("Source language auto-detect fallback: audio probe too short, using '{}'", fallback),
            });
        }

        let transcripts = async {
            let eng = self.service.speech_to_text(probe, sample_rate, SourceLanguage::Eng.code(), cancel).await?;
            let urd = self.service.speech_to_text(probe, sample_rate, SourceLanguage::Urd.code(), cancel).await?;
            Ok::<_, DubError>((eng, urd))
        };

        match transcripts.await {
            Ok((eng, urd)) => {
                let detection = detect_source_language(&eng, &urd, fallback);
                let note = format!("Source language auto-detect: {}", detection.summary());
                if detection.ambiguous {
                    warn!("{}", note);
                } else {
                    info!("{}", note);
                }
                Ok(LanguageChoice {
                    language: detection.language,
                    detection: Some(detection),
                    note,
                })
            }
            Err(e) if e.is_cancelled() => Err(e),
            Err(e) => {
                warn!("Language probe failed, using fallback {}: {}", fallback, e);
                Ok(LanguageChoice {
                    language: fallback,
                    detection: None,
                    note: format!("Source language auto-detect fallback after probe error ({}): using '{}'", e, fallback),
                })
            }
        }
    }

    /// Translate one chunk. Transport failures of the base translation
    /// propagate; verification failures degrade to the direct candidate.
    pub async fn translate_chunk(
        &self,
        chunk: &Chunk,
        source_lang: SourceLanguage,
        cancel: &CancellationToken,
    ) -> Result<TranslatedChunk> {
        let mut samples = chunk.samples.clone();
        if samples.len() < MIN_CHUNK_SAMPLES {
            samples.resize(MIN_CHUNK_SAMPLES, 0.0);
        }
        let src = source_lang.code();
        let tgt = self.target_lang.as_str();

        let source_text = self.service.speech_to_text(&samples, chunk.sample_rate, src, cancel).await?;
        let direct_text = self.service.speech_to_text(&samples, chunk.sample_rate, tgt, cancel).await?;

        let mut notes = Vec::new();
        let mut chosen = TranslationCandidate {
            strategy: TranslationStrategy::Direct,
            text: direct_text.clone(),
            score: None,
        };
        let mut verified = false;

        if self.verification_enabled() {
            match self.score_candidates(&source_text, direct_text, src, cancel).await {
                Ok(candidates) => {
                    if let Some(best) = select_candidate(&candidates, self.margin) {
                        chosen = best.clone();
                    }
                    verified = true;
                    let direct_score = candidates.first().and_then(|c| c.score).unwrap_or(0.0);
                    let relay_score = candidates.get(1).and_then(|c| c.score).unwrap_or(0.0);
                    debug!(
                        "Chunk {}: score_direct={:.3}, score_relay={:.3}, strategy={}",
                        chunk.index + 1,
                        direct_score,
                        relay_score,
                        chosen.strategy
                    );
                    let score = chosen.score.unwrap_or(0.0);
                    if score < self.min_score {
                        notes.push(format!("low translation confidence ({:.3}) after verification", score));
                    }
                }
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => {
                    notes.push(format!("verification skipped due to error: {}", e));
                    if !e.is_retryable() {
                        self.verify.store(false, Ordering::SeqCst);
                        notes.push("verification disabled for the remaining chunks".to_string());
                    }
                }
            }
        }

        for note in &notes {
            warn!("Chunk {}: {}", chunk.index + 1, note);
        }

        Ok(TranslatedChunk {
            index: chunk.index,
            start_s: chunk.start_s,
            end_s: chunk.end_s,
            source_text,
            text: self.overrides.apply(&chosen.text),
            strategy: chosen.strategy,
            score: chosen.score,
            verified,
            notes,
        })
    }

    /// Direct first, then text relay, each scored by back-translation
    async fn score_candidates(
        &self,
        source_text: &str,
        direct_text: String,
        src: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<TranslationCandidate>> {
        let tgt = self.target_lang.as_str();
        let relay_text = self.service.text_to_text(source_text, src, tgt, cancel).await?;
        let back_direct = self.service.text_to_text(&direct_text, tgt, src, cancel).await?;
        let back_relay = self.service.text_to_text(&relay_text, tgt, src, cancel).await?;

        Ok(vec![
            TranslationCandidate {
                strategy: TranslationStrategy::Direct,
                score: Some(self.scorer.score(source_text, &back_direct)),
                text: direct_text,
            },
            TranslationCandidate {
                strategy: TranslationStrategy::TextRelay,
                score: Some(self.scorer.score(source_text, &back_relay)),
                text: relay_text,
            },
        ])
    }

    /// Translate every chunk, preserving chunk order
    pub async fn translate_all(
        &self,
        chunks: &[Chunk],
        source_lang: SourceLanguage,
        cancel: &CancellationToken,
    ) -> Result<Vec<TranslatedChunk>> {
        let mut out = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            if cancel.is_cancelled() {
                return Err(DubError::Cancelled("translation cancelled".to_string()));
            }
            info!("Translating chunk {}/{}", chunk.index + 1, chunks.len());
            out.push(self.translate_chunk(chunk, source_lang, cancel).await?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translate::similarity::TokenOverlap;
    use crate::translate::MockTranslationService;

    fn candidate(strategy: TranslationStrategy, score: f64) -> TranslationCandidate {
        TranslationCandidate {
            strategy,
            text: strategy.to_string(),
            score: Some(score),
        }
    }

    fn chunk() -> Chunk {
        Chunk {
            index: 0,
            start_s: 0.0,
            end_s: 1.0,
            samples: vec![0.1; 16_000],
            sample_rate: 16_000,
        }
    }

    #[test]
    fn test_margin_prefers_direct() {
        let candidates = vec![
            candidate(TranslationStrategy::Direct, 0.70),
            candidate(TranslationStrategy::TextRelay, 0.72),
        ];
        assert_eq!(select_candidate(&candidates, 0.03).unwrap().strategy, TranslationStrategy::Direct);
        assert_eq!(select_candidate(&candidates, 0.01).unwrap().strategy, TranslationStrategy::TextRelay);
    }

    #[test]
    fn test_selection_is_deterministic() {
        let candidates = vec![
            candidate(TranslationStrategy::Direct, 0.4),
            candidate(TranslationStrategy::TextRelay, 0.9),
        ];
        let first = select_candidate(&candidates, 0.03).cloned();
        for _ in 0..10 {
            assert_eq!(select_candidate(&candidates, 0.03).cloned(), first);
        }
        assert_eq!(first.unwrap().strategy, TranslationStrategy::TextRelay);
        assert!(select_candidate(&[], 0.03).is_none());
    }

    /// Direct back-translation has the right words in scrambled order, the
    /// relay one is fluent with one word wrong
    fn word_order_service() -> MockTranslationService {
        let mut service = MockTranslationService::new();
        service.expect_speech_to_text().returning(|_, _, lang, _| {
            Ok(if lang == "eng" { "the cat sat on the mat" } else { "direct" }.to_string())
        });
        service.expect_text_to_text().returning(|text, _, _, _| {
            let out = match text {
                "the cat sat on the mat" => "relay",
                "direct" => "mat the on sat cat the",
                "relay" => "the cat sat on a mat",
                _ => "",
            };
            Ok(out.to_string())
        });
        service
    }

    #[tokio::test]
    async fn test_scorer_decides_between_candidates() {
        let cancel = CancellationToken::new();

        let by_sequence = TranslationVerifier::new(Arc::new(word_order_service()), &TranslateConfig::default(), "pbt", true)
            .with_overrides(TermOverrides::default());
        let translated = by_sequence.translate_chunk(&chunk(), SourceLanguage::Eng, &cancel).await.unwrap();
        assert_eq!(translated.strategy, TranslationStrategy::TextRelay);

        let by_tokens = TranslationVerifier::new(Arc::new(word_order_service()), &TranslateConfig::default(), "pbt", true)
            .with_overrides(TermOverrides::default())
            .with_scorer(Box::new(TokenOverlap));
        let translated = by_tokens.translate_chunk(&chunk(), SourceLanguage::Eng, &cancel).await.unwrap();
        assert_eq!(translated.strategy, TranslationStrategy::Direct);
        assert_eq!(translated.score, Some(1.0));
    }

    #[tokio::test]
    async fn test_relay_chosen_when_clearly_better() {
        let mut service = MockTranslationService::new();
        service
            .expect_speech_to_text()
            .returning(|_, _, lang, _| Ok(if lang == "eng" { "the cat sat".to_string() } else { "direct".to_string() }));
        // relay candidate round-trips perfectly, direct does not
        service.expect_text_to_text().returning(|text, _, _, _| {
            let out = match text {
                "the cat sat" => "relay",
                "direct" => "a dog ran",
                "relay" => "the cat sat",
                _ => "",
            };
            Ok(out.to_string())
        });

        let verifier = TranslationVerifier::new(Arc::new(service), &TranslateConfig::default(), "pbt", true)
            .with_overrides(TermOverrides::default());
        let cancel = CancellationToken::new();
        let translated = verifier.translate_chunk(&chunk(), SourceLanguage::Eng, &cancel).await.unwrap();

        assert_eq!(translated.strategy, TranslationStrategy::TextRelay);
        assert_eq!(translated.text, "relay");
        assert_eq!(translated.score, Some(1.0));
        assert!(translated.verified);
    }

    #[tokio::test]
    async fn test_verification_error_degrades_to_direct() {
        let mut service = MockTranslationService::new();
        service
            .expect_speech_to_text()
            .returning(|_, _, _, _| Ok("some text".to_string()));
        service
            .expect_text_to_text()
            .times(1)
            .returning(|_, _, _, _| Err(DubError::InvalidInput("text model unavailable".to_string())));

        let verifier = TranslationVerifier::new(Arc::new(service), &TranslateConfig::default(), "pbt", true)
            .with_overrides(TermOverrides::default());
        let cancel = CancellationToken::new();
        let translated = verifier.translate_chunk(&chunk(), SourceLanguage::Eng, &cancel).await.unwrap();

        assert_eq!(translated.strategy, TranslationStrategy::Direct);
        assert!(!translated.verified);
        assert!(!verifier.verification_enabled());
        assert_eq!(translated.notes.len(), 2);
    }

    #[tokio::test]
    async fn test_disabled_verification_skips_text_model() {
        let mut service = MockTranslationService::new();
        service
            .expect_speech_to_text()
            .returning(|_, _, _, _| Ok(String::new()));
        service.expect_text_to_text().never();

        let verifier = TranslationVerifier::new(Arc::new(service), &TranslateConfig::default(), "pbt", false)
            .with_overrides(TermOverrides::default());
        let cancel = CancellationToken::new();
        let translated = verifier.translate_chunk(&chunk(), SourceLanguage::Urd, &cancel).await.unwrap();

        assert_eq!(translated.text, crate::translate::UNTRANSLATED_PLACEHOLDER);
        assert_eq!(translated.score, None);
    }

    #[tokio::test]
    async fn test_short_probe_uses_fallback_language() {
        let mut service = MockTranslationService::new();
        service.expect_speech_to_text().never();
        let verifier = TranslationVerifier::new(Arc::new(service), &TranslateConfig::default(), "pbt", true);
        let cancel = CancellationToken::new();

        let choice = verifier
            .resolve_language(SourceLangMode::Auto, SourceLanguage::Urd, &[0.0; 100], 16_000, &cancel)
            .await
            .unwrap();
        assert_eq!(choice.language, SourceLanguage::Urd);
        assert!(choice.detection.is_none());

        let fixed = verifier
            .resolve_language(SourceLangMode::Eng, SourceLanguage::Urd, &[0.0; 100], 16_000, &cancel)
            .await
            .unwrap();
        assert_eq!(fixed.language, SourceLanguage::Eng);
    }
}
