use std::collections::HashMap;

use crate::config::SimilarityMethod;

/// Scores how closely a back-translation matches the source transcript,
/// in [0.0, 1.0]
pub trait SimilarityScorer: Send + Sync {
    fn score(&self, source: &str, back_translation: &str) -> f64;
}

pub fn scorer_for(method: SimilarityMethod) -> Box<dyn SimilarityScorer> {
    match method {
        SimilarityMethod::Sequence => Box::new(SequenceRatio),
        SimilarityMethod::TokenOverlap => Box::new(TokenOverlap),
    }
}

/// Lowercase, strip punctuation (keeping Arabic-script letters), collapse
/// whitespace
pub fn normalize_text(value: &str) -> String {
    let cleaned: String = value
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '_' || c.is_whitespace() || ('\u{0600}'..='\u{06FF}').contains(&c) {
                c
            } else {
                ' '
            }
        })
        .collect();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Ratcliff/Obershelp ratio: `2 * matches / (len(a) + len(b))` where
/// matches are found by recursively taking the longest common block.
#[derive(Debug, Clone, Copy, Default)]
pub struct SequenceRatio;

impl SimilarityScorer for SequenceRatio {
    fn score(&self, source: &str, back_translation: &str) -> f64 {
        let a: Vec<char> = normalize_text(source).chars().collect();
        let b: Vec<char> = normalize_text(back_translation).chars().collect();
        if a.is_empty() || b.is_empty() {
            return 0.0;
        }
        let matches = matching_chars(&a, &b);
        2.0 * matches as f64 / (a.len() + b.len()) as f64
    }
}

fn matching_chars(a: &[char], b: &[char]) -> usize {
    let mut total = 0;
    let mut pending = vec![(0, a.len(), 0, b.len())];
    while let Some((alo, ahi, blo, bhi)) = pending.pop() {
        let (i, j, size) = longest_match(a, b, alo, ahi, blo, bhi);
        if size == 0 {
            continue;
        }
        total += size;
        if alo < i && blo < j {
            pending.push((alo, i, blo, j));
        }
        if i + size < ahi && j + size < bhi {
            pending.push((i + size, ahi, j + size, bhi));
        }
    }
    total
}

/// Longest common block within the given windows; ties go to the earliest
/// start in `a`, then in `b`
fn longest_match(a: &[char], b: &[char], alo: usize, ahi: usize, blo: usize, bhi: usize) -> (usize, usize, usize) {
    let width = bhi - blo;
    let mut prev = vec![0usize; width + 1];
    let mut best = (alo, blo, 0);
    for i in alo..ahi {
        let mut row = vec![0usize; width + 1];
        for j in blo..bhi {
            if a[i] == b[j] {
                let len = prev[j - blo] + 1;
                row[j - blo + 1] = len;
                if len > best.2 {
                    best = (i + 1 - len, j + 1 - len, len);
                }
            }
        }
        prev = row;
    }
    best
}

/// Token-level F1 over whitespace tokens of the normalized texts
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenOverlap;

impl SimilarityScorer for TokenOverlap {
    fn score(&self, source: &str, back_translation: &str) -> f64 {
        let a = normalize_text(source);
        let b = normalize_text(back_translation);
        let a_tokens: Vec<&str> = a.split(' ').filter(|t| !t.is_empty()).collect();
        let b_tokens: Vec<&str> = b.split(' ').filter(|t| !t.is_empty()).collect();
        if a_tokens.is_empty() || b_tokens.is_empty() {
            return 0.0;
        }

        let mut counts: HashMap<&str, usize> = HashMap::new();
        for t in &a_tokens {
            *counts.entry(*t).or_insert(0) += 1;
        }
        let mut common = 0usize;
        for t in &b_tokens {
            if let Some(c) = counts.get_mut(t) {
                if *c > 0 {
                    *c -= 1;
                    common += 1;
                }
            }
        }
        if common == 0 {
            return 0.0;
        }
        let precision = common as f64 / b_tokens.len() as f64;
        let recall = common as f64 / a_tokens.len() as f64;
        2.0 * precision * recall / (precision + recall)
    }
}
