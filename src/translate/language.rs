use serde::Serialize;

use crate::config::SourceLanguage;

/// Probes shorter than this many samples are not worth transcribing
pub const MIN_PROBE_SAMPLES: usize = 1200;

const URDU_MIN_ARABIC: f64 = 0.25;
const ENGLISH_MIN_LATIN: f64 = 0.45;
const SCRIPT_LEAD: f64 = 0.08;
const LIKENESS_AMBIGUITY: f64 = 0.05;

/// Script statistics behind an auto-detected source language
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LanguageDetection {
    pub language: SourceLanguage,
    pub eng_score: f64,
    pub urd_score: f64,
    pub eng_latin: f64,
    pub urd_latin: f64,
    pub eng_arabic: f64,
    pub urd_arabic: f64,
    /// Neither script nor likeness was decisive, the fallback was used
    pub ambiguous: bool,
}

impl LanguageDetection {
    pub fn summary(&self) -> String {
        format!(
            "eng_score={:.3}, urd_score={:.3}, eng_latin={:.3}, urd_latin={:.3}, eng_arabic={:.3}, urd_arabic={:.3}, selected={}{}",
            self.eng_score,
            self.urd_score,
            self.eng_latin,
            self.urd_latin,
            self.eng_arabic,
            self.urd_arabic,
            self.language,
            if self.ambiguous { " (ambiguous, fallback)" } else { "" }
        )
    }
}

fn is_latin(c: char) -> bool {
    c.is_ascii_alphabetic()
}

fn is_arabic(c: char) -> bool {
    ('\u{0600}'..='\u{06FF}').contains(&c)
}

fn script_ratio(text: &str, script: fn(char) -> bool) -> f64 {
    let letters: Vec<char> = text.chars().filter(|c| c.is_alphabetic()).collect();
    if letters.is_empty() {
        return 0.0;
    }
    letters.iter().filter(|&&c| script(c)).count() as f64 / letters.len() as f64
}

pub fn latin_ratio(text: &str) -> f64 {
    script_ratio(text, is_latin)
}

pub fn arabic_ratio(text: &str) -> f64 {
    script_ratio(text, is_arabic)
}

/// Script ratio boosted by word count, saturating at 12 words
fn likeness(ratio: f64, text: &str) -> f64 {
    let words = text.split_whitespace().count().max(1).min(12);
    ratio * (1.0 + words as f64 / 24.0)
}

/// Pick the source language from the same probe transcribed once as English
/// and once as Urdu.
pub fn detect_source_language(eng_text: &str, urd_text: &str, fallback: SourceLanguage) -> LanguageDetection {
    let eng_latin = latin_ratio(eng_text);
    let urd_latin = latin_ratio(urd_text);
    let eng_arabic = arabic_ratio(eng_text);
    let urd_arabic = arabic_ratio(urd_text);
    let eng_score = likeness(eng_latin, eng_text);
    let urd_score = likeness(urd_arabic, urd_text);

    let (language, ambiguous) = if urd_arabic >= URDU_MIN_ARABIC && urd_arabic > eng_arabic + SCRIPT_LEAD {
        (SourceLanguage::Urd, false)
    } else if eng_latin >= ENGLISH_MIN_LATIN && eng_latin > urd_latin + SCRIPT_LEAD {
        (SourceLanguage::Eng, false)
    } else if (urd_score - eng_score).abs() < LIKENESS_AMBIGUITY {
        (fallback, true)
    } else if urd_score > eng_score {
        (SourceLanguage::Urd, false)
    } else {
        (SourceLanguage::Eng, false)
    };

    LanguageDetection {
        language,
        eng_score,
        urd_score,
        eng_latin,
        urd_latin,
        eng_arabic,
        urd_arabic,
        ambiguous,
    }
}
