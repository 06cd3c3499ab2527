//! Trigger phrase detection over finalized transcript lines
//!
//! A line whose similarity to the trigger phrase exceeds the threshold arms
//! the detector. The next non-empty line is forwarded to the agent and the
//! detector disarms.

/// Normalize a line for comparison: lowercase, punctuation dropped,
/// whitespace collapsed
#[must_use]
pub fn normalize(text: &str) -> String {
    text.chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Similarity of two strings on a 0-100 scale
///
/// `2 * lcs / (len_a + len_b)` over the normalized characters, where `lcs`
/// is the longest common subsequence, rounded to the nearest integer.
#[must_use]
pub fn ratio(a: &str, b: &str) -> u8 {
    let a: Vec<char> = normalize(a).chars().collect();
    let b: Vec<char> = normalize(b).chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 0;
    }

    let common = lcs_len(&a, &b);

    #[allow(clippy::cast_precision_loss)]
    let score = (200.0 * common as f64 / total as f64).round();
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let score = score.clamp(0.0, 100.0) as u8;
    score
}

fn lcs_len(a: &[char], b: &[char]) -> usize {
    let mut prev = vec![0usize; b.len() + 1];
    let mut row = vec![0usize; b.len() + 1];

    for ca in a {
        for (j, cb) in b.iter().enumerate() {
            row[j + 1] = if ca == cb {
                prev[j] + 1
            } else {
                row[j].max(prev[j + 1])
            };
        }
        std::mem::swap(&mut prev, &mut row);
    }

    prev[b.len()]
}

/// What a finalized line did to the detector
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerEvent {
    /// The line matched the trigger phrase; the next line will be forwarded
    Activated { score: u8 },
    /// The line is the request that follows an activation
    Forward(String),
    /// Nothing to do
    Ignored,
}

/// Two-state trigger detector
#[derive(Debug, Clone)]
pub struct TriggerDetector {
    phrase: String,
    threshold: u8,
    active: bool,
}

impl TriggerDetector {
    /// Create a detector; a line must score strictly above `threshold`
    #[must_use]
    pub fn new(phrase: impl Into<String>, threshold: u8) -> Self {
        Self {
            phrase: phrase.into(),
            threshold,
            active: false,
        }
    }

    /// Whether the next non-empty line will be forwarded
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.active
    }

    #[must_use]
    pub fn phrase(&self) -> &str {
        &self.phrase
    }

    /// Feed one finalized transcript line
    pub fn on_phrase(&mut self, text: &str) -> TriggerEvent {
        let score = ratio(text, &self.phrase);
        if score > self.threshold {
            tracing::info!(score, "trigger phrase detected");
            self.active = true;
            return TriggerEvent::Activated { score };
        }

        let text = text.trim();
        if self.active && !text.is_empty() {
            self.active = false;
            return TriggerEvent::Forward(text.to_string());
        }

        TriggerEvent::Ignored
    }
}
