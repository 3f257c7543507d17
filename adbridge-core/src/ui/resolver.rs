//! Element Resolver — scores extracted elements against structured
//! match criteria.
//!
//! Identity-like fields (resource id, class name) are hard filters: a
//! mismatch disqualifies the candidate outright. Human-facing fields
//! (text, content description) match fuzzily with a normalized edit
//! similarity. The final score is normalized by the number of matched
//! criteria so a single strong match is not outranked by several weak
//! ones.

use serde::{Deserialize, Serialize};

use crate::ui::element::UiElement;

/// Minimum normalized score (and per-field similarity) for a match.
pub const DEFAULT_MIN_SIMILARITY: f64 = 0.6;

/// What to look for. Empty criteria match nothing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchCriteria {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_desc: Option<String>,
}

impl MatchCriteria {
    pub fn with_resource_id(mut self, id: impl Into<String>) -> Self {
        self.resource_id = Some(id.into());
        self
    }

    pub fn with_class_name(mut self, class: impl Into<String>) -> Self {
        self.class_name = Some(class.into());
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_content_desc(mut self, desc: impl Into<String>) -> Self {
        self.content_desc = Some(desc.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.resource_id.is_none()
            && self.class_name.is_none()
            && self.text.is_none()
            && self.content_desc.is_none()
    }

    /// Render criteria for error messages, e.g. `text="Login"`.
    pub fn describe(&self) -> String {
        let mut parts = Vec::new();
        if let Some(v) = &self.resource_id {
            parts.push(format!("resource_id=\"{v}\""));
        }
        if let Some(v) = &self.class_name {
            parts.push(format!("class=\"{v}\""));
        }
        if let Some(v) = &self.text {
            parts.push(format!("text=\"{v}\""));
        }
        if let Some(v) = &self.content_desc {
            parts.push(format!("content_desc=\"{v}\""));
        }
        parts.join(", ")
    }
}

/// A qualifying candidate with its normalized score.
#[derive(Debug, Clone)]
pub struct ScoredElement<'a> {
    pub element: &'a UiElement,
    pub score: f64,
}

// ── Scoring ───────────────────────────────────────────────────────

fn score_element(
    element: &UiElement,
    criteria: &MatchCriteria,
    min_similarity: f64,
) -> Option<f64> {
    let mut score = 0.0;
    let mut matched = 0u32;

    // Hard filters: mismatch disqualifies outright.
    if let Some(id) = &criteria.resource_id {
        if element.resource_id != *id {
            return None;
        }
        score += 1.0;
        matched += 1;
    }
    if let Some(class) = &criteria.class_name {
        if element.class_name != *class {
            return None;
        }
        score += 0.5;
        matched += 1;
    }

    // Fuzzy fields contribute their similarity when above threshold.
    if let Some(text) = &criteria.text {
        let sim = similarity(text, &element.text);
        if sim >= min_similarity {
            score += sim;
            matched += 1;
        }
    }
    if let Some(desc) = &criteria.content_desc {
        let sim = similarity(desc, &element.content_desc);
        if sim >= min_similarity {
            score += sim;
            matched += 1;
        }
    }

    if matched == 0 {
        None
    } else {
        Some(score / f64::from(matched))
    }
}

/// Best match, or `None` when nothing reaches the threshold.
/// Ties resolve to the earlier element in document order.
pub fn find_element<'a>(
    elements: &'a [UiElement],
    criteria: &MatchCriteria,
    min_similarity: f64,
) -> Option<&'a UiElement> {
    let mut best: Option<(&UiElement, f64)> = None;
    for element in elements {
        if let Some(score) = score_element(element, criteria, min_similarity) {
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((element, score));
            }
        }
    }
    best.filter(|(_, score)| *score >= min_similarity)
        .map(|(element, _)| element)
}

/// All qualifying candidates, sorted by descending score. The sort is
/// stable, so equal scores keep document order.
pub fn find_elements<'a>(
    elements: &'a [UiElement],
    criteria: &MatchCriteria,
    min_similarity: f64,
) -> Vec<ScoredElement<'a>> {
    let mut scored: Vec<ScoredElement<'a>> = elements
        .iter()
        .filter_map(|element| {
            score_element(element, criteria, min_similarity)
                .filter(|score| *score >= min_similarity)
                .map(|score| ScoredElement { element, score })
        })
        .collect();
    scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    scored
}

// ── Similarity ────────────────────────────────────────────────────

/// Normalized edit-distance similarity in [0, 1], case-insensitive.
/// `1.0` means equal (after lowercasing); `0.0` means no overlap
/// within the edit budget of the longer string.
pub fn similarity(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.to_lowercase().chars().collect();
    let b: Vec<char> = b.to_lowercase().chars().collect();
    let longest = a.len().max(b.len());
    if longest == 0 {
        return 1.0;
    }
    let distance = levenshtein(&a, &b);
    1.0 - (distance as f64 / longest as f64)
}

/// Two-row Levenshtein distance.
fn levenshtein(a: &[char], b: &[char]) -> usize {
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0usize; b.len() + 1];

    for (i, &ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, &cb) in b.iter().enumerate() {
            let substitution = prev[j] + usize::from(ca != cb);
            curr[j + 1] = substitution.min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}
