//! Typed analysis results and the parsing boundary for model output
//!
//! The model returns loosely shaped JSON: pros and cons may be bare strings or
//! `{title, detail}` objects, scores may be fractional, and the document is
//! sometimes wrapped in a markdown fence. Everything is normalized here so the
//! rest of the crate only sees [`HealthAnalysis`] and [`ComparisonAnalysis`].

use serde::{Deserialize, Serialize};

use crate::error::AnalysisError;
use crate::mode::ScanMode;

pub const MAX_SCORE: u8 = 100;

/// One benefit or concern about a product
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthPoint {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl HealthPoint {
    pub fn text(&self) -> String {
        match &self.detail {
            Some(detail) if !detail.is_empty() => format!("{}: {}", self.title, detail),
            _ => self.title.clone(),
        }
    }
}

/// Health scoring for a single product, on a 0-100 scale
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthAnalysis {
    pub product_name: String,
    pub score: u8,
    pub explanation: String,
    pub pros: Vec<HealthPoint>,
    pub cons: Vec<HealthPoint>,
    pub additives: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alternatives: Option<Vec<String>>,
}

impl HealthAnalysis {
    pub fn verdict(&self) -> &'static str {
        match self.score {
            80..=MAX_SCORE => "Excellent Choice",
            60..=79 => "Good Choice",
            _ => "Consume Moderately",
        }
    }
}

/// Side-by-side scoring of up to three products
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonAnalysis {
    pub products: Vec<HealthAnalysis>,
    pub winner: String,
    pub comparison_summary: String,
}

impl ComparisonAnalysis {
    /// The product named as winner, falling back to the highest score
    pub fn winning_product(&self) -> Option<&HealthAnalysis> {
        let winner = self.winner.trim();
        self.products
            .iter()
            .find(|p| p.product_name.trim().eq_ignore_ascii_case(winner))
            .or_else(|| self.products.iter().max_by_key(|p| p.score))
    }
}

/// Result of one successful analysis call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Analysis {
    Single(HealthAnalysis),
    Comparison(ComparisonAnalysis),
}

impl Analysis {
    /// The analysis recorded in scan history for this result
    pub fn headline(&self) -> Option<&HealthAnalysis> {
        match self {
            Analysis::Single(a) => Some(a),
            Analysis::Comparison(c) => c.winning_product(),
        }
    }
}

// Wire shapes as produced by the model

#[derive(Deserialize)]
#[serde(untagged)]
enum RawPoint {
    Text(String),
    Detailed {
        title: String,
        #[serde(default)]
        detail: Option<String>,
    },
}

impl From<RawPoint> for HealthPoint {
    fn from(raw: RawPoint) -> Self {
        match raw {
            RawPoint::Text(title) => HealthPoint { title, detail: None },
            RawPoint::Detailed { title, detail } => HealthPoint {
                title,
                detail: detail.filter(|d| !d.trim().is_empty()),
            },
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawHealthAnalysis {
    product_name: String,
    score: f64,
    explanation: String,
    #[serde(default)]
    pros: Vec<RawPoint>,
    #[serde(default)]
    cons: Vec<RawPoint>,
    #[serde(default)]
    additives: Vec<String>,
    #[serde(default)]
    alternatives: Option<Vec<String>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawComparison {
    products: Vec<RawHealthAnalysis>,
    winner: String,
    comparison_summary: String,
}

impl TryFrom<RawHealthAnalysis> for HealthAnalysis {
    type Error = AnalysisError;

    fn try_from(raw: RawHealthAnalysis) -> Result<Self, Self::Error> {
        if !raw.score.is_finite() || raw.score < 0.0 || raw.score > f64::from(MAX_SCORE) {
            return Err(AnalysisError::new(format!(
                "score {} outside 0-{}",
                raw.score, MAX_SCORE
            )));
        }
        if raw.product_name.trim().is_empty() {
            return Err(AnalysisError::new("missing product name"));
        }

        Ok(HealthAnalysis {
            product_name: raw.product_name,
            score: raw.score.round() as u8,
            explanation: raw.explanation,
            pros: raw.pros.into_iter().map(HealthPoint::from).collect(),
            cons: raw.cons.into_iter().map(HealthPoint::from).collect(),
            additives: raw.additives,
            alternatives: raw.alternatives,
        })
    }
}

/// Remove a surrounding ```json fence if the model added one
fn unfence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// Parse raw model output into the result shape expected for `mode`
pub fn parse_analysis(text: &str, mode: ScanMode) -> Result<Analysis, AnalysisError> {
    let json = unfence(text);

    match mode {
        ScanMode::Scan | ScanMode::Nutrition => {
            let raw: RawHealthAnalysis = serde_json::from_str(json)?;
            Ok(Analysis::Single(raw.try_into()?))
        }
        ScanMode::Compare => {
            let raw: RawComparison = serde_json::from_str(json)?;
            if raw.products.is_empty() {
                return Err(AnalysisError::new("comparison contained no products"));
            }
            let products = raw
                .products
                .into_iter()
                .map(HealthAnalysis::try_from)
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Analysis::Comparison(ComparisonAnalysis {
                products,
                winner: raw.winner,
                comparison_summary: raw.comparison_summary,
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SINGLE: &str = r#"{
        "productName": "Oat Crunch",
        "score": 72.6,
        "explanation": "Whole grain but sweetened.",
        "pros": ["High fiber", {"title": "Whole grain", "detail": "Oats are the first ingredient"}],
        "cons": [{"title": "Added sugar", "detail": ""}],
        "additives": ["E471"]
    }"#;

    #[test]
    fn test_parse_single_normalizes_points() {
        let Analysis::Single(a) = parse_analysis(SINGLE, ScanMode::Scan).unwrap() else {
            panic!("expected single analysis");
        };
        assert_eq!(a.product_name, "Oat Crunch");
        assert_eq!(a.score, 73);
        assert_eq!(a.pros[0], HealthPoint { title: "High fiber".into(), detail: None });
        assert_eq!(a.pros[1].detail.as_deref(), Some("Oats are the first ingredient"));
        assert_eq!(a.cons[0].detail, None);
        assert_eq!(a.alternatives, None);
        assert_eq!(a.verdict(), "Good Choice");
    }

    #[test]
    fn test_parse_tolerates_code_fence() {
        let fenced = format!("```json\n{}\n```", SINGLE);
        assert!(parse_analysis(&fenced, ScanMode::Nutrition).is_ok());
    }

    #[test]
    fn test_parse_rejects_out_of_range_score() {
        let bad = SINGLE.replace("72.6", "140");
        assert!(parse_analysis(&bad, ScanMode::Scan).is_err());
    }

    #[test]
    fn test_parse_rejects_wrong_shape() {
        assert!(parse_analysis("{\"hello\": 1}", ScanMode::Scan).is_err());
        assert!(parse_analysis("not json", ScanMode::Scan).is_err());
        // A single-product document is not a comparison
        assert!(parse_analysis(SINGLE, ScanMode::Compare).is_err());
    }

    #[test]
    fn test_parse_comparison_and_winner() {
        let json = r#"{
            "products": [
                {"productName": "Brand A", "score": 40, "explanation": "", "pros": [], "cons": [], "additives": []},
                {"productName": "Brand B", "score": 85, "explanation": "", "pros": [], "cons": [], "additives": []}
            ],
            "winner": "brand b",
            "comparisonSummary": "B has less sugar."
        }"#;
        let Analysis::Comparison(c) = parse_analysis(json, ScanMode::Compare).unwrap() else {
            panic!("expected comparison");
        };
        assert_eq!(c.products.len(), 2);
        assert_eq!(c.winning_product().unwrap().product_name, "Brand B");
        assert_eq!(c.comparison_summary, "B has less sugar.");
    }

    #[test]
    fn test_unknown_winner_falls_back_to_best_score() {
        let c = ComparisonAnalysis {
            products: vec![
                parse_single("A", 30),
                parse_single("B", 90),
            ],
            winner: "C".into(),
            comparison_summary: String::new(),
        };
        assert_eq!(c.winning_product().unwrap().product_name, "B");
    }

    #[test]
    fn test_verdict_thresholds() {
        assert_eq!(parse_single("x", 80).verdict(), "Excellent Choice");
        assert_eq!(parse_single("x", 60).verdict(), "Good Choice");
        assert_eq!(parse_single("x", 59).verdict(), "Consume Moderately");
    }

    fn parse_single(name: &str, score: u8) -> HealthAnalysis {
        let json = format!(
            r#"{{"productName": "{}", "score": {}, "explanation": "", "pros": [], "cons": [], "additives": []}}"#,
            name, score
        );
        match parse_analysis(&json, ScanMode::Scan).unwrap() {
            Analysis::Single(a) => a,
            Analysis::Comparison(_) => unreachable!(),
        }
    }
}
