//! Skin analysis records and the analyzer that produces them
//!
//! The only analyzer shipped is [`MockAnalyzer`], which picks one of three
//! canned results at random. It stands in until a dedicated analysis model
//! exists and is not covered by any determinism guarantee.

use std::path::Path;

use chrono::Utc;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Version string attached to every analysis
pub const MODEL_VERSION: &str = "DermaCare-AI-v1.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkinCondition {
    #[serde(rename = "Healthy Skin")]
    HealthySkin,
    #[serde(rename = "Acne")]
    Acne,
    #[serde(rename = "Sun Damage")]
    SunDamage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Normal,
    Mild,
    Moderate,
}

/// Result of analyzing one skin image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkinAnalysis {
    pub condition: SkinCondition,
    pub severity: Severity,
    /// Percentage, 0-100
    pub confidence: f32,
    pub description: String,
    pub features: Vec<String>,
    pub recommendations: Vec<String>,
    /// RFC 3339
    pub timestamp: String,
    pub model_version: String,
}

/// Produces an analysis for a stored upload
pub trait Analyzer: Send + Sync {
    fn analyze(&self, image_path: &Path) -> SkinAnalysis;
}

struct Template {
    condition: SkinCondition,
    severity: Severity,
    confidence_range: (f32, f32),
    description: &'static str,
    features: [&'static str; 4],
    recommendations: [&'static str; 4],
}

static TEMPLATES: [Template; 3] = [
    Template {
        condition: SkinCondition::HealthySkin,
        severity: Severity::Normal,
        confidence_range: (90.0, 98.0),
        description: "Your skin appears healthy with no visible signs of concerning conditions.",
        features: [
            "Even skin tone",
            "No visible lesions",
            "Good texture",
            "Appropriate pigmentation",
        ],
        recommendations: [
            "Continue your current skincare routine",
            "Use sunscreen daily (SPF 30+)",
            "Stay hydrated",
            "Regular skin check-ups",
        ],
    },
    Template {
        condition: SkinCondition::Acne,
        severity: Severity::Mild,
        confidence_range: (80.0, 95.0),
        description: "Mild acne detected. This is a common skin condition that can be managed with proper care.",
        features: [
            "Small inflammatory lesions",
            "Some comedones present",
            "Localized inflammation",
            "No scarring detected",
        ],
        recommendations: [
            "Use gentle, non-comedogenic cleanser",
            "Apply topical retinoids or salicylic acid",
            "Avoid touching affected areas",
            "Consider consulting a dermatologist",
        ],
    },
    Template {
        condition: SkinCondition::SunDamage,
        severity: Severity::Moderate,
        confidence_range: (75.0, 90.0),
        description: "Signs of sun damage are visible. Early intervention can help prevent further damage.",
        features: [
            "Hyperpigmentation spots",
            "Uneven skin tone",
            "Fine lines present",
            "Texture changes",
        ],
        recommendations: [
            "Use broad-spectrum sunscreen daily",
            "Apply vitamin C serum",
            "Consider professional treatments",
            "Regular dermatologist check-ups",
        ],
    },
];

/// Randomly picks one of the canned analyses; the image is not inspected
#[derive(Debug, Default, Clone, Copy)]
pub struct MockAnalyzer;

impl Analyzer for MockAnalyzer {
    fn analyze(&self, image_path: &Path) -> SkinAnalysis {
        let mut rng = rand::thread_rng();
        // TEMPLATES is never empty
        let template = TEMPLATES.choose(&mut rng).unwrap_or(&TEMPLATES[0]);
        let (low, high) = template.confidence_range;

        tracing::debug!(
            "Mock analysis of {:?}: {:?}",
            image_path,
            template.condition
        );

        SkinAnalysis {
            condition: template.condition,
            severity: template.severity,
            confidence: rng.gen_range(low..=high),
            description: template.description.to_string(),
            features: template.features.iter().map(|s| s.to_string()).collect(),
            recommendations: template
                .recommendations
                .iter()
                .map(|s| s.to_string())
                .collect(),
            timestamp: Utc::now().to_rfc3339(),
            model_version: MODEL_VERSION.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_condition_serializes_as_display_name() {
        let json = serde_json::to_string(&SkinCondition::HealthySkin).unwrap();
        assert_eq!(json, "\"Healthy Skin\"");
        let parsed: SkinCondition = serde_json::from_str("\"Sun Damage\"").unwrap();
        assert_eq!(parsed, SkinCondition::SunDamage);
    }

    #[test]
    fn test_mock_confidence_stays_in_template_range() {
        let analyzer = MockAnalyzer;
        for _ in 0..50 {
            let analysis = analyzer.analyze(Path::new("uploads/x.png"));
            let template = TEMPLATES
                .iter()
                .find(|t| t.condition == analysis.condition)
                .unwrap();
            let (low, high) = template.confidence_range;
            assert!(analysis.confidence >= low && analysis.confidence <= high);
            assert_eq!(analysis.severity, template.severity);
            assert_eq!(analysis.features.len(), 4);
            assert_eq!(analysis.model_version, MODEL_VERSION);
        }
    }

    #[test]
    fn test_unknown_condition_is_rejected() {
        let err = serde_json::from_str::<SkinAnalysis>(r#"{"condition": "Eczema"}"#);
        assert!(err.is_err());
    }
}
