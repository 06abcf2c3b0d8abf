use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TrialLabel;
use crate::result::round;
use crate::stage::ExtractionStats;
use crate::sync::SynchronizationMap;
use crate::trial::TrialSeries;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WarningCode {
    HighOcclusion,
    LowVisibility,
    ModelTimeouts,
    LowConfidenceAnchor,
    FpsMismatch,
    ViewMismatch,
}

impl WarningCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            WarningCode::HighOcclusion => "HIGH_OCCLUSION",
            WarningCode::LowVisibility => "LOW_VISIBILITY",
            WarningCode::ModelTimeouts => "MODEL_TIMEOUTS",
            WarningCode::LowConfidenceAnchor => "LOW_CONFIDENCE_ANCHOR",
            WarningCode::FpsMismatch => "FPS_MISMATCH",
            WarningCode::ViewMismatch => "VIEW_MISMATCH",
        }
    }
}

impl fmt::Display for WarningCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityWarning {
    pub code: WarningCode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trial: Option<TrialLabel>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialQuality {
    pub sampled_frames: usize,
    pub detected_frames: usize,
    #[serde(serialize_with = "round::two_decimals")]
    pub detection_rate: f64,
    #[serde(serialize_with = "round::two_decimals")]
    pub mean_visibility: f64,
    #[serde(serialize_with = "round::two_decimals")]
    pub confidence: f64,
    #[serde(serialize_with = "round::one_decimal")]
    pub occlusion_pct: f64,
    pub timeouts: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    /// The weaker of the two trial confidences.
    #[serde(serialize_with = "round::two_decimals")]
    pub overall_confidence: f64,
    #[serde(rename = "trial_A")]
    pub trial_a: TrialQuality,
    #[serde(rename = "trial_B")]
    pub trial_b: TrialQuality,
    pub warnings: Vec<QualityWarning>,
}

impl QualityReport {
    pub fn has_warning(&self, code: WarningCode) -> bool {
        self.warnings.iter().any(|warning| warning.code == code)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QualityConfig {
    pub max_occlusion_pct: f64,
    pub min_mean_visibility: f64,
    pub min_anchor_confidence: f64,
    /// Largest source frame rate difference still treated as equal.
    pub fps_tolerance: f64,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            max_occlusion_pct: 20.0,
            min_mean_visibility: 0.5,
            min_anchor_confidence: 0.5,
            fps_tolerance: 0.5,
        }
    }
}

/// What the scorer needs to know about one trial.
#[derive(Debug, Clone, Copy)]
pub struct TrialEvidence<'a> {
    pub label: TrialLabel,
    pub series: &'a TrialSeries,
    pub stats: &'a ExtractionStats,
}

pub struct QualityScorer {
    config: QualityConfig,
}

impl QualityScorer {
    pub fn new(config: QualityConfig) -> Self {
        Self { config }
    }

    /// Protocol rates are compared first; trials sampled alike can still
    /// come from sources recorded at different rates.
    fn fps_mismatch(&self, a: &TrialEvidence<'_>, b: &TrialEvidence<'_>) -> Option<String> {
        let differ = |x: f64, y: f64| (x - y).abs() > self.config.fps_tolerance;
        let (protocol_a, protocol_b) = (a.series.protocol().fps, b.series.protocol().fps);
        if differ(protocol_a, protocol_b) {
            return Some(format!(
                "trials were sampled at different rates ({protocol_a:.2} fps vs {protocol_b:.2} fps)"
            ));
        }
        match (a.stats.source_fps, b.stats.source_fps) {
            (Some(source_a), Some(source_b)) if differ(source_a, source_b) => Some(format!(
                "source frame rates differ ({source_a:.2} fps vs {source_b:.2} fps)"
            )),
            _ => None,
        }
    }

    pub fn trial(&self, evidence: TrialEvidence<'_>) -> TrialQuality {
        let sampled = evidence.series.len();
        let detected = evidence.series.detected_count();
        let detection_rate = if sampled == 0 {
            0.0
        } else {
            detected as f64 / sampled as f64
        };
        let mean_visibility = evidence.series.mean_visibility().unwrap_or(0.0);
        TrialQuality {
            sampled_frames: sampled,
            detected_frames: detected,
            detection_rate,
            mean_visibility,
            confidence: detection_rate * mean_visibility,
            occlusion_pct: 100.0 * (1.0 - detection_rate),
            timeouts: evidence.stats.timeouts,
        }
    }

    pub fn score(
        &self,
        a: TrialEvidence<'_>,
        b: TrialEvidence<'_>,
        synchronization: &SynchronizationMap,
    ) -> QualityReport {
        let quality_a = self.trial(a);
        let quality_b = self.trial(b);

        let mut warnings = Vec::new();
        for (evidence, quality) in [(a, &quality_a), (b, &quality_b)] {
            self.trial_warnings(evidence.label, quality, &mut warnings);
        }
        for (label, anchor) in [
            (TrialLabel::A, &synchronization.anchor_a),
            (TrialLabel::B, &synchronization.anchor_b),
        ] {
            if anchor.confidence < self.config.min_anchor_confidence {
                warnings.push(QualityWarning {
                    code: WarningCode::LowConfidenceAnchor,
                    trial: Some(label),
                    message: format!(
                        "{label} anchor ({}) detected with low confidence {:.2}",
                        anchor.kind.as_str(),
                        anchor.confidence
                    ),
                });
            }
        }

        if let Some(message) = self.fps_mismatch(&a, &b) {
            warnings.push(QualityWarning {
                code: WarningCode::FpsMismatch,
                trial: None,
                message,
            });
        }
        let (view_a, view_b) = (a.series.protocol().view, b.series.protocol().view);
        if view_a != view_b {
            warnings.push(QualityWarning {
                code: WarningCode::ViewMismatch,
                trial: None,
                message: format!("camera views differ ({view_a} vs {view_b})"),
            });
        }

        QualityReport {
            overall_confidence: quality_a.confidence.min(quality_b.confidence),
            trial_a: quality_a,
            trial_b: quality_b,
            warnings,
        }
    }

    fn trial_warnings(&self, label: TrialLabel, quality: &TrialQuality, warnings: &mut Vec<QualityWarning>) {
        if quality.occlusion_pct > self.config.max_occlusion_pct {
            warnings.push(QualityWarning {
                code: WarningCode::HighOcclusion,
                trial: Some(label),
                message: format!(
                    "{label}: no pose detected in {:.1}% of sampled frames",
                    quality.occlusion_pct
                ),
            });
        }
        if quality.detected_frames > 0 && quality.mean_visibility < self.config.min_mean_visibility {
            warnings.push(QualityWarning {
                code: WarningCode::LowVisibility,
                trial: Some(label),
                message: format!(
                    "{label}: mean landmark visibility {:.2}",
                    quality.mean_visibility
                ),
            });
        }
        if quality.timeouts > 0 {
            warnings.push(QualityWarning {
                code: WarningCode::ModelTimeouts,
                trial: Some(label),
                message: format!(
                    "{label}: pose model timed out on {} frame(s)",
                    quality.timeouts
                ),
            });
        }
    }
}

impl Default for QualityScorer {
    fn default() -> Self {
        Self::new(QualityConfig::default())
    }
}
