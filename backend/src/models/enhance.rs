use serde::Serialize;

use crate::models::error::AppError;

/// Enhancement presets exposed to clients. Each one maps to a fixed Topaz
/// model and vendor route; clients never pick models directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Preset {
    Basic,
    Sharp,
    Recovery,
    Superfocus,
    Redefine,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelCategory {
    Traditional,
    Generative,
}

/// Vendor-side routing for a preset.
#[derive(Debug, Clone, Copy)]
pub struct PresetSpec {
    pub model: &'static str,
    pub category: ModelCategory,
    /// Path under the Topaz base URL the submission goes to.
    pub route: &'static str,
}

impl Preset {
    pub const ALL: [Preset; 5] = [
        Preset::Basic,
        Preset::Sharp,
        Preset::Recovery,
        Preset::Superfocus,
        Preset::Redefine,
    ];

    pub fn parse(value: &str) -> Option<Preset> {
        match value {
            "basic" => Some(Preset::Basic),
            "sharp" => Some(Preset::Sharp),
            "recovery" => Some(Preset::Recovery),
            "superfocus" => Some(Preset::Superfocus),
            "redefine" => Some(Preset::Redefine),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Preset::Basic => "basic",
            Preset::Sharp => "sharp",
            Preset::Recovery => "recovery",
            Preset::Superfocus => "superfocus",
            Preset::Redefine => "redefine",
        }
    }

    pub fn spec(&self) -> PresetSpec {
        match self {
            Preset::Basic => PresetSpec {
                model: "Standard V2",
                category: ModelCategory::Traditional,
                route: "/image/v1/enhance",
            },
            Preset::Sharp => PresetSpec {
                model: "High Fidelity V2",
                category: ModelCategory::Traditional,
                route: "/image/v1/enhance",
            },
            Preset::Recovery => PresetSpec {
                model: "Recovery V2",
                category: ModelCategory::Generative,
                route: "/image/v1/enhance-gen/async",
            },
            Preset::Superfocus => PresetSpec {
                model: "Super Focus V2",
                category: ModelCategory::Generative,
                route: "/image/v1/sharpen-gen/async",
            },
            Preset::Redefine => PresetSpec {
                model: "Redefine",
                category: ModelCategory::Generative,
                route: "/image/v1/enhance-gen/async",
            },
        }
    }
}

/// Image part of a multipart submission, already size- and type-checked.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub filename: String,
    pub content_type: String,
    pub bytes: bytes::Bytes,
}

/// Raw text fields collected from the multipart form. Everything arrives as
/// strings; `validate` coerces and range-checks them in one pass.
#[derive(Debug, Default, Clone)]
pub struct EnhanceForm {
    pub preset: Option<String>,
    pub detail: Option<String>,
    pub scale: Option<String>,
    pub creativity: Option<String>,
    pub texture: Option<String>,
    pub prompt: Option<String>,
    pub autoprompt: Option<String>,
    pub focus_boost: Option<String>,
    pub seed: Option<String>,
    pub sharpen: Option<String>,
    pub denoise: Option<String>,
}

/// Validated enhancement parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct EnhanceParams {
    pub preset: Preset,
    pub detail: f64,
    pub scale: u32,
    pub creativity: Option<i64>,
    pub texture: Option<i64>,
    pub prompt: Option<String>,
    pub autoprompt: bool,
    pub focus_boost: Option<f64>,
    pub seed: Option<i64>,
    pub sharpen: Option<f64>,
    pub denoise: Option<f64>,
}

impl EnhanceForm {
    /// Routes a named multipart text field into the form. Unknown fields are
    /// ignored so clients can send extra metadata without breaking.
    pub fn set_field(&mut self, name: &str, value: String) {
        match name {
            "preset" => self.preset = Some(value),
            "detail" => self.detail = Some(value),
            "scale" => self.scale = Some(value),
            "creativity" => self.creativity = Some(value),
            "texture" => self.texture = Some(value),
            "prompt" => self.prompt = Some(value),
            "autoprompt" => self.autoprompt = Some(value),
            "focus_boost" => self.focus_boost = Some(value),
            "seed" => self.seed = Some(value),
            "sharpen" => self.sharpen = Some(value),
            "denoise" => self.denoise = Some(value),
            _ => {}
        }
    }

    /// Checks every field and accumulates all failures into a single
    /// `ValidationError` instead of stopping at the first one.
    pub fn validate(self) -> Result<EnhanceParams, AppError> {
        let mut errors: Vec<String> = Vec::new();

        let preset = match self.preset.as_deref() {
            None => {
                errors.push("preset is required".to_string());
                None
            }
            Some(raw) => match Preset::parse(raw) {
                Some(p) => Some(p),
                None => {
                    errors.push(format!(
                        "preset must be one of basic, sharp, recovery, superfocus, redefine (got '{raw}')"
                    ));
                    None
                }
            },
        };

        let detail = match self.detail.as_deref() {
            None => {
                errors.push("detail is required".to_string());
                None
            }
            Some(raw) => parse_ratio("detail", raw, 0.0, 1.0, &mut errors),
        };

        let scale = match self.scale.as_deref() {
            None => {
                errors.push("scale is required".to_string());
                None
            }
            Some(raw) => match raw.parse::<u32>() {
                Ok(1) => Some(1),
                Ok(2) => Some(2),
                Ok(4) => Some(4),
                _ => {
                    errors.push("scale must be 1, 2, or 4".to_string());
                    None
                }
            },
        };

        let creativity = self
            .creativity
            .as_deref()
            .and_then(|raw| parse_integer("creativity", raw, 1, 6, &mut errors));
        let texture = self
            .texture
            .as_deref()
            .and_then(|raw| parse_integer("texture", raw, 1, 5, &mut errors));

        let prompt = match self.prompt {
            Some(p) if p.chars().count() > 1024 => {
                errors.push("prompt must be at most 1024 characters".to_string());
                None
            }
            other => other,
        };

        let autoprompt = self.autoprompt.as_deref() == Some("true");

        let focus_boost = self
            .focus_boost
            .as_deref()
            .and_then(|raw| parse_ratio("focus_boost", raw, 0.25, 1.0, &mut errors));

        let seed = match self.seed.as_deref() {
            None => None,
            Some(raw) => match raw.parse::<i64>() {
                Ok(v) => Some(v),
                Err(_) => {
                    errors.push("seed must be an integer".to_string());
                    None
                }
            },
        };

        let sharpen = self
            .sharpen
            .as_deref()
            .and_then(|raw| parse_ratio("sharpen", raw, 0.0, 1.0, &mut errors));
        let denoise = self
            .denoise
            .as_deref()
            .and_then(|raw| parse_ratio("denoise", raw, 0.0, 1.0, &mut errors));

        if !errors.is_empty() {
            return Err(AppError::ValidationError(errors.join("; ")));
        }

        // Unreachable fallbacks: a missing required field pushed an error above.
        Ok(EnhanceParams {
            preset: preset.ok_or_else(|| AppError::Internal("preset lost".into()))?,
            detail: detail.ok_or_else(|| AppError::Internal("detail lost".into()))?,
            scale: scale.ok_or_else(|| AppError::Internal("scale lost".into()))?,
            creativity,
            texture,
            prompt,
            autoprompt,
            focus_boost,
            seed,
            sharpen,
            denoise,
        })
    }
}

fn parse_ratio(
    name: &'static str,
    raw: &str,
    min: f64,
    max: f64,
    errors: &mut Vec<String>,
) -> Option<f64> {
    match raw.parse::<f64>() {
        Ok(v) if v.is_finite() && v >= min && v <= max => Some(v),
        Ok(_) => {
            errors.push(format!("{name} must be between {min} and {max}"));
            None
        }
        Err(_) => {
            errors.push(format!("{name} must be a number"));
            None
        }
    }
}

fn parse_integer(
    name: &'static str,
    raw: &str,
    min: i64,
    max: i64,
    errors: &mut Vec<String>,
) -> Option<i64> {
    match raw.parse::<i64>() {
        Ok(v) if (min..=max).contains(&v) => Some(v),
        Ok(_) => {
            errors.push(format!("{name} must be between {min} and {max}"));
            None
        }
        Err(_) => {
            errors.push(format!("{name} must be an integer"));
            None
        }
    }
}

/// Response body for POST /api/v1/enhance.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnhanceAccepted {
    pub process_id: String,
    pub eta: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    pub is_async: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_form(preset: &str) -> EnhanceForm {
        let mut form = EnhanceForm::default();
        form.set_field("preset", preset.to_string());
        form.set_field("detail", "0.5".to_string());
        form.set_field("scale", "2".to_string());
        form
    }

    fn validation_detail(err: AppError) -> String {
        match err {
            AppError::ValidationError(detail) => detail,
            other => panic!("expected ValidationError, got {other:?}"),
        }
    }

    #[test]
    fn accepts_minimal_basic_form() {
        let params = minimal_form("basic").validate().unwrap();
        assert_eq!(params.preset, Preset::Basic);
        assert_eq!(params.detail, 0.5);
        assert_eq!(params.scale, 2);
        assert!(!params.autoprompt);
        assert!(params.creativity.is_none());
    }

    #[test]
    fn coerces_all_optional_fields() {
        let mut form = minimal_form("redefine");
        form.set_field("creativity", "4".to_string());
        form.set_field("texture", "3".to_string());
        form.set_field("prompt", "a misty harbor".to_string());
        form.set_field("sharpen", "0.3".to_string());
        form.set_field("denoise", "0.2".to_string());
        form.set_field("seed", "-7".to_string());
        let params = form.validate().unwrap();
        assert_eq!(params.creativity, Some(4));
        assert_eq!(params.texture, Some(3));
        assert_eq!(params.prompt.as_deref(), Some("a misty harbor"));
        assert_eq!(params.sharpen, Some(0.3));
        assert_eq!(params.denoise, Some(0.2));
        assert_eq!(params.seed, Some(-7));
    }

    #[test]
    fn missing_required_fields_accumulate() {
        let detail = validation_detail(EnhanceForm::default().validate().unwrap_err());
        assert!(detail.contains("preset is required"));
        assert!(detail.contains("detail is required"));
        assert!(detail.contains("scale is required"));
    }

    #[test]
    fn rejects_unknown_preset() {
        let mut form = minimal_form("basic");
        form.set_field("preset", "ultra".to_string());
        let detail = validation_detail(form.validate().unwrap_err());
        assert!(detail.contains("'ultra'"));
    }

    #[test]
    fn rejects_out_of_range_numbers() {
        let mut form = minimal_form("superfocus");
        form.set_field("detail", "1.5".to_string());
        form.set_field("focus_boost", "0.1".to_string());
        let detail = validation_detail(form.validate().unwrap_err());
        assert!(detail.contains("detail must be between 0 and 1"));
        assert!(detail.contains("focus_boost must be between 0.25 and 1"));
    }

    #[test]
    fn rejects_scale_outside_allowed_set() {
        let mut form = minimal_form("basic");
        form.set_field("scale", "3".to_string());
        let detail = validation_detail(form.validate().unwrap_err());
        assert_eq!(detail, "scale must be 1, 2, or 4");
    }

    #[test]
    fn rejects_non_numeric_input() {
        let mut form = minimal_form("basic");
        form.set_field("detail", "soft".to_string());
        form.set_field("creativity", "lots".to_string());
        form.set_field("seed", "4.5".to_string());
        let detail = validation_detail(form.validate().unwrap_err());
        assert!(detail.contains("detail must be a number"));
        assert!(detail.contains("creativity must be an integer"));
        assert!(detail.contains("seed must be an integer"));
    }

    #[test]
    fn rejects_overlong_prompt() {
        let mut form = minimal_form("redefine");
        form.set_field("prompt", "x".repeat(1025));
        let detail = validation_detail(form.validate().unwrap_err());
        assert!(detail.contains("prompt must be at most 1024 characters"));
    }

    #[test]
    fn autoprompt_is_true_only_for_literal_true() {
        for (raw, expected) in [("true", true), ("True", false), ("1", false), ("", false)] {
            let mut form = minimal_form("redefine");
            form.set_field("autoprompt", raw.to_string());
            assert_eq!(form.validate().unwrap().autoprompt, expected, "raw={raw:?}");
        }
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let mut form = minimal_form("basic");
        form.set_field("telemetry", "on".to_string());
        assert!(form.validate().is_ok());
    }

    #[test]
    fn preset_routing_matches_model_table() {
        assert_eq!(Preset::Basic.spec().model, "Standard V2");
        assert_eq!(Preset::Sharp.spec().model, "High Fidelity V2");
        assert_eq!(Preset::Basic.spec().route, "/image/v1/enhance");
        assert_eq!(Preset::Sharp.spec().route, "/image/v1/enhance");
        assert_eq!(Preset::Recovery.spec().route, "/image/v1/enhance-gen/async");
        assert_eq!(
            Preset::Superfocus.spec().route,
            "/image/v1/sharpen-gen/async"
        );
        assert_eq!(Preset::Redefine.spec().route, "/image/v1/enhance-gen/async");
        assert_eq!(
            Preset::Superfocus.spec().category,
            ModelCategory::Generative
        );
        assert_eq!(Preset::Basic.spec().category, ModelCategory::Traditional);
    }

    #[test]
    fn preset_parse_round_trips() {
        for preset in Preset::ALL {
            assert_eq!(Preset::parse(preset.as_str()), Some(preset));
        }
        assert_eq!(Preset::parse("BASIC"), None);
    }
}
