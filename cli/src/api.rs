use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use reqwest::blocking::{multipart, Client};
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use serde::Deserialize;

/// Answer to a submitted enhancement.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnhanceAccepted {
    pub process_id: String,
    pub eta: f64,
    #[serde(default)]
    pub status: Option<String>,
    pub is_async: bool,
}

/// Normalized status body from GET /api/v1/status/{process_id}.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusReport {
    pub state: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub progress: u32,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub output_width: Option<u32>,
    #[serde(default)]
    pub output_height: Option<u32>,
    #[serde(default)]
    pub output_format: Option<String>,
    #[serde(default)]
    pub credits: Option<f64>,
}

/// Error body the server answers with (application/problem+json).
#[derive(Debug, Deserialize)]
struct ProblemBody {
    #[serde(default)]
    detail: Option<String>,
    #[serde(default)]
    code: Option<String>,
}

/// Resolved enhancement parameters, preset defaults already merged in.
/// Everything goes on the wire as multipart text fields.
#[derive(Debug, Default, Clone)]
pub struct EnhanceRequest {
    pub preset: String,
    pub detail: Option<f64>,
    pub scale: Option<u32>,
    pub creativity: Option<i64>,
    pub texture: Option<i64>,
    pub prompt: Option<String>,
    pub autoprompt: bool,
    pub focus_boost: Option<f64>,
    pub seed: Option<i64>,
    pub sharpen: Option<f64>,
    pub denoise: Option<f64>,
}

impl EnhanceRequest {
    pub fn form_fields(&self) -> Vec<(&'static str, String)> {
        let mut fields = vec![("preset", self.preset.clone())];
        if let Some(detail) = self.detail {
            fields.push(("detail", detail.to_string()));
        }
        if let Some(scale) = self.scale {
            fields.push(("scale", scale.to_string()));
        }
        if let Some(creativity) = self.creativity {
            fields.push(("creativity", creativity.to_string()));
        }
        if let Some(texture) = self.texture {
            fields.push(("texture", texture.to_string()));
        }
        if let Some(prompt) = &self.prompt {
            fields.push(("prompt", prompt.clone()));
        }
        if self.autoprompt {
            fields.push(("autoprompt", "true".to_string()));
        }
        if let Some(focus_boost) = self.focus_boost {
            fields.push(("focus_boost", focus_boost.to_string()));
        }
        if let Some(seed) = self.seed {
            fields.push(("seed", seed.to_string()));
        }
        if let Some(sharpen) = self.sharpen {
            fields.push(("sharpen", sharpen.to_string()));
        }
        if let Some(denoise) = self.denoise {
            fields.push(("denoise", denoise.to_string()));
        }
        fields
    }
}

/// Blocking client for the webenhance backend.
pub struct ApiClient {
    base: String,
    http: Client,
}

impl ApiClient {
    pub fn new(base: &str) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(600))
            .build()
            .context("building HTTP client")?;
        Ok(ApiClient {
            base: base.trim_end_matches('/').to_string(),
            http,
        })
    }

    pub fn enhance(
        &self,
        filename: &str,
        mime: &str,
        bytes: Vec<u8>,
        request: &EnhanceRequest,
    ) -> Result<EnhanceAccepted> {
        let part = multipart::Part::bytes(bytes)
            .file_name(filename.to_string())
            .mime_str(mime)
            .context("invalid MIME type for upload")?;
        let mut form = multipart::Form::new().part("image", part);
        for (name, value) in request.form_fields() {
            form = form.text(name, value);
        }

        let response = self
            .http
            .post(format!("{}/api/v1/enhance", self.base))
            .multipart(form)
            .send()
            .context("submitting enhancement")?;
        let response = check(response)?;
        response.json().context("parsing enhance response")
    }

    pub fn status(&self, process_id: &str) -> Result<StatusReport> {
        let response = self
            .http
            .get(format!("{}/api/v1/status/{process_id}", self.base))
            .send()
            .context("fetching status")?;
        let response = check(response)?;
        response.json().context("parsing status response")
    }

    /// Returns the enhanced bytes and their content type.
    pub fn download(&self, process_id: &str) -> Result<(Vec<u8>, String)> {
        let response = self
            .http
            .get(format!("{}/api/v1/download/{process_id}", self.base))
            .send()
            .context("downloading result")?;
        let response = check(response)?;
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("image/jpeg")
            .to_string();
        let bytes = response.bytes().context("reading result body")?;
        Ok((bytes.to_vec(), content_type))
    }
}

/// Surfaces the server's problem detail on non-2xx responses.
fn check(response: reqwest::blocking::Response) -> Result<reqwest::blocking::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().unwrap_or_default();
    if let Ok(problem) = serde_json::from_str::<ProblemBody>(&body) {
        let detail = problem.detail.unwrap_or_else(|| status.to_string());
        match problem.code {
            Some(code) => bail!("{code}: {detail}"),
            None => bail!("{detail}"),
        }
    }
    if status == StatusCode::NOT_FOUND {
        bail!("process not found");
    }
    Err(anyhow!("server answered {status}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn form_fields_carry_only_set_parameters() {
        let request = EnhanceRequest {
            preset: "basic".to_string(),
            detail: Some(0.5),
            scale: Some(2),
            ..EnhanceRequest::default()
        };
        assert_eq!(
            request.form_fields(),
            vec![
                ("preset", "basic".to_string()),
                ("detail", "0.5".to_string()),
                ("scale", "2".to_string()),
            ]
        );
    }

    #[test]
    fn autoprompt_serializes_as_literal_true() {
        let request = EnhanceRequest {
            preset: "redefine".to_string(),
            autoprompt: true,
            creativity: Some(3),
            ..EnhanceRequest::default()
        };
        let fields = request.form_fields();
        assert!(fields.contains(&("autoprompt", "true".to_string())));
        assert!(fields.contains(&("creativity", "3".to_string())));
        assert!(!fields.iter().any(|(name, _)| *name == "detail"));
    }

    #[test]
    fn status_report_tolerates_sparse_bodies() {
        let report: StatusReport = serde_json::from_str(r#"{"state":"pending"}"#).unwrap();
        assert_eq!(report.state, "pending");
        assert_eq!(report.progress, 0);
        assert!(report.error.is_none());

        let report: StatusReport = serde_json::from_str(
            r#"{"state":"done","status":"Completed","progress":100,"output_width":2048,"output_height":1536,"credits":0.5}"#,
        )
        .unwrap();
        assert_eq!(report.output_width, Some(2048));
        assert_eq!(report.credits, Some(0.5));
    }

    #[test]
    fn accepted_parses_camel_case_contract() {
        let accepted: EnhanceAccepted = serde_json::from_str(
            r#"{"processId":"direct_1700000000000_ab12cd34e","eta":0.0,"status":"completed","isAsync":false}"#,
        )
        .unwrap();
        assert!(accepted.process_id.starts_with("direct_"));
        assert!(!accepted.is_async);
        assert_eq!(accepted.status.as_deref(), Some("completed"));
    }
}
