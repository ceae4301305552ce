use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use reqwest::header::CONTENT_TYPE;
use reqwest::{multipart, Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::models::config::AppConfig;
use crate::models::enhance::{EnhanceParams, ImageUpload, Preset};
use crate::models::error::AppError;
use crate::models::status::{JobState, StatusReport};

const RESULT_FETCH_MAX_ATTEMPTS: u32 = 3;
const RESULT_FETCH_BASE_DELAY_MS: u64 = 400;
const ERROR_DETAIL_MAX_CHARS: usize = 600;

/// What the vendor did with a submission. Generative models queue a job;
/// traditional models usually hand the enhanced image straight back.
pub enum SubmitOutcome {
    Queued { process_id: String, eta: f64 },
    Direct { bytes: Bytes, content_type: String },
}

/// Vendor acknowledgement for a queued enhancement.
#[derive(Debug, Deserialize)]
struct QueuedSubmission {
    process_id: String,
    #[serde(default)]
    eta: Option<f64>,
}

/// Raw vendor status body. Everything is optional; different vendor routes
/// and API revisions fill different subsets.
#[derive(Debug, Default, Deserialize)]
struct VendorStatus {
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    progress: Option<f64>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    output_width: Option<u32>,
    #[serde(default)]
    output_height: Option<u32>,
    #[serde(default)]
    output_format: Option<String>,
    #[serde(default)]
    credits: Option<f64>,
}

/// Presigned location of a finished result.
#[derive(Debug, Clone, Deserialize)]
pub struct DownloadTicket {
    pub download_url: String,
    #[serde(default)]
    pub expires: Option<i64>,
}

/// HTTP client for the Topaz Labs image API. Owns the credential; handlers
/// never see the key or the vendor's wire formats.
pub struct TopazClient {
    config: Arc<AppConfig>,
    client: Client,
}

impl TopazClient {
    pub fn new(config: Arc<AppConfig>) -> anyhow::Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.upstream_connect_timeout_secs))
            .timeout(Duration::from_secs(config.upstream_timeout_secs))
            .build()?;
        Ok(TopazClient { config, client })
    }

    fn api_key(&self) -> Result<&str, AppError> {
        self.config
            .topaz_api_key
            .as_deref()
            .ok_or(AppError::ApiKeyMissing)
    }

    fn vendor_url(&self, path: &str) -> String {
        format!("{}{}", self.config.topaz_base_url, path)
    }

    /// Submits an image for enhancement. The vendor decides the response
    /// shape: JSON means the job was queued, an image body means it was
    /// processed on the spot.
    pub async fn submit(
        &self,
        params: &EnhanceParams,
        image: &ImageUpload,
    ) -> Result<SubmitOutcome, AppError> {
        let api_key = self.api_key()?;
        let spec = params.preset.spec();
        let url = self.vendor_url(spec.route);

        let part = multipart::Part::stream(reqwest::Body::from(image.bytes.clone()))
            .file_name(image.filename.clone())
            .mime_str(&image.content_type)
            .map_err(|e| AppError::Internal(format!("Multipart error: {e}")))?;
        let mut form = multipart::Form::new().part("image", part);
        for (name, value) in submission_fields(params) {
            form = form.text(name, value);
        }

        debug!(preset = params.preset.as_str(), model = spec.model, url = %url, "Submitting to Topaz");
        let response = self
            .client
            .post(&url)
            .header("X-API-Key", api_key)
            .multipart(form)
            .send()
            .await
            .map_err(map_send_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "Topaz rejected submission");
            return Err(upstream_error(status, &body));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        if content_type.contains("application/json") {
            let queued: QueuedSubmission = response
                .json()
                .await
                .map_err(|e| AppError::UpstreamFailed(format!("Unparseable queue response: {e}")))?;
            let eta = queued.eta.unwrap_or(0.0);
            info!(process_id = %queued.process_id, eta, "Topaz queued enhancement");
            Ok(SubmitOutcome::Queued {
                process_id: queued.process_id,
                eta,
            })
        } else if content_type.starts_with("image/") {
            let bytes = response
                .bytes()
                .await
                .map_err(|e| AppError::UpstreamFailed(format!("Truncated direct result: {e}")))?;
            info!(size = bytes.len(), content_type = %content_type, "Topaz returned direct result");
            Ok(SubmitOutcome::Direct {
                bytes,
                content_type,
            })
        } else {
            Err(AppError::UnexpectedPayload(content_type))
        }
    }

    /// Polls the vendor for a queued job and folds the answer into the
    /// normalized report shape.
    pub async fn status(&self, process_id: &str) -> Result<StatusReport, AppError> {
        let api_key = self.api_key()?;
        let url = self.vendor_url(&format!("/image/v1/status/{process_id}"));

        let response = self
            .client
            .get(&url)
            .header("X-API-Key", api_key)
            .send()
            .await
            .map_err(map_send_error)?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(AppError::ProcessNotFound(process_id.to_string()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(upstream_error(status, &body));
        }

        let vendor: VendorStatus = response
            .json()
            .await
            .map_err(|e| AppError::UpstreamFailed(format!("Unparseable status response: {e}")))?;
        let report = normalize_status(vendor);
        debug!(process_id, state = ?report.state, progress = report.progress, "Topaz status");
        Ok(report)
    }

    /// Asks the vendor where a finished result can be fetched from.
    pub async fn resolve_download(&self, process_id: &str) -> Result<DownloadTicket, AppError> {
        let api_key = self.api_key()?;
        let url = self.vendor_url(&format!("/image/v1/download/{process_id}"));

        let response = self
            .client
            .get(&url)
            .header("X-API-Key", api_key)
            .send()
            .await
            .map_err(map_send_error)?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(AppError::ProcessNotFound(process_id.to_string()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(upstream_error(status, &body));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::UpstreamFailed(format!("Unparseable download ticket: {e}")))
    }

    /// Fetches the presigned result URL, retrying transient failures with
    /// exponential backoff. Returns the open response so the handler can
    /// stream the body through without buffering it.
    pub async fn fetch_result(&self, ticket: &DownloadTicket) -> Result<reqwest::Response, AppError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let failure = match self.client.get(&ticket.download_url).send().await {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) => {
                    let status = response.status();
                    let retryable =
                        status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS;
                    let body = response.text().await.unwrap_or_default();
                    let err = AppError::UpstreamFailed(format!(
                        "Result fetch failed with {}: {}",
                        status,
                        truncate_detail(&body)
                    ));
                    if !retryable {
                        return Err(err);
                    }
                    err
                }
                Err(e) => {
                    let retryable = e.is_timeout() || e.is_connect();
                    let err = map_send_error(e);
                    if !retryable {
                        return Err(err);
                    }
                    err
                }
            };

            if attempt >= RESULT_FETCH_MAX_ATTEMPTS {
                return Err(failure);
            }
            let delay = RESULT_FETCH_BASE_DELAY_MS << (attempt - 1);
            warn!(attempt, delay_ms = delay, "Retrying result fetch");
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
    }
}

/// Form fields the vendor expects for a submission. Which parameters go on
/// the wire depends on the preset's model family; `model` and `scale` are
/// always appended last.
pub fn submission_fields(params: &EnhanceParams) -> Vec<(&'static str, String)> {
    let mut fields: Vec<(&'static str, String)> = Vec::new();
    match params.preset {
        Preset::Basic | Preset::Sharp => {
            fields.push(("sharpen", params.sharpen.unwrap_or(params.detail).to_string()));
            if let Some(denoise) = params.denoise {
                fields.push(("denoise", denoise.to_string()));
            }
        }
        Preset::Recovery => {
            fields.push(("detail", params.detail.to_string()));
        }
        Preset::Redefine => {
            if params.autoprompt {
                fields.push(("autoprompt", "true".to_string()));
            } else if let Some(prompt) = &params.prompt {
                fields.push(("prompt", prompt.clone()));
            }
            if let Some(creativity) = params.creativity {
                fields.push(("creativity", creativity.to_string()));
            }
            if let Some(texture) = params.texture {
                fields.push(("texture", texture.to_string()));
            }
            if let Some(sharpen) = params.sharpen {
                fields.push(("sharpen", sharpen.to_string()));
            }
            if let Some(denoise) = params.denoise {
                fields.push(("denoise", denoise.to_string()));
            }
        }
        Preset::Superfocus => {
            fields.push(("detail", params.detail.to_string()));
            if let Some(focus_boost) = params.focus_boost {
                fields.push(("focus_boost", focus_boost.to_string()));
            }
            if let Some(seed) = params.seed {
                fields.push(("seed", seed.to_string()));
            }
        }
    }
    fields.push(("model", params.preset.spec().model.to_string()));
    fields.push(("scale", params.scale.to_string()));
    fields
}

fn normalize_status(vendor: VendorStatus) -> StatusReport {
    let state = vendor
        .state
        .as_deref()
        .and_then(JobState::from_label)
        .or_else(|| vendor.status.as_deref().and_then(JobState::from_label))
        .unwrap_or(JobState::Pending);
    let progress = vendor.progress.unwrap_or(0.0).clamp(0.0, 100.0).round() as u32;
    StatusReport {
        state,
        status: vendor.status,
        progress,
        error: vendor.error,
        output_width: vendor.output_width,
        output_height: vendor.output_height,
        output_format: vendor.output_format,
        credits: vendor.credits,
    }
}

fn upstream_error(status: StatusCode, body: &str) -> AppError {
    let detail = truncate_detail(body);
    if status.is_client_error() {
        AppError::UpstreamRejected {
            status: status.as_u16(),
            detail,
        }
    } else {
        AppError::UpstreamFailed(format!("Topaz API error {status}: {detail}"))
    }
}

fn map_send_error(e: reqwest::Error) -> AppError {
    if e.is_timeout() {
        AppError::UpstreamTimeout
    } else {
        AppError::UpstreamFailed(format!("Topaz request error: {e}"))
    }
}

fn truncate_detail(body: &str) -> String {
    if body.chars().count() <= ERROR_DETAIL_MAX_CHARS {
        body.to_string()
    } else {
        let cut: String = body.chars().take(ERROR_DETAIL_MAX_CHARS).collect();
        format!("{cut}…")
    }
}
