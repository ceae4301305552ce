use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use anyhow::{bail, Context, Result};

use crate::api::{ApiClient, EnhanceRequest, StatusReport};

/// Polling constants from the web client: first check after 2 s, then every
/// 3 s, give up after 5 minutes.
pub const FIRST_POLL_DELAY: Duration = Duration::from_secs(2);
pub const POLL_INTERVAL: Duration = Duration::from_secs(3);
pub const MAX_POLL_TIME: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone, Copy)]
pub struct PollOptions {
    pub first_delay: Duration,
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for PollOptions {
    fn default() -> Self {
        PollOptions {
            first_delay: FIRST_POLL_DELAY,
            interval: POLL_INTERVAL,
            timeout: MAX_POLL_TIME,
        }
    }
}

/// What a status report means for the polling loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollDecision {
    Continue,
    Finished,
    Failed(String),
}

pub fn decide(report: &StatusReport) -> PollDecision {
    match report.state.as_str() {
        "done" => PollDecision::Finished,
        "failed" => PollDecision::Failed(
            report
                .error
                .clone()
                .unwrap_or_else(|| "Enhancement failed".to_string()),
        ),
        "pending" | "processing" => PollDecision::Continue,
        other => PollDecision::Failed(format!("Unknown status: {other}")),
    }
}

pub fn default_output_name(preset: &str) -> PathBuf {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    PathBuf::from(format!("enhanced-{preset}-{millis}.jpg"))
}

/// Runs the full submit → poll → download sequence and writes the result to
/// `out`. Returns the path written.
pub fn run(
    client: &ApiClient,
    filename: &str,
    mime: &str,
    bytes: Vec<u8>,
    request: &EnhanceRequest,
    options: PollOptions,
    out: Option<PathBuf>,
) -> Result<PathBuf> {
    let accepted = client.enhance(filename, mime, bytes, request)?;
    println!("Process {} started", accepted.process_id);
    if accepted.is_async && accepted.eta > 0.0 {
        println!("Estimated time: {:.0}s", accepted.eta);
    }

    if accepted.is_async {
        poll_until_done(client, &accepted.process_id, options)?;
    }

    let (result, content_type) = client.download(&accepted.process_id)?;
    let out = out.unwrap_or_else(|| default_output_name(&request.preset));
    std::fs::write(&out, &result)
        .with_context(|| format!("writing result to {}", out.display()))?;
    println!(
        "Saved {} ({} bytes, {})",
        out.display(),
        result.len(),
        content_type
    );
    Ok(out)
}

fn poll_until_done(client: &ApiClient, process_id: &str, options: PollOptions) -> Result<()> {
    let started = Instant::now();
    let mut last_progress = 0;
    thread::sleep(options.first_delay);
    loop {
        let report = client.status(process_id)?;
        if report.progress > last_progress {
            last_progress = report.progress;
            println!("Progress: {}%", report.progress);
        }
        match decide(&report) {
            PollDecision::Finished => {
                if let (Some(w), Some(h)) = (report.output_width, report.output_height) {
                    println!("Enhanced to {w}x{h}px");
                }
                return Ok(());
            }
            PollDecision::Failed(error) => bail!("{error}"),
            PollDecision::Continue => {
                if started.elapsed() > options.timeout {
                    bail!(
                        "enhancement timed out after {}s",
                        options.timeout.as_secs()
                    );
                }
                thread::sleep(options.interval);
            }
        }
    }
}

/// One-shot download used by the `download` subcommand.
pub fn download_to(client: &ApiClient, process_id: &str, out: &Path) -> Result<()> {
    let (bytes, content_type) = client.download(process_id)?;
    std::fs::write(out, &bytes)
        .with_context(|| format!("writing result to {}", out.display()))?;
    println!(
        "Saved {} ({} bytes, {})",
        out.display(),
        bytes.len(),
        content_type
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(state: &str) -> StatusReport {
        StatusReport {
            state: state.to_string(),
            status: None,
            progress: 0,
            error: None,
            output_width: None,
            output_height: None,
            output_format: None,
            credits: None,
        }
    }

    #[test]
    fn pending_and_processing_keep_polling() {
        assert_eq!(decide(&report("pending")), PollDecision::Continue);
        assert_eq!(decide(&report("processing")), PollDecision::Continue);
    }

    #[test]
    fn done_finishes() {
        assert_eq!(decide(&report("done")), PollDecision::Finished);
    }

    #[test]
    fn failed_surfaces_the_report_error() {
        let mut failing = report("failed");
        failing.error = Some("model exploded".to_string());
        assert_eq!(
            decide(&failing),
            PollDecision::Failed("model exploded".to_string())
        );
        assert_eq!(
            decide(&report("failed")),
            PollDecision::Failed("Enhancement failed".to_string())
        );
    }

    #[test]
    fn unknown_states_fail_loud() {
        match decide(&report("warming-up")) {
            PollDecision::Failed(message) => assert!(message.contains("warming-up")),
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[test]
    fn default_output_name_embeds_preset() {
        let name = default_output_name("superfocus");
        let name = name.to_string_lossy();
        assert!(name.starts_with("enhanced-superfocus-"));
        assert!(name.ends_with(".jpg"));
    }
}
