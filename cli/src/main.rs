mod api;
mod compare;
mod presets;
mod workflow;

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use api::{ApiClient, EnhanceRequest};
use workflow::PollOptions;

/// Image types the server accepts; sniffed from the file contents, not the
/// extension, before any bytes leave the machine.
const ACCEPTED_MIME_TYPES: &[&str] = &["image/jpeg", "image/png", "image/tiff", "image/webp"];

const DEFAULT_SERVER: &str = "http://localhost:8080";

#[derive(Debug, Parser)]
#[command(name = "webenhance", version, about = "Workflow client for the webenhance proxy")]
struct Cli {
    /// Backend base URL; falls back to WEBENHANCE_SERVER, then localhost.
    #[arg(long, global = true)]
    server: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Enhance an image: submit, poll until done, download the result.
    Enhance(EnhanceArgs),
    /// Print the normalized status of a process once.
    Status { process_id: String },
    /// Download a finished result.
    Download {
        process_id: String,
        #[arg(long)]
        out: PathBuf,
    },
    /// List the available presets and their defaults.
    Presets,
}

#[derive(Debug, Parser)]
struct EnhanceArgs {
    /// Image to enhance (jpeg, png, tiff, or webp).
    image: PathBuf,
    /// Preset: basic, sharp, recovery, superfocus, or redefine.
    #[arg(long, default_value = "basic")]
    preset: String,
    /// Detail level, 0.0 to 1.0.
    #[arg(long)]
    detail: Option<f64>,
    /// Upscale factor: 1, 2, or 4.
    #[arg(long)]
    scale: Option<u32>,
    /// Creativity, 1 to 6 (redefine).
    #[arg(long)]
    creativity: Option<i64>,
    /// Texture, 1 to 5 (redefine).
    #[arg(long)]
    texture: Option<i64>,
    /// Manual prompt (redefine); disables autoprompt.
    #[arg(long)]
    prompt: Option<String>,
    /// Focus boost, 0.25 to 1.0 (superfocus).
    #[arg(long)]
    focus_boost: Option<f64>,
    /// Seed (superfocus).
    #[arg(long)]
    seed: Option<i64>,
    /// Sharpen, 0.0 to 1.0.
    #[arg(long)]
    sharpen: Option<f64>,
    /// Denoise, 0.0 to 1.0.
    #[arg(long)]
    denoise: Option<f64>,
    /// Output path; defaults to enhanced-{preset}-{millis}.jpg.
    #[arg(long)]
    out: Option<PathBuf>,
    /// Also write a side-by-side before/after composite here.
    #[arg(long)]
    compare: Option<PathBuf>,
    /// Seconds before the first status poll.
    #[arg(long, default_value_t = 2)]
    first_delay: u64,
    /// Seconds between status polls.
    #[arg(long, default_value_t = 3)]
    poll_interval: u64,
    /// Give up after this many seconds of polling.
    #[arg(long, default_value_t = 300)]
    timeout: u64,
}

fn main() {
    if let Err(err) = run() {
        eprintln!("webenhance error: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let server = cli
        .server
        .or_else(|| env::var("WEBENHANCE_SERVER").ok())
        .unwrap_or_else(|| DEFAULT_SERVER.to_string());
    let client = ApiClient::new(&server)?;

    match cli.command {
        Command::Enhance(args) => run_enhance(&client, args),
        Command::Status { process_id } => run_status(&client, &process_id),
        Command::Download { process_id, out } => workflow::download_to(&client, &process_id, &out),
        Command::Presets => {
            presets::print_table();
            Ok(())
        }
    }
}

fn run_enhance(client: &ApiClient, args: EnhanceArgs) -> Result<()> {
    let preset = presets::lookup(&args.preset).with_context(|| {
        format!(
            "unknown preset '{}'; run `webenhance presets` for the list",
            args.preset
        )
    })?;

    let bytes = std::fs::read(&args.image)
        .with_context(|| format!("reading {}", args.image.display()))?;
    let mime = sniff_image_type(&args.image, &bytes)?;
    let filename = args
        .image
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload".to_string());

    let request = presets::apply_defaults(
        EnhanceRequest {
            preset: args.preset.clone(),
            detail: args.detail,
            scale: args.scale,
            creativity: args.creativity,
            texture: args.texture,
            prompt: args.prompt,
            autoprompt: false,
            focus_boost: args.focus_boost,
            seed: args.seed,
            sharpen: args.sharpen,
            denoise: args.denoise,
        },
        preset,
    );

    println!(
        "Enhancing {} with {} ({})",
        args.image.display(),
        preset.label,
        preset.model
    );

    let options = PollOptions {
        first_delay: Duration::from_secs(args.first_delay),
        interval: Duration::from_secs(args.poll_interval.max(1)),
        timeout: Duration::from_secs(args.timeout.max(1)),
    };
    let out = workflow::run(client, &filename, &mime, bytes, &request, options, args.out)?;

    if let Some(compare_path) = args.compare {
        compare::side_by_side(&args.image, &out, &compare_path)?;
    }
    Ok(())
}

fn run_status(client: &ApiClient, process_id: &str) -> Result<()> {
    let report = client.status(process_id)?;
    println!("state:    {}", report.state);
    if let Some(status) = &report.status {
        println!("status:   {status}");
    }
    println!("progress: {}%", report.progress);
    if let Some(error) = &report.error {
        println!("error:    {error}");
    }
    if let (Some(w), Some(h)) = (report.output_width, report.output_height) {
        println!("output:   {w}x{h}");
    }
    if let Some(format) = &report.output_format {
        println!("format:   {format}");
    }
    if let Some(credits) = report.credits {
        println!("credits:  {credits}");
    }
    Ok(())
}

fn sniff_image_type(path: &Path, bytes: &[u8]) -> Result<String> {
    let Some(kind) = infer::get(bytes) else {
        bail!(
            "{} does not look like an image file",
            path.display()
        );
    };
    let mime = kind.mime_type();
    if !ACCEPTED_MIME_TYPES.contains(&mime) {
        bail!(
            "{} is {mime}; accepted types are jpeg, png, tiff, and webp",
            path.display()
        );
    }
    Ok(mime.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const JPEG_MAGIC: &[u8] = b"\xff\xd8\xff\xe0\x00\x10JFIF\x00";
    const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n\x00\x00\x00\rIHDR";

    #[test]
    fn sniffs_accepted_image_types() {
        let path = Path::new("photo.bin");
        assert_eq!(sniff_image_type(path, JPEG_MAGIC).unwrap(), "image/jpeg");
        assert_eq!(sniff_image_type(path, PNG_MAGIC).unwrap(), "image/png");
    }

    #[test]
    fn rejects_non_image_payloads() {
        let err = sniff_image_type(Path::new("notes.txt"), b"plain text").unwrap_err();
        assert!(err.to_string().contains("does not look like an image"));
    }

    #[test]
    fn rejects_images_outside_accept_list() {
        // GIF sniffs fine but the server does not take it.
        let err = sniff_image_type(Path::new("anim.gif"), b"GIF89a\x01\x00\x01\x00").unwrap_err();
        assert!(err.to_string().contains("image/gif"));
    }

    #[test]
    fn cli_parses_enhance_flags() {
        let cli = Cli::parse_from([
            "webenhance",
            "enhance",
            "photo.jpg",
            "--preset",
            "redefine",
            "--creativity",
            "4",
            "--prompt",
            "golden hour",
            "--out",
            "result.jpg",
        ]);
        match cli.command {
            Command::Enhance(args) => {
                assert_eq!(args.preset, "redefine");
                assert_eq!(args.creativity, Some(4));
                assert_eq!(args.prompt.as_deref(), Some("golden hour"));
                assert_eq!(args.out, Some(PathBuf::from("result.jpg")));
                assert_eq!(args.first_delay, 2);
                assert_eq!(args.poll_interval, 3);
                assert_eq!(args.timeout, 300);
            }
            other => panic!("expected enhance, got {other:?}"),
        }
    }

    #[test]
    fn poll_timing_is_tunable_by_flag() {
        let cli = Cli::parse_from([
            "webenhance",
            "enhance",
            "photo.jpg",
            "--first-delay",
            "0",
            "--poll-interval",
            "1",
            "--timeout",
            "30",
        ]);
        match cli.command {
            Command::Enhance(args) => {
                assert_eq!(args.first_delay, 0);
                assert_eq!(args.poll_interval, 1);
                assert_eq!(args.timeout, 30);
            }
            other => panic!("expected enhance, got {other:?}"),
        }
    }

    #[test]
    fn cli_parses_global_server_flag() {
        let cli = Cli::parse_from(["webenhance", "status", "p-1", "--server", "http://host:9000"]);
        assert_eq!(cli.server.as_deref(), Some("http://host:9000"));
    }
}
