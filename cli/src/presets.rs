use crate::api::EnhanceRequest;

/// Display metadata and default parameters for one preset, mirroring what
/// the server accepts. The server owns validation; this table only saves the
/// user from typing every flag.
pub struct PresetInfo {
    pub key: &'static str,
    pub label: &'static str,
    pub description: &'static str,
    pub model: &'static str,
    pub category: &'static str,
    pub is_async: bool,
    pub defaults: Defaults,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Defaults {
    pub detail: Option<f64>,
    pub scale: Option<u32>,
    pub creativity: Option<i64>,
    pub texture: Option<i64>,
    pub autoprompt: bool,
    pub focus_boost: Option<f64>,
    pub sharpen: Option<f64>,
    pub denoise: Option<f64>,
}

pub const PRESETS: [PresetInfo; 5] = [
    PresetInfo {
        key: "basic",
        label: "Basic",
        description: "Balanced enhancement for high-quality photos",
        model: "Standard V2",
        category: "traditional",
        is_async: false,
        defaults: Defaults {
            detail: Some(0.5),
            scale: Some(2),
            creativity: None,
            texture: None,
            autoprompt: false,
            focus_boost: None,
            sharpen: None,
            denoise: None,
        },
    },
    PresetInfo {
        key: "sharp",
        label: "Sharp",
        description: "Enhanced detail & sharpness preservation",
        model: "High Fidelity V2",
        category: "traditional",
        is_async: false,
        defaults: Defaults {
            detail: Some(0.7),
            scale: Some(2),
            creativity: None,
            texture: None,
            autoprompt: false,
            focus_boost: None,
            sharpen: None,
            denoise: None,
        },
    },
    PresetInfo {
        key: "recovery",
        label: "Recovery",
        description: "Reconstruct detail from tiny images (32-256px)",
        model: "Recovery V2",
        category: "generative",
        is_async: true,
        defaults: Defaults {
            detail: Some(0.4),
            scale: Some(4),
            creativity: None,
            texture: None,
            autoprompt: false,
            focus_boost: None,
            sharpen: None,
            denoise: None,
        },
    },
    PresetInfo {
        key: "superfocus",
        label: "Super Focus",
        description: "Refocus severely blurred or out-of-focus images",
        model: "Super Focus V2",
        category: "generative",
        is_async: true,
        defaults: Defaults {
            detail: Some(0.5),
            scale: Some(2),
            creativity: None,
            texture: None,
            autoprompt: false,
            focus_boost: Some(0.7),
            sharpen: None,
            denoise: None,
        },
    },
    PresetInfo {
        key: "redefine",
        label: "Redefine",
        description: "Creative upscaling with AI-generated detail",
        model: "Redefine",
        category: "generative",
        is_async: true,
        defaults: Defaults {
            detail: None,
            scale: Some(2),
            creativity: Some(3),
            texture: Some(2),
            autoprompt: true,
            focus_boost: None,
            sharpen: Some(0.3),
            denoise: Some(0.2),
        },
    },
];

pub fn lookup(key: &str) -> Option<&'static PresetInfo> {
    PRESETS.iter().find(|preset| preset.key == key)
}

/// Fills unset request fields from the preset's defaults. Explicit flags win.
/// The server requires `detail` and `scale` for every preset, so those two
/// get a last-resort fallback even when the preset table leaves them unset.
pub fn apply_defaults(mut request: EnhanceRequest, preset: &PresetInfo) -> EnhanceRequest {
    let d = preset.defaults;
    request.detail = request.detail.or(d.detail).or(Some(0.5));
    request.scale = request.scale.or(d.scale).or(Some(2));
    request.creativity = request.creativity.or(d.creativity);
    request.texture = request.texture.or(d.texture);
    request.focus_boost = request.focus_boost.or(d.focus_boost);
    request.sharpen = request.sharpen.or(d.sharpen);
    request.denoise = request.denoise.or(d.denoise);
    // A manual prompt overrides the preset's autoprompt default.
    if d.autoprompt && request.prompt.is_none() {
        request.autoprompt = true;
    }
    request
}

pub fn print_table() {
    println!(
        "{:<12} {:<12} {:<18} {:<12} {}",
        "PRESET", "CATEGORY", "MODEL", "ASYNC", "DESCRIPTION"
    );
    for preset in &PRESETS {
        println!(
            "{:<12} {:<12} {:<18} {:<12} {}",
            preset.key,
            preset.category,
            preset.model,
            if preset.is_async { "yes" } else { "no" },
            preset.description,
        );
    }
}
