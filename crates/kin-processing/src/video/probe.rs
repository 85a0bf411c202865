//! Parsers for encoder probe output.
//!
//! `ffprobe -of json` is the primary source. The human-readable banner that
//! `ffmpeg -i` prints is a fallback only; its layout is not a stable interface.

use kin_core::Dimensions;
use regex::Regex;
use std::sync::LazyLock;

/// First `WxH` on a `Stream ... Video:` line. At least two digits per side so
/// codec tags such as `0x31637661` are not mistaken for a size.
static STREAM_DIMENSIONS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Stream.*Video:.*?\b(\d{2,5})x(\d{2,5})\b").expect("valid dimension pattern")
});

/// Width and height of the first video stream in ffprobe JSON output.
pub fn parse_ffprobe_json(stdout: &[u8]) -> Option<Dimensions> {
    let probe_data: serde_json::Value = serde_json::from_slice(stdout).ok()?;
    let stream = probe_data["streams"].get(0)?;

    let width = u32::try_from(stream["width"].as_u64()?).ok()?;
    let height = u32::try_from(stream["height"].as_u64()?).ok()?;

    if width == 0 || height == 0 {
        return None;
    }
    Some(Dimensions::new(width, height))
}

/// Width and height from ffmpeg's diagnostic banner.
pub fn parse_diagnostic_dimensions(stderr: &str) -> Option<Dimensions> {
    let captures = STREAM_DIMENSIONS.captures(stderr)?;
    let width = captures.get(1)?.as_str().parse().ok()?;
    let height = captures.get(2)?.as_str().parse().ok()?;
    Some(Dimensions::new(width, height))
}
