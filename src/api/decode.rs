//! Decoding of the obfuscated player stream string.
//!
//! The player receives something like `#h<b64>//_//<junk><b64>...`: a base64
//! payload with base64-encoded junk (two and three character combinations of
//! `@ # ! ^ $`) spliced in. Once the junk is removed the payload decodes to a
//! comma separated list of `[quality]link or link` entries.

use std::sync::LazyLock;

use base64::Engine;
use base64::alphabet;
use base64::engine::general_purpose::STANDARD;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use regex::Regex;

use super::ApiError;
use super::types::{Stream, Variant};

const TRASH_CHARS: [char; 5] = ['@', '#', '!', '^', '$'];
const HLS_SUFFIX: &str = ":hls:manifest.m3u8";

static TRASH_CODES: LazyLock<Vec<String>> = LazyLock::new(|| {
    let mut codes = Vec::new();
    for len in 2..=3 {
        let mut combo = vec![0usize; len];
        loop {
            let s: String = combo.iter().map(|&i| TRASH_CHARS[i]).collect();
            codes.push(STANDARD.encode(s));
            // odometer increment over TRASH_CHARS
            let mut pos = len;
            loop {
                if pos == 0 {
                    break;
                }
                pos -= 1;
                combo[pos] += 1;
                if combo[pos] < TRASH_CHARS.len() {
                    break;
                }
                combo[pos] = 0;
            }
            if combo.iter().all(|&i| i == 0) {
                break;
            }
        }
    }
    codes
});

static LENIENT: LazyLock<GeneralPurpose> = LazyLock::new(|| {
    GeneralPurpose::new(
        &alphabet::STANDARD,
        GeneralPurposeConfig::new()
            .with_decode_allow_trailing_bits(true)
            .with_decode_padding_mode(DecodePaddingMode::Indifferent),
    )
});

static ENTRY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[(?P<label>[^\]]*)\](?P<links>[^\[]*)").unwrap());

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").unwrap());

/// Strips the junk out of an encoded stream string and returns the plain text.
/// Strings that are not obfuscated (no `#h` prefix) are returned as is.
pub fn clear_trash(encoded: &str) -> Result<String, ApiError> {
    let Some(body) = encoded.strip_prefix("#h") else {
        return Ok(encoded.to_string());
    };
    let mut joined: String = body.split("//_//").collect();
    for code in TRASH_CODES.iter() {
        joined = joined.replace(code.as_str(), "");
    }
    let trimmed = joined.trim_end_matches('=');
    let bytes = LENIENT
        .decode(trimmed)
        .map_err(|e| ApiError::Decode(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| ApiError::Decode(e.to_string()))
}

/// Parses `[label]link or link,[label]...` into variants, keeping only direct
/// `.mp4` links. Variants left without a link are dropped.
pub fn parse_variants(decoded: &str) -> Stream {
    let mut variants = Vec::new();
    for cap in ENTRY_RE.captures_iter(decoded) {
        let quality = TAG_RE.replace_all(&cap["label"], "").trim().to_string();
        let mut links: Vec<String> = Vec::new();
        for link in cap["links"].trim().trim_end_matches(',').split(" or ") {
            let link = link.trim();
            let link = link.strip_suffix(HLS_SUFFIX).unwrap_or(link);
            if link.ends_with(".mp4") && !links.iter().any(|l| l == link) {
                links.push(link.to_string());
            }
        }
        if links.is_empty() {
            tracing::debug!(quality, "no direct links for quality");
            continue;
        }
        variants.push(Variant { quality, links });
    }
    Stream { variants }
}

pub fn decode_stream(encoded: &str) -> Result<Stream, ApiError> {
    let decoded = clear_trash(encoded)?;
    let stream = parse_variants(&decoded);
    if stream.variants.is_empty() {
        return Err(ApiError::NoStream);
    }
    Ok(stream)
}
