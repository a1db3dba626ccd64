//! Subtitle normalization.
//!
//! Uploaded subtitles are stored as WebVTT whatever their source format.
//! SubRip and DFXP/TTML files are converted; WebVTT files are kept as they
//! are, minus a leading byte order mark and surrounding newlines.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use vpipe_backend::{BackendError, BackendResult};

static SRT_TIMING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\s*(\d{1,2}):(\d{1,2}):(\d{1,2})(?:[,.](\d{1,3}))?\s*-->\s*(\d{1,2}):(\d{1,2}):(\d{1,2})(?:[,.](\d{1,3}))?",
    )
    .unwrap()
});

static DFXP_ROOT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<tt[\s>]").unwrap());

/// SubRip markup WebVTT has no equivalent for.
static SRT_UNSUPPORTED_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)</?font[^>]*>|\{\\[^}]*\}").unwrap());

/// Styling tags shared by SubRip and WebVTT.
static SUPPORTED_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)</?[ibu]>").unwrap());

static CLOCK_TIME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+):(\d{2}):(\d{2})(?:([.,])(\d+)|:(\d+))?$").unwrap()
});

static OFFSET_TIME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+(?:\.\d+)?)(h|ms|m|s|f)$").unwrap());

/// Frame rate assumed for frame-based DFXP timestamps.
const DEFAULT_FRAME_RATE: f64 = 30.0;

/// Supported subtitle formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubtitleFormat {
    WebVtt,
    SubRip,
    Dfxp,
}

impl fmt::Display for SubtitleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SubtitleFormat::WebVtt => "WebVTT",
            SubtitleFormat::SubRip => "SubRip",
            SubtitleFormat::Dfxp => "DFXP",
        };
        write!(f, "{}", name)
    }
}

/// One caption: time range in milliseconds and text lines.
#[derive(Debug, Clone, PartialEq)]
struct Cue {
    start_ms: u64,
    end_ms: u64,
    text: String,
}

/// Decode, detect and convert an uploaded subtitle file to WebVTT.
pub fn normalize(raw: &[u8]) -> BackendResult<String> {
    let content = std::str::from_utf8(raw)
        .map_err(|e| BackendError::SubtitleInvalid(format!("Could not decode subtitle: {}", e)))?;
    let content = content.trim_matches(|c| matches!(c, '\u{feff}' | '\n' | '\r'));

    let format = detect_format(content)
        .ok_or_else(|| BackendError::SubtitleInvalid("Could not detect subtitle format".into()))?;

    match format {
        SubtitleFormat::WebVtt => Ok(content.to_string()),
        SubtitleFormat::SubRip => write_webvtt(&parse_srt(content)?),
        SubtitleFormat::Dfxp => write_webvtt(&parse_dfxp(content)?),
    }
}

/// Detect the format of already decoded subtitle content.
pub fn detect_format(content: &str) -> Option<SubtitleFormat> {
    let content = content.trim_start_matches('\u{feff}').trim_start();
    if is_webvtt_header(content.lines().next().unwrap_or_default()) {
        return Some(SubtitleFormat::WebVtt);
    }
    if DFXP_ROOT.is_match(content) {
        return Some(SubtitleFormat::Dfxp);
    }

    // A SubRip file starts with a cue number followed by a timing line
    let mut lines = content.lines().map(str::trim).filter(|l| !l.is_empty());
    let first = lines.next()?;
    let second = lines.next()?;
    if first.chars().all(|c| c.is_ascii_digit()) && SRT_TIMING.is_match(second) {
        return Some(SubtitleFormat::SubRip);
    }
    None
}

fn is_webvtt_header(line: &str) -> bool {
    match line.strip_prefix("WEBVTT") {
        Some(rest) => rest.is_empty() || rest.starts_with([' ', '\t']),
        None => false,
    }
}

fn invalid(message: impl Into<String>) -> BackendError {
    BackendError::SubtitleInvalid(message.into())
}

fn parse_srt(content: &str) -> BackendResult<Vec<Cue>> {
    let normalized = content.replace("\r\n", "\n").replace('\r', "\n");
    let items = srtparse::from_str(&normalized)
        .map_err(|e| invalid(format!("Invalid SubRip file: {}", e)))?;

    let mut cues = Vec::with_capacity(items.len());
    for item in &items {
        let start = &item.start_time;
        let end = &item.end_time;
        let start_ms = srt_millis(start.hours, start.minutes, start.seconds, start.milliseconds)?;
        let end_ms = srt_millis(end.hours, end.minutes, end.seconds, end.milliseconds)?;
        let text = item
            .text
            .lines()
            .map(|l| escape_keeping_styles(&SRT_UNSUPPORTED_TAG.replace_all(l.trim_end(), "")))
            .collect::<Vec<_>>()
            .join("\n");

        cues.push(Cue {
            start_ms,
            end_ms: end_ms.max(start_ms),
            text,
        });
    }

    if cues.is_empty() {
        return Err(invalid("No captions found"));
    }
    Ok(cues)
}

fn srt_millis(hours: u64, minutes: u64, seconds: u64, millis: u64) -> BackendResult<u64> {
    hours
        .checked_mul(60)
        .and_then(|m| m.checked_add(minutes))
        .and_then(|m| m.checked_mul(60))
        .and_then(|s| s.checked_add(seconds))
        .and_then(|s| s.checked_mul(1000))
        .and_then(|ms| ms.checked_add(millis))
        .ok_or_else(|| invalid("SubRip time out of range"))
}

/// Escape cue text, keeping the `<i>`, `<b>` and `<u>` styling tags.
fn escape_keeping_styles(text: &str) -> String {
    let mut output = String::with_capacity(text.len());
    let mut last = 0;
    for tag in SUPPORTED_TAG.find_iter(text) {
        output.push_str(&escape_cue_text(&text[last..tag.start()]));
        output.push_str(&tag.as_str().to_ascii_lowercase());
        last = tag.end();
    }
    output.push_str(&escape_cue_text(&text[last..]));
    output
}

fn parse_dfxp(content: &str) -> BackendResult<Vec<Cue>> {
    let document = roxmltree::Document::parse(content)
        .map_err(|e| invalid(format!("Invalid DFXP document: {}", e)))?;
    let root = document.root_element();
    if root.tag_name().name() != "tt" {
        return Err(invalid("DFXP document without tt root"));
    }

    let frame_rate = root
        .attributes()
        .find(|a| a.name() == "frameRate")
        .and_then(|a| a.value().trim().parse::<f64>().ok())
        .filter(|rate| rate.is_finite() && *rate > 0.0)
        .unwrap_or(DEFAULT_FRAME_RATE);

    let mut cues = Vec::new();
    for paragraph in root
        .descendants()
        .filter(|n| n.is_element() && n.tag_name().name() == "p")
    {
        let attribute = |name: &str| {
            paragraph
                .attributes()
                .find(|a| a.name() == name)
                .map(|a| a.value())
        };

        let start_ms = attribute("begin")
            .map(|v| parse_dfxp_time(v, frame_rate))
            .transpose()?
            .unwrap_or(0);
        let end_ms = match (attribute("end"), attribute("dur")) {
            (Some(end), _) => parse_dfxp_time(end, frame_rate)?,
            (None, Some(dur)) => start_ms
                .checked_add(parse_dfxp_time(dur, frame_rate)?)
                .ok_or_else(|| invalid("DFXP time out of range"))?,
            (None, None) => return Err(invalid("DFXP caption without end time")),
        };

        let mut raw_text = String::new();
        collect_text(paragraph, &mut raw_text);
        let text = raw_text
            .split('\n')
            .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>()
            .join("\n");

        cues.push(Cue {
            start_ms,
            end_ms: end_ms.max(start_ms),
            text: escape_cue_text(&text),
        });
    }

    if cues.is_empty() {
        return Err(invalid("No captions found"));
    }
    Ok(cues)
}

/// Text content of a caption. `<br/>` becomes a line break, other
/// elements contribute their text.
fn collect_text(node: roxmltree::Node<'_, '_>, output: &mut String) {
    for child in node.children() {
        if child.is_text() {
            let text = child.text().unwrap_or_default();
            output.extend(text.chars().map(|c| if c.is_whitespace() { ' ' } else { c }));
        } else if child.is_element() {
            if child.tag_name().name() == "br" {
                output.push('\n');
            } else {
                collect_text(child, output);
            }
        }
    }
}

/// Parse a TTML clock time (`00:00:01.500`, `00:00:01:12`) or offset time
/// (`1.5s`, `1500ms`) into milliseconds.
fn parse_dfxp_time(value: &str, frame_rate: f64) -> BackendResult<u64> {
    let value = value.trim();
    let out_of_range = || invalid(format!("DFXP time out of range: {}", value));

    if let Some(c) = CLOCK_TIME.captures(value) {
        let part = |i: usize| -> BackendResult<u64> {
            c.get(i)
                .map_or(Ok(0), |m| m.as_str().parse().map_err(|_| out_of_range()))
        };
        let whole = part(1)?
            .checked_mul(60)
            .and_then(|m| m.checked_add(part(2).ok()?))
            .and_then(|m| m.checked_mul(60))
            .and_then(|s| s.checked_add(part(3).ok()?))
            .and_then(|s| s.checked_mul(1000))
            .ok_or_else(out_of_range)?;

        let extra = if let Some(fraction) = c.get(5) {
            let fraction: f64 = format!("0.{}", fraction.as_str())
                .parse()
                .map_err(|_| out_of_range())?;
            (fraction * 1000.0).round() as u64
        } else if c.get(6).is_some() {
            to_millis(part(6)? as f64 * 1000.0 / frame_rate).ok_or_else(out_of_range)?
        } else {
            0
        };
        return whole.checked_add(extra).ok_or_else(out_of_range);
    }

    if let Some(c) = OFFSET_TIME.captures(value) {
        let amount: f64 = c[1].parse().map_err(|_| out_of_range())?;
        let millis = match &c[2] {
            "h" => amount * 3_600_000.0,
            "m" => amount * 60_000.0,
            "s" => amount * 1000.0,
            "ms" => amount,
            _ => amount * 1000.0 / frame_rate,
        };
        return to_millis(millis).ok_or_else(out_of_range);
    }

    Err(invalid(format!("Invalid DFXP time: {}", value)))
}

fn to_millis(value: f64) -> Option<u64> {
    let rounded = value.round();
    (rounded.is_finite() && rounded >= 0.0 && rounded < u64::MAX as f64).then_some(rounded as u64)
}

fn escape_cue_text(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn format_timestamp(ms: u64) -> String {
    format!(
        "{:02}:{:02}:{:02}.{:03}",
        ms / 3_600_000,
        (ms / 60_000) % 60,
        (ms / 1000) % 60,
        ms % 1000
    )
}

fn write_webvtt(cues: &[Cue]) -> BackendResult<String> {
    let mut output = String::from("WEBVTT\n");
    for cue in cues {
        output.push('\n');
        output.push_str(&format_timestamp(cue.start_ms));
        output.push_str(" --> ");
        output.push_str(&format_timestamp(cue.end_ms));
        output.push('\n');
        // Blank lines would end the cue early
        for line in cue.text.lines().filter(|l| !l.trim().is_empty()) {
            output.push_str(line);
            output.push('\n');
        }
    }
    Ok(output)
}
