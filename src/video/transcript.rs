//! WebVTT parsing and timestamped transcript rendering.

use tracing::debug;

/// A single timed line of speech.
#[derive(Debug, Clone, PartialEq)]
pub struct Cue {
    /// Start time in seconds
    pub start: f64,
    /// End time in seconds
    pub end: f64,
    pub text: String,
}

/// Seconds between `[m:ss]` markers in a rendered transcript.
const MARKER_INTERVAL_SECS: f64 = 30.0;

/// Parse WebVTT text into cues.
///
/// Header blocks, cue identifiers and `NOTE` blocks are skipped because only
/// lines following a `-->` timing line are collected.
#[must_use]
pub fn parse_vtt(content: &str) -> Vec<Cue> {
    let mut cues = Vec::new();
    let mut lines = content.lines().map(str::trim).peekable();

    while let Some(line) = lines.next() {
        if !line.contains("-->") {
            continue;
        }
        let Some((start, end)) = parse_timing_line(line) else {
            continue;
        };

        // Some encoders leave a blank line between the timing and the text
        while lines.peek().is_some_and(|l| l.is_empty()) {
            lines.next();
        }

        let mut text = Vec::new();
        while let Some(next) = lines.peek() {
            if next.is_empty() || next.contains("-->") {
                break;
            }
            let cleaned = strip_tags(next);
            if !cleaned.is_empty() {
                text.push(cleaned);
            }
            lines.next();
        }

        if !text.is_empty() {
            cues.push(Cue {
                start,
                end,
                text: text.join(" "),
            });
        }
    }

    debug!(cue_count = cues.len(), "Parsed VTT transcript");
    cues
}

/// Render cues as readable text with a timestamp marker every 30 seconds.
#[must_use]
pub fn render_transcript(cues: &[Cue]) -> String {
    let mut out = String::new();
    let mut last_marker = f64::NEG_INFINITY;

    for cue in cues {
        if cue.start - last_marker >= MARKER_INTERVAL_SECS {
            out.push_str(&format!("\n[{}]\n", format_timestamp(cue.start)));
            last_marker = cue.start;
        }
        out.push_str(&cue.text);
        out.push(' ');
    }

    out.trim().to_string()
}

/// Parse `00:00:10.500 --> 00:00:13.200 align:start` into seconds.
fn parse_timing_line(line: &str) -> Option<(f64, f64)> {
    let (start, rest) = line.split_once("-->")?;
    let end = rest.split_whitespace().next()?;
    Some((parse_timestamp(start.trim())?, parse_timestamp(end)?))
}

/// Parse `HH:MM:SS.mmm`, `MM:SS.mmm` or `SS.mmm`.
fn parse_timestamp(timestamp: &str) -> Option<f64> {
    timestamp
        .split(':')
        .try_fold((0.0_f64, 0_usize), |(acc, count), part| {
            let value: f64 = part.parse().ok()?;
            Some((acc * 60.0 + value, count + 1))
        })
        .filter(|&(_, count)| (1..=3).contains(&count))
        .map(|(secs, _)| secs)
}

fn format_timestamp(seconds: f64) -> String {
    let total = seconds as i64;
    let (hours, minutes, secs) = (total / 3600, (total % 3600) / 60, total % 60);
    if hours > 0 {
        format!("{hours}:{minutes:02}:{secs:02}")
    } else {
        format!("{minutes}:{secs:02}")
    }
}

/// Remove inline markup such as `<c>`, `<v Speaker>` or `<00:00:01.000>`.
fn strip_tags(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_tag = false;
    for ch in text.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => out.push(ch),
            _ => {}
        }
    }
    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_timestamp_formats() {
        assert_eq!(parse_timestamp("00:00:10.500"), Some(10.5));
        assert_eq!(parse_timestamp("01:23:45.000"), Some(5025.0));
        assert_eq!(parse_timestamp("01:30.000"), Some(90.0));
        assert_eq!(parse_timestamp("45.0"), Some(45.0));
        assert_eq!(parse_timestamp("1:2:3:4"), None);
        assert_eq!(parse_timestamp("aa:bb"), None);
    }

    #[test]
    fn test_parse_timing_line_with_settings() {
        assert_eq!(
            parse_timing_line("00:00:00.160 --> 00:00:02.149 align:start position:0%"),
            Some((0.16, 2.149))
        );
        assert_eq!(parse_timing_line("garbage"), None);
    }

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(10.5), "0:10");
        assert_eq!(format_timestamp(90.25), "1:30");
        assert_eq!(format_timestamp(5025.0), "1:23:45");
    }

    #[test]
    fn test_strip_tags() {
        assert_eq!(strip_tags("<c>Hello</c> world"), "Hello world");
        assert_eq!(strip_tags("<v Speaker>Hi"), "Hi");
        assert_eq!(strip_tags("plain"), "plain");
    }

    #[test]
    fn test_parse_whisper_output() {
        let vtt = "WEBVTT\n\n00:00:00.000 --> 00:00:02.500\nHello, this is a test.\n\n00:00:02.500 --> 00:00:05.000\nSecond line\ncontinues here.\n\n00:00:35.000 --> 00:00:37.500\nLater on.\n";

        let cues = parse_vtt(vtt);

        assert_eq!(cues.len(), 3);
        assert_eq!(cues[0].start, 0.0);
        assert_eq!(cues[0].end, 2.5);
        assert_eq!(cues[1].text, "Second line continues here.");
        assert_eq!(cues[2].start, 35.0);
    }

    #[test]
    fn test_parse_skips_header_metadata_and_blank_after_timing() {
        let vtt = "WEBVTT\nKind: captions\nLanguage: en\n\n1\n00:00:01.000 --> 00:00:02.000 align:start\n\n<c>word</c> <00:00:01.500>two\n";

        let cues = parse_vtt(vtt);

        assert_eq!(
            cues,
            vec![Cue {
                start: 1.0,
                end: 2.0,
                text: "word two".to_string(),
            }]
        );
    }

    #[test]
    fn test_render_transcript_markers() {
        let cues = vec![
            Cue {
                start: 0.0,
                end: 2.0,
                text: "Hello".to_string(),
            },
            Cue {
                start: 2.0,
                end: 4.0,
                text: "world".to_string(),
            },
            Cue {
                start: 35.0,
                end: 37.0,
                text: "Next section".to_string(),
            },
        ];

        assert_eq!(
            render_transcript(&cues),
            "[0:00]\nHello world \n[0:35]\nNext section"
        );
    }

    #[test]
    fn test_render_empty() {
        assert_eq!(render_transcript(&[]), "");
    }
}
