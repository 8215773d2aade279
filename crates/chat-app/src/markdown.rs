//! Lightweight markdown lexer for assistant messages.
//!
//! Produces a flat segment stream covering the handful of constructs the chat
//! view renders: fenced code blocks, inline code, headers and bold spans.
//! Everything else stays verbatim plain text. The lexer is pure and keeps no
//! state between calls.

/// Language label attached to fences that carry none.
pub const DEFAULT_FENCE_LANGUAGE: &str = "text";

const FENCE_MARKER: &str = "```";
const BOLD_MARKER: &str = "**";
const MAX_HEADER_LEVEL: usize = 6;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Plain { text: String },
    InlineCode { code: String },
    CodeBlock { language: String, code: String },
    Header { level: u8, text: String },
    Bold { text: String },
}

/// Splits message text into renderable segments.
///
/// Fences only open at line start and only close on a bare ``` line; an
/// unterminated fence degrades to verbatim text. Inline markers are matched
/// left to right inside plain runs; unmatched markers stay literal, and the
/// text inside a matched span is not parsed further.
pub fn parse_segments(input: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut plain_lines: Vec<&str> = Vec::new();
    let lines: Vec<&str> = input.split('\n').collect();

    let mut index = 0;
    while index < lines.len() {
        let line = lines[index];

        if let Some(fence_rest) = line.strip_prefix(FENCE_MARKER) {
            if let Some(close_index) = find_closing_fence(&lines, index + 1) {
                flush_plain(&mut segments, &mut plain_lines);

                let language = fence_rest.trim();
                let language = if language.is_empty() {
                    DEFAULT_FENCE_LANGUAGE
                } else {
                    language
                };
                segments.push(Segment::CodeBlock {
                    language: language.to_string(),
                    code: lines[index + 1..close_index].join("\n"),
                });

                index = close_index + 1;
                continue;
            }
            // No closing fence: the marker line falls through as plain text.
        }

        if let Some((level, text)) = parse_header_line(line) {
            flush_plain(&mut segments, &mut plain_lines);
            segments.push(Segment::Header {
                level,
                text: text.to_string(),
            });
            index += 1;
            continue;
        }

        plain_lines.push(line);
        index += 1;
    }

    flush_plain(&mut segments, &mut plain_lines);
    segments
}

fn find_closing_fence(lines: &[&str], from: usize) -> Option<usize> {
    lines[from..]
        .iter()
        .position(|line| line.trim_end() == FENCE_MARKER)
        .map(|offset| from + offset)
}

fn parse_header_line(line: &str) -> Option<(u8, &str)> {
    let level = line.chars().take_while(|character| *character == '#').count();
    if level == 0 || level > MAX_HEADER_LEVEL {
        return None;
    }

    let rest = &line[level..];
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }

    let text = rest.trim();
    if text.is_empty() {
        return None;
    }

    Some((level as u8, text))
}

fn flush_plain(segments: &mut Vec<Segment>, plain_lines: &mut Vec<&str>) {
    if plain_lines.is_empty() {
        return;
    }

    let text = plain_lines.join("\n");
    plain_lines.clear();
    if text.is_empty() {
        return;
    }

    scan_inline(&text, segments);
}

/// Scans one plain run for inline code and bold spans, left to right.
fn scan_inline(text: &str, segments: &mut Vec<Segment>) {
    let mut plain = String::new();
    let mut rest = text;

    while !rest.is_empty() {
        if let Some(after_marker) = rest.strip_prefix(BOLD_MARKER) {
            if let Some(length) = after_marker.find(BOLD_MARKER).filter(|length| *length > 0) {
                push_plain(segments, &mut plain);
                segments.push(Segment::Bold {
                    text: after_marker[..length].to_string(),
                });
                rest = &after_marker[length + BOLD_MARKER.len()..];
                continue;
            }
            // Unmatched or empty bold marker stays literal.
            plain.push_str(BOLD_MARKER);
            rest = after_marker;
            continue;
        }

        if let Some(after_tick) = rest.strip_prefix('`') {
            if let Some(length) = after_tick.find('`').filter(|length| *length > 0) {
                push_plain(segments, &mut plain);
                segments.push(Segment::InlineCode {
                    code: after_tick[..length].to_string(),
                });
                rest = &after_tick[length + 1..];
                continue;
            }
            plain.push('`');
            rest = after_tick;
            continue;
        }

        let mut characters = rest.chars();
        if let Some(character) = characters.next() {
            plain.push(character);
        }
        rest = characters.as_str();
    }

    push_plain(segments, &mut plain);
}

fn push_plain(segments: &mut Vec<Segment>, plain: &mut String) {
    if plain.is_empty() {
        return;
    }

    segments.push(Segment::Plain {
        text: std::mem::take(plain),
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain(text: &str) -> Segment {
        Segment::Plain {
            text: text.to_string(),
        }
    }

    #[test]
    fn plain_text_comes_back_as_a_single_segment() {
        assert_eq!(
            parse_segments("just a sentence\nover two lines"),
            vec![plain("just a sentence\nover two lines")]
        );
    }

    #[test]
    fn fenced_block_with_language_is_extracted() {
        let input = "before\n```rust\nfn main() {}\n```\nafter";
        assert_eq!(
            parse_segments(input),
            vec![
                plain("before"),
                Segment::CodeBlock {
                    language: "rust".to_string(),
                    code: "fn main() {}".to_string(),
                },
                plain("after"),
            ]
        );
    }

    #[test]
    fn fence_without_language_defaults_to_text() {
        let segments = parse_segments("```\nraw\n```");
        assert_eq!(
            segments,
            vec![Segment::CodeBlock {
                language: DEFAULT_FENCE_LANGUAGE.to_string(),
                code: "raw".to_string(),
            }]
        );
    }

    #[test]
    fn unterminated_fence_degrades_to_verbatim_text() {
        let input = "```rust\nfn main() {}";
        assert_eq!(parse_segments(input), vec![plain("```rust\nfn main() {}")]);
    }

    #[test]
    fn headers_are_recognized_at_line_start_only() {
        let segments = parse_segments("# Title\nbody with # not a header\n### Sub");
        assert_eq!(
            segments,
            vec![
                Segment::Header {
                    level: 1,
                    text: "Title".to_string(),
                },
                plain("body with # not a header"),
                Segment::Header {
                    level: 3,
                    text: "Sub".to_string(),
                },
            ]
        );
    }

    #[test]
    fn seven_hashes_is_not_a_header() {
        assert_eq!(
            parse_segments("####### too deep"),
            vec![plain("####### too deep")]
        );
    }

    #[test]
    fn inline_code_and_bold_split_a_plain_run() {
        let segments = parse_segments("use `let` and **never** globals");
        assert_eq!(
            segments,
            vec![
                plain("use "),
                Segment::InlineCode {
                    code: "let".to_string(),
                },
                plain(" and "),
                Segment::Bold {
                    text: "never".to_string(),
                },
                plain(" globals"),
            ]
        );
    }

    #[test]
    fn unmatched_inline_markers_stay_literal() {
        assert_eq!(
            parse_segments("a ` stray and a ** dangler"),
            vec![plain("a ` stray and a ** dangler")]
        );
    }

    #[test]
    fn markers_inside_bold_are_not_reparsed() {
        let segments = parse_segments("**outer `inner` text**");
        assert_eq!(
            segments,
            vec![Segment::Bold {
                text: "outer `inner` text".to_string(),
            }]
        );
    }

    #[test]
    fn bold_markers_inside_inline_code_are_not_reparsed() {
        let segments = parse_segments("`**not bold**`");
        assert_eq!(
            segments,
            vec![Segment::InlineCode {
                code: "**not bold**".to_string(),
            }]
        );
    }

    #[test]
    fn code_block_content_is_never_inline_parsed() {
        let segments = parse_segments("```\n**raw** and `ticks`\n```");
        assert_eq!(
            segments,
            vec![Segment::CodeBlock {
                language: DEFAULT_FENCE_LANGUAGE.to_string(),
                code: "**raw** and `ticks`".to_string(),
            }]
        );
    }

    #[test]
    fn parsing_is_deterministic() {
        let input = "# H\npara `code` **bold**\n```py\nprint(1)\n```";
        assert_eq!(parse_segments(input), parse_segments(input));
    }
}
