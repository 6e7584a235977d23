use once_cell::sync::Lazy;
use regex::Regex;

/// Fenced blocks longer than this many lines (fences included) get cut
const MAX_CODE_LINES: usize = 10;
/// Lines of a long block kept before the elision marker (opening fence included)
const KEPT_CODE_LINES: usize = 8;

pub const CODE_ELISION: &str = "... (truncated)";

static RE_HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"^#{1,6}[ \t]+(.*\S)[ \t]*$").unwrap());

static RE_FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[ \t]{0,3}(`{3,}|~{3,})").unwrap());

/// Shrink markdown for tools with tight budgets.
///
/// Outside code fences: trailing whitespace is stripped, runs of blank lines
/// collapse to one, and headings become `*emphasis*`. Fenced code blocks longer
/// than ten lines keep their first eight lines plus an elision marker and the
/// closing fence.
///
/// The result is never longer than the input (in chars), and compressing an
/// already compressed text returns it unchanged.
pub fn compress_markdown(text: &str) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let mut out: Vec<String> = Vec::with_capacity(lines.len());
    let mut i = 0;

    while i < lines.len() {
        let line = lines[i];

        if let Some(caps) = RE_FENCE.captures(line) {
            let fence = caps[1].to_string();
            match find_fence_end(&lines, i, &fence) {
                Some(end) => {
                    out.extend(shrink_code_block(&lines[i..=end]));
                    i = end + 1;
                }
                None => {
                    // Unclosed fence: leave the remainder as is
                    out.extend(lines[i..].iter().map(|l| l.to_string()));
                    i = lines.len();
                }
            }
            continue;
        }

        let trimmed = line.trim_end();
        if trimmed.is_empty() {
            if out.last().is_some_and(|l| !l.is_empty()) {
                out.push(String::new());
            }
        } else if let Some(caps) = RE_HEADING.captures(trimmed) {
            out.push(format!("*{}*", &caps[1]));
        } else {
            out.push(trimmed.to_string());
        }
        i += 1;
    }

    while out.last().is_some_and(|l| l.is_empty()) {
        out.pop();
    }

    out.join("\n")
}

fn find_fence_end(lines: &[&str], start: usize, fence: &str) -> Option<usize> {
    let marker = fence.chars().next()?;
    let min_len = fence.chars().count();
    lines
        .iter()
        .enumerate()
        .skip(start + 1)
        .find(|(_, l)| {
            let t = l.trim();
            t.chars().count() >= min_len && t.chars().all(|c| c == marker)
        })
        .map(|(idx, _)| idx)
}

fn shrink_code_block(block: &[&str]) -> Vec<String> {
    let original: Vec<String> = block.iter().map(|l| l.to_string()).collect();
    if block.len() <= MAX_CODE_LINES {
        return original;
    }

    let mut shrunk: Vec<String> = block[..KEPT_CODE_LINES]
        .iter()
        .map(|l| l.to_string())
        .collect();
    shrunk.push(CODE_ELISION.to_string());
    shrunk.push(block[block.len() - 1].to_string());

    if joined_chars(&shrunk) < joined_chars(&original) {
        shrunk
    } else {
        original
    }
}

fn joined_chars(lines: &[String]) -> usize {
    lines.iter().map(|l| l.chars().count() + 1).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collapses_blank_runs() {
        assert_eq!(compress_markdown("a\n\n\n\nb\n\n"), "a\n\nb");
    }

    #[test]
    fn test_demotes_headings() {
        let input = "# Project\n\n## Code Style  \n- Use ESM";
        assert_eq!(compress_markdown(input), "*Project*\n\n*Code Style*\n- Use ESM");
    }

    #[test]
    fn test_leaves_headings_inside_code_alone() {
        let input = "```sh\n# not a heading\n```";
        assert_eq!(compress_markdown(input), input);
    }

    #[test]
    fn test_truncates_long_code_blocks() {
        let body: Vec<String> = (0..20).map(|n| format!("let x{} = {};", n, n)).collect();
        let input = format!("```rust\n{}\n```", body.join("\n"));

        let out = compress_markdown(&input);
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 10);
        assert_eq!(lines[0], "```rust");
        assert_eq!(lines[8], CODE_ELISION);
        assert_eq!(lines[9], "```");
    }

    #[test]
    fn test_is_idempotent_and_never_grows() {
        let samples = [
            "# Title\n\n\n\nText   \n### Sub\n",
            "```\na\nb\nc\nd\ne\nf\ng\nh\ni\nj\nk\n```\n\n\n# After",
            "plain",
            "",
            "#Not a heading\n~~~\nunclosed\n\n\n",
            "# A\r\n\r\n\r\nB\r\n",
        ];
        for sample in samples {
            let once = compress_markdown(sample);
            let twice = compress_markdown(&once);
            assert_eq!(once, twice, "not idempotent for {:?}", sample);
            assert!(once.chars().count() <= sample.chars().count());
        }
    }
}
