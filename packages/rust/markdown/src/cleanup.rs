//! Cleanup of converted Markdown before it is handed to a language model.
//!
//! Prose lines and fenced code are treated differently: tags, images, menu
//! lines, and relative links are only touched outside code fences, and code
//! keeps its blank lines.

use std::sync::LazyLock;

use regex::Regex;
use url::Url;

static IMAGE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"!\[([^\]]*)\]\([^)]*\)").expect("valid regex"));

static LINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\]]*)\]\(([^)\s]+)\)").expect("valid regex"));

static TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"</?[A-Za-z][A-Za-z0-9-]*(?:\s[^<>]*)?/?>").expect("valid regex"));

static FENCE_LANG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\s*)```(?:language-|lang-|highlight-)(\w+)").expect("valid regex")
});

/// Characters that separate entries of a flattened menu or breadcrumb.
const MENU_SEPARATORS: &[char] = &['|', '·', '•', '›', '»', '/', '>', '-', ','];

/// Clean `md`, resolving relative links against `base_url` when given.
pub(crate) fn run_pipeline(md: &str, base_url: Option<&Url>) -> String {
    let mut out = Vec::new();
    let mut in_code = false;

    for line in md.lines() {
        if line.trim_start().starts_with("```") {
            in_code = !in_code;
            out.push(FENCE_LANG_RE.replace(line, "$1```$2").into_owned());
            continue;
        }
        if in_code {
            out.push(line.to_string());
            continue;
        }
        if let Some(cleaned) = clean_prose_line(line, base_url) {
            out.push(cleaned);
        }
    }

    tidy(&out)
}

/// Clean one line outside a code fence; `None` drops the line.
fn clean_prose_line(line: &str, base_url: Option<&Url>) -> Option<String> {
    let line = IMAGE_RE.replace_all(line, "$1");
    let line = TAG_RE.replace_all(&line, "");

    if is_menu_line(&line) {
        return None;
    }

    Some(match base_url {
        Some(base) => absolutize_links(&line, base),
        None => line.into_owned(),
    })
}

/// A line made of two or more links and nothing but separators.
fn is_menu_line(line: &str) -> bool {
    if line.trim_start().starts_with('|') || LINK_RE.find_iter(line).count() < 2 {
        return false;
    }
    LINK_RE
        .replace_all(line, "")
        .chars()
        .all(|c| c.is_whitespace() || MENU_SEPARATORS.contains(&c))
}

/// Rewrite relative link targets as absolute URLs.
fn absolutize_links(line: &str, base: &Url) -> String {
    LINK_RE
        .replace_all(line, |caps: &regex::Captures| {
            let (text, href) = (&caps[1], &caps[2]);
            let keep = href.starts_with('#') || Url::parse(href).is_ok();
            match base.join(href) {
                Ok(resolved) if !keep => format!("[{text}]({resolved})"),
                _ => caps[0].to_string(),
            }
        })
        .into_owned()
}

/// Trim line ends, collapse blank runs outside code, and end with one newline.
fn tidy(lines: &[String]) -> String {
    let mut text = String::new();
    let mut in_code = false;
    let mut pending_blank = false;

    for line in lines {
        let line = line.trim_end();
        if line.trim_start().starts_with("```") {
            in_code = !in_code;
        } else if line.is_empty() && !in_code {
            pending_blank = !text.is_empty();
            continue;
        }
        if pending_blank {
            text.push('\n');
            pending_blank = false;
        }
        text.push_str(line);
        text.push('\n');
    }

    if text.is_empty() {
        text.push('\n');
    }
    text
}
