//! Prompt templates for the four language-model roles.

use webresolve_shared::Strategy;

/// Marker appended to content cut at `max_chars`.
const TRUNCATION_MARKER: &str = "\n\n[... content truncated ...]";

/// Truncate `content` to at most `max_chars` characters, on a char boundary.
pub(crate) fn truncate_content(content: &str, max_chars: usize) -> String {
    match content.char_indices().nth(max_chars) {
        None => content.to_string(),
        Some((byte_idx, _)) => format!("{}{TRUNCATION_MARKER}", &content[..byte_idx]),
    }
}

pub(crate) fn query_optimization(question: &str) -> String {
    format!(
        r#"<role>
    You are an agent specialized in web search query optimization.
    You turn long or ambiguous requests into queries that a web search engine answers well.
    Do not use quotes or logical operators.
    If the request asks for a count of items, keep that intent in the optimized query.
    If the request names a website to search, keep the restriction using the "site:" keyword.
</role>
<task>
    You will receive an initial web query.
    Avoid overly narrow queries.
    Use only the content of the initial query.
    Return the optimized query and nothing else.
</task>
<query>
    {question}
</query>"#
    )
}

pub(crate) fn content_analysis(strategy: Strategy, content: &str, question: &str) -> String {
    let instructions = match strategy {
        Strategy::Strict => concat!(
            "    Answer the query as exactly and precisely as possible.\n",
            "    Use only the page content and nothing else.",
        ),
        Strategy::Loose => concat!(
            "    Answer the query using the page content along with your best judgement.\n",
            "    If the answer is not stated outright, infer the most likely answer from the content.\n",
            "    Use a lower confidence when the answer is inferred rather than stated.",
        ),
    };

    format!(
        r#"<task>
    You will receive a page content and a query to evaluate against it.
{instructions}
    Also rate, as precisely as possible, your confidence that the response answers the query.
    Explain your reasoning step by step.
</task>
<query>
    {question}
</query>
<format>
    Return a JSON object:
    {{
        "confidence": a number between 0 and 1, higher when the answer is more useful. If the content cannot answer the query, use 0.
        "response": the response,
        "reasoning": a short summary of how the response and confidence were determined
    }}
    Return only the JSON object and nothing else.
</format>
<page_content>
{content}
</page_content>"#
    )
}

pub(crate) fn relevance_comparison(first: &str, second: &str, question: &str) -> String {
    format!(
        r#"<role>
    You are an agent specialized in comparing content relevance.
</role>
<task>
    You will receive a source content, a target content and a query.
    Decide which content is more relevant to the query, based on the information it holds.
</task>
<source_content>
{first}
</source_content>
<target_content>
{second}
</target_content>
<query>
    {question}
</query>
<format>
    Return 0 if the source content is more relevant, 1 if the target content is more relevant.
    Return only the integer and nothing else.
</format>"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_short_content() {
        assert_eq!(truncate_content("short text", 100), "short text");
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        let content = "é".repeat(50);
        let result = truncate_content(&content, 10);
        assert!(result.starts_with(&"é".repeat(10)));
        assert!(!result.starts_with(&"é".repeat(11)));
        assert!(result.ends_with("[... content truncated ...]"));
    }

    #[test]
    fn analysis_prompts_differ_by_strategy() {
        let strict = content_analysis(Strategy::Strict, "page", "q?");
        let loose = content_analysis(Strategy::Loose, "page", "q?");
        assert!(strict.contains("Use only the page content"));
        assert!(loose.contains("infer the most likely answer"));
        assert!(strict.contains(r#""confidence""#));
        assert!(loose.contains("<page_content>\npage\n</page_content>"));
    }

    #[test]
    fn optimization_prompt_keeps_site_rule() {
        let prompt = query_optimization("albums site:wikipedia.org");
        assert!(prompt.contains("\"site:\""));
        assert!(prompt.contains("albums site:wikipedia.org"));
    }
}
