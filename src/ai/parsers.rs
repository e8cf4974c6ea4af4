//! Extract citations and tool results from a raw provider response.
//!
//! Parsing is total: anything that is not an object with an array `output`
//! yields empty results.

use crate::models::{Annotation, AnnotationKind, ToolKind, ToolResult};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedToolOutput {
    pub annotations: Vec<Annotation>,
    pub tool_results: Vec<ToolResult>,
}

struct Field {
    name: &'static str,
    /// Raw keys tried in order.
    sources: &'static [&'static str],
}

struct Domain {
    tool: ToolKind,
    annotation: AnnotationKind,
    annotation_fields: &'static [Field],
    result_fields: &'static [Field],
}

const FILE_SEARCH: Domain = Domain {
    tool: ToolKind::FileSearch,
    annotation: AnnotationKind::Citation,
    annotation_fields: &[
        Field { name: "document_id", sources: &["document_id", "file_id"] },
        Field { name: "passage", sources: &["passage", "text"] },
        Field { name: "score", sources: &["score"] },
        Field { name: "filename", sources: &["filename"] },
    ],
    result_fields: &[
        Field { name: "document_id", sources: &["document_id", "file_id"] },
        Field { name: "filename", sources: &["filename"] },
        Field { name: "score", sources: &["score"] },
        Field { name: "text", sources: &["text", "passage"] },
    ],
};

const WEB_SEARCH: Domain = Domain {
    tool: ToolKind::WebSearch,
    annotation: AnnotationKind::WebSource,
    annotation_fields: &[
        Field { name: "url", sources: &["url"] },
        Field { name: "title", sources: &["title"] },
        Field { name: "snippet", sources: &["snippet"] },
        Field { name: "score", sources: &["score"] },
        Field { name: "engine", sources: &["engine"] },
    ],
    result_fields: &[
        Field { name: "url", sources: &["url"] },
        Field { name: "title", sources: &["title"] },
        Field { name: "snippet", sources: &["snippet"] },
        Field { name: "score", sources: &["score"] },
    ],
};

pub fn parse_file_search_citations(raw: &Value) -> ParsedToolOutput {
    parse(raw, &FILE_SEARCH)
}

pub fn parse_web_search(raw: &Value) -> ParsedToolOutput {
    parse(raw, &WEB_SEARCH)
}

fn parse(raw: &Value, domain: &Domain) -> ParsedToolOutput {
    let mut parsed = ParsedToolOutput::default();
    let Some(output) = raw.get("output").and_then(Value::as_array) else {
        return parsed;
    };

    for item in output {
        match item.get("type").and_then(Value::as_str) {
            Some("annotation") => {
                let Some(annotation) = item.get("annotation") else {
                    continue;
                };
                if source_of(annotation) == Some(domain.tool.as_str()) {
                    parsed.annotations.push(Annotation {
                        kind: domain.annotation,
                        data: project(annotation, domain.annotation_fields),
                    });
                }
            }
            Some("tool_result") => {
                if item.get("tool_name").and_then(Value::as_str) == Some(domain.tool.as_str()) {
                    let results = item.get("results").and_then(Value::as_array).map(|results| {
                        results
                            .iter()
                            .map(|result| project(result, domain.result_fields))
                            .collect()
                    });
                    parsed.tool_results.push(ToolResult {
                        kind: domain.tool,
                        results,
                    });
                }
            }
            _ => {}
        }
    }

    tracing::debug!(
        tool = domain.tool.as_str(),
        annotations = parsed.annotations.len(),
        tool_results = parsed.tool_results.len(),
        "Parsed tool output"
    );
    parsed
}

fn source_of(annotation: &Value) -> Option<&str> {
    annotation.get("source").and_then(Value::as_str)
}

/// Copy the named fields that are present; absent fields are left out.
fn project(raw: &Value, fields: &[Field]) -> Value {
    let mut data = Map::new();
    for field in fields {
        let found = field
            .sources
            .iter()
            .find_map(|key| raw.get(*key).filter(|v| !v.is_null()));
        if let Some(value) = found {
            data.insert(field.name.to_string(), value.clone());
        }
    }
    Value::Object(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn sample() -> Value {
        json!({
            "id": "resp_1",
            "output": [
                {"type": "output_text", "text": "See the docs."},
                {
                    "type": "annotation",
                    "annotation": {
                        "source": "file_search",
                        "document_id": "doc-1",
                        "text": "relevant passage",
                        "score": 0.92,
                        "filename": "guide.pdf"
                    }
                },
                {
                    "type": "annotation",
                    "annotation": {
                        "source": "web_search",
                        "url": "https://example.com",
                        "title": "Example",
                        "snippet": "An example",
                        "engine": "bing"
                    }
                },
                {
                    "type": "tool_result",
                    "tool_name": "file_search",
                    "results": [{"file_id": "doc-2", "filename": "faq.md", "score": 0.5, "extra": 1}]
                },
                {
                    "type": "tool_result",
                    "tool_name": "web_search",
                    "results": [{"url": "https://rust-lang.org", "title": "Rust"}]
                }
            ]
        })
    }

    #[test]
    fn test_file_search_citations() {
        let parsed = parse_file_search_citations(&sample());

        assert_eq!(
            parsed.annotations,
            vec![Annotation {
                kind: AnnotationKind::Citation,
                data: json!({
                    "document_id": "doc-1",
                    "passage": "relevant passage",
                    "score": 0.92,
                    "filename": "guide.pdf"
                }),
            }]
        );
        assert_eq!(
            parsed.tool_results,
            vec![ToolResult {
                kind: ToolKind::FileSearch,
                results: Some(vec![json!({"document_id": "doc-2", "filename": "faq.md", "score": 0.5})]),
            }]
        );
    }

    #[test]
    fn test_web_search_sources() {
        let parsed = parse_web_search(&sample());

        assert_eq!(parsed.annotations.len(), 1);
        assert_eq!(parsed.annotations[0].kind, AnnotationKind::WebSource);
        assert_eq!(parsed.annotations[0].data["url"], "https://example.com");
        assert_eq!(parsed.annotations[0].data["engine"], "bing");
        assert!(parsed.annotations[0].data.get("score").is_none());

        assert_eq!(parsed.tool_results.len(), 1);
        assert_eq!(parsed.tool_results[0].kind, ToolKind::WebSearch);
    }

    #[test]
    fn test_non_conforming_inputs_yield_empty_results() {
        let inputs = [
            Value::Null,
            json!({}),
            json!("a string"),
            json!(42),
            json!(true),
            json!([1, 2, 3]),
            json!({"output": "not an array"}),
            json!({"output": [null, 1, {"type": "annotation"}, {"type": "tool_result"}]}),
        ];

        for input in inputs {
            assert_eq!(parse_file_search_citations(&input), ParsedToolOutput::default(), "{}", input);
            assert_eq!(parse_web_search(&input), ParsedToolOutput::default(), "{}", input);
        }
    }

    #[test]
    fn test_tool_result_without_results_array() {
        let raw = json!({"output": [{"type": "tool_result", "tool_name": "file_search"}]});
        let parsed = parse_file_search_citations(&raw);
        assert_eq!(parsed.tool_results[0].results, None);
    }
}
