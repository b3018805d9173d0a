//! Decoding of `esearch` JSON and `efetch` XML bodies.
//!
//! Both functions are pure: they take a response body and return domain
//! values or a message suitable for [`RemoteError::Malformed`].
//!
//! [`RemoteError::Malformed`]: harvest_core::RemoteError::Malformed

use harvest_core::{DocId, IdPage};
use regex::bytes::Regex;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct EsearchEnvelope {
    #[serde(default)]
    esearchresult: Option<EsearchResult>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EsearchResult {
    #[serde(default)]
    count: Option<String>,
    #[serde(default)]
    idlist: Vec<String>,
    #[serde(rename = "ERROR", default)]
    error: Option<String>,
}

/// Parse an `esearch` response issued with `retmode=json`.
///
/// `count` arrives as a decimal string; an `ERROR` field at either level is
/// reported verbatim.
pub fn parse_esearch(body: &str) -> Result<IdPage, String> {
    let envelope: EsearchEnvelope =
        serde_json::from_str(body).map_err(|e| format!("invalid esearch JSON: {e}"))?;
    if let Some(err) = envelope.error {
        return Err(format!("esearch error: {err}"));
    }
    let result = envelope
        .esearchresult
        .ok_or_else(|| "esearch response has no esearchresult".to_string())?;
    if let Some(err) = result.error {
        return Err(format!("esearch error: {err}"));
    }
    let count = result
        .count
        .ok_or_else(|| "esearch response has no count".to_string())?;
    let total = count
        .trim()
        .parse::<usize>()
        .map_err(|e| format!("esearch count {count:?} is not a number: {e}"))?;

    Ok(IdPage {
        total,
        ids: result.idlist.into_iter().map(DocId::from).collect(),
    })
}

/// Splits an `efetch` body into one blob per document element.
///
/// Matches `<Element>` or `<Element attr=…>` through the next `</Element>`,
/// so a `PubmedArticle` splitter never matches the enclosing
/// `PubmedArticleSet`.
#[derive(Debug, Clone)]
pub struct ArticleSplitter {
    element: String,
    pattern: Regex,
}

impl ArticleSplitter {
    pub fn new(element: &str) -> Result<Self, regex::Error> {
        let name = regex::escape(element);
        let pattern = Regex::new(&format!(r"(?s)<{name}(?:\s[^>]*)?>.*?</{name}\s*>"))?;
        Ok(Self {
            element: element.to_string(),
            pattern,
        })
    }

    pub fn element(&self) -> &str {
        &self.element
    }

    /// Every complete element in `body`, in document order.
    pub fn split(&self, body: &[u8]) -> Vec<Vec<u8>> {
        self.pattern
            .find_iter(body)
            .map(|m| m.as_bytes().to_vec())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn esearch_count_and_ids() {
        let body = r#"{"header":{"type":"esearch","version":"0.3"},
            "esearchresult":{"count":"3","retmax":"2","retstart":"0",
            "idlist":["38000001","38000002"],"translationset":[]}}"#;
        let page = parse_esearch(body).unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.ids, vec![DocId::from("38000001"), DocId::from("38000002")]);
    }

    #[test]
    fn esearch_count_only_page() {
        let body = r#"{"esearchresult":{"count":"120345","retmax":"0","idlist":[]}}"#;
        let page = parse_esearch(body).unwrap();
        assert_eq!(page.total, 120_345);
        assert!(page.ids.is_empty());
    }

    #[rstest]
    #[case::not_json("<html>busy</html>", "invalid esearch JSON")]
    #[case::inner_error(r#"{"esearchresult":{"ERROR":"Invalid query"}}"#, "Invalid query")]
    #[case::outer_error(r#"{"error":"API rate limit exceeded"}"#, "rate limit")]
    #[case::no_count(r#"{"esearchresult":{"idlist":[]}}"#, "no count")]
    #[case::bad_count(r#"{"esearchresult":{"count":"many","idlist":[]}}"#, "not a number")]
    fn esearch_failures_are_described(#[case] body: &str, #[case] needle: &str) {
        let err = parse_esearch(body).unwrap_err();
        assert!(err.contains(needle), "{err:?} should mention {needle:?}");
    }

    #[test]
    fn splits_articles_but_not_the_set() {
        let body = br#"<?xml version="1.0" ?>
<PubmedArticleSet>
<PubmedArticle><MedlineCitation Status="In-Process"><PMID Version="1">1</PMID></MedlineCitation></PubmedArticle>
<PubmedArticle>
  <MedlineCitation><PMID Version="1">2</PMID></MedlineCitation>
</PubmedArticle>
</PubmedArticleSet>"#;
        let splitter = ArticleSplitter::new("PubmedArticle").unwrap();
        let parts = splitter.split(body);
        assert_eq!(parts.len(), 2);
        assert!(parts[0].starts_with(b"<PubmedArticle>"));
        assert!(parts[0].ends_with(b"</PubmedArticle>"));
        assert!(String::from_utf8_lossy(&parts[1]).contains("<PMID Version=\"1\">2</PMID>"));
    }

    #[test]
    fn element_with_attributes_is_matched() {
        let splitter = ArticleSplitter::new("DocSum").unwrap();
        let parts = splitter.split(b"<r><DocSum id=\"a\">x</DocSum><DocSum>y</DocSum></r>");
        assert_eq!(parts.len(), 2);
    }

    #[test]
    fn empty_set_yields_nothing() {
        let splitter = ArticleSplitter::new("PubmedArticle").unwrap();
        assert!(splitter.split(b"<PubmedArticleSet></PubmedArticleSet>").is_empty());
    }
}
