//! services/monitor/src/adapters/arxiv.rs
//!
//! Content source backed by the arXiv Atom API.
//! It implements the `ContentSource` port from the `core` crate.

use async_trait::async_trait;
use chrono::{DateTime, Datelike};
use paper_watch_core::domain::Paper;
use paper_watch_core::ports::{ContentSource, PortError, PortResult};
use quick_xml::events::Event;
use quick_xml::Reader;
use tracing::debug;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// Searches titles and abstracts, newest submissions first.
#[derive(Clone)]
pub struct ArxivSource {
    http: reqwest::Client,
    api_url: String,
}

impl ArxivSource {
    pub fn new(http: reqwest::Client, api_url: String) -> Self {
        Self { http, api_url }
    }
}

/// `ti:"topic" OR abs:"topic"`, so multi-word topics match as phrases.
fn search_query(topic: &str) -> String {
    let phrase: String = topic.trim().chars().filter(|c| *c != '"').collect();
    format!("ti:\"{0}\" OR abs:\"{0}\"", phrase)
}

#[async_trait]
impl ContentSource for ArxivSource {
    async fn search(&self, topic: &str, max_results: usize, offset: usize) -> PortResult<Vec<Paper>> {
        let start = offset.to_string();
        let max_results = max_results.to_string();
        let response = self
            .http
            .get(&self.api_url)
            .query(&[
                ("search_query", search_query(topic).as_str()),
                ("start", start.as_str()),
                ("max_results", max_results.as_str()),
                ("sortBy", "submittedDate"),
                ("sortOrder", "descending"),
            ])
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| PortError::Provider(format!("arXiv request failed: {}", e)))?;

        let body = response
            .text()
            .await
            .map_err(|e| PortError::Provider(format!("arXiv response unreadable: {}", e)))?;

        let papers = parse_feed(&body)?;
        debug!(topic, offset, found = papers.len(), "arXiv search finished");
        Ok(papers)
    }
}

//=========================================================================================
// Atom Parsing
//=========================================================================================

#[derive(Default)]
struct EntryFields {
    id: String,
    title: String,
    summary: String,
    published: String,
}

impl EntryFields {
    fn into_paper(self) -> PortResult<Paper> {
        let link = self.id.trim().to_string();
        // arXiv reports query errors as a pseudo-entry.
        if link.contains("/api/errors") {
            return Err(PortError::Provider(format!(
                "arXiv rejected the query: {}",
                normalize_whitespace(&self.summary)
            )));
        }
        let external_id = link
            .split_once("/abs/")
            .map(|(_, id)| id)
            .or_else(|| link.rsplit('/').next())
            .unwrap_or_default()
            .to_string();

        Ok(Paper {
            external_id,
            title: normalize_whitespace(&self.title),
            abstract_text: normalize_whitespace(&self.summary),
            year: DateTime::parse_from_rfc3339(self.published.trim())
                .ok()
                .map(|d| d.year()),
            link,
        })
    }
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Extracts the entries of an arXiv Atom feed, in feed order.
pub fn parse_feed(xml: &str) -> PortResult<Vec<Paper>> {
    let mut reader = Reader::from_str(xml);
    let mut papers = Vec::new();
    let mut entry: Option<EntryFields> = None;
    let mut field: Option<String> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                if name == "entry" {
                    entry = Some(EntryFields::default());
                } else if entry.is_some() {
                    field = Some(name);
                }
            }
            Ok(Event::End(ref e)) => {
                if e.local_name().as_ref() == b"entry" {
                    if let Some(done) = entry.take() {
                        papers.push(done.into_paper()?);
                    }
                }
                field = None;
            }
            Ok(Event::Text(ref e)) => {
                if let (Some(current), Some(name)) = (entry.as_mut(), field.as_deref()) {
                    let text = e
                        .unescape()
                        .map_err(|e| PortError::Provider(format!("arXiv XML: {}", e)))?;
                    match name {
                        "id" => current.id.push_str(&text),
                        "title" => current.title.push_str(&text),
                        "summary" => current.summary.push_str(&text),
                        "published" => current.published.push_str(&text),
                        _ => {}
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(PortError::Provider(format!("arXiv XML: {}", e)));
            }
            _ => {}
        }
    }

    Ok(papers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom" xmlns:opensearch="http://a9.com/-/spec/opensearch/1.1/">
  <id>http://arxiv.org/api/query</id>
  <title type="html">ArXiv Query: search_query=ti:"quantum computing"</title>
  <opensearch:totalResults>2</opensearch:totalResults>
  <entry>
    <id>http://arxiv.org/abs/2401.01234v2</id>
    <updated>2024-01-05T10:00:00Z</updated>
    <published>2024-01-03T18:59:59Z</published>
    <title>Fault-Tolerant
      Quantum Computing &amp; You</title>
    <summary>  We show that
  qubits scale.
</summary>
    <author><name>A. Researcher</name></author>
    <link href="http://arxiv.org/abs/2401.01234v2" rel="alternate" type="text/html"/>
  </entry>
  <entry>
    <id>http://arxiv.org/abs/quant-ph/9901001v1</id>
    <published>1999-01-01T00:00:00Z</published>
    <title>An Old One</title>
    <summary>Classic.</summary>
  </entry>
</feed>"#;

    #[test]
    fn test_parse_feed_extracts_entries_in_order() {
        let papers = parse_feed(FEED).unwrap();

        assert_eq!(papers.len(), 2);
        assert_eq!(papers[0].external_id, "2401.01234v2");
        assert_eq!(papers[0].title, "Fault-Tolerant Quantum Computing & You");
        assert_eq!(papers[0].abstract_text, "We show that qubits scale.");
        assert_eq!(papers[0].year, Some(2024));
        assert_eq!(papers[0].link, "http://arxiv.org/abs/2401.01234v2");
        assert_eq!(papers[1].external_id, "quant-ph/9901001v1");
        assert_eq!(papers[1].year, Some(1999));
    }

    #[test]
    fn test_parse_feed_without_entries() {
        let empty = r#"<feed xmlns="http://www.w3.org/2005/Atom"><title>none</title></feed>"#;
        assert!(parse_feed(empty).unwrap().is_empty());
    }

    #[test]
    fn test_parse_feed_reports_api_errors() {
        let error = r#"<feed xmlns="http://www.w3.org/2005/Atom"><entry>
            <id>http://arxiv.org/api/errors#incorrect_id_format</id>
            <title>Error</title><summary>malformed query</summary></entry></feed>"#;
        assert!(matches!(parse_feed(error), Err(PortError::Provider(_))));
    }

    #[test]
    fn test_search_query_quotes_topic() {
        assert_eq!(
            search_query(" neural \"networks\" "),
            "ti:\"neural networks\" OR abs:\"neural networks\""
        );
    }

    #[tokio::test]
    async fn test_search_sends_paging_parameters() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/query"))
            .and(query_param("search_query", "ti:\"quantum computing\" OR abs:\"quantum computing\""))
            .and(query_param("start", "5"))
            .and(query_param("max_results", "6"))
            .and(query_param("sortBy", "submittedDate"))
            .and(query_param("sortOrder", "descending"))
            .respond_with(ResponseTemplate::new(200).set_body_string(FEED))
            .expect(1)
            .mount(&mock_server)
            .await;

        let source = ArxivSource::new(
            reqwest::Client::new(),
            format!("{}/api/query", mock_server.uri()),
        );
        let papers = source.search("quantum computing", 6, 5).await.unwrap();

        assert_eq!(papers.len(), 2);
    }

    #[tokio::test]
    async fn test_search_maps_http_errors_to_provider_failure() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&mock_server)
            .await;

        let source = ArxivSource::new(reqwest::Client::new(), mock_server.uri());
        let result = source.search("anything", 5, 0).await;

        assert!(matches!(result, Err(PortError::Provider(_))));
    }
}
