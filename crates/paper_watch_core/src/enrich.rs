//! crates/paper_watch_core/src/enrich.rs
//!
//! Lazy enrichment: summarize a paper and publish the summary as a page.
//! Callers only pay for this when a paper is delivered or explicitly opened.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::domain::{Paper, PublishablePage};
use crate::ports::{EnrichmentService, PagePublisher, PortResult, SummaryService};

/// Longest page title the publisher is given.
pub const PAGE_TITLE_CHARS: usize = 50;

/// Enrichment built from a summarizer and a page publisher.
#[derive(Clone)]
pub struct PageEnricher {
    summarizer: Arc<dyn SummaryService>,
    publisher: Arc<dyn PagePublisher>,
}

impl PageEnricher {
    pub fn new(summarizer: Arc<dyn SummaryService>, publisher: Arc<dyn PagePublisher>) -> Self {
        Self {
            summarizer,
            publisher,
        }
    }
}

#[async_trait]
impl EnrichmentService for PageEnricher {
    async fn enrich(&self, paper: &Paper) -> PortResult<String> {
        let summary = self.summarizer.summarize(paper).await?;
        let page = PublishablePage {
            title: paper.title.chars().take(PAGE_TITLE_CHARS).collect(),
            summary,
            source_link: paper.link.clone(),
        };
        self.publisher.publish(&page).await
    }
}

/// Enriches a paper, falling back to its raw source link on any failure.
pub async fn enrich_or_link(enricher: &dyn EnrichmentService, paper: &Paper) -> String {
    match enricher.enrich(paper).await {
        Ok(url) => url,
        Err(e) => {
            warn!(item_id = %paper.external_id, error = %e, "enrichment failed, using source link");
            paper.link.clone()
        }
    }
}
