//! crates/paper_watch_core/src/search_session.rs
//!
//! Interactive, paginated search. Each user has at most one active session
//! holding the query, the page offset and a handle map for the page on
//! screen. Selecting a handle returns the full paper so the caller can enrich
//! it; search and navigation never enrich anything.
//!
//! Sessions live in memory only. A restart drops them all and stale handles
//! then report `SessionExpired`.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use chrono::Utc;
use tracing::{debug, warn};

use crate::domain::{Paper, UserId};
use crate::ports::ContentSource;

pub const DEFAULT_PAGE_SIZE: usize = 5;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SearchError {
    #[error("Search query must not be empty")]
    EmptyQuery,
    #[error("Search session expired, please search again")]
    SessionExpired,
    #[error("Item {0} is not on the current page")]
    ItemNotFound(String),
}

/// Page-local token pointing at one displayed paper.
///
/// `generation` identifies the page the handle was shown on; `position` is the
/// 1-based number shown to the user. Formats as `generation.position`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle {
    pub generation: u64,
    pub position: usize,
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.generation, self.position)
    }
}

impl FromStr for Handle {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let not_found = || SearchError::ItemNotFound(s.to_string());
        let (generation, position) = s.split_once('.').ok_or_else(not_found)?;
        Ok(Handle {
            generation: generation.parse().map_err(|_| not_found())?,
            position: position.parse().map_err(|_| not_found())?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageEntry {
    pub handle: Handle,
    pub paper: Paper,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchPage {
    pub query: String,
    pub offset: usize,
    pub page_size: usize,
    pub entries: Vec<PageEntry>,
    pub has_more: bool,
}

impl SearchPage {
    pub fn next_offset(&self) -> Option<usize> {
        self.has_more.then_some(self.offset + self.page_size)
    }

    pub fn previous_offset(&self) -> Option<usize> {
        (self.offset > 0).then(|| self.offset.saturating_sub(self.page_size))
    }
}

/// The active page of one user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchSession {
    pub query: String,
    pub offset: usize,
    pub handles: HashMap<Handle, Paper>,
}

/// Highest generation seed handed out in this process.
static LAST_SEED: AtomicU64 = AtomicU64::new(0);

/// Wall-clock microseconds, bumped past any earlier seed, so generations of a
/// restarted process never repeat handles shown by the previous one.
fn generation_seed() -> u64 {
    let now = u64::try_from(Utc::now().timestamp_micros()).unwrap_or_default();
    let previous = LAST_SEED
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
            Some(now.max(last + 1))
        })
        .unwrap_or_else(|last| last);
    now.max(previous + 1)
}

/// Process-lifetime map of user id to session. Last write wins.
#[derive(Debug)]
pub struct SessionStore {
    sessions: RwLock<HashMap<UserId, SearchSession>>,
    generation: AtomicU64,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            generation: AtomicU64::new(generation_seed()),
        }
    }
}

impl SessionStore {
    pub fn get(&self, user_id: UserId) -> Option<SearchSession> {
        self.sessions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&user_id)
            .cloned()
    }

    pub fn put(&self, user_id: UserId, session: SearchSession) {
        self.sessions
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(user_id, session);
    }

    pub fn clear(&self, user_id: UserId) {
        self.sessions
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&user_id);
    }

    fn next_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::Relaxed) + 1
    }
}

pub struct PaperSearch {
    source: Arc<dyn ContentSource>,
    store: SessionStore,
    page_size: usize,
}

impl PaperSearch {
    pub fn new(source: Arc<dyn ContentSource>, page_size: usize) -> Self {
        Self {
            source,
            store: SessionStore::default(),
            page_size: page_size.max(1),
        }
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.store
    }

    /// Starts a new search at offset 0, replacing any previous session.
    pub async fn search(&self, user_id: UserId, query: &str) -> Result<SearchPage, SearchError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(SearchError::EmptyQuery);
        }
        Ok(self.load_page(user_id, query, 0).await)
    }

    /// Moves the active session to `offset` ("back" is just a smaller offset).
    pub async fn navigate(&self, user_id: UserId, offset: usize) -> Result<SearchPage, SearchError> {
        let session = self.store.get(user_id).ok_or(SearchError::SessionExpired)?;
        Ok(self.load_page(user_id, &session.query, offset).await)
    }

    /// Resolves a handle on the current page. Does not touch the session.
    pub fn select_item(&self, user_id: UserId, handle: &Handle) -> Result<Paper, SearchError> {
        let session = self.store.get(user_id).ok_or(SearchError::SessionExpired)?;
        session
            .handles
            .get(handle)
            .cloned()
            .ok_or_else(|| SearchError::ItemNotFound(handle.to_string()))
    }

    async fn load_page(&self, user_id: UserId, query: &str, offset: usize) -> SearchPage {
        // One probe item past the page tells us whether a next page exists.
        let mut batch = match self.source.search(query, self.page_size + 1, offset).await {
            Ok(papers) => papers,
            Err(e) => {
                warn!(user_id, query, error = %e, "Search failed, showing an empty page");
                Vec::new()
            }
        };
        let has_more = batch.len() > self.page_size;
        batch.truncate(self.page_size);

        let generation = self.store.next_generation();
        let entries: Vec<PageEntry> = batch
            .into_iter()
            .enumerate()
            .map(|(i, paper)| PageEntry {
                handle: Handle {
                    generation,
                    position: offset + i + 1,
                },
                paper,
            })
            .collect();

        self.store.put(
            user_id,
            SearchSession {
                query: query.to_string(),
                offset,
                handles: entries
                    .iter()
                    .map(|e| (e.handle, e.paper.clone()))
                    .collect(),
            },
        );
        debug!(user_id, query, offset, shown = entries.len(), has_more, "Search page stored");

        SearchPage {
            query: query.to_string(),
            offset,
            page_size: self.page_size,
            entries,
            has_more,
        }
    }
}
