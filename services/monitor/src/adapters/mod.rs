pub mod arxiv;
pub mod db;
pub mod summary_llm;
pub mod telegram;
pub mod telegraph;

pub use arxiv::ArxivSource;
pub use db::DbAdapter;
pub use summary_llm::OpenAiSummaryAdapter;
pub use telegram::TelegramNotifier;
pub use telegraph::TelegraphPublisher;
