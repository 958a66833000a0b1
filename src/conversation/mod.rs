pub mod formatter;
pub mod memory_storage;
pub mod query;
pub mod service;
pub mod sqlite_storage;
pub mod storage;
pub mod tiered;
pub mod types;

pub use formatter::{ConversationFormatter, FormatOptions, OutputFormat};
pub use memory_storage::InMemoryConversationStorage;
pub use query::{ConversationExport, ConversationQueryService, ExportFormat, HistoryOptions};
pub use service::ConversationMemoryService;
pub use sqlite_storage::SqliteConversationStorage;
pub use storage::ConversationStorage;
pub use tiered::TieredMemoryManager;
