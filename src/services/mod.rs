pub mod cleanup;
pub mod description;
pub mod payments;
pub mod products;
pub mod publisher;
pub mod random_post;
pub mod reactions;
pub mod refunds;
pub mod scheduler;
pub mod shortener;
pub mod slots;
pub mod stats;
pub mod telegram;

pub use cleanup::CleanupSweeper;
pub use description::{ChatCompletionsGenerator, DescriptionGenerator};
pub use payments::{GatewayClient, PaymentProvider, ProviderPaymentStatus};
pub use products::ProductScraper;
pub use publisher::{PublishError, Publisher};
pub use random_post::RandomPostService;
pub use reactions::ReactionService;
pub use refunds::RefundMonitor;
pub use scheduler::Scheduler;
pub use shortener::ShortenerService;
pub use slots::SlotTable;
pub use stats::StatsService;
pub use telegram::{Channel, TelegramClient, TelegramError};
