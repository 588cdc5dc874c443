// Wiring: build the pool, the external clients, and the background loops
// from configuration. Collaborators are constructed once here and handed
// to their consumers as trait objects, so tests can assemble the same
// pieces around fakes.

use std::sync::Arc;

use crate::app_config::AppConfig;
use crate::db::{create_diesel_pool, DieselDatabaseConfig, DieselPool};
use crate::services::{
    ChatCompletionsGenerator, CleanupSweeper, GatewayClient, ProductScraper, Publisher,
    RandomPostService, ReactionService, RefundMonitor, Scheduler, ShortenerService, SlotTable,
    StatsService, TelegramClient,
};

/// Shared state for the HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    pub pool: DieselPool,
    pub stats: Arc<StatsService>,
    pub slot_table: SlotTable,
    pub offered_slot_count: usize,
}

/// Fully wired application: HTTP state plus the three background loops.
pub struct App {
    pub state: AppState,
    pub scheduler: Scheduler,
    pub refund_monitor: RefundMonitor,
    pub cleanup: CleanupSweeper,
}

pub async fn initialize(config: &AppConfig) -> Result<App, Box<dyn std::error::Error>> {
    let pool = create_diesel_pool(DieselDatabaseConfig::default()).await?;

    let channel = Arc::new(TelegramClient::new(&config.telegram));
    let shortener = Arc::new(ShortenerService::new(config.shortener.clone()));
    let reactions = Arc::new(ReactionService::new(&config.reactions));
    let provider = Arc::new(GatewayClient::new(&config.payment));
    let scraper = Arc::new(ProductScraper::new(config.scraping.clone()));
    let generator = Arc::new(ChatCompletionsGenerator::new(config.generator.clone()));

    let slot_table = SlotTable::from_config(&config.scheduling);

    let publisher = Arc::new(Publisher::new(
        channel.clone(),
        shortener.clone(),
        reactions,
        config.public_base_url.clone(),
    ));
    let random_posts = Arc::new(RandomPostService::new(
        scraper,
        generator,
        slot_table.clone(),
    ));

    let scheduler = Scheduler::new(
        pool.clone(),
        publisher,
        Some(random_posts),
        slot_table.clone(),
        config.scheduling.publish_poll_period,
    );
    let refund_monitor = RefundMonitor::new(
        pool.clone(),
        provider,
        channel,
        config.scheduling.refund_poll_period,
    );
    let cleanup = CleanupSweeper::new(
        pool.clone(),
        config.scheduling.cleanup_period,
        config.scheduling.draft_max_age,
    );

    let state = AppState {
        pool,
        stats: Arc::new(StatsService::new(
            shortener,
            config.telegram.channel_username.clone(),
        )),
        slot_table,
        offered_slot_count: config.scheduling.offered_slot_count,
    };

    Ok(App {
        state,
        scheduler,
        refund_monitor,
        cleanup,
    })
}
