// Reaction decoration for freshly published posts. A sidecar service adds
// the reactions with user accounts; this side only picks the emojis and
// fires the request. Strictly best effort, a publish never fails on it.

use rand::seq::SliceRandom;
use rand::Rng;
use reqwest::Client;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, warn};

use crate::app_config::ReactionConfig;

const REACTION_EMOJIS: &[&str] = &["👍", "🔥", "❤️", "🎉", "😍", "👏", "💯"];

/// Pick 1 to 3 distinct emojis for a post.
pub fn pick_reactions(rng: &mut impl Rng) -> Vec<&'static str> {
    let count = rng.gen_range(1..=3);
    REACTION_EMOJIS
        .choose_multiple(rng, count)
        .copied()
        .collect()
}

pub struct ReactionService {
    http: Client,
    sidecar_url: String,
}

impl ReactionService {
    pub fn new(config: &ReactionConfig) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self {
            http,
            sidecar_url: config.sidecar_url.clone(),
        }
    }

    /// Ask the sidecar to react to a channel message. Logs and swallows
    /// every failure.
    pub async fn decorate(&self, message_id: i64) {
        if self.sidecar_url.is_empty() {
            return;
        }
        let emojis = pick_reactions(&mut rand::thread_rng());
        let result = self
            .http
            .post(&self.sidecar_url)
            .json(&json!({ "message_id": message_id, "emojis": emojis }))
            .send()
            .await
            .and_then(|r| r.error_for_status());
        match result {
            Ok(_) => debug!(message_id, ?emojis, "Reactions requested"),
            Err(e) => warn!(message_id, error = %e, "Reaction sidecar call failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_pick_reactions_count_and_uniqueness() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let picked = pick_reactions(&mut rng);
            assert!((1..=3).contains(&picked.len()));
            let mut dedup = picked.clone();
            dedup.sort_unstable();
            dedup.dedup();
            assert_eq!(dedup.len(), picked.len());
            assert!(picked.iter().all(|e| REACTION_EMOJIS.contains(e)));
        }
    }
}
