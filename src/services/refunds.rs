// Refund reconciliation. The gateway never pushes refund events, so a
// polling pass compares every reconcilable payment against the gateway and
// cascades newly detected refunds onto the post: cancel it, pull the
// channel message if one is up, tell the user. The decision layer is pure
// so idempotency is testable without a gateway.

use std::sync::Arc;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::db::DieselPool;
use crate::metrics;
use crate::models::{Payment, PaymentStatus, Post, PostStatus};
use crate::services::payments::{PaymentProvider, ProviderPaymentStatus};
use crate::services::telegram::Channel;

/// What a reconciliation pass should do with one payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefundAction {
    /// Local and gateway state agree, or the sighting is not actionable
    Keep,
    /// Gateway reports a full refund the local row does not know about yet
    MarkRefunded,
}

/// Derive the action from local and gateway status. Seeing an already
/// recorded refund again yields `Keep`, which is what makes repeated
/// passes no-ops.
pub fn refund_action(local: PaymentStatus, provider: ProviderPaymentStatus) -> RefundAction {
    match (local, provider) {
        (PaymentStatus::Refunded, _) => RefundAction::Keep,
        (_, ProviderPaymentStatus::Refunded) => RefundAction::MarkRefunded,
        _ => RefundAction::Keep,
    }
}

/// Cleanup steps for the post behind a refunded payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CascadePlan {
    pub cancel_post: bool,
    pub delete_message: bool,
    pub notify_user: bool,
}

/// Decide the cascade from the post's current state. Terminal states get
/// an empty plan so re-running the cascade is harmless.
pub fn cascade_plan(post_status: PostStatus, has_channel_message: bool) -> CascadePlan {
    match post_status {
        PostStatus::Canceled | PostStatus::Obsolete => CascadePlan {
            cancel_post: false,
            delete_message: false,
            notify_user: false,
        },
        PostStatus::Published => CascadePlan {
            cancel_post: true,
            delete_message: has_channel_message,
            notify_user: true,
        },
        _ => CascadePlan {
            cancel_post: true,
            delete_message: false,
            notify_user: true,
        },
    }
}

pub struct RefundMonitor {
    pool: DieselPool,
    provider: Arc<dyn PaymentProvider>,
    channel: Arc<dyn Channel>,
    period: std::time::Duration,
}

impl RefundMonitor {
    pub fn new(
        pool: DieselPool,
        provider: Arc<dyn PaymentProvider>,
        channel: Arc<dyn Channel>,
        period: std::time::Duration,
    ) -> Self {
        Self {
            pool,
            provider,
            channel,
            period,
        }
    }

    pub async fn run(&self) {
        info!(period = ?self.period, "Refund reconciliation loop started");
        loop {
            self.pass().await;
            sleep(self.period).await;
        }
    }

    /// One reconciliation pass over all reconcilable payments. Per-payment
    /// failures are logged and skipped so one bad gateway answer does not
    /// stall the rest.
    async fn pass(&self) {
        let timer = metrics::CHECK_REFUNDS_LATENCY.start_timer();

        let mut conn = match self.pool.get().await {
            Ok(conn) => conn,
            Err(e) => {
                error!(error = %e, "Refund monitor could not get a database connection");
                return;
            }
        };

        let payments = match Payment::find_reconcilable(&mut conn).await {
            Ok(payments) => payments,
            Err(e) => {
                error!(error = %e, "Failed to load reconcilable payments");
                return;
            }
        };

        for payment in payments {
            let provider_id = match payment.provider_payment_id.as_deref() {
                Some(id) => id,
                None => continue,
            };
            let local = match payment.status() {
                Some(status) => status,
                None => {
                    warn!(payment_id = payment.id, raw = %payment.status, "Unknown local payment status");
                    continue;
                }
            };

            let provider_status = match self.provider.payment_status(provider_id).await {
                Ok(status) => status,
                Err(e) => {
                    warn!(payment_id = payment.id, error = %e, "Gateway lookup failed");
                    continue;
                }
            };

            if refund_action(local, provider_status) == RefundAction::MarkRefunded {
                if let Err(e) = self.apply_refund(&mut conn, &payment).await {
                    error!(payment_id = payment.id, error = %e, "Refund cascade failed");
                }
            }
        }

        timer.observe_duration();
    }

    /// Record the refund and run the post cascade.
    async fn apply_refund(
        &self,
        conn: &mut diesel_async::AsyncPgConnection,
        payment: &Payment,
    ) -> Result<(), diesel::result::Error> {
        Payment::set_status(conn, payment.id, PaymentStatus::Refunded).await?;
        metrics::PAYMENT_REFUNDS.inc();
        info!(payment_id = payment.id, post_id = payment.post_id, "Refund recorded");

        let post = match Post::find_by_id(conn, payment.post_id).await? {
            Some(post) => post,
            None => {
                debug!(post_id = payment.post_id, "Refunded payment has no post");
                return Ok(());
            }
        };
        let status = match post.status() {
            Some(status) => status,
            None => return Ok(()),
        };

        let plan = cascade_plan(status, post.telegram_message_id.is_some());

        if plan.cancel_post {
            Post::cancel(conn, post.id).await?;
        }
        if plan.delete_message {
            if let Some(message_id) = post.telegram_message_id {
                // Best effort: a missing or too-old message must not block
                // the cascade.
                if let Err(e) = self.channel.delete_message(message_id).await {
                    warn!(post_id = post.id, message_id, error = %e, "Could not delete channel message");
                }
            }
        }
        if plan.notify_user {
            if let Some(user_id) = post.user_id {
                let _ = self
                    .channel
                    .notify_user(
                        user_id,
                        "Your payment was refunded, so the promo post has been canceled.",
                    )
                    .await;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refund_detected_once() {
        assert_eq!(
            refund_action(PaymentStatus::Succeeded, ProviderPaymentStatus::Refunded),
            RefundAction::MarkRefunded
        );
        // Second sighting of the same refund is a no-op
        assert_eq!(
            refund_action(PaymentStatus::Refunded, ProviderPaymentStatus::Refunded),
            RefundAction::Keep
        );
    }

    #[test]
    fn test_non_refund_states_keep() {
        for provider in [
            ProviderPaymentStatus::Pending,
            ProviderPaymentStatus::Succeeded,
            ProviderPaymentStatus::Canceled,
            ProviderPaymentStatus::NotFound,
            ProviderPaymentStatus::Unknown,
        ] {
            assert_eq!(
                refund_action(PaymentStatus::Succeeded, provider),
                RefundAction::Keep
            );
        }
    }

    #[test]
    fn test_cascade_for_published_post() {
        let plan = cascade_plan(PostStatus::Published, true);
        assert!(plan.cancel_post);
        assert!(plan.delete_message);
        assert!(plan.notify_user);

        // Published but the message id never landed
        let plan = cascade_plan(PostStatus::Published, false);
        assert!(plan.cancel_post);
        assert!(!plan.delete_message);
    }

    #[test]
    fn test_cascade_for_scheduled_post() {
        let plan = cascade_plan(PostStatus::Scheduled, false);
        assert!(plan.cancel_post);
        assert!(!plan.delete_message);
        assert!(plan.notify_user);
    }

    #[test]
    fn test_cascade_idempotent_on_terminal_states() {
        for status in [PostStatus::Canceled, PostStatus::Obsolete] {
            let plan = cascade_plan(status, true);
            assert!(!plan.cancel_post);
            assert!(!plan.delete_message);
            assert!(!plan.notify_user);
        }
    }
}
