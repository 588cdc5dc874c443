// Lifecycle invariants: the transition table is the single gate for
// status changes, claim classification admits exactly one publisher, and
// refund reconciliation stays idempotent across repeated passes.

use promopost::models::{classify_claim, ClaimOutcome, PostStatus};
use promopost::services::payments::ProviderPaymentStatus;
use promopost::services::refunds::{cascade_plan, refund_action, RefundAction};
use promopost::models::PaymentStatus;

const ALL_STATUSES: [PostStatus; 8] = [
    PostStatus::Draft,
    PostStatus::Accepted,
    PostStatus::Paid,
    PostStatus::Scheduled,
    PostStatus::Publishing,
    PostStatus::Published,
    PostStatus::Canceled,
    PostStatus::Obsolete,
];

#[test]
fn nothing_transitions_back_to_draft() {
    for status in ALL_STATUSES {
        assert!(!status.can_transition(PostStatus::Draft));
    }
}

#[test]
fn terminal_states_have_no_exits() {
    for status in [PostStatus::Canceled, PostStatus::Obsolete] {
        for next in ALL_STATUSES {
            assert!(
                !status.can_transition(next),
                "{:?} -> {:?} should be rejected",
                status,
                next
            );
        }
    }
}

#[test]
fn published_can_only_be_canceled() {
    for next in ALL_STATUSES {
        let allowed = next == PostStatus::Canceled;
        assert_eq!(PostStatus::Published.can_transition(next), allowed);
    }
}

#[test]
fn forward_path_is_connected() {
    assert!(PostStatus::Draft.can_transition(PostStatus::Accepted));
    assert!(PostStatus::Accepted.can_transition(PostStatus::Paid));
    assert!(PostStatus::Paid.can_transition(PostStatus::Scheduled));
    assert!(PostStatus::Scheduled.can_transition(PostStatus::Publishing));
    assert!(PostStatus::Publishing.can_transition(PostStatus::Published));
}

#[test]
fn claim_admits_only_scheduled() {
    for status in ALL_STATUSES {
        match status {
            PostStatus::Scheduled => assert!(classify_claim(status).is_ok()),
            PostStatus::Publishing | PostStatus::Published => assert_eq!(
                classify_claim(status),
                Err(ClaimOutcome::AlreadyInProgress(status))
            ),
            other => assert_eq!(
                classify_claim(other),
                Err(ClaimOutcome::NotPublishable(other))
            ),
        }
    }
}

#[test]
fn refund_fires_exactly_once() {
    // First sighting marks the refund
    assert_eq!(
        refund_action(PaymentStatus::Succeeded, ProviderPaymentStatus::Refunded),
        RefundAction::MarkRefunded
    );
    // After the local row says refunded, every later pass is a no-op
    assert_eq!(
        refund_action(PaymentStatus::Refunded, ProviderPaymentStatus::Refunded),
        RefundAction::Keep
    );
}

#[test]
fn refund_cascade_is_idempotent() {
    // First cascade on a published post does everything
    let first = cascade_plan(PostStatus::Published, true);
    assert!(first.cancel_post && first.delete_message && first.notify_user);

    // The cascade left the post canceled; a second run does nothing
    let second = cascade_plan(PostStatus::Canceled, true);
    assert!(!second.cancel_post && !second.delete_message && !second.notify_user);
}
