pub mod click_stat;
pub mod payment;
pub mod post;
pub mod user;

// Re-export common types
pub use click_stat::{ClickStat, NewClickStat};
pub use payment::{NewPayment, Payment, PaymentStatus};
pub use post::{classify_claim, ClaimOutcome, NewPost, Post, PostStatus};
pub use user::User;
