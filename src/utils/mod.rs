pub mod links;
pub mod markdown;

pub use links::{
    add_tracking_param, channel_permalink, normalize_product_url, remove_url,
    tracking_redirect_url,
};
pub use markdown::{escape_markdown_v2, escape_markdown_v2_except_links, truncate_markdown_v2};
