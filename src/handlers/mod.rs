pub mod posts;
pub mod redirect;
pub mod slots;

pub use redirect::router;
