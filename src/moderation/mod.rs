pub mod filter;
pub mod normalize;

pub use filter::ModerationFilter;
pub use normalize::{clean_name, normalize_name};
