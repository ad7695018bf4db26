pub mod toml_loader;

pub use toml_loader::{load_topic_weights, parse_topic_weights};
