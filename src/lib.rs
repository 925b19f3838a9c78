pub mod clean;
pub mod config;
pub mod discover;
pub mod extract;
pub mod fetch;
pub mod models;
pub mod output;
pub mod pipeline;

#[cfg(test)]
mod test_support;
