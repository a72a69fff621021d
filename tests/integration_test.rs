mod common;
mod live_config;
