pub mod config;
pub mod data;
pub mod delta;
pub mod feed;
pub mod logging;
pub mod report;
pub mod series;
pub mod tracker;
