pub mod cache;
pub mod http;
pub mod jobs;
pub mod navigation;
pub mod storage;
