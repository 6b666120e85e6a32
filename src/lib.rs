pub mod blobstore;
pub mod pipeline;
pub mod provider;
pub mod storage;
pub mod utils;
pub mod web;

use std::{env, sync::Arc};

use once_cell::sync::Lazy;

use pipeline::Pipeline;

pub struct AppContext {
    pub pipeline: Arc<Pipeline>,
}

const STT_SQLITE_PATH: &str = "sqlite://./stt_data/database/storage.db?mode=rwc";
const STT_BUCKET: &str = "yaps-meeting";
const STT_REGION: &str = "cn-hongkong";
const STT_GATEWAY_URL: &str = "http://127.0.0.1:9000";
const STT_PROVIDER_URL: &str = "https://tingwu.cn-beijing.aliyuncs.com";

fn env_or(key: &str, default: &str) -> String {
    match env::var(key) {
        Ok(v) => v,
        Err(_) => dotenv::var(key).unwrap_or_else(|_| default.to_string()),
    }
}

pub static SQLITE_PATH: Lazy<String> = Lazy::new(|| env_or("STT_SQLITE_PATH", STT_SQLITE_PATH));

pub static BUCKET: Lazy<String> = Lazy::new(|| env_or("STT_BUCKET", STT_BUCKET));

pub static REGION: Lazy<String> = Lazy::new(|| env_or("STT_REGION", STT_REGION));

pub static GATEWAY_URL: Lazy<String> = Lazy::new(|| env_or("STT_GATEWAY_URL", STT_GATEWAY_URL));

pub static PROVIDER_URL: Lazy<String> = Lazy::new(|| env_or("STT_PROVIDER_URL", STT_PROVIDER_URL));

pub static PROVIDER_APP_KEY: Lazy<String> = Lazy::new(|| env_or("STT_PROVIDER_APP_KEY", ""));

pub static PROVIDER_API_KEY: Lazy<String> = Lazy::new(|| env_or("STT_PROVIDER_API_KEY", ""));

pub fn init_env() {
    dotenv::dotenv().ok();

    // 确保数据目录存在
    if let Some(db_path) = SQLITE_PATH.strip_prefix("sqlite://") {
        let db_path = db_path.split('?').next().unwrap_or(db_path);
        if let Some(dir) = std::path::Path::new(db_path).parent() {
            std::fs::create_dir_all(dir).unwrap_or_else(|e| {
                eprintln!("Failed to create database directory: {}", e);
            });
        }
    }
}
