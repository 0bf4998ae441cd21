//! 可观测性：结构化日志初始化
//!
//! 用 RUST_LOG 控制级别；检索 / 合成 / 反馈各阶段通过 tracing 打点。

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub fn init() {
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .with(fmt::layer())
        .init();
}
