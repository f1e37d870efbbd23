// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 日志初始化
//!
//! `RUST_LOG` 控制级别 (缺省 `zone_sentinel=info`),`LOG_FORMAT=json` 输出 JSON。

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DEFAULT_DIRECTIVE: &str = "zone_sentinel=info";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE))
}

fn use_json() -> bool {
    std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}

/// 初始化全局日志,重复调用时忽略
pub fn init_tracing() {
    let registry = tracing_subscriber::registry().with(env_filter());

    let result = if use_json() {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .try_init()
    };

    if result.is_err() {
        tracing::debug!("日志已初始化");
    }
}
