use anyhow::Result;
use std::fs;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// ログ設定
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// ログレベル (trace, debug, info, warn, error)。RUST_LOG が優先
    pub level: String,
    /// ファイル出力先（None ならファイル出力なし）
    pub log_dir: Option<PathBuf>,
    /// ファイルローテーション設定
    pub rotation: LogRotation,
    /// コンソール出力有効
    pub console_enabled: bool,
    /// JSON形式で出力
    pub json: bool,
}

#[derive(Debug, Clone)]
pub enum LogRotation {
    /// 日次ローテーション
    Daily,
    /// 時間毎ローテーション
    Hourly,
    /// ローテーションなし
    Never,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_dir: None,
            rotation: LogRotation::Daily,
            console_enabled: true,
            json: false,
        }
    }
}

impl LogConfig {
    /// ファイル出力先を設定
    pub fn with_log_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.log_dir = Some(dir.into());
        self
    }

    /// ローテーション設定
    pub fn with_rotation(mut self, rotation: LogRotation) -> Self {
        self.rotation = rotation;
        self
    }

    /// JSON出力
    pub fn with_json(mut self, json: bool) -> Self {
        self.json = json;
        self
    }

    /// コンソール出力制御
    pub fn with_console(mut self, enabled: bool) -> Self {
        self.console_enabled = enabled;
        self
    }

    fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&self.level))
            .unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

/// ログディレクトリを確保
fn ensure_log_dir(dir: &Path) -> Result<()> {
    if !dir.exists() {
        fs::create_dir_all(dir)?;
    }
    Ok(())
}

/// ログシステムを初期化
///
/// ファイル出力時は返り値のガードを保持し続けること（drop でフラッシュが止まる）。
/// 既にグローバルsubscriberがある場合はエラーを返す。
pub fn init_logging(config: &LogConfig) -> Result<Option<WorkerGuard>> {
    let console = config.console_enabled.then(|| {
        if config.json {
            fmt::layer().json().with_target(true).boxed()
        } else {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .boxed()
        }
    });

    let (file, guard) = match &config.log_dir {
        Some(dir) => {
            ensure_log_dir(dir)?;
            let appender = match config.rotation {
                LogRotation::Daily => rolling::daily(dir, "pii-compliance.log"),
                LogRotation::Hourly => rolling::hourly(dir, "pii-compliance.log"),
                LogRotation::Never => rolling::never(dir, "pii-compliance.log"),
            };
            let (writer, guard) = non_blocking(appender);
            let layer = if config.json {
                fmt::layer().json().with_writer(writer).boxed()
            } else {
                fmt::layer().with_ansi(false).with_writer(writer).boxed()
            };
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(config.env_filter())
        .with(console)
        .with(file)
        .try_init()?;

    tracing::info!(level = %config.level, "logging initialised");
    Ok(guard)
}
