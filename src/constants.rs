// src/constants.rs

pub const UI_WIDTH: usize = 88;
pub const URL_TRUNCATE_LENGTH: usize = 40;
pub const MAX_FILENAME_CHARS: usize = 100;
pub const CONFIG_DIR_NAME: &str = concat!(".", clap::crate_name!());
pub const CONFIG_FILE_NAME: &str = "config.json";
pub const LOG_FILE_NAME: &str = concat!(clap::crate_name!(), ".log");
pub const LOG_FALLBACK_FILE_NAME: &str = "fallback.log";
pub const DEFAULT_SAVE_DIR: &str = "./downloads";
pub const DEFAULT_MAX_HEIGHT: u32 = 1080;
/// `timeout` 与 `download_timeout` 的上限 (秒)
pub const MAX_TIMEOUT_SECS: u64 = 86_400;

pub const USER_AGENTS: [&str; 3] = [
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
];

/// 视为“直链视频”的文件扩展名 (小写，不含点)
pub const VIDEO_EXTENSIONS: [&str; 8] = ["mp4", "mkv", "avi", "mov", "wmv", "flv", "webm", "m4v"];

/// 已知的流媒体平台，交给提取引擎处理
pub const STREAMING_DOMAINS: [&str; 7] = [
    "youtube.com",
    "youtu.be",
    "vimeo.com",
    "dailymotion.com",
    "twitch.tv",
    "facebook.com",
    "instagram.com",
];

pub mod vpn {
    use std::time::Duration;

    pub const DEFAULT_BINARY: &str = "nordvpn";
    pub const DEFAULT_COUNTRIES: [&str; 8] = ["US", "DE", "GB", "NL", "SE", "CH", "FR", "CA"];
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
    pub const DISCONNECT_TIMEOUT: Duration = Duration::from_secs(15);
    pub const CONNECT_ATTEMPTS: u32 = 3;
    pub const ROTATION_DEBOUNCE: Duration = Duration::from_secs(10);
    pub const DEFAULT_IDENTITY_ENDPOINT: &str = "https://httpbin.org/ip";
    pub const IDENTITY_PROBE_TIMEOUT: Duration = Duration::from_secs(10);
    pub const DEFAULT_INTERVAL_MIN_SECS: u64 = 300;
    pub const DEFAULT_INTERVAL_MAX_SECS: u64 = 1800;
    pub const MAX_INTERVAL_SECS: u64 = 7 * 86_400;
}

pub mod pacing {
    use std::time::Duration;

    /// (min, max) 秒
    pub const SETTLE_AFTER_CONNECT: (f64, f64) = (2.0, 5.0);
    pub const PAUSE_BEFORE_RECONNECT: (f64, f64) = (1.0, 3.0);
    pub const AFTER_FILL: (f64, f64) = (0.5, 1.0);
    pub const AFTER_SCROLL: (f64, f64) = (0.5, 1.0);
    pub const AFTER_HOVER: (f64, f64) = (0.3, 0.8);
    pub const AFTER_CLICK: (f64, f64) = (1.0, 2.0);
    pub const AFTER_POINTER: (f64, f64) = (0.5, 1.5);
    pub const READING: (f64, f64) = (2.0, 8.0);
    pub const SCROLL_DISTANCE: (i64, i64) = (100, 500);
    pub const SCROLL_STEPS: (u32, u32) = (1, 3);
    pub const VIEWPORT: (u32, u32) = (1920, 1080);
    pub const POINTER_MARGIN: u32 = 100;
    /// 单次停顿的上限，配置中的人类延迟与登录等待也受此约束
    pub const MAX_DELAY_SECS: u64 = 600;
    pub const MAX_DELAY: Duration = Duration::from_secs(MAX_DELAY_SECS);
}

pub mod ytdlp {
    pub const DEFAULT_BINARY: &str = "yt-dlp";
    pub const DOWNLOAD_TIMEOUT_SECS: u64 = 3600;
    /// 下载后用于校验的媒体扩展名
    pub const OUTPUT_EXTENSIONS: [&str; 8] = ["mp4", "mkv", "webm", "avi", "mov", "m4v", "flv", "wmv"];
}
