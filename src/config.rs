//! 配置加载
//!
//! 配置来源优先级：
//! 1. 环境变量 `GITHUB_TOKEN`（总是覆盖文件中的 token）
//! 2. 配置文件（YAML 或 JSON，按扩展名判断）
//! 3. 环境变量 `DISCORD_URL`（文件中没有 `discord_url` 时使用）
//!
//! 每个密钥也可以用 `<NAME>_FILE` 指向一个文件，文件内容即为值。

use crate::error::{RelayError, Result};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, warn};

/// 未指定 `--config` 时尝试的默认路径
pub const DEFAULT_CONFIG_PATH: &str = "./config.yml";

/// GitHub token 环境变量
pub const TOKEN_ENV: &str = "GITHUB_TOKEN";

/// Webhook URL 环境变量
pub const WEBHOOK_ENV: &str = "DISCORD_URL";

const DEFAULT_INTERVAL_TIME: u64 = 3;
const DEFAULT_SLEEP_DURATION: u64 = 600;

/// GitHub 通知原因
///
/// https://docs.github.com/en/rest/activity/notifications#about-notification-reasons
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NotificationReason {
    Assign,
    Author,
    Comment,
    Invitation,
    Manual,
    Mention,
    ReviewRequested,
    SecurityAlert,
    StateChange,
    Subscribed,
    TeamMention,
}

impl NotificationReason {
    /// 全部已知原因
    pub const ALL: [NotificationReason; 11] = [
        NotificationReason::Assign,
        NotificationReason::Author,
        NotificationReason::Comment,
        NotificationReason::Invitation,
        NotificationReason::Manual,
        NotificationReason::Mention,
        NotificationReason::ReviewRequested,
        NotificationReason::SecurityAlert,
        NotificationReason::StateChange,
        NotificationReason::Subscribed,
        NotificationReason::TeamMention,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationReason::Assign => "assign",
            NotificationReason::Author => "author",
            NotificationReason::Comment => "comment",
            NotificationReason::Invitation => "invitation",
            NotificationReason::Manual => "manual",
            NotificationReason::Mention => "mention",
            NotificationReason::ReviewRequested => "review_requested",
            NotificationReason::SecurityAlert => "security_alert",
            NotificationReason::StateChange => "state_change",
            NotificationReason::Subscribed => "subscribed",
            NotificationReason::TeamMention => "team_mention",
        }
    }
}

impl FromStr for NotificationReason {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self> {
        NotificationReason::ALL
            .iter()
            .copied()
            .find(|reason| reason.as_str() == s)
            .ok_or_else(|| RelayError::InvalidReason(s.to_string()))
    }
}

impl fmt::Display for NotificationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 允许转发的通知原因集合
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReasonSet(BTreeSet<NotificationReason>);

impl ReasonSet {
    /// 包含全部 11 种原因
    pub fn all() -> Self {
        Self(NotificationReason::ALL.into_iter().collect())
    }

    /// 从字符串列表构建，任何未知原因都是配置错误
    pub fn from_strings<I, S>(values: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        values
            .into_iter()
            .map(|v| v.as_ref().parse::<NotificationReason>())
            .collect::<Result<BTreeSet<_>>>()
            .map(Self)
    }

    /// 精确匹配（区分大小写）；未知原因返回 false
    pub fn contains(&self, reason: &str) -> bool {
        reason
            .parse::<NotificationReason>()
            .map(|r| self.0.contains(&r))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<NotificationReason> for ReasonSet {
    fn from_iter<T: IntoIterator<Item = NotificationReason>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// 配置文件的原始结构
#[derive(Debug, Clone, Deserialize)]
struct FileConfig {
    #[serde(default = "default_interval_time")]
    interval_time: u64,
    #[serde(default = "default_notification_types")]
    notification_types: Vec<String>,
    #[serde(default = "default_sleep_duration")]
    sleep_duration: u64,
    #[serde(default)]
    allow_unread: bool,
    #[serde(rename = "github-token", default)]
    github_token: Option<String>,
    #[serde(default)]
    discord_url: Option<String>,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            interval_time: DEFAULT_INTERVAL_TIME,
            notification_types: default_notification_types(),
            sleep_duration: DEFAULT_SLEEP_DURATION,
            allow_unread: false,
            github_token: None,
            discord_url: None,
        }
    }
}

fn default_interval_time() -> u64 {
    DEFAULT_INTERVAL_TIME
}

fn default_sleep_duration() -> u64 {
    DEFAULT_SLEEP_DURATION
}

fn default_notification_types() -> Vec<String> {
    NotificationReason::ALL
        .iter()
        .map(|r| r.as_str().to_string())
        .collect()
}

/// 运行时配置，进程生命周期内不可变
#[derive(Clone)]
pub struct RelayConfig {
    /// 两条 webhook 之间的间隔（秒），用于应对限流
    pub interval_time: u64,
    /// 需要转发的通知原因
    pub notification_types: ReasonSet,
    /// 两次拉取开始之间的间隔（秒），包含拉取和发送耗时
    pub sleep_duration: u64,
    /// 是否包含已读通知
    pub allow_unread: bool,
    /// GitHub Personal Access Token
    pub github_token: String,
    /// Webhook 目标地址
    pub webhook_url: String,
}

impl fmt::Debug for RelayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelayConfig")
            .field("interval_time", &self.interval_time)
            .field("notification_types", &self.notification_types)
            .field("sleep_duration", &self.sleep_duration)
            .field("allow_unread", &self.allow_unread)
            .field("github_token", &"<redacted>")
            .field("webhook_url", &"<redacted>")
            .finish()
    }
}

/// 轮询循环需要的配置子集
#[derive(Debug, Clone)]
pub struct LoopConfig {
    /// 两次拉取开始之间的间隔
    pub poll_interval: Duration,
    /// 同一轮内两条消息之间的间隔
    pub message_delay: Duration,
    pub reasons: ReasonSet,
    pub allow_unread: bool,
}

impl RelayConfig {
    /// 从文件和进程环境加载
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_env(path, |name| std::env::var(name).ok())
    }

    /// 从文件和给定的环境查询函数加载
    pub fn load_with_env<F>(path: Option<&Path>, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let file = match path {
            Some(path) => parse_file(path)?,
            None => {
                debug!("No config file, using defaults");
                FileConfig::default()
            }
        };

        let notification_types = ReasonSet::from_strings(&file.notification_types)?;
        if notification_types.is_empty() {
            warn!("notification_types is empty, no notification will be relayed");
        }

        if file.sleep_duration == 0 {
            return Err(RelayError::Config(
                "sleep_duration must be greater than 0".to_string(),
            ));
        }

        let webhook_url = match non_empty(file.discord_url) {
            Some(url) => url,
            None => env_secret(WEBHOOK_ENV, &env)?
                .ok_or(RelayError::MissingEndpoint(WEBHOOK_ENV))?,
        };

        let github_token = match env_secret(TOKEN_ENV, &env)? {
            Some(token) => token,
            None => {
                let token = non_empty(file.github_token)
                    .ok_or(RelayError::MissingCredential(TOKEN_ENV))?;
                warn!("GitHub token read from the config file; prefer the {} environment variable", TOKEN_ENV);
                token
            }
        };

        Ok(Self {
            interval_time: file.interval_time,
            notification_types,
            sleep_duration: file.sleep_duration,
            allow_unread: file.allow_unread,
            github_token,
            webhook_url,
        })
    }

    pub fn loop_config(&self) -> LoopConfig {
        LoopConfig {
            poll_interval: Duration::from_secs(self.sleep_duration),
            message_delay: Duration::from_secs(self.interval_time),
            reasons: self.notification_types.clone(),
            allow_unread: self.allow_unread,
        }
    }
}

/// 决定使用哪个配置文件：显式指定的路径，否则存在时使用默认路径
pub fn resolve_config_path(explicit: Option<PathBuf>) -> Option<PathBuf> {
    explicit.or_else(|| {
        let default = PathBuf::from(DEFAULT_CONFIG_PATH);
        default.exists().then_some(default)
    })
}

fn parse_file(path: &Path) -> Result<FileConfig> {
    let content = fs::read_to_string(path).map_err(|e| {
        RelayError::Config(format!("cannot read {}: {}", path.display(), e))
    })?;

    let is_json = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let config = if is_json {
        serde_json::from_str(&content)?
    } else {
        serde_yaml::from_str(&content)?
    };
    Ok(config)
}

/// 读取密钥：先看 `NAME`，再看 `NAME_FILE` 指向的文件
pub fn env_secret<F>(name: &str, env: &F) -> Result<Option<String>>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(value) = non_empty(env(name)) {
        return Ok(Some(value));
    }

    let file_var = format!("{}_FILE", name);
    match non_empty(env(&file_var)) {
        Some(path) => {
            let content = fs::read_to_string(&path).map_err(|e| {
                RelayError::Config(format!("cannot read {} ({}): {}", file_var, path, e))
            })?;
            Ok(non_empty(Some(content)))
        }
        None => Ok(None),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    fn write_config(suffix: &str, content: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_reason_round_trips_through_str() {
        for reason in NotificationReason::ALL {
            assert_eq!(reason.as_str().parse::<NotificationReason>().unwrap(), reason);
        }
    }

    #[test]
    fn test_reason_parse_is_case_sensitive() {
        assert!("Mention".parse::<NotificationReason>().is_err());
        assert!("mention ".parse::<NotificationReason>().is_err());
    }

    #[test]
    fn test_reason_set_rejects_unknown() {
        let err = ReasonSet::from_strings(["mention", "ci_activity"]).unwrap_err();
        assert_eq!(err.to_string(), "ci_activity is not a valid notification reason");
    }

    #[test]
    fn test_defaults_without_file() {
        let env = env_from(&[("GITHUB_TOKEN", "ghp_test"), ("DISCORD_URL", "https://example.com/hook")]);
        let config = RelayConfig::load_with_env(None, env).unwrap();

        assert_eq!(config.interval_time, 3);
        assert_eq!(config.sleep_duration, 600);
        assert!(!config.allow_unread);
        assert_eq!(config.notification_types, ReasonSet::all());
        assert_eq!(config.github_token, "ghp_test");
        assert_eq!(config.webhook_url, "https://example.com/hook");
    }

    #[test]
    fn test_yaml_file() {
        let file = write_config(
            ".yml",
            "interval_time: 5\nsleep_duration: 120\nallow_unread: true\nnotification_types: [mention, review_requested]\ndiscord_url: https://example.com/from-file\n",
        );
        let env = env_from(&[("GITHUB_TOKEN", "ghp_test"), ("DISCORD_URL", "https://example.com/from-env")]);
        let config = RelayConfig::load_with_env(Some(file.path()), env).unwrap();

        assert_eq!(config.interval_time, 5);
        assert_eq!(config.sleep_duration, 120);
        assert!(config.allow_unread);
        assert_eq!(config.notification_types.len(), 2);
        assert!(config.notification_types.contains("review_requested"));
        assert!(!config.notification_types.contains("comment"));
        assert_eq!(config.webhook_url, "https://example.com/from-file");
    }

    #[test]
    fn test_json_file() {
        let file = write_config(
            ".json",
            r#"{"interval_time": 1, "notification_types": ["assign"], "discord_url": "https://example.com/hook"}"#,
        );
        let env = env_from(&[("GITHUB_TOKEN", "ghp_test")]);
        let config = RelayConfig::load_with_env(Some(file.path()), env).unwrap();

        assert_eq!(config.interval_time, 1);
        assert_eq!(config.sleep_duration, 600);
        assert!(config.notification_types.contains("assign"));
    }

    #[test]
    fn test_invalid_reason_in_file() {
        let file = write_config(".yml", "notification_types: [mention, bogus]\n");
        let env = env_from(&[("GITHUB_TOKEN", "ghp_test"), ("DISCORD_URL", "https://example.com/hook")]);
        let err = RelayConfig::load_with_env(Some(file.path()), env).unwrap_err();
        assert!(matches!(err, RelayError::InvalidReason(ref r) if r == "bogus"));
    }

    #[test]
    fn test_missing_webhook() {
        let env = env_from(&[("GITHUB_TOKEN", "ghp_test")]);
        let err = RelayConfig::load_with_env(None, env).unwrap_err();
        assert!(matches!(err, RelayError::MissingEndpoint(_)));
    }

    #[test]
    fn test_missing_token() {
        let env = env_from(&[("DISCORD_URL", "https://example.com/hook")]);
        let err = RelayConfig::load_with_env(None, env).unwrap_err();
        assert!(matches!(err, RelayError::MissingCredential(_)));
    }

    #[test]
    fn test_env_token_overrides_file() {
        let file = write_config(".yml", "github-token: from-file\ndiscord_url: https://example.com/hook\n");
        let env = env_from(&[("GITHUB_TOKEN", "from-env")]);
        let config = RelayConfig::load_with_env(Some(file.path()), env).unwrap();
        assert_eq!(config.github_token, "from-env");

        let config = RelayConfig::load_with_env(Some(file.path()), env_from(&[])).unwrap();
        assert_eq!(config.github_token, "from-file");
    }

    #[test]
    fn test_secret_from_file_variable() {
        let secret = write_config(".txt", "ghp_mounted\n");
        let path = secret.path().to_string_lossy().to_string();
        let env = env_from(&[("GITHUB_TOKEN_FILE", path.as_str()), ("DISCORD_URL", "https://example.com/hook")]);
        let config = RelayConfig::load_with_env(None, env).unwrap();
        assert_eq!(config.github_token, "ghp_mounted");
    }

    #[test]
    fn test_zero_sleep_duration_rejected() {
        let file = write_config(".yml", "sleep_duration: 0\n");
        let env = env_from(&[("GITHUB_TOKEN", "ghp_test"), ("DISCORD_URL", "https://example.com/hook")]);
        let err = RelayConfig::load_with_env(Some(file.path()), env).unwrap_err();
        assert!(matches!(err, RelayError::Config(_)));
    }

    #[test]
    fn test_missing_explicit_file() {
        let env = env_from(&[("GITHUB_TOKEN", "ghp_test"), ("DISCORD_URL", "https://example.com/hook")]);
        let err = RelayConfig::load_with_env(Some(Path::new("/nonexistent/relay.yml")), env).unwrap_err();
        assert!(matches!(err, RelayError::Config(_)));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let env = env_from(&[("GITHUB_TOKEN", "ghp_secret"), ("DISCORD_URL", "https://example.com/hook")]);
        let config = RelayConfig::load_with_env(None, env).unwrap();
        let printed = format!("{:?}", config);
        assert!(!printed.contains("ghp_secret"));
        assert!(!printed.contains("example.com"));
    }

    #[test]
    fn test_loop_config() {
        let env = env_from(&[("GITHUB_TOKEN", "ghp_test"), ("DISCORD_URL", "https://example.com/hook")]);
        let loop_config = RelayConfig::load_with_env(None, env).unwrap().loop_config();
        assert_eq!(loop_config.poll_interval, Duration::from_secs(600));
        assert_eq!(loop_config.message_delay, Duration::from_secs(3));
    }
}
