//! 错误类型
//!
//! 启动阶段的错误（配置、鉴权）是致命的；轮询阶段的错误都在循环内部消化。

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("{0} is not a valid notification reason")]
    InvalidReason(String),

    #[error("no {0} provided; set it as an environment variable")]
    MissingCredential(&'static str),

    #[error("there was no webhook URL provided in either the config file or the {0} environment variable")]
    MissingEndpoint(&'static str),

    #[error("authorization check failed: {0}")]
    Authorization(String),

    #[error("source request failed ({status}): {body}")]
    Source { status: u16, body: String },

    #[error("delivery failed ({status}): {body}")]
    Delivery { status: u16, body: String },

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, RelayError>;

/// 截取响应体用于日志，避免把整页 HTML 打进错误信息
pub fn body_excerpt(body: &str) -> String {
    const MAX: usize = 200;
    match body.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}
