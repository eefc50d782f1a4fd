//! LLM API 客户端
//!
//! 封装与 OpenAI 兼容接口的交互，并在这一层把错误分类为
//! 临时错误 / 频率限制 / 永久错误。

use std::time::Duration;

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use backoff::ExponentialBackoff;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::ApiError;

/// 对话补全接口
///
/// 编排层和流程层只依赖这个 trait，测试时可以替换为假实现。
#[async_trait]
pub trait ChatApi: Send + Sync {
    /// 发送一条用户消息，返回模型的原始文本（可能为空）
    async fn complete(&self, prompt: &str) -> Result<String, ApiError>;
}

/// LLM 客户端
///
/// 整个运行期间只创建一个，所有任务共享；内部没有可变状态。
pub struct LlmClient {
    client: Client<OpenAIConfig>,
    model_name: String,
    max_tokens: u32,
    timeout: Duration,
}

impl LlmClient {
    /// 创建新的 LLM 客户端
    pub fn new(config: &Config) -> Self {
        let openai_config = OpenAIConfig::new()
            .with_api_key(&config.llm_api_key)
            .with_api_base(&config.llm_api_base_url);

        // 重试只由 RequestExecutor 和 CaseFlow 负责，关闭客户端内置的退避
        let no_retry = ExponentialBackoff {
            max_elapsed_time: Some(Duration::ZERO),
            ..Default::default()
        };

        Self {
            client: Client::with_config(openai_config).with_backoff(no_retry),
            model_name: config.llm_model_name.clone(),
            max_tokens: config.llm_max_tokens,
            timeout: config.request_timeout(),
        }
    }
}

#[async_trait]
impl ChatApi for LlmClient {
    async fn complete(&self, prompt: &str) -> Result<String, ApiError> {
        debug!("调用 LLM API，模型: {}", self.model_name);
        debug!("用户消息长度: {} 字符", prompt.chars().count());

        let user_msg = ChatCompletionRequestUserMessageArgs::default()
            .content(prompt)
            .build()
            .map_err(classify_openai_error)?;

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model_name)
            .messages(vec![ChatCompletionRequestMessage::User(user_msg)])
            .max_tokens(self.max_tokens)
            .build()
            .map_err(classify_openai_error)?;

        let response = tokio::time::timeout(self.timeout, self.client.chat().create(request))
            .await
            .map_err(|_| {
                warn!("LLM API 请求超时 ({} 秒)", self.timeout.as_secs());
                ApiError::transient(format!("请求超时 ({} 秒)", self.timeout.as_secs()))
            })?
            .map_err(|e| {
                let classified = classify_openai_error(e);
                warn!("LLM API 调用失败 [{}]: {}", classified.kind(), classified);
                classified
            })?;

        debug!("LLM API 调用成功");

        Ok(response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .unwrap_or_default())
    }
}

/// 把 async-openai 的错误映射为 [`ApiError`]
pub fn classify_openai_error(err: OpenAIError) -> ApiError {
    match err {
        OpenAIError::ApiError(api_err) => classify_api_message(
            &api_err.message,
            api_err.r#type.as_deref(),
            api_err.code.as_deref(),
        ),
        OpenAIError::InvalidArgument(msg) => ApiError::permanent(msg),
        other => ApiError::transient(other.to_string()),
    }
}

/// 按服务端返回的错误类型、错误码和消息分类
///
/// 频率限制单独成类：外层的固定暂停与内层指数退避是两套策略。
/// 额度用尽同样返回 429，但重试无意义，归为永久错误。
pub fn classify_api_message(
    message: &str,
    error_type: Option<&str>,
    code: Option<&str>,
) -> ApiError {
    let lower_message = message.to_lowercase();
    let lower_type = error_type.unwrap_or_default().to_lowercase();
    let lower_code = code.unwrap_or_default().to_lowercase();

    let quota_exhausted = lower_type == "insufficient_quota" || lower_code == "insufficient_quota";
    let permanent_type = matches!(
        lower_type.as_str(),
        "invalid_request_error" | "authentication_error" | "permission_error" | "not_found_error"
    );
    let permanent_message = ["invalid api key", "incorrect api key", "unauthorized"]
        .iter()
        .any(|p| lower_message.contains(p));
    if quota_exhausted || permanent_type || permanent_message {
        return ApiError::permanent(message);
    }

    let rate_limited = ["rate limit", "rate_limit", "too many requests"]
        .iter()
        .any(|p| lower_message.contains(p) || lower_type.contains(p) || lower_code.contains(p));
    if rate_limited {
        return ApiError::rate_limited(message);
    }

    ApiError::transient(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    #[test]
    fn test_classify_rate_limit() {
        let err = classify_api_message(
            "Rate limit reached for o3-mini in organization org-x",
            Some("requests"),
            None,
        );
        assert!(matches!(err, ApiError::RateLimited { .. }));

        let err = classify_api_message("slow down", Some("rate_limit_exceeded"), None);
        assert!(matches!(err, ApiError::RateLimited { .. }));

        let err = classify_api_message("slow down", None, Some("rate_limit_exceeded"));
        assert!(matches!(err, ApiError::RateLimited { .. }));
    }

    #[test]
    fn test_classify_permanent() {
        let err = classify_api_message("Incorrect API key provided", None, None);
        assert!(matches!(err, ApiError::Permanent { .. }));

        let err = classify_api_message("bad param", Some("invalid_request_error"), None);
        assert!(matches!(err, ApiError::Permanent { .. }));
    }

    #[test]
    fn test_classify_insufficient_quota_is_permanent() {
        let err = classify_api_message(
            "You exceeded your current quota, please check your plan and billing details.",
            Some("insufficient_quota"),
            Some("insufficient_quota"),
        );
        assert!(matches!(err, ApiError::Permanent { .. }));
    }

    #[test]
    fn test_classify_server_error_is_transient() {
        let err = classify_api_message("The server had an error", Some("server_error"), None);
        assert!(matches!(err, ApiError::Transient { .. }));
        assert_eq!(err.to_string(), "The server had an error");
    }

    #[test]
    fn test_invalid_argument_is_permanent() {
        let err = classify_openai_error(OpenAIError::InvalidArgument("missing model".into()));
        assert!(matches!(err, ApiError::Permanent { .. }));
    }

    /// 读完一个 HTTP 请求（头部 + Content-Length 指定的正文）
    async fn read_request(stream: &mut TcpStream) {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = stream.read(&mut chunk).await.unwrap();
            if n == 0 {
                return;
            }
            buf.extend_from_slice(&chunk[..n]);

            let text = String::from_utf8_lossy(&buf);
            if let Some(header_end) = text.find("\r\n\r\n") {
                let content_length = text[..header_end]
                    .lines()
                    .find_map(|line| {
                        let (name, value) = line.split_once(':')?;
                        name.eq_ignore_ascii_case("content-length")
                            .then(|| value.trim().parse::<usize>().ok())
                            .flatten()
                    })
                    .unwrap_or(0);
                if buf.len() >= header_end + 4 + content_length {
                    return;
                }
            }
        }
    }

    /// 本地服务：每个请求都返回 429，并记录请求次数
    async fn spawn_rate_limited_server(hits: Arc<AtomicUsize>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let body = r#"{"error":{"message":"Rate limit reached for o3-mini","type":"requests","param":null,"code":"rate_limit_exceeded"}}"#;
            loop {
                let Ok((mut stream, _)) = listener.accept().await else {
                    return;
                };
                hits.fetch_add(1, Ordering::SeqCst);
                read_request(&mut stream).await;
                let response = format!(
                    "HTTP/1.1 429 Too Many Requests\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            }
        });

        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_http_429_surfaces_as_rate_limited_after_one_request() {
        let hits = Arc::new(AtomicUsize::new(0));
        let base_url = spawn_rate_limited_server(hits.clone()).await;

        let client = LlmClient::new(&Config {
            llm_api_base_url: base_url,
            llm_api_key: "sk-test".to_string(),
            request_timeout_secs: 3,
            ..Config::default()
        });

        let err = client.complete("hello").await.unwrap_err();

        assert!(matches!(err, ApiError::RateLimited { .. }), "got {:?}", err);
        assert_eq!(err.to_string(), "Rate limit reached for o3-mini");
        // 客户端自身不重试
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
