use thiserror::Error;

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// API 调用错误
    #[error("API错误: {0}")]
    Api(#[from] ApiError),
    /// 文件操作错误
    #[error("文件错误: {0}")]
    File(#[from] FileError),
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
}

/// LLM API 调用错误
///
/// 在客户端边界完成分类，重试策略只按变体分支，不再检查错误文本。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    /// 连接失败、超时、服务端错误
    #[error("{message}")]
    Transient { message: String },
    /// 服务端声明的频率限制
    #[error("{message}")]
    RateLimited { message: String },
    /// 请求格式错误、鉴权失败等，重试无意义
    #[error("{message}")]
    Permanent { message: String },
}

impl ApiError {
    pub fn transient(message: impl Into<String>) -> Self {
        ApiError::Transient {
            message: message.into(),
        }
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        ApiError::RateLimited {
            message: message.into(),
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        ApiError::Permanent {
            message: message.into(),
        }
    }

    /// 错误类别名称，写入病例的错误日志
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::Transient { .. } => "TransientApiError",
            ApiError::RateLimited { .. } => "RateLimitError",
            ApiError::Permanent { .. } => "PermanentApiError",
        }
    }

    /// 内层退避重试是否适用
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ApiError::Permanent { .. })
    }
}

/// 文件操作错误
#[derive(Debug, Error)]
pub enum FileError {
    /// 文件不存在
    #[error("文件不存在: {path}")]
    NotFound { path: String },
    /// 不支持的文件格式
    #[error("不支持的文件格式: {path}")]
    UnsupportedFormat { path: String },
    /// 工作簿中没有工作表
    #[error("工作簿中没有工作表: {path}")]
    EmptyWorkbook { path: String },
    /// 读取文件失败
    #[error("读取文件失败 ({path}): {source}")]
    ReadFailed {
        path: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 写入文件失败
    #[error("写入文件失败 ({path}): {source}")]
    WriteFailed {
        path: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 环境变量解析失败
    #[error("环境变量 {var_name} 解析失败: 值 '{value}' 无法转换为 {expected_type}")]
    EnvVarParseFailed {
        var_name: String,
        value: String,
        expected_type: String,
    },
    /// 配置项取值非法
    #[error("配置项 {field} 非法: {reason}")]
    InvalidValue { field: String, reason: String },
    /// 配置文件解析失败
    #[error("配置文件解析失败 ({path}): {source}")]
    FileParseFailed {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

impl AppError {
    /// 创建文件读取错误
    pub fn file_read_failed(
        path: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::File(FileError::ReadFailed {
            path: path.into(),
            source: Box::new(source),
        })
    }

    /// 创建文件写入错误
    pub fn file_write_failed(
        path: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::File(FileError::WriteFailed {
            path: path.into(),
            source: Box::new(source),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_kind_and_retryable() {
        assert_eq!(ApiError::transient("x").kind(), "TransientApiError");
        assert_eq!(ApiError::rate_limited("x").kind(), "RateLimitError");
        assert_eq!(ApiError::permanent("x").kind(), "PermanentApiError");

        assert!(ApiError::transient("x").is_retryable());
        assert!(ApiError::rate_limited("x").is_retryable());
        assert!(!ApiError::permanent("x").is_retryable());
    }

    #[test]
    fn test_app_error_display() {
        let err: AppError = ApiError::permanent("invalid api key").into();
        assert_eq!(err.to_string(), "API错误: invalid api key");

        let err: AppError = ConfigError::InvalidValue {
            field: "max_concurrent_cases".to_string(),
            reason: "必须大于 0".to_string(),
        }
        .into();
        assert!(err.to_string().contains("max_concurrent_cases"));
    }
}
