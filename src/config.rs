//! 程序配置
//!
//! 优先级：环境变量 > TOML 配置文件 > 默认值

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

/// 程序配置文件
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// 输入病例表（.xlsx / .csv）
    pub input_path: String,
    /// 分析结果输出路径（写入失败时回退为同名 .csv）
    pub output_path: String,
    /// 提示词模板文件，为空时使用内置模板
    pub template_path: Option<String>,
    /// 只生成提示词，不调用 API
    pub render_only: bool,
    /// 提示词输出路径（仅 render_only 模式）
    pub prompts_output_path: String,
    /// 日志文件
    pub log_file: String,
    /// 占位符对应字段缺失时的填充值
    pub unknown_sentinel: String,

    // --- 调度配置 ---
    /// 同时处理的病例数量
    pub max_concurrent_cases: usize,
    /// 每完成多少个病例进入一次全局冷却，0 表示不冷却
    pub cooldown_every: usize,
    /// 全局冷却时长（秒）
    pub cooldown_secs: u64,

    // --- 外层重试（病例级） ---
    pub case_max_attempts: u32,
    /// 遇到频率限制后暂停的秒数
    pub rate_limit_pause_secs: u64,

    // --- 内层重试（请求级，指数退避） ---
    pub api_max_attempts: u32,
    pub api_initial_delay_secs: u64,
    pub api_max_delay_secs: u64,

    // --- LLM 配置 ---
    pub llm_api_key: String,
    pub llm_api_base_url: String,
    pub llm_model_name: String,
    pub llm_max_tokens: u32,
    pub request_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            input_path: "END.xlsx".to_string(),
            output_path: "medical_analysis_results.xlsx".to_string(),
            template_path: None,
            render_only: false,
            prompts_output_path: "matched_prompts_output.xlsx".to_string(),
            log_file: "medical_analysis.log".to_string(),
            unknown_sentinel: "Unknown".to_string(),
            max_concurrent_cases: 1,
            cooldown_every: 20,
            cooldown_secs: 150,
            case_max_attempts: 3,
            rate_limit_pause_secs: 15,
            api_max_attempts: 5,
            api_initial_delay_secs: 2,
            api_max_delay_secs: 60,
            llm_api_key: String::new(),
            llm_api_base_url: "https://api.openai.com/v1".to_string(),
            llm_model_name: "o3-mini".to_string(),
            llm_max_tokens: 5000,
            request_timeout_secs: 60,
        }
    }
}

impl Config {
    /// 只从环境变量读取（未设置的项使用默认值）
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_env_overrides()
    }

    /// 读取 TOML 配置文件（不存在时使用默认值），再应用环境变量覆盖
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let base = if path.exists() {
            let content = std::fs::read_to_string(path).map_err(|e| ConfigError::InvalidValue {
                field: "config_file".to_string(),
                reason: format!("无法读取 {}: {}", path.display(), e),
            })?;
            Self::from_toml_str(&content).map_err(|source| ConfigError::FileParseFailed {
                path: path.display().to_string(),
                source,
            })?
        } else {
            Self::default()
        };

        let config = base.with_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    fn with_env_overrides(self) -> Result<Self, ConfigError> {
        Ok(Self {
            input_path: env_string("INPUT_PATH").unwrap_or(self.input_path),
            output_path: env_string("OUTPUT_PATH").unwrap_or(self.output_path),
            template_path: env_string("TEMPLATE_PATH").or(self.template_path),
            render_only: env_parse("RENDER_ONLY", self.render_only)?,
            prompts_output_path: env_string("PROMPTS_OUTPUT_PATH")
                .unwrap_or(self.prompts_output_path),
            log_file: env_string("LOG_FILE").unwrap_or(self.log_file),
            unknown_sentinel: env_string("UNKNOWN_SENTINEL").unwrap_or(self.unknown_sentinel),
            max_concurrent_cases: env_parse("MAX_CONCURRENT_CASES", self.max_concurrent_cases)?,
            cooldown_every: env_parse("COOLDOWN_EVERY", self.cooldown_every)?,
            cooldown_secs: env_parse("COOLDOWN_SECS", self.cooldown_secs)?,
            case_max_attempts: env_parse("CASE_MAX_ATTEMPTS", self.case_max_attempts)?,
            rate_limit_pause_secs: env_parse("RATE_LIMIT_PAUSE_SECS", self.rate_limit_pause_secs)?,
            api_max_attempts: env_parse("API_MAX_ATTEMPTS", self.api_max_attempts)?,
            api_initial_delay_secs: env_parse(
                "API_INITIAL_DELAY_SECS",
                self.api_initial_delay_secs,
            )?,
            api_max_delay_secs: env_parse("API_MAX_DELAY_SECS", self.api_max_delay_secs)?,
            llm_api_key: env_string("LLM_API_KEY").unwrap_or(self.llm_api_key),
            llm_api_base_url: env_string("LLM_API_BASE_URL").unwrap_or(self.llm_api_base_url),
            llm_model_name: env_string("LLM_MODEL_NAME").unwrap_or(self.llm_model_name),
            llm_max_tokens: env_parse("LLM_MAX_TOKENS", self.llm_max_tokens)?,
            request_timeout_secs: env_parse("REQUEST_TIMEOUT_SECS", self.request_timeout_secs)?,
        })
    }

    /// 检查配置是否可用
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("max_concurrent_cases", self.max_concurrent_cases as u64),
            ("case_max_attempts", self.case_max_attempts as u64),
            ("api_max_attempts", self.api_max_attempts as u64),
            ("request_timeout_secs", self.request_timeout_secs),
        ];
        for (field, value) in positive {
            if value == 0 {
                return Err(invalid(field, "必须大于 0"));
            }
        }

        if self.api_initial_delay_secs > self.api_max_delay_secs {
            return Err(invalid(
                "api_initial_delay_secs",
                "不能大于 api_max_delay_secs",
            ));
        }

        if !self.render_only && self.llm_api_key.trim().is_empty() {
            return Err(invalid("llm_api_key", "未设置 LLM_API_KEY"));
        }

        Ok(())
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    pub fn rate_limit_pause(&self) -> Duration {
        Duration::from_secs(self.rate_limit_pause_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

fn env_string(var_name: &str) -> Option<String> {
    std::env::var(var_name).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: FromStr>(var_name: &str, default: T) -> Result<T, ConfigError> {
    match env_string(var_name) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::EnvVarParseFailed {
                var_name: var_name.to_string(),
                value,
                expected_type: std::any::type_name::<T>().to_string(),
            }),
        None => Ok(default),
    }
}
