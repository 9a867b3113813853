use std::env;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub port: u16,
    pub data_dir: String,
    pub llm_api_key: String,
    pub llm_base_url: String,
    pub llm_model: String,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8000),
            data_dir: env::var("DATA_DIR").unwrap_or_else(|_| "data".to_string()),
            llm_api_key: env::var("LLM_API_KEY").unwrap_or_default(),
            llm_base_url: env::var("LLM_BASE_URL").unwrap_or_default(),
            llm_model: env::var("LLM_MODEL").unwrap_or_default(),
        }
    }

    /// The assistant falls back to canned replies unless every LLM setting is present.
    pub fn llm_configured(&self) -> bool {
        !self.llm_api_key.is_empty() && !self.llm_base_url.is_empty() && !self.llm_model.is_empty()
    }
}
