use reqwest::Client;
use std::time::Duration;
use anyhow::Result;

const USER_AGENT: &str = concat!("feed_notifier/", env!("CARGO_PKG_VERSION"));

pub struct HttpClientFactory;

impl HttpClientFactory {
    /// 通用 Client：RSS 拉取、Webhook 推送
    pub fn create() -> Result<Client> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Some(Duration::from_secs(30)))
            .build()?;
        Ok(client)
    }

    /// LLM 专用 Client，推理模型响应慢，总超时放宽
    pub fn create_llm() -> Result<Client> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(180))
            .connect_timeout(Duration::from_secs(30))
            .http1_only()
            .build()?;
        Ok(client)
    }
}
