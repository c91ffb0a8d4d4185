use crate::state::ServiceStats;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelTag>,
}

#[derive(Debug, Deserialize)]
struct ModelTag {
    #[serde(default)]
    name: Option<String>,
}

pub struct ServiceProbe {
    client: Client,
    tags_url: String,
    timeout: Duration,
}

impl ServiceProbe {
    pub fn new(client: Client, base_url: &str, timeout: Duration) -> Self {
        Self {
            client,
            tags_url: format!("{}/api/tags", base_url.trim_end_matches('/')),
            timeout,
        }
    }

    pub async fn probe(&self) -> ServiceStats {
        let start = Instant::now();
        let req = self.client.get(&self.tags_url).timeout(self.timeout);

        let resp = match req.send().await {
            Ok(resp) => resp,
            Err(err) => return classify_transport_error(&self.tags_url, &err),
        };

        let status = resp.status();
        if status != StatusCode::OK {
            warn!(url = %self.tags_url, status = status.as_u16(), "сервис вернул ошибку");
            return ServiceStats::http_error(status.as_u16());
        }

        let body = match resp.bytes().await {
            Ok(body) => body,
            Err(err) => {
                warn!(url = %self.tags_url, error = %err, "не удалось прочитать ответ сервиса");
                return ServiceStats::failed(err.to_string());
            }
        };

        match parse_model_names(&body) {
            Ok(names) => {
                debug!(
                    models = names.len(),
                    latency_ms = start.elapsed().as_millis() as u64,
                    "сервис доступен"
                );
                ServiceStats::running(names)
            }
            Err(err) => {
                warn!(url = %self.tags_url, error = %err, "некорректный ответ сервиса");
                ServiceStats::failed(format!("некорректный ответ: {err}"))
            }
        }
    }
}

fn classify_transport_error(url: &str, err: &reqwest::Error) -> ServiceStats {
    if err.is_timeout() {
        warn!(url = %url, "таймаут запроса к сервису");
        return ServiceStats::failed(format!("таймаут: {err}"));
    }
    if err.is_connect() {
        warn!(url = %url, error = %err, "сервис недоступен");
        return ServiceStats::offline("Connection refused");
    }
    warn!(url = %url, error = %err, "ошибка запроса к сервису");
    ServiceStats::failed(err.to_string())
}

fn parse_model_names(body: &[u8]) -> Result<Vec<String>, serde_json::Error> {
    let tags: TagsResponse = serde_json::from_slice(body)?;
    Ok(tags
        .models
        .into_iter()
        .map(|m| m.name.unwrap_or_else(|| "unknown".to_string()))
        .collect())
}
