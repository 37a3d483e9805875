use crate::error::{AppError, AppResult};
use crate::model::MovieMetadata;
use async_trait::async_trait;
use log::warn;
use std::time::Duration;

/// Somewhere movie metadata can be looked up by external id.
#[async_trait]
pub trait MovieSource: Send + Sync {
    async fn fetch(&self, movie_id: u64) -> AppResult<MovieMetadata>;
}

/// Client for the TMDB `/movie/{id}` endpoint. One request per call, no retry
/// and no caching.
pub struct TmdbClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl TmdbClient {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(TmdbClient {
            client,
            base_url: base_url.trim_end_matches('/').to_owned(),
            api_key: api_key.to_owned(),
        })
    }

    fn movie_url(&self, movie_id: u64) -> String {
        format!("{}/movie/{}", self.base_url, movie_id)
    }
}

fn upstream_error<E: std::fmt::Display>(movie_id: u64, err: E) -> AppError {
    warn!("metadata fetch for movie {} failed: {}", movie_id, err);
    AppError::BadGateway(format!("could not fetch movie {}", movie_id))
}

#[async_trait]
impl MovieSource for TmdbClient {
    async fn fetch(&self, movie_id: u64) -> AppResult<MovieMetadata> {
        let response = self
            .client
            .get(&self.movie_url(movie_id))
            .query(&[("api_key", self.api_key.as_str())])
            .send()
            .await
            .map_err(|err| upstream_error(movie_id, err))?;

        let status = response.status();
        if !status.is_success() {
            return Err(upstream_error(movie_id, status));
        }

        response
            .json::<MovieMetadata>()
            .await
            .map_err(|err| upstream_error(movie_id, err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn movie_url_ignores_trailing_slash() {
        let client =
            TmdbClient::new("https://api.example.org/3/", "key", Duration::from_secs(1)).unwrap();
        assert_eq!(client.movie_url(550), "https://api.example.org/3/movie/550");
    }

    #[actix_rt::test]
    async fn unreachable_upstream_is_bad_gateway() {
        let client =
            TmdbClient::new("http://127.0.0.1:9", "key", Duration::from_millis(500)).unwrap();
        let err = client.fetch(550).await.unwrap_err();
        assert!(matches!(err, AppError::BadGateway(_)));
    }
}
