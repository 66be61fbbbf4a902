use nb_api::v1::UserInfo;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::*;
use url::Url;

use crate::constants::IDENTITY_API_PATH;

#[derive(Deserialize)]
struct TokenInfo {
    scopes: Vec<String>,
}

/// Client for the external identity service; it owns authentication, we
/// just ask it who a bearer token belongs to and what it may do.
#[derive(Clone)]
pub struct IdentityClient {
    base_url: Url,
    client: reqwest::Client,
}

impl IdentityClient {
    pub fn new(base_url: &str) -> anyhow::Result<IdentityClient> {
        let base_url = Url::parse(&format!("{}{}/", base_url.trim_end_matches('/'), IDENTITY_API_PATH))?;
        Ok(IdentityClient { base_url, client: reqwest::Client::new() })
    }

    async fn fetch<T: DeserializeOwned>(&self, endpoint: &str, token: &str) -> anyhow::Result<T> {
        let url = self.base_url.join(endpoint)?;
        debug!("identity client contacting {url}");
        let resp = self.client.get(url).bearer_auth(token).send().await?.error_for_status()?;
        Ok(resp.json().await?)
    }

    /// The user the token belongs to.
    pub async fn get_user(&self, token: &str) -> anyhow::Result<UserInfo> {
        self.fetch("user-info", token).await
    }

    /// The scopes the token carries, for admin/user endpoint authorization.
    pub async fn get_scopes(&self, token: &str) -> anyhow::Result<Vec<String>> {
        let info: TokenInfo = self.fetch("token-info", token).await?;
        Ok(info.scopes)
    }
}

#[cfg(test)]
mod tests {
    use httpmock::prelude::*;
    use serde_json::json;

    use super::*;

    #[rstest::rstest]
    #[tokio::test]
    async fn test_get_user() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/auth/api/v1/user-info")
                .header("Authorization", "Bearer gt-t0k3n");
            then.json_body(json!({
                "username": "ribbon",
                "name": "Ribbon",
                "uid": 1104,
                "gid": 1104,
                "groups": [{"name": "ferrymen", "id": 2023}],
            }));
        });

        let client = IdentityClient::new(&server.url("/")).unwrap();
        let user = client.get_user("gt-t0k3n").await.unwrap();
        assert_eq!(user.username, "ribbon");
        assert_eq!(user.groups[0].name, "ferrymen");
        mock.assert();
    }

    #[rstest::rstest]
    #[tokio::test]
    async fn test_get_scopes() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/auth/api/v1/token-info");
            then.json_body(json!({"scopes": ["exec:notebook", "read:tap"]}));
        });

        let client = IdentityClient::new(&server.url("/")).unwrap();
        let scopes = client.get_scopes("gt-t0k3n").await.unwrap();
        assert_eq!(scopes, vec!["exec:notebook".to_string(), "read:tap".to_string()]);
    }

    #[rstest::rstest]
    #[tokio::test]
    async fn test_invalid_token() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/auth/api/v1/token-info");
            then.status(401);
        });

        let client = IdentityClient::new(&server.url("/")).unwrap();
        assert!(client.get_scopes("bogus").await.is_err());
    }
}
