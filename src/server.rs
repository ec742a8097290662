#![doc = "Server admin REST client: implements `ServerApi` for site creation and data-store registration."]
//
//! [`AgsAdminClient`] talks to the server's admin REST root (the config's `agsUrl`,
//! e.g. `https://host:6443/arcgis/admin`). Every call posts a form with `f=json`;
//! replies carrying `"status": "error"` become errors, except data-store
//! registrations the server reports as already existing.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::OnceCell;
use tracing::{debug, error, info};
use url::Url;

use crate::contract::{DataStoreRegistration, RegistrationOutcome, ServerApi, WorkspaceKind};
use crate::error::ExternalError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
struct AdminReply {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    messages: Vec<String>,
    #[serde(default)]
    token: Option<String>,
}

impl AdminReply {
    fn is_error(&self) -> bool {
        self.status.as_deref() == Some("error")
    }

    fn message(&self) -> String {
        self.messages.join("; ")
    }
}

pub struct AgsAdminClient {
    http: Client,
    admin_url: Url,
    credentials: Credentials,
    token: OnceCell<String>,
}

impl AgsAdminClient {
    pub fn new(admin_url: Url, credentials: Credentials) -> Self {
        info!(admin_url = %admin_url, username = %credentials.username, "Initialized AgsAdminClient");
        Self {
            http: Client::new(),
            admin_url,
            credentials,
            token: OnceCell::new(),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.admin_url.as_str().trim_end_matches('/'), path)
    }

    async fn post(&self, path: &str, form: &[(&str, String)]) -> Result<AdminReply, ExternalError> {
        let url = self.endpoint(path);
        debug!(url = %url, "POST admin endpoint");
        let resp = self.http.post(&url).form(form).send().await.map_err(|e| {
            error!(error = ?e, url = %url, "Failed to reach server admin API");
            e
        })?;
        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            error!(status = %status, url = %url, "Server admin API returned error. Response body: {text}");
            return Err(format!("{url} returned {status}: {text}").into());
        }
        let reply: AdminReply = serde_json::from_str(&text)
            .map_err(|e| format!("{url} returned malformed JSON: {e}"))?;
        Ok(reply)
    }

    async fn fetch_token(&self) -> Result<String, ExternalError> {
        let reply = self
            .post(
                "generateToken",
                &[
                    ("username", self.credentials.username.clone()),
                    ("password", self.credentials.password.clone()),
                    ("client", "requestip".to_string()),
                    ("f", "json".to_string()),
                ],
            )
            .await?;
        if reply.is_error() {
            error!(messages = %reply.message(), "generateToken failed");
            return Err(format!("generateToken failed: {}", reply.message()).into());
        }
        reply
            .token
            .ok_or_else(|| ExternalError::from("generateToken returned no token"))
    }

    async fn token(&self) -> Result<&str, ExternalError> {
        let token = self.token.get_or_try_init(|| self.fetch_token()).await?;
        Ok(token.as_str())
    }

    async fn create_new_site(&self, site: Option<&Value>) -> Result<(), ExternalError> {
        let mut form = vec![
            ("username", self.credentials.username.clone()),
            ("password", self.credentials.password.clone()),
            ("f", "json".to_string()),
        ];
        if let Some(Value::Object(fields)) = site {
            for (key, value) in fields {
                let encoded = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                form.push((key.as_str(), encoded));
            }
        }
        let reply = self.post("createNewSite", &form).await?;
        if reply.is_error() {
            error!(messages = %reply.message(), "createNewSite failed");
            return Err(format!("createNewSite failed: {}", reply.message()).into());
        }
        info!("Site created");
        Ok(())
    }
}

/// The `item` JSON posted to `data/registerItem`.
pub fn data_item(registration: &DataStoreRegistration) -> Value {
    let path = registration.path.to_string_lossy();
    match registration.kind {
        WorkspaceKind::FileGeodatabase => json!({
            "type": "folder",
            "path": format!("/fileShares/{}", registration.name),
            "info": {
                "path": path,
                "dataStoreConnectionType": "shared",
            },
        }),
        WorkspaceKind::EnterpriseDatabase => json!({
            "type": "egdb",
            "path": format!("/enterpriseDatabases/{}", registration.name),
            "info": {
                "connectionFile": path,
                "dataStoreConnectionType": "shared",
                "isManaged": false,
            },
        }),
    }
}

fn is_already_registered(message: &str) -> bool {
    let lowered = message.to_lowercase();
    lowered.contains("already registered") || lowered.contains("already exists")
}

#[async_trait]
impl ServerApi for AgsAdminClient {
    async fn create_site(&self, site: &Value) -> Result<(), ExternalError> {
        self.create_new_site(Some(site)).await
    }

    async fn create_default_site(&self) -> Result<(), ExternalError> {
        self.create_new_site(None).await
    }

    async fn register_data_store(
        &self,
        registration: &DataStoreRegistration,
    ) -> Result<RegistrationOutcome, ExternalError> {
        let token = self.token().await?.to_string();
        let item = data_item(registration);
        let reply = self
            .post(
                "data/registerItem",
                &[
                    ("item", item.to_string()),
                    ("token", token),
                    ("f", "json".to_string()),
                ],
            )
            .await?;
        if reply.is_error() {
            let message = reply.message();
            if is_already_registered(&message) {
                return Ok(RegistrationOutcome::AlreadyRegistered);
            }
            error!(name = %registration.name, messages = %message, "registerItem failed");
            return Err(format!("registerItem for {} failed: {message}", registration.name).into());
        }
        info!(name = %registration.name, "Registered data store");
        Ok(RegistrationOutcome::Registered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> AgsAdminClient {
        let url = Url::parse(&format!("{}/arcgis/admin", server.uri())).unwrap();
        AgsAdminClient::new(
            url,
            Credentials {
                username: "admin".into(),
                password: "secret".into(),
            },
        )
    }

    fn fgdb() -> DataStoreRegistration {
        DataStoreRegistration {
            name: "city_fgdb".into(),
            path: PathBuf::from("/data/city.gdb"),
            kind: WorkspaceKind::FileGeodatabase,
        }
    }

    async fn mount_token(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/arcgis/admin/generateToken"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"token":"tok-123"}"#))
            .expect(1)
            .mount(server)
            .await;
    }

    #[test]
    fn file_geodatabase_item_is_a_shared_folder() {
        let item = data_item(&fgdb());
        assert_eq!(item["type"], "folder");
        assert_eq!(item["path"], "/fileShares/city_fgdb");
        assert_eq!(item["info"]["path"], "/data/city.gdb");
    }

    #[tokio::test]
    async fn registers_with_token_once() {
        let server = MockServer::start().await;
        mount_token(&server).await;
        Mock::given(method("POST"))
            .and(path("/arcgis/admin/data/registerItem"))
            .and(body_string_contains("token=tok-123"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"status":"success"}"#))
            .expect(2)
            .mount(&server)
            .await;

        let client = client_for(&server);
        assert_eq!(
            client.register_data_store(&fgdb()).await.unwrap(),
            RegistrationOutcome::Registered
        );
        assert_eq!(
            client.register_data_store(&fgdb()).await.unwrap(),
            RegistrationOutcome::Registered
        );
    }

    #[tokio::test]
    async fn already_registered_is_tolerated() {
        let server = MockServer::start().await;
        mount_token(&server).await;
        Mock::given(method("POST"))
            .and(path("/arcgis/admin/data/registerItem"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"status":"error","messages":["Data item '/fileShares/city_fgdb' already exists."],"code":500}"#,
            ))
            .mount(&server)
            .await;

        let outcome = client_for(&server).register_data_store(&fgdb()).await.unwrap();
        assert_eq!(outcome, RegistrationOutcome::AlreadyRegistered);
    }

    #[tokio::test]
    async fn other_registration_errors_fail() {
        let server = MockServer::start().await;
        mount_token(&server).await;
        Mock::given(method("POST"))
            .and(path("/arcgis/admin/data/registerItem"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"status":"error","messages":["Path is not accessible"],"code":500}"#,
            ))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .register_data_store(&fgdb())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Path is not accessible"));
    }

    #[tokio::test]
    async fn create_site_posts_descriptor_fields() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/arcgis/admin/createNewSite"))
            .and(body_string_contains("username=admin"))
            .and(body_string_contains("runAsync=false"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"status":"success"}"#))
            .expect(1)
            .mount(&server)
            .await;

        let site = json!({ "runAsync": false });
        client_for(&server).create_site(&site).await.unwrap();
    }

    #[tokio::test]
    async fn failed_site_creation_surfaces_messages() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/arcgis/admin/createNewSite"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"status":"error","messages":["Config store is not accessible"]}"#,
            ))
            .mount(&server)
            .await;

        let err = client_for(&server).create_default_site().await.unwrap_err();
        assert!(err.to_string().contains("Config store is not accessible"));
    }
}
