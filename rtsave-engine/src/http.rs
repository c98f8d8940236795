//! [`SaveBackend`] over HTTP.
//!
//! Merge and version queries are urlencoded form POSTs, the remote fetch is
//! a JSON GET on the REST API, and the physical save posts the editor form
//! with the engine's fields on top.

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use std::time::Duration;
use url::form_urlencoded;

use crate::collab::SaveBackend;
use crate::config::SaverConfig;
use crate::error::SaverError;
use crate::protocol::{DocumentRef, MergeRequest, MergeResult, RemoteContent, VersionInfo, VersionQuery};

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Comment attached to every save the engine performs.
pub const AUTOSAVE_COMMENT: &str = "Auto-Saved by Realtime Session";

/// Fields the engine always sets on the save form.
const ENGINE_FIELDS: [&str; 8] = [
    "xredirect",
    "xeditaction",
    "comment",
    "action_saveandcontinue",
    "minorEdit",
    "ajax",
    "form_token",
    "language",
];

/// Put the engine's save fields over the editor's serialized form.
pub fn compose_save_form(editor_form: &str, config: &SaverConfig) -> String {
    let mut out = form_urlencoded::Serializer::new(String::new());
    for (key, value) in form_urlencoded::parse(editor_form.as_bytes()) {
        if !ENGINE_FIELDS.contains(&key.as_ref()) {
            out.append_pair(&key, &value);
        }
    }
    out.append_pair("xredirect", "")
        .append_pair("xeditaction", "edit")
        .append_pair("comment", AUTOSAVE_COMMENT)
        .append_pair("action_saveandcontinue", "Save & Continue")
        .append_pair("minorEdit", "1")
        .append_pair("ajax", "true")
        .append_pair("form_token", &config.form_token)
        .append_pair("language", &config.language);
    out.finish()
}

fn document_pairs(out: &mut form_urlencoded::Serializer<'_, String>, doc: &DocumentRef) {
    out.append_pair("wiki", &doc.wiki)
        .append_pair("document", &doc.document)
        .append_pair("language", &doc.language);
}

fn merge_body(request: &MergeRequest) -> String {
    let mut out = form_urlencoded::Serializer::new(String::new());
    document_pairs(&mut out, &request.doc);
    out.append_pair("version", &request.version)
        .append_pair("content", &request.content);
    if let Some(flag) = request.convert_html {
        out.append_pair("convertHTML", &flag.to_string());
    }
    out.finish()
}

fn version_body(query: &VersionQuery) -> String {
    let mut out = form_urlencoded::Serializer::new(String::new());
    document_pairs(&mut out, &query.doc);
    out.append_pair("version", &query.version);
    out.finish()
}

/// reqwest-backed wiki endpoints.
pub struct HttpBackend {
    client: reqwest::Client,
    config: SaverConfig,
}

impl HttpBackend {
    pub fn new(config: SaverConfig, timeout: Duration) -> Result<Self, SaverError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, config })
    }

    async fn post_form(&self, url: String, body: String) -> Result<reqwest::Response, SaverError> {
        let response = self
            .client
            .post(url)
            .header(CONTENT_TYPE, FORM_CONTENT_TYPE)
            .body(body)
            .send()
            .await?;
        Ok(response)
    }
}

async fn expect_success(response: reqwest::Response) -> Result<reqwest::Response, SaverError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(SaverError::Transport(format!("status {status}: {body}")))
}

#[async_trait]
impl SaveBackend for HttpBackend {
    async fn merge(&self, request: &MergeRequest) -> Result<MergeResult, SaverError> {
        let response = self
            .post_form(self.config.merge_endpoint(), merge_body(request))
            .await?;
        Ok(expect_success(response).await?.json::<MergeResult>().await?)
    }

    async fn version(&self, query: &VersionQuery) -> Result<VersionInfo, SaverError> {
        let response = self
            .post_form(self.config.version_endpoint(), version_body(query))
            .await?;
        Ok(expect_success(response).await?.json::<VersionInfo>().await?)
    }

    async fn fetch_remote(&self) -> Result<RemoteContent, SaverError> {
        let response = self
            .client
            .get(self.config.remote_content_endpoint())
            .send()
            .await?;
        Ok(expect_success(response).await?.json::<RemoteContent>().await?)
    }

    async fn save_document(&self, form: &str) -> Result<(), SaverError> {
        let response = self
            .post_form(self.config.save_url.clone(), compose_save_form(form, &self.config))
            .await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let message = response.text().await.unwrap_or_default();
        Err(SaverError::Save {
            status: Some(status.as_u16()),
            message,
        })
    }
}
