//! Version bump: settle the new authoritative (version, content) pair and
//! announce it to peers.

use sha2::{Digest, Sha256};

use crate::channel;
use crate::error::SaverError;
use crate::peer::PeerState;
use crate::protocol::VersionInfo;
use crate::session::Session;

/// Peer comparison token for a document body. Not an integrity check.
pub fn content_hash(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}

/// Adopt `known` (or a freshly queried version) and broadcast it.
///
/// Without version data the shared ledger would drift, so a failed query is
/// reported through [`Reporter::safe_crash`](crate::collab::Reporter::safe_crash).
pub async fn bump_version(
    session: &Session,
    known: Option<VersionInfo>,
) -> Result<VersionInfo, SaverError> {
    let info = match known {
        Some(info) => info,
        None => {
            let query = session.version_query().await;
            match session.collab.backend.version(&query).await {
                Ok(info) => info,
                Err(e) => {
                    let details = session.debug_log("updateversion").await;
                    session
                        .collab
                        .reporter
                        .safe_crash("updateversion", &format!("{e}\n{details}"));
                    return Err(SaverError::Desync(e.to_string()));
                }
            }
        }
    };

    let previous = {
        let mut record = session.record.write().await;
        let previous = record.version().to_string();
        record.adopt(&info.version, &info.content);
        previous
    };
    log::debug!("version bumped from {previous} to {}", info.version);

    let state = PeerState {
        version: info.version.clone(),
        by: session.config.user_name.clone(),
        hash: content_hash(&info.content),
        editor_name: session.config.editor_name.clone(),
    };
    channel::publish(session, state).await?;

    session.transport.settle().await;
    session.record.write().await.fire_own_isave();
    Ok(info)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_hash_is_sha256_hex() {
        assert_eq!(
            content_hash("hello"),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
        assert_eq!(content_hash("").len(), 64);
    }

    #[test]
    fn test_content_hash_differs() {
        assert_ne!(content_hash("a"), content_hash("b"));
    }
}
