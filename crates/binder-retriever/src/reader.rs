//! Reference reader: fetches secrets and config maps named by the custom resource
//!
//! Each distinct resource is fetched with a single API call. Secret values are
//! base64 decoded; config map values are taken as plain text.

use std::collections::BTreeMap;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use kube::api::DynamicObject;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use binder_common::{Error, Result};

use crate::cancel::cancellable;
use crate::client::{ResourceClient, ResourceKind};
use crate::config::ItemSelection;
use crate::descriptor::RequestedItems;

/// A fetched resource and the entries selected from it
#[derive(Clone, Debug)]
pub struct FetchedResource {
    /// Kind of the resource
    pub kind: ResourceKind,
    /// Name of the resource
    pub name: String,
    /// The resource as returned by the API server
    pub object: DynamicObject,
    /// Selected keys and their decoded values
    pub entries: BTreeMap<String, Vec<u8>>,
}

/// Reads referenced resources from one namespace
pub struct ReferenceReader<'a> {
    client: &'a dyn ResourceClient,
    namespace: &'a str,
    selection: ItemSelection,
    cancel: &'a CancellationToken,
}

impl<'a> ReferenceReader<'a> {
    /// Create a reader over `namespace`
    pub fn new(
        client: &'a dyn ResourceClient,
        namespace: &'a str,
        selection: ItemSelection,
        cancel: &'a CancellationToken,
    ) -> Self {
        Self {
            client,
            namespace,
            selection,
            cancel,
        }
    }

    /// Fetch a secret and decode the selected items
    pub async fn read_secret(&self, name: &str, items: &RequestedItems) -> Result<FetchedResource> {
        self.read(ResourceKind::Secret, name, items).await
    }

    /// Fetch a config map and extract the selected items
    pub async fn read_config_map(
        &self,
        name: &str,
        items: &RequestedItems,
    ) -> Result<FetchedResource> {
        self.read(ResourceKind::ConfigMap, name, items).await
    }

    async fn read(
        &self,
        kind: ResourceKind,
        name: &str,
        items: &RequestedItems,
    ) -> Result<FetchedResource> {
        info!(
            kind = %kind,
            name = %name,
            items = ?items.names,
            all_items = items.all,
            "Reading referenced items"
        );

        let stage = format!("fetching {kind} {}/{name}", self.namespace);
        let object = cancellable(
            self.cancel,
            &stage,
            self.client.get(kind, self.namespace, name),
        )
        .await?
        .ok_or_else(|| Error::resource_not_found(kind.as_str(), self.namespace, name))?;

        let data = data_map(kind, name, &object)?;

        let mut entries = BTreeMap::new();
        for (key, value) in data {
            let text = value.as_str().ok_or_else(|| {
                Error::malformed(
                    kind.as_str(),
                    name,
                    format!("value of '{key}' is not a string"),
                )
            })?;

            if !self.selection.includes(items, key) {
                debug!(kind = %kind, name = %name, key = %key, "Skipping unrequested key");
                continue;
            }

            let bytes = match kind {
                ResourceKind::Secret => STANDARD
                    .decode(text)
                    .map_err(|e| Error::decode(name, key, e))?,
                ResourceKind::ConfigMap => text.as_bytes().to_vec(),
            };
            debug!(kind = %kind, name = %name, key = %key, length = bytes.len(), "Inspecting key");
            entries.insert(key.clone(), bytes);
        }

        for missing in items.names.iter().filter(|item| !data.contains_key(*item)) {
            warn!(kind = %kind, name = %name, key = %missing, "Requested key not present");
        }

        Ok(FetchedResource {
            kind,
            name: name.to_string(),
            object,
            entries,
        })
    }
}

/// The `data` mapping of a fetched resource
fn data_map<'o>(
    kind: ResourceKind,
    name: &str,
    object: &'o DynamicObject,
) -> Result<&'o Map<String, Value>> {
    object
        .data
        .get("data")
        .ok_or_else(|| Error::malformed(kind.as_str(), name, "could not find 'data'"))?
        .as_object()
        .ok_or_else(|| Error::malformed(kind.as_str(), name, "'data' is not a mapping"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MockResourceClient;
    use serde_json::json;

    fn object(kind: ResourceKind, name: &str, body: Value) -> DynamicObject {
        DynamicObject::new(name, &kind.api_resource())
            .within("apps")
            .data(body)
    }

    fn b64(value: &str) -> String {
        STANDARD.encode(value)
    }

    fn requested(items: &[&str]) -> RequestedItems {
        let mut r = RequestedItems::default();
        for item in items {
            r.request(Some(item.to_string()));
        }
        r
    }

    fn mock_returning(obj: Option<DynamicObject>) -> MockResourceClient {
        let mut mock = MockResourceClient::new();
        mock.expect_get()
            .times(1)
            .returning(move |_, _, _| Ok(obj.clone()));
        mock
    }

    #[tokio::test]
    async fn secret_values_are_decoded() {
        let secret = object(
            ResourceKind::Secret,
            "db-creds",
            json!({"data": {"password": b64("s3cr3t")}}),
        );
        let mock = mock_returning(Some(secret));
        let token = CancellationToken::new();
        let reader = ReferenceReader::new(&mock, "apps", ItemSelection::Requested, &token);

        let fetched = reader
            .read_secret("db-creds", &requested(&["password"]))
            .await
            .unwrap();
        assert_eq!(fetched.entries["password"], b"s3cr3t".to_vec());
        assert_eq!(fetched.name, "db-creds");
        assert_eq!(fetched.kind, ResourceKind::Secret);
    }

    #[tokio::test]
    async fn config_map_values_are_plain_text() {
        let cm = object(
            ResourceKind::ConfigMap,
            "settings",
            json!({"data": {"url": "postgres://db.local"}}),
        );
        let mock = mock_returning(Some(cm));
        let token = CancellationToken::new();
        let reader = ReferenceReader::new(&mock, "apps", ItemSelection::Requested, &token);

        let fetched = reader
            .read_config_map("settings", &requested(&["url"]))
            .await
            .unwrap();
        assert_eq!(fetched.entries["url"], b"postgres://db.local".to_vec());
    }

    #[tokio::test]
    async fn requested_selection_drops_other_keys() {
        let secret = object(
            ResourceKind::Secret,
            "db-creds",
            json!({"data": {"password": b64("p"), "username": b64("u")}}),
        );
        let mock = mock_returning(Some(secret));
        let token = CancellationToken::new();
        let reader = ReferenceReader::new(&mock, "apps", ItemSelection::Requested, &token);

        let fetched = reader
            .read_secret("db-creds", &requested(&["password"]))
            .await
            .unwrap();
        assert_eq!(fetched.entries.len(), 1);
        assert!(fetched.entries.contains_key("password"));
    }

    #[tokio::test]
    async fn all_selection_keeps_every_key() {
        let secret = object(
            ResourceKind::Secret,
            "db-creds",
            json!({"data": {"password": b64("p"), "username": b64("u")}}),
        );
        let mock = mock_returning(Some(secret));
        let token = CancellationToken::new();
        let reader = ReferenceReader::new(&mock, "apps", ItemSelection::All, &token);

        let fetched = reader
            .read_secret("db-creds", &requested(&["password"]))
            .await
            .unwrap();
        assert_eq!(fetched.entries.len(), 2);
        assert_eq!(fetched.entries["username"], b"u".to_vec());
    }

    #[tokio::test]
    async fn missing_resource_is_not_found() {
        let mock = mock_returning(None);
        let token = CancellationToken::new();
        let reader = ReferenceReader::new(&mock, "apps", ItemSelection::Requested, &token);

        let err = reader
            .read_secret("nope", &requested(&["password"]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ResourceNotFound { .. }));
        assert_eq!(err.resource_name(), Some("nope"));
    }

    #[tokio::test]
    async fn missing_data_is_malformed() {
        let secret = object(ResourceKind::Secret, "db-creds", json!({"type": "Opaque"}));
        let mock = mock_returning(Some(secret));
        let token = CancellationToken::new();
        let reader = ReferenceReader::new(&mock, "apps", ItemSelection::Requested, &token);

        let err = reader
            .read_secret("db-creds", &requested(&["password"]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MalformedResource { .. }));
    }

    #[tokio::test]
    async fn non_string_value_is_malformed() {
        let cm = object(
            ResourceKind::ConfigMap,
            "settings",
            json!({"data": {"port": 5432}}),
        );
        let mock = mock_returning(Some(cm));
        let token = CancellationToken::new();
        let reader = ReferenceReader::new(&mock, "apps", ItemSelection::All, &token);

        let err = reader
            .read_config_map("settings", &RequestedItems::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("'port'"));
    }

    #[tokio::test]
    async fn invalid_base64_is_a_decode_error() {
        let secret = object(
            ResourceKind::Secret,
            "db-creds",
            json!({"data": {"password": "%%% not base64 %%%"}}),
        );
        let mock = mock_returning(Some(secret));
        let token = CancellationToken::new();
        let reader = ReferenceReader::new(&mock, "apps", ItemSelection::Requested, &token);

        let err = reader
            .read_secret("db-creds", &requested(&["password"]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Decode { .. }));
    }

    #[tokio::test]
    async fn cancelled_reader_never_calls_the_api() {
        let mut mock = MockResourceClient::new();
        mock.expect_get().never();
        let token = CancellationToken::new();
        token.cancel();
        let reader = ReferenceReader::new(&mock, "apps", ItemSelection::Requested, &token);

        let err = reader
            .read_secret("db-creds", &requested(&["password"]))
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
    }
}
