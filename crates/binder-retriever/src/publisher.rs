//! Publishing of the aggregate binding secret
//!
//! The aggregate is created if absent and replaced in place otherwise. An
//! update is only attempted when create reports that the secret already
//! exists; every other create failure aborts.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use kube::api::DynamicObject;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use binder_common::{Error, Result, LABEL_MANAGED_BY, LABEL_MANAGED_BY_BINDER};

use crate::cancel::cancellable;
use crate::client::{ResourceClient, ResourceKind};

/// Secret type of the aggregate
const AGGREGATE_SECRET_TYPE: &str = "Opaque";

/// How the aggregate ended up on the cluster
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PublishOutcome {
    /// The aggregate did not exist and was created
    Created,
    /// The aggregate existed and was replaced
    Updated,
}

/// Build the aggregate secret holding `data`
pub fn build_aggregate(
    namespace: &str,
    name: &str,
    data: &BTreeMap<String, Vec<u8>>,
) -> Result<DynamicObject> {
    let secret = Secret {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(BTreeMap::from([(
                LABEL_MANAGED_BY.to_string(),
                LABEL_MANAGED_BY_BINDER.to_string(),
            )])),
            ..Default::default()
        },
        type_: Some(AGGREGATE_SECRET_TYPE.to_string()),
        data: Some(
            data.iter()
                .map(|(k, v)| (k.clone(), ByteString(v.clone())))
                .collect(),
        ),
        ..Default::default()
    };

    let value = serde_json::to_value(&secret)
        .map_err(|e| Error::serialization(format!("aggregate secret: {e}")))?;
    serde_json::from_value(value)
        .map_err(|e| Error::serialization(format!("aggregate secret to DynamicObject: {e}")))
}

/// Writes the aggregate secret
pub struct Publisher<'a> {
    client: &'a dyn ResourceClient,
    cancel: &'a CancellationToken,
}

impl<'a> Publisher<'a> {
    /// Create a publisher
    pub fn new(client: &'a dyn ResourceClient, cancel: &'a CancellationToken) -> Self {
        Self { client, cancel }
    }

    /// Create or update the aggregate secret `namespace/name` with `data`
    pub async fn publish(
        &self,
        namespace: &str,
        name: &str,
        data: &BTreeMap<String, Vec<u8>>,
    ) -> Result<(DynamicObject, PublishOutcome)> {
        let object = build_aggregate(namespace, name, data)?;

        info!(namespace = %namespace, name = %name, keys = data.len(), "Creating aggregate secret");
        let created = cancellable(
            self.cancel,
            "creating aggregate secret",
            self.client.create(ResourceKind::Secret, &object),
        )
        .await;

        match created {
            Ok(obj) => {
                info!(namespace = %namespace, name = %name, "Aggregate secret created");
                Ok((obj, PublishOutcome::Created))
            }
            Err(e) if e.is_already_exists() => {
                info!(namespace = %namespace, name = %name, "Aggregate secret already exists, updating");
                let updated = cancellable(
                    self.cancel,
                    "updating aggregate secret",
                    self.client.update(ResourceKind::Secret, &object),
                )
                .await
                .inspect_err(|e| {
                    error!(namespace = %namespace, name = %name, error = %e, "Failed to update aggregate secret")
                })?;
                info!(namespace = %namespace, name = %name, "Aggregate secret updated");
                Ok((updated, PublishOutcome::Updated))
            }
            Err(e) => {
                error!(namespace = %namespace, name = %name, error = %e, "Failed to create aggregate secret");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MockResourceClient;
    use kube::ResourceExt;

    fn data() -> BTreeMap<String, Vec<u8>> {
        BTreeMap::from([
            ("DATABASE_HOST".to_string(), b"db.local".to_vec()),
            ("DATABASE_SECRET_PASSWORD".to_string(), b"s3cr3t".to_vec()),
        ])
    }

    #[test]
    fn aggregate_is_an_opaque_secret_with_encoded_data() {
        let obj = build_aggregate("apps", "db-binding", &data()).unwrap();
        let types = obj.types.as_ref().unwrap();
        assert_eq!(types.kind, "Secret");
        assert_eq!(types.api_version, "v1");
        assert_eq!(obj.name_any(), "db-binding");
        assert_eq!(obj.namespace().as_deref(), Some("apps"));
        assert_eq!(
            obj.labels().get(LABEL_MANAGED_BY).map(String::as_str),
            Some(LABEL_MANAGED_BY_BINDER)
        );
        assert_eq!(obj.data["type"], "Opaque");
        // "s3cr3t" base64 encoded
        assert_eq!(obj.data["data"]["DATABASE_SECRET_PASSWORD"], "czNjcjN0");
    }

    #[tokio::test]
    async fn story_first_publish_creates_without_update() {
        let mut mock = MockResourceClient::new();
        mock.expect_create()
            .times(1)
            .returning(|_, obj| Ok(obj.clone()));
        mock.expect_update().never();
        let token = CancellationToken::new();

        let (obj, outcome) = Publisher::new(&mock, &token)
            .publish("apps", "db-binding", &data())
            .await
            .unwrap();
        assert_eq!(outcome, PublishOutcome::Created);
        assert_eq!(obj.name_any(), "db-binding");
    }

    #[tokio::test]
    async fn story_existing_aggregate_is_updated() {
        let mut mock = MockResourceClient::new();
        mock.expect_create()
            .times(1)
            .returning(|_, _| Err(Error::already_exists("Secret", "apps", "db-binding")));
        mock.expect_update()
            .times(1)
            .returning(|_, obj| Ok(obj.clone()));
        let token = CancellationToken::new();

        let (_, outcome) = Publisher::new(&mock, &token)
            .publish("apps", "db-binding", &data())
            .await
            .unwrap();
        assert_eq!(outcome, PublishOutcome::Updated);
    }

    #[tokio::test]
    async fn other_create_failures_abort() {
        let mut mock = MockResourceClient::new();
        mock.expect_create()
            .times(1)
            .returning(|_, _| Err(Error::malformed("Secret", "db-binding", "forbidden")));
        mock.expect_update().never();
        let token = CancellationToken::new();

        let err = Publisher::new(&mock, &token)
            .publish("apps", "db-binding", &data())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MalformedResource { .. }));
    }

    #[tokio::test]
    async fn update_conflict_is_fatal() {
        let mut mock = MockResourceClient::new();
        mock.expect_create()
            .returning(|_, _| Err(Error::already_exists("Secret", "apps", "db-binding")));
        mock.expect_update()
            .times(1)
            .returning(|_, _| Err(Error::conflict("Secret", "apps", "db-binding")));
        let token = CancellationToken::new();

        let err = Publisher::new(&mock, &token)
            .publish("apps", "db-binding", &data())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Conflict { .. }));
    }

    #[tokio::test]
    async fn cancelled_publish_writes_nothing() {
        let mut mock = MockResourceClient::new();
        mock.expect_create().never();
        mock.expect_update().never();
        let token = CancellationToken::new();
        token.cancel();

        let err = Publisher::new(&mock, &token)
            .publish("apps", "db-binding", &data())
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
    }
}
