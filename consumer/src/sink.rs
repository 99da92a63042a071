/// Widget sinks: the destination abstraction where widgets are persisted or
/// removed. Two variants exist, a key-prefixed S3 bucket and a DynamoDB
/// table, behind the [`WidgetSink`] trait. Both treat `save` as a full
/// overwrite of any previously stored record.
use std::collections::HashMap;
use std::future::Future;

use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_s3::primitives::ByteStream;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::SinkConfig;
use types::utils::widget_object_key;
use types::{Widget, WidgetRef};

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("failed to save widget: {0}")]
    Save(String),
    #[error("failed to probe for widget: {0}")]
    Probe(String),
    #[error("failed to delete widget: {0}")]
    Delete(String),
    #[error("widget could not be serialized: {0}")]
    Serialize(#[from] serde_json::Error),
}

pub trait WidgetSink {
    /// Persist the widget, replacing any stored record in full.
    fn save(
        &self,
        widget: &Widget,
    ) -> impl Future<Output = Result<(), SinkError>>;

    /// Remove the stored widget. An absent target is not a failure: the
    /// intent is "ensure it's gone".
    fn delete(
        &self,
        target: &WidgetRef,
    ) -> impl Future<Output = Result<(), SinkError>>;

    /// Point lookup for a stored widget.
    fn exists(
        &self,
        target: &WidgetRef,
    ) -> impl Future<Output = Result<bool, SinkError>>;
}

/// Stores each widget as a JSON object at `widgets/<owner-slug>/<widgetId>`.
pub struct BucketSink {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl BucketSink {
    pub fn new(aws_config: &aws_config::SdkConfig, bucket: String) -> Self {
        Self {
            client: aws_sdk_s3::Client::new(aws_config),
            bucket,
        }
    }
}

impl WidgetSink for BucketSink {
    async fn save(&self, widget: &Widget) -> Result<(), SinkError> {
        let key = widget_object_key(&widget.owner, &widget.widget_id);
        let body = serde_json::to_vec(widget)?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|err| SinkError::Save(err.to_string()))?;

        debug!("stored widget '{key}' in bucket '{}'", self.bucket);

        Ok(())
    }

    async fn delete(&self, target: &WidgetRef) -> Result<(), SinkError> {
        let Some(owner) = target.owner.as_deref() else {
            warn!(
                "delete request for widget '{}' has no owner, cannot derive a storage key",
                target.widget_id
            );
            return Ok(());
        };
        let key = widget_object_key(owner, &target.widget_id);

        if !self.exists(target).await? {
            warn!(
                "widget '{key}' does not exist in bucket '{}', nothing to delete",
                self.bucket
            );
            return Ok(());
        }

        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
            .map_err(|err| SinkError::Delete(err.to_string()))?;

        debug!("deleted widget '{key}' from bucket '{}'", self.bucket);

        Ok(())
    }

    async fn exists(&self, target: &WidgetRef) -> Result<bool, SinkError> {
        let Some(owner) = target.owner.as_deref() else {
            return Ok(false);
        };
        let key = widget_object_key(owner, &target.widget_id);

        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(err) => {
                let err = err.into_service_error();
                if err.is_not_found() {
                    Ok(false)
                } else {
                    Err(SinkError::Probe(err.to_string()))
                }
            }
        }
    }
}

/// Stores each widget as one table item with primary key `id`, with the
/// extension attributes flattened into their own top-level columns.
pub struct TableSink {
    client: aws_sdk_dynamodb::Client,
    table: String,
}

/// Columns owned by the widget record itself. An extension attribute is not
/// allowed to shadow one of these.
const RESERVED_COLUMNS: [&str; 4] = ["id", "owner", "description", "label"];

impl TableSink {
    pub fn new(aws_config: &aws_config::SdkConfig, table: String) -> Self {
        Self {
            client: aws_sdk_dynamodb::Client::new(aws_config),
            table,
        }
    }
}

fn widget_item(widget: &Widget) -> HashMap<String, AttributeValue> {
    let mut item = HashMap::new();

    item.insert("id".to_string(), AttributeValue::S(widget.widget_id.clone()));
    item.insert("owner".to_string(), AttributeValue::S(widget.owner.clone()));

    if let Some(description) = &widget.description {
        item.insert(
            "description".to_string(),
            AttributeValue::S(description.clone()),
        );
    }
    if let Some(label) = &widget.label {
        item.insert("label".to_string(), AttributeValue::S(label.clone()));
    }

    for attribute in widget.other_attributes.iter().flatten() {
        if RESERVED_COLUMNS.contains(&attribute.name.as_str()) {
            warn!(
                "extension attribute '{}' collides with a reserved column, dropping it",
                attribute.name
            );
            continue;
        }
        item.insert(
            attribute.name.clone(),
            AttributeValue::S(attribute.value.clone()),
        );
    }

    item
}

impl WidgetSink for TableSink {
    async fn save(&self, widget: &Widget) -> Result<(), SinkError> {
        // PutItem replaces the whole item, which is exactly the full
        // overwrite the save contract requires.
        self.client
            .put_item()
            .table_name(&self.table)
            .set_item(Some(widget_item(widget)))
            .send()
            .await
            .map_err(|err| SinkError::Save(err.to_string()))?;

        debug!(
            "stored widget '{}' in table '{}'",
            widget.widget_id, self.table
        );

        Ok(())
    }

    async fn delete(&self, target: &WidgetRef) -> Result<(), SinkError> {
        if !self.exists(target).await? {
            warn!(
                "widget '{}' does not exist in table '{}', nothing to delete",
                target.widget_id, self.table
            );
            return Ok(());
        }

        self.client
            .delete_item()
            .table_name(&self.table)
            .key("id", AttributeValue::S(target.widget_id.clone()))
            .send()
            .await
            .map_err(|err| SinkError::Delete(err.to_string()))?;

        debug!(
            "deleted widget '{}' from table '{}'",
            target.widget_id, self.table
        );

        Ok(())
    }

    async fn exists(&self, target: &WidgetRef) -> Result<bool, SinkError> {
        let response = self
            .client
            .get_item()
            .table_name(&self.table)
            .key("id", AttributeValue::S(target.widget_id.clone()))
            .send()
            .await
            .map_err(|err| SinkError::Probe(err.to_string()))?;

        Ok(response.item.is_some())
    }
}

/// The active sink variant for this run, dispatching to whichever backend
/// the configuration selected.
pub enum AnyWidgetSink {
    Bucket(BucketSink),
    Table(TableSink),
}

impl AnyWidgetSink {
    pub fn from_config(
        config: &SinkConfig,
        aws_config: &aws_config::SdkConfig,
    ) -> Self {
        match config {
            SinkConfig::Bucket(bucket) => {
                Self::Bucket(BucketSink::new(aws_config, bucket.clone()))
            }
            SinkConfig::Table(table) => {
                Self::Table(TableSink::new(aws_config, table.clone()))
            }
        }
    }
}

impl WidgetSink for AnyWidgetSink {
    async fn save(&self, widget: &Widget) -> Result<(), SinkError> {
        match self {
            Self::Bucket(sink) => sink.save(widget).await,
            Self::Table(sink) => sink.save(widget).await,
        }
    }

    async fn delete(&self, target: &WidgetRef) -> Result<(), SinkError> {
        match self {
            Self::Bucket(sink) => sink.delete(target).await,
            Self::Table(sink) => sink.delete(target).await,
        }
    }

    async fn exists(&self, target: &WidgetRef) -> Result<bool, SinkError> {
        match self {
            Self::Bucket(sink) => sink.exists(target).await,
            Self::Table(sink) => sink.exists(target).await,
        }
    }
}
