/// Request sources: the origin abstraction from which pending widget
/// requests are polled and later acknowledged. Two variants exist, an S3
/// bucket listing and an SQS queue, behind the [`RequestSource`] trait.
use std::future::Future;

use thiserror::Error;
use tracing::debug;

use crate::config::SourceConfig;

const VISIBILITY_TIMEOUT_SECONDS: i32 = 5;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to list pending requests: {0}")]
    List(String),
    #[error("failed to fetch request body: {0}")]
    Fetch(String),
    #[error("failed to receive from queue: {0}")]
    Receive(String),
    #[error("failed to acknowledge request: {0}")]
    Acknowledge(String),
}

/// Opaque tag identifying a request inside its source, for acknowledgment.
/// The bucket variant stores the object key, the queue variant the receipt
/// handle; the engine never looks inside.
#[derive(Debug, Clone)]
pub struct Receipt(String);

impl Receipt {
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A request pulled off a source but not yet decoded. The body stays raw
/// bytes: decoding is the validator's job, so a corrupt body is a skipped
/// request rather than a source error.
#[derive(Debug)]
pub struct PendingRequest {
    pub body: Vec<u8>,
    pub receipt: Receipt,
}

pub trait RequestSource {
    /// Produce the next pending request, or `None` when nothing is waiting.
    /// Must return promptly either way so the idle counter can advance.
    fn poll(
        &self,
    ) -> impl Future<Output = Result<Option<PendingRequest>, SourceError>>;

    /// Remove the request tagged by `receipt` from the source. This is the
    /// sole mechanism preventing reprocessing, so it must only be called
    /// after the corresponding mutation has been applied.
    fn acknowledge(
        &self,
        receipt: &Receipt,
    ) -> impl Future<Output = Result<(), SourceError>>;
}

/// Polls a bucket holding one object per pending request.
pub struct BucketSource {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl BucketSource {
    pub fn new(aws_config: &aws_config::SdkConfig, bucket: String) -> Self {
        Self {
            client: aws_sdk_s3::Client::new(aws_config),
            bucket,
        }
    }
}

impl RequestSource for BucketSource {
    async fn poll(&self) -> Result<Option<PendingRequest>, SourceError> {
        // The listing comes back in ascending lexicographic key order, so
        // the first entry is the smallest key. Oldest-inserted-first is
        // best effort only; the backend does not guarantee it.
        let listing = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .max_keys(1)
            .send()
            .await
            .map_err(|err| SourceError::List(err.to_string()))?;

        let Some(object) =
            listing.contents.unwrap_or_default().into_iter().next()
        else {
            return Ok(None);
        };
        let Some(key) = object.key else {
            return Ok(None);
        };

        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
            .map_err(|err| SourceError::Fetch(err.to_string()))?;

        let body = response
            .body
            .collect()
            .await
            .map_err(|err| SourceError::Fetch(err.to_string()))?
            .into_bytes()
            .to_vec();

        debug!("retrieved request '{key}' from bucket '{}'", self.bucket);

        Ok(Some(PendingRequest {
            body,
            receipt: Receipt::new(key),
        }))
    }

    async fn acknowledge(&self, receipt: &Receipt) -> Result<(), SourceError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(receipt.as_str())
            .send()
            .await
            .map_err(|err| SourceError::Acknowledge(err.to_string()))?;

        debug!(
            "deleted request '{}' from bucket '{}'",
            receipt.as_str(),
            self.bucket
        );

        Ok(())
    }
}

/// Receives requests from a queue, one message per poll.
pub struct QueueSource {
    client: aws_sdk_sqs::Client,
    queue_url: String,
}

impl QueueSource {
    pub fn new(aws_config: &aws_config::SdkConfig, queue_url: String) -> Self {
        Self {
            client: aws_sdk_sqs::Client::new(aws_config),
            queue_url,
        }
    }
}

impl RequestSource for QueueSource {
    async fn poll(&self) -> Result<Option<PendingRequest>, SourceError> {
        // A malformed queue URL surfaces here as a receive error; the engine
        // logs it and treats the poll as empty rather than crashing the loop.
        let response = self
            .client
            .receive_message()
            .queue_url(&self.queue_url)
            .visibility_timeout(VISIBILITY_TIMEOUT_SECONDS)
            .max_number_of_messages(1)
            .send()
            .await
            .map_err(|err| SourceError::Receive(err.to_string()))?;

        let Some(message) =
            response.messages.unwrap_or_default().into_iter().next()
        else {
            return Ok(None);
        };
        let (Some(body), Some(handle)) = (message.body, message.receipt_handle)
        else {
            return Ok(None);
        };

        debug!("received request from queue '{}'", self.queue_url);

        Ok(Some(PendingRequest {
            body: body.into_bytes(),
            receipt: Receipt::new(handle),
        }))
    }

    async fn acknowledge(&self, receipt: &Receipt) -> Result<(), SourceError> {
        self.client
            .delete_message()
            .queue_url(&self.queue_url)
            .receipt_handle(receipt.as_str())
            .send()
            .await
            .map_err(|err| SourceError::Acknowledge(err.to_string()))?;

        debug!("deleted request from queue '{}'", self.queue_url);

        Ok(())
    }
}

/// The active source variant for this run, dispatching to whichever backend
/// the configuration selected.
pub enum AnyRequestSource {
    Bucket(BucketSource),
    Queue(QueueSource),
}

impl AnyRequestSource {
    pub fn from_config(
        config: &SourceConfig,
        aws_config: &aws_config::SdkConfig,
    ) -> Self {
        match config {
            SourceConfig::Bucket(bucket) => {
                Self::Bucket(BucketSource::new(aws_config, bucket.clone()))
            }
            SourceConfig::Queue(queue_url) => {
                Self::Queue(QueueSource::new(aws_config, queue_url.clone()))
            }
        }
    }
}

impl RequestSource for AnyRequestSource {
    async fn poll(&self) -> Result<Option<PendingRequest>, SourceError> {
        match self {
            Self::Bucket(source) => source.poll().await,
            Self::Queue(source) => source.poll().await,
        }
    }

    async fn acknowledge(&self, receipt: &Receipt) -> Result<(), SourceError> {
        match self {
            Self::Bucket(source) => source.acknowledge(receipt).await,
            Self::Queue(source) => source.acknowledge(receipt).await,
        }
    }
}
