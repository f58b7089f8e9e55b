//! AWS adapters: S3 storage, SQS queue, DynamoDB job store and Rekognition
//! video moderation.

pub mod dynamodb;
pub mod rekognition;
pub mod s3;
pub mod sqs;

pub use dynamodb::DynamoAdapter;
pub use rekognition::RekognitionClassifier;
pub use s3::S3Adapter;
pub use sqs::SqsAdapter;
