//! HTTP clients for the external collaborators: the RunwayML generation API
//! and the remote moderation classifier and decision function.

pub mod classifier;
pub mod decision;
pub mod runway;

pub use classifier::HttpClassifier;
pub use decision::HttpDecisionFunction;
pub use runway::RunwayClient;

use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

fn http_client() -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()
}
