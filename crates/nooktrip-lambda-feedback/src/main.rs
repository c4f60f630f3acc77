//! AWS Lambda function for itinerary feedback.
//!
//! Serves `GET /feedback` and `POST /feedback`.

use lambda_runtime::Error;

#[tokio::main]
async fn main() -> Result<(), Error> {
    nooktrip_lambda_feedback::run().await
}
