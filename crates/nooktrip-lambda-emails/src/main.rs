//! AWS Lambda function for emailing a selected itinerary.
//!
//! Saves the itinerary chosen on `POST /emails` and sends it to the traveller.

use lambda_runtime::Error;

#[tokio::main]
async fn main() -> Result<(), Error> {
    nooktrip_lambda_emails::run().await
}
