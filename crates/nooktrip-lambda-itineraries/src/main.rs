//! AWS Lambda function for itinerary submission.
//!
//! Accepts a trip request on `POST /itineraries`, validates it and returns the
//! normalized itinerary with a fresh identifier.

use lambda_runtime::Error;

#[tokio::main]
async fn main() -> Result<(), Error> {
    nooktrip_lambda_itineraries::run().await
}
