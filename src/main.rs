use scribe::error::ScribeError;

#[tokio::main]
async fn main() -> Result<(), ScribeError> {
    scribe::app::run().await
}
