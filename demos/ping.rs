//! Ping - one transactional call.
//!
//! Sends `PING` to the endpoint and prints whatever comes back. Pair it with
//! the `echo_server` demo.
//!
//! ```sh
//! cargo run --example ping -- test1
//! ```

use std::time::Duration;

use npipe_session::{Endpoint, PipeClient, SessionConfig, WaitTimeout};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let name = std::env::args().nth(1).unwrap_or_else(|| "test1".to_string());
    let endpoint = Endpoint::local(&name)?;

    let config = SessionConfig::default().wait(WaitTimeout::Bounded(Duration::from_secs(5)));
    let client = PipeClient::new(config);

    let response = client.call(&endpoint, b"PING").await?;
    println!("{}", String::from_utf8_lossy(&response));

    Ok(())
}
