//! Echo server - serve one peer and send back everything it writes.
//!
//! # Running
//!
//! ```sh
//! cargo run --example echo_server -- test1
//! # in another terminal
//! printf PING > req.bin && cargo run --bin npipe -- call test1 -i req.bin
//! ```

use npipe_session::{
    AccessMode, Endpoint, Input, Output, PipeMode, RelayRequest, SessionConfig, SessionDriver,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let name = std::env::args().nth(1).unwrap_or_else(|| "test1".to_string());
    let endpoint = Endpoint::local(&name)?;

    let driver = SessionDriver::new(SessionConfig::default());
    let request = RelayRequest {
        endpoint,
        access: AccessMode::Duplex,
        input: Input::Pipe,
        output: Output::Pipe,
    };

    eprintln!("Echo server listening on {}", request.endpoint);
    let report = driver.serve(&request, PipeMode::byte()).await?;
    eprintln!("Echoed {} bytes", report.bytes);

    Ok(())
}
