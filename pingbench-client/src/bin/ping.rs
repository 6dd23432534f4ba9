use clap::Parser;
use pingbench_client::{ClientConfig, HttpClient};
use pingbench_common::PingRequest;
use std::process;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "pingbench-ping", about = "Send a single ping to a PingBench echo server")]
struct Args {
    /// Base URL of the echo server
    #[arg(long, default_value = "http://127.0.0.1:8080")]
    url: String,

    /// Number to send; the server echoes it back
    #[arg(long, default_value_t = 42)]
    number: i64,

    /// Request timeout
    #[arg(long, value_parser = humantime::parse_duration, default_value = "5s")]
    timeout: Duration,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let mut config = ClientConfig::new(args.url);
    config.timeout = args.timeout;
    let client = HttpClient::new(config).unwrap_or_else(|e| {
        eprintln!("error: {e}");
        process::exit(1);
    });

    match client.ping_with_headers(PingRequest { number: args.number, text: String::new() }).await {
        Ok(reply) => {
            println!("response content-type: {}", reply.content_type.unwrap_or_default());
            println!("response message: {:?}", reply.message);
        }
        Err(e) => {
            eprintln!("error: {e}");
            process::exit(1);
        }
    }
}
