//! One-shot HTTP probe: `dqm4hep-probe <uri>` performs a single GET and
//! prints the response body, matching the original tooling's
//! `dqm4hep-send-request-response` shape (parse argv, one network
//! round-trip, print the result, exit 1 on bad input).

use std::process::ExitCode;
use std::time::Duration;

use dqm_runtime::LoggingBuilder;
use dqm_transport::HttpClient;

#[tokio::main]
async fn main() -> ExitCode {
    LoggingBuilder::new().init();

    let mut args = std::env::args().skip(1);
    let Some(uri) = args.next() else {
        eprintln!("usage: dqm4hep-probe <uri>");
        return ExitCode::FAILURE;
    };
    if args.next().is_some() {
        eprintln!("usage: dqm4hep-probe <uri>");
        return ExitCode::FAILURE;
    }

    let client = match HttpClient::new(Duration::from_secs(10)) {
        Ok(client) => client,
        Err(e) => {
            eprintln!("failed to build http client: {e}");
            return ExitCode::FAILURE;
        }
    };

    match client.get(&uri).await {
        Ok(body) => {
            match std::str::from_utf8(&body) {
                Ok(text) => println!("{text}"),
                Err(_) => println!("{body:?}"),
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("GET {uri} failed: {e}");
            ExitCode::FAILURE
        }
    }
}
