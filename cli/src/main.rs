//! Issues one PROPFIND and prints the status line.

use clap::Parser;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use webdav_core::{load_settings, DavResponse, WebDavClient};

#[derive(Debug, Parser)]
#[command(name = "webdav-propfind", about = "Send a PROPFIND request and print the response status")]
struct Args {
    /// Target URL; defaults to `target.url` from the settings.
    url: Option<String>,

    /// Value for the Depth header (0, 1 or infinity). Sent empty when omitted.
    #[arg(long)]
    depth: Option<String>,

    /// Optional propfind body.
    #[arg(long, default_value = "")]
    body: String,
}

fn status_line(response: &DavResponse) -> String {
    format!("{} {}", response.status, response.reason)
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let settings = load_settings()?;

    let filter = EnvFilter::try_new(&settings.logging.level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .init();

    tracing::debug!(settings = ?settings, "settings loaded");

    let url = args.url.unwrap_or_else(|| settings.target.url.clone());
    let client = WebDavClient::from_settings(&settings);

    println!("PROPFIND {url}");
    match client.propfind(&url, args.depth.as_deref(), &args.body) {
        Ok(response) => println!("{}", status_line(&response)),
        Err(e) => match e.response() {
            Some(response) => println!("{}", status_line(response)),
            None => println!("No response was received."),
        },
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn args_default_to_settings_url_and_empty_depth() {
        let args = Args::parse_from(["webdav-propfind"]);
        assert!(args.url.is_none());
        assert!(args.depth.is_none());
        assert!(args.body.is_empty());
    }

    #[test]
    fn args_accept_url_and_depth() {
        let args = Args::parse_from(["webdav-propfind", "http://dav.example.com/", "--depth", "1"]);
        assert_eq!(args.url.as_deref(), Some("http://dav.example.com/"));
        assert_eq!(args.depth.as_deref(), Some("1"));
    }

    #[test]
    fn status_line_joins_code_and_reason() {
        let response = DavResponse {
            status: 207,
            reason: "Multi-Status".to_string(),
            headers: Vec::new(),
            body: String::new(),
        };
        assert_eq!(status_line(&response), "207 Multi-Status");
    }
}
