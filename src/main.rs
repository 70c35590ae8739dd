use clap::Parser;

use stakeout::{expect, BrowserSession, DeviceProfile};

/// stakeout: drive a page and hold an expectation against it.
#[derive(Parser)]
#[command(name = "stakeout", version, about)]
struct Cli {
    /// URL to open
    url: String,

    /// CSS selector to wait for
    #[arg(long, default_value = "body")]
    selector: String,

    /// Lookup and assertion timeout in milliseconds
    #[arg(long, default_value_t = 10_000)]
    timeout_ms: u64,

    /// Device profile: desktop, tablet, or mobile
    #[arg(long, default_value = "desktop")]
    profile: String,

    /// Run Chrome with a visible window (default: headless)
    #[arg(long)]
    headed: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(false)
        .without_time()
        .init();

    let cli = Cli::parse();
    let timeout = std::time::Duration::from_millis(cli.timeout_ms);
    let profile = DeviceProfile::preset(&cli.profile)?;

    let session = BrowserSession::launch(&profile, !cli.headed).await?;
    let page = session.new_controller(&cli.url).await?;

    let element = page.find_element(&cli.selector, timeout).await?;
    let text = expect(page.text(&element))
        .with_timeout(timeout)
        .not()
        .to_be_empty()
        .await?;

    let title = page.title().await?;
    let requests = page.network_log().sent_requests(None).await;

    println!("title:    {title}");
    println!("selector: {} ({} chars of text)", cli.selector, text.len());
    println!("requests: {} logged", requests.len());

    page.dispose().await;
    session.close().await;
    Ok(())
}
