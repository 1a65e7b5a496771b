//! Thin entry point for the `orchestra-hook` binary: reads a JSON payload
//! from stdin and forwards it to the monitor service. Always exits 0; a
//! misbehaving hook must never fail the agent CLI invocation that ran it.

#[tokio::main]
async fn main() {
    let _ = tracing_subscriber::fmt().with_writer(std::io::stderr).with_env_filter(
        tracing_subscriber::EnvFilter::new(std::env::var("RUST_LOG").unwrap_or_else(|_| "orchestra=warn".into())),
    ).try_init();

    let cli_args: Vec<String> = std::env::args().skip(1).collect();
    orchestra::hooks::forwarder::run(&cli_args).await;
}
